use std::fmt;

/// Device-side name of a buffer. Two handles are the same buffer exactly when
/// their ids match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BufferId(pub u32);

/// Device-side name of a playback voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourceId(pub u32);

impl BufferId {
    pub const NONE: Self = Self(0);

    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl SourceId {
    pub const NONE: Self = Self(0);

    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Buffer[{}]", self.0)
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Source[{}]", self.0)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_handles_compare_by_value() {
        assert_eq!(BufferId(7), BufferId(7));
        assert_ne!(BufferId(7), BufferId(8));

        let set: HashSet<_> = [SourceId(1), SourceId(1), SourceId(2)].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_display() {
        assert_eq!(BufferId(3).to_string(), "Buffer[3]");
        assert_eq!(SourceId(12).to_string(), "Source[12]");
    }
}
