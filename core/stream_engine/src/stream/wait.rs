use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use crate::error::{Result, StreamError};

/// Cancels a blocked write from another thread.
///
/// Stays tripped until [`CancelToken::reset`], so every wait started after
/// cancelling fails fast as well.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Timed poll loop used while every ring buffer is queued.
#[derive(Debug)]
pub(crate) struct Backpressure<'a> {
    pub poll_interval: Duration,
    pub timeout: Option<Duration>,
    pub cancel: &'a CancelToken,
}

impl Backpressure<'_> {
    /// Polls `ready` until it returns `true`.
    ///
    /// Each round checks the cancel token, then `ready`, then the deadline,
    /// and sleeps at most one poll interval.
    pub fn wait_until<F>(&self, mut ready: F) -> Result<()>
    where
        F: FnMut() -> Result<bool>,
    {
        let started = Instant::now();
        let mut polls = 0u64;

        loop {
            if self.cancel.is_cancelled() {
                return Err(StreamError::Interrupted);
            }
            if ready()? {
                if polls > 0 {
                    log::trace!("Buffer freed after {polls} poll(s), {:?}", started.elapsed());
                }
                return Ok(());
            }

            let mut nap = self.poll_interval;
            if let Some(timeout) = self.timeout {
                let elapsed = started.elapsed();
                if elapsed >= timeout {
                    return Err(StreamError::TimedOut(timeout));
                }
                nap = nap.min(timeout - elapsed);
            }

            polls += 1;
            thread::sleep(nap);
        }
    }
}
