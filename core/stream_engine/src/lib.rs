pub mod buffer;
pub mod config;
pub mod constants;
pub mod device;
pub mod device_manager;
pub mod error;
pub mod format;
pub mod handle;
pub mod ring;
pub mod stream;
pub mod voice;
pub mod wav;

pub use buffer::Buffer;
pub use config::{RestartPolicy, StreamConfig};
pub use device::{AudioDevice, ErrorCode, soft::SoftDevice};
pub use error::{Result, StreamError};
pub use format::{AudioFormat, SampleLayout};
pub use stream::{BufferedSourceStream, CancelToken, SourceStream};
pub use transport::position::PlaybackPosition;
pub use voice::{Voice, VoiceState};
