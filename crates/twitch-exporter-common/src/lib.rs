pub mod error;
pub mod time;
pub mod types;

pub use error::{ExporterError, Result};
pub use time::{Clock, ManualClock, SystemClock};
pub use types::ChannelNames;
