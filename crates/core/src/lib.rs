pub mod config;
pub mod error;
pub mod event;
pub mod event_log;
pub mod report;

pub use config::Config;
pub use error::*;
pub use event::*;
pub use event_log::{EventLog, FileEventLog, LogRow, MemoryEventLog};
pub use report::LogReport;
