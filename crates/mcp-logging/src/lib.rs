pub mod config;
pub mod init;
pub mod structured;

pub use config::{LogFormat, LoggingConfig};
pub use init::{build_filter, init_logging, LoggingError};
pub use structured::{LogEntry, LogLevel};
