//! Utility modules
//!
//! Logging setup and timing helpers.

pub mod logger;
pub mod timer;

pub use logger::{init_logger, LogLevel};
pub use timer::{format_duration, go_flag_duration, parse_go_duration, Timer};
