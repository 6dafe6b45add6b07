use serde::{Deserialize, Serialize};

mod action;
mod command;
mod config;
mod error;
mod executor;
mod lun;
mod proxy;
pub mod template;

pub use action::*;
pub use command::*;
pub use config::*;
pub use error::*;
pub use executor::*;
pub use lun::*;
pub use proxy::*;

/// Frames raw filer output in log messages.
pub static OUTPUT_START: &str = "<<<<<<<<<<";
pub static OUTPUT_END: &str = ">>>>>>>>>>";

/// Returned when a filer command exited cleanly but its output does not
/// prove success.
pub const STATUS_MISMATCH: i32 = -1;

/// How the statuses of the commands making up one action combine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusPolicy {
    /// Run every command, report the status of the last one.
    #[default]
    #[serde(rename = "last")]
    LastWins,
    /// Stop at the first failing command and report it.
    #[serde(rename = "first-failure")]
    FirstFailure,
}

impl StatusPolicy {
    /// Whether a sequence of commands must stop after one returned `status`.
    pub fn stops_at(&self, status: i32) -> bool {
        match self {
            StatusPolicy::LastWins => false,
            StatusPolicy::FirstFailure => status != 0,
        }
    }
}
