//! Logging macros for chatty background loops.
//!
//! A module opts in by declaring `const ENABLE_LOGS: bool` before using them:
//!
//! ```ignore
//! const ENABLE_LOGS: bool = false;
//! use crate::{log_debug, log_warn};
//!
//! log_debug!("sweep finished");
//! ```
//!
//! With the flag off the calls compile to nothing, so a sweeper ticking every
//! second does not flood the log at `debug` level.

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::debug!($($arg)*);
        }
    };
}

/// Warnings from a gated module. Still subject to the `RUST_LOG` filter.
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::warn!($($arg)*);
        }
    };
}
