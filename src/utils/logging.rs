//! Per-module switchable logging.
//!
//! Pipeline stages are chatty about cache decisions. Each stage declares a
//! module-level flag and logs through these macros so a single stage can be
//! silenced without touching `RUST_LOG`:
//!
//! ```ignore
//! const ENABLE_LOGS: bool = true;
//!
//! use crate::{log_info, log_warn};
//!
//! log_info!("retrieved {} (not computed)", key);
//! ```

/// Info-level log gated on the caller's `ENABLE_LOGS` const.
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::info!($($arg)*);
        }
    };
}

/// Debug-level log gated on the caller's `ENABLE_LOGS` const.
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::debug!($($arg)*);
        }
    };
}

/// Warn-level log gated on the caller's `ENABLE_LOGS` const.
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::warn!($($arg)*);
        }
    };
}

/// Error-level log gated on the caller's `ENABLE_LOGS` const.
///
/// Per-run failures during discovery go through here; they are also returned
/// to the caller, so silencing a module never hides a failure.
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::error!($($arg)*);
        }
    };
}
