#![deny(missing_docs)]
//! Shared logging utilities for the composer workspace.
//!
//! This crate provides the `engine_*` logging macros used across the codebase
//! and a minimal test initializer for the global logger. Every message is
//! prefixed with the poll tick currently being applied on this thread, if any,
//! so job resolutions can be traced back to the tick that produced them.

use std::cell::Cell;

#[doc(hidden)]
pub use log as __log;

thread_local! {
    /// Poll tick currently being applied on this thread; 0 outside of a tick.
    static POLL_TICK: Cell<u64> = const { Cell::new(0) };
}

/// Sets the poll tick for the current thread.
/// The orchestrator calls this once per applied poll tick.
pub fn set_poll_tick(tick: u64) {
    POLL_TICK.with(|v| v.set(tick));
}

/// Clears the poll tick for the current thread.
pub fn clear_poll_tick() {
    POLL_TICK.with(|v| v.set(0));
}

/// Retrieves the poll tick for the current thread.
/// Returns 0 if no tick is being applied.
pub fn poll_tick() -> u64 {
    POLL_TICK.with(|v| v.get())
}

/// Renders the `[tick N] ` prefix, or nothing outside of a tick.
#[doc(hidden)]
pub fn __tick_prefix() -> String {
    match poll_tick() {
        0 => String::new(),
        tick => format!("[tick {tick}] "),
    }
}

/// Logs a trace-level message using the global logging facade.
#[macro_export]
macro_rules! engine_trace {
    ($($arg:tt)*) => {{
        $crate::__log::trace!("{}{}", $crate::__tick_prefix(), format_args!($($arg)*));
    }};
}

/// Logs an info-level message using the global logging facade.
#[macro_export]
macro_rules! engine_info {
    ($($arg:tt)*) => {{
        $crate::__log::info!("{}{}", $crate::__tick_prefix(), format_args!($($arg)*));
    }};
}

/// Logs a debug-level message using the global logging facade.
#[macro_export]
macro_rules! engine_debug {
    ($($arg:tt)*) => {{
        $crate::__log::debug!("{}{}", $crate::__tick_prefix(), format_args!($($arg)*));
    }};
}

/// Logs a warn-level message using the global logging facade.
#[macro_export]
macro_rules! engine_warn {
    ($($arg:tt)*) => {{
        $crate::__log::warn!("{}{}", $crate::__tick_prefix(), format_args!($($arg)*));
    }};
}

/// Logs an error-level message using the global logging facade.
#[macro_export]
macro_rules! engine_error {
    ($($arg:tt)*) => {{
        $crate::__log::error!("{}{}", $crate::__tick_prefix(), format_args!($($arg)*));
    }};
}

/// Initializes a simple terminal logger for use in unit tests.
///
/// This safely no-ops if another logger has already been initialized.
pub fn initialize_for_tests() {
    use simplelog::{ColorChoice, CombinedLogger, Config, TermLogger, TerminalMode};

    let level = if cfg!(debug_assertions) {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    // Another test may have installed the logger already.
    let _ = CombinedLogger::init(vec![TermLogger::new(
        level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_tracks_current_tick() {
        clear_poll_tick();
        assert_eq!(__tick_prefix(), "");
        set_poll_tick(12);
        assert_eq!(poll_tick(), 12);
        assert_eq!(__tick_prefix(), "[tick 12] ");
        clear_poll_tick();
        assert_eq!(poll_tick(), 0);
    }
}
