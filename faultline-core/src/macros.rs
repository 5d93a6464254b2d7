use std::sync::atomic::{AtomicBool, Ordering};

static DEBUG_ENABLED: AtomicBool = AtomicBool::new(false);

/// Enables or disables diagnostic output for the whole process.
///
/// This is flipped by the client when it is constructed from options with
/// `debug` set, so that diagnostics work even from code paths that cannot
/// reach a hub (for instance while a stack lock is held).
#[doc(hidden)]
pub fn set_debug_enabled(enabled: bool) {
    DEBUG_ENABLED.store(enabled, Ordering::Relaxed);
}

#[doc(hidden)]
pub fn debug_enabled() -> bool {
    DEBUG_ENABLED.load(Ordering::Relaxed)
}

/// Logs an internal diagnostic message.
///
/// Output goes to stderr when the bound client has `debug` enabled. When the
/// `debug-logs` feature is active the message is routed through the `log`
/// crate instead, independently of the `debug` flag.
#[macro_export]
macro_rules! fault_debug {
    ($($arg:tt)*) => {
        #[cfg(feature = "debug-logs")]
        {
            $crate::log::debug!(target: "faultline", $($arg)*);
        }
        #[cfg(not(feature = "debug-logs"))]
        {
            if $crate::macros::debug_enabled() {
                eprint!("[faultline] ");
                eprintln!($($arg)*);
            }
        }
    };
}
