//! This crate provides support for logging events and errors / panics to
//! the [Faultline](https://faultline.dev/) error tracking service. It
//! integrates with the standard panic system in Rust.
//!
//! # Quickstart
//!
//! The most convenient way to use this library is via the [`init`]
//! function, which starts a faultline client with a default set of
//! integrations, and binds it to the current [`Hub`].
//!
//! The [`init`] function returns a guard that, when dropped, will flush
//! events that were not yet sent to the faultline service. It has a
//! two-second default timeout for this. It is recommended that you hold on
//! to this guard in `main`:
//!
//! ```rust
//! let _guard = faultline::init("https://key@ingest.faultline.dev/42");
//!
//! faultline::capture_message("Hello World!", faultline::Level::Info);
//!
//! // when the guard goes out of scope here, the client will wait up to two
//! // seconds to send remaining events to the service.
//! ```
//!
//! # Integrations
//!
//! What makes faultline useful are its integrations. Some of them are
//! enabled by default; See [`apply_defaults`]. The panic integration
//! installs a process-wide panic hook: a panicking thread captures a fatal
//! event and blocks, bounded by the configured shutdown timeout, until the
//! event is durably cached on disk, then the previously installed hook
//! (and with it the default crash behavior) proceeds unimpeded.
//!
//! # Reliability
//!
//! Delivery is asynchronous and never blocks the capturing thread. Sends
//! that fail with a transient error, as well as everything still queued
//! when the process goes down, remain in the local disk cache (see
//! `ClientOptions::cache_dir_path`) and are re-submitted on the next
//! [`init`]. Server-imposed rate limits are honored per payload category
//! before an envelope ever hits the queue.
//!
//! # Features
//!
//! Functionality of the crate can be turned on and off by feature flags.
//! This is the current list of feature flags:
//!
//! Default features:
//!
//! - `panic`: Enables the panic integration.
//! - `transport`: Enables the default `ureq` based transport.
//!
//! Additional features:
//!
//! - `debug-logs`: Uses the `log` crate for diagnostic output, instead of
//!   printing to `stderr`.
//! - `test`: Enables the test support module.
#![warn(missing_docs)]
#![doc(html_favicon_url = "https://faultline.dev/favicon.ico")]

pub mod cache;
mod defaults;
mod init;
pub mod transports;

// re-export from core
#[doc(inline)]
pub use faultline_core::*;

pub use crate::defaults::apply_defaults;
pub use crate::init::{init, ClientInitGuard};

/// Available faultline integrations.
///
/// Integrations extend the functionality of the SDK for some common
/// frameworks and libraries. They are enabled by feature flags and
/// re-exported here for convenience.
pub mod integrations {
    #[cfg(feature = "panic")]
    #[doc(inline)]
    pub use faultline_panic as panic;
}
