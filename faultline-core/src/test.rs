//! This provides testing functionality for building tests.
//!
//! **Feature:** `test` (*disabled by default*)
//!
//! If the crate has been compiled with the test support feature this module
//! becomes available and provides functionality to capture events in a
//! block.
//!
//! # Example usage
//!
//! ```
//! use faultline_core::test::with_captured_events;
//! use faultline_core::{capture_message, Level};
//!
//! let events = with_captured_events(|| {
//!     capture_message("Hello World!", Level::Warning);
//! });
//! assert_eq!(events.len(), 1);
//! assert_eq!(events[0].message.as_ref().unwrap(), "Hello World!");
//! ```

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::protocol::{Envelope, Event};
use crate::types::Dsn;
use crate::{ClientOptions, Hint, Hub, Scope, Transport};

/// Collects envelopes instead of sending them.
///
/// The transport acknowledges every submission: an attached result callback
/// fires with success and a disk-flush latch is signalled right away.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use faultline_core::test::TestTransport;
/// use faultline_core::{ClientOptions, Hub};
///
/// let transport = TestTransport::new();
/// let options = ClientOptions {
///     dsn: Some("https://public@example.com/1".parse().unwrap()),
///     transport: Some(Arc::new(transport.clone())),
///     ..ClientOptions::default()
/// };
/// Hub::current().bind_client(Some(Arc::new(options.into())));
/// ```
pub struct TestTransport {
    collected: Mutex<Vec<Envelope>>,
}

impl TestTransport {
    /// Creates a new test transport.
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> Arc<TestTransport> {
        Arc::new(TestTransport {
            collected: Mutex::new(vec![]),
        })
    }

    /// Fetches and clears the contained envelopes.
    pub fn fetch_and_clear_envelopes(&self) -> Vec<Envelope> {
        let mut guard = self.collected.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut *guard)
    }

    /// Fetches and clears the contained events.
    pub fn fetch_and_clear_events(&self) -> Vec<Event<'static>> {
        self.fetch_and_clear_envelopes()
            .iter()
            .filter_map(Envelope::event)
            .collect()
    }
}

impl Transport for TestTransport {
    fn send_envelope(&self, envelope: Envelope, hint: Hint) {
        self.collected
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(envelope);
        hint.mark_flushed();
        hint.notify_result(true);
    }

    fn flush(&self, _timeout: Duration) -> bool {
        true
    }
}

/// Runs some code with the default test hub and returns the captured
/// events.
pub fn with_captured_events<F: FnOnce()>(f: F) -> Vec<Event<'static>> {
    with_captured_events_options(f, ClientOptions::default())
}

/// Runs some code with the default test hub with the given options and
/// returns the captured events.
///
/// If no DSN is set on the options a test DSN is inserted.
pub fn with_captured_events_options<F: FnOnce(), O: Into<ClientOptions>>(
    f: F,
    options: O,
) -> Vec<Event<'static>> {
    with_captured_envelopes_options(f, options)
        .iter()
        .filter_map(Envelope::event)
        .collect()
}

/// Runs some code with the default test hub and returns the captured
/// envelopes.
pub fn with_captured_envelopes<F: FnOnce()>(f: F) -> Vec<Envelope> {
    with_captured_envelopes_options(f, ClientOptions::default())
}

/// Runs some code with the default test hub with the given options and
/// returns the captured envelopes.
pub fn with_captured_envelopes_options<F: FnOnce(), O: Into<ClientOptions>>(
    f: F,
    options: O,
) -> Vec<Envelope> {
    let transport = TestTransport::new();
    let mut options = options.into();
    if options.dsn.is_none() {
        options.dsn = Some("https://public@faultline.invalid/1".parse::<Dsn>().unwrap());
    }
    options.transport = Some(Arc::new(transport.clone()));
    let hub = Arc::new(Hub::new(
        Some(Arc::new(crate::Client::with_options(options))),
        Arc::new(Scope::default()),
    ));
    Hub::run(hub, f);
    transport.fetch_and_clear_envelopes()
}
