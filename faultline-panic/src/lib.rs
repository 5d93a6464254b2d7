//! The faultline panic handler integration.
//!
//! The `PanicIntegration`, which is enabled by default in `faultline`,
//! installs a panic hook that will automatically dispatch all errors to the
//! collector that are caused by a panic. Panics are forwarded to the
//! previously registered panic hook afterwards, so the normal crash
//! behavior of the process is never suppressed.
//!
//! The integration deliberately blocks the panicking thread, bounded by the
//! configured shutdown timeout, until the crash event has been durably
//! written to the local disk cache. Network delivery happens later, if the
//! process lives long enough, or on the next start from the cache.
//!
//! # Configuration
//!
//! The panic integration can be configured with an additional extractor,
//! which might optionally create an event out of a `PanicHookInfo`.
//!
//! ```
//! let integration = faultline_panic::PanicIntegration::default().add_extractor(|info| None);
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

use std::panic::{self, AssertUnwindSafe, PanicHookInfo};
use std::sync::Once;

use faultline_core::protocol::{Event, Exception, Level, Mechanism};
use faultline_core::{fault_debug, ClientOptions, FlushSignal, Hint, Integration};

/// A panic handler that sends crash events to the collector.
///
/// The handler captures the panic as a `fatal` event marked as unhandled,
/// then parks the panicking thread until the event is durably persisted,
/// bounded by the shutdown timeout. Whatever happens, the previously
/// installed panic hook runs afterwards.
pub fn panic_handler(info: &PanicHookInfo<'_>) {
    // Nothing may escape from here: a failure inside the handler must not
    // prevent the chained hook from running.
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        faultline_core::with_integration(|integration: &PanicIntegration, hub| {
            let event = integration.event_from_panic_info(info);
            let flush_signal = FlushSignal::new();
            let hint = Hint::new()
                .with_retry()
                .with_flush_signal(flush_signal.clone());
            hub.capture_event_with_hint(event, hint);

            if let Some(client) = hub.client() {
                let timeout = client.options().shutdown_timeout;
                if !flush_signal.wait(timeout) {
                    fault_debug!(
                        "[PanicIntegration] timed out after {:?} waiting for the crash \
                         event to reach disk",
                        timeout
                    );
                }
            }
        });
    }));
    if result.is_err() {
        fault_debug!("[PanicIntegration] the panic handler itself panicked");
    }
}

type PanicExtractor = dyn Fn(&PanicHookInfo<'_>) -> Option<Event<'static>> + Send + Sync;

/// The faultline panic handler integration.
#[derive(Default)]
pub struct PanicIntegration {
    extractors: Vec<Box<PanicExtractor>>,
}

impl std::fmt::Debug for PanicIntegration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PanicIntegration")
            .field("extractors", &self.extractors.len())
            .finish()
    }
}

static INIT: Once = Once::new();

impl Integration for PanicIntegration {
    fn name(&self) -> &'static str {
        "panic"
    }

    fn setup(&self, _cfg: &mut ClientOptions) {
        if INIT.is_completed() {
            fault_debug!(
                "[PanicIntegration] a panic hook is already installed, \
                 refusing to register a second one"
            );
            return;
        }
        INIT.call_once(|| {
            let next = panic::take_hook();
            panic::set_hook(Box::new(move |info| {
                panic_handler(info);
                next(info);
            }));
        });
    }
}

/// Extract the message of a panic.
pub fn message_from_panic_info<'a>(info: &'a PanicHookInfo<'_>) -> &'a str {
    match info.payload().downcast_ref::<&'static str>() {
        Some(s) => s,
        None => match info.payload().downcast_ref::<String>() {
            Some(s) => &s[..],
            None => "Box<Any>",
        },
    }
}

impl PanicIntegration {
    /// Creates a new panic integration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new extractor.
    #[must_use]
    pub fn add_extractor<F>(mut self, f: F) -> Self
    where
        F: Fn(&PanicHookInfo<'_>) -> Option<Event<'static>> + Send + Sync + 'static,
    {
        self.extractors.push(Box::new(f));
        self
    }

    /// Creates an event from the given panic info.
    pub fn event_from_panic_info(&self, info: &PanicHookInfo<'_>) -> Event<'static> {
        for extractor in &self.extractors {
            if let Some(event) = extractor(info) {
                return event;
            }
        }

        let msg = message_from_panic_info(info);
        Event {
            exception: vec![Exception {
                ty: "panic".into(),
                mechanism: Some(Mechanism {
                    ty: "panic".into(),
                    handled: Some(false),
                    ..Default::default()
                }),
                value: Some(msg.to_string()),
                ..Default::default()
            }]
            .into(),
            level: Level::Fatal,
            ..Default::default()
        }
    }
}
