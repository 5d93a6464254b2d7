use std::sync::Arc;
use std::time::Duration;

use crate::{ClientOptions, Envelope, Hint};

/// The trait for transports.
///
/// A transport is responsible for queueing envelopes and delivering them to
/// the collector. Implementations are expected to be asynchronous: a call
/// to [`send_envelope`](Transport::send_envelope) must not block the
/// capturing thread. The accompanying [`Hint`] carries the delivery
/// capabilities of the submission (caching, retry, result callback, disk
/// flush notification).
pub trait Transport: Send + Sync + 'static {
    /// Sends an envelope.
    fn send_envelope(&self, envelope: Envelope, hint: Hint);

    /// Drains the queue of the transport.
    ///
    /// Returns `true` if the queue was drained within the given time,
    /// `false` otherwise.
    fn flush(&self, timeout: Duration) -> bool {
        let _ = timeout;
        true
    }

    /// Instructs the transport to shut down, draining outstanding work
    /// bounded by the timeout.
    fn shutdown(&self, timeout: Duration) -> bool {
        self.flush(timeout)
    }

    /// A quick check whether submissions currently have a chance to go out.
    ///
    /// Returns `false` while a rate limit is active or while the transport
    /// recently had to reject a submission because its queue was full.
    /// Callers can consult this before performing expensive enrichment.
    fn is_healthy(&self) -> bool {
        true
    }
}

/// A factory creating transport instances.
///
/// Because the client can be restarted with different options, a boxed
/// factory rather than a transport instance is stored on the options.
///
/// The factory is invoked with the options of the client that is about to be
/// created.
pub trait TransportFactory: Send + Sync {
    /// Given some options, creates a transport.
    fn create_transport(&self, options: &ClientOptions) -> Arc<dyn Transport>;
}

impl<F> TransportFactory for F
where
    F: Fn(&ClientOptions) -> Arc<dyn Transport> + Clone + Send + Sync,
{
    fn create_transport(&self, options: &ClientOptions) -> Arc<dyn Transport> {
        (self)(options)
    }
}

impl<T: Transport> TransportFactory for Arc<T> {
    fn create_transport(&self, options: &ClientOptions) -> Arc<dyn Transport> {
        let _ = options;
        self.clone()
    }
}
