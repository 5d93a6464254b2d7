use std::io;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use faultline_core::fault_debug;

use super::ratelimit::{RateLimitCategory, RateLimiter};
use super::worker::TransportWorker;
use crate::cache::EnvelopeCache;
use crate::{ClientOptions, Envelope, Hint};

/// How long after a queue-overflow rejection the transport reports itself
/// as unhealthy.
const REJECTION_HEALTH_WINDOW: Duration = Duration::from_secs(5);

/// A check consulted before any network attempt.
///
/// On platforms with an observable connectivity state this avoids burning
/// send attempts that are known to fail; the envelope stays cached and
/// flagged for retry instead.
pub trait TransportGate: Send + Sync {
    /// Whether the transport currently has a chance to reach the network.
    fn is_connected(&self) -> bool;
}

/// The default gate: always connected.
pub struct AlwaysConnected;

impl TransportGate for AlwaysConnected {
    fn is_connected(&self) -> bool {
        true
    }
}

/// The result of one HTTP exchange with the collector.
pub struct RequestOutcome {
    /// The HTTP status code of the response.
    pub status: u16,
    /// The structured rate limits header value, if the response carried one.
    pub rate_limits: Option<String>,
    /// The `Retry-After` header value, if the response carried one.
    pub retry_after: Option<String>,
}

/// The function performing the actual network exchange.
///
/// It receives the serialized envelope body and returns the response
/// details, or an `io::Error` for connection-level failures.
pub type SendRequest = Box<dyn FnMut(Vec<u8>) -> io::Result<RequestOutcome> + Send>;

/// Decides which HTTP responses permanently reject a payload.
///
/// Permanently rejected envelopes are discarded from the cache and never
/// retried. The default treats every client and server error as permanent,
/// except `429`, which only means the local side is over quota and keeps
/// the payload retryable.
// TODO: let embedders pass a custom policy into `AsyncConnection`.
#[derive(Clone, Copy, Debug, Default)]
pub struct ResponsePolicy;

impl ResponsePolicy {
    /// Whether a response status discards the payload for good.
    pub fn is_permanent_rejection(self, status: u16) -> bool {
        (400..600).contains(&status) && status != 429
    }
}

/// The asynchronous delivery pipeline behind the HTTP transport.
///
/// Submissions are rate-limit filtered up front, then queued for a single
/// delivery thread. Every queued envelope is written to the disk cache
/// before the network attempt, so a crashing process can pick it up on the
/// next run. Queue overflow and forced shutdown both route envelopes into
/// the cache instead of dropping them.
pub struct AsyncConnection {
    worker: TransportWorker,
    rate_limiter: Arc<Mutex<RateLimiter>>,
    cache: Arc<dyn EnvelopeCache>,
    last_rejection: Arc<Mutex<Option<Instant>>>,
}

impl AsyncConnection {
    /// Creates a connection delivering through the given request function.
    pub fn new(
        options: &ClientOptions,
        cache: Arc<dyn EnvelopeCache>,
        send_request: SendRequest,
    ) -> AsyncConnection {
        Self::with_gate(options, cache, send_request, Arc::new(AlwaysConnected))
    }

    /// Creates a connection with an explicit [`TransportGate`].
    pub fn with_gate(
        options: &ClientOptions,
        cache: Arc<dyn EnvelopeCache>,
        send_request: SendRequest,
        gate: Arc<dyn TransportGate>,
    ) -> AsyncConnection {
        let rate_limiter = Arc::new(Mutex::new(RateLimiter::new()));
        let last_rejection = Arc::new(Mutex::new(None));

        let overflow = {
            let cache = cache.clone();
            let last_rejection = last_rejection.clone();
            Arc::new(move |envelope: Envelope, hint: Hint| {
                fault_debug!("[Transport] submission rejected, caching envelope for retry");
                if !hint.is_from_cache() {
                    cache.store(&envelope, &hint);
                }
                // the envelope is durably on disk now, release any waiter
                hint.mark_flushed();
                hint.set_retry(true);
                hint.notify_result(false);
                *last_rejection
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());
            })
        };

        let execute = {
            let cache = cache.clone();
            let rate_limiter = rate_limiter.clone();
            let policy = ResponsePolicy;
            let mut send_request = send_request;
            move |envelope: Envelope, hint: Hint| {
                // Persist before the network attempt; a crash mid-send must
                // still find the envelope on disk. The flush notification
                // fires here, after the disk write, not after the send.
                if hint.is_from_cache() {
                    fault_debug!("[Transport] envelope is already cached, not persisting it again");
                } else {
                    cache.store(&envelope, &hint);
                }
                hint.mark_flushed();

                if !gate.is_connected() {
                    fault_debug!("[Transport] offline, keeping envelope for a later retry");
                    hint.set_retry(true);
                    hint.notify_result(false);
                    return;
                }

                let body = match envelope.to_vec() {
                    Ok(body) => body,
                    Err(err) => {
                        fault_debug!("[Transport] failed to serialize envelope: {}", err);
                        cache.discard(&envelope);
                        hint.set_retry(false);
                        hint.notify_result(false);
                        return;
                    }
                };

                match send_request(body) {
                    Ok(outcome) => {
                        rate_limiter
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .update_from_response(
                                outcome.status,
                                outcome.rate_limits.as_deref(),
                                outcome.retry_after.as_deref(),
                            );

                        if outcome.status == 200 {
                            cache.discard(&envelope);
                            hint.notify_result(true);
                        } else if policy.is_permanent_rejection(outcome.status) {
                            fault_debug!(
                                "[Transport] collector rejected envelope with status {}, \
                                 discarding it",
                                outcome.status
                            );
                            cache.discard(&envelope);
                            hint.set_retry(false);
                            hint.notify_result(false);
                        } else {
                            fault_debug!(
                                "[Transport] send failed with status {}, keeping envelope \
                                 for retry",
                                outcome.status
                            );
                            hint.set_retry(true);
                            hint.notify_result(false);
                        }
                    }
                    Err(err) => {
                        fault_debug!(
                            "[Transport] network error, keeping envelope for retry: {}",
                            err
                        );
                        hint.set_retry(true);
                        hint.notify_result(false);
                    }
                }
            }
        };

        AsyncConnection {
            worker: TransportWorker::new(options.max_queue_size, execute, overflow),
            rate_limiter,
            cache,
            last_rejection,
        }
    }

    /// Submits an envelope for delivery.
    ///
    /// Rate limited items are removed before the envelope is queued. When
    /// nothing survives the filter the envelope is fully discarded: a
    /// cached original is removed from the cache, the hint is marked as
    /// failed and not-to-retry, and nothing reaches the queue.
    pub fn send(&self, envelope: Envelope, hint: Hint) {
        let envelope = {
            let limiter = self
                .rate_limiter
                .lock()
                .unwrap_or_else(PoisonError::into_inner);

            let fully_limited = !envelope.is_raw()
                && envelope.items().count() > 0
                && envelope
                    .items()
                    .all(|item| limiter.is_active(RateLimitCategory::from(item.ty())));
            if fully_limited {
                drop(limiter);
                fault_debug!("[Transport] envelope is fully rate limited, discarding it");
                if hint.is_from_cache() {
                    self.cache.discard(&envelope);
                }
                hint.set_retry(false);
                hint.notify_result(false);
                return;
            }

            match limiter.filter(envelope) {
                Some(envelope) => envelope,
                None => {
                    // attachments without a surviving event are dropped too
                    hint.set_retry(false);
                    hint.notify_result(false);
                    return;
                }
            }
        };

        self.worker.submit(envelope, hint);
    }

    /// Blocks until the queue is drained or the timeout elapses.
    pub fn flush(&self, timeout: Duration) -> bool {
        self.worker.flush(timeout)
    }

    /// Stops intake and drains the queue, bounded by the timeout.
    ///
    /// Envelopes still queued after the timeout are rerouted into the disk
    /// cache.
    pub fn shutdown(&self, timeout: Duration) -> bool {
        self.worker.shutdown(timeout)
    }

    /// Whether submissions currently have a chance to go out.
    pub fn is_healthy(&self) -> bool {
        let rate_limited = self
            .rate_limiter
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_any_active();
        let recently_rejected = self
            .last_rejection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some_and(|at| at.elapsed() < REJECTION_HEALTH_WINDOW);
        !rate_limited && !recently_rejected
    }
}
