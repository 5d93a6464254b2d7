use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use crate::fault_debug;

/// A one-shot latch signalling that an envelope was durably written to disk.
///
/// The crash capture path blocks on this until the disk write happened, not
/// until network delivery completed.
pub struct FlushSignal {
    flushed: Mutex<bool>,
    condvar: Condvar,
}

impl FlushSignal {
    /// Creates a new unsignalled latch.
    pub fn new() -> Arc<FlushSignal> {
        Arc::new(FlushSignal {
            flushed: Mutex::new(false),
            condvar: Condvar::new(),
        })
    }

    /// Marks the latch as signalled and wakes all waiting threads.
    pub fn signal(&self) {
        let mut flushed = self.flushed.lock().unwrap_or_else(|e| e.into_inner());
        *flushed = true;
        self.condvar.notify_all();
    }

    /// Blocks until the latch is signalled or the timeout elapses.
    ///
    /// Returns `true` if the signal arrived within the timeout.
    pub fn wait(&self, timeout: Duration) -> bool {
        let flushed = self.flushed.lock().unwrap_or_else(|e| e.into_inner());
        let (flushed, _) = self
            .condvar
            .wait_timeout_while(flushed, timeout, |flushed| !*flushed)
            .unwrap_or_else(|e| e.into_inner());
        *flushed
    }
}

type ResultCallback = Arc<dyn Fn(bool) + Send + Sync>;

/// An optional set of capabilities accompanying a capture call.
///
/// A hint signals cross-cutting delivery behavior to the transport without
/// widening the capture API: whether the payload already lives in the disk
/// cache, whether the transport should flag it for a later retry, a callback
/// for the final submission result, and a latch that fires once the payload
/// is durably written to disk. Every capability is optional; an empty hint
/// means default behavior.
#[derive(Clone, Default)]
pub struct Hint {
    from_cache: bool,
    retry: Option<Arc<AtomicBool>>,
    on_result: Option<ResultCallback>,
    flush_signal: Option<Arc<FlushSignal>>,
}

impl Hint {
    /// Creates an empty hint with default behavior.
    pub fn new() -> Hint {
        Default::default()
    }

    /// Creates a hint for an envelope that was read back from the disk cache.
    ///
    /// The transport will not persist such an envelope a second time.
    pub fn from_cache() -> Hint {
        Hint {
            from_cache: true,
            ..Default::default()
        }
    }

    /// Whether the payload already lives in the disk cache.
    pub fn is_from_cache(&self) -> bool {
        self.from_cache
    }

    /// Attaches a retry flag, initially unset.
    ///
    /// The transport flips the flag on transient failures; the owner of the
    /// hint reads it back through [`wants_retry`](Self::wants_retry) to
    /// decide whether a cached copy should be kept.
    pub fn with_retry(mut self) -> Hint {
        self.retry = Some(Arc::new(AtomicBool::new(false)));
        self
    }

    /// Attaches a callback invoked with the final submission outcome.
    pub fn with_result_callback<F>(mut self, callback: F) -> Hint
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        self.on_result = Some(Arc::new(callback));
        self
    }

    /// Attaches a disk-flush latch to the hint.
    pub fn with_flush_signal(mut self, signal: Arc<FlushSignal>) -> Hint {
        self.flush_signal = Some(signal);
        self
    }

    /// Whether the transport asked for this payload to be retried later.
    ///
    /// Returns `false` if the hint carries no retry capability.
    pub fn wants_retry(&self) -> bool {
        self.retry
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Acquire))
    }

    /// Records whether the payload should be retried from the cache later.
    pub fn set_retry(&self, retry: bool) {
        match self.retry {
            Some(ref flag) => flag.store(retry, Ordering::Release),
            None => {
                fault_debug!("hint carries no retry capability, ignoring retry={}", retry);
            }
        }
    }

    /// Invokes the submission-result callback, if one is attached.
    pub fn notify_result(&self, success: bool) {
        if let Some(ref callback) = self.on_result {
            callback(success);
        }
    }

    /// Signals the disk-flush latch, if one is attached.
    pub fn mark_flushed(&self) {
        if let Some(ref signal) = self.flush_signal {
            signal.signal();
        }
    }
}

impl fmt::Debug for Hint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hint")
            .field("from_cache", &self.from_cache)
            .field("retry", &self.retry.as_ref().map(|f| f.load(Ordering::Relaxed)))
            .field("on_result", &self.on_result.is_some())
            .field("flush_signal", &self.flush_signal.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    use super::*;

    #[test]
    fn test_retry_flag_roundtrip() {
        let hint = Hint::new().with_retry();
        assert!(!hint.wants_retry());
        hint.set_retry(true);
        assert!(hint.wants_retry());

        // a hint without the capability stays inert
        let plain = Hint::new();
        plain.set_retry(true);
        assert!(!plain.wants_retry());
    }

    #[test]
    fn test_result_callback() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = calls.clone();
        let hint = Hint::new().with_result_callback(move |success| {
            assert!(success);
            calls2.fetch_add(1, Ordering::SeqCst);
        });
        hint.notify_result(true);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_flush_signal_releases_waiter() {
        let signal = FlushSignal::new();
        let hint = Hint::new().with_flush_signal(signal.clone());

        let waiter = {
            let signal = signal.clone();
            std::thread::spawn(move || signal.wait(Duration::from_secs(5)))
        };
        hint.mark_flushed();
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn test_flush_signal_timeout() {
        let signal = FlushSignal::new();
        let start = Instant::now();
        assert!(!signal.wait(Duration::from_millis(50)));
        assert!(start.elapsed() >= Duration::from_millis(50));
    }
}
