use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::time::Duration;

use faultline::cache::DiskCache;
use faultline::protocol::Event;
use faultline::transports::{AsyncConnection, RequestOutcome, SendRequest};
use faultline::{ClientOptions, Envelope, FlushSignal, Hint, Hub, Scope, Transport};

fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "faultline-transport-test-{name}-{}",
        std::process::id()
    ));
    let _ = fs::remove_dir_all(&dir);
    dir
}

fn options(max_queue_size: usize) -> ClientOptions {
    ClientOptions {
        max_queue_size,
        ..Default::default()
    }
}

fn event_envelope(message: &str) -> Envelope {
    Envelope::from(Event {
        message: Some(message.to_owned()),
        ..Event::new()
    })
}

fn ok_outcome() -> RequestOutcome {
    RequestOutcome {
        status: 200,
        rate_limits: None,
        retry_after: None,
    }
}

#[test]
fn test_success_discards_cached_copy() {
    let dir = temp_dir("success");
    let cache = Arc::new(DiskCache::new(&dir, 30).unwrap());
    let calls = Arc::new(AtomicUsize::new(0));

    let sender: SendRequest = {
        let calls = calls.clone();
        Box::new(move |_body| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(ok_outcome())
        })
    };
    let conn = AsyncConnection::new(&options(8), cache.clone(), sender);

    conn.send(event_envelope("all good"), Hint::new());
    assert!(conn.flush(Duration::from_secs(5)));

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(cache.envelope_paths().is_empty());

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn test_permanent_rejection_discards_and_does_not_retry() {
    let dir = temp_dir("permanent");
    let cache = Arc::new(DiskCache::new(&dir, 30).unwrap());

    let sender: SendRequest = Box::new(move |_body| {
        Ok(RequestOutcome {
            status: 400,
            rate_limits: None,
            retry_after: None,
        })
    });
    let conn = AsyncConnection::new(&options(8), cache.clone(), sender);

    let submitted = Arc::new(AtomicBool::new(true));
    let result = {
        let submitted = submitted.clone();
        move |success: bool| submitted.store(success, Ordering::SeqCst)
    };
    let hint = Hint::new().with_retry().with_result_callback(result);
    conn.send(event_envelope("rejected"), hint.clone());
    assert!(conn.flush(Duration::from_secs(5)));

    assert!(!hint.wants_retry());
    assert!(!submitted.load(Ordering::SeqCst));
    assert!(cache.envelope_paths().is_empty());

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn test_network_error_keeps_envelope_cached_for_retry() {
    let dir = temp_dir("network-error");
    let cache = Arc::new(DiskCache::new(&dir, 30).unwrap());

    let sender: SendRequest = Box::new(move |_body| {
        Err(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "gateway down",
        ))
    });
    let conn = AsyncConnection::new(&options(8), cache.clone(), sender);

    let hint = Hint::new().with_retry();
    conn.send(event_envelope("try me later"), hint.clone());
    assert!(conn.flush(Duration::from_secs(5)));

    assert!(hint.wants_retry());
    assert_eq!(cache.envelope_paths().len(), 1);

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn test_429_keeps_envelope_retryable() {
    let dir = temp_dir("throttled");
    let cache = Arc::new(DiskCache::new(&dir, 30).unwrap());

    let sender: SendRequest = Box::new(move |_body| {
        Ok(RequestOutcome {
            status: 429,
            rate_limits: None,
            retry_after: Some("30".into()),
        })
    });
    let conn = AsyncConnection::new(&options(8), cache.clone(), sender);

    let hint = Hint::new().with_retry();
    conn.send(event_envelope("over quota"), hint.clone());
    assert!(conn.flush(Duration::from_secs(5)));

    assert!(hint.wants_retry());
    assert_eq!(cache.envelope_paths().len(), 1);
    // the 429 activated the wildcard backoff
    assert!(!conn.is_healthy());

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn test_flush_signal_fires_after_disk_write_not_after_send() {
    let dir = temp_dir("flush-signal");
    let cache = Arc::new(DiskCache::new(&dir, 30).unwrap());

    // the network send hangs way longer than the waiter is willing to wait
    let (release_tx, release_rx) = channel::<()>();
    let sender: SendRequest = Box::new(move |_body| {
        release_rx
            .recv_timeout(Duration::from_secs(10))
            .expect("released");
        Ok(ok_outcome())
    });
    let conn = AsyncConnection::new(&options(8), cache.clone(), sender);

    let signal = FlushSignal::new();
    let hint = Hint::new().with_retry().with_flush_signal(signal.clone());
    conn.send(event_envelope("crashing"), hint);

    // the latch releases once the envelope is durably cached, while the
    // network attempt is still hanging
    assert!(signal.wait(Duration::from_secs(5)));
    assert_eq!(cache.envelope_paths().len(), 1);

    release_tx.send(()).unwrap();
    assert!(conn.flush(Duration::from_secs(5)));

    let _ = fs::remove_dir_all(&dir);
}

struct BlockingSender {
    started_tx: Sender<()>,
    release_rx: Receiver<()>,
}

impl BlockingSender {
    fn send(&mut self, _body: Vec<u8>) -> std::io::Result<RequestOutcome> {
        self.started_tx.send(()).ok();
        self.release_rx
            .recv_timeout(Duration::from_secs(10))
            .expect("released");
        Ok(ok_outcome())
    }
}

#[test]
fn test_queue_overflow_persists_rejected_envelopes() {
    let dir = temp_dir("overflow");
    let cache = Arc::new(DiskCache::new(&dir, 30).unwrap());

    let (started_tx, started_rx) = channel::<()>();
    let (release_tx, release_rx) = channel::<()>();
    let mut blocking = BlockingSender {
        started_tx,
        release_rx,
    };
    let sender: SendRequest = Box::new(move |body| blocking.send(body));

    let max_queue_size = 2;
    let conn = AsyncConnection::new(&options(max_queue_size), cache.clone(), sender);

    // occupy the worker first so the queue fills deterministically
    conn.send(event_envelope("in flight"), Hint::new().with_retry());
    started_rx.recv().unwrap();

    let submitted = 5;
    let failures = Arc::new(AtomicUsize::new(0));
    let mut hints = Vec::new();
    for i in 0..submitted {
        let failures = failures.clone();
        let hint = Hint::new()
            .with_retry()
            .with_result_callback(move |success| {
                if !success {
                    failures.fetch_add(1, Ordering::SeqCst);
                }
            });
        conn.send(event_envelope(&format!("queued {i}")), hint.clone());
        hints.push(hint);
    }

    // everything beyond the queue capacity went to disk, marked retryable
    let rejected = submitted - max_queue_size;
    assert_eq!(cache.envelope_paths().len(), rejected);
    assert_eq!(failures.load(Ordering::SeqCst), rejected);
    assert_eq!(
        hints.iter().filter(|hint| hint.wants_retry()).count(),
        rejected
    );
    assert!(!conn.is_healthy());

    // release the worker and let the queued envelopes finish
    for _ in 0..submitted {
        release_tx.send(()).ok();
    }
    assert!(conn.flush(Duration::from_secs(5)));
    // the delivered envelopes were discarded from the cache again
    assert_eq!(cache.envelope_paths().len(), rejected);

    let _ = fs::remove_dir_all(&dir);
}

struct MockTransport {
    conn: AsyncConnection,
    network_calls: Arc<AtomicUsize>,
}

impl MockTransport {
    fn new(options: &ClientOptions, cache: Arc<DiskCache>) -> MockTransport {
        let network_calls = Arc::new(AtomicUsize::new(0));
        let sender: SendRequest = {
            let network_calls = network_calls.clone();
            Box::new(move |_body| {
                network_calls.fetch_add(1, Ordering::SeqCst);
                Ok(RequestOutcome {
                    status: 200,
                    rate_limits: Some("60:error:key".into()),
                    retry_after: None,
                })
            })
        };
        MockTransport {
            conn: AsyncConnection::new(options, cache, sender),
            network_calls,
        }
    }
}

impl Transport for MockTransport {
    fn send_envelope(&self, envelope: Envelope, hint: Hint) {
        self.conn.send(envelope, hint)
    }

    fn flush(&self, timeout: Duration) -> bool {
        self.conn.flush(timeout)
    }

    fn shutdown(&self, timeout: Duration) -> bool {
        self.conn.shutdown(timeout)
    }

    fn is_healthy(&self) -> bool {
        self.conn.is_healthy()
    }
}

#[test]
fn test_rate_limited_capture_never_reaches_network_or_cache() {
    let dir = temp_dir("rate-limited");
    let cache = Arc::new(DiskCache::new(&dir, 30).unwrap());

    let transport = Arc::new(MockTransport::new(&options(8), cache.clone()));
    let client_options = ClientOptions {
        dsn: Some("https://public@faultline.invalid/1".parse().unwrap()),
        transport: Some(Arc::new(transport.clone())),
        ..Default::default()
    };
    let client = Arc::new(faultline::Client::with_options(client_options));
    let hub = Arc::new(Hub::new(Some(client.clone()), Arc::new(Scope::default())));

    Hub::run(hub, || {
        // the first capture goes out and brings back an `error` rate limit
        let first = faultline::capture_message("first", faultline::Level::Error);
        assert!(!first.is_nil());
        assert!(faultline::flush(Some(Duration::from_secs(5))));
        assert_eq!(transport.network_calls.load(Ordering::SeqCst), 1);
        assert!(!transport.is_healthy());

        // the second capture is accepted locally but filtered before the
        // queue: no network attempt, no cache entry
        let second = faultline::capture_message("second", faultline::Level::Error);
        assert!(!second.is_nil());
        assert!(faultline::flush(Some(Duration::from_secs(5))));
        assert_eq!(transport.network_calls.load(Ordering::SeqCst), 1);
        assert!(cache.envelope_paths().is_empty());
    });

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn test_shutdown_caches_undelivered_envelopes() {
    let dir = temp_dir("shutdown");
    let cache = Arc::new(DiskCache::new(&dir, 30).unwrap());

    let (started_tx, started_rx) = channel::<()>();
    let sender: SendRequest = Box::new(move |_body| {
        started_tx.send(()).ok();
        // the network call outlives the drain timeout by a wide margin
        std::thread::sleep(Duration::from_millis(500));
        Ok(ok_outcome())
    });
    let conn = AsyncConnection::new(&options(4), cache.clone(), sender);

    for i in 0..3 {
        conn.send(event_envelope(&format!("pending {i}")), Hint::new());
    }
    started_rx.recv().unwrap();

    // the first envelope hangs in its network call; the drain times out
    // and the remaining two are rerouted to disk instead of being lost
    // (the in-flight one is discarded from the cache once its send
    // succeeds)
    assert!(!conn.shutdown(Duration::from_millis(50)));
    assert_eq!(cache.envelope_paths().len(), 2);

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn test_resend_sweep_clears_cache_on_success() {
    let dir = temp_dir("resend");
    let cache = Arc::new(DiskCache::new(&dir, 30).unwrap());

    // a previous run left envelopes behind
    for i in 0..3 {
        cache.store(
            &event_envelope(&format!("from last run {i}")),
            &Hint::new(),
        );
    }
    assert_eq!(cache.envelope_paths().len(), 3);

    let calls = Arc::new(AtomicUsize::new(0));
    let sender: SendRequest = {
        let calls = calls.clone();
        Box::new(move |_body| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(ok_outcome())
        })
    };
    let transport = Arc::new(SweepTransport {
        conn: AsyncConnection::new(&options(8), cache.clone(), sender),
    });
    let client_options = ClientOptions {
        dsn: Some("https://public@faultline.invalid/1".parse().unwrap()),
        transport: Some(Arc::new(transport.clone())),
        ..Default::default()
    };
    let client = faultline::Client::with_options(client_options);

    let removed = faultline::cache::resend_cached_envelopes(&cache, &client);
    assert_eq!(removed, 3);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert!(cache.envelope_paths().is_empty());

    let _ = fs::remove_dir_all(&dir);
}

struct SweepTransport {
    conn: AsyncConnection,
}

impl Transport for SweepTransport {
    fn send_envelope(&self, envelope: Envelope, hint: Hint) {
        self.conn.send(envelope, hint)
    }

    fn flush(&self, timeout: Duration) -> bool {
        self.conn.flush(timeout)
    }
}
