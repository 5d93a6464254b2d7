use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, SyncSender, TrySendError};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::{Envelope, Hint};
use faultline_core::fault_debug;

/// A reusable zero-crossing latch counting outstanding work items.
///
/// The counter goes up on submit and down when a task finishes, regardless
/// of its outcome. Waiters block until the counter crosses zero, which can
/// happen repeatedly over the lifetime of the latch.
pub(crate) struct DrainLatch {
    count: Mutex<usize>,
    drained: Condvar,
}

impl DrainLatch {
    pub fn new() -> Arc<DrainLatch> {
        Arc::new(DrainLatch {
            count: Mutex::new(0),
            drained: Condvar::new(),
        })
    }

    pub fn increment(&self) {
        *self.count.lock().unwrap_or_else(PoisonError::into_inner) += 1;
    }

    pub fn decrement(&self) {
        let mut count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.drained.notify_all();
        }
    }

    /// Blocks until the counter reaches zero or the timeout elapses.
    ///
    /// Returns `true` when the counter was zero within the timeout.
    pub fn wait_zero(&self, timeout: Duration) -> bool {
        let mut count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
        let (count, result) = self
            .drained
            .wait_timeout_while(count, timeout, |count| *count > 0)
            .unwrap_or_else(PoisonError::into_inner);
        let _ = result;
        *count == 0
    }
}

type Task = (Envelope, Hint);
type OverflowHandler = Arc<dyn Fn(Envelope, Hint) + Send + Sync>;

/// A bounded work queue with a single delivery thread.
///
/// The queue capacity is the configured `max_queue_size`. A submission that
/// does not fit is handed to the overflow handler instead of being dropped.
/// During shutdown, tasks that are still queued when the drain timeout
/// expires take the same route, so no envelope is ever silently lost.
pub(crate) struct TransportWorker {
    sender: Mutex<Option<SyncSender<Task>>>,
    latch: Arc<DrainLatch>,
    accepting: Arc<AtomicBool>,
    overflow: OverflowHandler,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl TransportWorker {
    pub fn new<E>(queue_size: usize, mut execute: E, overflow: OverflowHandler) -> Self
    where
        E: FnMut(Envelope, Hint) + Send + 'static,
    {
        let (sender, receiver) = sync_channel::<Task>(queue_size.max(1));
        let latch = DrainLatch::new();
        let accepting = Arc::new(AtomicBool::new(true));

        let handle = {
            let latch = latch.clone();
            let accepting = accepting.clone();
            let overflow = overflow.clone();
            thread::Builder::new()
                .name("faultline-transport".into())
                .spawn(move || {
                    for (envelope, hint) in receiver.iter() {
                        if accepting.load(Ordering::SeqCst) {
                            execute(envelope, hint);
                        } else {
                            // force shutdown: the task never ran, reroute it
                            // through the overflow policy instead
                            overflow(envelope, hint);
                        }
                        latch.decrement();
                    }
                })
                .ok()
        };

        TransportWorker {
            sender: Mutex::new(Some(sender)),
            latch,
            accepting,
            overflow,
            handle: Mutex::new(handle),
        }
    }

    /// Submits an envelope for delivery.
    ///
    /// When the queue is full or the worker is shutting down, the overflow
    /// handler runs on the calling thread.
    pub fn submit(&self, envelope: Envelope, hint: Hint) {
        if !self.accepting.load(Ordering::SeqCst) {
            fault_debug!("[Transport] worker is shut down, rerouting envelope");
            (self.overflow)(envelope, hint);
            return;
        }

        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(sender) = sender.as_ref() else {
            (self.overflow)(envelope, hint);
            return;
        };

        self.latch.increment();
        match sender.try_send((envelope, hint)) {
            Ok(()) => {}
            Err(TrySendError::Full((envelope, hint)))
            | Err(TrySendError::Disconnected((envelope, hint))) => {
                self.latch.decrement();
                (self.overflow)(envelope, hint);
            }
        }
    }

    /// Blocks until all queued and in-flight tasks finished, bounded by the
    /// timeout.
    pub fn flush(&self, timeout: Duration) -> bool {
        self.latch.wait_zero(timeout)
    }

    /// Stops intake, drains outstanding work bounded by the timeout, and
    /// reroutes whatever did not make it through the overflow policy.
    pub fn shutdown(&self, timeout: Duration) -> bool {
        let drained = self.flush(timeout);
        self.accepting.store(false, Ordering::SeqCst);
        // closing the channel lets the worker consume the remaining tasks
        // (rerouting them) and exit its receive loop
        drop(
            self.sender
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );
        if let Some(handle) = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            let _ = handle.join();
        }
        drained
    }
}

impl Drop for TransportWorker {
    fn drop(&mut self) {
        self.accepting.store(false, Ordering::SeqCst);
        drop(
            self.sender
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );
        if let Some(handle) = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc::channel;

    use super::*;

    fn envelope() -> Envelope {
        Envelope::new()
    }

    #[test]
    fn test_executes_submitted_tasks() {
        let executed = Arc::new(AtomicUsize::new(0));
        let worker = {
            let executed = executed.clone();
            TransportWorker::new(
                4,
                move |_, _| {
                    executed.fetch_add(1, Ordering::SeqCst);
                },
                Arc::new(|_, _| {}),
            )
        };

        for _ in 0..3 {
            worker.submit(envelope(), Hint::new());
        }
        assert!(worker.flush(Duration::from_secs(5)));
        assert_eq!(executed.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_overflow_runs_rejection_handler() {
        let rejected = Arc::new(AtomicUsize::new(0));
        // the worker blocks until released, so the queue backs up
        let (started_tx, started_rx) = channel::<()>();
        let (release_tx, release_rx) = channel::<()>();

        let worker = {
            let rejected = rejected.clone();
            TransportWorker::new(
                2,
                move |_, _| {
                    started_tx.send(()).ok();
                    release_rx.recv().ok();
                },
                Arc::new(move |_, _| {
                    rejected.fetch_add(1, Ordering::SeqCst);
                }),
            )
        };

        worker.submit(envelope(), Hint::new());
        // make sure the first task occupies the worker before backing up
        // the queue
        started_rx.recv().unwrap();

        // two queued, two rejected
        for _ in 0..4 {
            worker.submit(envelope(), Hint::new());
        }
        assert_eq!(rejected.load(Ordering::SeqCst), 2);

        for _ in 0..3 {
            release_tx.send(()).ok();
        }
        assert!(worker.flush(Duration::from_secs(5)));
    }

    #[test]
    fn test_shutdown_reroutes_queued_tasks() {
        let executed = Arc::new(AtomicUsize::new(0));
        let rejected = Arc::new(AtomicUsize::new(0));
        let (started_tx, started_rx) = channel::<()>();
        let (release_tx, release_rx) = channel::<()>();

        let worker = {
            let executed = executed.clone();
            let rejected = rejected.clone();
            TransportWorker::new(
                4,
                move |_, _| {
                    started_tx.send(()).ok();
                    release_rx.recv_timeout(Duration::from_millis(500)).ok();
                    executed.fetch_add(1, Ordering::SeqCst);
                },
                Arc::new(move |_, _| {
                    rejected.fetch_add(1, Ordering::SeqCst);
                }),
            )
        };

        for _ in 0..4 {
            worker.submit(envelope(), Hint::new());
        }
        // let the first task through and wait until the second one is being
        // worked on, so exactly two tasks remain queued
        started_rx.recv().unwrap();
        release_tx.send(()).ok();
        started_rx.recv().unwrap();

        // the drain times out while the second task hangs; the two queued
        // tasks must take the rejection route instead of being lost
        assert!(!worker.shutdown(Duration::from_millis(50)));
        assert_eq!(executed.load(Ordering::SeqCst), 2);
        assert_eq!(rejected.load(Ordering::SeqCst), 2);
    }
}
