//! Cancellable operations and the ordered queue that executes them
//!
//! Every high-level manager funnels its asynchronous work through one
//! [`OperationQueue`]. The queue owns its operations until they reach a
//! terminal state and runs them strictly one at a time; callers keep
//! only an [`OperationHandle`] for observation and cancellation.
//!
//! Cancellation is cooperative and non-preemptive: cancelling a pending
//! operation makes the queue skip it, cancelling an in-progress one only
//! flips the token its own logic watches to pick an unwind path. The
//! queue never aborts an in-flight network call.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{Notify, watch};
use tracing::{debug, trace};

/// Lifecycle of one queued operation.
///
/// `Pending -> InProgress -> Finished`, or `Canceled` out of either
/// non-terminal state. No transition leaves a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationState {
    /// Queued, not yet started
    Pending,
    /// Executing or awaiting a response
    InProgress,
    /// Completed, success or failure already reported
    Finished,
    /// Cancelled before or during execution
    Canceled,
}

impl OperationState {
    /// Whether the state permits no further transitions
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Canceled)
    }
}

/// One unit of queued asynchronous work.
#[async_trait]
pub trait Operation: Send + 'static {
    /// Name used in queue logging
    fn name(&self) -> &str;

    /// Execute the operation.
    ///
    /// Implementations check `token` at resumption points and unwind
    /// (e.g. send a protocol-level cancel) when it reports cancellation.
    async fn run(&mut self, token: &CancelToken);
}

#[derive(Debug)]
struct OpCell {
    state: watch::Sender<OperationState>,
    done: watch::Sender<bool>,
}

impl OpCell {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            state: watch::Sender::new(OperationState::Pending),
            done: watch::Sender::new(false),
        })
    }

    fn state(&self) -> OperationState {
        *self.state.borrow()
    }

    fn cancel(&self) -> bool {
        self.state.send_if_modified(|state| {
            if state.is_terminal() {
                false
            } else {
                *state = OperationState::Canceled;
                true
            }
        })
    }

    /// Pending -> InProgress; false when the operation was cancelled first
    fn begin(&self) -> bool {
        self.state.send_if_modified(|state| {
            if *state == OperationState::Pending {
                *state = OperationState::InProgress;
                true
            } else {
                false
            }
        })
    }

    /// InProgress -> Finished; a concurrent cancel wins and stays
    fn finish(&self) {
        self.state.send_if_modified(|state| {
            if *state == OperationState::InProgress {
                *state = OperationState::Finished;
                true
            } else {
                false
            }
        });
    }

    fn mark_done(&self) {
        self.done.send_replace(true);
    }
}

/// Cancellation token handed to a running operation.
#[derive(Debug, Clone)]
pub struct CancelToken {
    cell: Arc<OpCell>,
}

impl CancelToken {
    /// Whether the operation has been cancelled
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.cell.state() == OperationState::Canceled
    }

    /// Resolve when the operation is cancelled; never resolves otherwise.
    /// Intended for `select!` against a network await.
    pub async fn canceled(&self) {
        let mut rx = self.cell.state.subscribe();
        // Holding the cell keeps the sender alive, so wait_for only
        // errors if the token outlives its queue; treat that as never.
        if rx
            .wait_for(|state| *state == OperationState::Canceled)
            .await
            .is_err()
        {
            std::future::pending::<()>().await;
        }
    }
}

/// External reference to a queued operation.
///
/// The queue owns the operation itself; holders of a handle can observe
/// its state, cancel it, and await its single on-finished signal.
#[derive(Debug, Clone)]
pub struct OperationHandle {
    cell: Arc<OpCell>,
}

impl OperationHandle {
    /// Current state
    #[must_use]
    pub fn state(&self) -> OperationState {
        self.cell.state()
    }

    /// Request cancellation. Pending operations are skipped by the
    /// queue; in-progress operations unwind on their own terms.
    pub fn cancel(&self) {
        self.cell.cancel();
    }

    /// Resolve once the operation reached a terminal state and its
    /// cleanup ran. Fires exactly once per operation.
    pub async fn finished(&self) {
        let mut rx = self.cell.done.subscribe();
        let _ = rx.wait_for(|done| *done).await;
    }
}

struct QueuedOp {
    op: Box<dyn Operation>,
    cell: Arc<OpCell>,
}

struct QueueInner {
    name: String,
    queue: Mutex<VecDeque<QueuedOp>>,
    current: Mutex<Option<Arc<OpCell>>>,
    wake: Notify,
    suspended: AtomicBool,
    closed: AtomicBool,
}

/// Ordered, sequential executor of [`Operation`]s scoped to one manager.
pub struct OperationQueue {
    inner: Arc<QueueInner>,
}

impl OperationQueue {
    /// Create an idle queue and spawn its worker task.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let inner = Arc::new(QueueInner {
            name: name.into(),
            queue: Mutex::new(VecDeque::new()),
            current: Mutex::new(None),
            wake: Notify::new(),
            suspended: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        });
        tokio::spawn(worker(Arc::clone(&inner)));
        Self { inner }
    }

    /// Append an operation to the tail. Execution begins when every
    /// earlier operation has reached a terminal state.
    pub fn enqueue<O: Operation>(&self, op: O) -> OperationHandle {
        let cell = OpCell::new();
        let handle = OperationHandle {
            cell: Arc::clone(&cell),
        };

        if self.inner.closed.load(Ordering::Acquire) {
            debug!(queue = %self.inner.name, op = op.name(), "enqueue on closed queue");
            cell.cancel();
            cell.mark_done();
            return handle;
        }

        trace!(queue = %self.inner.name, op = op.name(), "enqueued");
        self.inner.queue.lock().expect("queue lock poisoned").push_back(QueuedOp {
            op: Box::new(op),
            cell,
        });
        self.inner.wake.notify_one();
        handle
    }

    /// Cancel every queued operation and the one in flight, then clear
    /// the queue. Used on manager teardown or unrecoverable error.
    pub fn cancel_all(&self) {
        let drained: Vec<QueuedOp> = {
            let mut queue = self.inner.queue.lock().expect("queue lock poisoned");
            queue.drain(..).collect()
        };
        debug!(queue = %self.inner.name, count = drained.len(), "cancelling all operations");
        for queued in drained {
            queued.cell.cancel();
            queued.cell.mark_done();
        }

        // In-flight operation unwinds cooperatively; the worker fires
        // its finished signal when run() returns.
        if let Some(current) = self.inner.current.lock().expect("current lock poisoned").as_ref() {
            current.cancel();
        }
    }

    /// Gate execution on an external context (vehicle HMI status).
    /// While suspended, enqueued operations stay `Pending`.
    pub fn set_suspended(&self, suspended: bool) {
        self.inner.suspended.store(suspended, Ordering::Release);
        if !suspended {
            self.inner.wake.notify_one();
        }
    }

    /// Number of operations waiting to start
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.inner.queue.lock().expect("queue lock poisoned").len()
    }

    /// Permanently stop the queue, cancelling everything.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        self.cancel_all();
        self.inner.wake.notify_one();
    }
}

impl Drop for OperationQueue {
    fn drop(&mut self) {
        self.close();
    }
}

async fn worker(inner: Arc<QueueInner>) {
    loop {
        if inner.closed.load(Ordering::Acquire) {
            break;
        }
        if inner.suspended.load(Ordering::Acquire) {
            inner.wake.notified().await;
            continue;
        }

        let next = inner.queue.lock().expect("queue lock poisoned").pop_front();
        let Some(mut queued) = next else {
            inner.wake.notified().await;
            continue;
        };

        if !queued.cell.begin() {
            // Cancelled while pending; skip but still fire the signal.
            trace!(queue = %inner.name, op = queued.op.name(), "skipping canceled operation");
            queued.cell.mark_done();
            continue;
        }

        trace!(queue = %inner.name, op = queued.op.name(), "running");
        *inner.current.lock().expect("current lock poisoned") = Some(Arc::clone(&queued.cell));
        let token = CancelToken {
            cell: Arc::clone(&queued.cell),
        };
        queued.op.run(&token).await;

        *inner.current.lock().expect("current lock poisoned") = None;
        queued.cell.finish();
        queued.cell.mark_done();
        trace!(queue = %inner.name, op = queued.op.name(), state = ?queued.cell.state(), "done");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct LogOp {
        label: &'static str,
        log: mpsc::UnboundedSender<String>,
        delay: Duration,
    }

    #[async_trait]
    impl Operation for LogOp {
        fn name(&self) -> &str {
            self.label
        }

        async fn run(&mut self, token: &CancelToken) {
            if token.is_canceled() {
                return;
            }
            let _ = self.log.send(format!("{} start", self.label));
            tokio::time::sleep(self.delay).await;
            let _ = self.log.send(format!("{} end", self.label));
        }
    }

    fn log_channel() -> (
        mpsc::UnboundedSender<String>,
        mpsc::UnboundedReceiver<String>,
    ) {
        mpsc::unbounded_channel()
    }

    #[tokio::test]
    async fn test_operations_run_in_order_one_at_a_time() {
        let queue = OperationQueue::new("test");
        let (log, mut rx) = log_channel();

        let first = queue.enqueue(LogOp {
            label: "a",
            log: log.clone(),
            delay: Duration::from_millis(10),
        });
        let second = queue.enqueue(LogOp {
            label: "b",
            log,
            delay: Duration::ZERO,
        });

        second.finished().await;
        first.finished().await;
        assert_eq!(first.state(), OperationState::Finished);
        assert_eq!(second.state(), OperationState::Finished);

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        // "b start" can only appear after "a end"
        assert_eq!(events, ["a start", "a end", "b start", "b end"]);
    }

    #[tokio::test]
    async fn test_cancel_pending_skips_execution() {
        let queue = OperationQueue::new("test");
        let (log, mut rx) = log_channel();

        let blocker = queue.enqueue(LogOp {
            label: "blocker",
            log: log.clone(),
            delay: Duration::from_millis(20),
        });
        let victim = queue.enqueue(LogOp {
            label: "victim",
            log,
            delay: Duration::ZERO,
        });

        victim.cancel();
        assert_eq!(victim.state(), OperationState::Canceled);

        victim.finished().await;
        blocker.finished().await;
        assert_eq!(blocker.state(), OperationState::Finished);

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert!(!events.iter().any(|event| event.starts_with("victim")));
    }

    #[tokio::test]
    async fn test_suspended_queue_accumulates_pending() {
        let queue = OperationQueue::new("test");
        queue.set_suspended(true);
        let (log, _rx) = log_channel();

        let handle = queue.enqueue(LogOp {
            label: "held",
            log,
            delay: Duration::ZERO,
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(handle.state(), OperationState::Pending);

        queue.set_suspended(false);
        handle.finished().await;
        assert_eq!(handle.state(), OperationState::Finished);
    }

    #[tokio::test]
    async fn test_cancel_all_clears_queue() {
        let queue = OperationQueue::new("test");
        queue.set_suspended(true);
        let (log, _rx) = log_channel();

        let handles: Vec<_> = (0..3)
            .map(|_| {
                queue.enqueue(LogOp {
                    label: "queued",
                    log: log.clone(),
                    delay: Duration::ZERO,
                })
            })
            .collect();

        queue.cancel_all();
        for handle in &handles {
            handle.finished().await;
            assert_eq!(handle.state(), OperationState::Canceled);
        }
        assert_eq!(queue.pending_len(), 0);
    }

    #[tokio::test]
    async fn test_in_progress_cancel_is_cooperative() {
        struct WaitsForCancel {
            watched: mpsc::UnboundedSender<&'static str>,
        }

        #[async_trait]
        impl Operation for WaitsForCancel {
            fn name(&self) -> &str {
                "waits"
            }

            async fn run(&mut self, token: &CancelToken) {
                token.canceled().await;
                let _ = self.watched.send("unwound");
            }
        }

        let queue = OperationQueue::new("test");
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = queue.enqueue(WaitsForCancel { watched: tx });

        while handle.state() != OperationState::InProgress {
            tokio::task::yield_now().await;
        }
        handle.cancel();
        handle.finished().await;

        assert_eq!(handle.state(), OperationState::Canceled);
        assert_eq!(rx.try_recv().unwrap(), "unwound");
    }
}
