//! Runtime Bridge - foreground/background work exchange
//!
//! Owns the one long-lived background thread and the two channels crossing
//! into and out of it. The foreground submits futures and later drains
//! [`Completion`]s from its own frame loop; nothing the foreground owns is
//! ever touched from the background thread.
//!
//! ```text
//! Foreground ─[Job]─► bounded queue ─► BackgroundWorker (dedicated thread)
//!     ▲                                        │
//!     └────── try_completions() ◄─[Completion]─┘ (unbounded)
//! ```

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::worker::{BackgroundWorker, Job};
use super::{WorkId, WorkKind};

const WORKER_THREAD_NAME: &str = "runtime-bridge";
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Errors reported synchronously by the bridge
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BridgeError {
    /// The background context is not running; nothing was queued
    #[error("Background runtime is not available")]
    RuntimeUnavailable,

    /// The background context could not be created at all
    #[error("Failed to start background runtime: {0}")]
    StartFailed(String),

    /// The work queue is at capacity; nothing was queued
    #[error("Background work queue is full")]
    QueueFull,
}

/// How a unit of work ended
#[derive(Debug)]
pub enum Outcome<T> {
    Succeeded(T),
    Failed(String),
    /// Cancelled before it started; the work never ran
    Skipped,
}

/// Completion signal for one submitted unit of work
#[derive(Debug)]
pub struct Completion<T> {
    pub id: WorkId,
    pub kind: WorkKind,
    /// Set when the handle was cancelled, even if the work still ran to the end
    pub cancelled: bool,
    pub outcome: Outcome<T>,
}

/// Cancellable reference to one submitted unit of work
#[derive(Debug, Clone)]
pub struct WorkHandle {
    id: WorkId,
    kind: WorkKind,
    token: CancellationToken,
}

impl WorkHandle {
    pub fn id(&self) -> WorkId {
        self.id
    }

    pub fn kind(&self) -> WorkKind {
        self.kind
    }

    /// Best-effort: prevents a not-yet-started unit from running. A unit that
    /// is already running finishes and reports `cancelled: true`.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

type Notifier = Arc<dyn Fn() + Send + Sync>;

struct BridgeInner<T> {
    queue: Mutex<Option<mpsc::Sender<Job>>>,
    completions_tx: mpsc::UnboundedSender<Completion<T>>,
    completions_rx: Mutex<mpsc::UnboundedReceiver<Completion<T>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
    shutdown: CancellationToken,
    /// Parent of every queued unit's token, swapped out by `cancel_pending`
    pending: Mutex<CancellationToken>,
    next_id: AtomicU64,
    notifier: Mutex<Option<Notifier>>,
}

/// Thread-safe "submit work, get a cancellable handle" primitive.
///
/// Cloning is cheap and every clone talks to the same background thread.
pub struct RuntimeBridge<T> {
    inner: Arc<BridgeInner<T>>,
}

impl<T> Clone for RuntimeBridge<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

fn lock<V>(mutex: &Mutex<V>) -> MutexGuard<'_, V> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl<T: Send + 'static> RuntimeBridge<T> {
    /// Launches the background context with a work queue of `capacity` units.
    pub fn start(capacity: usize) -> Result<Self, BridgeError> {
        info!(
            "Starting runtime bridge with queue capacity {}",
            capacity.max(1)
        );
        let (queue_tx, queue_rx) = mpsc::channel(capacity.max(1));
        let shutdown = CancellationToken::new();

        let worker = BackgroundWorker::create(queue_rx, shutdown.clone()).initialize()?;

        let thread = std::thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || worker.run_loop())
            .map_err(|e| {
                error!("Failed to spawn background thread: {}", e);
                BridgeError::StartFailed(e.to_string())
            })?;

        info!("Runtime bridge started successfully");
        Ok(Self::from_parts(Some(queue_tx), Some(thread), shutdown))
    }

    /// A bridge without a background context. Every submission fails with
    /// [`BridgeError::RuntimeUnavailable`].
    pub fn unavailable() -> Self {
        Self::from_parts(None, None, CancellationToken::new())
    }

    fn from_parts(
        queue: Option<mpsc::Sender<Job>>,
        thread: Option<JoinHandle<()>>,
        shutdown: CancellationToken,
    ) -> Self {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(BridgeInner {
                queue: Mutex::new(queue),
                completions_tx,
                completions_rx: Mutex::new(completions_rx),
                thread: Mutex::new(thread),
                shutdown,
                pending: Mutex::new(CancellationToken::new()),
                next_id: AtomicU64::new(1),
                notifier: Mutex::new(None),
            }),
        }
    }

    /// Registers a callback run on the background thread after each completion
    /// is queued, typically a repaint request for the foreground.
    pub fn set_notifier<F>(&self, notifier: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        *lock(&self.inner.notifier) = Some(Arc::new(notifier));
    }

    pub fn is_running(&self) -> bool {
        let accepting = lock(&self.inner.queue)
            .as_ref()
            .is_some_and(|queue| !queue.is_closed());
        let alive = lock(&self.inner.thread)
            .as_ref()
            .is_some_and(|thread| !thread.is_finished());
        accepting && alive
    }

    /// Enqueues `work` for the background context. Returns immediately.
    pub fn submit<F>(&self, kind: WorkKind, work: F) -> Result<WorkHandle, BridgeError>
    where
        F: Future<Output = Result<T, String>> + Send + 'static,
    {
        let queue = lock(&self.inner.queue);
        let Some(queue) = queue.as_ref() else {
            debug!("Rejecting {:?}: background runtime not running", kind);
            return Err(BridgeError::RuntimeUnavailable);
        };

        let id = WorkId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let token = lock(&self.inner.pending).child_token();
        let task_token = token.clone();
        let completions = self.inner.completions_tx.clone();
        let notifier = lock(&self.inner.notifier).clone();

        let task = async move {
            let outcome = if task_token.is_cancelled() {
                debug!("Skipping cancelled {:?} ({:?})", kind, id);
                Outcome::Skipped
            } else {
                match work.await {
                    Ok(value) => Outcome::Succeeded(value),
                    Err(message) => Outcome::Failed(message),
                }
            };

            let completion = Completion {
                id,
                kind,
                cancelled: task_token.is_cancelled(),
                outcome,
            };
            if completions.send(completion).is_err() {
                debug!("Completion receiver dropped, discarding {:?}", id);
                return;
            }
            if let Some(notify) = notifier {
                notify();
            }
        };

        let job = Job {
            id,
            kind,
            task: Box::pin(task),
        };

        match queue.try_send(job) {
            Ok(()) => {
                debug!("Queued {:?} ({:?})", kind, id);
                Ok(WorkHandle { id, kind, token })
            }
            Err(TrySendError::Full(_)) => {
                warn!("Work queue full, dropping {:?}", kind);
                Err(BridgeError::QueueFull)
            }
            Err(TrySendError::Closed(_)) => {
                warn!("Work queue closed, dropping {:?}", kind);
                Err(BridgeError::RuntimeUnavailable)
            }
        }
    }

    /// Same as [`WorkHandle::cancel`].
    pub fn cancel(&self, handle: &WorkHandle) {
        debug!("Cancelling {:?} ({:?})", handle.kind, handle.id);
        handle.cancel();
    }

    /// Cancels every unit submitted so far. Units that have not started are
    /// skipped, a running one finishes flagged. Later submissions are not
    /// affected.
    pub fn cancel_pending(&self) {
        let previous = std::mem::take(&mut *lock(&self.inner.pending));
        debug!("Cancelling all pending background work");
        previous.cancel();
    }

    /// Drains every completion delivered so far. Never blocks.
    pub fn try_completions(&self) -> Vec<Completion<T>> {
        let mut receiver = lock(&self.inner.completions_rx);
        let mut completions = Vec::new();
        while let Ok(completion) = receiver.try_recv() {
            completions.push(completion);
        }
        completions
    }

    /// Closes the queue and waits up to `timeout` for the background thread to
    /// exit. Queued units get the first half of the budget to drain, then the
    /// loop is forced to stop. Returns `false` if the thread was still alive at
    /// the deadline; it is left running, never killed.
    pub fn stop(&self, timeout: Duration) -> bool {
        let queue = lock(&self.inner.queue).take();
        let Some(thread) = lock(&self.inner.thread).take() else {
            debug!("Runtime bridge already stopped");
            return true;
        };
        drop(queue);

        info!("Stopping runtime bridge (timeout {:?})", timeout);
        let started = Instant::now();
        let drain_deadline = started + timeout / 2;
        let deadline = started + timeout;

        while !thread.is_finished() && Instant::now() < deadline {
            if Instant::now() >= drain_deadline && !self.inner.shutdown.is_cancelled() {
                warn!("Background work did not drain in time, forcing shutdown");
                self.inner.shutdown.cancel();
            }
            std::thread::sleep(STOP_POLL_INTERVAL);
        }

        if !thread.is_finished() {
            self.inner.shutdown.cancel();
            warn!(
                "Background thread still running after {:?}, leaving it behind",
                timeout
            );
            return false;
        }

        if thread.join().is_err() {
            error!("Background thread panicked");
        }
        info!("Runtime bridge stopped after {:?}", started.elapsed());
        true
    }
}
