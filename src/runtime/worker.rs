use statum::{machine, state};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::runtime::{Builder, Runtime};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::bridge::BridgeError;
use super::{WorkId, WorkKind};

pub type BoxedTask = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

// One queued unit of work, already wrapped with its completion delivery
pub struct Job {
    pub id: WorkId,
    pub kind: WorkKind,
    pub task: BoxedTask,
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

// Define worker states using statum's state macro
#[state]
#[derive(Debug, Clone)]
pub enum WorkerState {
    Initializing,
    Running,
}

#[machine]
#[derive(Debug)]
pub struct BackgroundWorker<S: WorkerState> {
    // Single logical work queue, drained in submission order
    queue: mpsc::Receiver<Job>,

    // Forced shutdown, used when a graceful drain takes too long
    shutdown: CancellationToken,

    // Event loop hosted on the dedicated thread
    runtime: Option<Runtime>,

    // Number of completed units, for the exit log
    processed: u64,
}

impl BackgroundWorker<Initializing> {
    pub fn create(queue: mpsc::Receiver<Job>, shutdown: CancellationToken) -> Self {
        debug!("Creating background worker");
        Self::new(queue, shutdown, None, 0)
    }

    // Build the event loop and transition to Running state
    pub fn initialize(mut self) -> Result<BackgroundWorker<Running>, BridgeError> {
        info!("Building background runtime");
        let runtime = match Builder::new_current_thread().enable_all().build() {
            Ok(runtime) => runtime,
            Err(e) => {
                error!("Failed to build background runtime: {}", e);
                return Err(BridgeError::StartFailed(e.to_string()));
            }
        };

        self.runtime = Some(runtime);
        info!("Background runtime ready, transitioning to Running state");
        Ok(self.transition())
    }
}

impl BackgroundWorker<Running> {
    /// Runs queued work one unit at a time until the queue closes or shutdown
    /// is forced. Blocks the calling thread.
    pub fn run_loop(mut self) {
        let Some(runtime) = self.runtime.take() else {
            error!("Background worker entered Running state without a runtime");
            return;
        };
        let shutdown = self.shutdown.clone();

        info!("Starting background work loop");
        runtime.block_on(async {
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => {
                        warn!("Forced shutdown, abandoning queued work");
                        break;
                    }
                    job = self.queue.recv() => {
                        let Some(job) = job else {
                            info!("Work queue closed");
                            break;
                        };

                        debug!("Running {:?} ({:?})", job.kind, job.id);
                        tokio::select! {
                            biased;
                            _ = shutdown.cancelled() => {
                                warn!("Forced shutdown while {:?} ({:?}) was running", job.kind, job.id);
                                break;
                            }
                            _ = job.task => {
                                self.processed += 1;
                            }
                        }
                    }
                }
            }
        });

        // Tasks spawned by transports live on this runtime and end with it
        runtime.shutdown_timeout(Duration::from_millis(100));
        info!(
            "Background work loop stopped after {} units of work",
            self.processed
        );
    }
}
