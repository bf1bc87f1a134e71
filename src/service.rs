//! Power control service: bounded command queue feeding a single worker
//!
//! Callers only enqueue commands or read snapshots. All network I/O and every
//! session mutation happens on the worker task, one command at a time, in
//! submission order.

use powerlink_shared::{limits, Command, OutputPower};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::command::{CommandExecutor, CommandOutcome};
use crate::config::ServiceConfig;
use crate::error::ServiceError;
use crate::session::{ServiceStatus, SessionStore};
use crate::transport::{HttpTransport, ReqwestTransport};

type Reply = oneshot::Sender<Result<CommandOutcome, ServiceError>>;

/// A command waiting for the worker
struct QueuedCommand {
    command: Command,
    /// Present for synchronous submissions
    reply: Option<Reply>,
}

/// How a caller waits on a submitted command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitMode {
    /// Return as soon as the command is queued
    Async,
    /// Wait for the command to complete, up to the given duration
    Sync(Duration),
}

/// What a successful submission produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    Queued,
    Completed(CommandOutcome),
}

struct Inner {
    tx: mpsc::Sender<QueuedCommand>,
    session: Arc<SessionStore>,
    closing: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

/// Handle to a running service, cheap to clone and share across tasks
#[derive(Clone)]
pub struct PowerService {
    inner: Arc<Inner>,
}

impl PowerService {
    /// Start the service against the live vendor API
    pub fn start(config: ServiceConfig) -> Result<Self, ServiceError> {
        config.validate()?;
        let transport =
            ReqwestTransport::new().map_err(|e| ServiceError::Transport(e.to_string()))?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Start the service with a caller-provided transport
    ///
    /// Must be called from within a tokio runtime.
    pub fn with_transport(
        config: ServiceConfig,
        transport: Arc<dyn HttpTransport>,
    ) -> Result<Self, ServiceError> {
        config.validate()?;

        let session = Arc::new(SessionStore::new());
        let executor = CommandExecutor::new(&config, transport.clone(), session.clone());
        let (tx, rx) = mpsc::channel::<QueuedCommand>(config.queue_capacity);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        info!(
            "Starting power service for device {} via {} transport",
            config.device_sn,
            transport.name()
        );
        info!(
            "  queue capacity {}, max retries {}, backoff {:?}",
            config.queue_capacity,
            config.max_retry_count,
            config.retry_backoff()
        );

        let eager_login = config.eager_login;
        let worker = tokio::spawn(async move {
            worker_loop(executor, eager_login, rx, shutdown_rx).await;
        });

        Ok(Self {
            inner: Arc::new(Inner {
                tx,
                session,
                closing: AtomicBool::new(false),
                shutdown_tx,
                worker: Mutex::new(Some(worker)),
            }),
        })
    }

    /// Queue a command
    ///
    /// Admission waits at most `admission` for queue space, a zero duration
    /// only takes a free slot. A synchronous submission then waits for
    /// completion with its own timeout; on expiry the command still runs,
    /// only the caller stops waiting.
    pub async fn submit(
        &self,
        command: Command,
        mode: SubmitMode,
        admission: Duration,
    ) -> Result<Submission, ServiceError> {
        if self.inner.closing.load(Ordering::Acquire) {
            return Err(ServiceError::ShuttingDown);
        }

        let (reply, completion) = match mode {
            SubmitMode::Async => (None, None),
            SubmitMode::Sync(_) => {
                let (tx, rx) = oneshot::channel();
                (Some(tx), Some(rx))
            }
        };

        let queued = QueuedCommand { command, reply };
        match timeout(admission, self.inner.tx.send(queued)).await {
            Ok(Ok(())) => debug!("Queued {}", command.name()),
            Ok(Err(_)) => return Err(ServiceError::ShuttingDown),
            Err(_) => {
                warn!("Command queue full, rejecting {}", command.name());
                return Err(ServiceError::ResourceExhausted);
            }
        }

        match (mode, completion) {
            (SubmitMode::Sync(wait), Some(completion)) => match timeout(wait, completion).await {
                Ok(Ok(result)) => result.map(Submission::Completed),
                Ok(Err(_)) => Err(ServiceError::ShuttingDown),
                Err(_) => {
                    warn!("{} did not complete within {:?}", command.name(), wait);
                    Err(ServiceError::Timeout)
                }
            },
            _ => Ok(Submission::Queued),
        }
    }

    /// Validate and queue an output power change
    ///
    /// Out-of-range values are rejected here and never reach the worker.
    pub async fn set_output(&self, percent: i64, wait: bool) -> Result<Submission, ServiceError> {
        let output = OutputPower::new(percent)?;
        let mode = if wait {
            SubmitMode::Sync(Duration::from_millis(limits::SYNC_COMPLETION_TIMEOUT_MS))
        } else {
            SubmitMode::Async
        };
        self.submit(Command::SetOutput(output), mode, admission_timeout())
            .await
    }

    /// Drop the current session and log in again, waiting for the result
    pub async fn force_relogin(&self) -> Result<(), ServiceError> {
        let wait = Duration::from_millis(limits::SYNC_COMPLETION_TIMEOUT_MS);
        self.submit(Command::ForceRelogin, SubmitMode::Sync(wait), admission_timeout())
            .await
            .map(|_| ())
    }

    /// State once every command submitted before this call has completed
    pub async fn queued_status(&self) -> Result<ServiceStatus, ServiceError> {
        let wait = Duration::from_millis(limits::SYNC_COMPLETION_TIMEOUT_MS);
        match self
            .submit(Command::GetStatus, SubmitMode::Sync(wait), admission_timeout())
            .await?
        {
            Submission::Completed(CommandOutcome::Status(status)) => Ok(status),
            other => Err(ServiceError::Internal(format!(
                "unexpected status reply {:?}",
                other
            ))),
        }
    }

    /// Current state, without waiting for queued commands
    pub async fn status(&self) -> ServiceStatus {
        self.inner.session.snapshot().await
    }

    /// Whether a session is established
    pub async fn is_ready(&self) -> bool {
        self.inner.session.is_authenticated().await
    }

    /// Last value the server explicitly confirmed
    pub async fn last_confirmed_output(&self) -> Option<OutputPower> {
        self.inner.session.last_confirmed().await
    }

    /// Reject new submissions, run every queued command, then stop the worker
    pub async fn shutdown(&self) {
        if self.inner.closing.swap(true, Ordering::AcqRel) {
            debug!("Shutdown already requested");
        }
        self.inner.shutdown_tx.send_replace(true);

        let worker = self
            .inner
            .worker
            .lock()
            .ok()
            .and_then(|mut handle| handle.take());
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                error!("Worker task ended abnormally: {}", e);
            }
            info!("Power service stopped");
        }
    }
}

/// Default queue admission window of the convenience calls
fn admission_timeout() -> Duration {
    Duration::from_millis(limits::ASYNC_ADMISSION_TIMEOUT_MS)
}

/// Worker: owns the executor and processes commands one at a time
async fn worker_loop(
    executor: CommandExecutor,
    eager_login: bool,
    mut rx: mpsc::Receiver<QueuedCommand>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    if eager_login {
        match executor.login().await {
            Ok(()) => info!("Initial login succeeded"),
            Err(e) => warn!("Initial login failed, will retry on first command: {}", e),
        }
    }

    loop {
        tokio::select! {
            biased;

            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }

            queued = rx.recv() => match queued {
                Some(queued) => process(&executor, queued).await,
                None => {
                    debug!("All service handles dropped");
                    return;
                }
            },
        }
    }

    rx.close();
    let mut drained = 0usize;
    while let Some(queued) = rx.recv().await {
        process(&executor, queued).await;
        drained += 1;
    }
    info!("Worker drained {} queued commands", drained);
}

async fn process(executor: &CommandExecutor, queued: QueuedCommand) {
    let result = executor.execute(queued.command).await;
    if let Some(reply) = queued.reply {
        // Caller may have timed out and gone away
        let _ = reply.send(result);
    }
}
