//! Serialized command execution
//!
//! Units cannot handle concurrent writes, so every option set goes through a
//! single drain task: one command in flight, strict FIFO order, and a minimum
//! gap between a command's completion and the next one's start.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use aircon_protocol::{AirconClient, DeviceOptions};
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::QueueConfig;
use crate::error::{Result, SdkError};

/// Where the queue sends commands
#[async_trait]
pub trait CommandSink: Send + Sync {
    async fn send_options(&self, options: &DeviceOptions) -> aircon_protocol::Result<()>;
}

#[async_trait]
impl CommandSink for AirconClient {
    async fn send_options(&self, options: &DeviceOptions) -> aircon_protocol::Result<()> {
        // Power-off goes through set_power so it carries the last mode and target
        if options.is_power_off_only() {
            self.set_power(false).await
        } else {
            self.set_device_options(options).await
        }
    }
}

pub type CommandId = u64;

/// An option set awaiting transmission
#[derive(Debug, Clone, PartialEq)]
pub struct PendingCommand {
    pub id: CommandId,
    pub options: DeviceOptions,
}

/// Queue notifications
#[derive(Debug, Clone)]
pub enum QueueEvent {
    /// The unit acknowledged the command
    Executed {
        command: PendingCommand,
        attempts: u32,
    },
    /// An attempt failed and another one will follow
    Retry {
        command: PendingCommand,
        attempt: u32,
        error: String,
    },
    /// Every attempt failed; the command was dropped
    MaxRetriesReached {
        command: PendingCommand,
        attempts: u32,
        error: String,
    },
    /// The command failed in a way retrying cannot fix; it was dropped
    Rejected {
        command: PendingCommand,
        error: String,
    },
}

impl QueueEvent {
    pub fn command(&self) -> &PendingCommand {
        match self {
            QueueEvent::Executed { command, .. }
            | QueueEvent::Retry { command, .. }
            | QueueEvent::MaxRetriesReached { command, .. }
            | QueueEvent::Rejected { command, .. } => command,
        }
    }
}

/// Resolves with the outcome of one enqueued command
#[derive(Debug)]
pub struct CommandTicket {
    id: CommandId,
    outcome: oneshot::Receiver<aircon_protocol::Result<()>>,
}

impl CommandTicket {
    pub fn id(&self) -> CommandId {
        self.id
    }

    /// Wait for the command to complete.
    ///
    /// Returns the error of the last attempt if the command was dropped, or
    /// [`SdkError::QueueClosed`] if the queue shut down first.
    pub async fn wait(self) -> Result<()> {
        match self.outcome.await {
            Ok(result) => result.map_err(SdkError::from),
            Err(_) => Err(SdkError::QueueClosed),
        }
    }
}

struct Job {
    command: PendingCommand,
    reply: oneshot::Sender<aircon_protocol::Result<()>>,
}

/// FIFO command queue with a single drain task.
///
/// Must be created inside a tokio runtime.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use aircon_protocol::{AirconClient, ClientConfig, DeviceOptions, FanSpeed};
/// use aircon_sdk::{CommandQueue, QueueConfig};
///
/// # async fn run() -> aircon_sdk::Result<()> {
/// let client = Arc::new(AirconClient::new("192.168.1.40:7777".parse().unwrap(), ClientConfig::default()));
/// let queue = CommandQueue::new(client, QueueConfig::default());
///
/// let ticket = queue.enqueue_command(DeviceOptions::new().with_fan_speed(FanSpeed::Low))?;
/// ticket.wait().await?;
/// # Ok(())
/// # }
/// ```
pub struct CommandQueue {
    sender: mpsc::UnboundedSender<Job>,
    events: broadcast::Sender<QueueEvent>,
    next_id: AtomicU64,
    pending: Arc<AtomicUsize>,
    closed: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
    config: QueueConfig,
}

impl CommandQueue {
    pub fn new(sink: Arc<dyn CommandSink>, config: QueueConfig) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(config.event_buffer_size.max(1));
        let pending = Arc::new(AtomicUsize::new(0));

        let task = tokio::spawn(drain(
            sink,
            receiver,
            config.clone(),
            events.clone(),
            Arc::clone(&pending),
        ));

        Self {
            sender,
            events,
            next_id: AtomicU64::new(1),
            pending,
            closed: AtomicBool::new(false),
            task: Mutex::new(Some(task)),
            config,
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Append an option set to the queue.
    ///
    /// Safe to call from any number of tasks; commands run in the order they
    /// were enqueued.
    pub fn enqueue_command(&self, options: DeviceOptions) -> Result<CommandTicket> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SdkError::QueueClosed);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (reply, outcome) = oneshot::channel();
        let job = Job {
            command: PendingCommand { id, options },
            reply,
        };

        self.pending.fetch_add(1, Ordering::SeqCst);
        if self.sender.send(job).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(SdkError::QueueClosed);
        }

        tracing::debug!("Enqueued command {}", id);
        Ok(CommandTicket { id, outcome })
    }

    /// Commands enqueued and not yet completed, including the one in flight
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    pub fn is_idle(&self) -> bool {
        self.pending() == 0
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.events.subscribe()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Stop the drain task. Queued commands are discarded and their tickets
    /// resolve with [`SdkError::QueueClosed`]. Idempotent.
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
        self.pending.store(0, Ordering::SeqCst);
        tracing::debug!("Command queue shut down");
    }
}

impl Drop for CommandQueue {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for CommandQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandQueue")
            .field("pending", &self.pending())
            .field("closed", &self.is_closed())
            .finish()
    }
}

async fn drain(
    sink: Arc<dyn CommandSink>,
    mut receiver: mpsc::UnboundedReceiver<Job>,
    config: QueueConfig,
    events: broadcast::Sender<QueueEvent>,
    pending: Arc<AtomicUsize>,
) {
    let mut last_completed: Option<Instant> = None;

    while let Some(job) = receiver.recv().await {
        if let Some(completed) = last_completed {
            tokio::time::sleep_until(completed + config.min_command_delay).await;
        }

        let outcome = execute(sink.as_ref(), &job.command, &config, &events).await;
        last_completed = Some(Instant::now());

        // Saturating: shutdown may already have reset the count
        let _ = pending.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        // The caller may have dropped its ticket
        let _ = job.reply.send(outcome);
    }
}

async fn execute(
    sink: &dyn CommandSink,
    command: &PendingCommand,
    config: &QueueConfig,
    events: &broadcast::Sender<QueueEvent>,
) -> aircon_protocol::Result<()> {
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        let error = match sink.send_options(&command.options).await {
            Ok(()) => {
                tracing::debug!("Command {} executed after {} attempt(s)", command.id, attempt);
                let _ = events.send(QueueEvent::Executed {
                    command: command.clone(),
                    attempts: attempt,
                });
                return Ok(());
            }
            Err(error) => error,
        };

        if !error.is_retryable() {
            tracing::warn!("Command {} rejected: {}", command.id, error);
            let _ = events.send(QueueEvent::Rejected {
                command: command.clone(),
                error: error.to_string(),
            });
            return Err(error);
        }

        if attempt > config.max_retries {
            tracing::warn!(
                "Command {} dropped after {} attempts: {}",
                command.id,
                attempt,
                error
            );
            let _ = events.send(QueueEvent::MaxRetriesReached {
                command: command.clone(),
                attempts: attempt,
                error: error.to_string(),
            });
            return Err(error);
        }

        tracing::warn!(
            "Command {} failed (attempt {}/{}): {}",
            command.id,
            attempt,
            config.max_retries + 1,
            error
        );
        let _ = events.send(QueueEvent::Retry {
            command: command.clone(),
            attempt,
            error: error.to_string(),
        });
        tokio::time::sleep(config.retry_delay).await;
    }
}
