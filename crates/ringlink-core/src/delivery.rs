//! Delivery queue
//!
//! Serializes every outbound message to the display. One message is in
//! flight at a time and messages leave in the order they were enqueued.
//! A failed attempt is retried after a fixed delay until the attempt budget
//! is spent, then the message is dropped and the queue moves on.

use ringlink_adapter_api::{DisplayTransport, TransportError};
use ringlink_api::DisplayMessage;
use ringlink_config::DeliveryConfig;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Retry budget for one message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryPolicy {
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay: Duration::from_millis(250),
        }
    }
}

impl From<&DeliveryConfig> for DeliveryPolicy {
    fn from(config: &DeliveryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            retry_delay: config.retry_delay,
        }
    }
}

/// Terminal state of one queued message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered { attempts: u32 },
    Dropped { attempts: u32, error: TransportError },
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }
}

type Completion = Box<dyn FnOnce(DeliveryOutcome) + Send>;

struct QueuedMessage {
    message: DisplayMessage,
    complete: Completion,
}

/// Handle to the delivery worker. Cheap to clone; the worker stops once
/// every handle is dropped and the backlog is drained.
#[derive(Clone)]
pub struct DeliveryQueue {
    tx: mpsc::UnboundedSender<QueuedMessage>,
    pending: Arc<AtomicUsize>,
}

impl DeliveryQueue {
    /// Start the worker on the current runtime
    pub fn spawn(transport: Arc<dyn DisplayTransport>, policy: DeliveryPolicy) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(0));

        let handle = tokio::spawn(run_worker(rx, transport, policy, pending.clone()));

        (Self { tx, pending }, handle)
    }

    /// Enqueue with continuations run on the worker once the message is
    /// delivered or dropped
    pub fn enqueue_with<S, F>(&self, message: DisplayMessage, on_success: S, on_failure: F)
    where
        S: FnOnce() + Send + 'static,
        F: FnOnce(TransportError) + Send + 'static,
    {
        self.push(
            message,
            Box::new(move |outcome| match outcome {
                DeliveryOutcome::Delivered { .. } => on_success(),
                DeliveryOutcome::Dropped { error, .. } => on_failure(error),
            }),
        );
    }

    /// Enqueue and get a receipt that resolves to the outcome
    pub fn enqueue(&self, message: DisplayMessage) -> DeliveryReceipt {
        let (tx, rx) = oneshot::channel();
        self.push(
            message,
            Box::new(move |outcome| {
                let _ = tx.send(outcome);
            }),
        );
        DeliveryReceipt { rx }
    }

    /// Messages enqueued but not yet resolved
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    fn push(&self, message: DisplayMessage, complete: Completion) {
        self.pending.fetch_add(1, Ordering::SeqCst);
        if let Err(mpsc::error::SendError(item)) = self.tx.send(QueuedMessage { message, complete }) {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            warn!("Delivery worker is gone, dropping message");
            (item.complete)(DeliveryOutcome::Dropped {
                attempts: 0,
                error: TransportError::Closed,
            });
        }
    }
}

/// Resolves once the message is delivered or dropped
pub struct DeliveryReceipt {
    rx: oneshot::Receiver<DeliveryOutcome>,
}

impl DeliveryReceipt {
    pub async fn wait(self) -> DeliveryOutcome {
        self.rx.await.unwrap_or(DeliveryOutcome::Dropped {
            attempts: 0,
            error: TransportError::Closed,
        })
    }
}

async fn run_worker(
    mut rx: mpsc::UnboundedReceiver<QueuedMessage>,
    transport: Arc<dyn DisplayTransport>,
    policy: DeliveryPolicy,
    pending: Arc<AtomicUsize>,
) {
    debug!(
        max_attempts = policy.max_attempts,
        retry_delay_ms = policy.retry_delay.as_millis() as u64,
        "Delivery worker started"
    );

    while let Some(item) = rx.recv().await {
        let outcome = deliver(transport.as_ref(), &item.message, policy).await;
        pending.fetch_sub(1, Ordering::SeqCst);
        (item.complete)(outcome);
    }

    debug!("Delivery worker stopped");
}

/// Attempt one message until it is delivered or the budget is spent
async fn deliver(
    transport: &dyn DisplayTransport,
    message: &DisplayMessage,
    policy: DeliveryPolicy,
) -> DeliveryOutcome {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempts = 0;

    loop {
        attempts += 1;
        match transport.send(message).await {
            Ok(()) => {
                debug!(attempts, keys = message.len(), "Message delivered");
                return DeliveryOutcome::Delivered { attempts };
            }
            Err(error) if attempts < max_attempts => {
                warn!(attempt = attempts, error = %error, "Delivery failed, retrying");
                tokio::time::sleep(policy.retry_delay).await;
            }
            Err(error) => {
                info!(attempts, error = %error, "Delivery failed, dropping message");
                return DeliveryOutcome::Dropped { attempts, error };
            }
        }
    }
}
