//! Consumer loop - pulls messages off one queue and simulates work
//!
//! The loop alternates WAITING (parked on `Queue::dequeue`) and
//! PROCESSING (sleeping out the simulated work). Dequeue is the auto-ack
//! point: the message has already left the queue when processing starts,
//! so a crash mid-processing loses it. At-most-once is the contract here;
//! it is not silently upgraded.

use std::sync::Arc;
use std::time::Duration;

use relayq_types::MessageId;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::queue::Queue;

/// Body byte whose occurrences are interpreted as units of simulated work
pub const PROCESSING_MARKER: u8 = b'.';

/// Observable consumer signals, one pair per message.
///
/// Timestamps use `tokio::time::Instant` so tests under a paused clock
/// can measure the processing interval exactly.
#[derive(Debug, Clone, PartialEq)]
pub enum ConsumerEvent {
    /// Emitted immediately after dequeue, before any processing
    Received { message_id: MessageId, at: Instant },
    /// Emitted once the simulated processing delay has elapsed
    Done { message_id: MessageId, at: Instant },
}

impl ConsumerEvent {
    /// Timestamp of the event
    pub fn at(&self) -> Instant {
        match self {
            ConsumerEvent::Received { at, .. } | ConsumerEvent::Done { at, .. } => *at,
        }
    }

    /// Message the event belongs to
    pub fn message_id(&self) -> MessageId {
        match self {
            ConsumerEvent::Received { message_id, .. }
            | ConsumerEvent::Done { message_id, .. } => *message_id,
        }
    }
}

/// Consumer tuning
#[derive(Debug, Clone)]
pub struct ConsumerOptions {
    /// Simulated work per marker occurrence. One second by default;
    /// tests shrink it or run under a paused clock.
    pub marker_delay: Duration,
}

impl Default for ConsumerOptions {
    fn default() -> Self {
        Self {
            marker_delay: Duration::from_secs(1),
        }
    }
}

/// Handle owning a spawned consumer task.
///
/// `stop` is the explicit shutdown path; dropping the handle also stops
/// the loop (the watch sender goes away).
#[derive(Debug)]
pub struct ConsumerHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ConsumerHandle {
    /// Signal the loop to terminate at its next suspension point
    pub fn stop(&self) {
        let _ = self.stop.send(true);
    }

    /// Wait for the loop task to finish
    pub async fn join(self) {
        let _ = self.task.await;
    }
}

/// Spawn a consumer loop on `queue`.
///
/// Returns the task handle and the receiving end of the event stream.
pub(crate) fn spawn(
    queue: Arc<Queue>,
    options: ConsumerOptions,
) -> (ConsumerHandle, mpsc::UnboundedReceiver<ConsumerEvent>) {
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (stop_tx, stop_rx) = watch::channel(false);

    info!(queue = %queue.name(), "Consumer attached");
    let task = tokio::spawn(run(queue, options, events_tx, stop_rx));

    (
        ConsumerHandle {
            stop: stop_tx,
            task,
        },
        events_rx,
    )
}

async fn run(
    queue: Arc<Queue>,
    options: ConsumerOptions,
    events: mpsc::UnboundedSender<ConsumerEvent>,
    mut stop: watch::Receiver<bool>,
) {
    loop {
        // WAITING: dequeue is the only suspension point while idle.
        let message = tokio::select! {
            _ = stop.changed() => break,
            message = queue.dequeue() => message,
        };

        // The message left the queue at dequeue: implicit, unconditional
        // ack before processing. Nothing below can bring it back.
        let _ = events.send(ConsumerEvent::Received {
            message_id: message.id,
            at: Instant::now(),
        });
        debug!(
            queue = %queue.name(),
            message_id = %message.id,
            body = message.body_as_str().unwrap_or("<non-utf8>"),
            "Received message"
        );

        // PROCESSING: one marker_delay per marker byte in the body.
        let units = message.marker_count(PROCESSING_MARKER) as u32;
        let delay = options.marker_delay * units;
        if !delay.is_zero() {
            tokio::select! {
                _ = stop.changed() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        let _ = events.send(ConsumerEvent::Done {
            message_id: message.id,
            at: Instant::now(),
        });
        debug!(queue = %queue.name(), message_id = %message.id, "Done");
    }

    info!(queue = %queue.name(), "Consumer stopped");
}
