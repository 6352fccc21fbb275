//! Runtime queue - the FIFO buffer consumers block on
//!
//! Each queue owns its own critical section (one mutex per queue), so
//! enqueues against unrelated queues never contend. Blocking dequeue is
//! built on `tokio::sync::Notify`: no polling, no busy-wait.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use relayq_types::{Message, QueueInfo, QueueStats};
use tokio::sync::Notify;
use tracing::debug;

/// An in-memory FIFO queue
pub struct Queue {
    info: QueueInfo,
    buffer: Mutex<VecDeque<Message>>,
    available: Notify,
    enqueued: AtomicU64,
    dequeued: AtomicU64,
    consumer_attached: AtomicBool,
}

impl Queue {
    /// Create an empty queue for the given declaration
    pub fn new(info: QueueInfo) -> Self {
        Self {
            info,
            buffer: Mutex::new(VecDeque::new()),
            available: Notify::new(),
            enqueued: AtomicU64::new(0),
            dequeued: AtomicU64::new(0),
            consumer_attached: AtomicBool::new(false),
        }
    }

    /// Queue name
    pub fn name(&self) -> &str {
        &self.info.name
    }

    /// Declaration metadata
    pub fn info(&self) -> &QueueInfo {
        &self.info
    }

    /// Append a message to the tail and wake one waiting consumer
    pub fn enqueue(&self, message: Message) {
        debug!(queue = %self.info.name, message_id = %message.id, "Message enqueued");
        self.buffer.lock().push_back(message);
        self.enqueued.fetch_add(1, Ordering::Relaxed);
        self.available.notify_one();
    }

    /// Remove and return the head, suspending until a message is available.
    ///
    /// Removal is the auto-ack point: once this returns, the message is
    /// gone from the queue regardless of what the caller does with it.
    pub async fn dequeue(&self) -> Message {
        loop {
            // Register interest before checking the buffer so an enqueue
            // racing with the check cannot be missed.
            let notified = self.available.notified();
            if let Some(message) = self.try_dequeue() {
                return message;
            }
            notified.await;
        }
    }

    /// Remove and return the head if one is present
    pub fn try_dequeue(&self) -> Option<Message> {
        let message = self.buffer.lock().pop_front();
        if let Some(ref message) = message {
            self.dequeued.fetch_add(1, Ordering::Relaxed);
            debug!(queue = %self.info.name, message_id = %message.id, "Message dequeued");
        }
        message
    }

    /// Number of messages currently waiting
    pub fn depth(&self) -> u64 {
        self.buffer.lock().len() as u64
    }

    /// Current statistics snapshot
    pub fn stats(&self) -> QueueStats {
        QueueStats {
            depth: self.depth(),
            enqueued_total: self.enqueued.load(Ordering::Relaxed),
            dequeued_total: self.dequeued.load(Ordering::Relaxed),
            consumer_attached: self.consumer_attached.load(Ordering::Relaxed),
        }
    }

    /// Claim the single consumer slot. Returns false if already taken:
    /// the consume stream is non-restartable.
    pub(crate) fn try_attach_consumer(&self) -> bool {
        self.consumer_attached
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}
