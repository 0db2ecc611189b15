//! Subscriber sessions
//!
//! A `Subscriber` represents one connected consumer of one topic. It owns a
//! bounded FIFO delivery queue fed by topic fan-out and drained by a single
//! delivery pump, plus the sending half of its connection's outbound channel
//! for emits that bypass the queue (history replay, lifecycle `info`
//! frames, transport close).
//!
//! The queue is written by exactly one producer context (fan-out, which
//! runs serialized under the topic lock) and read by exactly one consumer
//! (the pump), so a plain mutex-guarded `VecDeque` plus a `Notify` is all
//! the synchronization it needs.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::error::SendError;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Notify;
use tracing::warn;

use hubsub_config::OverflowPolicy;
use hubsub_wire::{Message, ServerFrame};

/// What a connection's writer task receives from the broker side.
#[derive(Debug)]
pub enum Outbound {
    /// Serialize and send this frame.
    Frame(ServerFrame),
    /// Close the WebSocket and stop the writer.
    Close,
}

/// One message scheduled for delivery to one subscriber. The timestamp is
/// the one assigned when the message was published.
#[derive(Debug, Clone)]
pub struct DeliveryFrame {
    pub topic: String,
    pub message: Message,
    pub ts: DateTime<Utc>,
}

/// Outcome of a non-blocking [`Subscriber::enqueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueResult {
    /// Inserted with free capacity remaining beforehand.
    Delivered,
    /// Queue was full; the oldest frame was evicted to make room.
    DroppedOldest,
    /// Subscriber is inactive (or its queue is unusable); nothing inserted.
    Rejected,
    /// Queue is full and the policy is [`OverflowPolicy::Disconnect`];
    /// nothing inserted, caller tears the subscriber down.
    Overflowed,
}

#[derive(Debug)]
pub struct Subscriber {
    client_id: String,
    sender: UnboundedSender<Outbound>,
    queue: Mutex<VecDeque<DeliveryFrame>>,
    capacity: usize,
    policy: OverflowPolicy,
    notify: Notify,
    active: AtomicBool,
}

impl Subscriber {
    pub fn new(
        client_id: impl Into<String>,
        sender: UnboundedSender<Outbound>,
        capacity: usize,
        policy: OverflowPolicy,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            sender,
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            policy,
            notify: Notify::new(),
            active: AtomicBool::new(true),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Non-blocking insert into the delivery queue.
    ///
    /// Runs under the topic lock during fan-out; never awaits.
    pub fn enqueue(&self, frame: DeliveryFrame) -> EnqueueResult {
        if !self.is_active() {
            return EnqueueResult::Rejected;
        }
        let Ok(mut queue) = self.queue.lock() else {
            return EnqueueResult::Rejected;
        };
        let mut result = EnqueueResult::Delivered;
        if queue.len() >= self.capacity {
            match self.policy {
                OverflowPolicy::Disconnect => return EnqueueResult::Overflowed,
                OverflowPolicy::DropOldest => {
                    queue.pop_front();
                    warn!(
                        client_id = %self.client_id,
                        topic = %frame.topic,
                        "subscriber queue full, dropping oldest message"
                    );
                    result = EnqueueResult::DroppedOldest;
                }
            }
        }
        queue.push_back(frame);
        drop(queue);
        self.notify.notify_one();
        result
    }

    /// Blocking dequeue used by the delivery pump.
    ///
    /// Resolves `None` once the subscriber has been deactivated and the
    /// queue drained. Deactivation wakes a parked caller promptly.
    pub async fn next(&self) -> Option<DeliveryFrame> {
        loop {
            {
                let mut queue = self
                    .queue
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                if let Some(frame) = queue.pop_front() {
                    return Some(frame);
                }
                if !self.is_active() {
                    return None;
                }
            }
            self.notify.notified().await;
        }
    }

    /// After this, `enqueue` rejects and a parked `next` caller wakes up.
    pub fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
        self.notify.notify_one();
    }

    /// Emit a frame directly on the connection, bypassing the delivery
    /// queue. Used for lifecycle `info` frames and by the pump itself.
    pub fn send_frame(&self, frame: ServerFrame) -> Result<(), SendError<Outbound>> {
        self.sender.send(Outbound::Frame(frame))
    }

    /// Ask the connection's writer to close the WebSocket. A missing writer
    /// means the transport is already gone, which is fine.
    pub fn close_transport(&self) {
        let _ = self.sender.send(Outbound::Close);
    }

    pub fn queue_len(&self) -> usize {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
