//! Topic management
//!
//! A `Topic` holds the subscriber set for one named channel, keyed by
//! client id, together with the bounded history ring used for `last_n`
//! replay and a monotonic publish counter.
//!
//! All state lives behind one mutex so that a publish (history append plus
//! fan-out) is atomic with respect to any other publish, history read, or
//! subscriber change on the same topic. Fan-out only performs non-blocking
//! enqueues, so the lock is never held across an await point.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tracing::{error, info};

use hubsub_wire::{ErrorCode, Message, ServerFrame};

use crate::engine::BrokerError;
use crate::subscriber::{DeliveryFrame, EnqueueResult, Subscriber};

/// One entry in a topic's replay ring.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub message: Message,
    pub ts: DateTime<Utc>,
}

#[derive(Debug)]
pub struct Topic {
    name: String,
    history_capacity: usize,
    state: Mutex<TopicState>,
}

#[derive(Debug, Default)]
struct TopicState {
    subscribers: HashMap<String, Arc<Subscriber>>,
    history: VecDeque<HistoryEntry>,
    message_count: u64,
}

impl Topic {
    pub fn new(name: &str, history_capacity: usize) -> Self {
        Self {
            name: name.to_string(),
            history_capacity,
            state: Mutex::new(TopicState::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> MutexGuard<'_, TopicState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot up to `last_n` history entries and insert the subscriber
    /// under the same lock acquisition, in that order. The snapshot is
    /// therefore a strict prefix of the live stream the subscriber will
    /// see: nothing is duplicated across the replay/live boundary.
    ///
    /// A `client_id` already present on this topic is rejected.
    pub fn join(
        &self,
        subscriber: Arc<Subscriber>,
        last_n: usize,
    ) -> Result<Vec<HistoryEntry>, BrokerError> {
        let mut state = self.state();
        if state.subscribers.contains_key(subscriber.client_id()) {
            return Err(BrokerError::DuplicateSubscriber {
                topic: self.name.clone(),
                client_id: subscriber.client_id().to_string(),
            });
        }
        let history = Self::tail(&state.history, last_n);
        let client_id = subscriber.client_id().to_string();
        state.subscribers.insert(client_id.clone(), subscriber);
        info!(
            topic = %self.name,
            %client_id,
            total = state.subscribers.len(),
            "subscriber added"
        );
        Ok(history)
    }

    /// Remove and deactivate a subscriber. Returns whether one was removed.
    pub fn remove_subscriber(&self, client_id: &str) -> bool {
        let mut state = self.state();
        match state.subscribers.remove(client_id) {
            Some(subscriber) => {
                subscriber.deactivate();
                info!(
                    topic = %self.name,
                    %client_id,
                    remaining = state.subscribers.len(),
                    "subscriber removed"
                );
                true
            }
            None => false,
        }
    }

    /// Append to history, bump the counter, and fan out to every active
    /// subscriber. Returns the number of subscribers that accepted the
    /// frame (with or without evicting their oldest entry).
    pub fn publish(&self, message: Message) -> usize {
        let mut state = self.state();
        let ts = Utc::now();

        if state.history.len() >= self.history_capacity {
            state.history.pop_front();
        }
        state.history.push_back(HistoryEntry {
            message: message.clone(),
            ts,
        });
        state.message_count += 1;

        let mut accepted = 0;
        let mut disconnected: Vec<String> = Vec::new();
        for subscriber in state.subscribers.values() {
            if !subscriber.is_active() {
                continue;
            }
            let frame = DeliveryFrame {
                topic: self.name.clone(),
                message: message.clone(),
                ts,
            };
            match subscriber.enqueue(frame) {
                EnqueueResult::Delivered | EnqueueResult::DroppedOldest => accepted += 1,
                EnqueueResult::Rejected => {}
                EnqueueResult::Overflowed => {
                    // Disconnect-on-full: one slow_consumer error, then the
                    // transport goes away.
                    if let Err(err) = subscriber.send_frame(ServerFrame::error(
                        ErrorCode::SlowConsumer,
                        "subscriber queue full",
                        None,
                    )) {
                        error!(
                            client_id = %subscriber.client_id(),
                            topic = %self.name,
                            %err,
                            "failed to notify slow consumer"
                        );
                    }
                    subscriber.close_transport();
                    subscriber.deactivate();
                    disconnected.push(subscriber.client_id().to_string());
                }
            }
        }
        for client_id in disconnected {
            state.subscribers.remove(&client_id);
        }

        info!(
            topic = %self.name,
            delivered = accepted,
            subscribers = state.subscribers.len(),
            "message published"
        );
        accepted
    }

    /// Up to the last `last_n` entries, oldest first. A consistent snapshot:
    /// concurrent publishes wait on the topic lock.
    pub fn history(&self, last_n: usize) -> Vec<HistoryEntry> {
        Self::tail(&self.state().history, last_n)
    }

    fn tail(history: &VecDeque<HistoryEntry>, last_n: usize) -> Vec<HistoryEntry> {
        if last_n == 0 {
            return Vec::new();
        }
        let skip = history.len().saturating_sub(last_n);
        history.iter().skip(skip).cloned().collect()
    }

    pub fn subscriber_count(&self) -> usize {
        self.state().subscribers.len()
    }

    pub fn message_count(&self) -> u64 {
        self.state().message_count
    }

    /// Snapshot of the current subscribers, for broadcast-style operations.
    pub fn subscribers(&self) -> Vec<Arc<Subscriber>> {
        self.state().subscribers.values().cloned().collect()
    }

    /// Remove and return every subscriber, leaving the topic empty.
    pub(crate) fn drain_subscribers(&self) -> Vec<Arc<Subscriber>> {
        self.state().subscribers.drain().map(|(_, s)| s).collect()
    }
}
