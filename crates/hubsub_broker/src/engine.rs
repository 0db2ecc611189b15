//! Broker engine
//!
//! The process-wide registry mapping topic names to topics, plus the
//! operations the transports drive: create/delete topic, subscribe,
//! unsubscribe, publish, list, stats, uptime, and graceful shutdown.
//!
//! Concurrency notes:
//! - The registry lock protects only the topic map. Operations resolve the
//!   `Arc<Topic>` under it and release it before touching the topic's own
//!   lock, so a slow publish on one topic never blocks registry reads.
//! - `delete_topic` notifies live subscribers through their transport
//!   handles directly, bypassing the delivery queues; a failed emit is
//!   logged and never aborts the deletion.
//! - Once `shutdown` has begun, new subscribes, publishes and topic
//!   creations are refused with `BrokerError::ShuttingDown`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::RwLock;
use tracing::{error, info};

use hubsub_config::BrokerSettings;
use hubsub_wire::{Message, ServerFrame, INFO_SERVER_SHUTDOWN, INFO_TOPIC_DELETED};

use crate::subscriber::{Outbound, Subscriber};
use crate::topic::{HistoryEntry, Topic};

pub type Result<T> = std::result::Result<T, BrokerError>;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum BrokerError {
    #[error("topic not found: {0}")]
    TopicNotFound(String),
    #[error("topic already exists: {0}")]
    TopicExists(String),
    #[error("client {client_id} is already subscribed to topic {topic}")]
    DuplicateSubscriber { topic: String, client_id: String },
    #[error("server is shutting down")]
    ShuttingDown,
}

/// One row of [`Broker::list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSummary {
    pub name: String,
    pub subscribers: usize,
}

/// One entry of [`Broker::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopicStats {
    pub messages: u64,
    pub subscribers: usize,
}

#[derive(Debug)]
pub struct Broker {
    topics: RwLock<HashMap<String, Arc<Topic>>>,
    settings: BrokerSettings,
    started_at: Instant,
    shutting_down: AtomicBool,
}

impl Broker {
    pub fn new(settings: BrokerSettings) -> Self {
        info!(
            queue_capacity = settings.max_subscriber_queue_size,
            history_capacity = settings.topic_history_size,
            "broker initialized"
        );
        Self {
            topics: RwLock::new(HashMap::new()),
            settings,
            started_at: Instant::now(),
            shutting_down: AtomicBool::new(false),
        }
    }

    pub fn settings(&self) -> &BrokerSettings {
        &self.settings
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    pub async fn create_topic(&self, name: &str) -> Result<()> {
        if self.is_shutting_down() {
            return Err(BrokerError::ShuttingDown);
        }
        let mut topics = self.topics.write().await;
        if topics.contains_key(name) {
            return Err(BrokerError::TopicExists(name.to_string()));
        }
        topics.insert(
            name.to_string(),
            Arc::new(Topic::new(name, self.settings.topic_history_size)),
        );
        info!(topic = %name, total = topics.len(), "topic created");
        Ok(())
    }

    /// Remove the topic, then notify and deactivate every subscriber it
    /// had. The `info` frame goes straight through the transport handle so
    /// it arrives even when a delivery queue is backed up.
    pub async fn delete_topic(&self, name: &str) -> Result<()> {
        let removed = { self.topics.write().await.remove(name) };
        let Some(topic) = removed else {
            return Err(BrokerError::TopicNotFound(name.to_string()));
        };
        for subscriber in topic.drain_subscribers() {
            if let Err(err) = subscriber.send_frame(ServerFrame::info(
                Some(name.to_string()),
                INFO_TOPIC_DELETED,
            )) {
                error!(
                    client_id = %subscriber.client_id(),
                    topic = %name,
                    %err,
                    "failed to notify subscriber of topic deletion"
                );
            }
            subscriber.deactivate();
        }
        info!(topic = %name, "topic deleted");
        Ok(())
    }

    /// Register a new subscriber on `topic` and return it together with the
    /// history snapshot for `last_n`. The caller is responsible for
    /// emitting the ack, replaying the snapshot, and starting a delivery
    /// pump for the returned subscriber.
    pub async fn subscribe(
        &self,
        topic: &str,
        client_id: &str,
        sender: UnboundedSender<Outbound>,
        last_n: usize,
    ) -> Result<(Arc<Subscriber>, Vec<HistoryEntry>)> {
        if self.is_shutting_down() {
            return Err(BrokerError::ShuttingDown);
        }
        let topic = self.get_topic(topic).await?;
        let subscriber = Arc::new(Subscriber::new(
            client_id,
            sender,
            self.settings.max_subscriber_queue_size,
            self.settings.overflow_policy,
        ));
        let history = topic.join(Arc::clone(&subscriber), last_n)?;
        Ok((subscriber, history))
    }

    /// Returns whether a subscriber was actually removed; the delivery pump
    /// observes the deactivation and exits on its own.
    pub async fn unsubscribe(&self, topic: &str, client_id: &str) -> Result<bool> {
        let topic = self.get_topic(topic).await?;
        Ok(topic.remove_subscriber(client_id))
    }

    pub async fn publish(&self, topic: &str, message: Message) -> Result<usize> {
        if self.is_shutting_down() {
            return Err(BrokerError::ShuttingDown);
        }
        let topic = self.get_topic(topic).await?;
        Ok(topic.publish(message))
    }

    pub async fn list(&self) -> Vec<TopicSummary> {
        let topics = self.topics.read().await;
        let mut summaries: Vec<_> = topics
            .values()
            .map(|topic| TopicSummary {
                name: topic.name().to_string(),
                subscribers: topic.subscriber_count(),
            })
            .collect();
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        summaries
    }

    pub async fn stats(&self) -> HashMap<String, TopicStats> {
        let topics = self.topics.read().await;
        topics
            .iter()
            .map(|(name, topic)| {
                (
                    name.clone(),
                    TopicStats {
                        messages: topic.message_count(),
                        subscribers: topic.subscriber_count(),
                    },
                )
            })
            .collect()
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub async fn topic_count(&self) -> usize {
        self.topics.read().await.len()
    }

    pub async fn total_subscribers(&self) -> usize {
        let topics = self.topics.read().await;
        topics.values().map(|topic| topic.subscriber_count()).sum()
    }

    /// Graceful shutdown: quiesce new work, tell every subscriber, give the
    /// pumps `drain_window` to empty their queues, then deactivate
    /// everything and close the transports. Emit failures are logged and
    /// never block progress.
    pub async fn shutdown(&self, drain_window: Duration) {
        self.shutting_down.store(true, Ordering::Release);

        let topics: Vec<Arc<Topic>> = self.topics.read().await.values().cloned().collect();
        let mut notified = 0usize;
        for topic in &topics {
            for subscriber in topic.subscribers() {
                match subscriber.send_frame(ServerFrame::info(
                    Some(topic.name().to_string()),
                    INFO_SERVER_SHUTDOWN,
                )) {
                    Ok(()) => notified += 1,
                    Err(err) => error!(
                        client_id = %subscriber.client_id(),
                        topic = %topic.name(),
                        %err,
                        "failed to notify subscriber of shutdown"
                    ),
                }
            }
        }
        info!(subscribers = notified, "shutdown notifications sent");

        tokio::time::sleep(drain_window).await;

        for topic in &topics {
            for subscriber in topic.drain_subscribers() {
                subscriber.deactivate();
                subscriber.close_transport();
            }
        }
        info!(topics = topics.len(), "broker shut down");
    }

    async fn get_topic(&self, name: &str) -> Result<Arc<Topic>> {
        self.topics
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| BrokerError::TopicNotFound(name.to_string()))
    }
}
