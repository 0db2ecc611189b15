//! hubsub_broker
//!
//! The broker crate contains the in-memory pub/sub core: the topic
//! registry, per-topic subscriber sets, bounded delivery queues with the
//! configured overflow policy, the replay history ring, the per-subscription
//! delivery pump, and the graceful-shutdown sequence.
//!
//! Public types:
//! - `Broker`: process-wide registry and coordinator of topics.
//! - `Subscriber`: one connected consumer of one topic, with its queue.
//! - `run_delivery_pump`: drain task started per active subscription.
//!
//! This crate is intended to be used by transport crates (the WebSocket
//! server, the control-plane API) or by binaries that wire together network
//! and configuration.
//!
//! Locking is strictly top-down: registry lock, then a single topic's lock,
//! then a subscriber queue. The registry lock is only ever held long enough
//! to resolve an `Arc<Topic>`.

pub mod engine;
pub mod pump;
pub mod subscriber;
pub mod topic;

pub use engine::{Broker, BrokerError, TopicStats, TopicSummary};
pub use pump::run_delivery_pump;
pub use subscriber::{DeliveryFrame, EnqueueResult, Outbound, Subscriber};
pub use topic::{HistoryEntry, Topic};

#[cfg(test)]
mod tests;
