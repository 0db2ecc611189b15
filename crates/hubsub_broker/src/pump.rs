//! Delivery pump
//!
//! One pump task runs per active subscription. It drains the subscriber's
//! queue, turns each frame into an outbound `event`, and hands it to the
//! connection's writer. The pump never touches topic state; a failed emit
//! terminates this pump only.

use std::sync::Arc;

use tracing::{error, info};

use hubsub_wire::ServerFrame;

use crate::subscriber::Subscriber;

/// Drain `subscriber`'s queue until it is deactivated (and drained) or the
/// connection is gone. Spawned by the transport right after a successful
/// subscribe, once history replay has been emitted.
pub async fn run_delivery_pump(subscriber: Arc<Subscriber>) {
    while let Some(frame) = subscriber.next().await {
        let event = ServerFrame::event(frame.topic, frame.message, frame.ts);
        if subscriber.send_frame(event).is_err() {
            // Writer is gone; stop accepting fan-out for this subscriber.
            subscriber.deactivate();
            error!(
                client_id = %subscriber.client_id(),
                "delivery emit failed, stopping pump"
            );
            break;
        }
    }
    info!(client_id = %subscriber.client_id(), "delivery pump stopped");
}
