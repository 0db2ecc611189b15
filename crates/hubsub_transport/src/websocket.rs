//! WebSocket transport
//!
//! Responsibilities:
//! - Accept TCP/WebSocket connections (refusing new ones while the broker
//!   is quiescing)
//! - Run one writer task per connection that serializes outbound frames
//! - Parse inbound JSON frames and route them to the broker
//! - On subscribe: ack, replay history, then start the delivery pump
//! - Unsubscribe everything a connection owned when it goes away, exactly
//!   once, whichever side notices first

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio_tungstenite::accept_async;
use tracing::{debug, error, info, warn};
use tungstenite::protocol::Message as WsMessage;
use uuid::Uuid;

use hubsub_broker::{run_delivery_pump, Broker, BrokerError, Outbound};
use hubsub_wire::{ClientFrame, ErrorCode, Message, RawMessage, ServerFrame};

/// Per-connection handle shared by the dispatch loop and its handlers.
pub(crate) struct Connection {
    sender: UnboundedSender<Outbound>,
    /// (topic, client_id) pairs subscribed on this socket, unsubscribed on
    /// close.
    subscriptions: Arc<Mutex<HashSet<(String, String)>>>,
}

impl Connection {
    pub(crate) fn new(sender: UnboundedSender<Outbound>) -> Self {
        Self {
            sender,
            subscriptions: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    fn send(&self, frame: ServerFrame) {
        // A closed channel means the writer is gone and the read loop is
        // about to find out; nothing useful to do with the error here.
        let _ = self.sender.send(Outbound::Frame(frame));
    }

    fn track(&self, topic: &str, client_id: &str) {
        self.subscriptions
            .lock()
            .unwrap()
            .insert((topic.to_string(), client_id.to_string()));
    }

    fn untrack(&self, topic: &str, client_id: &str) {
        self.subscriptions
            .lock()
            .unwrap()
            .remove(&(topic.to_string(), client_id.to_string()));
    }
}

pub async fn start_websocket_server(addr: String, broker: Arc<Broker>) {
    let listener = TcpListener::bind(addr.clone()).await.expect("Can't bind");

    info!("WebSocket server listening on ws://{addr}");

    while let Ok((stream, peer)) = listener.accept().await {
        if broker.is_shutting_down() {
            warn!(%peer, "rejecting connection, server is shutting down");
            continue;
        }
        let broker = Arc::clone(&broker);
        tokio::spawn(handle_connection(stream, broker));
    }
}

async fn handle_connection(stream: TcpStream, broker: Arc<Broker>) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            error!("WebSocket handshake error: {e}");
            return;
        }
    };
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Outbound>();
    let connection = Connection::new(tx);
    let connection_id = Uuid::new_v4();
    info!(%connection_id, "connection established");

    let cleanup_called = Arc::new(AtomicBool::new(false));

    {
        let broker = Arc::clone(&broker);
        let subscriptions = Arc::clone(&connection.subscriptions);
        let cleanup_called = Arc::clone(&cleanup_called);

        tokio::spawn(async move {
            while let Some(outbound) = rx.recv().await {
                match outbound {
                    Outbound::Frame(frame) => {
                        let text = match serde_json::to_string(&frame) {
                            Ok(json) => json,
                            Err(e) => {
                                error!(%connection_id, "failed to serialize frame: {e}");
                                continue;
                            }
                        };
                        if let Err(e) = ws_sender.send(WsMessage::text(text)).await {
                            info!(%connection_id, "send loop closed: {e}");
                            break;
                        }
                    }
                    Outbound::Close => {
                        let _ = ws_sender.send(WsMessage::Close(None)).await;
                        break;
                    }
                }
            }
            cleanup(&broker, &subscriptions, &cleanup_called).await;
        });
    }

    while let Some(Ok(msg)) = ws_receiver.next().await {
        if !msg.is_text() {
            continue;
        }
        let Ok(text) = msg.to_text() else { continue };
        dispatch(&broker, &connection, text).await;
    }

    cleanup(&broker, &connection.subscriptions, &cleanup_called).await;
    info!(%connection_id, "connection closed");
}

/// Unsubscribe everything this connection owned. Runs at most once even
/// though both the read loop and the writer can get here.
async fn cleanup(
    broker: &Broker,
    subscriptions: &Mutex<HashSet<(String, String)>>,
    cleanup_called: &AtomicBool,
) {
    if cleanup_called.swap(true, Ordering::SeqCst) {
        return;
    }
    let owned: Vec<(String, String)> = subscriptions.lock().unwrap().drain().collect();
    for (topic, client_id) in owned {
        match broker.unsubscribe(&topic, &client_id).await {
            Ok(_) => debug!(%client_id, %topic, "unsubscribed on close"),
            // The topic may have been deleted in the meantime.
            Err(err) => debug!(%client_id, %topic, %err, "cleanup unsubscribe skipped"),
        }
    }
}

/// Parse one inbound text frame and route it. Every rejected frame earns
/// exactly one `error` response carrying the client's `request_id` when we
/// managed to parse that far.
pub(crate) async fn dispatch(broker: &Broker, connection: &Connection, text: &str) {
    match serde_json::from_str::<ClientFrame>(text) {
        Ok(ClientFrame::Subscribe {
            topic,
            client_id,
            last_n,
            request_id,
        }) => handle_subscribe(broker, connection, topic, client_id, last_n, request_id).await,
        Ok(ClientFrame::Unsubscribe {
            topic,
            client_id,
            request_id,
        }) => handle_unsubscribe(broker, connection, topic, client_id, request_id).await,
        Ok(ClientFrame::Publish {
            topic,
            message,
            request_id,
        }) => handle_publish(broker, connection, topic, message, request_id).await,
        Ok(ClientFrame::Ping { request_id }) => {
            connection.send(ServerFrame::pong(request_id));
        }
        Err(err) => {
            warn!(
                "invalid client frame: {err} | {}",
                text.chars().take(100).collect::<String>()
            );
            connection.send(ServerFrame::error(
                ErrorCode::BadRequest,
                format!("invalid frame: {err}"),
                None,
            ));
        }
    }
}

async fn handle_subscribe(
    broker: &Broker,
    connection: &Connection,
    topic: String,
    client_id: String,
    last_n: usize,
    request_id: Option<String>,
) {
    match broker
        .subscribe(&topic, &client_id, connection.sender.clone(), last_n)
        .await
    {
        Ok((subscriber, history)) => {
            connection.track(&topic, &client_id);
            connection.send(ServerFrame::ack(Some(topic.clone()), request_id));
            // Replay strictly precedes live delivery: the pump only starts
            // once the snapshot is on the wire.
            for entry in history {
                connection.send(ServerFrame::event(topic.clone(), entry.message, entry.ts));
            }
            tokio::spawn(run_delivery_pump(subscriber));
            info!(%client_id, %topic, "subscribed");
        }
        Err(err) => connection.send(error_frame(err, request_id)),
    }
}

async fn handle_unsubscribe(
    broker: &Broker,
    connection: &Connection,
    topic: String,
    client_id: String,
    request_id: Option<String>,
) {
    match broker.unsubscribe(&topic, &client_id).await {
        Ok(removed) => {
            connection.untrack(&topic, &client_id);
            if removed {
                info!(%client_id, %topic, "unsubscribed");
            }
            connection.send(ServerFrame::ack(Some(topic), request_id));
        }
        Err(err) => connection.send(error_frame(err, request_id)),
    }
}

async fn handle_publish(
    broker: &Broker,
    connection: &Connection,
    topic: String,
    raw: RawMessage,
    request_id: Option<String>,
) {
    let message = match Message::try_from(raw) {
        Ok(message) => message,
        Err(_) => {
            connection.send(ServerFrame::error(
                ErrorCode::BadRequest,
                "message.id must be a valid UUID",
                request_id,
            ));
            return;
        }
    };
    match broker.publish(&topic, message).await {
        Ok(delivered) => {
            debug!(%topic, delivered, "published");
            connection.send(ServerFrame::ack(Some(topic), request_id));
        }
        Err(err) => connection.send(error_frame(err, request_id)),
    }
}

fn error_frame(err: BrokerError, request_id: Option<String>) -> ServerFrame {
    let code = match &err {
        BrokerError::TopicNotFound(_) => ErrorCode::TopicNotFound,
        BrokerError::TopicExists(_) | BrokerError::DuplicateSubscriber { .. } => {
            ErrorCode::BadRequest
        }
        BrokerError::ShuttingDown => ErrorCode::Internal,
    };
    ServerFrame::error(code, err.to_string(), request_id)
}
