//! CLI for hubsub
//!
//! Subcommands:
//! - `server`: run the WebSocket broker plus the control-plane REST API
//! - `client`: run a simple smoke-test client (subscribe, publish, print)

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};

use hubsub_broker::Broker;
use hubsub_config::load_config;
use hubsub_http::{build_router, AppState};
use hubsub_transport::websocket::start_websocket_server;

#[derive(Parser)]
#[command(name = "hubsub")]
enum Command {
    /// Start the broker: WebSocket listener plus control-plane API
    Server,
    /// Run a smoke-test client (connect, subscribe, publish, print frames)
    Client {
        /// WebSocket server URL to connect to
        #[arg(long, default_value = "ws://127.0.0.1:8080")]
        url: String,
        /// Topic to subscribe and publish to (must already exist)
        #[arg(long, default_value = "demo")]
        topic: String,
    },
}

#[tokio::main]
async fn main() {
    let cmd = Command::parse();

    match cmd {
        Command::Server => {
            if let Err(e) = run_server().await {
                error!("Server failed: {e}");
            }
        }
        Command::Client { url, topic } => {
            hubsub_utils::logging::init("info");
            if let Err(e) = run_client(&url, &topic).await {
                error!("Client failed: {e}");
            }
        }
    }
}

async fn run_server() -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    hubsub_utils::logging::init(&config.server.log_level);

    let ws_addr = format!("{}:{}", config.server.host, config.server.port);
    let http_addr = format!("{}:{}", config.server.host, config.server.http_port);
    let drain_window = Duration::from_secs(config.broker.shutdown_drain_secs);

    let broker = Arc::new(Broker::new(config.broker.clone()));

    let router = build_router(AppState {
        broker: Arc::clone(&broker),
    });
    let http_listener = tokio::net::TcpListener::bind(&http_addr).await?;
    info!("control-plane API listening on http://{http_addr}");

    tokio::select! {
        _ = start_websocket_server(ws_addr, Arc::clone(&broker)) => {
            error!("WebSocket server exited unexpectedly.");
        }
        result = async { axum::serve(http_listener, router).await } => {
            if let Err(e) = result {
                error!("control-plane server exited: {e}");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received. Exiting gracefully.");
            broker.shutdown(drain_window).await;
        }
    }

    Ok(())
}

async fn run_client(url: &str, topic: &str) -> Result<(), Box<dyn std::error::Error>> {
    use futures_util::{SinkExt, StreamExt};
    use serde_json::json;
    use tokio_tungstenite::connect_async;
    use tokio_tungstenite::tungstenite::Message as WsMessage;

    let (mut ws_stream, _response) = connect_async(url).await?;
    let client_id = format!("client-{}", uuid::Uuid::new_v4());

    // 1. Subscribe, replaying up to the last five messages.
    let subscribe = json!({
        "type": "subscribe",
        "topic": topic,
        "client_id": client_id,
        "last_n": 5,
        "request_id": "sub-1"
    });
    ws_stream
        .send(WsMessage::text(subscribe.to_string()))
        .await?;

    if let Some(Ok(WsMessage::Text(ack))) = ws_stream.next().await {
        println!("Subscribe response: {ack}");
    }

    // 2. Publish one message.
    let publish = json!({
        "type": "publish",
        "topic": topic,
        "message": {
            "id": uuid::Uuid::new_v4().to_string(),
            "payload": {"greeting": "hello from the hubsub client"}
        },
        "request_id": "pub-1"
    });
    ws_stream.send(WsMessage::text(publish.to_string())).await?;

    // 3. Print whatever comes back for a little while.
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(2), ws_stream.next()).await;
        match frame {
            Ok(Some(Ok(WsMessage::Text(incoming)))) => println!("Incoming: {incoming}"),
            Ok(Some(Ok(_))) => continue,
            _ => break,
        }
    }

    Ok(())
}
