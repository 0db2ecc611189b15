//! Control-plane handlers.
//!
//! Topic CRUD plus the two observability endpoints, with consistent error
//! mapping for conflicts and missing topics. Deleting a topic notifies its
//! subscribers before the 200 goes out; that ordering lives in the broker.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

use hubsub_broker::BrokerError;

use crate::error::{api_conflict, api_internal, api_not_found, api_unavailable, ApiError};
use crate::types::{
    CreateTopicRequest, CreateTopicResponse, DeleteTopicResponse, HealthResponse,
    ListTopicsResponse, StatsResponse, TopicInfo, TopicStatsBody,
};
use crate::AppState;

pub(crate) async fn create_topic(
    State(state): State<AppState>,
    Json(body): Json<CreateTopicRequest>,
) -> Result<impl IntoResponse, ApiError> {
    match state.broker.create_topic(&body.name).await {
        Ok(()) => Ok((
            StatusCode::CREATED,
            Json(CreateTopicResponse {
                status: "created".to_string(),
                topic: body.name,
            }),
        )),
        Err(BrokerError::TopicExists(_)) => Err(api_conflict("topic already exists")),
        Err(BrokerError::ShuttingDown) => Err(api_unavailable("server is shutting down")),
        Err(err) => {
            tracing::error!(%err, "create topic failed");
            Err(api_internal("failed to create topic"))
        }
    }
}

pub(crate) async fn delete_topic(
    Path(name): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<DeleteTopicResponse>, ApiError> {
    match state.broker.delete_topic(&name).await {
        Ok(()) => Ok(Json(DeleteTopicResponse {
            status: "deleted".to_string(),
            topic: name,
        })),
        Err(BrokerError::TopicNotFound(_)) => Err(api_not_found("topic not found")),
        Err(err) => {
            tracing::error!(%err, "delete topic failed");
            Err(api_internal("failed to delete topic"))
        }
    }
}

pub(crate) async fn list_topics(State(state): State<AppState>) -> Json<ListTopicsResponse> {
    let topics = state
        .broker
        .list()
        .await
        .into_iter()
        .map(|summary| TopicInfo {
            name: summary.name,
            subscribers: summary.subscribers,
        })
        .collect();
    Json(ListTopicsResponse { topics })
}

pub(crate) async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        uptime_sec: state.broker.uptime_secs(),
        topics: state.broker.topic_count().await,
        subscribers: state.broker.total_subscribers().await,
    })
}

pub(crate) async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let topics = state
        .broker
        .stats()
        .await
        .into_iter()
        .map(|(name, stats)| {
            (
                name,
                TopicStatsBody {
                    messages: stats.messages,
                    subscribers: stats.subscribers,
                },
            )
        })
        .collect();
    Json(StatsResponse { topics })
}
