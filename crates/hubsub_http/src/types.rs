//! Request/response bodies for the control-plane API.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateTopicRequest {
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateTopicResponse {
    pub status: String,
    pub topic: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteTopicResponse {
    pub status: String,
    pub topic: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TopicInfo {
    pub name: String,
    pub subscribers: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListTopicsResponse {
    pub topics: Vec<TopicInfo>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub uptime_sec: u64,
    pub topics: usize,
    pub subscribers: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TopicStatsBody {
    pub messages: u64,
    pub subscribers: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatsResponse {
    pub topics: HashMap<String, TopicStatsBody>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}
