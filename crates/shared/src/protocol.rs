use serde::{Deserialize, Serialize};

use crate::domain::{Item, Judgement};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchJudgementRequest {
    pub labels: Vec<Judgement>,
}

/// Response of `/batch_items_batch`: either the next batch or the terminal
/// `{"done": true}` marker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BatchItemsResponse {
    Items(Vec<Item>),
    Done { done: bool },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PredictRequest {
    Images { urls: Vec<String> },
    Text { texts: Vec<String> },
}
