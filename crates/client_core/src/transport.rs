//! HTTP access to the annotation service.
//!
//! Every call goes through [`read_payload`], which turns non-success statuses
//! into [`ServiceError::Transport`] and `{"error": ...}` bodies into
//! [`ServiceError::Domain`]. Nothing here retries or keeps state.

use std::{collections::BTreeMap, time::Duration};

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use shared::{
    domain::{Item, Judgement, Stage, Stats, Task},
    error::ApiError,
    protocol::{BatchItemsResponse, BatchJudgementRequest, PredictRequest},
};
use tracing::debug;
use url::Url;

use crate::error::ServiceError;

/// Query parameters forwarded verbatim to `/batch`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchQuery {
    params: BTreeMap<String, String>,
}

impl BatchQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn force_stage(self, stage: Stage) -> Self {
        self.param("force_stage", stage.as_str())
    }

    pub fn sample_size(self, size: usize) -> Self {
        self.param("sample_size", size.to_string())
    }

    pub fn prediction(self, enabled: bool) -> Self {
        self.param("prediction", enabled.to_string())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn pairs(&self) -> Vec<(&str, &str)> {
        self.params
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BatchPage {
    Items(Vec<Item>),
    Done,
}

#[async_trait]
pub trait AnnotationService: Send + Sync {
    async fn fetch_task(&self) -> Result<Task, ServiceError>;
    async fn fetch_stats(&self) -> Result<Stats, ServiceError>;
    async fn fetch_items(&self, query: &BatchQuery) -> Result<Vec<Item>, ServiceError>;
    async fn fetch_batch_items(&self) -> Result<BatchPage, ServiceError>;
    async fn submit_judgement(&self, judgement: &Judgement) -> Result<(), ServiceError>;
    async fn submit_judgements(&self, judgements: &[Judgement]) -> Result<(), ServiceError>;
    async fn predict(&self, request: &PredictRequest) -> Result<Value, ServiceError>;
}

pub struct HttpAnnotationClient {
    http: Client,
    server_url: String,
}

impl HttpAnnotationClient {
    pub fn new(server_url: &str) -> anyhow::Result<Self> {
        Self::with_timeout(server_url, None)
    }

    pub fn with_timeout(server_url: &str, timeout: Option<Duration>) -> anyhow::Result<Self> {
        let parsed = Url::parse(server_url)?;
        if !matches!(parsed.scheme(), "http" | "https") {
            anyhow::bail!("server_url must start with http:// or https://");
        }
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            http: builder.build()?,
            server_url: server_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    fn url(&self, route: &str) -> String {
        format!("{}{route}", self.server_url)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        route: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ServiceError> {
        debug!(route, "annotation service request");
        let response = self.http.get(self.url(route)).query(query).send().await?;
        let payload = read_payload(response).await?;
        Ok(serde_json::from_value(payload)?)
    }

    async fn post_json<B: serde::Serialize + ?Sized>(
        &self,
        route: &str,
        body: &B,
    ) -> Result<Value, ServiceError> {
        debug!(route, "annotation service request");
        let response = self.http.post(self.url(route)).json(body).send().await?;
        read_payload(response).await
    }
}

async fn read_payload(response: Response) -> Result<Value, ServiceError> {
    let status = response.status();
    if !status.is_success() {
        return Err(ServiceError::Transport {
            status: status.as_u16(),
            message: status
                .canonical_reason()
                .unwrap_or("unknown status")
                .to_string(),
        });
    }

    let bytes = response.bytes().await?;
    let payload = if bytes.iter().all(u8::is_ascii_whitespace) {
        Value::Object(Default::default())
    } else {
        serde_json::from_slice(&bytes)?
    };

    if let Some(err) = ApiError::from_payload(&payload) {
        return Err(ServiceError::Domain(err.error));
    }
    Ok(payload)
}

#[async_trait]
impl AnnotationService for HttpAnnotationClient {
    async fn fetch_task(&self) -> Result<Task, ServiceError> {
        self.get_json("/task", &[]).await
    }

    async fn fetch_stats(&self) -> Result<Stats, ServiceError> {
        self.get_json("/history", &[]).await
    }

    async fn fetch_items(&self, query: &BatchQuery) -> Result<Vec<Item>, ServiceError> {
        self.get_json("/batch", &query.pairs()).await
    }

    async fn fetch_batch_items(&self) -> Result<BatchPage, ServiceError> {
        match self
            .get_json::<BatchItemsResponse>("/batch_items_batch", &[])
            .await?
        {
            BatchItemsResponse::Items(items) => Ok(BatchPage::Items(items)),
            BatchItemsResponse::Done { done: true } => Ok(BatchPage::Done),
            BatchItemsResponse::Done { done: false } => Err(ServiceError::Decode(
                "batch page carried neither items nor a done marker".to_string(),
            )),
        }
    }

    async fn submit_judgement(&self, judgement: &Judgement) -> Result<(), ServiceError> {
        self.post_json("/judgements", judgement).await?;
        Ok(())
    }

    async fn submit_judgements(&self, judgements: &[Judgement]) -> Result<(), ServiceError> {
        let body = BatchJudgementRequest {
            labels: judgements.to_vec(),
        };
        self.post_json("/judgements/batch", &body).await?;
        Ok(())
    }

    async fn predict(&self, request: &PredictRequest) -> Result<Value, ServiceError> {
        self.post_json("/predict", request).await
    }
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
