//! In-memory annotation service for controller tests.

use std::{collections::VecDeque, sync::Arc};

use async_trait::async_trait;
use serde_json::{json, Value};
use shared::{
    domain::{DataType, Item, Judgement, LabelType, LabelledCounts, Stats, Task},
    protocol::PredictRequest,
};
use tokio::sync::{Mutex, Notify};

use crate::{
    error::ServiceError,
    transport::{AnnotationService, BatchPage, BatchQuery},
    SessionController,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    FetchTask,
    FetchStats,
    FetchItems(BatchQuery),
    FetchBatchItems,
    Submit(Judgement),
    SubmitBatch(Vec<Judgement>),
    Predict(PredictRequest),
}

/// Holds a submission open until released, so tests can observe the state
/// while the request is in flight.
#[derive(Default)]
pub struct SubmitGate {
    pub entered: Notify,
    pub release: Notify,
}

pub struct FakeService {
    task: Mutex<Result<Task, ServiceError>>,
    stats: Mutex<Result<Stats, ServiceError>>,
    item_pages: Mutex<VecDeque<Result<Vec<Item>, ServiceError>>>,
    batch_pages: Mutex<VecDeque<Result<BatchPage, ServiceError>>>,
    submit_result: Mutex<Result<(), ServiceError>>,
    gate: Option<Arc<SubmitGate>>,
    pub calls: Arc<Mutex<Vec<Call>>>,
}

impl FakeService {
    pub fn new(task: Task) -> Self {
        Self {
            task: Mutex::new(Ok(task)),
            stats: Mutex::new(Ok(sample_stats(0))),
            item_pages: Mutex::new(VecDeque::new()),
            batch_pages: Mutex::new(VecDeque::new()),
            submit_result: Mutex::new(Ok(())),
            gate: None,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_item_page(mut self, page: Result<Vec<Item>, ServiceError>) -> Self {
        self.item_pages.get_mut().push_back(page);
        self
    }

    pub fn with_batch_page(mut self, page: Result<BatchPage, ServiceError>) -> Self {
        self.batch_pages.get_mut().push_back(page);
        self
    }

    pub fn with_submit_result(mut self, result: Result<(), ServiceError>) -> Self {
        *self.submit_result.get_mut() = result;
        self
    }

    pub fn with_gate(mut self, gate: Arc<SubmitGate>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub async fn set_stats(&self, stats: Result<Stats, ServiceError>) {
        *self.stats.lock().await = stats;
    }

    pub async fn set_task(&self, task: Result<Task, ServiceError>) {
        *self.task.lock().await = task;
    }

    pub async fn push_item_page(&self, page: Result<Vec<Item>, ServiceError>) {
        self.item_pages.lock().await.push_back(page);
    }

    pub async fn set_submit_result(&self, result: Result<(), ServiceError>) {
        *self.submit_result.lock().await = result;
    }

    pub async fn calls(&self) -> Vec<Call> {
        self.calls.lock().await.clone()
    }

    pub async fn count(&self, matches: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().await.iter().filter(|call| matches(call)).count()
    }

    async fn record(&self, call: Call) {
        self.calls.lock().await.push(call);
    }

    async fn wait_at_gate(&self) {
        if let Some(gate) = &self.gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
    }
}

#[async_trait]
impl AnnotationService for FakeService {
    async fn fetch_task(&self) -> Result<Task, ServiceError> {
        self.record(Call::FetchTask).await;
        self.task.lock().await.clone()
    }

    async fn fetch_stats(&self) -> Result<Stats, ServiceError> {
        self.record(Call::FetchStats).await;
        self.stats.lock().await.clone()
    }

    async fn fetch_items(&self, query: &BatchQuery) -> Result<Vec<Item>, ServiceError> {
        self.record(Call::FetchItems(query.clone())).await;
        self.item_pages
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn fetch_batch_items(&self) -> Result<BatchPage, ServiceError> {
        self.record(Call::FetchBatchItems).await;
        self.batch_pages
            .lock()
            .await
            .pop_front()
            .unwrap_or(Ok(BatchPage::Done))
    }

    async fn submit_judgement(&self, judgement: &Judgement) -> Result<(), ServiceError> {
        self.record(Call::Submit(judgement.clone())).await;
        self.wait_at_gate().await;
        self.submit_result.lock().await.clone()
    }

    async fn submit_judgements(&self, judgements: &[Judgement]) -> Result<(), ServiceError> {
        self.record(Call::SubmitBatch(judgements.to_vec())).await;
        self.wait_at_gate().await;
        self.submit_result.lock().await.clone()
    }

    async fn predict(&self, request: &PredictRequest) -> Result<Value, ServiceError> {
        self.record(Call::Predict(request.clone())).await;
        Ok(json!({"predictions": []}))
    }
}

pub fn task(data_type: DataType, label_type: LabelType) -> Task {
    Task {
        classes: vec!["cat".to_string(), "dog".to_string()],
        data_type,
        label_type,
        min_train: 10,
        is_batch_view: false,
    }
}

pub fn image_task() -> Task {
    task(DataType::Images, LabelType::Classification)
}

pub fn items(ids: impl IntoIterator<Item = &'static str>) -> Vec<Item> {
    ids.into_iter().map(Item::new).collect()
}

pub fn numbered_items(prefix: &str, count: usize) -> Vec<Item> {
    (0..count)
        .map(|n| Item::new(format!("{prefix}{n}")))
        .collect()
}

pub fn sample_stats(train: u64) -> Stats {
    Stats {
        unlabelled: 100,
        labelled: LabelledCounts {
            total: train * 2,
            train,
            test: train,
            model_labelled: 0,
        },
        history: Vec::new(),
    }
}

pub fn transport_error() -> ServiceError {
    ServiceError::Transport {
        status: 500,
        message: "Internal Server Error".to_string(),
    }
}

pub fn controller(service: FakeService) -> (Arc<SessionController>, Arc<FakeService>) {
    let service = Arc::new(service);
    let controller = Arc::new(SessionController::new(service.clone()));
    (controller, service)
}
