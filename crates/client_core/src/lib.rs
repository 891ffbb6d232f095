use std::sync::Arc;

use serde_json::Value;
use shared::{
    domain::{Stats, Task},
    protocol::PredictRequest,
};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

pub mod config;
pub mod error;
pub mod pipeline;
pub mod store;
pub mod transport;
pub mod view_mode;

pub use error::{ControllerError, ServiceError};
pub use pipeline::{SubmitOutcome, READ_AHEAD_BUFFER};
pub use store::{Completion, Concern, SubmissionKind, Transition, WorkflowState};
pub use transport::{AnnotationService, BatchPage, BatchQuery, HttpAnnotationClient};
pub use view_mode::ViewMode;

use store::{Action, ItemMerge, WorkflowStore};

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChanged,
    Failed {
        concern: &'static str,
        message: String,
    },
    Completed(Completion),
}

/// Drives one labelling session: fetch, judge, submit, refresh, advance.
///
/// The store lock is only held while a transition runs, never across a call
/// to the annotation service.
pub struct SessionController {
    service: Arc<dyn AnnotationService>,
    store: Mutex<WorkflowStore>,
    batch_query: BatchQuery,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionController {
    pub fn new(service: Arc<dyn AnnotationService>) -> Self {
        Self::with_batch_query(service, BatchQuery::default())
    }

    pub fn with_batch_query(service: Arc<dyn AnnotationService>, batch_query: BatchQuery) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            service,
            store: Mutex::new(WorkflowStore::new()),
            batch_query,
            events,
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> WorkflowState {
        self.store.lock().await.state().clone()
    }

    pub async fn epoch(&self) -> u64 {
        self.store.lock().await.state().epoch
    }

    pub(crate) async fn dispatch(&self, action: Action) -> Transition {
        self.dispatch_with(action, |_| ()).await.0
    }

    /// Applies `action` and reads from the resulting state under the same lock.
    pub(crate) async fn dispatch_with<R>(
        &self,
        action: Action,
        read: impl FnOnce(&WorkflowState) -> R,
    ) -> (Transition, R) {
        let name = action.name();
        let failure = match &action {
            Action::FetchFailed {
                concern, message, ..
            } => Some((concern.as_str(), message.clone())),
            Action::SubmissionFailed { kind, message, .. } => Some((
                match kind {
                    SubmissionKind::Single => "judgements",
                    SubmissionKind::Batch => "batch_judgements",
                },
                message.clone(),
            )),
            _ => None,
        };

        let (transition, before, after, epoch, output) = {
            let mut store = self.store.lock().await;
            let before = store.state().completion;
            let transition = store.dispatch(action);
            let state = store.state();
            (transition, before, state.completion, state.epoch, read(state))
        };

        match transition {
            Transition::Applied => {
                let _ = self.events.send(SessionEvent::StateChanged);
                if let Some((concern, message)) = failure {
                    let _ = self.events.send(SessionEvent::Failed { concern, message });
                }
                if !before.is_terminal() && after.is_terminal() {
                    info!(epoch, completion = ?after, "labelling session complete");
                    let _ = self.events.send(SessionEvent::Completed(after));
                }
            }
            Transition::Stale => {
                debug!(action = name, epoch, "discarding settlement from superseded epoch");
                // A stale submission settlement still released the guard.
                let _ = self.events.send(SessionEvent::StateChanged);
            }
            Transition::Rejected => {
                debug!(action = name, epoch, "transition rejected");
            }
        }

        (transition, output)
    }

    async fn begin_fetch(&self, concern: Concern) -> u64 {
        self.dispatch_with(Action::FetchStarted { concern }, |state| state.epoch)
            .await
            .1
    }

    async fn fail_fetch(&self, epoch: u64, concern: Concern, err: &ServiceError) {
        warn!(concern = concern.as_str(), epoch, "fetch failed: {err}");
        self.dispatch(Action::FetchFailed {
            epoch,
            concern,
            message: err.message(),
        })
        .await;
    }

    pub async fn fetch_task(&self) -> Result<Transition, ServiceError> {
        let epoch = self.begin_fetch(Concern::Task).await;
        match self.service.fetch_task().await {
            Ok(task) => Ok(self.dispatch(Action::TaskLoaded { epoch, task }).await),
            Err(err) => {
                self.fail_fetch(epoch, Concern::Task, &err).await;
                Err(err)
            }
        }
    }

    pub async fn fetch_stats(&self) -> Result<Transition, ServiceError> {
        let epoch = self.begin_fetch(Concern::Stats).await;
        match self.service.fetch_stats().await {
            Ok(stats) => Ok(self.dispatch(Action::StatsLoaded { epoch, stats }).await),
            Err(err) => {
                self.fail_fetch(epoch, Concern::Stats, &err).await;
                Err(err)
            }
        }
    }

    /// Loads a fresh page of items and resets the cursor to its start.
    pub async fn fetch_items(&self) -> Result<Transition, ServiceError> {
        self.load_items(ItemMerge::Replace).await
    }

    /// Appends the next page of items after the current window.
    pub async fn fetch_more_items(&self) -> Result<Transition, ServiceError> {
        self.load_items(ItemMerge::Append).await
    }

    async fn load_items(&self, merge: ItemMerge) -> Result<Transition, ServiceError> {
        let epoch = self.begin_fetch(Concern::Items).await;
        match self.service.fetch_items(&self.batch_query).await {
            Ok(items) => {
                debug!(epoch, count = items.len(), ?merge, "items fetched");
                Ok(self
                    .dispatch(Action::ItemsLoaded {
                        epoch,
                        items,
                        merge,
                    })
                    .await)
            }
            Err(err) => {
                self.fail_fetch(epoch, Concern::Items, &err).await;
                Err(err)
            }
        }
    }

    /// Loads the next batch, or marks batch labelling complete when the
    /// service reports there is nothing left.
    pub async fn fetch_batch_items(&self) -> Result<Transition, ServiceError> {
        let epoch = self.begin_fetch(Concern::BatchItems).await;
        match self.service.fetch_batch_items().await {
            Ok(BatchPage::Items(items)) => {
                debug!(epoch, count = items.len(), "batch fetched");
                Ok(self.dispatch(Action::BatchItemsLoaded { epoch, items }).await)
            }
            Ok(BatchPage::Done) => Ok(self
                .dispatch(Action::MarkComplete {
                    epoch,
                    completion: Completion::BatchComplete,
                })
                .await),
            Err(err) => {
                self.fail_fetch(epoch, Concern::BatchItems, &err).await;
                Err(err)
            }
        }
    }

    /// Loads the task and statistics, then the first page for the active
    /// view mode. A statistics failure is recorded but does not stop the
    /// session from starting.
    pub async fn start_session(&self) -> Result<(), ControllerError> {
        self.fetch_task().await?;
        if let Err(err) = self.fetch_stats().await {
            debug!("continuing session start without stats: {err}");
        }

        let batch = self.snapshot().await.is_batch_view();
        if batch {
            self.fetch_batch_items().await?;
        } else {
            self.fetch_items().await?;
        }
        Ok(())
    }

    pub async fn task(&self) -> Option<Task> {
        self.store.lock().await.state().task.data.clone()
    }

    pub async fn stats(&self) -> Option<Stats> {
        self.store.lock().await.state().stats.data.clone()
    }

    /// Ad-hoc scoring; outside the judging workflow, so state is untouched.
    pub async fn predict(&self, request: &PredictRequest) -> Result<Value, ServiceError> {
        self.service.predict(request).await
    }
}

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod test_support;

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
