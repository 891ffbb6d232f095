use shared::domain::Task;
use tracing::info;

use crate::{
    store::{Action, SubmissionKind, Transition},
    SessionController,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewMode {
    Single,
    Batch,
}

impl ViewMode {
    pub fn for_task(task: Option<&Task>) -> Self {
        match task {
            Some(task) if task.is_batch_view => ViewMode::Batch,
            _ => ViewMode::Single,
        }
    }

    pub fn pipeline(self) -> SubmissionKind {
        match self {
            ViewMode::Single => SubmissionKind::Single,
            ViewMode::Batch => SubmissionKind::Batch,
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            ViewMode::Single => ViewMode::Batch,
            ViewMode::Batch => ViewMode::Single,
        }
    }
}

impl SessionController {
    pub async fn view_mode(&self) -> ViewMode {
        ViewMode::for_task(self.store.lock().await.state().task.data.as_ref())
    }

    pub async fn active_pipeline(&self) -> SubmissionKind {
        self.view_mode().await.pipeline()
    }

    /// Switches between single-item and batch interaction. Entering batch
    /// mode is refused for tasks that do not support it; the return value
    /// says whether the mode changed.
    pub async fn set_batch_view(&self, batch: bool) -> bool {
        let changed = self.dispatch(Action::SetViewMode { batch }).await == Transition::Applied;
        if changed {
            info!(batch, epoch = self.epoch().await, "view mode changed");
        }
        changed
    }

    pub async fn toggle_view_mode(&self) -> bool {
        let target = self.view_mode().await.toggled();
        self.set_batch_view(target == ViewMode::Batch).await
    }
}
