//! Workflow state and the reducer that is its only writer.
//!
//! Every mutation is an [`Action`] applied by [`reduce`]. Settlement actions
//! carry the epoch captured when their request was issued; once the epoch
//! has moved on they are reported as [`Transition::Stale`] and leave the
//! state untouched, except that a settled submission always releases the
//! submission guard.

use shared::domain::{Item, Stats, Task};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Concern {
    Task,
    Stats,
    Items,
    BatchItems,
}

impl Concern {
    pub fn as_str(self) -> &'static str {
        match self {
            Concern::Task => "task",
            Concern::Stats => "stats",
            Concern::Items => "items",
            Concern::BatchItems => "batch_items",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionKind {
    Single,
    Batch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Completion {
    #[default]
    InProgress,
    /// The cursor moved past the last known item.
    ItemsExhausted,
    /// The service reported no further batches.
    BatchComplete,
}

impl Completion {
    pub fn is_terminal(self) -> bool {
        self != Completion::InProgress
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemMerge {
    /// Replace the sequence and reset the cursor.
    Replace,
    /// Append unseen items after the current window (read-ahead).
    Append,
}

/// Data for one concern plus its loading flag and last error.
#[derive(Debug, Clone, PartialEq)]
pub struct Slot<T> {
    pub data: T,
    pub loading: bool,
    pub error: Option<String>,
}

impl<T: Default> Default for Slot<T> {
    fn default() -> Self {
        Self {
            data: T::default(),
            loading: false,
            error: None,
        }
    }
}

impl<T> Slot<T> {
    fn begin(&mut self) {
        self.loading = true;
        self.error = None;
    }

    fn succeed(&mut self, data: T) {
        self.data = data;
        self.loading = false;
        self.error = None;
    }

    fn fail(&mut self, message: String) {
        self.loading = false;
        self.error = Some(message);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmissionState {
    pub submitting: bool,
    pub error: Option<String>,
    pub batch_error: Option<String>,
    pub recorded: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkflowState {
    pub epoch: u64,
    pub task: Slot<Option<Task>>,
    pub stats: Slot<Option<Stats>>,
    pub items: Slot<Vec<Item>>,
    pub current_index: usize,
    pub batch_items: Slot<Vec<Item>>,
    pub submission: SubmissionState,
    pub completion: Completion,
}

impl WorkflowState {
    /// The item awaiting a judgement. `None` once the cursor has moved past
    /// the last known item.
    pub fn current_item(&self) -> Option<&Item> {
        self.items.data.get(self.current_index)
    }

    pub fn is_batch_view(&self) -> bool {
        self.task
            .data
            .as_ref()
            .is_some_and(|task| task.is_batch_view)
    }

    /// Items at or after the cursor that have not been judged yet.
    pub fn pending_items(&self) -> &[Item] {
        self.items
            .data
            .get(self.current_index..)
            .unwrap_or_default()
    }

    pub fn error_for(&self, concern: Concern) -> Option<&str> {
        match concern {
            Concern::Task => self.task.error.as_deref(),
            Concern::Stats => self.stats.error.as_deref(),
            Concern::Items => self.items.error.as_deref(),
            Concern::BatchItems => self.batch_items.error.as_deref(),
        }
    }

    pub fn is_loading(&self, concern: Concern) -> bool {
        match concern {
            Concern::Task => self.task.loading,
            Concern::Stats => self.stats.loading,
            Concern::Items => self.items.loading,
            Concern::BatchItems => self.batch_items.loading,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    FetchStarted {
        concern: Concern,
    },
    TaskLoaded {
        epoch: u64,
        task: Task,
    },
    StatsLoaded {
        epoch: u64,
        stats: Stats,
    },
    ItemsLoaded {
        epoch: u64,
        items: Vec<Item>,
        merge: ItemMerge,
    },
    BatchItemsLoaded {
        epoch: u64,
        items: Vec<Item>,
    },
    FetchFailed {
        epoch: u64,
        concern: Concern,
        message: String,
    },
    SubmissionStarted,
    SubmissionSucceeded {
        epoch: u64,
        kind: SubmissionKind,
        count: usize,
    },
    SubmissionFailed {
        epoch: u64,
        kind: SubmissionKind,
        message: String,
    },
    AdvanceCursor {
        epoch: u64,
    },
    MarkComplete {
        epoch: u64,
        completion: Completion,
    },
    SetViewMode {
        batch: bool,
    },
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::FetchStarted { .. } => "fetch_started",
            Action::TaskLoaded { .. } => "task_loaded",
            Action::StatsLoaded { .. } => "stats_loaded",
            Action::ItemsLoaded { .. } => "items_loaded",
            Action::BatchItemsLoaded { .. } => "batch_items_loaded",
            Action::FetchFailed { .. } => "fetch_failed",
            Action::SubmissionStarted => "submission_started",
            Action::SubmissionSucceeded { .. } => "submission_succeeded",
            Action::SubmissionFailed { .. } => "submission_failed",
            Action::AdvanceCursor { .. } => "advance_cursor",
            Action::MarkComplete { .. } => "mark_complete",
            Action::SetViewMode { .. } => "set_view_mode",
        }
    }

    fn epoch(&self) -> Option<u64> {
        match self {
            Action::TaskLoaded { epoch, .. }
            | Action::StatsLoaded { epoch, .. }
            | Action::ItemsLoaded { epoch, .. }
            | Action::BatchItemsLoaded { epoch, .. }
            | Action::FetchFailed { epoch, .. }
            | Action::SubmissionSucceeded { epoch, .. }
            | Action::SubmissionFailed { epoch, .. }
            | Action::AdvanceCursor { epoch }
            | Action::MarkComplete { epoch, .. } => Some(*epoch),
            Action::FetchStarted { .. }
            | Action::SubmissionStarted
            | Action::SetViewMode { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Applied,
    /// The action belonged to a superseded epoch.
    Stale,
    /// The action was refused by a guard; state is unchanged.
    Rejected,
}

pub fn reduce(mut state: WorkflowState, action: Action) -> (WorkflowState, Transition) {
    if let Some(epoch) = action.epoch() {
        if epoch != state.epoch {
            if matches!(
                action,
                Action::SubmissionSucceeded { .. } | Action::SubmissionFailed { .. }
            ) {
                state.submission.submitting = false;
            }
            return (state, Transition::Stale);
        }
    }

    let transition = match action {
        Action::FetchStarted { concern } => {
            match concern {
                Concern::Task => state.task.begin(),
                Concern::Stats => state.stats.begin(),
                Concern::Items => state.items.begin(),
                Concern::BatchItems => state.batch_items.begin(),
            }
            Transition::Applied
        }
        Action::TaskLoaded { mut task, .. } => {
            // The view mode is client-side state; a refetch must not reset it.
            let previous_mode = state.task.data.as_ref().map(|task| task.is_batch_view);
            if let Some(batch) = previous_mode {
                task.is_batch_view = batch;
            }
            let supported = task.supports_batch_view();
            task.is_batch_view &= supported;
            let mode_changed = previous_mode.is_some_and(|batch| batch != task.is_batch_view);
            state.task.succeed(Some(task));
            if mode_changed {
                bump_epoch(&mut state);
            }
            Transition::Applied
        }
        Action::StatsLoaded { stats, .. } => {
            state.stats.succeed(Some(stats));
            Transition::Applied
        }
        Action::ItemsLoaded { items, merge, .. } => {
            match merge {
                ItemMerge::Replace => {
                    state.items.succeed(items);
                    state.current_index = 0;
                    if state.completion == Completion::ItemsExhausted {
                        state.completion = Completion::InProgress;
                    }
                }
                ItemMerge::Append => {
                    let mut merged = std::mem::take(&mut state.items.data);
                    for item in items {
                        if !merged.iter().any(|known| known.id == item.id) {
                            merged.push(item);
                        }
                    }
                    if state.completion == Completion::ItemsExhausted
                        && state.current_index < merged.len()
                    {
                        state.completion = Completion::InProgress;
                    }
                    state.items.succeed(merged);
                }
            }
            Transition::Applied
        }
        Action::BatchItemsLoaded { items, .. } => {
            state.batch_items.succeed(items);
            if state.completion == Completion::BatchComplete {
                state.completion = Completion::InProgress;
            }
            Transition::Applied
        }
        Action::FetchFailed {
            concern, message, ..
        } => {
            match concern {
                Concern::Task => state.task.fail(message),
                Concern::Stats => state.stats.fail(message),
                Concern::Items => state.items.fail(message),
                Concern::BatchItems => state.batch_items.fail(message),
            }
            Transition::Applied
        }
        Action::SubmissionStarted => {
            if state.submission.submitting {
                Transition::Rejected
            } else {
                state.submission.submitting = true;
                Transition::Applied
            }
        }
        Action::SubmissionSucceeded { kind, count, .. } => {
            state.submission.submitting = false;
            state.submission.recorded += count;
            match kind {
                SubmissionKind::Single => state.submission.error = None,
                SubmissionKind::Batch => state.submission.batch_error = None,
            }
            Transition::Applied
        }
        Action::SubmissionFailed { kind, message, .. } => {
            state.submission.submitting = false;
            match kind {
                SubmissionKind::Single => state.submission.error = Some(message),
                SubmissionKind::Batch => state.submission.batch_error = Some(message),
            }
            Transition::Applied
        }
        Action::AdvanceCursor { .. } => {
            let known = state.items.data.len();
            state.current_index = (state.current_index + 1).min(known);
            if state.current_index == known {
                state.completion = Completion::ItemsExhausted;
            }
            Transition::Applied
        }
        Action::MarkComplete { completion, .. } => {
            if completion == Completion::BatchComplete {
                state.batch_items.loading = false;
                state.batch_items.error = None;
            }
            state.completion = completion;
            Transition::Applied
        }
        Action::SetViewMode { batch } => set_view_mode(&mut state, batch),
    };

    (state, transition)
}

fn set_view_mode(state: &mut WorkflowState, batch: bool) -> Transition {
    let Some(task) = state.task.data.as_mut() else {
        return Transition::Rejected;
    };
    if task.is_batch_view == batch || (batch && !task.supports_batch_view()) {
        return Transition::Rejected;
    }

    task.is_batch_view = batch;
    bump_epoch(state);
    Transition::Applied
}

/// Outstanding requests can no longer settle into state, so their loading
/// flags are dropped along with them.
fn bump_epoch(state: &mut WorkflowState) {
    state.epoch += 1;
    state.task.loading = false;
    state.stats.loading = false;
    state.items.loading = false;
    state.batch_items.loading = false;
}

/// Owner of the workflow state; all writes go through [`WorkflowStore::dispatch`].
#[derive(Debug, Default)]
pub struct WorkflowStore {
    state: WorkflowState,
}

impl WorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    pub fn dispatch(&mut self, action: Action) -> Transition {
        let (next, transition) = reduce(std::mem::take(&mut self.state), action);
        self.state = next;
        transition
    }
}

#[cfg(test)]
#[path = "tests/store_tests.rs"]
mod tests;
