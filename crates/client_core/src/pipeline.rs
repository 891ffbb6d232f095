//! Submission pipelines.
//!
//! Single-item: guard → submit → settle → read-ahead? → refresh stats →
//! advance (completing past the last item). Batch: guard → submit → settle → next batch (or
//! done) → refresh stats. Each stage checks that the epoch it started in is
//! still current before touching state.

use shared::domain::Judgement;
use tracing::{debug, warn};

use crate::{
    error::ControllerError,
    store::{Action, SubmissionKind, Transition, WorkflowState},
    SessionController,
};

/// Minimum number of unjudged items kept fetched ahead of the cursor.
pub const READ_AHEAD_BUFFER: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The service accepted the judgement(s) and the follow-up stages ran.
    Recorded,
    /// A submission was already in flight; nothing was sent.
    Duplicate,
    /// The view mode changed while the request was in flight; its result
    /// was not applied.
    Superseded,
}

pub fn needs_read_ahead(current_index: usize, known_items: usize) -> bool {
    current_index + READ_AHEAD_BUFFER >= known_items
}

fn cursor(state: &WorkflowState) -> (usize, usize) {
    (state.current_index, state.items.data.len())
}

fn require_task(state: &WorkflowState) -> Result<(), ControllerError> {
    match state.task.data {
        Some(_) => Ok(()),
        None => Err(ControllerError::NoTask),
    }
}

impl SessionController {
    /// Checks the submission guard and, if it is free, claims it.
    ///
    /// Returns `Ok(None)` for a duplicate submission. `resolve` runs under the
    /// same lock, after the guard check and before the guard is claimed.
    async fn begin_submission<T>(
        &self,
        resolve: impl FnOnce(&WorkflowState) -> Result<T, ControllerError>,
    ) -> Result<Option<(T, u64)>, ControllerError> {
        let claimed = {
            let mut store = self.store.lock().await;
            if store.state().submission.submitting {
                None
            } else {
                let resolved = resolve(store.state())?;
                let epoch = store.state().epoch;
                match store.dispatch(Action::SubmissionStarted) {
                    Transition::Applied => Some((resolved, epoch)),
                    _ => None,
                }
            }
        };

        match claimed {
            Some(claimed) => {
                let _ = self.events.send(crate::SessionEvent::StateChanged);
                Ok(Some(claimed))
            }
            None => {
                debug!("dropping duplicate submission while another is in flight");
                Ok(None)
            }
        }
    }

    async fn is_current_epoch(&self, epoch: u64) -> bool {
        self.epoch().await == epoch
    }

    /// Submits `label` for the item under the cursor.
    pub async fn submit_judgement(
        &self,
        label: impl Into<String>,
    ) -> Result<SubmitOutcome, ControllerError> {
        let label = label.into();
        let Some((judgement, epoch)) = self
            .begin_submission(|state| {
                require_task(state)?;
                state
                    .current_item()
                    .map(|item| Judgement::new(item.id.clone(), label))
                    .ok_or(ControllerError::NoCurrentItem)
            })
            .await?
        else {
            return Ok(SubmitOutcome::Duplicate);
        };

        debug!(epoch, item_id = %judgement.item_id, "submitting judgement");
        if let Err(err) = self.service.submit_judgement(&judgement).await {
            warn!(epoch, item_id = %judgement.item_id, "judgement submission failed: {err}");
            self.dispatch(Action::SubmissionFailed {
                epoch,
                kind: SubmissionKind::Single,
                message: err.message(),
            })
            .await;
            return Err(err.into());
        }

        let (transition, (index, known)) = self
            .dispatch_with(
                Action::SubmissionSucceeded {
                    epoch,
                    kind: SubmissionKind::Single,
                    count: 1,
                },
                cursor,
            )
            .await;
        if transition == Transition::Stale {
            return Ok(SubmitOutcome::Superseded);
        }

        if needs_read_ahead(index, known) {
            if let Err(err) = self.fetch_more_items().await {
                debug!(epoch, "read-ahead fetch failed: {err}");
            }
        }
        if !self.is_current_epoch(epoch).await {
            return Ok(SubmitOutcome::Superseded);
        }

        if let Err(err) = self.fetch_stats().await {
            debug!(epoch, "stats refresh failed: {err}");
        }

        match self.dispatch(Action::AdvanceCursor { epoch }).await {
            Transition::Stale => Ok(SubmitOutcome::Superseded),
            _ => Ok(SubmitOutcome::Recorded),
        }
    }

    /// Submits every judgement collected from a batch view in one request.
    pub async fn submit_batch(
        &self,
        judgements: Vec<Judgement>,
    ) -> Result<SubmitOutcome, ControllerError> {
        let Some((judgements, epoch)) = self
            .begin_submission(|state| {
                require_task(state)?;
                if judgements.is_empty() {
                    Err(ControllerError::EmptyBatch)
                } else {
                    Ok(judgements)
                }
            })
            .await?
        else {
            return Ok(SubmitOutcome::Duplicate);
        };

        debug!(epoch, count = judgements.len(), "submitting batch");
        if let Err(err) = self.service.submit_judgements(&judgements).await {
            warn!(epoch, count = judgements.len(), "batch submission failed: {err}");
            self.dispatch(Action::SubmissionFailed {
                epoch,
                kind: SubmissionKind::Batch,
                message: err.message(),
            })
            .await;
            return Err(err.into());
        }

        let transition = self
            .dispatch(Action::SubmissionSucceeded {
                epoch,
                kind: SubmissionKind::Batch,
                count: judgements.len(),
            })
            .await;
        if transition == Transition::Stale {
            return Ok(SubmitOutcome::Superseded);
        }

        if let Err(err) = self.fetch_batch_items().await {
            debug!(epoch, "next batch fetch failed: {err}");
        }
        if !self.is_current_epoch(epoch).await {
            return Ok(SubmitOutcome::Superseded);
        }

        if let Err(err) = self.fetch_stats().await {
            debug!(epoch, "stats refresh failed: {err}");
        }
        Ok(SubmitOutcome::Recorded)
    }
}

#[cfg(test)]
#[path = "tests/pipeline_tests.rs"]
mod tests;
