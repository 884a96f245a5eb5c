use super::{EngineState, WeekEngine};
use crate::dates;
use crate::error::CoreError;
use crate::gateway::{TaskCreate, TaskGateway, TaskUpdate};
use crate::models::{is_local_only_id, is_occurrence_id, DayIndex, MutationOutcome, TaskId};
use crate::positions;
use crate::store::DocumentStore;

/// Remote work left over after a local move.
struct MoveWork {
    updates: Vec<(TaskId, TaskUpdate)>,
    materialize: Option<TaskCreate>,
    document_changed: bool,
}

impl<G: TaskGateway, S: DocumentStore> WeekEngine<G, S> {
    /// Moves a task to `target_position` in the root container of
    /// `target_day`.
    ///
    /// The local reorder is applied at once. The moved task's date and
    /// position are then persisted, followed by the new positions of every
    /// shifted sibling when `persist_shifted_positions` is set. Any failure
    /// resyncs the week.
    pub async fn move_task(
        &self,
        id: &str,
        target_day: DayIndex,
        target_position: usize,
    ) -> Result<MutationOutcome, CoreError> {
        dates::validate_day_index(target_day)?;

        let work = {
            let mut state = self.lock();
            let EngineState { session, document } = &mut *state;
            let week_start = session.week_start();
            let plan = positions::apply_move(&mut session.tasks, id, target_day, target_position)
                .ok_or_else(|| CoreError::NotFound(format!("Task with id {} not found", id)))?;
            tracing::debug!(
                task_id = id,
                from_day = plan.from.day_index,
                to_day = plan.to.day_index,
                position = plan.position,
                shifted = plan.shifted.len(),
                "moved task locally"
            );

            session.touch(id);
            for shifted in &plan.shifted {
                session.touch(shifted);
            }

            let before = document.task_meta.get(id).cloned();
            let moved = session
                .task(id)
                .cloned()
                .ok_or_else(|| CoreError::NotFound(format!("Task with id {} not found", id)))?;
            if !is_occurrence_id(id) {
                document.record_meta(&moved);
            }
            let document_changed = before.as_ref() != document.task_meta.get(id);

            let mut updates = Vec::new();
            let mut materialize = None;
            // A task still being created has its placement reconciled when the create settles.
            let creating = session.is_creating(id);
            if is_occurrence_id(id) && !creating {
                session.begin_create(id);
                materialize = Some(TaskCreate::from_task(&moved, dates::week_date(week_start, target_day)));
            } else if !creating && !is_local_only_id(id) {
                updates.push((
                    id.to_string(),
                    TaskUpdate::placement(dates::week_date(week_start, moved.day_index), moved.position),
                ));
            }

            if self.config.persist_shifted_positions {
                for shifted in &plan.shifted {
                    if is_local_only_id(shifted) || session.is_creating(shifted) {
                        continue;
                    }
                    if let Some(task) = session.task(shifted) {
                        updates.push((
                            shifted.clone(),
                            TaskUpdate::placement(dates::week_date(week_start, task.day_index), task.position),
                        ));
                    }
                }
            }
            for (task_id, _) in &updates {
                session.begin_call(task_id);
            }

            MoveWork {
                updates,
                materialize,
                document_changed,
            }
        };

        if work.document_changed {
            self.persist_document().await;
        }

        let mut failure = None;
        for (task_id, update) in &work.updates {
            let result = self.gateway.update_task(task_id, update).await;
            self.lock().session.end_call(task_id);
            if let Err(error) = result {
                failure.get_or_insert(error);
            }
        }

        let mut outcome = MutationOutcome::Applied;
        if let Some(payload) = work.materialize {
            outcome = self.push_create(id, payload, false).await.1;
        }

        if let Some(error) = failure {
            return Ok(self.resync("move_task", &error).await);
        }
        if outcome == MutationOutcome::Applied && self.config.resync_after_move {
            self.refresh().await;
        }
        Ok(outcome)
    }
}
