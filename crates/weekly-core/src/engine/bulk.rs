use super::{EngineState, RemovedLocalState, WeekEngine};
use crate::dates;
use crate::error::CoreError;
use crate::gateway::{GatewayError, TaskGateway};
use crate::models::{is_local_only_id, DayIndex, Group, MutationOutcome, Task, TaskId};
use crate::store::DocumentStore;

#[derive(Debug, Clone, Copy)]
enum BulkScope {
    Day(DayIndex),
    Week,
}

impl BulkScope {
    fn covers_task(&self, task: &Task) -> bool {
        match self {
            BulkScope::Day(day) => task.day_index == *day,
            BulkScope::Week => true,
        }
    }

    fn covers_group(&self, group: &Group) -> bool {
        match self {
            BulkScope::Day(day) => group.day_index == *day,
            BulkScope::Week => true,
        }
    }
}

impl<G: TaskGateway, S: DocumentStore> WeekEngine<G, S> {
    /// Removes every task and group of one day, locally and remotely.
    pub async fn delete_all_for_day(&self, day_index: DayIndex) -> Result<MutationOutcome, CoreError> {
        dates::validate_day_index(day_index)?;
        Ok(self.clear(BulkScope::Day(day_index)).await)
    }

    /// Removes every task and group of the current week, locally and remotely.
    pub async fn clear_current_week(&self) -> Result<MutationOutcome, CoreError> {
        Ok(self.clear(BulkScope::Week).await)
    }

    /// Order matters here: skip dates for every occurrence in scope are
    /// written to the document, and the document saved, before any remote
    /// row is deleted. Otherwise a re-expansion in between would bring the
    /// occurrences back.
    ///
    /// When the remote delete fails, the rows it kept come back with their
    /// local attributes and groups. Skip dates of virtual occurrences stay.
    async fn clear(&self, scope: BulkScope) -> MutationOutcome {
        let (week_start, protected, restorable) = {
            let mut state = self.lock();
            let EngineState { session, document } = &mut *state;
            let week_start = session.week_start();
            let mut restorable = RemovedLocalState::new(week_start);

            let (removed, kept): (Vec<Task>, Vec<Task>) = std::mem::take(&mut session.tasks)
                .into_iter()
                .partition(|t| scope.covers_task(t));
            session.tasks = kept;

            let mut skipped = 0usize;
            for task in &removed {
                let Some((recurrence_id, date)) = task.occurrence_key() else {
                    continue;
                };
                if document.add_skip_date(recurrence_id, date) {
                    skipped += 1;
                    if !is_local_only_id(&task.id) {
                        restorable.skip_added(&task.id, (recurrence_id, date));
                    }
                }
            }

            let (dropped_groups, kept_groups): (Vec<Group>, Vec<Group>) = std::mem::take(&mut session.groups)
                .into_iter()
                .partition(|g| scope.covers_group(g));
            session.groups = kept_groups;
            document.set_groups(week_start, session.groups.clone());
            for group in dropped_groups {
                restorable.group_removed(group);
            }

            let mut protected: Vec<TaskId> = Vec::new();
            for task in &removed {
                session.touch(&task.id);
                restorable.take_meta(document, &task.id);
                if session.is_creating(&task.id) {
                    session.mark_deleted_while_creating(&task.id);
                } else if !is_local_only_id(&task.id) {
                    session.begin_call(&task.id);
                    protected.push(task.id.clone());
                }
            }
            restorable.retain_tasks(&protected);
            tracing::debug!(?scope, removed = removed.len(), skipped, "cleared locally");
            (week_start, protected, restorable)
        };

        self.persist_document().await;

        let result: Result<(), GatewayError> = match scope {
            BulkScope::Day(day) => self.gateway.delete_tasks_for_day(dates::week_date(week_start, day)).await,
            BulkScope::Week => self.gateway.delete_tasks_for_week(week_start).await,
        };

        {
            let mut state = self.lock();
            for id in &protected {
                state.session.end_call(id);
            }
        }

        match result {
            Ok(()) => MutationOutcome::Applied,
            Err(error) => {
                self.resync_after_failed_delete(bulk_operation_name(scope), &error, restorable)
                    .await
            }
        }
    }
}

fn bulk_operation_name(scope: BulkScope) -> &'static str {
    match scope {
        BulkScope::Day(_) => "delete_all_for_day",
        BulkScope::Week => "clear_current_week",
    }
}
