use std::collections::BTreeSet;

use uuid::Uuid;

use super::{EngineState, RemovedLocalState, WeekEngine};
use crate::dates;
use crate::error::CoreError;
use crate::gateway::TaskGateway;
use crate::models::{is_local_only_id, is_occurrence_id, MutationOutcome, RecurrenceDraft, RecurrenceRule, TaskId};
use crate::positions;
use crate::store::DocumentStore;

impl<G: TaskGateway, S: DocumentStore> WeekEngine<G, S> {
    /// Turns a task into the template of a recurrence rule, or updates the
    /// rule it already belongs to.
    ///
    /// The rule copies the task's content. The task itself becomes the
    /// occurrence for its own date, so the expander does not produce a
    /// duplicate next to it. Returns the rule id.
    pub async fn create_or_update_recurrence_from_task(
        &self,
        task_id: &str,
        draft: RecurrenceDraft,
    ) -> Result<(Uuid, MutationOutcome), CoreError> {
        let draft = draft.normalize()?;

        let recurrence_id = {
            let mut state = self.lock();
            let task = Self::require_task(&state, task_id)?;
            let EngineState { session, document } = &mut *state;

            let recurrence_id = task.recurrence_id.unwrap_or_else(Uuid::new_v4);
            let rule = RecurrenceRule {
                id: recurrence_id,
                frequency: draft.frequency,
                interval: draft.interval_u32(),
                start_date: draft.start_date,
                end_date: draft.end_date,
                title: task.title.clone(),
                kind: task.kind,
                links_markdown: task.links_markdown.clone(),
                location: task.location.clone(),
                notes_markdown: task.notes_markdown.clone(),
                goal_ids: task.goal_ids.clone(),
                companion_ids: task.companion_ids.clone(),
                group_id: task.group_id,
            };
            let created = document.recurrences.insert(recurrence_id, rule).is_none();

            let occurrence_date = task
                .occurrence_date
                .unwrap_or_else(|| dates::week_date(session.week_start(), task.day_index));
            if let Some(linked) = session.task_mut(task_id) {
                linked.recurrence_id = Some(recurrence_id);
                linked.occurrence_date = Some(occurrence_date);
            }
            session.touch(task_id);
            if let Some(linked) = session.task(task_id).cloned() {
                if !is_occurrence_id(task_id) {
                    document.record_meta(&linked);
                }
            }
            session.rebuild_occurrences(document);

            tracing::debug!(
                %recurrence_id,
                task_id,
                created,
                frequency = %draft.frequency,
                interval = draft.interval,
                "recurrence rule saved"
            );
            recurrence_id
        };

        self.persist_document().await;
        Ok((recurrence_id, MutationOutcome::Applied))
    }

    /// Removes a rule, its exceptions and every task linked to it.
    ///
    /// Virtual occurrences vanish at once. Rows materialized from the rule,
    /// in this week or any other, are deleted remotely. When any of those
    /// deletes fails, the rule and the links of the surviving rows are put
    /// back before the resync.
    pub async fn delete_recurrence_series(&self, recurrence_id: Uuid) -> Result<MutationOutcome, CoreError> {
        let (remote_ids, mut restorable) = {
            let mut state = self.lock();
            let EngineState { session, document } = &mut *state;
            let exception = document.recurrence_exceptions.get(&recurrence_id).cloned();
            let Some(rule) = document.remove_recurrence(recurrence_id) else {
                return Err(CoreError::NotFound(format!(
                    "Recurrence with id {} not found",
                    recurrence_id
                )));
            };
            let mut restorable = RemovedLocalState::new(session.week_start());
            restorable.recurrence_removed(rule, exception);

            let mut remote: BTreeSet<TaskId> = BTreeSet::new();
            for id in document.linked_task_ids(recurrence_id) {
                restorable.take_meta(document, &id);
                remote.insert(id);
            }

            let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut session.tasks)
                .into_iter()
                .partition(|t| t.recurrence_id == Some(recurrence_id));
            session.tasks = kept;
            positions::normalize(&mut session.tasks);

            for task in &removed {
                session.touch(&task.id);
                if session.is_creating(&task.id) {
                    session.mark_deleted_while_creating(&task.id);
                    remote.remove(&task.id);
                } else if !is_local_only_id(&task.id) {
                    remote.insert(task.id.clone());
                }
            }
            remote.retain(|id| !is_local_only_id(id));
            for id in &remote {
                session.begin_call(id);
            }
            tracing::debug!(
                %recurrence_id,
                removed = removed.len(),
                remote = remote.len(),
                "deleted recurrence series locally"
            );
            let remote_ids: Vec<TaskId> = remote.into_iter().collect();
            (remote_ids, restorable)
        };

        self.persist_document().await;

        let mut failure = None;
        let mut failed_ids: Vec<TaskId> = Vec::new();
        for task_id in &remote_ids {
            let result = self.gateway.delete_task(task_id).await;
            self.lock().session.end_call(task_id);
            if let Err(error) = result {
                failure.get_or_insert(error);
                failed_ids.push(task_id.clone());
            }
        }
        match failure {
            Some(error) => {
                restorable.retain_tasks(&failed_ids);
                Ok(self
                    .resync_after_failed_delete("delete_recurrence_series", &error, restorable)
                    .await)
            }
            None => Ok(MutationOutcome::Applied),
        }
    }

    /// Every known rule, ordered by id.
    pub fn recurrences(&self) -> Vec<RecurrenceRule> {
        self.lock().document.recurrences.values().cloned().collect()
    }

    pub fn recurrence(&self, recurrence_id: Uuid) -> Option<RecurrenceRule> {
        self.lock().document.recurrences.get(&recurrence_id).cloned()
    }
}
