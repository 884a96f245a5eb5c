use chrono::Utc;
use uuid::Uuid;

use super::{EngineState, RemovedLocalState, WeekEngine};
use crate::dates;
use crate::error::CoreError;
use crate::gateway::TaskGateway;
use crate::models::{is_local_only_id, DayIndex, Group, MutationOutcome, TaskId};
use crate::store::DocumentStore;

const DEFAULT_GROUP_TITLE: &str = "New Group";

impl<G: TaskGateway, S: DocumentStore> WeekEngine<G, S> {
    /// Adds a group after the day's existing groups. Groups are kept in the
    /// local document only.
    pub async fn add_group(&self, day_index: DayIndex, title: Option<String>) -> Result<Group, CoreError> {
        dates::validate_day_index(day_index)?;
        let group = {
            let mut state = self.lock();
            let EngineState { session, document } = &mut *state;
            let position = session
                .groups
                .iter()
                .filter(|g| g.day_index == day_index)
                .map(|g| g.position + 1)
                .max()
                .unwrap_or(0);
            let group = Group {
                id: Uuid::new_v4(),
                title: title
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty())
                    .unwrap_or_else(|| DEFAULT_GROUP_TITLE.to_string()),
                day_index,
                position,
                created_at: Utc::now(),
            };
            session.groups.push(group.clone());
            document.set_groups(session.week_start(), session.groups.clone());
            group
        };
        self.persist_document().await;
        Ok(group)
    }

    pub async fn update_group_title(&self, id: Uuid, title: impl Into<String>) -> Result<MutationOutcome, CoreError> {
        let title = title.into();
        {
            let mut state = self.lock();
            let EngineState { session, document } = &mut *state;
            let group = session
                .groups
                .iter_mut()
                .find(|g| g.id == id)
                .ok_or_else(|| CoreError::NotFound(format!("Group with id {} not found", id)))?;
            group.title = title;
            document.set_groups(session.week_start(), session.groups.clone());
        }
        self.persist_document().await;
        Ok(MutationOutcome::Applied)
    }

    /// Removes a group together with the tasks inside it.
    ///
    /// Occurrences in the group are suppressed with skip dates; persisted
    /// tasks are deleted remotely one by one. When any delete fails, the
    /// group and the local attributes of the surviving rows are put back
    /// before the resync.
    pub async fn delete_group(&self, id: Uuid) -> Result<MutationOutcome, CoreError> {
        let (remote_ids, mut restorable) = {
            let mut state = self.lock();
            let EngineState { session, document } = &mut *state;
            let index = session
                .groups
                .iter()
                .position(|g| g.id == id)
                .ok_or_else(|| CoreError::NotFound(format!("Group with id {} not found", id)))?;
            let group = session.groups.remove(index);
            let mut restorable = RemovedLocalState::new(session.week_start());
            let mut day_groups: Vec<&mut Group> = session
                .groups
                .iter_mut()
                .filter(|g| g.day_index == group.day_index)
                .collect();
            day_groups.sort_by_key(|g| g.position);
            for (position, g) in day_groups.into_iter().enumerate() {
                g.position = position;
            }
            document.set_groups(session.week_start(), session.groups.clone());
            restorable.group_removed(group);

            let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut session.tasks)
                .into_iter()
                .partition(|t| t.group_id == Some(id));
            session.tasks = kept;

            let mut remote_ids: Vec<TaskId> = Vec::new();
            for task in removed {
                session.touch(&task.id);
                if let Some((recurrence_id, date)) = task.occurrence_key() {
                    if document.add_skip_date(recurrence_id, date) && !is_local_only_id(&task.id) {
                        restorable.skip_added(&task.id, (recurrence_id, date));
                    }
                }
                restorable.take_meta(document, &task.id);
                if session.is_creating(&task.id) {
                    session.mark_deleted_while_creating(&task.id);
                } else if !is_local_only_id(&task.id) {
                    session.begin_call(&task.id);
                    remote_ids.push(task.id);
                }
            }
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
                Ok(self.resync_after_failed_delete("delete_group", &error, restorable).await)
            }
            None => Ok(MutationOutcome::Applied),
        }
    }
}
