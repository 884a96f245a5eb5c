use uuid::Uuid;

use super::{EngineState, RemovedLocalState, WeekEngine};
use crate::dates;
use crate::error::CoreError;
use crate::gateway::{TaskCreate, TaskGateway, TaskUpdate};
use crate::models::{
    is_local_only_id, is_occurrence_id, new_temporary_id, AddedTask, Container, DayIndex,
    ItemType, MutationOutcome, Task, TaskId, TaskLocation, TaskPatch, TaskSchedule, TaskStatus,
};
use crate::positions;
use crate::store::DocumentStore;

const DEFAULT_TASK_TITLE: &str = "New task...";

/// Fields of a task about to be created.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub title: String,
    pub day_index: DayIndex,
    pub group_id: Option<Uuid>,
    pub kind: ItemType,
    pub notes_markdown: Option<String>,
    pub links_markdown: Option<String>,
}

impl NewTask {
    pub fn new(title: impl Into<String>, day_index: DayIndex) -> Self {
        Self {
            title: title.into(),
            day_index,
            group_id: None,
            kind: ItemType::Task,
            notes_markdown: None,
            links_markdown: None,
        }
    }

    pub fn in_group(mut self, group_id: Uuid) -> Self {
        self.group_id = Some(group_id);
        self
    }

    pub fn of_kind(mut self, kind: ItemType) -> Self {
        self.kind = kind;
        self
    }
}

enum PatchRoute {
    Deferred,
    Materialize(TaskCreate),
    Remote(TaskUpdate),
    Dropped,
}

enum Settle {
    Done,
    Delete,
    Update(TaskUpdate),
}

enum DeleteRoute {
    LocalOnly,
    Remote,
}

impl<G: TaskGateway, S: DocumentStore> WeekEngine<G, S> {
    /// Creates a task at the end of its container.
    ///
    /// The task shows up immediately under a temporary id, which is replaced
    /// by the server id once the create succeeds. A failed create removes it.
    pub async fn add_task(&self, new_task: NewTask) -> Result<AddedTask, CoreError> {
        dates::validate_day_index(new_task.day_index)?;
        let title = match new_task.title.trim() {
            "" => DEFAULT_TASK_TITLE.to_string(),
            title => title.to_string(),
        };

        let (id, payload, has_meta) = {
            let mut state = self.lock();
            let EngineState { session, document } = &mut *state;
            if let Some(group_id) = new_task.group_id {
                let on_day = session
                    .groups()
                    .iter()
                    .any(|g| g.id == group_id && g.day_index == new_task.day_index);
                if !on_day {
                    return Err(CoreError::InvalidInput(format!(
                        "Group {} does not exist on day {}",
                        group_id, new_task.day_index
                    )));
                }
            }

            let container = Container {
                day_index: new_task.day_index,
                group_id: new_task.group_id,
            };
            let position = positions::next_position(session.tasks(), container);
            let mut task = Task::new(new_temporary_id(), title, new_task.day_index, position);
            task.group_id = new_task.group_id;
            task.kind = new_task.kind;
            task.notes_markdown = new_task.notes_markdown;
            task.links_markdown = new_task.links_markdown;

            let payload = TaskCreate::from_task(&task, dates::week_date(session.week_start(), task.day_index));
            document.record_meta(&task);
            let has_meta = document.task_meta.contains_key(&task.id);
            session.touch(&task.id);
            session.begin_create(&task.id);
            let id = task.id.clone();
            session.tasks.push(task);
            (id, payload, has_meta)
        };

        if has_meta {
            self.persist_document().await;
        }
        let (id, outcome) = self.push_create(&id, payload, true).await;
        Ok(AddedTask { id, outcome })
    }

    /// Issues a remote create for a task already present locally under
    /// `local_id`, then reconciles.
    ///
    /// On failure the task is removed when `rollback` is set, otherwise the
    /// week is refetched. Returns the id the task ended up with.
    pub(crate) async fn push_create(
        &self,
        local_id: &str,
        payload: TaskCreate,
        rollback: bool,
    ) -> (TaskId, MutationOutcome) {
        let result = self.gateway.create_task(&payload).await;

        let row = match result {
            Ok(row) => row,
            Err(error) => {
                let had_meta = {
                    let mut state = self.lock();
                    state.session.finish_create(local_id);
                    state.session.take_deferred(local_id);
                    if rollback {
                        state.session.remove_task(local_id);
                        state.document.task_meta.remove(local_id).is_some()
                    } else {
                        false
                    }
                };
                if had_meta {
                    self.persist_document().await;
                }
                if rollback {
                    tracing::warn!(task_id = local_id, %error, "create failed, rolled back");
                    return (local_id.to_string(), MutationOutcome::RolledBack);
                }
                return (local_id.to_string(), self.resync("create_task", &error).await);
            }
        };

        let (settle, persist) = {
            let mut state = self.lock();
            let EngineState { session, document } = &mut *state;
            let deleted = session.finish_create(local_id);
            let deferred = session.take_deferred(local_id);
            if deleted {
                let had_meta = document.task_meta.remove(local_id).is_some();
                (Settle::Delete, had_meta)
            } else {
                let had_meta = document.task_meta.contains_key(local_id);
                session.relabel(local_id, &row.id);
                document.relabel_meta(local_id, &row.id);
                match session.task(&row.id).cloned() {
                    Some(task) => {
                        document.record_meta(&task);
                        let persist = had_meta || document.task_meta.contains_key(&row.id);

                        let mut update = deferred.map(|patch| TaskUpdate::from(&patch)).unwrap_or_default();
                        if let Some(follow_up) = TaskCreate::follow_up(&task) {
                            update.fill_from(follow_up);
                        }
                        let assigned = dates::week_date(session.week_start(), task.day_index);
                        let position = i64::try_from(task.position).unwrap_or(i64::MAX);
                        if assigned != row.assigned_date || position != row.position {
                            update.fill_from(TaskUpdate::placement(assigned, task.position));
                        }
                        if update.is_empty() {
                            (Settle::Done, persist)
                        } else {
                            session.begin_call(&row.id);
                            (Settle::Update(update), persist)
                        }
                    }
                    None => (Settle::Done, had_meta),
                }
            }
        };

        if persist {
            self.persist_document().await;
        }

        match settle {
            Settle::Done => (row.id, MutationOutcome::Applied),
            Settle::Delete => match self.gateway.delete_task(&row.id).await {
                Ok(()) => (row.id, MutationOutcome::Applied),
                Err(error) => {
                    let outcome = self.resync("delete_task", &error).await;
                    (row.id, outcome)
                }
            },
            Settle::Update(update) => {
                let result = self.gateway.update_task(&row.id, &update).await;
                self.lock().session.end_call(&row.id);
                match result {
                    Ok(_) => (row.id, MutationOutcome::Applied),
                    Err(error) => {
                        let outcome = self.resync("update_task", &error).await;
                        (row.id, outcome)
                    }
                }
            }
        }
    }

    /// Sends a patch already applied locally.
    ///
    /// Patches for a task whose create is in flight are deferred until it
    /// settles; a patch on a virtual occurrence materializes it.
    pub(crate) async fn push_patch(&self, id: &str, patch: TaskPatch) -> MutationOutcome {
        let route = {
            let mut state = self.lock();
            let session = &mut state.session;
            if session.is_creating(id) {
                session.defer_patch(id, patch);
                PatchRoute::Deferred
            } else if is_occurrence_id(id) {
                match session.task(id).cloned() {
                    Some(task) => {
                        let assigned = dates::week_date(session.week_start(), task.day_index);
                        session.begin_create(id);
                        PatchRoute::Materialize(TaskCreate::from_task(&task, assigned))
                    }
                    None => PatchRoute::Dropped,
                }
            } else if is_local_only_id(id) {
                PatchRoute::Dropped
            } else {
                session.begin_call(id);
                PatchRoute::Remote(TaskUpdate::from(&patch))
            }
        };

        match route {
            PatchRoute::Deferred => MutationOutcome::Applied,
            PatchRoute::Dropped => {
                tracing::debug!(task_id = id, "patch target no longer exists remotely");
                MutationOutcome::Applied
            }
            PatchRoute::Materialize(payload) => self.push_create(id, payload, false).await.1,
            PatchRoute::Remote(update) => {
                let result = self.gateway.update_task(id, &update).await;
                self.lock().session.end_call(id);
                match result {
                    Ok(_) => MutationOutcome::Applied,
                    Err(error) => self.resync("update_task", &error).await,
                }
            }
        }
    }

    /// Applies `patch` locally and sends it.
    pub async fn update_task(&self, id: &str, patch: TaskPatch) -> Result<MutationOutcome, CoreError> {
        {
            let mut state = self.lock();
            let task = state
                .session
                .task_mut(id)
                .ok_or_else(|| CoreError::NotFound(format!("Task with id {} not found", id)))?;
            patch.apply_to(task);
            state.session.touch(id);
        }
        if patch.is_empty() {
            return Ok(MutationOutcome::Applied);
        }
        Ok(self.push_patch(id, patch).await)
    }

    pub async fn update_task_status(&self, id: &str, status: TaskStatus) -> Result<MutationOutcome, CoreError> {
        self.update_task(id, TaskPatch::status(status)).await
    }

    pub async fn update_task_title(&self, id: &str, title: impl Into<String>) -> Result<MutationOutcome, CoreError> {
        self.update_task(id, TaskPatch::title(title)).await
    }

    pub async fn update_task_links(&self, id: &str, links_markdown: Option<String>) -> Result<MutationOutcome, CoreError> {
        let patch = TaskPatch {
            links_markdown: Some(links_markdown.filter(|m| !m.trim().is_empty())),
            ..Default::default()
        };
        self.update_task(id, patch).await
    }

    pub async fn update_task_notes(&self, id: &str, notes_markdown: Option<String>) -> Result<MutationOutcome, CoreError> {
        let patch = TaskPatch {
            notes_markdown: Some(notes_markdown),
            ..Default::default()
        };
        self.update_task(id, patch).await
    }

    pub async fn update_task_location(&self, id: &str, location: Option<TaskLocation>) -> Result<MutationOutcome, CoreError> {
        let patch = TaskPatch {
            location: Some(location),
            ..Default::default()
        };
        self.update_task(id, patch).await
    }

    /// Replaces all four schedule fields; `None` clears one.
    pub async fn update_task_schedule(&self, id: &str, schedule: TaskSchedule) -> Result<MutationOutcome, CoreError> {
        if let (Some(start), Some(end)) = (schedule.start_date, schedule.end_date) {
            if end < start {
                return Err(CoreError::InvalidInput(format!(
                    "End date {} is before start date {}",
                    end, start
                )));
            }
        }
        self.update_task(id, TaskPatch::schedule(schedule)).await
    }

    /// Manual-save mode: applies `patch` locally and buffers it until
    /// [`WeekEngine::commit_task_patch`].
    pub fn patch_task_local(&self, id: &str, patch: TaskPatch) -> Result<(), CoreError> {
        let mut state = self.lock();
        let task = state
            .session
            .task_mut(id)
            .ok_or_else(|| CoreError::NotFound(format!("Task with id {} not found", id)))?;
        patch.apply_to(task);
        state.session.touch(id);
        state.session.buffer_patch(id, patch);
        Ok(())
    }

    /// Sends the buffered patch of `id` as one update.
    pub async fn commit_task_patch(&self, id: &str) -> Result<MutationOutcome, CoreError> {
        let patch = {
            let mut state = self.lock();
            let patch = state.session.take_dirty(id);
            if patch.is_some() && state.session.task(id).is_none() {
                return Err(CoreError::NotFound(format!("Task with id {} not found", id)));
            }
            patch
        };
        match patch {
            Some(patch) if !patch.is_empty() => Ok(self.push_patch(id, patch).await),
            _ => Ok(MutationOutcome::Applied),
        }
    }

    /// Deletes a task. A recurrence occurrence is suppressed with a skip
    /// date instead of disappearing only until the next expansion.
    pub async fn delete_task(&self, id: &str) -> Result<MutationOutcome, CoreError> {
        let (route, removed, document_changed) = {
            let mut state = self.lock();
            let EngineState { session, document } = &mut *state;
            let task = session
                .remove_task(id)
                .ok_or_else(|| CoreError::NotFound(format!("Task with id {} not found", id)))?;
            session.touch(id);

            let mut removed = RemovedLocalState::new(session.week_start());
            let mut skip_added = None;
            if let Some((recurrence_id, date)) = task.occurrence_key() {
                if document.add_skip_date(recurrence_id, date) {
                    skip_added = Some((recurrence_id, date));
                }
            }
            let meta_removed = removed.take_meta(document, id);
            let document_changed = skip_added.is_some() || meta_removed;

            let route = if session.is_creating(id) {
                session.mark_deleted_while_creating(id);
                DeleteRoute::LocalOnly
            } else if is_local_only_id(id) {
                DeleteRoute::LocalOnly
            } else {
                if let Some(key) = skip_added {
                    removed.skip_added(id, key);
                }
                session.begin_call(id);
                DeleteRoute::Remote
            };
            (route, removed, document_changed)
        };

        if document_changed {
            self.persist_document().await;
        }

        match route {
            DeleteRoute::LocalOnly => Ok(MutationOutcome::Applied),
            DeleteRoute::Remote => {
                let result = self.gateway.delete_task(id).await;
                self.lock().session.end_call(id);
                match result {
                    Ok(()) => Ok(MutationOutcome::Applied),
                    Err(error) => Ok(self.resync_after_failed_delete("delete_task", &error, removed).await),
                }
            }
        }
    }

    /// Deletes one occurrence of a series by recording a skip date; plain
    /// tasks are deleted outright.
    pub async fn delete_task_occurrence(&self, id: &str) -> Result<MutationOutcome, CoreError> {
        self.delete_task(id).await
    }
}
