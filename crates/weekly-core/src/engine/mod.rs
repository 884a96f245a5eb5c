//! Optimistic mutation engine and week session controller.
//!
//! Every mutation follows the same protocol:
//! 1. Apply the change to the local working copy under the state lock
//! 2. Release the lock and issue the remote call
//! 3. On success reconcile server identity; on failure roll back the
//!    change (creations) or refetch the week (everything else)
//!
//! The lock is a `std::sync::Mutex` that is never held across an `.await`,
//! so concurrent mutations only interleave at gateway and store calls.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::NaiveDate;
use uuid::Uuid;

use crate::dates;
use crate::error::CoreError;
use crate::gateway::{GatewayError, TaskGateway};
use crate::models::{
    DayIndex, EngineConfig, Group, MutationOutcome, RecurrenceException, RecurrenceRule, Task, TaskId, WeekState,
};
use crate::state::WeekSession;
use crate::store::{self, DocumentStore, TaskMeta, UserDataDocument};

mod bulk;
mod catalog;
mod groups;
mod moves;
mod recurrence;
mod session;
mod tasks;

pub use tasks::NewTask;

pub(crate) struct EngineState {
    pub(crate) session: WeekSession,
    pub(crate) document: UserDataDocument,
}

/// Local document entries a delete removed before its remote call.
/// Put back when the call fails, so the resync sees the rows as they were.
#[derive(Debug)]
pub(crate) struct RemovedLocalState {
    week_start: NaiveDate,
    meta: BTreeMap<TaskId, TaskMeta>,
    skips: BTreeMap<TaskId, (Uuid, NaiveDate)>,
    groups: Vec<Group>,
    recurrence: Option<(RecurrenceRule, Option<RecurrenceException>)>,
}

impl RemovedLocalState {
    pub(crate) fn new(week_start: NaiveDate) -> Self {
        Self {
            week_start,
            meta: BTreeMap::new(),
            skips: BTreeMap::new(),
            groups: Vec::new(),
            recurrence: None,
        }
    }

    /// Removes the meta entry of `id` from the document, keeping a copy.
    pub(crate) fn take_meta(&mut self, document: &mut UserDataDocument, id: &str) -> bool {
        match document.task_meta.remove(id) {
            Some(meta) => {
                self.meta.insert(id.to_string(), meta);
                true
            }
            None => false,
        }
    }

    /// Records a skip date added for the persisted row `id`.
    pub(crate) fn skip_added(&mut self, id: &str, key: (Uuid, NaiveDate)) {
        self.skips.insert(id.to_string(), key);
    }

    pub(crate) fn group_removed(&mut self, group: Group) {
        self.groups.push(group);
    }

    pub(crate) fn recurrence_removed(&mut self, rule: RecurrenceRule, exception: Option<RecurrenceException>) {
        self.recurrence = Some((rule, exception));
    }

    /// Forgets everything that belongs to rows outside `failed`.
    pub(crate) fn retain_tasks(&mut self, failed: &[TaskId]) {
        self.meta.retain(|id, _| failed.contains(id));
        self.skips.retain(|id, _| failed.contains(id));
    }

    fn restore(self, state: &mut EngineState) {
        let EngineState { session, document } = state;
        if let Some((rule, exception)) = self.recurrence {
            if let Some(exception) = exception {
                document.recurrence_exceptions.entry(rule.id).or_insert(exception);
            }
            document.recurrences.entry(rule.id).or_insert(rule);
        }
        for (id, meta) in self.meta {
            document.task_meta.entry(id).or_insert(meta);
        }
        for (recurrence_id, date) in self.skips.into_values() {
            document.remove_skip_date(recurrence_id, date);
        }

        if self.groups.is_empty() {
            return;
        }
        let week_start = self.week_start;
        let current = session.week_start() == week_start;
        let mut groups = if current { session.groups.clone() } else { document.groups_for(week_start) };
        for group in self.groups {
            if !groups.iter().any(|g| g.id == group.id) {
                groups.push(group);
            }
        }
        groups.sort_by_key(|g| (g.day_index, g.position));
        let mut next: BTreeMap<DayIndex, usize> = BTreeMap::new();
        for group in groups.iter_mut() {
            let slot = next.entry(group.day_index).or_insert(0);
            group.position = *slot;
            *slot += 1;
        }
        document.set_groups(week_start, groups.clone());
        if current {
            session.groups = groups;
        }
    }
}

pub struct WeekEngine<G, S> {
    gateway: Arc<G>,
    store: Arc<S>,
    config: EngineConfig,
    state: Mutex<EngineState>,
    /// Serializes document writes so the last write carries the newest copy.
    save_lock: tokio::sync::Mutex<()>,
}

impl<G: TaskGateway, S: DocumentStore> WeekEngine<G, S> {
    /// Loads the local document and prepares a session for the week
    /// containing `date`. No remote call is made; see [`WeekEngine::refresh`].
    pub async fn load(
        gateway: Arc<G>,
        store: Arc<S>,
        config: EngineConfig,
        date: NaiveDate,
    ) -> Result<Self, CoreError> {
        let document = store::load_user_data(store.as_ref()).await?;
        let week_start = dates::sunday_for_date(date);
        let mut session = WeekSession::new(week_start);
        session.groups = document.groups_for(week_start);
        session.rebuild_occurrences(&document);

        Ok(Self {
            gateway,
            store,
            config,
            state: Mutex::new(EngineState { session, document }),
            save_lock: tokio::sync::Mutex::new(()),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn gateway(&self) -> &Arc<G> {
        &self.gateway
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Current view of the week.
    pub fn snapshot(&self) -> WeekState {
        let state = self.lock();
        state.session.snapshot(&state.document)
    }

    pub fn week_start(&self) -> NaiveDate {
        self.lock().session.week_start()
    }

    pub fn task(&self, id: &str) -> Option<Task> {
        self.lock().session.task(id).cloned()
    }

    /// Copy of the local document, as it will next be persisted.
    pub fn document(&self) -> UserDataDocument {
        self.lock().document.clone()
    }

    /// Writes the current document. Failures are logged and reported as
    /// `false`; local state is kept either way.
    pub(crate) async fn persist_document(&self) -> bool {
        let _guard = self.save_lock.lock().await;
        let document = self.lock().document.clone();
        match store::save_user_data(self.store.as_ref(), &document).await {
            Ok(()) => true,
            Err(error) => {
                tracing::warn!(%error, "failed to persist local document");
                false
            }
        }
    }

    /// Puts back what a failed delete removed from the local document, then
    /// resyncs the week.
    pub(crate) async fn resync_after_failed_delete(
        &self,
        operation: &str,
        error: &GatewayError,
        removed: RemovedLocalState,
    ) -> MutationOutcome {
        {
            let mut state = self.lock();
            removed.restore(&mut state);
        }
        self.persist_document().await;
        self.resync(operation, error).await
    }

    /// Refetches the week after a failed remote call.
    pub(crate) async fn resync(&self, operation: &str, error: &GatewayError) -> MutationOutcome {
        tracing::warn!(operation, %error, "remote call failed, resyncing week");
        let outcome = self.refresh().await;
        tracing::debug!(operation, ?outcome, "resync finished");
        MutationOutcome::Resynced
    }

    fn require_task(state: &EngineState, id: &str) -> Result<Task, CoreError> {
        state
            .session
            .task(id)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(format!("Task with id {} not found", id)))
    }
}
