//! The in-memory working copy of one week and its reconciliation rules.
//!
//! [`WeekSession`] is plain data plus reducer-style transitions; it never
//! performs I/O. The engine drives it from around its gateway calls.

use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};

use crate::dates;
use crate::gateway::TaskRow;
use crate::models::{
    FetchOutcome, Group, SessionPhase, Task, TaskId, TaskPatch, WeekState,
};
use crate::positions;
use crate::recurrence;
use crate::store::UserDataDocument;

/// Identifies one fetch so its response can be fenced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket {
    pub token: u64,
    pub week_start: NaiveDate,
    /// Edit sequence at the moment the fetch was issued.
    pub edit_mark: u64,
}

#[derive(Debug, Clone)]
pub struct WeekSession {
    pub(crate) week_start: NaiveDate,
    pub(crate) tasks: Vec<Task>,
    pub(crate) groups: Vec<Group>,
    pub(crate) phase: SessionPhase,
    pub(crate) available_weeks: Vec<NaiveDate>,
    fetch_seq: u64,
    edit_seq: u64,
    /// Last edit sequence per task.
    touched: HashMap<TaskId, u64>,
    /// Remote calls currently outstanding per task.
    in_flight: HashMap<TaskId, usize>,
    /// Ids whose remote create has been issued but not settled.
    creating: HashSet<TaskId>,
    /// Creating ids deleted locally before the create settled.
    deleted_while_creating: HashSet<TaskId>,
    /// Manual-save patches waiting for an explicit commit.
    dirty: HashMap<TaskId, TaskPatch>,
    /// Patches for ids whose create is in flight, sent once it settles.
    deferred: HashMap<TaskId, TaskPatch>,
}

impl WeekSession {
    pub fn new(week_start: NaiveDate) -> Self {
        Self {
            week_start: dates::sunday_for_date(week_start),
            tasks: Vec::new(),
            groups: Vec::new(),
            phase: SessionPhase::Idle,
            available_weeks: Vec::new(),
            fetch_seq: 0,
            edit_seq: 0,
            touched: HashMap::new(),
            in_flight: HashMap::new(),
            creating: HashSet::new(),
            deleted_while_creating: HashSet::new(),
            dirty: HashMap::new(),
            deferred: HashMap::new(),
        }
    }

    pub fn week_start(&self) -> NaiveDate {
        self.week_start
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn task_mut(&mut self, id: &str) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }

    /// Removes a task and closes the gap it leaves in its container.
    pub fn remove_task(&mut self, id: &str) -> Option<Task> {
        let index = self.tasks.iter().position(|t| t.id == id)?;
        let task = self.tasks.remove(index);
        positions::reindex(&mut self.tasks, task.container());
        Some(task)
    }

    pub fn snapshot(&self, document: &UserDataDocument) -> WeekState {
        let mut tasks = self.tasks.clone();
        tasks.sort_by_key(|t| (t.day_index, t.group_id, t.position));
        let mut groups = self.groups.clone();
        groups.sort_by_key(|g| (g.day_index, g.position));
        WeekState {
            week_start: self.week_start,
            tasks,
            groups,
            goals: document.goals.clone(),
            companions: document.companions.clone(),
            is_loading: self.phase == SessionPhase::Loading,
        }
    }

    // =========================================================================
    // Edit bookkeeping
    // =========================================================================

    /// Records a local edit of `id`.
    pub fn touch(&mut self, id: &str) {
        self.edit_seq += 1;
        self.touched.insert(id.to_string(), self.edit_seq);
    }

    pub fn begin_call(&mut self, id: &str) {
        *self.in_flight.entry(id.to_string()).or_insert(0) += 1;
    }

    pub fn end_call(&mut self, id: &str) {
        if let Some(count) = self.in_flight.get_mut(id) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.in_flight.remove(id);
            }
        }
    }

    pub fn begin_create(&mut self, id: &str) {
        self.creating.insert(id.to_string());
        self.begin_call(id);
    }

    pub fn is_creating(&self, id: &str) -> bool {
        self.creating.contains(id)
    }

    /// Notes that a creating task was deleted locally.
    pub fn mark_deleted_while_creating(&mut self, id: &str) {
        if self.creating.contains(id) {
            self.deleted_while_creating.insert(id.to_string());
        }
    }

    /// Settles a create. Returns whether the task was deleted meanwhile.
    pub fn finish_create(&mut self, id: &str) -> bool {
        self.end_call(id);
        self.creating.remove(id);
        self.deleted_while_creating.remove(id)
    }

    pub fn defer_patch(&mut self, id: &str, patch: TaskPatch) {
        self.deferred.entry(id.to_string()).or_default().merge(patch);
    }

    pub fn take_deferred(&mut self, id: &str) -> Option<TaskPatch> {
        self.deferred.remove(id)
    }

    pub fn buffer_patch(&mut self, id: &str, patch: TaskPatch) {
        self.dirty.entry(id.to_string()).or_default().merge(patch);
    }

    pub fn take_dirty(&mut self, id: &str) -> Option<TaskPatch> {
        self.dirty.remove(id)
    }

    pub fn dirty_ids(&self) -> Vec<TaskId> {
        self.dirty.keys().cloned().collect()
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Moves every piece of per-task bookkeeping from `old_id` to `new_id`.
    pub fn relabel(&mut self, old_id: &str, new_id: &str) {
        if let Some(task) = self.task_mut(old_id) {
            task.id = new_id.to_string();
        }
        if let Some(seq) = self.touched.remove(old_id) {
            self.touched.insert(new_id.to_string(), seq);
        }
        if let Some(count) = self.in_flight.remove(old_id) {
            *self.in_flight.entry(new_id.to_string()).or_insert(0) += count;
        }
        if let Some(patch) = self.dirty.remove(old_id) {
            self.dirty.entry(new_id.to_string()).or_default().merge(patch);
        }
    }

    /// Whether a fetch issued at `edit_mark` must not overwrite `id`.
    fn is_protected(&self, id: &str, edit_mark: u64) -> bool {
        self.in_flight.contains_key(id)
            || self.creating.contains(id)
            || self.dirty.contains_key(id)
            || self.deferred.contains_key(id)
            || self.touched.get(id).is_some_and(|seq| *seq > edit_mark)
    }

    // =========================================================================
    // Fetch lifecycle
    // =========================================================================

    pub fn begin_fetch(&mut self) -> FetchTicket {
        self.fetch_seq += 1;
        self.phase = SessionPhase::Loading;
        FetchTicket {
            token: self.fetch_seq,
            week_start: self.week_start,
            edit_mark: self.edit_seq,
        }
    }

    pub fn is_current(&self, ticket: &FetchTicket) -> bool {
        ticket.token == self.fetch_seq && ticket.week_start == self.week_start
    }

    /// A failed fetch keeps the previous tasks and groups.
    pub fn fail_fetch(&mut self, ticket: &FetchTicket) -> FetchOutcome {
        if !self.is_current(ticket) {
            return FetchOutcome::Stale;
        }
        self.phase = SessionPhase::Idle;
        FetchOutcome::Failed
    }

    /// Merges a fetch response into the working copy.
    ///
    /// # Behavior
    /// - Responses for a superseded token or week are discarded
    /// - Protected tasks keep their local version, or stay deleted
    /// - Everything else takes the server row overlaid with its local meta
    /// - Occurrences are re-expanded and every container is made dense
    pub fn apply_fetch(
        &mut self,
        ticket: &FetchTicket,
        rows: Vec<TaskRow>,
        document: &UserDataDocument,
    ) -> FetchOutcome {
        if !self.is_current(ticket) {
            tracing::warn!(
                token = ticket.token,
                week_start = %ticket.week_start,
                "discarding stale fetch response"
            );
            return FetchOutcome::Stale;
        }

        let mut local: HashMap<TaskId, Task> = HashMap::new();
        let mut local_order: Vec<TaskId> = Vec::with_capacity(self.tasks.len());
        for task in self.tasks.drain(..) {
            local_order.push(task.id.clone());
            local.insert(task.id.clone(), task);
        }

        let mut merged = Vec::with_capacity(rows.len());
        let mut kept_local = 0usize;
        for row in rows {
            if self.is_protected(&row.id, ticket.edit_mark) {
                if let Some(task) = local.remove(&row.id) {
                    merged.push(task);
                    kept_local += 1;
                }
                continue;
            }
            let Some(mut task) = row.to_task(self.week_start) else {
                continue;
            };
            if let Some(meta) = document.task_meta.get(&task.id) {
                meta.apply_to(&mut task);
            }
            local.remove(&task.id);
            merged.push(task);
        }
        for id in local_order {
            if self.is_protected(&id, ticket.edit_mark) {
                if let Some(task) = local.remove(&id) {
                    merged.push(task);
                    kept_local += 1;
                }
            }
        }

        tracing::debug!(
            week_start = %self.week_start,
            rows = merged.len(),
            kept_local,
            "merged fetch response"
        );

        self.tasks = merged;
        self.expand_and_normalize(document);
        self.phase = SessionPhase::Idle;
        FetchOutcome::Loaded
    }

    /// Re-derives virtual occurrences after a rule, exception or group change.
    pub fn rebuild_occurrences(&mut self, document: &UserDataDocument) {
        self.expand_and_normalize(document);
    }

    /// Virtual occurrences with no pending work are dropped and regenerated.
    fn expand_and_normalize(&mut self, document: &UserDataDocument) {
        let known_groups: HashSet<_> = self.groups.iter().map(|g| g.id).collect();
        let base: Vec<Task> = std::mem::take(&mut self.tasks)
            .into_iter()
            .filter(|t| !t.is_virtual_occurrence() || self.is_protected(&t.id, u64::MAX))
            .collect();
        let mut tasks = recurrence::expand(
            self.week_start,
            base,
            &document.recurrences,
            &document.recurrence_exceptions,
        );
        for task in &mut tasks {
            if task.group_id.is_some_and(|g| !known_groups.contains(&g)) {
                task.group_id = None;
            }
        }
        positions::normalize(&mut tasks);
        self.tasks = tasks;
    }

    /// Switches to another week: clears its tasks and per-task bookkeeping
    /// except for calls still in flight.
    pub fn switch_week(&mut self, week_start: NaiveDate, groups: Vec<Group>) {
        self.week_start = dates::sunday_for_date(week_start);
        self.tasks.clear();
        self.groups = groups;
        self.touched.clear();
        self.dirty.clear();
    }
}
