//! Local persisted state kept outside the remote gateway.
//!
//! Recurrence rules, skip dates, the goal/companion catalogs, per-week groups
//! and the local-only task attributes travel together in one JSON document
//! stored under [`USER_DATA_KEY`].

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::error::CoreError;
use crate::models::{
    Companion, Goal, Group, ItemType, RecurrenceException, RecurrenceRule, Task, TaskId,
};

pub mod memory;
pub mod sqlite;

pub use memory::MemoryDocumentStore;
pub use sqlite::SqliteDocumentStore;

/// Key of the user document.
pub const USER_DATA_KEY: &str = "weekly_user_data_v1";

/// Key/value storage for JSON documents.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CoreError>;
    async fn put(&self, key: &str, body: &str) -> Result<(), CoreError>;
}

/// Local-only attributes of a task that the remote store has no columns for.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct TaskMeta {
    #[serde(rename = "type", default)]
    pub kind: ItemType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub goal_ids: Vec<Uuid>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub companion_ids: Vec<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurrence_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occurrence_date: Option<NaiveDate>,
}

impl TaskMeta {
    pub fn from_task(task: &Task) -> Self {
        Self {
            kind: task.kind,
            group_id: task.group_id,
            goal_ids: task.goal_ids.clone(),
            companion_ids: task.companion_ids.clone(),
            recurrence_id: task.recurrence_id,
            occurrence_date: task.occurrence_date,
        }
    }

    pub fn apply_to(&self, task: &mut Task) {
        task.kind = self.kind;
        task.group_id = self.group_id;
        task.goal_ids = self.goal_ids.clone();
        task.companion_ids = self.companion_ids.clone();
        task.recurrence_id = self.recurrence_id;
        task.occurrence_date = self.occurrence_date;
    }

    pub fn is_default(&self) -> bool {
        *self == TaskMeta::default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct WeekDocument {
    #[serde(default)]
    pub groups: Vec<Group>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct UserDataDocument {
    /// Keyed by the ISO date of the week's Sunday.
    #[serde(default)]
    pub weeks: BTreeMap<String, WeekDocument>,
    #[serde(default)]
    pub goals: Vec<Goal>,
    #[serde(default)]
    pub companions: Vec<Companion>,
    #[serde(default)]
    pub recurrences: BTreeMap<Uuid, RecurrenceRule>,
    #[serde(default)]
    pub recurrence_exceptions: BTreeMap<Uuid, RecurrenceException>,
    #[serde(default)]
    pub task_meta: BTreeMap<TaskId, TaskMeta>,
}

fn week_key(week_start: NaiveDate) -> String {
    week_start.format("%Y-%m-%d").to_string()
}

impl UserDataDocument {
    pub fn groups_for(&self, week_start: NaiveDate) -> Vec<Group> {
        self.weeks
            .get(&week_key(week_start))
            .map(|week| week.groups.clone())
            .unwrap_or_default()
    }

    pub fn set_groups(&mut self, week_start: NaiveDate, groups: Vec<Group>) {
        let key = week_key(week_start);
        if groups.is_empty() {
            self.weeks.remove(&key);
        } else {
            self.weeks.entry(key).or_default().groups = groups;
        }
    }

    /// Records a skip date. Returns `false` when it was already present.
    pub fn add_skip_date(&mut self, recurrence_id: Uuid, date: NaiveDate) -> bool {
        self.recurrence_exceptions
            .entry(recurrence_id)
            .or_default()
            .skip_dates
            .insert(date)
    }

    /// Removes a skip date, dropping the exception once it is empty.
    pub fn remove_skip_date(&mut self, recurrence_id: Uuid, date: NaiveDate) -> bool {
        let Some(exception) = self.recurrence_exceptions.get_mut(&recurrence_id) else {
            return false;
        };
        let removed = exception.skip_dates.remove(&date);
        if exception.skip_dates.is_empty() {
            self.recurrence_exceptions.remove(&recurrence_id);
        }
        removed
    }

    /// Drops a rule together with its exceptions.
    pub fn remove_recurrence(&mut self, recurrence_id: Uuid) -> Option<RecurrenceRule> {
        self.recurrence_exceptions.remove(&recurrence_id);
        self.recurrences.remove(&recurrence_id)
    }

    /// Stores the task's local-only attributes, or forgets them when they
    /// are all default.
    pub fn record_meta(&mut self, task: &Task) {
        let meta = TaskMeta::from_task(task);
        if meta.is_default() {
            self.task_meta.remove(&task.id);
        } else {
            self.task_meta.insert(task.id.clone(), meta);
        }
    }

    pub fn relabel_meta(&mut self, old_id: &str, new_id: &str) {
        if let Some(meta) = self.task_meta.remove(old_id) {
            self.task_meta.insert(new_id.to_string(), meta);
        }
    }

    /// Ids of persisted rows linked to `recurrence_id`, from any week.
    pub fn linked_task_ids(&self, recurrence_id: Uuid) -> Vec<TaskId> {
        self.task_meta
            .iter()
            .filter(|(_, meta)| meta.recurrence_id == Some(recurrence_id))
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn unlink_goal(&mut self, goal_id: Uuid) {
        for meta in self.task_meta.values_mut() {
            meta.goal_ids.retain(|id| *id != goal_id);
        }
        for rule in self.recurrences.values_mut() {
            rule.goal_ids.retain(|id| *id != goal_id);
        }
        self.task_meta.retain(|_, meta| !meta.is_default());
    }

    pub fn unlink_companion(&mut self, companion_id: Uuid) {
        for meta in self.task_meta.values_mut() {
            meta.companion_ids.retain(|id| *id != companion_id);
        }
        for rule in self.recurrences.values_mut() {
            rule.companion_ids.retain(|id| *id != companion_id);
        }
        self.task_meta.retain(|_, meta| !meta.is_default());
    }
}

/// Loads the user document. A missing document yields the default one; an
/// unreadable one is logged and replaced with the default.
pub async fn load_user_data<S: DocumentStore + ?Sized>(store: &S) -> Result<UserDataDocument, CoreError> {
    let Some(body) = store.get(USER_DATA_KEY).await? else {
        return Ok(UserDataDocument::default());
    };
    match serde_json::from_str(&body) {
        Ok(document) => Ok(document),
        Err(error) => {
            tracing::error!(%error, key = USER_DATA_KEY, "local document is unreadable, starting fresh");
            Ok(UserDataDocument::default())
        }
    }
}

pub async fn save_user_data<S: DocumentStore + ?Sized>(store: &S, document: &UserDataDocument) -> Result<(), CoreError> {
    let body = serde_json::to_string(document)?;
    store.put(USER_DATA_KEY, &body).await
}
