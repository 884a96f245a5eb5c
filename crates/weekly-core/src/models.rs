use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::error::CoreError;

/// Day of the week, 0 = Sunday ... 6 = Saturday.
pub type DayIndex = u8;

/// Task identity. Server ids are opaque; see [`TEMP_ID_PREFIX`] and
/// [`OCCURRENCE_ID_PREFIX`] for locally generated ones.
pub type TaskId = String;

/// Prefix of ids handed out to optimistic creations before the server answers.
pub const TEMP_ID_PREFIX: &str = "tmp-";

/// Prefix of ids of occurrences synthesized by the recurrence expander.
pub const OCCURRENCE_ID_PREFIX: &str = "occ-";

pub fn new_temporary_id() -> TaskId {
    format!("{}{}", TEMP_ID_PREFIX, Uuid::new_v4())
}

pub fn is_temporary_id(id: &str) -> bool {
    id.starts_with(TEMP_ID_PREFIX)
}

pub fn is_occurrence_id(id: &str) -> bool {
    id.starts_with(OCCURRENCE_ID_PREFIX)
}

/// Ids that exist only locally and have no remote row behind them.
pub fn is_local_only_id(id: &str) -> bool {
    is_temporary_id(id) || is_occurrence_id(id)
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Open,
    Completed,
    Failed,
    Cancelled,
    Moved,
}

#[derive(Error, Debug, PartialEq)]
#[error("Invalid task status: {0}")]
pub struct ParseTaskStatusError(String);

impl FromStr for TaskStatus {
    type Err = ParseTaskStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "open" => Ok(TaskStatus::Open),
            "completed" | "done" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            "cancelled" | "canceled" => Ok(TaskStatus::Cancelled),
            "moved" => Ok(TaskStatus::Moved),
            _ => Err(ParseTaskStatusError(s.to_string())),
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Open => write!(f, "open"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
            TaskStatus::Cancelled => write!(f, "cancelled"),
            TaskStatus::Moved => write!(f, "moved"),
        }
    }
}

/// What kind of weekly item a task represents.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    #[default]
    Task,
    Event,
    Birthday,
    Holiday,
}

#[derive(Error, Debug, PartialEq)]
#[error("Invalid item type: {0}")]
pub struct ParseItemTypeError(String);

impl FromStr for ItemType {
    type Err = ParseItemTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "task" => Ok(ItemType::Task),
            "event" => Ok(ItemType::Event),
            "birthday" => Ok(ItemType::Birthday),
            "holiday" => Ok(ItemType::Holiday),
            _ => Err(ParseItemTypeError(s.to_string())),
        }
    }
}

impl std::fmt::Display for ItemType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ItemType::Task => write!(f, "task"),
            ItemType::Event => write!(f, "event"),
            ItemType::Birthday => write!(f, "birthday"),
            ItemType::Holiday => write!(f, "holiday"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct TaskLocation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lon: Option<f64>,
}

/// One structured link as stored remotely.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LinkEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub url: String,
}

/// The ordering scope of a task: its day plus optional group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Container {
    pub day_index: DayIndex,
    pub group_id: Option<Uuid>,
}

impl Container {
    pub fn root(day_index: DayIndex) -> Self {
        Self { day_index, group_id: None }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub status: TaskStatus,
    #[serde(rename = "type")]
    pub kind: ItemType,
    pub day_index: DayIndex,
    pub position: usize,
    pub created_at: DateTime<Utc>,
    /// `None` means a root-level item of its day.
    pub group_id: Option<Uuid>,
    pub notes_markdown: Option<String>,
    pub links_markdown: Option<String>,
    pub location: Option<TaskLocation>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    #[serde(default)]
    pub goal_ids: Vec<Uuid>,
    #[serde(default)]
    pub companion_ids: Vec<Uuid>,
    /// Set on occurrences of a recurrence rule, together with `occurrence_date`.
    pub recurrence_id: Option<Uuid>,
    pub occurrence_date: Option<NaiveDate>,
}

impl Task {
    pub fn new(id: TaskId, title: impl Into<String>, day_index: DayIndex, position: usize) -> Self {
        Self {
            id,
            title: title.into(),
            status: TaskStatus::Open,
            kind: ItemType::Task,
            day_index,
            position,
            created_at: Utc::now(),
            group_id: None,
            notes_markdown: None,
            links_markdown: None,
            location: None,
            start_date: None,
            end_date: None,
            start_time: None,
            end_time: None,
            goal_ids: Vec::new(),
            companion_ids: Vec::new(),
            recurrence_id: None,
            occurrence_date: None,
        }
    }

    pub fn container(&self) -> Container {
        Container {
            day_index: self.day_index,
            group_id: self.group_id,
        }
    }

    /// `(recurrence_id, occurrence_date)` when this task is an occurrence of a rule.
    pub fn occurrence_key(&self) -> Option<(Uuid, NaiveDate)> {
        match (self.recurrence_id, self.occurrence_date) {
            (Some(rid), Some(date)) => Some((rid, date)),
            _ => None,
        }
    }

    pub fn is_virtual_occurrence(&self) -> bool {
        is_occurrence_id(&self.id)
    }

    pub fn is_temporary(&self) -> bool {
        is_temporary_id(&self.id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Group {
    pub id: Uuid,
    pub title: String,
    pub day_index: DayIndex,
    pub position: usize,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RecurrenceFrequency {
    Day,
    Week,
    Month,
}

#[derive(Error, Debug, PartialEq)]
#[error("Invalid recurrence frequency: {0}")]
pub struct ParseRecurrenceFrequencyError(String);

impl FromStr for RecurrenceFrequency {
    type Err = ParseRecurrenceFrequencyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "day" | "daily" => Ok(RecurrenceFrequency::Day),
            "week" | "weekly" => Ok(RecurrenceFrequency::Week),
            "month" | "monthly" => Ok(RecurrenceFrequency::Month),
            _ => Err(ParseRecurrenceFrequencyError(s.to_string())),
        }
    }
}

impl std::fmt::Display for RecurrenceFrequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecurrenceFrequency::Day => write!(f, "day"),
            RecurrenceFrequency::Week => write!(f, "week"),
            RecurrenceFrequency::Month => write!(f, "month"),
        }
    }
}

/// Template describing how a task repeats, with a full copy of its content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecurrenceRule {
    pub id: Uuid,
    pub frequency: RecurrenceFrequency,
    /// Occurrences every `interval` units of `frequency`. Zero never occurs.
    pub interval: u32,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub title: String,
    #[serde(rename = "type", default)]
    pub kind: ItemType,
    pub links_markdown: Option<String>,
    pub location: Option<TaskLocation>,
    pub notes_markdown: Option<String>,
    #[serde(default)]
    pub goal_ids: Vec<Uuid>,
    #[serde(default)]
    pub companion_ids: Vec<Uuid>,
    pub group_id: Option<Uuid>,
}

/// Caller-supplied recurrence settings, validated by [`RecurrenceDraft::normalize`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecurrenceDraft {
    pub frequency: RecurrenceFrequency,
    pub interval: i64,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
}

impl RecurrenceDraft {
    /// Clamps a non-positive interval to 1 and rejects an end before the start.
    pub fn normalize(mut self) -> Result<Self, CoreError> {
        if self.interval <= 0 {
            self.interval = 1;
        }
        if let Some(end) = self.end_date {
            if end < self.start_date {
                return Err(CoreError::InvalidInput(format!(
                    "Recurrence end date {} is before its start date {}",
                    end, self.start_date
                )));
            }
        }
        Ok(self)
    }

    pub fn interval_u32(&self) -> u32 {
        u32::try_from(self.interval.max(1)).unwrap_or(u32::MAX)
    }
}

/// Dates on which a rule must not produce an occurrence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct RecurrenceException {
    #[serde(default)]
    pub skip_dates: BTreeSet<NaiveDate>,
}

impl RecurrenceException {
    pub fn skips(&self, date: NaiveDate) -> bool {
        self.skip_dates.contains(&date)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Goal {
    pub id: Uuid,
    pub name: String,
    pub emoji: Option<String>,
    pub color: String,
    #[serde(default)]
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct GoalUpdate {
    pub name: Option<String>,
    pub emoji: Option<Option<String>>,
    pub color: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Companion {
    pub id: Uuid,
    pub name: String,
    pub relationship: String,
    pub description: Option<String>,
    pub color: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct CompanionUpdate {
    pub name: Option<String>,
    pub relationship: Option<String>,
    pub description: Option<Option<String>>,
    pub color: Option<String>,
}

/// Partial change to a task's synced content fields.
///
/// The outer `Option` says whether the field changes, the inner one whether
/// it is cleared.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub status: Option<TaskStatus>,
    pub notes_markdown: Option<Option<String>>,
    pub links_markdown: Option<Option<String>>,
    pub location: Option<Option<TaskLocation>>,
    pub start_date: Option<Option<NaiveDate>>,
    pub end_date: Option<Option<NaiveDate>>,
    pub start_time: Option<Option<String>>,
    pub end_time: Option<Option<String>>,
}

impl TaskPatch {
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Default::default()
        }
    }

    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn schedule(schedule: TaskSchedule) -> Self {
        Self {
            start_date: Some(schedule.start_date),
            end_date: Some(schedule.end_date),
            start_time: Some(schedule.start_time),
            end_time: Some(schedule.end_time),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == TaskPatch::default()
    }

    pub fn apply_to(&self, task: &mut Task) {
        if let Some(title) = &self.title {
            task.title = title.clone();
        }
        if let Some(status) = self.status {
            task.status = status;
        }
        if let Some(notes) = &self.notes_markdown {
            task.notes_markdown = notes.clone();
        }
        if let Some(links) = &self.links_markdown {
            task.links_markdown = links.clone();
        }
        if let Some(location) = &self.location {
            task.location = location.clone();
        }
        if let Some(start_date) = self.start_date {
            task.start_date = start_date;
        }
        if let Some(end_date) = self.end_date {
            task.end_date = end_date;
        }
        if let Some(start_time) = &self.start_time {
            task.start_time = start_time.clone();
        }
        if let Some(end_time) = &self.end_time {
            task.end_time = end_time.clone();
        }
    }

    /// Layers `newer` on top of `self`; fields set in `newer` win.
    pub fn merge(&mut self, newer: TaskPatch) {
        if newer.title.is_some() {
            self.title = newer.title;
        }
        if newer.status.is_some() {
            self.status = newer.status;
        }
        if newer.notes_markdown.is_some() {
            self.notes_markdown = newer.notes_markdown;
        }
        if newer.links_markdown.is_some() {
            self.links_markdown = newer.links_markdown;
        }
        if newer.location.is_some() {
            self.location = newer.location;
        }
        if newer.start_date.is_some() {
            self.start_date = newer.start_date;
        }
        if newer.end_date.is_some() {
            self.end_date = newer.end_date;
        }
        if newer.start_time.is_some() {
            self.start_time = newer.start_time;
        }
        if newer.end_time.is_some() {
            self.end_time = newer.end_time;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskSchedule {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

/// What happened to an optimistic mutation once its remote call settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOutcome {
    /// The local change stands (confirmed remotely, or local-only).
    Applied,
    /// The remote call failed and exactly this change was reverted.
    RolledBack,
    /// The remote call failed and the week was refetched to restore ground truth.
    Resynced,
}

impl std::fmt::Display for MutationOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MutationOutcome::Applied => write!(f, "applied"),
            MutationOutcome::RolledBack => write!(f, "rolled back"),
            MutationOutcome::Resynced => write!(f, "resynced"),
        }
    }
}

/// Result of a task creation: the id the task ended up with plus the outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddedTask {
    pub id: TaskId,
    pub outcome: MutationOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The response was merged into the session.
    Loaded,
    /// The gateway failed; the previous tasks were kept.
    Failed,
    /// A newer request (or a week switch) superseded this one.
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Idle,
    Loading,
}

/// Snapshot of everything a view renders for one week.
#[derive(Debug, Clone)]
pub struct WeekState {
    pub week_start: NaiveDate,
    pub tasks: Vec<Task>,
    pub groups: Vec<Group>,
    pub goals: Vec<Goal>,
    pub companions: Vec<Companion>,
    pub is_loading: bool,
}

impl WeekState {
    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Tasks of one container ordered by position.
    pub fn container_tasks(&self, container: Container) -> Vec<&Task> {
        let mut tasks: Vec<&Task> = self
            .tasks
            .iter()
            .filter(|t| t.container() == container)
            .collect();
        tasks.sort_by_key(|t| t.position);
        tasks
    }
}

/// Engine behavior knobs.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// After a move, also persist every sibling whose position shifted.
    pub persist_shifted_positions: bool,
    /// After a move settles, refetch the week to correct any drift.
    pub resync_after_move: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            persist_shifted_positions: true,
            resync_after_move: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_from_str() {
        assert_eq!("Open".parse::<TaskStatus>(), Ok(TaskStatus::Open));
        assert_eq!("done".parse::<TaskStatus>(), Ok(TaskStatus::Completed));
        assert_eq!("canceled".parse::<TaskStatus>(), Ok(TaskStatus::Cancelled));
        assert!("later".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&TaskStatus::Failed).unwrap();
        assert_eq!(json, "\"failed\"");
    }

    #[test]
    fn test_draft_normalize_clamps_interval() {
        let start = NaiveDate::from_ymd_opt(2025, 1, 5).unwrap();
        let draft = RecurrenceDraft {
            frequency: RecurrenceFrequency::Week,
            interval: 0,
            start_date: start,
            end_date: None,
        };
        let normalized = draft.normalize().unwrap();
        assert_eq!(normalized.interval, 1);
        assert_eq!(normalized.interval_u32(), 1);
    }

    #[test]
    fn test_draft_normalize_rejects_inverted_window() {
        let draft = RecurrenceDraft {
            frequency: RecurrenceFrequency::Day,
            interval: 2,
            start_date: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2025, 2, 1),
        };
        assert!(matches!(draft.normalize(), Err(CoreError::InvalidInput(_))));
    }

    #[test]
    fn test_patch_merge_newer_wins() {
        let mut patch = TaskPatch::title("first");
        patch.merge(TaskPatch {
            title: Some("second".to_string()),
            notes_markdown: Some(None),
            ..Default::default()
        });
        assert_eq!(patch.title.as_deref(), Some("second"));
        assert_eq!(patch.notes_markdown, Some(None));

        let mut task = Task::new("t1".to_string(), "old", 0, 0);
        task.notes_markdown = Some("note".to_string());
        patch.apply_to(&mut task);
        assert_eq!(task.title, "second");
        assert_eq!(task.notes_markdown, None);
    }

    #[test]
    fn test_id_conventions() {
        let id = new_temporary_id();
        assert!(is_temporary_id(&id));
        assert!(is_local_only_id(&id));
        assert!(is_local_only_id("occ-abc-2025-01-01"));
        assert!(!is_local_only_id("7f0c"));
    }
}
