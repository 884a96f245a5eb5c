//! Remote task store seam.
//!
//! The engine only talks to the remote side through [`TaskGateway`]. Two
//! implementations ship with the crate: [`http::HttpGateway`] for the real
//! JSON API and [`memory::InMemoryGateway`] for tests and offline use.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dates;
use crate::links;
use crate::models::{LinkEntry, Task, TaskLocation, TaskPatch, TaskStatus};

pub mod http;
pub mod memory;

pub use http::HttpGateway;
pub use memory::{GatewayCall, GatewayOp, InMemoryGateway};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("remote returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("could not decode response: {0}")]
    Decode(String),

    #[error("gateway is offline")]
    Offline,
}

/// Task as stored remotely.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskRow {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub title: String,
    #[serde(default = "default_status")]
    pub status: String,
    pub assigned_date: NaiveDate,
    #[serde(default)]
    pub position: i64,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub links: Vec<LinkEntry>,
    #[serde(default)]
    pub location: Option<TaskLocation>,
}

fn default_status() -> String {
    TaskStatus::Open.to_string()
}

impl TaskRow {
    /// Local task for this row, or `None` when its date lies outside the week.
    ///
    /// Unknown status strings fall back to `open`. Local-only attributes
    /// (type, group, goals, recurrence link) are left at their defaults.
    pub fn to_task(&self, week_start: NaiveDate) -> Option<Task> {
        let Some(day_index) = dates::day_index_for(week_start, self.assigned_date) else {
            tracing::warn!(
                task_id = %self.id,
                assigned_date = %self.assigned_date,
                week_start = %week_start,
                "dropping row assigned outside the requested week"
            );
            return None;
        };
        let status = self.status.parse::<TaskStatus>().unwrap_or_else(|e| {
            tracing::warn!(task_id = %self.id, error = %e, "unknown status, treating as open");
            TaskStatus::Open
        });

        let mut task = Task::new(
            self.id.clone(),
            self.title.clone(),
            day_index,
            usize::try_from(self.position).unwrap_or(0),
        );
        task.status = status;
        task.created_at = self.created_at;
        task.notes_markdown = self.notes.clone();
        task.links_markdown = links::links_markdown_or_none(&self.links);
        task.location = self.location.clone();
        task.start_date = self.start_date;
        task.end_date = self.end_date;
        task.start_time = self.start_time.clone();
        task.end_time = self.end_time.clone();
        Some(task)
    }
}

/// Payload for creating a remote task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskCreate {
    pub title: String,
    pub assigned_date: NaiveDate,
    pub position: i64,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default)]
    pub links: Vec<LinkEntry>,
}

impl TaskCreate {
    /// Create payload carrying everything the create endpoint accepts.
    ///
    /// Location and schedule are not accepted on create; see
    /// [`TaskCreate::follow_up`].
    pub fn from_task(task: &Task, assigned_date: NaiveDate) -> Self {
        Self {
            title: task.title.clone(),
            assigned_date,
            position: i64::try_from(task.position).unwrap_or(i64::MAX),
            status: task.status,
            notes: task.notes_markdown.clone(),
            links: task
                .links_markdown
                .as_deref()
                .map(links::markdown_to_links)
                .unwrap_or_default(),
        }
    }

    /// Update needed after the create to carry the fields it cannot, if any.
    pub fn follow_up(task: &Task) -> Option<TaskUpdate> {
        let update = TaskUpdate {
            location: task.location.clone().map(Some),
            start_date: task.start_date.map(Some),
            end_date: task.end_date.map(Some),
            start_time: task.start_time.clone().map(Some),
            end_time: task.end_time.clone().map(Some),
            ..Default::default()
        };
        if update.is_empty() {
            None
        } else {
            Some(update)
        }
    }
}

/// Partial remote update. Absent fields are left untouched; `Some(None)`
/// clears a nullable column.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TaskUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "::serde_with::rust::double_option"
    )]
    pub notes: Option<Option<String>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "::serde_with::rust::double_option"
    )]
    pub start_date: Option<Option<NaiveDate>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "::serde_with::rust::double_option"
    )]
    pub end_date: Option<Option<NaiveDate>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "::serde_with::rust::double_option"
    )]
    pub start_time: Option<Option<String>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "::serde_with::rust::double_option"
    )]
    pub end_time: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<Vec<LinkEntry>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "::serde_with::rust::double_option"
    )]
    pub location: Option<Option<TaskLocation>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_date: Option<NaiveDate>,
}

impl TaskUpdate {
    /// Update moving a task to `assigned_date` at `position`.
    pub fn placement(assigned_date: NaiveDate, position: usize) -> Self {
        Self {
            assigned_date: Some(assigned_date),
            position: Some(i64::try_from(position).unwrap_or(i64::MAX)),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == TaskUpdate::default()
    }

    /// Copies every field of `other` that `self` leaves unset.
    pub fn fill_from(&mut self, other: TaskUpdate) {
        self.title = self.title.take().or(other.title);
        self.status = self.status.or(other.status);
        self.notes = self.notes.take().or(other.notes);
        self.start_date = self.start_date.or(other.start_date);
        self.end_date = self.end_date.or(other.end_date);
        self.start_time = self.start_time.take().or(other.start_time);
        self.end_time = self.end_time.take().or(other.end_time);
        self.links = self.links.take().or(other.links);
        self.location = self.location.take().or(other.location);
        self.position = self.position.or(other.position);
        self.assigned_date = self.assigned_date.or(other.assigned_date);
    }
}

impl From<&TaskPatch> for TaskUpdate {
    fn from(patch: &TaskPatch) -> Self {
        Self {
            title: patch.title.clone(),
            status: patch.status,
            notes: patch.notes_markdown.clone(),
            start_date: patch.start_date,
            end_date: patch.end_date,
            start_time: patch.start_time.clone(),
            end_time: patch.end_time.clone(),
            links: patch.links_markdown.as_ref().map(|markdown| {
                markdown
                    .as_deref()
                    .map(links::markdown_to_links)
                    .unwrap_or_default()
            }),
            location: patch.location.clone(),
            position: None,
            assigned_date: None,
        }
    }
}

/// Remote persistence for tasks.
///
/// Every call either succeeds or fails with a [`GatewayError`]; the engine
/// decides how to recover.
#[async_trait]
pub trait TaskGateway: Send + Sync {
    /// Sundays of every week holding at least one task.
    async fn list_weeks(&self) -> Result<Vec<NaiveDate>, GatewayError>;
    async fn list_week_tasks(&self, week_start: NaiveDate) -> Result<Vec<TaskRow>, GatewayError>;
    async fn create_task(&self, payload: &TaskCreate) -> Result<TaskRow, GatewayError>;
    async fn update_task(&self, id: &str, payload: &TaskUpdate) -> Result<TaskRow, GatewayError>;
    async fn delete_task(&self, id: &str) -> Result<(), GatewayError>;
    async fn delete_tasks_for_day(&self, date: NaiveDate) -> Result<(), GatewayError>;
    async fn delete_tasks_for_week(&self, week_start: NaiveDate) -> Result<(), GatewayError>;
}
