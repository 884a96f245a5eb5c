//! In-process task gateway with failure injection.
//!
//! Rows live in a map behind a mutex. Each operation can be forced to fail
//! (`set_offline`, `fail_next`, `fail_always`) or held until released
//! (`hold_next`), which lets tests interleave remote calls precisely.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use tokio::sync::Notify;
use uuid::Uuid;

use super::{GatewayError, TaskCreate, TaskGateway, TaskRow, TaskUpdate};
use crate::dates;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayOp {
    ListWeeks,
    ListWeekTasks,
    Create,
    Update,
    Delete,
    DeleteDay,
    DeleteWeek,
}

/// One recorded gateway invocation, logged before it is served.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayCall {
    ListWeeks,
    ListWeekTasks(NaiveDate),
    Create(TaskCreate),
    Update(String, TaskUpdate),
    Delete(String),
    DeleteDay(NaiveDate),
    DeleteWeek(NaiveDate),
}

impl GatewayCall {
    pub fn op(&self) -> GatewayOp {
        match self {
            GatewayCall::ListWeeks => GatewayOp::ListWeeks,
            GatewayCall::ListWeekTasks(_) => GatewayOp::ListWeekTasks,
            GatewayCall::Create(_) => GatewayOp::Create,
            GatewayCall::Update(..) => GatewayOp::Update,
            GatewayCall::Delete(_) => GatewayOp::Delete,
            GatewayCall::DeleteDay(_) => GatewayOp::DeleteDay,
            GatewayCall::DeleteWeek(_) => GatewayOp::DeleteWeek,
        }
    }
}

/// Handle on a held call. The call blocks until [`HeldCall::release`].
#[derive(Debug, Clone)]
pub struct HeldCall {
    started: Arc<Notify>,
    release: Arc<Notify>,
}

impl HeldCall {
    /// Resolves once the held call has been issued.
    pub async fn started(&self) {
        self.started.notified().await;
    }

    pub fn release(&self) {
        self.release.notify_one();
    }
}

const ALWAYS: usize = usize::MAX;

#[derive(Debug, Default)]
struct Inner {
    rows: BTreeMap<String, TaskRow>,
    offline: bool,
    failures: HashMap<GatewayOp, usize>,
    holds: HashMap<GatewayOp, VecDeque<HeldCall>>,
    calls: Vec<GatewayCall>,
}

#[derive(Debug, Default)]
pub struct InMemoryGateway {
    inner: Mutex<Inner>,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Every call fails with [`GatewayError::Offline`] while set.
    pub fn set_offline(&self, offline: bool) {
        self.state().offline = offline;
    }

    /// The next `times` calls of `op` fail.
    pub fn fail_next(&self, op: GatewayOp, times: usize) {
        self.state().failures.insert(op, times);
    }

    /// Every call of `op` fails until [`InMemoryGateway::heal`].
    pub fn fail_always(&self, op: GatewayOp) {
        self.state().failures.insert(op, ALWAYS);
    }

    pub fn heal(&self) {
        let mut inner = self.state();
        inner.failures.clear();
        inner.offline = false;
    }

    /// Holds the next call of `op` until the returned handle releases it.
    pub fn hold_next(&self, op: GatewayOp) -> HeldCall {
        let held = HeldCall {
            started: Arc::new(Notify::new()),
            release: Arc::new(Notify::new()),
        };
        self.state().holds.entry(op).or_default().push_back(held.clone());
        held
    }

    /// Inserts a row directly, bypassing failure injection and the call log.
    pub fn seed(&self, title: &str, assigned_date: NaiveDate, position: i64) -> TaskRow {
        let row = new_row(title, assigned_date, position);
        self.state().rows.insert(row.id.clone(), row.clone());
        row
    }

    pub fn rows(&self) -> Vec<TaskRow> {
        self.state().rows.values().cloned().collect()
    }

    pub fn row(&self, id: &str) -> Option<TaskRow> {
        self.state().rows.get(id).cloned()
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.state().calls.clone()
    }

    pub fn calls_of(&self, op: GatewayOp) -> Vec<GatewayCall> {
        self.state().calls.iter().filter(|c| c.op() == op).cloned().collect()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    async fn enter(&self, call: GatewayCall) -> Result<(), GatewayError> {
        let op = call.op();
        let held = {
            let mut inner = self.state();
            inner.calls.push(call);
            inner.holds.get_mut(&op).and_then(VecDeque::pop_front)
        };
        if let Some(held) = held {
            held.started.notify_one();
            held.release.notified().await;
        }

        let mut inner = self.state();
        if inner.offline {
            return Err(GatewayError::Offline);
        }
        if let Some(remaining) = inner.failures.get_mut(&op) {
            if *remaining > 0 {
                if *remaining != ALWAYS {
                    *remaining -= 1;
                }
                return Err(GatewayError::Status {
                    status: 503,
                    body: format!("injected failure for {:?}", op),
                });
            }
        }
        Ok(())
    }
}

fn new_row(title: &str, assigned_date: NaiveDate, position: i64) -> TaskRow {
    TaskRow {
        id: Uuid::now_v7().to_string(),
        created_at: Utc::now(),
        title: title.to_string(),
        status: "open".to_string(),
        assigned_date,
        position,
        notes: None,
        start_date: None,
        end_date: None,
        start_time: None,
        end_time: None,
        links: Vec::new(),
        location: None,
    }
}

fn not_found(id: &str) -> GatewayError {
    GatewayError::Status {
        status: 404,
        body: format!("task {} not found", id),
    }
}

#[async_trait]
impl TaskGateway for InMemoryGateway {
    async fn list_weeks(&self) -> Result<Vec<NaiveDate>, GatewayError> {
        self.enter(GatewayCall::ListWeeks).await?;
        let mut weeks: Vec<NaiveDate> = self
            .state()
            .rows
            .values()
            .map(|row| dates::sunday_for_date(row.assigned_date))
            .collect();
        weeks.sort();
        weeks.dedup();
        Ok(weeks)
    }

    async fn list_week_tasks(&self, week_start: NaiveDate) -> Result<Vec<TaskRow>, GatewayError> {
        self.enter(GatewayCall::ListWeekTasks(week_start)).await?;
        let week_end = week_start + Duration::days(6);
        let mut rows: Vec<TaskRow> = self
            .state()
            .rows
            .values()
            .filter(|row| row.assigned_date >= week_start && row.assigned_date <= week_end)
            .cloned()
            .collect();
        rows.sort_by(|a, b| (a.assigned_date, a.position).cmp(&(b.assigned_date, b.position)));
        Ok(rows)
    }

    async fn create_task(&self, payload: &TaskCreate) -> Result<TaskRow, GatewayError> {
        self.enter(GatewayCall::Create(payload.clone())).await?;
        let mut row = new_row(&payload.title, payload.assigned_date, payload.position);
        row.status = payload.status.to_string();
        row.notes = payload.notes.clone();
        row.links = payload.links.clone();
        self.state().rows.insert(row.id.clone(), row.clone());
        Ok(row)
    }

    async fn update_task(&self, id: &str, payload: &TaskUpdate) -> Result<TaskRow, GatewayError> {
        self.enter(GatewayCall::Update(id.to_string(), payload.clone())).await?;
        let mut inner = self.state();
        let row = inner.rows.get_mut(id).ok_or_else(|| not_found(id))?;
        if let Some(title) = &payload.title {
            row.title = title.clone();
        }
        if let Some(status) = payload.status {
            row.status = status.to_string();
        }
        if let Some(notes) = &payload.notes {
            row.notes = notes.clone();
        }
        if let Some(start_date) = payload.start_date {
            row.start_date = start_date;
        }
        if let Some(end_date) = payload.end_date {
            row.end_date = end_date;
        }
        if let Some(start_time) = &payload.start_time {
            row.start_time = start_time.clone();
        }
        if let Some(end_time) = &payload.end_time {
            row.end_time = end_time.clone();
        }
        if let Some(links) = &payload.links {
            row.links = links.clone();
        }
        if let Some(location) = &payload.location {
            row.location = location.clone();
        }
        if let Some(position) = payload.position {
            row.position = position;
        }
        if let Some(assigned_date) = payload.assigned_date {
            row.assigned_date = assigned_date;
        }
        Ok(row.clone())
    }

    async fn delete_task(&self, id: &str) -> Result<(), GatewayError> {
        self.enter(GatewayCall::Delete(id.to_string())).await?;
        self.state().rows.remove(id).map(|_| ()).ok_or_else(|| not_found(id))
    }

    async fn delete_tasks_for_day(&self, date: NaiveDate) -> Result<(), GatewayError> {
        self.enter(GatewayCall::DeleteDay(date)).await?;
        self.state().rows.retain(|_, row| row.assigned_date != date);
        Ok(())
    }

    async fn delete_tasks_for_week(&self, week_start: NaiveDate) -> Result<(), GatewayError> {
        self.enter(GatewayCall::DeleteWeek(week_start)).await?;
        self.state()
            .rows
            .retain(|_, row| dates::sunday_for_date(row.assigned_date) != week_start);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dates::parse_iso_date;
    use crate::models::TaskStatus;

    fn payload(title: &str, date: &str) -> TaskCreate {
        TaskCreate {
            title: title.to_string(),
            assigned_date: parse_iso_date(date).unwrap(),
            position: 0,
            status: TaskStatus::Open,
            notes: None,
            links: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_create_list_and_delete_week() {
        let gateway = InMemoryGateway::new();
        gateway.create_task(&payload("a", "2025-01-13")).await.unwrap();
        gateway.create_task(&payload("b", "2025-01-20")).await.unwrap();

        let week = parse_iso_date("2025-01-12").unwrap();
        assert_eq!(gateway.list_week_tasks(week).await.unwrap().len(), 1);
        assert_eq!(gateway.list_weeks().await.unwrap().len(), 2);

        gateway.delete_tasks_for_week(week).await.unwrap();
        assert_eq!(gateway.rows().len(), 1);
    }

    #[tokio::test]
    async fn test_failure_injection_counts_down() {
        let gateway = InMemoryGateway::new();
        gateway.fail_next(GatewayOp::Create, 1);
        assert!(gateway.create_task(&payload("a", "2025-01-13")).await.is_err());
        assert!(gateway.create_task(&payload("a", "2025-01-13")).await.is_ok());
        assert_eq!(gateway.calls_of(GatewayOp::Create).len(), 2);
    }

    #[tokio::test]
    async fn test_offline_rejects_everything() {
        let gateway = InMemoryGateway::new();
        gateway.set_offline(true);
        assert_eq!(gateway.list_weeks().await, Err(GatewayError::Offline));
        gateway.heal();
        assert!(gateway.list_weeks().await.is_ok());
    }

    #[tokio::test]
    async fn test_update_missing_row_is_404() {
        let gateway = InMemoryGateway::new();
        let result = gateway.update_task("nope", &TaskUpdate::default()).await;
        assert!(matches!(result, Err(GatewayError::Status { status: 404, .. })));
    }

    #[tokio::test]
    async fn test_held_call_waits_for_release() {
        let gateway = Arc::new(InMemoryGateway::new());
        let held = gateway.hold_next(GatewayOp::ListWeeks);
        let task = {
            let gateway = Arc::clone(&gateway);
            tokio::spawn(async move { gateway.list_weeks().await })
        };
        held.started().await;
        assert!(!task.is_finished());
        held.release();
        assert!(task.await.unwrap().is_ok());
    }
}
