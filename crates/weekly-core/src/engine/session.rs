use chrono::NaiveDate;

use super::{EngineState, WeekEngine};
use crate::dates;
use crate::gateway::{TaskCreate, TaskGateway, TaskUpdate};
use crate::models::{is_local_only_id, is_occurrence_id, FetchOutcome, MutationOutcome, Task, TaskId};
use crate::state::WeekSession;
use crate::store::DocumentStore;

/// A buffered patch of the week being left, sent after the switch.
enum LeftoverPatch {
    Update(TaskId, TaskUpdate),
    Materialize(Task, TaskCreate),
}

/// Drains the buffered patches of the session's week. Patches for tasks
/// whose create is still in flight are deferred to its settlement.
fn take_leftover_patches(session: &mut WeekSession) -> Vec<LeftoverPatch> {
    let mut leftovers = Vec::new();
    for id in session.dirty_ids() {
        let Some(patch) = session.take_dirty(&id) else {
            continue;
        };
        if patch.is_empty() {
            continue;
        }
        if session.is_creating(&id) {
            session.defer_patch(&id, patch);
        } else if is_occurrence_id(&id) {
            if let Some(task) = session.task(&id).cloned() {
                let assigned = dates::week_date(session.week_start(), task.day_index);
                let payload = TaskCreate::from_task(&task, assigned);
                leftovers.push(LeftoverPatch::Materialize(task, payload));
            }
        } else if !is_local_only_id(&id) {
            leftovers.push(LeftoverPatch::Update(id, TaskUpdate::from(&patch)));
        }
    }
    leftovers
}

impl<G: TaskGateway, S: DocumentStore> WeekEngine<G, S> {
    /// Fetches the current week and merges it into the working copy.
    ///
    /// A failure keeps the previous tasks. A response superseded by a newer
    /// fetch or a week switch is discarded.
    pub async fn refresh(&self) -> FetchOutcome {
        let ticket = self.lock().session.begin_fetch();
        tracing::debug!(week_start = %ticket.week_start, token = ticket.token, "fetching week");

        let result = self.gateway.list_week_tasks(ticket.week_start).await;

        let mut state = self.lock();
        let EngineState { session, document } = &mut *state;
        match result {
            Ok(rows) => session.apply_fetch(&ticket, rows, document),
            Err(error) => {
                tracing::warn!(%error, week_start = %ticket.week_start, "failed to fetch week");
                session.fail_fetch(&ticket)
            }
        }
    }

    /// Makes the week containing `date` current and fetches it.
    ///
    /// The switch happens at once. Buffered manual-save patches of the week
    /// being left are sent alongside the fetch, best effort: a failure is
    /// logged and never refetches either week.
    pub async fn select_week(&self, date: NaiveDate) -> FetchOutcome {
        let week_start = dates::sunday_for_date(date);
        let leftovers = {
            let mut state = self.lock();
            if state.session.week_start() == week_start {
                Vec::new()
            } else {
                let leftovers = take_leftover_patches(&mut state.session);
                let groups = state.document.groups_for(week_start);
                let EngineState { session, document } = &mut *state;
                session.switch_week(week_start, groups);
                session.rebuild_occurrences(document);
                leftovers
            }
        };
        let (outcome, ()) = tokio::join!(self.refresh(), self.send_leftover_patches(leftovers));
        outcome
    }

    async fn send_leftover_patches(&self, leftovers: Vec<LeftoverPatch>) {
        for leftover in leftovers {
            match leftover {
                LeftoverPatch::Update(id, update) => {
                    if let Err(error) = self.gateway.update_task(&id, &update).await {
                        tracing::warn!(task_id = %id, %error, "dropping buffered patch of previous week");
                    }
                }
                LeftoverPatch::Materialize(mut task, payload) => {
                    let row = match self.gateway.create_task(&payload).await {
                        Ok(row) => row,
                        Err(error) => {
                            tracing::warn!(task_id = %task.id, %error, "dropping buffered occurrence edit of previous week");
                            continue;
                        }
                    };
                    task.id = row.id.clone();
                    self.lock().document.record_meta(&task);
                    self.persist_document().await;
                    if let Some(update) = TaskCreate::follow_up(&task) {
                        if let Err(error) = self.gateway.update_task(&row.id, &update).await {
                            tracing::warn!(task_id = %row.id, %error, "failed to finish materialized occurrence");
                        }
                    }
                }
            }
        }
    }

    pub async fn select_current_week(&self) -> FetchOutcome {
        self.select_week(dates::current_week_start()).await
    }

    /// Same as [`WeekEngine::select_week`]; the date is snapped to its Sunday.
    pub async fn select_week_for_date(&self, date: NaiveDate) -> FetchOutcome {
        self.select_week(date).await
    }

    /// Asks the gateway which weeks hold tasks. Independent of the fetch
    /// state machine. On failure the last known list is returned.
    ///
    /// Sorted most recent first; always includes the current week.
    pub async fn refresh_available_weeks(&self) -> Vec<NaiveDate> {
        match self.gateway.list_weeks().await {
            Ok(weeks) => {
                let mut state = self.lock();
                let mut weeks: Vec<NaiveDate> = weeks.into_iter().map(dates::sunday_for_date).collect();
                weeks.push(state.session.week_start());
                weeks.sort_unstable_by(|a, b| b.cmp(a));
                weeks.dedup();
                state.session.available_weeks = weeks.clone();
                weeks
            }
            Err(error) => {
                tracing::warn!(%error, "failed to list available weeks");
                self.available_week_starts()
            }
        }
    }

    pub fn available_week_starts(&self) -> Vec<NaiveDate> {
        self.lock().session.available_weeks.clone()
    }

    pub fn is_dirty(&self) -> bool {
        self.lock().session.is_dirty()
    }

    /// Commits every buffered patch. Failures are logged, not retried.
    pub async fn commit_dirty(&self) -> usize {
        let ids = self.lock().session.dirty_ids();
        let mut committed = 0;
        for id in ids {
            match self.commit_task_patch(&id).await {
                Ok(MutationOutcome::Applied) => committed += 1,
                Ok(outcome) => {
                    tracing::warn!(task_id = %id, %outcome, "buffered patch did not commit cleanly")
                }
                Err(error) => tracing::warn!(task_id = %id, %error, "dropping buffered patch"),
            }
        }
        committed
    }

    /// Ends the session: buffered patches are committed best effort.
    pub async fn close(&self) {
        let committed = self.commit_dirty().await;
        if committed > 0 {
            tracing::debug!(committed, "committed buffered patches on close");
        }
    }
}
