use chrono::NaiveDate;
use rstest::rstest;
use std::sync::Arc;
use uuid::Uuid;
use weekly_core::dates::parse_iso_date;
use weekly_core::engine::{NewTask, WeekEngine};
use weekly_core::error::CoreError;
use weekly_core::gateway::{GatewayCall, GatewayOp, InMemoryGateway};
use weekly_core::models::*;
use weekly_core::positions;
use weekly_core::store::{self, MemoryDocumentStore, UserDataDocument};

type Engine = WeekEngine<InMemoryGateway, MemoryDocumentStore>;

struct Harness {
    engine: Engine,
    gateway: Arc<InMemoryGateway>,
    store: Arc<MemoryDocumentStore>,
}

fn date(s: &str) -> NaiveDate {
    parse_iso_date(s).expect("valid test date")
}

/// Helper function to build an engine over fresh in-memory backends
async fn setup(week: &str) -> Harness {
    setup_with(week, UserDataDocument::default(), EngineConfig::default()).await
}

async fn setup_with(week: &str, document: UserDataDocument, config: EngineConfig) -> Harness {
    let gateway = Arc::new(InMemoryGateway::new());
    let store = Arc::new(MemoryDocumentStore::new());
    store::save_user_data(store.as_ref(), &document)
        .await
        .expect("Failed to seed local document");
    let engine = WeekEngine::load(gateway.clone(), store.clone(), config, date(week))
        .await
        .expect("Failed to load engine");
    Harness { engine, gateway, store }
}

fn rule(frequency: RecurrenceFrequency, start: &str) -> RecurrenceRule {
    RecurrenceRule {
        id: Uuid::new_v4(),
        frequency,
        interval: 1,
        start_date: date(start),
        end_date: None,
        title: "Standup".to_string(),
        kind: ItemType::Event,
        links_markdown: None,
        location: None,
        notes_markdown: None,
        goal_ids: Vec::new(),
        companion_ids: Vec::new(),
        group_id: None,
    }
}

fn document_with(rule: &RecurrenceRule) -> UserDataDocument {
    let mut document = UserDataDocument::default();
    document.recurrences.insert(rule.id, rule.clone());
    document
}

fn titles_in(state: &WeekState, day_index: DayIndex) -> Vec<String> {
    state
        .container_tasks(Container::root(day_index))
        .iter()
        .map(|t| t.title.clone())
        .collect()
}

#[tokio::test]
async fn test_add_task_relabels_with_server_id() {
    let h = setup("2025-01-12").await;
    h.engine.refresh().await;

    let added = h
        .engine
        .add_task(NewTask::new("Buy milk", 2))
        .await
        .expect("Failed to add task");

    assert_eq!(added.outcome, MutationOutcome::Applied);
    assert!(!is_temporary_id(&added.id));

    let row = h.gateway.row(&added.id).expect("row should exist remotely");
    assert_eq!(row.assigned_date, date("2025-01-14"));
    assert_eq!(row.position, 0);

    let state = h.engine.snapshot();
    assert_eq!(state.tasks.len(), 1);
    assert_eq!(state.tasks[0].id, added.id);
}

#[tokio::test]
async fn test_blank_title_gets_default() {
    let h = setup("2025-01-12").await;
    let added = h.engine.add_task(NewTask::new("   ", 0)).await.unwrap();
    assert_eq!(h.engine.task(&added.id).unwrap().title, "New task...");
}

#[tokio::test]
async fn test_offline_create_rolls_back_without_orphan() {
    let h = setup("2025-01-12").await;
    h.gateway.set_offline(true);

    let added = h.engine.add_task(NewTask::new("Call mom", 3)).await.unwrap();

    assert_eq!(added.outcome, MutationOutcome::RolledBack);
    let state = h.engine.snapshot();
    assert!(state.tasks.is_empty());
    assert!(h.engine.document().task_meta.is_empty());
}

#[tokio::test]
async fn test_failed_update_resyncs_to_server_state() {
    let h = setup("2025-01-12").await;
    let row = h.gateway.seed("Gym", date("2025-01-13"), 0);
    h.engine.refresh().await;
    h.gateway.fail_next(GatewayOp::Update, 1);

    let outcome = h.engine.update_task_title(&row.id, "Gym and sauna").await.unwrap();

    assert_eq!(outcome, MutationOutcome::Resynced);
    assert_eq!(h.engine.task(&row.id).unwrap().title, "Gym");
}

#[tokio::test]
async fn test_update_unknown_task_is_not_found() {
    let h = setup("2025-01-12").await;
    let result = h.engine.update_task_status("missing", TaskStatus::Completed).await;
    assert!(matches!(result, Err(CoreError::NotFound(_))));
}

#[tokio::test]
async fn test_stale_fetch_is_discarded_after_week_switch() {
    let h = setup("2025-01-12").await;
    h.gateway.seed("Old week", date("2025-01-14"), 0);
    h.gateway.seed("New week", date("2025-01-21"), 0);
    let held = h.gateway.hold_next(GatewayOp::ListWeekTasks);

    let first = h.engine.refresh();
    let switch = async {
        held.started().await;
        let outcome = h.engine.select_week(date("2025-01-22")).await;
        held.release();
        outcome
    };
    let (first_outcome, switch_outcome) = tokio::join!(first, switch);

    assert_eq!(first_outcome, FetchOutcome::Stale);
    assert_eq!(switch_outcome, FetchOutcome::Loaded);
    let state = h.engine.snapshot();
    assert_eq!(state.week_start, date("2025-01-19"));
    assert_eq!(titles_in(&state, 2), vec!["New week"]);
}

#[tokio::test]
async fn test_newer_edit_survives_resync_of_older_failure() {
    let h = setup("2025-01-12").await;
    let x = h.gateway.seed("Warm up", date("2025-01-13"), 0);
    let y = h.gateway.seed("Read", date("2025-01-13"), 1);
    h.engine.refresh().await;

    let held = h.gateway.hold_next(GatewayOp::Update);
    h.gateway.fail_next(GatewayOp::Update, 1);

    let edit_y = h.engine.update_task_title(&y.id, "Read two chapters");
    let edit_x = async {
        held.started().await;
        let outcome = h.engine.update_task_title(&x.id, "Stretch").await.unwrap();
        let y_title = h.engine.task(&y.id).unwrap().title;
        held.release();
        (outcome, y_title)
    };
    let (y_outcome, (x_outcome, y_title_during_resync)) = tokio::join!(edit_y, edit_x);

    assert_eq!(x_outcome, MutationOutcome::Resynced);
    assert_eq!(y_title_during_resync, "Read two chapters");
    assert_eq!(y_outcome.unwrap(), MutationOutcome::Applied);
    assert_eq!(h.engine.task(&x.id).unwrap().title, "Warm up");
    assert_eq!(h.gateway.row(&y.id).unwrap().title, "Read two chapters");
}

#[tokio::test]
async fn test_failed_fetch_keeps_previous_tasks() {
    let h = setup("2025-01-12").await;
    h.gateway.seed("Laundry", date("2025-01-18"), 0);
    assert_eq!(h.engine.refresh().await, FetchOutcome::Loaded);

    h.gateway.set_offline(true);
    assert_eq!(h.engine.refresh().await, FetchOutcome::Failed);

    let state = h.engine.snapshot();
    assert_eq!(titles_in(&state, 6), vec!["Laundry"]);
    assert!(!state.is_loading);
}

#[tokio::test]
async fn test_clear_day_records_skip_before_delete() {
    let daily = rule(RecurrenceFrequency::Day, "2025-01-26");
    let h = setup_with("2025-02-02", document_with(&daily), EngineConfig::default()).await;
    h.gateway.seed("Brunch", date("2025-02-02"), 0);
    h.engine.refresh().await;
    assert_eq!(h.engine.snapshot().container_tasks(Container::root(0)).len(), 2);

    let outcome = h.engine.delete_all_for_day(0).await.unwrap();

    assert_eq!(outcome, MutationOutcome::Applied);
    let document = h.engine.document();
    assert!(document.recurrence_exceptions[&daily.id].skips(date("2025-02-02")));
    assert!(h.engine.snapshot().container_tasks(Container::root(0)).is_empty());
    assert!(h.gateway.rows().is_empty());

    h.engine.refresh().await;
    let state = h.engine.snapshot();
    assert!(state.container_tasks(Container::root(0)).is_empty());
    assert_eq!(state.tasks.len(), 6);

    let saved = store::load_user_data(h.store.as_ref()).await.unwrap();
    assert!(saved.recurrence_exceptions[&daily.id].skips(date("2025-02-02")));
}

#[tokio::test]
async fn test_failed_clear_keeps_skip_dates() {
    let daily = rule(RecurrenceFrequency::Day, "2025-01-26");
    let h = setup_with("2025-02-02", document_with(&daily), EngineConfig::default()).await;
    h.gateway.seed("Brunch", date("2025-02-02"), 0);
    h.engine.refresh().await;
    h.gateway.fail_next(GatewayOp::DeleteDay, 1);

    let outcome = h.engine.delete_all_for_day(0).await.unwrap();

    assert_eq!(outcome, MutationOutcome::Resynced);
    let state = h.engine.snapshot();
    assert_eq!(titles_in(&state, 0), vec!["Brunch"]);
    assert!(state.tasks.iter().all(|t| t.occurrence_date != Some(date("2025-02-02"))));
}

#[tokio::test]
async fn test_failed_day_clear_restores_groups_and_types() {
    let h = setup("2025-01-12").await;
    let group = h.engine.add_group(1, Some("Party".to_string())).await.unwrap();
    let added = h
        .engine
        .add_task(NewTask::new("Cake", 1).in_group(group.id).of_kind(ItemType::Birthday))
        .await
        .unwrap();
    h.gateway.fail_next(GatewayOp::DeleteDay, 1);

    let outcome = h.engine.delete_all_for_day(1).await.unwrap();

    assert_eq!(outcome, MutationOutcome::Resynced);
    let state = h.engine.snapshot();
    assert_eq!(state.groups.len(), 1);
    assert_eq!(state.groups[0].id, group.id);
    let inside = state.container_tasks(Container {
        day_index: 1,
        group_id: Some(group.id),
    });
    assert_eq!(inside.len(), 1);
    assert_eq!(inside[0].id, added.id);
    assert_eq!(inside[0].kind, ItemType::Birthday);

    let saved = store::load_user_data(h.store.as_ref()).await.unwrap();
    assert_eq!(saved.groups_for(date("2025-01-12")).len(), 1);
    assert_eq!(saved.task_meta[&added.id].kind, ItemType::Birthday);
    assert_eq!(saved.task_meta[&added.id].group_id, Some(group.id));
}

#[tokio::test]
async fn test_clear_week_removes_groups_and_rows() {
    let h = setup("2025-01-12").await;
    h.gateway.seed("Dentist", date("2025-01-15"), 0);
    h.gateway.seed("Outside", date("2025-01-20"), 0);
    h.engine.refresh().await;
    h.engine.add_group(4, Some("Errands".to_string())).await.unwrap();

    let outcome = h.engine.clear_current_week().await.unwrap();

    assert_eq!(outcome, MutationOutcome::Applied);
    let state = h.engine.snapshot();
    assert!(state.tasks.is_empty());
    assert!(state.groups.is_empty());
    assert_eq!(h.gateway.rows().len(), 1);
}

#[tokio::test]
async fn test_skip_dates_stay_unique() {
    let daily = rule(RecurrenceFrequency::Day, "2025-01-12");
    let h = setup_with("2025-01-12", document_with(&daily), EngineConfig::default()).await;
    h.engine.refresh().await;

    let occurrence = h.engine.snapshot().container_tasks(Container::root(3))[0].id.clone();
    h.engine.delete_task_occurrence(&occurrence).await.unwrap();
    h.engine.delete_all_for_day(3).await.unwrap();
    h.engine.clear_current_week().await.unwrap();

    let document = h.engine.document();
    let skips = &document.recurrence_exceptions[&daily.id].skip_dates;
    assert_eq!(skips.len(), 7);
    assert!(skips.contains(&date("2025-01-15")));
}

#[tokio::test]
async fn test_move_within_day_keeps_positions_dense() {
    let h = setup("2025-01-12").await;
    let a = h.gateway.seed("a", date("2025-01-13"), 0);
    let b = h.gateway.seed("b", date("2025-01-13"), 1);
    let c = h.gateway.seed("c", date("2025-01-13"), 2);
    h.engine.refresh().await;

    let outcome = h.engine.move_task(&a.id, 1, 2).await.unwrap();

    assert_eq!(outcome, MutationOutcome::Applied);
    let state = h.engine.snapshot();
    assert_eq!(titles_in(&state, 1), vec!["b", "c", "a"]);
    assert_eq!(h.gateway.row(&a.id).unwrap().position, 2);
    assert_eq!(h.gateway.row(&b.id).unwrap().position, 0);
    assert_eq!(h.gateway.row(&c.id).unwrap().position, 1);
}

#[tokio::test]
async fn test_move_across_days_updates_assigned_date() {
    let h = setup("2025-01-12").await;
    let a = h.gateway.seed("a", date("2025-01-13"), 0);
    let b = h.gateway.seed("b", date("2025-01-13"), 1);
    h.gateway.seed("x", date("2025-01-15"), 0);
    h.engine.refresh().await;

    h.engine.move_task(&a.id, 3, 0).await.unwrap();

    let state = h.engine.snapshot();
    assert_eq!(titles_in(&state, 1), vec!["b"]);
    assert_eq!(titles_in(&state, 3), vec!["a", "x"]);
    assert!(positions::is_dense(&state.tasks));

    let row = h.gateway.row(&a.id).unwrap();
    assert_eq!(row.assigned_date, date("2025-01-15"));
    assert_eq!(row.position, 0);
    assert_eq!(h.gateway.row(&b.id).unwrap().position, 0);
}

#[tokio::test]
async fn test_move_out_of_group_resets_group() {
    let h = setup("2025-01-12").await;
    let group = h.engine.add_group(2, None).await.unwrap();
    let added = h
        .engine
        .add_task(NewTask::new("Pack", 2).in_group(group.id))
        .await
        .unwrap();

    h.engine.move_task(&added.id, 2, 0).await.unwrap();

    assert_eq!(h.engine.task(&added.id).unwrap().group_id, None);
    assert!(!h.engine.document().task_meta.contains_key(&added.id));
}

#[tokio::test]
async fn test_failed_move_resyncs_to_dense_order() {
    let h = setup("2025-01-12").await;
    let a = h.gateway.seed("a", date("2025-01-13"), 0);
    h.gateway.seed("b", date("2025-01-13"), 1);
    h.gateway.seed("c", date("2025-01-13"), 2);
    h.engine.refresh().await;
    h.gateway.fail_next(GatewayOp::Update, 1);

    let outcome = h.engine.move_task(&a.id, 1, 2).await.unwrap();

    assert_eq!(outcome, MutationOutcome::Resynced);
    let state = h.engine.snapshot();
    assert_eq!(state.tasks.len(), 3);
    assert!(positions::is_dense(&state.tasks));
}

#[tokio::test]
async fn test_move_clamps_target_position() {
    let h = setup("2025-01-12").await;
    let a = h.gateway.seed("a", date("2025-01-13"), 0);
    h.gateway.seed("b", date("2025-01-13"), 1);
    h.engine.refresh().await;

    h.engine.move_task(&a.id, 1, 99).await.unwrap();

    assert_eq!(titles_in(&h.engine.snapshot(), 1), vec!["b", "a"]);
}

#[tokio::test]
async fn test_recurrence_from_task_expands_week() {
    let h = setup("2025-01-12").await;
    let added = h.engine.add_task(NewTask::new("Stretch", 0)).await.unwrap();
    let draft = RecurrenceDraft {
        frequency: RecurrenceFrequency::Day,
        interval: 0,
        start_date: date("2025-01-12"),
        end_date: None,
    };

    let (recurrence_id, outcome) = h
        .engine
        .create_or_update_recurrence_from_task(&added.id, draft)
        .await
        .unwrap();

    assert_eq!(outcome, MutationOutcome::Applied);
    let rule = h.engine.recurrence(recurrence_id).unwrap();
    assert_eq!(rule.interval, 1);
    assert_eq!(rule.title, "Stretch");

    let state = h.engine.snapshot();
    assert_eq!(state.tasks.len(), 7);
    assert_eq!(titles_in(&state, 0), vec!["Stretch"]);
    let linked = state.task(&added.id).unwrap();
    assert_eq!(linked.recurrence_id, Some(recurrence_id));
    assert_eq!(linked.occurrence_date, Some(date("2025-01-12")));
}

#[tokio::test]
async fn test_recurrence_draft_end_before_start_is_rejected() {
    let h = setup("2025-01-12").await;
    let added = h.engine.add_task(NewTask::new("Stretch", 0)).await.unwrap();
    let draft = RecurrenceDraft {
        frequency: RecurrenceFrequency::Week,
        interval: 1,
        start_date: date("2025-01-12"),
        end_date: Some(date("2025-01-01")),
    };

    let result = h.engine.create_or_update_recurrence_from_task(&added.id, draft).await;

    assert!(matches!(result, Err(CoreError::InvalidInput(_))));
    assert!(h.engine.recurrences().is_empty());
}

#[tokio::test]
async fn test_delete_series_purges_occurrences_and_rows() {
    let h = setup("2025-01-12").await;
    let added = h.engine.add_task(NewTask::new("Stretch", 0)).await.unwrap();
    let draft = RecurrenceDraft {
        frequency: RecurrenceFrequency::Day,
        interval: 1,
        start_date: date("2025-01-12"),
        end_date: None,
    };
    let (recurrence_id, _) = h
        .engine
        .create_or_update_recurrence_from_task(&added.id, draft)
        .await
        .unwrap();
    let occurrence = h.engine.snapshot().container_tasks(Container::root(2))[0].id.clone();
    h.engine.delete_task_occurrence(&occurrence).await.unwrap();

    let outcome = h.engine.delete_recurrence_series(recurrence_id).await.unwrap();

    assert_eq!(outcome, MutationOutcome::Applied);
    assert!(h.engine.snapshot().tasks.is_empty());
    assert!(h.gateway.rows().is_empty());
    let document = h.engine.document();
    assert!(document.recurrences.is_empty());
    assert!(document.recurrence_exceptions.is_empty());
    assert!(document.task_meta.is_empty());
}

#[tokio::test]
async fn test_delete_unknown_series_is_not_found() {
    let h = setup("2025-01-12").await;
    let result = h.engine.delete_recurrence_series(Uuid::new_v4()).await;
    assert!(matches!(result, Err(CoreError::NotFound(_))));
}

#[tokio::test]
async fn test_editing_occurrence_materializes_row() {
    let weekly = rule(RecurrenceFrequency::Week, "2025-01-13");
    let h = setup_with("2025-01-12", document_with(&weekly), EngineConfig::default()).await;
    h.engine.refresh().await;
    let occurrence = h.engine.snapshot().container_tasks(Container::root(1))[0].id.clone();
    assert!(is_occurrence_id(&occurrence));

    let outcome = h.engine.update_task_status(&occurrence, TaskStatus::Completed).await.unwrap();

    assert_eq!(outcome, MutationOutcome::Applied);
    let state = h.engine.snapshot();
    let tasks = state.container_tasks(Container::root(1));
    assert_eq!(tasks.len(), 1);
    let materialized = tasks[0].clone();
    assert!(!is_occurrence_id(&materialized.id));
    assert_eq!(materialized.status, TaskStatus::Completed);
    assert_eq!(materialized.recurrence_id, Some(weekly.id));

    let row = h.gateway.row(&materialized.id).unwrap();
    assert_eq!(row.status, "completed");
    assert_eq!(row.assigned_date, date("2025-01-13"));

    h.engine.refresh().await;
    let state = h.engine.snapshot();
    let tasks = state.container_tasks(Container::root(1));
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].id, materialized.id);
    assert_eq!(tasks[0].kind, ItemType::Event);
}

#[tokio::test]
async fn test_deleting_materialized_occurrence_deletes_row_and_skips() {
    let weekly = rule(RecurrenceFrequency::Week, "2025-01-13");
    let h = setup_with("2025-01-12", document_with(&weekly), EngineConfig::default()).await;
    h.engine.refresh().await;
    let occurrence = h.engine.snapshot().container_tasks(Container::root(1))[0].id.clone();
    h.engine.update_task_title(&occurrence, "Standup (remote)").await.unwrap();
    let materialized = h.engine.snapshot().container_tasks(Container::root(1))[0].id.clone();

    h.engine.delete_task_occurrence(&materialized).await.unwrap();
    h.engine.refresh().await;

    assert!(h.engine.snapshot().tasks.is_empty());
    assert!(h.gateway.rows().is_empty());
    assert!(h.engine.document().recurrence_exceptions[&weekly.id].skips(date("2025-01-13")));
}

#[tokio::test]
async fn test_failed_delete_keeps_task_type() {
    let h = setup("2025-01-12").await;
    let row = h.gateway.seed("Mom", date("2025-01-14"), 0);
    h.engine.refresh().await;
    h.engine.update_task_type(&row.id, ItemType::Birthday).await.unwrap();
    h.gateway.fail_next(GatewayOp::Delete, 1);

    let outcome = h.engine.delete_task(&row.id).await.unwrap();

    assert_eq!(outcome, MutationOutcome::Resynced);
    assert_eq!(h.engine.task(&row.id).unwrap().kind, ItemType::Birthday);
    assert!(h.engine.document().task_meta.contains_key(&row.id));
    let saved = store::load_user_data(h.store.as_ref()).await.unwrap();
    assert_eq!(saved.task_meta[&row.id].kind, ItemType::Birthday);
}

#[tokio::test]
async fn test_failed_delete_of_materialized_occurrence_keeps_link() {
    let weekly = rule(RecurrenceFrequency::Week, "2025-01-13");
    let h = setup_with("2025-01-12", document_with(&weekly), EngineConfig::default()).await;
    h.engine.refresh().await;
    let occurrence = h.engine.snapshot().container_tasks(Container::root(1))[0].id.clone();
    h.engine.update_task_title(&occurrence, "Standup (remote)").await.unwrap();
    let materialized = h.engine.snapshot().container_tasks(Container::root(1))[0].id.clone();
    h.gateway.fail_next(GatewayOp::Delete, 1);

    let outcome = h.engine.delete_task(&materialized).await.unwrap();

    assert_eq!(outcome, MutationOutcome::Resynced);
    let state = h.engine.snapshot();
    let tasks = state.container_tasks(Container::root(1));
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].id, materialized);
    assert_eq!(tasks[0].recurrence_id, Some(weekly.id));
    assert_eq!(tasks[0].occurrence_date, Some(date("2025-01-13")));
    let document = h.engine.document();
    assert!(!document
        .recurrence_exceptions
        .get(&weekly.id)
        .is_some_and(|e| e.skips(date("2025-01-13"))));
}

#[tokio::test]
async fn test_failed_series_delete_keeps_rule_and_links() {
    let weekly = rule(RecurrenceFrequency::Week, "2025-01-13");
    let h = setup_with("2025-01-12", document_with(&weekly), EngineConfig::default()).await;
    h.engine.refresh().await;
    let occurrence = h.engine.snapshot().container_tasks(Container::root(1))[0].id.clone();
    h.engine.update_task_status(&occurrence, TaskStatus::Completed).await.unwrap();
    let materialized = h.engine.snapshot().container_tasks(Container::root(1))[0].id.clone();
    h.gateway.fail_next(GatewayOp::Delete, 1);

    let outcome = h.engine.delete_recurrence_series(weekly.id).await.unwrap();

    assert_eq!(outcome, MutationOutcome::Resynced);
    let document = h.engine.document();
    assert!(document.recurrences.contains_key(&weekly.id));
    assert_eq!(document.task_meta[&materialized].recurrence_id, Some(weekly.id));
    let state = h.engine.snapshot();
    let tasks = state.container_tasks(Container::root(1));
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].id, materialized);
    assert_eq!(tasks[0].kind, ItemType::Event);
}

#[tokio::test]
async fn test_delete_series_reaches_rows_of_other_weeks() {
    let weekly = rule(RecurrenceFrequency::Week, "2025-01-13");
    let h = setup_with("2025-01-12", document_with(&weekly), EngineConfig::default()).await;
    h.engine.refresh().await;
    let occurrence = h.engine.snapshot().container_tasks(Container::root(1))[0].id.clone();
    h.engine.update_task_title(&occurrence, "Standup (moved)").await.unwrap();
    let materialized = h.engine.snapshot().container_tasks(Container::root(1))[0].id.clone();
    assert!(h.gateway.row(&materialized).is_some());

    h.engine.select_week(date("2025-01-19")).await;
    let outcome = h.engine.delete_recurrence_series(weekly.id).await.unwrap();

    assert_eq!(outcome, MutationOutcome::Applied);
    assert!(h.gateway.row(&materialized).is_none());
    assert!(h.engine.snapshot().tasks.is_empty());

    let outcome = h.engine.select_week(date("2025-01-12")).await;
    assert_eq!(outcome, FetchOutcome::Loaded);
    let state = h.engine.snapshot();
    assert!(state.tasks.is_empty());
    assert!(h.engine.document().task_meta.is_empty());
}

#[tokio::test]
async fn test_edits_during_create_are_flushed_once() {
    let h = setup("2025-01-12").await;
    let held = h.gateway.hold_next(GatewayOp::Create);

    let add = h.engine.add_task(NewTask::new("Draft", 2));
    let edit = async {
        held.started().await;
        let temporary = h.engine.snapshot().tasks[0].id.clone();
        assert!(is_temporary_id(&temporary));
        h.engine.update_task_title(&temporary, "Final").await.unwrap();
        h.engine.update_task_status(&temporary, TaskStatus::Completed).await.unwrap();
        held.release();
    };
    let (added, ()) = tokio::join!(add, edit);
    let added = added.unwrap();

    assert_eq!(added.outcome, MutationOutcome::Applied);
    let row = h.gateway.row(&added.id).unwrap();
    assert_eq!(row.title, "Final");
    assert_eq!(row.status, "completed");
    assert_eq!(h.gateway.calls_of(GatewayOp::Update).len(), 1);
    assert_eq!(h.engine.task(&added.id).unwrap().title, "Final");
}

#[tokio::test]
async fn test_delete_during_create_removes_server_row() {
    let h = setup("2025-01-12").await;
    let held = h.gateway.hold_next(GatewayOp::Create);

    let add = h.engine.add_task(NewTask::new("Oops", 5));
    let delete = async {
        held.started().await;
        let temporary = h.engine.snapshot().tasks[0].id.clone();
        let outcome = h.engine.delete_task(&temporary).await.unwrap();
        held.release();
        outcome
    };
    let (added, deleted) = tokio::join!(add, delete);

    assert_eq!(added.unwrap().outcome, MutationOutcome::Applied);
    assert_eq!(deleted, MutationOutcome::Applied);
    assert!(h.engine.snapshot().tasks.is_empty());
    assert!(h.gateway.rows().is_empty());
}

#[tokio::test]
async fn test_manual_save_buffers_until_commit() {
    let h = setup("2025-01-12").await;
    let row = h.gateway.seed("Essay", date("2025-01-16"), 0);
    h.engine.refresh().await;
    h.gateway.clear_calls();

    h.engine.patch_task_local(&row.id, TaskPatch::title("Essay draft")).unwrap();
    h.engine
        .patch_task_local(&row.id, TaskPatch::status(TaskStatus::Completed))
        .unwrap();

    assert!(h.engine.is_dirty());
    assert!(h.gateway.calls().is_empty());
    assert_eq!(h.engine.task(&row.id).unwrap().title, "Essay draft");

    h.engine.refresh().await;
    assert_eq!(h.engine.task(&row.id).unwrap().title, "Essay draft");

    let outcome = h.engine.commit_task_patch(&row.id).await.unwrap();

    assert_eq!(outcome, MutationOutcome::Applied);
    assert!(!h.engine.is_dirty());
    assert_eq!(h.gateway.calls_of(GatewayOp::Update).len(), 1);
    let stored = h.gateway.row(&row.id).unwrap();
    assert_eq!(stored.title, "Essay draft");
    assert_eq!(stored.status, "completed");
}

#[tokio::test]
async fn test_close_commits_buffered_patches() {
    let h = setup("2025-01-12").await;
    let row = h.gateway.seed("Essay", date("2025-01-16"), 0);
    h.engine.refresh().await;
    h.engine.patch_task_local(&row.id, TaskPatch::title("Essay v2")).unwrap();

    h.engine.close().await;

    assert!(!h.engine.is_dirty());
    assert_eq!(h.gateway.row(&row.id).unwrap().title, "Essay v2");
}

#[tokio::test]
async fn test_week_switch_sends_buffered_patches_of_previous_week() {
    let h = setup("2025-01-12").await;
    let row = h.gateway.seed("Essay", date("2025-01-16"), 0);
    h.engine.refresh().await;
    h.engine.patch_task_local(&row.id, TaskPatch::title("Essay v3")).unwrap();

    let outcome = h.engine.select_week(date("2025-01-20")).await;

    assert_eq!(outcome, FetchOutcome::Loaded);
    assert!(!h.engine.is_dirty());
    assert_eq!(h.gateway.row(&row.id).unwrap().title, "Essay v3");
}

#[tokio::test]
async fn test_failed_buffered_patch_does_not_refetch_previous_week() {
    let h = setup("2025-01-12").await;
    let row = h.gateway.seed("Essay", date("2025-01-16"), 0);
    h.gateway.seed("Next", date("2025-01-21"), 0);
    h.engine.refresh().await;
    h.engine.patch_task_local(&row.id, TaskPatch::title("Essay v3")).unwrap();
    h.gateway.clear_calls();
    h.gateway.fail_next(GatewayOp::Update, 1);

    let outcome = h.engine.select_week(date("2025-01-20")).await;

    assert_eq!(outcome, FetchOutcome::Loaded);
    assert_eq!(h.gateway.calls_of(GatewayOp::Update).len(), 1);
    assert_eq!(
        h.gateway.calls_of(GatewayOp::ListWeekTasks),
        vec![GatewayCall::ListWeekTasks(date("2025-01-19"))]
    );
    let state = h.engine.snapshot();
    assert_eq!(state.week_start, date("2025-01-19"));
    assert_eq!(titles_in(&state, 2), vec!["Next"]);
    assert_eq!(h.gateway.row(&row.id).unwrap().title, "Essay");
    assert!(!h.engine.is_dirty());
}

#[tokio::test]
async fn test_groups_are_local_and_ordered() {
    let h = setup("2025-01-12").await;
    let first = h.engine.add_group(1, None).await.unwrap();
    let second = h.engine.add_group(1, Some("Work".to_string())).await.unwrap();

    assert_eq!(first.title, "New Group");
    assert_eq!(first.position, 0);
    assert_eq!(second.position, 1);

    h.engine.update_group_title(first.id, "Home").await.unwrap();
    let saved = store::load_user_data(h.store.as_ref()).await.unwrap();
    let groups = saved.groups_for(date("2025-01-12"));
    assert_eq!(groups.len(), 2);
    assert!(groups.iter().any(|g| g.title == "Home"));
    assert!(h.gateway.calls().is_empty());
}

#[tokio::test]
async fn test_delete_group_removes_its_tasks() {
    let h = setup("2025-01-12").await;
    let first = h.engine.add_group(1, None).await.unwrap();
    let second = h.engine.add_group(1, Some("Work".to_string())).await.unwrap();
    let inside = h
        .engine
        .add_task(NewTask::new("Inside", 1).in_group(first.id))
        .await
        .unwrap();
    let outside = h.engine.add_task(NewTask::new("Outside", 1)).await.unwrap();

    let outcome = h.engine.delete_group(first.id).await.unwrap();

    assert_eq!(outcome, MutationOutcome::Applied);
    let state = h.engine.snapshot();
    assert!(state.task(&inside.id).is_none());
    assert!(state.task(&outside.id).is_some());
    assert!(h.gateway.row(&inside.id).is_none());
    assert_eq!(state.groups.len(), 1);
    assert_eq!(state.groups[0].id, second.id);
    assert_eq!(state.groups[0].position, 0);
}

#[tokio::test]
async fn test_add_task_to_group_on_other_day_is_rejected() {
    let h = setup("2025-01-12").await;
    let group = h.engine.add_group(1, None).await.unwrap();

    let result = h.engine.add_task(NewTask::new("Misplaced", 4).in_group(group.id)).await;

    assert!(matches!(result, Err(CoreError::InvalidInput(_))));
    assert!(h.gateway.calls().is_empty());
}

#[rstest]
#[case(7)]
#[case(42)]
#[tokio::test]
async fn test_invalid_day_index_is_rejected(#[case] day_index: u8) {
    let h = setup("2025-01-12").await;
    let row = h.gateway.seed("Anything", date("2025-01-13"), 0);
    h.engine.refresh().await;

    assert!(matches!(
        h.engine.add_task(NewTask::new("Nope", day_index)).await,
        Err(CoreError::InvalidInput(_))
    ));
    assert!(matches!(
        h.engine.move_task(&row.id, day_index, 0).await,
        Err(CoreError::InvalidInput(_))
    ));
    assert!(matches!(
        h.engine.delete_all_for_day(day_index).await,
        Err(CoreError::InvalidInput(_))
    ));
}

#[tokio::test]
async fn test_store_failure_keeps_local_change() {
    let h = setup("2025-01-12").await;
    let added = h.engine.add_task(NewTask::new("Party", 6)).await.unwrap();
    h.store.set_failing(true);

    let group = h.engine.add_group(6, None).await;
    let outcome = h.engine.update_task_type(&added.id, ItemType::Birthday).await.unwrap();

    assert!(group.is_ok());
    assert_eq!(outcome, MutationOutcome::Applied);
    assert_eq!(h.engine.task(&added.id).unwrap().kind, ItemType::Birthday);
}

#[tokio::test]
async fn test_overlay_survives_refetch() {
    let h = setup("2025-01-12").await;
    let added = h.engine.add_task(NewTask::new("Party", 6)).await.unwrap();
    let goal = h.engine.add_goal("Health", Some("💪".to_string())).await.unwrap();
    let friend = h.engine.add_companion("Sam", "friend", None).await.unwrap();

    h.engine.update_task_type(&added.id, ItemType::Event).await.unwrap();
    h.engine.set_task_goals(&added.id, vec![goal.id]).await.unwrap();
    h.engine.set_task_companions(&added.id, vec![friend.id]).await.unwrap();
    h.engine.refresh().await;

    let task = h.engine.task(&added.id).unwrap();
    assert_eq!(task.kind, ItemType::Event);
    assert_eq!(task.goal_ids, vec![goal.id]);
    assert_eq!(task.companion_ids, vec![friend.id]);
}

#[tokio::test]
async fn test_unknown_goal_is_not_found() {
    let h = setup("2025-01-12").await;
    let added = h.engine.add_task(NewTask::new("Run", 1)).await.unwrap();
    let result = h.engine.set_task_goals(&added.id, vec![Uuid::new_v4()]).await;
    assert!(matches!(result, Err(CoreError::NotFound(_))));
}

#[tokio::test]
async fn test_deleting_goal_unlinks_tasks() {
    let h = setup("2025-01-12").await;
    let added = h.engine.add_task(NewTask::new("Run", 1)).await.unwrap();
    let goal = h.engine.add_goal("Health", None).await.unwrap();
    h.engine.set_task_goals(&added.id, vec![goal.id]).await.unwrap();

    h.engine.delete_goal(goal.id).await.unwrap();

    assert!(h.engine.task(&added.id).unwrap().goal_ids.is_empty());
    assert!(h.engine.goals().is_empty());
    assert!(h.engine.document().task_meta.is_empty());
}

#[tokio::test]
async fn test_companion_catalog_updates() {
    let h = setup("2025-01-12").await;
    let companion = h.engine.add_companion("Ana", "sister", Some("  ".to_string())).await.unwrap();
    assert_eq!(companion.description, None);
    assert!(companion.color.starts_with("hsl("));

    let updated = h
        .engine
        .update_companion(
            companion.id,
            CompanionUpdate {
                relationship: Some("family".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.relationship, "family");
    assert_eq!(updated.name, "Ana");
    h.engine.delete_companion(companion.id).await.unwrap();
    assert!(h.engine.companions().is_empty());
}

#[tokio::test]
async fn test_schedule_with_end_before_start_is_rejected() {
    let h = setup("2025-01-12").await;
    let added = h.engine.add_task(NewTask::new("Trip", 2)).await.unwrap();
    let schedule = TaskSchedule {
        start_date: Some(date("2025-01-20")),
        end_date: Some(date("2025-01-18")),
        ..Default::default()
    };
    let result = h.engine.update_task_schedule(&added.id, schedule).await;
    assert!(matches!(result, Err(CoreError::InvalidInput(_))));
}

#[tokio::test]
async fn test_links_and_notes_reach_the_gateway() {
    let h = setup("2025-01-12").await;
    let added = h.engine.add_task(NewTask::new("Read", 2)).await.unwrap();

    h.engine
        .update_task_links(&added.id, Some("- [Docs](https://docs.rs)\n\n- https://crates.io".to_string()))
        .await
        .unwrap();
    h.engine
        .update_task_notes(&added.id, Some("chapter 3".to_string()))
        .await
        .unwrap();

    let row = h.gateway.row(&added.id).unwrap();
    assert_eq!(row.links.len(), 2);
    assert_eq!(row.links[0].label.as_deref(), Some("Docs"));
    assert_eq!(row.notes.as_deref(), Some("chapter 3"));

    h.engine.update_task_links(&added.id, Some("   ".to_string())).await.unwrap();
    assert!(h.gateway.row(&added.id).unwrap().links.is_empty());
    assert_eq!(h.engine.task(&added.id).unwrap().links_markdown, None);
}

#[tokio::test]
async fn test_available_weeks_are_sorted_descending() {
    let h = setup("2025-01-12").await;
    h.gateway.seed("Early", date("2024-12-31"), 0);
    h.gateway.seed("Late", date("2025-02-04"), 0);

    let weeks = h.engine.refresh_available_weeks().await;

    assert_eq!(
        weeks,
        vec![date("2025-02-02"), date("2025-01-12"), date("2024-12-29")]
    );

    h.gateway.set_offline(true);
    assert_eq!(h.engine.refresh_available_weeks().await, weeks);
}

#[tokio::test]
async fn test_select_week_for_date_snaps_to_sunday() {
    let h = setup("2025-01-12").await;
    h.gateway.seed("Midweek", date("2025-03-05"), 0);

    let outcome = h.engine.select_week_for_date(date("2025-03-06")).await;

    assert_eq!(outcome, FetchOutcome::Loaded);
    let state = h.engine.snapshot();
    assert_eq!(state.week_start, date("2025-03-02"));
    assert_eq!(titles_in(&state, 3), vec!["Midweek"]);
}

#[tokio::test]
async fn test_resync_after_move_refetches() {
    let config = EngineConfig {
        persist_shifted_positions: false,
        resync_after_move: true,
    };
    let h = setup_with("2025-01-12", UserDataDocument::default(), config).await;
    let a = h.gateway.seed("a", date("2025-01-13"), 0);
    h.gateway.seed("b", date("2025-01-13"), 1);
    h.engine.refresh().await;
    h.gateway.clear_calls();

    h.engine.move_task(&a.id, 1, 1).await.unwrap();

    assert_eq!(h.gateway.calls_of(GatewayOp::Update).len(), 1);
    assert_eq!(h.gateway.calls_of(GatewayOp::ListWeekTasks).len(), 1);
    assert!(positions::is_dense(&h.engine.snapshot().tasks));
}
