use chrono::{Datelike, NaiveDate};
use std::collections::{BTreeMap, HashMap, HashSet};
use uuid::Uuid;

use crate::dates::{self, DAYS_PER_WEEK};
use crate::models::{
    Container, RecurrenceException, RecurrenceFrequency, RecurrenceRule, Task, TaskStatus,
    OCCURRENCE_ID_PREFIX,
};

/// Deterministic id of the virtual occurrence of `recurrence_id` on `date`.
pub fn occurrence_id(recurrence_id: Uuid, date: NaiveDate) -> String {
    format!("{}{}-{}", OCCURRENCE_ID_PREFIX, recurrence_id, date.format("%Y-%m-%d"))
}

/// Inverse of [`occurrence_id`].
pub fn parse_occurrence_id(id: &str) -> Option<(Uuid, NaiveDate)> {
    let rest = id.strip_prefix(OCCURRENCE_ID_PREFIX)?;
    // A hyphenated uuid is 36 chars, then '-', then a 10 char date.
    if rest.len() != 36 + 1 + 10 || rest.as_bytes().get(36) != Some(&b'-') {
        return None;
    }
    let recurrence_id = Uuid::parse_str(&rest[..36]).ok()?;
    let date = NaiveDate::parse_from_str(&rest[37..], "%Y-%m-%d").ok()?;
    Some((recurrence_id, date))
}

/// Occurrence calculation for a single rule and its skip dates.
///
/// Responsibilities:
/// 1. Decide whether the rule produces an occurrence on a date
/// 2. List the non-skipped occurrence dates inside a week
/// 3. Synthesize the virtual task for an occurrence
#[derive(Debug, Clone, Copy)]
pub struct RuleExpander<'a> {
    rule: &'a RecurrenceRule,
    exception: Option<&'a RecurrenceException>,
}

impl<'a> RuleExpander<'a> {
    pub fn new(rule: &'a RecurrenceRule, exception: Option<&'a RecurrenceException>) -> Self {
        Self { rule, exception }
    }

    pub fn rule(&self) -> &RecurrenceRule {
        self.rule
    }

    /// Whether the rule's pattern hits `date`, ignoring skip dates.
    ///
    /// # Behavior
    /// - Dates before the start or after the optional end never occur
    /// - A zero interval never occurs
    /// - `Day`: day difference from the start is a multiple of the interval
    /// - `Week`: same weekday, whole-week difference a multiple of the interval
    /// - `Month`: month difference a multiple of the interval and either the
    ///   same day of month, or the last day of a month too short for it
    pub fn occurs_on(&self, date: NaiveDate) -> bool {
        let rule = self.rule;
        if date < rule.start_date {
            return false;
        }
        if rule.end_date.is_some_and(|end| date > end) {
            return false;
        }
        if rule.interval == 0 {
            return false;
        }
        let interval = i64::from(rule.interval);

        match rule.frequency {
            RecurrenceFrequency::Day => (date - rule.start_date).num_days() % interval == 0,
            RecurrenceFrequency::Week => {
                if date.weekday() != rule.start_date.weekday() {
                    return false;
                }
                let weeks = (date - rule.start_date).num_days() / 7;
                weeks % interval == 0
            }
            RecurrenceFrequency::Month => {
                let months = dates::months_between(rule.start_date, date);
                if months % interval != 0 {
                    return false;
                }
                let start_day = rule.start_date.day();
                if date.day() == start_day {
                    return true;
                }
                let last_day = dates::days_in_month(date);
                date.day() == last_day && start_day > last_day
            }
        }
    }

    pub fn is_skipped(&self, date: NaiveDate) -> bool {
        self.exception.is_some_and(|ex| ex.skips(date))
    }

    /// Non-skipped occurrence dates in `[week_start, week_start + 6]`.
    pub fn occurrence_dates_in_week(&self, week_start: NaiveDate) -> Vec<NaiveDate> {
        if self.rule.start_date > dates::week_end(week_start) {
            return Vec::new();
        }
        if self.rule.end_date.is_some_and(|end| end < week_start) {
            return Vec::new();
        }
        (0..DAYS_PER_WEEK)
            .map(|day| dates::week_date(week_start, day))
            .filter(|date| self.occurs_on(*date) && !self.is_skipped(*date))
            .collect()
    }

    /// Virtual task for the occurrence on `date`, carrying the rule's content.
    pub fn materialize(&self, week_start: NaiveDate, date: NaiveDate, position: usize) -> Option<Task> {
        let day_index = dates::day_index_for(week_start, date)?;
        let rule = self.rule;
        let mut task = Task::new(occurrence_id(rule.id, date), rule.title.clone(), day_index, position);
        task.status = TaskStatus::Open;
        task.kind = rule.kind;
        task.group_id = rule.group_id;
        task.notes_markdown = rule.notes_markdown.clone();
        task.links_markdown = rule.links_markdown.clone();
        task.location = rule.location.clone();
        task.goal_ids = rule.goal_ids.clone();
        task.companion_ids = rule.companion_ids.clone();
        task.recurrence_id = Some(rule.id);
        task.occurrence_date = Some(date);
        Some(task)
    }
}

/// Virtual occurrences every rule produces in the week, before merging.
///
/// Positions are left at zero; [`merge_occurrences`] assigns them.
pub fn week_occurrences(
    week_start: NaiveDate,
    rules: &BTreeMap<Uuid, RecurrenceRule>,
    exceptions: &BTreeMap<Uuid, RecurrenceException>,
) -> Vec<Task> {
    let mut occurrences = Vec::new();
    for (rid, rule) in rules {
        let expander = RuleExpander::new(rule, exceptions.get(rid));
        for date in expander.occurrence_dates_in_week(week_start) {
            if let Some(task) = expander.materialize(week_start, date, 0) {
                occurrences.push(task);
            }
        }
    }
    occurrences
}

/// Union of persisted rows and virtual occurrences keyed by
/// `(recurrence_id, occurrence_date)`.
///
/// # Behavior
/// - A persisted row encoding an occurrence wins over the virtual one
/// - Persisted linked rows whose date is skipped are dropped
/// - Each added occurrence goes to the end of its `(day, group)` container
pub fn merge_occurrences(
    base: Vec<Task>,
    occurrences: Vec<Task>,
    exceptions: &BTreeMap<Uuid, RecurrenceException>,
) -> Vec<Task> {
    let mut merged: Vec<Task> = base
        .into_iter()
        .filter(|task| match task.occurrence_key() {
            Some((rid, date)) => !exceptions.get(&rid).is_some_and(|ex| ex.skips(date)),
            None => true,
        })
        .collect();

    let mut present: HashSet<(Uuid, NaiveDate)> =
        merged.iter().filter_map(Task::occurrence_key).collect();
    let mut next_position: HashMap<Container, usize> = HashMap::new();
    for task in &merged {
        let slot = next_position.entry(task.container()).or_insert(0);
        *slot = (*slot).max(task.position + 1);
    }

    let mut occurrences = occurrences;
    occurrences.sort_by_key(|t| (t.day_index, t.occurrence_date, t.recurrence_id));
    for mut occurrence in occurrences {
        let Some(key) = occurrence.occurrence_key() else {
            continue;
        };
        if !present.insert(key) {
            continue;
        }
        let slot = next_position.entry(occurrence.container()).or_insert(0);
        occurrence.position = *slot;
        *slot += 1;
        merged.push(occurrence);
    }
    merged
}

/// Persisted base tasks of a week overlaid with the week's rule occurrences.
pub fn expand(
    week_start: NaiveDate,
    base_tasks: Vec<Task>,
    rules: &BTreeMap<Uuid, RecurrenceRule>,
    exceptions: &BTreeMap<Uuid, RecurrenceException>,
) -> Vec<Task> {
    let occurrences = week_occurrences(week_start, rules, exceptions);
    merge_occurrences(base_tasks, occurrences, exceptions)
}
