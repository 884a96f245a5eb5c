use anyhow::{anyhow, Result};
use owo_colors::OwoColorize;
use uuid::Uuid;
use weekly_core::error::CoreError;
use weekly_core::gateway::TaskGateway;
use weekly_core::models::{is_occurrence_id, FetchOutcome, MutationOutcome, TaskId};
use weekly_core::store::DocumentStore;
use weekly_core::WeekEngine;

const MIN_PREFIX_LEN: usize = 2;

/// Short form of a task id for display. Occurrence ids keep their prefix
/// so the short form still resolves.
pub fn short_id(id: &str) -> String {
    let len = if is_occurrence_id(id) { 12 } else { 8 };
    id.chars().take(len).collect()
}

fn resolve_prefix<T: Clone>(
    prefix: &str,
    candidates: Vec<(String, String, T)>,
    kind: &str,
) -> Result<T> {
    if prefix.len() < MIN_PREFIX_LEN {
        return Err(anyhow!(CoreError::InvalidInput(format!(
            "Short ID must be at least {} characters long.",
            MIN_PREFIX_LEN
        ))));
    }
    if let Some((_, _, value)) = candidates.iter().find(|(id, _, _)| id == prefix) {
        return Ok(value.clone());
    }
    let matches: Vec<(String, String, T)> = candidates
        .into_iter()
        .filter(|(id, _, _)| id.starts_with(prefix))
        .collect();
    match matches.len() {
        1 => Ok(matches[0].2.clone()),
        0 => Err(anyhow!(CoreError::NotFound(format!(
            "No {} found with ID prefix '{}'",
            kind, prefix
        )))),
        _ => Err(anyhow!(CoreError::AmbiguousId(
            matches.into_iter().map(|(id, label, _)| (id, label)).collect()
        ))),
    }
}

pub fn resolve_task_id<G: TaskGateway, S: DocumentStore>(
    engine: &WeekEngine<G, S>,
    prefix: &str,
) -> Result<TaskId> {
    let candidates = engine
        .snapshot()
        .tasks
        .into_iter()
        .map(|t| (t.id.clone(), t.title, t.id))
        .collect();
    resolve_prefix(prefix, candidates, "task")
}

pub fn resolve_group_id<G: TaskGateway, S: DocumentStore>(
    engine: &WeekEngine<G, S>,
    prefix: &str,
) -> Result<Uuid> {
    let candidates = engine
        .snapshot()
        .groups
        .into_iter()
        .map(|g| (g.id.to_string(), g.title, g.id))
        .collect();
    resolve_prefix(prefix, candidates, "group")
}

pub fn resolve_recurrence_id<G: TaskGateway, S: DocumentStore>(
    engine: &WeekEngine<G, S>,
    prefix: &str,
) -> Result<Uuid> {
    let candidates = engine
        .recurrences()
        .into_iter()
        .map(|r| (r.id.to_string(), r.title, r.id))
        .collect();
    resolve_prefix(prefix, candidates, "recurrence")
}

/// Turns an outcome that the remote store did not confirm into an error.
pub fn ensure_applied(outcome: MutationOutcome) -> Result<()> {
    match outcome {
        MutationOutcome::Applied => Ok(()),
        MutationOutcome::RolledBack => Err(anyhow!(
            "The remote store rejected the change; it was rolled back"
        )),
        MutationOutcome::Resynced => Err(anyhow!(
            "The remote store did not confirm the change; the week was reloaded"
        )),
    }
}

pub fn warn_if_offline(outcome: FetchOutcome) {
    if outcome == FetchOutcome::Failed {
        eprintln!(
            "{} Could not reach the remote store; showing local data only.",
            "Warning:".yellow().bold()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidates() -> Vec<(String, String, String)> {
        ["0190abcd-1111", "0190abce-2222", "occ-7f3e-2025-01-13"]
            .iter()
            .map(|id| (id.to_string(), format!("title {}", id), id.to_string()))
            .collect()
    }

    #[test]
    fn test_unique_prefix_resolves() {
        assert_eq!(resolve_prefix("0190abcd", candidates(), "task").unwrap(), "0190abcd-1111");
        assert_eq!(resolve_prefix("occ-7f", candidates(), "task").unwrap(), "occ-7f3e-2025-01-13");
    }

    #[test]
    fn test_ambiguous_prefix_lists_matches() {
        let err = resolve_prefix("0190ab", candidates(), "task").unwrap_err();
        match err.downcast_ref::<CoreError>() {
            Some(CoreError::AmbiguousId(matches)) => assert_eq!(matches.len(), 2),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_short_prefix_is_rejected() {
        assert!(resolve_prefix("0", candidates(), "task").is_err());
        assert!(resolve_prefix("zz", candidates(), "task").is_err());
    }

    #[test]
    fn test_short_id_keeps_occurrence_prefix() {
        assert_eq!(short_id("0190abcd-1111-2222"), "0190abcd");
        assert_eq!(short_id("occ-7f3e9a10-aaaa-2025-01-13"), "occ-7f3e9a10");
    }
}
