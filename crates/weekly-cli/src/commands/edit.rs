use anyhow::{anyhow, Result};
use chrono::NaiveTime;
use owo_colors::{OwoColorize, Style};
use weekly_core::error::CoreError;
use weekly_core::gateway::TaskGateway;
use weekly_core::models::{MutationOutcome, TaskId, TaskPatch};
use weekly_core::store::DocumentStore;
use weekly_core::WeekEngine;

use crate::cli::{EditCommand, StatusCommand};
use crate::config::{Config, SaveMode};
use crate::parser::parse_date;
use crate::util::{ensure_applied, resolve_task_id};

fn parse_time(value: &str) -> Result<String> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .map(|t| t.format("%H:%M").to_string())
        .map_err(|_| anyhow!(CoreError::InvalidInput(format!("'{}' is not a time (use HH:MM)", value))))
}

/// Sends `patch` right away, or buffers and commits it in manual save mode.
async fn save_patch<G: TaskGateway, S: DocumentStore>(
    engine: &WeekEngine<G, S>,
    config: &Config,
    id: &TaskId,
    patch: TaskPatch,
) -> Result<MutationOutcome> {
    let outcome = match config.save_mode {
        SaveMode::Auto => engine.update_task(id, patch).await?,
        SaveMode::Manual => {
            engine.patch_task_local(id, patch)?;
            engine.commit_task_patch(id).await?
        }
    };
    Ok(outcome)
}

pub async fn set_status<G: TaskGateway, S: DocumentStore>(
    engine: &WeekEngine<G, S>,
    config: &Config,
    command: StatusCommand,
) -> Result<()> {
    let id = resolve_task_id(engine, &command.id)?;
    let outcome = save_patch(engine, config, &id, TaskPatch::status(command.status)).await?;
    ensure_applied(outcome)?;

    let title = engine.task(&id).map(|t| t.title).unwrap_or_default();
    println!(
        "{} '{}' is now {}",
        "✓".style(Style::new().green().bold()),
        title,
        command.status.to_string().cyan()
    );
    Ok(())
}

pub async fn edit_task<G: TaskGateway, S: DocumentStore>(
    engine: &WeekEngine<G, S>,
    config: &Config,
    command: EditCommand,
) -> Result<()> {
    let id = resolve_task_id(engine, &command.id)?;
    let task = engine
        .task(&id)
        .ok_or_else(|| CoreError::NotFound(format!("Task with id {} not found", id)))?;

    let mut patch = TaskPatch {
        title: command.title,
        ..Default::default()
    };

    if command.notes_clear {
        patch.notes_markdown = Some(None);
    } else if let Some(notes) = command.notes {
        patch.notes_markdown = Some(Some(notes));
    }

    if command.links_clear {
        patch.links_markdown = Some(None);
    } else if let Some(links) = command.links {
        patch.links_markdown = Some(Some(links).filter(|l| !l.trim().is_empty()));
    }

    if command.schedule_clear {
        patch.start_date = Some(None);
        patch.end_date = Some(None);
        patch.start_time = Some(None);
        patch.end_time = Some(None);
    } else {
        if let Some(start) = command.start_date.as_deref() {
            patch.start_date = Some(Some(parse_date(start)?));
        }
        if let Some(end) = command.end_date.as_deref() {
            patch.end_date = Some(Some(parse_date(end)?));
        }
        if let Some(start) = command.start_time.as_deref() {
            patch.start_time = Some(Some(parse_time(start)?));
        }
        if let Some(end) = command.end_time.as_deref() {
            patch.end_time = Some(Some(parse_time(end)?));
        }

        let start = patch.start_date.unwrap_or(task.start_date);
        let end = patch.end_date.unwrap_or(task.end_date);
        if let (Some(start), Some(end)) = (start, end) {
            if end < start {
                return Err(CoreError::InvalidInput(format!(
                    "End date {} is before start date {}",
                    end, start
                ))
                .into());
            }
        }
    }

    if patch.is_empty() && command.kind.is_none() {
        return Err(anyhow!(CoreError::InvalidInput(
            "Nothing to change; pass at least one field to edit".to_string()
        )));
    }

    if !patch.is_empty() {
        ensure_applied(save_patch(engine, config, &id, patch).await?)?;
    }
    // A materialized occurrence gets a new id; follow it by its occurrence key.
    let current_id = match engine.task(&id) {
        Some(_) => id,
        None => engine
            .snapshot()
            .tasks
            .into_iter()
            .find(|t| t.occurrence_key().is_some() && t.occurrence_key() == task.occurrence_key())
            .map(|t| t.id)
            .ok_or_else(|| CoreError::NotFound(format!("Task with id {} not found", id)))?,
    };
    if let Some(kind) = command.kind {
        ensure_applied(engine.update_task_type(&current_id, kind).await?)?;
    }

    let title = engine.task(&current_id).map(|t| t.title).unwrap_or(task.title);
    println!("{} Updated task: {}", "✓".style(Style::new().green().bold()), title.bright_white().bold());
    Ok(())
}
