use anyhow::Result;
use owo_colors::{OwoColorize, Style};
use weekly_core::dates;
use weekly_core::error::CoreError;
use weekly_core::gateway::TaskGateway;
use weekly_core::models::RecurrenceDraft;
use weekly_core::store::DocumentStore;
use weekly_core::WeekEngine;

use super::confirm;
use crate::cli::{RecurCommand, RecurDeleteCommand, RecurSetCommand, RecurSubcommand};
use crate::parser::parse_date;
use crate::util::{ensure_applied, resolve_recurrence_id, resolve_task_id, short_id};
use crate::views::table::display_recurrences;

pub async fn recur_command<G: TaskGateway, S: DocumentStore>(
    engine: &WeekEngine<G, S>,
    command: RecurCommand,
) -> Result<()> {
    match command.command {
        RecurSubcommand::Set(set) => set_recurrence(engine, set).await,
        RecurSubcommand::List => {
            display_recurrences(&engine.recurrences());
            Ok(())
        }
        RecurSubcommand::Delete(delete) => delete_series(engine, delete).await,
    }
}

async fn set_recurrence<G: TaskGateway, S: DocumentStore>(
    engine: &WeekEngine<G, S>,
    command: RecurSetCommand,
) -> Result<()> {
    let id = resolve_task_id(engine, &command.id)?;
    let task = engine
        .task(&id)
        .ok_or_else(|| CoreError::NotFound(format!("Task with id {} not found", id)))?;

    let start_date = match command.start.as_deref() {
        Some(start) => parse_date(start)?,
        None => task
            .occurrence_date
            .unwrap_or_else(|| dates::week_date(engine.week_start(), task.day_index)),
    };
    let end_date = command.until.as_deref().map(parse_date).transpose()?;

    let draft = RecurrenceDraft {
        frequency: command.every,
        interval: command.interval,
        start_date,
        end_date,
    };
    let (recurrence_id, outcome) = engine.create_or_update_recurrence_from_task(&id, draft).await?;
    ensure_applied(outcome)?;

    let rule = engine.recurrence(recurrence_id);
    let every = rule
        .as_ref()
        .map(|r| match r.interval {
            1 => format!("every {}", r.frequency),
            n => format!("every {} {}s", n, r.frequency),
        })
        .unwrap_or_default();
    println!(
        "{} '{}' now repeats {}",
        "✓".style(Style::new().green().bold()),
        task.title.bright_white().bold(),
        every.cyan()
    );
    println!(
        "  {} Series ID: {}",
        "→".style(Style::new().blue()),
        short_id(&recurrence_id.to_string()).yellow()
    );
    Ok(())
}

async fn delete_series<G: TaskGateway, S: DocumentStore>(
    engine: &WeekEngine<G, S>,
    command: RecurDeleteCommand,
) -> Result<()> {
    let recurrence_id = resolve_recurrence_id(engine, &command.id)?;
    let title = engine
        .recurrence(recurrence_id)
        .map(|r| r.title)
        .unwrap_or_default();

    let prompt = format!(
        "Delete the series '{}' with every occurrence in every week?",
        title
    );
    if !confirm(prompt, command.force) {
        return Ok(());
    }

    ensure_applied(engine.delete_recurrence_series(recurrence_id).await?)?;
    println!("{} Deleted series: {}", "✓".style(Style::new().green().bold()), title);
    Ok(())
}
