use anyhow::Result;
use owo_colors::{OwoColorize, Style};
use weekly_core::error::CoreError;
use weekly_core::gateway::TaskGateway;
use weekly_core::store::DocumentStore;
use weekly_core::WeekEngine;

use super::confirm;
use crate::cli::{ClearDayCommand, ClearWeekCommand, DeleteCommand};
use crate::parser::DAY_NAMES;
use crate::util::{ensure_applied, resolve_task_id};

pub async fn delete_task<G: TaskGateway, S: DocumentStore>(
    engine: &WeekEngine<G, S>,
    command: DeleteCommand,
) -> Result<()> {
    let id = resolve_task_id(engine, &command.id)?;
    let task = engine
        .task(&id)
        .ok_or_else(|| CoreError::NotFound(format!("Task with id {} not found", id)))?;

    let prompt = if task.recurrence_id.is_some() {
        format!("Delete this occurrence of '{}'? The series keeps going.", task.title)
    } else {
        format!("Are you sure you want to delete task '{}'?", task.title)
    };
    if !confirm(prompt, command.force) {
        return Ok(());
    }

    ensure_applied(engine.delete_task(&id).await?)?;
    println!("{} Deleted task: {}", "✓".style(Style::new().green().bold()), task.title);
    Ok(())
}

pub async fn clear_day<G: TaskGateway, S: DocumentStore>(
    engine: &WeekEngine<G, S>,
    command: ClearDayCommand,
) -> Result<()> {
    let day_name = DAY_NAMES[command.day as usize];
    let prompt = format!(
        "Delete every task and group on {} of the week of {}?",
        day_name,
        engine.week_start()
    );
    if !confirm(prompt, command.force) {
        return Ok(());
    }

    ensure_applied(engine.delete_all_for_day(command.day).await?)?;
    println!("{} Cleared {}", "✓".style(Style::new().green().bold()), day_name);
    Ok(())
}

pub async fn clear_week<G: TaskGateway, S: DocumentStore>(
    engine: &WeekEngine<G, S>,
    command: ClearWeekCommand,
) -> Result<()> {
    let prompt = format!(
        "Delete every task and group of the week of {}?",
        engine.week_start()
    );
    if !confirm(prompt, command.force) {
        return Ok(());
    }

    ensure_applied(engine.clear_current_week().await?)?;
    println!(
        "{} Cleared the week of {}",
        "✓".style(Style::new().green().bold()),
        engine.week_start()
    );
    Ok(())
}
