use anyhow::Result;
use owo_colors::{OwoColorize, Style};
use weekly_core::gateway::TaskGateway;
use weekly_core::store::DocumentStore;
use weekly_core::WeekEngine;

use crate::cli::MoveCommand;
use crate::parser::DAY_NAMES;
use crate::util::{ensure_applied, resolve_task_id};

pub async fn move_task<G: TaskGateway, S: DocumentStore>(
    engine: &WeekEngine<G, S>,
    command: MoveCommand,
) -> Result<()> {
    let id = resolve_task_id(engine, &command.id)?;
    let title = engine.task(&id).map(|t| t.title).unwrap_or_default();

    let outcome = engine.move_task(&id, command.day, command.position).await?;
    ensure_applied(outcome)?;
    let position = engine.task(&id).map(|t| t.position).unwrap_or(command.position);

    println!(
        "{} Moved '{}' to {} (position {})",
        "✓".style(Style::new().green().bold()),
        title,
        DAY_NAMES[command.day as usize].cyan(),
        position
    );
    Ok(())
}
