use anyhow::Result;
use owo_colors::{OwoColorize, Style};
use weekly_core::gateway::TaskGateway;
use weekly_core::store::DocumentStore;
use weekly_core::{NewTask, WeekEngine};

use crate::cli::AddCommand;
use crate::util::{ensure_applied, resolve_group_id, short_id};

pub async fn add_task<G: TaskGateway, S: DocumentStore>(
    engine: &WeekEngine<G, S>,
    command: AddCommand,
) -> Result<()> {
    let group_id = command
        .group
        .as_deref()
        .map(|prefix| resolve_group_id(engine, prefix))
        .transpose()?;

    let mut new_task = NewTask::new(command.title, command.day);
    if let Some(group_id) = group_id {
        new_task = new_task.in_group(group_id);
    }
    if let Some(kind) = command.kind {
        new_task = new_task.of_kind(kind);
    }
    new_task.notes_markdown = command.notes.filter(|n| !n.trim().is_empty());

    let added = engine.add_task(new_task).await?;
    ensure_applied(added.outcome)?;

    let title = engine
        .task(&added.id)
        .map(|t| t.title)
        .unwrap_or_default();
    let success_style = Style::new().green().bold();
    let info_style = Style::new().blue();
    println!("{} Created task: {}", "✓".style(success_style), title.bright_white().bold());
    println!("  {} Task ID: {}", "→".style(info_style), short_id(&added.id).yellow());
    Ok(())
}
