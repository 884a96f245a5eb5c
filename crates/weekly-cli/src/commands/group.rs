use anyhow::Result;
use owo_colors::{OwoColorize, Style};
use weekly_core::gateway::TaskGateway;
use weekly_core::store::DocumentStore;
use weekly_core::WeekEngine;

use super::confirm;
use crate::cli::{GroupCommand, GroupSubcommand};
use crate::util::{ensure_applied, resolve_group_id, short_id};

pub async fn group_command<G: TaskGateway, S: DocumentStore>(
    engine: &WeekEngine<G, S>,
    command: GroupCommand,
) -> Result<()> {
    let success_style = Style::new().green().bold();

    match command.command {
        GroupSubcommand::Add(add) => {
            let group = engine.add_group(add.day, add.title).await?;
            println!("{} Created group: {}", "✓".style(success_style), group.title.bright_white().bold());
            println!(
                "  {} Group ID: {}",
                "→".style(Style::new().blue()),
                short_id(&group.id.to_string()).yellow()
            );
        }
        GroupSubcommand::Rename(rename) => {
            let id = resolve_group_id(engine, &rename.id)?;
            ensure_applied(engine.update_group_title(id, rename.title.clone()).await?)?;
            println!("{} Renamed group to: {}", "✓".style(success_style), rename.title);
        }
        GroupSubcommand::Delete(delete) => {
            let id = resolve_group_id(engine, &delete.id)?;
            let snapshot = engine.snapshot();
            let title = snapshot
                .groups
                .iter()
                .find(|g| g.id == id)
                .map(|g| g.title.clone())
                .unwrap_or_default();
            let task_count = snapshot.tasks.iter().filter(|t| t.group_id == Some(id)).count();

            let prompt = format!(
                "Delete group '{}' and the {} task(s) inside it?",
                title, task_count
            );
            if !confirm(prompt, delete.force) {
                return Ok(());
            }
            ensure_applied(engine.delete_group(id).await?)?;
            println!("{} Deleted group: {}", "✓".style(success_style), title);
        }
    }

    Ok(())
}
