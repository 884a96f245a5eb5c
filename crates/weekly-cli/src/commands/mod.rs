use anyhow::Result;
use dialoguer::Confirm;
use weekly_core::gateway::TaskGateway;
use weekly_core::store::DocumentStore;
use weekly_core::WeekEngine;

use crate::cli::Commands;
use crate::config::Config;
use crate::util::warn_if_offline;

pub mod add;
pub mod delete;
pub mod edit;
pub mod group;
pub mod list;
pub mod r#move;
pub mod recur;

pub async fn dispatch<G: TaskGateway, S: DocumentStore>(
    engine: &WeekEngine<G, S>,
    config: &Config,
    command: Commands,
) -> Result<()> {
    if !matches!(command, Commands::Weeks) {
        warn_if_offline(engine.refresh().await);
    }

    match command {
        Commands::Weeks => list::list_weeks(engine).await,
        Commands::Show(command) => list::show_week(engine, command),
        Commands::Add(command) => add::add_task(engine, command).await,
        Commands::Status(command) => edit::set_status(engine, config, command).await,
        Commands::Edit(command) => edit::edit_task(engine, config, command).await,
        Commands::Move(command) => r#move::move_task(engine, command).await,
        Commands::Delete(command) => delete::delete_task(engine, command).await,
        Commands::Group(command) => group::group_command(engine, command).await,
        Commands::ClearDay(command) => delete::clear_day(engine, command).await,
        Commands::ClearWeek(command) => delete::clear_week(engine, command).await,
        Commands::Recur(command) => recur::recur_command(engine, command).await,
    }
}

/// Asks before a destructive action unless `force` is set.
pub(crate) fn confirm(prompt: String, force: bool) -> bool {
    if force {
        return true;
    }
    let confirmed = Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()
        .unwrap_or(false);
    if !confirmed {
        println!("Deletion cancelled.");
    }
    confirmed
}
