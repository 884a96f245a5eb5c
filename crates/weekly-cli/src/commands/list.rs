use anyhow::Result;
use weekly_core::gateway::TaskGateway;
use weekly_core::store::DocumentStore;
use weekly_core::WeekEngine;

use crate::cli::ShowCommand;
use crate::views::table::{display_week, display_weeks};

pub fn show_week<G: TaskGateway, S: DocumentStore>(
    engine: &WeekEngine<G, S>,
    command: ShowCommand,
) -> Result<()> {
    display_week(&engine.snapshot(), command.day);
    Ok(())
}

pub async fn list_weeks<G: TaskGateway, S: DocumentStore>(engine: &WeekEngine<G, S>) -> Result<()> {
    let weeks = engine.refresh_available_weeks().await;
    display_weeks(&weeks, engine.week_start());
    Ok(())
}
