use anyhow::Result;
use chrono::Local;
use clap::Parser;
use owo_colors::{OwoColorize, Style};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use weekly_core::db;
use weekly_core::error::CoreError;
use weekly_core::gateway::http::HttpGateway;
use weekly_core::store::sqlite::SqliteDocumentStore;
use weekly_core::WeekEngine;

mod cli;
mod commands;
mod config;
mod parser;
mod util;
mod views;

#[tokio::main]
async fn main() {
    let cli = cli::Cli::parse();
    let config = config::Config::new().unwrap_or_else(|e| {
        eprintln!("{} Ignoring invalid configuration: {}", "Warning:".yellow().bold(), e);
        config::Config::default()
    });

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    if let Err(e) = run(cli, config).await {
        handle_error(e);
        std::process::exit(1);
    }
}

async fn run(cli: cli::Cli, config: config::Config) -> Result<()> {
    let pool = db::establish_connection(&config.database_path).await?;
    let gateway = Arc::new(HttpGateway::new(&config.gateway_url, config.request_timeout()));
    let store = Arc::new(SqliteDocumentStore::new(pool));

    let date = match cli.week.as_deref() {
        Some(week) => parser::parse_date(week)?,
        None => Local::now().date_naive(),
    };
    tracing::debug!(gateway = %config.gateway_url, %date, "starting session");

    let engine = WeekEngine::load(gateway, store, config.engine_config(), date).await?;
    let result = commands::dispatch(&engine, &config, cli.command).await;
    engine.close().await;
    result
}

fn handle_error(err: anyhow::Error) {
    let error_style = Style::new().red().bold();

    match err.downcast_ref::<CoreError>() {
        Some(CoreError::NotFound(s)) => {
            eprintln!("{} {}", "Error:".style(error_style), s);
        }
        Some(CoreError::AmbiguousId(matches)) => {
            eprintln!("{}", "Error: Ambiguous ID.".style(error_style));
            eprintln!("Did you mean one of these?");
            for (id, title) in matches {
                eprintln!("  {} ({})", id.yellow(), title);
            }
        }
        Some(CoreError::InvalidInput(s)) => {
            eprintln!("{} Invalid input: {}", "Error:".style(error_style), s);
        }
        Some(CoreError::InvalidDate(s)) => {
            eprintln!("{} Invalid date: {}", "Error:".style(error_style), s.yellow());
        }
        _ => eprintln!("{} {:#}", "Error:".style(error_style), err),
    }
}
