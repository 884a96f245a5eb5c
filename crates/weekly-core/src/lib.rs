//! # Weekly Core Library
//!
//! The synchronization engine behind a weekly planner: a local working copy of
//! one week kept in step with a remote task store through optimistic
//! mutations, recurring tasks materialized into each week, and gap-free
//! ordering of tasks inside their day and group.
//!
//! ## Features
//!
//! - **Optimistic Mutations**: every change is visible at once and is rolled
//!   back or resynced when the remote call fails
//! - **Recurrence Materialization**: daily, weekly and monthly rules expanded
//!   into per-week occurrences, with skip dates for deleted occurrences
//! - **Dense Ordering**: drag-and-drop moves that keep positions `0..n-1` in
//!   every container
//! - **Stale Response Fencing**: fetch results superseded by a newer request
//!   or a week switch never overwrite current state
//!
//! ## Core Modules
//!
//! - [`engine`]: Mutation engine and week session controller
//! - [`recurrence`]: Pure week expansion of recurrence rules
//! - [`positions`]: Position reconciliation and moves
//! - [`gateway`]: Remote task store interface with HTTP and in-memory backends
//! - [`store`]: Local document store for rules, groups, catalogs and overlays
//! - [`state`]: Week session bookkeeping and fetch merging
//! - [`models`]: Core data structures
//! - [`error`]: Error types
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use weekly_core::{
//!     db, engine::{NewTask, WeekEngine}, gateway::{http::DEFAULT_TIMEOUT, HttpGateway},
//!     models::EngineConfig, store::SqliteDocumentStore,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pool = db::establish_connection("weekly.db").await?;
//!     let gateway = Arc::new(HttpGateway::new("http://localhost:8000/api", DEFAULT_TIMEOUT));
//!     let store = Arc::new(SqliteDocumentStore::new(pool));
//!
//!     let today = chrono::Local::now().date_naive();
//!     let engine = WeekEngine::load(gateway, store, EngineConfig::default(), today).await?;
//!     engine.refresh().await;
//!
//!     let added = engine.add_task(NewTask::new("Water the plants", 2)).await?;
//!     println!("Created task {} ({})", added.id, added.outcome);
//!
//!     Ok(())
//! }
//! ```

pub mod dates;
pub mod db;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod links;
pub mod models;
pub mod positions;
pub mod recurrence;
pub mod state;
pub mod store;

pub use engine::{NewTask, WeekEngine};
pub use error::CoreError;
pub use models::{EngineConfig, FetchOutcome, MutationOutcome, Task, WeekState};
