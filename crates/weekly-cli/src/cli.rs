use clap::{Parser, Subcommand};
use weekly_core::models::{DayIndex, ItemType, RecurrenceFrequency, TaskStatus};

use crate::parser::{parse_day, parse_frequency, parse_item_type, parse_status};

/// Plan the week from the terminal, kept in sync with the remote task store
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Any date inside the week to work on (ISO or natural language, e.g. "next monday")
    #[arg(long, global = true)]
    pub week: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// List the weeks that hold tasks
    Weeks,
    /// Show the tasks and groups of the week
    Show(ShowCommand),
    /// Add a new task
    Add(AddCommand),
    /// Set the status of a task
    Status(StatusCommand),
    /// Edit a task
    Edit(EditCommand),
    /// Move a task to another day or position
    Move(MoveCommand),
    /// Delete a task (or one occurrence of a recurring task)
    Delete(DeleteCommand),
    /// Manage groups
    Group(GroupCommand),
    /// Delete every task and group of one day
    ClearDay(ClearDayCommand),
    /// Delete every task and group of the week
    ClearWeek(ClearWeekCommand),
    /// Manage recurring tasks
    Recur(RecurCommand),
}

#[derive(Parser, Debug, Clone)]
pub struct ShowCommand {
    /// Only show one day (0-6 or a weekday name)
    #[arg(long, value_parser = parse_day)]
    pub day: Option<DayIndex>,
}

#[derive(Parser, Debug, Clone)]
pub struct AddCommand {
    /// The title of the task
    pub title: String,
    /// Day of the week (0-6 or a weekday name)
    #[arg(short, long, value_parser = parse_day)]
    pub day: DayIndex,
    /// ID (or prefix) of the group to add the task to
    #[arg(short, long)]
    pub group: Option<String>,
    /// Kind of item (task, event, birthday, holiday)
    #[arg(long = "type", value_parser = parse_item_type)]
    pub kind: Option<ItemType>,
    /// Notes in markdown
    #[arg(short, long)]
    pub notes: Option<String>,
}

#[derive(Parser, Debug, Clone)]
pub struct StatusCommand {
    /// The ID of the task
    pub id: String,
    /// New status (open, completed, failed, cancelled, moved)
    #[arg(value_parser = parse_status)]
    pub status: TaskStatus,
}

#[derive(Parser, Debug, Clone)]
pub struct EditCommand {
    /// The ID of the task to edit
    pub id: String,

    #[arg(long)]
    pub title: Option<String>,

    #[arg(long)]
    pub notes: Option<String>,
    #[arg(long, conflicts_with = "notes")]
    pub notes_clear: bool,

    /// Links as markdown lines, e.g. "- [Docs](https://docs.rs)"
    #[arg(long)]
    pub links: Option<String>,
    #[arg(long, conflicts_with = "links")]
    pub links_clear: bool,

    #[arg(long)]
    pub start_date: Option<String>,
    #[arg(long)]
    pub end_date: Option<String>,
    #[arg(long)]
    pub start_time: Option<String>,
    #[arg(long)]
    pub end_time: Option<String>,
    #[arg(long, conflicts_with_all = ["start_date", "end_date", "start_time", "end_time"])]
    pub schedule_clear: bool,

    #[arg(long = "type", value_parser = parse_item_type)]
    pub kind: Option<ItemType>,
}

#[derive(Parser, Debug, Clone)]
pub struct MoveCommand {
    /// The ID of the task to move
    pub id: String,
    /// Target day (0-6 or a weekday name)
    #[arg(short, long, value_parser = parse_day)]
    pub day: DayIndex,
    /// Target position inside the day, clamped to the end
    #[arg(short, long, default_value_t = 0)]
    pub position: usize,
}

#[derive(Parser, Debug, Clone)]
pub struct DeleteCommand {
    /// The ID of the task to delete
    pub id: String,
    /// Do not ask for confirmation
    #[arg(short, long)]
    pub force: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct GroupCommand {
    #[command(subcommand)]
    pub command: GroupSubcommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum GroupSubcommand {
    /// Add a group to a day
    Add(GroupAddCommand),
    /// Rename a group
    Rename(GroupRenameCommand),
    /// Delete a group and the tasks inside it
    Delete(GroupDeleteCommand),
}

#[derive(Parser, Debug, Clone)]
pub struct GroupAddCommand {
    /// Day of the week (0-6 or a weekday name)
    #[arg(value_parser = parse_day)]
    pub day: DayIndex,
    /// Title of the group
    pub title: Option<String>,
}

#[derive(Parser, Debug, Clone)]
pub struct GroupRenameCommand {
    /// The ID of the group
    pub id: String,
    /// The new title
    pub title: String,
}

#[derive(Parser, Debug, Clone)]
pub struct GroupDeleteCommand {
    /// The ID of the group
    pub id: String,
    /// Do not ask for confirmation
    #[arg(short, long)]
    pub force: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct ClearDayCommand {
    /// Day of the week (0-6 or a weekday name)
    #[arg(value_parser = parse_day)]
    pub day: DayIndex,
    /// Do not ask for confirmation
    #[arg(short, long)]
    pub force: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct ClearWeekCommand {
    /// Do not ask for confirmation
    #[arg(short, long)]
    pub force: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct RecurCommand {
    #[command(subcommand)]
    pub command: RecurSubcommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum RecurSubcommand {
    /// Make a task recur, or change the rule it belongs to
    Set(RecurSetCommand),
    /// List recurrence rules
    List,
    /// Delete a whole series with all its occurrences
    Delete(RecurDeleteCommand),
}

#[derive(Parser, Debug, Clone)]
pub struct RecurSetCommand {
    /// The ID of the task to use as template
    pub id: String,
    /// Unit of repetition (day, week, month)
    #[arg(long, value_parser = parse_frequency)]
    pub every: RecurrenceFrequency,
    /// Repeat every N units
    #[arg(long, default_value_t = 1)]
    pub interval: i64,
    /// First date of the series (defaults to the task's date)
    #[arg(long)]
    pub start: Option<String>,
    /// Last date of the series
    #[arg(long)]
    pub until: Option<String>,
}

#[derive(Parser, Debug, Clone)]
pub struct RecurDeleteCommand {
    /// The ID (or prefix) of the recurrence rule
    pub id: String,
    /// Do not ask for confirmation
    #[arg(short, long)]
    pub force: bool,
}
