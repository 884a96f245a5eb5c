use chrono::NaiveDate;
use comfy_table::{Attribute, Cell, Color, Row, Table};
use weekly_core::dates;
use weekly_core::models::{Container, DayIndex, RecurrenceRule, Task, TaskStatus, WeekState};

use crate::util::short_id;

const DAY_LABELS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

fn schedule_text(task: &Task) -> String {
    let dates = match (task.start_date, task.end_date) {
        (Some(start), Some(end)) if start != end => format!("{} → {}", start, end),
        (Some(start), _) => start.to_string(),
        (None, Some(end)) => format!("until {}", end),
        (None, None) => String::new(),
    };
    let times = match (&task.start_time, &task.end_time) {
        (Some(start), Some(end)) => format!("{}-{}", start, end),
        (Some(start), None) => start.clone(),
        (None, Some(end)) => format!("until {}", end),
        (None, None) => String::new(),
    };
    [dates, times]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn task_row(task: &Task, group_title: Option<&str>, day_label: &str) -> Row {
    let mut row = Row::new();
    row.add_cell(Cell::new(day_label));
    row.add_cell(Cell::new(short_id(&task.id)));

    let mut display_title = String::new();
    if group_title.is_some() {
        display_title.push_str("  ");
    }
    if task.recurrence_id.is_some() {
        display_title.push('↻');
        display_title.push(' ');
    }
    display_title.push_str(&task.title);

    let mut title_cell = Cell::new(display_title);
    match task.status {
        TaskStatus::Completed => {
            title_cell = title_cell.add_attribute(Attribute::CrossedOut).fg(Color::DarkGrey);
        }
        TaskStatus::Cancelled | TaskStatus::Moved => {
            title_cell = title_cell.fg(Color::DarkGrey);
        }
        TaskStatus::Failed => {
            title_cell = title_cell.fg(Color::Red);
        }
        TaskStatus::Open => {}
    }
    row.add_cell(title_cell);

    let status_cell = Cell::new(task.status.to_string());
    row.add_cell(match task.status {
        TaskStatus::Completed => status_cell.fg(Color::Green),
        TaskStatus::Failed => status_cell.fg(Color::Red),
        TaskStatus::Cancelled | TaskStatus::Moved => status_cell.fg(Color::DarkGrey),
        TaskStatus::Open => status_cell,
    });

    row.add_cell(Cell::new(task.kind.to_string()));
    row.add_cell(Cell::new(group_title.unwrap_or("")));
    row.add_cell(Cell::new(schedule_text(task)));
    row
}

/// Prints the week as one table, day by day: root tasks first, then each
/// group in order.
pub fn display_week(state: &WeekState, only_day: Option<DayIndex>) {
    println!(
        "Week of {} ({} - {})",
        state.week_start,
        state.week_start.format("%b %d"),
        dates::week_end(state.week_start).format("%b %d")
    );

    let mut table = Table::new();
    table.set_header(vec!["Day", "ID", "Title", "Status", "Type", "Group", "Schedule"]);

    let mut rows = 0usize;
    for day_index in 0..dates::DAYS_PER_WEEK {
        if only_day.is_some_and(|d| d != day_index) {
            continue;
        }
        let day_label = DAY_LABELS[day_index as usize];
        for task in state.container_tasks(Container::root(day_index)) {
            table.add_row(task_row(task, None, day_label));
            rows += 1;
        }
        let mut groups: Vec<_> = state.groups.iter().filter(|g| g.day_index == day_index).collect();
        groups.sort_by_key(|g| g.position);
        for group in groups {
            let mut header = Row::new();
            header.add_cell(Cell::new(day_label));
            header.add_cell(Cell::new(short_id(&group.id.to_string())).fg(Color::Cyan));
            header.add_cell(Cell::new(format!("▸ {}", group.title)).add_attribute(Attribute::Bold));
            table.add_row(header);
            rows += 1;
            let container = Container {
                day_index,
                group_id: Some(group.id),
            };
            for task in state.container_tasks(container) {
                table.add_row(task_row(task, Some(group.title.as_str()), day_label));
                rows += 1;
            }
        }
    }

    if rows == 0 {
        println!("No tasks found.");
        return;
    }
    println!("{table}");
}

pub fn display_weeks(weeks: &[NaiveDate], current: NaiveDate) {
    if weeks.is_empty() {
        println!("No weeks found.");
        return;
    }

    let mut table = Table::new();
    table.set_header(vec!["Week Start", "Ends", ""]);
    for week in weeks {
        let mut row = Row::new();
        let start_cell = Cell::new(week.to_string());
        row.add_cell(if *week == current {
            start_cell.fg(Color::Yellow).add_attribute(Attribute::Bold)
        } else {
            start_cell
        });
        row.add_cell(Cell::new(dates::week_end(*week).to_string()));
        row.add_cell(Cell::new(if *week == current { "current" } else { "" }));
        table.add_row(row);
    }

    println!("{table}");
}

pub fn display_recurrences(rules: &[RecurrenceRule]) {
    if rules.is_empty() {
        println!("No recurrences found.");
        return;
    }

    let mut table = Table::new();
    table.set_header(vec!["ID", "Title", "Every", "Starts", "Until"]);
    for rule in rules {
        let mut row = Row::new();
        row.add_cell(Cell::new(short_id(&rule.id.to_string())));
        row.add_cell(Cell::new(&rule.title));
        let every = if rule.interval == 1 {
            rule.frequency.to_string()
        } else {
            format!("{} {}s", rule.interval, rule.frequency)
        };
        row.add_cell(Cell::new(every));
        row.add_cell(Cell::new(rule.start_date.to_string()));
        row.add_cell(Cell::new(
            rule.end_date.map(|d| d.to_string()).unwrap_or_else(|| "None".to_string()),
        ));
        table.add_row(row);
    }

    println!("{table}");
}
