//! Dense ordering of tasks inside `(day, group)` containers.

use std::collections::{BTreeSet, HashMap};

use crate::models::{Container, DayIndex, Task, TaskId};

/// Indices of the container's tasks ordered by their current position.
///
/// Ties keep slice order.
fn ordered_indices(tasks: &[Task], container: Container, exclude: Option<usize>) -> Vec<usize> {
    let mut indices: Vec<usize> = tasks
        .iter()
        .enumerate()
        .filter(|(i, t)| Some(*i) != exclude && t.container() == container)
        .map(|(i, _)| i)
        .collect();
    indices.sort_by_key(|i| tasks[*i].position);
    indices
}

fn assign_sequence(tasks: &mut [Task], sequence: &[usize]) {
    for (position, index) in sequence.iter().enumerate() {
        tasks[*index].position = position;
    }
}

/// Rewrites one container's positions to `0..n` keeping relative order.
pub fn reindex(tasks: &mut [Task], container: Container) {
    let sequence = ordered_indices(tasks, container, None);
    assign_sequence(tasks, &sequence);
}

/// Reindexes every container present in `tasks`.
pub fn normalize(tasks: &mut [Task]) {
    let containers: BTreeSet<Container> = tasks.iter().map(Task::container).collect();
    for container in containers {
        reindex(tasks, container);
    }
}

/// Position a new task appended to `container` receives.
pub fn next_position(tasks: &[Task], container: Container) -> usize {
    tasks
        .iter()
        .filter(|t| t.container() == container)
        .map(|t| t.position + 1)
        .max()
        .unwrap_or(0)
}

/// Whether every container holds exactly the positions `0..n`.
pub fn is_dense(tasks: &[Task]) -> bool {
    let mut by_container: HashMap<Container, Vec<usize>> = HashMap::new();
    for task in tasks {
        by_container.entry(task.container()).or_default().push(task.position);
    }
    by_container.into_values().all(|mut positions| {
        positions.sort_unstable();
        positions.iter().enumerate().all(|(i, p)| i == *p)
    })
}

/// Local effect of a drag-and-drop move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovePlan {
    pub task_id: TaskId,
    pub from: Container,
    pub to: Container,
    /// Final position of the moved task.
    pub position: usize,
    /// Other tasks whose position changed, in no particular order.
    pub shifted: Vec<TaskId>,
}

/// Moves `task_id` to the root container of `target_day` at `target_position`.
///
/// # Behavior
/// - The task leaves its source container, which is reindexed densely
/// - The target's dense sequence receives it at `target_position`, clamped
///   to `[0, len]`, and is reindexed
/// - Same-container moves are a single splice over one sequence
/// - The moved task always lands with no group
///
/// Returns `None` when the task is unknown.
pub fn apply_move(
    tasks: &mut [Task],
    task_id: &str,
    target_day: DayIndex,
    target_position: usize,
) -> Option<MovePlan> {
    let moved = tasks.iter().position(|t| t.id == task_id)?;
    let before: HashMap<TaskId, (Container, usize)> = tasks
        .iter()
        .map(|t| (t.id.clone(), (t.container(), t.position)))
        .collect();

    let from = tasks[moved].container();
    let to = Container::root(target_day);

    let mut source = ordered_indices(tasks, from, Some(moved));
    if from == to {
        let at = target_position.min(source.len());
        source.insert(at, moved);
        assign_sequence(tasks, &source);
    } else {
        assign_sequence(tasks, &source);
        let mut target = ordered_indices(tasks, to, Some(moved));
        let at = target_position.min(target.len());
        target.insert(at, moved);
        tasks[moved].day_index = target_day;
        tasks[moved].group_id = None;
        assign_sequence(tasks, &target);
    }

    let shifted = tasks
        .iter()
        .enumerate()
        .filter(|(i, t)| {
            *i != moved && before.get(&t.id) != Some(&(t.container(), t.position))
        })
        .map(|(_, t)| t.id.clone())
        .collect();

    Some(MovePlan {
        task_id: task_id.to_string(),
        from,
        to,
        position: tasks[moved].position,
        shifted,
    })
}
