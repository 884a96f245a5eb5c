//! Goal and companion catalogs, plus the local-only task attributes that
//! point into them.

use chrono::Utc;
use uuid::Uuid;

use super::{EngineState, WeekEngine};
use crate::dates;
use crate::error::CoreError;
use crate::gateway::{TaskCreate, TaskGateway};
use crate::models::{
    is_occurrence_id, Companion, CompanionUpdate, Goal, GoalUpdate, ItemType, MutationOutcome, Task,
};
use crate::store::DocumentStore;

const GOAL_ACCENT_COLORS: &[&str] = &[
    "#8b5cf6", "#22d3ee", "#f97316", "#fb7185", "#60a5fa", "#34d399", "#facc15", "#a3e635",
];

fn goal_accent_color() -> String {
    GOAL_ACCENT_COLORS[fastrand::usize(..GOAL_ACCENT_COLORS.len())].to_string()
}

fn companion_color() -> String {
    format!("hsl({}, 70%, 50%)", fastrand::u16(0..360))
}

fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

impl<G: TaskGateway, S: DocumentStore> WeekEngine<G, S> {
    pub fn goals(&self) -> Vec<Goal> {
        self.lock().document.goals.clone()
    }

    pub fn companions(&self) -> Vec<Companion> {
        self.lock().document.companions.clone()
    }

    pub async fn add_goal(&self, name: impl Into<String>, emoji: Option<String>) -> Result<Goal, CoreError> {
        let name = non_blank(name.into()).ok_or_else(|| CoreError::InvalidInput("Goal name cannot be empty".to_string()))?;
        let goal = Goal {
            id: Uuid::new_v4(),
            name,
            emoji: emoji.and_then(non_blank),
            color: goal_accent_color(),
            description: String::new(),
            created_at: Utc::now(),
        };
        self.lock().document.goals.push(goal.clone());
        self.persist_document().await;
        Ok(goal)
    }

    pub async fn update_goal(&self, id: Uuid, update: GoalUpdate) -> Result<Goal, CoreError> {
        let goal = {
            let mut state = self.lock();
            let goal = state
                .document
                .goals
                .iter_mut()
                .find(|g| g.id == id)
                .ok_or_else(|| CoreError::NotFound(format!("Goal with id {} not found", id)))?;
            if let Some(name) = update.name {
                goal.name = non_blank(name)
                    .ok_or_else(|| CoreError::InvalidInput("Goal name cannot be empty".to_string()))?;
            }
            if let Some(emoji) = update.emoji {
                goal.emoji = emoji.and_then(non_blank);
            }
            if let Some(color) = update.color {
                goal.color = color;
            }
            if let Some(description) = update.description {
                goal.description = description;
            }
            goal.clone()
        };
        self.persist_document().await;
        Ok(goal)
    }

    /// Removes a goal and unlinks it from every task and rule.
    pub async fn delete_goal(&self, id: Uuid) -> Result<(), CoreError> {
        {
            let mut state = self.lock();
            let EngineState { session, document } = &mut *state;
            let before = document.goals.len();
            document.goals.retain(|g| g.id != id);
            if document.goals.len() == before {
                return Err(CoreError::NotFound(format!("Goal with id {} not found", id)));
            }
            document.unlink_goal(id);
            for task in session.tasks.iter_mut() {
                task.goal_ids.retain(|g| *g != id);
            }
        }
        self.persist_document().await;
        Ok(())
    }

    pub async fn add_companion(
        &self,
        name: impl Into<String>,
        relationship: impl Into<String>,
        description: Option<String>,
    ) -> Result<Companion, CoreError> {
        let name = non_blank(name.into())
            .ok_or_else(|| CoreError::InvalidInput("Companion name cannot be empty".to_string()))?;
        let companion = Companion {
            id: Uuid::new_v4(),
            name,
            relationship: relationship.into(),
            description: description.and_then(non_blank),
            color: companion_color(),
            created_at: Utc::now(),
        };
        self.lock().document.companions.push(companion.clone());
        self.persist_document().await;
        Ok(companion)
    }

    pub async fn update_companion(&self, id: Uuid, update: CompanionUpdate) -> Result<Companion, CoreError> {
        let companion = {
            let mut state = self.lock();
            let companion = state
                .document
                .companions
                .iter_mut()
                .find(|c| c.id == id)
                .ok_or_else(|| CoreError::NotFound(format!("Companion with id {} not found", id)))?;
            if let Some(name) = update.name {
                companion.name = non_blank(name)
                    .ok_or_else(|| CoreError::InvalidInput("Companion name cannot be empty".to_string()))?;
            }
            if let Some(relationship) = update.relationship {
                companion.relationship = relationship;
            }
            if let Some(description) = update.description {
                companion.description = description.and_then(non_blank);
            }
            if let Some(color) = update.color {
                companion.color = color;
            }
            companion.clone()
        };
        self.persist_document().await;
        Ok(companion)
    }

    /// Removes a companion and unlinks it from every task and rule.
    pub async fn delete_companion(&self, id: Uuid) -> Result<(), CoreError> {
        {
            let mut state = self.lock();
            let EngineState { session, document } = &mut *state;
            let before = document.companions.len();
            document.companions.retain(|c| c.id != id);
            if document.companions.len() == before {
                return Err(CoreError::NotFound(format!("Companion with id {} not found", id)));
            }
            document.unlink_companion(id);
            for task in session.tasks.iter_mut() {
                task.companion_ids.retain(|c| *c != id);
            }
        }
        self.persist_document().await;
        Ok(())
    }

    pub async fn update_task_type(&self, id: &str, kind: ItemType) -> Result<MutationOutcome, CoreError> {
        self.update_overlay(id, |task| task.kind = kind).await
    }

    pub async fn set_task_goals(&self, id: &str, goal_ids: Vec<Uuid>) -> Result<MutationOutcome, CoreError> {
        {
            let state = self.lock();
            if let Some(unknown) = goal_ids.iter().find(|g| !state.document.goals.iter().any(|goal| goal.id == **g)) {
                return Err(CoreError::NotFound(format!("Goal with id {} not found", unknown)));
            }
        }
        self.update_overlay(id, |task| task.goal_ids = goal_ids).await
    }

    pub async fn set_task_companions(&self, id: &str, companion_ids: Vec<Uuid>) -> Result<MutationOutcome, CoreError> {
        {
            let state = self.lock();
            if let Some(unknown) = companion_ids
                .iter()
                .find(|c| !state.document.companions.iter().any(|companion| companion.id == **c))
            {
                return Err(CoreError::NotFound(format!("Companion with id {} not found", unknown)));
            }
        }
        self.update_overlay(id, |task| task.companion_ids = companion_ids).await
    }

    /// Changes attributes the remote store has no columns for.
    ///
    /// Only the local document is written, except for a virtual occurrence,
    /// which is materialized so the change has a row to attach to.
    async fn update_overlay(&self, id: &str, change: impl FnOnce(&mut Task)) -> Result<MutationOutcome, CoreError> {
        let materialize = {
            let mut state = self.lock();
            let EngineState { session, document } = &mut *state;
            let week_start = session.week_start();
            let task = session
                .task_mut(id)
                .ok_or_else(|| CoreError::NotFound(format!("Task with id {} not found", id)))?;
            change(task);
            let task = task.clone();
            session.touch(id);

            if is_occurrence_id(id) {
                if session.is_creating(id) {
                    None
                } else {
                    session.begin_create(id);
                    Some(TaskCreate::from_task(&task, dates::week_date(week_start, task.day_index)))
                }
            } else {
                document.record_meta(&task);
                None
            }
        };

        match materialize {
            Some(payload) => Ok(self.push_create(id, payload, false).await.1),
            None => {
                self.persist_document().await;
                Ok(MutationOutcome::Applied)
            }
        }
    }
}
