//! Data exchanged with the backend outside the socket.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle state of a plan task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    #[default]
    Open,
    Completed,
    Abandoned,
    InProgress,
    Verified,
}

/// A node of the task tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Task {
    pub id: String,
    pub goal: String,
    /// Parent task id, `None` for the root.
    pub parent: Option<String>,
    pub subtasks: Vec<Task>,
    pub state: TaskState,
}

/// Task-plan snapshot.
///
/// `Plan::default()` is the reset plan: no main goal and an empty open root task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Plan {
    pub main_goal: Option<String>,
    pub task: Task,
}

/// Author of a historical message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// One entry of the session history, in delivery order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: Role,
    pub payload: Value,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_partial_plan_deserializes() {
        let plan: Plan = serde_json::from_value(json!({
            "mainGoal": "X",
            "task": { "state": "open" }
        }))
        .unwrap();

        assert_eq!(plan.main_goal.as_deref(), Some("X"));
        assert_eq!(plan.task.state, TaskState::Open);
        assert!(plan.task.subtasks.is_empty());
    }

    #[test]
    fn test_nested_subtasks() {
        let plan: Plan = serde_json::from_value(json!({
            "mainGoal": "ship",
            "task": {
                "id": "0",
                "goal": "ship",
                "parent": null,
                "state": "in_progress",
                "subtasks": [
                    { "id": "0.0", "goal": "write", "parent": "0", "state": "completed", "subtasks": [] }
                ]
            }
        }))
        .unwrap();

        assert_eq!(plan.task.subtasks.len(), 1);
        assert_eq!(plan.task.subtasks[0].state, TaskState::Completed);
        assert_eq!(plan.task.subtasks[0].parent.as_deref(), Some("0"));
    }

    #[test]
    fn test_history_entry_roles() {
        let entry: HistoryEntry =
            serde_json::from_value(json!({"role": "assistant", "payload": {"action": "finish"}}))
                .unwrap();
        assert_eq!(entry.role, Role::Assistant);

        let bad = serde_json::from_value::<HistoryEntry>(json!({"role": "system", "payload": {}}));
        assert!(bad.is_err());
    }
}
