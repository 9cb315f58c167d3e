use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Workflow,
    Communication,
    Tool,
    #[default]
    Simple,
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskType::Workflow => write!(f, "workflow"),
            TaskType::Communication => write!(f, "communication"),
            TaskType::Tool => write!(f, "tool"),
            TaskType::Simple => write!(f, "simple"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStep {
    pub id: String,
    pub action: String,
    /// Explicit predecessors; when absent the step follows the previous one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl TaskStep {
    pub fn new(id: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            action: action.into(),
            depends_on: None,
            params: None,
        }
    }

    pub fn after(mut self, steps: &[&str]) -> Self {
        self.depends_on = Some(steps.iter().map(|s| s.to_string()).collect());
        self
    }
}

/// Caller-supplied routing hints, trusted over text analysis
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires_reasoning: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capability: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
}

impl TaskMetadata {
    pub fn has_hints(&self) -> bool {
        self.requires_reasoning.is_some() || self.capability.is_some() || self.tool.is_some()
    }
}

/// Unit of work submitted to the router
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(default = "generate_task_id")]
    pub id: String,
    #[serde(rename = "type", default)]
    pub task_type: TaskType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<TaskStep>,
    /// Agent id for communication tasks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    /// Pins a tool task to one server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<TaskMetadata>,
}

fn generate_task_id() -> String {
    Uuid::new_v4().to_string()
}

impl Task {
    pub fn new(task_type: TaskType) -> Self {
        Self {
            id: generate_task_id(),
            task_type,
            name: None,
            input: None,
            steps: Vec::new(),
            target: None,
            tool: None,
            server: None,
            args: None,
            metadata: None,
        }
    }

    pub fn simple(input: impl Into<String>) -> Self {
        Self {
            input: Some(input.into()),
            ..Self::new(TaskType::Simple)
        }
    }

    pub fn tool(tool: impl Into<String>, args: Value) -> Self {
        Self {
            tool: Some(tool.into()),
            args: Some(args),
            ..Self::new(TaskType::Tool)
        }
    }

    pub fn message(target: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            target: Some(target.into()),
            input: Some(input.into()),
            ..Self::new(TaskType::Communication)
        }
    }

    pub fn workflow(steps: Vec<TaskStep>) -> Self {
        Self {
            steps,
            ..Self::new(TaskType::Workflow)
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_metadata(mut self, metadata: TaskMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// `name` and `input` joined, for keyword analysis
    pub fn text(&self) -> String {
        [self.name.as_deref(), self.input.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_task_from_json() {
        let task: Task = serde_json::from_value(json!({
            "type": "communication",
            "input": "hi",
            "steps": [{"id": "a", "action": "x", "dependsOn": []}]
        }))
        .unwrap();

        assert_eq!(task.task_type, TaskType::Communication);
        assert!(!task.id.is_empty());
        assert_eq!(task.steps[0].depends_on, Some(vec![]));
        assert!(task.target.is_none());
    }

    #[test]
    fn test_type_defaults_to_simple() {
        let task: Task = serde_json::from_value(json!({"input": "do something"})).unwrap();
        assert_eq!(task.task_type, TaskType::Simple);
    }

    #[test]
    fn test_text_joins_name_and_input() {
        let task = Task::simple("the report").with_name("Analyze");
        assert_eq!(task.text(), "Analyze the report");
        assert_eq!(Task::new(TaskType::Simple).text(), "");
    }
}
