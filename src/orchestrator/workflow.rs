//! Translation of task steps into a dependency graph for the workflow engine

use crate::orchestrator::task::Task;
use crate::utils::errors::{GatewayError, GatewayResult};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet, VecDeque};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowNode {
    pub id: String,
    pub action: String,
    pub depends_on: Vec<String>,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub params: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowGraph {
    pub task_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub nodes: Vec<WorkflowNode>,
}

impl WorkflowGraph {
    /// Each step depends on the one before it unless it names its own
    /// predecessors. A task without steps becomes a single `process` node.
    pub fn from_task(task: &Task) -> GatewayResult<Self> {
        let nodes = if task.steps.is_empty() {
            vec![WorkflowNode {
                id: "main".to_string(),
                action: task.name.clone().unwrap_or_else(|| "process".to_string()),
                depends_on: Vec::new(),
                params: json!({
                    "input": task.input,
                    "args": task.args,
                }),
            }]
        } else {
            let mut previous: Option<&str> = None;
            task.steps
                .iter()
                .map(|step| {
                    let depends_on = match &step.depends_on {
                        Some(explicit) => {
                            let mut seen = HashSet::new();
                            explicit
                                .iter()
                                .filter(|dep| seen.insert(dep.as_str()))
                                .cloned()
                                .collect()
                        }
                        None => previous.map(|p| vec![p.to_string()]).unwrap_or_default(),
                    };
                    previous = Some(step.id.as_str());
                    WorkflowNode {
                        id: step.id.clone(),
                        action: step.action.clone(),
                        depends_on,
                        params: step.params.clone().unwrap_or(Value::Null),
                    }
                })
                .collect()
        };

        let graph = Self {
            task_id: task.id.clone(),
            name: task.name.clone(),
            nodes,
        };
        graph.validate()?;
        Ok(graph)
    }

    fn validate(&self) -> GatewayResult<()> {
        let mut ids = HashSet::new();
        for node in &self.nodes {
            if !ids.insert(node.id.as_str()) {
                return Err(GatewayError::Validation(format!(
                    "duplicate step id '{}'",
                    node.id
                )));
            }
        }

        for node in &self.nodes {
            for dep in &node.depends_on {
                if dep == &node.id {
                    return Err(GatewayError::Validation(format!(
                        "step '{}' depends on itself",
                        node.id
                    )));
                }
                if !ids.contains(dep.as_str()) {
                    return Err(GatewayError::Validation(format!(
                        "step '{}' depends on unknown step '{}'",
                        node.id, dep
                    )));
                }
            }
        }

        if self.execution_order().len() != self.nodes.len() {
            return Err(GatewayError::Validation(
                "step dependencies form a cycle".to_string(),
            ));
        }
        Ok(())
    }

    /// Topological order of node ids (Kahn); shorter than `nodes` when cyclic
    pub fn execution_order(&self) -> Vec<&str> {
        let mut remaining: HashMap<&str, usize> = self
            .nodes
            .iter()
            .map(|n| {
                let distinct: HashSet<&str> = n.depends_on.iter().map(String::as_str).collect();
                (n.id.as_str(), distinct.len())
            })
            .collect();
        let mut ready: VecDeque<&str> = self
            .nodes
            .iter()
            .filter(|n| n.depends_on.is_empty())
            .map(|n| n.id.as_str())
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(id) = ready.pop_front() {
            order.push(id);
            for node in &self.nodes {
                if node.depends_on.iter().any(|d| d == id) {
                    if let Some(count) = remaining.get_mut(node.id.as_str()) {
                        *count -= 1;
                        if *count == 0 {
                            ready.push_back(node.id.as_str());
                        }
                    }
                }
            }
        }
        order
    }

    pub fn roots(&self) -> impl Iterator<Item = &WorkflowNode> {
        self.nodes.iter().filter(|n| n.depends_on.is_empty())
    }
}
