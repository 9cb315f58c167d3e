//! Task routing across tool servers, peer agents and workflow engines

pub mod analysis;
pub mod collaborators;
pub mod config;
pub mod router;
pub mod task;
pub mod workflow;

pub use analysis::{TaskAnalysis, TaskAnalyzer};
pub use collaborators::{AgentDirectory, AgentInfo, InMemoryAgentDirectory, MessageBus, WorkflowEngine};
pub use config::{RouterConfig, ToolHint};
pub use router::{Route, RouterStatus, TaskOutcome, TaskRouter};
pub use task::{Task, TaskMetadata, TaskStep, TaskType};
pub use workflow::{WorkflowGraph, WorkflowNode};
