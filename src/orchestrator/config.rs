use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Maps trigger words to the tool suggested for them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ToolHint {
    pub keywords: Vec<String>,
    pub tool: String,
}

/// Keyword families and confidence levels used by the task analyzer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct RouterConfig {
    /// Sender id stamped on outgoing message envelopes
    pub sender_id: String,
    pub reasoning_keywords: Vec<String>,
    pub tool_keywords: Vec<String>,
    pub communication_keywords: Vec<String>,
    /// Checked in order; the first hint with a matching keyword wins
    pub tool_hints: Vec<ToolHint>,
    pub default_tool: String,
    pub reasoning_capability: String,
    pub coordination_capability: String,
    pub reasoning_confidence: f64,
    pub tool_confidence: f64,
    pub communication_confidence: f64,
    pub fallback_confidence: f64,
}

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|w| w.to_string()).collect()
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            sender_id: "agentlink".to_string(),
            reasoning_keywords: words(&[
                "analyze", "analyse", "explain", "understand", "reason", "evaluate", "compare",
                "summarize", "why",
            ]),
            tool_keywords: words(&[
                "read", "write", "file", "save", "open", "list", "directory", "fetch",
            ]),
            communication_keywords: words(&[
                "notify", "broadcast", "coordinate", "message", "tell", "inform", "delegate",
            ]),
            tool_hints: vec![
                ToolHint {
                    keywords: words(&["write", "save"]),
                    tool: "write_file".to_string(),
                },
                ToolHint {
                    keywords: words(&["list", "directory"]),
                    tool: "list_directory".to_string(),
                },
            ],
            default_tool: "read_file".to_string(),
            reasoning_capability: "reasoning".to_string(),
            coordination_capability: "coordination".to_string(),
            reasoning_confidence: 0.8,
            tool_confidence: 0.8,
            communication_confidence: 0.75,
            fallback_confidence: 0.3,
        }
    }
}
