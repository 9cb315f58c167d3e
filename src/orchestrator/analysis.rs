//! Heuristic classification of `simple` tasks
//!
//! Metadata hints win outright. Without hints the task's name and input are
//! tokenized and matched against the configured keyword families.

use crate::orchestrator::config::RouterConfig;
use crate::orchestrator::task::Task;
use serde::Serialize;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskAnalysis {
    pub requires_reasoning: bool,
    pub requires_tools: bool,
    pub requires_communication: bool,
    pub suggested_tool: Option<String>,
    pub primary_capability: Option<String>,
    /// In `[0, 1]`
    pub confidence: f64,
}

#[derive(Debug, Clone)]
pub struct TaskAnalyzer {
    config: RouterConfig,
}

impl TaskAnalyzer {
    pub fn new(config: RouterConfig) -> Self {
        Self { config }
    }

    pub fn analyze(&self, task: &Task) -> TaskAnalysis {
        match &task.metadata {
            Some(metadata) if metadata.has_hints() => {
                let capability = metadata.capability.clone();
                TaskAnalysis {
                    requires_reasoning: metadata.requires_reasoning.unwrap_or(false),
                    requires_tools: metadata.tool.is_some(),
                    requires_communication: capability.as_deref()
                        == Some(self.config.coordination_capability.as_str()),
                    suggested_tool: metadata.tool.clone(),
                    primary_capability: capability,
                    confidence: 1.0,
                }
            }
            _ => self.analyze_text(&task.text()),
        }
    }

    fn analyze_text(&self, text: &str) -> TaskAnalysis {
        let lowered = text.to_lowercase();
        let tokens: HashSet<&str> = lowered
            .split(|c: char| !c.is_alphanumeric() && c != '_')
            .filter(|t| !t.is_empty())
            .collect();

        let requires_reasoning = mentions_any(&tokens, &self.config.reasoning_keywords);
        let requires_tools = mentions_any(&tokens, &self.config.tool_keywords);
        let requires_communication = mentions_any(&tokens, &self.config.communication_keywords);

        let suggested_tool = requires_tools.then(|| {
            self.config
                .tool_hints
                .iter()
                .find(|hint| mentions_any(&tokens, &hint.keywords))
                .map(|hint| hint.tool.clone())
                .unwrap_or_else(|| self.config.default_tool.clone())
        });

        let primary_capability = if requires_communication {
            Some(self.config.coordination_capability.clone())
        } else if requires_reasoning {
            Some(self.config.reasoning_capability.clone())
        } else {
            None
        };

        let confidence = [
            (requires_reasoning, self.config.reasoning_confidence),
            (requires_tools, self.config.tool_confidence),
            (requires_communication, self.config.communication_confidence),
        ]
        .into_iter()
        .filter(|(fired, _)| *fired)
        .map(|(_, confidence)| confidence)
        .fold(None, |best: Option<f64>, c| Some(best.map_or(c, |b| b.max(c))))
        .unwrap_or(self.config.fallback_confidence);

        TaskAnalysis {
            requires_reasoning,
            requires_tools,
            requires_communication,
            suggested_tool,
            primary_capability,
            confidence,
        }
    }
}

fn mentions_any(tokens: &HashSet<&str>, keywords: &[String]) -> bool {
    keywords
        .iter()
        .any(|keyword| tokens.iter().any(|token| matches_keyword(token, keyword)))
}

/// Whole-word match that tolerates simple inflections ("files", "analyzing")
fn matches_keyword(token: &str, keyword: &str) -> bool {
    if token == keyword {
        return true;
    }
    let stem = keyword.strip_suffix('e').unwrap_or(keyword);
    [keyword, stem].iter().any(|base| {
        token.strip_prefix(base).is_some_and(|rest| {
            matches!(rest, "s" | "es" | "d" | "ed" | "ing" | "er" | "ers")
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::task::TaskMetadata;

    fn analyzer() -> TaskAnalyzer {
        TaskAnalyzer::new(RouterConfig::default())
    }

    #[test]
    fn test_reasoning_keywords() {
        let analysis = analyzer().analyze(&Task::simple("Please explain this stack trace"));
        assert!(analysis.requires_reasoning);
        assert!(!analysis.requires_tools);
        assert!(analysis.confidence >= 0.7);
        assert_eq!(analysis.primary_capability.as_deref(), Some("reasoning"));
    }

    #[test]
    fn test_tool_keywords_suggest_tool() {
        let a = analyzer();
        assert_eq!(
            a.analyze(&Task::simple("read the config file")).suggested_tool.as_deref(),
            Some("read_file")
        );
        assert_eq!(
            a.analyze(&Task::simple("save notes to disk")).suggested_tool.as_deref(),
            Some("write_file")
        );
        assert_eq!(
            a.analyze(&Task::simple("list the directory")).suggested_tool.as_deref(),
            Some("list_directory")
        );
    }

    #[test]
    fn test_communication_keywords() {
        let analysis = analyzer().analyze(&Task::simple("Notify the team about the outage"));
        assert!(analysis.requires_communication);
        assert_eq!(analysis.primary_capability.as_deref(), Some("coordination"));
        assert_eq!(analysis.confidence, 0.75);
    }

    #[test]
    fn test_vague_text_has_low_confidence() {
        let analysis = analyzer().analyze(&Task::simple("do something vague"));
        assert!(!analysis.requires_reasoning);
        assert!(!analysis.requires_tools);
        assert!(!analysis.requires_communication);
        assert!(analysis.primary_capability.is_none());
        assert_eq!(analysis.confidence, 0.3);
    }

    #[test]
    fn test_matching_is_whole_word() {
        let analysis = analyzer().analyze(&Task::simple("are you ready? listen up"));
        assert!(!analysis.requires_tools);
        assert!(matches_keyword("files", "file"));
        assert!(matches_keyword("analyzing", "analyze"));
        assert!(!matches_keyword("profile", "file"));
    }

    #[test]
    fn test_metadata_hints_override_text() {
        let task = Task::simple("read the file").with_metadata(TaskMetadata {
            capability: Some("translation".to_string()),
            ..Default::default()
        });
        let analysis = analyzer().analyze(&task);

        assert!(!analysis.requires_tools);
        assert_eq!(analysis.primary_capability.as_deref(), Some("translation"));
        assert_eq!(analysis.confidence, 1.0);
    }

    #[test]
    fn test_metadata_tool_hint() {
        let task = Task::simple("anything").with_metadata(TaskMetadata {
            tool: Some("search".to_string()),
            requires_reasoning: Some(true),
            ..Default::default()
        });
        let analysis = analyzer().analyze(&task);
        assert!(analysis.requires_tools);
        assert!(analysis.requires_reasoning);
        assert_eq!(analysis.suggested_tool.as_deref(), Some("search"));
    }
}
