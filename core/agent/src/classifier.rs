//! Input classification: deterministic first, model-assisted second.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use regex_lite::Regex;
use tracing::debug;
use tracing::warn;

use qi_inference::CompletionRequest;
use qi_inference::ProviderClient;
use qi_protocol::Classification;
use qi_protocol::ClassificationMethod;
use qi_protocol::ClassificationType;
use qi_protocol::ExtractedInput;

/// Classifier configuration.
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// Below this rule confidence the model path is consulted.
    pub confidence_threshold: f64,
    /// Tokens suggesting a conversational prompt.
    pub prompt_indicators: Vec<String>,
    /// Tokens suggesting an action-oriented workflow.
    pub workflow_indicators: Vec<String>,
    /// Bound on the model-assisted path.
    pub llm_timeout: Duration,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        let to_strings = |words: &[&str]| words.iter().map(|w| w.to_string()).collect();
        Self {
            confidence_threshold: 0.8,
            prompt_indicators: to_strings(&[
                "explain", "what", "why", "how", "describe", "tell", "help", "show",
                "compare", "summarize",
            ]),
            workflow_indicators: to_strings(&[
                "fix", "refactor", "implement", "update", "add", "remove", "create",
                "delete", "rename", "test", "build", "deploy",
            ]),
            llm_timeout: Duration::from_secs(2),
        }
    }
}

/// Classifies user input into {command, prompt, workflow}.
pub struct InputClassifier {
    config: ClassifierConfig,
    file_ref_pattern: Regex,
    provider: Option<Arc<dyn ProviderClient>>,
}

impl Default for InputClassifier {
    fn default() -> Self {
        Self::new(ClassifierConfig::default())
    }
}

impl InputClassifier {
    /// Create a rule-only classifier.
    pub fn new(config: ClassifierConfig) -> Self {
        Self {
            config,
            file_ref_pattern: Regex::new(r"@[^\s@]+")
                .unwrap_or_else(|e| unreachable!("static pattern: {e}")),
            provider: None,
        }
    }

    /// Enable the model-assisted escalation path.
    pub fn with_provider(mut self, provider: Arc<dyn ProviderClient>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Classify one piece of input.
    pub async fn classify(&self, input: &str) -> Classification {
        let trimmed = input.trim();

        // Slash commands are unambiguous.
        if let Some(rest) = trimmed.strip_prefix('/') {
            let mut parts = rest.split_whitespace();
            let name = parts.next().unwrap_or_default().to_string();
            let args: Vec<String> = parts.map(String::from).collect();
            return Classification {
                input_type: ClassificationType::Command,
                confidence: 1.0,
                method: ClassificationMethod::RuleBased,
                reasoning: "Input begins with '/'".to_string(),
                extracted: ExtractedInput::Command { name, args },
                metadata: HashMap::new(),
            };
        }

        // `@path` references mark a workflow.
        let file_refs: Vec<String> = self
            .file_ref_pattern
            .find_iter(trimmed)
            .map(|m| m.as_str().trim_start_matches('@').to_string())
            .collect();
        if !file_refs.is_empty() {
            return Classification {
                input_type: ClassificationType::Workflow,
                confidence: 0.9,
                method: ClassificationMethod::RuleBased,
                reasoning: format!("Input references {} file(s) via '@'", file_refs.len()),
                extracted: ExtractedInput::Workflow {
                    text: trimmed.to_string(),
                    file_refs,
                },
                metadata: HashMap::new(),
            };
        }

        let rule = self.rule_classification(trimmed);
        if rule.confidence >= self.config.confidence_threshold {
            return rule;
        }

        // Low confidence: consult the model under a bounded timeout,
        // falling back to the rule result on any failure.
        let Some(provider) = &self.provider else {
            return rule;
        };
        match tokio::time::timeout(
            self.config.llm_timeout,
            self.llm_classification(provider, trimmed),
        )
        .await
        {
            Ok(Some(classification)) => classification,
            Ok(None) => {
                debug!("Model classification unusable; using rule result");
                fallback(rule)
            }
            Err(_) => {
                warn!("Model classification timed out; using rule result");
                fallback(rule)
            }
        }
    }

    /// Score indicator hits and produce a confidence in [0, 1].
    fn rule_classification(&self, input: &str) -> Classification {
        let lower = input.to_lowercase();
        let words: Vec<&str> = lower.split_whitespace().collect();

        let prompt_hits = self
            .config
            .prompt_indicators
            .iter()
            .filter(|indicator| words.contains(&indicator.as_str()))
            .count();
        let workflow_hits = self
            .config
            .workflow_indicators
            .iter()
            .filter(|indicator| words.contains(&indicator.as_str()))
            .count();

        let total = prompt_hits + workflow_hits;
        let confidence = if total == 0 {
            0.5
        } else {
            let spread = prompt_hits.abs_diff(workflow_hits) as f64 / total as f64;
            (0.5 + 0.45 * spread).min(1.0)
        };

        let mut metadata = HashMap::new();
        metadata.insert("promptHits".to_string(), prompt_hits.to_string());
        metadata.insert("workflowHits".to_string(), workflow_hits.to_string());

        Classification {
            input_type: ClassificationType::Prompt,
            confidence,
            method: ClassificationMethod::RuleBased,
            reasoning: format!(
                "Indicator scoring: {prompt_hits} prompt vs {workflow_hits} workflow hits"
            ),
            extracted: ExtractedInput::Prompt {
                text: input.to_string(),
            },
            metadata,
        }
    }

    async fn llm_classification(
        &self,
        provider: &Arc<dyn ProviderClient>,
        input: &str,
    ) -> Option<Classification> {
        let request = CompletionRequest::new(format!(
            "Classify the following user input as exactly one of: command, prompt, workflow.\n\
             Reply with the single word only.\n\nInput: {input}"
        ));
        let response = provider.complete(request).await.ok()?;
        let answer = response.content.to_lowercase();

        let input_type = if answer.contains("workflow") {
            ClassificationType::Workflow
        } else if answer.contains("command") {
            ClassificationType::Command
        } else if answer.contains("prompt") {
            ClassificationType::Prompt
        } else {
            return None;
        };

        let extracted = match input_type {
            ClassificationType::Command => {
                let mut parts = input.split_whitespace();
                ExtractedInput::Command {
                    name: parts.next().unwrap_or_default().to_string(),
                    args: parts.map(String::from).collect(),
                }
            }
            ClassificationType::Prompt => ExtractedInput::Prompt {
                text: input.to_string(),
            },
            ClassificationType::Workflow => ExtractedInput::Workflow {
                text: input.to_string(),
                file_refs: Vec::new(),
            },
        };

        Some(Classification {
            input_type,
            confidence: 0.9,
            method: ClassificationMethod::LlmAssisted,
            reasoning: format!("Model classified input as {input_type}"),
            extracted,
            metadata: HashMap::new(),
        })
    }
}

fn fallback(mut rule: Classification) -> Classification {
    rule.method = ClassificationMethod::Fallback;
    rule
}

#[cfg(test)]
#[path = "classifier.test.rs"]
mod tests;
