use super::*;
use async_trait::async_trait;
use pretty_assertions::assert_eq;
use qi_error::Result;
use qi_inference::ChunkStream;
use qi_inference::CompletionResponse;
use qi_inference::StaticProvider;

#[tokio::test]
async fn test_slash_command() {
    let classifier = InputClassifier::default();
    let result = classifier.classify("/status").await;
    assert_eq!(result.input_type, ClassificationType::Command);
    assert!(result.confidence >= 0.9);
    assert_eq!(result.method, ClassificationMethod::RuleBased);
    assert_eq!(
        result.extracted,
        ExtractedInput::Command {
            name: "status".to_string(),
            args: vec![]
        }
    );
}

#[tokio::test]
async fn test_command_with_args() {
    let classifier = InputClassifier::default();
    let result = classifier.classify("  /tokens 4096 ").await;
    assert_eq!(
        result.extracted,
        ExtractedInput::Command {
            name: "tokens".to_string(),
            args: vec!["4096".to_string()]
        }
    );
}

#[tokio::test]
async fn test_file_references_mean_workflow() {
    let classifier = InputClassifier::default();
    let result = classifier.classify("fix the bug in @src/main.rs and @lib.rs").await;
    assert_eq!(result.input_type, ClassificationType::Workflow);
    if let ExtractedInput::Workflow { file_refs, .. } = &result.extracted {
        assert_eq!(file_refs, &vec!["src/main.rs".to_string(), "lib.rs".to_string()]);
    } else {
        panic!("expected workflow extraction");
    }
}

#[tokio::test]
async fn test_plain_prompt() {
    let classifier = InputClassifier::default();
    let result = classifier.classify("Explain how recursion works and why").await;
    assert_eq!(result.input_type, ClassificationType::Prompt);
    assert!(result.confidence >= 0.8);
    assert_eq!(result.method, ClassificationMethod::RuleBased);
}

#[tokio::test]
async fn test_ambiguous_input_has_low_confidence() {
    let classifier = InputClassifier::default();
    // One prompt indicator against one workflow indicator.
    let result = classifier.classify("explain then fix it").await;
    assert!(result.confidence < 0.8);
}

#[tokio::test]
async fn test_llm_escalation_on_low_confidence() {
    let provider = Arc::new(StaticProvider::new("static-test"));
    provider.push_reply(["workflow"]);

    let classifier = InputClassifier::default().with_provider(provider);
    let result = classifier.classify("explain then fix it").await;
    assert_eq!(result.method, ClassificationMethod::LlmAssisted);
    assert_eq!(result.input_type, ClassificationType::Workflow);
    assert_eq!(result.confidence, 0.9);
}

#[tokio::test]
async fn test_unusable_model_answer_falls_back() {
    let provider = Arc::new(StaticProvider::new("static-test"));
    provider.push_reply(["I am not sure at all"]);

    let classifier = InputClassifier::default().with_provider(provider);
    let result = classifier.classify("explain then fix it").await;
    assert_eq!(result.method, ClassificationMethod::Fallback);
    assert_eq!(result.input_type, ClassificationType::Prompt);
}

struct HangingProvider;

#[async_trait]
impl ProviderClient for HangingProvider {
    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(CompletionResponse {
            content: String::new(),
            model: "hang".to_string(),
        })
    }

    async fn stream(&self, _request: CompletionRequest) -> Result<ChunkStream> {
        Ok(Box::pin(futures::stream::empty()))
    }

    fn current_model(&self) -> String {
        "hang".to_string()
    }

    fn supported_providers(&self) -> Vec<String> {
        vec!["hang".to_string()]
    }

    fn validate_config(&self) -> Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_model_timeout_falls_back_to_rules() {
    let config = ClassifierConfig {
        llm_timeout: Duration::from_millis(20),
        ..ClassifierConfig::default()
    };
    let classifier = InputClassifier::new(config).with_provider(Arc::new(HangingProvider));

    let result = classifier.classify("explain then fix it").await;
    assert_eq!(result.method, ClassificationMethod::Fallback);
    assert_eq!(result.input_type, ClassificationType::Prompt);
}

#[tokio::test]
async fn test_high_confidence_skips_model() {
    // The provider would answer "workflow", but the rule path is
    // already confident enough to skip it.
    let provider = Arc::new(StaticProvider::new("static-test"));
    provider.push_reply(["workflow"]);
    let classifier = InputClassifier::default().with_provider(provider);

    let result = classifier.classify("/help").await;
    assert_eq!(result.method, ClassificationMethod::RuleBased);
    assert_eq!(result.input_type, ClassificationType::Command);
}
