//! CLI arguments and environment overrides.

use clap::Parser;

/// Interactive AI coding assistant.
#[derive(Debug, Parser)]
#[command(name = "qi", version, about = "Interactive AI coding assistant")]
pub struct CliArgs {
    /// Provider identifier.
    #[arg(long, default_value = "static", env = "QI_PROVIDER")]
    pub provider: String,

    /// Model name passed to the provider adapter.
    #[arg(long, default_value = "qi-static-1", env = "QI_MODEL")]
    pub model: String,

    /// Disable workflow routing to the tool pipeline.
    #[arg(long, env = "QI_NO_WORKFLOWS")]
    pub no_workflows: bool,

    /// Token budget for context optimization.
    #[arg(long, default_value_t = 32_000, env = "QI_TOKEN_BUDGET")]
    pub token_budget: usize,

    /// Classifier confidence threshold below which the model path is
    /// consulted.
    #[arg(long, default_value_t = 0.8, env = "QI_CONFIDENCE_THRESHOLD")]
    pub confidence_threshold: f64,

    /// Log filter, e.g. `info` or `qi_agent=debug`.
    #[arg(long, default_value = "warn", env = "QI_LOG")]
    pub log: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = CliArgs::parse_from(["qi"]);
        assert_eq!(args.provider, "static");
        assert_eq!(args.model, "qi-static-1");
        assert!(!args.no_workflows);
        assert_eq!(args.token_budget, 32_000);
    }

    #[test]
    fn test_overrides() {
        let args = CliArgs::parse_from([
            "qi",
            "--model",
            "other-model",
            "--no-workflows",
            "--token-budget",
            "8000",
        ]);
        assert_eq!(args.model, "other-model");
        assert!(args.no_workflows);
        assert_eq!(args.token_budget, 8000);
    }
}
