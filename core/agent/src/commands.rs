//! Slash-command registry and built-in handlers.

use std::collections::HashMap;

use qi_error::Result;

/// A parsed slash-command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    /// Command name (text after `/`).
    pub name: String,
    /// Remaining whitespace-separated arguments.
    pub args: Vec<String>,
}

/// Read-only orchestrator facts handlers may render.
#[derive(Debug, Clone)]
pub struct CommandEnv {
    /// Provider identifier.
    pub provider: String,
    /// Current model name.
    pub model: String,
    /// Milliseconds since the orchestrator started.
    pub uptime_ms: i64,
    /// Requests processed so far.
    pub requests_processed: u64,
    /// Current token budget.
    pub token_budget: usize,
    /// Whether workflows are enabled.
    pub workflows_enabled: bool,
    /// Whether degraded mode is active.
    pub degraded: bool,
}

/// Effect of a command, applied by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Plain text reply.
    Text(String),
    /// Clear the conversation, replying with the given text.
    Clear(String),
    /// Set the token budget, replying with the given text.
    SetTokenBudget(usize, String),
    /// Terminate the session.
    Exit(String),
}

impl CommandOutcome {
    /// The user-visible reply text.
    pub fn text(&self) -> &str {
        match self {
            CommandOutcome::Text(text)
            | CommandOutcome::Clear(text)
            | CommandOutcome::SetTokenBudget(_, text)
            | CommandOutcome::Exit(text) => text,
        }
    }
}

/// A slash-command handler.
pub trait CommandHandler: Send + Sync {
    /// Run the command.
    fn execute(&self, request: &CommandRequest, env: &CommandEnv) -> Result<CommandOutcome>;
}

/// Name-keyed command table with the built-ins pre-registered.
pub struct CommandRegistry {
    handlers: HashMap<String, Box<dyn CommandHandler>>,
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl CommandRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// A registry with `status`, `help`, `clear`, `tokens`, `config`,
    /// `exit`, and `quit` registered.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("status", Box::new(StatusCommand));
        registry.register("help", Box::new(HelpCommand));
        registry.register("clear", Box::new(ClearCommand));
        registry.register("tokens", Box::new(TokensCommand));
        registry.register("config", Box::new(ConfigCommand));
        registry.register("exit", Box::new(ExitCommand));
        registry.register("quit", Box::new(ExitCommand));
        registry
    }

    /// Register a handler under a name.
    pub fn register(&mut self, name: impl Into<String>, handler: Box<dyn CommandHandler>) {
        self.handlers.insert(name.into(), handler);
    }

    /// Registered command names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Dispatch a command. Unknown names fall through to a guidance
    /// reply rather than an error.
    pub fn dispatch(&self, request: &CommandRequest, env: &CommandEnv) -> Result<CommandOutcome> {
        match self.handlers.get(&request.name) {
            Some(handler) => handler.execute(request, env),
            None => Ok(CommandOutcome::Text(format!(
                "Unknown command: /{}. Type /help for available commands.",
                request.name
            ))),
        }
    }
}

impl std::fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRegistry")
            .field("commands", &self.names())
            .finish()
    }
}

struct StatusCommand;

impl CommandHandler for StatusCommand {
    fn execute(&self, _request: &CommandRequest, env: &CommandEnv) -> Result<CommandOutcome> {
        let mode = if env.degraded { "degraded" } else { "ready" };
        Ok(CommandOutcome::Text(format!(
            "Status: {mode}\nProvider: {}\nModel: {}\nRequests: {}\nUptime: {}s",
            env.provider,
            env.model,
            env.requests_processed,
            env.uptime_ms / 1000
        )))
    }
}

struct HelpCommand;

impl CommandHandler for HelpCommand {
    fn execute(&self, _request: &CommandRequest, _env: &CommandEnv) -> Result<CommandOutcome> {
        Ok(CommandOutcome::Text(
            "Available commands:\n\
             /status - show agent status\n\
             /help - list available commands\n\
             /clear - clear the conversation\n\
             /tokens [N] - show or set the token budget\n\
             /config - show configuration\n\
             /exit - leave the session"
                .to_string(),
        ))
    }
}

struct ClearCommand;

impl CommandHandler for ClearCommand {
    fn execute(&self, _request: &CommandRequest, _env: &CommandEnv) -> Result<CommandOutcome> {
        Ok(CommandOutcome::Clear("Conversation cleared".to_string()))
    }
}

struct TokensCommand;

impl CommandHandler for TokensCommand {
    fn execute(&self, request: &CommandRequest, env: &CommandEnv) -> Result<CommandOutcome> {
        match request.args.first() {
            None => Ok(CommandOutcome::Text(format!(
                "Token budget: {}",
                env.token_budget
            ))),
            Some(raw) => match raw.parse::<usize>() {
                Ok(budget) if budget > 0 => Ok(CommandOutcome::SetTokenBudget(
                    budget,
                    format!("Token budget set to {budget}"),
                )),
                _ => Ok(CommandOutcome::Text(format!(
                    "Invalid token budget: {raw}. Usage: /tokens [N]"
                ))),
            },
        }
    }
}

struct ConfigCommand;

impl CommandHandler for ConfigCommand {
    fn execute(&self, _request: &CommandRequest, env: &CommandEnv) -> Result<CommandOutcome> {
        Ok(CommandOutcome::Text(format!(
            "Configuration:\n\
             provider = {}\n\
             model = {}\n\
             workflows = {}\n\
             tokenBudget = {}",
            env.provider,
            env.model,
            if env.workflows_enabled { "enabled" } else { "disabled" },
            env.token_budget
        )))
    }
}

struct ExitCommand;

impl CommandHandler for ExitCommand {
    fn execute(&self, _request: &CommandRequest, _env: &CommandEnv) -> Result<CommandOutcome> {
        Ok(CommandOutcome::Exit("Goodbye".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn env() -> CommandEnv {
        CommandEnv {
            provider: "static".to_string(),
            model: "static-1".to_string(),
            uptime_ms: 5000,
            requests_processed: 3,
            token_budget: 32_000,
            workflows_enabled: true,
            degraded: false,
        }
    }

    fn request(name: &str, args: &[&str]) -> CommandRequest {
        CommandRequest {
            name: name.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    #[test]
    fn test_status_contains_required_lines() {
        let registry = CommandRegistry::with_builtins();
        let outcome = registry.dispatch(&request("status", &[]), &env()).unwrap();
        let text = outcome.text();
        assert!(text.contains("Status:"));
        assert!(text.contains("Provider:"));
        assert!(text.contains("Model:"));
    }

    #[test]
    fn test_tokens_show_and_set() {
        let registry = CommandRegistry::with_builtins();

        let show = registry.dispatch(&request("tokens", &[]), &env()).unwrap();
        assert_eq!(show, CommandOutcome::Text("Token budget: 32000".to_string()));

        let set = registry
            .dispatch(&request("tokens", &["4096"]), &env())
            .unwrap();
        assert_eq!(
            set,
            CommandOutcome::SetTokenBudget(4096, "Token budget set to 4096".to_string())
        );

        let bad = registry
            .dispatch(&request("tokens", &["many"]), &env())
            .unwrap();
        assert!(bad.text().contains("Invalid token budget"));
    }

    #[test]
    fn test_unknown_command_falls_through() {
        let registry = CommandRegistry::with_builtins();
        let outcome = registry.dispatch(&request("frobnicate", &[]), &env()).unwrap();
        assert!(outcome.text().contains("Unknown command: /frobnicate"));
    }

    #[test]
    fn test_clear_and_exit_outcomes() {
        let registry = CommandRegistry::with_builtins();
        assert!(matches!(
            registry.dispatch(&request("clear", &[]), &env()).unwrap(),
            CommandOutcome::Clear(_)
        ));
        assert!(matches!(
            registry.dispatch(&request("exit", &[]), &env()).unwrap(),
            CommandOutcome::Exit(_)
        ));
        assert!(matches!(
            registry.dispatch(&request("quit", &[]), &env()).unwrap(),
            CommandOutcome::Exit(_)
        ));
    }

    #[test]
    fn test_builtins_registered() {
        let registry = CommandRegistry::with_builtins();
        assert_eq!(
            registry.names(),
            vec!["clear", "config", "exit", "help", "quit", "status", "tokens"]
        );
    }
}
