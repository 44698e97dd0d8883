//! The built-in workflow tool: inspects referenced files.

use async_trait::async_trait;
use serde_json::Value;

use qi_error::Result;
use qi_protocol::ConcurrencySafety;
use qi_tools::Tool;
use qi_tools::ToolContext;

/// Resolves `@path` references against the working directory and
/// reports what it found.
pub struct WorkflowTool;

#[async_trait]
impl Tool for WorkflowTool {
    fn name(&self) -> &str {
        "Workflow"
    }

    fn description(&self) -> &str {
        "Inspect the files referenced by a workflow request"
    }

    fn concurrency_safety(&self) -> ConcurrencySafety {
        ConcurrencySafety::Safe
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "prompt": {"type": "string"},
                "files": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["prompt"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> Result<Value> {
        let files: Vec<String> = input["files"]
            .as_array()
            .map(|refs| {
                refs.iter()
                    .filter_map(|v| v.as_str())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        let mut lines = Vec::with_capacity(files.len());
        for file in &files {
            let path = ctx.cwd.join(file);
            match tokio::fs::metadata(&path).await {
                Ok(metadata) => {
                    lines.push(format!("{file}: {} bytes", metadata.len()));
                }
                Err(_) => {
                    lines.push(format!("{file}: not found"));
                }
            }
        }

        let content = if lines.is_empty() {
            "No files referenced.".to_string()
        } else {
            format!("Referenced files:\n{}", lines.join("\n"))
        };
        Ok(serde_json::json!({
            "content": content,
            "fileCount": files.len(),
        }))
    }
}
