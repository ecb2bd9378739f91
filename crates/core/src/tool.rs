//! Tool trait — the abstraction over agent capabilities.
//!
//! Tools are what let the research loop act: search the web, check the
//! weather, write a report, send an email. The loop never talks to a tool
//! directly; it goes through [`ToolRegistry::dispatch`], which never fails.

use crate::error::ToolError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, warn};

/// Decoded tool arguments: parameter name → JSON value.
pub type ToolArgs = serde_json::Map<String, serde_json::Value>;

/// A request to execute a tool, as parsed from a model completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// Name of the tool to execute
    pub name: String,

    /// Arguments as a JSON object
    #[serde(default)]
    pub arguments: ToolArgs,
}

impl ToolInvocation {
    pub fn new(name: impl Into<String>, arguments: ToolArgs) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }
}

/// The result of dispatching a [`ToolInvocation`].
///
/// Exactly one of `output` / `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub invocation: ToolInvocation,
    pub succeeded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolOutcome {
    pub fn success(invocation: ToolInvocation, output: impl Into<String>) -> Self {
        Self {
            invocation,
            succeeded: true,
            output: Some(output.into()),
            error: None,
        }
    }

    pub fn failure(invocation: ToolInvocation, error: impl Into<String>) -> Self {
        Self {
            invocation,
            succeeded: false,
            output: None,
            error: Some(error.into()),
        }
    }

    /// The text fed back to the model for this outcome.
    pub fn observation(&self) -> String {
        match (&self.output, &self.error) {
            (Some(output), _) if self.succeeded => format!("Tool result: {output}"),
            (_, Some(error)) => format!("Tool execution error: {error}"),
            _ => "Tool result: ".to_string(),
        }
    }
}

/// Read a string argument, treating a missing or non-string value as empty.
pub fn string_arg(args: &ToolArgs, key: &str) -> String {
    args.get(key)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

/// The core Tool trait.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "search", "get_weather").
    fn name(&self) -> &str;

    /// One-line calling convention shown to the model, e.g.
    /// `search(query: str) -> str: Searches the web ...`.
    fn description(&self) -> &str;

    /// Execute the tool with the given arguments.
    async fn execute(&self, arguments: &ToolArgs) -> std::result::Result<String, ToolError>;
}

/// A registry of available tools.
///
/// The research loop uses this to:
/// 1. Describe requested tools in the capability prompt
/// 2. Dispatch a parsed invocation and get a [`ToolOutcome`] back
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// Whether a tool with this name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Calling convention for `name`, or a placeholder if it is unregistered.
    pub fn describe(&self, name: &str) -> String {
        match self.tools.get(name) {
            Some(tool) => tool.description().to_string(),
            None => format!("{name}: Tool description not available"),
        }
    }

    /// Execute an invocation. Unknown tools and tool faults come back as a
    /// failed outcome, never as an error. No retries.
    pub async fn dispatch(&self, invocation: &ToolInvocation) -> ToolOutcome {
        let Some(tool) = self.tools.get(&invocation.name) else {
            warn!(tool = %invocation.name, "Dispatch to unregistered tool");
            return ToolOutcome::failure(
                invocation.clone(),
                format!("Unknown tool: {}", invocation.name),
            );
        };

        let start = Instant::now();
        let result = tool.execute(&invocation.arguments).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(output) => {
                debug!(tool = %invocation.name, duration_ms, "Tool succeeded");
                ToolOutcome::success(invocation.clone(), output)
            }
            Err(e) => {
                warn!(tool = %invocation.name, duration_ms, error = %e, "Tool failed");
                ToolOutcome::failure(invocation.clone(), e.to_string())
            }
        }
    }

    /// List all registered tool names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
