//! Response parser for the tagged-output protocol.
//!
//! A completion may carry three optional blocks:
//!
//! ```text
//! <thinking>free-form reasoning</thinking>
//! <tool>{"name": "search", "args": {"query": "..."}}</tool>
//! <answer>final answer for the user</answer>
//! ```
//!
//! Each block is extracted independently: the first opening marker paired
//! with the nearest closing marker after it. Markers are case-insensitive.
//! Anything the parser cannot make sense of is reported as absent, never as
//! an error; deciding what to do about that is the turn controller's job.

use delve_core::tool::{ToolArgs, ToolInvocation};
use regex_lite::Regex;
use std::sync::LazyLock;

static THINKING: LazyLock<Option<Regex>> = LazyLock::new(|| block_pattern("thinking"));
static TOOL: LazyLock<Option<Regex>> = LazyLock::new(|| block_pattern("tool"));
static ANSWER: LazyLock<Option<Regex>> = LazyLock::new(|| block_pattern("answer"));

fn block_pattern(marker: &str) -> Option<Regex> {
    Regex::new(&format!(r"(?is)<{marker}>(.*?)</{marker}>")).ok()
}

/// What a single completion asked for.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedResponse {
    /// Trimmed reasoning text, if a reasoning block was present.
    pub reasoning: Option<String>,
    /// The tool invocation, if the tool block decoded cleanly.
    pub tool: Option<ToolInvocation>,
    /// Trimmed answer text. An empty answer block counts as absent.
    pub answer: Option<String>,
}

impl ParsedResponse {
    /// Nothing actionable: no tool invocation and no answer.
    pub fn is_unstructured(&self) -> bool {
        self.tool.is_none() && self.answer.is_none()
    }
}

/// Parse one raw completion.
pub fn parse_response(text: &str) -> ParsedResponse {
    ParsedResponse {
        reasoning: capture(&THINKING, text).map(|s| s.trim().to_string()),
        tool: capture(&TOOL, text).and_then(parse_tool_body),
        answer: capture(&ANSWER, text)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string),
    }
}

fn capture<'t>(pattern: &LazyLock<Option<Regex>>, text: &'t str) -> Option<&'t str> {
    let regex = pattern.as_ref()?;
    regex
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Decode `{"name": "...", "args": {...}}`. A missing or non-object `args`
/// becomes an empty argument map.
fn parse_tool_body(body: &str) -> Option<ToolInvocation> {
    let value: serde_json::Value = serde_json::from_str(body.trim()).ok()?;
    let object = value.as_object()?;
    let name = object.get("name")?.as_str()?;
    let arguments: ToolArgs = object
        .get("args")
        .and_then(|a| a.as_object())
        .cloned()
        .unwrap_or_default();
    Some(ToolInvocation::new(name, arguments))
}
