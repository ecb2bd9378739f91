//! System prompts.

use delve_core::tool::ToolRegistry;

/// System entry for single-shot (non-research) requests.
pub const CONVERSATIONAL_PROMPT: &str = "You are a helpful and friendly conversational assistant. Respond directly to the user's query without using tools.";

/// System entry for explaining an uploaded file.
pub const FILE_ANALYST_PROMPT: &str = "You are an expert analyst. Your task is to provide a clear, concise, and comprehensive explanation of the following file content.";

/// Characters of an uploaded file shown to the model.
pub const FILE_EXCERPT_CHARS: usize = 10_000;

/// User entry asking for an explanation of `content`, cut to
/// [`FILE_EXCERPT_CHARS`] characters.
pub fn file_explanation_request(filename: &str, content: &str) -> String {
    let excerpt: String = content.chars().take(FILE_EXCERPT_CHARS).collect();
    format!(
        "Filename: {filename}\n\nFile Content:\n---\n{excerpt}\n---\n\nPlease provide a detailed explanation of this file. What is its purpose, what does it do, and what are the key components?"
    )
}

/// Build the capability prompt for a research session.
///
/// Every enabled tool is listed by its calling convention, including names
/// the registry does not know, so the model sees exactly what the request
/// asked for.
pub fn capability_prompt(registry: &ToolRegistry, enabled: &[String]) -> String {
    let tools_text = if enabled.is_empty() {
        "(no tools are enabled for this request)".to_string()
    } else {
        enabled
            .iter()
            .map(|name| format!("- {}", registry.describe(name)))
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        r#"You are a helpful research assistant that can answer questions and help with tasks.
You have access to the following tools:

{tools_text}

You may think before acting. Put your reasoning in this format:
<thinking>
[your reasoning about what to do next]
</thinking>

When you need to use a tool, respond in this format:
<tool>
{{"name": "tool_name", "args": {{"param": "value"}}}}
</tool>

Use at most one tool per response. Its result will be sent back to you.

When you have completed your research and are ready to provide a final answer, use this format:
<answer>
[your final comprehensive answer here]
</answer>

After conducting your research, synthesize the gathered information into a comprehensive and detailed report. Your final answer should be a well-structured summary of your findings, not just a list of links or brief summaries.

At the end of your final answer, always ask the user: "Would you like me to dive deeper into any specific aspect of this report?"
"#
    )
}
