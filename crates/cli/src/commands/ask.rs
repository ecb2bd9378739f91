//! `delve ask` — One question, streamed to the terminal.

use std::io::Write;
use std::sync::Arc;

use delve_agent::{DirectResponder, LoopSettings, ResearchLoop, StreamRecord, TurnEvent};
use delve_config::AppConfig;
use delve_core::message::Message;

pub struct AskOptions {
    pub message: String,
    pub research: bool,
    /// Tools to enable; `None` means the configured defaults.
    pub tools: Option<Vec<String>>,
    pub max_turns: Option<u32>,
}

pub async fn run(options: AskOptions) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if needs_api_key(&config.default_provider) && !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set DELVE_API_KEY or OPENAI_API_KEY, or add `api_key` to:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let router = delve_providers::build_from_config(&config);
    let provider = router.default().ok_or("No default provider configured")?;

    let mut settings = LoopSettings::from_config(&config);
    if let Some(max_turns) = options.max_turns {
        settings.max_turns = max_turns.max(1);
    }

    let history = vec![Message::user(options.message)];
    let mut out = std::io::stdout();

    if options.research {
        let tools = Arc::new(delve_tools::registry_from_config(&config.tools));
        let enabled = options
            .tools
            .unwrap_or_else(|| config.agent.default_tools.clone());
        let agent = Arc::new(ResearchLoop::new(provider, tools).with_settings(settings));

        let mut failure = None;
        let mut rx = agent.run_stream(history, enabled);
        while let Some(event) = rx.recv().await {
            if let TurnEvent::Error(message) = &event {
                failure = Some(message.clone());
            }
            if let Some(line) = render_event(&event) {
                writeln!(out, "{line}")?;
            }
        }

        if let Some(message) = failure {
            return Err(message.into());
        }
    } else {
        let responder = Arc::new(DirectResponder::from_settings(provider, &settings));
        let mut rx = responder.respond_stream(history);
        while let Some(record) = rx.recv().await {
            match record {
                StreamRecord::Content { content } => {
                    write!(out, "{content}")?;
                    out.flush()?;
                }
                StreamRecord::Error { content } => return Err(content.into()),
                StreamRecord::Done => writeln!(out)?,
                _ => {}
            }
        }
    }

    Ok(())
}

/// Local and scripted backends run without credentials.
fn needs_api_key(provider: &str) -> bool {
    !matches!(
        provider,
        "ollama" | "vllm" | "llamacpp" | "llama.cpp" | "scripted"
    )
}

/// One terminal line per event. `Done` prints nothing.
fn render_event(event: &TurnEvent) -> Option<String> {
    let line = match event {
        TurnEvent::Reasoning(text) => format!("💭 {text}"),
        TurnEvent::ToolCall(call) => format!(
            "🔧 {}({})",
            call.name,
            serde_json::Value::Object(call.arguments.clone())
        ),
        TurnEvent::ToolResult(outcome) => {
            format!("   ✅ {}", outcome.output.as_deref().unwrap_or_default())
        }
        TurnEvent::ToolFailure(outcome) => {
            format!("   ⚠️  {}", outcome.error.as_deref().unwrap_or_default())
        }
        TurnEvent::Answer(text) => format!("\n{text}"),
        TurnEvent::Error(message) => format!("❌ {message}"),
        TurnEvent::Done => return None,
    };
    Some(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use delve_core::tool::{ToolInvocation, ToolOutcome};

    fn search() -> ToolInvocation {
        let args = serde_json::json!({"query": "rust"})
            .as_object()
            .cloned()
            .unwrap();
        ToolInvocation::new("search", args)
    }

    #[test]
    fn renders_tool_call_with_args() {
        let line = render_event(&TurnEvent::ToolCall(search())).unwrap();
        assert_eq!(line, r#"🔧 search({"query":"rust"})"#);
    }

    #[test]
    fn renders_outcomes() {
        let ok = render_event(&TurnEvent::ToolResult(ToolOutcome::success(search(), "3 hits")));
        assert_eq!(ok.as_deref(), Some("   ✅ 3 hits"));

        let bad = render_event(&TurnEvent::ToolFailure(ToolOutcome::failure(search(), "down")));
        assert!(bad.unwrap().ends_with("down"));
    }

    #[test]
    fn done_is_silent() {
        assert!(render_event(&TurnEvent::Done).is_none());
        assert_eq!(
            render_event(&TurnEvent::Answer("Hi".into())).as_deref(),
            Some("\nHi")
        );
    }

    #[test]
    fn local_providers_skip_key_check() {
        assert!(needs_api_key("openai"));
        assert!(needs_api_key("openrouter"));
        assert!(!needs_api_key("ollama"));
        assert!(!needs_api_key("scripted"));
    }
}
