//! Turn events.
//!
//! `TurnEvent` is the only externally observable artifact of a research
//! turn. The loop pushes them into an `mpsc` channel in emission order; the
//! encoder turns each one into one or more wire records.

use delve_core::tool::{ToolInvocation, ToolOutcome};

/// Events emitted by the research loop.
///
/// - `Reasoning`   — the model's thinking block for this turn
/// - `ToolCall`    — an enabled tool is about to run
/// - `ToolResult`  — the tool ran and produced output
/// - `ToolFailure` — the tool failed, or the model named a tool it may not use
/// - `Answer`      — final answer text
/// - `Done`        — the session is over
/// - `Error`       — the Model Client failed; `Done` follows
#[derive(Debug, Clone, PartialEq)]
pub enum TurnEvent {
    Reasoning(String),
    ToolCall(ToolInvocation),
    ToolResult(ToolOutcome),
    ToolFailure(ToolOutcome),
    Answer(String),
    Done,
    Error(String),
}

impl TurnEvent {
    /// Short name for logs and assertions.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Reasoning(_) => "reasoning",
            Self::ToolCall(_) => "tool_call",
            Self::ToolResult(_) => "tool_result",
            Self::ToolFailure(_) => "tool_failure",
            Self::Answer(_) => "answer",
            Self::Done => "done",
            Self::Error(_) => "error",
        }
    }

    /// Whether nothing may follow this event.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use delve_core::tool::ToolArgs;

    #[test]
    fn event_kind_names() {
        let call = ToolInvocation::new("search", ToolArgs::new());
        assert_eq!(TurnEvent::Reasoning("x".into()).kind(), "reasoning");
        assert_eq!(TurnEvent::ToolCall(call.clone()).kind(), "tool_call");
        assert_eq!(
            TurnEvent::ToolResult(ToolOutcome::success(call.clone(), "ok")).kind(),
            "tool_result"
        );
        assert_eq!(
            TurnEvent::ToolFailure(ToolOutcome::failure(call, "no")).kind(),
            "tool_failure"
        );
        assert_eq!(TurnEvent::Answer("a".into()).kind(), "answer");
        assert_eq!(TurnEvent::Done.kind(), "done");
        assert_eq!(TurnEvent::Error("e".into()).kind(), "error");
    }

    #[test]
    fn only_done_is_terminal() {
        assert!(TurnEvent::Done.is_terminal());
        assert!(!TurnEvent::Error("boom".into()).is_terminal());
        assert!(!TurnEvent::Answer("a".into()).is_terminal());
    }
}
