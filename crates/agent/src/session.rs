//! Per-request session record.

use delve_core::message::{Conversation, Message};
use serde::{Deserialize, Serialize};

/// Lifecycle of a [`LoopSession`].
///
/// `Idle → Running → {Answered, Exhausted, Failed, Cancelled}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Running,
    /// An answer (explicit or fallback) was produced.
    Answered,
    /// The turn limit was hit without an answer.
    Exhausted,
    /// The Model Client failed.
    Failed,
    /// The consumer went away.
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Idle | Self::Running)
    }
}

/// Mutable state of one research request.
///
/// Owns the conversation for the lifetime of the request. Prior entries are
/// never rewritten; the loop only appends.
#[derive(Debug, Clone)]
pub struct LoopSession {
    conversation: Conversation,
    enabled_tools: Vec<String>,
    max_turns: u32,
    current_turn: u32,
    state: SessionState,
}

impl LoopSession {
    /// `enabled_tools` is deduplicated, keeping first occurrence order.
    pub fn new(conversation: Conversation, enabled_tools: Vec<String>, max_turns: u32) -> Self {
        let mut unique: Vec<String> = Vec::with_capacity(enabled_tools.len());
        for name in enabled_tools {
            if !unique.contains(&name) {
                unique.push(name);
            }
        }
        Self {
            conversation,
            enabled_tools: unique,
            max_turns,
            current_turn: 0,
            state: SessionState::Idle,
        }
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn enabled_tools(&self) -> &[String] {
        &self.enabled_tools
    }

    pub fn is_enabled(&self, tool: &str) -> bool {
        self.enabled_tools.iter().any(|t| t == tool)
    }

    pub fn max_turns(&self) -> u32 {
        self.max_turns
    }

    pub fn current_turn(&self) -> u32 {
        self.current_turn
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn has_turns_left(&self) -> bool {
        self.current_turn < self.max_turns
    }

    pub(crate) fn begin_turn(&mut self) -> u32 {
        self.current_turn += 1;
        self.current_turn
    }

    pub(crate) fn append(&mut self, message: Message) {
        self.conversation.push(message);
    }

    pub(crate) fn set_state(&mut self, state: SessionState) {
        self.state = state;
    }
}
