//! The research loop: one Model Client call per turn, at most one tool per
//! turn, every transition pushed to the caller as a [`TurnEvent`].

use crate::parser::{ParsedResponse, parse_response};
use crate::prompt::capability_prompt;
use crate::session::{LoopSession, SessionState};
use crate::stream_event::TurnEvent;
use delve_config::{ActionPrecedence, AppConfig};
use delve_core::message::{Conversation, Message};
use delve_core::provider::{Provider, ProviderRequest};
use delve_core::tool::{ToolInvocation, ToolOutcome, ToolRegistry};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Buffer between the loop and its consumer.
pub const EVENT_CHANNEL_CAPACITY: usize = 128;

/// Knobs shared by every session a [`ResearchLoop`] runs.
#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub max_turns: u32,
    pub precedence: ActionPrecedence,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            max_turns: 10,
            precedence: ActionPrecedence::default(),
            model: "gpt-4".into(),
            temperature: 0.7,
            max_tokens: None,
        }
    }
}

impl LoopSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_turns: config.agent.max_turns,
            precedence: config.agent.precedence,
            model: config.default_model.clone(),
            temperature: config.default_temperature,
            max_tokens: Some(config.default_max_tokens),
        }
    }
}

/// What a turn does after parsing.
#[derive(Debug, PartialEq)]
enum Step {
    Dispatch(ToolInvocation),
    Reject(ToolInvocation),
    Answer(String),
    Fallback,
}

/// The turn controller. Built once per process; stateless across requests.
pub struct ResearchLoop {
    provider: Arc<dyn Provider>,
    tools: Arc<ToolRegistry>,
    settings: LoopSettings,
}

impl ResearchLoop {
    pub fn new(provider: Arc<dyn Provider>, tools: Arc<ToolRegistry>) -> Self {
        Self {
            provider,
            tools,
            settings: LoopSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: LoopSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Set the turn limit.
    pub fn with_max_turns(mut self, max: u32) -> Self {
        self.settings.max_turns = max;
        self
    }

    /// Set tool/answer precedence for completions that carry both.
    pub fn with_precedence(mut self, precedence: ActionPrecedence) -> Self {
        self.settings.precedence = precedence;
        self
    }

    pub fn settings(&self) -> &LoopSettings {
        &self.settings
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Create a session: capability prompt for `enabled`, then `history`.
    pub fn start_session(&self, history: Vec<Message>, enabled: Vec<String>) -> LoopSession {
        let mut session = LoopSession::new(Conversation::new(), enabled, self.settings.max_turns);
        let prompt = capability_prompt(&self.tools, session.enabled_tools());
        session.append(Message::system(prompt));
        for message in history {
            session.append(message);
        }
        session
    }

    /// Drive `session` to a terminal state on the caller's task.
    ///
    /// Every exit except a consumer disconnect sends `Done` last.
    pub async fn run(
        &self,
        session: &mut LoopSession,
        events: &mpsc::Sender<TurnEvent>,
    ) -> SessionState {
        session.set_state(SessionState::Running);
        let state = self.drive(session, events).await;
        session.set_state(state);
        info!(
            ?state,
            turns = session.current_turn(),
            session_turns = session.max_turns(),
            "Research session finished"
        );
        state
    }

    /// Spawn a session on a Tokio task and hand back its event stream.
    /// Dropping the receiver stops the loop before its next Model Client
    /// call or tool dispatch.
    pub fn run_stream(
        self: Arc<Self>,
        history: Vec<Message>,
        enabled: Vec<String>,
    ) -> mpsc::Receiver<TurnEvent> {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        tokio::spawn(async move {
            let mut session = self.start_session(history, enabled);
            self.run(&mut session, &tx).await;
        });
        rx
    }

    async fn drive(
        &self,
        session: &mut LoopSession,
        events: &mpsc::Sender<TurnEvent>,
    ) -> SessionState {
        while session.has_turns_left() {
            if events.is_closed() {
                debug!("Event consumer closed; skipping Model Client call");
                return SessionState::Cancelled;
            }

            let turn = session.begin_turn();
            debug!(turn, session_turns = session.max_turns(), "Research turn");

            let request = ProviderRequest {
                model: self.settings.model.clone(),
                messages: session.conversation().messages().to_vec(),
                temperature: self.settings.temperature,
                max_tokens: self.settings.max_tokens,
                stream: false,
            };

            let completion = match self.provider.complete(request).await {
                Ok(response) => response.content,
                Err(e) => {
                    error!(turn, provider = self.provider.name(), error = %e, "Model Client failed");
                    let _ = events.send(TurnEvent::Error(e.to_string())).await;
                    let _ = events.send(TurnEvent::Done).await;
                    return SessionState::Failed;
                }
            };

            let parsed = parse_response(&completion);

            if let Some(reasoning) = parsed.reasoning.clone().filter(|r| !r.is_empty())
                && !emit(events, TurnEvent::Reasoning(reasoning)).await
            {
                return SessionState::Cancelled;
            }

            match select_step(self.settings.precedence, parsed, session) {
                Step::Dispatch(invocation) => {
                    info!(turn, tool = %invocation.name, "Dispatching tool");
                    if !emit(events, TurnEvent::ToolCall(invocation.clone())).await {
                        return SessionState::Cancelled;
                    }
                    if events.is_closed() {
                        debug!(turn, tool = %invocation.name, "Event consumer closed; skipping dispatch");
                        return SessionState::Cancelled;
                    }

                    let outcome = self.tools.dispatch(&invocation).await;
                    session.append(Message::assistant(completion));
                    session.append(Message::user(outcome.observation()));

                    let event = if outcome.succeeded {
                        TurnEvent::ToolResult(outcome)
                    } else {
                        TurnEvent::ToolFailure(outcome)
                    };
                    if !emit(events, event).await {
                        return SessionState::Cancelled;
                    }
                }
                Step::Reject(invocation) => {
                    warn!(turn, tool = %invocation.name, "Model named a tool that is not enabled");
                    let message = format!("Tool '{}' is unknown or not enabled", invocation.name);
                    let outcome = ToolOutcome::failure(invocation, message);
                    session.append(Message::assistant(completion));
                    session.append(Message::user(outcome.observation()));

                    if !emit(events, TurnEvent::ToolFailure(outcome)).await {
                        return SessionState::Cancelled;
                    }
                }
                Step::Answer(text) => {
                    session.append(Message::assistant(completion));
                    return finish_with_answer(events, text).await;
                }
                Step::Fallback => {
                    debug!(turn, "No actionable markers; using raw completion as answer");
                    let text = completion.trim().to_string();
                    session.append(Message::assistant(completion));
                    return finish_with_answer(events, text).await;
                }
            }
        }

        warn!(
            session_turns = session.max_turns(),
            "Turn limit reached without an answer"
        );
        let _ = events.send(TurnEvent::Done).await;
        SessionState::Exhausted
    }
}

async fn finish_with_answer(events: &mpsc::Sender<TurnEvent>, text: String) -> SessionState {
    if !emit(events, TurnEvent::Answer(text)).await {
        return SessionState::Cancelled;
    }
    let _ = events.send(TurnEvent::Done).await;
    SessionState::Answered
}

/// Send one event. `false` means the consumer is gone.
async fn emit(events: &mpsc::Sender<TurnEvent>, event: TurnEvent) -> bool {
    let kind = event.kind();
    if events.send(event).await.is_err() {
        debug!(kind, "Event consumer gone");
        return false;
    }
    true
}

fn select_step(
    precedence: ActionPrecedence,
    parsed: ParsedResponse,
    session: &LoopSession,
) -> Step {
    let ParsedResponse { tool, answer, .. } = parsed;
    let enabled = tool.as_ref().is_some_and(|t| session.is_enabled(&t.name));

    match (precedence, tool, answer) {
        (ActionPrecedence::ToolFirst, Some(tool), _) if enabled => Step::Dispatch(tool),
        (ActionPrecedence::ToolFirst, _, Some(answer)) => Step::Answer(answer),
        (ActionPrecedence::AnswerFirst, _, Some(answer)) => Step::Answer(answer),
        (ActionPrecedence::AnswerFirst, Some(tool), None) if enabled => Step::Dispatch(tool),
        (_, Some(tool), None) => Step::Reject(tool),
        (_, None, None) => Step::Fallback,
    }
}
