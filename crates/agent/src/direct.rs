//! Single-shot responder.
//!
//! For requests that do not ask for research, and for uploaded files: one
//! streamed completion under a fixed system prompt, relayed chunk by chunk
//! as `content` records. No tools, no markers.

use crate::encoder::StreamRecord;
use crate::loop_runner::LoopSettings;
use crate::prompt::{CONVERSATIONAL_PROMPT, FILE_ANALYST_PROMPT, file_explanation_request};
use crate::session::SessionState;
use delve_core::message::Message;
use delve_core::provider::{Provider, ProviderRequest};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error};

/// Sampling temperature for file explanations.
const FILE_TEMPERATURE: f32 = 0.5;

pub struct DirectResponder {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
}

impl DirectResponder {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
        }
    }

    /// Share model parameters with the research loop.
    pub fn from_settings(provider: Arc<dyn Provider>, settings: &LoopSettings) -> Self {
        Self {
            provider,
            model: settings.model.clone(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Stream one reply to `history` into `records`.
    ///
    /// Emits `start_answer`, one `content` per chunk, then `done`. A Model
    /// Client failure emits `error` then `done`.
    pub async fn respond(
        &self,
        history: Vec<Message>,
        records: &mpsc::Sender<StreamRecord>,
    ) -> SessionState {
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(Message::system(CONVERSATIONAL_PROMPT));
        messages.extend(history);
        self.relay(messages, self.temperature, records).await
    }

    /// Stream an explanation of an uploaded file, with the same record
    /// sequence as [`respond`](Self::respond).
    pub async fn explain(
        &self,
        filename: &str,
        content: &str,
        records: &mpsc::Sender<StreamRecord>,
    ) -> SessionState {
        let messages = vec![
            Message::system(FILE_ANALYST_PROMPT),
            Message::user(file_explanation_request(filename, content)),
        ];
        self.relay(messages, FILE_TEMPERATURE, records).await
    }

    /// Spawn [`respond`](Self::respond) on a Tokio task.
    pub fn respond_stream(self: Arc<Self>, history: Vec<Message>) -> mpsc::Receiver<StreamRecord> {
        let (tx, rx) = mpsc::channel(crate::loop_runner::EVENT_CHANNEL_CAPACITY);
        tokio::spawn(async move {
            self.respond(history, &tx).await;
        });
        rx
    }

    /// Spawn [`explain`](Self::explain) on a Tokio task.
    pub fn explain_stream(
        self: Arc<Self>,
        filename: String,
        content: String,
    ) -> mpsc::Receiver<StreamRecord> {
        let (tx, rx) = mpsc::channel(crate::loop_runner::EVENT_CHANNEL_CAPACITY);
        tokio::spawn(async move {
            self.explain(&filename, &content, &tx).await;
        });
        rx
    }

    async fn relay(
        &self,
        messages: Vec<Message>,
        temperature: f32,
        records: &mpsc::Sender<StreamRecord>,
    ) -> SessionState {
        if records.is_closed() {
            debug!("Record consumer closed; skipping Model Client call");
            return SessionState::Cancelled;
        }

        let request = ProviderRequest {
            model: self.model.clone(),
            messages,
            temperature,
            max_tokens: self.max_tokens,
            stream: true,
        };

        let mut chunks = match self.provider.stream(request).await {
            Ok(rx) => rx,
            Err(e) => return fail(records, e.to_string()).await,
        };

        if records.send(StreamRecord::StartAnswer).await.is_err() {
            return SessionState::Cancelled;
        }

        while let Some(chunk) = chunks.recv().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => return fail(records, e.to_string()).await,
            };

            if let Some(content) = chunk.content.filter(|c| !c.is_empty())
                && records
                    .send(StreamRecord::Content { content })
                    .await
                    .is_err()
            {
                debug!("Record consumer gone; abandoning reply stream");
                return SessionState::Cancelled;
            }

            if chunk.done {
                break;
            }
        }

        let _ = records.send(StreamRecord::Done).await;
        SessionState::Answered
    }
}

async fn fail(records: &mpsc::Sender<StreamRecord>, message: String) -> SessionState {
    error!(error = %message, "Single-shot completion failed");
    let _ = records.send(StreamRecord::Error { content: message }).await;
    let _ = records.send(StreamRecord::Done).await;
    SessionState::Failed
}

#[cfg(test)]
mod tests {
    use super::*;
    use delve_core::message::Role;
    use delve_providers::ScriptedProvider;

    async fn collect(mut rx: mpsc::Receiver<StreamRecord>) -> Vec<StreamRecord> {
        let mut records = vec![];
        while let Some(r) = rx.recv().await {
            records.push(r);
        }
        records
    }

    #[tokio::test]
    async fn streams_chunks_between_start_and_done() {
        let provider = Arc::new(ScriptedProvider::new(["Hi there!"]));
        let responder = Arc::new(DirectResponder::new(provider.clone(), "gpt-4"));

        let records = collect(responder.respond_stream(vec![Message::user("hello")])).await;

        assert_eq!(
            records,
            vec![
                StreamRecord::StartAnswer,
                StreamRecord::Content { content: "Hi ".into() },
                StreamRecord::Content { content: "there!".into() },
                StreamRecord::Done,
            ]
        );

        let sent = &provider.requests()[0];
        assert_eq!(sent[0].role, Role::System);
        assert_eq!(sent[0].content, CONVERSATIONAL_PROMPT);
        assert_eq!(sent[1], Message::user("hello"));
    }

    #[tokio::test]
    async fn failure_emits_error_then_done() {
        let provider = Arc::new(ScriptedProvider::new(Vec::<String>::new()));
        let responder = DirectResponder::new(provider, "gpt-4");

        let (tx, rx) = mpsc::channel(8);
        let state = responder.respond(vec![Message::user("hello")], &tx).await;
        drop(tx);

        assert_eq!(state, SessionState::Failed);
        assert_eq!(
            collect(rx).await,
            vec![
                StreamRecord::Error {
                    content: "Script exhausted after 0 completions".into()
                },
                StreamRecord::Done,
            ]
        );
    }

    #[tokio::test]
    async fn closed_consumer_is_cancelled_without_a_call() {
        let provider = Arc::new(ScriptedProvider::new(["unused reply"]));
        let responder = DirectResponder::new(provider.clone(), "gpt-4");

        let (tx, rx) = mpsc::channel(8);
        drop(rx);
        let state = responder.respond(vec![Message::user("hello")], &tx).await;
        assert_eq!(state, SessionState::Cancelled);
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn explains_uploaded_file() {
        let provider = Arc::new(ScriptedProvider::new(["It is a config file."]));
        let responder = Arc::new(DirectResponder::new(provider.clone(), "gpt-4"));

        let records = collect(
            responder.explain_stream("app.toml".into(), "[server]\nport = 80".into()),
        )
        .await;

        assert_eq!(records.first(), Some(&StreamRecord::StartAnswer));
        assert_eq!(records.last(), Some(&StreamRecord::Done));
        assert_eq!(records.len(), 2 + 5);

        let sent = &provider.requests()[0];
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].content, FILE_ANALYST_PROMPT);
        assert!(sent[1].content.starts_with("Filename: app.toml"));
        assert!(sent[1].content.contains("port = 80"));
    }

    #[test]
    fn takes_model_parameters_from_settings() {
        let settings = LoopSettings {
            model: "gpt-4o-mini".into(),
            temperature: 0.2,
            max_tokens: Some(256),
            ..Default::default()
        };
        let responder = DirectResponder::from_settings(
            Arc::new(ScriptedProvider::new(Vec::<String>::new())),
            &settings,
        )
        .with_temperature(0.3);
        assert_eq!(responder.model, "gpt-4o-mini");
        assert_eq!(responder.max_tokens, Some(256));
        assert!((responder.temperature - 0.3).abs() < f32::EPSILON);
    }
}
