//! Scripted Model Client.
//!
//! Replays a fixed queue of completions in order and records every request
//! it receives. Moderation flags any text containing one of a configured set
//! of terms. Used by tests throughout the workspace and selectable from
//! config as provider `"scripted"` for offline runs.

use async_trait::async_trait;
use delve_core::error::ProviderError;
use delve_core::message::Message;
use delve_core::provider::*;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// One scripted step: either a completion text or a fault.
pub type ScriptStep = std::result::Result<String, ProviderError>;

/// A provider that returns pre-programmed completions in sequence.
///
/// Once the script runs out every further call fails with
/// [`ProviderError::ScriptExhausted`].
pub struct ScriptedProvider {
    steps: Mutex<VecDeque<ScriptStep>>,
    requests: Mutex<Vec<Vec<Message>>>,
    call_count: AtomicUsize,
    flagged_terms: Vec<String>,
}

impl ScriptedProvider {
    /// Script of plain completions.
    pub fn new<I, S>(completions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_steps(completions.into_iter().map(|c| Ok(c.into())))
    }

    /// Script that may include faults.
    pub fn from_steps(steps: impl IntoIterator<Item = ScriptStep>) -> Self {
        Self {
            steps: Mutex::new(steps.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
            call_count: AtomicUsize::new(0),
            flagged_terms: Vec::new(),
        }
    }

    /// Flag any moderated text containing one of `terms` (case-insensitive).
    pub fn flagging<I, S>(mut self, terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.flagged_terms = terms
            .into_iter()
            .map(|t| t.into().to_lowercase())
            .collect();
        self
    }

    /// How many completions have been requested so far.
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// The conversation sent with each request, in call order.
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    fn next_step(&self, request: &ProviderRequest) -> ScriptStep {
        let n = self.call_count.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.messages.clone());
        }
        self.steps
            .lock()
            .ok()
            .and_then(|mut steps| steps.pop_front())
            .unwrap_or(Err(ProviderError::ScriptExhausted(n)))
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let content = self.next_step(&request)?;
        Ok(ProviderResponse {
            content,
            usage: None,
            model: request.model,
        })
    }

    async fn moderate(&self, text: &str) -> std::result::Result<bool, ProviderError> {
        let text = text.to_lowercase();
        Ok(self.flagged_terms.iter().any(|term| text.contains(term)))
    }

    /// Streams the next scripted completion split at word boundaries.
    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<
        tokio::sync::mpsc::Receiver<std::result::Result<StreamChunk, ProviderError>>,
        ProviderError,
    > {
        let content = self.next_step(&request)?;
        let pieces: Vec<String> = content
            .split_inclusive(char::is_whitespace)
            .map(str::to_string)
            .collect();

        let (tx, rx) = tokio::sync::mpsc::channel(pieces.len() + 1);
        for piece in pieces {
            let _ = tx
                .send(Ok(StreamChunk {
                    content: Some(piece),
                    done: false,
                    usage: None,
                }))
                .await;
        }
        let _ = tx
            .send(Ok(StreamChunk {
                content: None,
                done: true,
                usage: None,
            }))
            .await;
        Ok(rx)
    }
}
