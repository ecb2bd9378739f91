//! Event stream encoder.
//!
//! Turns [`TurnEvent`]s into wire records. The gateway frames each record as
//! one server-sent-events line:
//!
//! ```text
//! data: {"type":"tool_call","tool":"search","args":{"query":"rust"}}
//!
//! ```
//!
//! Records are forwarded in emission order, one at a time, with no
//! batching. The decode side ([`RecordDecoder`], [`collect_events`]) exists
//! for consumers such as the CLI and for tests.

use crate::stream_event::TurnEvent;
use delve_config::{AgentConfig, AnswerChunking};
use delve_core::tool::{ToolArgs, ToolInvocation, ToolOutcome};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

/// Buffer between an encoder pump and the transport.
pub const RECORD_CHANNEL_CAPACITY: usize = 64;

/// One wire record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamRecord {
    Thinking { content: String },
    ToolCall { tool: String, args: serde_json::Value },
    ToolResult { tool: String, result: String },
    ToolError { tool: String, error: String },
    StartAnswer,
    Content { content: String },
    Done,
    Error { content: String },
}

impl StreamRecord {
    /// The `type` discriminant as written on the wire.
    pub fn record_type(&self) -> &'static str {
        match self {
            Self::Thinking { .. } => "thinking",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::ToolError { .. } => "tool_error",
            Self::StartAnswer => "start_answer",
            Self::Content { .. } => "content",
            Self::Done => "done",
            Self::Error { .. } => "error",
        }
    }
}

/// Split an answer for streaming. Whitespace stays attached to the word
/// before it, so concatenating the pieces gives back `text` exactly.
pub fn answer_pieces(text: &str, chunking: AnswerChunking) -> Vec<String> {
    match chunking {
        AnswerChunking::Whole => vec![text.to_string()],
        AnswerChunking::Words => text
            .split_inclusive(char::is_whitespace)
            .map(str::to_string)
            .collect(),
    }
}

/// Wire records for one event.
pub fn records_for(event: &TurnEvent, chunking: AnswerChunking) -> Vec<StreamRecord> {
    match event {
        TurnEvent::Reasoning(text) => vec![StreamRecord::Thinking {
            content: text.clone(),
        }],
        TurnEvent::ToolCall(call) => vec![StreamRecord::ToolCall {
            tool: call.name.clone(),
            args: serde_json::Value::Object(call.arguments.clone()),
        }],
        TurnEvent::ToolResult(outcome) => vec![StreamRecord::ToolResult {
            tool: outcome.invocation.name.clone(),
            result: outcome.output.clone().unwrap_or_default(),
        }],
        TurnEvent::ToolFailure(outcome) => vec![StreamRecord::ToolError {
            tool: outcome.invocation.name.clone(),
            error: outcome.error.clone().unwrap_or_default(),
        }],
        TurnEvent::Answer(text) => {
            let mut records = vec![StreamRecord::StartAnswer];
            records.extend(
                answer_pieces(text, chunking)
                    .into_iter()
                    .map(|content| StreamRecord::Content { content }),
            );
            records
        }
        TurnEvent::Done => vec![StreamRecord::Done],
        TurnEvent::Error(message) => vec![StreamRecord::Error {
            content: message.clone(),
        }],
    }
}

/// Pumps events or records into a frame channel.
#[derive(Debug, Clone)]
pub struct EventStreamEncoder {
    chunking: AnswerChunking,
    word_delay: Duration,
}

impl Default for EventStreamEncoder {
    fn default() -> Self {
        Self::new(AnswerChunking::default())
    }
}

impl EventStreamEncoder {
    pub fn new(chunking: AnswerChunking) -> Self {
        Self {
            chunking,
            word_delay: Duration::ZERO,
        }
    }

    pub fn from_config(config: &AgentConfig) -> Self {
        Self::new(config.answer_chunking)
            .with_word_delay(Duration::from_millis(config.word_delay_ms))
    }

    /// Pause between consecutive word records.
    pub fn with_word_delay(mut self, delay: Duration) -> Self {
        self.word_delay = delay;
        self
    }

    pub fn chunking(&self) -> AnswerChunking {
        self.chunking
    }

    /// Forward every event until the loop finishes or `records` closes.
    ///
    /// A closed sink is noticed even while no event is pending; the pump
    /// then returns and drops `events`, which the loop sees before its next
    /// Model Client call or tool dispatch.
    pub async fn pump_events(
        &self,
        mut events: mpsc::Receiver<TurnEvent>,
        records: mpsc::Sender<StreamRecord>,
    ) {
        loop {
            let event = tokio::select! {
                biased;
                _ = records.closed() => {
                    debug!("Record sink closed; stopping event pump");
                    return;
                }
                event = events.recv() => match event {
                    Some(event) => event,
                    None => return,
                },
            };

            if !self.forward(records_for(&event, self.chunking), &records).await {
                debug!(kind = event.kind(), "Record sink closed; stopping event pump");
                return;
            }
        }
    }

    /// Forward pre-built records (single-shot mode) until the producer
    /// finishes or `out` closes.
    pub async fn pump_records(
        &self,
        mut records: mpsc::Receiver<StreamRecord>,
        out: mpsc::Sender<StreamRecord>,
    ) {
        loop {
            let record = tokio::select! {
                biased;
                _ = out.closed() => {
                    debug!("Record sink closed; stopping record pump");
                    return;
                }
                record = records.recv() => match record {
                    Some(record) => record,
                    None => return,
                },
            };

            if out.send(record).await.is_err() {
                debug!("Record sink closed; stopping record pump");
                return;
            }
        }
    }

    /// Spawn [`pump_events`](Self::pump_events) and return the record stream.
    pub fn spawn_events(&self, events: mpsc::Receiver<TurnEvent>) -> mpsc::Receiver<StreamRecord> {
        let (tx, rx) = mpsc::channel(RECORD_CHANNEL_CAPACITY);
        let encoder = self.clone();
        tokio::spawn(async move { encoder.pump_events(events, tx).await });
        rx
    }

    /// Spawn [`pump_records`](Self::pump_records) and return the record stream.
    pub fn spawn_records(&self, records: mpsc::Receiver<StreamRecord>) -> mpsc::Receiver<StreamRecord> {
        let (tx, rx) = mpsc::channel(RECORD_CHANNEL_CAPACITY);
        let encoder = self.clone();
        tokio::spawn(async move { encoder.pump_records(records, tx).await });
        rx
    }

    /// Send `batch` in order, pacing word records. `false` means the sink
    /// is gone.
    async fn forward(&self, batch: Vec<StreamRecord>, out: &mpsc::Sender<StreamRecord>) -> bool {
        let pace = self.chunking == AnswerChunking::Words && !self.word_delay.is_zero();
        let mut previous_was_content = false;

        for record in batch {
            let is_content = matches!(record, StreamRecord::Content { .. });
            if pace && is_content && previous_was_content {
                tokio::select! {
                    biased;
                    _ = out.closed() => return false,
                    _ = tokio::time::sleep(self.word_delay) => {}
                }
            }
            previous_was_content = is_content;

            if out.send(record).await.is_err() {
                return false;
            }
        }
        true
    }
}

/// Incremental decoder for the framed stream.
///
/// Transport chunks may split a frame anywhere, including inside a
/// multi-byte character; the decoder keeps raw bytes until the blank-line
/// terminator arrives and only then decodes the frame.
#[derive(Debug, Default)]
pub struct RecordDecoder {
    buffer: Vec<u8>,
}

impl RecordDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one transport chunk and return every record it completed.
    pub fn push(&mut self, chunk: &[u8]) -> delve_core::Result<Vec<StreamRecord>> {
        self.buffer.extend_from_slice(chunk);
        let mut records = Vec::new();

        while let Some(end) = frame_end(&self.buffer) {
            let frame: Vec<u8> = self.buffer.drain(..end + 2).collect();
            for line in std::str::from_utf8(&frame)?.lines() {
                // Comments and other SSE fields carry no records.
                let Some(data) = line.strip_prefix("data:") else {
                    continue;
                };
                records.push(serde_json::from_str(data.trim_start())?);
            }
        }

        Ok(records)
    }

    /// Bytes received that do not yet form a complete frame.
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }
}

fn frame_end(bytes: &[u8]) -> Option<usize> {
    bytes.windows(2).position(|pair| pair == b"\n\n")
}

/// Decode a complete framed body.
pub fn decode_all(body: impl AsRef<[u8]>) -> delve_core::Result<Vec<StreamRecord>> {
    RecordDecoder::new().push(body.as_ref())
}

/// Fold wire records back into turn events.
///
/// `start_answer` and the `content` records after it become one `Answer`.
/// Tool results are paired with the arguments of the preceding `tool_call`
/// for the same tool.
pub fn collect_events(records: &[StreamRecord]) -> Vec<TurnEvent> {
    let mut events = Vec::new();
    let mut answer: Option<String> = None;
    let mut last_call: Option<ToolInvocation> = None;

    let invocation_for = |tool: &str, last_call: &Option<ToolInvocation>| match last_call {
        Some(call) if call.name == tool => call.clone(),
        _ => ToolInvocation::new(tool, ToolArgs::new()),
    };

    for record in records {
        if !matches!(record, StreamRecord::Content { .. })
            && let Some(text) = answer.take()
        {
            events.push(TurnEvent::Answer(text));
        }

        match record {
            StreamRecord::Thinking { content } => {
                events.push(TurnEvent::Reasoning(content.clone()));
            }
            StreamRecord::ToolCall { tool, args } => {
                let call = ToolInvocation::new(
                    tool.clone(),
                    args.as_object().cloned().unwrap_or_default(),
                );
                last_call = Some(call.clone());
                events.push(TurnEvent::ToolCall(call));
            }
            StreamRecord::ToolResult { tool, result } => {
                let call = invocation_for(tool, &last_call);
                events.push(TurnEvent::ToolResult(ToolOutcome::success(
                    call,
                    result.clone(),
                )));
            }
            StreamRecord::ToolError { tool, error } => {
                let call = invocation_for(tool, &last_call);
                events.push(TurnEvent::ToolFailure(ToolOutcome::failure(
                    call,
                    error.clone(),
                )));
            }
            StreamRecord::StartAnswer => answer = Some(String::new()),
            StreamRecord::Content { content } => {
                answer.get_or_insert_with(String::new).push_str(content);
            }
            StreamRecord::Done => events.push(TurnEvent::Done),
            StreamRecord::Error { content } => events.push(TurnEvent::Error(content.clone())),
        }
    }

    if let Some(text) = answer {
        events.push(TurnEvent::Answer(text));
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(value: serde_json::Value) -> ToolArgs {
        value.as_object().cloned().unwrap_or_default()
    }

    fn search_call() -> ToolInvocation {
        ToolInvocation::new("search", args(json!({"query": "rust"})))
    }

    /// Frame a record the way the gateway writes it.
    fn frame(record: &StreamRecord) -> String {
        format!("data: {}\n\n", serde_json::to_string(record).unwrap())
    }

    fn research_events() -> Vec<TurnEvent> {
        vec![
            TurnEvent::Reasoning("Look it up".into()),
            TurnEvent::ToolCall(search_call()),
            TurnEvent::ToolResult(ToolOutcome::success(search_call(), "1. **Rust**")),
            TurnEvent::ToolFailure(ToolOutcome::failure(
                ToolInvocation::new("send_email", ToolArgs::new()),
                "Tool 'send_email' is unknown or not enabled",
            )),
            TurnEvent::Answer("Rust is a systems language.\nWant more?".into()),
            TurnEvent::Done,
        ]
    }

    #[test]
    fn wire_shapes() {
        let cases = [
            (
                StreamRecord::Thinking { content: "hm".into() },
                r#"{"type":"thinking","content":"hm"}"#,
            ),
            (
                StreamRecord::ToolCall {
                    tool: "search".into(),
                    args: json!({"query": "rust"}),
                },
                r#"{"type":"tool_call","tool":"search","args":{"query":"rust"}}"#,
            ),
            (
                StreamRecord::ToolResult {
                    tool: "search".into(),
                    result: "ok".into(),
                },
                r#"{"type":"tool_result","tool":"search","result":"ok"}"#,
            ),
            (
                StreamRecord::ToolError {
                    tool: "x".into(),
                    error: "bad".into(),
                },
                r#"{"type":"tool_error","tool":"x","error":"bad"}"#,
            ),
            (StreamRecord::StartAnswer, r#"{"type":"start_answer"}"#),
            (
                StreamRecord::Content { content: "Hi ".into() },
                r#"{"type":"content","content":"Hi "}"#,
            ),
            (StreamRecord::Done, r#"{"type":"done"}"#),
            (
                StreamRecord::Error { content: "boom".into() },
                r#"{"type":"error","content":"boom"}"#,
            ),
        ];

        for (record, expected) in cases {
            assert_eq!(serde_json::to_string(&record).unwrap(), expected);
            assert!(expected.contains(&format!(r#""type":"{}""#, record.record_type())));
        }
    }

    #[test]
    fn record_json_never_contains_raw_newlines() {
        let json = serde_json::to_string(&StreamRecord::Content {
            content: "line one\nline two".into(),
        })
        .unwrap();
        assert!(!json.contains('\n'));
    }

    #[test]
    fn word_pieces_reassemble_exactly() {
        let text = "Paris  is\tsunny.\nBring  shades ";
        let pieces = answer_pieces(text, AnswerChunking::Words);
        assert_eq!(pieces.concat(), text);
        assert_eq!(pieces[0], "Paris ");
        assert!(pieces.len() > 4);
    }

    #[test]
    fn whole_chunking_is_one_piece() {
        assert_eq!(
            answer_pieces("a b c", AnswerChunking::Whole),
            vec!["a b c".to_string()]
        );
    }

    #[test]
    fn answer_records_start_with_start_answer() {
        let records = records_for(
            &TurnEvent::Answer("Paris is sunny.".into()),
            AnswerChunking::Words,
        );
        assert_eq!(
            records,
            vec![
                StreamRecord::StartAnswer,
                StreamRecord::Content { content: "Paris ".into() },
                StreamRecord::Content { content: "is ".into() },
                StreamRecord::Content { content: "sunny.".into() },
            ]
        );
    }

    #[test]
    fn tool_failure_maps_to_tool_error() {
        let records = records_for(
            &TurnEvent::ToolFailure(ToolOutcome::failure(search_call(), "timeout")),
            AnswerChunking::Words,
        );
        assert_eq!(
            records,
            vec![StreamRecord::ToolError {
                tool: "search".into(),
                error: "timeout".into()
            }]
        );
    }

    #[test]
    fn decoder_handles_split_frames() {
        let expected = vec![
            StreamRecord::Thinking { content: "a".into() },
            StreamRecord::Content { content: "café über naïve".into() },
            StreamRecord::Done,
        ];
        let body: String = expected.iter().map(frame).collect();

        // Three-byte chunks cut through every two-byte character.
        let mut decoder = RecordDecoder::new();
        let mut records = vec![];
        for chunk in body.as_bytes().chunks(3) {
            records.extend(decoder.push(chunk).unwrap());
        }

        assert_eq!(records, expected);
        assert!(decoder.pending().is_empty());
    }

    #[test]
    fn decoder_keeps_incomplete_tail() {
        let mut decoder = RecordDecoder::new();
        assert!(decoder.push(br#"data: {"type":"do"#).unwrap().is_empty());
        assert_eq!(decoder.pending(), br#"data: {"type":"do"#);
        assert_eq!(
            decoder.push(b"ne\"}\n\n").unwrap(),
            vec![StreamRecord::Done]
        );
    }

    #[test]
    fn decoder_skips_comments_and_rejects_garbage() {
        let mut decoder = RecordDecoder::new();
        assert!(decoder.push(b":\n\n").unwrap().is_empty());
        assert!(decoder.push(b"data: not json\n\n").is_err());
        assert!(decode_all(b"data: \xff\xfe\n\n").is_err());
    }

    #[test]
    fn events_survive_the_wire() {
        let events = research_events();
        let body: String = events
            .iter()
            .flat_map(|e| records_for(e, AnswerChunking::Words))
            .map(|r| frame(&r))
            .collect();

        let records = decode_all(&body).unwrap();
        assert_eq!(collect_events(&records), events);
    }

    #[test]
    fn collect_folds_streamed_answer() {
        let records = vec![
            StreamRecord::StartAnswer,
            StreamRecord::Content { content: "Hello ".into() },
            StreamRecord::Content { content: "world".into() },
            StreamRecord::Done,
        ];
        assert_eq!(
            collect_events(&records),
            vec![TurnEvent::Answer("Hello world".into()), TurnEvent::Done]
        );
    }

    #[test]
    fn collect_error_then_done() {
        let records = vec![
            StreamRecord::Error { content: "boom".into() },
            StreamRecord::Done,
        ];
        assert_eq!(
            collect_events(&records),
            vec![TurnEvent::Error("boom".into()), TurnEvent::Done]
        );
    }

    async fn drain(mut records: mpsc::Receiver<StreamRecord>) -> Vec<StreamRecord> {
        let mut out = Vec::new();
        while let Some(record) = records.recv().await {
            out.push(record);
        }
        out
    }

    #[tokio::test]
    async fn pump_preserves_order() {
        let (tx, rx) = mpsc::channel(16);
        for event in research_events() {
            tx.send(event).await.unwrap();
        }
        drop(tx);

        let encoder = EventStreamEncoder::new(AnswerChunking::Whole);
        let types: Vec<&str> = drain(encoder.spawn_events(rx))
            .await
            .iter()
            .map(|r| r.record_type())
            .collect();

        assert_eq!(
            types,
            vec![
                "thinking",
                "tool_call",
                "tool_result",
                "tool_error",
                "start_answer",
                "content",
                "done"
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn word_delay_paces_content_records() {
        let (tx, rx) = mpsc::channel(4);
        tx.send(TurnEvent::Answer("one two three".into())).await.unwrap();
        drop(tx);

        let encoder = EventStreamEncoder::new(AnswerChunking::Words)
            .with_word_delay(Duration::from_millis(50));
        let start = tokio::time::Instant::now();
        let records = drain(encoder.spawn_events(rx)).await;

        assert_eq!(records.len(), 4);
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn closed_sink_drops_event_receiver() {
        let (event_tx, event_rx) = mpsc::channel(4);
        let (record_tx, record_rx) = mpsc::channel(4);
        drop(record_rx);

        event_tx.send(TurnEvent::Done).await.unwrap();
        EventStreamEncoder::default()
            .pump_events(event_rx, record_tx)
            .await;

        assert!(event_tx.is_closed());
        assert!(event_tx.send(TurnEvent::Done).await.is_err());
    }

    #[tokio::test]
    async fn closed_sink_is_noticed_while_idle() {
        let (event_tx, event_rx) = mpsc::channel::<TurnEvent>(4);
        let records = EventStreamEncoder::default().spawn_events(event_rx);
        drop(records);

        // No event is ever sent; the pump must still let go.
        tokio::time::timeout(Duration::from_secs(5), event_tx.closed())
            .await
            .expect("event receiver should be dropped");

        let (record_tx, record_rx) = mpsc::channel::<StreamRecord>(4);
        let out = EventStreamEncoder::default().spawn_records(record_rx);
        drop(out);
        tokio::time::timeout(Duration::from_secs(5), record_tx.closed())
            .await
            .expect("record receiver should be dropped");
    }

    #[tokio::test]
    async fn record_pump_forwards_verbatim() {
        let sent = vec![
            StreamRecord::StartAnswer,
            StreamRecord::Content { content: "one two".into() },
            StreamRecord::Done,
        ];
        let (tx, rx) = mpsc::channel(4);
        for record in &sent {
            tx.send(record.clone()).await.unwrap();
        }
        drop(tx);

        let received = drain(EventStreamEncoder::default().spawn_records(rx)).await;
        assert_eq!(received, sent);
    }
}
