//! The research loop — the heart of Delve.
//!
//! Each turn follows a **Complete → Parse → Act** cycle:
//!
//! 1. **Complete**: send the conversation to the Model Client
//! 2. **Parse** the tagged completion (`<thinking>`, `<tool>`, `<answer>`)
//! 3. **Act**: dispatch one enabled tool and loop, or stop with the answer
//!
//! Every transition is pushed as a [`TurnEvent`]; the
//! [`EventStreamEncoder`] turns those into the wire records a client reads.
//! The loop stops on an answer, the turn limit, a Model Client failure, or
//! when the consumer goes away; a gone consumer is checked before every
//! Model Client call and tool dispatch.

pub mod direct;
pub mod encoder;
pub mod loop_runner;
pub mod parser;
pub mod prompt;
pub mod session;
pub mod stream_event;

pub use direct::DirectResponder;
pub use encoder::{
    EventStreamEncoder, RecordDecoder, StreamRecord, collect_events, decode_all, records_for,
};
pub use loop_runner::{LoopSettings, ResearchLoop};
pub use parser::{ParsedResponse, parse_response};
pub use prompt::{
    CONVERSATIONAL_PROMPT, FILE_ANALYST_PROMPT, capability_prompt, file_explanation_request,
};
pub use session::{LoopSession, SessionState};
pub use stream_event::TurnEvent;
