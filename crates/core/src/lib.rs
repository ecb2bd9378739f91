//! # Delve Core
//!
//! Domain types, traits, and error definitions for the Delve research agent.
//! This crate has **no framework dependencies**: it defines the domain model
//! that the other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every collaborator of the research loop is a trait here (the Model Client
//! is [`Provider`], each capability is a [`Tool`]). Implementations live in
//! their respective crates, so tests can swap in scripted stand-ins.

pub mod error;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ProviderError, Result, ToolError};
pub use message::{Conversation, Message, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, StreamChunk, Usage};
pub use tool::{Tool, ToolArgs, ToolInvocation, ToolOutcome, ToolRegistry};
