//! # Jarvis Core
//!
//! Domain types, traits, and error definitions for the Jarvis assistant runtime.
//! This crate has **zero framework dependencies**: it defines the domain model
//! that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator is defined as a trait here: the chat model
//! ([`Provider`]), the speech service ([`SpeechProvider`]) and the
//! capabilities the model may invoke ([`Tool`]). Implementations live in
//! their respective crates, so the orchestration logic can be exercised
//! against scripted stand-ins.

pub mod error;
pub mod message;
pub mod provider;
pub mod speech;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use message::{Conversation, Message, MessageToolCall, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, ToolChoice, ToolDefinition};
pub use speech::SpeechProvider;
pub use tool::{Tool, ToolCall, ToolRegistry, ToolResult};
