//! Channel layer for pattern matching and session handling.
//!
//! This module turns a raw transport into a conversation: output is
//! accumulated with ANSI escapes removed, prompts are detected on the tail
//! of the buffer, and the session tracks which CLI mode it is in.

mod buffer;
mod patterns;
mod session;

pub use buffer::PatternBuffer;
pub use patterns::{CompiledPrompt, Literal, PromptMatcher};
pub use session::{Session, SessionState};
