//! Mention agent: polls an X account's mentions and acts on them.
//!
//! Each cycle fetches new mentions, asks a decision oracle (Grok) what to do
//! with each one, and replies, searches or logs accordingly.

pub mod channels;
pub mod config;
pub mod error;
pub mod llm;
pub mod pipeline;

pub(crate) mod retry;
