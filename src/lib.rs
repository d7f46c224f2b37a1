//! Multi-session chat backend over a local Ollama instance.
//!
//! Users hold independent, titled conversations with a text-generation
//! backend; history is persisted per session in SQLite, and the gateway
//! degrades gracefully when the backend is slow, absent, or missing its
//! model.

// Strict lint policy: no unsafe, no undocumented public items, no panicking
// shortcuts in production code.
#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(unused_must_use)]
#![deny(nonstandard_style)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::print_stdout)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]

/// Startup helpers wiring config, store, gateway, and server together.
pub mod bootstrap;
/// Conversation/session management core.
pub mod chat;
/// Environment-driven configuration.
pub mod config;
/// LLM-facing components, including the Ollama gateway.
pub mod llm;
/// HTTP server and API routes.
pub mod server;
