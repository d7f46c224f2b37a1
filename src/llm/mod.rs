//! LLM-facing components: the Ollama generation gateway.

pub mod ollama;

pub use ollama::{GatewayConfig, GatewayOutcome, GatewayReply, HealthReport, OllamaGateway};
