//! Ollama gateway: turns a prompt into a reply, tolerating an unreliable,
//! slow, or absent backend.
//!
//! The generation contract is deliberate: `generate_reply` always returns
//! text and never surfaces an error to the caller. A failed generation is
//! conversational content, visible to the user and persisted like any other
//! reply; the [`GatewayOutcome`] tag only exists so callers can log the
//! degradation.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Default Ollama base URL.
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";
/// Default generation model.
pub const DEFAULT_MODEL: &str = "llama3.2:1b-instruct-q4_K_M";
/// Default bound on a generation round trip.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Short probe timeout for the health check, independent of generation.
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Sentinel returned when the backend answers success with empty content.
const EMPTY_REPLY_SENTINEL: &str = "No response from AI model.";

/// Configuration for the gateway.
#[derive(Clone, Debug)]
pub struct GatewayConfig {
    /// Base URL of the Ollama API.
    pub base_url: String,
    /// Model name requested for generation.
    pub model: String,
    /// Bound on the generation round trip.
    pub timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// How a generation attempt concluded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GatewayOutcome {
    /// The backend returned generated text.
    Success,
    /// The backend returned success with empty content.
    EmptyReply,
    /// The backend is reachable but the requested model is not installed.
    ModelMissing,
    /// No connection could be established to the backend.
    Unreachable,
    /// The bounded wait time elapsed before the backend answered.
    TimedOut,
    /// Any other transport or protocol failure.
    Failed,
}

impl GatewayOutcome {
    /// True when the reply text is a diagnostic rather than model output.
    #[must_use]
    pub const fn is_degraded(self) -> bool {
        !matches!(self, Self::Success)
    }
}

/// A generation result: always text, tagged with how it was obtained.
#[derive(Clone, Debug)]
pub struct GatewayReply {
    /// The reply handed to the caller and persisted as-is.
    pub text: String,
    /// Outcome tag, for logging only.
    pub outcome: GatewayOutcome,
}

/// Health probe result, shaped for the health-reporting collaborator.
#[derive(Clone, Debug, Serialize)]
pub struct HealthReport {
    /// `"healthy"` or `"unhealthy"`.
    pub status: String,
    /// Number of models installed on the backend.
    pub models_available: usize,
    /// Whether the configured generation model is among them.
    pub required_model_available: bool,
    /// Names of the installed models.
    pub models: Vec<String>,
    /// Failure description when unhealthy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HealthReport {
    /// True when the probe succeeded.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }

    fn unhealthy(error: impl Into<String>) -> Self {
        Self {
            status: "unhealthy".to_string(),
            models_available: 0,
            required_model_available: false,
            models: Vec::new(),
            error: Some(error.into()),
        }
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: Option<String>,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagModel>,
}

#[derive(Deserialize)]
struct TagModel {
    #[serde(default)]
    name: String,
}

/// Async client for the Ollama generation backend.
#[derive(Clone)]
pub struct OllamaGateway {
    client: reqwest::Client,
    probe: reqwest::Client,
    config: GatewayConfig,
}

impl OllamaGateway {
    /// Build a gateway from configuration.
    ///
    /// # Errors
    /// Returns an error if an HTTP client cannot be constructed.
    pub fn new(config: GatewayConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        let probe = reqwest::Client::builder().timeout(HEALTH_TIMEOUT).build()?;
        Ok(Self {
            client,
            probe,
            config,
        })
    }

    /// The configured model name.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Send `prompt` to the backend and return a reply.
    ///
    /// Never fails: every failure mode maps to a user-facing diagnostic
    /// carried as the reply text.
    pub async fn generate_reply(&self, prompt: &str) -> GatewayReply {
        let url = format!("{}/api/generate", self.config.base_url);
        let request = GenerateRequest {
            model: &self.config.model,
            prompt,
            stream: false,
        };

        debug!(model = %self.config.model, "sending generation request");
        let reply = match self.client.post(&url).json(&request).send().await {
            Ok(response) => self.reply_from_response(response).await,
            Err(err) => Self::reply_from_transport_error(&err),
        };
        if reply.outcome.is_degraded() {
            warn!(outcome = ?reply.outcome, "generation degraded");
        }
        reply
    }

    async fn reply_from_response(&self, response: reqwest::Response) -> GatewayReply {
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return GatewayReply {
                text: format!(
                    "Model '{}' is not installed on the AI backend. \
                     Pull it with `ollama pull {}` and try again.",
                    self.config.model, self.config.model
                ),
                outcome: GatewayOutcome::ModelMissing,
            };
        }
        if !status.is_success() {
            return GatewayReply {
                text: format!(
                    "AI service error (HTTP {}). Please check if the model is available.",
                    status.as_u16()
                ),
                outcome: GatewayOutcome::Failed,
            };
        }
        match response.json::<GenerateResponse>().await {
            Ok(body) => match body.response.filter(|text| !text.is_empty()) {
                Some(text) => GatewayReply {
                    text,
                    outcome: GatewayOutcome::Success,
                },
                None => GatewayReply {
                    text: EMPTY_REPLY_SENTINEL.to_string(),
                    outcome: GatewayOutcome::EmptyReply,
                },
            },
            Err(err) => GatewayReply {
                text: format!("Error communicating with the AI service: {err}"),
                outcome: GatewayOutcome::Failed,
            },
        }
    }

    fn reply_from_transport_error(err: &reqwest::Error) -> GatewayReply {
        if err.is_timeout() {
            return GatewayReply {
                text: "The AI service is taking too long to respond. The model may \
                       still be loading; please try again in a moment."
                    .to_string(),
                outcome: GatewayOutcome::TimedOut,
            };
        }
        if err.is_connect() {
            return GatewayReply {
                text: "Unable to connect to the AI service. Make sure Ollama is \
                       running and reachable, then try again."
                    .to_string(),
                outcome: GatewayOutcome::Unreachable,
            };
        }
        GatewayReply {
            text: format!("Error communicating with the AI service: {err}"),
            outcome: GatewayOutcome::Failed,
        }
    }

    /// Probe the backend with a short timeout, listing installed models.
    ///
    /// Unhealthy on any transport failure, with the description attached.
    pub async fn check_health(&self) -> HealthReport {
        let url = format!("{}/api/tags", self.config.base_url);
        let response = match self.probe.get(&url).send().await {
            Ok(response) => response,
            Err(err) => return HealthReport::unhealthy(err.to_string()),
        };
        if !response.status().is_success() {
            return HealthReport::unhealthy("Service unavailable");
        }
        match response.json::<TagsResponse>().await {
            Ok(tags) => {
                let models: Vec<String> = tags.models.into_iter().map(|m| m.name).collect();
                HealthReport {
                    status: "healthy".to_string(),
                    models_available: models.len(),
                    required_model_available: models.iter().any(|m| m == &self.config.model),
                    models,
                    error: None,
                }
            }
            Err(err) => HealthReport::unhealthy(err.to_string()),
        }
    }
}
