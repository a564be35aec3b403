// src/errors.rs
use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use serde_json::json;
use thiserror::Error;

/// Longest excerpt of a model response carried inside an error.
pub const EXCERPT_LIMIT: usize = 800;

#[derive(Error, Debug)]
pub enum GenError {
    #[error("Failed to read or write file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML config: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Failed to encode JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API request failed with status {status}: {body}")]
    ApiError { status: u16, body: String },

    #[error("Unexpected response structure: {0}")]
    UnexpectedResponse(String),

    #[error("Received empty text response from model")]
    EmptyResponse,

    #[error("{detail}. Raw: {excerpt}")]
    BadUpstreamResponse { detail: String, excerpt: String },

    #[error("Upstream capacity/rate limit after {attempts} attempts (last model '{model}')")]
    UpstreamUnavailable { model: String, attempts: u32 },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Test run timed out after {secs:.1}s")]
    Timeout { secs: f64 },

    #[error("Test execution disabled. Set ENABLE_RUN=1 to enable.")]
    RunDisabled,

    #[error("Could not detect a top-level function/class name. Provide 'symbol'.")]
    SymbolNotDetected,

    #[error("Invalid symbol '{0}': expected a Python identifier")]
    InvalidSymbol(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, GenError>;

impl GenError {
    /// Builds a `BadUpstreamResponse` with the raw text cut down to [`EXCERPT_LIMIT`] chars.
    pub fn bad_upstream(detail: impl Into<String>, raw: &str) -> Self {
        GenError::BadUpstreamResponse {
            detail: detail.into(),
            excerpt: raw.chars().take(EXCERPT_LIMIT).collect(),
        }
    }

    /// Machine-readable kind reported at the HTTP and CLI boundaries.
    pub fn kind(&self) -> &'static str {
        match self {
            GenError::Io(_) => "io",
            GenError::TomlParse(_) => "config",
            GenError::Json(_) => "json",
            GenError::Request(_) | GenError::ApiError { .. } => "upstream_error",
            GenError::UnexpectedResponse(_) | GenError::EmptyResponse => "bad_upstream_response",
            GenError::BadUpstreamResponse { .. } => "bad_upstream_response",
            GenError::UpstreamUnavailable { .. } => "upstream_unavailable",
            GenError::NotFound(_) => "not_found",
            GenError::Timeout { .. } => "timeout",
            GenError::RunDisabled => "run_disabled",
            GenError::SymbolNotDetected => "symbol_not_detected",
            GenError::InvalidSymbol(_) => "invalid_symbol",
            GenError::Config(_) => "config",
        }
    }

    /// Whether the model collaborator signalled a capacity or rate limit problem.
    ///
    /// A 429 status is the structured signal. The text match on "429",
    /// "capacity" and "rate limit" is kept so that providers which report
    /// throttling only in the message body still trigger a retry.
    pub fn is_capacity_signal(&self) -> bool {
        match self {
            GenError::ApiError { status: 429, .. } => true,
            GenError::ApiError { status, body } => {
                mentions_capacity(&format!("{} {}", status, body))
            }
            GenError::Request(e) => {
                e.status().map(|s| s.as_u16()) == Some(429) || mentions_capacity(&e.to_string())
            }
            GenError::UnexpectedResponse(msg) => mentions_capacity(msg),
            _ => false,
        }
    }
}

fn mentions_capacity(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("429") || lower.contains("capacity") || lower.contains("rate limit")
}

impl ResponseError for GenError {
    fn status_code(&self) -> StatusCode {
        match self {
            GenError::BadUpstreamResponse { .. }
            | GenError::UnexpectedResponse(_)
            | GenError::EmptyResponse
            | GenError::Request(_)
            | GenError::ApiError { .. } => StatusCode::BAD_GATEWAY,
            GenError::UpstreamUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            GenError::NotFound(_) => StatusCode::NOT_FOUND,
            GenError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            GenError::RunDisabled => StatusCode::FORBIDDEN,
            GenError::SymbolNotDetected | GenError::InvalidSymbol(_) => StatusCode::BAD_REQUEST,
            GenError::Io(_) | GenError::TomlParse(_) | GenError::Json(_) | GenError::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "kind": self.kind(),
            "detail": self.to_string(),
        }))
    }
}
