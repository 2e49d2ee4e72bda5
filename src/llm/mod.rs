//! Model access
//!
//! The review pipeline only needs `generate(prompt) -> text`. Providers sit
//! behind [`ModelClient`] so the orchestrator can be driven by scripted
//! clients in tests.

pub mod client;
pub mod models;

pub use client::{create_http_client, HttpModelClient, ProviderConnector};
pub use models::Provider;

use std::future::Future;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    /// The provider answered with a non-success HTTP status.
    #[error("{provider} error {status}: {message}")]
    Status {
        provider: &'static str,
        status: u16,
        message: String,
    },
    #[error("request failed: {0}")]
    Transport(String),
    #[error("unexpected response: {0}")]
    Decode(String),
    #[error("timeout")]
    Timeout,
}

impl ModelError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Rate-limit or quota refusal. Uses the structured status when present and
    /// only falls back to looking for "429" in the message when it is not.
    pub fn is_quota_exceeded(&self) -> bool {
        match self.status() {
            Some(status) => status == 429,
            None => self.to_string().contains("429"),
        }
    }
}

/// One text-in, text-out model call.
pub trait ModelClient {
    fn generate(&self, prompt: &str) -> impl Future<Output = Result<String, ModelError>> + Send;
}

/// Builds a client once the credential for a run is known.
pub trait ModelConnector {
    type Client: ModelClient;

    fn connect(&self, credential: &str) -> Result<Self::Client, ModelError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_from_structured_status() {
        let err = ModelError::Status {
            provider: "Gemini",
            status: 429,
            message: "Resource has been exhausted".to_string(),
        };
        assert!(err.is_quota_exceeded());
    }

    #[test]
    fn test_other_status_with_429_in_message_is_not_quota() {
        let err = ModelError::Status {
            provider: "Gemini",
            status: 400,
            message: "field 429 is invalid".to_string(),
        };
        assert!(!err.is_quota_exceeded());
    }

    #[test]
    fn test_quota_message_fallback() {
        let err = ModelError::Transport("upstream said 429 Too Many Requests".to_string());
        assert!(err.is_quota_exceeded());
        assert!(!ModelError::Timeout.is_quota_exceeded());
    }
}
