//! Completion service contract.
//!
//! Classification is delegated to an external language-model completion
//! call. The engine depends only on this trait; concrete HTTP clients live in
//! `cade-interaction`.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// A single completion call.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub temperature: f32,
    pub timeout: Duration,
}

impl CompletionRequest {
    pub fn new(system_prompt: impl Into<String>, user_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            user_prompt: user_prompt.into(),
            temperature: 0.0,
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CompletionError {
    #[error("completion service unavailable: {0}")]
    Unavailable(String),
    #[error("completion request failed: {message}")]
    Request { message: String, retryable: bool },
    #[error("completion service returned HTTP {status}: {message}")]
    Http {
        status: u16,
        message: String,
        retryable: bool,
        retry_after: Option<Duration>,
    },
    #[error("completion timed out after {0:?}")]
    Timeout(Duration),
    #[error("completion cancelled")]
    Cancelled,
    #[error("completion returned no content")]
    EmptyResponse,
}

impl CompletionError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Request { retryable, .. } | Self::Http { retryable, .. } => *retryable,
            Self::Timeout(_) | Self::EmptyResponse => true,
            Self::Unavailable(_) | Self::Cancelled => false,
        }
    }

    /// Server-requested delay before the next attempt, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Http { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// A language-model completion backend.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Returns the raw completion text.
    ///
    /// Callers parse the text as structured data and must tolerate malformed output.
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError>;
}
