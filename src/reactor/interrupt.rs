//! Interruption taxonomy for the request pipeline.
//!
//! A stage ends in one of three ways besides success:
//!
//! - [`ExecutionError::Interrupted`]: benign early exit, handled like a
//!   successful completion.
//! - [`ExecutionError::Failure`]: structured failure carrying an
//!   [`ExecutionFailure`], rendered by the on-error processors.
//! - [`ExecutionError::Unexpected`]: any other error, handled like a
//!   failure for response purposes with the cause kept for diagnostics.

use std::collections::BTreeMap;
use std::fmt;

use http::StatusCode;

pub const REQUEST_TIMEOUT_KEY: &str = "REQUEST_TIMEOUT";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionFailure {
    status_code: u16,
    message: Option<String>,
    key: Option<String>,
    parameters: BTreeMap<String, String>,
    content_type: Option<String>,
}

impl ExecutionFailure {
    #[must_use]
    pub fn new(status_code: u16) -> Self {
        Self {
            status_code,
            message: None,
            key: None,
            parameters: BTreeMap::new(),
            content_type: None,
        }
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    #[must_use]
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// The failure raised when the request deadline fires.
    #[must_use]
    pub fn request_timeout() -> Self {
        Self::new(StatusCode::GATEWAY_TIMEOUT.as_u16())
            .with_message("Request timeout")
            .with_key(REQUEST_TIMEOUT_KEY)
    }

    #[must_use]
    pub const fn status_code(&self) -> u16 {
        self.status_code
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    #[must_use]
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    #[must_use]
    pub const fn parameters(&self) -> &BTreeMap<String, String> {
        &self.parameters
    }

    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }
}

impl fmt::Display for ExecutionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.status_code)?;
        if let Some(ref key) = self.key {
            write!(f, " [{key}]")?;
        }
        if let Some(ref message) = self.message {
            write!(f, " {message}")?;
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("execution interrupted")]
    Interrupted,

    #[error("execution interrupted with failure {0}")]
    Failure(ExecutionFailure),

    #[error("unexpected error during execution: {0}")]
    Unexpected(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ExecutionError {
    pub fn unexpected(error: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Unexpected(error.into())
    }

    #[must_use]
    pub const fn is_interruption(&self) -> bool {
        matches!(self, Self::Interrupted)
    }

    #[must_use]
    pub const fn failure(&self) -> Option<&ExecutionFailure> {
        match self {
            Self::Failure(failure) => Some(failure),
            _ => None,
        }
    }
}

impl From<ExecutionFailure> for ExecutionError {
    fn from(failure: ExecutionFailure) -> Self {
        Self::Failure(failure)
    }
}
