//! Error taxonomy shared across every component (spec §7).
//!
//! [`ErrorKind`] is the classification the retry layer and circuit breaker
//! reason about; [`CoreError`] is the concrete error type returned from
//! fallible operations. Components that must never propagate an error
//! (cache, error monitor) log and discard instead of using `?` upward.

use thiserror::Error;

/// Coarse classification used for retry eligibility and breaker bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidTicker,
    Transient,
    Timeout,
    RateLimit,
    InvalidResponse,
    BreakerOpen,
    ToolValidation,
    UnknownTool,
    ModelError,
    GraphStuck,
    Cancelled,
}

impl ErrorKind {
    /// Whether this kind is retriable *in principle* (independent of policy).
    pub fn is_retriable_by_default(self) -> bool {
        matches!(
            self,
            ErrorKind::Transient | ErrorKind::Timeout | ErrorKind::RateLimit
        )
    }
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid ticker: {0}")]
    InvalidTicker(String),

    #[error("transient upstream error: {0}")]
    Transient(String),

    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("rate limited: {0}")]
    RateLimit(String),

    #[error("invalid upstream response: {0}")]
    InvalidResponse(String),

    #[error("circuit breaker open for {function}")]
    BreakerOpen { function: String },

    #[error("tool argument validation failed: {0}")]
    ToolValidation(String),

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("model error: {0}")]
    ModelError(String),

    #[error("graph exceeded recursion limit of {0} node transitions")]
    GraphStuck(usize),

    #[error("run cancelled")]
    Cancelled,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::InvalidTicker(_) => ErrorKind::InvalidTicker,
            CoreError::Transient(_) => ErrorKind::Transient,
            CoreError::Timeout(_) => ErrorKind::Timeout,
            CoreError::RateLimit(_) => ErrorKind::RateLimit,
            CoreError::InvalidResponse(_) => ErrorKind::InvalidResponse,
            CoreError::BreakerOpen { .. } => ErrorKind::BreakerOpen,
            CoreError::ToolValidation(_) => ErrorKind::ToolValidation,
            CoreError::UnknownTool(_) => ErrorKind::UnknownTool,
            CoreError::ModelError(_) => ErrorKind::ModelError,
            CoreError::GraphStuck(_) => ErrorKind::GraphStuck,
            CoreError::Cancelled => ErrorKind::Cancelled,
            CoreError::Other(_) => ErrorKind::Transient,
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
