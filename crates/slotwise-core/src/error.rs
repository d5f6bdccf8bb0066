//! Core error types for slotwise-core.
//!
//! Validation problems are rejected synchronously before any external I/O.
//! Calendar failures carry a transient/permanent split so the commit engine
//! knows what is worth retrying.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Top-level error type for the scheduling engine.
#[derive(Error, Debug)]
pub enum SchedulingError {
    /// Malformed rule, slot, or preference input
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// A proposal was used after its expiry horizon
    #[error("Proposal '{proposal_id}' expired at {expired_at} and can no longer be committed")]
    StaleProposal {
        proposal_id: String,
        expired_at: DateTime<Utc>,
    },

    /// Referenced task does not exist in the task store
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    /// Calendar read/write failure
    #[error("Calendar error: {0}")]
    Calendar(#[from] CalendarError),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Generic errors with context
    #[error("{0}")]
    Custom(String),
}

/// Validation errors, raised before any side effect.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Time interval with end before (or equal to) start
    #[error("Invalid time range: end ({end}) must be after start ({start})")]
    InvalidTimeRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    /// HH:mm pair with end before (or equal to) start
    #[error("Invalid clock range: '{end}' must be after '{start}'")]
    InvalidClockRange { start: String, end: String },

    /// Could not parse an HH:mm value
    #[error("Invalid HH:mm value: '{0}'")]
    InvalidTimeOfDay(String),

    /// Day-of-week set outside 0..=6 or empty
    #[error("Invalid day set for '{field}': {message}")]
    InvalidDaySet { field: String, message: String },

    /// Numeric field outside its allowed range
    #[error("Invalid value for '{field}': {message}")]
    OutOfRange { field: String, message: String },

    /// Empty collection where at least one element is required
    #[error("Empty collection: {0}")]
    EmptyCollection(String),
}

/// Calendar store failures.
///
/// `is_retryable` is the contract the commit engine relies on: transient
/// variants are retried with backoff, permanent ones surface immediately.
#[derive(Error, Debug)]
pub enum CalendarError {
    /// Network-level failure (transient)
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Provider rejected the request with an unexpected status (transient
    /// for 5xx, permanent otherwise; pre-classified by the adapter)
    #[error("Calendar API error: {0}")]
    Api(String),

    /// Server-side failure worth retrying
    #[error("Calendar API transient failure: {0}")]
    Transient(String),

    /// Rate limited by the provider (transient)
    #[error("Rate limited")]
    RateLimited,

    /// Write did not complete within the configured deadline (transient)
    #[error("Calendar write timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// The target calendar or event no longer exists (permanent)
    #[error("Calendar resource gone: {0}")]
    Gone(String),

    /// Credentials rejected or missing (permanent)
    #[error("Authentication required")]
    AuthenticationRequired,
}

impl CalendarError {
    /// Whether the commit engine should retry this failure.
    pub fn is_retryable(&self) -> bool {
        match self {
            CalendarError::Network(_)
            | CalendarError::Transient(_)
            | CalendarError::RateLimited
            | CalendarError::Timeout { .. } => true,
            CalendarError::Api(_)
            | CalendarError::Gone(_)
            | CalendarError::AuthenticationRequired => false,
        }
    }
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed {
        path: std::path::PathBuf,
        message: String,
    },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed {
        path: std::path::PathBuf,
        message: String,
    },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },
}

/// Result type alias for SchedulingError
pub type Result<T, E = SchedulingError> = std::result::Result<T, E>;
