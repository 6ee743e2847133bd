//! Error types for the burst buffer driver
//!
//! Every error carries a numeric magnitude ([`Error::code`]). The driver never
//! interprets codes beyond ordering them: when several backends fail during one
//! call, the error with the highest code is reported.

use thiserror::Error;

/// Well-known error magnitudes
pub mod codes {
    /// Generic failure with no backend-specific magnitude
    pub const GENERIC: u32 = 1;
    /// Burst buffer request could not be parsed
    pub const INVALID_REQUEST: u32 = 2100;
    /// Request exceeds a configured size limit
    pub const SIZE_LIMIT: u32 = 2101;
    /// Submitting user may not use the backend
    pub const PERMISSION: u32 = 2102;
    /// Backend lost track of a staging resource
    pub const STAGING_LOST: u32 = 2110;
}

/// Unified error type for the driver
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // =========================================================================
    // Registry Errors
    // =========================================================================
    #[error("Unknown burst buffer backend: {plugin}")]
    UnknownBackend { plugin: String },

    #[error("Cannot create burst_buffer context for {plugin}: {reason}")]
    PluginLoad { plugin: String, reason: String },

    // =========================================================================
    // Backend Errors
    // =========================================================================
    #[error("Backend operation failed: {backend} - {operation}: {reason} (code {code})")]
    Backend {
        backend: String,
        operation: String,
        code: u32,
        reason: String,
    },

    // =========================================================================
    // Snapshot Codec Errors
    // =========================================================================
    #[error("Snapshot truncated: needed {needed} bytes, {remaining} remaining")]
    Unpack { needed: usize, remaining: usize },

    #[error("Unsupported protocol version: {0}")]
    UnsupportedProtocol(u16),

    #[error("Pack offset {offset} beyond written length {len}")]
    PackOffset { offset: usize, len: usize },

    // =========================================================================
    // Parse / IO Errors
    // =========================================================================
    #[error("Size parse error: {0}")]
    SizeParse(String),

    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

/// What the scheduler should do with an error returned by the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    /// Try again on the next scheduling cycle
    RetryNextCycle,
    /// Reject the job submission that produced the error
    RejectJob,
    /// Tear the registry down; it cannot be used as configured
    Teardown,
}

impl Error {
    /// Shorthand for a backend failure
    pub fn backend(
        backend: impl Into<String>,
        operation: impl Into<String>,
        code: u32,
        reason: impl Into<String>,
    ) -> Self {
        Error::Backend {
            backend: backend.into(),
            operation: operation.into(),
            code,
            reason: reason.into(),
        }
    }

    /// Magnitude used to pick the worst of several errors
    pub fn code(&self) -> u32 {
        match self {
            Error::Backend { code, .. } => *code,
            Error::SizeParse(_) => codes::INVALID_REQUEST,
            _ => codes::GENERIC,
        }
    }

    /// Determine what action to take for this error
    pub fn action(&self) -> ErrorAction {
        match self {
            Error::UnknownBackend { .. }
            | Error::PluginLoad { .. }
            | Error::Configuration(_)
            | Error::YamlParse(_) => ErrorAction::Teardown,

            Error::SizeParse(_) => ErrorAction::RejectJob,
            Error::Backend { code, .. }
                if matches!(
                    *code,
                    codes::INVALID_REQUEST | codes::SIZE_LIMIT | codes::PERMISSION
                ) =>
            {
                ErrorAction::RejectJob
            }

            _ => ErrorAction::RetryNextCycle,
        }
    }

    /// Check if this error came out of registry initialization
    pub fn is_fatal_for_registry(&self) -> bool {
        matches!(self, Error::UnknownBackend { .. } | Error::PluginLoad { .. })
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self.action(), ErrorAction::RetryNextCycle)
    }
}

/// Result type alias for the driver
pub type Result<T> = std::result::Result<T, Error>;
