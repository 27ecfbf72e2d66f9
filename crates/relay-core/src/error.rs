//! Error types for the relay.
//!
//! Every failure that can reach a caller is a [`RelayError`]. Each variant
//! knows the HTTP status it should be surfaced with and whether a caller may
//! reasonably retry it; [`RelayError::to_error_body`] renders the
//! OpenAI-compatible `{"error": {...}}` envelope.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result alias used across the relay crates
pub type RelayResult<T> = Result<T, RelayError>;

/// Unified error type
#[derive(Debug, Clone, Error)]
pub enum RelayError {
    /// Credential string does not split into the expected components
    #[error("Malformed credential: {message}")]
    MalformedCredential {
        /// What was wrong with the credential
        message: String,
    },

    /// Token exchange with the vendor failed
    #[error("Credential issuance failed: {message}")]
    Issuance {
        /// Failure description
        message: String,
        /// Whether a later attempt may succeed
        retryable: bool,
    },

    /// Vendor returned an error envelope or an empty result set
    #[error("Upstream error ({status}): {message}")]
    Upstream {
        /// HTTP status code of the upstream call
        status: u16,
        /// Vendor error message
        message: String,
        /// Vendor error type or category
        error_type: String,
        /// Vendor error code, if any
        code: Option<String>,
    },

    /// Vendor payload could not be decoded or encoded
    #[error("Translation failed: {message}")]
    Translation {
        /// Failure description
        message: String,
    },

    /// The transport failed before a response was received
    #[error("Transport error: {message}")]
    Transport {
        /// Failure description
        message: String,
    },

    /// The requested model has no vendor mapping
    #[error("Model not supported: {model}")]
    UnsupportedModel {
        /// Requested model name
        model: String,
    },

    /// Request validation failed
    #[error("Validation error: {message}")]
    Validation {
        /// Failure description
        message: String,
        /// Offending parameter
        param: Option<String>,
        /// Machine-readable error code
        code: String,
    },

    /// Invalid configuration
    #[error("Configuration error: {message}")]
    Configuration {
        /// Failure description
        message: String,
    },

    /// Internal error
    #[error("Internal error: {message}")]
    Internal {
        /// Failure description
        message: String,
    },
}

impl RelayError {
    /// Create a malformed credential error
    pub fn malformed_credential(message: impl Into<String>) -> Self {
        Self::MalformedCredential {
            message: message.into(),
        }
    }

    /// Create a retryable issuance error
    pub fn issuance(message: impl Into<String>) -> Self {
        Self::Issuance {
            message: message.into(),
            retryable: true,
        }
    }

    /// Create an upstream error
    pub fn upstream(
        status: u16,
        message: impl Into<String>,
        error_type: impl Into<String>,
        code: Option<String>,
    ) -> Self {
        Self::Upstream {
            status,
            message: message.into(),
            error_type: error_type.into(),
            code,
        }
    }

    /// Create a translation error
    pub fn translation(message: impl Into<String>) -> Self {
        Self::Translation {
            message: message.into(),
        }
    }

    /// Create a transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create an unsupported model error
    pub fn unsupported_model(model: impl Into<String>) -> Self {
        Self::UnsupportedModel {
            model: model.into(),
        }
    }

    /// Create a validation error
    pub fn validation(
        message: impl Into<String>,
        param: Option<String>,
        code: impl Into<String>,
    ) -> Self {
        Self::Validation {
            message: message.into(),
            param,
            code: code.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// HTTP status code this error is surfaced with
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::MalformedCredential { .. } => 401,
            Self::Issuance { .. } => 502,
            Self::Upstream { status, .. } => *status,
            Self::UnsupportedModel { .. } => 404,
            Self::Validation { .. } => 400,
            Self::Translation { .. }
            | Self::Transport { .. }
            | Self::Configuration { .. }
            | Self::Internal { .. } => 500,
        }
    }

    /// Whether a later identical attempt may succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Issuance { retryable, .. } => *retryable,
            Self::Transport { .. } => true,
            _ => false,
        }
    }

    /// Error type string used in the caller-facing envelope
    #[must_use]
    pub fn error_type(&self) -> &str {
        match self {
            Self::MalformedCredential { .. } => "invalid_credential",
            Self::Issuance { .. } => "credential_issuance_failed",
            Self::Upstream { error_type, .. } => error_type,
            Self::Translation { .. } => "translation_failed",
            Self::Transport { .. } => "http_request_failed",
            Self::UnsupportedModel { .. } => "model_not_found",
            Self::Validation { .. } => "invalid_request_error",
            Self::Configuration { .. } => "configuration_error",
            Self::Internal { .. } => "internal_error",
        }
    }

    /// Render the OpenAI-compatible error envelope
    #[must_use]
    pub fn to_error_body(&self) -> ErrorBody {
        let (message, param, code) = match self {
            Self::Upstream { message, code, .. } => (message.clone(), None, code.clone()),
            Self::Validation {
                message,
                param,
                code,
            } => (message.clone(), param.clone(), Some(code.clone())),
            other => (other.to_string(), None, None),
        };

        ErrorBody {
            error: ErrorDetail {
                message,
                error_type: self.error_type().to_string(),
                param,
                code,
            },
        }
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        Self::translation(err.to_string())
    }
}

/// OpenAI-compatible error envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Error details
    pub error: ErrorDetail,
}

/// OpenAI-compatible error details
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Human-readable message
    pub message: String,
    /// Error type
    #[serde(rename = "type")]
    pub error_type: String,
    /// Offending parameter
    pub param: Option<String>,
    /// Error code
    pub code: Option<String>,
}
