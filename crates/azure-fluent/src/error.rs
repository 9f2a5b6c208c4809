//! Error types for Azure Resource Manager operations.
//!
//! Every fallible call in the crate returns [`AzureResult`]. HTTP failures
//! are classified by status code and, when the body carries the standard ARM
//! error envelope (`{"error":{"code":..,"message":..}}`), the service error
//! code and message are lifted out of it.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Categorised error kinds for Azure operations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Error)]
#[serde(rename_all = "snake_case")]
pub enum AzureErrorKind {
    #[error("Authentication error")]
    Auth,
    #[error("Resource not found")]
    NotFound,
    #[error("Resource conflict")]
    Conflict,
    #[error("Forbidden")]
    Forbidden,
    #[error("Rate limit exceeded")]
    RateLimit,
    #[error("Bad request")]
    BadRequest,
    #[error("Server error")]
    ServerError,
    #[error("Request timeout")]
    Timeout,
    #[error("Network error")]
    Network,
    #[error("Parse error")]
    Parse,
    #[error("Validation error")]
    Validation,
    #[error("Not authenticated")]
    NotAuthenticated,
    #[error("Subscription ID not set")]
    SubscriptionNotSet,
    #[error("Invalid resource ID")]
    InvalidResourceId,
    #[error("XML error")]
    Xml,
    #[error("Operation failed")]
    OperationFailed,
}

/// Main error type for Azure operations.
#[derive(Debug, Clone, Serialize, Deserialize, Error)]
#[error("[{kind}] {message}")]
pub struct AzureError {
    pub kind: AzureErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    /// ARM error code, e.g. `ResourceGroupNotFound`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

pub type AzureResult<T> = Result<T, AzureError>;

#[derive(Debug, Deserialize)]
struct ArmErrorEnvelope {
    error: ArmErrorBody,
}

#[derive(Debug, Deserialize)]
struct ArmErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl AzureError {
    pub fn new(kind: AzureErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status_code: None,
            code: None,
        }
    }

    pub fn with_status(kind: AzureErrorKind, message: impl Into<String>, status: u16) -> Self {
        Self {
            status_code: Some(status),
            ..Self::new(kind, message)
        }
    }

    /// Classify a non-success HTTP response.
    pub fn from_status(status: u16, body: &str) -> Self {
        let kind = match status {
            400 => AzureErrorKind::BadRequest,
            401 => AzureErrorKind::Auth,
            403 => AzureErrorKind::Forbidden,
            404 => AzureErrorKind::NotFound,
            408 => AzureErrorKind::Timeout,
            409 => AzureErrorKind::Conflict,
            429 => AzureErrorKind::RateLimit,
            400..=499 => AzureErrorKind::BadRequest,
            _ => AzureErrorKind::ServerError,
        };

        match serde_json::from_str::<ArmErrorEnvelope>(body) {
            Ok(envelope) => {
                let message = envelope
                    .error
                    .message
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| body.to_string());
                Self {
                    code: envelope.error.code,
                    ..Self::with_status(kind, message, status)
                }
            }
            Err(_) => Self::with_status(kind, body.to_string(), status),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(AzureErrorKind::Validation, message)
    }

    pub fn not_authenticated() -> Self {
        Self::new(
            AzureErrorKind::NotAuthenticated,
            "No valid token and no credentials to acquire one",
        )
    }

    pub fn subscription_not_set() -> Self {
        Self::new(AzureErrorKind::SubscriptionNotSet, "Subscription ID not configured")
    }

    pub fn invalid_resource_id(id: &str, reason: &str) -> Self {
        Self::new(
            AzureErrorKind::InvalidResourceId,
            format!("'{}': {}", id, reason),
        )
    }

    pub fn xml(message: impl Into<String>) -> Self {
        Self::new(AzureErrorKind::Xml, message)
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(AzureErrorKind::Parse, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(AzureErrorKind::Network, message)
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == AzureErrorKind::NotFound
    }

    /// Throttling, transient server errors and timeouts may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            AzureErrorKind::RateLimit | AzureErrorKind::Timeout | AzureErrorKind::Network
        ) || matches!(self.status_code, Some(500 | 502 | 503 | 504))
    }
}

impl From<quick_xml::Error> for AzureError {
    fn from(e: quick_xml::Error) -> Self {
        Self::xml(e.to_string())
    }
}

impl From<quick_xml::events::attributes::AttrError> for AzureError {
    fn from(e: quick_xml::events::attributes::AttrError) -> Self {
        Self::xml(e.to_string())
    }
}

impl From<serde_json::Error> for AzureError {
    fn from(e: serde_json::Error) -> Self {
        Self::parse(format!("JSON: {e}"))
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
