//! Error taxonomy (spec §7).
//!
//! Five classes reach the HTTP boundary; all but the upstream-status class render as a
//! generic HTTP 500 with a class tag, and cryptographic failures never reveal which
//! sub-check failed (anti-oracle, §4.3/§7).

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

/// `samlp:StatusCode` reasons carried back to an SP as a signed error Response (§7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusReason {
    Requester,
    Responder,
    VersionMismatch,
}

impl StatusReason {
    pub fn uri(&self) -> &'static str {
        match self {
            StatusReason::Requester => "urn:oasis:names:tc:SAML:2.0:status:Requester",
            StatusReason::Responder => "urn:oasis:names:tc:SAML:2.0:status:Responder",
            StatusReason::VersionMismatch => "urn:oasis:names:tc:SAML:2.0:status:VersionMismatch",
        }
    }
}

#[derive(Debug, Error)]
pub enum HubError {
    /// Decoding, schema, or XPath-addressable field missing.
    #[error("malformed: {0}")]
    Malformed(String),

    /// No common federation, binding mismatch, scope mismatch, required attribute
    /// missing, singular multivalued, nameid-format unsupported.
    #[error("policy denied: {0}")]
    PolicyDenied(String),

    /// Signature invalid, digest mismatch, decryption failure, unsupported algorithm.
    /// The `Display` impl intentionally discards `reason` — callers must never surface
    /// the sub-reason to the user (§4.3, §7).
    #[error("encryption error")]
    Crypto { reason: &'static str },

    /// Outside the ±90s timing window (§4.3).
    #[error("timing problem")]
    Timing,

    /// Entity not found in the expected metadata set, or federation intersection empty.
    #[error("metadata not found: {0}")]
    MetadataNotFound(String),

    /// Cookie missing/expired/HMAC-failed, HSM RPC timeout.
    #[error("transport error: {0}")]
    Transport(String),

    /// Upstream SAML `Status` was not success; propagated as a signed error Response.
    #[error("upstream status: {0:?}")]
    UpstreamStatus(StatusReason),
}

impl HubError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }

    pub fn policy(msg: impl Into<String>) -> Self {
        Self::PolicyDenied(msg.into())
    }

    pub fn crypto(reason: &'static str) -> Self {
        Self::Crypto { reason }
    }

    pub fn metadata_not_found(msg: impl Into<String>) -> Self {
        Self::MetadataNotFound(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// The class tag exposed in the HTTP body — never the full message for `Crypto`.
    pub fn class(&self) -> &'static str {
        match self {
            HubError::Malformed(_) => "input-malformed",
            HubError::PolicyDenied(_) => "policy-denied",
            HubError::Crypto { .. } => "encryption-error",
            HubError::Timing => "timing-problem",
            HubError::MetadataNotFound(_) => "metadata-not-found",
            HubError::Transport(_) => "transport-error",
            HubError::UpstreamStatus(_) => "upstream-status",
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    class: &'static str,
    message: String,
}

impl IntoResponse for HubError {
    fn into_response(self) -> Response {
        let status = match &self {
            HubError::UpstreamStatus(_) => StatusCode::OK,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = match &self {
            // Never surface the sub-reason for a cryptographic failure.
            HubError::Crypto { .. } => "encryption error".to_string(),
            other => other.to_string(),
        };

        let body = ErrorBody {
            class: self.class(),
            message,
        };

        (status, Json(json!(body))).into_response()
    }
}

/// A structured `tag:value` context stack accumulated while unwinding an error.
/// Only the top public message (the `HubError` itself) is user-visible; the stack is
/// for the paired diagnostic log line (see `common::diagnostics`).
#[derive(Debug, Default, Clone)]
pub struct ErrorContext {
    tags: Vec<(String, String)>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl std::fmt::Display) -> Self {
        self.tags.push((key.into(), value.to_string()));
        self
    }

    pub fn as_pairs(&self) -> &[(String, String)] {
        &self.tags
    }
}

impl std::fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, (k, v)) in self.tags.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{k}:{v}")?;
        }
        Ok(())
    }
}
