use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::pipeline::DecryptResponse;

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("cannot base64 decode asymmetric_ciphertext_b64: {0}")]
    Encoding(#[from] base64::DecodeError),
    #[error("decoded ciphertext is {actual} bytes, expected {expected}")]
    InvalidCiphertextLength { expected: usize, actual: usize },
    #[error("decrypt budget exhausted, resets in {}s", .0.ratelimit_resets_in)]
    RateLimited(DecryptResponse),
    #[error("ciphertext could not be decrypted: {0}")]
    DecryptionFailure(String),
    #[error("decrypted payload is not a JSON object (line {line}, column {column})")]
    InvalidPayloadFormat { line: usize, column: usize },
    #[error("decrypted payload lacks a `key` attribute")]
    MissingKeyField,
    #[error("decrypted payload `key` is not a string")]
    InvalidKeyFieldType,
    #[error("decrypted payload `deprecate_at` is not an RFC 3339 timestamp string")]
    InvalidExpiryFormat,
    #[error("key for this payload was deprecated at {0}")]
    KeyDeprecated(DateTime<Utc>),
    #[error("failed to record decryption audit entry: {0}")]
    AuditPersistence(String),
}

impl OracleError {
    /// Stable identifier surfaced as `err_name`.
    pub fn name(&self) -> &'static str {
        match self {
            OracleError::Encoding(_) => "EncodingError",
            OracleError::InvalidCiphertextLength { .. } => "InvalidCiphertextLength",
            OracleError::RateLimited(_) => "RateLimited",
            OracleError::DecryptionFailure(_) => "DecryptionFailure",
            OracleError::InvalidPayloadFormat { .. } => "InvalidPayloadFormat",
            OracleError::MissingKeyField => "MissingKeyField",
            OracleError::InvalidKeyFieldType => "InvalidKeyFieldType",
            OracleError::InvalidExpiryFormat => "InvalidExpiryFormat",
            OracleError::KeyDeprecated(_) => "KeyDeprecated",
            OracleError::AuditPersistence(_) => "AuditPersistenceError",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            OracleError::Encoding(_)
            | OracleError::InvalidCiphertextLength { .. }
            | OracleError::DecryptionFailure(_)
            | OracleError::InvalidPayloadFormat { .. }
            | OracleError::MissingKeyField
            | OracleError::InvalidKeyFieldType
            | OracleError::InvalidExpiryFormat => StatusCode::BAD_REQUEST,
            OracleError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            OracleError::KeyDeprecated(_) => StatusCode::FORBIDDEN,
            OracleError::AuditPersistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// key: api-error-body
/// Transport-level error envelope built from a `(name, description)` pair.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ApiErrorBody {
    pub err_name: String,
    pub err_desc: String,
}

impl ApiErrorBody {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            err_name: name.into(),
            err_desc: description.into(),
        }
    }
}

impl From<&OracleError> for ApiErrorBody {
    fn from(error: &OracleError) -> Self {
        ApiErrorBody::new(error.name(), error.to_string())
    }
}

impl IntoResponse for OracleError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            OracleError::RateLimited(body) => {
                tracing::info!(
                    request_sha256 = %body.request_sha256,
                    resets_in = body.ratelimit_resets_in,
                    "returning rate-limited response"
                );
                (status, Json(body)).into_response()
            }
            other => {
                if status.is_server_error() {
                    tracing::error!(error = ?other, name = other.name());
                } else {
                    tracing::warn!(error = %other, name = other.name());
                }
                (status, Json(ApiErrorBody::from(&other))).into_response()
            }
        }
    }
}

pub type OracleResult<T> = Result<T, OracleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_stable() {
        assert_eq!(OracleError::MissingKeyField.name(), "MissingKeyField");
        assert_eq!(
            OracleError::AuditPersistence("down".into()).name(),
            "AuditPersistenceError"
        );
        assert_eq!(
            OracleError::InvalidCiphertextLength {
                expected: 512,
                actual: 3
            }
            .name(),
            "InvalidCiphertextLength"
        );
    }

    #[test]
    fn error_body_carries_name_and_description() {
        let err = OracleError::InvalidCiphertextLength {
            expected: 512,
            actual: 10,
        };
        let body = ApiErrorBody::from(&err);
        assert_eq!(body.err_name, "InvalidCiphertextLength");
        assert_eq!(body.err_desc, "decoded ciphertext is 10 bytes, expected 512");
    }

    #[test]
    fn status_codes_separate_client_policy_and_server_failures() {
        assert_eq!(
            OracleError::InvalidExpiryFormat.status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            OracleError::KeyDeprecated(Utc::now()).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            OracleError::AuditPersistence("db".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
