//! Firestore error types.

use thiserror::Error;

/// Result type for Firestore operations.
pub type FirestoreResult<T> = Result<T, FirestoreError>;

/// Errors that can occur during Firestore operations.
#[derive(Debug, Error)]
pub enum FirestoreError {
    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error("Rate limited, retry after {0}ms")]
    RateLimited(u64),

    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FirestoreError {
    pub fn auth_error(msg: impl Into<String>) -> Self {
        Self::AuthError(msg.into())
    }

    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    pub fn request_failed(msg: impl Into<String>) -> Self {
        Self::RequestFailed(msg.into())
    }

    pub fn invalid_document(msg: impl Into<String>) -> Self {
        Self::InvalidDocument(msg.into())
    }

    /// Map an HTTP status plus body into the matching error variant.
    pub fn from_http_status(status: u16, message: String) -> Self {
        match status {
            401 | 403 => Self::PermissionDenied(message),
            404 => Self::NotFound(message),
            409 | 412 => Self::PreconditionFailed(message),
            429 => Self::RateLimited(1000),
            _ => Self::RequestFailed(message),
        }
    }

    /// HTTP status associated with the error, for metrics.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::AuthError(_) | Self::PermissionDenied(_) => Some(403),
            Self::NotFound(_) => Some(404),
            Self::PreconditionFailed(_) => Some(412),
            Self::RateLimited(_) => Some(429),
            _ => None,
        }
    }

    /// Check if error is retryable at the storage layer.
    ///
    /// Precondition failures are deliberate contention signals and must not
    /// be retried blindly.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::RateLimited(_))
    }

    /// Suggested delay from a rate-limit response, if any.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            Self::RateLimited(ms) => Some(*ms),
            _ => None,
        }
    }

    /// True when a conditional write lost the race.
    pub fn is_precondition_failed(&self) -> bool {
        matches!(self, Self::PreconditionFailed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status_mapping() {
        assert!(FirestoreError::from_http_status(412, "cas".into()).is_precondition_failed());
        assert!(FirestoreError::from_http_status(409, "cas".into()).is_precondition_failed());
        assert!(matches!(
            FirestoreError::from_http_status(404, "gone".into()),
            FirestoreError::NotFound(_)
        ));
        assert!(FirestoreError::from_http_status(429, "slow".into()).is_retryable());
    }

    #[test]
    fn test_precondition_is_not_retryable() {
        assert!(!FirestoreError::PreconditionFailed("lost".into()).is_retryable());
    }
}
