//! Classified errors for every call that leaves the process.

use reqwest::StatusCode;
use thiserror::Error;

use crate::models::ErrorKind;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request timed out after {0}ms")]
    Timeout(u64),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("order rejected: {0}")]
    Rejected(String),

    #[error("invalid response: {0}")]
    Decode(String),

    #[error("signing failed: {0}")]
    Signing(String),
}

impl ApiError {
    /// Map an error onto the retry/reporting taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Timeout(_) => ErrorKind::TransientNetwork,
            ApiError::Network(e) => {
                if e.is_timeout() || e.is_connect() || e.is_request() {
                    ErrorKind::TransientNetwork
                } else if let Some(status) = e.status() {
                    classify_status(status, "")
                } else {
                    ErrorKind::Unknown
                }
            }
            ApiError::Status { status, body } => classify_status(*status, body),
            ApiError::Rejected(msg) => {
                if is_insufficient_balance(msg) {
                    ErrorKind::InsufficientBalance
                } else {
                    ErrorKind::RejectedOrder
                }
            }
            ApiError::Decode(_) | ApiError::Signing(_) => ErrorKind::Unknown,
        }
    }

    /// True when the request cannot have reached the venue, so sending it again
    /// cannot duplicate an order. Timeouts and broken responses are ambiguous.
    pub fn is_resend_safe(&self) -> bool {
        match self {
            ApiError::Network(e) => e.is_connect(),
            ApiError::Status { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS || *status == StatusCode::SERVICE_UNAVAILABLE
            }
            _ => false,
        }
    }

    /// Build from a non-success response, consuming its body.
    pub async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        ApiError::Status { status, body }
    }
}

fn classify_status(status: StatusCode, body: &str) -> ErrorKind {
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        ErrorKind::TransientNetwork
    } else if is_insufficient_balance(body) {
        ErrorKind::InsufficientBalance
    } else if status.is_client_error() {
        ErrorKind::RejectedOrder
    } else {
        ErrorKind::Unknown
    }
}

/// The venue reports balance and allowance problems only in free text.
pub fn is_insufficient_balance(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("not enough balance") || lower.contains("allowance")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u16, body: &str) -> ApiError {
        ApiError::Status {
            status: StatusCode::from_u16(code).unwrap(),
            body: body.to_string(),
        }
    }

    #[test]
    fn test_status_classification() {
        assert_eq!(status(429, "").kind(), ErrorKind::TransientNetwork);
        assert_eq!(status(502, "bad gateway").kind(), ErrorKind::TransientNetwork);
        assert_eq!(status(400, "invalid tick size").kind(), ErrorKind::RejectedOrder);
        assert_eq!(
            status(400, "not enough balance / allowance").kind(),
            ErrorKind::InsufficientBalance
        );
        assert_eq!(status(304, "").kind(), ErrorKind::Unknown);
    }

    #[test]
    fn test_rejection_classification() {
        assert_eq!(
            ApiError::Rejected("Not enough balance".into()).kind(),
            ErrorKind::InsufficientBalance
        );
        assert_eq!(
            ApiError::Rejected("order couldn't be fully filled".into()).kind(),
            ErrorKind::RejectedOrder
        );
        assert_eq!(ApiError::Timeout(500).kind(), ErrorKind::TransientNetwork);
        assert_eq!(ApiError::Decode("eof".into()).kind(), ErrorKind::Unknown);
    }

    #[test]
    fn test_only_unsent_requests_are_resend_safe() {
        assert!(status(429, "").is_resend_safe());
        assert!(status(503, "").is_resend_safe());
        assert!(!status(502, "").is_resend_safe());
        assert!(!status(500, "").is_resend_safe());
        assert!(!ApiError::Timeout(15000).is_resend_safe());
        assert!(!ApiError::Rejected("market closed".into()).is_resend_safe());
    }
}
