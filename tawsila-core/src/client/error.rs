//! Profile client error types

use thiserror::Error;

/// Maximum profile response body size (1 MB).
pub const MAX_RESPONSE_SIZE: usize = 1024 * 1024;

/// Error returned by the remote profile fetch
///
/// `Clone` because one failed request is shared by every caller that was
/// de-duplicated into it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClientError {
    #[error("No bearer token in session")]
    Unauthenticated,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("HTTP error {status} for {url}")]
    Http { status: reqwest::StatusCode, url: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid header value: {0}")]
    InvalidHeader(String),

    #[error("Response too large ({size} bytes, max {MAX_RESPONSE_SIZE})")]
    ResponseTooLarge { size: u64 },

    #[error("Profile request was abandoned")]
    Abandoned,
}

impl ClientError {
    /// Transient failures worth one more attempt
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout | Self::Abandoned => true,
            Self::Http { status, .. } => status.is_server_error() || *status == reqwest::StatusCode::TOO_MANY_REQUESTS,
            Self::Unauthenticated
            | Self::Parse(_)
            | Self::InvalidConfig(_)
            | Self::InvalidHeader(_)
            | Self::ResponseTooLarge { .. } => false,
        }
    }
}

/// Read a response body with size limit and deserialize as JSON.
///
/// Checks `Content-Length` hint first (if available), then enforces the
/// limit on the actual body bytes before deserializing.
pub async fn json_with_limit<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ClientError> {
    if let Some(cl) = response.content_length() {
        if cl > MAX_RESPONSE_SIZE as u64 {
            return Err(ClientError::ResponseTooLarge { size: cl });
        }
    }
    let bytes = response.bytes().await?;
    if bytes.len() > MAX_RESPONSE_SIZE {
        return Err(ClientError::ResponseTooLarge {
            size: bytes.len() as u64,
        });
    }
    serde_json::from_slice(&bytes).map_err(Into::into)
}

/// Check HTTP response status before processing body.
///
/// 401 maps to `Unauthenticated`: the token was rejected.
pub fn check_response(resp: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    let status = resp.status();
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(ClientError::Unauthenticated);
    }
    if status.is_client_error() || status.is_server_error() {
        return Err(ClientError::Http {
            status,
            url: resp.url().to_string(),
        });
    }
    Ok(resp)
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

impl From<reqwest::header::InvalidHeaderValue> for ClientError {
    fn from(err: reqwest::header::InvalidHeaderValue) -> Self {
        Self::InvalidHeader(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_http() {
        let err = ClientError::Http {
            status: reqwest::StatusCode::BAD_GATEWAY,
            url: "https://api.example.com/profile".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "HTTP error 502 Bad Gateway for https://api.example.com/profile"
        );
    }

    #[test]
    fn test_error_display_response_too_large() {
        let err = ClientError::ResponseTooLarge { size: 2_000_000 };
        let msg = err.to_string();
        assert!(msg.contains("2000000"));
        assert!(msg.contains(&MAX_RESPONSE_SIZE.to_string()));
    }

    #[test]
    fn test_error_from_serde_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: ClientError = json_err.into();
        assert!(matches!(err, ClientError::Parse(_)));
    }

    #[test]
    fn test_retry_classification() {
        assert!(ClientError::Timeout.is_retryable());
        assert!(ClientError::Network("reset".to_string()).is_retryable());
        assert!(ClientError::Http {
            status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
            url: String::new(),
        }
        .is_retryable());
        assert!(!ClientError::Http {
            status: reqwest::StatusCode::FORBIDDEN,
            url: String::new(),
        }
        .is_retryable());
        assert!(!ClientError::Unauthenticated.is_retryable());
        assert!(!ClientError::Parse("bad".to_string()).is_retryable());
    }
}
