//! Error types for Loopauth
//!
//! This module defines all error types used throughout the crate,
//! using `thiserror` for ergonomic error handling.
//!
//! The authorization flow returns the typed [`AuthResult`] so callers can
//! tell a refused port apart from a rejected token exchange. Configuration
//! and CLI glue use the `anyhow`-backed [`Result`] alias.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Main error type for Loopauth operations
#[derive(Error, Debug)]
pub enum LoopauthError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The loopback redirect listener could not bind its port
    #[error("Failed to bind redirect listener on {addr}: {source}")]
    Bind {
        /// Address the listener attempted to bind
        addr: String,
        /// Underlying socket error
        #[source]
        source: std::io::Error,
    },

    /// The redirect request did not look like `GET <target> HTTP/1.x`
    #[error("Malformed callback request: {0}")]
    MalformedRequest(String),

    /// The redirect arrived but did not carry a usable authorization code
    #[error("Callback error: {0}")]
    Callback(String),

    /// No redirect arrived before the configured deadline
    #[error("Timed out after {0:?} waiting for the authorization callback")]
    Timeout(Duration),

    /// The callback wait was cancelled by the caller
    #[error("Authorization was cancelled before the callback arrived")]
    Cancelled,

    /// The token endpoint rejected the exchange or returned an undecodable body
    #[error("Token endpoint returned {status}: {body}")]
    TokenEndpoint {
        /// HTTP status code of the response
        status: u16,
        /// Raw response body, kept verbatim for diagnostics
        body: String,
    },

    /// HTTP transport errors (connection refused, TLS, etc.)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The refresh token file could not be read or written
    #[error("Persistence error for {}: {source}", .path.display())]
    Persistence {
        /// Path of the refresh token file
        path: PathBuf,
        /// Underlying filesystem error
        #[source]
        source: std::io::Error,
    },

    /// The interactive authorization path failed
    #[error("Authorization failed: {0}")]
    Authorization(#[source] Box<LoopauthError>),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl LoopauthError {
    /// Wraps `self` as the cause of an [`LoopauthError::Authorization`].
    pub fn into_authorization(self) -> Self {
        match self {
            already @ LoopauthError::Authorization(_) => already,
            other => LoopauthError::Authorization(Box::new(other)),
        }
    }
}

/// Result type alias for configuration and CLI operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation.
pub type Result<T> = anyhow::Result<T>;

/// Result type alias for the authorization flow
pub type AuthResult<T> = std::result::Result<T, LoopauthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let error = LoopauthError::Config("client_id is empty".to_string());
        assert_eq!(error.to_string(), "Configuration error: client_id is empty");
    }

    #[test]
    fn test_token_endpoint_error_display_keeps_body_verbatim() {
        let error = LoopauthError::TokenEndpoint {
            status: 400,
            body: r#"{"error":"invalid_grant"}"#.to_string(),
        };
        assert_eq!(
            error.to_string(),
            r#"Token endpoint returned 400: {"error":"invalid_grant"}"#
        );
    }

    #[test]
    fn test_timeout_is_distinct_from_callback() {
        let error = LoopauthError::Timeout(Duration::from_secs(5));
        assert!(error.to_string().contains("Timed out"));
        assert!(!matches!(error, LoopauthError::Callback(_)));
    }

    #[test]
    fn test_bind_error_exposes_source() {
        use std::error::Error as _;

        let error = LoopauthError::Bind {
            addr: "127.0.0.1:8080".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use"),
        };
        assert!(error.to_string().contains("127.0.0.1:8080"));
        assert!(error.source().is_some());
    }

    #[test]
    fn test_into_authorization_wraps_once() {
        let error = LoopauthError::Callback("missing code".to_string())
            .into_authorization()
            .into_authorization();
        match error {
            LoopauthError::Authorization(inner) => {
                assert!(matches!(*inner, LoopauthError::Callback(_)));
            }
            other => panic!("expected Authorization, got {other:?}"),
        }
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let error: LoopauthError = io_error.into();
        assert!(matches!(error, LoopauthError::Io(_)));
    }

    #[test]
    fn test_yaml_error_conversion() {
        let yaml_error = serde_yaml::from_str::<serde_yaml::Value>("invalid: : yaml").unwrap_err();
        let error: LoopauthError = yaml_error.into();
        assert!(matches!(error, LoopauthError::Yaml(_)));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<LoopauthError>();
    }
}
