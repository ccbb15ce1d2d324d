//! Error types for scratchpad-mcp.

use thiserror::Error;

/// Result type for scratchpad-mcp operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for scratchpad-mcp.
#[derive(Debug, Error)]
pub enum Error {
    /// No providers available.
    #[error("no providers available: {0}")]
    NoProviders(String),

    /// Provider returned an error.
    #[error("provider error: {0}")]
    Provider(String),

    /// HTTP transport error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Timeout.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Invalid parameters.
    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// JSON-RPC error code reported when this error escapes a request.
    pub fn rpc_code(&self) -> i32 {
        use crate::protocol::error_codes;

        match self {
            Error::InvalidParams(_) | Error::NoProviders(_) => error_codes::INVALID_PARAMS,
            Error::Serialization(_) => error_codes::PARSE_ERROR,
            _ => error_codes::INTERNAL_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpc_codes() {
        assert_eq!(Error::InvalidParams("x".into()).rpc_code(), -32602);
        assert_eq!(Error::Provider("x".into()).rpc_code(), -32603);
    }
}
