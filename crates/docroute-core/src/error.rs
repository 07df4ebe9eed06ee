//! Error types shared by the router and the connections it forwards to

use thiserror::Error;

/// Result alias used across docroute
pub type RouterResult<T> = Result<T, RouterError>;

/// Router error types
///
/// Connections produce these directly; the router hands them back to the
/// caller untouched.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RouterError {
    /// Unknown operation name or invalid cluster configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The targeted node cannot be reached or refused the session
    #[error("Connection to {address} failed: {reason}")]
    Connection { address: String, reason: String },

    /// The node rejected the operation
    #[error("Operation {operation} failed: {message}")]
    Operation { operation: String, message: String },

    /// The node answered with a reply of the wrong shape
    #[error("Unexpected reply to {operation}: {reply}")]
    UnexpectedReply { operation: String, reply: String },
}

impl RouterError {
    pub fn connection(address: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Connection {
            address: address.into(),
            reason: reason.into(),
        }
    }

    pub fn operation(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Operation {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// True for failures caused by an unusable connection
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }
}
