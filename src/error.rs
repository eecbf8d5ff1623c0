//! Error types for the relay worker
//!
//! Provides structured error handling with:
//! - Numeric error codes for machine parsing
//! - User-friendly messages with suggestions
//! - Exit codes for CLI
//!
//! Errors raised inside a per-peer delivery task never leave that task;
//! they are folded into a `DeliveryOutcome` by the compute task.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::relay::ConnectionId;

/// Result type alias for relay operations
pub type Result<T> = std::result::Result<T, Error>;

/// Numeric error codes for machine parsing and documentation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorCode {
    // Configuration errors (1xx)
    ConfigNotFound = 100,
    ConfigParseError = 101,
    ConfigValidation = 102,

    // IO errors (2xx)
    IoRead = 200,
    IoWrite = 201,
    IoPermission = 202,
    IoNotFound = 203,

    // Connection errors (3xx)
    ConnectionFailed = 300,
    ConnectionTimeout = 301,
    ConnectionClosed = 302,
    SendFailed = 303,
    BindFailed = 304,
    ConnectionLimit = 305,
    QueueFull = 306,

    // Protocol errors (4xx)
    ProtocolMalformed = 401,

    // Compute errors (5xx)
    ComputeFailed = 500,
    ComputeTimeout = 501,
    SizeMismatch = 502,
    EmptyOperands = 503,
    NonFiniteResult = 504,

    // Internal errors (9xx)
    InternalError = 900,
    NotSupported = 902,
}

impl ErrorCode {
    /// Get the string code (e.g., "E100")
    pub fn as_str(&self) -> String {
        format!("E{}", *self as u16)
    }

    /// Get the exit code for CLI (maps to 1-125 range)
    pub fn exit_code(&self) -> i32 {
        match *self as u16 {
            100..=199 => 10,
            200..=299 => 20,
            300..=399 => 30,
            400..=499 => 40,
            500..=599 => 50,
            900..=999 => 90,
            _ => 1,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Main error type for the relay worker
#[derive(Error, Debug)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound {
        path: PathBuf,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Configuration parse error
    #[error("Failed to parse configuration: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<toml::de::Error>,
    },

    /// Configuration validation error
    #[error("Configuration validation failed: {message}")]
    ConfigValidation { message: String, field: Option<String> },

    /// Generic configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    // ─────────────────────────────────────────────────────────────
    // IO Errors
    // ─────────────────────────────────────────────────────────────

    /// File write error
    #[error("Failed to write file: {path}")]
    IoWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML serialization error: {0}")]
    Toml(#[from] toml::ser::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ─────────────────────────────────────────────────────────────
    // Connection Errors
    // ─────────────────────────────────────────────────────────────

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Listener could not be bound
    #[error("Failed to bind {addr}")]
    BindFailed {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Outbound connection failed
    #[error("Failed to connect to {url}: {message}")]
    ConnectionFailed { url: String, message: String },

    /// Outbound connection timed out
    #[error("Connection to {url} timed out after {timeout_ms}ms")]
    ConnectionTimeout { url: String, timeout_ms: u64 },

    /// Recipient is no longer open
    #[error("Connection {connection_id} is closed")]
    ConnectionClosed { connection_id: ConnectionId },

    /// Recipient's outbound queue rejected the payload
    #[error("Send to connection {connection_id} failed: {message}")]
    SendFailed {
        connection_id: ConnectionId,
        message: String,
    },

    /// Recipient is open but not draining its outbound queue
    #[error("Outbound queue for connection {connection_id} is full ({capacity} frames)")]
    QueueFull {
        connection_id: ConnectionId,
        capacity: usize,
    },

    /// Too many concurrent connections
    #[error("Connection limit reached ({max})")]
    ConnectionLimit { max: usize },

    // ─────────────────────────────────────────────────────────────
    // Compute Errors
    // ─────────────────────────────────────────────────────────────

    /// Operand sequences differ in length
    #[error("Operand size mismatch: left has {left} elements, right has {right}")]
    SizeMismatch { left: usize, right: usize },

    /// Operand sequences are empty
    #[error("Operands must contain at least one element")]
    EmptyOperands,

    /// Backend failure
    #[error("Compute backend '{backend}' failed: {message}")]
    ComputeFailed { backend: String, message: String },

    /// Result element overflowed or is NaN; JSON cannot carry it
    #[error("Result element {index} is not finite ({value})")]
    NonFiniteResult { index: usize, value: f64 },

    /// Compute did not finish in time
    #[error("Compute timed out after {timeout_ms}ms")]
    ComputeTimeout { timeout_ms: u64 },

    // ─────────────────────────────────────────────────────────────
    // Internal Errors
    // ─────────────────────────────────────────────────────────────

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    // ─────────────────────────────────────────────────────────────
    // Error Classification
    // ─────────────────────────────────────────────────────────────

    /// Get the numeric error code
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::ConfigNotFound { .. } => ErrorCode::ConfigNotFound,
            Error::ConfigParse { .. } => ErrorCode::ConfigParseError,
            Error::ConfigValidation { .. } => ErrorCode::ConfigValidation,
            Error::Config(_) => ErrorCode::ConfigValidation,

            Error::IoWrite { .. } => ErrorCode::IoWrite,
            Error::Io(e) => match e.kind() {
                std::io::ErrorKind::NotFound => ErrorCode::IoNotFound,
                std::io::ErrorKind::PermissionDenied => ErrorCode::IoPermission,
                _ => ErrorCode::IoRead,
            },
            Error::Toml(_) => ErrorCode::ConfigParseError,
            Error::Json(_) => ErrorCode::ProtocolMalformed,

            Error::WebSocket(_) => ErrorCode::ConnectionFailed,
            Error::BindFailed { .. } => ErrorCode::BindFailed,
            Error::ConnectionFailed { .. } => ErrorCode::ConnectionFailed,
            Error::ConnectionTimeout { .. } => ErrorCode::ConnectionTimeout,
            Error::ConnectionClosed { .. } => ErrorCode::ConnectionClosed,
            Error::SendFailed { .. } => ErrorCode::SendFailed,
            Error::QueueFull { .. } => ErrorCode::QueueFull,
            Error::ConnectionLimit { .. } => ErrorCode::ConnectionLimit,

            Error::SizeMismatch { .. } => ErrorCode::SizeMismatch,
            Error::EmptyOperands => ErrorCode::EmptyOperands,
            Error::NonFiniteResult { .. } => ErrorCode::NonFiniteResult,
            Error::ComputeFailed { .. } => ErrorCode::ComputeFailed,
            Error::ComputeTimeout { .. } => ErrorCode::ComputeTimeout,

            Error::NotSupported(_) => ErrorCode::NotSupported,
            Error::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// Check if the error is retryable
    ///
    /// A WebSocket error caused by the URL itself (unsupported scheme,
    /// missing host) fails the same way on every attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::WebSocket(tokio_tungstenite::tungstenite::Error::Url(_)) => false,
            Error::ConnectionFailed { .. }
            | Error::ConnectionTimeout { .. }
            | Error::WebSocket(_)
            | Error::ComputeTimeout { .. }
            | Error::Io(_) => true,
            _ => false,
        }
    }

    /// Get the exit code for CLI
    pub fn exit_code(&self) -> i32 {
        self.code().exit_code()
    }

    // ─────────────────────────────────────────────────────────────
    // User-Friendly Messages
    // ─────────────────────────────────────────────────────────────

    /// Get a user-friendly suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Error::ConfigNotFound { .. } => Some(
                "Run 'relay-worker config init' to create a default configuration file."
            ),
            Error::ConfigParse { .. } => Some(
                "Check your configuration file syntax. Run 'relay-worker config validate' to see details."
            ),
            Error::ConfigValidation { .. } | Error::Config(_) => Some(
                "Review the configuration file and fix the invalid values."
            ),
            Error::BindFailed { .. } => Some(
                "Another process may be using the port. Change 'server.listen_addr' or pass --listen."
            ),
            Error::ConnectionFailed { .. } | Error::ConnectionTimeout { .. } => Some(
                "Check that the upstream relay is running and the URL in 'peers.upstream' is correct."
            ),
            Error::SizeMismatch { .. } => Some(
                "Both operand sequences must have the same number of elements."
            ),
            Error::EmptyOperands => Some(
                "Provide at least one element in each operand sequence."
            ),
            Error::NonFiniteResult { .. } => Some(
                "Operand magnitudes overflow a 64-bit float; scale the inputs down."
            ),
            _ => None,
        }
    }

    /// Format the error for terminal display with colors
    pub fn format_for_terminal(&self) -> String {
        let mut output = format!(
            "\x1b[31mError [{}]\x1b[0m: {}\n",
            self.code().as_str(),
            self
        );

        if let Some(hint) = self.suggestion() {
            output.push_str(&format!("\n\x1b[33mHint\x1b[0m: {}\n", hint));
        }

        output
    }

    /// Format the error for logging (no colors)
    pub fn format_for_log(&self) -> String {
        format!("[{}] {}", self.code().as_str(), self)
    }
}

// ─────────────────────────────────────────────────────────────────
// Error Constructors
// ─────────────────────────────────────────────────────────────────

impl Error {
    pub fn config_not_found(path: impl Into<PathBuf>) -> Self {
        Error::ConfigNotFound {
            path: path.into(),
            source: None,
        }
    }

    pub fn config_field_invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ConfigValidation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    pub fn connection_failed(url: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ConnectionFailed {
            url: url.into(),
            message: message.into(),
        }
    }

    pub fn compute_failed(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ComputeFailed {
            backend: backend.into(),
            message: message.into(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_format() {
        assert_eq!(ErrorCode::ConfigNotFound.as_str(), "E100");
        assert_eq!(ErrorCode::ConnectionClosed.as_str(), "E302");
        assert_eq!(ErrorCode::SizeMismatch.as_str(), "E502");
    }

    #[test]
    fn test_error_exit_codes() {
        assert_eq!(ErrorCode::ConfigNotFound.exit_code(), 10);
        assert_eq!(ErrorCode::IoRead.exit_code(), 20);
        assert_eq!(ErrorCode::BindFailed.exit_code(), 30);
        assert_eq!(ErrorCode::SizeMismatch.exit_code(), 50);
        assert_eq!(ErrorCode::InternalError.exit_code(), 90);
    }

    #[test]
    fn test_size_mismatch_display() {
        let err = Error::SizeMismatch { left: 3, right: 2 };
        let msg = err.to_string();
        assert!(msg.contains('3'));
        assert!(msg.contains('2'));
        assert_eq!(err.code(), ErrorCode::SizeMismatch);
    }

    #[test]
    fn test_error_retryable() {
        assert!(Error::connection_failed("ws://peer", "refused").is_retryable());
        assert!(!Error::config_not_found("/test").is_retryable());
        assert!(!Error::EmptyOperands.is_retryable());
    }

    #[test]
    fn test_url_websocket_errors_are_not_retryable() {
        use tokio_tungstenite::tungstenite::error::UrlError;

        let url_err = Error::from(tokio_tungstenite::tungstenite::Error::Url(UrlError::UnsupportedUrlScheme));
        assert!(!url_err.is_retryable());

        let io_err = Error::from(tokio_tungstenite::tungstenite::Error::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "refused",
        )));
        assert!(io_err.is_retryable());
    }

    #[test]
    fn test_connection_timeout_keeps_sub_second_precision() {
        let err = Error::ConnectionTimeout {
            url: "ws://peer:9300".into(),
            timeout_ms: 250,
        };
        assert!(err.to_string().contains("250ms"));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_queue_full_display() {
        let err = Error::QueueFull {
            connection_id: ConnectionId::from_raw(7),
            capacity: 4,
        };
        assert!(err.to_string().contains("conn-7"));
        assert_eq!(err.code().as_str(), "E306");
    }

    #[test]
    fn test_non_finite_result_is_a_compute_error() {
        let err = Error::NonFiniteResult {
            index: 0,
            value: f64::INFINITY,
        };
        assert_eq!(err.exit_code(), 50);
        assert!(err.to_string().contains("not finite"));
        assert!(err.suggestion().is_some());
    }

    #[test]
    fn test_error_suggestions() {
        let err = Error::config_not_found("/test");
        assert!(err.suggestion().unwrap().contains("config init"));

        let err = Error::SizeMismatch { left: 3, right: 4 };
        assert!(err.suggestion().is_some());
    }

    #[test]
    fn test_format_for_terminal() {
        let formatted = Error::config_not_found("/test/config.toml").format_for_terminal();
        assert!(formatted.contains("E100"));
        assert!(formatted.contains("\x1b[31m"));
        assert!(formatted.contains("Hint"));
    }

    #[test]
    fn test_format_for_log() {
        let formatted = Error::config_not_found("/test/config.toml").format_for_log();
        assert!(formatted.contains("[E100]"));
        assert!(!formatted.contains("\x1b["));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert_eq!(err.code(), ErrorCode::IoNotFound);
    }
}
