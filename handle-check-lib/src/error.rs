//! Error handling for username checking operations.
//!
//! Only batch-level failures surface as errors. Anything that goes wrong while
//! probing a single site is folded into an `Unknown` outcome for that site and
//! never reaches the caller as an `Err`.

use std::fmt;

/// Main error type for username checking operations.
#[derive(Debug, Clone)]
pub enum HandleCheckError {
    /// The username itself cannot be checked (empty, whitespace only)
    InvalidUsername { username: String, reason: String },

    /// The site catalog is malformed or a site entry cannot be parsed
    Catalog { message: String },

    /// Network-related errors (connection, client construction, etc.)
    NetworkError {
        message: String,
        source: Option<String>,
    },

    /// JSON or TOML parsing errors
    ParseError {
        message: String,
        content: Option<String>,
    },

    /// Configuration errors (invalid settings, etc.)
    ConfigError { message: String },

    /// File I/O errors when reading catalogs, exclusion lists or config files
    FileError { path: String, message: String },

    /// Timeout errors when operations take too long
    Timeout {
        operation: String,
        duration: std::time::Duration,
    },

    /// Generic internal errors that don't fit other categories
    Internal { message: String },
}

impl HandleCheckError {
    /// Create a new invalid username error.
    pub fn invalid_username<U: Into<String>, R: Into<String>>(username: U, reason: R) -> Self {
        Self::InvalidUsername {
            username: username.into(),
            reason: reason.into(),
        }
    }

    /// Create a new catalog error.
    pub fn catalog<M: Into<String>>(message: M) -> Self {
        Self::Catalog {
            message: message.into(),
        }
    }

    /// Create a new network error.
    pub fn network<M: Into<String>>(message: M) -> Self {
        Self::NetworkError {
            message: message.into(),
            source: None,
        }
    }

    /// Create a new network error with source information.
    pub fn network_with_source<M: Into<String>, S: Into<String>>(message: M, source: S) -> Self {
        Self::NetworkError {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Create a new configuration error.
    pub fn config<M: Into<String>>(message: M) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    /// Create a new timeout error.
    pub fn timeout<O: Into<String>>(operation: O, duration: std::time::Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Create a new internal error.
    pub fn internal<M: Into<String>>(message: M) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create a new file error.
    pub fn file_error<P: Into<String>, M: Into<String>>(path: P, message: M) -> Self {
        Self::FileError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Short category label used when reporting why a site came back unknown.
    pub fn category(&self) -> &'static str {
        match self {
            Self::InvalidUsername { .. } => "invalid username",
            Self::Catalog { .. } => "catalog",
            Self::NetworkError { .. } => "network",
            Self::ParseError { .. } => "parse",
            Self::ConfigError { .. } => "config",
            Self::FileError { .. } => "file",
            Self::Timeout { .. } => "timeout",
            Self::Internal { .. } => "internal",
        }
    }
}

impl fmt::Display for HandleCheckError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidUsername { username, reason } => {
                write!(f, "Invalid username '{}': {}", username, reason)
            }
            Self::Catalog { message } => write!(f, "Site catalog error: {}", message),
            Self::NetworkError { message, source } => {
                if let Some(source) = source {
                    write!(f, "Network error: {} (source: {})", message, source)
                } else {
                    write!(f, "Network error: {}", message)
                }
            }
            Self::ParseError { message, content: _ } => write!(f, "Parse error: {}", message),
            Self::ConfigError { message } => write!(f, "Configuration error: {}", message),
            Self::FileError { path, message } => {
                write!(f, "File error at '{}': {}", path, message)
            }
            Self::Timeout {
                operation,
                duration,
            } => write!(f, "Timeout after {:?} during: {}", duration, operation),
            Self::Internal { message } => write!(f, "Internal error: {}", message),
        }
    }
}

impl std::error::Error for HandleCheckError {}

impl From<reqwest::Error> for HandleCheckError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::timeout("HTTP request", std::time::Duration::default())
        } else if err.is_connect() {
            Self::network_with_source("Connection failed", err.to_string())
        } else if err.is_decode() || err.is_body() {
            Self::ParseError {
                message: format!("Failed to read response body: {}", err),
                content: None,
            }
        } else {
            Self::network_with_source("HTTP request failed", err.to_string())
        }
    }
}

impl From<serde_json::Error> for HandleCheckError {
    fn from(err: serde_json::Error) -> Self {
        Self::ParseError {
            message: format!("JSON parsing failed: {}", err),
            content: None,
        }
    }
}

impl From<std::io::Error> for HandleCheckError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal {
            message: format!("I/O error: {}", err),
        }
    }
}

impl From<regex::Error> for HandleCheckError {
    fn from(err: regex::Error) -> Self {
        Self::Catalog {
            message: format!("Invalid regexCheck pattern: {}", err),
        }
    }
}

impl From<fancy_regex::Error> for HandleCheckError {
    fn from(err: fancy_regex::Error) -> Self {
        Self::Catalog {
            message: format!("Invalid regexCheck pattern: {}", err),
        }
    }
}
