//! Error kinds for harness operations

use std::fmt;

/// The kind of error that occurred.
///
/// Callers match on the kind to decide whether a failure aborts a
/// play-through, degrades it, or is recorded as a failed sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // =========================================================================
    // General
    // =========================================================================
    /// Catch-all for unhandled cases
    Unexpected,

    /// Invalid configuration
    ConfigInvalid,

    /// Invalid argument passed to a function
    InvalidArgument,

    // =========================================================================
    // Game server
    // =========================================================================
    /// The game server could not produce or render a game instance
    GameUnavailable,

    /// The game server answered, but not with the expected shape
    GameProtocol,

    /// The game identifier is not in the registry
    UnknownGame,

    // =========================================================================
    // Agent / LLM
    // =========================================================================
    /// The agent under evaluation failed to produce a response
    AgentFailed,

    /// LLM inference failed
    InferenceFailed,

    /// Rate limit exceeded
    RateLimited,

    /// Network error outside the game protocol
    NetworkFailed,

    // =========================================================================
    // Storage
    // =========================================================================
    /// Storage key not found
    StorageNotFound,

    /// Storage operation failed
    StorageFailed,

    /// Serialization/deserialization failed
    SerializationFailed,

    // =========================================================================
    // IO / parsing
    // =========================================================================
    /// IO operation failed
    IoFailed,

    /// File not found
    FileNotFound,

    /// Failed to parse input
    ParseFailed,
}

impl ErrorKind {
    /// Returns the error kind as a static string
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Unexpected => "Unexpected",
            ErrorKind::ConfigInvalid => "ConfigInvalid",
            ErrorKind::InvalidArgument => "InvalidArgument",

            ErrorKind::GameUnavailable => "GameUnavailable",
            ErrorKind::GameProtocol => "GameProtocol",
            ErrorKind::UnknownGame => "UnknownGame",

            ErrorKind::AgentFailed => "AgentFailed",
            ErrorKind::InferenceFailed => "InferenceFailed",
            ErrorKind::RateLimited => "RateLimited",
            ErrorKind::NetworkFailed => "NetworkFailed",

            ErrorKind::StorageNotFound => "StorageNotFound",
            ErrorKind::StorageFailed => "StorageFailed",
            ErrorKind::SerializationFailed => "SerializationFailed",

            ErrorKind::IoFailed => "IoFailed",
            ErrorKind::FileNotFound => "FileNotFound",
            ErrorKind::ParseFailed => "ParseFailed",
        }
    }

    /// Check if this error kind is retryable by default.
    ///
    /// `GameUnavailable` stays permanent: the game client has no retry path.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::InferenceFailed | ErrorKind::NetworkFailed | ErrorKind::RateLimited
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_display() {
        assert_eq!(ErrorKind::GameUnavailable.to_string(), "GameUnavailable");
        assert_eq!(ErrorKind::InferenceFailed.to_string(), "InferenceFailed");
    }

    #[test]
    fn test_is_retryable() {
        assert!(ErrorKind::RateLimited.is_retryable());
        assert!(ErrorKind::InferenceFailed.is_retryable());
        assert!(!ErrorKind::GameUnavailable.is_retryable());
        assert!(!ErrorKind::AgentFailed.is_retryable());
    }
}
