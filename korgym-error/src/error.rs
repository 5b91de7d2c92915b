//! The main Error type for the harness

use crate::{ErrorKind, ErrorStatus};
use std::fmt;

/// The unified error type for all harness operations.
///
/// ```rust
/// use korgym_error::{Error, ErrorKind};
///
/// let err = Error::new(ErrorKind::GameUnavailable, "connection refused")
///     .with_operation("client::generate")
///     .with_context("game", "1-2048")
///     .with_context("seed", "42");
///
/// assert_eq!(err.kind(), ErrorKind::GameUnavailable);
/// assert!(!err.is_retryable());
/// ```
pub struct Error {
    kind: ErrorKind,
    message: String,
    status: ErrorStatus,
    operation: &'static str,
    context: Vec<(&'static str, String)>,
    source: Option<anyhow::Error>,
}

impl Error {
    /// Create a new error with the given kind and message
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        let status = if kind.is_retryable() {
            ErrorStatus::Temporary
        } else {
            ErrorStatus::Permanent
        };

        Self {
            kind,
            message: message.into(),
            status,
            operation: "",
            context: Vec::new(),
            source: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn status(&self) -> ErrorStatus {
        self.status
    }

    /// The operation that raised the error (empty if never set)
    pub fn operation(&self) -> &'static str {
        self.operation
    }

    pub fn context(&self) -> &[(&'static str, String)] {
        &self.context
    }

    /// Look up a context value by key (first match wins)
    pub fn context_value(&self, key: &str) -> Option<&str> {
        self.context
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn source_ref(&self) -> Option<&anyhow::Error> {
        self.source.as_ref()
    }

    // =========================================================================
    // Builders
    // =========================================================================

    pub fn with_status(mut self, status: ErrorStatus) -> Self {
        self.status = status;
        self
    }

    /// Mark as temporary (retryable)
    pub fn temporary(mut self) -> Self {
        self.status = ErrorStatus::Temporary;
        self
    }

    /// Mark as permanent (not retryable)
    pub fn permanent(mut self) -> Self {
        self.status = ErrorStatus::Permanent;
        self
    }

    /// Set the operation that raised this error.
    ///
    /// A previously set operation moves into the context under `called`,
    /// so the chain of layers stays visible in logs.
    pub fn with_operation(mut self, operation: &'static str) -> Self {
        if !self.operation.is_empty() {
            self.context.push(("called", self.operation.to_string()));
        }
        self.operation = operation;
        self
    }

    pub fn with_context(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.context.push((key, value.into()));
        self
    }

    /// Attach the underlying error.
    ///
    /// # Panics (debug only)
    /// Panics in debug mode if a source was already set.
    pub fn set_source(mut self, source: impl Into<anyhow::Error>) -> Self {
        debug_assert!(self.source.is_none(), "source error already set");
        self.source = Some(source.into());
        self
    }

    /// Mark as persistent after failed retries
    pub fn persist(mut self) -> Self {
        self.status = self.status.persist();
        self
    }

    pub fn is_retryable(&self) -> bool {
        self.status.is_retryable()
    }
}

// Display: one line, suitable for `tracing` fields and failure samples.
impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.kind, self.status)?;
        if !self.operation.is_empty() {
            write!(f, " at {}", self.operation)?;
        }

        if !self.context.is_empty() {
            write!(f, ", context {{ ")?;
            for (i, (key, value)) in self.context.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}: {}", key, value)?;
            }
            write!(f, " }}")?;
        }

        if !self.message.is_empty() {
            write!(f, " => {}", self.message)?;
        }

        Ok(())
    }
}

// Debug: multi-line, includes the source chain.
impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} ({}) at {}", self.kind, self.status, self.operation)?;

        if !self.message.is_empty() {
            writeln!(f)?;
            writeln!(f, "    Message: {}", self.message)?;
        }

        if !self.context.is_empty() {
            writeln!(f)?;
            writeln!(f, "    Context:")?;
            for (key, value) in &self.context {
                writeln!(f, "        {}: {}", key, value)?;
            }
        }

        if let Some(source) = &self.source {
            writeln!(f)?;
            writeln!(f, "    Source: {:?}", source)?;
        }

        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::FileNotFound,
            _ => ErrorKind::IoFailed,
        };
        Error::new(kind, err.to_string())
            .with_operation("io")
            .set_source(err)
    }
}

// =============================================================================
// Convenience constructors
// =============================================================================

impl Error {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unexpected, message)
    }

    pub fn config_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConfigInvalid, message)
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, message)
    }

    /// The game server could not be reached for `endpoint`
    pub fn game_unavailable(endpoint: &str, reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::GameUnavailable, reason).with_context("endpoint", endpoint)
    }

    /// The game server answered `endpoint` with an unusable body
    pub fn game_protocol(endpoint: &str, reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::GameProtocol, reason).with_context("endpoint", endpoint)
    }

    pub fn unknown_game(game: impl Into<String>) -> Self {
        let game = game.into();
        Self::new(ErrorKind::UnknownGame, format!("game '{}' is not registered", game))
            .with_context("game", game)
    }

    pub fn agent_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AgentFailed, message)
    }

    pub fn inference_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InferenceFailed, message)
    }

    pub fn storage_not_found(key: impl Into<String>) -> Self {
        let key = key.into();
        Self::new(ErrorKind::StorageNotFound, format!("storage key '{}' not found", key))
            .with_context("key", key)
    }

    pub fn storage_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::StorageFailed, message)
    }

    pub fn serialization_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SerializationFailed, message)
    }

    pub fn parse_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ParseFailed, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = Error::new(ErrorKind::GameProtocol, "missing board field");
        assert_eq!(err.kind(), ErrorKind::GameProtocol);
        assert_eq!(err.message(), "missing board field");
        assert_eq!(err.status(), ErrorStatus::Permanent);
    }

    #[test]
    fn test_error_with_context() {
        let err = Error::game_unavailable("/generate", "connection refused")
            .with_operation("client::generate")
            .with_context("seed", "3");

        assert_eq!(err.operation(), "client::generate");
        assert_eq!(err.context().len(), 2);
        assert_eq!(err.context_value("endpoint"), Some("/generate"));
        assert_eq!(err.context_value("seed"), Some("3"));
        assert_eq!(err.context_value("missing"), None);
    }

    #[test]
    fn test_operation_chaining() {
        let err = Error::new(ErrorKind::GameUnavailable, "timed out")
            .with_operation("client::render_prompt")
            .with_operation("session::play");

        assert_eq!(err.operation(), "session::play");
        assert_eq!(err.context()[0], ("called", "client::render_prompt".to_string()));
    }

    #[test]
    fn test_default_status_follows_kind() {
        assert!(Error::inference_failed("overloaded").is_retryable());
        assert!(!Error::agent_failed("empty completion").is_retryable());
    }

    #[test]
    fn test_persist() {
        let err = Error::new(ErrorKind::RateLimited, "slow down");
        assert!(err.is_retryable());

        let err = err.persist();
        assert!(!err.is_retryable());
        assert_eq!(err.status(), ErrorStatus::Persistent);
    }

    #[test]
    fn test_display_is_single_line() {
        let err = Error::unknown_game("99-nonexistent").with_operation("registry::lookup");
        let display = err.to_string();

        assert!(!display.contains('\n'));
        assert!(display.contains("UnknownGame"));
        assert!(display.contains("permanent"));
        assert!(display.contains("registry::lookup"));
        assert!(display.contains("game: 99-nonexistent"));
    }

    #[test]
    fn test_display_without_operation() {
        let err = Error::parse_failed("bad seed range");
        assert_eq!(err.to_string(), "ParseFailed (permanent) => bad seed range");
    }

    #[test]
    fn test_io_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "korgym.toml");
        let err = Error::from(io_err);

        assert_eq!(err.kind(), ErrorKind::FileNotFound);
        assert!(err.source_ref().is_some());
    }

    #[test]
    fn test_source_survives_serde_errors() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = Error::serialization_failed("bad json").set_source(parse_err);

        assert!(std::error::Error::source(&err).is_some());
    }
}
