//! Error types for the Parlance voice-model manager and synthesis plumbing.

/// Result type alias for Parlance operations
pub type ParlanceResult<T> = Result<T, ParlanceError>;

/// Main error type for Parlance operations
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ParlanceError {
    /// Speech synthesis failed inside the wrapped TTS library
    #[error("Synthesis failed: {message}")]
    SynthesisError {
        /// Error message surfaced by the synthesis library
        message: String,
    },

    /// Network or download error
    #[error("Network error: {message}")]
    NetworkError {
        /// Error message describing the network issue
        message: String,
    },

    /// File I/O error
    #[error("File I/O error: {message}")]
    FileError {
        /// Error message describing the file operation failure
        message: String,
    },

    /// Model name unknown to both the store and the catalog
    #[error("Voice model '{name}' not found")]
    ModelNotFound {
        /// The model name that was not found
        name: String,
    },

    /// Model exists but is not fully downloaded
    #[error("Voice model '{name}' is not ready: {message}")]
    ModelNotReady {
        /// The model name
        name: String,
        /// Why the model cannot be used yet
        message: String,
    },

    /// Model is held by an in-flight download or an active synthesis call
    #[error("Voice model '{name}' is in use")]
    ModelInUse {
        /// The model name
        name: String,
    },

    /// Invalid input error
    #[error("Invalid input: {message}")]
    InvalidInput {
        /// Error message describing the invalid input
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    ConfigurationError {
        /// Error message describing the configuration issue
        message: String,
    },

    /// Audio playback or encoding error
    #[error("Audio error: {message}")]
    AudioError {
        /// Error message describing the audio issue
        message: String,
    },
}

impl ParlanceError {
    /// Create a new synthesis error
    #[must_use]
    pub fn synthesis<S: Into<String>>(message: S) -> Self {
        Self::SynthesisError {
            message: message.into(),
        }
    }

    /// Create a new network error
    #[must_use]
    pub fn network<S: Into<String>>(message: S) -> Self {
        Self::NetworkError {
            message: message.into(),
        }
    }

    /// Create a new file error
    #[must_use]
    pub fn file<S: Into<String>>(message: S) -> Self {
        Self::FileError {
            message: message.into(),
        }
    }

    /// Create a new model not found error
    #[must_use]
    pub fn not_found<S: Into<String>>(name: S) -> Self {
        Self::ModelNotFound { name: name.into() }
    }

    /// Create a new model not ready error
    #[must_use]
    pub fn not_ready<S: Into<String>, M: Into<String>>(name: S, message: M) -> Self {
        Self::ModelNotReady {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create a new model in use error
    #[must_use]
    pub fn in_use<S: Into<String>>(name: S) -> Self {
        Self::ModelInUse { name: name.into() }
    }

    /// Create a new invalid input error
    #[must_use]
    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create a new configuration error
    #[must_use]
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::ConfigurationError {
            message: message.into(),
        }
    }

    /// Create a new audio error
    #[must_use]
    pub fn audio<S: Into<String>>(message: S) -> Self {
        Self::AudioError {
            message: message.into(),
        }
    }

    /// Check if this error is retriable by re-invoking the operation
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(self, Self::NetworkError { .. })
    }

    /// Check if this error is due to invalid user input
    #[must_use]
    pub const fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidInput { .. }
                | Self::ModelNotFound { .. }
                | Self::ConfigurationError { .. }
        )
    }

    /// Get the error category for logging
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self {
            Self::SynthesisError { .. } => "synthesis",
            Self::NetworkError { .. } => "network",
            Self::FileError { .. } => "file",
            Self::ModelNotFound { .. } => "not_found",
            Self::ModelNotReady { .. } => "not_ready",
            Self::ModelInUse { .. } => "in_use",
            Self::InvalidInput { .. } => "input",
            Self::ConfigurationError { .. } => "configuration",
            Self::AudioError { .. } => "audio",
        }
    }
}

// Convert from common error types
impl From<std::io::Error> for ParlanceError {
    fn from(err: std::io::Error) -> Self {
        Self::file(err.to_string())
    }
}

impl From<serde_json::Error> for ParlanceError {
    fn from(err: serde_json::Error) -> Self {
        Self::file(format!("JSON error: {err}"))
    }
}

impl From<reqwest::Error> for ParlanceError {
    fn from(err: reqwest::Error) -> Self {
        Self::network(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = ParlanceError::synthesis("bad phonemes");
        assert_eq!(err.category(), "synthesis");
        assert!(!err.is_retriable());
        assert!(!err.is_user_error());
    }

    #[test]
    fn test_error_display() {
        let err = ParlanceError::not_found("en_US-ryan-medium");
        assert_eq!(
            err.to_string(),
            "Voice model 'en_US-ryan-medium' not found"
        );

        let err = ParlanceError::in_use("en_US-ryan-medium");
        assert_eq!(err.to_string(), "Voice model 'en_US-ryan-medium' is in use");
    }

    #[test]
    fn test_error_categories() {
        assert_eq!(ParlanceError::synthesis("t").category(), "synthesis");
        assert_eq!(ParlanceError::network("t").category(), "network");
        assert_eq!(ParlanceError::file("t").category(), "file");
        assert_eq!(ParlanceError::not_found("t").category(), "not_found");
        assert_eq!(ParlanceError::not_ready("t", "m").category(), "not_ready");
        assert_eq!(ParlanceError::in_use("t").category(), "in_use");
        assert_eq!(ParlanceError::invalid_input("t").category(), "input");
        assert_eq!(ParlanceError::configuration("t").category(), "configuration");
        assert_eq!(ParlanceError::audio("t").category(), "audio");
    }

    #[test]
    fn test_retriable_errors() {
        assert!(ParlanceError::network("timeout").is_retriable());
        assert!(!ParlanceError::synthesis("t").is_retriable());
        assert!(!ParlanceError::in_use("t").is_retriable());
    }

    #[test]
    fn test_user_errors() {
        assert!(ParlanceError::invalid_input("t").is_user_error());
        assert!(ParlanceError::not_found("t").is_user_error());
        assert!(ParlanceError::configuration("t").is_user_error());
        assert!(!ParlanceError::network("t").is_user_error());
        assert!(!ParlanceError::not_ready("t", "m").is_user_error());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err = ParlanceError::from(io_err);
        assert!(matches!(err, ParlanceError::FileError { .. }));
    }

    #[test]
    fn test_error_equality() {
        let err1 = ParlanceError::network("dns");
        let err2 = ParlanceError::network("dns");
        let err3 = ParlanceError::network("tls");

        assert_eq!(err1, err2);
        assert_ne!(err1, err3);
    }
}
