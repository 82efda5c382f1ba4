//! Error types for the voice study assistant

use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum Error {
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Extraction error: {0}")]
    Extract(#[from] ExtractError),

    #[error("Chat error: {0}")]
    Chat(#[from] ChatError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Audio subsystem errors
#[derive(Error, Debug)]
pub enum AudioError {
    /// Microphone could not be acquired. Fatal to session start, never retried.
    #[error("Microphone unavailable or access denied: {0}")]
    PermissionDenied(String),

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to open stream: {0}")]
    StreamError(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

/// Live transport errors, classified for the retry state machine
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    /// Remote temporarily unavailable. Retried with backoff.
    #[error("Transient service error: {0}")]
    Transient(String),

    /// Anything else. Session torn down, no automatic retry.
    #[error("Fatal connection error: {0}")]
    Fatal(String),
}

impl TransportError {
    pub fn is_transient(&self) -> bool {
        matches!(self, TransportError::Transient(_))
    }

    pub fn message(&self) -> &str {
        match self {
            TransportError::Transient(m) | TransportError::Fatal(m) => m,
        }
    }
}

/// Document text extraction errors
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Failed to parse document: {0}")]
    Parse(String),

    /// The document yielded no text. Fatal to the upload step only.
    #[error("No extractable text found in document")]
    NoText,
}

/// Turn-based generation API errors
#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("Empty response from model")]
    EmptyResponse,
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// No API credential configured. Session start refuses to proceed.
    #[error("GEMINI_API_KEY is not set; configure it before starting a session")]
    CredentialMissing,

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, Error>;
