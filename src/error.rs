//! Error types for the companion overlay.

/// Top-level error type for the overlay scheduler and its adapters.
#[derive(Debug, thiserror::Error)]
pub enum OverlayError {
    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Utterance scheduling error.
    #[error("scheduler error: {0}")]
    Scheduler(String),

    /// Async reply provider error (model inference, network, timeout).
    #[error("reply error: {0}")]
    Reply(String),

    /// Sound, haptic, or display effector error.
    #[error("effect error: {0}")]
    Effect(String),

    /// Phrase book loading error.
    #[error("phrase error: {0}")]
    Phrases(String),

    /// Host bridge protocol error.
    #[error("host error: {0}")]
    Host(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel send/receive error.
    #[error("channel error: {0}")]
    Channel(String),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, OverlayError>;
