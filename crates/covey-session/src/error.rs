//! Error types for the session layer.

/// Errors that can occur while looking up or issuing player credentials.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No player in this roster holds the presented session token. The
    /// player may have disconnected, or the town may have been recreated.
    #[error("invalid session token")]
    UnknownToken,

    /// The video provider refused or failed to issue a token.
    #[error("video token unavailable: {0}")]
    VideoUnavailable(String),
}
