//! Unified error type for the Covey server.

use covey_protocol::ProtocolError;
use covey_session::SessionError;
use covey_town::TownError;
use covey_transport::TransportError;

use crate::ConfigError;

/// Top-level error wrapping every crate-specific error, so `?` works
/// across layers.
#[derive(Debug, thiserror::Error)]
pub enum CoveyError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Town(#[from] TownError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
