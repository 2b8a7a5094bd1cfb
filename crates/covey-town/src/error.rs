//! Error types for the town layer.

use covey_protocol::TownId;

/// Errors returned by registry and town operations.
///
/// Every failure leaves the town exactly as it was: passwords and tokens
/// are checked before anything is mutated.
#[derive(Debug, thiserror::Error)]
pub enum TownError {
    /// A required field is empty.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The town does not exist, was deleted, or is being destroyed.
    #[error("town {0} not found")]
    NotFound(TownId),

    /// Wrong update password, or a session token this town never issued.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Only with capacity enforcement turned on.
    #[error("town {0} is full")]
    TownFull(TownId),

    /// Only with strict sprite enforcement.
    #[error("avatar {avatar:?} is not allowed here, use {required:?}")]
    AvatarRestricted { avatar: String, required: String },
}

impl TownError {
    /// HTTP-style status code sent to clients in an `Error` message.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidArgument(_) => 400,
            Self::Unauthorized(_) | Self::AvatarRestricted { .. } => 403,
            Self::NotFound(_) => 404,
            Self::TownFull(_) => 409,
        }
    }

    pub(crate) fn invalid_token() -> Self {
        Self::Unauthorized("invalid session token".into())
    }

    pub(crate) fn invalid_password() -> Self {
        Self::Unauthorized("invalid password".into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(TownError::InvalidArgument("x".into()).status_code(), 400);
        assert_eq!(TownError::Unauthorized("x".into()).status_code(), 403);
        assert_eq!(TownError::NotFound(TownId::new("T")).status_code(), 404);
        assert_eq!(TownError::TownFull(TownId::new("T")).status_code(), 409);
        let restricted = TownError::AvatarRestricted {
            avatar: "a".into(),
            required: "b".into(),
        };
        assert_eq!(restricted.status_code(), 403);
    }

    #[test]
    fn test_unauthorized_messages() {
        assert_eq!(
            TownError::invalid_token().to_string(),
            "unauthorized: invalid session token"
        );
        assert_eq!(
            TownError::invalid_password().to_string(),
            "unauthorized: invalid password"
        );
    }
}
