//! Seam to the external video provider.
//!
//! Covey does not relay media. When a town has video enabled, the joining
//! player gets a short-lived token for a third-party provider, minted by
//! whatever implements [`VideoTokenIssuer`]. The server calls it once per
//! join, outside any town lock.

use covey_protocol::{PlayerId, TownId};

use crate::SessionError;

/// Mints provider tokens for players joining a video-enabled town.
///
/// # Example
///
/// ```rust
/// use covey_protocol::{PlayerId, TownId};
/// use covey_session::{SessionError, VideoTokenIssuer};
///
/// /// Hands out predictable room names. Only useful in tests.
/// struct RoomNameIssuer;
///
/// impl VideoTokenIssuer for RoomNameIssuer {
///     async fn issue_token(
///         &self,
///         town_id: &TownId,
///         player_id: PlayerId,
///     ) -> Result<Option<String>, SessionError> {
///         Ok(Some(format!("{town_id}/{player_id}")))
///     }
/// }
/// ```
pub trait VideoTokenIssuer: Send + Sync + 'static {
    /// Returns a provider token, or `None` if this server has no provider.
    ///
    /// # Errors
    /// [`SessionError::VideoUnavailable`] if the provider refused.
    fn issue_token(
        &self,
        town_id: &TownId,
        player_id: PlayerId,
    ) -> impl std::future::Future<Output = Result<Option<String>, SessionError>> + Send;
}

/// The default issuer: no provider configured, never issues a token.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoVideo;

impl VideoTokenIssuer for NoVideo {
    async fn issue_token(
        &self,
        _town_id: &TownId,
        _player_id: PlayerId,
    ) -> Result<Option<String>, SessionError> {
        Ok(None)
    }
}
