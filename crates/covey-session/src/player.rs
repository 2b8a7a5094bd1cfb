//! A single player's session inside a town.

use covey_protocol::{PlayerId, PlayerSnapshot, SessionToken, UserLocation};

/// The server's record of one joined player.
///
/// Lives exactly as long as the player is in the town's roster. The
/// `token` is the player's only credential and stays private to this
/// struct; everything else is public through [`snapshot`](Self::snapshot).
#[derive(Debug, Clone)]
pub struct PlayerSession {
    player_id: PlayerId,
    user_name: String,
    avatar_name: String,
    location: UserLocation,
    token: SessionToken,
}

impl PlayerSession {
    /// Creates a session at the spawn point.
    pub fn new(
        player_id: PlayerId,
        user_name: impl Into<String>,
        avatar_name: impl Into<String>,
        token: SessionToken,
    ) -> Self {
        Self {
            player_id,
            user_name: user_name.into(),
            avatar_name: avatar_name.into(),
            location: UserLocation::default(),
            token,
        }
    }

    pub fn player_id(&self) -> PlayerId {
        self.player_id
    }

    pub fn user_name(&self) -> &str {
        &self.user_name
    }

    pub fn avatar_name(&self) -> &str {
        &self.avatar_name
    }

    pub fn location(&self) -> UserLocation {
        self.location
    }

    /// The secret credential. Only the join response may carry it out.
    pub fn token(&self) -> &SessionToken {
        &self.token
    }

    /// Overwrites the location. Last write wins.
    pub fn set_location(&mut self, location: UserLocation) {
        self.location = location;
    }

    /// The public view of this player, without the token.
    pub fn snapshot(&self) -> PlayerSnapshot {
        PlayerSnapshot {
            player_id: self.player_id,
            user_name: self.user_name.clone(),
            avatar_name: self.avatar_name.clone(),
            location: self.location,
        }
    }
}
