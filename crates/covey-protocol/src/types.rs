//! Identity and domain value types shared by every Covey layer.
//!
//! Everything here is plain data: ids, the map/avatar enums a town is
//! configured with, and the location a player reports while walking
//! around. The session and town crates build their state out of these,
//! and the wire messages in [`crate::message`] carry them unchanged.

use serde::{Deserialize, Serialize};

use std::fmt;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Opaque identifier of a town.
///
/// Generated by the registry when the town is created and never reused,
/// even after the town is deleted. Clients use it (not the friendly name)
/// to tell towns apart, since friendly names are not unique.
///
/// `#[serde(transparent)]` keeps the JSON form a bare string: `"00A3F1C2"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TownId(String);

impl TownId {
    /// Wraps a raw identifier string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TownId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TownId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Identifier of a player within one town.
///
/// Player ids are only unique inside the town that issued them; two
/// towns may both have a `P-1`. They are public: every listener of the
/// town sees them in roster events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub u64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P-{}", self.0)
    }
}

/// The credential a player receives when joining a town.
///
/// Unlike [`PlayerId`], this is a secret: it is the only thing the town
/// accepts to move or disconnect the player. `Debug` is hand-written so
/// tokens never end up in logs.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(String);

impl SessionToken {
    /// Wraps a raw token string.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the token as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionToken(<redacted>)")
    }
}

impl From<&str> for SessionToken {
    fn from(token: &str) -> Self {
        Self::new(token)
    }
}

// ---------------------------------------------------------------------------
// Town configuration values
// ---------------------------------------------------------------------------

/// Which map a town renders. The core only stores and echoes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MapId {
    #[default]
    Standard,
    Conference,
    Classroom,
    Party,
}

/// Town-wide policy on which avatars players may pick.
///
/// - **AllUsers**: anyone picks any avatar.
/// - **PasswordUsers**: players who know the town's sprite password may
///   pick freely; everyone else is expected to use the restricted sprite.
/// - **NoUsers**: nobody picks; everyone uses the restricted sprite.
///
/// Serialized in camelCase (`"allUsers"`) to match existing clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SpriteRestriction {
    #[default]
    AllUsers,
    PasswordUsers,
    NoUsers,
}

impl SpriteRestriction {
    /// Returns `true` if this policy needs a restricted sprite name and
    /// a sprite restriction password.
    pub fn is_restricted(self) -> bool {
        !matches!(self, Self::AllUsers)
    }
}

impl fmt::Display for SpriteRestriction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllUsers => write!(f, "allUsers"),
            Self::PasswordUsers => write!(f, "passwordUsers"),
            Self::NoUsers => write!(f, "noUsers"),
        }
    }
}

// ---------------------------------------------------------------------------
// Location
// ---------------------------------------------------------------------------

/// The way a player's avatar is facing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Front,
    Back,
    Left,
    Right,
}

/// Last reported position of a player.
///
/// Overwritten wholesale on every movement report (last write wins).
/// The default is the spawn point: origin, facing front, standing still.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct UserLocation {
    pub x: f64,
    pub y: f64,
    pub rotation: Direction,
    pub moving: bool,
}

// ---------------------------------------------------------------------------
// Read models
// ---------------------------------------------------------------------------

/// Public view of a connected player.
///
/// This is what listeners and other players see. It never contains the
/// player's session token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub player_id: PlayerId,
    pub user_name: String,
    pub avatar_name: String,
    pub location: UserLocation,
}

/// One row of the public town listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TownListEntry {
    pub town_id: TownId,
    pub friendly_name: String,
    /// Number of players currently in the roster.
    pub current_occupancy: usize,
    pub maximum_occupancy: usize,
    pub map_id: MapId,
    pub enable_video: bool,
    pub enable_proximity: bool,
    pub sprite_restriction: SpriteRestriction,
    pub restricted_sprite_name: String,
}
