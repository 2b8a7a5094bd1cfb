//! Town configuration, per-town settings, and the town state machine.

use serde::{Deserialize, Serialize};

use covey_protocol::{MapId, SpriteRestriction, TownId, TownListEntry, TownUpdateRequest};

/// Occupancy reported for every town unless configured otherwise.
pub const DEFAULT_MAX_OCCUPANCY: usize = 50;

// ---------------------------------------------------------------------------
// TownsConfig
// ---------------------------------------------------------------------------

/// How strictly the avatar restriction is applied at join time.
///
/// - **Advisory**: the join always succeeds; the client is told whether the
///   player may pick freely (`sprite_password_override`) and enforces the
///   restricted sprite itself.
/// - **Strict**: a join whose avatar breaks the restriction is rejected
///   with [`TownError::AvatarRestricted`](crate::TownError::AvatarRestricted).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SpriteEnforcement {
    #[default]
    Advisory,
    Strict,
}

/// Registry-wide settings applied to every town it creates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TownsConfig {
    /// Reported as `maximum_occupancy` in listings.
    pub max_occupancy: usize,

    /// Reject joins once a town holds `max_occupancy` players. Off by
    /// default: the limit is only reported.
    pub enforce_capacity: bool,

    pub sprite_enforcement: SpriteEnforcement,
}

impl Default for TownsConfig {
    fn default() -> Self {
        Self {
            max_occupancy: DEFAULT_MAX_OCCUPANCY,
            enforce_capacity: false,
            sprite_enforcement: SpriteEnforcement::Advisory,
        }
    }
}

// ---------------------------------------------------------------------------
// TownState
// ---------------------------------------------------------------------------

/// The lifecycle state of a town.
///
/// ```text
/// Active ──(delete / disconnect_all_players)──→ Destroyed
/// ```
///
/// `Destroyed` is terminal: the roster is empty, every token is void, and
/// joins or listener registrations fail with `NotFound`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TownState {
    Active,
    Destroyed,
}

impl TownState {
    pub fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }
}

impl std::fmt::Display for TownState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "Active"),
            Self::Destroyed => write!(f, "Destroyed"),
        }
    }
}

// ---------------------------------------------------------------------------
// TownSettings / TownUpdate
// ---------------------------------------------------------------------------

/// The public configuration of one town. Contains no secrets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TownSettings {
    pub friendly_name: String,
    pub is_publicly_listed: bool,
    pub map_id: MapId,
    pub enable_video: bool,
    pub enable_proximity: bool,
    /// Fixed at creation.
    pub sprite_restriction: SpriteRestriction,
    /// Fixed at creation.
    pub restricted_sprite_name: String,
    pub maximum_occupancy: usize,
}

impl TownSettings {
    /// Overwrites every field `update` provides. Sprite policy is not
    /// updatable.
    pub fn apply(&mut self, update: TownUpdate) {
        if let Some(name) = update.friendly_name {
            self.friendly_name = name;
        }
        if let Some(listed) = update.is_publicly_listed {
            self.is_publicly_listed = listed;
        }
        if let Some(map_id) = update.map_id {
            self.map_id = map_id;
        }
        if let Some(video) = update.enable_video {
            self.enable_video = video;
        }
        if let Some(proximity) = update.enable_proximity {
            self.enable_proximity = proximity;
        }
    }

    /// The listing row for this town.
    pub fn listing(&self, town_id: &TownId, current_occupancy: usize) -> TownListEntry {
        TownListEntry {
            town_id: town_id.clone(),
            friendly_name: self.friendly_name.clone(),
            current_occupancy,
            maximum_occupancy: self.maximum_occupancy,
            map_id: self.map_id,
            enable_video: self.enable_video,
            enable_proximity: self.enable_proximity,
            sprite_restriction: self.sprite_restriction,
            restricted_sprite_name: self.restricted_sprite_name.clone(),
        }
    }
}

/// A partial update. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TownUpdate {
    pub friendly_name: Option<String>,
    pub is_publicly_listed: Option<bool>,
    pub map_id: Option<MapId>,
    pub enable_video: Option<bool>,
    pub enable_proximity: Option<bool>,
}

impl TownUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl From<TownUpdateRequest> for TownUpdate {
    fn from(req: TownUpdateRequest) -> Self {
        Self {
            friendly_name: req.friendly_name,
            is_publicly_listed: req.is_publicly_listed,
            map_id: req.map_id,
            enable_video: req.enable_video,
            enable_proximity: req.enable_proximity,
        }
    }
}
