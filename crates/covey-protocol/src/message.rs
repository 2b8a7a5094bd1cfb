//! Wire messages: the envelope and everything that travels inside it.
//!
//! A client talks to the server over one persistent connection. It first
//! sends a [`ClientMessage::Handshake`], then any mix of registry requests
//! (create/list/update/delete/join) and, after [`ClientMessage::Subscribe`],
//! movement reports for its own player. The server answers requests on the
//! same connection and pushes roster events ([`ServerMessage::PlayerJoined`]
//! and friends) to every subscribed connection of the town.

use serde::{Deserialize, Serialize};

use crate::{
    MapId, PlayerId, PlayerSnapshot, SessionToken, SpriteRestriction, TownId,
    TownListEntry, UserLocation,
};

// ---------------------------------------------------------------------------
// Channel: delivery guarantees
// ---------------------------------------------------------------------------

/// The delivery guarantee requested for a message.
///
/// Roster changes must arrive in order. Movement updates are sent many
/// times per second and only the latest one matters, so the server marks
/// them `Unreliable`; transports without an unreliable path deliver them
/// reliably anyway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub enum Channel {
    #[default]
    ReliableOrdered,
    ReliableUnordered,
    Unreliable,
}

// ---------------------------------------------------------------------------
// Registry request/response bodies
// ---------------------------------------------------------------------------

/// Parameters for creating a town.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TownCreateRequest {
    pub friendly_name: String,
    pub is_publicly_listed: bool,
    #[serde(default)]
    pub map_id: MapId,
    #[serde(default)]
    pub enable_video: bool,
    #[serde(default)]
    pub enable_proximity: bool,
    #[serde(default)]
    pub sprite_restriction: SpriteRestriction,
    /// May be empty when `sprite_restriction` is `allUsers`.
    #[serde(default)]
    pub restricted_sprite_name: String,
}

/// The secrets of a freshly created town.
///
/// This is the only message that ever carries `update_password` or
/// `sprite_restriction_password`; there is no way to read them back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TownCreateResponse {
    pub town_id: TownId,
    pub update_password: String,
    /// Present iff the town restricts sprites.
    pub sprite_restriction_password: Option<String>,
}

/// Password-gated partial update. `None` fields are left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TownUpdateRequest {
    pub town_id: TownId,
    pub password: String,
    #[serde(default)]
    pub friendly_name: Option<String>,
    #[serde(default)]
    pub is_publicly_listed: Option<bool>,
    #[serde(default)]
    pub map_id: Option<MapId>,
    #[serde(default)]
    pub enable_video: Option<bool>,
    #[serde(default)]
    pub enable_proximity: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TownDeleteRequest {
    pub town_id: TownId,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TownJoinRequest {
    pub town_id: TownId,
    pub user_name: String,
    pub avatar_name: String,
    /// Attempt at the town's sprite restriction password. Empty when the
    /// player does not know it.
    #[serde(default)]
    pub sprite_restriction_password: String,
}

/// Everything a player needs after joining: credentials plus an echo of
/// the town's configuration and the roster at the moment of joining.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TownJoinResponse {
    pub session_token: SessionToken,
    pub player_id: PlayerId,
    /// Token for the external video provider, if the town has video and
    /// the server has a provider configured.
    pub provider_video_token: Option<String>,
    pub current_players: Vec<PlayerSnapshot>,
    pub friendly_name: String,
    pub is_publicly_listed: bool,
    pub map_id: MapId,
    pub enable_video: bool,
    pub enable_proximity: bool,
    pub sprite_restriction: SpriteRestriction,
    pub restricted_sprite_name: String,
    pub sprite_password_override: bool,
}

// ---------------------------------------------------------------------------
// ClientMessage / ServerMessage
// ---------------------------------------------------------------------------

/// Messages a client sends to the server.
///
/// Internally tagged: `{ "type": "JoinTown", "town_id": "…", … }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Must be the first message on a connection.
    Handshake { version: u32 },

    /// Keep-alive; answered with [`ServerMessage::HeartbeatAck`].
    Heartbeat { client_time: u64 },

    CreateTown(TownCreateRequest),

    ListTowns,

    UpdateTown(TownUpdateRequest),

    DeleteTown(TownDeleteRequest),

    JoinTown(TownJoinRequest),

    /// Binds this connection to a joined player. From then on the
    /// connection receives the town's roster events and may send
    /// [`ClientMessage::PlayerMovement`].
    Subscribe {
        town_id: TownId,
        session_token: SessionToken,
    },

    /// New location of the subscribed player.
    PlayerMovement { location: UserLocation },

    /// The client is leaving. Ends the connection and the player's session.
    Disconnect { reason: String },
}

/// Messages the server sends to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    HandshakeAck { server_time: u64 },

    HeartbeatAck { client_time: u64, server_time: u64 },

    TownCreated(TownCreateResponse),

    TownList { towns: Vec<TownListEntry> },

    TownUpdated { town_id: TownId },

    TownDeleted { town_id: TownId },

    TownJoined(TownJoinResponse),

    Subscribed { town_id: TownId, player_id: PlayerId },

    // -- Roster events (pushed to subscribed connections) --
    PlayerJoined { player: PlayerSnapshot },

    PlayerMoved { player: PlayerSnapshot },

    PlayerDisconnected { player: PlayerSnapshot },

    /// The town was deleted. The server closes the connection afterwards.
    TownClosing { town_id: TownId },

    /// A request failed. `code` follows HTTP conventions: 400 bad request,
    /// 403 forbidden, 404 not found, 409 conflict.
    Error { code: u16, message: String },
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// Which side produced the payload.
///
/// Adjacently tagged: `{ "type": "Client", "data": { "type": "ListTowns" } }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Payload {
    Client(ClientMessage),
    Server(ServerMessage),
}

/// The top-level wire frame. Every message on a connection is an Envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Per-sender sequence number.
    pub seq: u64,

    /// Milliseconds since the sender's connection started.
    pub timestamp: u64,

    #[serde(default)]
    pub channel: Channel,

    pub payload: Payload,
}
