//! Wire protocol for Covey towns.
//!
//! - **Types** ([`TownId`], [`PlayerId`], [`UserLocation`], …): identity
//!   and domain values shared by every layer.
//! - **Messages** ([`Envelope`], [`ClientMessage`], [`ServerMessage`]):
//!   what travels over a connection.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how messages become bytes.
//!
//! ```text
//! Transport (bytes) → Protocol (Envelope) → Town (registry, controllers)
//! ```

mod codec;
mod error;
mod message;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use message::{
    Channel, ClientMessage, Envelope, Payload, ServerMessage, TownCreateRequest,
    TownCreateResponse, TownDeleteRequest, TownJoinRequest, TownJoinResponse,
    TownUpdateRequest,
};
pub use types::{
    Direction, MapId, PlayerId, PlayerSnapshot, SessionToken, SpriteRestriction,
    TownId, TownListEntry, UserLocation,
};
