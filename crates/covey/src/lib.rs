//! # Covey
//!
//! Real-time server for shared virtual towns.
//!
//! Clients create towns, list the public ones, join them, and stream their
//! avatar's movement. Every other player in the town sees joins, moves, and
//! departures as they happen. The server keeps presence only; video goes
//! through an external provider behind [`VideoTokenIssuer`](covey_session::VideoTokenIssuer).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use covey::prelude::*;
//!
//! # async fn run() -> Result<(), CoveyError> {
//! let server = CoveyServer::builder()
//!     .bind("0.0.0.0:8081")
//!     .build()
//!     .await?;
//! server.run().await
//! # }
//! ```
//!
//! The town core ([`covey_town`]) is usable without any networking:
//!
//! ```rust
//! use covey::prelude::*;
//!
//! let registry = TownRegistry::default();
//! let created = registry
//!     .create_town(TownCreateRequest {
//!         friendly_name: "Alpha".into(),
//!         is_publicly_listed: true,
//!         map_id: MapId::Standard,
//!         enable_video: false,
//!         enable_proximity: false,
//!         sprite_restriction: SpriteRestriction::AllUsers,
//!         restricted_sprite_name: String::new(),
//!     })
//!     .unwrap();
//! assert_eq!(registry.get_towns()[0].town_id, created.town_id);
//! ```

mod config;
mod error;
mod handler;
mod server;

pub use config::{ConfigError, DEFAULT_BIND, DEFAULT_IDLE_TIMEOUT, ServerConfig};
pub use error::CoveyError;
pub use server::{CoveyServer, CoveyServerBuilder, PROTOCOL_VERSION};

pub use covey_protocol;
pub use covey_session;
pub use covey_town;
pub use covey_transport;

/// Everything needed to run a server or drive the town core directly.
pub mod prelude {
    pub use crate::{CoveyError, CoveyServer, CoveyServerBuilder, PROTOCOL_VERSION, ServerConfig};

    pub use covey_protocol::{
        Channel, ClientMessage, Codec, Direction, Envelope, JsonCodec, MapId, Payload, PlayerId,
        PlayerSnapshot, ServerMessage, SessionToken, SpriteRestriction, TownCreateRequest,
        TownCreateResponse, TownDeleteRequest, TownId, TownJoinRequest, TownJoinResponse,
        TownListEntry, TownUpdateRequest, UserLocation,
    };
    pub use covey_session::{NoVideo, SessionError, VideoTokenIssuer};
    pub use covey_town::{
        ChannelListener, Delivery, FanoutReport, JoinRequest, ListenerError, ListenerId,
        SpriteEnforcement, TownController, TownError, TownEvent, TownListener, TownRegistry,
        TownUpdate, TownsConfig,
    };
}
