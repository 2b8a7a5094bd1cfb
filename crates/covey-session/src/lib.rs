//! Player sessions for Covey towns.
//!
//! This crate owns everything about a single connected player and the set
//! of players in one town:
//!
//! 1. **Sessions**: who a player is and where they stand ([`PlayerSession`])
//! 2. **Rosters**: the players of one town, indexed by secret token ([`Roster`])
//! 3. **Secrets**: session tokens and town passwords ([`generate_token`], [`random_hex`])
//! 4. **Video**: the seam to an external video provider ([`VideoTokenIssuer`])
//!
//! # How it fits in the stack
//!
//! ```text
//! Town layer (above)      ← one Roster per town, behind the town's lock
//!     ↕
//! Session layer (this crate)
//!     ↕
//! Protocol layer (below)  ← PlayerId, SessionToken, UserLocation
//! ```

#![allow(async_fn_in_trait)]

mod error;
mod player;
mod roster;
mod token;
mod video;

pub use error::SessionError;
pub use player::PlayerSession;
pub use roster::Roster;
pub use token::{generate_token, random_hex};
pub use video::{NoVideo, VideoTokenIssuer};
