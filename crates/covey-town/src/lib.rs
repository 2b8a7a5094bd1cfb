//! Towns for Covey: the registry, per-town controllers, admission rules,
//! and the listener fanout that keeps every observer's roster in sync.
//!
//! # Key types
//!
//! - [`TownRegistry`]: creates, lists, updates and deletes towns
//! - [`TownController`]: one town's roster and listeners behind one lock
//! - [`AdmissionPolicy`]: join-time capacity and sprite rules
//! - [`TownListener`] / [`ListenerHub`]: ordered, failure-isolated fanout
//! - [`TownsConfig`]: occupancy limit and enforcement switches
//!
//! The core is synchronous. Callers on an async runtime invoke it directly;
//! nothing here awaits or blocks on I/O.

mod admission;
mod config;
mod controller;
mod error;
mod listener;
mod registry;

pub use admission::{Admission, AdmissionPolicy, JoinRequest, sprite_password_override};
pub use config::{
    DEFAULT_MAX_OCCUPANCY, SpriteEnforcement, TownSettings, TownState, TownUpdate, TownsConfig,
};
pub use controller::{JoinGrant, TownController};
pub use error::TownError;
pub use listener::{
    ChannelListener, Delivery, FanoutReport, ListenerError, ListenerFailure, ListenerHub,
    ListenerId, TownEvent, TownListener,
};
pub use registry::{CreatedTown, TownRegistry};
