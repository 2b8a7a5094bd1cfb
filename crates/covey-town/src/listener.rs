//! Town listeners and the fanout hub that drives them.
//!
//! Every town keeps an ordered list of registered [`TownListener`]s. When
//! the roster changes, the town pushes one [`TownEvent`] to each of them,
//! in registration order, before the operation returns. A listener that
//! fails (returns `Err` or panics) is recorded in a [`FanoutReport`] and
//! the remaining listeners still get the event.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use covey_protocol::{PlayerId, PlayerSnapshot};
use tokio::sync::mpsc;

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

// ---------------------------------------------------------------------------
// Listener identity and errors
// ---------------------------------------------------------------------------

/// Registration handle returned when a listener is added to a town.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    fn next() -> Self {
        Self(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for ListenerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "L-{}", self.0)
    }
}

/// Why a listener could not take an event.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    /// The other end is gone (e.g. the connection's event channel).
    #[error("listener closed")]
    Closed,

    #[error("listener failed: {0}")]
    Failed(String),

    /// The callback panicked. The panic was caught at the fanout boundary.
    #[error("listener panicked: {0}")]
    Panicked(String),
}

// ---------------------------------------------------------------------------
// TownListener / TownEvent
// ---------------------------------------------------------------------------

/// An observer of one town's roster.
///
/// Callbacks run synchronously while the town is locked. They must return
/// quickly and must not call back into the town or the registry.
pub trait TownListener: Send + Sync + 'static {
    fn on_player_joined(&self, player: &PlayerSnapshot) -> Result<(), ListenerError>;

    fn on_player_moved(&self, player: &PlayerSnapshot) -> Result<(), ListenerError>;

    fn on_player_disconnected(&self, player: &PlayerSnapshot) -> Result<(), ListenerError>;

    /// Called exactly once, when the town is deleted.
    fn on_town_destroyed(&self) -> Result<(), ListenerError>;
}

/// One roster change, as pushed to listeners.
#[derive(Debug, Clone, PartialEq)]
pub enum TownEvent {
    PlayerJoined(PlayerSnapshot),
    PlayerMoved(PlayerSnapshot),
    PlayerDisconnected(PlayerSnapshot),
    TownDestroyed,
}

impl TownEvent {
    /// Invokes the matching callback on `listener`.
    pub fn deliver_to(&self, listener: &dyn TownListener) -> Result<(), ListenerError> {
        match self {
            Self::PlayerJoined(p) => listener.on_player_joined(p),
            Self::PlayerMoved(p) => listener.on_player_moved(p),
            Self::PlayerDisconnected(p) => listener.on_player_disconnected(p),
            Self::TownDestroyed => listener.on_town_destroyed(),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::PlayerJoined(_) => "player_joined",
            Self::PlayerMoved(_) => "player_moved",
            Self::PlayerDisconnected(_) => "player_disconnected",
            Self::TownDestroyed => "town_destroyed",
        }
    }
}

// ---------------------------------------------------------------------------
// Fanout results
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct ListenerFailure {
    pub listener: ListenerId,
    pub error: ListenerError,
}

/// What happened when one event was pushed to every listener.
#[derive(Debug, Default)]
pub struct FanoutReport {
    /// Listeners that took the event without error.
    pub delivered: usize,
    pub failures: Vec<ListenerFailure>,
}

impl FanoutReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// The result of a mutating town operation plus any listeners that could
/// not be told about it.
///
/// A non-empty `failures` does not undo the operation: the write happened,
/// some observer just missed it.
#[derive(Debug)]
pub struct Delivery<T> {
    pub value: T,
    pub failures: Vec<ListenerFailure>,
}

impl<T> Delivery<T> {
    pub(crate) fn new(value: T, report: FanoutReport) -> Self {
        Self {
            value,
            failures: report.failures,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn into_value(self) -> T {
        self.value
    }
}

// ---------------------------------------------------------------------------
// ListenerHub
// ---------------------------------------------------------------------------

struct Registration {
    id: ListenerId,
    /// The player whose connection registered this listener, if any.
    owner: Option<PlayerId>,
    listener: Arc<dyn TownListener>,
}

/// The ordered listener set of one town. Not locked on its own; lives
/// inside the town's mutex next to the roster.
#[derive(Default)]
pub struct ListenerHub {
    registrations: Vec<Registration>,
}

impl ListenerHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a listener. `owner` marks it as belonging to that player's
    /// connection.
    pub fn add(&mut self, listener: Arc<dyn TownListener>, owner: Option<PlayerId>) -> ListenerId {
        let id = ListenerId::next();
        self.registrations.push(Registration { id, owner, listener });
        id
    }

    /// Removes one listener. Returns `false` if it was not registered.
    pub fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.registrations.len();
        self.registrations.retain(|r| r.id != id);
        self.registrations.len() != before
    }

    /// Removes every listener owned by `player`. Returns how many.
    pub fn remove_owned_by(&mut self, player: PlayerId) -> usize {
        let before = self.registrations.len();
        self.registrations.retain(|r| r.owner != Some(player));
        before - self.registrations.len()
    }

    pub fn clear(&mut self) {
        self.registrations.clear();
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Pushes `event` to every listener in registration order, skipping
    /// listeners owned by `except`.
    pub fn broadcast(&self, event: &TownEvent, except: Option<PlayerId>) -> FanoutReport {
        let mut report = FanoutReport::default();

        for reg in &self.registrations {
            if except.is_some() && reg.owner == except {
                continue;
            }

            let outcome = panic::catch_unwind(AssertUnwindSafe(|| event.deliver_to(&*reg.listener)));
            let error = match outcome {
                Ok(Ok(())) => {
                    report.delivered += 1;
                    continue;
                }
                Ok(Err(e)) => e,
                Err(payload) => ListenerError::Panicked(panic_message(payload.as_ref())),
            };

            tracing::warn!(
                listener = %reg.id,
                event = event.kind(),
                error = %error,
                "listener failed"
            );
            report.failures.push(ListenerFailure {
                listener: reg.id,
                error,
            });
        }

        report
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ---------------------------------------------------------------------------
// ChannelListener
// ---------------------------------------------------------------------------

/// Forwards every event into an unbounded channel.
///
/// This is how a connection task observes its town: the callback only
/// enqueues, and the task drains the receiver at its own pace.
#[derive(Debug, Clone)]
pub struct ChannelListener {
    tx: mpsc::UnboundedSender<TownEvent>,
}

impl ChannelListener {
    pub fn new(tx: mpsc::UnboundedSender<TownEvent>) -> Self {
        Self { tx }
    }

    /// Creates a listener together with the receiver it feeds.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<TownEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    fn forward(&self, event: TownEvent) -> Result<(), ListenerError> {
        self.tx.send(event).map_err(|_| ListenerError::Closed)
    }
}

impl TownListener for ChannelListener {
    fn on_player_joined(&self, player: &PlayerSnapshot) -> Result<(), ListenerError> {
        self.forward(TownEvent::PlayerJoined(player.clone()))
    }

    fn on_player_moved(&self, player: &PlayerSnapshot) -> Result<(), ListenerError> {
        self.forward(TownEvent::PlayerMoved(player.clone()))
    }

    fn on_player_disconnected(&self, player: &PlayerSnapshot) -> Result<(), ListenerError> {
        self.forward(TownEvent::PlayerDisconnected(player.clone()))
    }

    fn on_town_destroyed(&self) -> Result<(), ListenerError> {
        self.forward(TownEvent::TownDestroyed)
    }
}
