//! The per-town controller: settings, roster and listeners behind one lock.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use covey_protocol::{PlayerSnapshot, SessionToken, TownId, TownListEntry, UserLocation};
use covey_session::Roster;

use crate::{
    AdmissionPolicy, Delivery, FanoutReport, JoinRequest, ListenerHub, ListenerId, TownError,
    TownEvent, TownListener, TownSettings, TownState, TownUpdate,
};

/// What a successful join hands back to the new player.
#[derive(Debug, Clone)]
pub struct JoinGrant {
    /// The player's only credential. Not part of any snapshot.
    pub session_token: SessionToken,
    pub player: PlayerSnapshot,
    pub sprite_password_override: bool,
    pub settings: TownSettings,
    /// The roster right after the join, the new player included.
    pub current_players: Vec<PlayerSnapshot>,
}

struct TownInner {
    state: TownState,
    settings: TownSettings,
    roster: Roster,
    hub: ListenerHub,
}

/// One live town.
///
/// Every mutating operation takes the town's mutex, changes the roster,
/// and pushes the resulting event to every listener before releasing it.
/// Listeners therefore see roster changes in the order they happened, and
/// nothing after "town destroyed".
///
/// The update password and sprite password are held here but never
/// exposed; they were handed out once, at creation.
pub struct TownController {
    town_id: TownId,
    update_password: String,
    sprite_password: Option<String>,
    policy: AdmissionPolicy,
    inner: Mutex<TownInner>,
}

impl TownController {
    pub(crate) fn new(
        town_id: TownId,
        settings: TownSettings,
        update_password: String,
        sprite_password: Option<String>,
        policy: AdmissionPolicy,
    ) -> Self {
        Self {
            town_id,
            update_password,
            sprite_password,
            policy,
            inner: Mutex::new(TownInner {
                state: TownState::Active,
                settings,
                roster: Roster::new(),
                hub: ListenerHub::new(),
            }),
        }
    }

    /// Listener panics are caught before they can unwind through the
    /// lock, so a poisoned mutex still holds consistent state.
    fn lock(&self) -> MutexGuard<'_, TownInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn not_found(&self) -> TownError {
        TownError::NotFound(self.town_id.clone())
    }

    // -----------------------------------------------------------------------
    // Read accessors
    // -----------------------------------------------------------------------

    pub fn town_id(&self) -> &TownId {
        &self.town_id
    }

    pub fn state(&self) -> TownState {
        self.lock().state
    }

    pub fn settings(&self) -> TownSettings {
        self.lock().settings.clone()
    }

    pub fn occupancy(&self) -> usize {
        self.lock().roster.len()
    }

    /// Snapshots of every player, in join order.
    pub fn players(&self) -> Vec<PlayerSnapshot> {
        self.lock().roster.snapshots()
    }

    /// The player holding `token`, if any.
    pub fn player_for_token(&self, token: &SessionToken) -> Option<PlayerSnapshot> {
        self.lock().roster.get_by_token(token).map(|p| p.snapshot())
    }

    pub fn listener_count(&self) -> usize {
        self.lock().hub.len()
    }

    pub fn listing(&self) -> TownListEntry {
        let inner = self.lock();
        inner.settings.listing(&self.town_id, inner.roster.len())
    }

    /// The listing row, or `None` for private or destroyed towns. Reads
    /// visibility and occupancy under one lock.
    pub(crate) fn public_listing(&self) -> Option<TownListEntry> {
        let inner = self.lock();
        (inner.state.is_active() && inner.settings.is_publicly_listed)
            .then(|| inner.settings.listing(&self.town_id, inner.roster.len()))
    }

    // -----------------------------------------------------------------------
    // Password-gated operations (called by the registry)
    // -----------------------------------------------------------------------

    pub(crate) fn authorize(&self, password: &str) -> Result<(), TownError> {
        if password == self.update_password {
            Ok(())
        } else {
            Err(TownError::invalid_password())
        }
    }

    pub(crate) fn apply_update(&self, update: TownUpdate) -> Result<(), TownError> {
        let mut inner = self.lock();
        if !inner.state.is_active() {
            return Err(self.not_found());
        }
        inner.settings.apply(update);
        tracing::info!(town_id = %self.town_id, "town updated");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Roster operations
    // -----------------------------------------------------------------------

    /// Admits a new player and tells every listener.
    ///
    /// # Errors
    /// - [`TownError::NotFound`] if the town was destroyed
    /// - whatever the admission policy rejects with
    pub fn join_town(&self, request: &JoinRequest) -> Result<Delivery<JoinGrant>, TownError> {
        let mut guard = self.lock();
        let inner = &mut *guard;
        if !inner.state.is_active() {
            return Err(self.not_found());
        }

        let admission = self.policy.evaluate(
            &self.town_id,
            &inner.settings,
            self.sprite_password.as_deref(),
            inner.roster.len(),
            request,
        )?;

        let session = inner.roster.admit(&request.user_name, &request.avatar_name);
        let session_token = session.token().clone();
        let player = session.snapshot();

        let report = inner.hub.broadcast(&TownEvent::PlayerJoined(player.clone()), None);
        tracing::info!(
            town_id = %self.town_id,
            player_id = %player.player_id,
            occupancy = inner.roster.len(),
            "player joined"
        );

        let grant = JoinGrant {
            session_token,
            player,
            sprite_password_override: admission.sprite_password_override,
            settings: inner.settings.clone(),
            current_players: inner.roster.snapshots(),
        };
        Ok(Delivery::new(grant, report))
    }

    /// Records a movement report and tells every listener except the
    /// mover's own.
    ///
    /// # Errors
    /// [`TownError::Unauthorized`] if `token` belongs to no player here.
    pub fn report_movement(
        &self,
        token: &SessionToken,
        location: UserLocation,
    ) -> Result<Delivery<PlayerSnapshot>, TownError> {
        let mut guard = self.lock();
        let inner = &mut *guard;

        let player = inner
            .roster
            .update_location(token, location)
            .map_err(|_| TownError::invalid_token())?
            .snapshot();

        let report = inner
            .hub
            .broadcast(&TownEvent::PlayerMoved(player.clone()), Some(player.player_id));
        tracing::trace!(town_id = %self.town_id, player_id = %player.player_id, "player moved");
        Ok(Delivery::new(player, report))
    }

    /// Removes the token's player and tells every listener. Listeners the
    /// player's own connection registered are dropped first.
    ///
    /// # Errors
    /// [`TownError::Unauthorized`] if `token` belongs to no player here.
    /// Nothing is removed and nobody is notified in that case.
    pub fn disconnect(&self, token: &SessionToken) -> Result<Delivery<PlayerSnapshot>, TownError> {
        let mut guard = self.lock();
        let inner = &mut *guard;

        let player = inner
            .roster
            .remove_by_token(token)
            .map_err(|_| TownError::invalid_token())?
            .snapshot();

        inner.hub.remove_owned_by(player.player_id);
        let report = inner
            .hub
            .broadcast(&TownEvent::PlayerDisconnected(player.clone()), None);
        tracing::info!(
            town_id = %self.town_id,
            player_id = %player.player_id,
            occupancy = inner.roster.len(),
            "player disconnected"
        );
        Ok(Delivery::new(player, report))
    }

    // -----------------------------------------------------------------------
    // Listener registration
    // -----------------------------------------------------------------------

    /// Registers an observer of the whole town.
    ///
    /// # Errors
    /// [`TownError::NotFound`] if the town was destroyed.
    pub fn add_town_listener(&self, listener: Arc<dyn TownListener>) -> Result<ListenerId, TownError> {
        let mut inner = self.lock();
        if !inner.state.is_active() {
            return Err(self.not_found());
        }
        Ok(inner.hub.add(listener, None))
    }

    /// Registers a listener on behalf of the token's player. The player's
    /// own movement is not echoed to it, and it is dropped when the player
    /// disconnects.
    ///
    /// # Errors
    /// - [`TownError::NotFound`] if the town was destroyed
    /// - [`TownError::Unauthorized`] if `token` belongs to no player here
    pub fn add_player_listener(
        &self,
        token: &SessionToken,
        listener: Arc<dyn TownListener>,
    ) -> Result<ListenerId, TownError> {
        let mut guard = self.lock();
        let inner = &mut *guard;
        if !inner.state.is_active() {
            return Err(self.not_found());
        }
        let owner = inner
            .roster
            .get_by_token(token)
            .map(|p| p.player_id())
            .ok_or_else(TownError::invalid_token)?;
        Ok(inner.hub.add(listener, Some(owner)))
    }

    /// Returns `false` if `id` was not registered (or already removed).
    pub fn remove_town_listener(&self, id: ListenerId) -> bool {
        self.lock().hub.remove(id)
    }

    // -----------------------------------------------------------------------
    // Teardown
    // -----------------------------------------------------------------------

    /// Empties the roster, tells every listener the town is gone, and moves
    /// to [`TownState::Destroyed`].
    ///
    /// Each listener hears "town destroyed" exactly once, however many
    /// players there were. Calling this again is a no-op.
    pub fn disconnect_all_players(&self) -> FanoutReport {
        let mut guard = self.lock();
        let inner = &mut *guard;
        if !inner.state.is_active() {
            return FanoutReport::default();
        }

        let removed = inner.roster.clear();
        inner.state = TownState::Destroyed;
        let report = inner.hub.broadcast(&TownEvent::TownDestroyed, None);
        inner.hub.clear();

        tracing::info!(
            town_id = %self.town_id,
            players = removed.len(),
            listeners = report.delivered + report.failures.len(),
            "town destroyed"
        );
        report
    }
}

impl std::fmt::Debug for TownController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TownController")
            .field("town_id", &self.town_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ChannelListener, DEFAULT_MAX_OCCUPANCY};
    use covey_protocol::{Direction, MapId, PlayerId, SpriteRestriction};

    fn controller() -> TownController {
        TownController::new(
            TownId::new("0001ABCDEF"),
            TownSettings {
                friendly_name: "Alpha".into(),
                is_publicly_listed: true,
                map_id: MapId::Standard,
                enable_video: true,
                enable_proximity: true,
                sprite_restriction: SpriteRestriction::AllUsers,
                restricted_sprite_name: String::new(),
                maximum_occupancy: DEFAULT_MAX_OCCUPANCY,
            },
            "secret".into(),
            None,
            AdmissionPolicy::default(),
        )
    }

    fn spot(x: f64) -> UserLocation {
        UserLocation {
            x,
            y: 0.0,
            rotation: Direction::Back,
            moving: false,
        }
    }

    #[test]
    fn test_join_town_returns_grant_with_current_players() {
        let town = controller();
        town.join_town(&JoinRequest::new("ann", "misa")).unwrap();
        let grant = town.join_town(&JoinRequest::new("bob", "misa")).unwrap().into_value();

        assert_eq!(grant.player.player_id, PlayerId(2));
        assert_eq!(grant.current_players.len(), 2);
        assert_eq!(grant.settings.friendly_name, "Alpha");
        assert!(!grant.session_token.as_str().is_empty());
        assert_eq!(town.occupancy(), 2);
    }

    #[test]
    fn test_join_town_notifies_listener() {
        let town = controller();
        let (listener, mut rx) = ChannelListener::channel();
        town.add_town_listener(Arc::new(listener)).unwrap();

        let grant = town.join_town(&JoinRequest::new("ann", "misa")).unwrap().into_value();

        assert_eq!(rx.try_recv().unwrap(), TownEvent::PlayerJoined(grant.player));
    }

    #[test]
    fn test_report_movement_updates_location() {
        let town = controller();
        let grant = town.join_town(&JoinRequest::new("ann", "misa")).unwrap().into_value();

        let moved = town.report_movement(&grant.session_token, spot(7.0)).unwrap();
        assert_eq!(moved.value.location, spot(7.0));
        assert_eq!(town.players()[0].location, spot(7.0));
    }

    #[test]
    fn test_report_movement_unknown_token_is_unauthorized() {
        let town = controller();
        let result = town.report_movement(&SessionToken::new("forged"), spot(1.0));
        assert!(matches!(result, Err(TownError::Unauthorized(_))));
    }

    #[test]
    fn test_disconnect_twice_second_is_unauthorized() {
        let town = controller();
        let grant = town.join_town(&JoinRequest::new("ann", "misa")).unwrap().into_value();

        town.disconnect(&grant.session_token).unwrap();
        assert_eq!(town.occupancy(), 0);
        assert!(matches!(
            town.disconnect(&grant.session_token),
            Err(TownError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_disconnect_drops_player_owned_listeners() {
        let town = controller();
        let grant = town.join_town(&JoinRequest::new("ann", "misa")).unwrap().into_value();
        let (listener, _rx) = ChannelListener::channel();
        town.add_player_listener(&grant.session_token, Arc::new(listener)).unwrap();
        assert_eq!(town.listener_count(), 1);

        town.disconnect(&grant.session_token).unwrap();
        assert_eq!(town.listener_count(), 0);
    }

    #[test]
    fn test_add_player_listener_requires_valid_token() {
        let town = controller();
        let (listener, _rx) = ChannelListener::channel();
        let result = town.add_player_listener(&SessionToken::new("nope"), Arc::new(listener));
        assert!(matches!(result, Err(TownError::Unauthorized(_))));
    }

    #[test]
    fn test_disconnect_all_players_is_idempotent() {
        let town = controller();
        town.join_town(&JoinRequest::new("ann", "misa")).unwrap();
        let (listener, mut rx) = ChannelListener::channel();
        town.add_town_listener(Arc::new(listener)).unwrap();

        let first = town.disconnect_all_players();
        let second = town.disconnect_all_players();

        assert_eq!(first.delivered, 1);
        assert_eq!(second.delivered, 0);
        assert_eq!(town.state(), TownState::Destroyed);
        assert_eq!(town.occupancy(), 0);
        assert_eq!(rx.try_recv().unwrap(), TownEvent::TownDestroyed);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_destroyed_town_rejects_joins_and_listeners() {
        let town = controller();
        town.disconnect_all_players();

        assert!(matches!(
            town.join_town(&JoinRequest::new("ann", "misa")),
            Err(TownError::NotFound(_))
        ));
        let (listener, _rx) = ChannelListener::channel();
        assert!(matches!(
            town.add_town_listener(Arc::new(listener)),
            Err(TownError::NotFound(_))
        ));
        assert!(town.public_listing().is_none());
    }

    #[test]
    fn test_authorize_checks_update_password() {
        let town = controller();
        assert!(town.authorize("secret").is_ok());
        assert!(matches!(town.authorize("guess"), Err(TownError::Unauthorized(_))));
    }

    #[test]
    fn test_player_for_token_and_listener_count() {
        let town = controller();
        let grant = town.join_town(&JoinRequest::new("ann", "misa")).unwrap().into_value();

        let found = town.player_for_token(&grant.session_token).unwrap();
        assert_eq!(found.player_id, grant.player.player_id);
        assert!(town.player_for_token(&SessionToken::new("nope")).is_none());

        assert_eq!(town.listener_count(), 0);
        let (listener, _rx) = ChannelListener::channel();
        let id = town.add_player_listener(&grant.session_token, Arc::new(listener)).unwrap();
        assert_eq!(town.listener_count(), 1);
        assert!(town.remove_town_listener(id));
        assert!(!town.remove_town_listener(id));
        assert_eq!(town.listener_count(), 0);
    }
}
