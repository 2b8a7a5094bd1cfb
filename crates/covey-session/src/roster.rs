//! The roster: every player currently in one town.
//!
//! # Concurrency note
//!
//! `Roster` is a plain data structure with no locking of its own. Each
//! town keeps exactly one roster behind its own mutex, together with the
//! listeners that must observe every roster change in order.

use std::collections::{BTreeMap, HashMap};

use covey_protocol::{PlayerId, PlayerSnapshot, SessionToken, UserLocation};

use crate::{PlayerSession, SessionError, generate_token};

/// Players of one town, keyed by id and indexed by session token.
///
/// Player ids come from a per-roster counter that never goes backwards, so
/// a `BTreeMap` keyed by id iterates in join order.
///
/// ```text
/// admit() ──→ [in roster] ──→ remove_by_token()
///                  │    ↺ update_location()
///                  └──────────→ clear()   (town destroyed)
/// ```
#[derive(Debug, Default)]
pub struct Roster {
    players: BTreeMap<PlayerId, PlayerSession>,
    /// Kept in sync with `players`.
    tokens: HashMap<SessionToken, PlayerId>,
    next_id: u64,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a new player at the spawn point with a fresh id and token.
    ///
    /// Names are stored as given; empty names are allowed.
    pub fn admit(&mut self, user_name: &str, avatar_name: &str) -> &PlayerSession {
        self.next_id += 1;
        let player_id = PlayerId(self.next_id);
        let token = generate_token();

        self.tokens.insert(token.clone(), player_id);
        tracing::debug!(%player_id, "player admitted to roster");
        self.players
            .entry(player_id)
            .or_insert(PlayerSession::new(player_id, user_name, avatar_name, token))
    }

    pub fn get(&self, player_id: PlayerId) -> Option<&PlayerSession> {
        self.players.get(&player_id)
    }

    /// Resolves a session token to its player.
    pub fn get_by_token(&self, token: &SessionToken) -> Option<&PlayerSession> {
        self.tokens
            .get(token)
            .and_then(|player_id| self.players.get(player_id))
    }

    /// Records a movement report for the token's player.
    ///
    /// # Errors
    /// [`SessionError::UnknownToken`] if no player holds `token`.
    pub fn update_location(
        &mut self,
        token: &SessionToken,
        location: UserLocation,
    ) -> Result<&PlayerSession, SessionError> {
        let player_id = self.tokens.get(token).ok_or(SessionError::UnknownToken)?;
        let session = self
            .players
            .get_mut(player_id)
            .ok_or(SessionError::UnknownToken)?;
        session.set_location(location);
        Ok(&*session)
    }

    /// Removes the token's player. The token stops working immediately.
    ///
    /// # Errors
    /// [`SessionError::UnknownToken`] if no player holds `token`; nothing
    /// is removed in that case.
    pub fn remove_by_token(&mut self, token: &SessionToken) -> Result<PlayerSession, SessionError> {
        let player_id = self.tokens.remove(token).ok_or(SessionError::UnknownToken)?;
        let session = self
            .players
            .remove(&player_id)
            .ok_or(SessionError::UnknownToken)?;
        tracing::debug!(%player_id, "player removed from roster");
        Ok(session)
    }

    /// Removes every player and invalidates every token. Returns the
    /// removed sessions in join order. The id counter is not reset.
    pub fn clear(&mut self) -> Vec<PlayerSession> {
        self.tokens.clear();
        std::mem::take(&mut self.players).into_values().collect()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Public views of every player, in join order.
    pub fn snapshots(&self) -> Vec<PlayerSnapshot> {
        self.players.values().map(PlayerSession::snapshot).collect()
    }
}

// =========================================================================
// Tests
// =========================================================================
