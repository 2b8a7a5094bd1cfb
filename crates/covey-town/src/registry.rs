//! The town registry: creates, finds, lists, updates and deletes towns.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use covey_protocol::{TownCreateRequest, TownCreateResponse, TownId, TownListEntry};
use covey_session::random_hex;

use crate::{
    AdmissionPolicy, Delivery, FanoutReport, JoinGrant, JoinRequest, TownController, TownError,
    TownSettings, TownUpdate, TownsConfig,
};

/// Random bytes in the update password (rendered as hex).
const UPDATE_PASSWORD_BYTES: usize = 12;
/// Random bytes in the sprite restriction password.
const SPRITE_PASSWORD_BYTES: usize = 6;

/// A freshly created town and its secrets.
///
/// This is the only place the update password and sprite restriction
/// password are ever readable. Hand them to the creator and drop them.
#[derive(Debug, Clone)]
pub struct CreatedTown {
    pub controller: Arc<TownController>,
    pub town_id: TownId,
    pub update_password: String,
    /// Present iff the town restricts sprites.
    pub sprite_restriction_password: Option<String>,
}

impl CreatedTown {
    /// The wire response for the creator.
    pub fn response(&self) -> TownCreateResponse {
        TownCreateResponse {
            town_id: self.town_id.clone(),
            update_password: self.update_password.clone(),
            sprite_restriction_password: self.sprite_restriction_password.clone(),
        }
    }
}

/// Directory of every live town in the process.
///
/// Construct one at startup and share it behind an `Arc`. Lookups and
/// listings take a read lock; create and delete take the write lock
/// briefly. Town operations themselves only lock their own town, so busy
/// towns do not slow each other down.
#[derive(Debug)]
pub struct TownRegistry {
    config: TownsConfig,
    policy: AdmissionPolicy,
    towns: RwLock<HashMap<TownId, Arc<TownController>>>,
    /// Prefix of every town id; never reused, so ids stay unique even
    /// after deletion.
    next_seq: AtomicU64,
}

impl TownRegistry {
    pub fn new(config: TownsConfig) -> Self {
        Self {
            policy: AdmissionPolicy::new(&config),
            config,
            towns: RwLock::new(HashMap::new()),
            next_seq: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &TownsConfig {
        &self.config
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<TownId, Arc<TownController>>> {
        self.towns.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<TownId, Arc<TownController>>> {
        self.towns.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Four hex digits of sequence (more once it outgrows them) followed by
    /// six random ones, e.g. `0001A3F1C2`.
    fn next_town_id(&self) -> TownId {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        TownId::new(format!("{seq:04X}{}", random_hex(3).to_uppercase()))
    }

    /// Creates and registers a new town.
    ///
    /// # Errors
    /// [`TownError::InvalidArgument`] if the friendly name is empty, or if
    /// the town restricts sprites but names no restricted sprite.
    pub fn create_town(&self, request: TownCreateRequest) -> Result<CreatedTown, TownError> {
        if request.friendly_name.is_empty() {
            return Err(TownError::InvalidArgument("friendly name must not be empty".into()));
        }
        let restricted = request.sprite_restriction.is_restricted();
        if restricted && request.restricted_sprite_name.is_empty() {
            return Err(TownError::InvalidArgument(format!(
                "restricted sprite name is required for {}",
                request.sprite_restriction
            )));
        }

        let town_id = self.next_town_id();
        let update_password = random_hex(UPDATE_PASSWORD_BYTES);
        let sprite_restriction_password = restricted.then(|| random_hex(SPRITE_PASSWORD_BYTES));

        let settings = TownSettings {
            friendly_name: request.friendly_name,
            is_publicly_listed: request.is_publicly_listed,
            map_id: request.map_id,
            enable_video: request.enable_video,
            enable_proximity: request.enable_proximity,
            sprite_restriction: request.sprite_restriction,
            restricted_sprite_name: request.restricted_sprite_name,
            maximum_occupancy: self.config.max_occupancy,
        };
        let controller = Arc::new(TownController::new(
            town_id.clone(),
            settings,
            update_password.clone(),
            sprite_restriction_password.clone(),
            self.policy,
        ));

        self.write().insert(town_id.clone(), Arc::clone(&controller));
        tracing::info!(%town_id, "town created");

        Ok(CreatedTown {
            controller,
            town_id,
            update_password,
            sprite_restriction_password,
        })
    }

    /// Looks up a live town. Returns the same `Arc` every time until the
    /// town is deleted.
    pub fn get_controller_for_town(&self, town_id: &TownId) -> Option<Arc<TownController>> {
        self.read().get(town_id).cloned()
    }

    fn require(&self, town_id: &TownId) -> Result<Arc<TownController>, TownError> {
        self.get_controller_for_town(town_id)
            .ok_or_else(|| TownError::NotFound(town_id.clone()))
    }

    /// Public towns, ordered by id (creation order).
    pub fn get_towns(&self) -> Vec<TownListEntry> {
        let controllers: Vec<Arc<TownController>> = self.read().values().cloned().collect();
        let mut towns: Vec<TownListEntry> = controllers
            .iter()
            .filter_map(|town| town.public_listing())
            .collect();
        towns.sort_by(|a, b| a.town_id.cmp(&b.town_id));
        towns
    }

    /// Applies a password-gated partial update.
    ///
    /// # Errors
    /// - [`TownError::NotFound`] for an unknown town
    /// - [`TownError::Unauthorized`] for a wrong password
    /// - [`TownError::InvalidArgument`] for an empty new friendly name
    ///
    /// On any error no field changes.
    pub fn update_town(
        &self,
        town_id: &TownId,
        password: &str,
        update: TownUpdate,
    ) -> Result<(), TownError> {
        let town = self.require(town_id)?;
        town.authorize(password)?;
        if update.friendly_name.as_deref() == Some("") {
            return Err(TownError::InvalidArgument("friendly name must not be empty".into()));
        }
        town.apply_update(update)
    }

    /// Deletes a town: removes it from the registry, then empties its
    /// roster and tells each listener once.
    ///
    /// # Errors
    /// - [`TownError::NotFound`] for an unknown town
    /// - [`TownError::Unauthorized`] for a wrong password
    pub fn delete_town(&self, town_id: &TownId, password: &str) -> Result<FanoutReport, TownError> {
        let town = {
            let mut towns = self.write();
            let town = towns
                .get(town_id)
                .ok_or_else(|| TownError::NotFound(town_id.clone()))?;
            town.authorize(password)?;
            towns
                .remove(town_id)
                .ok_or_else(|| TownError::NotFound(town_id.clone()))?
        };

        tracing::info!(%town_id, "town deleted");
        Ok(town.disconnect_all_players())
    }

    /// Lookup plus [`TownController::join_town`].
    ///
    /// # Errors
    /// [`TownError::NotFound`] for an unknown town, or any join error.
    pub fn join_town(
        &self,
        town_id: &TownId,
        request: &JoinRequest,
    ) -> Result<Delivery<JoinGrant>, TownError> {
        self.require(town_id)?.join_town(request)
    }

    /// Number of live towns, public or not.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

impl Default for TownRegistry {
    fn default() -> Self {
        Self::new(TownsConfig::default())
    }
}
