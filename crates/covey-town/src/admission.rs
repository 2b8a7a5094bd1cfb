//! Join-time admission rules.
//!
//! Pure decision logic: nothing here touches a roster or a listener. The
//! controller calls [`AdmissionPolicy::evaluate`] under its lock, right
//! before admitting the player.

use covey_protocol::{SpriteRestriction, TownId, TownJoinRequest};

use crate::{SpriteEnforcement, TownError, TownSettings, TownsConfig};

/// What a prospective player presents when joining.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JoinRequest {
    pub user_name: String,
    pub avatar_name: String,
    /// Attempt at the town's sprite restriction password; empty if none.
    pub sprite_restriction_password: String,
}

impl JoinRequest {
    pub fn new(user_name: impl Into<String>, avatar_name: impl Into<String>) -> Self {
        Self {
            user_name: user_name.into(),
            avatar_name: avatar_name.into(),
            sprite_restriction_password: String::new(),
        }
    }

    pub fn with_sprite_password(mut self, attempt: impl Into<String>) -> Self {
        self.sprite_restriction_password = attempt.into();
        self
    }
}

impl From<TownJoinRequest> for JoinRequest {
    fn from(req: TownJoinRequest) -> Self {
        Self {
            user_name: req.user_name,
            avatar_name: req.avatar_name,
            sprite_restriction_password: req.sprite_restriction_password,
        }
    }
}

/// The outcome of a successful admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    /// `true` iff the town is `passwordUsers` and the attempt matched.
    pub sprite_password_override: bool,
}

/// Returns `true` iff `restriction` is `passwordUsers` and `attempt`
/// equals the town's sprite password. An absent password never matches.
pub fn sprite_password_override(
    restriction: SpriteRestriction,
    password: Option<&str>,
    attempt: &str,
) -> bool {
    restriction == SpriteRestriction::PasswordUsers && password.is_some_and(|p| p == attempt)
}

/// The admission rules of a registry, taken from its [`TownsConfig`].
#[derive(Debug, Clone, Copy)]
pub struct AdmissionPolicy {
    enforce_capacity: bool,
    sprite_enforcement: SpriteEnforcement,
}

impl AdmissionPolicy {
    pub fn new(config: &TownsConfig) -> Self {
        Self {
            enforce_capacity: config.enforce_capacity,
            sprite_enforcement: config.sprite_enforcement,
        }
    }

    /// Decides whether `request` may join a town with `settings` that
    /// currently holds `occupancy` players.
    ///
    /// Empty user or avatar names are accepted. Map, video and proximity
    /// settings play no part in the decision.
    ///
    /// # Errors
    /// - [`TownError::TownFull`] with capacity enforcement, when full
    /// - [`TownError::AvatarRestricted`] with strict sprite enforcement,
    ///   when the avatar breaks the restriction
    pub fn evaluate(
        &self,
        town_id: &TownId,
        settings: &TownSettings,
        sprite_password: Option<&str>,
        occupancy: usize,
        request: &JoinRequest,
    ) -> Result<Admission, TownError> {
        if self.enforce_capacity && occupancy >= settings.maximum_occupancy {
            return Err(TownError::TownFull(town_id.clone()));
        }

        let overridden = sprite_password_override(
            settings.sprite_restriction,
            sprite_password,
            &request.sprite_restriction_password,
        );

        if self.sprite_enforcement == SpriteEnforcement::Strict {
            let must_use_restricted = match settings.sprite_restriction {
                SpriteRestriction::AllUsers => false,
                SpriteRestriction::PasswordUsers => !overridden,
                SpriteRestriction::NoUsers => true,
            };
            if must_use_restricted && request.avatar_name != settings.restricted_sprite_name {
                return Err(TownError::AvatarRestricted {
                    avatar: request.avatar_name.clone(),
                    required: settings.restricted_sprite_name.clone(),
                });
            }
        }

        Ok(Admission {
            sprite_password_override: overridden,
        })
    }
}

impl Default for AdmissionPolicy {
    fn default() -> Self {
        Self::new(&TownsConfig::default())
    }
}
