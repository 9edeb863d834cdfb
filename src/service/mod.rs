//! High-level authorization API.
//!
//! [`AccessService`] is what an HTTP layer calls. Every operation follows
//! the same shape: load the entities one decision needs through the
//! [`EntityStore`], hand the snapshot to a pure resolver from
//! [`crate::access`], and only then apply the resulting write.
//!
//! # Example
//!
//! ```ignore
//! use std::path::Path;
//! use circle_core::{AccessService, EngineConfig};
//!
//! let service = AccessService::open(Path::new("/data/app"), EngineConfig::default())?;
//! let lists = service.accessible_lists(viewer_id)?;
//! ```

mod circles;
mod content;
mod follows;

use std::collections::HashMap;
use std::path::Path;

use serde::Serialize;

pub use circles::JoinOutcome;

use crate::access::{
    count_visibility, resolve_follow_gate, resolve_visibility, Access, Action, GateDecision,
    MembershipSnapshot,
};
use crate::config::EngineConfig;
use crate::error::{AccessError, ConflictKind, DenyReason, Result};
use crate::model::{NewUser, PrivacySettings, PrivacyUpdate, Shareable, User, UserId};
use crate::store::{EntityStore, InsertOutcome, SqliteStore};

/// Counters shown on a profile. `None` means hidden from this viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileCounts {
    pub followers: Option<usize>,
    pub following: Option<usize>,
}

/// Authorization and membership engine over an [`EntityStore`].
pub struct AccessService<S = SqliteStore> {
    store: S,
    config: EngineConfig,
}

impl AccessService<SqliteStore> {
    /// Opens the engine with a `SQLite` store inside `data_dir`.
    ///
    /// Creates the directory and the database file if they don't exist.
    ///
    /// # Arguments
    ///
    /// * `data_dir` - Base directory for the database
    /// * `config` - Engine configuration
    ///
    /// # Errors
    ///
    /// Returns `Validation` for an invalid config, or `Storage`/`Database`
    /// if initialization fails.
    pub fn open(data_dir: &Path, config: EngineConfig) -> Result<Self> {
        config.validate()?;

        std::fs::create_dir_all(data_dir)
            .map_err(|e| AccessError::Storage(format!("Failed to create data directory: {e}")))?;

        let db_path = data_dir.join(&config.database_file);
        let store = SqliteStore::open(&db_path)?.with_insert_retries(config.insert_retries);

        tracing::info!(path = %db_path.display(), "opened access store");
        Ok(Self { store, config })
    }

    /// Creates an engine over an in-memory store.
    ///
    /// # Errors
    ///
    /// Returns an error if the config is invalid or the store cannot be
    /// initialized.
    #[cfg(any(test, feature = "test-utils"))]
    pub fn in_memory(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let store = SqliteStore::in_memory()?.with_insert_retries(config.insert_retries);
        Ok(Self { store, config })
    }
}

impl<S: EntityStore> AccessService<S> {
    /// Creates an engine over an existing store.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the config is invalid.
    pub fn with_store(store: S, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { store, config })
    }

    /// The engine configuration.
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The underlying store.
    pub const fn store(&self) -> &S {
        &self.store
    }

    // ==================== Users ====================

    /// Registers a user with default privacy settings.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for an empty username and
    /// `Conflict(Taken("username"))` if the username is in use.
    pub fn register(&self, user: &NewUser) -> Result<User> {
        let username = user.username.trim();
        if username.is_empty() {
            return Err(AccessError::Validation("Username is required".to_string()));
        }
        let normalized = NewUser {
            username: username.to_string(),
            ..user.clone()
        };
        match self.store.insert_user(&normalized, now())? {
            InsertOutcome::Created(user) => {
                tracing::info!(user_id = %user.id, "registered user");
                Ok(user)
            }
            InsertOutcome::AlreadyExists => Err(AccessError::Conflict(ConflictKind::Taken("username"))),
        }
    }

    /// Loads a user.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the user does not exist.
    pub fn user(&self, id: UserId) -> Result<User> {
        self.store
            .get_user(id)?
            .ok_or_else(|| AccessError::NotFound(format!("user {id}")))
    }

    /// Updates `target`'s privacy settings. Only the user themself may.
    ///
    /// The follow gate reads the new values on the next decision.
    ///
    /// # Errors
    ///
    /// Returns `AccessDenied(NotSelf)` if `actor != target` and `NotFound`
    /// if the user does not exist.
    pub fn update_privacy(
        &self,
        actor: UserId,
        target: UserId,
        update: PrivacyUpdate,
    ) -> Result<PrivacySettings> {
        if actor != target {
            tracing::debug!(%actor, %target, "privacy update denied");
            return Err(AccessError::AccessDenied(DenyReason::NotSelf));
        }
        let user = self.user(target)?;
        let merged = user.privacy.merged(update);
        if !self.store.update_privacy(target, &merged)? {
            return Err(AccessError::NotFound(format!("user {target}")));
        }
        tracing::info!(
            user_id = %target,
            private_profile = merged.private_profile,
            require_follow_approval = merged.require_follow_approval,
            "updated privacy settings"
        );
        Ok(merged)
    }

    /// Follower and following counts as `viewer` may see them.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if `owner` does not exist.
    pub fn profile_counts(&self, viewer: UserId, owner: UserId) -> Result<ProfileCounts> {
        let user = self.user(owner)?;
        let shown = count_visibility(viewer, owner, &user.privacy);
        let counts = self.store.follow_counts(owner)?;
        Ok(ProfileCounts {
            followers: shown.followers.then_some(counts.followers),
            following: shown.following.then_some(counts.following),
        })
    }

    // ==================== Snapshots ====================

    /// Memberships and pending requests of one user.
    fn user_snapshot(&self, user_id: UserId) -> Result<MembershipSnapshot> {
        let mut snapshot = MembershipSnapshot::from_memberships(&self.store.memberships_of_user(user_id)?);
        for request in self.store.pending_requests_of_user(user_id)? {
            snapshot.insert_request(&request);
        }
        Ok(snapshot)
    }

    /// Follow gate between `viewer` and `owner`, read from current state.
    fn follow_gate(&self, viewer: UserId, owner: UserId) -> Result<GateDecision> {
        if viewer == owner {
            return Ok(GateDecision::Allow);
        }
        let owner_user = self.user(owner)?;
        let edge = if owner_user.privacy.private_profile {
            self.store.follow_between(viewer, owner)?
        } else {
            None
        };
        Ok(resolve_follow_gate(viewer, owner, &owner_user.privacy, edge.as_ref()))
    }

    /// Runs the visibility resolver for one item.
    fn decide<T: Shareable>(&self, item: &T, action: Action, requester: UserId) -> Result<Access> {
        if item.owner_id() == requester {
            return Ok(resolve_visibility(
                item,
                action,
                requester,
                &MembershipSnapshot::new(),
                GateDecision::Allow,
            ));
        }
        let memberships = self.user_snapshot(requester)?;
        let gate = self.follow_gate(requester, item.owner_id())?;
        Ok(resolve_visibility(item, action, requester, &memberships, gate))
    }

    /// Like [`Self::decide`], but turns a denial into `AccessDenied`.
    fn authorize<T: Shareable>(&self, item: &T, action: Action, requester: UserId) -> Result<()> {
        let access = self.decide(item, action, requester)?;
        if let Access::Deny(reason) = access {
            tracing::debug!(
                kind = item.kind().as_str(),
                owner = %item.owner_id(),
                %requester,
                ?action,
                %reason,
                "access denied"
            );
        }
        access.into_result()
    }

    /// Filters `items` down to what `viewer` may read.
    ///
    /// The viewer's memberships are loaded once and follow gates are
    /// cached per owner.
    fn readable<T: Shareable>(&self, viewer: UserId, items: Vec<T>) -> Result<Vec<T>> {
        let memberships = self.user_snapshot(viewer)?;
        let mut gates: HashMap<UserId, GateDecision> = HashMap::new();
        let mut visible = Vec::with_capacity(items.len());
        for item in items {
            let owner = item.owner_id();
            let gate = match gates.get(&owner) {
                Some(gate) => *gate,
                None => {
                    let gate = self.follow_gate(viewer, owner)?;
                    gates.insert(owner, gate);
                    gate
                }
            };
            if resolve_visibility(&item, Action::Read, viewer, &memberships, gate).is_allowed() {
                visible.push(item);
            }
        }
        Ok(visible)
    }
}

/// Current Unix timestamp in seconds.
fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Trims `text` and rejects it if empty.
fn required_text(text: &str, field: &str) -> Result<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(AccessError::Validation(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}
