//! Membership resolution.
//!
//! Computes a user's effective role in a circle from an already-loaded
//! [`MembershipSnapshot`] and decides what a join attempt should do. The
//! functions here never touch storage; the service applies their result.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::error::{AccessError, DenyReason, Result};
use crate::model::{
    Circle, CircleId, CircleMembership, CircleRole, MemberRequest, RequestStatus, UserId,
};

/// A user's effective standing in a circle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EffectiveRole {
    /// No membership and no pending request.
    None,
    /// A member request is awaiting a decision. Grants nothing.
    Pending,
    Member,
    Admin,
    Owner,
}

impl EffectiveRole {
    /// Returns whether the user holds an active membership.
    #[must_use]
    pub const fn is_member(self) -> bool {
        matches!(self, Self::Member | Self::Admin | Self::Owner)
    }

    /// Returns whether the user may manage members, requests and invites.
    #[must_use]
    pub const fn can_manage_members(self) -> bool {
        matches!(self, Self::Admin | Self::Owner)
    }

    /// Returns the membership role, if the user is a member.
    #[must_use]
    pub const fn circle_role(self) -> Option<CircleRole> {
        match self {
            Self::Member => Some(CircleRole::Member),
            Self::Admin => Some(CircleRole::Admin),
            Self::Owner => Some(CircleRole::Owner),
            Self::None | Self::Pending => None,
        }
    }
}

impl From<CircleRole> for EffectiveRole {
    fn from(role: CircleRole) -> Self {
        match role {
            CircleRole::Owner => Self::Owner,
            CircleRole::Admin => Self::Admin,
            CircleRole::Member => Self::Member,
        }
    }
}

/// Loaded membership rows and pending requests, keyed for O(1) lookup.
#[derive(Debug, Clone, Default)]
pub struct MembershipSnapshot {
    roles: HashMap<(CircleId, UserId), CircleRole>,
    pending: HashSet<(CircleId, UserId)>,
}

impl MembershipSnapshot {
    /// Creates an empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a snapshot from membership rows.
    #[must_use]
    pub fn from_memberships<'a>(rows: impl IntoIterator<Item = &'a CircleMembership>) -> Self {
        let mut snapshot = Self::new();
        for row in rows {
            snapshot.insert(row);
        }
        snapshot
    }

    /// Records a membership row.
    pub fn insert(&mut self, membership: &CircleMembership) {
        self.roles
            .insert((membership.circle_id, membership.user_id), membership.role);
    }

    /// Records a member role directly.
    #[must_use]
    pub fn with_role(mut self, circle_id: CircleId, user_id: UserId, role: CircleRole) -> Self {
        self.roles.insert((circle_id, user_id), role);
        self
    }

    /// Records a member request. Only pending requests affect resolution.
    pub fn insert_request(&mut self, request: &MemberRequest) {
        if request.status == RequestStatus::Pending {
            self.pending.insert((request.circle_id, request.user_id));
        }
    }

    /// Returns the effective role of `user_id` in `circle_id`.
    ///
    /// An active membership wins over a stale pending request.
    #[must_use]
    pub fn role_of(&self, circle_id: CircleId, user_id: UserId) -> EffectiveRole {
        if let Some(role) = self.roles.get(&(circle_id, user_id)) {
            return (*role).into();
        }
        if self.pending.contains(&(circle_id, user_id)) {
            EffectiveRole::Pending
        } else {
            EffectiveRole::None
        }
    }

    /// Number of membership rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.roles.len()
    }

    /// Returns whether the snapshot holds no memberships.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}

/// Result of [`resolve_membership`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipView {
    pub role: EffectiveRole,
    /// True iff the role is owner or admin.
    pub can_manage_members: bool,
    /// Whether the invite code alone grants immediate entry.
    pub can_join_directly: bool,
}

/// Resolves `user_id`'s standing in `circle`.
#[must_use]
pub fn resolve_membership(
    circle: &Circle,
    user_id: UserId,
    snapshot: &MembershipSnapshot,
) -> MembershipView {
    let role = snapshot.role_of(circle.id, user_id);
    MembershipView {
        role,
        can_manage_members: role.can_manage_members(),
        can_join_directly: circle.allow_public_join,
    }
}

/// What a join attempt should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinPlan {
    /// Already a member; nothing to write.
    AlreadyMember(CircleRole),
    /// A request is already pending; nothing to write.
    AlreadyRequested,
    /// Create a membership with role `member`.
    AddMember,
    /// File a pending member request. No membership is written.
    FileRequest,
}

/// Decides the effect of `user_id` joining `circle`.
///
/// Holding the invite code is never enough for a restricted circle: the
/// only write allowed there is a member request.
#[must_use]
pub fn plan_join(circle: &Circle, user_id: UserId, snapshot: &MembershipSnapshot) -> JoinPlan {
    match snapshot.role_of(circle.id, user_id) {
        EffectiveRole::Owner => JoinPlan::AlreadyMember(CircleRole::Owner),
        EffectiveRole::Admin => JoinPlan::AlreadyMember(CircleRole::Admin),
        EffectiveRole::Member => JoinPlan::AlreadyMember(CircleRole::Member),
        EffectiveRole::Pending if !circle.allow_public_join => JoinPlan::AlreadyRequested,
        EffectiveRole::Pending | EffectiveRole::None => {
            if circle.allow_public_join {
                JoinPlan::AddMember
            } else {
                JoinPlan::FileRequest
            }
        }
    }
}

/// Requires `actor` to be an owner or admin of `circle_id`.
///
/// # Errors
///
/// Returns `AccessDenied(NotCircleManager)` otherwise.
pub fn require_manager(
    circle_id: CircleId,
    actor: UserId,
    snapshot: &MembershipSnapshot,
) -> Result<CircleRole> {
    snapshot
        .role_of(circle_id, actor)
        .circle_role()
        .filter(CircleRole::can_manage_members)
        .ok_or(AccessError::AccessDenied(DenyReason::NotCircleManager))
}

/// Checks that `actor` may remove `target` from `circle_id`.
///
/// Owners may remove anyone but themselves; admins may remove plain
/// members only. Removing oneself is leaving, which only the owner
/// cannot do.
///
/// # Errors
///
/// Returns `NotFound` if `target` is not a member, `InvalidState` if the
/// target is the owner, and `AccessDenied` if `actor` lacks rank.
pub fn check_removal(
    circle_id: CircleId,
    actor: UserId,
    target: UserId,
    snapshot: &MembershipSnapshot,
) -> Result<()> {
    let target_role = snapshot
        .role_of(circle_id, target)
        .circle_role()
        .ok_or_else(|| AccessError::NotFound(format!("user {target} in circle {circle_id}")))?;

    if target_role == CircleRole::Owner {
        return Err(AccessError::InvalidState(
            "the circle owner cannot leave or be removed".to_string(),
        ));
    }
    if actor == target {
        return Ok(());
    }

    match require_manager(circle_id, actor, snapshot)? {
        CircleRole::Owner => Ok(()),
        CircleRole::Admin if target_role == CircleRole::Member => Ok(()),
        _ => Err(AccessError::AccessDenied(DenyReason::NotCircleManager)),
    }
}

/// Checks that `actor` may set `target`'s role to `new_role`.
///
/// Only the owner changes roles, and only between `member` and `admin`.
///
/// # Errors
///
/// Returns `Validation` for `new_role == Owner`, `AccessDenied` if `actor`
/// is not the owner, `NotFound` if `target` is not a member and
/// `InvalidState` if `target` is the owner.
pub fn check_role_change(
    circle_id: CircleId,
    actor: UserId,
    target: UserId,
    new_role: CircleRole,
    snapshot: &MembershipSnapshot,
) -> Result<()> {
    if new_role == CircleRole::Owner {
        return Err(AccessError::Validation(
            "ownership cannot be assigned".to_string(),
        ));
    }
    if snapshot.role_of(circle_id, actor) != EffectiveRole::Owner {
        return Err(AccessError::AccessDenied(DenyReason::NotCircleManager));
    }
    match snapshot.role_of(circle_id, target) {
        EffectiveRole::Owner => Err(AccessError::InvalidState(
            "the owner's role cannot change".to_string(),
        )),
        role if role.is_member() => Ok(()),
        _ => Err(AccessError::NotFound(format!(
            "user {target} in circle {circle_id}"
        ))),
    }
}
