//! Follow-gated profile access.
//!
//! A user with `private_profile` set shows their profile content only to
//! accepted followers. `require_follow_approval` decides whether a new
//! follow starts pending or accepted.

use serde::Serialize;

use crate::error::{AccessError, ConflictKind, Result};
use crate::model::{FollowEdge, FollowStatus, PrivacySettings, UserId};

/// Outcome of the follow gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GateDecision {
    Allow,
    Deny,
}

impl GateDecision {
    /// Returns whether the gate is open.
    #[must_use]
    pub const fn is_allowed(self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Decides whether `viewer_id` may see `owner_id`'s follow-gated content.
///
/// `edge` must be the viewer's edge toward the owner; an edge for any
/// other pair is ignored.
#[must_use]
pub fn resolve_follow_gate(
    viewer_id: UserId,
    owner_id: UserId,
    owner_privacy: &PrivacySettings,
    edge: Option<&FollowEdge>,
) -> GateDecision {
    if viewer_id == owner_id || !owner_privacy.private_profile {
        return GateDecision::Allow;
    }
    let accepted = edge.is_some_and(|e| {
        e.follower_id == viewer_id && e.followee_id == owner_id && e.is_accepted()
    });
    if accepted {
        GateDecision::Allow
    } else {
        GateDecision::Deny
    }
}

/// Decides the status of a new follow edge from `follower` to `followee`.
///
/// # Errors
///
/// Returns `Validation` for a self-follow and `Conflict` if an edge for
/// the pair already exists.
pub fn plan_follow(
    follower: UserId,
    followee: UserId,
    followee_privacy: &PrivacySettings,
    existing: Option<&FollowEdge>,
) -> Result<FollowStatus> {
    if follower == followee {
        return Err(AccessError::Validation(
            "You cannot follow yourself".to_string(),
        ));
    }
    match existing.map(|e| e.status) {
        Some(FollowStatus::Accepted) => Err(AccessError::Conflict(ConflictKind::AlreadyFollowing)),
        Some(FollowStatus::Pending) => Err(AccessError::Conflict(ConflictKind::FollowPending)),
        None if followee_privacy.require_follow_approval => Ok(FollowStatus::Pending),
        None => Ok(FollowStatus::Accepted),
    }
}

/// Which profile counters `viewer_id` may see on `owner_id`'s profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CountVisibility {
    pub followers: bool,
    pub following: bool,
}

/// Applies the owner's counter preferences. The owner always sees both.
#[must_use]
pub fn count_visibility(
    viewer_id: UserId,
    owner_id: UserId,
    owner_privacy: &PrivacySettings,
) -> CountVisibility {
    if viewer_id == owner_id {
        return CountVisibility {
            followers: true,
            following: true,
        };
    }
    CountVisibility {
        followers: owner_privacy.show_followers_count,
        following: owner_privacy.show_following_count,
    }
}
