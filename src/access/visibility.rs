//! Read/write decisions for lists and posts.
//!
//! Rules are evaluated in order and the first match wins:
//!
//! 1. The owner may read and write.
//! 2. Anyone else is refused writes (`not_owner`).
//! 3. Public content is readable unless the owner's profile is private
//!    and the requester is not an accepted follower (`follow_required`).
//! 4. Circle content is readable by members of the target circle, and by
//!    no one else (`not_circle_member`). Pending requests grant nothing.
//! 5. Private content is refused (`private`).

use serde::Serialize;

use super::follow_gate::GateDecision;
use super::membership::MembershipSnapshot;
use crate::error::{AccessError, DenyReason, Result};
use crate::model::{Shareable, UserId, Visibility};

/// What the requester wants to do with the item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Read,
    Write,
}

/// Resolver verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "decision", content = "reason")]
pub enum Access {
    AllowRead,
    AllowWrite,
    Deny(DenyReason),
}

impl Access {
    /// Returns whether the action is permitted.
    #[must_use]
    pub const fn is_allowed(self) -> bool {
        !matches!(self, Self::Deny(_))
    }

    /// Converts a denial into `AccessDenied`.
    ///
    /// # Errors
    ///
    /// Returns `AccessDenied(reason)` for [`Access::Deny`].
    pub fn into_result(self) -> Result<()> {
        match self {
            Self::Deny(reason) => Err(AccessError::AccessDenied(reason)),
            Self::AllowRead | Self::AllowWrite => Ok(()),
        }
    }
}

/// Decides whether `requester` may perform `action` on `item`.
///
/// `memberships` must cover the requester's rows; `owner_gate` is the
/// follow gate between the requester and the item's owner.
#[must_use]
pub fn resolve_visibility<T: Shareable + ?Sized>(
    item: &T,
    action: Action,
    requester: UserId,
    memberships: &MembershipSnapshot,
    owner_gate: GateDecision,
) -> Access {
    if item.owner_id() == requester {
        return match action {
            Action::Read => Access::AllowRead,
            Action::Write => Access::AllowWrite,
        };
    }
    if action == Action::Write {
        return Access::Deny(DenyReason::NotOwner);
    }
    match item.visibility() {
        Visibility::Public if owner_gate.is_allowed() => Access::AllowRead,
        Visibility::Public => Access::Deny(DenyReason::FollowRequired),
        Visibility::Circle(circle_id) => {
            if memberships.role_of(circle_id, requester).is_member() {
                Access::AllowRead
            } else {
                Access::Deny(DenyReason::NotCircleMember)
            }
        }
        Visibility::Private => Access::Deny(DenyReason::Private),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        CircleId, CircleRole, ListId, MemberRequest, RequestId, RequestStatus, RestaurantList,
    };

    const OWNER: UserId = UserId(1);
    const MEMBER: UserId = UserId(2);
    const STRANGER: UserId = UserId(3);
    const CIRCLE: CircleId = CircleId(7);

    fn list(visibility: Visibility) -> RestaurantList {
        RestaurantList {
            id: ListId(1),
            created_by_id: OWNER,
            name: "Ramen Spots".to_string(),
            description: None,
            visibility,
            created_at: 0,
            updated_at: 0,
        }
    }

    fn memberships() -> MembershipSnapshot {
        MembershipSnapshot::new()
            .with_role(CIRCLE, OWNER, CircleRole::Owner)
            .with_role(CIRCLE, MEMBER, CircleRole::Member)
    }

    #[test]
    fn owner_reads_and_writes_everything() {
        for visibility in [
            Visibility::Private,
            Visibility::Public,
            Visibility::Circle(CIRCLE),
        ] {
            let item = list(visibility);
            let snap = MembershipSnapshot::new();
            assert_eq!(
                resolve_visibility(&item, Action::Read, OWNER, &snap, GateDecision::Deny),
                Access::AllowRead
            );
            assert_eq!(
                resolve_visibility(&item, Action::Write, OWNER, &snap, GateDecision::Deny),
                Access::AllowWrite
            );
        }
    }

    #[test]
    fn non_owner_write_is_denied_even_for_members() {
        let item = list(Visibility::Circle(CIRCLE));
        assert_eq!(
            resolve_visibility(&item, Action::Write, MEMBER, &memberships(), GateDecision::Allow),
            Access::Deny(DenyReason::NotOwner)
        );
    }

    #[test]
    fn public_readable_when_gate_open() {
        let item = list(Visibility::Public);
        assert_eq!(
            resolve_visibility(&item, Action::Read, STRANGER, &memberships(), GateDecision::Allow),
            Access::AllowRead
        );
    }

    #[test]
    fn public_follow_gated_when_gate_closed() {
        let item = list(Visibility::Public);
        assert_eq!(
            resolve_visibility(&item, Action::Read, STRANGER, &memberships(), GateDecision::Deny),
            Access::Deny(DenyReason::FollowRequired)
        );
    }

    #[test]
    fn circle_content_gated_by_membership_only() {
        let item = list(Visibility::Circle(CIRCLE));
        assert_eq!(
            resolve_visibility(&item, Action::Read, MEMBER, &memberships(), GateDecision::Deny),
            Access::AllowRead
        );
        assert_eq!(
            resolve_visibility(&item, Action::Read, STRANGER, &memberships(), GateDecision::Allow),
            Access::Deny(DenyReason::NotCircleMember)
        );
    }

    #[test]
    fn membership_in_another_circle_does_not_count() {
        let item = list(Visibility::Circle(CIRCLE));
        let snap = MembershipSnapshot::new().with_role(CircleId(99), STRANGER, CircleRole::Admin);
        assert_eq!(
            resolve_visibility(&item, Action::Read, STRANGER, &snap, GateDecision::Allow),
            Access::Deny(DenyReason::NotCircleMember)
        );
    }

    #[test]
    fn pending_request_grants_nothing() {
        let item = list(Visibility::Circle(CIRCLE));
        let mut snap = memberships();
        snap.insert_request(&MemberRequest {
            id: RequestId(1),
            circle_id: CIRCLE,
            user_id: STRANGER,
            status: RequestStatus::Pending,
            requested_at: 0,
            resolved_by: None,
            resolved_at: None,
        });
        assert_eq!(
            resolve_visibility(&item, Action::Read, STRANGER, &snap, GateDecision::Allow),
            Access::Deny(DenyReason::NotCircleMember)
        );
    }

    #[test]
    fn private_denied_to_everyone_else() {
        let item = list(Visibility::Private);
        assert_eq!(
            resolve_visibility(&item, Action::Read, MEMBER, &memberships(), GateDecision::Allow),
            Access::Deny(DenyReason::Private)
        );
    }

    #[test]
    fn into_result_maps_denial() {
        assert!(Access::AllowRead.into_result().is_ok());
        let err = Access::Deny(DenyReason::Private).into_result().unwrap_err();
        assert_eq!(err.status_code(), 403);
    }

    #[test]
    fn access_serializes_with_reason() {
        let json = serde_json::to_value(Access::Deny(DenyReason::NotCircleMember)).unwrap();
        assert_eq!(json["decision"], "deny");
        assert_eq!(json["reason"], "not_circle_member");
    }
}
