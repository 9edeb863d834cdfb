//! Transitions for invites, member requests and follow requests.
//!
//! Each function validates the actor and the current status and returns
//! the next status plus the side effect the caller must apply in the same
//! write. Terminal states never transition again.

use serde::{Deserialize, Serialize};

use super::membership::EffectiveRole;
use crate::error::{AccessError, DenyReason, Result};
use crate::model::{
    CircleId, CircleInvite, CircleRole, FollowEdge, FollowStatus, InviteStatus, Invitee,
    MemberRequest, RequestStatus, User, UserId,
};

/// Invitee's answer to a circle invite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InviteResponse {
    Accept,
    Decline,
}

/// Manager's decision on a member request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestDecision {
    Approve,
    Reject,
}

/// Followee's answer to a follow request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FollowResponse {
    Accept,
    Decline,
}

/// Membership to create alongside a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddMember {
    pub circle_id: CircleId,
    pub user_id: UserId,
    pub role: CircleRole,
    pub invited_by: Option<UserId>,
}

/// Next status plus the membership to create, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition<S> {
    pub next: S,
    pub add_member: Option<AddMember>,
}

/// Follow edge outcome. Declining removes the edge instead of storing a
/// declined status, so the follower may ask again later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowTransition {
    Accepted,
    Removed,
}

/// Returns whether `user` is the addressee of `invite`.
#[must_use]
pub fn is_invitee(invite: &CircleInvite, user: &User) -> bool {
    match &invite.invitee {
        Invitee::User(id) => *id == user.id,
        Invitee::Handle(handle) => user.answers_to(handle),
    }
}

/// Applies the invitee's response to a pending invite.
///
/// # Errors
///
/// Returns `AccessDenied(NotRecipient)` if `actor` is not the invitee and
/// `InvalidState` if the invite was already answered.
pub fn respond_to_invite(
    invite: &CircleInvite,
    actor: &User,
    response: InviteResponse,
) -> Result<Transition<InviteStatus>> {
    if !is_invitee(invite, actor) {
        return Err(AccessError::AccessDenied(DenyReason::NotRecipient));
    }
    if invite.status != InviteStatus::Pending {
        return Err(AccessError::InvalidState(
            "Invite already responded to".to_string(),
        ));
    }
    Ok(match response {
        InviteResponse::Accept => Transition {
            next: InviteStatus::Accepted,
            add_member: Some(AddMember {
                circle_id: invite.circle_id,
                user_id: actor.id,
                role: CircleRole::Member,
                invited_by: Some(invite.inviter_id),
            }),
        },
        InviteResponse::Decline => Transition {
            next: InviteStatus::Declined,
            add_member: None,
        },
    })
}

/// Applies a manager's decision to a member request.
///
/// # Errors
///
/// Returns `AccessDenied(NotCircleManager)` if `actor_role` cannot manage
/// members and `AlreadyResolved` if the request is terminal.
pub fn decide_member_request(
    request: &MemberRequest,
    actor: UserId,
    actor_role: EffectiveRole,
    decision: RequestDecision,
) -> Result<Transition<RequestStatus>> {
    if !actor_role.can_manage_members() {
        return Err(AccessError::AccessDenied(DenyReason::NotCircleManager));
    }
    if request.status.is_terminal() {
        return Err(AccessError::AlreadyResolved(format!(
            "request {} is already {}",
            request.id,
            request.status.as_str()
        )));
    }
    Ok(match decision {
        RequestDecision::Approve => Transition {
            next: RequestStatus::Approved,
            add_member: Some(AddMember {
                circle_id: request.circle_id,
                user_id: request.user_id,
                role: CircleRole::Member,
                invited_by: Some(actor),
            }),
        },
        RequestDecision::Reject => Transition {
            next: RequestStatus::Rejected,
            add_member: None,
        },
    })
}

/// Applies the followee's response to a follow request.
///
/// # Errors
///
/// Returns `AccessDenied(NotRecipient)` if `actor` is not the followee and
/// `InvalidState` if the edge is already accepted.
pub fn respond_to_follow(
    edge: &FollowEdge,
    actor: UserId,
    response: FollowResponse,
) -> Result<FollowTransition> {
    if edge.followee_id != actor {
        return Err(AccessError::AccessDenied(DenyReason::NotRecipient));
    }
    if edge.status != FollowStatus::Pending {
        return Err(AccessError::InvalidState(
            "Follow request is not pending".to_string(),
        ));
    }
    Ok(match response {
        FollowResponse::Accept => FollowTransition::Accepted,
        FollowResponse::Decline => FollowTransition::Removed,
    })
}
