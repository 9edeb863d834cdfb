//! Circles, memberships, member requests and invites.
//!
//! A circle is a named trust group. Membership rows hold only active
//! members; a non-member asking to join is tracked as a [`MemberRequest`]
//! and a member offering a seat to someone else is a [`CircleInvite`].

use serde::{Deserialize, Serialize};

use super::ids::{CircleId, InviteId, RequestId, UserId};

/// Role of an active member within a circle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CircleRole {
    /// The creator. Exactly one per circle.
    Owner,
    /// May manage members and requests.
    Admin,
    /// Regular member.
    Member,
}

impl CircleRole {
    /// Converts to string representation for storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Admin => "admin",
            Self::Member => "member",
        }
    }

    /// Parses from string representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "owner" => Some(Self::Owner),
            "admin" => Some(Self::Admin),
            "member" => Some(Self::Member),
            _ => None,
        }
    }

    /// Returns whether this role may manage members, requests and invites.
    #[must_use]
    pub const fn can_manage_members(&self) -> bool {
        matches!(self, Self::Owner | Self::Admin)
    }
}

/// A circle (trust group).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Circle {
    pub id: CircleId,
    pub name: String,
    pub description: Option<String>,
    /// Creator; always holds the `owner` membership.
    pub creator_id: UserId,
    /// Hidden from discovery listings.
    pub is_private: bool,
    /// Joining with the invite code grants membership immediately.
    pub allow_public_join: bool,
    /// Unique, case-sensitive join code.
    pub invite_code: String,
    /// When the circle was created (Unix timestamp).
    pub created_at: i64,
}

/// Configuration for creating a new circle.
#[derive(Debug, Clone)]
pub struct NewCircle {
    pub name: String,
    pub description: Option<String>,
    pub is_private: bool,
    pub allow_public_join: bool,
}

impl NewCircle {
    /// Creates a restricted, non-private circle configuration.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            is_private: false,
            allow_public_join: false,
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Marks the circle private.
    #[must_use]
    pub const fn private(mut self) -> Self {
        self.is_private = true;
        self
    }

    /// Lets anyone holding the invite code join without approval.
    #[must_use]
    pub const fn with_public_join(mut self, allow: bool) -> Self {
        self.allow_public_join = allow;
        self
    }
}

/// An active membership row. Unique per `(circle_id, user_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircleMembership {
    pub circle_id: CircleId,
    pub user_id: UserId,
    pub role: CircleRole,
    /// Who invited or approved this member, if anyone.
    pub invited_by: Option<UserId>,
    /// When the user joined (Unix timestamp).
    pub joined_at: i64,
}

/// Status of a member request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    /// Awaiting a decision from an owner or admin.
    Pending,
    /// Approved; a membership row was created.
    Approved,
    /// Rejected.
    Rejected,
}

impl RequestStatus {
    /// Converts to string representation for storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    /// Parses from string representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    /// Returns whether no further transition is possible.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// A non-member's request to join a restricted circle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberRequest {
    pub id: RequestId,
    pub circle_id: CircleId,
    pub user_id: UserId,
    pub status: RequestStatus,
    /// When the request was filed (Unix timestamp).
    pub requested_at: i64,
    /// Manager who approved or rejected it.
    pub resolved_by: Option<UserId>,
    /// When it was resolved (Unix timestamp).
    pub resolved_at: Option<i64>,
}

/// Status of a circle invite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InviteStatus {
    /// Invite sent, not yet responded.
    Pending,
    /// Invitee accepted and joined the circle.
    Accepted,
    /// Invitee declined.
    Declined,
}

impl InviteStatus {
    /// Converts to string representation for storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Declined => "declined",
        }
    }

    /// Parses from string representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "accepted" => Some(Self::Accepted),
            "declined" => Some(Self::Declined),
            _ => None,
        }
    }
}

/// Who an invite is addressed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "value")]
pub enum Invitee {
    /// A registered user.
    User(UserId),
    /// An email address or username, matched when the invitee responds.
    Handle(String),
}

/// An existing member's offer for a non-member to join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircleInvite {
    pub id: InviteId,
    pub circle_id: CircleId,
    pub inviter_id: UserId,
    pub invitee: Invitee,
    pub status: InviteStatus,
    /// When the invite was sent (Unix timestamp).
    pub created_at: i64,
    /// When the invitee responded (Unix timestamp).
    pub responded_at: Option<i64>,
}

/// What a holder of an invite code sees before joining.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CirclePreview {
    pub id: CircleId,
    pub name: String,
    pub description: Option<String>,
    pub member_count: usize,
    pub allow_public_join: bool,
}
