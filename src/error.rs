//! Error types for authorization and membership operations.
//!
//! Every failure the core can report is a value of [`AccessError`]. The
//! HTTP layer maps each variant to a fixed status code with
//! [`AccessError::status_code`] and renders the body with
//! [`AccessError::body`].

use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::model::ListId;

/// Why a read or write was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    /// Writes are reserved to the item's owner.
    NotOwner,
    /// Circle-scoped content and the requester is not a member.
    NotCircleMember,
    /// Private content and the requester is not the owner.
    Private,
    /// The owner's profile is private and the requester is not an accepted follower.
    FollowRequired,
    /// Only circle owners and admins may do this.
    NotCircleManager,
    /// The actor is not the party allowed to make this transition.
    NotRecipient,
    /// Only the user themself may do this.
    NotSelf,
    /// The owner hides this part of their profile.
    HiddenByOwner,
}

impl DenyReason {
    /// Returns the snake-case reason code.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NotOwner => "not_owner",
            Self::NotCircleMember => "not_circle_member",
            Self::Private => "private",
            Self::FollowRequired => "follow_required",
            Self::NotCircleManager => "not_circle_manager",
            Self::NotRecipient => "not_recipient",
            Self::NotSelf => "not_self",
            Self::HiddenByOwner => "hidden_by_owner",
        }
    }
}

impl std::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an operation collided with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    /// The owner already has a list with this (trimmed) name.
    DuplicateList {
        /// The list that already uses the name.
        existing_id: ListId,
    },
    /// The user already holds a membership in the circle.
    AlreadyMember,
    /// The user already has a pending request for the circle.
    RequestPending,
    /// A pending invite for this invitee already exists.
    InvitePending,
    /// The follower already follows the followee.
    AlreadyFollowing,
    /// A follow request is already awaiting approval.
    FollowPending,
    /// A unique value (username, invite code) is taken.
    Taken(&'static str),
}

impl std::fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateList { existing_id } => {
                write!(f, "duplicate list name (existing list {existing_id})")
            }
            Self::AlreadyMember => f.write_str("already a member of this circle"),
            Self::RequestPending => f.write_str("request already pending"),
            Self::InvitePending => f.write_str("invite already exists"),
            Self::AlreadyFollowing => f.write_str("already following this user"),
            Self::FollowPending => f.write_str("follow request already pending"),
            Self::Taken(what) => write!(f, "{what} already taken"),
        }
    }
}

/// Error type for authorization and membership operations.
#[derive(Error, Debug)]
pub enum AccessError {
    /// Entity absent.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Visibility or ownership check failed.
    #[error("Access denied: {0}")]
    AccessDenied(DenyReason),

    /// Uniqueness violation.
    #[error("Conflict: {0}")]
    Conflict(ConflictKind),

    /// Transition attempted on an item that is not pending.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Member request already approved or rejected.
    #[error("Already resolved: {0}")]
    AlreadyResolved(String),

    /// Malformed input.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Storage operation failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Database error from `SQLite`.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Result type alias for authorization and membership operations.
pub type Result<T> = std::result::Result<T, AccessError>;

impl AccessError {
    /// HTTP status the REST layer must answer with.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::AccessDenied(_) => 403,
            Self::Conflict(_) | Self::AlreadyResolved(_) => 409,
            Self::InvalidState(_) | Self::Validation(_) => 400,
            Self::Storage(_) | Self::Database(_) => 500,
        }
    }

    /// Short machine-readable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::AccessDenied(_) => "access_denied",
            Self::Conflict(ConflictKind::DuplicateList { .. }) => "duplicate_list",
            Self::Conflict(_) => "conflict",
            Self::InvalidState(_) => "invalid_state",
            Self::AlreadyResolved(_) => "already_resolved",
            Self::Validation(_) => "validation_error",
            Self::Storage(_) | Self::Database(_) => "internal_error",
        }
    }

    /// JSON body for the error response.
    ///
    /// Duplicate lists carry `existingId` so the client can offer to open
    /// the existing list. Internal errors never leak their message.
    #[must_use]
    pub fn body(&self) -> Value {
        match self {
            Self::Conflict(ConflictKind::DuplicateList { existing_id }) => json!({
                "error": self.code(),
                "existingId": existing_id,
            }),
            Self::AccessDenied(reason) => json!({
                "error": "Access denied",
                "reason": reason,
            }),
            Self::Storage(_) | Self::Database(_) => json!({ "error": self.code() }),
            _ => json!({ "error": self.code(), "message": self.to_string() }),
        }
    }

    /// Returns whether this is a rejected transition on a non-pending item.
    #[must_use]
    pub const fn is_invalid_state(&self) -> bool {
        matches!(self, Self::InvalidState(_) | Self::AlreadyResolved(_))
    }
}
