//! Directed follow relationships.

use serde::{Deserialize, Serialize};

use super::ids::{FollowId, UserId};

/// State of a follow edge. A declined or removed follow leaves no row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FollowStatus {
    /// Awaiting the followee's approval.
    Pending,
    /// Active follow.
    Accepted,
}

impl FollowStatus {
    /// Converts to string representation for storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
        }
    }

    /// Parses from string representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "accepted" => Some(Self::Accepted),
            _ => None,
        }
    }
}

/// A follow edge. At most one per ordered `(follower_id, followee_id)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowEdge {
    pub id: FollowId,
    pub follower_id: UserId,
    pub followee_id: UserId,
    pub status: FollowStatus,
    /// When the follow was requested (Unix timestamp).
    pub created_at: i64,
    /// When the followee accepted (Unix timestamp).
    pub accepted_at: Option<i64>,
}

impl FollowEdge {
    /// Returns whether the edge grants access to follow-gated content.
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        self.status == FollowStatus::Accepted
    }
}

/// One entry of a followers or following listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowedUser {
    pub id: UserId,
    pub username: String,
    pub name: String,
    /// When the follow was requested (Unix timestamp).
    pub followed_at: i64,
}

/// Relationship of a viewer to another user, as shown on a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FollowState {
    /// No edge.
    None,
    /// Follow requested, awaiting approval.
    Pending,
    /// Following.
    Accepted,
}

impl From<Option<&FollowEdge>> for FollowState {
    fn from(edge: Option<&FollowEdge>) -> Self {
        match edge.map(|e| e.status) {
            None => Self::None,
            Some(FollowStatus::Pending) => Self::Pending,
            Some(FollowStatus::Accepted) => Self::Accepted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(status: FollowStatus) -> FollowEdge {
        FollowEdge {
            id: FollowId(1),
            follower_id: UserId(1),
            followee_id: UserId(2),
            status,
            created_at: 0,
            accepted_at: None,
        }
    }

    #[test]
    fn follow_status_roundtrips_storage_form() {
        assert_eq!(FollowStatus::parse("pending"), Some(FollowStatus::Pending));
        assert_eq!(FollowStatus::parse("accepted"), Some(FollowStatus::Accepted));
        assert_eq!(FollowStatus::parse("following"), None);
    }

    #[test]
    fn follow_state_from_edge() {
        assert_eq!(FollowState::from(None), FollowState::None);
        let pending = edge(FollowStatus::Pending);
        assert_eq!(FollowState::from(Some(&pending)), FollowState::Pending);
        let accepted = edge(FollowStatus::Accepted);
        assert_eq!(FollowState::from(Some(&accepted)), FollowState::Accepted);
        assert!(accepted.is_accepted());
        assert!(!pending.is_accepted());
    }
}
