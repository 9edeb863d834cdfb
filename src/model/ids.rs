//! Strongly-typed entity identifiers.
//!
//! Every persisted entity is addressed by a row id. Wrapping the raw
//! `i64` keeps a `UserId` from being passed where a `CircleId` is
//! expected.

use serde::{Deserialize, Serialize};

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            /// Returns the raw row id.
            #[must_use]
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

entity_id!(
    /// Identifier of a user.
    UserId
);
entity_id!(
    /// Identifier of a circle.
    CircleId
);
entity_id!(
    /// Identifier of a restaurant list.
    ListId
);
entity_id!(
    /// Identifier of a post.
    PostId
);
entity_id!(
    /// Identifier of a pending or resolved member request.
    RequestId
);
entity_id!(
    /// Identifier of a circle invite.
    InviteId
);
entity_id!(
    /// Identifier of a follow edge.
    FollowId
);
entity_id!(
    /// Identifier of a list item.
    ListItemId
);
entity_id!(
    /// Identifier of a post comment.
    CommentId
);
entity_id!(
    /// Identifier of a comment on a list item.
    ItemCommentId
);
