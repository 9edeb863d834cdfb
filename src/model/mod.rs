//! Entity types shared by the resolvers, the store and the service.
//!
//! These are plain snapshots of persisted rows. The resolvers receive
//! them by reference and never mutate them; all writes go through
//! [`EntityStore`](crate::store::EntityStore).

mod circle;
mod content;
mod follow;
mod ids;
mod user;

pub use circle::{
    Circle, CircleInvite, CircleMembership, CirclePreview, CircleRole, InviteStatus, Invitee,
    MemberRequest, NewCircle, RequestStatus,
};
pub use content::{
    Comment, ContentKind, ItemComment, ListItem, ListItemUpdate, ListUpdate, NewList, NewListItem,
    NewPost, Post, PostUpdate, Rating, RestaurantList, Shareable, Visibility,
};
pub use follow::{FollowEdge, FollowState, FollowStatus, FollowedUser};
pub use ids::{
    CircleId, CommentId, FollowId, InviteId, ItemCommentId, ListId, ListItemId, PostId, RequestId,
    UserId,
};
pub use user::{NewUser, PrivacySettings, PrivacyUpdate, User};
