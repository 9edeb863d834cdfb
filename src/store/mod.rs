//! Entity store adapter.
//!
//! [`EntityStore`] is the only way the service reads or writes persisted
//! entities. It holds no business rules beyond the atomicity contracts
//! the resolvers depend on:
//!
//! - membership, follow edge, pending request and pending invite inserts
//!   are compare-and-create: a uniqueness collision is reported as
//!   [`InsertOutcome::AlreadyExists`], never as an error;
//! - status transitions are compare-and-set on `status = 'pending'`, and
//!   report `false` when another writer got there first;
//! - list creation runs the duplicate-name check and the insert in one
//!   transaction.
//!
//! [`SqliteStore`] is the bundled implementation.

mod sqlite;

pub use sqlite::SqliteStore;

use crate::access::DuplicatePolicy;
use crate::error::Result;
use crate::model::{
    Circle, CircleId, CircleInvite, CircleMembership, CircleRole, Comment, FollowEdge, FollowId,
    FollowStatus, FollowedUser, InviteId, InviteStatus, Invitee, ItemComment, ListId, ListItem,
    ListItemId, MemberRequest, NewCircle, NewList, NewListItem, NewPost, NewUser, Post, PostId,
    PrivacySettings, RequestId, RequestStatus, RestaurantList, User, UserId,
};

/// Result of a compare-and-create insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome<T> {
    /// The row was written.
    Created(T),
    /// A row with the same unique key already exists. Nothing was written.
    AlreadyExists,
}

impl<T> InsertOutcome<T> {
    /// Returns the created value, if any.
    pub fn created(self) -> Option<T> {
        match self {
            Self::Created(value) => Some(value),
            Self::AlreadyExists => None,
        }
    }

    /// Returns whether the row was written.
    pub const fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }

    /// Maps the created value.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> InsertOutcome<U> {
        match self {
            Self::Created(value) => InsertOutcome::Created(f(value)),
            Self::AlreadyExists => InsertOutcome::AlreadyExists,
        }
    }
}

/// Result of [`EntityStore::insert_list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListInsert {
    Created(RestaurantList),
    /// The owner already has a list with this name.
    Duplicate(ListId),
}

/// Follower and following counts (accepted edges only).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FollowCounts {
    pub followers: usize,
    pub following: usize,
}

/// Data-access seam over persisted users, circles, follows and content.
///
/// Timestamps are Unix seconds supplied by the caller.
pub trait EntityStore: Send + Sync {
    // ==================== Users ====================

    /// Registers a user. `AlreadyExists` if the username is taken.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn insert_user(&self, user: &NewUser, now: i64) -> Result<InsertOutcome<User>>;

    /// Loads a user.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_user(&self, id: UserId) -> Result<Option<User>>;

    /// Loads the user whose username or email is exactly `handle`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn user_by_handle(&self, handle: &str) -> Result<Option<User>>;

    /// Replaces a user's privacy settings. Returns `false` if the user
    /// does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn update_privacy(&self, id: UserId, privacy: &PrivacySettings) -> Result<bool>;

    // ==================== Circles ====================

    /// Creates a circle and its owner membership in one transaction.
    /// `AlreadyExists` if the invite code is taken.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn insert_circle(
        &self,
        circle: &NewCircle,
        creator: UserId,
        invite_code: &str,
        now: i64,
    ) -> Result<InsertOutcome<Circle>>;

    /// Loads a circle.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_circle(&self, id: CircleId) -> Result<Option<Circle>>;

    /// Loads a circle by its exact, case-sensitive invite code.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn circle_by_invite_code(&self, code: &str) -> Result<Option<Circle>>;

    /// Replaces a circle's invite code. `AlreadyExists` if the new code
    /// is taken.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn replace_invite_code(&self, id: CircleId, code: &str) -> Result<InsertOutcome<()>>;

    /// Number of active members.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn member_count(&self, id: CircleId) -> Result<usize>;

    // ==================== Memberships ====================

    /// Creates a membership. `AlreadyExists` if `(circle_id, user_id)`
    /// already has one. A pending request for the pair is marked approved
    /// in the same transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn insert_membership(
        &self,
        membership: &CircleMembership,
    ) -> Result<InsertOutcome<CircleMembership>>;

    /// All memberships of a circle.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn memberships_of_circle(&self, circle_id: CircleId) -> Result<Vec<CircleMembership>>;

    /// All memberships of a user.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn memberships_of_user(&self, user_id: UserId) -> Result<Vec<CircleMembership>>;

    /// Deletes a membership. Returns `false` if there was none.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn delete_membership(&self, circle_id: CircleId, user_id: UserId) -> Result<bool>;

    /// Changes a member's role. Returns `false` if there is no membership.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn set_member_role(&self, circle_id: CircleId, user_id: UserId, role: CircleRole)
        -> Result<bool>;

    // ==================== Member requests ====================

    /// Files a pending request. `AlreadyExists` if one is already pending.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn insert_member_request(
        &self,
        circle_id: CircleId,
        user_id: UserId,
        now: i64,
    ) -> Result<InsertOutcome<MemberRequest>>;

    /// Loads a member request.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_member_request(&self, id: RequestId) -> Result<Option<MemberRequest>>;

    /// Pending requests for a circle, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn pending_requests_of_circle(&self, circle_id: CircleId) -> Result<Vec<MemberRequest>>;

    /// Pending requests filed by a user.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn pending_requests_of_user(&self, user_id: UserId) -> Result<Vec<MemberRequest>>;

    /// Moves a pending request to `next` and, in the same transaction,
    /// creates `new_member` unless that membership already exists.
    ///
    /// Returns `false` (and writes nothing) if the request is no longer
    /// pending.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn resolve_member_request(
        &self,
        id: RequestId,
        next: RequestStatus,
        resolver: UserId,
        now: i64,
        new_member: Option<&CircleMembership>,
    ) -> Result<bool>;

    // ==================== Invites ====================

    /// Creates a pending invite. `AlreadyExists` if the same invitee
    /// already has a pending invite to the circle.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn insert_invite(
        &self,
        circle_id: CircleId,
        inviter: UserId,
        invitee: &Invitee,
        now: i64,
    ) -> Result<InsertOutcome<CircleInvite>>;

    /// Loads an invite.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_invite(&self, id: InviteId) -> Result<Option<CircleInvite>>;

    /// Pending invites addressed to `user` by id, username or email.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn pending_invites_for(&self, user: &User) -> Result<Vec<CircleInvite>>;

    /// Moves a pending invite to `next` and, in the same transaction,
    /// creates `new_member` unless that membership already exists. A new
    /// membership also closes the invitee's pending request for the circle.
    ///
    /// Returns `false` (and writes nothing) if the invite is no longer
    /// pending.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn resolve_invite(
        &self,
        id: InviteId,
        next: InviteStatus,
        now: i64,
        new_member: Option<&CircleMembership>,
    ) -> Result<bool>;

    /// Deletes a pending invite. Returns `false` if it was not pending.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn delete_pending_invite(&self, id: InviteId) -> Result<bool>;

    // ==================== Follows ====================

    /// Creates a follow edge. `AlreadyExists` if the ordered pair has one.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn insert_follow(
        &self,
        follower: UserId,
        followee: UserId,
        status: FollowStatus,
        now: i64,
    ) -> Result<InsertOutcome<FollowEdge>>;

    /// Loads a follow edge.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_follow(&self, id: FollowId) -> Result<Option<FollowEdge>>;

    /// The edge from `follower` to `followee`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn follow_between(&self, follower: UserId, followee: UserId) -> Result<Option<FollowEdge>>;

    /// Accepts a pending edge. Returns `false` if it was not pending.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn accept_follow(&self, id: FollowId, now: i64) -> Result<bool>;

    /// Deletes a pending edge. Returns `false` if it was not pending.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn delete_pending_follow(&self, id: FollowId) -> Result<bool>;

    /// Deletes the edge between an ordered pair, whatever its status.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn delete_follow_between(&self, follower: UserId, followee: UserId) -> Result<bool>;

    /// Pending edges toward `followee`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn pending_follows_to(&self, followee: UserId) -> Result<Vec<FollowEdge>>;

    /// Accepted follower and following counts.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn follow_counts(&self, user_id: UserId) -> Result<FollowCounts>;

    /// Users with an accepted follow of `user_id`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn followers_of(&self, user_id: UserId) -> Result<Vec<FollowedUser>>;

    /// Users `user_id` follows with an accepted edge, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn following_of(&self, user_id: UserId) -> Result<Vec<FollowedUser>>;

    // ==================== Lists ====================

    /// Creates a list. With [`DuplicatePolicy::Reject`] the duplicate-name
    /// check and the insert run in one immediate transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn insert_list(
        &self,
        owner: UserId,
        list: &NewList,
        policy: DuplicatePolicy,
        now: i64,
    ) -> Result<ListInsert>;

    /// Loads a list.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_list(&self, id: ListId) -> Result<Option<RestaurantList>>;

    /// All lists of an owner, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn lists_of_owner(&self, owner: UserId) -> Result<Vec<RestaurantList>>;

    /// Lists `viewer` could possibly read: their own plus every non-private
    /// list. Callers still run each through the visibility resolver.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn candidate_lists(&self, viewer: UserId) -> Result<Vec<RestaurantList>>;

    /// Overwrites a list's name, description and visibility.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn update_list(&self, list: &RestaurantList) -> Result<bool>;

    /// Deletes a list and its items.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn delete_list(&self, id: ListId) -> Result<bool>;

    /// Adds an item.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for a rating outside `[1, 5]`, or an error if
    /// the database operation fails.
    fn insert_list_item(
        &self,
        list_id: ListId,
        added_by: UserId,
        item: &NewListItem,
        now: i64,
    ) -> Result<ListItem>;

    /// Items of a list by position.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_items(&self, list_id: ListId) -> Result<Vec<ListItem>>;

    /// Loads a list item.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_list_item(&self, id: ListItemId) -> Result<Option<ListItem>>;

    /// Overwrites an item's rating, notes and position.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn update_list_item(&self, item: &ListItem) -> Result<bool>;

    /// Deletes an item and its comments.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn delete_list_item(&self, id: ListItemId) -> Result<bool>;

    /// Adds a comment to a list item.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn insert_item_comment(
        &self,
        item_id: ListItemId,
        author: UserId,
        content: &str,
        now: i64,
    ) -> Result<ItemComment>;

    /// Comments of a list item, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn comments_of_item(&self, item_id: ListItemId) -> Result<Vec<ItemComment>>;

    // ==================== Posts ====================

    /// Creates a post.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for a rating outside `[1, 5]`, or an error if
    /// the database operation fails.
    fn insert_post(&self, author: UserId, post: &NewPost, now: i64) -> Result<Post>;

    /// Loads a post.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_post(&self, id: PostId) -> Result<Option<Post>>;

    /// Overwrites a post's content, rating and visibility.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn update_post(&self, post: &Post) -> Result<bool>;

    /// Deletes a post with its comments and likes.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn delete_post(&self, id: PostId) -> Result<bool>;

    /// Adds a comment.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn insert_comment(
        &self,
        post_id: PostId,
        author: UserId,
        content: &str,
        now: i64,
    ) -> Result<Comment>;

    /// Comments of a post, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn comments_of_post(&self, post_id: PostId) -> Result<Vec<Comment>>;

    /// Records a like. `AlreadyExists` if the user already liked the post.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn insert_like(&self, post_id: PostId, user_id: UserId, now: i64) -> Result<InsertOutcome<()>>;

    /// Number of likes on a post.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn like_count(&self, post_id: PostId) -> Result<usize>;
}
