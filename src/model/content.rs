//! Shared content: restaurant lists and posts.
//!
//! Both carry a single [`Visibility`] value. The circle target lives
//! inside the `Circle` variant, so a circle-scoped item without a circle
//! (or a public item with one) cannot be represented.

use serde::{Deserialize, Serialize};

use super::ids::{CircleId, CommentId, ItemCommentId, ListId, ListItemId, PostId, UserId};
use crate::error::{AccessError, Result};

/// Disclosure scope of a list or post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(
    rename_all = "lowercase",
    tag = "visibility",
    content = "circleId"
)]
pub enum Visibility {
    /// Owner only.
    Private,
    /// Members of one target circle.
    Circle(CircleId),
    /// Anyone (subject to the owner's profile privacy).
    Public,
}

impl Visibility {
    /// Converts the scope to its storage string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Circle(_) => "circle",
            Self::Public => "public",
        }
    }

    /// Returns the target circle for circle-scoped content.
    #[must_use]
    pub const fn circle_id(&self) -> Option<CircleId> {
        match self {
            Self::Circle(id) => Some(*id),
            _ => None,
        }
    }

    /// Rebuilds a scope from its storage columns.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the scope is unknown, if `circle` has no
    /// circle id, or if a circle id accompanies any other scope.
    pub fn from_parts(scope: &str, circle_id: Option<CircleId>) -> Result<Self> {
        match (scope, circle_id) {
            ("private", None) => Ok(Self::Private),
            ("public", None) => Ok(Self::Public),
            ("circle", Some(id)) => Ok(Self::Circle(id)),
            ("circle", None) => Err(AccessError::Validation(
                "circleId is required for circle visibility".to_string(),
            )),
            ("private" | "public", Some(_)) => Err(AccessError::Validation(format!(
                "circleId is only allowed with circle visibility, not {scope}"
            ))),
            _ => Err(AccessError::Validation(format!(
                "Unknown visibility: {scope}"
            ))),
        }
    }

    /// Converts the legacy `shareWithCircle`/`makePublic` flag pair.
    ///
    /// # Errors
    ///
    /// Returns `Validation` when both flags are set, or when sharing with a
    /// circle without naming one.
    pub fn from_share_flags(
        share_with_circle: bool,
        make_public: bool,
        circle_id: Option<CircleId>,
    ) -> Result<Self> {
        match (share_with_circle, make_public) {
            (true, true) => Err(AccessError::Validation(
                "A list cannot be both shared with a circle and public".to_string(),
            )),
            (true, false) => circle_id.map(Self::Circle).ok_or_else(|| {
                AccessError::Validation("circleId is required when sharing with a circle".to_string())
            }),
            (false, true) => Ok(Self::Public),
            (false, false) => Ok(Self::Private),
        }
    }
}

/// A star rating in `[1, 5]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Rating(u8);

impl Rating {
    /// Lowest accepted rating.
    pub const MIN: u8 = 1;
    /// Highest accepted rating.
    pub const MAX: u8 = 5;

    /// Validates a raw rating.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if `value` is outside `[1, 5]`.
    pub fn new(value: i64) -> Result<Self> {
        u8::try_from(value)
            .ok()
            .filter(|v| (Self::MIN..=Self::MAX).contains(v))
            .map(Self)
            .ok_or_else(|| {
                AccessError::Validation(format!(
                    "Rating must be between {} and {}, got {value}",
                    Self::MIN,
                    Self::MAX
                ))
            })
    }

    /// Returns the numeric rating.
    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for Rating {
    type Error = AccessError;

    fn try_from(value: i64) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Rating> for i64 {
    fn from(rating: Rating) -> Self {
        Self::from(rating.0)
    }
}

/// Kind of a content item, for logs and error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    List,
    Post,
}

impl ContentKind {
    /// Returns the lowercase name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::List => "list",
            Self::Post => "post",
        }
    }
}

/// Content whose disclosure is decided by the visibility resolver.
pub trait Shareable {
    /// Kind of the item.
    fn kind(&self) -> ContentKind;
    /// The user who created the item.
    fn owner_id(&self) -> UserId;
    /// The item's disclosure scope.
    fn visibility(&self) -> Visibility;
}

/// A restaurant list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestaurantList {
    pub id: ListId,
    pub created_by_id: UserId,
    pub name: String,
    pub description: Option<String>,
    #[serde(flatten)]
    pub visibility: Visibility,
    /// When the list was created (Unix timestamp).
    pub created_at: i64,
    /// When the list was last updated (Unix timestamp).
    pub updated_at: i64,
}

impl Shareable for RestaurantList {
    fn kind(&self) -> ContentKind {
        ContentKind::List
    }

    fn owner_id(&self) -> UserId {
        self.created_by_id
    }

    fn visibility(&self) -> Visibility {
        self.visibility
    }
}

/// Input for creating a list.
#[derive(Debug, Clone)]
pub struct NewList {
    pub name: String,
    pub description: Option<String>,
    pub visibility: Visibility,
}

impl NewList {
    /// Creates a private list with the given name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            visibility: Visibility::Private,
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the visibility.
    #[must_use]
    pub const fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }
}

/// Partial update of a list; `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct ListUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub visibility: Option<Visibility>,
}

/// A restaurant entry on a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListItem {
    pub id: ListItemId,
    pub list_id: ListId,
    pub restaurant_id: i64,
    pub rating: Option<Rating>,
    pub notes: Option<String>,
    pub added_by_id: UserId,
    pub position: i64,
    /// When the item was added (Unix timestamp).
    pub added_at: i64,
}

/// Input for adding a restaurant to a list.
#[derive(Debug, Clone)]
pub struct NewListItem {
    pub restaurant_id: i64,
    /// Raw rating, validated into a [`Rating`].
    pub rating: Option<i64>,
    pub notes: Option<String>,
    pub position: i64,
}

/// Partial update of a list item; `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct ListItemUpdate {
    /// Raw rating, validated into a [`Rating`].
    pub rating: Option<i64>,
    pub notes: Option<String>,
    pub position: Option<i64>,
}

/// A comment on a list item. Readable by anyone who may read the list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemComment {
    pub id: ItemCommentId,
    pub item_id: ListItemId,
    pub user_id: UserId,
    pub content: String,
    pub created_at: i64,
}

/// A restaurant post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: PostId,
    pub user_id: UserId,
    pub restaurant_id: i64,
    pub content: String,
    pub rating: Rating,
    #[serde(flatten)]
    pub visibility: Visibility,
    /// When the post was created (Unix timestamp).
    pub created_at: i64,
    /// When the post was last edited (Unix timestamp).
    pub updated_at: i64,
}

impl Shareable for Post {
    fn kind(&self) -> ContentKind {
        ContentKind::Post
    }

    fn owner_id(&self) -> UserId {
        self.user_id
    }

    fn visibility(&self) -> Visibility {
        self.visibility
    }
}

/// Input for creating a post.
#[derive(Debug, Clone)]
pub struct NewPost {
    pub restaurant_id: i64,
    pub content: String,
    /// Raw rating, validated into a [`Rating`].
    pub rating: i64,
    pub visibility: Visibility,
}

/// Partial update of a post; `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct PostUpdate {
    pub content: Option<String>,
    pub rating: Option<i64>,
    pub visibility: Option<Visibility>,
}

/// A comment on a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: CommentId,
    pub post_id: PostId,
    pub user_id: UserId,
    pub content: String,
    /// When the comment was written (Unix timestamp).
    pub created_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_parts_requires_circle_id_only_for_circle() {
        assert_eq!(
            Visibility::from_parts("circle", Some(CircleId(3))).unwrap(),
            Visibility::Circle(CircleId(3))
        );
        assert_eq!(
            Visibility::from_parts("public", None).unwrap(),
            Visibility::Public
        );
        assert!(matches!(
            Visibility::from_parts("circle", None),
            Err(AccessError::Validation(_))
        ));
        assert!(matches!(
            Visibility::from_parts("private", Some(CircleId(1))),
            Err(AccessError::Validation(_))
        ));
        assert!(matches!(
            Visibility::from_parts("friends", None),
            Err(AccessError::Validation(_))
        ));
    }

    #[test]
    fn share_flags_reject_contradiction() {
        let err = Visibility::from_share_flags(true, true, Some(CircleId(1))).unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn share_flags_map_to_scopes() {
        assert_eq!(
            Visibility::from_share_flags(false, false, None).unwrap(),
            Visibility::Private
        );
        assert_eq!(
            Visibility::from_share_flags(false, true, None).unwrap(),
            Visibility::Public
        );
        assert_eq!(
            Visibility::from_share_flags(true, false, Some(CircleId(9))).unwrap(),
            Visibility::Circle(CircleId(9))
        );
        assert!(Visibility::from_share_flags(true, false, None).is_err());
    }

    #[test]
    fn visibility_serializes_adjacently_tagged() {
        let json = serde_json::to_value(Visibility::Circle(CircleId(4))).unwrap();
        assert_eq!(json["visibility"], "circle");
        assert_eq!(json["circleId"], 4);

        let json = serde_json::to_value(Visibility::Public).unwrap();
        assert_eq!(json["visibility"], "public");
        assert!(json.get("circleId").is_none());
    }

    #[test]
    fn rating_bounds() {
        assert_eq!(Rating::new(1).unwrap().get(), 1);
        assert_eq!(Rating::new(5).unwrap().get(), 5);
        assert!(Rating::new(0).is_err());
        assert!(Rating::new(6).is_err());
        assert!(Rating::new(-300).is_err());
    }

    #[test]
    fn rating_rejects_out_of_range_json() {
        assert!(serde_json::from_str::<Rating>("4").is_ok());
        assert!(serde_json::from_str::<Rating>("9").is_err());
    }

    #[test]
    fn list_flattens_visibility() {
        let list = RestaurantList {
            id: ListId(1),
            created_by_id: UserId(2),
            name: "Date Night".to_string(),
            description: None,
            visibility: Visibility::Circle(CircleId(5)),
            created_at: 0,
            updated_at: 0,
        };
        let json = serde_json::to_value(&list).unwrap();
        assert_eq!(json["createdById"], 2);
        assert_eq!(json["visibility"], "circle");
        assert_eq!(json["circleId"], 5);
        assert_eq!(list.owner_id(), UserId(2));
        assert_eq!(list.kind(), ContentKind::List);
    }
}
