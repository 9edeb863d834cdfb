//! Restaurant lists and posts.
//!
//! Reads and writes go through the visibility resolver. An item that
//! exists but is hidden yields `AccessDenied`; only a missing item yields
//! `NotFound`.

use super::{now, required_text, AccessService};
use crate::access::{check_duplicate_name, validate_name, Access, Action, DuplicatePolicy};
use crate::error::{AccessError, ConflictKind, DenyReason, Result};
use crate::model::{
    Comment, ItemComment, ListId, ListItem, ListItemId, ListItemUpdate, ListUpdate, NewList,
    NewListItem, NewPost, Post, PostId, PostUpdate, Rating, RestaurantList, UserId, Visibility,
};
use crate::store::{EntityStore, ListInsert};

impl<S: EntityStore> AccessService<S> {
    // ==================== Lists ====================

    /// Creates a list owned by `owner`.
    ///
    /// The duplicate-name guard runs first. [`DuplicatePolicy::Allow`] is
    /// honored only when the config allows bypassing it. A circle-scoped
    /// list requires the owner to be a member of the target circle.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for a bad name, `Conflict(DuplicateList)` with
    /// the existing id, `NotFound` for an unknown owner or circle and
    /// `AccessDenied(NotCircleMember)` for a circle the owner is not in.
    pub fn create_list(
        &self,
        owner: UserId,
        list: &NewList,
        policy: DuplicatePolicy,
    ) -> Result<RestaurantList> {
        let name = validate_name(&list.name, self.config.max_name_len)?;
        self.user(owner)?;
        let policy = if self.config.allow_duplicate_bypass {
            policy
        } else {
            DuplicatePolicy::Reject
        };

        if policy == DuplicatePolicy::Reject {
            let existing = self.store.lists_of_owner(owner)?;
            if let Some(existing_id) = check_duplicate_name(owner, &name, &existing) {
                tracing::debug!(%owner, %existing_id, "duplicate list name");
                return Err(AccessError::Conflict(ConflictKind::DuplicateList {
                    existing_id,
                }));
            }
        }
        self.check_circle_target(owner, list.visibility)?;

        let list = NewList {
            name,
            ..list.clone()
        };
        match self.store.insert_list(owner, &list, policy, now())? {
            ListInsert::Created(created) => {
                tracing::info!(
                    list_id = %created.id,
                    %owner,
                    visibility = created.visibility.as_str(),
                    "created list"
                );
                Ok(created)
            }
            ListInsert::Duplicate(existing_id) => {
                Err(AccessError::Conflict(ConflictKind::DuplicateList { existing_id }))
            }
        }
    }

    /// `owner`'s lists named `name` after trimming.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn find_lists_by_name(&self, owner: UserId, name: &str) -> Result<Vec<RestaurantList>> {
        let wanted = name.trim();
        Ok(self
            .store
            .lists_of_owner(owner)?
            .into_iter()
            .filter(|list| list.name.trim() == wanted)
            .collect())
    }

    /// Loads a list `viewer` may read.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the list does not exist and `AccessDenied`
    /// if it is hidden from `viewer`.
    pub fn get_list(&self, viewer: UserId, id: ListId) -> Result<RestaurantList> {
        let list = self.load_list(id)?;
        self.authorize(&list, Action::Read, viewer)?;
        Ok(list)
    }

    /// The visibility decision for `viewer` on a list.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the list does not exist.
    pub fn list_access(&self, viewer: UserId, id: ListId, action: Action) -> Result<Access> {
        let list = self.load_list(id)?;
        self.decide(&list, action, viewer)
    }

    /// Items of a list `viewer` may read.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` or `AccessDenied`.
    pub fn list_items(&self, viewer: UserId, id: ListId) -> Result<Vec<ListItem>> {
        let list = self.get_list(viewer, id)?;
        self.store.list_items(list.id)
    }

    /// Applies `update` to a list. Owner only.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, `AccessDenied`, `Validation` for a bad name and
    /// `Conflict(DuplicateList)` when renaming onto another list's name.
    pub fn update_list(
        &self,
        actor: UserId,
        id: ListId,
        update: ListUpdate,
    ) -> Result<RestaurantList> {
        let mut list = self.load_list(id)?;
        self.authorize(&list, Action::Write, actor)?;

        if let Some(name) = update.name {
            let name = validate_name(&name, self.config.max_name_len)?;
            let others: Vec<RestaurantList> = self
                .store
                .lists_of_owner(list.created_by_id)?
                .into_iter()
                .filter(|other| other.id != id)
                .collect();
            if let Some(existing_id) = check_duplicate_name(list.created_by_id, &name, &others) {
                return Err(AccessError::Conflict(ConflictKind::DuplicateList {
                    existing_id,
                }));
            }
            list.name = name;
        }
        if let Some(description) = update.description {
            list.description = Some(description);
        }
        if let Some(visibility) = update.visibility {
            self.check_circle_target(list.created_by_id, visibility)?;
            list.visibility = visibility;
        }
        list.updated_at = now();

        if !self.store.update_list(&list)? {
            return Err(AccessError::NotFound(format!("list {id}")));
        }
        tracing::info!(
            list_id = %id,
            %actor,
            visibility = list.visibility.as_str(),
            "updated list"
        );
        Ok(list)
    }

    /// Deletes a list and its items. Owner only.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` or `AccessDenied`.
    pub fn delete_list(&self, actor: UserId, id: ListId) -> Result<()> {
        let list = self.load_list(id)?;
        self.authorize(&list, Action::Write, actor)?;
        if !self.store.delete_list(id)? {
            return Err(AccessError::NotFound(format!("list {id}")));
        }
        tracing::info!(list_id = %id, %actor, "deleted list");
        Ok(())
    }

    /// Adds a restaurant to a list. Owner only.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, `AccessDenied`, or `Validation` for a rating
    /// outside `[1, 5]`.
    pub fn add_list_item(&self, actor: UserId, id: ListId, item: &NewListItem) -> Result<ListItem> {
        let list = self.load_list(id)?;
        self.authorize(&list, Action::Write, actor)?;
        let item = self.store.insert_list_item(id, actor, item, now())?;
        tracing::debug!(list_id = %id, item_id = %item.id, "added list item");
        Ok(item)
    }

    /// Changes an item's rating, notes or position. Owner only.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the list or item is missing (or the item is on
    /// another list), `AccessDenied`, or `Validation` for a bad rating.
    pub fn update_list_item(
        &self,
        actor: UserId,
        list_id: ListId,
        item_id: ListItemId,
        update: ListItemUpdate,
    ) -> Result<ListItem> {
        let list = self.load_list(list_id)?;
        self.authorize(&list, Action::Write, actor)?;
        let mut item = self.load_item_of(list_id, item_id)?;

        if let Some(rating) = update.rating {
            item.rating = Some(Rating::new(rating)?);
        }
        if let Some(notes) = update.notes {
            item.notes = Some(notes);
        }
        if let Some(position) = update.position {
            item.position = position;
        }

        if !self.store.update_list_item(&item)? {
            return Err(AccessError::NotFound(format!("list item {item_id}")));
        }
        tracing::debug!(list_id = %list_id, item_id = %item_id, %actor, "updated list item");
        Ok(item)
    }

    /// Removes an item and its comments from a list. Owner only.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` or `AccessDenied`.
    pub fn remove_list_item(
        &self,
        actor: UserId,
        list_id: ListId,
        item_id: ListItemId,
    ) -> Result<()> {
        let list = self.load_list(list_id)?;
        self.authorize(&list, Action::Write, actor)?;
        self.load_item_of(list_id, item_id)?;
        if !self.store.delete_list_item(item_id)? {
            return Err(AccessError::NotFound(format!("list item {item_id}")));
        }
        tracing::debug!(list_id = %list_id, item_id = %item_id, %actor, "removed list item");
        Ok(())
    }

    /// Comments on an item of a list `actor` may read.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, `AccessDenied`, or `Validation` for empty text.
    pub fn comment_on_list_item(
        &self,
        actor: UserId,
        item_id: ListItemId,
        content: &str,
    ) -> Result<ItemComment> {
        let item = self.readable_item(actor, item_id)?;
        let content = required_text(content, "Content")?;
        let comment = self.store.insert_item_comment(item.id, actor, &content, now())?;
        tracing::debug!(item_id = %item_id, comment_id = %comment.id, %actor, "added item comment");
        Ok(comment)
    }

    /// Comments on a list item, newest first. Readable by anyone who may
    /// read the list.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` or `AccessDenied`.
    pub fn list_item_comments(
        &self,
        viewer: UserId,
        item_id: ListItemId,
    ) -> Result<Vec<ItemComment>> {
        let item = self.readable_item(viewer, item_id)?;
        self.store.comments_of_item(item.id)
    }

    /// Every list `viewer` may read.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn accessible_lists(&self, viewer: UserId) -> Result<Vec<RestaurantList>> {
        let candidates = self.store.candidate_lists(viewer)?;
        self.readable(viewer, candidates)
    }

    // ==================== Posts ====================

    /// Creates a post by `author`.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for empty content or a rating outside
    /// `[1, 5]`, `NotFound` for an unknown author, and
    /// `NotFound`/`AccessDenied` for a bad circle target.
    pub fn create_post(&self, author: UserId, post: &NewPost) -> Result<Post> {
        let content = required_text(&post.content, "Content")?;
        Rating::new(post.rating)?;
        self.user(author)?;
        self.check_circle_target(author, post.visibility)?;

        let post = NewPost {
            content,
            ..post.clone()
        };
        let created = self.store.insert_post(author, &post, now())?;
        tracing::info!(
            post_id = %created.id,
            %author,
            visibility = created.visibility.as_str(),
            "created post"
        );
        Ok(created)
    }

    /// Loads a post `viewer` may read.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` or `AccessDenied`.
    pub fn get_post(&self, viewer: UserId, id: PostId) -> Result<Post> {
        let post = self.load_post(id)?;
        self.authorize(&post, Action::Read, viewer)?;
        Ok(post)
    }

    /// The visibility decision for `viewer` on a post.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the post does not exist.
    pub fn post_access(&self, viewer: UserId, id: PostId, action: Action) -> Result<Access> {
        let post = self.load_post(id)?;
        self.decide(&post, action, viewer)
    }

    /// Applies `update` to a post. Owner only.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, `AccessDenied` or `Validation`.
    pub fn update_post(&self, actor: UserId, id: PostId, update: PostUpdate) -> Result<Post> {
        let mut post = self.load_post(id)?;
        self.authorize(&post, Action::Write, actor)?;

        if let Some(content) = update.content {
            post.content = required_text(&content, "Content")?;
        }
        if let Some(rating) = update.rating {
            post.rating = Rating::new(rating)?;
        }
        if let Some(visibility) = update.visibility {
            self.check_circle_target(post.user_id, visibility)?;
            post.visibility = visibility;
        }
        post.updated_at = now();

        if !self.store.update_post(&post)? {
            return Err(AccessError::NotFound(format!("post {id}")));
        }
        tracing::info!(post_id = %id, %actor, "updated post");
        Ok(post)
    }

    /// Deletes a post with its comments and likes. Owner only.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` or `AccessDenied`.
    pub fn delete_post(&self, actor: UserId, id: PostId) -> Result<()> {
        let post = self.load_post(id)?;
        self.authorize(&post, Action::Write, actor)?;
        if !self.store.delete_post(id)? {
            return Err(AccessError::NotFound(format!("post {id}")));
        }
        tracing::info!(post_id = %id, %actor, "deleted post");
        Ok(())
    }

    /// Comments on a post `actor` may read.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, `AccessDenied`, or `Validation` for empty text.
    pub fn comment_on_post(&self, actor: UserId, id: PostId, content: &str) -> Result<Comment> {
        let post = self.get_post(actor, id)?;
        let content = required_text(content, "Comment")?;
        let comment = self.store.insert_comment(post.id, actor, &content, now())?;
        tracing::debug!(post_id = %id, comment_id = %comment.id, %actor, "added comment");
        Ok(comment)
    }

    /// Comments of a post `viewer` may read.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` or `AccessDenied`.
    pub fn post_comments(&self, viewer: UserId, id: PostId) -> Result<Vec<Comment>> {
        let post = self.get_post(viewer, id)?;
        self.store.comments_of_post(post.id)
    }

    /// Likes a post `actor` may read. Liking twice counts once.
    ///
    /// Returns the post's like count.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` or `AccessDenied`.
    pub fn like_post(&self, actor: UserId, id: PostId) -> Result<usize> {
        let post = self.get_post(actor, id)?;
        if self.store.insert_like(post.id, actor, now())?.is_created() {
            tracing::debug!(post_id = %id, %actor, "liked post");
        }
        self.store.like_count(post.id)
    }

    // ==================== Helpers ====================

    /// Circle-scoped content needs an existing circle the owner belongs to.
    fn check_circle_target(&self, owner: UserId, visibility: Visibility) -> Result<()> {
        let Some(circle_id) = visibility.circle_id() else {
            return Ok(());
        };
        self.circle(circle_id)?;
        if self
            .circle_snapshot(circle_id)?
            .role_of(circle_id, owner)
            .is_member()
        {
            Ok(())
        } else {
            Err(AccessError::AccessDenied(DenyReason::NotCircleMember))
        }
    }

    fn load_list(&self, id: ListId) -> Result<RestaurantList> {
        self.store
            .get_list(id)?
            .ok_or_else(|| AccessError::NotFound(format!("list {id}")))
    }

    fn load_item_of(&self, list_id: ListId, item_id: ListItemId) -> Result<ListItem> {
        self.store
            .get_list_item(item_id)?
            .filter(|item| item.list_id == list_id)
            .ok_or_else(|| AccessError::NotFound(format!("list item {item_id}")))
    }

    /// Loads an item whose list `viewer` may read.
    fn readable_item(&self, viewer: UserId, item_id: ListItemId) -> Result<ListItem> {
        let item = self
            .store
            .get_list_item(item_id)?
            .ok_or_else(|| AccessError::NotFound(format!("list item {item_id}")))?;
        self.get_list(viewer, item.list_id)?;
        Ok(item)
    }

    fn load_post(&self, id: PostId) -> Result<Post> {
        self.store
            .get_post(id)?
            .ok_or_else(|| AccessError::NotFound(format!("post {id}")))
    }
}
