//! `SQLite` implementation of [`EntityStore`].
//!
//! Uniqueness lives in the schema: `(circle_id, user_id)` memberships,
//! `(follower_id, followee_id)` follow edges, at most one pending request
//! per `(circle_id, user_id)`, at most one pending invite per invitee and
//! circle, unique usernames and invite codes. Inserts that hit one of
//! these report [`InsertOutcome::AlreadyExists`].

// SQLite operations need to hold the lock for the duration of the operation.
// Dropping the guard earlier would require restructuring all methods.
#![allow(clippy::significant_drop_tightening)]

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::types::Type;
use rusqlite::{
    ffi, params, Connection, ErrorCode, OptionalExtension, Params, Row, TransactionBehavior,
};

use super::{EntityStore, FollowCounts, InsertOutcome, ListInsert};
use crate::access::{check_duplicate_name, DuplicatePolicy};
use crate::error::{AccessError, Result};
use crate::model::{
    Circle, CircleId, CircleInvite, CircleMembership, CircleRole, Comment, CommentId,
    FollowEdge, FollowId, FollowStatus, FollowedUser, InviteId, InviteStatus, Invitee,
    ItemComment, ItemCommentId, ListId, ListItem, ListItemId, MemberRequest, NewCircle, NewList,
    NewListItem, NewPost, NewUser, Post, PostId, PrivacySettings, Rating, RequestId,
    RequestStatus, RestaurantList, User, UserId, Visibility,
};

const SCHEMA: &str = r"
    PRAGMA foreign_keys = ON;

    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL UNIQUE,
        name TEXT NOT NULL,
        email TEXT,
        require_follow_approval INTEGER NOT NULL DEFAULT 0,
        private_profile INTEGER NOT NULL DEFAULT 0,
        show_followers_count INTEGER NOT NULL DEFAULT 1,
        show_following_count INTEGER NOT NULL DEFAULT 1,
        created_at INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS circles (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        description TEXT,
        creator_id INTEGER NOT NULL REFERENCES users(id),
        is_private INTEGER NOT NULL DEFAULT 0,
        allow_public_join INTEGER NOT NULL DEFAULT 0,
        invite_code TEXT NOT NULL UNIQUE,
        created_at INTEGER NOT NULL
    );

    -- Active members only; pending asks live in member_requests
    CREATE TABLE IF NOT EXISTS circle_members (
        circle_id INTEGER NOT NULL REFERENCES circles(id) ON DELETE CASCADE,
        user_id INTEGER NOT NULL REFERENCES users(id),
        role TEXT NOT NULL,
        invited_by INTEGER,
        joined_at INTEGER NOT NULL,
        PRIMARY KEY (circle_id, user_id)
    );
    CREATE INDEX IF NOT EXISTS idx_circle_members_user ON circle_members(user_id);

    CREATE TABLE IF NOT EXISTS member_requests (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        circle_id INTEGER NOT NULL REFERENCES circles(id) ON DELETE CASCADE,
        user_id INTEGER NOT NULL REFERENCES users(id),
        status TEXT NOT NULL DEFAULT 'pending',
        requested_at INTEGER NOT NULL,
        resolved_by INTEGER,
        resolved_at INTEGER
    );
    CREATE UNIQUE INDEX IF NOT EXISTS idx_member_requests_pending
        ON member_requests(circle_id, user_id) WHERE status = 'pending';

    CREATE TABLE IF NOT EXISTS circle_invites (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        circle_id INTEGER NOT NULL REFERENCES circles(id) ON DELETE CASCADE,
        inviter_id INTEGER NOT NULL REFERENCES users(id),
        invitee_user_id INTEGER,
        invitee_handle TEXT,
        status TEXT NOT NULL DEFAULT 'pending',
        created_at INTEGER NOT NULL,
        responded_at INTEGER,
        CHECK ((invitee_user_id IS NULL) <> (invitee_handle IS NULL))
    );
    CREATE UNIQUE INDEX IF NOT EXISTS idx_circle_invites_pending
        ON circle_invites(circle_id, IFNULL(invitee_user_id, 0), IFNULL(invitee_handle, ''))
        WHERE status = 'pending';

    CREATE TABLE IF NOT EXISTS follows (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        follower_id INTEGER NOT NULL REFERENCES users(id),
        followee_id INTEGER NOT NULL REFERENCES users(id),
        status TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        accepted_at INTEGER,
        UNIQUE (follower_id, followee_id),
        CHECK (follower_id <> followee_id)
    );

    CREATE TABLE IF NOT EXISTS lists (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        created_by_id INTEGER NOT NULL REFERENCES users(id),
        name TEXT NOT NULL,
        description TEXT,
        visibility TEXT NOT NULL DEFAULT 'private',
        circle_id INTEGER REFERENCES circles(id),
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL,
        CHECK ((visibility = 'circle') = (circle_id IS NOT NULL))
    );
    CREATE INDEX IF NOT EXISTS idx_lists_owner_name ON lists(created_by_id, name);

    CREATE TABLE IF NOT EXISTS list_items (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        list_id INTEGER NOT NULL REFERENCES lists(id) ON DELETE CASCADE,
        restaurant_id INTEGER NOT NULL,
        rating INTEGER CHECK (rating BETWEEN 1 AND 5),
        notes TEXT,
        added_by_id INTEGER NOT NULL REFERENCES users(id),
        position INTEGER NOT NULL DEFAULT 0,
        added_at INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS list_item_comments (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        item_id INTEGER NOT NULL REFERENCES list_items(id) ON DELETE CASCADE,
        user_id INTEGER NOT NULL REFERENCES users(id),
        content TEXT NOT NULL,
        created_at INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS posts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL REFERENCES users(id),
        restaurant_id INTEGER NOT NULL,
        content TEXT NOT NULL,
        rating INTEGER NOT NULL CHECK (rating BETWEEN 1 AND 5),
        visibility TEXT NOT NULL DEFAULT 'public',
        circle_id INTEGER REFERENCES circles(id),
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL,
        CHECK ((visibility = 'circle') = (circle_id IS NOT NULL))
    );

    CREATE TABLE IF NOT EXISTS post_comments (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        post_id INTEGER NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
        user_id INTEGER NOT NULL REFERENCES users(id),
        content TEXT NOT NULL,
        created_at INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS post_likes (
        post_id INTEGER NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
        user_id INTEGER NOT NULL REFERENCES users(id),
        created_at INTEGER NOT NULL,
        PRIMARY KEY (post_id, user_id)
    );
";

const USER_COLUMNS: &str = "id, username, name, email, require_follow_approval, private_profile, \
     show_followers_count, show_following_count, created_at";
const CIRCLE_COLUMNS: &str =
    "id, name, description, creator_id, is_private, allow_public_join, invite_code, created_at";
const MEMBER_COLUMNS: &str = "circle_id, user_id, role, invited_by, joined_at";
const REQUEST_COLUMNS: &str =
    "id, circle_id, user_id, status, requested_at, resolved_by, resolved_at";
const INVITE_COLUMNS: &str = "id, circle_id, inviter_id, invitee_user_id, invitee_handle, status, \
     created_at, responded_at";
const FOLLOW_COLUMNS: &str = "id, follower_id, followee_id, status, created_at, accepted_at";
const LIST_COLUMNS: &str =
    "id, created_by_id, name, description, visibility, circle_id, created_at, updated_at";
const ITEM_COLUMNS: &str =
    "id, list_id, restaurant_id, rating, notes, added_by_id, position, added_at";
const POST_COLUMNS: &str =
    "id, user_id, restaurant_id, content, rating, visibility, circle_id, created_at, updated_at";
const COMMENT_COLUMNS: &str = "id, post_id, user_id, content, created_at";
const ITEM_COMMENT_COLUMNS: &str = "id, item_id, user_id, content, created_at";

/// `SQLite`-based entity store.
///
/// Thread-safe wrapper around a single `SQLite` connection.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    insert_retries: u8,
}

impl SqliteStore {
    /// Opens (or creates) the database at `path`.
    ///
    /// Creates the tables if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be created or initialized.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Creates an in-memory store for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be initialized.
    #[cfg(any(test, feature = "test-utils"))]
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            insert_retries: 1,
        })
    }

    /// Sets how many times a write is retried when the database is busy.
    #[must_use]
    pub const fn with_insert_retries(mut self, retries: u8) -> Self {
        self.insert_retries = retries;
        self
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| AccessError::Storage(format!("Failed to acquire database lock: {e}")))
    }

    /// Runs a write, retrying while `SQLite` reports busy or locked.
    fn write<T>(&self, mut op: impl FnMut(&mut Connection) -> rusqlite::Result<T>) -> Result<T> {
        let mut conn = self.lock()?;
        let mut attempt = 0;
        loop {
            match op(&mut *conn) {
                Err(e) if is_busy(&e) && attempt < self.insert_retries => {
                    attempt += 1;
                    tracing::debug!(attempt, error = %e, "database busy, retrying write");
                }
                result => return result.map_err(AccessError::from),
            }
        }
    }

    fn query_one<T>(
        &self,
        sql: &str,
        params: impl Params,
        map: fn(&Row<'_>) -> rusqlite::Result<T>,
    ) -> Result<Option<T>> {
        let conn = self.lock()?;
        Ok(conn.query_row(sql, params, map).optional()?)
    }

    fn query_many<T>(
        &self,
        sql: &str,
        params: impl Params,
        map: fn(&Row<'_>) -> rusqlite::Result<T>,
    ) -> Result<Vec<T>> {
        let conn = self.lock()?;
        Ok(query_all(&conn, sql, params, map)?)
    }

    fn count(&self, sql: &str, params: impl Params) -> Result<usize> {
        let conn = self.lock()?;
        let n: i64 = conn.query_row(sql, params, |row| row.get(0))?;
        usize::try_from(n).map_err(|e| AccessError::Storage(format!("Invalid row count {n}: {e}")))
    }
}

fn query_all<T>(
    conn: &Connection,
    sql: &str,
    params: impl Params,
    map: fn(&Row<'_>) -> rusqlite::Result<T>,
) -> rusqlite::Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, map)?.collect();
    rows
}

fn is_busy(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    )
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
                || e.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}

/// Turns a uniqueness violation into `AlreadyExists`.
fn created_or_exists<T>(result: rusqlite::Result<T>) -> rusqlite::Result<InsertOutcome<T>> {
    match result {
        Ok(value) => Ok(InsertOutcome::Created(value)),
        Err(e) if is_unique_violation(&e) => Ok(InsertOutcome::AlreadyExists),
        Err(e) => Err(e),
    }
}

fn bad_column(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}

fn visibility_column(row: &Row<'_>, scope_idx: usize) -> rusqlite::Result<Visibility> {
    let scope: String = row.get(scope_idx)?;
    let circle_id: Option<i64> = row.get(scope_idx + 1)?;
    Visibility::from_parts(&scope, circle_id.map(CircleId))
        .map_err(|e| bad_column(scope_idx, e.to_string()))
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: UserId(row.get(0)?),
        username: row.get(1)?,
        name: row.get(2)?,
        email: row.get(3)?,
        privacy: PrivacySettings {
            require_follow_approval: row.get(4)?,
            private_profile: row.get(5)?,
            show_followers_count: row.get(6)?,
            show_following_count: row.get(7)?,
        },
        created_at: row.get(8)?,
    })
}

fn circle_from_row(row: &Row<'_>) -> rusqlite::Result<Circle> {
    Ok(Circle {
        id: CircleId(row.get(0)?),
        name: row.get(1)?,
        description: row.get(2)?,
        creator_id: UserId(row.get(3)?),
        is_private: row.get(4)?,
        allow_public_join: row.get(5)?,
        invite_code: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn membership_from_row(row: &Row<'_>) -> rusqlite::Result<CircleMembership> {
    let role: String = row.get(2)?;
    Ok(CircleMembership {
        circle_id: CircleId(row.get(0)?),
        user_id: UserId(row.get(1)?),
        role: CircleRole::parse(&role)
            .ok_or_else(|| bad_column(2, format!("Invalid circle role: {role}")))?,
        invited_by: row.get::<_, Option<i64>>(3)?.map(UserId),
        joined_at: row.get(4)?,
    })
}

fn request_from_row(row: &Row<'_>) -> rusqlite::Result<MemberRequest> {
    let status: String = row.get(3)?;
    Ok(MemberRequest {
        id: RequestId(row.get(0)?),
        circle_id: CircleId(row.get(1)?),
        user_id: UserId(row.get(2)?),
        status: RequestStatus::parse(&status)
            .ok_or_else(|| bad_column(3, format!("Invalid request status: {status}")))?,
        requested_at: row.get(4)?,
        resolved_by: row.get::<_, Option<i64>>(5)?.map(UserId),
        resolved_at: row.get(6)?,
    })
}

fn invite_from_row(row: &Row<'_>) -> rusqlite::Result<CircleInvite> {
    let invitee = match (row.get::<_, Option<i64>>(3)?, row.get::<_, Option<String>>(4)?) {
        (Some(id), None) => Invitee::User(UserId(id)),
        (None, Some(handle)) => Invitee::Handle(handle),
        _ => return Err(bad_column(3, "Invite must name exactly one invitee".to_string())),
    };
    let status: String = row.get(5)?;
    Ok(CircleInvite {
        id: InviteId(row.get(0)?),
        circle_id: CircleId(row.get(1)?),
        inviter_id: UserId(row.get(2)?),
        invitee,
        status: InviteStatus::parse(&status)
            .ok_or_else(|| bad_column(5, format!("Invalid invite status: {status}")))?,
        created_at: row.get(6)?,
        responded_at: row.get(7)?,
    })
}

fn follow_from_row(row: &Row<'_>) -> rusqlite::Result<FollowEdge> {
    let status: String = row.get(3)?;
    Ok(FollowEdge {
        id: FollowId(row.get(0)?),
        follower_id: UserId(row.get(1)?),
        followee_id: UserId(row.get(2)?),
        status: FollowStatus::parse(&status)
            .ok_or_else(|| bad_column(3, format!("Invalid follow status: {status}")))?,
        created_at: row.get(4)?,
        accepted_at: row.get(5)?,
    })
}

fn list_from_row(row: &Row<'_>) -> rusqlite::Result<RestaurantList> {
    Ok(RestaurantList {
        id: ListId(row.get(0)?),
        created_by_id: UserId(row.get(1)?),
        name: row.get(2)?,
        description: row.get(3)?,
        visibility: visibility_column(row, 4)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn item_from_row(row: &Row<'_>) -> rusqlite::Result<ListItem> {
    let rating = row
        .get::<_, Option<i64>>(3)?
        .map(Rating::new)
        .transpose()
        .map_err(|e| bad_column(3, e.to_string()))?;
    Ok(ListItem {
        id: ListItemId(row.get(0)?),
        list_id: ListId(row.get(1)?),
        restaurant_id: row.get(2)?,
        rating,
        notes: row.get(4)?,
        added_by_id: UserId(row.get(5)?),
        position: row.get(6)?,
        added_at: row.get(7)?,
    })
}

fn post_from_row(row: &Row<'_>) -> rusqlite::Result<Post> {
    Ok(Post {
        id: PostId(row.get(0)?),
        user_id: UserId(row.get(1)?),
        restaurant_id: row.get(2)?,
        content: row.get(3)?,
        rating: Rating::new(row.get(4)?).map_err(|e| bad_column(4, e.to_string()))?,
        visibility: visibility_column(row, 5)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

fn comment_from_row(row: &Row<'_>) -> rusqlite::Result<Comment> {
    Ok(Comment {
        id: CommentId(row.get(0)?),
        post_id: PostId(row.get(1)?),
        user_id: UserId(row.get(2)?),
        content: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn item_comment_from_row(row: &Row<'_>) -> rusqlite::Result<ItemComment> {
    Ok(ItemComment {
        id: ItemCommentId(row.get(0)?),
        item_id: ListItemId(row.get(1)?),
        user_id: UserId(row.get(2)?),
        content: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn followed_user_from_row(row: &Row<'_>) -> rusqlite::Result<FollowedUser> {
    Ok(FollowedUser {
        id: UserId(row.get(0)?),
        username: row.get(1)?,
        name: row.get(2)?,
        followed_at: row.get(3)?,
    })
}

/// Inserts a membership unless one exists. Used inside transitions that
/// may race with another path to the same membership.
fn add_member_if_absent(conn: &Connection, member: &CircleMembership) -> rusqlite::Result<()> {
    let inserted = conn.execute(
        r"
        INSERT INTO circle_members (circle_id, user_id, role, invited_by, joined_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        ON CONFLICT(circle_id, user_id) DO NOTHING
        ",
        params![
            member.circle_id.get(),
            member.user_id.get(),
            member.role.as_str(),
            member.invited_by.map(UserId::get),
            member.joined_at,
        ],
    )?;
    if inserted > 0 {
        close_pending_requests(conn, member)?;
    }
    Ok(())
}

/// Marks the new member's pending request for the circle as approved, so
/// no request stays open for someone who already holds a membership.
fn close_pending_requests(conn: &Connection, member: &CircleMembership) -> rusqlite::Result<()> {
    conn.execute(
        r"
        UPDATE member_requests SET status = ?1, resolved_by = ?2, resolved_at = ?3
        WHERE circle_id = ?4 AND user_id = ?5 AND status = 'pending'
        ",
        params![
            RequestStatus::Approved.as_str(),
            member.invited_by.map(UserId::get),
            member.joined_at,
            member.circle_id.get(),
            member.user_id.get(),
        ],
    )?;
    Ok(())
}

impl EntityStore for SqliteStore {
    // ==================== Users ====================

    fn insert_user(&self, user: &NewUser, now: i64) -> Result<InsertOutcome<User>> {
        let privacy = PrivacySettings::default();
        let outcome = self.write(|conn| {
            created_or_exists(
                conn.execute(
                    r"
                    INSERT INTO users (username, name, email, require_follow_approval,
                        private_profile, show_followers_count, show_following_count, created_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                    ",
                    params![
                        &user.username,
                        &user.name,
                        &user.email,
                        privacy.require_follow_approval,
                        privacy.private_profile,
                        privacy.show_followers_count,
                        privacy.show_following_count,
                        now,
                    ],
                )
                .map(|_| conn.last_insert_rowid()),
            )
        })?;

        Ok(outcome.map(|id| User {
            id: UserId(id),
            username: user.username.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
            privacy,
            created_at: now,
        }))
    }

    fn get_user(&self, id: UserId) -> Result<Option<User>> {
        self.query_one(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            params![id.get()],
            user_from_row,
        )
    }

    fn user_by_handle(&self, handle: &str) -> Result<Option<User>> {
        self.query_one(
            &format!(
                "SELECT {USER_COLUMNS} FROM users WHERE username = ?1 OR email = ?1 \
                 ORDER BY username = ?1 DESC, id LIMIT 1"
            ),
            params![handle],
            user_from_row,
        )
    }

    fn update_privacy(&self, id: UserId, privacy: &PrivacySettings) -> Result<bool> {
        let updated = self.write(|conn| {
            conn.execute(
                r"
                UPDATE users SET require_follow_approval = ?1, private_profile = ?2,
                    show_followers_count = ?3, show_following_count = ?4
                WHERE id = ?5
                ",
                params![
                    privacy.require_follow_approval,
                    privacy.private_profile,
                    privacy.show_followers_count,
                    privacy.show_following_count,
                    id.get(),
                ],
            )
        })?;
        Ok(updated > 0)
    }

    // ==================== Circles ====================

    fn insert_circle(
        &self,
        circle: &NewCircle,
        creator: UserId,
        invite_code: &str,
        now: i64,
    ) -> Result<InsertOutcome<Circle>> {
        let outcome = self.write(|conn| {
            let tx = conn.transaction()?;
            let inserted = tx.execute(
                r"
                INSERT INTO circles (name, description, creator_id, is_private,
                    allow_public_join, invite_code, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ",
                params![
                    &circle.name,
                    &circle.description,
                    creator.get(),
                    circle.is_private,
                    circle.allow_public_join,
                    invite_code,
                    now,
                ],
            );
            let circle_id = match created_or_exists(inserted)? {
                InsertOutcome::Created(_) => tx.last_insert_rowid(),
                InsertOutcome::AlreadyExists => return Ok(InsertOutcome::AlreadyExists),
            };
            tx.execute(
                r"
                INSERT INTO circle_members (circle_id, user_id, role, invited_by, joined_at)
                VALUES (?1, ?2, ?3, NULL, ?4)
                ",
                params![circle_id, creator.get(), CircleRole::Owner.as_str(), now],
            )?;
            tx.commit()?;
            Ok(InsertOutcome::Created(circle_id))
        })?;

        Ok(outcome.map(|id| Circle {
            id: CircleId(id),
            name: circle.name.clone(),
            description: circle.description.clone(),
            creator_id: creator,
            is_private: circle.is_private,
            allow_public_join: circle.allow_public_join,
            invite_code: invite_code.to_string(),
            created_at: now,
        }))
    }

    fn get_circle(&self, id: CircleId) -> Result<Option<Circle>> {
        self.query_one(
            &format!("SELECT {CIRCLE_COLUMNS} FROM circles WHERE id = ?1"),
            params![id.get()],
            circle_from_row,
        )
    }

    fn circle_by_invite_code(&self, code: &str) -> Result<Option<Circle>> {
        self.query_one(
            &format!("SELECT {CIRCLE_COLUMNS} FROM circles WHERE invite_code = ?1"),
            params![code],
            circle_from_row,
        )
    }

    fn replace_invite_code(&self, id: CircleId, code: &str) -> Result<InsertOutcome<()>> {
        self.write(|conn| {
            created_or_exists(conn.execute(
                "UPDATE circles SET invite_code = ?1 WHERE id = ?2",
                params![code, id.get()],
            ))
            .map(|outcome| outcome.map(|_| ()))
        })
    }

    fn member_count(&self, id: CircleId) -> Result<usize> {
        self.count(
            "SELECT COUNT(*) FROM circle_members WHERE circle_id = ?1",
            params![id.get()],
        )
    }

    // ==================== Memberships ====================

    fn insert_membership(
        &self,
        membership: &CircleMembership,
    ) -> Result<InsertOutcome<CircleMembership>> {
        let outcome = self.write(|conn| {
            let tx = conn.transaction()?;
            let inserted = created_or_exists(tx.execute(
                r"
                INSERT INTO circle_members (circle_id, user_id, role, invited_by, joined_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ",
                params![
                    membership.circle_id.get(),
                    membership.user_id.get(),
                    membership.role.as_str(),
                    membership.invited_by.map(UserId::get),
                    membership.joined_at,
                ],
            ))?;
            if inserted.is_created() {
                close_pending_requests(&tx, membership)?;
                tx.commit()?;
            }
            Ok(inserted)
        })?;
        Ok(outcome.map(|_| membership.clone()))
    }

    fn memberships_of_circle(&self, circle_id: CircleId) -> Result<Vec<CircleMembership>> {
        self.query_many(
            &format!(
                "SELECT {MEMBER_COLUMNS} FROM circle_members WHERE circle_id = ?1 ORDER BY joined_at, user_id"
            ),
            params![circle_id.get()],
            membership_from_row,
        )
    }

    fn memberships_of_user(&self, user_id: UserId) -> Result<Vec<CircleMembership>> {
        self.query_many(
            &format!(
                "SELECT {MEMBER_COLUMNS} FROM circle_members WHERE user_id = ?1 ORDER BY circle_id"
            ),
            params![user_id.get()],
            membership_from_row,
        )
    }

    fn delete_membership(&self, circle_id: CircleId, user_id: UserId) -> Result<bool> {
        let deleted = self.write(|conn| {
            conn.execute(
                "DELETE FROM circle_members WHERE circle_id = ?1 AND user_id = ?2",
                params![circle_id.get(), user_id.get()],
            )
        })?;
        Ok(deleted > 0)
    }

    fn set_member_role(
        &self,
        circle_id: CircleId,
        user_id: UserId,
        role: CircleRole,
    ) -> Result<bool> {
        let updated = self.write(|conn| {
            conn.execute(
                "UPDATE circle_members SET role = ?1 WHERE circle_id = ?2 AND user_id = ?3",
                params![role.as_str(), circle_id.get(), user_id.get()],
            )
        })?;
        Ok(updated > 0)
    }

    // ==================== Member requests ====================

    fn insert_member_request(
        &self,
        circle_id: CircleId,
        user_id: UserId,
        now: i64,
    ) -> Result<InsertOutcome<MemberRequest>> {
        let outcome = self.write(|conn| {
            created_or_exists(
                conn.execute(
                    r"
                    INSERT INTO member_requests (circle_id, user_id, status, requested_at)
                    VALUES (?1, ?2, ?3, ?4)
                    ",
                    params![
                        circle_id.get(),
                        user_id.get(),
                        RequestStatus::Pending.as_str(),
                        now
                    ],
                )
                .map(|_| conn.last_insert_rowid()),
            )
        })?;

        Ok(outcome.map(|id| MemberRequest {
            id: RequestId(id),
            circle_id,
            user_id,
            status: RequestStatus::Pending,
            requested_at: now,
            resolved_by: None,
            resolved_at: None,
        }))
    }

    fn get_member_request(&self, id: RequestId) -> Result<Option<MemberRequest>> {
        self.query_one(
            &format!("SELECT {REQUEST_COLUMNS} FROM member_requests WHERE id = ?1"),
            params![id.get()],
            request_from_row,
        )
    }

    fn pending_requests_of_circle(&self, circle_id: CircleId) -> Result<Vec<MemberRequest>> {
        self.query_many(
            &format!(
                "SELECT {REQUEST_COLUMNS} FROM member_requests \
                 WHERE circle_id = ?1 AND status = 'pending' ORDER BY requested_at, id"
            ),
            params![circle_id.get()],
            request_from_row,
        )
    }

    fn pending_requests_of_user(&self, user_id: UserId) -> Result<Vec<MemberRequest>> {
        self.query_many(
            &format!(
                "SELECT {REQUEST_COLUMNS} FROM member_requests \
                 WHERE user_id = ?1 AND status = 'pending' ORDER BY requested_at, id"
            ),
            params![user_id.get()],
            request_from_row,
        )
    }

    fn resolve_member_request(
        &self,
        id: RequestId,
        next: RequestStatus,
        resolver: UserId,
        now: i64,
        new_member: Option<&CircleMembership>,
    ) -> Result<bool> {
        self.write(|conn| {
            let tx = conn.transaction()?;
            let updated = tx.execute(
                r"
                UPDATE member_requests SET status = ?1, resolved_by = ?2, resolved_at = ?3
                WHERE id = ?4 AND status = 'pending'
                ",
                params![next.as_str(), resolver.get(), now, id.get()],
            )?;
            if updated == 0 {
                return Ok(false);
            }
            if let Some(member) = new_member {
                add_member_if_absent(&tx, member)?;
            }
            tx.commit()?;
            Ok(true)
        })
    }

    // ==================== Invites ====================

    fn insert_invite(
        &self,
        circle_id: CircleId,
        inviter: UserId,
        invitee: &Invitee,
        now: i64,
    ) -> Result<InsertOutcome<CircleInvite>> {
        let (invitee_user_id, invitee_handle) = match invitee {
            Invitee::User(id) => (Some(id.get()), None),
            Invitee::Handle(handle) => (None, Some(handle.as_str())),
        };
        let outcome = self.write(|conn| {
            created_or_exists(
                conn.execute(
                    r"
                    INSERT INTO circle_invites (circle_id, inviter_id, invitee_user_id,
                        invitee_handle, status, created_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                    ",
                    params![
                        circle_id.get(),
                        inviter.get(),
                        invitee_user_id,
                        invitee_handle,
                        InviteStatus::Pending.as_str(),
                        now,
                    ],
                )
                .map(|_| conn.last_insert_rowid()),
            )
        })?;

        Ok(outcome.map(|id| CircleInvite {
            id: InviteId(id),
            circle_id,
            inviter_id: inviter,
            invitee: invitee.clone(),
            status: InviteStatus::Pending,
            created_at: now,
            responded_at: None,
        }))
    }

    fn get_invite(&self, id: InviteId) -> Result<Option<CircleInvite>> {
        self.query_one(
            &format!("SELECT {INVITE_COLUMNS} FROM circle_invites WHERE id = ?1"),
            params![id.get()],
            invite_from_row,
        )
    }

    fn pending_invites_for(&self, user: &User) -> Result<Vec<CircleInvite>> {
        self.query_many(
            &format!(
                "SELECT {INVITE_COLUMNS} FROM circle_invites \
                 WHERE status = 'pending' \
                   AND (invitee_user_id = ?1 OR invitee_handle = ?2 OR invitee_handle = ?3) \
                 ORDER BY created_at, id"
            ),
            params![user.id.get(), &user.username, &user.email],
            invite_from_row,
        )
    }

    fn resolve_invite(
        &self,
        id: InviteId,
        next: InviteStatus,
        now: i64,
        new_member: Option<&CircleMembership>,
    ) -> Result<bool> {
        self.write(|conn| {
            let tx = conn.transaction()?;
            let updated = tx.execute(
                r"
                UPDATE circle_invites SET status = ?1, responded_at = ?2
                WHERE id = ?3 AND status = 'pending'
                ",
                params![next.as_str(), now, id.get()],
            )?;
            if updated == 0 {
                return Ok(false);
            }
            if let Some(member) = new_member {
                add_member_if_absent(&tx, member)?;
            }
            tx.commit()?;
            Ok(true)
        })
    }

    fn delete_pending_invite(&self, id: InviteId) -> Result<bool> {
        let deleted = self.write(|conn| {
            conn.execute(
                "DELETE FROM circle_invites WHERE id = ?1 AND status = 'pending'",
                params![id.get()],
            )
        })?;
        Ok(deleted > 0)
    }

    // ==================== Follows ====================

    fn insert_follow(
        &self,
        follower: UserId,
        followee: UserId,
        status: FollowStatus,
        now: i64,
    ) -> Result<InsertOutcome<FollowEdge>> {
        let accepted_at = (status == FollowStatus::Accepted).then_some(now);
        let outcome = self.write(|conn| {
            created_or_exists(
                conn.execute(
                    r"
                    INSERT INTO follows (follower_id, followee_id, status, created_at, accepted_at)
                    VALUES (?1, ?2, ?3, ?4, ?5)
                    ",
                    params![follower.get(), followee.get(), status.as_str(), now, accepted_at],
                )
                .map(|_| conn.last_insert_rowid()),
            )
        })?;

        Ok(outcome.map(|id| FollowEdge {
            id: FollowId(id),
            follower_id: follower,
            followee_id: followee,
            status,
            created_at: now,
            accepted_at,
        }))
    }

    fn get_follow(&self, id: FollowId) -> Result<Option<FollowEdge>> {
        self.query_one(
            &format!("SELECT {FOLLOW_COLUMNS} FROM follows WHERE id = ?1"),
            params![id.get()],
            follow_from_row,
        )
    }

    fn follow_between(&self, follower: UserId, followee: UserId) -> Result<Option<FollowEdge>> {
        self.query_one(
            &format!(
                "SELECT {FOLLOW_COLUMNS} FROM follows WHERE follower_id = ?1 AND followee_id = ?2"
            ),
            params![follower.get(), followee.get()],
            follow_from_row,
        )
    }

    fn accept_follow(&self, id: FollowId, now: i64) -> Result<bool> {
        let updated = self.write(|conn| {
            conn.execute(
                r"
                UPDATE follows SET status = ?1, accepted_at = ?2
                WHERE id = ?3 AND status = 'pending'
                ",
                params![FollowStatus::Accepted.as_str(), now, id.get()],
            )
        })?;
        Ok(updated > 0)
    }

    fn delete_pending_follow(&self, id: FollowId) -> Result<bool> {
        let deleted = self.write(|conn| {
            conn.execute(
                "DELETE FROM follows WHERE id = ?1 AND status = 'pending'",
                params![id.get()],
            )
        })?;
        Ok(deleted > 0)
    }

    fn delete_follow_between(&self, follower: UserId, followee: UserId) -> Result<bool> {
        let deleted = self.write(|conn| {
            conn.execute(
                "DELETE FROM follows WHERE follower_id = ?1 AND followee_id = ?2",
                params![follower.get(), followee.get()],
            )
        })?;
        Ok(deleted > 0)
    }

    fn pending_follows_to(&self, followee: UserId) -> Result<Vec<FollowEdge>> {
        self.query_many(
            &format!(
                "SELECT {FOLLOW_COLUMNS} FROM follows \
                 WHERE followee_id = ?1 AND status = 'pending' ORDER BY created_at, id"
            ),
            params![followee.get()],
            follow_from_row,
        )
    }

    fn follow_counts(&self, user_id: UserId) -> Result<FollowCounts> {
        Ok(FollowCounts {
            followers: self.count(
                "SELECT COUNT(*) FROM follows WHERE followee_id = ?1 AND status = 'accepted'",
                params![user_id.get()],
            )?,
            following: self.count(
                "SELECT COUNT(*) FROM follows WHERE follower_id = ?1 AND status = 'accepted'",
                params![user_id.get()],
            )?,
        })
    }

    fn followers_of(&self, user_id: UserId) -> Result<Vec<FollowedUser>> {
        self.query_many(
            "SELECT u.id, u.username, u.name, f.created_at FROM follows f \
             JOIN users u ON u.id = f.follower_id \
             WHERE f.followee_id = ?1 AND f.status = 'accepted' ORDER BY f.created_at, f.id",
            params![user_id.get()],
            followed_user_from_row,
        )
    }

    fn following_of(&self, user_id: UserId) -> Result<Vec<FollowedUser>> {
        self.query_many(
            "SELECT u.id, u.username, u.name, f.created_at FROM follows f \
             JOIN users u ON u.id = f.followee_id \
             WHERE f.follower_id = ?1 AND f.status = 'accepted' ORDER BY f.created_at, f.id",
            params![user_id.get()],
            followed_user_from_row,
        )
    }

    // ==================== Lists ====================

    fn insert_list(
        &self,
        owner: UserId,
        list: &NewList,
        policy: DuplicatePolicy,
        now: i64,
    ) -> Result<ListInsert> {
        self.write(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            if policy == DuplicatePolicy::Reject {
                let existing = query_all(
                    &tx,
                    &format!("SELECT {LIST_COLUMNS} FROM lists WHERE created_by_id = ?1 ORDER BY id"),
                    params![owner.get()],
                    list_from_row,
                )?;
                if let Some(existing_id) = check_duplicate_name(owner, &list.name, &existing) {
                    return Ok(ListInsert::Duplicate(existing_id));
                }
            }
            tx.execute(
                r"
                INSERT INTO lists (created_by_id, name, description, visibility, circle_id,
                    created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
                ",
                params![
                    owner.get(),
                    &list.name,
                    &list.description,
                    list.visibility.as_str(),
                    list.visibility.circle_id().map(CircleId::get),
                    now,
                ],
            )?;
            let id = ListId(tx.last_insert_rowid());
            tx.commit()?;
            Ok(ListInsert::Created(RestaurantList {
                id,
                created_by_id: owner,
                name: list.name.clone(),
                description: list.description.clone(),
                visibility: list.visibility,
                created_at: now,
                updated_at: now,
            }))
        })
    }

    fn get_list(&self, id: ListId) -> Result<Option<RestaurantList>> {
        self.query_one(
            &format!("SELECT {LIST_COLUMNS} FROM lists WHERE id = ?1"),
            params![id.get()],
            list_from_row,
        )
    }

    fn lists_of_owner(&self, owner: UserId) -> Result<Vec<RestaurantList>> {
        self.query_many(
            &format!("SELECT {LIST_COLUMNS} FROM lists WHERE created_by_id = ?1 ORDER BY id"),
            params![owner.get()],
            list_from_row,
        )
    }

    fn candidate_lists(&self, viewer: UserId) -> Result<Vec<RestaurantList>> {
        self.query_many(
            &format!(
                "SELECT {LIST_COLUMNS} FROM lists \
                 WHERE created_by_id = ?1 OR visibility <> 'private' ORDER BY id"
            ),
            params![viewer.get()],
            list_from_row,
        )
    }

    fn update_list(&self, list: &RestaurantList) -> Result<bool> {
        let updated = self.write(|conn| {
            conn.execute(
                r"
                UPDATE lists SET name = ?1, description = ?2, visibility = ?3, circle_id = ?4,
                    updated_at = ?5
                WHERE id = ?6
                ",
                params![
                    &list.name,
                    &list.description,
                    list.visibility.as_str(),
                    list.visibility.circle_id().map(CircleId::get),
                    list.updated_at,
                    list.id.get(),
                ],
            )
        })?;
        Ok(updated > 0)
    }

    fn delete_list(&self, id: ListId) -> Result<bool> {
        let deleted = self.write(|conn| {
            conn.execute("DELETE FROM lists WHERE id = ?1", params![id.get()])
        })?;
        Ok(deleted > 0)
    }

    fn insert_list_item(
        &self,
        list_id: ListId,
        added_by: UserId,
        item: &NewListItem,
        now: i64,
    ) -> Result<ListItem> {
        let rating = item.rating.map(Rating::new).transpose()?;
        let id = self.write(|conn| {
            conn.execute(
                r"
                INSERT INTO list_items (list_id, restaurant_id, rating, notes, added_by_id,
                    position, added_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ",
                params![
                    list_id.get(),
                    item.restaurant_id,
                    rating.map(i64::from),
                    &item.notes,
                    added_by.get(),
                    item.position,
                    now,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })?;

        Ok(ListItem {
            id: ListItemId(id),
            list_id,
            restaurant_id: item.restaurant_id,
            rating,
            notes: item.notes.clone(),
            added_by_id: added_by,
            position: item.position,
            added_at: now,
        })
    }

    fn list_items(&self, list_id: ListId) -> Result<Vec<ListItem>> {
        self.query_many(
            &format!(
                "SELECT {ITEM_COLUMNS} FROM list_items WHERE list_id = ?1 ORDER BY position, id"
            ),
            params![list_id.get()],
            item_from_row,
        )
    }

    fn get_list_item(&self, id: ListItemId) -> Result<Option<ListItem>> {
        self.query_one(
            &format!("SELECT {ITEM_COLUMNS} FROM list_items WHERE id = ?1"),
            params![id.get()],
            item_from_row,
        )
    }

    fn update_list_item(&self, item: &ListItem) -> Result<bool> {
        let updated = self.write(|conn| {
            conn.execute(
                "UPDATE list_items SET rating = ?1, notes = ?2, position = ?3 WHERE id = ?4",
                params![
                    item.rating.map(i64::from),
                    &item.notes,
                    item.position,
                    item.id.get(),
                ],
            )
        })?;
        Ok(updated > 0)
    }

    fn delete_list_item(&self, id: ListItemId) -> Result<bool> {
        let deleted = self.write(|conn| {
            conn.execute("DELETE FROM list_items WHERE id = ?1", params![id.get()])
        })?;
        Ok(deleted > 0)
    }

    fn insert_item_comment(
        &self,
        item_id: ListItemId,
        author: UserId,
        content: &str,
        now: i64,
    ) -> Result<ItemComment> {
        let id = self.write(|conn| {
            conn.execute(
                "INSERT INTO list_item_comments (item_id, user_id, content, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![item_id.get(), author.get(), content, now],
            )?;
            Ok(conn.last_insert_rowid())
        })?;

        Ok(ItemComment {
            id: ItemCommentId(id),
            item_id,
            user_id: author,
            content: content.to_string(),
            created_at: now,
        })
    }

    fn comments_of_item(&self, item_id: ListItemId) -> Result<Vec<ItemComment>> {
        self.query_many(
            &format!(
                "SELECT {ITEM_COMMENT_COLUMNS} FROM list_item_comments \
                 WHERE item_id = ?1 ORDER BY created_at DESC, id DESC"
            ),
            params![item_id.get()],
            item_comment_from_row,
        )
    }

    // ==================== Posts ====================

    fn insert_post(&self, author: UserId, post: &NewPost, now: i64) -> Result<Post> {
        let rating = Rating::new(post.rating)?;
        let id = self.write(|conn| {
            conn.execute(
                r"
                INSERT INTO posts (user_id, restaurant_id, content, rating, visibility,
                    circle_id, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
                ",
                params![
                    author.get(),
                    post.restaurant_id,
                    &post.content,
                    i64::from(rating),
                    post.visibility.as_str(),
                    post.visibility.circle_id().map(CircleId::get),
                    now,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })?;

        Ok(Post {
            id: PostId(id),
            user_id: author,
            restaurant_id: post.restaurant_id,
            content: post.content.clone(),
            rating,
            visibility: post.visibility,
            created_at: now,
            updated_at: now,
        })
    }

    fn get_post(&self, id: PostId) -> Result<Option<Post>> {
        self.query_one(
            &format!("SELECT {POST_COLUMNS} FROM posts WHERE id = ?1"),
            params![id.get()],
            post_from_row,
        )
    }

    fn update_post(&self, post: &Post) -> Result<bool> {
        let updated = self.write(|conn| {
            conn.execute(
                r"
                UPDATE posts SET content = ?1, rating = ?2, visibility = ?3, circle_id = ?4,
                    updated_at = ?5
                WHERE id = ?6
                ",
                params![
                    &post.content,
                    i64::from(post.rating),
                    post.visibility.as_str(),
                    post.visibility.circle_id().map(CircleId::get),
                    post.updated_at,
                    post.id.get(),
                ],
            )
        })?;
        Ok(updated > 0)
    }

    fn delete_post(&self, id: PostId) -> Result<bool> {
        let deleted = self.write(|conn| {
            conn.execute("DELETE FROM posts WHERE id = ?1", params![id.get()])
        })?;
        Ok(deleted > 0)
    }

    fn insert_comment(
        &self,
        post_id: PostId,
        author: UserId,
        content: &str,
        now: i64,
    ) -> Result<Comment> {
        let id = self.write(|conn| {
            conn.execute(
                "INSERT INTO post_comments (post_id, user_id, content, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![post_id.get(), author.get(), content, now],
            )?;
            Ok(conn.last_insert_rowid())
        })?;

        Ok(Comment {
            id: CommentId(id),
            post_id,
            user_id: author,
            content: content.to_string(),
            created_at: now,
        })
    }

    fn comments_of_post(&self, post_id: PostId) -> Result<Vec<Comment>> {
        self.query_many(
            &format!(
                "SELECT {COMMENT_COLUMNS} FROM post_comments WHERE post_id = ?1 ORDER BY created_at, id"
            ),
            params![post_id.get()],
            comment_from_row,
        )
    }

    fn insert_like(&self, post_id: PostId, user_id: UserId, now: i64) -> Result<InsertOutcome<()>> {
        self.write(|conn| {
            created_or_exists(conn.execute(
                "INSERT INTO post_likes (post_id, user_id, created_at) VALUES (?1, ?2, ?3)",
                params![post_id.get(), user_id.get(), now],
            ))
            .map(|outcome| outcome.map(|_| ()))
        })
    }

    fn like_count(&self, post_id: PostId) -> Result<usize> {
        self.count(
            "SELECT COUNT(*) FROM post_likes WHERE post_id = ?1",
            params![post_id.get()],
        )
    }
}
