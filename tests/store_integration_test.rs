//! Integration tests for the `SQLite` entity store on disk.
//!
//! These tests verify:
//! - Data survives closing and reopening the database
//! - Compare-and-create inserts under concurrent writers
//! - Compare-and-set transitions apply exactly once
//! - Cascading deletes of list items and post comments

mod helpers;

use std::sync::Arc;
use std::thread;

use circle_core::access::DuplicatePolicy;
use circle_core::model::{
    CircleMembership, CircleRole, NewCircle, NewList, NewListItem, NewPost, NewUser,
    RequestStatus, Visibility,
};
use circle_core::store::{EntityStore, InsertOutcome, ListInsert, SqliteStore};
use circle_core::{AccessService, EngineConfig};

use helpers::{cleanup_dir, unique_temp_dir};

fn open_store(dir: &std::path::Path) -> SqliteStore {
    SqliteStore::open(&dir.join("store.db")).expect("should open store")
}

fn seed_user(store: &SqliteStore, name: &str) -> circle_core::model::UserId {
    store
        .insert_user(&NewUser::new(name, name), 1)
        .unwrap()
        .created()
        .unwrap()
        .id
}

// ============================================================================
// Persistence
// ============================================================================

mod persistence_tests {
    use super::*;

    #[test]
    fn data_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();

        let (alice, circle_id, code) = {
            let store = open_store(dir.path());
            let alice = seed_user(&store, "alice");
            let circle = store
                .insert_circle(&NewCircle::new("Supper Club"), alice, "code-1", 1)
                .unwrap()
                .created()
                .unwrap();
            (alice, circle.id, circle.invite_code)
        };

        let store = open_store(dir.path());
        assert_eq!(store.get_user(alice).unwrap().unwrap().username, "alice");
        let circle = store.circle_by_invite_code(&code).unwrap().unwrap();
        assert_eq!(circle.id, circle_id);
        assert_eq!(store.member_count(circle_id).unwrap(), 1);
        let owner = store.memberships_of_circle(circle_id).unwrap();
        assert_eq!(owner[0].role, CircleRole::Owner);
    }

    #[test]
    fn engine_reopens_existing_directory() {
        let dir = unique_temp_dir("reopen");
        let config = EngineConfig::default();

        let alice = {
            let engine = AccessService::open(&dir, config.clone()).unwrap();
            engine.register(&NewUser::new("alice", "Alice")).unwrap().id
        };
        let engine = AccessService::open(&dir, config).unwrap();
        assert_eq!(engine.user(alice).unwrap().name, "Alice");

        cleanup_dir(&dir);
    }
}

// ============================================================================
// Concurrency
// ============================================================================

mod concurrency_tests {
    use super::*;

    #[test]
    fn concurrent_membership_inserts_create_one_row() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(open_store(dir.path()));
        let alice = seed_user(&store, "alice");
        let bob = seed_user(&store, "bob");
        let circle = store
            .insert_circle(&NewCircle::new("Open Table"), alice, "open", 1)
            .unwrap()
            .created()
            .unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    store
                        .insert_membership(&CircleMembership {
                            circle_id: circle.id,
                            user_id: bob,
                            role: CircleRole::Member,
                            invited_by: None,
                            joined_at: 2,
                        })
                        .unwrap()
                        .is_created()
                })
            })
            .collect();

        let created = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|created| *created)
            .count();
        assert_eq!(created, 1);
        assert_eq!(store.member_count(circle.id).unwrap(), 2);
    }

    #[test]
    fn concurrent_list_creation_rejects_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(open_store(dir.path()));
        let alice = seed_user(&store, "alice");

        let handles: Vec<_> = (0..6)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    matches!(
                        store
                            .insert_list(
                                alice,
                                &NewList::new("Date Night"),
                                DuplicatePolicy::Reject,
                                3,
                            )
                            .unwrap(),
                        ListInsert::Created(_)
                    )
                })
            })
            .collect();

        let created = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|created| *created)
            .count();
        assert_eq!(created, 1);
        assert_eq!(store.lists_of_owner(alice).unwrap().len(), 1);
    }

    #[test]
    fn request_resolution_applies_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(open_store(dir.path()));
        let alice = seed_user(&store, "alice");
        let bob = seed_user(&store, "bob");
        let circle = store
            .insert_circle(&NewCircle::new("Supper Club"), alice, "club", 1)
            .unwrap()
            .created()
            .unwrap();
        let request = store
            .insert_member_request(circle.id, bob, 2)
            .unwrap()
            .created()
            .unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    let membership = CircleMembership {
                        circle_id: circle.id,
                        user_id: bob,
                        role: CircleRole::Member,
                        invited_by: Some(alice),
                        joined_at: 3,
                    };
                    store
                        .resolve_member_request(
                            request.id,
                            RequestStatus::Approved,
                            alice,
                            3,
                            Some(&membership),
                        )
                        .unwrap()
                })
            })
            .collect();

        let applied = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|applied| *applied)
            .count();
        assert_eq!(applied, 1);
        assert_eq!(store.member_count(circle.id).unwrap(), 2);
        assert_eq!(
            store.get_member_request(request.id).unwrap().unwrap().status,
            RequestStatus::Approved
        );
    }
}

// ============================================================================
// Cascades
// ============================================================================

mod cascade_tests {
    use super::*;

    #[test]
    fn deleting_list_removes_items() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        let alice = seed_user(&store, "alice");
        let ListInsert::Created(list) = store
            .insert_list(alice, &NewList::new("Pho"), DuplicatePolicy::Reject, 1)
            .unwrap()
        else {
            panic!("list should be created");
        };
        store
            .insert_list_item(
                list.id,
                alice,
                &NewListItem {
                    restaurant_id: 4,
                    rating: Some(5),
                    notes: Some("Get the brisket".to_string()),
                    position: 0,
                },
                2,
            )
            .unwrap();

        assert!(store.delete_list(list.id).unwrap());
        assert!(store.list_items(list.id).unwrap().is_empty());
        assert!(store.get_list(list.id).unwrap().is_none());
    }

    #[test]
    fn deleting_post_removes_comments_and_likes() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        let alice = seed_user(&store, "alice");
        let bob = seed_user(&store, "bob");
        let post = store
            .insert_post(
                alice,
                &NewPost {
                    restaurant_id: 9,
                    content: "Crispy edges".to_string(),
                    rating: 4,
                    visibility: Visibility::Public,
                },
                1,
            )
            .unwrap();
        store.insert_comment(post.id, bob, "Agreed", 2).unwrap();
        assert_eq!(
            store.insert_like(post.id, bob, 2).unwrap(),
            InsertOutcome::Created(())
        );
        assert_eq!(
            store.insert_like(post.id, bob, 3).unwrap(),
            InsertOutcome::AlreadyExists
        );

        assert!(store.delete_post(post.id).unwrap());
        assert!(store.comments_of_post(post.id).unwrap().is_empty());
        assert_eq!(store.like_count(post.id).unwrap(), 0);
    }
}
