//! End-to-end authorization scenarios.
//!
//! These tests drive the engine the way an HTTP layer would:
//! - Private list reads by non-owners
//! - Restricted circle join, approval and the resulting read access
//! - Follow-gated content on a private profile
//! - Duplicate list names and their scoping
//! - Idempotency of joins and terminal transitions

mod helpers;

use circle_core::model::{
    Invitee, InviteStatus, NewList, NewPost, RequestStatus, Visibility,
};
use circle_core::store::EntityStore;
use circle_core::{
    AccessError, ConflictKind, DenyReason, DuplicatePolicy, FollowResponse, InviteResponse,
    JoinOutcome, RequestDecision,
};

use helpers::{circle, engine, make_private, register};

// ============================================================================
// Private content
// ============================================================================

mod private_content_tests {
    use super::*;

    #[test]
    fn non_owner_gets_403_for_private_list() {
        let engine = engine();
        let alice = register(&engine, "alice");
        let bob = register(&engine, "bob");

        let list = engine
            .create_list(alice, &NewList::new("Tuesday Spots"), DuplicatePolicy::Reject)
            .unwrap();

        let err = engine.get_list(bob, list.id).unwrap_err();
        assert!(matches!(err, AccessError::AccessDenied(DenyReason::Private)));
        assert_eq!(err.status_code(), 403);
        assert_eq!(err.body()["error"], "Access denied");
    }

    #[test]
    fn owner_reads_own_private_list_outside_any_circle() {
        let engine = engine();
        let alice = register(&engine, "alice");
        let list = engine
            .create_list(alice, &NewList::new("Secret"), DuplicatePolicy::Reject)
            .unwrap();
        assert_eq!(engine.get_list(alice, list.id).unwrap().id, list.id);
    }
}

// ============================================================================
// Restricted circles
// ============================================================================

mod restricted_join_tests {
    use super::*;

    #[test]
    fn request_approval_grants_circle_reads() {
        let engine = engine();
        let owner = register(&engine, "owner");
        let admin = register(&engine, "admin");
        let bob = register(&engine, "bob");
        let circle = circle(&engine, owner, "Supper Club", false);

        let invite = engine
            .create_invite(owner, circle.id, Invitee::User(admin))
            .unwrap();
        engine
            .respond_to_invite(admin, invite.id, InviteResponse::Accept)
            .unwrap();
        engine
            .set_member_role(owner, circle.id, admin, circle_core::model::CircleRole::Admin)
            .unwrap();

        let list = engine
            .create_list(
                owner,
                &NewList::new("Club Picks").with_visibility(Visibility::Circle(circle.id)),
                DuplicatePolicy::Reject,
            )
            .unwrap();

        let outcome = engine.join_circle(bob, &circle.invite_code).unwrap();
        assert_eq!(outcome.status_code(), 202);
        let JoinOutcome::Requested { request } = outcome else {
            panic!("restricted join should file a request");
        };
        assert_eq!(request.status, RequestStatus::Pending);
        assert!(matches!(
            engine.get_list(bob, list.id),
            Err(AccessError::AccessDenied(DenyReason::NotCircleMember))
        ));

        let approved = engine
            .decide_member_request(admin, request.id, RequestDecision::Approve)
            .unwrap();
        assert_eq!(approved.status, RequestStatus::Approved);

        let members = engine.members(bob, circle.id).unwrap();
        let bob_row = members.iter().find(|m| m.user_id == bob).unwrap();
        assert_eq!(bob_row.role, circle_core::model::CircleRole::Member);
        assert_eq!(bob_row.invited_by, Some(admin));
        assert!(engine.get_list(bob, list.id).is_ok());
    }

    #[test]
    fn restricted_join_never_creates_membership() {
        let engine = engine();
        let owner = register(&engine, "owner");
        let circle = circle(&engine, owner, "Supper Club", false);

        for name in ["bob", "carol", "dave"] {
            let user = register(&engine, name);
            for _ in 0..3 {
                let outcome = engine.join_circle(user, &circle.invite_code).unwrap();
                assert!(matches!(outcome, JoinOutcome::Requested { .. }));
            }
        }
        assert_eq!(engine.store().member_count(circle.id).unwrap(), 1);
        assert_eq!(
            engine.pending_member_requests(owner, circle.id).unwrap().len(),
            3
        );
    }

    #[test]
    fn public_join_twice_yields_one_row() {
        let engine = engine();
        let owner = register(&engine, "owner");
        let bob = register(&engine, "bob");
        let circle = circle(&engine, owner, "Open Table", true);

        let first = engine.join_circle(bob, &circle.invite_code).unwrap();
        let second = engine.join_circle(bob, &circle.invite_code).unwrap();
        assert_eq!(first.status_code(), 200);
        assert_eq!(second.status_code(), 200);
        assert_eq!(engine.store().member_count(circle.id).unwrap(), 2);
    }

    #[test]
    fn unknown_code_is_404() {
        let engine = engine();
        let bob = register(&engine, "bob");
        assert_eq!(
            engine.join_circle(bob, "not-a-code").unwrap_err().status_code(),
            404
        );
    }

    #[test]
    fn codes_are_case_sensitive() {
        let engine = engine();
        let owner = register(&engine, "owner");
        let bob = register(&engine, "bob");
        let circle = circle(&engine, owner, "Open Table", true);

        let flipped: String = circle
            .invite_code
            .chars()
            .map(|c| {
                if c.is_ascii_uppercase() {
                    c.to_ascii_lowercase()
                } else {
                    c.to_ascii_uppercase()
                }
            })
            .collect();
        if flipped != circle.invite_code {
            assert!(matches!(
                engine.join_circle(bob, &flipped),
                Err(AccessError::NotFound(_))
            ));
        }
    }
}

// ============================================================================
// Terminal transitions
// ============================================================================

mod terminal_state_tests {
    use super::*;

    #[test]
    fn accepting_answered_invite_is_invalid_state() {
        let engine = engine();
        let owner = register(&engine, "owner");
        let bob = register(&engine, "bob");
        let carol = register(&engine, "carol");
        let circle = circle(&engine, owner, "Supper Club", false);

        let accepted = engine.create_invite(owner, circle.id, Invitee::User(bob)).unwrap();
        engine
            .respond_to_invite(bob, accepted.id, InviteResponse::Accept)
            .unwrap();
        let err = engine
            .respond_to_invite(bob, accepted.id, InviteResponse::Accept)
            .unwrap_err();
        assert!(err.is_invalid_state());
        assert_eq!(err.status_code(), 400);

        let declined = engine.create_invite(owner, circle.id, Invitee::User(carol)).unwrap();
        let answered = engine
            .respond_to_invite(carol, declined.id, InviteResponse::Decline)
            .unwrap();
        assert_eq!(answered.status, InviteStatus::Declined);
        assert!(engine
            .respond_to_invite(carol, declined.id, InviteResponse::Accept)
            .unwrap_err()
            .is_invalid_state());

        assert_eq!(engine.store().member_count(circle.id).unwrap(), 2);
    }

    #[test]
    fn resolved_request_is_409() {
        let engine = engine();
        let owner = register(&engine, "owner");
        let bob = register(&engine, "bob");
        let circle = circle(&engine, owner, "Supper Club", false);

        let request = engine.request_membership(bob, circle.id).unwrap();
        engine
            .decide_member_request(owner, request.id, RequestDecision::Reject)
            .unwrap();
        let err = engine
            .decide_member_request(owner, request.id, RequestDecision::Approve)
            .unwrap_err();
        assert!(matches!(err, AccessError::AlreadyResolved(_)));
        assert_eq!(err.status_code(), 409);
        assert_eq!(engine.store().member_count(circle.id).unwrap(), 1);
    }

    #[test]
    fn accepted_invite_closes_pending_join_request() {
        let engine = engine();
        let owner = register(&engine, "owner");
        let bob = register(&engine, "bob");
        let circle = circle(&engine, owner, "Supper Club", false);

        let joined = engine.join_circle(bob, &circle.invite_code).unwrap();
        assert_eq!(joined.status_code(), 202);
        let JoinOutcome::Requested { request } = joined else {
            panic!("restricted join should file a request");
        };

        let invite = engine.create_invite(owner, circle.id, Invitee::User(bob)).unwrap();
        engine
            .respond_to_invite(bob, invite.id, InviteResponse::Accept)
            .unwrap();

        assert!(engine.pending_member_requests(owner, circle.id).unwrap().is_empty());
        let err = engine
            .decide_member_request(owner, request.id, RequestDecision::Approve)
            .unwrap_err();
        assert!(matches!(err, AccessError::AlreadyResolved(_)));
        assert_eq!(engine.store().member_count(circle.id).unwrap(), 2);

        // A later join is a no-op for the member.
        let again = engine.join_circle(bob, &circle.invite_code).unwrap();
        assert_eq!(again.status_code(), 200);
    }
}

// ============================================================================
// Follow gate
// ============================================================================

mod follow_gate_tests {
    use super::*;

    fn public_post() -> NewPost {
        NewPost {
            restaurant_id: 11,
            content: "Best dumplings in town".to_string(),
            rating: 5,
            visibility: Visibility::Public,
        }
    }

    #[test]
    fn pending_follow_hides_until_accepted() {
        let engine = engine();
        let alice = register(&engine, "alice");
        let bob = register(&engine, "bob");
        make_private(&engine, alice);

        let post = engine.create_post(alice, &public_post()).unwrap();
        let list = engine
            .create_list(
                alice,
                &NewList::new("Favorites").with_visibility(Visibility::Public),
                DuplicatePolicy::Reject,
            )
            .unwrap();

        let edge = engine.follow(bob, alice).unwrap();
        assert_eq!(edge.status, circle_core::model::FollowStatus::Pending);
        assert!(matches!(
            engine.get_post(bob, post.id),
            Err(AccessError::AccessDenied(DenyReason::FollowRequired))
        ));
        assert!(engine.accessible_lists(bob).unwrap().is_empty());

        engine
            .respond_follow(alice, edge.id, FollowResponse::Accept)
            .unwrap();
        assert!(engine.get_post(bob, post.id).is_ok());
        assert_eq!(engine.accessible_lists(bob).unwrap(), vec![list]);
    }

    #[test]
    fn unfollow_revokes_access_on_next_read() {
        let engine = engine();
        let alice = register(&engine, "alice");
        let bob = register(&engine, "bob");
        make_private(&engine, alice);
        let post = engine.create_post(alice, &public_post()).unwrap();

        let edge = engine.follow(bob, alice).unwrap();
        engine
            .respond_follow(alice, edge.id, FollowResponse::Accept)
            .unwrap();
        assert!(engine.get_post(bob, post.id).is_ok());

        engine.unfollow(bob, alice).unwrap();
        assert!(engine.get_post(bob, post.id).is_err());
    }

    #[test]
    fn circle_content_ignores_follow_gate() {
        let engine = engine();
        let alice = register(&engine, "alice");
        let bob = register(&engine, "bob");
        make_private(&engine, alice);
        let circle = circle(&engine, alice, "Open Table", true);
        engine.join_circle(bob, &circle.invite_code).unwrap();

        let post = engine
            .create_post(
                alice,
                &NewPost {
                    visibility: Visibility::Circle(circle.id),
                    ..public_post()
                },
            )
            .unwrap();
        assert!(engine.get_post(bob, post.id).is_ok());
    }
}

// ============================================================================
// Duplicate names
// ============================================================================

mod duplicate_name_tests {
    use super::*;

    #[test]
    fn second_date_night_conflicts_with_first_id() {
        let engine = engine();
        let alice = register(&engine, "alice");
        let first = engine
            .create_list(alice, &NewList::new("Date Night"), DuplicatePolicy::Reject)
            .unwrap();
        let err = engine
            .create_list(alice, &NewList::new("Date Night"), DuplicatePolicy::Reject)
            .unwrap_err();

        assert_eq!(err.status_code(), 409);
        assert!(matches!(
            err,
            AccessError::Conflict(ConflictKind::DuplicateList { existing_id }) if existing_id == first.id
        ));
        let body = err.body();
        assert_eq!(body["error"], "duplicate_list");
        assert_eq!(body["existingId"], first.id.get());
    }

    #[test]
    fn same_name_for_different_owners() {
        let engine = engine();
        let alice = register(&engine, "alice");
        let bob = register(&engine, "bob");
        engine
            .create_list(alice, &NewList::new("Best Pizza"), DuplicatePolicy::Reject)
            .unwrap();
        engine
            .create_list(bob, &NewList::new("Best Pizza"), DuplicatePolicy::Reject)
            .unwrap();
    }

    #[test]
    fn names_differing_in_case_do_not_conflict() {
        let engine = engine();
        let alice = register(&engine, "alice");
        engine
            .create_list(alice, &NewList::new("Best Pizza"), DuplicatePolicy::Reject)
            .unwrap();
        engine
            .create_list(alice, &NewList::new("best pizza"), DuplicatePolicy::Reject)
            .unwrap();
    }
}
