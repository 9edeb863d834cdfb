//! Follow requests and the follow graph.

use super::{now, AccessService};
use crate::access::{
    count_visibility, plan_follow, respond_to_follow, FollowResponse, FollowTransition,
};
use crate::error::{AccessError, ConflictKind, DenyReason, Result};
use crate::model::{FollowEdge, FollowId, FollowState, FollowStatus, FollowedUser, UserId};
use crate::store::{EntityStore, InsertOutcome};

impl<S: EntityStore> AccessService<S> {
    /// Follows `followee`. The edge starts pending when the followee
    /// requires approval and accepted otherwise.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown user, `Validation` for a
    /// self-follow and `Conflict` if an edge already exists.
    pub fn follow(&self, follower: UserId, followee: UserId) -> Result<FollowEdge> {
        self.user(follower)?;
        let target = self.user(followee)?;
        let existing = self.store.follow_between(follower, followee)?;
        let status = plan_follow(follower, followee, &target.privacy, existing.as_ref())?;

        match self.store.insert_follow(follower, followee, status, now())? {
            InsertOutcome::Created(edge) => {
                tracing::info!(
                    follow_id = %edge.id,
                    %follower,
                    %followee,
                    status = status.as_str(),
                    "created follow"
                );
                Ok(edge)
            }
            InsertOutcome::AlreadyExists => {
                let kind = match self.store.follow_between(follower, followee)? {
                    Some(edge) if edge.is_accepted() => ConflictKind::AlreadyFollowing,
                    _ => ConflictKind::FollowPending,
                };
                Err(AccessError::Conflict(kind))
            }
        }
    }

    /// Removes the edge from `follower` to `followee`, pending or accepted.
    ///
    /// Access gated on the follow is lost with the next decision.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if there is no edge.
    pub fn unfollow(&self, follower: UserId, followee: UserId) -> Result<()> {
        if !self.store.delete_follow_between(follower, followee)? {
            return Err(AccessError::NotFound(format!(
                "follow from {follower} to {followee}"
            )));
        }
        tracing::info!(%follower, %followee, "removed follow");
        Ok(())
    }

    /// Accepts or declines a pending follow request. Only the followee may
    /// respond; declining deletes the edge.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, `AccessDenied(NotRecipient)`, or `InvalidState`
    /// if the request is no longer pending.
    pub fn respond_follow(
        &self,
        actor: UserId,
        follow_id: FollowId,
        response: FollowResponse,
    ) -> Result<FollowState> {
        let edge = self
            .store
            .get_follow(follow_id)?
            .ok_or_else(|| AccessError::NotFound(format!("follow request {follow_id}")))?;

        let applied = match respond_to_follow(&edge, actor, response)? {
            FollowTransition::Accepted => self
                .store
                .accept_follow(follow_id, now())?
                .then_some(FollowState::Accepted),
            FollowTransition::Removed => self
                .store
                .delete_pending_follow(follow_id)?
                .then_some(FollowState::None),
        };
        let state = applied.ok_or_else(|| {
            AccessError::InvalidState("Follow request is not pending".to_string())
        })?;

        tracing::info!(
            follow_id = %follow_id,
            follower = %edge.follower_id,
            %actor,
            ?state,
            "responded to follow request"
        );
        Ok(state)
    }

    /// Pending follow requests addressed to `actor`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn pending_follow_requests(&self, actor: UserId) -> Result<Vec<FollowEdge>> {
        self.store.pending_follows_to(actor)
    }

    /// Accepted followers of `owner`. Hidden from others when the owner
    /// turns off `show_followers_count`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown owner and
    /// `AccessDenied(HiddenByOwner)` when the listing is hidden.
    pub fn followers(&self, viewer: UserId, owner: UserId) -> Result<Vec<FollowedUser>> {
        let user = self.user(owner)?;
        if !count_visibility(viewer, owner, &user.privacy).followers {
            tracing::debug!(%viewer, %owner, "followers listing hidden");
            return Err(AccessError::AccessDenied(DenyReason::HiddenByOwner));
        }
        self.store.followers_of(owner)
    }

    /// Users `owner` follows. Hidden from others when the owner turns off
    /// `show_following_count`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown owner and
    /// `AccessDenied(HiddenByOwner)` when the listing is hidden.
    pub fn following(&self, viewer: UserId, owner: UserId) -> Result<Vec<FollowedUser>> {
        let user = self.user(owner)?;
        if !count_visibility(viewer, owner, &user.privacy).following {
            tracing::debug!(%viewer, %owner, "following listing hidden");
            return Err(AccessError::AccessDenied(DenyReason::HiddenByOwner));
        }
        self.store.following_of(owner)
    }

    /// `viewer`'s follow state toward `other`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn follow_status(&self, viewer: UserId, other: UserId) -> Result<FollowState> {
        let edge = self.store.follow_between(viewer, other)?;
        Ok(FollowState::from(edge.as_ref()))
    }

    /// Returns whether `viewer` holds an accepted follow of `other`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn is_following(&self, viewer: UserId, other: UserId) -> Result<bool> {
        Ok(self
            .store
            .follow_between(viewer, other)?
            .is_some_and(|edge| edge.status == FollowStatus::Accepted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::error::DenyReason;
    use crate::model::{NewUser, PrivacyUpdate};

    fn service() -> AccessService {
        AccessService::in_memory(EngineConfig::default()).unwrap()
    }

    fn register(service: &AccessService, name: &str) -> UserId {
        service.register(&NewUser::new(name, name)).unwrap().id
    }

    fn require_approval(service: &AccessService, user: UserId) {
        service
            .update_privacy(
                user,
                user,
                PrivacyUpdate {
                    private_profile: Some(true),
                    require_follow_approval: Some(true),
                    ..PrivacyUpdate::default()
                },
            )
            .unwrap();
    }

    #[test]
    fn open_profile_follow_is_accepted() {
        let service = service();
        let alice = register(&service, "alice");
        let bob = register(&service, "bob");

        let edge = service.follow(bob, alice).unwrap();
        assert_eq!(edge.status, FollowStatus::Accepted);
        assert!(service.is_following(bob, alice).unwrap());
        assert!(matches!(
            service.follow(bob, alice),
            Err(AccessError::Conflict(ConflictKind::AlreadyFollowing))
        ));
    }

    #[test]
    fn cannot_follow_self_or_ghost() {
        let service = service();
        let alice = register(&service, "alice");
        assert!(matches!(
            service.follow(alice, alice),
            Err(AccessError::Validation(_))
        ));
        assert!(matches!(
            service.follow(alice, UserId(999)),
            Err(AccessError::NotFound(_))
        ));
    }

    #[test]
    fn approval_flow() {
        let service = service();
        let alice = register(&service, "alice");
        let bob = register(&service, "bob");
        require_approval(&service, alice);

        let edge = service.follow(bob, alice).unwrap();
        assert_eq!(edge.status, FollowStatus::Pending);
        assert_eq!(service.follow_status(bob, alice).unwrap(), FollowState::Pending);
        assert!(matches!(
            service.follow(bob, alice),
            Err(AccessError::Conflict(ConflictKind::FollowPending))
        ));
        assert_eq!(service.pending_follow_requests(alice).unwrap().len(), 1);

        assert!(matches!(
            service.respond_follow(bob, edge.id, FollowResponse::Accept),
            Err(AccessError::AccessDenied(DenyReason::NotRecipient))
        ));

        let state = service
            .respond_follow(alice, edge.id, FollowResponse::Accept)
            .unwrap();
        assert_eq!(state, FollowState::Accepted);
        assert!(service.pending_follow_requests(alice).unwrap().is_empty());

        assert!(matches!(
            service.respond_follow(alice, edge.id, FollowResponse::Accept),
            Err(AccessError::InvalidState(_))
        ));
    }

    #[test]
    fn declined_follower_may_ask_again() {
        let service = service();
        let alice = register(&service, "alice");
        let bob = register(&service, "bob");
        require_approval(&service, alice);

        let edge = service.follow(bob, alice).unwrap();
        assert_eq!(
            service
                .respond_follow(alice, edge.id, FollowResponse::Decline)
                .unwrap(),
            FollowState::None
        );
        assert_eq!(service.follow_status(bob, alice).unwrap(), FollowState::None);
        assert!(service.follow(bob, alice).is_ok());
    }

    #[test]
    fn unfollow_removes_edge() {
        let service = service();
        let alice = register(&service, "alice");
        let bob = register(&service, "bob");
        service.follow(bob, alice).unwrap();

        service.unfollow(bob, alice).unwrap();
        assert!(!service.is_following(bob, alice).unwrap());
        assert!(matches!(
            service.unfollow(bob, alice),
            Err(AccessError::NotFound(_))
        ));
    }

    #[test]
    fn followers_listing_respects_preference() {
        let service = service();
        let alice = register(&service, "alice");
        let bob = register(&service, "bob");
        let carol = register(&service, "carol");
        service.follow(bob, alice).unwrap();

        let followers = service.followers(carol, alice).unwrap();
        assert_eq!(followers.len(), 1);
        assert_eq!(followers[0].id, bob);

        service
            .update_privacy(
                alice,
                alice,
                PrivacyUpdate {
                    show_followers_count: Some(false),
                    ..PrivacyUpdate::default()
                },
            )
            .unwrap();
        assert!(matches!(
            service.followers(carol, alice),
            Err(AccessError::AccessDenied(DenyReason::HiddenByOwner))
        ));
        assert_eq!(service.followers(alice, alice).unwrap().len(), 1);
        assert!(service.following(carol, alice).is_ok());
    }

    #[test]
    fn following_listing_respects_preference() {
        let service = service();
        let alice = register(&service, "alice");
        let bob = register(&service, "bob");
        let carol = register(&service, "carol");
        require_approval(&service, carol);
        service.follow(alice, bob).unwrap();
        service.follow(alice, carol).unwrap();

        // The pending edge toward carol is not listed.
        let following = service.following(bob, alice).unwrap();
        assert_eq!(following.len(), 1);
        assert_eq!(following[0].username, "bob");

        service
            .update_privacy(
                alice,
                alice,
                PrivacyUpdate {
                    show_following_count: Some(false),
                    ..PrivacyUpdate::default()
                },
            )
            .unwrap();
        assert!(matches!(
            service.following(bob, alice),
            Err(AccessError::AccessDenied(DenyReason::HiddenByOwner))
        ));
        assert_eq!(service.following(alice, alice).unwrap().len(), 1);
        assert!(matches!(
            service.followers(bob, UserId(999)),
            Err(AccessError::NotFound(_))
        ));
    }
}
