//! Circles, joins, member requests and invites.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::RngCore;
use serde::Serialize;

use super::{now, required_text, AccessService};
use crate::access::{
    check_removal, check_role_change, decide_member_request, plan_join, require_manager,
    resolve_membership, respond_to_invite, validate_name, AddMember, InviteResponse, JoinPlan,
    MembershipSnapshot, MembershipView, RequestDecision,
};
use crate::error::{AccessError, ConflictKind, DenyReason, Result};
use crate::model::{
    Circle, CircleId, CircleInvite, CircleMembership, CirclePreview, CircleRole, InviteId,
    InviteStatus, Invitee, MemberRequest, NewCircle, RequestId, UserId,
};
use crate::store::{EntityStore, InsertOutcome};

/// Attempts at drawing an unused invite code before giving up.
const INVITE_CODE_ATTEMPTS: usize = 5;

/// Result of joining a circle with its invite code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum JoinOutcome {
    /// The user is a member, either now or already.
    Joined { membership: CircleMembership },
    /// The circle is restricted; a request awaits approval.
    Requested { request: MemberRequest },
}

impl JoinOutcome {
    /// HTTP status for the join endpoint: 200 joined, 202 requested.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::Joined { .. } => 200,
            Self::Requested { .. } => 202,
        }
    }
}

fn generate_invite_code(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    URL_SAFE_NO_PAD.encode(buf)
}

impl From<AddMember> for CircleMembership {
    fn from(add: AddMember) -> Self {
        Self {
            circle_id: add.circle_id,
            user_id: add.user_id,
            role: add.role,
            invited_by: add.invited_by,
            joined_at: now(),
        }
    }
}

impl<S: EntityStore> AccessService<S> {
    // ==================== Circle Lifecycle ====================

    /// Creates a circle. The creator becomes its owner.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for a bad name, `NotFound` if the creator does
    /// not exist, or `Storage` if no unused invite code could be drawn.
    pub fn create_circle(&self, creator: UserId, circle: &NewCircle) -> Result<Circle> {
        let name = validate_name(&circle.name, self.config.max_name_len)?;
        self.user(creator)?;
        let circle = NewCircle {
            name,
            ..circle.clone()
        };

        for _ in 0..INVITE_CODE_ATTEMPTS {
            let code = generate_invite_code(self.config.invite_code_bytes);
            if let InsertOutcome::Created(created) =
                self.store.insert_circle(&circle, creator, &code, now())?
            {
                tracing::info!(
                    circle_id = %created.id,
                    %creator,
                    allow_public_join = created.allow_public_join,
                    "created circle"
                );
                return Ok(created);
            }
        }
        Err(AccessError::Storage(
            "Failed to generate a unique invite code".to_string(),
        ))
    }

    /// Loads a circle.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the circle does not exist.
    pub fn circle(&self, id: CircleId) -> Result<Circle> {
        self.store
            .get_circle(id)?
            .ok_or_else(|| AccessError::NotFound(format!("circle {id}")))
    }

    /// What a holder of `invite_code` sees before joining.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown code.
    pub fn circle_preview(&self, invite_code: &str) -> Result<CirclePreview> {
        let circle = self.circle_by_code(invite_code)?;
        Ok(CirclePreview {
            id: circle.id,
            name: circle.name,
            description: circle.description,
            member_count: self.store.member_count(circle.id)?,
            allow_public_join: circle.allow_public_join,
        })
    }

    /// Resolves `user`'s standing in a circle.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the circle does not exist.
    pub fn membership(&self, circle_id: CircleId, user: UserId) -> Result<MembershipView> {
        let circle = self.circle(circle_id)?;
        let snapshot = self.circle_snapshot(circle_id)?;
        Ok(resolve_membership(&circle, user, &snapshot))
    }

    /// Members of a circle. Only members may list them.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the circle does not exist and
    /// `AccessDenied(NotCircleMember)` for outsiders.
    pub fn members(&self, actor: UserId, circle_id: CircleId) -> Result<Vec<CircleMembership>> {
        self.circle(circle_id)?;
        let members = self.store.memberships_of_circle(circle_id)?;
        if !members.iter().any(|m| m.user_id == actor) {
            return Err(AccessError::AccessDenied(DenyReason::NotCircleMember));
        }
        Ok(members)
    }

    /// Replaces the circle's invite code. Owner or admin only.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, `AccessDenied(NotCircleManager)`, or `Storage`
    /// if no unused code could be drawn.
    pub fn regenerate_invite_code(&self, actor: UserId, circle_id: CircleId) -> Result<String> {
        self.circle(circle_id)?;
        require_manager(circle_id, actor, &self.circle_snapshot(circle_id)?)?;

        for _ in 0..INVITE_CODE_ATTEMPTS {
            let code = generate_invite_code(self.config.invite_code_bytes);
            if self.store.replace_invite_code(circle_id, &code)?.is_created() {
                tracing::info!(circle_id = %circle_id, %actor, "regenerated invite code");
                return Ok(code);
            }
        }
        Err(AccessError::Storage(
            "Failed to generate a unique invite code".to_string(),
        ))
    }

    // ==================== Joining ====================

    /// Joins a circle with its invite code.
    ///
    /// Public-join circles add the user immediately; restricted circles
    /// only file a member request. Repeating the call is idempotent.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown invite code or user.
    pub fn join_circle(&self, user: UserId, invite_code: &str) -> Result<JoinOutcome> {
        let circle = self.circle_by_code(invite_code)?;
        self.user(user)?;
        let snapshot = self.circle_snapshot(circle.id)?;

        match plan_join(&circle, user, &snapshot) {
            JoinPlan::AlreadyMember(_) => {
                tracing::debug!(circle_id = %circle.id, %user, "join: already a member");
                Ok(JoinOutcome::Joined {
                    membership: self.existing_membership(circle.id, user)?,
                })
            }
            JoinPlan::AlreadyRequested => {
                tracing::debug!(circle_id = %circle.id, %user, "join: request already pending");
                Ok(JoinOutcome::Requested {
                    request: self.pending_request(circle.id, user)?,
                })
            }
            JoinPlan::AddMember => {
                let membership = CircleMembership {
                    circle_id: circle.id,
                    user_id: user,
                    role: CircleRole::Member,
                    invited_by: None,
                    joined_at: now(),
                };
                let membership = match self.store.insert_membership(&membership)? {
                    InsertOutcome::Created(m) => {
                        tracing::info!(circle_id = %circle.id, %user, "joined circle");
                        m
                    }
                    // Lost a race with another join for the same pair.
                    InsertOutcome::AlreadyExists => self.existing_membership(circle.id, user)?,
                };
                Ok(JoinOutcome::Joined { membership })
            }
            JoinPlan::FileRequest => {
                let request = match self.store.insert_member_request(circle.id, user, now())? {
                    InsertOutcome::Created(r) => {
                        tracing::info!(
                            circle_id = %circle.id,
                            %user,
                            request_id = %r.id,
                            "filed member request"
                        );
                        r
                    }
                    InsertOutcome::AlreadyExists => self.pending_request(circle.id, user)?,
                };
                Ok(JoinOutcome::Requested { request })
            }
        }
    }

    /// Asks to join a circle by id.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, `Conflict(AlreadyMember)` for members and
    /// `Conflict(RequestPending)` if a request is already pending.
    pub fn request_membership(&self, user: UserId, circle_id: CircleId) -> Result<MemberRequest> {
        self.circle(circle_id)?;
        self.user(user)?;
        if self.circle_snapshot(circle_id)?.role_of(circle_id, user).is_member() {
            return Err(AccessError::Conflict(ConflictKind::AlreadyMember));
        }
        match self.store.insert_member_request(circle_id, user, now())? {
            InsertOutcome::Created(request) => {
                tracing::info!(
                    circle_id = %circle_id,
                    %user,
                    request_id = %request.id,
                    "filed member request"
                );
                Ok(request)
            }
            InsertOutcome::AlreadyExists => Err(AccessError::Conflict(ConflictKind::RequestPending)),
        }
    }

    /// Pending requests for a circle. Owner or admin only.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` or `AccessDenied(NotCircleManager)`.
    pub fn pending_member_requests(
        &self,
        actor: UserId,
        circle_id: CircleId,
    ) -> Result<Vec<MemberRequest>> {
        self.circle(circle_id)?;
        require_manager(circle_id, actor, &self.circle_snapshot(circle_id)?)?;
        self.store.pending_requests_of_circle(circle_id)
    }

    /// Approves or rejects a member request. Owner or admin only.
    ///
    /// Approval creates the membership in the same write.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, `AccessDenied(NotCircleManager)`,
    /// `AlreadyResolved` if the request is no longer pending, or
    /// `Conflict(AlreadyMember)` when approving someone who already joined.
    pub fn decide_member_request(
        &self,
        actor: UserId,
        request_id: RequestId,
        decision: RequestDecision,
    ) -> Result<MemberRequest> {
        let request = self
            .store
            .get_member_request(request_id)?
            .ok_or_else(|| AccessError::NotFound(format!("member request {request_id}")))?;
        let snapshot = self.circle_snapshot(request.circle_id)?;
        let actor_role = snapshot.role_of(request.circle_id, actor);

        let transition = decide_member_request(&request, actor, actor_role, decision)
            .inspect_err(|e| {
                tracing::debug!(request_id = %request_id, %actor, error = %e, "member request decision refused");
            })?;
        if transition.add_member.is_some()
            && snapshot.role_of(request.circle_id, request.user_id).is_member()
        {
            tracing::debug!(
                request_id = %request_id,
                user_id = %request.user_id,
                "requester is already a member"
            );
            return Err(AccessError::Conflict(ConflictKind::AlreadyMember));
        }
        let new_member = transition.add_member.map(CircleMembership::from);

        if !self.store.resolve_member_request(
            request_id,
            transition.next,
            actor,
            now(),
            new_member.as_ref(),
        )? {
            return Err(AccessError::AlreadyResolved(format!(
                "request {request_id} was resolved concurrently"
            )));
        }

        tracing::info!(
            request_id = %request_id,
            circle_id = %request.circle_id,
            user_id = %request.user_id,
            %actor,
            status = transition.next.as_str(),
            "resolved member request"
        );
        self.store
            .get_member_request(request_id)?
            .ok_or_else(|| AccessError::NotFound(format!("member request {request_id}")))
    }

    // ==================== Invites ====================

    /// Invites a user (by id) or a handle (email or username) into a
    /// circle. Owner or admin only.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, `AccessDenied(NotCircleManager)`, `Validation`
    /// for an empty handle, `Conflict(AlreadyMember)` if the invitee is a
    /// member and `Conflict(InvitePending)` for a duplicate invite.
    pub fn create_invite(
        &self,
        actor: UserId,
        circle_id: CircleId,
        invitee: Invitee,
    ) -> Result<CircleInvite> {
        self.circle(circle_id)?;
        let snapshot = self.circle_snapshot(circle_id)?;
        require_manager(circle_id, actor, &snapshot)?;

        let invitee = match invitee {
            Invitee::User(id) => {
                self.user(id)?;
                if snapshot.role_of(circle_id, id).is_member() {
                    return Err(AccessError::Conflict(ConflictKind::AlreadyMember));
                }
                Invitee::User(id)
            }
            Invitee::Handle(handle) => {
                let handle = required_text(&handle, "Invitee")?;
                if let Some(user) = self.store.user_by_handle(&handle)? {
                    if snapshot.role_of(circle_id, user.id).is_member() {
                        return Err(AccessError::Conflict(ConflictKind::AlreadyMember));
                    }
                }
                Invitee::Handle(handle)
            }
        };

        match self.store.insert_invite(circle_id, actor, &invitee, now())? {
            InsertOutcome::Created(invite) => {
                tracing::info!(
                    invite_id = %invite.id,
                    circle_id = %circle_id,
                    inviter = %actor,
                    "created circle invite"
                );
                Ok(invite)
            }
            InsertOutcome::AlreadyExists => Err(AccessError::Conflict(ConflictKind::InvitePending)),
        }
    }

    /// Withdraws a pending invite. Owner or admin only.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, `AccessDenied(NotCircleManager)` or
    /// `InvalidState` if the invite was already answered.
    pub fn revoke_invite(&self, actor: UserId, invite_id: InviteId) -> Result<()> {
        let invite = self.invite(invite_id)?;
        require_manager(invite.circle_id, actor, &self.circle_snapshot(invite.circle_id)?)?;
        if invite.status != InviteStatus::Pending || !self.store.delete_pending_invite(invite_id)? {
            return Err(AccessError::InvalidState(
                "Invite already responded to".to_string(),
            ));
        }
        tracing::info!(invite_id = %invite_id, %actor, "revoked circle invite");
        Ok(())
    }

    /// Pending invites addressed to `user`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the user does not exist.
    pub fn pending_invites_for(&self, user: UserId) -> Result<Vec<CircleInvite>> {
        let user = self.user(user)?;
        self.store.pending_invites_for(&user)
    }

    /// Accepts or declines an invite. Only the invitee may respond.
    ///
    /// Accepting creates the membership in the same write.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, `AccessDenied(NotRecipient)`, or `InvalidState`
    /// if the invite was already answered.
    pub fn respond_to_invite(
        &self,
        actor: UserId,
        invite_id: InviteId,
        response: InviteResponse,
    ) -> Result<CircleInvite> {
        let invite = self.invite(invite_id)?;
        let user = self.user(actor)?;

        let transition = respond_to_invite(&invite, &user, response).inspect_err(|e| {
            tracing::debug!(invite_id = %invite_id, %actor, error = %e, "invite response refused");
        })?;
        let new_member = transition.add_member.map(CircleMembership::from);

        if !self
            .store
            .resolve_invite(invite_id, transition.next, now(), new_member.as_ref())?
        {
            return Err(AccessError::InvalidState(
                "Invite already responded to".to_string(),
            ));
        }

        tracing::info!(
            invite_id = %invite_id,
            circle_id = %invite.circle_id,
            %actor,
            status = transition.next.as_str(),
            "responded to circle invite"
        );
        self.invite(invite_id)
    }

    // ==================== Membership Changes ====================

    /// Leaves a circle. The owner cannot leave.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if not a member and `InvalidState` for the owner.
    pub fn leave_circle(&self, user: UserId, circle_id: CircleId) -> Result<()> {
        self.remove_member(user, circle_id, user)
    }

    /// Removes `target` from a circle.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, `InvalidState` for the owner, or
    /// `AccessDenied(NotCircleManager)` if `actor` lacks rank.
    pub fn remove_member(&self, actor: UserId, circle_id: CircleId, target: UserId) -> Result<()> {
        self.circle(circle_id)?;
        check_removal(circle_id, actor, target, &self.circle_snapshot(circle_id)?)?;
        if !self.store.delete_membership(circle_id, target)? {
            return Err(AccessError::NotFound(format!(
                "user {target} in circle {circle_id}"
            )));
        }
        tracing::info!(circle_id = %circle_id, %actor, %target, "removed circle member");
        Ok(())
    }

    /// Promotes a member to admin or demotes an admin. Owner only.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, `Validation` for `Owner`, `AccessDenied` if
    /// `actor` is not the owner, or `InvalidState` for the owner's row.
    pub fn set_member_role(
        &self,
        actor: UserId,
        circle_id: CircleId,
        target: UserId,
        role: CircleRole,
    ) -> Result<()> {
        self.circle(circle_id)?;
        check_role_change(circle_id, actor, target, role, &self.circle_snapshot(circle_id)?)?;
        if !self.store.set_member_role(circle_id, target, role)? {
            return Err(AccessError::NotFound(format!(
                "user {target} in circle {circle_id}"
            )));
        }
        tracing::info!(circle_id = %circle_id, %target, role = role.as_str(), "changed member role");
        Ok(())
    }

    // ==================== Helpers ====================

    /// Memberships and pending requests of one circle.
    pub(super) fn circle_snapshot(&self, circle_id: CircleId) -> Result<MembershipSnapshot> {
        let mut snapshot =
            MembershipSnapshot::from_memberships(&self.store.memberships_of_circle(circle_id)?);
        for request in self.store.pending_requests_of_circle(circle_id)? {
            snapshot.insert_request(&request);
        }
        Ok(snapshot)
    }

    fn circle_by_code(&self, invite_code: &str) -> Result<Circle> {
        self.store
            .circle_by_invite_code(invite_code)?
            .ok_or_else(|| AccessError::NotFound("invite code".to_string()))
    }

    fn invite(&self, id: InviteId) -> Result<CircleInvite> {
        self.store
            .get_invite(id)?
            .ok_or_else(|| AccessError::NotFound(format!("invite {id}")))
    }

    fn existing_membership(&self, circle_id: CircleId, user: UserId) -> Result<CircleMembership> {
        self.store
            .memberships_of_user(user)?
            .into_iter()
            .find(|m| m.circle_id == circle_id)
            .ok_or_else(|| AccessError::NotFound(format!("user {user} in circle {circle_id}")))
    }

    fn pending_request(&self, circle_id: CircleId, user: UserId) -> Result<MemberRequest> {
        self.store
            .pending_requests_of_user(user)?
            .into_iter()
            .find(|r| r.circle_id == circle_id)
            .ok_or_else(|| {
                AccessError::NotFound(format!("pending request of user {user} in circle {circle_id}"))
            })
    }
}
