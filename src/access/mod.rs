//! Pure authorization resolvers.
//!
//! Every function in this module is deterministic over the snapshots it
//! is given. None of them read or write storage; the
//! [`AccessService`](crate::AccessService) loads the snapshots and applies
//! the resulting writes.

mod duplicate;
mod follow_gate;
mod membership;
mod transition;
mod visibility;

pub use duplicate::{check_duplicate_name, normalize_list_name, validate_name, DuplicatePolicy};
pub use follow_gate::{
    count_visibility, plan_follow, resolve_follow_gate, CountVisibility, GateDecision,
};
pub use membership::{
    check_removal, check_role_change, plan_join, require_manager, resolve_membership,
    EffectiveRole, JoinPlan, MembershipSnapshot, MembershipView,
};
pub use transition::{
    decide_member_request, is_invitee, respond_to_follow, respond_to_invite, AddMember,
    FollowResponse, FollowTransition, InviteResponse, RequestDecision, Transition,
};
pub use visibility::{resolve_visibility, Access, Action};
