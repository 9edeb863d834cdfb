//! Circle Core Library
//!
//! Authorization and membership engine for circle-scoped content.
//! Decides who may join a circle, who may read or edit a list or post,
//! how follow relationships gate private profiles, and how invites and
//! requests move from pending to a terminal state.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![deny(unsafe_code)]

pub mod access;
pub mod config;
pub mod error;
pub mod model;
pub mod service;
pub mod store;

pub use access::{Access, Action, DuplicatePolicy, FollowResponse, InviteResponse, RequestDecision};
pub use config::EngineConfig;
pub use error::{AccessError, ConflictKind, DenyReason, Result};
pub use service::{AccessService, JoinOutcome, ProfileCounts};
pub use store::{EntityStore, SqliteStore};
