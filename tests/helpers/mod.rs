//! Reusable test helpers for engine integration tests.
//!
//! Each test gets its own engine, either in memory or backed by a
//! unique on-disk directory. No mocking is needed.

#![allow(dead_code)]

use std::env;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use circle_core::model::{Circle, NewCircle, NewUser, PrivacyUpdate, UserId};
use circle_core::{AccessService, EngineConfig};

/// Atomic counter for unique test directory names.
static HELPER_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Creates a unique temporary directory for test isolation.
///
/// Each call produces a distinct path by combining the prefix, process ID,
/// and an atomic counter.
pub fn unique_temp_dir(prefix: &str) -> PathBuf {
    let id = HELPER_COUNTER.fetch_add(1, Ordering::SeqCst);
    env::temp_dir().join(format!(
        "circle_core_test_{}_{}_{}",
        prefix,
        std::process::id(),
        id
    ))
}

/// Removes a temporary test directory. Ignores errors silently.
pub fn cleanup_dir(dir: &PathBuf) {
    let _ = std::fs::remove_dir_all(dir);
}

/// An in-memory engine with default config.
pub fn engine() -> AccessService {
    AccessService::in_memory(EngineConfig::default()).expect("should open in-memory engine")
}

/// Registers a user whose username and display name are both `name`.
pub fn register(engine: &AccessService, name: &str) -> UserId {
    engine
        .register(&NewUser::new(name, name))
        .expect("should register user")
        .id
}

/// Creates a circle owned by `owner`.
pub fn circle(engine: &AccessService, owner: UserId, name: &str, public_join: bool) -> Circle {
    engine
        .create_circle(owner, &NewCircle::new(name).with_public_join(public_join))
        .expect("should create circle")
}

/// Turns on `privateProfile` and `requireFollowApproval` for `user`.
pub fn make_private(engine: &AccessService, user: UserId) {
    engine
        .update_privacy(
            user,
            user,
            PrivacyUpdate {
                private_profile: Some(true),
                require_follow_approval: Some(true),
                ..PrivacyUpdate::default()
            },
        )
        .expect("should update privacy");
}
