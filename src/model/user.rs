//! Users and their privacy settings.

use serde::{Deserialize, Serialize};

use super::ids::UserId;

/// Per-user privacy settings.
///
/// Mutated only by the user themself. The follow gate reads the current
/// values on every decision, so an update takes effect on the next read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivacySettings {
    /// New followers start as pending until the user accepts them.
    pub require_follow_approval: bool,
    /// Profile content is visible only to accepted followers.
    pub private_profile: bool,
    /// Other users may see the follower count.
    pub show_followers_count: bool,
    /// Other users may see the following count.
    pub show_following_count: bool,
}

impl Default for PrivacySettings {
    fn default() -> Self {
        Self {
            require_follow_approval: false,
            private_profile: false,
            show_followers_count: true,
            show_following_count: true,
        }
    }
}

/// Partial update of [`PrivacySettings`]; `None` fields are left unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivacyUpdate {
    pub require_follow_approval: Option<bool>,
    pub private_profile: Option<bool>,
    pub show_followers_count: Option<bool>,
    pub show_following_count: Option<bool>,
}

impl PrivacySettings {
    /// Applies a partial update and returns the merged settings.
    #[must_use]
    pub fn merged(self, update: PrivacyUpdate) -> Self {
        Self {
            require_follow_approval: update
                .require_follow_approval
                .unwrap_or(self.require_follow_approval),
            private_profile: update.private_profile.unwrap_or(self.private_profile),
            show_followers_count: update
                .show_followers_count
                .unwrap_or(self.show_followers_count),
            show_following_count: update
                .show_following_count
                .unwrap_or(self.show_following_count),
        }
    }
}

/// A registered user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    /// Unique handle.
    pub username: String,
    /// Display name.
    pub name: String,
    /// Optional email, used to match email-addressed invites.
    pub email: Option<String>,
    pub privacy: PrivacySettings,
    /// When the user registered (Unix timestamp).
    pub created_at: i64,
}

impl User {
    /// Returns whether an invite addressed to `handle` targets this user.
    ///
    /// Matches either the username or the email, exactly.
    #[must_use]
    pub fn answers_to(&self, handle: &str) -> bool {
        self.username == handle || self.email.as_deref() == Some(handle)
    }
}

/// Input for registering a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub name: String,
    pub email: Option<String>,
}

impl NewUser {
    /// Creates a registration with no email.
    #[must_use]
    pub fn new(username: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            name: name.into(),
            email: None,
        }
    }

    /// Sets the email.
    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_privacy_is_open() {
        let settings = PrivacySettings::default();
        assert!(!settings.require_follow_approval);
        assert!(!settings.private_profile);
        assert!(settings.show_followers_count);
        assert!(settings.show_following_count);
    }

    #[test]
    fn merged_only_touches_set_fields() {
        let update = PrivacyUpdate {
            private_profile: Some(true),
            ..PrivacyUpdate::default()
        };
        let merged = PrivacySettings::default().merged(update);
        assert!(merged.private_profile);
        assert!(!merged.require_follow_approval);
        assert!(merged.show_followers_count);
    }

    #[test]
    fn privacy_uses_camel_case_on_the_wire() {
        let json = serde_json::to_value(PrivacySettings::default()).unwrap();
        assert_eq!(json["requireFollowApproval"], false);
        assert_eq!(json["showFollowersCount"], true);
    }

    #[test]
    fn answers_to_username_or_email() {
        let user = User {
            id: UserId(1),
            username: "bob".to_string(),
            name: "Bob".to_string(),
            email: Some("bob@example.com".to_string()),
            privacy: PrivacySettings::default(),
            created_at: 0,
        };
        assert!(user.answers_to("bob"));
        assert!(user.answers_to("bob@example.com"));
        assert!(!user.answers_to("Bob"));
    }
}
