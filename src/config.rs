//! Engine configuration.

use serde::{Deserialize, Serialize};

use crate::error::{AccessError, Result};

/// Default database file name inside the data directory.
pub const DEFAULT_DATABASE_FILE: &str = "circles.db";

/// Configuration for [`AccessService`](crate::AccessService).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Database file name, relative to the data directory.
    pub database_file: String,
    /// Random bytes per invite code. Codes are URL-safe base64.
    pub invite_code_bytes: usize,
    /// Extra attempts for an atomic insert when the store is busy.
    pub insert_retries: u8,
    /// Maximum length, in characters, of list and circle names.
    pub max_name_len: usize,
    /// Whether callers may explicitly create a list with a duplicate name.
    pub allow_duplicate_bypass: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_file: DEFAULT_DATABASE_FILE.to_string(),
            invite_code_bytes: 9,
            insert_retries: 1,
            max_name_len: 100,
            allow_duplicate_bypass: true,
        }
    }
}

impl EngineConfig {
    /// Parses a JSON configuration document. Missing fields take defaults.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the document is malformed or fails
    /// [`EngineConfig::validate`].
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| AccessError::Validation(format!("Invalid engine config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that every limit is usable.
    ///
    /// # Errors
    ///
    /// Returns `Validation` on an empty database file name, zero-length
    /// invite codes or a zero name limit.
    pub fn validate(&self) -> Result<()> {
        if self.database_file.trim().is_empty() {
            return Err(AccessError::Validation(
                "databaseFile must not be empty".to_string(),
            ));
        }
        if self.invite_code_bytes == 0 {
            return Err(AccessError::Validation(
                "inviteCodeBytes must be at least 1".to_string(),
            ));
        }
        if self.max_name_len == 0 {
            return Err(AccessError::Validation(
                "maxNameLen must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Sets the database file name.
    #[must_use]
    pub fn with_database_file(mut self, file: impl Into<String>) -> Self {
        self.database_file = file.into();
        self
    }

    /// Sets the invite code entropy in bytes.
    #[must_use]
    pub const fn with_invite_code_bytes(mut self, bytes: usize) -> Self {
        self.invite_code_bytes = bytes;
        self
    }

    /// Sets the number of insert retries.
    #[must_use]
    pub const fn with_insert_retries(mut self, retries: u8) -> Self {
        self.insert_retries = retries;
        self
    }

    /// Sets the maximum name length.
    #[must_use]
    pub const fn with_max_name_len(mut self, len: usize) -> Self {
        self.max_name_len = len;
        self
    }

    /// Enables or disables the duplicate-name bypass.
    #[must_use]
    pub const fn with_duplicate_bypass(mut self, allow: bool) -> Self {
        self.allow_duplicate_bypass = allow;
        self
    }
}
