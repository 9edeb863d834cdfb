//! Per-owner list name uniqueness.
//!
//! Names are compared after trimming surrounding whitespace, and the
//! comparison is case-sensitive. Two different owners may use the same
//! name freely.

use serde::{Deserialize, Serialize};

use crate::error::{AccessError, Result};
use crate::model::{ListId, RestaurantList, UserId};

/// How list creation treats an existing list with the same name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Refuse with `Conflict(DuplicateList)`.
    #[default]
    Reject,
    /// Create anyway. Only honored if the engine config allows it.
    Allow,
}

/// Returns `name` with surrounding whitespace removed.
#[must_use]
pub fn normalize_list_name(name: &str) -> &str {
    name.trim()
}

/// Validates and normalizes a list or circle name.
///
/// # Errors
///
/// Returns `Validation` if the trimmed name is empty or longer than
/// `max_len` characters.
pub fn validate_name(name: &str, max_len: usize) -> Result<String> {
    let trimmed = normalize_list_name(name);
    if trimmed.is_empty() {
        return Err(AccessError::Validation("Name is required".to_string()));
    }
    if trimmed.chars().count() > max_len {
        return Err(AccessError::Validation(format!(
            "Name must be at most {max_len} characters"
        )));
    }
    Ok(trimmed.to_string())
}

/// Finds a list of `owner` named `candidate`.
///
/// Lists belonging to other owners are ignored, so callers may pass an
/// unfiltered slice.
#[must_use]
pub fn check_duplicate_name<'a>(
    owner: UserId,
    candidate: &str,
    lists: impl IntoIterator<Item = &'a RestaurantList>,
) -> Option<ListId> {
    let wanted = normalize_list_name(candidate);
    lists
        .into_iter()
        .find(|list| list.created_by_id == owner && normalize_list_name(&list.name) == wanted)
        .map(|list| list.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Visibility;

    fn list(id: i64, owner: i64, name: &str) -> RestaurantList {
        RestaurantList {
            id: ListId(id),
            created_by_id: UserId(owner),
            name: name.to_string(),
            description: None,
            visibility: Visibility::Private,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn finds_same_owner_same_name() {
        let lists = [list(1, 1, "Pizza"), list(2, 1, "Tacos")];
        assert_eq!(
            check_duplicate_name(UserId(1), "Tacos", &lists),
            Some(ListId(2))
        );
    }

    #[test]
    fn whitespace_is_trimmed() {
        let lists = [list(4, 1, "Brunch")];
        assert_eq!(
            check_duplicate_name(UserId(1), "  Brunch\t", &lists),
            Some(ListId(4))
        );
    }

    #[test]
    fn comparison_is_case_sensitive() {
        let lists = [list(1, 1, "Brunch")];
        assert_eq!(check_duplicate_name(UserId(1), "brunch", &lists), None);
    }

    #[test]
    fn other_owners_are_ignored() {
        let lists = [list(1, 2, "Pizza")];
        assert_eq!(check_duplicate_name(UserId(1), "Pizza", &lists), None);
    }

    #[test]
    fn validate_name_trims_and_bounds() {
        assert_eq!(validate_name("  Sushi  ", 10).unwrap(), "Sushi");
        assert!(matches!(
            validate_name("   ", 10),
            Err(AccessError::Validation(_))
        ));
        assert!(validate_name("abcdefghijk", 10).is_err());
        assert!(validate_name("ñandú", 5).is_ok());
    }

    #[test]
    fn policy_defaults_to_reject() {
        assert_eq!(DuplicatePolicy::default(), DuplicatePolicy::Reject);
    }
}
