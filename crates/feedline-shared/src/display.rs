//! Author display-name policy.
//!
//! Resolution order: full name, then the legacy `name` column, then the
//! username, then a handle synthesized from the author id, and finally
//! [`UNKNOWN_USER`] when the post carries no author at all. Blank strings
//! count as absent.

use crate::constants::UNKNOWN_USER;
use crate::models::Profile;
use crate::types::UserId;

pub fn display_name(profile: Option<&Profile>, author: Option<&UserId>) -> String {
    let named = profile.and_then(|p| {
        non_blank(p.full_name.as_deref())
            .or_else(|| non_blank(p.name.as_deref()))
            .or_else(|| non_blank(p.username.as_deref()))
    });

    if let Some(name) = named {
        return name.to_string();
    }

    match author.or(profile.map(|p| &p.id)) {
        Some(id) => id.handle(),
        None => UNKNOWN_USER.to_string(),
    }
}

/// Comment authors only fall back to the handle.
pub fn comment_author_name(profile: Option<&Profile>, author: &UserId) -> String {
    profile
        .and_then(|p| non_blank(p.username.as_deref()))
        .map(str::to_string)
        .unwrap_or_else(|| author.handle())
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(full_name: Option<&str>, name: Option<&str>, username: Option<&str>) -> Profile {
        let mut p = Profile::placeholder(UserId::new());
        p.full_name = full_name.map(String::from);
        p.name = name.map(String::from);
        p.username = username.map(String::from);
        p
    }

    #[test]
    fn full_name_wins() {
        let p = profile(Some("Ada Lovelace"), Some("Ada"), Some("ada"));
        assert_eq!(display_name(Some(&p), Some(&p.id)), "Ada Lovelace");
    }

    #[test]
    fn legacy_name_before_username() {
        let p = profile(None, Some("Ada"), Some("ada"));
        assert_eq!(display_name(Some(&p), Some(&p.id)), "Ada");
    }

    #[test]
    fn username_when_no_names() {
        let p = profile(Some("  "), None, Some("ada"));
        assert_eq!(display_name(Some(&p), Some(&p.id)), "ada");
    }

    #[test]
    fn handle_when_profile_is_empty() {
        let p = profile(None, None, None);
        assert_eq!(display_name(Some(&p), Some(&p.id)), p.id.handle());
    }

    #[test]
    fn handle_when_no_profile_row() {
        let author: UserId = "abcdef12-0000-4000-8000-000000000000".parse().unwrap();
        assert_eq!(display_name(None, Some(&author)), "user_abcdef12");
    }

    #[test]
    fn unknown_when_no_author() {
        assert_eq!(display_name(None, None), "Unknown User");
    }

    #[test]
    fn comment_author_uses_username_or_handle() {
        let p = profile(Some("Ada Lovelace"), None, Some("ada"));
        assert_eq!(comment_author_name(Some(&p), &p.id), "ada");
        assert_eq!(comment_author_name(None, &p.id), p.id.handle());
    }
}
