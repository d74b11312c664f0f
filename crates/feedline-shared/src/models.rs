//! Rows of the four hosted tables and the write payloads sent to them.
//!
//! Field names follow the column names so every struct (de)serializes
//! straight from the data service's JSON and from the local store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::types::{CommentId, PostId, UserId};

/// Profile columns a client may write. Anything else in an update is dropped.
pub const PROFILE_MUTABLE_FIELDS: [&str; 7] = [
    "username",
    "name",
    "full_name",
    "bio",
    "avatar_url",
    "cover_url",
    "dark_mode",
];

// ---------------------------------------------------------------------------
// Post
// ---------------------------------------------------------------------------

/// A feed post. Derived counts are never stored here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Post {
    pub id: PostId,
    /// Author. Nullable in the hosted schema.
    #[serde(default)]
    pub user_id: Option<UserId>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub text: String,
    /// Opaque URL returned by the upload handshake.
    #[serde(default)]
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for `posts`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewPost {
    pub user_id: UserId,
    pub text: String,
    pub image_url: Option<String>,
}

// ---------------------------------------------------------------------------
// Profile
// ---------------------------------------------------------------------------

/// One profile per auth identity; `id` equals the user id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Profile {
    pub id: UserId,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    /// Older column holding the same value as `full_name`.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub cover_url: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub dark_mode: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Profile {
    /// Default record for a user who has never been seen: handle from the id
    /// prefix, empty bio, no images.
    pub fn placeholder(id: UserId) -> Self {
        Self {
            id,
            username: Some(id.handle()),
            full_name: None,
            name: None,
            bio: Some(String::new()),
            avatar_url: None,
            cover_url: None,
            dark_mode: false,
            created_at: None,
            updated_at: None,
        }
    }

    /// Record created right after a sign-in; the username comes from the
    /// email's local part when there is one.
    pub fn provisioned(id: UserId, email: Option<&str>) -> Self {
        let username = email
            .and_then(|e| e.split('@').next())
            .filter(|local| !local.trim().is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| id.handle());
        let now = Utc::now();

        Self {
            username: Some(username),
            bio: None,
            created_at: Some(now),
            updated_at: Some(now),
            ..Self::placeholder(id)
        }
    }
}

/// Partial profile update restricted to [`PROFILE_MUTABLE_FIELDS`].
///
/// Nullable columns use `Option<Option<_>>`: absent leaves the column alone,
/// `Some(None)` clears it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProfilePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub name: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub full_name: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub bio: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub avatar_url: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub cover_url: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dark_mode: Option<bool>,
    /// Stamped by the profile service, never taken from caller input.
    #[serde(skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ProfilePatch {
    /// Build a patch from loosely-typed input (e.g. a form). Keys outside the
    /// allow-list are ignored.
    pub fn from_json(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// True when no allow-listed column would change.
    pub fn is_empty(&self) -> bool {
        self.username.is_none()
            && self.name.is_none()
            && self.full_name.is_none()
            && self.bio.is_none()
            && self.avatar_url.is_none()
            && self.cover_url.is_none()
            && self.dark_mode.is_none()
    }

    pub fn touched(mut self, at: DateTime<Utc>) -> Self {
        self.updated_at = Some(at);
        self
    }

    /// Apply the patch to an in-memory profile.
    pub fn apply(&self, profile: &mut Profile) {
        if let Some(username) = &self.username {
            profile.username = Some(username.clone());
        }
        if let Some(name) = &self.name {
            profile.name = name.clone();
        }
        if let Some(full_name) = &self.full_name {
            profile.full_name = full_name.clone();
        }
        if let Some(bio) = &self.bio {
            profile.bio = bio.clone();
        }
        if let Some(avatar_url) = &self.avatar_url {
            profile.avatar_url = avatar_url.clone();
        }
        if let Some(cover_url) = &self.cover_url {
            profile.cover_url = cover_url.clone();
        }
        if let Some(dark_mode) = self.dark_mode {
            profile.dark_mode = dark_mode;
        }
        if let Some(updated_at) = self.updated_at {
            profile.updated_at = Some(updated_at);
        }
    }
}

// ---------------------------------------------------------------------------
// Like
// ---------------------------------------------------------------------------

/// Presence of a row means "liked". At most one per (post, user).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Like {
    pub post_id: PostId,
    pub user_id: UserId,
}

// ---------------------------------------------------------------------------
// Comment
// ---------------------------------------------------------------------------

/// Append-only comment on a post.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Comment {
    pub id: CommentId,
    pub post_id: PostId,
    pub user_id: UserId,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for `comments`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewComment {
    pub post_id: PostId,
    pub user_id: UserId,
    pub text: String,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// missing -> None (via `default`), null -> Some(None)
fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
