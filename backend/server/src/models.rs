//! # Records
//!
//! Shapes shared by the store, the search index and the JSON routes.
//!
//! Everything serializes in camelCase since the frontend consumes these directly.
use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const PLACEHOLDER_THUMBNAIL: &str = "/api/placeholder";

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Private,
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Visibility::Public => write!(f, "public"),
            Visibility::Private => write!(f, "private"),
        }
    }
}

impl FromStr for Visibility {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "public" => Ok(Visibility::Public),
            "private" => Ok(Visibility::Private),
            other => Err(format!("unknown visibility {other:?}")),
        }
    }
}

/// The three asset references the AR hand-off needs, nothing else.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ArAssets {
    pub model_url: Option<String>,
    pub preview_url: Option<String>,
    pub ios_src: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub name: String,
    pub slug: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub caption: Option<String>,
    pub model_url: String,
    pub thumbnail_url: String,
    pub ios_src: Option<String>,
    pub slug: String,
    pub visibility: Visibility,
    pub created_at: DateTime<Utc>,
    pub tags: Vec<Tag>,
}

impl Post {
    pub fn ar_assets(&self) -> ArAssets {
        ArAssets {
            model_url: Some(self.model_url.clone()),
            preview_url: Some(self.thumbnail_url.clone()),
            ios_src: self.ios_src.clone(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub user_id: String,
    pub slug: String,
    pub avatar_url: Option<String>,
    pub bio: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub username: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Profile with its user embedded, returned after an edit.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProfileView {
    #[serde(flatten)]
    pub profile: Profile,
    pub user: User,
}

/// Author block embedded in post responses.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    pub username: String,
    pub avatar_url: Option<String>,
    pub profile_slug: Option<String>,
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PostView {
    #[serde(flatten)]
    pub post: Post,
    pub user: Option<Author>,
}
