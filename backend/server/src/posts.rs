//! # Posts
//!
//! A post is one 3D model plus metadata. Assets are uploaded to object storage by the
//! frontend beforehand, so a post only ever carries URLs.
//!
//! ## Visibility
//! - Public posts show up everywhere and get indexed for search
//! - Private posts are only listed or served to their author
use std::collections::HashMap;

use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};
use url::Url;
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{Author, PLACEHOLDER_THUMBNAIL, Post, PostView, Tag, Visibility},
    search::PostDocument,
    slug::{tag_slug, unique_slug},
    state::State,
    store::{PostFilter, StoreError},
};

pub const DEFAULT_PAGE: usize = 20;
pub const MAX_PAGE: usize = 100;
pub const EXPLORE_LIMIT: usize = 50;

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct NewPost {
    pub title: Option<String>,
    pub description: Option<String>,
    /// Comma separated.
    pub tags: Option<String>,
    pub visibility: Option<String>,
    pub model_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub ios_src: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Asset references must be absolute http(s) URLs that can go out in a redirect as they are.
pub fn asset_url(field: &str, value: String) -> Result<String, AppError> {
    let invalid = || AppError::MalformedPayload(format!("{field} must be an http(s) URL"));

    // the URL parser silently drops tabs and newlines, so check the raw text first
    if value.chars().any(char::is_control) {
        return Err(invalid());
    }

    match Url::parse(&value) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(value),
        _ => Err(invalid()),
    }
}

pub fn parse_tags(raw: &str) -> Vec<Tag> {
    let mut tags: Vec<Tag> = Vec::new();

    for name in raw.split(',') {
        let name = name.trim().to_lowercase();
        if name.is_empty() {
            continue;
        }

        let slug = tag_slug(&name);
        if slug.is_empty() || tags.iter().any(|tag| tag.slug == slug) {
            continue;
        }

        tags.push(Tag { name, slug });
    }

    tags
}

pub async fn author(state: &State, user_id: &str) -> Result<Option<Author>, AppError> {
    let Some(user) = state.store.get_user(user_id).await? else {
        return Ok(None);
    };
    let profile = state.store.get_profile(user_id).await?;

    Ok(Some(Author {
        username: user.username,
        avatar_url: profile.as_ref().and_then(|profile| profile.avatar_url.clone()),
        profile_slug: profile.map(|profile| profile.slug),
    }))
}

async fn with_authors(state: &State, posts: Vec<Post>) -> Result<Vec<PostView>, AppError> {
    let mut authors: HashMap<String, Option<Author>> = HashMap::new();
    let mut views = Vec::with_capacity(posts.len());

    for post in posts {
        if !authors.contains_key(&post.user_id) {
            let found = author(state, &post.user_id).await?;
            authors.insert(post.user_id.clone(), found);
        }
        let user = authors.get(&post.user_id).cloned().flatten();

        views.push(PostView { post, user });
    }

    Ok(views)
}

pub async fn create_post(
    state: &State,
    user_id: &str,
    payload: NewPost,
) -> Result<PostView, AppError> {
    let Some(user) = state.store.get_user(user_id).await? else {
        warn!("Post attempt from unknown user {user_id}");
        return Err(AppError::Unauthorized);
    };

    let (Some(title), Some(model_url)) = (non_empty(payload.title), non_empty(payload.model_url))
    else {
        return Err(AppError::MalformedPayload(
            "Title and model URL are required".to_string(),
        ));
    };
    let model_url = asset_url("modelUrl", model_url)?;
    let ios_src = non_empty(payload.ios_src)
        .map(|ios_src| asset_url("iosSrc", ios_src))
        .transpose()?;

    let visibility = match non_empty(payload.visibility) {
        Some(raw) => raw.parse().map_err(AppError::MalformedPayload)?,
        None => Visibility::default(),
    };

    let Some(slug) = unique_slug(state.store.as_ref(), &title).await? else {
        return Err(AppError::Conflict(
            "A post with this slug already exists".to_string(),
        ));
    };

    let post = Post {
        id: Uuid::new_v4().to_string(),
        user_id: user.id.clone(),
        title,
        caption: non_empty(payload.description),
        model_url,
        thumbnail_url: non_empty(payload.thumbnail_url)
            .unwrap_or_else(|| PLACEHOLDER_THUMBNAIL.to_string()),
        ios_src,
        slug,
        visibility,
        created_at: Utc::now(),
        tags: payload.tags.as_deref().map(parse_tags).unwrap_or_default(),
    };

    match state.store.insert_post(&post).await {
        Err(StoreError::Conflict(slug)) => {
            return Err(AppError::Conflict(format!(
                "A post with slug {slug} already exists"
            )));
        }
        result => result?,
    }

    info!("Created post {} for {}", post.slug, user.id);

    let author = author(state, &user.id).await?;

    if post.visibility == Visibility::Public {
        let document = PostDocument::new(&post, Some(user.username.clone()));
        if let Err(e) = state.search.index_post(&document).await {
            warn!("Failed to index post {}: {e}", post.slug);
        }
    }

    Ok(PostView { post, user: author })
}

pub fn page_limit(raw: Option<&str>) -> usize {
    raw.and_then(|raw| raw.parse().ok())
        .filter(|&limit| limit > 0)
        .unwrap_or(DEFAULT_PAGE)
        .min(MAX_PAGE)
}

pub fn page_offset(raw: Option<&str>) -> usize {
    raw.and_then(|raw| raw.parse().ok()).unwrap_or(0)
}

/// Private posts only come back when the viewer is listing their own.
pub async fn list_posts(
    state: &State,
    viewer: Option<&str>,
    user_id: Option<String>,
    limit: usize,
    offset: usize,
) -> Result<Vec<PostView>, AppError> {
    let include_private = viewer.is_some() && viewer == user_id.as_deref();
    let filter = PostFilter {
        user_id,
        include_private,
    };

    let posts = state.store.list_posts(&filter, limit, offset).await?;

    with_authors(state, posts).await
}

pub async fn explore_posts(state: &State) -> Result<Vec<PostView>, AppError> {
    let posts = state
        .store
        .list_posts(&PostFilter::default(), EXPLORE_LIMIT, 0)
        .await?;

    with_authors(state, posts).await
}

pub async fn get_post(
    state: &State,
    viewer: Option<&str>,
    slug: &str,
) -> Result<PostView, AppError> {
    let post = state
        .store
        .get_post(slug)
        .await?
        .filter(|post| {
            post.visibility == Visibility::Public || viewer == Some(post.user_id.as_str())
        })
        .ok_or_else(|| AppError::NotFound(format!("Post {slug}")))?;

    let user = author(state, &post.user_id).await?;

    Ok(PostView { post, user })
}
