//! # Meilisearch
//!
//! Search engine behind the explore page, proxied through our backend.
//!
//!
//!
//! ## Schema
//! - `posts` index: id, slug, title, caption, thumbnail, model, author username, created_at (**int**, ms)
//! - `users` index: id, username, avatar, profile slug
//! - Only public posts are ever indexed, so search never needs a visibility filter
//!
//!
//!
//! ## Sync
//! Redis stays the source of truth. Documents are pushed here right after the store write
//! succeeds. A failed push is logged and the write still counts, search is allowed to lag.
//!
//!
//!
//! ## Commands
//!
//! Grab relevant keys.
//! ```sh
//! curl -H "Authorization: Bearer $(cat /run/secrets/MEILI_ADMIN_KEY)" http://localhost:7700/keys
//! ```
use std::sync::Arc;

use async_trait::async_trait;
use meilisearch_sdk::{
    client::Client,
    settings::{MinWordSizeForTypos, Settings, TypoToleranceSettings},
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;
use tracing::info;

use crate::models::{Post, Profile, User};

pub const POST_INDEX: &str = "posts";
pub const POST_ID: &str = "id";
pub const POST_TITLE: &str = "title";
pub const POST_CAPTION: &str = "caption";
pub const POST_CREATED_AT: &str = "created_at";

pub const USER_INDEX: &str = "users";
pub const USER_ID: &str = "id";
pub const USER_NAME: &str = "username";

pub const SEARCH_LIMIT: usize = 10;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Meilisearch: {0}")]
    Meili(#[from] meilisearch_sdk::errors::Error),
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PostDocument {
    pub id: String,
    pub slug: String,
    pub title: String,
    pub caption: Option<String>,
    pub thumbnail_url: String,
    pub model_url: String,
    pub username: Option<String>,
    pub created_at: i64,
}

impl PostDocument {
    pub fn new(post: &Post, username: Option<String>) -> Self {
        Self {
            id: post.id.clone(),
            slug: post.slug.clone(),
            title: post.title.clone(),
            caption: post.caption.clone(),
            thumbnail_url: post.thumbnail_url.clone(),
            model_url: post.model_url.clone(),
            username,
            created_at: post.created_at.timestamp_millis(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct UserDocument {
    pub id: String,
    pub username: String,
    pub avatar_url: Option<String>,
    pub profile_slug: Option<String>,
}

impl UserDocument {
    pub fn new(user: &User, profile: Option<&Profile>) -> Self {
        Self {
            id: user.id.clone(),
            username: user.username.clone(),
            avatar_url: profile.and_then(|profile| profile.avatar_url.clone()),
            profile_slug: profile.map(|profile| profile.slug.clone()),
        }
    }
}

#[async_trait]
pub trait SearchIndex: Send + Sync {
    async fn index_post(&self, post: &PostDocument) -> Result<(), SearchError>;

    async fn index_user(&self, user: &UserDocument) -> Result<(), SearchError>;

    async fn search_posts(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<PostDocument>, SearchError>;

    async fn search_users(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<UserDocument>, SearchError>;
}

pub struct MeiliIndex {
    client: Arc<Client>,
}

pub async fn init_meilisearch(
    meili_url: &str,
    meili_admin_key: &str,
) -> Result<MeiliIndex, SearchError> {
    let meili_client = Arc::new(Client::new(meili_url, Some(meili_admin_key))?);

    meili_client
        .index(POST_INDEX)
        .set_settings(&post_settings())
        .await?;
    meili_client
        .index(USER_INDEX)
        .set_settings(&user_settings())
        .await?;

    info!("Meilisearch indexes configured at {meili_url}");

    Ok(MeiliIndex {
        client: meili_client,
    })
}

impl MeiliIndex {
    async fn search<T>(
        &self,
        index_name: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<T>, SearchError>
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        let results = self
            .client
            .index(index_name)
            .search()
            .with_query(query)
            .with_limit(limit)
            .execute::<T>()
            .await?;

        Ok(results.hits.into_iter().map(|hit| hit.result).collect())
    }
}

#[async_trait]
impl SearchIndex for MeiliIndex {
    async fn index_post(&self, post: &PostDocument) -> Result<(), SearchError> {
        upsert_items(self.client.clone(), POST_INDEX, std::slice::from_ref(post), POST_ID).await
    }

    async fn index_user(&self, user: &UserDocument) -> Result<(), SearchError> {
        upsert_items(self.client.clone(), USER_INDEX, std::slice::from_ref(user), USER_ID).await
    }

    async fn search_posts(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<PostDocument>, SearchError> {
        self.search(POST_INDEX, query, limit).await
    }

    async fn search_users(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<UserDocument>, SearchError> {
        self.search(USER_INDEX, query, limit).await
    }
}

async fn upsert_items<T>(
    meili_client: Arc<Client>,
    index_name: &str,
    items: &[T],
    id_name: &str,
) -> Result<(), SearchError>
where
    T: Serialize + Send + Sync,
{
    let _result = meili_client
        .index(index_name)
        .add_or_update(items, Some(id_name))
        .await?
        .wait_for_completion(&meili_client, None, None)
        .await?;

    #[cfg(feature = "verbose")]
    tracing::debug!("Meili task result: {:?}", _result);

    Ok(())
}

fn base_settings() -> Settings {
    Settings::new()
        .with_ranking_rules([
            "words",
            "typo",
            "proximity",
            "exactness",
            "attribute",
            "sort",
        ])
        .with_typo_tolerance(TypoToleranceSettings {
            enabled: Some(true),
            disable_on_attributes: None,
            disable_on_words: None,
            min_word_size_for_typos: Some(MinWordSizeForTypos {
                one_typo: Some(5),
                two_typos: Some(9),
            }),
        })
}

fn post_settings() -> Settings {
    base_settings()
        .with_searchable_attributes([POST_TITLE, POST_CAPTION])
        .with_sortable_attributes([POST_CREATED_AT])
}

fn user_settings() -> Settings {
    base_settings().with_searchable_attributes([USER_NAME])
}

#[cfg(any(test, feature = "test-helpers"))]
pub use memory::MemoryIndex;

#[cfg(any(test, feature = "test-helpers"))]
mod memory {
    use async_trait::async_trait;
    use tokio::sync::RwLock;

    use super::{PostDocument, SearchError, SearchIndex, UserDocument};

    /// Case-insensitive substring matching, close enough to Meilisearch for route tests.
    #[derive(Default)]
    pub struct MemoryIndex {
        posts: RwLock<Vec<PostDocument>>,
        users: RwLock<Vec<UserDocument>>,
    }

    impl MemoryIndex {
        pub fn new() -> Self {
            Self::default()
        }
    }

    fn matches(field: &str, query: &str) -> bool {
        field.to_lowercase().contains(&query.to_lowercase())
    }

    #[async_trait]
    impl SearchIndex for MemoryIndex {
        async fn index_post(&self, post: &PostDocument) -> Result<(), SearchError> {
            let mut posts = self.posts.write().await;
            posts.retain(|existing| existing.id != post.id);
            posts.push(post.clone());

            Ok(())
        }

        async fn index_user(&self, user: &UserDocument) -> Result<(), SearchError> {
            let mut users = self.users.write().await;
            users.retain(|existing| existing.id != user.id);
            users.push(user.clone());

            Ok(())
        }

        async fn search_posts(
            &self,
            query: &str,
            limit: usize,
        ) -> Result<Vec<PostDocument>, SearchError> {
            let mut hits: Vec<PostDocument> = self
                .posts
                .read()
                .await
                .iter()
                .filter(|post| {
                    matches(&post.title, query)
                        || post
                            .caption
                            .as_deref()
                            .is_some_and(|caption| matches(caption, query))
                })
                .cloned()
                .collect();

            hits.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            hits.truncate(limit);

            Ok(hits)
        }

        async fn search_users(
            &self,
            query: &str,
            limit: usize,
        ) -> Result<Vec<UserDocument>, SearchError> {
            Ok(self
                .users
                .read()
                .await
                .iter()
                .filter(|user| matches(&user.username, query))
                .take(limit)
                .cloned()
                .collect())
        }
    }
}
