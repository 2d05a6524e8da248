//! # Content Store
//!
//! Source of truth for posts, users and profiles.
//!
//! Handlers never talk to Redis directly. They get a [`PostStore`] handle out of
//! [`crate::state::State`], built once at startup, so routes can be exercised against
//! the in-memory store in tests.
//!
//! ## Notes
//! - Slug uniqueness is the store's job, [`PostStore::insert_post`] refuses a taken slug
//! - Listing is always newest first
use async_trait::async_trait;
use thiserror::Error;

use crate::models::{ArAssets, Post, Profile, User};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Redis: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Slug {0} already exists")]
    Conflict(String),

    #[error("Corrupt record {key}: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("Store unavailable")]
    Unavailable,
}

/// Which posts a listing should return.
#[derive(Clone, Debug, Default)]
pub struct PostFilter {
    pub user_id: Option<String>,
    pub include_private: bool,
}

#[async_trait]
pub trait PostStore: Send + Sync {
    /// Only the fields the AR hand-off needs. `None` when no post has this slug.
    async fn ar_assets(&self, slug: &str) -> Result<Option<ArAssets>, StoreError>;

    async fn slug_taken(&self, slug: &str) -> Result<bool, StoreError>;

    async fn insert_post(&self, post: &Post) -> Result<(), StoreError>;

    async fn get_post(&self, slug: &str) -> Result<Option<Post>, StoreError>;

    async fn list_posts(
        &self,
        filter: &PostFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Post>, StoreError>;

    async fn get_user(&self, id: &str) -> Result<Option<User>, StoreError>;

    async fn save_user(&self, user: &User) -> Result<(), StoreError>;

    async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>, StoreError>;

    /// Returns false and leaves the existing profile alone if one is already there.
    async fn create_profile(&self, profile: &Profile) -> Result<bool, StoreError>;

    /// Id of the user currently holding this username.
    async fn username_owner(&self, username: &str) -> Result<Option<String>, StoreError>;

    /// Id of the user whose profile lives at this slug.
    async fn profile_slug_owner(&self, slug: &str) -> Result<Option<String>, StoreError>;

    /// Writes both records together, a rename moves the username and the profile slug at once.
    async fn update_profile(&self, user: &User, profile: &Profile) -> Result<(), StoreError>;
}

#[cfg(any(test, feature = "test-helpers"))]
pub use memory::MemoryStore;

#[cfg(any(test, feature = "test-helpers"))]
mod memory {
    use std::{
        collections::HashMap,
        sync::atomic::{AtomicBool, Ordering},
    };

    use async_trait::async_trait;
    use tokio::sync::RwLock;

    use super::{PostFilter, PostStore, StoreError};
    use crate::models::{ArAssets, Post, Profile, User, Visibility};

    #[derive(Default)]
    pub struct MemoryStore {
        posts: RwLock<HashMap<String, Post>>,
        users: RwLock<HashMap<String, User>>,
        profiles: RwLock<HashMap<String, Profile>>,
        tag_counts: RwLock<HashMap<String, u64>>,
        failing: AtomicBool,
    }

    impl MemoryStore {
        pub fn new() -> Self {
            Self::default()
        }

        /// Every call errors until switched back, stands in for an unreachable database.
        pub fn set_failing(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }

        pub async fn tag_count(&self, slug: &str) -> u64 {
            self.tag_counts.read().await.get(slug).copied().unwrap_or(0)
        }

        fn check(&self) -> Result<(), StoreError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable);
            }

            Ok(())
        }
    }

    #[async_trait]
    impl PostStore for MemoryStore {
        async fn ar_assets(&self, slug: &str) -> Result<Option<ArAssets>, StoreError> {
            self.check()?;

            Ok(self.posts.read().await.get(slug).map(Post::ar_assets))
        }

        async fn slug_taken(&self, slug: &str) -> Result<bool, StoreError> {
            self.check()?;

            Ok(self.posts.read().await.contains_key(slug))
        }

        async fn insert_post(&self, post: &Post) -> Result<(), StoreError> {
            self.check()?;

            let mut posts = self.posts.write().await;
            if posts.contains_key(&post.slug) {
                return Err(StoreError::Conflict(post.slug.clone()));
            }
            posts.insert(post.slug.clone(), post.clone());

            let mut tag_counts = self.tag_counts.write().await;
            for tag in &post.tags {
                *tag_counts.entry(tag.slug.clone()).or_default() += 1;
            }

            Ok(())
        }

        async fn get_post(&self, slug: &str) -> Result<Option<Post>, StoreError> {
            self.check()?;

            Ok(self.posts.read().await.get(slug).cloned())
        }

        async fn list_posts(
            &self,
            filter: &PostFilter,
            limit: usize,
            offset: usize,
        ) -> Result<Vec<Post>, StoreError> {
            self.check()?;

            let mut posts: Vec<Post> = self
                .posts
                .read()
                .await
                .values()
                .filter(|post| {
                    filter
                        .user_id
                        .as_deref()
                        .is_none_or(|user_id| post.user_id == user_id)
                })
                .filter(|post| filter.include_private || post.visibility == Visibility::Public)
                .cloned()
                .collect();

            posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));

            Ok(posts.into_iter().skip(offset).take(limit).collect())
        }

        async fn get_user(&self, id: &str) -> Result<Option<User>, StoreError> {
            self.check()?;

            Ok(self.users.read().await.get(id).cloned())
        }

        async fn save_user(&self, user: &User) -> Result<(), StoreError> {
            self.check()?;

            self.users
                .write()
                .await
                .insert(user.id.clone(), user.clone());

            Ok(())
        }

        async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>, StoreError> {
            self.check()?;

            Ok(self.profiles.read().await.get(user_id).cloned())
        }

        async fn create_profile(&self, profile: &Profile) -> Result<bool, StoreError> {
            self.check()?;

            let mut profiles = self.profiles.write().await;
            if profiles.contains_key(&profile.user_id) {
                return Ok(false);
            }
            profiles.insert(profile.user_id.clone(), profile.clone());

            Ok(true)
        }

        async fn username_owner(&self, username: &str) -> Result<Option<String>, StoreError> {
            self.check()?;

            Ok(self
                .users
                .read()
                .await
                .values()
                .find(|user| user.username == username)
                .map(|user| user.id.clone()))
        }

        async fn profile_slug_owner(&self, slug: &str) -> Result<Option<String>, StoreError> {
            self.check()?;

            Ok(self
                .profiles
                .read()
                .await
                .values()
                .find(|profile| profile.slug == slug)
                .map(|profile| profile.user_id.clone()))
        }

        async fn update_profile(&self, user: &User, profile: &Profile) -> Result<(), StoreError> {
            self.check()?;

            let mut users = self.users.write().await;
            let mut profiles = self.profiles.write().await;
            users.insert(user.id.clone(), user.clone());
            profiles.insert(profile.user_id.clone(), profile.clone());

            Ok(())
        }
    }
}
