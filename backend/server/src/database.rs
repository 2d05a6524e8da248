//! # Redis
//!
//! RAM database.
//!
//! Core purpose is to store posts, users and profiles, and to keep per-tag post counts with atomic increments.
//!
//! ## Requirements
//!
//! - Fast lookups by slug, the AR hand-off does one per scan
//! - Newest first listings, globally and per user
//! - Slug uniqueness without a read-then-write race
//!
//! ## Implementation
//!
//! - `post:{slug}`: hash, one field per post attribute, tags as a JSON array
//! - `posts`: sorted set of slugs, score is creation time in milliseconds
//! - `user_posts:{user_id}`: same, scoped to one author
//! - `tags`: hash of tag slug to **post count**, `HINCRBY` on every new post
//! - `user:{id}` / `profile:{user_id}`: hashes synced from the identity provider webhook
//! - `usernames` / `profile_slugs`: hashes of username and profile slug to **user id**, so a rename can
//!   check who holds a name
//! - Slug claim is `HSETNX post:{slug} id`, the rest of the post goes in one `MULTI` pipeline.
//!   If that pipeline fails the claim is deleted again
//! - Optional attributes are simply absent from the hash
use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::{
    AsyncCommands, Client,
    aio::{ConnectionManager, ConnectionManagerConfig},
};
use tracing::{error, info};

use crate::{
    models::{ArAssets, Post, Profile, Tag, User, Visibility},
    store::{PostFilter, PostStore, StoreError},
};

pub const POSTS_KEY: &str = "posts";
pub const TAGS_KEY: &str = "tags";
pub const USERNAMES_KEY: &str = "usernames";
pub const PROFILE_SLUGS_KEY: &str = "profile_slugs";

const SCAN_CHUNK: isize = 100;

pub async fn init_redis(redis_url: &str) -> Result<ConnectionManager, redis::RedisError> {
    let config = ConnectionManagerConfig::new()
        .set_number_of_retries(1)
        .set_connection_timeout(Duration::from_millis(100));

    let client = Client::open(redis_url)?;
    let connection_manager = client.get_connection_manager_with_config(config).await?;

    info!("Connected to Redis at {redis_url}");

    Ok(connection_manager)
}

fn post_key(slug: &str) -> String {
    format!("post:{slug}")
}

fn user_posts_key(user_id: &str) -> String {
    format!("user_posts:{user_id}")
}

fn user_key(id: &str) -> String {
    format!("user:{id}")
}

fn profile_key(user_id: &str) -> String {
    format!("profile:{user_id}")
}

pub struct RedisStore {
    connection: ConnectionManager,
}

impl RedisStore {
    pub fn new(connection: ConnectionManager) -> Self {
        Self { connection }
    }

    async fn load_posts(&self, slugs: &[String]) -> Result<Vec<Post>, StoreError> {
        let mut connection = self.connection.clone();

        let mut pipe = redis::pipe();
        for slug in slugs {
            pipe.hgetall(post_key(slug));
        }
        let maps: Vec<HashMap<String, String>> = pipe.query_async(&mut connection).await?;

        // a slug can outlive its hash if a delete raced the listing
        maps.into_iter()
            .zip(slugs)
            .filter(|(map, _)| !map.is_empty())
            .map(|(map, slug)| post_from_hash(&post_key(slug), map))
            .collect()
    }
}

#[async_trait]
impl PostStore for RedisStore {
    async fn ar_assets(&self, slug: &str) -> Result<Option<ArAssets>, StoreError> {
        let mut connection = self.connection.clone();

        let (id, model_url, preview_url, ios_src): (
            Option<String>,
            Option<String>,
            Option<String>,
            Option<String>,
        ) = redis::cmd("HMGET")
            .arg(post_key(slug))
            .arg(&["id", "model_url", "thumbnail_url", "ios_src"])
            .query_async(&mut connection)
            .await?;

        Ok(id.map(|_| ArAssets {
            model_url,
            preview_url,
            ios_src,
        }))
    }

    async fn slug_taken(&self, slug: &str) -> Result<bool, StoreError> {
        let mut connection = self.connection.clone();

        Ok(connection.exists(post_key(slug)).await?)
    }

    async fn insert_post(&self, post: &Post) -> Result<(), StoreError> {
        let mut connection = self.connection.clone();
        let key = post_key(&post.slug);
        let fields = post_fields(&key, post)?;

        let claimed: bool = connection.hset_nx(&key, "id", &post.id).await?;
        if !claimed {
            return Err(StoreError::Conflict(post.slug.clone()));
        }

        let score = post.created_at.timestamp_millis();

        let mut pipe = redis::pipe();
        pipe.atomic()
            .hset_multiple(&key, &fields[..])
            .zadd(POSTS_KEY, &post.slug, score)
            .zadd(user_posts_key(&post.user_id), &post.slug, score);
        for tag in &post.tags {
            pipe.hincr(TAGS_KEY, &tag.slug, 1);
        }

        if let Err(e) = pipe.query_async::<()>(&mut connection).await {
            // a bare claim would keep the slug taken and its lookups corrupt
            let released = redis::pipe()
                .atomic()
                .del(&key)
                .zrem(POSTS_KEY, &post.slug)
                .zrem(user_posts_key(&post.user_id), &post.slug)
                .query_async::<()>(&mut connection)
                .await;
            if let Err(release_error) = released {
                error!("Failed to release slug claim {key}: {release_error}");
            }

            return Err(e.into());
        }

        Ok(())
    }

    async fn get_post(&self, slug: &str) -> Result<Option<Post>, StoreError> {
        let mut connection = self.connection.clone();
        let key = post_key(slug);

        let map: HashMap<String, String> = connection.hgetall(&key).await?;
        if map.is_empty() {
            return Ok(None);
        }

        post_from_hash(&key, map).map(Some)
    }

    async fn list_posts(
        &self,
        filter: &PostFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Post>, StoreError> {
        let mut connection = self.connection.clone();
        let key = match &filter.user_id {
            Some(user_id) => user_posts_key(user_id),
            None => POSTS_KEY.to_string(),
        };

        let mut posts = Vec::with_capacity(limit);
        let mut skipped = 0;
        let mut start: isize = 0;

        while posts.len() < limit {
            let slugs: Vec<String> = connection
                .zrevrange(&key, start, start + SCAN_CHUNK - 1)
                .await?;
            if slugs.is_empty() {
                break;
            }
            start += SCAN_CHUNK;

            for post in self.load_posts(&slugs).await? {
                if !filter.include_private && post.visibility != Visibility::Public {
                    continue;
                }
                if skipped < offset {
                    skipped += 1;
                    continue;
                }
                posts.push(post);
                if posts.len() == limit {
                    break;
                }
            }
        }

        Ok(posts)
    }

    async fn get_user(&self, id: &str) -> Result<Option<User>, StoreError> {
        let mut connection = self.connection.clone();
        let key = user_key(id);

        let map: HashMap<String, String> = connection.hgetall(&key).await?;
        if map.is_empty() {
            return Ok(None);
        }

        user_from_hash(&key, map).map(Some)
    }

    async fn save_user(&self, user: &User) -> Result<(), StoreError> {
        let mut connection = self.connection.clone();
        let key = user_key(&user.id);

        let previous: Option<String> = connection.hget(&key, "username").await?;

        let mut pipe = redis::pipe();
        pipe.atomic();
        write_user(&mut pipe, user, previous.as_deref());
        pipe.query_async::<()>(&mut connection).await?;

        Ok(())
    }

    async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>, StoreError> {
        let mut connection = self.connection.clone();
        let key = profile_key(user_id);

        let map: HashMap<String, String> = connection.hgetall(&key).await?;
        if map.is_empty() {
            return Ok(None);
        }

        profile_from_hash(&key, map).map(Some)
    }

    async fn create_profile(&self, profile: &Profile) -> Result<bool, StoreError> {
        let mut connection = self.connection.clone();
        let key = profile_key(&profile.user_id);

        let claimed: bool = connection
            .hset_nx(&key, "user_id", &profile.user_id)
            .await?;
        if !claimed {
            return Ok(false);
        }

        let mut pipe = redis::pipe();
        pipe.atomic();
        write_profile(&mut pipe, profile, None);
        pipe.query_async::<()>(&mut connection).await?;

        Ok(true)
    }

    async fn username_owner(&self, username: &str) -> Result<Option<String>, StoreError> {
        let mut connection = self.connection.clone();

        Ok(connection.hget(USERNAMES_KEY, username).await?)
    }

    async fn profile_slug_owner(&self, slug: &str) -> Result<Option<String>, StoreError> {
        let mut connection = self.connection.clone();

        Ok(connection.hget(PROFILE_SLUGS_KEY, slug).await?)
    }

    async fn update_profile(&self, user: &User, profile: &Profile) -> Result<(), StoreError> {
        let mut connection = self.connection.clone();

        let previous_username: Option<String> =
            connection.hget(user_key(&user.id), "username").await?;
        let previous_slug: Option<String> = connection
            .hget(profile_key(&profile.user_id), "slug")
            .await?;

        let mut pipe = redis::pipe();
        pipe.atomic();
        write_user(&mut pipe, user, previous_username.as_deref());
        write_profile(&mut pipe, profile, previous_slug.as_deref());
        pipe.query_async::<()>(&mut connection).await?;

        Ok(())
    }
}

/// Queues the user hash and its `usernames` entry, dropping the entry for a previous name.
fn write_user(pipe: &mut redis::Pipeline, user: &User, previous_username: Option<&str>) {
    let key = user_key(&user.id);
    let mut fields = vec![
        ("id", user.id.clone()),
        ("username", user.username.clone()),
        ("created_at", user.created_at.to_rfc3339()),
        ("updated_at", user.updated_at.to_rfc3339()),
    ];
    match &user.email {
        Some(email) => fields.push(("email", email.clone())),
        None => {
            pipe.hdel(&key, "email");
        }
    }

    pipe.hset_multiple(&key, &fields[..])
        .hset(USERNAMES_KEY, &user.username, &user.id);
    if let Some(previous) = previous_username.filter(|previous| *previous != user.username) {
        pipe.hdel(USERNAMES_KEY, previous);
    }
}

/// Same for the profile hash and its `profile_slugs` entry.
fn write_profile(pipe: &mut redis::Pipeline, profile: &Profile, previous_slug: Option<&str>) {
    let key = profile_key(&profile.user_id);
    let mut fields = vec![
        ("user_id", profile.user_id.clone()),
        ("slug", profile.slug.clone()),
        ("bio", profile.bio.clone()),
    ];
    match &profile.avatar_url {
        Some(avatar_url) => fields.push(("avatar_url", avatar_url.clone())),
        None => {
            pipe.hdel(&key, "avatar_url");
        }
    }

    pipe.hset_multiple(&key, &fields[..])
        .hset(PROFILE_SLUGS_KEY, &profile.slug, &profile.user_id);
    if let Some(previous) = previous_slug.filter(|previous| *previous != profile.slug) {
        pipe.hdel(PROFILE_SLUGS_KEY, previous);
    }
}

fn corrupt(key: &str, reason: impl Into<String>) -> StoreError {
    StoreError::Corrupt {
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn take(map: &mut HashMap<String, String>, key: &str, field: &str) -> Result<String, StoreError> {
    map.remove(field)
        .ok_or_else(|| corrupt(key, format!("missing field {field}")))
}

fn take_time(
    map: &mut HashMap<String, String>,
    key: &str,
    field: &str,
) -> Result<DateTime<Utc>, StoreError> {
    let raw = take(map, key, field)?;

    DateTime::parse_from_rfc3339(&raw)
        .map(|time| time.with_timezone(&Utc))
        .map_err(|e| corrupt(key, format!("{field}: {e}")))
}

fn post_from_hash(key: &str, mut map: HashMap<String, String>) -> Result<Post, StoreError> {
    let tags: Vec<Tag> = match map.remove("tags") {
        Some(raw) => serde_json::from_str(&raw).map_err(|e| corrupt(key, format!("tags: {e}")))?,
        None => Vec::new(),
    };

    let visibility = take(&mut map, key, "visibility")?
        .parse()
        .map_err(|e: String| corrupt(key, e))?;

    Ok(Post {
        id: take(&mut map, key, "id")?,
        user_id: take(&mut map, key, "user_id")?,
        title: take(&mut map, key, "title")?,
        caption: map.remove("caption"),
        model_url: take(&mut map, key, "model_url")?,
        thumbnail_url: take(&mut map, key, "thumbnail_url")?,
        ios_src: map.remove("ios_src"),
        slug: take(&mut map, key, "slug")?,
        visibility,
        created_at: take_time(&mut map, key, "created_at")?,
        tags,
    })
}

fn user_from_hash(key: &str, mut map: HashMap<String, String>) -> Result<User, StoreError> {
    Ok(User {
        id: take(&mut map, key, "id")?,
        email: map.remove("email"),
        username: take(&mut map, key, "username")?,
        created_at: take_time(&mut map, key, "created_at")?,
        updated_at: take_time(&mut map, key, "updated_at")?,
    })
}

fn profile_from_hash(key: &str, mut map: HashMap<String, String>) -> Result<Profile, StoreError> {
    Ok(Profile {
        user_id: take(&mut map, key, "user_id")?,
        slug: take(&mut map, key, "slug")?,
        avatar_url: map.remove("avatar_url"),
        bio: take(&mut map, key, "bio")?,
    })
}
