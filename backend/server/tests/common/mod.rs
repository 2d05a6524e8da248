#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, Response, header::LOCATION},
};
use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::Utc;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use server::{
    app,
    config::Config,
    models::{Post, Profile, User, Visibility},
    search::MemoryIndex,
    state::State,
    store::{MemoryStore, PostStore},
};

pub const IPHONE: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 16_0 like Mac OS X)";
pub const ANDROID: &str = "Mozilla/5.0 (Linux; Android 13)";
pub const DESKTOP: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64)";

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
    pub search: Arc<MemoryIndex>,
}

pub fn webhook_secret() -> String {
    format!("whsec_{}", STANDARD.encode(b"test webhook key"))
}

pub fn config() -> Config {
    Config {
        port: 0,
        redis_url: "redis://unused".to_string(),
        meili_url: "http://unused".to_string(),
        meili_key: "unused".to_string(),
        webhook_secret: Some(webhook_secret()),
        origin_override: None,
    }
}

pub fn test_app_with(config: Config) -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let search = Arc::new(MemoryIndex::new());

    let state = State::with_parts(config, store.clone(), search.clone());

    TestApp {
        router: app(state),
        store,
        search,
    }
}

pub fn test_app() -> TestApp {
    test_app_with(config())
}

pub fn post(slug: &str, user_id: &str, visibility: Visibility) -> Post {
    Post {
        id: format!("id-{slug}"),
        user_id: user_id.to_string(),
        title: slug.to_string(),
        caption: None,
        model_url: format!("https://cdn.example/{slug}.glb"),
        thumbnail_url: "/api/placeholder".to_string(),
        ios_src: Some(format!("https://cdn.example/{slug}.usdz")),
        slug: slug.to_string(),
        visibility,
        created_at: Utc::now(),
        tags: Vec::new(),
    }
}

pub async fn seed_user(store: &MemoryStore, id: &str, username: &str) {
    let now = Utc::now();
    store
        .save_user(&User {
            id: id.to_string(),
            email: None,
            username: username.to_string(),
            created_at: now,
            updated_at: now,
        })
        .await
        .unwrap();
}

/// User plus a profile whose slug is the username, what the webhook sync leaves behind.
pub async fn seed_profile(store: &MemoryStore, id: &str, username: &str) {
    seed_user(store, id, username).await;
    store
        .create_profile(&Profile {
            user_id: id.to_string(),
            slug: username.to_string(),
            avatar_url: Some(format!("https://img.example/{username}.png")),
            bio: format!("Hello, I'm {username}"),
        })
        .await
        .unwrap();
}

pub async fn send(router: &Router, request: Request<Body>) -> Response<Body> {
    router.clone().oneshot(request).await.unwrap()
}

pub async fn get(router: &Router, uri: &str) -> Response<Body> {
    send(router, Request::get(uri).body(Body::empty()).unwrap()).await
}

pub async fn json_body(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

pub fn location(response: &Response<Body>) -> &str {
    response.headers()[LOCATION].to_str().unwrap()
}
