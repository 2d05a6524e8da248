//! Documentation of the ScanXR backend, 3D model posts with AR preview on phones.
//!
//!
//!
//! # General Infrastructure
//! - Frontend renders every page, this server only answers `/api/*`
//! - Reverse proxy in front verifies the identity provider session and forwards the user id as `X-User-Id`
//! - Model and thumbnail files go straight from the browser to object storage, posts only hold URLs
//! - Redis and Meilisearch run next to this server and are reached by their internal names
//!
//!
//!
//! # AR Hand-off
//!
//! **Goal**: One QR code per post that opens the native AR viewer on whatever phone scans it.
//!
//! - QR points at `/api/ar/{slug}?ar=1`
//! - iPhone/iPad/iPod gets the USDZ asset directly, Quick Look takes over
//! - Android gets a Scene Viewer deep link built from the glTF/GLB asset
//! - Everything else lands on the web view `/p/{slug}?ar=1` which can still try an in-browser viewer
//! - Lookups that fail are treated as missing posts, a scan always ends in a redirect
//!
//! See [`resolver`] for the exact rules.
//!
//!
//!
//! # Notes
//!
//! ## Redis + Meilisearch
//! Redis holds posts, users and profiles. Slug lookups are O(1) hash reads and tag counts are atomic increments.
//! Meilisearch only backs the search boxes. It is fed right after each successful write, so search may lag a
//! moment behind Redis. That eventual consistency is fine for an explore page.
//!
//! ## Identity Provider
//! Users are created and updated on the provider's side. Its webhook lands on `/api/webhook/identity`,
//! signed Svix style, and we keep a local copy. See [`webhook`] and [`users`].
//!
//!
//!
//! # Setup
//!
//! View current docs.
//! ```sh
//! cargo doc --open
//! `````
//!
//! Run locally, secrets can come from the environment instead of `/run/secrets`.
//! ```sh
//! MEILI_ADMIN_KEY=dev REDIS_URL=redis://localhost:6379 RUST_LOG=info cargo run -p scanxr
//! ```
//!
//!
//!
//! # Routes
//!
//! | Method | Path | |
//! |---|---|---|
//! | GET | `/api/ar/{slug}` | AR hand-off redirect |
//! | GET | `/api/posts` | `userId`, `limit`, `offset` |
//! | POST | `/api/posts` | needs `X-User-Id` |
//! | GET | `/api/posts/all` | explore feed |
//! | GET | `/api/posts/{slug}` | web view data |
//! | GET | `/api/search/posts` | `q` |
//! | GET | `/api/search/users` | `q` |
//! | GET | `/api/profile` | `userId` |
//! | POST | `/api/profile/update` | needs `X-User-Id` |
//! | POST | `/api/webhook/identity` | identity provider events |
//! | GET | `/api/placeholder` | default thumbnail |
use std::{sync::Arc, time::Duration};

use axum::{
    Router,
    http::{Method, header::CONTENT_TYPE},
    routing::{get, post},
};

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};
use tokio::{net::TcpListener, signal::ctrl_c};
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

pub mod config;
pub mod database;
pub mod error;
pub mod models;
pub mod platform;
pub mod posts;
pub mod resolver;
pub mod routes;
pub mod search;
pub mod slug;
pub mod state;
pub mod store;
pub mod users;
pub mod utils;
pub mod webhook;

use routes::{
    all_posts_handler, ar_handler, create_post_handler, get_post_handler, list_posts_handler,
    placeholder_handler, profile_handler, search_posts_handler, search_users_handler,
    update_profile_handler, webhook_handler,
};
use state::State;

pub fn app(state: Arc<State>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    Router::new()
        .route("/api/ar/{slug}", get(ar_handler))
        .route("/api/posts", get(list_posts_handler).post(create_post_handler))
        .route("/api/posts/all", get(all_posts_handler))
        .route("/api/posts/{slug}", get(get_post_handler))
        .route("/api/search/posts", get(search_posts_handler))
        .route("/api/search/users", get(search_users_handler))
        .route("/api/profile", get(profile_handler))
        .route("/api/profile/update", post(update_profile_handler))
        .route("/api/webhook/identity", post(webhook_handler))
        .route("/api/placeholder", get(placeholder_handler))
        .layer(cors)
        .with_state(state)
}

pub async fn start_server() -> anyhow::Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Initializing state...");
    let state = State::new().await?;

    info!("Starting server...");

    let address = format!("0.0.0.0:{}", state.config.port);
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address).await?;
    info!("Server running on {address}");

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutting down...");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            return std::future::pending().await;
        }

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
