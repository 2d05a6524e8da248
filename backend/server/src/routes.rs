use std::{collections::HashMap, sync::Arc};

use axum::{
    Json,
    body::Bytes,
    extract::{
        Path, Query, State,
        rejection::{PathRejection, QueryRejection},
    },
    http::{
        HeaderMap, StatusCode, Uri,
        header::{CACHE_CONTROL, CONTENT_TYPE},
    },
    response::{IntoResponse, Redirect},
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use crate::{
    error::AppError,
    models::{PostView, Profile},
    posts::{self, NewPost, page_limit, page_offset},
    resolver::{ArRequest, ar_requested, resolve},
    search::{PostDocument, SEARCH_LIMIT, UserDocument},
    state::State as AppState,
    users::{self, ProfileUpdate, WebhookEvent},
    utils::{blank, request_origin, user_agent, viewer},
    webhook::{self, ID_HEADER, SIGNATURE_HEADER, TIMESTAMP_HEADER, WebhookHeaders},
};

const PLACEHOLDER_SVG: &str = r##"<svg width="400" height="300" xmlns="http://www.w3.org/2000/svg">
  <rect width="100%" height="100%" fill="#f3f4f6"/>
  <rect x="50%" y="50%" width="100" height="80" rx="8" fill="#9ca3af" transform="translate(-50, -40)"/>
  <text x="50%" y="60%" text-anchor="middle" font-family="Arial, sans-serif" font-size="14" fill="#6b7280">3D Model</text>
</svg>"##;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    user_id: Option<String>,
    limit: Option<String>,
    offset: Option<String>,
}

#[derive(Deserialize)]
pub struct SearchQuery {
    q: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileQuery {
    user_id: Option<String>,
}

/// Extractor rejections are not allowed to turn into error responses here, a scan always redirects.
pub async fn ar_handler(
    State(state): State<Arc<AppState>>,
    slug: Result<Path<String>, PathRejection>,
    params: Result<Query<HashMap<String, String>>, QueryRejection>,
    uri: Uri,
    headers: HeaderMap,
) -> Redirect {
    let slug = match slug {
        Ok(Path(slug)) => slug,
        Err(e) => {
            warn!("Unreadable AR slug in {uri}: {e}");
            raw_slug(&uri)
        }
    };
    let params = params.map(|Query(params)| params).unwrap_or_default();

    let request = ArRequest {
        content_id: slug,
        user_agent: user_agent(&headers),
        ar_requested: ar_requested(&params),
        origin_override: state.config.origin_override.clone(),
        request_origin: request_origin(&headers),
    };

    let redirect = resolve(state.store.as_ref(), &request).await;

    Redirect::temporary(&redirect.target)
}

/// Last path segment, percent-decoded with invalid UTF-8 replaced.
fn raw_slug(uri: &Uri) -> String {
    let segment = uri.path().rsplit('/').next().unwrap_or_default();

    String::from_utf8_lossy(&urlencoding::decode_binary(segment.as_bytes())).into_owned()
}

pub async fn create_post_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<NewPost>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = viewer(&headers).ok_or(AppError::Unauthorized)?;

    let post = posts::create_post(&state, &user_id, payload).await?;

    Ok(Json(json!({ "success": true, "post": post })))
}

pub async fn list_posts_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, AppError> {
    let viewer = viewer(&headers);

    let posts = posts::list_posts(
        &state,
        viewer.as_deref(),
        query.user_id.filter(|user_id| !user_id.is_empty()),
        page_limit(query.limit.as_deref()),
        page_offset(query.offset.as_deref()),
    )
    .await?;

    Ok(Json(json!({ "posts": posts })))
}

pub async fn all_posts_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let posts = posts::explore_posts(&state).await?;

    Ok(Json(json!({ "posts": posts })))
}

pub async fn get_post_handler(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    headers: HeaderMap,
) -> Result<Json<PostView>, AppError> {
    let viewer = viewer(&headers);

    Ok(Json(posts::get_post(&state, viewer.as_deref(), &slug).await?))
}

pub async fn placeholder_handler() -> impl IntoResponse {
    (
        [
            (CONTENT_TYPE, "image/svg+xml"),
            (CACHE_CONTROL, "public, max-age=86400"),
        ],
        PLACEHOLDER_SVG,
    )
}

pub async fn search_posts_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<PostDocument>>, AppError> {
    if blank(query.q.as_deref()) {
        return Ok(Json(Vec::new()));
    }
    let q = query.q.unwrap_or_default();

    Ok(Json(state.search.search_posts(q.trim(), SEARCH_LIMIT).await?))
}

pub async fn search_users_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<UserDocument>>, AppError> {
    if blank(query.q.as_deref()) {
        return Ok(Json(Vec::new()));
    }
    let q = query.q.unwrap_or_default();

    Ok(Json(state.search.search_users(q.trim(), SEARCH_LIMIT).await?))
}

pub async fn webhook_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let Some(secret) = state.config.webhook_secret.as_deref() else {
        return Err(AppError::MissingSecret);
    };

    let header = |name: &str| headers.get(name).and_then(|value| value.to_str().ok());
    let (Some(id), Some(timestamp), Some(signature)) = (
        header(ID_HEADER),
        header(TIMESTAMP_HEADER),
        header(SIGNATURE_HEADER),
    ) else {
        return Err(AppError::MalformedPayload("Missing Svix headers".to_string()));
    };

    let signed = WebhookHeaders {
        id,
        timestamp,
        signature,
    };
    webhook::verify(secret, &signed, &body, Utc::now().timestamp()).inspect_err(|e| {
        warn!("Webhook signature verification failed: {e}");
    })?;

    let event: WebhookEvent = serde_json::from_slice(&body)
        .map_err(|e| AppError::MalformedPayload(e.to_string()))?;
    users::handle_event(&state, event).await?;

    Ok((StatusCode::OK, "Webhook received"))
}

pub async fn profile_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ProfileQuery>,
) -> Result<Json<Option<Profile>>, AppError> {
    let Some(user_id) = query.user_id.filter(|user_id| !user_id.is_empty()) else {
        return Err(AppError::MalformedPayload("User ID is required".to_string()));
    };

    Ok(Json(users::get_profile(&state, &user_id).await?))
}

pub async fn update_profile_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(update): Json<ProfileUpdate>,
) -> Result<impl IntoResponse, AppError> {
    let viewer = viewer(&headers);

    let profile = users::update_profile(&state, viewer.as_deref(), update).await?;

    Ok(Json(json!({ "success": true, "profile": profile })))
}
