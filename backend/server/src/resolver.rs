//! # AR Hand-off
//!
//! Turns a scan of `/api/ar/{slug}` into exactly one redirect. QR codes printed for a post point here.
//!
//!
//!
//! ## Flow
//! 1. Look up the three asset references for the slug. Store errors are logged and treated as not found.
//! 2. Not found: plain web view `/p/{slug}`.
//! 3. No `ar` query parameter: plain web view. AR is opt in per request.
//! 4. iOS with a USDZ asset: the asset URL verbatim, Quick Look intercepts it.
//! 5. Android with a model asset: Scene Viewer deep link.
//! 6. Anything else: web view with `?ar=1` so the page can still try an in-browser viewer.
//!
//!
//!
//! ## Notes
//! - Never an error response, always a redirect. A stored asset URL that can't go in a `Location`
//!   header counts as a missing asset
//! - Stateless, the only suspension point is the single store read
//! - Origin is the configured override if any, then the request's own origin, then nothing (relative path)
use std::collections::HashMap;

use axum::http::HeaderValue;
use tracing::{debug, error};

use crate::{
    models::ArAssets,
    platform::{Platform, classify},
    store::PostStore,
};

pub const SCENE_VIEWER_ENDPOINT: &str = "https://arvr.google.com/scene-viewer/1.0";
pub const WEB_VIEW_PATH: &str = "/p";
pub const AR_PARAM: &str = "ar";

#[derive(Clone, Debug, Default)]
pub struct ArRequest {
    pub content_id: String,
    pub user_agent: String,
    pub ar_requested: bool,
    pub origin_override: Option<String>,
    /// Scheme and host the request came in on, when the headers allow working it out.
    pub request_origin: Option<String>,
}

impl ArRequest {
    fn origin(&self) -> Option<&str> {
        self.origin_override
            .as_deref()
            .or(self.request_origin.as_deref())
            .map(|origin| origin.trim_end_matches('/'))
            .filter(|origin| !origin.is_empty())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Redirect {
    pub target: String,
}

/// `ar=1`, `ar=true` and a bare `ar` all count.
pub fn ar_requested(params: &HashMap<String, String>) -> bool {
    params.contains_key(AR_PARAM)
}

pub fn scene_viewer_url(model_url: &str) -> String {
    format!(
        "{SCENE_VIEWER_ENDPOINT}?file={}&mode=ar_preferred",
        urlencoding::encode(model_url)
    )
}

pub fn web_view_url(origin: Option<&str>, slug: &str, ar_marker: bool) -> String {
    let mut url = format!(
        "{}{WEB_VIEW_PATH}/{}",
        origin.unwrap_or_default(),
        urlencoding::encode(slug)
    );

    if ar_marker {
        url.push_str("?ar=1");
    }

    url
}

pub async fn resolve(store: &dyn PostStore, request: &ArRequest) -> Redirect {
    let assets = store
        .ar_assets(&request.content_id)
        .await
        .unwrap_or_else(|e| {
            error!("AR lookup for {} failed: {e}", request.content_id);
            None
        });

    decide(assets.as_ref(), request)
}

pub fn decide(assets: Option<&ArAssets>, request: &ArRequest) -> Redirect {
    let origin = request.origin();
    let slug = &request.content_id;

    let Some(assets) = assets else {
        debug!("No post for {slug}, sending to web view");
        return Redirect {
            target: web_view_url(origin, slug, false),
        };
    };

    if !request.ar_requested {
        return Redirect {
            target: web_view_url(origin, slug, false),
        };
    }

    let ios_src = non_empty(&assets.ios_src);
    let model_url = non_empty(&assets.model_url);

    let target = match (classify(&request.user_agent), ios_src, model_url) {
        (Platform::Ios, Some(ios_src), _) => ios_src.to_string(),
        (Platform::Android, _, Some(model_url)) => scene_viewer_url(model_url),
        (platform, _, _) => {
            debug!("No native AR for {slug} on {platform:?}, falling back to web view");
            web_view_url(origin, slug, true)
        }
    };

    Redirect { target }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .filter(|value| !value.is_empty())
        .filter(|value| redirectable(value))
}

/// Same check the `Location` header goes through, control characters are the usual culprit.
pub fn redirectable(url: &str) -> bool {
    HeaderValue::from_bytes(url.as_bytes()).is_ok()
}
