mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};

use common::{ANDROID, DESKTOP, IPHONE, config, get, location, post, send, test_app, test_app_with};
use server::{models::Visibility, store::PostStore};

async fn scan(router: &axum::Router, uri: &str, user_agent: &str) -> (StatusCode, String) {
    let request = Request::get(uri)
        .header("user-agent", user_agent)
        .body(Body::empty())
        .unwrap();
    let response = send(router, request).await;

    (response.status(), location(&response).to_string())
}

#[tokio::test]
async fn test_iphone_gets_usdz() {
    let app = test_app();
    let mut chair = post("chair-ab12cd34", "user_1", Visibility::Public);
    chair.ios_src = Some("https://cdn.example/chair.usdz".to_string());
    app.store.insert_post(&chair).await.unwrap();

    let (status, target) = scan(&app.router, "/api/ar/chair-ab12cd34?ar=1", IPHONE).await;

    assert_eq!(status, StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(target, "https://cdn.example/chair.usdz");
}

#[tokio::test]
async fn test_android_gets_scene_viewer() {
    let app = test_app();
    let mut chair = post("chair-ab12cd34", "user_1", Visibility::Public);
    chair.model_url = "https://cdn.example/chair.glb".to_string();
    app.store.insert_post(&chair).await.unwrap();

    let (_, target) = scan(&app.router, "/api/ar/chair-ab12cd34?ar=true", ANDROID).await;

    assert_eq!(
        target,
        "https://arvr.google.com/scene-viewer/1.0?file=https%3A%2F%2Fcdn.example%2Fchair.glb&mode=ar_preferred"
    );
}

#[tokio::test]
async fn test_bare_ar_flag() {
    let app = test_app();
    app.store
        .insert_post(&post("chair-ab12cd34", "user_1", Visibility::Public))
        .await
        .unwrap();

    let (_, target) = scan(&app.router, "/api/ar/chair-ab12cd34?ar", IPHONE).await;

    assert_eq!(target, "https://cdn.example/chair-ab12cd34.usdz");
}

#[tokio::test]
async fn test_without_flag_goes_to_web_view() {
    let app = test_app();
    app.store
        .insert_post(&post("chair-ab12cd34", "user_1", Visibility::Public))
        .await
        .unwrap();

    for user_agent in [IPHONE, ANDROID, DESKTOP] {
        let (_, target) = scan(&app.router, "/api/ar/chair-ab12cd34", user_agent).await;
        assert_eq!(target, "/p/chair-ab12cd34");
    }
}

#[tokio::test]
async fn test_missing_post_goes_to_web_view() {
    let app = test_app();

    for uri in ["/api/ar/nope?ar=1", "/api/ar/nope"] {
        let (status, target) = scan(&app.router, uri, IPHONE).await;
        assert_eq!(status, StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(target, "/p/nope");
    }
}

#[tokio::test]
async fn test_desktop_fallback_keeps_ar_marker() {
    let app = test_app();
    app.store
        .insert_post(&post("chair-ab12cd34", "user_1", Visibility::Public))
        .await
        .unwrap();

    let (_, target) = scan(&app.router, "/api/ar/chair-ab12cd34?ar=1", DESKTOP).await;

    assert_eq!(target, "/p/chair-ab12cd34?ar=1");
}

#[tokio::test]
async fn test_store_failure_still_redirects() {
    let app = test_app();
    app.store
        .insert_post(&post("chair-ab12cd34", "user_1", Visibility::Public))
        .await
        .unwrap();
    app.store.set_failing(true);

    let (status, target) = scan(&app.router, "/api/ar/chair-ab12cd34?ar=1", ANDROID).await;

    assert_eq!(status, StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(target, "/p/chair-ab12cd34");
}

#[tokio::test]
async fn test_host_header_makes_absolute_fallback() {
    let app = test_app();

    let request = Request::get("/api/ar/nope?ar=1")
        .header("host", "scanxr.app")
        .header("x-forwarded-proto", "https")
        .body(Body::empty())
        .unwrap();
    let response = send(&app.router, request).await;

    assert_eq!(location(&response), "https://scanxr.app/p/nope");
}

#[tokio::test]
async fn test_origin_override_wins_over_host() {
    let mut config = config();
    config.origin_override = Some("https://scanxr.example".to_string());
    let app = test_app_with(config);

    let request = Request::get("/api/ar/nope")
        .header("host", "10.0.0.5:1111")
        .body(Body::empty())
        .unwrap();
    let response = send(&app.router, request).await;

    assert_eq!(location(&response), "https://scanxr.example/p/nope");
}

#[tokio::test]
async fn test_repeat_scans_agree() {
    let app = test_app();
    app.store
        .insert_post(&post("chair-ab12cd34", "user_1", Visibility::Public))
        .await
        .unwrap();

    let first = get(&app.router, "/api/ar/chair-ab12cd34?ar=1").await;
    let second = get(&app.router, "/api/ar/chair-ab12cd34?ar=1").await;

    assert_eq!(location(&first), location(&second));
}

#[tokio::test]
async fn test_unusable_stored_url_still_redirects() {
    let app = test_app();
    let mut chair = post("chair-ab12cd34", "user_1", Visibility::Public);
    chair.ios_src = Some("https://cdn.example/chair\nX-Evil: 1.usdz".to_string());
    app.store.insert_post(&chair).await.unwrap();

    let (status, target) = scan(&app.router, "/api/ar/chair-ab12cd34?ar=1", IPHONE).await;

    assert_eq!(status, StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(target, "/p/chair-ab12cd34?ar=1");
}

#[tokio::test]
async fn test_non_ascii_asset_url_is_kept() {
    let app = test_app();
    let mut chair = post("chair-ab12cd34", "user_1", Visibility::Public);
    chair.ios_src = Some("https://cdn.example/stühl.usdz".to_string());
    app.store.insert_post(&chair).await.unwrap();

    let request = Request::get("/api/ar/chair-ab12cd34?ar=1")
        .header("user-agent", IPHONE)
        .body(Body::empty())
        .unwrap();
    let response = send(&app.router, request).await;

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(
        response.headers()["location"].as_bytes(),
        "https://cdn.example/stühl.usdz".as_bytes()
    );
}

#[tokio::test]
async fn test_invalid_utf8_slug_still_redirects() {
    let app = test_app();

    let (status, target) = scan(&app.router, "/api/ar/%FF?ar=1", IPHONE).await;

    assert_eq!(status, StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(target, "/p/%EF%BF%BD");
}
