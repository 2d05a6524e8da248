mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode, header::CONTENT_TYPE},
};
use serde_json::{Value, json};

use common::{get, json_body, post, seed_user, send, test_app};
use server::{models::Visibility, store::PostStore};

fn create(user_id: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::post("/api/posts").header(CONTENT_TYPE, "application/json");
    if let Some(user_id) = user_id {
        builder = builder.header("x-user-id", user_id);
    }

    builder.body(Body::from(body.to_string())).unwrap()
}

#[tokio::test]
async fn test_create_requires_identity() {
    let app = test_app();
    let body = json!({ "title": "Chair", "modelUrl": "https://cdn.example/chair.glb" });

    let response = send(&app.router, create(None, body.clone())).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = send(&app.router, create(Some("ghost"), body)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_create_requires_title_and_model() {
    let app = test_app();
    seed_user(&app.store, "user_1", "sam").await;

    let response = send(
        &app.router,
        create(
            Some("user_1"),
            json!({ "title": "   ", "modelUrl": "https://cdn.example/chair.glb" }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = send(&app.router, create(Some("user_1"), json!({ "title": "Chair" }))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"], "Malformed payload: Title and model URL are required");
}

#[tokio::test]
async fn test_create_rejects_unknown_visibility() {
    let app = test_app();
    seed_user(&app.store, "user_1", "sam").await;

    let response = send(
        &app.router,
        create(
            Some("user_1"),
            json!({
                "title": "Chair",
                "modelUrl": "https://cdn.example/chair.glb",
                "visibility": "friends"
            }),
        ),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_create_rejects_unusable_asset_urls() {
    let app = test_app();
    seed_user(&app.store, "user_1", "sam").await;

    for body in [
        json!({ "title": "Chair", "modelUrl": "not a url" }),
        json!({
            "title": "Chair",
            "modelUrl": "https://cdn.example/chair.glb",
            "iosSrc": "https://cdn.example/chair\nX-Evil: 1.usdz"
        }),
    ] {
        let response = send(&app.router, create(Some("user_1"), body)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    let body = json_body(get(&app.router, "/api/posts/all").await).await;
    assert!(body["posts"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_create_post() {
    let app = test_app();
    seed_user(&app.store, "user_1", "sam").await;

    let response = send(
        &app.router,
        create(
            Some("user_1"),
            json!({
                "title": "Oak Chair",
                "description": "  Scanned in the garden  ",
                "tags": "Furniture, wood, furniture",
                "modelUrl": "https://cdn.example/chair.glb",
                "iosSrc": "https://cdn.example/chair.usdz"
            }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["success"], true);

    let created = &body["post"];
    let slug = created["slug"].as_str().unwrap();
    assert!(slug.starts_with("oak-chair-"));
    assert_eq!(slug.len(), "oak-chair-".len() + 8);
    assert_eq!(created["caption"], "Scanned in the garden");
    assert_eq!(created["thumbnailUrl"], "/api/placeholder");
    assert_eq!(created["visibility"], "public");
    assert_eq!(created["user"]["username"], "sam");
    assert_eq!(created["tags"].as_array().unwrap().len(), 2);

    assert_eq!(app.store.tag_count("furniture").await, 1);
    assert_eq!(app.store.tag_count("wood").await, 1);

    let stored = app.store.get_post(slug).await.unwrap().unwrap();
    assert_eq!(stored.ios_src.as_deref(), Some("https://cdn.example/chair.usdz"));

    let hits = json_body(get(&app.router, "/api/search/posts?q=oak").await).await;
    assert_eq!(hits.as_array().unwrap().len(), 1);
    assert_eq!(hits[0]["slug"], slug);
    assert_eq!(hits[0]["username"], "sam");
}

#[tokio::test]
async fn test_private_posts_are_not_indexed() {
    let app = test_app();
    seed_user(&app.store, "user_1", "sam").await;

    let response = send(
        &app.router,
        create(
            Some("user_1"),
            json!({
                "title": "Secret Lamp",
                "modelUrl": "https://cdn.example/lamp.glb",
                "visibility": "private"
            }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let hits = json_body(get(&app.router, "/api/search/posts?q=lamp").await).await;
    assert!(hits.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_list_posts_visibility() {
    let app = test_app();
    seed_user(&app.store, "user_1", "sam").await;
    seed_user(&app.store, "user_2", "kim").await;
    app.store.insert_post(&post("a", "user_1", Visibility::Public)).await.unwrap();
    app.store.insert_post(&post("b", "user_1", Visibility::Private)).await.unwrap();
    app.store.insert_post(&post("c", "user_2", Visibility::Public)).await.unwrap();

    let body = json_body(get(&app.router, "/api/posts").await).await;
    assert_eq!(body["posts"].as_array().unwrap().len(), 2);

    let body = json_body(get(&app.router, "/api/posts?userId=user_1").await).await;
    assert_eq!(body["posts"].as_array().unwrap().len(), 1);

    let request = Request::get("/api/posts?userId=user_1")
        .header("x-user-id", "user_1")
        .body(Body::empty())
        .unwrap();
    let body = json_body(send(&app.router, request).await).await;
    assert_eq!(body["posts"].as_array().unwrap().len(), 2);
    assert_eq!(body["posts"][0]["user"]["username"], "sam");
}

#[tokio::test]
async fn test_list_posts_paging() {
    let app = test_app();
    for slug in ["a", "b", "c", "d", "e"] {
        app.store.insert_post(&post(slug, "user_1", Visibility::Public)).await.unwrap();
    }

    let body = json_body(get(&app.router, "/api/posts?limit=2&offset=1").await).await;
    assert_eq!(body["posts"].as_array().unwrap().len(), 2);

    let body = json_body(get(&app.router, "/api/posts?limit=nope&offset=4").await).await;
    assert_eq!(body["posts"].as_array().unwrap().len(), 1);

    let body = json_body(get(&app.router, "/api/posts/all").await).await;
    assert_eq!(body["posts"].as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn test_get_single_post() {
    let app = test_app();
    seed_user(&app.store, "user_1", "sam").await;
    app.store.insert_post(&post("open", "user_1", Visibility::Public)).await.unwrap();
    app.store.insert_post(&post("hidden", "user_1", Visibility::Private)).await.unwrap();

    let response = get(&app.router, "/api/posts/open").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["slug"], "open");
    assert_eq!(body["user"]["username"], "sam");

    let response = get(&app.router, "/api/posts/hidden").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let request = Request::get("/api/posts/hidden")
        .header("x-user-id", "user_1")
        .body(Body::empty())
        .unwrap();
    assert_eq!(send(&app.router, request).await.status(), StatusCode::OK);

    let response = get(&app.router, "/api/posts/missing").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_store_errors_are_opaque() {
    let app = test_app();
    app.store.set_failing(true);

    let response = get(&app.router, "/api/posts").await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json_body(response).await["error"], "Internal error");
}

#[tokio::test]
async fn test_placeholder() {
    let app = test_app();

    let response = get(&app.router, "/api/placeholder").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CONTENT_TYPE], "image/svg+xml");
    assert_eq!(response.headers()["cache-control"], "public, max-age=86400");
}

#[tokio::test]
async fn test_blank_search_is_empty() {
    let app = test_app();

    for uri in ["/api/search/posts", "/api/search/posts?q=%20%20", "/api/search/users?q="] {
        let body = json_body(get(&app.router, uri).await).await;
        assert_eq!(body, json!([]));
    }
}
