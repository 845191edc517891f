mod common;

use axum::http::StatusCode;
use commons_api::auth::Role;
use commons_api::content::ContentModule;
use serde_json::json;

use common::{principal_with, request, seed_post, test_app, token_for};

#[tokio::test]
async fn toggling_twice_restores_the_counter() {
    let app = test_app();
    let author = principal_with(vec![Role::Editor]);
    let (slug, _) = seed_post(&app, ContentModule::Article, &author, "Likeable").await;

    let user = principal_with(vec![Role::Member]);
    let token = token_for(&user);
    let uri = format!("/api/articles/{}/interactions", slug);

    let (status, body) =
        request(&app.router, "POST", &uri, Some(&token), Some(json!({"action": "like"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["isNew"], json!(true));
    assert_eq!(body["data"]["item"]["stats"]["likesCount"], json!(1));
    assert_eq!(body["message"], json!("Added"));

    let (status, body) =
        request(&app.router, "POST", &uri, Some(&token), Some(json!({"action": "like"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["isNew"], json!(false));
    assert_eq!(body["data"]["item"]["stats"]["likesCount"], json!(0));
    assert_eq!(body["message"], json!("Removed"));
}

#[tokio::test]
async fn each_kind_keeps_its_own_counter() {
    let app = test_app();
    let author = principal_with(vec![Role::Editor]);
    let (slug, _) = seed_post(&app, ContentModule::Guide, &author, "Multi").await;

    let user = principal_with(vec![Role::Member]);
    let token = token_for(&user);
    let uri = format!("/api/guides/{}/interactions", slug);

    for action in ["like", "bookmark", "helpful", "share"] {
        let (status, body) =
            request(&app.router, "POST", &uri, Some(&token), Some(json!({"action": action}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["isNew"], json!(true));
    }

    let stats = &request(&app.router, "GET", &format!("/api/guides/{}", slug), None, None)
        .await
        .1["data"]["stats"];
    assert_eq!(stats["likesCount"], json!(1));
    assert_eq!(stats["bookmarksCount"], json!(1));
    assert_eq!(stats["helpfulsCount"], json!(1));
    assert_eq!(stats["sharesCount"], json!(1));
}

#[tokio::test]
async fn distinct_users_count_independently() {
    let app = test_app();
    let author = principal_with(vec![Role::Editor]);
    let (slug, _) = seed_post(&app, ContentModule::Article, &author, "Popular").await;
    let uri = format!("/api/articles/{}/interactions", slug);

    for _ in 0..3 {
        let user = principal_with(vec![Role::Member]);
        let token = token_for(&user);
        let (_, body) =
            request(&app.router, "POST", &uri, Some(&token), Some(json!({"action": "helpful"})))
                .await;
        assert_eq!(body["data"]["isNew"], json!(true));
    }

    let (_, body) =
        request(&app.router, "GET", &format!("/api/articles/{}", slug), None, None).await;
    assert_eq!(body["data"]["stats"]["helpfulsCount"], json!(3));
}

#[tokio::test]
async fn anonymous_interaction_is_401() {
    let app = test_app();
    let author = principal_with(vec![Role::Editor]);
    let (slug, _) = seed_post(&app, ContentModule::Article, &author, "Locked").await;

    let (status, _) = request(
        &app.router,
        "POST",
        &format!("/api/articles/{}/interactions", slug),
        None,
        Some(json!({"action": "like"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unknown_action_is_400() {
    let app = test_app();
    let author = principal_with(vec![Role::Editor]);
    let (slug, _) = seed_post(&app, ContentModule::Article, &author, "Strict").await;
    let token = token_for(&principal_with(vec![Role::Member]));

    let (status, body) = request(
        &app.router,
        "POST",
        &format!("/api/articles/{}/interactions", slug),
        Some(&token),
        Some(json!({"action": "view"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]["details"]["action"].is_string());
}

#[tokio::test]
async fn interacting_with_a_missing_item_is_404() {
    let app = test_app();
    let token = token_for(&principal_with(vec![Role::Member]));

    let (status, _) = request(
        &app.router,
        "POST",
        "/api/articles/no-such-post/interactions",
        Some(&token),
        Some(json!({"action": "like"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
