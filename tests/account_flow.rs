//! End-to-end account lifecycle: register, activate via the mailed token,
//! log in, and use the catalog.

use std::time::Duration;

use axum::http::StatusCode;
use marquee::config::Config;
use serde_json::json;

mod common;

#[tokio::test]
async fn register_activate_login_and_browse() {
    let mut config = Config::default();
    config.limiter.enabled = false;
    let server = common::start_server(config).await;
    let client = common::client();

    // registration responds 202 before the welcome mail is delivered
    let res = client
        .post(server.url("/v1/users"))
        .json(&json!({
            "name": "Edna Mode",
            "email": "edna@example.com",
            "password": "pa55word123",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["user"]["activated"], false);

    // the welcome mail (with the activation token) goes out in the background
    tokio::time::timeout(Duration::from_secs(2), server.tasks.wait())
        .await
        .expect("welcome mail task should drain");
    let sent = server.mailer.sent();
    assert_eq!(sent.len(), 1);
    let activation_token = sent[0].1.clone();

    // an unactivated account cannot log into the catalog yet: issue an
    // authentication token and watch the activation gate reject it
    let res = client
        .post(server.url("/v1/tokens/authentication"))
        .json(&json!({ "email": "edna@example.com", "password": "pa55word123" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: serde_json::Value = res.json().await.unwrap();
    let early_token = body["authentication_token"]["token"]
        .as_str()
        .unwrap()
        .to_string();

    let res = client
        .get(server.url("/v1/movies"))
        .bearer_auth(&early_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    // activate with the mailed token
    let res = client
        .put(server.url("/v1/users/activated"))
        .json(&json!({ "token": activation_token }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["user"]["activated"], true);

    // the same authentication token now clears all gates (new users get
    // movies:read)
    let res = client
        .get(server.url("/v1/movies"))
        .bearer_auth(&early_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    server.shutdown.trigger();
}

#[tokio::test]
async fn activation_rejects_bad_tokens() {
    let mut config = Config::default();
    config.limiter.enabled = false;
    let server = common::start_server(config).await;
    let client = common::client();

    // syntactically invalid
    let res = client
        .put(server.url("/v1/users/activated"))
        .json(&json!({ "token": "tooshort" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);

    // well-formed but unknown
    let res = client
        .put(server.url("/v1/users/activated"))
        .json(&json!({ "token": "ABCDEFGHIJKLMNOPQRSTUVWXYZ" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);

    server.shutdown.trigger();
}

#[tokio::test]
async fn catalog_crud_with_write_permission() {
    let mut config = Config::default();
    config.limiter.enabled = false;
    let server = common::start_server(config).await;
    let client = common::client();

    let (_, token) = server.store.seed_user(
        "Frank",
        "frank@example.com",
        true,
        &["movies:read", "movies:write"],
    );

    let res = client
        .post(server.url("/v1/movies"))
        .bearer_auth(&token)
        .json(&json!({
            "title": "Moonrise Kingdom",
            "year": 2012,
            "runtime": 94,
            "genres": ["comedy", "drama"],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: serde_json::Value = res.json().await.unwrap();
    let id = body["movie"]["id"].as_i64().unwrap();
    assert_eq!(body["movie"]["version"], 1);

    let res = client
        .patch(server.url(&format!("/v1/movies/{id}")))
        .bearer_auth(&token)
        .json(&json!({ "runtime": 95 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["movie"]["runtime"], 95);
    assert_eq!(body["movie"]["version"], 2);

    let res = client
        .delete(server.url(&format!("/v1/movies/{id}")))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .get(server.url(&format!("/v1/movies/{id}")))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    server.shutdown.trigger();
}

#[tokio::test]
async fn invalid_movie_payload_fails_validation() {
    let mut config = Config::default();
    config.limiter.enabled = false;
    let server = common::start_server(config).await;
    let client = common::client();

    let (_, token) = server
        .store
        .seed_user("Grace", "grace@example.com", true, &["movies:read", "movies:write"]);

    let res = client
        .post(server.url("/v1/movies"))
        .bearer_auth(&token)
        .json(&json!({ "title": "", "year": 1600, "runtime": 0, "genres": [] }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    server.shutdown.trigger();
}
