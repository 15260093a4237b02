use std::{collections::HashMap, sync::Arc};

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::Value;
use tower::ServiceExt;
use trendpress::{
    providers::scripted::ScriptedProvider,
    web::{router, AppState, FormDefaults},
    ArticlePipeline, Settings,
};

const RESEARCH: &str = "Trend: vehicle-to-grid charging. Pros: cheaper power. Risks: battery wear.";
const ARTICLE: &str = "Your Car Is About to Become a Power Plant";

fn app_with(provider: Arc<ScriptedProvider>) -> Router {
    let pipeline = ArticlePipeline::new(provider, "test-model");
    router(Arc::new(AppState::new(Arc::new(pipeline), FormDefaults::default())))
}

fn form_post(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/generate")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn json_post(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/articles")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn index_serves_the_form() {
    let app = app_with(Arc::new(ScriptedProvider::new()));

    let response = app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;
    assert!(html.contains(r#"<form method="post" action="/generate">"#));
    assert!(html.contains(r#"name="topic""#));
    assert!(html.contains("Quick Summary"));
    assert!(!html.contains("Configuration error"));
}

#[tokio::test]
async fn submission_makes_two_ordered_calls_and_renders_article() {
    let provider = Arc::new(ScriptedProvider::with_responses([RESEARCH, ARTICLE]));
    let app = app_with(provider.clone());

    let response = app
        .oneshot(form_post("topic=electric+vehicles&style=technical"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;
    assert!(html.contains(ARTICLE));
    assert!(html.contains("View agent activity log"));
    assert!(html.contains(r#"value="electric vehicles""#));

    let requests = provider.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[0]
        .prompt()
        .unwrap()
        .contains("next big trend in electric vehicles"));
    assert!(requests[1].prompt().unwrap().contains(RESEARCH));
}

fn app_from_settings(
    vars: &[(&str, &str)],
    provider: Arc<ScriptedProvider>,
) -> Router {
    let vars: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let settings = Settings::from_lookup(|key| vars.get(key).cloned());
    let state = AppState::from_settings(settings, |settings| {
        Ok(ArticlePipeline::new(provider, settings.model.clone()))
    });
    router(Arc::new(state))
}

#[tokio::test]
async fn missing_api_key_blocks_every_call() {
    let provider = Arc::new(ScriptedProvider::with_responses([RESEARCH, ARTICLE]));
    let app = app_from_settings(&[], provider.clone());

    let response = app
        .clone()
        .oneshot(form_post("topic=electric+vehicles"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let html = body_text(response).await;
    assert!(html.contains("Configuration error"));
    assert_eq!(html.matches("GROQ_API_KEY").count(), 1);
    assert!(!html.contains("Generation failed"));
    assert!(!html.contains(r#"id="article""#));

    let response = app
        .clone()
        .oneshot(json_post(r#"{"topic":"electric vehicles"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let index = app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert!(body_text(index).await.contains("Configuration error"));
    assert_eq!(provider.call_count(), 0);
}

#[tokio::test]
async fn loaded_settings_drive_the_pipeline_and_form_defaults() {
    let provider = Arc::new(ScriptedProvider::with_responses([RESEARCH, ARTICLE]));
    let app = app_from_settings(
        &[
            ("GROQ_API_KEY", "gsk-test"),
            ("TRENDPRESS_MODEL", "llama-test"),
            ("TRENDPRESS_SEARCH_DEPTH", "7"),
        ],
        provider.clone(),
    );

    let index = app
        .clone()
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let html = body_text(index).await;
    assert!(!html.contains("Configuration error"));
    assert!(html.contains(r#"value="7""#));

    let response = app.oneshot(form_post("topic=batteries")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains(ARTICLE));
    assert_eq!(provider.call_count(), 2);
    assert_eq!(provider.requests()[0].model, "llama-test");
}

#[tokio::test]
async fn unknown_style_renders_the_error_box() {
    let provider = Arc::new(ScriptedProvider::new());
    let app = app_with(provider.clone());

    let response = app
        .oneshot(form_post("topic=drones&style=sonnet"))
        .await
        .unwrap();

    assert!(response.status().is_client_error());
    let html = body_text(response).await;
    assert!(html.contains(r#"id="result-error""#));
    assert!(html.contains("sonnet"));
    assert_eq!(provider.call_count(), 0);
}

#[tokio::test]
async fn malformed_json_gets_the_envelope() {
    let provider = Arc::new(ScriptedProvider::new());
    let app = app_with(provider.clone());

    let response = app
        .clone()
        .oneshot(json_post(r#"{"topic": "#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json: Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(json["success"], false);
    assert!(json["data"].is_null());
    assert!(!json["message"].as_str().unwrap().is_empty());

    let response = app
        .oneshot(json_post(r#"{"topic":"drones","style":"sonnet"}"#))
        .await
        .unwrap();

    assert!(response.status().is_client_error());
    let json: Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(json["success"], false);
    assert!(json["message"].as_str().unwrap().contains("sonnet"));
    assert_eq!(provider.call_count(), 0);
}

#[tokio::test]
async fn upstream_failure_shows_error_instead_of_text() {
    let provider = Arc::new(ScriptedProvider::new());
    provider.push_failure("Rate limit reached for model");
    let app = app_with(provider.clone());

    let response = app.oneshot(form_post("topic=space+mining")).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let html = body_text(response).await;
    assert!(html.contains("Generation failed"));
    assert!(html.contains("Rate limit reached for model"));
    assert!(!html.contains(r#"id="article""#));
    assert_eq!(provider.call_count(), 1);
}

#[tokio::test]
async fn writer_failure_discards_research() {
    let provider = Arc::new(ScriptedProvider::with_responses([RESEARCH]));
    provider.push_failure("service unavailable");
    let app = app_with(provider.clone());

    let response = app.oneshot(form_post("topic=space+mining")).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let html = body_text(response).await;
    assert!(!html.contains(RESEARCH));
    assert_eq!(provider.call_count(), 2);
}

#[tokio::test]
async fn json_api_returns_article_envelope() {
    let provider = Arc::new(ScriptedProvider::with_responses([RESEARCH, ARTICLE]));
    let app = app_with(provider);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/articles")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"topic":"electric vehicles","style":"quick_summary"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json: Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(json["success"], true);
    assert_eq!(json["data"]["topic"], "electric vehicles");
    assert_eq!(json["data"]["style"], "quick_summary");
    assert_eq!(json["data"]["research"], RESEARCH);
    assert_eq!(json["data"]["body"], ARTICLE);
    assert_eq!(json["data"]["steps"].as_array().map(Vec::len), Some(2));
}

#[tokio::test]
async fn json_api_reports_configuration_error() {
    let app = router(Arc::new(AppState::unconfigured(
        "missing API key: set the GROQ_API_KEY environment variable",
    )));

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/articles")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"topic":"x"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let json: Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(json["success"], false);
    assert!(json["data"].is_null());
    assert!(json["message"].as_str().unwrap().contains("GROQ_API_KEY"));
}

#[tokio::test]
async fn health_reports_configuration() {
    let app = app_with(Arc::new(ScriptedProvider::new()));

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json: Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(json["data"]["status"], "ok");
    assert_eq!(json["data"]["configured"], true);
    assert_eq!(json["data"]["search"], false);
}
