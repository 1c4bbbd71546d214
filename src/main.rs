mod api_requests;
mod config;
mod constants;
mod function;
mod utils;

use crate::{
    config::Config,
    constants::WELCOME_MESSAGE,
    function::{HandleRequestError, Recommender},
    utils::decode_body,
};
use lambda_runtime::{LambdaEvent, service_fn, tracing};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;

const RECOMMEND_PATHS: [&str; 2] = ["/recommend_trip", "/recommend-trip"];

/// Lambda Function URL request, reduced to the fields the router reads.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct HttpEvent {
    raw_path: String,
    request_context: RequestContext,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    is_base64_encoded: bool,
}

#[derive(Deserialize, Debug)]
struct RequestContext {
    http: HttpDetails,
}

#[derive(Deserialize, Debug)]
struct HttpDetails {
    method: String,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct HttpResponse {
    status_code: u16,
    headers: HashMap<&'static str, &'static str>,
    body: String,
}

impl HttpResponse {
    fn json(status_code: u16, body: Value) -> Self {
        Self {
            status_code,
            headers: HashMap::from([("content-type", "application/json")]),
            body: body.to_string(),
        }
    }

    fn error(status_code: u16, message: impl std::fmt::Display) -> Self {
        Self::json(status_code, json!({ "error": message.to_string() }))
    }
}

async fn recommend(recommender: &Recommender, event: &HttpEvent) -> HttpResponse {
    let result = match decode_body(event.body.as_deref(), event.is_base64_encoded) {
        Ok(body) => recommender.recommend_trip(&body).await,
        Err(e) => Err(HandleRequestError::InvalidEncoding(e.to_string())),
    };
    match result {
        Ok(plan) => HttpResponse::json(
            200,
            json!({ "destination": plan.destination, "trip_plan": plan.trip_plan }),
        ),
        Err(e) => {
            tracing::error!("recommend_trip failed: {e}");
            HttpResponse::error(e.status_code(), e)
        }
    }
}

async fn route(recommender: &Recommender, event: HttpEvent) -> HttpResponse {
    let method = event.request_context.http.method.to_uppercase();
    let path = event.raw_path.as_str();
    match (method.as_str(), path) {
        ("GET", "/") => HttpResponse::json(200, json!({ "message": WELCOME_MESSAGE })),
        ("POST", p) if RECOMMEND_PATHS.contains(&p) => recommend(recommender, &event).await,
        (_, p) if p == "/" || RECOMMEND_PATHS.contains(&p) => {
            HttpResponse::error(405, "Method not allowed")
        }
        _ => HttpResponse::error(404, "Not found"),
    }
}

async fn handler(
    recommender: &Recommender,
    event: LambdaEvent<HttpEvent>,
) -> Result<HttpResponse, lambda_runtime::Error> {
    Ok(route(recommender, event.payload).await)
}

#[tokio::main]
async fn main() -> Result<(), lambda_runtime::Error> {
    dotenv::dotenv().ok();
    tracing::init_default_subscriber();

    let config = Config::from_env()?;
    tracing::info!(
        strategy = config.strategy.name(),
        validation = ?config.validation,
        analytics = ?config.analytics,
        "starting trip recommender"
    );
    let recommender = Arc::new(Recommender::new(config));

    lambda_runtime::run(service_fn(move |event: LambdaEvent<HttpEvent>| {
        let recommender = Arc::clone(&recommender);
        async move { handler(&recommender, event).await }
    }))
    .await
}

#[cfg(test)]
fn event(method: &str, path: &str, body: Option<&str>) -> HttpEvent {
    serde_json::from_value(json!({
        "version": "2.0",
        "rawPath": path,
        "rawQueryString": "",
        "requestContext": {"http": {"method": method, "path": path}},
        "body": body,
        "isBase64Encoded": false,
    }))
    .unwrap()
}

#[cfg(test)]
fn test_recommender(host: &str, validation: config::RequestValidation) -> Recommender {
    let mut config = config::test_config(host, config::PromptStrategy::ManagedRun);
    config.validation = validation;
    Recommender::new(config)
}

#[tokio::test]
async fn home_returns_welcome_message() {
    let recommender = test_recommender("http://127.0.0.1:9", config::RequestValidation::Defaults);
    for body in [None, Some("{\"destination\": \"Paris\"}"), Some("garbage")] {
        let response = route(&recommender, event("GET", "/", body)).await;
        assert_eq!(response.status_code, 200);
        let body: Value = serde_json::from_str(&response.body).unwrap();
        assert_eq!(body, json!({"message": "Welcome to the AI Trip Recommender API!"}));
    }
}

#[tokio::test]
async fn unknown_routes_and_methods() {
    let recommender = test_recommender("http://127.0.0.1:9", config::RequestValidation::Defaults);
    let response = route(&recommender, event("GET", "/recommend_trip", None)).await;
    assert_eq!(response.status_code, 405);
    let response = route(&recommender, event("POST", "/plans", None)).await;
    assert_eq!(response.status_code, 404);
    assert_eq!(response.body, r#"{"error":"Not found"}"#);
}

#[tokio::test]
async fn missing_parameters_are_rejected_before_any_remote_call() {
    use wiremock::{Mock, MockServer, ResponseTemplate, matchers::any};

    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let recommender = test_recommender(&server.uri(), config::RequestValidation::Required);
    for path in RECOMMEND_PATHS {
        let response = route(
            &recommender,
            event("POST", path, Some(r#"{"destination": "Paris"}"#)),
        )
        .await;
        assert_eq!(response.status_code, 400);
        assert_eq!(response.body, r#"{"error":"Missing required parameters"}"#);
    }
}

#[tokio::test]
async fn recommend_trip_responds_with_plan() {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/prompt-templates/ai-trip-recommender/run"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "request_id": 12,
            "prompt_blueprint": {"prompt_template": {"messages": [
                {"role": "assistant", "content": [{"type": "text", "text": "Day 1: Sagrada Familia, Barcelona"}]},
            ]}},
        })))
        .expect(1)
        .mount(&server)
        .await;
    for endpoint in ["/rest/track-prompt", "/rest/track-metadata", "/rest/track-score"] {
        Mock::given(method("POST"))
            .and(path(endpoint))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
            .expect(1)
            .mount(&server)
            .await;
    }

    let recommender = test_recommender(&server.uri(), config::RequestValidation::Required);
    let mut request = event("POST", "/recommend_trip", None);
    request.body = Some(STANDARD.encode(r#"{"destination": "Barcelona", "duration": "4 days"}"#));
    request.is_base64_encoded = true;

    let response = route(&recommender, request).await;
    assert_eq!(response.status_code, 200);
    assert_eq!(response.headers["content-type"], "application/json");
    let body: Value = serde_json::from_str(&response.body).unwrap();
    assert_eq!(
        body,
        json!({"destination": "Barcelona", "trip_plan": "Day 1: Sagrada Familia, Barcelona"})
    );
}

#[tokio::test]
async fn upstream_failure_surfaces_error_message() {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/prompt-templates/ai-trip-recommender/run"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Invalid API key"))
        .mount(&server)
        .await;

    let recommender = test_recommender(&server.uri(), config::RequestValidation::Defaults);
    let response = route(&recommender, event("POST", "/recommend-trip", Some("{}"))).await;
    assert_eq!(response.status_code, 502);
    let body: Value = serde_json::from_str(&response.body).unwrap();
    assert_eq!(body["error"], "PromptLayer error: 401 Unauthorized - Invalid API key");
}
