use super::{ApiError, send_json};
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::fmt::Display;

const SERVICE: &str = "PromptLayer";
const API_KEY_HEADER: &str = "X-API-KEY";

/// Opaque id PromptLayer assigns to a logged request. Sent back untouched.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(transparent)]
pub struct RequestId(Value);

impl Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.0 {
            Value::String(id) => write!(f, "{id}"),
            other => write!(f, "{other}"),
        }
    }
}

#[derive(Deserialize, Debug)]
pub struct RunResult {
    pub request_id: RequestId,
    prompt_blueprint: PromptBlueprint,
}

#[derive(Deserialize, Debug)]
struct PromptBlueprint {
    prompt_template: BlueprintTemplate,
}

#[derive(Deserialize, Debug)]
struct BlueprintTemplate {
    messages: Vec<BlueprintMessage>,
}

#[derive(Deserialize, Debug)]
struct BlueprintMessage {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize, Debug)]
struct ContentBlock {
    text: Option<String>,
}

impl RunResult {
    /// Text of the first content block of the last message, i.e. the model's reply.
    pub fn output_text(&self) -> Result<&str, ApiError> {
        let shape = |detail: &str| ApiError::Shape {
            service: SERVICE,
            detail: detail.to_string(),
        };
        self.prompt_blueprint
            .prompt_template
            .messages
            .last()
            .ok_or_else(|| shape("prompt_template has no messages"))?
            .content
            .first()
            .ok_or_else(|| shape("last message has no content"))?
            .text
            .as_deref()
            .ok_or_else(|| shape("last message content has no text"))
    }
}

#[derive(Deserialize, Debug)]
pub struct PromptTemplate {
    /// Keyword arguments ready to send to the provider's API.
    pub llm_kwargs: Value,
}

/// A model call made outside PromptLayer that should be logged there.
pub struct TrackedRequest<'a> {
    pub kwargs: &'a Value,
    pub response: &'a Value,
    pub start_time: f64,
    pub end_time: f64,
    pub tags: &'a [&'a str],
}

#[derive(Deserialize)]
struct TrackResponse {
    success: bool,
    message: Option<String>,
    request_id: Option<RequestId>,
}

impl TrackResponse {
    fn check(self) -> Result<Self, ApiError> {
        if self.success {
            Ok(self)
        } else {
            Err(ApiError::Rejected {
                service: SERVICE,
                message: self.message.unwrap_or_else(|| "unknown error".into()),
            })
        }
    }
}

pub struct PromptLayer {
    client: reqwest::Client,
    host: Url,
    api_key: String,
}

impl PromptLayer {
    pub fn new(client: reqwest::Client, host: Url, api_key: impl Into<String>) -> Self {
        Self {
            client,
            host,
            api_key: api_key.into(),
        }
    }

    /// Appends percent-encoded path segments to the host.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.host.clone();
        // Config only accepts hosts that can be a base.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn post<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        payload: &Value,
    ) -> Result<T, ApiError> {
        let request = self
            .client
            .post(self.endpoint(segments))
            .header(API_KEY_HEADER, &self.api_key)
            .json(payload);
        send_json(SERVICE, request).await
    }

    /// Resolves the named prompt, fills in the variables and runs the model in one call.
    pub async fn run(
        &self,
        prompt_name: &str,
        input_variables: &impl Serialize,
        release_label: Option<&str>,
        tags: &[&str],
    ) -> Result<RunResult, ApiError> {
        let mut payload = json!({
            "input_variables": input_variables,
            "tags": tags,
        });
        if let Some(label) = release_label {
            payload["prompt_release_label"] = json!(label);
        }
        self.post(&["prompt-templates", prompt_name, "run"], &payload).await
    }

    /// Fetches the named template rendered for OpenAI.
    pub async fn get_template(
        &self,
        prompt_name: &str,
        input_variables: &impl Serialize,
        release_label: Option<&str>,
    ) -> Result<PromptTemplate, ApiError> {
        let mut payload = json!({
            "provider": "openai",
            "input_variables": input_variables,
        });
        if let Some(label) = release_label {
            payload["label"] = json!(label);
        }
        self.post(&["prompt-templates", prompt_name], &payload).await
    }

    /// Logs an OpenAI chat completion and returns the id PromptLayer assigned to it.
    pub async fn track_request(&self, request: TrackedRequest<'_>) -> Result<RequestId, ApiError> {
        let payload = json!({
            "function_name": "openai.chat.completions.create",
            "provider_type": "openai",
            "args": [],
            "kwargs": request.kwargs,
            "request_response": request.response,
            "request_start_time": request.start_time,
            "request_end_time": request.end_time,
            "tags": request.tags,
            "return_pl_id": true,
        });
        let response: TrackResponse = self.post(&["track-request"], &payload).await?;
        response.check()?.request_id.ok_or_else(|| ApiError::Shape {
            service: SERVICE,
            detail: "missing request_id".into(),
        })
    }

    /// Associates a logged request with the prompt template and its variables.
    pub async fn track_prompt(
        &self,
        request_id: &RequestId,
        prompt_name: &str,
        input_variables: &impl Serialize,
    ) -> Result<(), ApiError> {
        let payload = json!({
            "request_id": request_id,
            "prompt_name": prompt_name,
            "prompt_input_variables": input_variables,
        });
        let response: TrackResponse = self.post(&["rest", "track-prompt"], &payload).await?;
        response.check().map(|_| ())
    }

    pub async fn track_metadata(
        &self,
        request_id: &RequestId,
        metadata: &BTreeMap<&str, &str>,
    ) -> Result<(), ApiError> {
        let payload = json!({ "request_id": request_id, "metadata": metadata });
        let response: TrackResponse = self.post(&["rest", "track-metadata"], &payload).await?;
        response.check().map(|_| ())
    }

    pub async fn track_score(&self, request_id: &RequestId, score: u8) -> Result<(), ApiError> {
        let payload = json!({ "request_id": request_id, "score": score });
        let response: TrackResponse = self.post(&["rest", "track-score"], &payload).await?;
        response.check().map(|_| ())
    }
}

#[tokio::test]
async fn run_extracts_last_message_text() {
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/prompt-templates/ai-trip-recommender/run"))
        .and(header("X-API-KEY", "pl_key"))
        .and(body_json(json!({
            "input_variables": {"destination": "Lisbon"},
            "tags": ["web-app"],
            "prompt_release_label": "prod",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "request_id": 4242,
            "prompt_blueprint": {"prompt_template": {"messages": [
                {"role": "user", "content": [{"type": "text", "text": "Plan Lisbon"}]},
                {"role": "assistant", "content": [{"type": "text", "text": "Day 1: Alfama"}]},
            ]}},
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = PromptLayer::new(reqwest::Client::new(), server.uri().parse().unwrap(), "pl_key");
    let result = client
        .run(
            "ai-trip-recommender",
            &json!({"destination": "Lisbon"}),
            Some("prod"),
            &["web-app"],
        )
        .await
        .unwrap();
    assert_eq!(result.request_id, RequestId(json!(4242)));
    assert_eq!(result.request_id.to_string(), "4242");
    assert_eq!(result.output_text().unwrap(), "Day 1: Alfama");
}

#[tokio::test]
async fn get_template_omits_missing_label() {
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/prompt-templates/ai-trip-recommender"))
        .and(body_json(json!({
            "provider": "openai",
            "input_variables": {"destination": "Oslo"},
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 7,
            "prompt_name": "ai-trip-recommender",
            "llm_kwargs": {"model": "gpt-4o", "messages": []},
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = PromptLayer::new(reqwest::Client::new(), server.uri().parse().unwrap(), "pl_key");
    let template = client
        .get_template("ai-trip-recommender", &json!({"destination": "Oslo"}), None)
        .await
        .unwrap();
    assert_eq!(template.llm_kwargs["model"], "gpt-4o");
}

#[tokio::test]
async fn tracking_failures_are_reported() {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/track-score"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"success": false, "message": "Invalid score"})),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/track-metadata"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
        .mount(&server)
        .await;

    let client = PromptLayer::new(reqwest::Client::new(), server.uri().parse().unwrap(), "pl_key");
    let id = RequestId(json!("abc"));

    let err = client.track_score(&id, 100).await.unwrap_err();
    assert!(matches!(err, ApiError::Rejected { .. }));
    assert_eq!(err.to_string(), "PromptLayer rejected the request: Invalid score");

    let metadata = BTreeMap::from([("user_id", "guest")]);
    let err = client.track_metadata(&id, &metadata).await.unwrap_err();
    match err {
        ApiError::Status { status, body, .. } => {
            assert_eq!(status, reqwest::StatusCode::UNAUTHORIZED);
            assert_eq!(body, "bad key");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn output_text_requires_messages() {
    let result: RunResult = serde_json::from_value(json!({
        "request_id": "r1",
        "prompt_blueprint": {"prompt_template": {"messages": []}},
    }))
    .unwrap();
    assert!(matches!(result.output_text(), Err(ApiError::Shape { .. })));
}

#[tokio::test]
async fn prompt_names_are_encoded_as_one_segment() {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/prompt-templates/trips%2Fv2%3Fbeta"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"llm_kwargs": {"model": "gpt-4o"}})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let host = format!("{}/", server.uri()).parse().unwrap();
    let client = PromptLayer::new(reqwest::Client::new(), host, "pl_key");
    let template = client
        .get_template("trips/v2?beta", &json!({}), None)
        .await
        .unwrap();
    assert_eq!(template.llm_kwargs["model"], "gpt-4o");
}

#[test]
fn endpoint_keeps_host_path_prefix() {
    let host = "https://proxy.example.com/promptlayer/".parse().unwrap();
    let client = PromptLayer::new(reqwest::Client::new(), host, "pl_key");
    assert_eq!(
        client.endpoint(&["rest", "track-score"]).as_str(),
        "https://proxy.example.com/promptlayer/rest/track-score"
    );
}
