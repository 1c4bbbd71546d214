use crate::{
    api_requests::{
        ApiError,
        openai::OpenAi,
        promptlayer::{PromptLayer, RequestId, TrackedRequest},
    },
    config::{AnalyticsPolicy, Config, PromptStrategy, RequestValidation},
    constants::{
        DEFAULT_DESTINATION, DEFAULT_DURATION, DEFAULT_PREFERENCES, DEFAULT_USER_ID, FULL_SCORE,
        MISSING_PARAMETERS, PARTIAL_SCORE, REQUEST_TAGS,
    },
    utils::epoch_seconds,
};
use lambda_runtime::tracing;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;

#[derive(Deserialize, Debug, Default)]
pub struct TripRequest {
    pub destination: Option<String>,
    pub duration: Option<String>,
    pub preferences: Option<String>,
    pub user_id: Option<String>,
}

/// Values substituted into the prompt template.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct TemplateVariables {
    pub destination: String,
    pub duration: String,
    pub preferences: String,
}

#[derive(Serialize, Debug, PartialEq)]
pub struct TripPlan {
    pub destination: String,
    pub trip_plan: String,
}

#[derive(Debug)]
pub enum HandleRequestError {
    MissingParameters,
    InvalidFormat(serde_json::Error),
    InvalidEncoding(String),
    Upstream(ApiError),
    ResponseShape(ApiError),
}

impl HandleRequestError {
    pub fn status_code(&self) -> u16 {
        match self {
            Self::MissingParameters | Self::InvalidFormat(_) | Self::InvalidEncoding(_) => 400,
            Self::Upstream(_) => 502,
            Self::ResponseShape(_) => 500,
        }
    }
}

impl Display for HandleRequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingParameters => write!(f, "{MISSING_PARAMETERS}"),
            Self::InvalidFormat(e) => write!(f, "Invalid request format: {e}"),
            Self::InvalidEncoding(e) => write!(f, "Invalid request body: {e}"),
            Self::Upstream(e) | Self::ResponseShape(e) => write!(f, "{e}"),
        }
    }
}
impl std::error::Error for HandleRequestError {}

impl From<ApiError> for HandleRequestError {
    fn from(error: ApiError) -> Self {
        match error {
            ApiError::Shape { .. } => Self::ResponseShape(error),
            _ => Self::Upstream(error),
        }
    }
}

/// Inputs after defaults and validation have been applied.
#[derive(Debug, PartialEq)]
pub struct TripInputs {
    pub variables: TemplateVariables,
    pub user_id: String,
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

impl TripRequest {
    pub fn parse(body: &str) -> Result<Self, HandleRequestError> {
        if body.trim().is_empty() {
            return Ok(Self::default());
        }
        // Must be an object; the derived impl also accepts positional arrays.
        let fields: serde_json::Map<String, serde_json::Value> =
            serde_json::from_str(body).map_err(HandleRequestError::InvalidFormat)?;
        serde_json::from_value(serde_json::Value::Object(fields))
            .map_err(HandleRequestError::InvalidFormat)
    }

    pub fn resolve(self, validation: RequestValidation) -> Result<TripInputs, HandleRequestError> {
        let (destination, duration) = match validation {
            RequestValidation::Defaults => (
                self.destination.unwrap_or_else(|| DEFAULT_DESTINATION.to_string()),
                self.duration.unwrap_or_else(|| DEFAULT_DURATION.to_string()),
            ),
            RequestValidation::Required => {
                match (present(self.destination), present(self.duration)) {
                    (Some(destination), Some(duration)) => (destination, duration),
                    _ => return Err(HandleRequestError::MissingParameters),
                }
            }
        };
        Ok(TripInputs {
            variables: TemplateVariables {
                destination,
                duration,
                preferences: self
                    .preferences
                    .unwrap_or_else(|| DEFAULT_PREFERENCES.to_string()),
            },
            user_id: self.user_id.unwrap_or_else(|| DEFAULT_USER_ID.to_string()),
        })
    }
}

pub fn quality_score(destination: &str, trip_plan: &str) -> u8 {
    if trip_plan.contains(destination) {
        FULL_SCORE
    } else {
        PARTIAL_SCORE
    }
}

struct Generation {
    request_id: RequestId,
    trip_plan: String,
}

enum Generator {
    ManagedRun,
    TemplateFetch(OpenAi),
}

/// Application-scoped state shared by every invocation.
pub struct Recommender {
    promptlayer: PromptLayer,
    generator: Generator,
    prompt_name: String,
    release_label: Option<String>,
    validation: RequestValidation,
    analytics: AnalyticsPolicy,
}

impl Recommender {
    pub fn new(config: Config) -> Self {
        let client = reqwest::Client::new();
        let generator = match config.strategy {
            PromptStrategy::ManagedRun => Generator::ManagedRun,
            PromptStrategy::TemplateFetch { openai_api_key } => Generator::TemplateFetch(
                OpenAi::new(client.clone(), config.openai_host, openai_api_key),
            ),
        };
        Self {
            promptlayer: PromptLayer::new(
                client,
                config.promptlayer_host,
                config.promptlayer_api_key,
            ),
            generator,
            prompt_name: config.prompt_name,
            release_label: config.release_label,
            validation: config.validation,
            analytics: config.analytics,
        }
    }

    pub async fn recommend_trip(&self, body: &str) -> Result<TripPlan, HandleRequestError> {
        let inputs = TripRequest::parse(body)?.resolve(self.validation)?;
        let generation = self.generate(&inputs.variables).await?;
        self.track(&generation, &inputs).await?;
        Ok(TripPlan {
            destination: inputs.variables.destination,
            trip_plan: generation.trip_plan,
        })
    }

    async fn generate(&self, variables: &TemplateVariables) -> Result<Generation, ApiError> {
        let label = self.release_label.as_deref();
        match &self.generator {
            Generator::ManagedRun => {
                tracing::info!(
                    destination = %variables.destination,
                    "running prompt {}", self.prompt_name
                );
                let result = self
                    .promptlayer
                    .run(&self.prompt_name, variables, label, &REQUEST_TAGS)
                    .await?;
                Ok(Generation {
                    trip_plan: result.output_text()?.to_string(),
                    request_id: result.request_id,
                })
            }
            Generator::TemplateFetch(openai) => {
                tracing::info!(
                    destination = %variables.destination,
                    "fetching template {}", self.prompt_name
                );
                let template = self
                    .promptlayer
                    .get_template(&self.prompt_name, variables, label)
                    .await?;
                let start = chrono::Utc::now();
                let completion = openai.chat_completion(&template.llm_kwargs).await?;
                let end = chrono::Utc::now();
                let trip_plan = completion.content()?.to_string();
                let request_id = self
                    .promptlayer
                    .track_request(TrackedRequest {
                        kwargs: &template.llm_kwargs,
                        response: &completion.raw,
                        start_time: epoch_seconds(start),
                        end_time: epoch_seconds(end),
                        tags: &REQUEST_TAGS,
                    })
                    .await?;
                Ok(Generation {
                    request_id,
                    trip_plan,
                })
            }
        }
    }

    async fn track(
        &self,
        generation: &Generation,
        inputs: &TripInputs,
    ) -> Result<(), HandleRequestError> {
        let id = &generation.request_id;
        let variables = &inputs.variables;
        let metadata = BTreeMap::from([
            ("user_id", inputs.user_id.as_str()),
            ("travel_preferences", variables.preferences.as_str()),
        ]);
        let score = quality_score(&variables.destination, &generation.trip_plan);

        let outcome = self
            .promptlayer
            .track_prompt(id, &self.prompt_name, variables)
            .await;
        self.settle("prompt", id, outcome)?;
        let outcome = self.promptlayer.track_metadata(id, &metadata).await;
        self.settle("metadata", id, outcome)?;
        let outcome = self.promptlayer.track_score(id, score).await;
        self.settle("score", id, outcome)?;
        Ok(())
    }

    /// Applies the analytics policy to the outcome of one tracking call.
    fn settle(
        &self,
        kind: &str,
        id: &RequestId,
        outcome: Result<(), ApiError>,
    ) -> Result<(), HandleRequestError> {
        match (outcome, self.analytics) {
            (Ok(()), _) => Ok(()),
            (Err(e), AnalyticsPolicy::Required) => Err(e.into()),
            (Err(e), AnalyticsPolicy::BestEffort) => {
                tracing::warn!(request_id = %id, "tracking {kind} failed: {e}");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use serde_json::{Value, json};
    use wiremock::matchers::{body_json, body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn run_response(request_id: Value, text: &str) -> Value {
        json!({
            "request_id": request_id,
            "prompt_blueprint": {"prompt_template": {"messages": [
                {"role": "system", "content": [{"type": "text", "text": "You are a travel agent."}]},
                {"role": "assistant", "content": [{"type": "text", "text": text}]},
            ]}},
        })
    }

    async fn mount_tracking(server: &MockServer, hits: u64) {
        for endpoint in ["/rest/track-prompt", "/rest/track-metadata", "/rest/track-score"] {
            Mock::given(method("POST"))
                .and(path(endpoint))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
                .expect(hits)
                .mount(server)
                .await;
        }
    }

    fn recommender(server: &MockServer, strategy: PromptStrategy) -> Recommender {
        Recommender::new(test_config(&server.uri(), strategy))
    }

    fn template_fetch() -> PromptStrategy {
        PromptStrategy::TemplateFetch {
            openai_api_key: "sk-test-key".into(),
        }
    }

    /// Serves the template for the default request and returns its `llm_kwargs`.
    async fn mount_template(server: &MockServer) -> Value {
        let llm_kwargs = json!({
            "model": "gpt-4o",
            "messages": [{"role": "user", "content": "Plan 1 week in New York"}],
        });
        Mock::given(method("POST"))
            .and(path("/prompt-templates/ai-trip-recommender"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"llm_kwargs": llm_kwargs.clone()})),
            )
            .expect(1)
            .mount(server)
            .await;
        llm_kwargs
    }

    async fn mount_completion(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "chatcmpl-4",
                "choices": [{"index": 0, "message": {"role": "assistant", "content": "Day 1: SoHo"}}],
            })))
            .expect(1)
            .mount(server)
            .await;
    }

    #[test]
    fn variables_echo_request() {
        let body = r#"{"destination": "Paris", "duration": "3 days", "preferences": "food"}"#;
        let inputs = TripRequest::parse(body)
            .unwrap()
            .resolve(RequestValidation::Defaults)
            .unwrap();
        assert_eq!(
            serde_json::to_value(&inputs.variables).unwrap(),
            json!({"destination": "Paris", "duration": "3 days", "preferences": "food"})
        );
        assert_eq!(inputs.user_id, "guest");
    }

    #[test]
    fn defaults_fill_missing_fields() {
        for body in ["", "{}", r#"{"destination": null}"#] {
            let inputs = TripRequest::parse(body)
                .unwrap()
                .resolve(RequestValidation::Defaults)
                .unwrap();
            assert_eq!(inputs.variables.destination, "New York");
            assert_eq!(inputs.variables.duration, "1 week");
            assert_eq!(inputs.variables.preferences, "adventure, food, sightseeing");
        }
    }

    #[test]
    fn required_validation_rejects_missing_fields() {
        for body in [
            r#"{"duration": "3 days"}"#,
            r#"{"destination": "Rome"}"#,
            r#"{"destination": "", "duration": "3 days"}"#,
        ] {
            let err = TripRequest::parse(body)
                .unwrap()
                .resolve(RequestValidation::Required)
                .unwrap_err();
            assert!(matches!(err, HandleRequestError::MissingParameters));
            assert_eq!(err.status_code(), 400);
            assert_eq!(err.to_string(), "Missing required parameters");
        }

        let body = r#"{"destination": "Rome", "duration": "2 days", "user_id": "u1"}"#;
        let inputs = TripRequest::parse(body)
            .unwrap()
            .resolve(RequestValidation::Required)
            .unwrap();
        assert_eq!(inputs.variables.preferences, "adventure, food, sightseeing");
        assert_eq!(inputs.user_id, "u1");
    }

    #[test]
    fn malformed_json_is_a_client_error() {
        let err = TripRequest::parse("{destination").unwrap_err();
        assert_eq!(err.status_code(), 400);
        let err = TripRequest::parse(r#"{"destination": 12}"#).unwrap_err();
        assert!(matches!(err, HandleRequestError::InvalidFormat(_)));
    }

    #[test]
    fn only_json_objects_are_requests() {
        for body in [r#"["Rome", "2 days", "food", "u1"]"#, r#""Rome""#, "42"] {
            let err = TripRequest::parse(body).unwrap_err();
            assert!(matches!(err, HandleRequestError::InvalidFormat(_)));
            assert_eq!(err.status_code(), 400);
        }
    }

    #[test]
    fn score_rewards_mentioning_destination() {
        assert_eq!(quality_score("Paris", "Day 1: Louvre in Paris"), 100);
        assert_eq!(quality_score("Paris", "Day 1: Louvre"), 50);
        assert_eq!(quality_score("Paris", "day 1 in paris"), 50);
    }

    #[tokio::test]
    async fn managed_run_returns_plan_and_tracks_it() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/prompt-templates/ai-trip-recommender/run"))
            .and(header("X-API-KEY", "pl-test-key"))
            .and(body_json(json!({
                "input_variables": {"destination": "Paris", "duration": "3 days", "preferences": "food"},
                "prompt_release_label": "prod",
                "tags": ["web-app", "lambda-api"],
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(run_response(json!(991), "Day 1: croissants in Paris")),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/rest/track-prompt"))
            .and(body_json(json!({
                "request_id": 991,
                "prompt_name": "ai-trip-recommender",
                "prompt_input_variables": {"destination": "Paris", "duration": "3 days", "preferences": "food"},
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/rest/track-metadata"))
            .and(body_json(json!({
                "request_id": 991,
                "metadata": {"user_id": "traveller-7", "travel_preferences": "food"},
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/rest/track-score"))
            .and(body_json(json!({"request_id": 991, "score": 100})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
            .expect(1)
            .mount(&server)
            .await;

        let body = json!({
            "destination": "Paris",
            "duration": "3 days",
            "preferences": "food",
            "user_id": "traveller-7",
        })
        .to_string();
        let plan = recommender(&server, PromptStrategy::ManagedRun)
            .recommend_trip(&body)
            .await
            .unwrap();
        assert_eq!(
            plan,
            TripPlan {
                destination: "Paris".into(),
                trip_plan: "Day 1: croissants in Paris".into(),
            }
        );
    }

    #[tokio::test]
    async fn template_fetch_calls_openai_and_logs_request() {
        let server = MockServer::start().await;
        let llm_kwargs = json!({
            "model": "gpt-4o",
            "messages": [{"role": "user", "content": "Plan 1 week in New York"}],
        });
        Mock::given(method("POST"))
            .and(path("/prompt-templates/ai-trip-recommender"))
            .and(body_json(json!({
                "provider": "openai",
                "label": "prod",
                "input_variables": {
                    "destination": "New York",
                    "duration": "1 week",
                    "preferences": "adventure, food, sightseeing",
                },
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"llm_kwargs": llm_kwargs.clone()})),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test-key"))
            .and(body_json(llm_kwargs.clone()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "chatcmpl-9",
                "choices": [{"index": 0, "message": {"role": "assistant", "content": "Day 1: Central Park"}}],
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/track-request"))
            .and(body_partial_json(json!({
                "function_name": "openai.chat.completions.create",
                "kwargs": llm_kwargs,
                "request_response": {"id": "chatcmpl-9"},
                "tags": ["web-app", "lambda-api"],
                "return_pl_id": true,
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"success": true, "request_id": "pl-req-1"})),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/rest/track-score"))
            .and(body_json(json!({"request_id": "pl-req-1", "score": 50})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
            .expect(1)
            .mount(&server)
            .await;
        for endpoint in ["/rest/track-prompt", "/rest/track-metadata"] {
            Mock::given(method("POST"))
                .and(path(endpoint))
                .and(body_partial_json(json!({"request_id": "pl-req-1"})))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
                .expect(1)
                .mount(&server)
                .await;
        }

        let plan = recommender(&server, template_fetch())
            .recommend_trip("{}")
            .await
            .unwrap();
        assert_eq!(plan.destination, "New York");
        assert_eq!(plan.trip_plan, "Day 1: Central Park");
    }

    #[tokio::test]
    async fn generation_failure_skips_analytics() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/prompt-templates/ai-trip-recommender/run"))
            .respond_with(ResponseTemplate::new(500).set_body_string("model overloaded"))
            .expect(1)
            .mount(&server)
            .await;
        mount_tracking(&server, 0).await;

        let err = recommender(&server, PromptStrategy::ManagedRun)
            .recommend_trip(r#"{"destination": "Cairo"}"#)
            .await
            .unwrap_err();
        assert!(matches!(err, HandleRequestError::Upstream(_)));
        assert_eq!(err.status_code(), 502);
        assert!(err.to_string().contains("model overloaded"));
    }

    #[tokio::test]
    async fn malformed_run_response_is_a_shape_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/prompt-templates/ai-trip-recommender/run"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "request_id": 5,
                "prompt_blueprint": {"prompt_template": {"messages": [{"content": []}]}},
            })))
            .mount(&server)
            .await;
        mount_tracking(&server, 0).await;

        let err = recommender(&server, PromptStrategy::ManagedRun)
            .recommend_trip("{}")
            .await
            .unwrap_err();
        assert!(matches!(err, HandleRequestError::ResponseShape(_)));
        assert_eq!(err.status_code(), 500);
    }

    #[tokio::test]
    async fn analytics_failure_is_tolerated_when_best_effort() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/prompt-templates/ai-trip-recommender/run"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(run_response(json!(3), "Day 1: Giza")),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/rest/track-prompt"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;
        for endpoint in ["/rest/track-metadata", "/rest/track-score"] {
            Mock::given(method("POST"))
                .and(path(endpoint))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
                .expect(1)
                .mount(&server)
                .await;
        }

        let mut config = test_config(&server.uri(), PromptStrategy::ManagedRun);
        config.analytics = AnalyticsPolicy::BestEffort;
        let plan = Recommender::new(config)
            .recommend_trip(r#"{"destination": "Cairo"}"#)
            .await
            .unwrap();
        assert_eq!(plan.trip_plan, "Day 1: Giza");
    }

    #[tokio::test]
    async fn analytics_failure_fails_request_by_default() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/prompt-templates/ai-trip-recommender/run"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(run_response(json!(3), "Day 1: Giza")),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/rest/track-prompt"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"success": false, "message": "Prompt not found"})),
            )
            .expect(1)
            .mount(&server)
            .await;
        for endpoint in ["/rest/track-metadata", "/rest/track-score"] {
            Mock::given(method("POST"))
                .and(path(endpoint))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
                .expect(0)
                .mount(&server)
                .await;
        }

        let host = server.uri();
        let config = Config::from_lookup(|name| match name {
            "PROMPTLAYER_API_KEY" => Some("pl_default".to_string()),
            "PROMPTLAYER_HOST" => Some(host.clone()),
            _ => None,
        })
        .unwrap();
        let err = Recommender::new(config)
            .recommend_trip(r#"{"destination": "Cairo"}"#)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 502);
        assert_eq!(err.to_string(), "PromptLayer rejected the request: Prompt not found");
    }

    #[tokio::test]
    async fn openai_failure_skips_logging_and_analytics() {
        let server = MockServer::start().await;
        mount_template(&server).await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("Rate limit reached"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/track-request"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        mount_tracking(&server, 0).await;

        let err = recommender(&server, template_fetch())
            .recommend_trip("{}")
            .await
            .unwrap_err();
        assert!(matches!(err, HandleRequestError::Upstream(_)));
        assert_eq!(err.status_code(), 502);
        assert!(err.to_string().starts_with("OpenAI error: 429"));
    }

    #[tokio::test]
    async fn rejected_request_log_skips_analytics() {
        let server = MockServer::start().await;
        mount_template(&server).await;
        mount_completion(&server).await;
        Mock::given(method("POST"))
            .and(path("/track-request"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"success": false, "message": "Invalid kwargs"})),
            )
            .expect(1)
            .mount(&server)
            .await;
        mount_tracking(&server, 0).await;

        let err = recommender(&server, template_fetch())
            .recommend_trip("{}")
            .await
            .unwrap_err();
        assert!(matches!(err, HandleRequestError::Upstream(_)));
        assert_eq!(err.status_code(), 502);
        assert_eq!(err.to_string(), "PromptLayer rejected the request: Invalid kwargs");
    }

    #[tokio::test]
    async fn request_log_without_id_is_a_shape_error() {
        let server = MockServer::start().await;
        mount_template(&server).await;
        mount_completion(&server).await;
        Mock::given(method("POST"))
            .and(path("/track-request"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
            .expect(1)
            .mount(&server)
            .await;
        mount_tracking(&server, 0).await;

        let err = recommender(&server, template_fetch())
            .recommend_trip("{}")
            .await
            .unwrap_err();
        assert!(matches!(err, HandleRequestError::ResponseShape(_)));
        assert_eq!(err.status_code(), 500);
        assert_eq!(err.to_string(), "Unexpected PromptLayer response: missing request_id");
    }
}
