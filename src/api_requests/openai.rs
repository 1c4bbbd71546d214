use super::{ApiError, join_url, send_json};
use reqwest::header::AUTHORIZATION;
use serde_json::Value;

const SERVICE: &str = "OpenAI";

pub struct ChatCompletion {
    /// Full response body, kept for request logging.
    pub raw: Value,
}

impl ChatCompletion {
    pub fn content(&self) -> Result<&str, ApiError> {
        self.raw
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .ok_or_else(|| ApiError::Shape {
                service: SERVICE,
                detail: "choices[0].message.content missing".into(),
            })
    }
}

pub struct OpenAi {
    client: reqwest::Client,
    host: String,
    api_key: String,
}

impl OpenAi {
    pub fn new(
        client: reqwest::Client,
        host: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            client,
            host: host.into(),
            api_key: api_key.into(),
        }
    }

    /// Calls chat completions with keyword arguments prepared by a prompt template.
    pub async fn chat_completion(&self, llm_kwargs: &Value) -> Result<ChatCompletion, ApiError> {
        let request = self
            .client
            .post(join_url(&self.host, "/v1/chat/completions"))
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .json(llm_kwargs);
        let raw = send_json(SERVICE, request).await?;
        Ok(ChatCompletion { raw })
    }
}

#[tokio::test]
async fn chat_completion_returns_first_choice() {
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let kwargs = json!({
        "model": "gpt-4o-mini",
        "messages": [{"role": "user", "content": "Plan 3 days in Kyoto"}],
    });
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk_test"))
        .and(body_json(kwargs.clone()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "Day 1: Fushimi Inari"},
                "finish_reason": "stop",
            }],
        })))
        .expect(1)
        .mount(&server)
        .await;

    let openai = OpenAi::new(reqwest::Client::new(), server.uri(), "sk_test");
    let completion = openai.chat_completion(&kwargs).await.unwrap();
    assert_eq!(completion.content().unwrap(), "Day 1: Fushimi Inari");
    assert_eq!(completion.raw["id"], "chatcmpl-1");
}

#[test]
fn content_requires_a_choice() {
    let completion = ChatCompletion {
        raw: serde_json::json!({"choices": []}),
    };
    assert!(matches!(completion.content(), Err(ApiError::Shape { .. })));
}
