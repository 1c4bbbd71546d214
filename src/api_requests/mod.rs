pub mod openai;
pub mod promptlayer;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::fmt::Display;

#[derive(Debug)]
pub enum ApiError {
    /// The request never produced a response.
    Transport {
        service: &'static str,
        error: reqwest::Error,
    },
    Status {
        service: &'static str,
        status: StatusCode,
        body: String,
    },
    /// 2xx response reporting `success: false`.
    Rejected {
        service: &'static str,
        message: String,
    },
    /// The response did not have the expected shape.
    Shape {
        service: &'static str,
        detail: String,
    },
}

impl Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport { service, error } => write!(f, "{service} request failed: {error}"),
            Self::Status {
                service,
                status,
                body,
            } => write!(f, "{service} error: {status} - {body}"),
            Self::Rejected { service, message } => {
                write!(f, "{service} rejected the request: {message}")
            }
            Self::Shape { service, detail } => {
                write!(f, "Unexpected {service} response: {detail}")
            }
        }
    }
}
impl std::error::Error for ApiError {}

/// Sends a prepared request and decodes a successful JSON body into `T`.
async fn send_json<T: DeserializeOwned>(
    service: &'static str,
    request: reqwest::RequestBuilder,
) -> Result<T, ApiError> {
    let resp = request
        .send()
        .await
        .map_err(|error| ApiError::Transport { service, error })?;

    let status = resp.status();
    let text = resp
        .text()
        .await
        .map_err(|error| ApiError::Transport { service, error })?;
    if !status.is_success() {
        return Err(ApiError::Status {
            service,
            status,
            body: text,
        });
    }

    serde_json::from_str(&text).map_err(|e| ApiError::Shape {
        service,
        detail: e.to_string(),
    })
}

fn join_url(host: &str, path: &str) -> String {
    format!("{}{}", host.trim_end_matches('/'), path)
}

#[test]
fn join_url_strips_trailing_slash() {
    assert_eq!(
        join_url("https://api.promptlayer.com/", "/rest/track-score"),
        "https://api.promptlayer.com/rest/track-score"
    );
}
