use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::{DateTime, Utc};

/// Seconds since the Unix epoch with millisecond precision, as PromptLayer expects.
pub fn epoch_seconds(time: DateTime<Utc>) -> f64 {
    time.timestamp_millis() as f64 / 1000.0
}

/// Returns the request body as text, decoding it first when the Function URL base64-encoded it.
pub fn decode_body(
    body: Option<&str>,
    is_base64_encoded: bool,
) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
    let Some(body) = body else {
        return Ok(String::new());
    };
    if !is_base64_encoded {
        return Ok(body.to_string());
    }
    let bytes = STANDARD.decode(body.trim())?;
    Ok(String::from_utf8(bytes)?)
}

#[test]
fn epoch_seconds_keeps_millis() {
    let time = DateTime::from_timestamp_millis(1_700_000_000_250).unwrap();
    assert_eq!(epoch_seconds(time), 1_700_000_000.25);
}

#[test]
fn decode_plain_and_encoded_bodies() {
    assert_eq!(decode_body(None, true).unwrap(), "");
    assert_eq!(decode_body(Some("{\"a\":1}"), false).unwrap(), "{\"a\":1}");
    let encoded = STANDARD.encode("{\"destination\":\"Rome\"}");
    assert_eq!(
        decode_body(Some(&encoded), true).unwrap(),
        "{\"destination\":\"Rome\"}"
    );
    assert!(decode_body(Some("not base64!"), true).is_err());
}
