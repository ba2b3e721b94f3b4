//! The producer-facing ingress contract (§6 of the spec): a single
//! operation, `submit_visit`, whose payload is validated here before it
//! ever reaches the queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SchemaError;

/// Raw payload accepted from a producer (the HTTP listener or the
/// native-messaging bridge — both out of scope here, specified only by
/// this shape).
#[derive(Clone, Debug, Deserialize)]
pub struct VisitPayload {
    pub url: String,
    pub page_loaded_at: DateTime<Utc>,
    #[serde(default)]
    pub referrer: Option<String>,
    #[serde(default)]
    pub tab_id: Option<i64>,
    #[serde(default)]
    pub opener_tab_id: Option<i64>,
    pub content: String,
}

impl VisitPayload {
    /// Validates the required fields and decodes `content` into its
    /// canonical UTF-8 text, undoing the optional base64-of-zstd framing.
    ///
    /// Producers are free to send either plain UTF-8 text or
    /// base64-encoded zstd-compressed text; this is the single place that
    /// tells the two apart, so every downstream consumer only ever sees
    /// plain text.
    pub fn validate(self) -> Result<ValidatedVisit, SchemaError> {
        if self.url.trim().is_empty() {
            return Err(SchemaError::MissingField("url"));
        }
        if self.content.is_empty() {
            return Err(SchemaError::MissingField("content"));
        }

        let body = decode_content(&self.content)?;

        Ok(ValidatedVisit {
            url: self.url,
            page_loaded_at: self.page_loaded_at,
            referrer: self.referrer,
            tab_id: self.tab_id,
            opener_tab_id: self.opener_tab_id,
            body,
        })
    }
}

/// A payload that has passed schema validation and content decoding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidatedVisit {
    pub url: String,
    pub page_loaded_at: DateTime<Utc>,
    pub referrer: Option<String>,
    pub tab_id: Option<i64>,
    pub opener_tab_id: Option<i64>,
    pub body: String,
}

/// Attempts base64-of-zstd decoding; falls back to the input as plain
/// UTF-8 text when either step fails, since the spec only makes the
/// compressed framing optional, never mandatory.
fn decode_content(raw: &str) -> Result<String, SchemaError> {
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine as _;

    let Ok(compressed) = BASE64.decode(raw.as_bytes()) else {
        return Ok(raw.to_owned());
    };

    match zstd::stream::decode_all(compressed.as_slice()) {
        Ok(decompressed) => String::from_utf8(decompressed)
            .map_err(|err| SchemaError::InvalidContent(err.to_string())),
        Err(_) => Ok(raw.to_owned()),
    }
}

/// Acknowledgement returned to the producer on acceptance.
#[derive(Clone, Copy, Debug, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SubmitAck {
    Queued { position: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_content_passes_through() {
        let body = decode_content("hello world").unwrap();
        assert_eq!(body, "hello world");
    }

    #[test]
    fn base64_zstd_content_round_trips() {
        use base64::engine::general_purpose::STANDARD as BASE64;
        use base64::Engine as _;

        let compressed = zstd::stream::encode_all("hello compressed".as_bytes(), 0).unwrap();
        let encoded = BASE64.encode(compressed);

        let body = decode_content(&encoded).unwrap();
        assert_eq!(body, "hello compressed");
    }

    #[test]
    fn missing_url_is_a_schema_error() {
        let payload = VisitPayload {
            url: String::new(),
            page_loaded_at: Utc::now(),
            referrer: None,
            tab_id: None,
            opener_tab_id: None,
            content: "hi".to_owned(),
        };
        assert!(matches!(
            payload.validate(),
            Err(SchemaError::MissingField("url"))
        ));
    }
}
