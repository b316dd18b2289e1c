//! Text translation via the public Google Translate endpoint

use async_trait::async_trait;

use super::Translator;
use crate::error::ServiceError;
use crate::language::LanguageCode;

const DEFAULT_BASE_URL: &str = "https://translate.googleapis.com";

/// Translates text through Google's `translate_a/single` endpoint
pub struct GoogleTranslator {
    client: reqwest::Client,
    base_url: String,
}

impl GoogleTranslator {
    /// Create a translator pointing at the public endpoint
    #[must_use]
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Create a translator pointing at another host (for tests and proxies)
    #[must_use]
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

impl Default for GoogleTranslator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Translator for GoogleTranslator {
    async fn translate(
        &self,
        text: &str,
        source: LanguageCode,
        target: LanguageCode,
    ) -> Result<String, ServiceError> {
        let url = format!("{}/translate_a/single", self.base_url);

        let response = self
            .client
            .post(&url)
            .query(&[
                ("client", "gtx"),
                ("sl", source.code()),
                ("tl", target.code()),
                ("dt", "t"),
                ("ie", "UTF-8"),
                ("oe", "UTF-8"),
            ])
            .form(&[("q", text)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::from_status(status.as_u16(), &body));
        }

        let body: serde_json::Value = response.json().await?;
        parse_translation(&body)
    }

    fn name(&self) -> &'static str {
        "google-translate"
    }
}

/// Join the translated segments of a `translate_a/single` response.
///
/// The payload is a nested array whose first element lists
/// `[translated, original, ...]` tuples, one per sentence.
fn parse_translation(body: &serde_json::Value) -> Result<String, ServiceError> {
    let segments = body
        .get(0)
        .and_then(serde_json::Value::as_array)
        .ok_or_else(|| ServiceError::Unavailable("unexpected translation payload".to_string()))?;

    let translated: String = segments
        .iter()
        .filter_map(|segment| segment.get(0).and_then(serde_json::Value::as_str))
        .collect();

    Ok(translated)
}
