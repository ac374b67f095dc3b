use std::time::Duration;

use bytes::Bytes;
use scene_watch_common::config::CaptioningConfig;
use serde::Deserialize;
use tracing::debug;

use super::{Endpoint, HttpEndpoint, Reply, RetryPolicy, RetryingClient, SinkError};

/// What the captioning service made of a picture.
#[derive(Debug, Clone, PartialEq)]
pub struct Caption {
    pub text: String,
    pub confidence: f64,
    pub tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct AnalyzeResponse {
    description: Description,
}

#[derive(Debug, Deserialize)]
struct Description {
    #[serde(default)]
    captions: Vec<CaptionEntry>,
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct CaptionEntry {
    text: String,
    confidence: f64,
}

/// Image analysis client: JPEG in, caption and tags out.
pub struct CaptionClient<E> {
    client: RetryingClient<E>,
}

impl CaptionClient<HttpEndpoint> {
    pub fn from_config(config: &CaptioningConfig, policy: RetryPolicy) -> Result<Self, SinkError> {
        let endpoint = HttpEndpoint::new(
            &config.endpoint,
            &[("visualFeatures", config.features.as_str())],
            Duration::from_secs(config.timeout_secs),
        )?
        .with_header("ocp-apim-subscription-key", &config.api_key)?;
        Ok(Self::new(endpoint, policy))
    }
}

impl<E: Endpoint> CaptionClient<E> {
    pub fn new(endpoint: E, policy: RetryPolicy) -> Self {
        Self {
            client: RetryingClient::new("captioning", endpoint, policy),
        }
    }

    pub async fn describe(&self, jpeg: Bytes) -> Result<Caption, SinkError> {
        let bytes = jpeg.len();
        let value = match self.client.call(jpeg, "application/octet-stream").await? {
            Reply::Json(value) => value,
            other => {
                return Err(SinkError::Malformed(format!(
                    "expected JSON analysis, got {}",
                    other.describe()
                )))
            }
        };
        let caption = parse_analysis(value)?;
        debug!(bytes, caption = caption.text, confidence = caption.confidence, "picture captioned");
        Ok(caption)
    }
}

fn parse_analysis(value: serde_json::Value) -> Result<Caption, SinkError> {
    let parsed: AnalyzeResponse = serde_json::from_value(value)
        .map_err(|e| SinkError::Malformed(format!("unexpected analysis shape: {e}")))?;
    let first = parsed
        .description
        .captions
        .into_iter()
        .next()
        .ok_or_else(|| SinkError::Malformed("analysis contains no captions".into()))?;
    Ok(Caption {
        text: first.text,
        confidence: first.confidence,
        tags: parsed.description.tags,
    })
}
