use std::time::Duration;

use bytes::Bytes;
use scene_watch_common::config::TelemetryConfig;
use serde::Serialize;
use tracing::info;

use super::{Endpoint, HttpEndpoint, RawResponse, RetryPolicy, RetryingClient, SinkError};

#[derive(Serialize)]
struct Envelope<'a, T> {
    device_id: &'a str,
    kind: &'a str,
    record: &'a T,
}

/// Stand-in ingestion target that writes each record to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogEndpoint;

impl Endpoint for LogEndpoint {
    async fn post(&self, body: Bytes, _content_type: &'static str) -> Result<RawResponse, SinkError> {
        info!(target: "telemetry", record = %String::from_utf8_lossy(&body), "telemetry record");
        Ok(RawResponse::new(200, None, Bytes::new()))
    }
}

/// Where telemetry goes: a real ingestion URL, or the log when none is configured.
#[derive(Clone)]
pub enum TelemetryTarget {
    Http(HttpEndpoint),
    Log(LogEndpoint),
}

impl Endpoint for TelemetryTarget {
    async fn post(&self, body: Bytes, content_type: &'static str) -> Result<RawResponse, SinkError> {
        match self {
            TelemetryTarget::Http(endpoint) => endpoint.post(body, content_type).await,
            TelemetryTarget::Log(endpoint) => endpoint.post(body, content_type).await,
        }
    }
}

/// Fire-and-forget delivery of normalized records. Only success or failure
/// is observed; response bodies are ignored.
#[derive(Clone)]
pub struct TelemetryClient<E> {
    client: RetryingClient<E>,
    device_id: String,
}

impl TelemetryClient<TelemetryTarget> {
    pub fn from_config(config: &TelemetryConfig, policy: RetryPolicy) -> Result<Self, SinkError> {
        let target = match &config.endpoint {
            Some(url) => {
                let mut endpoint =
                    HttpEndpoint::new(url, &[], Duration::from_secs(config.timeout_secs))?;
                if let Some(key) = &config.api_key {
                    endpoint = endpoint.with_header("authorization", &format!("Bearer {key}"))?;
                }
                TelemetryTarget::Http(endpoint)
            }
            None => TelemetryTarget::Log(LogEndpoint),
        };
        Ok(Self::new(target, config.device_id.clone(), policy))
    }
}

impl<E: Endpoint> TelemetryClient<E> {
    pub fn new(endpoint: E, device_id: String, policy: RetryPolicy) -> Self {
        Self {
            client: RetryingClient::new("telemetry", endpoint, policy),
            device_id,
        }
    }

    #[cfg(test)]
    pub fn endpoint(&self) -> &E {
        self.client.endpoint()
    }

    pub async fn send<T: Serialize + Sync>(&self, kind: &'static str, record: &T) -> Result<(), SinkError> {
        let body = serde_json::to_vec(&Envelope {
            device_id: &self.device_id,
            kind,
            record,
        })
        .map_err(|e| SinkError::Encode(e.to_string()))?;
        self.client.call(Bytes::from(body), "application/json").await?;
        Ok(())
    }
}
