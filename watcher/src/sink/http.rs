use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Url;

use super::{Endpoint, RawResponse, SinkError};

/// POSTs to a fixed URL with fixed headers over a shared `reqwest` client.
#[derive(Clone)]
pub struct HttpEndpoint {
    client: reqwest::Client,
    url: Url,
    headers: HeaderMap,
}

impl HttpEndpoint {
    pub fn new(url: &str, query: &[(&str, &str)], timeout: Duration) -> Result<Self, SinkError> {
        let parsed = if query.is_empty() {
            Url::parse(url)
        } else {
            Url::parse_with_params(url, query)
        };
        let url = parsed.map_err(|e| SinkError::Transport(format!("invalid URL {url}: {e}")))?;

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout)
            .build()
            .map_err(|e| SinkError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            url,
            headers: HeaderMap::new(),
        })
    }

    pub fn with_header(mut self, name: &'static str, value: &str) -> Result<Self, SinkError> {
        let value = HeaderValue::from_str(value)
            .map_err(|e| SinkError::Transport(format!("invalid value for header {name}: {e}")))?;
        self.headers.insert(HeaderName::from_static(name), value);
        Ok(self)
    }

    #[cfg(test)]
    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl Endpoint for HttpEndpoint {
    async fn post(&self, body: Bytes, content_type: &'static str) -> Result<RawResponse, SinkError> {
        let response = self
            .client
            .post(self.url.clone())
            .headers(self.headers.clone())
            .header(CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await
            .map_err(|e| SinkError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let content_length = response.content_length();
        let body = response
            .bytes()
            .await
            .map_err(|e| SinkError::Transport(e.to_string()))?;

        Ok(RawResponse {
            status,
            content_type,
            content_length,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_parameters_are_encoded() {
        let endpoint = HttpEndpoint::new(
            "https://example.invalid/vision/v1.0/analyze",
            &[("visualFeatures", "Color,Tags,Description")],
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(
            endpoint.url().as_str(),
            "https://example.invalid/vision/v1.0/analyze?visualFeatures=Color%2CTags%2CDescription"
        );
    }

    #[test]
    fn invalid_url_rejected() {
        assert!(HttpEndpoint::new("not a url", &[], Duration::from_secs(1)).is_err());
    }

    #[test]
    fn invalid_header_value_rejected() {
        let endpoint = HttpEndpoint::new("http://localhost:1/", &[], Duration::from_secs(1)).unwrap();
        assert!(endpoint.with_header("x-api-key", "bad\nvalue").is_err());
    }
}
