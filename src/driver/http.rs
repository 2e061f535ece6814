//! HTTP driver: stateless request/response cycles against a base endpoint

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;

use super::{Context, Driver, HttpRequest};
use crate::common::{Error, Result};
use crate::observation::{Observation, ResponseSnapshot};

/// Request context of one scenario: a client carrying fixed default headers
#[derive(Debug, Clone)]
pub struct HttpContext {
    client: reqwest::Client,
    default_headers: BTreeMap<String, String>,
}

impl HttpContext {
    pub fn new(default_headers: &BTreeMap<String, String>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        for (name, value) in default_headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| Error::Configuration(format!("Invalid header name '{}': {}", name, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| Error::Configuration(format!("Invalid value for header '{}': {}", name, e)))?;
            headers.insert(name, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Environment(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            default_headers: default_headers.clone(),
        })
    }

    pub fn default_headers(&self) -> &BTreeMap<String, String> {
        &self.default_headers
    }
}

/// Driver issuing requests against `base_url`
#[derive(Debug, Clone)]
pub struct HttpDriver {
    base_url: String,
    timeout: Duration,
}

impl HttpDriver {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            timeout,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Join a request path onto the base endpoint; absolute URLs pass through
    pub fn url_for(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        let base = self.base_url.trim_end_matches('/');
        if path.is_empty() {
            base.to_string()
        } else if path.starts_with('/') || path.starts_with('?') {
            format!("{}{}", base, path)
        } else {
            format!("{}/{}", base, path)
        }
    }
}

#[async_trait]
impl Driver for HttpDriver {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn issue(&self, ctx: &Context, request: &HttpRequest) -> Result<Observation> {
        let http = ctx.as_http()?;
        let url = self.url_for(&request.path);
        let what = format!("{:?} {}", request.method, url);

        let mut builder = http
            .client
            .request(request.method.into(), &url)
            .timeout(self.timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        tracing::debug!(request = %what, "Issuing request");

        let response = builder.send().await.map_err(|e| self.map_error(&what, e))?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let text = response.text().await.map_err(|e| self.map_error(&what, e))?;

        tracing::debug!(request = %what, status, "Response received");

        Ok(Observation::Response(ResponseSnapshot {
            status,
            headers,
            body: parse_body(&text),
        }))
    }
}

impl HttpDriver {
    fn map_error(&self, what: &str, err: reqwest::Error) -> Error {
        if err.is_timeout() {
            Error::timeout(what, self.timeout)
        } else {
            Error::from_http(what, err)
        }
    }
}

/// JSON when it parses, the raw text otherwise, null when empty
fn parse_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}
