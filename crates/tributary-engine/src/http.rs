//! HTTP transport seam
//!
//! The engine talks to the network through the [`HttpClient`] trait so the
//! fetch, auth, and pagination layers can be exercised against mock servers
//! or scripted clients. [`ReqwestClient`] is the production implementation.
//!
//! A non-success status is not an error at this layer; the caller decides
//! whether a 429 means cooldown or a 500 means give up.

use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::error::{Error, Result};

static ENV_PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"env\[([^\]]+)\]").expect("valid env placeholder regex"));

/// Replace every `env[NAME]` placeholder with the variable's value.
///
/// An unset variable is an error: a request sent with a half-substituted
/// credential would fail in a far less obvious way.
pub fn substitute_env(input: &str) -> Result<String> {
    let mut output = String::with_capacity(input.len());
    let mut last = 0;
    for captures in ENV_PLACEHOLDER.captures_iter(input) {
        let whole = captures.get(0).expect("capture 0 always present");
        let name = &captures[1];
        let value = std::env::var(name).map_err(|_| Error::MissingEnv {
            name: name.to_string(),
        })?;
        output.push_str(&input[last..whole.start()]);
        output.push_str(&value);
        last = whole.end();
    }
    output.push_str(&input[last..]);
    Ok(output)
}

/// One outgoing request
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// HTTP method
    pub method: String,
    /// Request URL (may already carry query parameters)
    pub url: String,
    /// Request headers
    pub headers: Vec<(String, String)>,
    /// Extra query parameters merged into the URL
    pub query: Vec<(String, String)>,
    /// Request body
    pub body: Option<String>,
}

impl HttpRequest {
    /// A parameterless GET
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: "GET".to_string(),
            url: url.into(),
            headers: Vec::new(),
            query: Vec::new(),
            body: None,
        }
    }
}

/// One response, body buffered
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,
    /// Response headers
    pub headers: Vec<(String, String)>,
    /// Raw body bytes
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Whether the status is in the 2xx range
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// First header with the given name, case-insensitive
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Server-signaled retry delay from the named header, whole seconds
    pub fn retry_after(&self, header: &str) -> Option<Duration> {
        self.header(header)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
    }

    /// Body as UTF-8 text (lossy)
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Body parsed as JSON
    pub fn json(&self) -> Result<Value> {
        serde_json::from_slice(&self.body).map_err(|err| Error::Body {
            message: format!("invalid JSON: {err}"),
        })
    }
}

/// Transport abstraction over HTTP
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Execute a request and buffer the response.
    ///
    /// Fails only on transport problems; status codes come back in the
    /// response for the caller to interpret.
    async fn execute(&self, request: &HttpRequest) -> Result<HttpResponse>;
}

/// Production [`HttpClient`] backed by reqwest
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    /// Build a client with sane connect and request timeouts
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| Error::Network {
                message: err.to_string(),
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn execute(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let mut url = reqwest::Url::parse(&request.url).map_err(|err| Error::InvalidUrl {
            url: request.url.clone(),
            message: err.to_string(),
        })?;
        if !request.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &request.query {
                pairs.append_pair(key, value);
            }
        }

        let method = reqwest::Method::from_bytes(request.method.as_bytes()).map_err(|err| {
            Error::Network {
                message: format!("invalid method '{}': {err}", request.method),
            }
        })?;

        let mut builder = self.client.request(method, url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await.map_err(|err| Error::Network {
            message: err.to_string(),
        })?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|err| Error::Network {
                message: err.to_string(),
            })?
            .to_vec();

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}
