//! API fetch engine
//!
//! Pulls records from a paginated API one page at a time, resolving auth
//! per request and honoring the source's rate budget. Records are yielded
//! lazily through [`RecordSource`]; a page is only fetched once the
//! previous page's records have been consumed.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use tributary_core::value::get_path;
use tributary_core::SourceDescriptor;

use crate::auth::AuthResolver;
use crate::error::{Error, Result};
use crate::http::{HttpClient, HttpRequest};
use crate::limiter::RateLimiter;
use crate::pagination::{Advance, PaginationDriver};
use crate::source::RecordSource;

const MAX_FETCH_ATTEMPTS: u32 = 3;
const DEFAULT_COOLDOWN: Duration = Duration::from_secs(60);

/// Streams records out of a paginated API source
pub struct FetchEngine {
    descriptor: SourceDescriptor,
    client: Arc<dyn HttpClient>,
    limiter: Arc<RateLimiter>,
    auth: AuthResolver,
    driver: PaginationDriver,
    buffer: VecDeque<Value>,
    // Cursor URL for the next page; carries its own query parameters.
    url_override: Option<String>,
    exhausted: bool,
}

impl FetchEngine {
    /// Engine for one API source
    pub fn new(
        descriptor: SourceDescriptor,
        client: Arc<dyn HttpClient>,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        let auth = AuthResolver::new(client.clone(), limiter.clone());
        let driver = PaginationDriver::new(descriptor.pagination.clone());
        Self {
            descriptor,
            client,
            limiter,
            auth,
            driver,
            buffer: VecDeque::new(),
            url_override: None,
            exhausted: false,
        }
    }

    async fn build_request(&self) -> Result<HttpRequest> {
        let (url, query) = match &self.url_override {
            Some(url) => (url.clone(), Vec::new()),
            None => {
                let endpoint = self.descriptor.endpoint.as_ref().ok_or_else(|| {
                    Error::Body {
                        message: "api source has no endpoint".to_string(),
                    }
                })?;
                (self.auth.resolve(endpoint).await?, self.driver.params())
            }
        };

        let mut headers = Vec::with_capacity(self.descriptor.headers.len());
        for (name, value) in &self.descriptor.headers {
            headers.push((name.clone(), self.auth.resolve(value).await?));
        }
        let body = match &self.descriptor.body {
            Some(value) => Some(self.auth.resolve(value).await?),
            None => None,
        };

        Ok(HttpRequest {
            method: self.descriptor.method.clone(),
            url,
            headers,
            query,
            body,
        })
    }

    async fn fetch_page(&mut self) -> Result<()> {
        let request = self.build_request().await?;
        let retry_header = &self.descriptor.rate_limit.retry_after_header;

        let mut response = None;
        for attempt in 1..=MAX_FETCH_ATTEMPTS {
            self.limiter.acquire().await;
            let candidate = self.client.execute(&request).await?;

            if candidate.ok() {
                response = Some(candidate);
                break;
            }

            // A retry-after header is an explicit backpressure signal
            // regardless of status; a bare 429 gets the default cooldown.
            if let Some(delay) = candidate.retry_after(retry_header) {
                tracing::warn!(
                    source = %self.descriptor.name,
                    status = candidate.status,
                    delay_secs = delay.as_secs(),
                    attempt,
                    "server asked to back off; cooling down"
                );
                self.limiter.cooldown(delay).await;
                continue;
            }
            if candidate.status == 429 {
                tracing::warn!(
                    source = %self.descriptor.name,
                    delay_secs = DEFAULT_COOLDOWN.as_secs(),
                    attempt,
                    "rate limited; cooling down"
                );
                self.limiter.cooldown(DEFAULT_COOLDOWN).await;
                continue;
            }
            if candidate.status >= 500 {
                tracing::warn!(
                    source = %self.descriptor.name,
                    status = candidate.status,
                    attempt,
                    "transient server error; retrying"
                );
                continue;
            }
            // Client errors are not going to improve on retry.
            return Err(Error::Status {
                status: candidate.status,
                url: request.url,
            });
        }

        let response = response.ok_or_else(|| Error::RetriesExhausted {
            url: request.url.clone(),
            attempts: MAX_FETCH_ATTEMPTS,
        })?;

        let body = response.json()?;
        let records = match &self.descriptor.records_path {
            Some(path) => get_path(&body, path).ok_or_else(|| Error::Body {
                message: format!("records path '{path}' not found in response"),
            })?,
            None => &body,
        };
        let records = records.as_array().ok_or_else(|| Error::Body {
            message: "records are not a JSON array".to_string(),
        })?;

        let batch_len = records.len() as u64;
        self.buffer.extend(records.iter().cloned());

        match self.driver.advance(&body, batch_len) {
            Advance::Done => {
                self.exhausted = true;
                self.url_override = None;
            }
            Advance::NextParams => self.url_override = None,
            Advance::NextUrl(url) => self.url_override = Some(url),
        }
        Ok(())
    }
}

#[async_trait]
impl RecordSource for FetchEngine {
    async fn next_record(&mut self) -> Result<Option<Value>> {
        loop {
            if let Some(record) = self.buffer.pop_front() {
                return Ok(Some(record));
            }
            if self.exhausted {
                return Ok(None);
            }
            self.fetch_page().await?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::Mutex;

    use crate::http::HttpResponse;

    /// Answers requests in order and records them.
    struct SequencedClient {
        responses: Mutex<VecDeque<HttpResponse>>,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl SequencedClient {
        fn new(responses: Vec<HttpResponse>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                requests: Mutex::new(Vec::new()),
            }
        }

        async fn requests(&self) -> Vec<HttpRequest> {
            self.requests.lock().await.clone()
        }
    }

    #[async_trait]
    impl HttpClient for SequencedClient {
        async fn execute(&self, request: &HttpRequest) -> Result<HttpResponse> {
            self.requests.lock().await.push(request.clone());
            self.responses
                .lock()
                .await
                .pop_front()
                .ok_or_else(|| Error::Network {
                    message: "no scripted response left".to_string(),
                })
        }
    }

    fn json_response(value: serde_json::Value) -> HttpResponse {
        HttpResponse {
            status: 200,
            headers: Vec::new(),
            body: value.to_string().into_bytes(),
        }
    }

    fn descriptor(value: serde_json::Value) -> SourceDescriptor {
        let mut descriptor: SourceDescriptor = serde_json::from_value(value).unwrap();
        descriptor.name = "test_api".to_string();
        descriptor
    }

    async fn drain(engine: &mut FetchEngine) -> Vec<Value> {
        let mut records = Vec::new();
        while let Some(record) = engine.next_record().await.unwrap() {
            records.push(record);
        }
        records
    }

    #[tokio::test]
    async fn test_single_page_top_level_array() {
        let client = Arc::new(SequencedClient::new(vec![json_response(json!([
            {"id": 1}, {"id": 2}
        ]))]));
        let mut engine = FetchEngine::new(
            descriptor(json!({
                "endpoint": "https://api.example.com/items",
                "column_map": {"id": "id"}
            })),
            client,
            Arc::new(RateLimiter::new(1000)),
        );
        assert_eq!(drain(&mut engine).await.len(), 2);
    }

    #[tokio::test]
    async fn test_offset_pagination_fetches_all_pages() {
        let page = |ids: &[i64]| {
            json_response(json!({
                "meta": {"total": 5},
                "data": {"items": ids.iter().map(|id| json!({"id": id})).collect::<Vec<_>>()}
            }))
        };
        let client = Arc::new(SequencedClient::new(vec![
            page(&[1, 2]),
            page(&[3, 4]),
            page(&[5]),
        ]));
        let mut engine = FetchEngine::new(
            descriptor(json!({
                "endpoint": "https://api.example.com/items",
                "records_path": "data.items",
                "column_map": {"id": "id"},
                "pagination": {
                    "skip_records_param": "offset",
                    "batch_size": 2,
                    "total_records_key": "meta.total"
                }
            })),
            client.clone(),
            Arc::new(RateLimiter::new(1000)),
        );

        let records = drain(&mut engine).await;
        assert_eq!(records.len(), 5);

        let requests = client.requests().await;
        assert_eq!(requests.len(), 3);
        let offsets: Vec<_> = requests
            .iter()
            .map(|r| r.query.iter().find(|(k, _)| k == "offset").unwrap().1.clone())
            .collect();
        assert_eq!(offsets, vec!["0", "2", "4"]);
    }

    #[tokio::test]
    async fn test_cursor_pagination_follows_next_url() {
        let client = Arc::new(SequencedClient::new(vec![
            json_response(json!({
                "items": [{"id": 1}],
                "links": {"next": "https://api.example.com/items?cursor=x"}
            })),
            json_response(json!({"items": [{"id": 2}], "links": {}})),
        ]));
        let mut engine = FetchEngine::new(
            descriptor(json!({
                "endpoint": "https://api.example.com/items",
                "records_path": "items",
                "column_map": {"id": "id"},
                "pagination": {"next_page_url": "links.next"}
            })),
            client.clone(),
            Arc::new(RateLimiter::new(1000)),
        );

        assert_eq!(drain(&mut engine).await.len(), 2);
        let requests = client.requests().await;
        assert_eq!(requests[1].url, "https://api.example.com/items?cursor=x");
        assert!(requests[1].query.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_request_retries_after_cooldown() {
        let client = Arc::new(SequencedClient::new(vec![
            HttpResponse {
                status: 429,
                headers: vec![("retry-after".to_string(), "7".to_string())],
                body: Vec::new(),
            },
            json_response(json!([{"id": 1}])),
        ]));
        let mut engine = FetchEngine::new(
            descriptor(json!({
                "endpoint": "https://api.example.com/items",
                "column_map": {"id": "id"}
            })),
            client.clone(),
            Arc::new(RateLimiter::new(1000)),
        );

        let start = tokio::time::Instant::now();
        let records = drain(&mut engine).await;
        assert_eq!(records.len(), 1);
        assert!(tokio::time::Instant::now() - start >= Duration::from_secs(7));
        assert_eq!(client.requests().await.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistent_rate_limiting_exhausts_retries() {
        let limited = HttpResponse {
            status: 429,
            headers: vec![("retry-after".to_string(), "1".to_string())],
            body: Vec::new(),
        };
        let client = Arc::new(SequencedClient::new(vec![
            limited.clone(),
            limited.clone(),
            limited,
        ]));
        let mut engine = FetchEngine::new(
            descriptor(json!({
                "endpoint": "https://api.example.com/items",
                "column_map": {"id": "id"}
            })),
            client,
            Arc::new(RateLimiter::new(1000)),
        );

        let result = engine.next_record().await;
        assert!(matches!(result, Err(Error::RetriesExhausted { attempts: 3, .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_on_server_error_is_honored() {
        let client = Arc::new(SequencedClient::new(vec![
            HttpResponse {
                status: 503,
                headers: vec![("retry-after".to_string(), "5".to_string())],
                body: Vec::new(),
            },
            json_response(json!([{"id": 1}])),
        ]));
        let mut engine = FetchEngine::new(
            descriptor(json!({
                "endpoint": "https://api.example.com/items",
                "column_map": {"id": "id"}
            })),
            client.clone(),
            Arc::new(RateLimiter::new(1000)),
        );

        let start = tokio::time::Instant::now();
        let records = drain(&mut engine).await;
        assert_eq!(records.len(), 1);
        assert!(tokio::time::Instant::now() - start >= Duration::from_secs(5));
        assert_eq!(client.requests().await.len(), 2);
    }

    #[tokio::test]
    async fn test_transient_server_error_gets_bounded_retries() {
        let failure = HttpResponse {
            status: 500,
            headers: Vec::new(),
            body: Vec::new(),
        };
        let client = Arc::new(SequencedClient::new(vec![
            failure.clone(),
            failure,
            json_response(json!([{"id": 1}])),
        ]));
        let mut engine = FetchEngine::new(
            descriptor(json!({
                "endpoint": "https://api.example.com/items",
                "column_map": {"id": "id"}
            })),
            client.clone(),
            Arc::new(RateLimiter::new(1000)),
        );
        assert_eq!(drain(&mut engine).await.len(), 1);
        assert_eq!(client.requests().await.len(), 3);
    }

    #[tokio::test]
    async fn test_persistent_server_errors_exhaust_retries() {
        let failure = HttpResponse {
            status: 500,
            headers: Vec::new(),
            body: Vec::new(),
        };
        let client = Arc::new(SequencedClient::new(vec![
            failure.clone(),
            failure.clone(),
            failure,
        ]));
        let mut engine = FetchEngine::new(
            descriptor(json!({
                "endpoint": "https://api.example.com/items",
                "column_map": {"id": "id"}
            })),
            client,
            Arc::new(RateLimiter::new(1000)),
        );
        assert!(matches!(
            engine.next_record().await,
            Err(Error::RetriesExhausted { attempts: 3, .. })
        ));
    }

    #[tokio::test]
    async fn test_client_error_is_fatal_for_the_source() {
        let client = Arc::new(SequencedClient::new(vec![HttpResponse {
            status: 404,
            headers: Vec::new(),
            body: Vec::new(),
        }]));
        let mut engine = FetchEngine::new(
            descriptor(json!({
                "endpoint": "https://api.example.com/items",
                "column_map": {"id": "id"}
            })),
            client,
            Arc::new(RateLimiter::new(1000)),
        );
        assert!(matches!(
            engine.next_record().await,
            Err(Error::Status { status: 404, .. })
        ));
    }

    #[tokio::test]
    async fn test_non_array_records_is_an_error() {
        let client = Arc::new(SequencedClient::new(vec![json_response(json!({
            "items": {"id": 1}
        }))]));
        let mut engine = FetchEngine::new(
            descriptor(json!({
                "endpoint": "https://api.example.com/items",
                "records_path": "items",
                "column_map": {"id": "id"}
            })),
            client,
            Arc::new(RateLimiter::new(1000)),
        );
        assert!(matches!(engine.next_record().await, Err(Error::Body { .. })));
    }
}
