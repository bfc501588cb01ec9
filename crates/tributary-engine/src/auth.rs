//! Auth resolution
//!
//! Descriptor fields that carry credentials resolve in one of two ways:
//! plain strings get `env[NAME]` substitution, and chains concatenate
//! literal fragments with tokens fetched from nested requests. A chain's
//! sub-request endpoint and headers are themselves resolvable, so chains
//! nest; a depth limit turns accidental cycles into a clean error instead
//! of a hang.
//!
//! Tokens are resolved fresh for every request that needs them. Sources
//! rarely make enough auth calls for caching to matter, and a stale token
//! mid-run is a much worse failure mode.

use std::sync::Arc;

use futures::future::BoxFuture;

use tributary_core::descriptor::{AuthPart, AuthValue, SubRequest};
use tributary_core::value::{get_path, value_to_token};

use crate::error::{Error, Result};
use crate::http::{substitute_env, HttpClient, HttpRequest};
use crate::limiter::RateLimiter;

const MAX_DEPTH: usize = 8;

/// Resolves [`AuthValue`]s to concrete strings
pub struct AuthResolver {
    client: Arc<dyn HttpClient>,
    limiter: Arc<RateLimiter>,
}

impl AuthResolver {
    /// Resolver issuing sub-requests through the given client and limiter.
    ///
    /// Sub-requests count against the same budget as data requests; a token
    /// endpoint on the same provider is still a request to that provider.
    pub fn new(client: Arc<dyn HttpClient>, limiter: Arc<RateLimiter>) -> Self {
        Self { client, limiter }
    }

    /// Resolve a value to its final string
    pub async fn resolve(&self, value: &AuthValue) -> Result<String> {
        self.resolve_at(value, 0).await
    }

    fn resolve_at<'a>(&'a self, value: &'a AuthValue, depth: usize) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            if depth > MAX_DEPTH {
                return Err(Error::AuthCycle { depth: MAX_DEPTH });
            }
            match value {
                AuthValue::Literal(text) => substitute_env(text),
                AuthValue::Chain(parts) => {
                    let mut resolved = String::new();
                    for part in parts {
                        match part {
                            AuthPart::Literal(text) => resolved.push_str(&substitute_env(text)?),
                            AuthPart::Request(request) => {
                                resolved.push_str(&self.fetch_token(request, depth + 1).await?)
                            }
                        }
                    }
                    Ok(resolved)
                }
            }
        })
    }

    async fn fetch_token(&self, request: &SubRequest, depth: usize) -> Result<String> {
        let url = self.resolve_at(&request.endpoint, depth).await?;

        let mut headers = Vec::with_capacity(request.headers.len());
        for (name, value) in &request.headers {
            headers.push((name.clone(), self.resolve_at(value, depth).await?));
        }
        let body = match &request.body {
            Some(value) => Some(self.resolve_at(value, depth).await?),
            None => None,
        };

        self.limiter.acquire().await;
        let response = self
            .client
            .execute(&HttpRequest {
                method: request.method.clone(),
                url: url.clone(),
                headers,
                query: Vec::new(),
                body,
            })
            .await?;

        if !response.ok() {
            return Err(Error::Status {
                status: response.status,
                url,
            });
        }

        match &request.token_key {
            // No token_key: the whole body is the token.
            None => Ok(response.text().trim().to_string()),
            Some(path) => {
                let doc = response.json()?;
                let token = get_path(&doc, path).ok_or_else(|| Error::TokenKey {
                    path: path.clone(),
                })?;
                Ok(value_to_token(token))
            }
        }
    }
}
