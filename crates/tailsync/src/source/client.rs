//! HTTP client for the hosted event API.

use std::sync::Arc;

use async_trait::async_trait;

use super::error::ApiError;
use super::rate_limit::ApiRateLimiter;
use super::{PageRequest, PageSource};
use crate::entity::chain::Chain;
use crate::http::{GetRequest, HttpTransport, REQUEST_TIMEOUT, ReqwestTransport};
use crate::sync::window::page_query;

/// Upstream API client for one chain.
///
/// Implements [`PageSource`]: one GET per call, rate-limited, with non-2xx
/// responses surfaced as [`ApiError::Upstream`] carrying the upstream body.
#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn HttpTransport>,
    base_url: String,
    api_key: Option<String>,
    rate_limiter: Option<ApiRateLimiter>,
}

impl ApiClient {
    /// Create a client for `chain` with the default reqwest transport.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let limiter = ApiRateLimiter::new(DEFAULT_REQUESTS_PER_SECOND);
    /// let client = ApiClient::new(Chain::Ethereum, Some(api_key), Some(limiter))?;
    /// ```
    pub fn new(
        chain: Chain,
        api_key: Option<String>,
        rate_limiter: Option<ApiRateLimiter>,
    ) -> Result<Self, ApiError> {
        let transport = ReqwestTransport::with_timeout(REQUEST_TIMEOUT)
            .map_err(|e| ApiError::Config(e.to_string()))?;
        Ok(Self::new_with_transport(
            chain.base_url(),
            api_key,
            rate_limiter,
            Arc::new(transport),
        ))
    }

    pub fn new_with_transport(
        base_url: &str,
        api_key: Option<String>,
        rate_limiter: Option<ApiRateLimiter>,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            transport,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
            rate_limiter,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Full URL for a page request.
    pub fn page_url(&self, request: &PageRequest) -> String {
        format!(
            "{}{}?{}",
            self.base_url,
            request.data_type.path(),
            page_query(request)
        )
    }

    async fn wait_for_rate_limit(&self) {
        if let Some(ref limiter) = self.rate_limiter {
            limiter.wait().await;
        }
    }
}

#[async_trait]
impl PageSource for ApiClient {
    async fn fetch_page(&self, request: &PageRequest) -> Result<Vec<u8>, ApiError> {
        self.wait_for_rate_limit().await;

        let url = self.page_url(request);
        tracing::debug!(%url, "Fetching page");

        let response = self
            .transport
            .get(GetRequest {
                url,
                api_key: self.api_key.clone(),
            })
            .await?;

        if !response.is_success() {
            return Err(ApiError::upstream(response.status, &response.body));
        }

        Ok(response.body)
    }
}
