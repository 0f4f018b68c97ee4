use crate::extract::{self, ExtractConfig};
use simple_search_core::{
    Error, FetchBackend, FetchRequest, FetchResponse, Result, SearchOutcome, SearchProvider,
};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

pub const DEFAULT_ENDPOINT: &str = "https://html.duckduckgo.com/html/";

/// Some result pages refuse clients that do not look like a desktop browser.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// HTML search endpoint; the query is appended as `q=`.
    pub endpoint: String,
    pub user_agent: String,
    /// Bound on a single fetch attempt.
    pub fetch_timeout: Duration,
    pub max_attempts: usize,
    /// Pause between a failed attempt and the next one.
    pub retry_pause: Duration,
    pub max_results: usize,
    pub max_body_bytes: u64,
    pub extract: ExtractConfig,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            fetch_timeout: Duration::from_secs(15),
            max_attempts: 3,
            retry_pause: Duration::from_secs(1),
            max_results: 10,
            max_body_bytes: 5 * 1024 * 1024,
            extract: ExtractConfig::default(),
        }
    }
}

impl SearchConfig {
    pub fn search_url(&self, query: &str) -> String {
        let encoded: String = url::form_urlencoded::byte_serialize(query.as_bytes()).collect();
        let sep = if self.endpoint.contains('?') { '&' } else { '?' };
        format!("{}{sep}q={encoded}", self.endpoint)
    }
}

/// Keyless web search over the DuckDuckGo HTML endpoint.
#[derive(Debug, Clone)]
pub struct DuckDuckGoSearch<F> {
    fetcher: F,
    config: SearchConfig,
}

impl<F: FetchBackend> DuckDuckGoSearch<F> {
    pub fn new(fetcher: F, config: SearchConfig) -> Self {
        Self { fetcher, config }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    fn request_for(&self, query: &str) -> FetchRequest {
        let mut headers = BTreeMap::new();
        headers.insert("User-Agent".to_string(), self.config.user_agent.clone());
        FetchRequest {
            url: self.config.search_url(query),
            timeout_ms: Some(self.config.fetch_timeout.as_millis() as u64),
            max_bytes: Some(self.config.max_body_bytes),
            headers,
        }
    }

    /// One attempt. Timeouts and non-2xx statuses count as failures.
    async fn fetch_once(&self, req: &FetchRequest) -> Result<FetchResponse> {
        let resp = tokio::time::timeout(self.config.fetch_timeout, self.fetcher.fetch(req))
            .await
            .map_err(|_| {
                Error::Fetch(format!(
                    "timed out after {}ms",
                    self.config.fetch_timeout.as_millis()
                ))
            })??;
        if !resp.is_success() {
            return Err(Error::Fetch(format!("HTTP {}", resp.status)));
        }
        Ok(resp)
    }

    /// Up to `max_attempts` independent attempts with a fixed pause in between.
    /// The last attempt's error is returned when all of them fail.
    pub async fn fetch_with_retry(&self, req: &FetchRequest) -> Result<FetchResponse> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.fetch_once(req).await {
                Ok(resp) => return Ok(resp),
                Err(e) if attempt >= max_attempts => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        attempt,
                        max_attempts,
                        error = %e,
                        "search fetch failed; retrying"
                    );
                    tokio::time::sleep(self.config.retry_pause).await;
                    attempt += 1;
                }
            }
        }
    }

    pub async fn run(&self, query: &str) -> SearchOutcome {
        let t0 = Instant::now();
        let req = self.request_for(query);
        match self.fetch_with_retry(&req).await {
            Ok(resp) => {
                let html = resp.text_lossy();
                let mut results = extract::extract_results(&html, &self.config.extract);
                let found = results.len();
                results.truncate(self.config.max_results);
                tracing::info!(
                    query,
                    found,
                    returned = results.len(),
                    elapsed_ms = t0.elapsed().as_millis() as u64,
                    "search completed"
                );
                SearchOutcome::success(query, results)
            }
            Err(e) => {
                tracing::warn!(query, error = %e, "search failed");
                SearchOutcome::failure(query, format!("Search failed: {e}"))
            }
        }
    }
}

#[async_trait::async_trait]
impl<F: FetchBackend> SearchProvider for DuckDuckGoSearch<F> {
    fn name(&self) -> &'static str {
        "duckduckgo"
    }

    async fn search(&self, query: &str) -> SearchOutcome {
        self.run(query).await
    }
}
