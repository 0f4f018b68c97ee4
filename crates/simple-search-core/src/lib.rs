use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("fetch failed: {0}")]
    Fetch(String),
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FetchRequest {
    pub url: String,
    /// Timeout for a single attempt (connect + body).
    pub timeout_ms: Option<u64>,
    /// Hard cap on bytes read from the response body.
    pub max_bytes: Option<u64>,
    /// Headers to add (invalid names/values are skipped by the backend).
    pub headers: BTreeMap<String, String>,
}

impl FetchRequest {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    pub fn parse_url(&self) -> Result<url::Url> {
        url::Url::parse(&self.url).map_err(|e| Error::InvalidUrl(format!("{}: {e}", self.url)))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchResponse {
    pub url: String,
    pub final_url: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
    pub truncated: bool,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body as text. Invalid UTF-8 sequences are replaced, never fatal.
    pub fn text_lossy(&self) -> String {
        String::from_utf8_lossy(&self.bytes).to_string()
    }
}

#[async_trait::async_trait]
pub trait FetchBackend: Send + Sync {
    async fn fetch(&self, req: &FetchRequest) -> Result<FetchResponse>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// Result envelope of one `search_web` invocation.
///
/// Serialized untagged: either `{query, results, count}` or
/// `{query, error, results: []}`. Build it through [`SearchOutcome::success`]
/// and [`SearchOutcome::failure`] so `count` and the empty failure list hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SearchOutcome {
    Success {
        query: String,
        results: Vec<SearchResult>,
        count: usize,
    },
    Failure {
        query: String,
        error: String,
        results: Vec<SearchResult>,
    },
}

impl SearchOutcome {
    pub fn success(query: impl Into<String>, results: Vec<SearchResult>) -> Self {
        let count = results.len();
        Self::Success {
            query: query.into(),
            results,
            count,
        }
    }

    pub fn failure(query: impl Into<String>, error: impl ToString) -> Self {
        Self::Failure {
            query: query.into(),
            error: error.to_string(),
            results: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn query(&self) -> &str {
        match self {
            Self::Success { query, .. } | Self::Failure { query, .. } => query,
        }
    }

    pub fn results(&self) -> &[SearchResult] {
        match self {
            Self::Success { results, .. } | Self::Failure { results, .. } => results,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { error, .. } => Some(error),
        }
    }
}

#[async_trait::async_trait]
pub trait SearchProvider: Send + Sync {
    fn name(&self) -> &'static str;
    /// Never fails: transport problems come back as [`SearchOutcome::Failure`].
    async fn search(&self, query: &str) -> SearchOutcome;
}
