//! Web-search collaborator used for claim verification.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::config::EvalConfig;
use crate::error::ExternalError;
use crate::retry::{retry_with_backoff, RetryPolicy};

/// One web search result.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchHit {
    #[serde(default)]
    pub title: String,
    #[serde(default, alias = "description")]
    pub snippet: String,
    #[serde(default)]
    pub url: String,
}

impl SearchHit {
    /// The text a verification prompt should quote: the snippet, falling
    /// back to the title.
    pub fn evidence(&self) -> &str {
        if self.snippet.is_empty() {
            &self.title
        } else {
            &self.snippet
        }
    }
}

/// Web search over claim search phrases.
#[async_trait]
pub trait SearchClient: Send + Sync {
    async fn search(&self, query: &str, count: usize) -> Result<Vec<SearchHit>, ExternalError>;
}

const BRAVE_WEB_SEARCH_URL: &str = "https://api.search.brave.com/res/v1/web/search";
const CALL_TIMEOUT_SECS: u64 = 10;

#[derive(Deserialize)]
struct BraveWebSection {
    #[serde(default)]
    results: Vec<SearchHit>,
}

#[derive(Deserialize)]
struct BraveResponse {
    web: Option<BraveWebSection>,
}

/// Search client backed by the Brave web-search API.
///
/// A 429 response surfaces as [`ExternalError::QuotaExhausted`], which the
/// claim-verification loop treats as terminal for the remaining claims.
pub struct BraveSearchClient {
    http: reqwest::Client,
    api_key: String,
    retry: RetryPolicy,
}

impl BraveSearchClient {
    pub fn new(config: &EvalConfig) -> Result<Self, ExternalError> {
        if config.search_api_key.is_empty() {
            return Err(ExternalError::Client {
                status: 401,
                message: format!("{} is not set", crate::config::SEARCH_API_KEY_VAR),
            });
        }
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(CALL_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            http,
            api_key: config.search_api_key.clone(),
            retry: config.retry.clone(),
        })
    }

    async fn search_once(
        &self,
        query: &str,
        count: usize,
    ) -> Result<Vec<SearchHit>, ExternalError> {
        let response = self
            .http
            .get(BRAVE_WEB_SEARCH_URL)
            .query(&[("q", query), ("count", &count.to_string())])
            .header("X-Subscription-Token", &self.api_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExternalError::from_status(status.as_u16(), &body));
        }

        let parsed: BraveResponse = response.json().await?;
        let hits = parsed.web.map(|w| w.results).unwrap_or_default();
        debug!(query, hits = hits.len(), "web search completed");
        Ok(hits)
    }
}

#[async_trait]
impl SearchClient for BraveSearchClient {
    async fn search(&self, query: &str, count: usize) -> Result<Vec<SearchHit>, ExternalError> {
        retry_with_backoff(&self.retry, "web_search", || self.search_once(query, count)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn brave_response_shape_parses() {
        let body = r#"{"web": {"results": [
            {"title": "axios-retry", "description": "Retry failed axios requests", "url": "https://example.com"},
            {"title": "bare title only", "url": "https://example.com/2"}
        ]}}"#;
        let parsed: BraveResponse = serde_json::from_str(body).unwrap();
        let hits = parsed.web.unwrap().results;
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].evidence(), "Retry failed axios requests");
        assert_eq!(hits[1].evidence(), "bare title only");
    }

    #[test]
    fn empty_web_section_yields_no_hits() {
        let parsed: BraveResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.web.is_none());
    }
}
