//! Web search used to ground answers before generation.

use serde::Deserialize;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Maximum number of organic results folded into one snippet.
const MAX_RESULTS: usize = 3;

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("search request failed: {0}")]
    RequestFailed(String),
    #[error("search returned no results")]
    NoResults,
}

/// Trait for text search backends.
pub trait SearchProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Look up `query`, returning a plain-text snippet.
    fn lookup<'a>(
        &'a self,
        query: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, SearchError>> + Send + 'a>>;
}

#[derive(Deserialize)]
struct SerpResponse {
    #[serde(default)]
    answer_box: Option<SerpAnswerBox>,
    #[serde(default)]
    organic_results: Vec<SerpOrganic>,
}

#[derive(Deserialize)]
struct SerpAnswerBox {
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    snippet: Option<String>,
}

#[derive(Deserialize)]
struct SerpOrganic {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    snippet: Option<String>,
}

/// SerpAPI-backed Google search.
pub struct SerpApiSearch {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl SerpApiSearch {
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: "https://serpapi.com/search.json".into(),
        }
    }

    async fn fetch(&self, query: &str) -> Result<String, SearchError> {
        let resp = self
            .client
            .get(&self.base_url)
            .query(&[("q", query), ("api_key", self.api_key.as_str()), ("hl", "ja")])
            .send()
            .await
            .map_err(|e| SearchError::RequestFailed(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(SearchError::RequestFailed(resp.status().to_string()));
        }

        let body: SerpResponse = resp
            .json()
            .await
            .map_err(|e| SearchError::RequestFailed(e.to_string()))?;
        summarize(body)
    }
}

impl SearchProvider for SerpApiSearch {
    fn name(&self) -> &str {
        "serpapi"
    }

    fn lookup<'a>(
        &'a self,
        query: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, SearchError>> + Send + 'a>> {
        Box::pin(self.fetch(query))
    }
}

/// Fold a SerpAPI response into one snippet: answer box first, then top results.
fn summarize(body: SerpResponse) -> Result<String, SearchError> {
    let mut lines = Vec::new();
    if let Some(answer) = body.answer_box.and_then(|b| b.answer.or(b.snippet)) {
        lines.push(answer);
    }
    for result in body.organic_results.into_iter().take(MAX_RESULTS) {
        match (result.title, result.snippet) {
            (Some(title), Some(snippet)) => lines.push(format!("{title}: {snippet}")),
            (None, Some(snippet)) => lines.push(snippet),
            _ => {}
        }
    }

    if lines.is_empty() {
        Err(SearchError::NoResults)
    } else {
        Ok(lines.join("\n"))
    }
}

/// Mock search for testing. `None` makes every lookup fail.
#[derive(Debug, Clone)]
pub struct MockSearch {
    snippet: Option<String>,
    calls: Arc<AtomicUsize>,
}

impl MockSearch {
    pub fn new(snippet: impl Into<String>) -> Self {
        Self { snippet: Some(snippet.into()), calls: Arc::new(AtomicUsize::new(0)) }
    }

    pub fn failing() -> Self {
        Self { snippet: None, calls: Arc::new(AtomicUsize::new(0)) }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SearchProvider for MockSearch {
    fn name(&self) -> &str {
        "mock-search"
    }

    fn lookup<'a>(
        &'a self,
        _query: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, SearchError>> + Send + 'a>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let result = self
            .snippet
            .clone()
            .ok_or_else(|| SearchError::RequestFailed("mock failure".into()));
        Box::pin(async move { result })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> SerpResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn answer_box_comes_first() {
        let body = parse(
            r#"{
                "answer_box": {"answer": "東京"},
                "organic_results": [
                    {"title": "首都", "snippet": "日本の首都は東京です"}
                ]
            }"#,
        );
        let text = summarize(body).unwrap();
        assert_eq!(text, "東京\n首都: 日本の首都は東京です");
    }

    #[test]
    fn caps_organic_results() {
        let body = parse(
            r#"{"organic_results": [
                {"snippet": "a"}, {"snippet": "b"}, {"snippet": "c"}, {"snippet": "d"}
            ]}"#,
        );
        assert_eq!(summarize(body).unwrap(), "a\nb\nc");
    }

    #[test]
    fn empty_response_is_no_results() {
        let body = parse(r#"{"search_metadata": {"status": "Success"}}"#);
        assert!(matches!(summarize(body), Err(SearchError::NoResults)));
    }

    #[tokio::test]
    async fn mock_search_counts_and_fails() {
        let ok = MockSearch::new("snippet");
        assert_eq!(ok.lookup("q").await.unwrap(), "snippet");
        assert_eq!(ok.calls(), 1);
        assert!(MockSearch::failing().lookup("q").await.is_err());
    }
}
