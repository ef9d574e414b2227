//! Ordered provider chain: first success wins.
//!
//! Each link carries an optional bounded wait. When a link times out its
//! future is dropped and its result never observed; the next link runs.

use std::sync::Arc;
use std::time::Duration;

use crate::provider::{CompletionRequest, CompletionResponse, LlmError, LlmProvider};

struct Link {
    provider: Arc<dyn LlmProvider>,
    timeout: Option<Duration>,
}

/// Priority-ordered list of providers with per-link timeouts.
#[derive(Default)]
pub struct ProviderChain {
    links: Vec<Link>,
}

impl ProviderChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a provider. `timeout: None` waits for as long as the provider takes.
    pub fn with(mut self, provider: Arc<dyn LlmProvider>, timeout: Option<Duration>) -> Self {
        self.links.push(Link { provider, timeout });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// Names of the providers in priority order.
    pub fn names(&self) -> Vec<&str> {
        self.links.iter().map(|l| l.provider.name()).collect()
    }

    /// Try each provider in order; return the first non-empty response.
    pub async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, LlmError> {
        for link in &self.links {
            match attempt(link, request.clone()).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    tracing::warn!(
                        provider = link.provider.name(),
                        error = %e,
                        "LLM provider failed, trying next"
                    );
                }
            }
        }

        Err(LlmError::AllProvidersExhausted)
    }
}

async fn attempt(link: &Link, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
    let fut = link.provider.complete(request);
    let response = match link.timeout {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| LlmError::Timeout(limit))??,
        None => fut.await?,
    };

    if response.content.trim().is_empty() {
        return Err(LlmError::EmptyResponse);
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ChatMessage, MockProvider};

    fn request() -> CompletionRequest {
        CompletionRequest {
            messages: vec![ChatMessage::user("test")],
            max_tokens: 50,
            temperature: 0.5,
        }
    }

    #[tokio::test]
    async fn first_success_wins() {
        let first = MockProvider::new("from first");
        let second = MockProvider::new("from second");
        let chain = ProviderChain::new()
            .with(Arc::new(first.clone()), None)
            .with(Arc::new(second.clone()), None);

        let resp = chain.complete(request()).await.unwrap();
        assert_eq!(resp.content, "from first");
        assert_eq!(second.calls(), 0);
    }

    #[tokio::test]
    async fn falls_through_on_failure() {
        let chain = ProviderChain::new()
            .with(Arc::new(MockProvider::failing()), None)
            .with(Arc::new(MockProvider::new("from second")), None);

        let resp = chain.complete(request()).await.unwrap();
        assert_eq!(resp.content, "from second");
    }

    #[tokio::test(start_paused = true)]
    async fn falls_through_on_timeout() {
        let slow = MockProvider::new("too late").with_delay(Duration::from_secs(30));
        let chain = ProviderChain::new()
            .with(Arc::new(slow.clone()), Some(Duration::from_secs(10)))
            .with(Arc::new(MockProvider::new("fallback")), None);

        let resp = chain.complete(request()).await.unwrap();
        assert_eq!(resp.content, "fallback");
        assert_eq!(slow.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unbounded_link_waits() {
        let slow = MockProvider::new("eventually").with_delay(Duration::from_secs(120));
        let chain = ProviderChain::new().with(Arc::new(slow), None);
        let resp = chain.complete(request()).await.unwrap();
        assert_eq!(resp.content, "eventually");
    }

    #[tokio::test]
    async fn empty_content_is_a_failure() {
        let chain = ProviderChain::new()
            .with(Arc::new(MockProvider::new("   ")), None)
            .with(Arc::new(MockProvider::new("real")), None);
        assert_eq!(chain.complete(request()).await.unwrap().content, "real");
    }

    #[tokio::test]
    async fn exhausted_when_all_fail() {
        let chain = ProviderChain::new()
            .with(Arc::new(MockProvider::failing()), None)
            .with(Arc::new(MockProvider::failing()), None);
        let err = chain.complete(request()).await.unwrap_err();
        assert!(matches!(err, LlmError::AllProvidersExhausted));
    }

    #[tokio::test]
    async fn empty_chain_is_exhausted() {
        let chain = ProviderChain::new();
        assert!(chain.is_empty());
        assert!(chain.complete(request()).await.is_err());
    }
}
