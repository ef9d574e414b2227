//! Answer resolution with primary → fallback degradation.
//!
//! The primary provider is search-augmented, remembers recent exchanges and
//! is bounded by a timeout; the fallback is stateless and waits as long as it
//! takes. `resolve` never fails: if both backends give up, the fixed apology
//! is returned.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use nadeko_llm::http::HttpProvider;
use nadeko_llm::search::SerpApiSearch;
use nadeko_llm::{
    CompletionRequest, CompletionResponse, LlmError, LlmProvider, ProviderChain, SearchProvider,
};

use super::persona;
use super::session::{ChatSession, Remembering};
use crate::config::BotCfg;

/// Wraps a provider so every request is grounded by a search lookup first.
/// A failed lookup degrades to a fixed marker instead of failing the call.
pub struct SearchAugmented {
    inner: Arc<dyn LlmProvider>,
    search: Arc<dyn SearchProvider>,
}

impl SearchAugmented {
    pub fn new(inner: Arc<dyn LlmProvider>, search: Arc<dyn SearchProvider>) -> Self {
        Self { inner, search }
    }
}

impl LlmProvider for SearchAugmented {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn complete(
        &self,
        mut request: CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<CompletionResponse, LlmError>> + Send + '_>> {
        Box::pin(async move {
            if let Some(query) = request.last_user_content().map(str::to_owned) {
                let snippet = match self.search.lookup(&query).await {
                    Ok(snippet) => snippet,
                    Err(e) => {
                        let search = self.search.name();
                        tracing::warn!(search, error = %e, "search lookup failed");
                        persona::SEARCH_UNAVAILABLE.to_owned()
                    }
                };
                request.replace_last_user(persona::augment_with_search(&query, &snippet));
            }
            self.inner.complete(request).await
        })
    }
}

/// The generation backends available to the resolver.
#[derive(Default, Clone)]
pub struct Backends {
    pub primary: Option<Arc<dyn LlmProvider>>,
    pub fallback: Option<Arc<dyn LlmProvider>>,
    pub search: Option<Arc<dyn SearchProvider>>,
}

impl Backends {
    /// Build HTTP backends for every provider whose key is configured.
    pub fn from_cfg(cfg: &BotCfg) -> Self {
        let primary = cfg.primary_api_key.clone().map(|key| {
            let base_url = cfg.primary_base_url.clone();
            Arc::new(HttpProvider::new(cfg.primary_model.clone(), key, base_url))
                as Arc<dyn LlmProvider>
        });
        let fallback = cfg.fallback_api_key.clone().map(|key| {
            let base_url = cfg.fallback_base_url.clone();
            Arc::new(HttpProvider::new(cfg.fallback_model.clone(), key, base_url))
                as Arc<dyn LlmProvider>
        });
        let search = cfg
            .search_api_key
            .clone()
            .map(|key| Arc::new(SerpApiSearch::new(key)) as Arc<dyn SearchProvider>);
        Self { primary, fallback, search }
    }
}

/// Exchanges the primary remembers unless configured otherwise.
pub const DEFAULT_MEMORY: usize = 10;

/// Produces displayable text for questions and ambient prompts.
pub struct AnswerResolver {
    /// Remembering, search-augmented primary (bounded) → fallback.
    answer_chain: ProviderChain,
    /// Plain primary (bounded) → fallback, used for ambient participation.
    plain_chain: ProviderChain,
    /// Past mention answers the primary replays. The fallback never sees them.
    session: Arc<ChatSession>,
    max_tokens: u32,
    temperature: f32,
}

impl AnswerResolver {
    pub fn new(backends: Backends, primary_timeout: Duration) -> Self {
        Self::with_memory(backends, primary_timeout, DEFAULT_MEMORY)
    }

    /// Like [`AnswerResolver::new`], keeping up to `exchanges` past answers for the primary.
    pub fn with_memory(backends: Backends, primary_timeout: Duration, exchanges: usize) -> Self {
        let session = Arc::new(ChatSession::new(exchanges));
        let mut answer_chain = ProviderChain::new();
        let mut plain_chain = ProviderChain::new();

        if let Some(primary) = backends.primary {
            let augmented: Arc<dyn LlmProvider> = match backends.search {
                Some(search) => Arc::new(SearchAugmented::new(Arc::clone(&primary), search)),
                None => Arc::clone(&primary),
            };
            let remembering = Arc::new(Remembering::new(augmented, Arc::clone(&session)));
            answer_chain = answer_chain.with(remembering, Some(primary_timeout));
            plain_chain = plain_chain.with(primary, Some(primary_timeout));
        }
        if let Some(fallback) = backends.fallback {
            answer_chain = answer_chain.with(Arc::clone(&fallback), None);
            plain_chain = plain_chain.with(fallback, None);
        }

        Self { answer_chain, plain_chain, session, max_tokens: 512, temperature: 0.7 }
    }

    pub fn from_cfg(cfg: &BotCfg) -> Self {
        Self::with_memory(Backends::from_cfg(cfg), cfg.primary_timeout(), cfg.chat_memory)
            .with_generation(cfg.max_tokens, cfg.temperature)
    }

    pub fn with_generation(mut self, max_tokens: u32, temperature: f32) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }

    /// Provider names in the order they are tried.
    pub fn provider_names(&self) -> Vec<&str> {
        self.answer_chain.names()
    }

    /// Exchanges currently remembered by the primary.
    pub fn remembered(&self) -> usize {
        self.session.len()
    }

    /// Answer a user question. Always returns non-empty text.
    pub async fn resolve(&self, query: &str) -> String {
        let request = persona::build_request(query, self.max_tokens, self.temperature);
        match self.answer_chain.complete(request).await {
            Ok(response) => response.content,
            Err(e) => {
                tracing::warn!(error = %e, "no provider could answer, apologising");
                persona::APOLOGY.to_owned()
            }
        }
    }

    /// Generate from a prebuilt prompt without search. Fails if every provider fails.
    pub async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        let request = persona::build_request(prompt, self.max_tokens, self.temperature);
        self.plain_chain.complete(request).await.map(|r| r.content)
    }
}
