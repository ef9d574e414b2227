use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// A single message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    System,
    User,
    Assistant,
}

/// LLM completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl CompletionRequest {
    /// Content of the last user message, if any.
    pub fn last_user_content(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }

    /// Replace the content of the last user message.
    pub fn replace_last_user(&mut self, content: String) {
        if let Some(m) = self.messages.iter_mut().rev().find(|m| m.role == Role::User) {
            m.content = content;
        }
    }
}

/// LLM completion response.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Error type for LLM operations.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("provider unavailable: {0}")]
    Unavailable(String),
    #[error("rate limited")]
    RateLimited,
    #[error("request failed: {0}")]
    RequestFailed(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("provider returned empty content")]
    EmptyResponse,
    #[error("all providers exhausted")]
    AllProvidersExhausted,
}

/// Trait for LLM providers (Gemini, OpenRouter, OpenAI, etc.)
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;

    fn complete(
        &self,
        request: CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<CompletionResponse, LlmError>> + Send + '_>>;
}

/// Mock provider for testing.
/// Returns a fixed response, optionally after a delay, or fails.
/// Clones share the call counter.
#[derive(Debug, Clone)]
pub struct MockProvider {
    label: String,
    response: String,
    delay: Option<Duration>,
    fail: bool,
    calls: Arc<AtomicUsize>,
    last_request: Arc<std::sync::Mutex<Option<CompletionRequest>>>,
}

impl MockProvider {
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            label: "mock".into(),
            response: response.into(),
            delay: None,
            fail: false,
            calls: Arc::new(AtomicUsize::new(0)),
            last_request: Arc::new(std::sync::Mutex::new(None)),
        }
    }

    /// A mock whose every call fails with `RequestFailed`.
    pub fn failing() -> Self {
        Self { fail: true, ..Self::new("") }
    }

    /// Respond only after `delay` has elapsed.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn named(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Number of `complete` calls issued so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The most recent request seen by this mock.
    pub fn last_request(&self) -> Option<CompletionRequest> {
        self.last_request.lock().ok().and_then(|g| g.clone())
    }
}

impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        &self.label
    }

    fn complete(
        &self,
        request: CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<CompletionResponse, LlmError>> + Send + '_>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut slot) = self.last_request.lock() {
            *slot = Some(request);
        }
        let content = self.response.clone();
        let delay = self.delay;
        let fail = self.fail;
        Box::pin(async move {
            if let Some(d) = delay {
                tokio::time::sleep(d).await;
            }
            if fail {
                return Err(LlmError::RequestFailed("mock failure".into()));
            }
            Ok(CompletionResponse {
                content,
                input_tokens: 10,
                output_tokens: 20,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(text: &str) -> CompletionRequest {
        CompletionRequest {
            messages: vec![ChatMessage::system("persona"), ChatMessage::user(text)],
            max_tokens: 100,
            temperature: 0.7,
        }
    }

    #[tokio::test]
    async fn mock_provider_returns_response() {
        let mock = MockProvider::new("hello nadeko");
        let resp = mock.complete(request("hi")).await.unwrap();
        assert_eq!(resp.content, "hello nadeko");
        assert_eq!(mock.calls(), 1);
        assert_eq!(mock.last_request().unwrap().last_user_content(), Some("hi"));
    }

    #[tokio::test]
    async fn failing_mock_errors() {
        let mock = MockProvider::failing();
        assert!(mock.complete(request("hi")).await.is_err());
        assert_eq!(mock.calls(), 1);
    }

    #[tokio::test]
    async fn clones_share_call_counter() {
        let mock = MockProvider::new("x");
        let clone = mock.clone();
        clone.complete(request("a")).await.unwrap();
        assert_eq!(mock.calls(), 1);
    }

    #[test]
    fn replace_last_user_rewrites_only_user_turn() {
        let mut req = request("question");
        req.replace_last_user("augmented question".into());
        assert_eq!(req.messages[0].content, "persona");
        assert_eq!(req.last_user_content(), Some("augmented question"));
    }
}
