//! Conversation memory for the primary answer provider.
//!
//! Answered mentions are kept as user/assistant turns and replayed ahead of
//! the next question, so follow-ups can refer to earlier answers. Volatile and
//! bounded: only the most recent exchanges survive.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use nadeko_llm::{
    ChatMessage, CompletionRequest, CompletionResponse, LlmError, LlmProvider, Role,
};

/// One answered question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    pub question: String,
    pub answer: String,
}

/// Bounded FIFO of past exchanges shared by every mention.
#[derive(Debug)]
pub struct ChatSession {
    exchanges: Mutex<VecDeque<Exchange>>,
    capacity: usize,
}

impl ChatSession {
    /// `capacity` of 0 disables memory.
    pub fn new(capacity: usize) -> Self {
        Self { exchanges: Mutex::new(VecDeque::with_capacity(capacity)), capacity }
    }

    pub fn len(&self) -> usize {
        self.exchanges.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Oldest first.
    pub fn exchanges(&self) -> Vec<Exchange> {
        self.exchanges.lock().map(|e| e.iter().cloned().collect()).unwrap_or_default()
    }

    pub fn record(&self, question: &str, answer: &str) {
        if self.capacity == 0 {
            return;
        }
        let Ok(mut exchanges) = self.exchanges.lock() else {
            tracing::error!("chat session lock poisoned");
            return;
        };
        if exchanges.len() == self.capacity {
            exchanges.pop_front();
        }
        exchanges.push_back(Exchange {
            question: question.to_owned(),
            answer: answer.to_owned(),
        });
    }

    /// Past exchanges as alternating user/assistant messages.
    fn turns(&self) -> Vec<ChatMessage> {
        self.exchanges()
            .into_iter()
            .flat_map(|e| [ChatMessage::user(e.question), ChatMessage::assistant(e.answer)])
            .collect()
    }
}

/// Wraps a provider so it sees the session history and feeds it.
///
/// History is inserted just before the final user message, and a response is
/// recorded only once the inner provider succeeds with non-empty text. A call
/// dropped by a timeout records nothing.
pub struct Remembering {
    inner: Arc<dyn LlmProvider>,
    session: Arc<ChatSession>,
}

impl Remembering {
    pub fn new(inner: Arc<dyn LlmProvider>, session: Arc<ChatSession>) -> Self {
        Self { inner, session }
    }
}

impl LlmProvider for Remembering {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn complete(
        &self,
        mut request: CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<CompletionResponse, LlmError>> + Send + '_>> {
        Box::pin(async move {
            let question = request.last_user_content().map(str::to_owned);
            if question.is_some() {
                let at = request
                    .messages
                    .iter()
                    .rposition(|m| m.role == Role::User)
                    .unwrap_or(request.messages.len());
                request.messages.splice(at..at, self.session.turns());
            }

            let response = self.inner.complete(request).await?;
            match question {
                Some(q) if !response.content.trim().is_empty() => {
                    self.session.record(&q, &response.content);
                }
                _ => {}
            }
            Ok(response)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nadeko_llm::provider::MockProvider;

    fn request(text: &str) -> CompletionRequest {
        CompletionRequest {
            messages: vec![ChatMessage::system("persona"), ChatMessage::user(text)],
            max_tokens: 100,
            temperature: 0.7,
        }
    }

    #[test]
    fn keeps_most_recent_exchanges() {
        let session = ChatSession::new(2);
        session.record("q1", "a1");
        session.record("q2", "a2");
        session.record("q3", "a3");
        let questions: Vec<String> = session.exchanges().into_iter().map(|e| e.question).collect();
        assert_eq!(questions, ["q2", "q3"]);
    }

    #[test]
    fn zero_capacity_remembers_nothing() {
        let session = ChatSession::new(0);
        session.record("q", "a");
        assert!(session.is_empty());
    }

    #[tokio::test]
    async fn second_request_carries_first_exchange() {
        let mock = MockProvider::new("answer");
        let session = Arc::new(ChatSession::new(5));
        let provider = Remembering::new(Arc::new(mock.clone()), Arc::clone(&session));

        provider.complete(request("first")).await.unwrap();
        provider.complete(request("second")).await.unwrap();

        let sent = mock.last_request().unwrap();
        let roles: Vec<Role> = sent.messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, [Role::System, Role::User, Role::Assistant, Role::User]);
        assert_eq!(sent.messages[1].content, "first");
        assert_eq!(sent.messages[2].content, "answer");
        assert_eq!(sent.last_user_content(), Some("second"));
        assert_eq!(session.len(), 2);
    }

    #[tokio::test]
    async fn failures_are_not_remembered() {
        let session = Arc::new(ChatSession::new(5));
        let provider = Remembering::new(Arc::new(MockProvider::failing()), Arc::clone(&session));
        assert!(provider.complete(request("q")).await.is_err());

        let blank = Remembering::new(Arc::new(MockProvider::new("  ")), Arc::clone(&session));
        blank.complete(request("q")).await.unwrap();
        assert!(session.is_empty());
    }
}
