pub mod chain;
pub mod http;
pub mod provider;
pub mod search;

pub use chain::ProviderChain;
pub use provider::{ChatMessage, CompletionRequest, CompletionResponse, LlmError, LlmProvider, Role};
pub use search::{SearchError, SearchProvider};
