pub mod error;
pub mod providers;
pub mod types;
pub mod agents;
pub mod sequential;
pub mod search;
pub mod config;
pub mod pipeline;
pub mod web;

pub use error::LLMError;
pub use providers::LLMProvider;
pub use types::{ChatMessage, CompletionRequest, CompletionResponse, MessageRole, TokenUsage};
pub use agents::{Agent, AgentError, AgentTurn, Context};
pub use sequential::{SequentialEvent, SequentialOrchestrator, SequentialRun};
pub use search::{DuckDuckGo, Headline, NewsSearch, SearchError};
pub use config::{ConfigError, ProviderKind, Settings};
pub use pipeline::{
    Article,
    ArticlePipeline,
    ArticleRequest,
    ArticleStyle,
    PipelineError,
    StepLog,
};
