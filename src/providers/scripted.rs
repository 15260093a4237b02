use std::{collections::VecDeque, sync::Mutex};

use async_trait::async_trait;

use crate::{
    providers::LLMProvider,
    types::{ChatMessage, CompletionRequest, CompletionResponse},
    LLMError,
};

/// Replays canned replies in order and keeps every request it was sent.
///
/// A reply of `Err(message)` is returned as a provider error, which lets tests
/// exercise upstream failures without a network.
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    responses: Mutex<VecDeque<Result<String, String>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_responses<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let provider = Self::new();
        for response in responses {
            provider.push_response(response);
        }
        provider
    }

    pub fn push_response(&self, response: impl Into<String>) {
        self.lock_responses().push_back(Ok(response.into()));
    }

    pub fn push_failure(&self, message: impl Into<String>) {
        self.lock_responses().push_back(Err(message.into()));
    }

    /// Requests received so far, in call order.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    fn lock_responses(&self) -> std::sync::MutexGuard<'_, VecDeque<Result<String, String>>> {
        self.responses
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl LLMProvider for ScriptedProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LLMError> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(request);

        match self.lock_responses().pop_front() {
            Some(Ok(response)) => Ok(CompletionResponse {
                message: ChatMessage::assistant(response),
                usage: None,
            }),
            Some(Err(message)) => Err(LLMError::Provider(message)),
            None => Err(LLMError::Provider("no more scripted responses".to_string())),
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replays_in_order_then_runs_dry() {
        let provider = ScriptedProvider::with_responses(["one", "two"]);
        provider.push_failure("quota exceeded");

        let request = CompletionRequest::new("model", vec![ChatMessage::user("hi")]);
        let first = provider.complete(request.clone()).await.unwrap();
        let second = provider.complete(request.clone()).await.unwrap();
        assert_eq!(first.message.text(), Some("one"));
        assert_eq!(second.message.text(), Some("two"));

        let failure = provider.complete(request.clone()).await.unwrap_err();
        assert!(matches!(failure, LLMError::Provider(ref m) if m == "quota exceeded"));

        let exhausted = provider.complete(request).await.unwrap_err();
        assert!(matches!(exhausted, LLMError::Provider(_)));
        assert_eq!(provider.call_count(), 4);
    }
}
