//! Scripted mock language provider
//!
//! Replies from a queue when one is loaded, otherwise with a fixed
//! default. A failing mode exercises the engine's degradation paths.
//! Every request is captured for assertions.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use engram_core::{Completion, CompletionRequest, LanguageProvider, ProviderError};

/// Scripted language provider for tests
#[derive(Default)]
pub struct MockLanguage {
    queue: Mutex<VecDeque<String>>,
    default_reply: Option<String>,
    fail: bool,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockLanguage {
    /// Always replies with `reply`.
    pub fn fixed(reply: &str) -> Self {
        Self {
            default_reply: Some(reply.to_string()),
            ..Default::default()
        }
    }

    /// Replies from `replies` in order, then falls back to the last one.
    pub fn scripted(replies: &[&str]) -> Self {
        Self {
            queue: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            default_reply: replies.last().map(|r| r.to_string()),
            ..Default::default()
        }
    }

    /// Every call fails.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    /// Requests captured so far.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl LanguageProvider for MockLanguage {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, ProviderError> {
        self.requests.lock().unwrap().push(request);
        if self.fail {
            return Err(ProviderError::Transport("mock language down".to_string()));
        }
        let reply = self
            .queue
            .lock()
            .unwrap()
            .pop_front()
            .or_else(|| self.default_reply.clone())
            .ok_or_else(|| ProviderError::Model("mock has no reply loaded".to_string()))?;
        Ok(Completion::from_text(reply))
    }

    fn is_available(&self) -> bool {
        !self.fail
    }
}
