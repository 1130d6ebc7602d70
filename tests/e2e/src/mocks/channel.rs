//! Recording channel adapter and stub skill runner

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use engram_core::{ChannelAdapter, ProviderError, SkillOutcome, SkillRunner};

/// Channel adapter that records every delivery
#[derive(Default)]
pub struct RecordingChannel {
    sent: Mutex<Vec<(String, String)>>,
    pub fail: bool,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    /// Messages delivered so far, as (user_id, text) pairs.
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChannelAdapter for RecordingChannel {
    async fn send_message(&self, user_id: &str, text: &str) -> Result<(), ProviderError> {
        if self.fail {
            return Err(ProviderError::Transport("mock channel down".to_string()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((user_id.to_string(), text.to_string()));
        Ok(())
    }

    async fn send_file(
        &self,
        user_id: &str,
        path: &Path,
        _caption: Option<&str>,
    ) -> Result<(), ProviderError> {
        self.send_message(user_id, &format!("file: {}", path.display()))
            .await
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Skill runner that echoes the goal back
#[derive(Default)]
pub struct StubRunner;

#[async_trait]
impl SkillRunner for StubRunner {
    async fn run(
        &self,
        goal: &str,
        _allowed_tools: Option<&[String]>,
    ) -> Result<SkillOutcome, ProviderError> {
        Ok(SkillOutcome {
            result: format!("completed: {goal}"),
            iterations: 1,
        })
    }
}
