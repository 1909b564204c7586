//! `StubLanguageModelClient` — returns scripted completions in order, for
//! deterministic tests and local runs with no real LLM provider configured.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use repair_types::{EngineError, ErrorKind, TokenUsage};
use serde_json::Value;

use crate::external::{Completion, LanguageModelClient};

pub struct StubLanguageModelClient {
    scripted: Vec<String>,
    next: Mutex<usize>,
}

impl StubLanguageModelClient {
    pub fn new(scripted: Vec<String>) -> Self {
        Self { scripted, next: Mutex::new(0) }
    }

    fn next_completion(&self) -> Result<String, EngineError> {
        let mut next = self.next.lock().expect("stub client mutex poisoned");
        let text = self
            .scripted
            .get(*next)
            .cloned()
            .ok_or_else(|| EngineError::new(ErrorKind::Internal, "stub_exhausted", "stub language model has no more scripted completions"))?;
        *next += 1;
        Ok(text)
    }
}

#[async_trait]
impl LanguageModelClient for StubLanguageModelClient {
    async fn complete(&self, prompt: &str) -> Result<Completion, EngineError> {
        let text = self.next_completion()?;
        let mut token_usage = TokenUsage::default();
        token_usage.accumulate(prompt.len() as u64, text.len() as u64);
        Ok(Completion { text, token_usage })
    }

    async fn complete_with_filesystem_tools(&self, prompt: &str, _base_directory: &Path) -> Result<Completion, EngineError> {
        self.complete(prompt).await
    }

    async fn complete_with_format(&self, template: &str, _args: &Value) -> Result<Completion, EngineError> {
        self.complete(template).await
    }
}
