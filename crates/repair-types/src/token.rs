use serde::{Deserialize, Serialize};

/// Token-usage accumulator. `total` always reconciles to `prompt + completion`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt: u64,
    pub completion: u64,
    pub total: u64,
}

impl TokenUsage {
    pub fn accumulate(&mut self, prompt: u64, completion: u64) {
        self.prompt += prompt;
        self.completion += completion;
        self.total = self.prompt + self.completion;
    }

    pub fn is_consistent(&self) -> bool {
        self.total == self.prompt + self.completion
    }
}
