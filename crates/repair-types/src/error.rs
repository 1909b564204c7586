use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Closed taxonomy every surfaced error is classified under (§7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Execution,
    Network,
    Filesystem,
    Configuration,
    Permission,
    Timeout,
    Resource,
    Auth,
    Internal,
}

impl ErrorKind {
    /// Errors of this kind must be handed to the fix system before they are
    /// allowed to consume a stage's retry budget.
    pub fn consults_fix_system_first(self) -> bool {
        matches!(
            self,
            ErrorKind::Validation
                | ErrorKind::Network
                | ErrorKind::Timeout
                | ErrorKind::Resource
                | ErrorKind::Auth
        )
    }

    /// Errors of this kind short-circuit straight to `on-fail-goto` without
    /// ever being offered to a fix strategy.
    pub fn is_not_auto_fixable(self) -> bool {
        matches!(self, ErrorKind::Configuration | ErrorKind::Permission)
    }

    /// Errors of this kind abort the run outright.
    pub fn is_fatal(self) -> bool {
        matches!(self, ErrorKind::Internal)
    }
}

/// A single closed-taxonomy error: `{kind, code, message, suggestion?,
/// source_location?, cause_chain?}`.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct EngineError {
    pub kind: ErrorKind,
    pub code: String,
    pub message: String,
    pub suggestion: Option<String>,
    pub source_location: Option<String>,
    #[serde(default)]
    pub cause_chain: Vec<String>,
}

impl EngineError {
    pub fn new(kind: ErrorKind, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: code.into(),
            message: message.into(),
            suggestion: None,
            source_location: None,
            cause_chain: Vec::new(),
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn with_source_location(mut self, location: impl Into<String>) -> Self {
        self.source_location = Some(location.into());
        self
    }

    pub fn caused_by(mut self, cause: impl std::fmt::Display) -> Self {
        self.cause_chain.push(cause.to_string());
        self
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, "internal_error", message)
    }

    pub fn validation(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, code, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, "timeout", message)
    }
}
