//! Shared domain types for the container-repair orchestration engine.
//!
//! This crate holds plain data: records and closed enumerations with no
//! async runtime or I/O attached. The engine crate owns behavior; this crate
//! owns shape, so adapters and future transports can depend on the shapes
//! without pulling in the orchestrator itself.

pub mod error;
pub mod job;
pub mod metadata;
pub mod stage;
pub mod token;
pub mod tool;
pub mod workflow;

pub use error::{EngineError, ErrorKind};
pub use job::{Job, JobStatus, JobType};
pub use metadata::MetadataKey;
pub use stage::{StageKind, StageOutcome, StageVisit};
pub use token::TokenUsage;
pub use tool::{ToolCategory, ToolDescriptor};
pub use workflow::{Checkpoint, HistoryEvent, RecoveryStrategy, SessionStatus, WorkflowSession};
