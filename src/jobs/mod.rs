//! Component C — Job Executor: a bounded-concurrency worker pool for
//! asynchronous build/validate/push jobs, grounded on `dag/executor.rs`'s
//! `Semaphore` + `mpsc` + `JoinHandle` parallelism pattern and
//! `factory/pipeline.rs`'s `PipelineRunner` cancel/stop idioms.

mod executor;
mod id;

pub use executor::{JobExecutor, JobStats};
pub use id::generate_job_id;
