//! Executing plans: batches, retries and the session that ties them
//! together

mod executor;
mod report;
mod retry;
mod session;

pub use executor::{BatchExecutor, CommandRunner, DEFAULT_BATCH_SIZE, ExecutorOptions, ProcessRunner};
pub use report::RunResult;
pub use retry::{DEFAULT_SCHEDULE, DelaySchedule, RetryDriver};
pub use session::{SessionConfig, SynchronizationSession};
