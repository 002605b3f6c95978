pub(crate) mod job;
mod state;

pub use job::{GenerationJob, JobReport, JobStatus, RetryConfig};
pub use state::{FailureCause, JobOutcome, State, StateMachine, StepOutcome, Transition};
