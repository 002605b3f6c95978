use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, sleep, sleep_until, timeout, timeout_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::ReelgenError;
use crate::provider::{ProviderClient, ProviderError, ProviderKind};
use crate::request::GenerationRequest;
use crate::state_machine::{
    FailureCause, GenerationJob, JobOutcome, JobReport, RetryConfig, State, StateMachine,
    StepOutcome, Transition,
};

/// Bytes retrieved for a succeeded job, ready to be staged once.
#[derive(Debug)]
pub struct Artifact {
    pub job_id: String,
    pub bytes: Vec<u8>,
    pub extension: &'static str,
}

/// How long and how often to wait on one provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollPolicy {
    pub poll_interval: Duration,
    /// Upper bound for a single status request; must stay below the interval.
    pub poll_timeout: Duration,
    /// Budget measured from submission until the provider reports a result.
    pub timeout: Duration,
    pub retry: RetryConfig,
}

impl PollPolicy {
    pub fn for_kind(kind: ProviderKind) -> Self {
        let (interval, poll_timeout, timeout) = match kind {
            ProviderKind::VideoEdit => (3, 2, 600),
            ProviderKind::Transition => (5, 4, 600),
            ProviderKind::SoundEffect => (2, 1, 60),
        };
        Self {
            poll_interval: Duration::from_secs(interval),
            poll_timeout: Duration::from_secs(poll_timeout),
            timeout: Duration::from_secs(timeout),
            retry: RetryConfig::default(),
        }
    }
}

/// Receives job lifecycle notifications, e.g. to drive a progress display.
pub trait JobObserver: Send + Sync {
    fn state_changed(&self, _job: &GenerationJob) {}
    fn polled(&self, _job: &GenerationJob) {}
    fn retrying(&self, _job: &GenerationJob, _reason: &ProviderError, _delay: Duration) {}
}

pub struct NoopObserver;

impl JobObserver for NoopObserver {}

/// Terminal result of one orchestrated job.
#[derive(Debug)]
pub enum JobResult {
    Retrieved { job: GenerationJob, artifact: Artifact },
    Failed { job: GenerationJob, error: ReelgenError },
    TimedOut { job: GenerationJob },
    /// Waiting stopped on request; the remote job is abandoned.
    Cancelled { job: GenerationJob },
}

impl JobResult {
    pub fn job(&self) -> &GenerationJob {
        match self {
            JobResult::Retrieved { job, .. }
            | JobResult::Failed { job, .. }
            | JobResult::TimedOut { job }
            | JobResult::Cancelled { job } => job,
        }
    }

    pub fn report(&self) -> JobReport {
        JobReport::from_job(self.job())
    }
}

/// Drives a generation request through submit, poll and fetch.
pub struct JobOrchestrator<P> {
    provider: P,
    policy: PollPolicy,
    observer: Arc<dyn JobObserver>,
}

impl<P: ProviderClient> JobOrchestrator<P> {
    pub fn new(provider: P, policy: PollPolicy) -> Self {
        Self {
            provider,
            policy,
            observer: Arc::new(NoopObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn JobObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Run `request` to a terminal result.
    ///
    /// Submission happens exactly once. Cancellation is checked at every
    /// wait and provider call; once it fires nothing further is fetched.
    pub async fn run(&self, request: GenerationRequest, cancel: &CancellationToken) -> JobResult {
        let mut job = GenerationJob::new(request, self.policy.retry.clone());
        info!(job_id = %job.id, provider = %job.request.provider, "submitting generation job");

        let submitted = tokio::select! {
            biased;
            _ = cancel.cancelled() => return JobResult::Cancelled { job },
            r = self.provider.submit(&job.request) => r,
        };
        let step = match submitted {
            Ok(remote_id) => StepOutcome::Submitted { remote_id },
            Err(err) => StepOutcome::Fault(err),
        };

        let deadline = Instant::now() + self.policy.timeout;
        let mut delay = Duration::ZERO;
        let mut fetched: Option<Vec<u8>> = None;
        let mut reported = job.state;
        let mut transition = StateMachine::next(&mut job, step);

        loop {
            match transition {
                Transition::Next(state) => {
                    if state != reported {
                        info!(job_id = %job.display_id(), %state, "job state changed");
                        self.observer.state_changed(&job);
                        reported = state;
                    }
                    delay = match state {
                        State::Polling => self.policy.poll_interval,
                        _ => Duration::ZERO,
                    };
                }
                Transition::Retry {
                    ref reason,
                    delay: backoff,
                    ..
                } => {
                    warn!(
                        job_id = %job.display_id(),
                        error = %reason,
                        delay_ms = backoff.as_millis() as u64,
                        "retrying provider call"
                    );
                    self.observer.retrying(&job, reason, backoff);
                    delay = backoff;
                }
                Transition::Complete(outcome) => {
                    return self.finish(job, outcome, fetched.take());
                }
            }

            let step = match job.state {
                State::Submitted | State::Polling => {
                    let wake = (Instant::now() + delay).min(deadline);
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return self.cancelled(job),
                        _ = sleep_until(wake) => {}
                    }
                    if Instant::now() >= deadline {
                        StepOutcome::BudgetExceeded
                    } else {
                        let remote_id = job.remote_id.clone().unwrap_or_default();
                        let polled = tokio::select! {
                            biased;
                            _ = cancel.cancelled() => return self.cancelled(job),
                            r = timeout_at(
                                deadline,
                                timeout(self.policy.poll_timeout, self.provider.poll(&remote_id)),
                            ) => r,
                        };
                        match polled {
                            Err(_budget) => StepOutcome::BudgetExceeded,
                            Ok(Err(_slow)) => StepOutcome::Fault(ProviderError::Transport(format!(
                                "status request exceeded {}ms",
                                self.policy.poll_timeout.as_millis()
                            ))),
                            Ok(Ok(Ok(response))) => {
                                debug!(job_id = %remote_id, status = ?response.status, "polled");
                                StepOutcome::Polled(response)
                            }
                            Ok(Ok(Err(err))) => StepOutcome::Fault(err),
                        }
                    }
                }
                State::Completed => {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return self.cancelled(job),
                        _ = sleep(delay) => {}
                    }
                    let url = job.result_url.clone().unwrap_or_default();
                    let result = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return self.cancelled(job),
                        r = self.provider.fetch(&url) => r,
                    };
                    match result {
                        Ok(bytes) => {
                            fetched = Some(bytes);
                            StepOutcome::Fetched
                        }
                        Err(err) => StepOutcome::Fault(err),
                    }
                }
                state => {
                    return self.finish(
                        job,
                        JobOutcome::Failed(FailureCause::UnexpectedStep(format!(
                            "no action in {state}"
                        ))),
                        None,
                    );
                }
            };

            let was_poll = matches!(step, StepOutcome::Polled(_));
            transition = StateMachine::next(&mut job, step);
            if was_poll {
                self.observer.polled(&job);
            }
        }
    }

    fn finish(&self, job: GenerationJob, outcome: JobOutcome, bytes: Option<Vec<u8>>) -> JobResult {
        match outcome {
            JobOutcome::Succeeded => match bytes {
                Some(bytes) => {
                    info!(job_id = %job.display_id(), bytes = bytes.len(), "generation retrieved");
                    JobResult::Retrieved {
                        artifact: Artifact {
                            job_id: job.display_id().to_string(),
                            bytes,
                            extension: job.request.provider.artifact_extension(),
                        },
                        job,
                    }
                }
                None => JobResult::Failed {
                    error: ProviderError::Integrity("no payload retrieved".into()).into(),
                    job,
                },
            },
            JobOutcome::TimedOut => {
                warn!(job_id = %job.display_id(), timeout_secs = self.policy.timeout.as_secs(), "generation timed out");
                JobResult::TimedOut { job }
            }
            JobOutcome::Failed(cause) => {
                warn!(job_id = %job.display_id(), cause = %cause, "generation failed");
                let error = match cause {
                    FailureCause::Provider(err) => ReelgenError::Provider(err),
                    FailureCause::Remote(reason) | FailureCause::UnexpectedStep(reason) => {
                        ReelgenError::GenerationFailed {
                            job_id: job.display_id().to_string(),
                            reason,
                        }
                    }
                };
                JobResult::Failed { job, error }
            }
        }
    }

    fn cancelled(&self, job: GenerationJob) -> JobResult {
        info!(job_id = %job.display_id(), state = %job.state, "generation cancelled; remote job abandoned");
        JobResult::Cancelled { job }
    }
}
