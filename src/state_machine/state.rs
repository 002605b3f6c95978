use std::fmt;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::job::{GenerationJob, JobStatus};
use crate::provider::{PollResponse, ProviderError, RemoteStatus};

/// Lifecycle stages of a generation job.
///
/// CREATED → SUBMITTED → POLLING* → COMPLETED | FAILED | TIMED_OUT
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum State {
    Created,
    Submitted,
    Polling,
    /// The provider reported success; the result is being fetched.
    Completed,
    Failed,
    TimedOut,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            State::Created => write!(f, "CREATED"),
            State::Submitted => write!(f, "SUBMITTED"),
            State::Polling => write!(f, "POLLING"),
            State::Completed => write!(f, "COMPLETED"),
            State::Failed => write!(f, "FAILED"),
            State::TimedOut => write!(f, "TIMED_OUT"),
        }
    }
}

/// What happened during the last step the orchestrator performed.
#[derive(Debug, Clone)]
pub enum StepOutcome {
    Submitted { remote_id: String },
    Polled(PollResponse),
    Fetched,
    Fault(ProviderError),
    /// The wall-clock budget ran out while waiting on the provider.
    BudgetExceeded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureCause {
    Provider(ProviderError),
    /// The provider ran the job and reported it as failed.
    Remote(String),
    UnexpectedStep(String),
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureCause::Provider(err) => write!(f, "{err}"),
            FailureCause::Remote(reason) => write!(f, "provider reported failure: {reason}"),
            FailureCause::UnexpectedStep(step) => write!(f, "unexpected step: {step}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded,
    Failed(FailureCause),
    TimedOut,
}

/// The result of evaluating a state transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Move to (or stay in) a non-terminal state and continue normally.
    Next(State),
    /// Repeat the last call after `delay`.
    Retry {
        state: State,
        reason: ProviderError,
        delay: Duration,
    },
    /// The job reached a terminal result.
    Complete(JobOutcome),
}

/// Drives a [`GenerationJob`] through its lifecycle.
pub struct StateMachine;

impl StateMachine {
    /// Apply `step` to `job` and return the resulting transition.
    ///
    /// Submit failures are never retried. Poll-time transport failures back
    /// off exponentially until the job's allowance runs out; a successful
    /// poll resets the counter. A corrupt download is re-fetched up to the
    /// integrity allowance. Terminal jobs ignore further steps.
    pub fn next(job: &mut GenerationJob, step: StepOutcome) -> Transition {
        if job.status.is_terminal() {
            return Transition::Complete(match job.status {
                JobStatus::Succeeded => JobOutcome::Succeeded,
                JobStatus::TimedOut => JobOutcome::TimedOut,
                _ => JobOutcome::Failed(FailureCause::Remote(
                    job.failure_reason.clone().unwrap_or_default(),
                )),
            });
        }

        let transition = match (job.state, step) {
            (State::Created, StepOutcome::Submitted { remote_id }) => {
                job.remote_id = Some(remote_id);
                job.submitted_at = Some(Utc::now());
                Transition::Next(State::Submitted)
            }
            (State::Created, StepOutcome::Fault(err)) => {
                Transition::Complete(JobOutcome::Failed(FailureCause::Provider(err)))
            }
            (State::Submitted | State::Polling, StepOutcome::Polled(response)) => {
                Self::handle_poll(job, response)
            }
            (State::Submitted | State::Polling, StepOutcome::Fault(err)) => {
                Self::handle_fault(job, err)
            }
            (State::Submitted | State::Polling, StepOutcome::BudgetExceeded) => {
                Transition::Complete(JobOutcome::TimedOut)
            }
            (State::Completed, StepOutcome::Fetched) => Transition::Complete(JobOutcome::Succeeded),
            (State::Completed, StepOutcome::Fault(ProviderError::Integrity(msg))) => {
                job.integrity_retries += 1;
                if job.integrity_retries <= job.retry_config.max_integrity_retries {
                    Transition::Retry {
                        state: State::Completed,
                        reason: ProviderError::Integrity(msg),
                        delay: Duration::ZERO,
                    }
                } else {
                    Transition::Complete(JobOutcome::Failed(FailureCause::Provider(
                        ProviderError::Integrity(msg),
                    )))
                }
            }
            (State::Completed, StepOutcome::Fault(err)) => Self::handle_fault(job, err),
            (state, step) => Transition::Complete(JobOutcome::Failed(FailureCause::UnexpectedStep(
                format!("{step:?} while {state}"),
            ))),
        };

        Self::apply(job, &transition);
        transition
    }

    fn handle_poll(job: &mut GenerationJob, response: PollResponse) -> Transition {
        job.last_polled_at = Some(Utc::now());
        job.transport_retries = 0;
        job.not_found_count = 0;
        if response.progress.is_some() {
            job.progress = response.progress;
        }

        match response.status {
            RemoteStatus::Pending | RemoteStatus::Running => Transition::Next(State::Polling),
            RemoteStatus::Succeeded => match response.result_url {
                Some(url) => {
                    job.result_url = Some(url);
                    Transition::Next(State::Completed)
                }
                None => Transition::Complete(JobOutcome::Failed(FailureCause::Provider(
                    ProviderError::Integrity("provider reported success without a result url".into()),
                ))),
            },
            RemoteStatus::Failed => Transition::Complete(JobOutcome::Failed(FailureCause::Remote(
                response
                    .error_detail
                    .unwrap_or_else(|| "no reason given".to_string()),
            ))),
        }
    }

    fn handle_fault(job: &mut GenerationJob, err: ProviderError) -> Transition {
        let config = &job.retry_config;
        match err {
            ProviderError::Transport(_) => {
                job.transport_retries += 1;
                if job.transport_retries <= config.max_transport_retries {
                    Transition::Retry {
                        state: job.state,
                        delay: config.delay_for_attempt(job.transport_retries),
                        reason: err,
                    }
                } else {
                    Transition::Complete(JobOutcome::Failed(FailureCause::Provider(err)))
                }
            }
            ProviderError::NotFound(_) if job.state != State::Completed => {
                job.not_found_count += 1;
                if job.not_found_count <= config.max_not_found {
                    Transition::Retry {
                        state: job.state,
                        delay: config.delay_for_attempt(job.not_found_count),
                        reason: err,
                    }
                } else {
                    Transition::Complete(JobOutcome::Failed(FailureCause::Provider(err)))
                }
            }
            other => Transition::Complete(JobOutcome::Failed(FailureCause::Provider(other))),
        }
    }

    fn apply(job: &mut GenerationJob, transition: &Transition) {
        job.updated_at = Utc::now();
        match transition {
            Transition::Next(next) => {
                if *next != job.state {
                    job.state_history.push(job.state);
                    job.state = *next;
                }
                job.status = JobStatus::Running;
            }
            // State stays put; the counter was bumped by the handler.
            Transition::Retry { .. } => {}
            Transition::Complete(outcome) => {
                let (state, status) = match outcome {
                    JobOutcome::Succeeded => (State::Completed, JobStatus::Succeeded),
                    JobOutcome::TimedOut => (State::TimedOut, JobStatus::TimedOut),
                    JobOutcome::Failed(cause) => {
                        job.failure_reason = Some(cause.to_string());
                        (State::Failed, JobStatus::Failed)
                    }
                };
                if state != job.state {
                    job.state_history.push(job.state);
                    job.state = state;
                }
                job.status = status;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::job::RetryConfig;
    use crate::state_machine::job::tests::sfx_request;

    fn make_job(max_transport_retries: u32) -> GenerationJob {
        GenerationJob::new(
            sfx_request(),
            RetryConfig {
                max_transport_retries,
                ..Default::default()
            },
        )
    }

    fn submitted_job(max_transport_retries: u32) -> GenerationJob {
        let mut job = make_job(max_transport_retries);
        StateMachine::next(
            &mut job,
            StepOutcome::Submitted {
                remote_id: "remote-1".into(),
            },
        );
        job
    }

    fn polled(status: RemoteStatus, url: Option<&str>) -> StepOutcome {
        StepOutcome::Polled(PollResponse {
            status,
            progress: None,
            result_url: url.map(String::from),
            error_detail: None,
        })
    }

    fn transport() -> StepOutcome {
        StepOutcome::Fault(ProviderError::Transport("503".into()))
    }

    #[test]
    fn happy_path_walks_all_states() {
        let mut job = make_job(3);
        assert_eq!(job.state, State::Created);

        let t = StateMachine::next(
            &mut job,
            StepOutcome::Submitted {
                remote_id: "r-9".into(),
            },
        );
        assert_eq!(t, Transition::Next(State::Submitted));
        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(job.remote_id.as_deref(), Some("r-9"));

        let t = StateMachine::next(&mut job, polled(RemoteStatus::Running, None));
        assert_eq!(t, Transition::Next(State::Polling));

        let t = StateMachine::next(&mut job, polled(RemoteStatus::Succeeded, Some("https://cdn/x.mp4")));
        assert_eq!(t, Transition::Next(State::Completed));
        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(job.result_url.as_deref(), Some("https://cdn/x.mp4"));

        let t = StateMachine::next(&mut job, StepOutcome::Fetched);
        assert_eq!(t, Transition::Complete(JobOutcome::Succeeded));
        assert_eq!(job.status, JobStatus::Succeeded);
        assert_eq!(
            job.state_history,
            vec![State::Created, State::Submitted, State::Polling]
        );
    }

    #[test]
    fn repeated_polls_do_not_grow_history() {
        let mut job = submitted_job(3);
        for _ in 0..5 {
            StateMachine::next(&mut job, polled(RemoteStatus::Pending, None));
        }
        assert_eq!(job.state_history, vec![State::Created, State::Submitted]);
    }

    #[test]
    fn submit_rejections_fail_without_retry() {
        for err in [
            ProviderError::Auth("bad key".into()),
            ProviderError::Validation("video too long".into()),
            ProviderError::Transport("connection reset".into()),
        ] {
            let mut job = make_job(5);
            let t = StateMachine::next(&mut job, StepOutcome::Fault(err.clone()));
            assert_eq!(
                t,
                Transition::Complete(JobOutcome::Failed(FailureCause::Provider(err)))
            );
            assert_eq!(job.status, JobStatus::Failed);
        }
    }

    #[test]
    fn transport_failures_back_off_then_fail() {
        let mut job = submitted_job(2);

        let t = StateMachine::next(&mut job, transport());
        assert_eq!(
            t,
            Transition::Retry {
                state: State::Submitted,
                reason: ProviderError::Transport("503".into()),
                delay: Duration::from_millis(1000),
            }
        );
        let t = StateMachine::next(&mut job, transport());
        assert!(matches!(t, Transition::Retry { delay, .. } if delay == Duration::from_millis(2000)));

        let t = StateMachine::next(&mut job, transport());
        assert!(matches!(t, Transition::Complete(JobOutcome::Failed(_))));
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.state, State::Failed);
    }

    #[test]
    fn successful_poll_resets_transport_counter() {
        let mut job = submitted_job(1);
        StateMachine::next(&mut job, transport());
        StateMachine::next(&mut job, polled(RemoteStatus::Running, None));
        assert_eq!(job.transport_retries, 0);

        let t = StateMachine::next(&mut job, transport());
        assert!(matches!(t, Transition::Retry { .. }));
    }

    #[test]
    fn auth_failure_while_polling_is_terminal() {
        let mut job = submitted_job(5);
        let t = StateMachine::next(
            &mut job,
            StepOutcome::Fault(ProviderError::Auth("revoked".into())),
        );
        assert!(matches!(t, Transition::Complete(JobOutcome::Failed(_))));
        assert_eq!(job.transport_retries, 0);
    }

    #[test]
    fn not_found_has_a_grace_allowance() {
        let mut job = submitted_job(3);
        job.retry_config.max_not_found = 1;
        let not_found = || StepOutcome::Fault(ProviderError::NotFound("status 404".into()));

        assert!(matches!(StateMachine::next(&mut job, not_found()), Transition::Retry { .. }));
        assert!(matches!(
            StateMachine::next(&mut job, not_found()),
            Transition::Complete(JobOutcome::Failed(_))
        ));
    }

    #[test]
    fn remote_failure_surfaces_detail() {
        let mut job = submitted_job(3);
        let t = StateMachine::next(
            &mut job,
            StepOutcome::Polled(PollResponse {
                status: RemoteStatus::Failed,
                progress: None,
                result_url: None,
                error_detail: Some("content policy".into()),
            }),
        );
        assert_eq!(
            t,
            Transition::Complete(JobOutcome::Failed(FailureCause::Remote("content policy".into())))
        );
        assert_eq!(
            job.failure_reason.as_deref(),
            Some("provider reported failure: content policy")
        );
    }

    #[test]
    fn success_without_url_fails_integrity() {
        let mut job = submitted_job(3);
        let t = StateMachine::next(&mut job, polled(RemoteStatus::Succeeded, None));
        assert!(matches!(
            t,
            Transition::Complete(JobOutcome::Failed(FailureCause::Provider(ProviderError::Integrity(_))))
        ));
    }

    #[test]
    fn integrity_error_refetches_once() {
        let mut job = submitted_job(3);
        StateMachine::next(&mut job, polled(RemoteStatus::Succeeded, Some("u")));
        let corrupt = || StepOutcome::Fault(ProviderError::Integrity("empty body".into()));

        let t = StateMachine::next(&mut job, corrupt());
        assert!(matches!(t, Transition::Retry { state: State::Completed, delay, .. } if delay.is_zero()));
        let t = StateMachine::next(&mut job, corrupt());
        assert!(matches!(t, Transition::Complete(JobOutcome::Failed(_))));
        assert_eq!(job.status, JobStatus::Failed);
    }

    #[test]
    fn budget_exceeded_times_out() {
        let mut job = submitted_job(3);
        StateMachine::next(&mut job, polled(RemoteStatus::Running, None));
        let t = StateMachine::next(&mut job, StepOutcome::BudgetExceeded);
        assert_eq!(t, Transition::Complete(JobOutcome::TimedOut));
        assert_eq!(job.status, JobStatus::TimedOut);
        assert_eq!(job.state, State::TimedOut);
    }

    #[test]
    fn terminal_states_are_sticky() {
        let mut job = submitted_job(3);
        StateMachine::next(&mut job, StepOutcome::BudgetExceeded);

        let t = StateMachine::next(&mut job, polled(RemoteStatus::Succeeded, Some("late")));
        assert_eq!(t, Transition::Complete(JobOutcome::TimedOut));
        assert_eq!(job.status, JobStatus::TimedOut);
        assert!(job.result_url.is_none());
    }

    #[test]
    fn polling_before_submit_is_rejected() {
        let mut job = make_job(3);
        let t = StateMachine::next(&mut job, polled(RemoteStatus::Running, None));
        assert!(matches!(
            t,
            Transition::Complete(JobOutcome::Failed(FailureCause::UnexpectedStep(_)))
        ));
    }

    #[test]
    fn state_display() {
        assert_eq!(State::Created.to_string(), "CREATED");
        assert_eq!(State::Polling.to_string(), "POLLING");
        assert_eq!(State::TimedOut.to_string(), "TIMED_OUT");
    }
}
