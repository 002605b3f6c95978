use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::state::State;
use crate::provider::ProviderKind;
use crate::request::GenerationRequest;

/// Externally visible lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    TimedOut,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::TimedOut
        )
    }
}

/// Retry allowances for one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Consecutive transport failures tolerated before the job fails.
    pub max_transport_retries: u32,
    /// Base delay in milliseconds for exponential backoff.
    pub base_delay_ms: u64,
    /// Upper bound for a single backoff delay.
    pub max_delay_ms: u64,
    /// Consecutive "job not found" polls tolerated before the job fails.
    pub max_not_found: u32,
    /// Re-fetches allowed after a corrupt or empty download.
    pub max_integrity_retries: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_transport_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            max_not_found: 3,
            max_integrity_retries: 1,
        }
    }
}

impl RetryConfig {
    /// delay = base_delay_ms * 2^(attempt - 1), capped at max_delay_ms
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        let ms = self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms);
        Duration::from_millis(ms)
    }
}

/// One generation request travelling through submit, poll and fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationJob {
    /// Local identifier, assigned before the provider issues its own.
    pub id: String,
    pub remote_id: Option<String>,
    pub request: GenerationRequest,
    pub status: JobStatus,
    pub state: State,
    pub state_history: Vec<State>,
    pub result_url: Option<String>,
    pub progress: Option<f32>,
    pub failure_reason: Option<String>,
    pub transport_retries: u32,
    pub not_found_count: u32,
    pub integrity_retries: u32,
    pub retry_config: RetryConfig,
    pub created_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub last_polled_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl GenerationJob {
    pub fn new(request: GenerationRequest, retry_config: RetryConfig) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            remote_id: None,
            request,
            status: JobStatus::Pending,
            state: State::Created,
            state_history: Vec::new(),
            result_url: None,
            progress: None,
            failure_reason: None,
            transport_retries: 0,
            not_found_count: 0,
            integrity_retries: 0,
            retry_config,
            created_at: now,
            submitted_at: None,
            last_polled_at: None,
            updated_at: now,
        }
    }

    /// Provider id when known, otherwise the local id.
    pub fn display_id(&self) -> &str {
        self.remote_id.as_deref().unwrap_or(&self.id)
    }
}

/// Audit summary produced when a job reaches a terminal result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobReport {
    pub job_id: String,
    pub remote_id: Option<String>,
    pub provider: ProviderKind,
    pub status: JobStatus,
    pub state_transitions: Vec<State>,
    pub transport_retries: u32,
    pub failure_reason: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: i64,
}

impl JobReport {
    pub fn from_job(job: &GenerationJob) -> Self {
        let now = Utc::now();
        let duration = now - job.created_at;
        let mut transitions = job.state_history.clone();
        transitions.push(job.state);

        Self {
            job_id: job.id.clone(),
            remote_id: job.remote_id.clone(),
            provider: job.request.provider,
            status: job.status,
            state_transitions: transitions,
            transport_retries: job.transport_retries,
            failure_reason: job.failure_reason.clone(),
            started_at: job.created_at,
            finished_at: now,
            duration_ms: duration.num_milliseconds(),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::request::GenerationParams;

    pub(crate) fn sfx_request() -> GenerationRequest {
        GenerationRequest {
            provider: ProviderKind::SoundEffect,
            prompt: "glass shatter".into(),
            source_media: None,
            parameters: GenerationParams::default(),
        }
    }

    #[test]
    fn job_creation_defaults() {
        let job = GenerationJob::new(sfx_request(), RetryConfig::default());
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.state, State::Created);
        assert_eq!(job.transport_retries, 0);
        assert!(job.remote_id.is_none());
        assert_eq!(job.display_id(), job.id);
        assert!(job.state_history.is_empty());
    }

    #[test]
    fn retry_config_exponential_backoff() {
        let config = RetryConfig {
            base_delay_ms: 1000,
            max_delay_ms: 5000,
            ..Default::default()
        };
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(1000));
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(2000));
        assert_eq!(config.delay_for_attempt(3), Duration::from_millis(4000));
        assert_eq!(config.delay_for_attempt(4), Duration::from_millis(5000));
        assert_eq!(config.delay_for_attempt(60), Duration::from_millis(5000));
    }

    #[test]
    fn report_from_job() {
        let job = GenerationJob::new(sfx_request(), RetryConfig::default());
        let report = JobReport::from_job(&job);

        assert_eq!(report.job_id, job.id);
        assert_eq!(report.provider, ProviderKind::SoundEffect);
        assert_eq!(report.status, JobStatus::Pending);
        assert_eq!(report.state_transitions, vec![State::Created]);
    }

    #[test]
    fn terminal_statuses() {
        assert!(JobStatus::TimedOut.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
    }
}
