//! End-to-end flow for one generation: materialise sources, run the job,
//! stage the artifact and place it on the timeline.

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{ReelgenError, Result};
use crate::host::{MediaPool, TimelineHost};
use crate::orchestrator::{JobOrchestrator, JobResult};
use crate::placer::{PlacedClip, TimelinePlacer};
use crate::provider::{MediaPublisher, ProviderClient};
use crate::request::{GenerationRequest, MediaRef, PreparedGeneration, SourceMedia};
use crate::stager::{MediaStager, StagedMedia};
use crate::state_machine::JobReport;

#[derive(Debug)]
pub enum PipelineOutcome {
    Placed {
        placed: PlacedClip,
        staged: StagedMedia,
        report: JobReport,
    },
    /// Media reached the pool but the timeline changed under it.
    NotPlaced {
        staged: StagedMedia,
        error: ReelgenError,
        report: JobReport,
    },
    TimedOut {
        report: JobReport,
    },
    Cancelled {
        report: JobReport,
    },
}

impl PipelineOutcome {
    pub fn report(&self) -> &JobReport {
        match self {
            PipelineOutcome::Placed { report, .. }
            | PipelineOutcome::NotPlaced { report, .. }
            | PipelineOutcome::TimedOut { report }
            | PipelineOutcome::Cancelled { report } => report,
        }
    }
}

pub struct Pipeline<P, M> {
    orchestrator: JobOrchestrator<P>,
    publisher: M,
    stager: MediaStager,
    placer: TimelinePlacer,
}

impl<P: ProviderClient, M: MediaPublisher> Pipeline<P, M> {
    pub fn new(orchestrator: JobOrchestrator<P>, publisher: M, stager: MediaStager) -> Self {
        Self {
            orchestrator,
            publisher,
            stager,
            placer: TimelinePlacer::new(),
        }
    }

    pub fn orchestrator(&self) -> &JobOrchestrator<P> {
        &self.orchestrator
    }

    /// Generate and place one result.
    ///
    /// Provider failures and staging failures are errors, as is an anchor
    /// that is already stale before any source is exported. A stale anchor
    /// after staging is reported as [`PipelineOutcome::NotPlaced`] since the
    /// media already sits in the pool.
    pub async fn run<H>(
        &self,
        host: &mut H,
        prepared: PreparedGeneration,
        cancel: &CancellationToken,
    ) -> Result<PipelineOutcome>
    where
        H: TimelineHost + MediaPool,
    {
        let suggested_name = prepared.suggested_name();
        let PreparedGeneration {
            request,
            anchor,
            placement,
        } = prepared;

        // Sources are exported at the anchor's frames.
        anchor.validate_against(&host.timeline()?)?;
        let request = self.materialize(host, request).await?;

        let (job, artifact) = match self.orchestrator.run(request, cancel).await {
            JobResult::Retrieved { job, artifact } => (job, artifact),
            JobResult::Failed { job, error } => {
                let report = JobReport::from_job(&job);
                warn!(
                    job_id = %report.job_id,
                    transitions = ?report.state_transitions,
                    error = %error,
                    "generation did not succeed"
                );
                return Err(error);
            }
            JobResult::TimedOut { job } => {
                return Ok(PipelineOutcome::TimedOut {
                    report: JobReport::from_job(&job),
                });
            }
            JobResult::Cancelled { job } => {
                return Ok(PipelineOutcome::Cancelled {
                    report: JobReport::from_job(&job),
                });
            }
        };
        let report = JobReport::from_job(&job);

        let staged = self.stager.stage(host, artifact, &suggested_name)?;

        match self.placer.place(host, &staged, &anchor, placement) {
            Ok(placed) => Ok(PipelineOutcome::Placed {
                placed,
                staged,
                report,
            }),
            Err(error @ (ReelgenError::StaleAnchor(_) | ReelgenError::Placement(_))) => {
                warn!(
                    path = %staged.local_path.display(),
                    error = %error,
                    "generated media imported but not placed"
                );
                Ok(PipelineOutcome::NotPlaced {
                    staged,
                    error,
                    report,
                })
            }
            Err(other) => Err(other),
        }
    }

    /// Replace timeline and file references with published URLs.
    async fn materialize<H: TimelineHost>(
        &self,
        host: &mut H,
        mut request: GenerationRequest,
    ) -> Result<GenerationRequest> {
        request.source_media = match request.source_media.take() {
            None => None,
            Some(SourceMedia::Clip(media)) => {
                Some(SourceMedia::Clip(self.publish_ref(host, media).await?))
            }
            Some(SourceMedia::Keyframes { first, last }) => Some(SourceMedia::Keyframes {
                first: self.publish_ref(host, first).await?,
                last: self.publish_ref(host, last).await?,
            }),
        };
        Ok(request)
    }

    async fn publish_ref<H: TimelineHost>(&self, host: &mut H, media: MediaRef) -> Result<MediaRef> {
        let path = match media {
            MediaRef::Url(_) => return Ok(media),
            MediaRef::File(path) => path,
            MediaRef::TimelineRange { track, range } => host.export_range(track, range)?,
            MediaRef::TimelineFrame { frame } => host.export_still(frame)?,
        };
        let url = self.publisher.publish(&path).await?;
        info!(path = %path.display(), %url, "source media published");
        Ok(MediaRef::Url(url))
    }
}
