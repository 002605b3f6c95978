//! Interface de terminal do reelgen: spinners e saída colorida.
//!
//! Usa as crates `indicatif` para spinners de progresso e `console` para
//! estilização com cores. O [`JobProgress`] acompanha visualmente a
//! execução de um job de geração e implementa [`JobObserver`].

use std::time::Duration;

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::error::ErrorReport;
use crate::orchestrator::JobObserver;
use crate::pipeline::PipelineOutcome;
use crate::provider::ProviderError;
use crate::state_machine::{GenerationJob, JobReport, JobStatus};

/// Indicador visual de progresso para um job de geração no terminal.
///
/// Exibe um spinner animado enquanto o provedor processa e mensagens
/// coloridas para sucesso (verde), falha (vermelho) e retentativa (amarelo).
pub struct JobProgress {
    pb: ProgressBar,
    green: Style,
    red: Style,
    yellow: Style,
}

impl JobProgress {
    /// Inicia o spinner com uma descrição do job.
    pub fn start(description: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} [{elapsed}] {msg}") {
            pb.set_style(style);
        }
        pb.set_message(format!("CREATED: {description}"));
        pb.enable_steady_tick(Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
        }
    }

    fn describe(job: &GenerationJob) -> String {
        match job.progress {
            Some(p) => format!("{} {} ({:.0}%)", job.state, job.display_id(), p * 100.0),
            None => format!("{} {}", job.state, job.display_id()),
        }
    }

    /// Finaliza o spinner e exibe o resultado do pipeline.
    pub fn complete(&self, outcome: &PipelineOutcome) {
        self.pb.finish_and_clear();
        match outcome {
            PipelineOutcome::Placed { placed, staged, .. } => {
                println!(
                    "  {} Placed {} on {} at {}",
                    self.green.apply_to("✓"),
                    staged.local_path.display(),
                    placed.track,
                    placed.range
                );
            }
            PipelineOutcome::NotPlaced { staged, error, .. } => {
                println!(
                    "  {} Imported {} but not placed: {error}",
                    self.yellow.apply_to("!"),
                    staged.local_path.display()
                );
            }
            PipelineOutcome::TimedOut { report } => {
                println!("  {} {}", self.yellow.apply_to("⏱"), timed_out_message(report));
            }
            PipelineOutcome::Cancelled { .. } => {
                println!("  {} Cancelled", self.yellow.apply_to("✗"));
            }
        }
    }

    /// Finaliza o spinner e exibe o erro terminal.
    pub fn fail(&self, report: &ErrorReport) {
        self.pb.finish_and_clear();
        println!("  {} {report}", self.red.apply_to("✗"));
    }

    /// Imprime o relatório do job formatado em JSON com estilo colorido.
    pub fn print_report(&self, report: &JobReport) {
        let status_style = match report.status {
            JobStatus::Succeeded => &self.green,
            JobStatus::Failed => &self.red,
            _ => &self.yellow,
        };
        println!();
        println!("{}", status_style.apply_to("─── Job Report ───"));
        println!(
            "{}",
            serde_json::to_string_pretty(report).unwrap_or_default()
        );
    }
}

impl JobObserver for JobProgress {
    fn state_changed(&self, job: &GenerationJob) {
        self.pb.set_message(Self::describe(job));
    }

    fn polled(&self, job: &GenerationJob) {
        self.pb.set_message(Self::describe(job));
    }

    fn retrying(&self, job: &GenerationJob, reason: &ProviderError, delay: Duration) {
        self.pb.println(format!(
            "  {} {} retry in {}ms: {reason}",
            self.yellow.apply_to("↻"),
            job.display_id(),
            delay.as_millis()
        ));
    }
}

/// Um timeout local não cancela o job remoto.
fn timed_out_message(report: &JobReport) -> String {
    format!(
        "Stopped waiting for {}; the job may still complete remotely",
        report.remote_id.as_deref().unwrap_or(&report.job_id)
    )
}
