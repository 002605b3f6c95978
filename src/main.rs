mod cli;
mod config;
mod error;
mod host;
mod orchestrator;
mod pipeline;
mod placer;
mod provider;
mod request;
mod stager;
mod state_machine;
mod timeline;
mod ui;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::{Cli, Command};
use config::{Credentials, ReelgenConfig};
use host::MemoryHost;
use orchestrator::JobOrchestrator;
use pipeline::{Pipeline, PipelineOutcome};
use placer::PlacementPolicy;
use provider::{AnyProvider, ProviderKind, TmpfilesPublisher};
use request::{
    AspectRatio, ClipEditInput, HostContext, PreparedGeneration, Resolution, SoundEffectInput,
    build_clip_edit, build_sound_effect, build_transition, parse_choice,
};
use stager::MediaStager;
use ui::JobProgress;

fn init_tracing(verbose: bool) {
    let default = if verbose { "reelgen=debug" } else { "reelgen=warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn command_kind(command: &Command) -> ProviderKind {
    match command {
        Command::Edit { .. } => ProviderKind::VideoEdit,
        Command::Transition { .. } => ProviderKind::Transition,
        Command::Sfx { .. } => ProviderKind::SoundEffect,
    }
}

fn prepare(
    command: Command,
    ctx: &HostContext,
    config: &ReelgenConfig,
) -> error::Result<PreparedGeneration> {
    match command {
        Command::Edit {
            prompt,
            aspect_ratio,
            resolution,
            replace,
        } => {
            let input = ClipEditInput {
                prompt,
                aspect_ratio: parse_choice::<AspectRatio>(aspect_ratio.as_deref())?,
                resolution: parse_choice::<Resolution>(resolution.as_deref())?,
            };
            let policy = replace.map(Into::into).unwrap_or(config.replace_policy);
            build_clip_edit(ctx, input, PlacementPolicy::ReplaceClip(policy))
        }
        Command::Transition { prompt } => build_transition(ctx, &prompt),
        Command::Sfx {
            prompt,
            duration,
            influence,
            track,
        } => build_sound_effect(
            ctx,
            SoundEffectInput {
                prompt,
                duration_secs: duration,
                prompt_influence: influence,
                track: track.unwrap_or(config.sound_effect_track),
            },
        ),
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = ReelgenConfig::load(cli.config.as_deref())?;
    let credentials = Credentials::resolve(&config);
    let kind = command_kind(&cli.command);
    let api_key = credentials.require(kind)?.to_string();

    let mut host = MemoryHost::load(&cli.host)
        .with_context(|| format!("loading host state from {}", cli.host.display()))?;
    let ctx = HostContext::capture(&host)?;
    let prepared = match prepare(cli.command, &ctx, &config) {
        Ok(prepared) => prepared,
        Err(err) => {
            eprintln!("{}", err.report());
            return Ok(ExitCode::FAILURE);
        }
    };

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    let progress = Arc::new(JobProgress::start(&format!(
        "{kind}: {}",
        prepared.request.prompt
    )));
    let provider = AnyProvider::new(kind, api_key, config.base_url(kind), config.http_timeouts())?;
    let orchestrator =
        JobOrchestrator::new(provider, config.poll_policy(kind)).with_observer(progress.clone());
    let publisher =
        TmpfilesPublisher::with_upload_url(config.publish_url.clone(), config.http_timeouts())?;
    let pipeline = Pipeline::new(
        orchestrator,
        publisher,
        MediaStager::new(config.staging_dir.clone()),
    );

    match pipeline.run(&mut host, prepared, &cancel).await {
        Ok(outcome) => {
            progress.complete(&outcome);
            progress.print_report(outcome.report());
            host.save(&cli.host)?;
            Ok(match outcome {
                PipelineOutcome::Placed { .. } => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            })
        }
        Err(err) => {
            progress.fail(&err.report());
            Ok(ExitCode::FAILURE)
        }
    }
}
