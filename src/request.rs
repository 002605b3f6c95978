//! Generation requests and the per-use-case builders that produce them.
//!
//! Builders are pure: they read a [`HostContext`] snapshot and either return
//! a [`PreparedGeneration`] or fail with a validation error before any
//! network call is made.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ReelgenError, Result};
use crate::host::{SelectionContext, TimelineHost};
use crate::placer::PlacementPolicy;
use crate::provider::ProviderKind;
use crate::timeline::{ClipId, Frame, FrameRange, Timeline, TimelineAnchor, TrackRef};

/// Longest source clip the video edit provider accepts, in seconds.
pub const MAX_EDIT_SOURCE_SECS: f64 = 8.7;

/// Bounds for generated sound effect length, in seconds.
pub const SOUND_EFFECT_DURATION_SECS: (f64, f64) = (0.5, 22.0);

pub const DEFAULT_TRANSITION_PROMPT: &str = "A smooth cinematic transition";

pub const DEFAULT_PROMPT_INFLUENCE: f32 = 0.3;

/// Where a piece of source media lives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MediaRef {
    Url(String),
    File(PathBuf),
    /// A timeline range the host must render before upload.
    TimelineRange { track: TrackRef, range: FrameRange },
    /// A single frame the host must export as a still before upload.
    TimelineFrame { frame: Frame },
}

impl MediaRef {
    pub fn as_url(&self) -> Option<&str> {
        match self {
            MediaRef::Url(url) => Some(url),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SourceMedia {
    Clip(MediaRef),
    Keyframes { first: MediaRef, last: MediaRef },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AspectRatio {
    #[serde(rename = "16:9")]
    Wide,
    #[serde(rename = "4:3")]
    Standard,
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "9:16")]
    Vertical,
    #[serde(rename = "3:4")]
    Portrait,
    #[serde(rename = "3:2")]
    Photo,
    #[serde(rename = "2:3")]
    PhotoPortrait,
}

impl AspectRatio {
    pub fn as_str(self) -> &'static str {
        match self {
            AspectRatio::Wide => "16:9",
            AspectRatio::Standard => "4:3",
            AspectRatio::Square => "1:1",
            AspectRatio::Vertical => "9:16",
            AspectRatio::Portrait => "3:4",
            AspectRatio::Photo => "3:2",
            AspectRatio::PhotoPortrait => "2:3",
        }
    }
}

impl FromStr for AspectRatio {
    type Err = ReelgenError;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s.trim() {
            "16:9" => AspectRatio::Wide,
            "4:3" => AspectRatio::Standard,
            "1:1" => AspectRatio::Square,
            "9:16" => AspectRatio::Vertical,
            "3:4" => AspectRatio::Portrait,
            "3:2" => AspectRatio::Photo,
            "2:3" => AspectRatio::PhotoPortrait,
            other => {
                return Err(ReelgenError::Validation(format!(
                    "unsupported aspect ratio {other:?}"
                )));
            }
        })
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    #[serde(rename = "720p")]
    Hd720,
    #[serde(rename = "480p")]
    Sd480,
}

impl Resolution {
    pub fn as_str(self) -> &'static str {
        match self {
            Resolution::Hd720 => "720p",
            Resolution::Sd480 => "480p",
        }
    }
}

impl FromStr for Resolution {
    type Err = ReelgenError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "720p" => Ok(Resolution::Hd720),
            "480p" => Ok(Resolution::Sd480),
            other => Err(ReelgenError::Validation(format!(
                "unsupported resolution {other:?}"
            ))),
        }
    }
}

/// Parse an optional user choice where "Original" (or blank) means unset.
pub fn parse_choice<T: FromStr<Err = ReelgenError>>(value: Option<&str>) -> Result<Option<T>> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) if v.eq_ignore_ascii_case("original") => Ok(None),
        Some(v) => v.parse().map(Some),
    }
}

/// Provider options. Each provider reads the fields it understands.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub aspect_ratio: Option<AspectRatio>,
    pub resolution: Option<Resolution>,
    pub duration_secs: Option<f64>,
    pub prompt_influence: Option<f32>,
    #[serde(default)]
    pub loop_video: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub provider: ProviderKind,
    pub prompt: String,
    pub source_media: Option<SourceMedia>,
    pub parameters: GenerationParams,
}

/// Host state captured once at invocation.
#[derive(Debug, Clone)]
pub struct HostContext {
    pub timeline: Timeline,
    pub selection: SelectionContext,
}

impl HostContext {
    pub fn capture(host: &impl TimelineHost) -> Result<Self> {
        Ok(Self {
            timeline: host.timeline()?,
            selection: host.selection()?,
        })
    }

    /// The selected clip, or the topmost video clip under the playhead.
    fn current_clip(&self) -> Result<ClipId> {
        if let Some(selected) = &self.selection.selected_clip {
            return Ok(selected.clone());
        }
        self.timeline
            .video_clip_at(self.selection.playhead)
            .map(|(_, clip)| clip.id.clone())
            .ok_or_else(|| {
                ReelgenError::Validation(
                    "no video clip selected; position the playhead over a clip".into(),
                )
            })
    }
}

/// A validated request together with where and how its result is placed.
#[derive(Debug, Clone)]
pub struct PreparedGeneration {
    pub request: GenerationRequest,
    pub anchor: TimelineAnchor,
    pub placement: PlacementPolicy,
}

impl PreparedGeneration {
    /// File name stem for the staged artifact.
    pub fn suggested_name(&self) -> String {
        let stem: String = self.request.prompt.split_whitespace().collect::<Vec<_>>().join("_");
        match self.request.provider {
            ProviderKind::VideoEdit => format!("edit_{stem}"),
            ProviderKind::Transition => format!("transition_{stem}"),
            ProviderKind::SoundEffect => stem,
        }
    }
}

fn require_prompt(prompt: &str) -> Result<String> {
    let prompt = prompt.trim();
    if prompt.is_empty() {
        return Err(ReelgenError::Validation("prompt must not be empty".into()));
    }
    Ok(prompt.to_string())
}

#[derive(Debug, Clone, Default)]
pub struct ClipEditInput {
    pub prompt: String,
    pub aspect_ratio: Option<AspectRatio>,
    pub resolution: Option<Resolution>,
}

/// Video edit of the clip under the playhead.
pub fn build_clip_edit(
    ctx: &HostContext,
    input: ClipEditInput,
    placement: PlacementPolicy,
) -> Result<PreparedGeneration> {
    let prompt = require_prompt(&input.prompt)?;
    let clip = ctx.current_clip()?;
    let anchor = TimelineAnchor::for_clip(&ctx.timeline, &clip)?;

    let seconds = ctx.timeline.frame_rate.seconds(anchor.range.len());
    if seconds > MAX_EDIT_SOURCE_SECS {
        return Err(ReelgenError::Validation(format!(
            "clip {clip} is {seconds:.2}s long; the video edit provider accepts at most {MAX_EDIT_SOURCE_SECS}s"
        )));
    }

    Ok(PreparedGeneration {
        request: GenerationRequest {
            provider: ProviderKind::VideoEdit,
            prompt,
            source_media: Some(SourceMedia::Clip(MediaRef::TimelineRange {
                track: anchor.track,
                range: anchor.range,
            })),
            parameters: GenerationParams {
                aspect_ratio: input.aspect_ratio,
                resolution: input.resolution,
                ..Default::default()
            },
        },
        anchor,
        placement,
    })
}

/// Transition from the clip under the playhead into the clip after it.
pub fn build_transition(ctx: &HostContext, prompt: &str) -> Result<PreparedGeneration> {
    let prompt = match prompt.trim() {
        "" => DEFAULT_TRANSITION_PROMPT.to_string(),
        p => p.to_string(),
    };
    let clip = ctx.current_clip()?;
    let anchor = TimelineAnchor::for_boundary(&ctx.timeline, &clip)?;
    let adjacent = anchor
        .adjacent
        .as_ref()
        .ok_or_else(|| ReelgenError::Validation("no clip follows the current clip".into()))?;

    let first = MediaRef::TimelineFrame {
        frame: adjacent.previous.range.end - 1,
    };
    let last = MediaRef::TimelineFrame {
        frame: adjacent.next.range.start,
    };

    Ok(PreparedGeneration {
        request: GenerationRequest {
            provider: ProviderKind::Transition,
            prompt,
            source_media: Some(SourceMedia::Keyframes { first, last }),
            parameters: GenerationParams {
                aspect_ratio: Some(AspectRatio::Wide),
                ..Default::default()
            },
        },
        anchor,
        placement: PlacementPolicy::InsertBetween,
    })
}

#[derive(Debug, Clone)]
pub struct SoundEffectInput {
    pub prompt: String,
    pub duration_secs: Option<f64>,
    pub prompt_influence: Option<f32>,
    /// Audio track index receiving the effect.
    pub track: u32,
}

/// Sound effect dropped at the playhead on an audio track.
pub fn build_sound_effect(ctx: &HostContext, input: SoundEffectInput) -> Result<PreparedGeneration> {
    let prompt = require_prompt(&input.prompt)?;

    if let Some(secs) = input.duration_secs {
        let (min, max) = SOUND_EFFECT_DURATION_SECS;
        if !(min..=max).contains(&secs) {
            return Err(ReelgenError::Validation(format!(
                "sound effect duration {secs}s is outside {min}..={max}s"
            )));
        }
    }
    let influence = input.prompt_influence.unwrap_or(DEFAULT_PROMPT_INFLUENCE);
    if !(0.0..=1.0).contains(&influence) {
        return Err(ReelgenError::Validation(format!(
            "prompt influence {influence} is outside 0..=1"
        )));
    }

    let track = TrackRef::audio(input.track);
    if ctx.timeline.track(&track).is_none() {
        return Err(ReelgenError::Validation(format!(
            "audio track {track} does not exist"
        )));
    }
    let anchor = TimelineAnchor::at_playhead(&ctx.timeline, track, ctx.selection.playhead);

    Ok(PreparedGeneration {
        request: GenerationRequest {
            provider: ProviderKind::SoundEffect,
            prompt,
            source_media: None,
            parameters: GenerationParams {
                duration_secs: input.duration_secs,
                prompt_influence: Some(influence),
                ..Default::default()
            },
        },
        anchor,
        placement: PlacementPolicy::AppendAtPlayhead,
    })
}
