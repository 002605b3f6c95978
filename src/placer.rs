//! Placement of staged media onto the host timeline.
//!
//! Placement runs in two steps: [`TimelinePlacer::plan`] is a pure function
//! of a fresh timeline snapshot, and [`TimelinePlacer::place`] applies the
//! plan only after the anchor has been re-validated. A stale anchor never
//! reaches the host.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{ReelgenError, Result};
use crate::host::{InsertMode, MediaHandle, TimelineHost, require_track_kind};
use crate::stager::StagedMedia;
use crate::timeline::{
    ClipId, FrameRange, Timeline, TimelineAnchor, TimelineClip, TrackKind, TrackRef,
};

/// What happens to the clip a video edit replaces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplacePolicy {
    #[default]
    Remove,
    /// Keep whatever part of the original the new clip does not cover.
    Trim,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlacementPolicy {
    ReplaceClip(ReplacePolicy),
    InsertBetween,
    AppendAtPlayhead,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OriginalEdit {
    Remove(ClipId),
    Trim(ClipId, FrameRange),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacementPlan {
    pub media: MediaHandle,
    pub track: TrackRef,
    pub range: FrameRange,
    pub mode: InsertMode,
    pub original: Option<OriginalEdit>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacedClip {
    pub clip: ClipId,
    pub track: TrackRef,
    pub range: FrameRange,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TimelinePlacer;

impl TimelinePlacer {
    pub fn new() -> Self {
        Self
    }

    /// Compute the insertion for `staged` against a timeline the anchor has
    /// already been validated on.
    pub fn plan(
        &self,
        timeline: &Timeline,
        staged: &StagedMedia,
        anchor: &TimelineAnchor,
        policy: PlacementPolicy,
    ) -> Result<PlacementPlan> {
        let duration = staged.frame_rate.convert(staged.duration, timeline.frame_rate);
        if duration <= 0 {
            return Err(ReelgenError::Placement(format!(
                "staged media {} has no duration",
                staged.local_path.display()
            )));
        }
        let track = timeline.track(&anchor.track).ok_or_else(|| {
            ReelgenError::StaleAnchor(format!("track {} no longer exists", anchor.track))
        })?;

        match policy {
            PlacementPolicy::ReplaceClip(replace) => {
                let target = anchor.target.as_ref().ok_or_else(|| {
                    ReelgenError::Placement("anchor does not reference a clip to replace".into())
                })?;
                let len = duration.min(target.range.len());
                let range = FrameRange::with_len(target.range.start, len);
                let original = match replace {
                    ReplacePolicy::Trim if range.end < target.range.end => Some(OriginalEdit::Trim(
                        target.id.clone(),
                        FrameRange::new(range.end, target.range.end),
                    )),
                    _ => Some(OriginalEdit::Remove(target.id.clone())),
                };
                if let Some(conflict) = track.find_overlap(&range, Some(&target.id)) {
                    return Err(ReelgenError::Placement(format!(
                        "{range} overlaps clip {} on {}",
                        conflict.id, anchor.track
                    )));
                }
                Ok(PlacementPlan {
                    media: staged.handle.clone(),
                    track: anchor.track,
                    range,
                    mode: InsertMode::Overwrite,
                    original,
                })
            }
            PlacementPolicy::InsertBetween => {
                let adjacent = anchor.adjacent.as_ref().ok_or_else(|| {
                    ReelgenError::Placement(
                        "no valid boundary: anchor is missing a previous or next clip".into(),
                    )
                })?;
                Ok(PlacementPlan {
                    media: staged.handle.clone(),
                    track: anchor.track,
                    range: FrameRange::with_len(adjacent.previous.range.end, duration),
                    mode: InsertMode::Ripple,
                    original: None,
                })
            }
            PlacementPolicy::AppendAtPlayhead => {
                require_track_kind(anchor.track, TrackKind::Audio)?;
                let range = FrameRange::with_len(anchor.range.start, duration);
                if let Some(conflict) = track.find_overlap(&range, None) {
                    return Err(ReelgenError::Placement(format!(
                        "{range} overlaps clip {} on {}",
                        conflict.id, anchor.track
                    )));
                }
                Ok(PlacementPlan {
                    media: staged.handle.clone(),
                    track: anchor.track,
                    range,
                    mode: InsertMode::Overwrite,
                    original: None,
                })
            }
        }
    }

    /// Re-validate the anchor against the live timeline, then apply the plan.
    pub fn place<H: TimelineHost>(
        &self,
        host: &mut H,
        staged: &StagedMedia,
        anchor: &TimelineAnchor,
        policy: PlacementPolicy,
    ) -> Result<PlacedClip> {
        let current = host.timeline()?;
        anchor.validate_against(&current)?;
        let plan = self.plan(&current, staged, anchor, policy)?;
        debug!(?plan, "applying placement");

        let undo = match &plan.original {
            Some(OriginalEdit::Remove(id)) => {
                let removed = current.find_clip(id).map(|(_, c)| c.clone());
                host.remove_clip(id)?;
                removed.map(Undo::Restore)
            }
            Some(OriginalEdit::Trim(id, range)) => {
                let previous = current.find_clip(id).map(|(_, c)| c.range);
                host.set_clip_range(id, *range)?;
                previous.map(|r| Undo::Range(id.clone(), r))
            }
            None => None,
        };
        let clip = match host.insert_clip(&plan.media, plan.track, plan.range, plan.mode) {
            Ok(clip) => clip,
            Err(err) => {
                if let Some(undo) = undo {
                    undo.apply(host, plan.track);
                }
                return Err(err);
            }
        };

        info!(
            clip = %clip,
            track = %plan.track,
            start = %current.frame_rate.timecode(plan.range.start),
            end = %current.frame_rate.timecode(plan.range.end),
            "placed generated media"
        );
        Ok(PlacedClip {
            clip,
            track: plan.track,
            range: plan.range,
        })
    }
}

/// Reverses the edit to the original clip when the insert is refused.
enum Undo {
    Restore(TimelineClip),
    Range(ClipId, FrameRange),
}

impl Undo {
    fn apply<H: TimelineHost>(self, host: &mut H, track: TrackRef) {
        let result = match self {
            Undo::Restore(clip) => host.restore_clip(track, clip),
            Undo::Range(id, range) => host.set_clip_range(&id, range),
        };
        if let Err(err) = result {
            warn!(error = %err, "could not restore the original clip");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use super::*;
    use crate::host::{MediaPool, MemoryHost};
    use crate::timeline::tests::{clip, sample_timeline};
    use crate::timeline::{ClipId, FrameRate, Track};

    fn stage_into(host: &mut MemoryHost, dir: &Path, name: &str) -> StagedMedia {
        let path: PathBuf = dir.join(name);
        std::fs::write(&path, b"media").unwrap();
        let item = host.import_media(&path).unwrap();
        StagedMedia {
            local_path: path,
            handle: item.handle,
            duration: item.duration,
            frame_rate: item.frame_rate,
        }
    }

    fn ranges(host: &MemoryHost, track: TrackRef) -> Vec<(String, FrameRange)> {
        host.timeline()
            .unwrap()
            .track(&track)
            .unwrap()
            .clips
            .iter()
            .map(|c| (c.id.0.clone(), c.range))
            .collect()
    }

    #[test]
    fn transition_ripples_following_clips() {
        // 1 fps keeps frames equal to seconds: prev [0,5) next [5,10) after [10,14).
        let mut timeline = Timeline::new("tl", "Timeline 1", FrameRate(1.0));
        let mut v1 = Track::new(TrackRef::video(1));
        v1.clips = vec![clip("prev", 0, 5), clip("next", 5, 10), clip("after", 10, 14)];
        timeline.tracks.push(v1);

        let dir = tempfile::tempdir().unwrap();
        let mut host = MemoryHost::new(timeline).with_import_duration("mp4", 2);
        let staged = stage_into(&mut host, dir.path(), "transition.mp4");
        let anchor =
            TimelineAnchor::for_boundary(&host.timeline().unwrap(), &ClipId("prev".into())).unwrap();

        let placed = TimelinePlacer::new()
            .place(&mut host, &staged, &anchor, PlacementPolicy::InsertBetween)
            .unwrap();

        assert_eq!(placed.range, FrameRange::new(5, 7));
        assert_eq!(
            ranges(&host, TrackRef::video(1)),
            vec![
                ("prev".into(), FrameRange::new(0, 5)),
                (placed.clip.0.clone(), FrameRange::new(5, 7)),
                ("next".into(), FrameRange::new(7, 12)),
                ("after".into(), FrameRange::new(12, 16)),
            ]
        );
    }

    #[test]
    fn sound_effect_lands_at_playhead_without_shifting() {
        let mut timeline = Timeline::new("tl", "Timeline 1", FrameRate(30.0));
        timeline.tracks.push(Track::new(TrackRef::audio(1)));
        let mut a2 = Track::new(TrackRef::audio(2));
        a2.clips = vec![clip("music", 0, 300), clip("vo", 600, 900)];
        timeline.tracks.push(a2);

        let dir = tempfile::tempdir().unwrap();
        let mut host = MemoryHost::new(timeline).with_import_duration("mp3", 45);
        let staged = stage_into(&mut host, dir.path(), "boom.mp3");
        let playhead = FrameRate(30.0).frames_for(12.3);
        let anchor = TimelineAnchor::at_playhead(&host.timeline().unwrap(), TrackRef::audio(2), playhead);

        let placed = TimelinePlacer::new()
            .place(&mut host, &staged, &anchor, PlacementPolicy::AppendAtPlayhead)
            .unwrap();

        assert_eq!(placed.range, FrameRange::new(369, 414));
        let after = ranges(&host, TrackRef::audio(2));
        assert_eq!(after[0], ("music".into(), FrameRange::new(0, 300)));
        assert_eq!(after[2], ("vo".into(), FrameRange::new(600, 900)));
    }

    #[test]
    fn sound_effect_refuses_overlap() {
        let dir = tempfile::tempdir().unwrap();
        let mut timeline = sample_timeline();
        timeline.track_mut(&TrackRef::audio(2)).unwrap().clips.push(clip("music", 0, 100));
        let mut host = MemoryHost::new(timeline).with_import_duration("mp3", 48);
        let staged = stage_into(&mut host, dir.path(), "boom.mp3");
        let anchor = TimelineAnchor::at_playhead(&host.timeline().unwrap(), TrackRef::audio(2), 60);

        let err = TimelinePlacer::new()
            .place(&mut host, &staged, &anchor, PlacementPolicy::AppendAtPlayhead)
            .unwrap_err();
        assert!(matches!(err, ReelgenError::Placement(_)));
    }

    #[test]
    fn sound_effect_needs_audio_track() {
        let dir = tempfile::tempdir().unwrap();
        let mut host = MemoryHost::new(sample_timeline());
        let staged = stage_into(&mut host, dir.path(), "boom.mp3");
        let anchor = TimelineAnchor::at_playhead(&host.timeline().unwrap(), TrackRef::video(1), 400);

        let err = TimelinePlacer::new()
            .place(&mut host, &staged, &anchor, PlacementPolicy::AppendAtPlayhead)
            .unwrap_err();
        assert!(err.to_string().contains("is not an audio track"));
    }

    #[test]
    fn replace_removes_original() {
        let dir = tempfile::tempdir().unwrap();
        let mut host = MemoryHost::new(sample_timeline()).with_import_duration("mp4", 120);
        let staged = stage_into(&mut host, dir.path(), "edit.mp4");
        let anchor = TimelineAnchor::for_clip(&host.timeline().unwrap(), &ClipId("b".into())).unwrap();

        let placed = TimelinePlacer::new()
            .place(
                &mut host,
                &staged,
                &anchor,
                PlacementPolicy::ReplaceClip(ReplacePolicy::Remove),
            )
            .unwrap();

        assert_eq!(placed.range, FrameRange::new(120, 240));
        let after = ranges(&host, TrackRef::video(1));
        assert_eq!(after.len(), 3);
        assert!(after.iter().all(|(id, _)| id != "b"));
    }

    #[test]
    fn replace_trims_original_when_edit_is_shorter() {
        let dir = tempfile::tempdir().unwrap();
        let mut host = MemoryHost::new(sample_timeline()).with_import_duration("mp4", 72);
        let staged = stage_into(&mut host, dir.path(), "edit.mp4");
        let anchor = TimelineAnchor::for_clip(&host.timeline().unwrap(), &ClipId("b".into())).unwrap();

        let placed = TimelinePlacer::new()
            .place(
                &mut host,
                &staged,
                &anchor,
                PlacementPolicy::ReplaceClip(ReplacePolicy::Trim),
            )
            .unwrap();

        assert_eq!(placed.range, FrameRange::new(120, 192));
        let after = ranges(&host, TrackRef::video(1));
        assert!(after.contains(&("b".into(), FrameRange::new(192, 240))));
    }

    #[test]
    fn replace_keeps_neighbours_of_interior_clip() {
        let dir = tempfile::tempdir().unwrap();
        let mut host = MemoryHost::new(sample_timeline()).with_import_duration("mp4", 120);
        let staged = stage_into(&mut host, dir.path(), "edit.mp4");
        let anchor = TimelineAnchor::for_clip(&host.timeline().unwrap(), &ClipId("b".into())).unwrap();

        let placed = TimelinePlacer::new()
            .place(
                &mut host,
                &staged,
                &anchor,
                PlacementPolicy::ReplaceClip(ReplacePolicy::Remove),
            )
            .unwrap();

        assert_eq!(
            ranges(&host, TrackRef::video(1)),
            vec![
                ("a".into(), FrameRange::new(0, 120)),
                (placed.clip.0.clone(), FrameRange::new(120, 240)),
                ("c".into(), FrameRange::new(240, 360)),
            ]
        );
    }

    #[test]
    fn refused_insert_restores_original_clip() {
        for replace in [ReplacePolicy::Remove, ReplacePolicy::Trim] {
            let dir = tempfile::tempdir().unwrap();
            let mut host = MemoryHost::new(sample_timeline()).with_import_duration("mp4", 72);
            let mut staged = stage_into(&mut host, dir.path(), "edit.mp4");
            staged.handle = MediaHandle("media-missing".into());
            let before = host.timeline().unwrap();
            let anchor = TimelineAnchor::for_clip(&before, &ClipId("b".into())).unwrap();

            let err = TimelinePlacer::new()
                .place(&mut host, &staged, &anchor, PlacementPolicy::ReplaceClip(replace))
                .unwrap_err();

            assert!(err.to_string().contains("unknown media handle"));
            assert_eq!(host.timeline().unwrap(), before, "{replace:?}");
        }
    }

    #[test]
    fn replace_cuts_longer_edit_to_original_range() {
        let dir = tempfile::tempdir().unwrap();
        let mut host = MemoryHost::new(sample_timeline()).with_import_duration("mp4", 200);
        let staged = stage_into(&mut host, dir.path(), "edit.mp4");
        let anchor = TimelineAnchor::for_clip(&host.timeline().unwrap(), &ClipId("b".into())).unwrap();

        let plan = TimelinePlacer::new()
            .plan(
                &host.timeline().unwrap(),
                &staged,
                &anchor,
                PlacementPolicy::ReplaceClip(ReplacePolicy::Trim),
            )
            .unwrap();
        assert_eq!(plan.range, FrameRange::new(120, 240));
        assert_eq!(plan.original, Some(OriginalEdit::Remove(ClipId("b".into()))));
    }

    #[test]
    fn insert_between_without_neighbours_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut host = MemoryHost::new(sample_timeline());
        let staged = stage_into(&mut host, dir.path(), "t.mp4");
        let anchor = TimelineAnchor::at_playhead(&host.timeline().unwrap(), TrackRef::video(1), 120);

        let err = TimelinePlacer::new()
            .place(&mut host, &staged, &anchor, PlacementPolicy::InsertBetween)
            .unwrap_err();
        assert!(err.to_string().contains("no valid boundary"));
    }

    #[test]
    fn stale_anchor_leaves_timeline_untouched_on_every_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let mut host = MemoryHost::new(sample_timeline()).with_import_duration("mp4", 24);
        let staged = stage_into(&mut host, dir.path(), "t.mp4");
        let anchor = TimelineAnchor::for_boundary(&host.timeline().unwrap(), &ClipId("a".into())).unwrap();

        // The user drags clip b while the job was running.
        host.set_clip_range(&ClipId("b".into()), FrameRange::new(150, 270)).unwrap();
        let before = host.timeline().unwrap();

        for _ in 0..3 {
            let err = TimelinePlacer::new()
                .place(&mut host, &staged, &anchor, PlacementPolicy::InsertBetween)
                .unwrap_err();
            assert!(matches!(err, ReelgenError::StaleAnchor(_)));
            assert_eq!(host.timeline().unwrap(), before);
        }

        // Re-capturing the anchor makes the same staged media placeable.
        let fresh = TimelineAnchor::for_boundary(&host.timeline().unwrap(), &ClipId("a".into())).unwrap();
        let placed = TimelinePlacer::new()
            .place(&mut host, &staged, &fresh, PlacementPolicy::InsertBetween)
            .unwrap();
        assert_eq!(placed.range, FrameRange::new(120, 144));
    }

    #[test]
    fn clip_duration_converts_between_frame_rates() {
        let dir = tempfile::tempdir().unwrap();
        let mut host = MemoryHost::new(sample_timeline());
        let mut staged = stage_into(&mut host, dir.path(), "t.mp4");
        staged.duration = 60;
        staged.frame_rate = FrameRate(30.0);
        let anchor = TimelineAnchor::at_playhead(&host.timeline().unwrap(), TrackRef::audio(1), 0);

        let plan = TimelinePlacer::new()
            .plan(&host.timeline().unwrap(), &staged, &anchor, PlacementPolicy::AppendAtPlayhead)
            .unwrap();
        assert_eq!(plan.range, FrameRange::new(0, 48));
    }
}
