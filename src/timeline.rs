//! Frame-accurate timeline model and anchor snapshots.
//!
//! Positions are integer frames at the timeline's frame rate; ranges are
//! half-open `[start, end)`. A [`Timeline`] is always a snapshot copied out
//! of the host, never a live view.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{ReelgenError, Result};

pub type Frame = i64;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameRate(pub f64);

impl FrameRate {
    pub fn fps(self) -> f64 {
        self.0
    }

    /// Nearest frame for a position in seconds.
    pub fn frames_for(self, seconds: f64) -> Frame {
        (seconds * self.0).round() as Frame
    }

    pub fn seconds(self, frames: Frame) -> f64 {
        frames as f64 / self.0
    }

    /// Convert a frame count expressed at `self` into frames at `target`.
    pub fn convert(self, frames: Frame, target: FrameRate) -> Frame {
        if self == target {
            frames
        } else {
            (frames as f64 * target.0 / self.0).round() as Frame
        }
    }

    /// `HH:MM:SS:FF` using the rounded integer frame base.
    pub fn timecode(self, frame: Frame) -> String {
        let fps = (self.0.round() as i64).max(1);
        let frame = frame.max(0);
        let hh = frame / (3600 * fps);
        let mm = (frame % (3600 * fps)) / (60 * fps);
        let ss = (frame % (60 * fps)) / fps;
        let ff = frame % fps;
        format!("{hh:02}:{mm:02}:{ss:02}:{ff:02}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameRange {
    pub start: Frame,
    pub end: Frame,
}

impl FrameRange {
    pub fn new(start: Frame, end: Frame) -> Self {
        Self { start, end }
    }

    pub fn with_len(start: Frame, len: Frame) -> Self {
        Self {
            start,
            end: start + len,
        }
    }

    pub fn len(&self) -> Frame {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn overlaps(&self, other: &FrameRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains(&self, frame: Frame) -> bool {
        self.start <= frame && frame < self.end
    }

    pub fn shifted(&self, delta: Frame) -> FrameRange {
        FrameRange::new(self.start + delta, self.end + delta)
    }
}

impl fmt::Display for FrameRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Video,
    Audio,
}

/// Track address as the host numbers them: kind plus 1-based index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackRef {
    pub kind: TrackKind,
    pub index: u32,
}

impl TrackRef {
    pub fn video(index: u32) -> Self {
        Self {
            kind: TrackKind::Video,
            index,
        }
    }

    pub fn audio(index: u32) -> Self {
        Self {
            kind: TrackKind::Audio,
            index,
        }
    }
}

impl fmt::Display for TrackRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TrackKind::Video => write!(f, "V{}", self.index),
            TrackKind::Audio => write!(f, "A{}", self.index),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClipId(pub String);

impl fmt::Display for ClipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineClip {
    pub id: ClipId,
    pub name: String,
    pub range: FrameRange,
    /// Media file backing the clip, when the host exposes one.
    #[serde(default)]
    pub source: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub track: TrackRef,
    /// Sorted by start frame.
    #[serde(default)]
    pub clips: Vec<TimelineClip>,
}

impl Track {
    pub fn new(track: TrackRef) -> Self {
        Self {
            track,
            clips: Vec::new(),
        }
    }

    pub fn sort_clips(&mut self) {
        self.clips.sort_by(|a, b| {
            a.range
                .start
                .cmp(&b.range.start)
                .then_with(|| a.id.0.cmp(&b.id.0))
        });
    }

    pub fn clip(&self, id: &ClipId) -> Option<&TimelineClip> {
        self.clips.iter().find(|c| &c.id == id)
    }

    pub fn clip_at(&self, frame: Frame) -> Option<&TimelineClip> {
        self.clips.iter().find(|c| c.range.contains(frame))
    }

    /// Clips immediately before and after `id` in start order.
    pub fn neighbors(&self, id: &ClipId) -> (Option<&TimelineClip>, Option<&TimelineClip>) {
        let Some(pos) = self.clips.iter().position(|c| &c.id == id) else {
            return (None, None);
        };
        let prev = pos.checked_sub(1).and_then(|i| self.clips.get(i));
        (prev, self.clips.get(pos + 1))
    }

    pub fn find_overlap(&self, range: &FrameRange, ignore: Option<&ClipId>) -> Option<&TimelineClip> {
        self.clips.iter().find(|c| {
            if ignore.is_some_and(|id| id == &c.id) {
                return false;
            }
            c.range.overlaps(range)
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    pub id: String,
    pub name: String,
    pub frame_rate: FrameRate,
    #[serde(default)]
    pub tracks: Vec<Track>,
}

impl Timeline {
    pub fn new(id: impl Into<String>, name: impl Into<String>, frame_rate: FrameRate) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            frame_rate,
            tracks: Vec::new(),
        }
    }

    pub fn track(&self, track: &TrackRef) -> Option<&Track> {
        self.tracks.iter().find(|t| &t.track == track)
    }

    pub fn track_mut(&mut self, track: &TrackRef) -> Option<&mut Track> {
        self.tracks.iter_mut().find(|t| &t.track == track)
    }

    pub fn find_clip(&self, id: &ClipId) -> Option<(&Track, &TimelineClip)> {
        self.tracks
            .iter()
            .find_map(|t| t.clip(id).map(|c| (t, c)))
    }

    /// Topmost video clip covering `frame`, mirroring how the host resolves
    /// "the clip under the playhead".
    pub fn video_clip_at(&self, frame: Frame) -> Option<(&Track, &TimelineClip)> {
        self.tracks
            .iter()
            .filter(|t| t.track.kind == TrackKind::Video)
            .filter_map(|t| t.clip_at(frame).map(|c| (t, c)))
            .max_by_key(|(t, _)| t.track.index)
    }
}

/// Identity and position of a clip at capture time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipSnapshot {
    pub id: ClipId,
    pub range: FrameRange,
}

impl From<&TimelineClip> for ClipSnapshot {
    fn from(clip: &TimelineClip) -> Self {
        Self {
            id: clip.id.clone(),
            range: clip.range,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjacentClips {
    pub previous: ClipSnapshot,
    pub next: ClipSnapshot,
}

/// Read-only snapshot of where generated media should land.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineAnchor {
    pub timeline_id: String,
    pub frame_rate: FrameRate,
    pub track: TrackRef,
    pub range: FrameRange,
    /// Clip the generation replaces, for clip edits.
    pub target: Option<ClipSnapshot>,
    pub adjacent: Option<AdjacentClips>,
}

impl TimelineAnchor {
    /// Anchor on an existing clip: its track and range. The target snapshot
    /// alone pins the placement, so neighbours are not recorded.
    pub fn for_clip(timeline: &Timeline, clip: &ClipId) -> Result<Self> {
        let (track, found) = timeline
            .find_clip(clip)
            .ok_or_else(|| ReelgenError::Validation(format!("clip {clip} is not on the timeline")))?;
        Ok(Self {
            timeline_id: timeline.id.clone(),
            frame_rate: timeline.frame_rate,
            track: track.track,
            range: found.range,
            target: Some(found.into()),
            adjacent: None,
        })
    }

    /// Anchor on the boundary after `previous`; fails when no clip follows it.
    pub fn for_boundary(timeline: &Timeline, previous: &ClipId) -> Result<Self> {
        let (track, prev) = timeline.find_clip(previous).ok_or_else(|| {
            ReelgenError::Validation(format!("clip {previous} is not on the timeline"))
        })?;
        let next = track.neighbors(previous).1.ok_or_else(|| {
            ReelgenError::Validation(format!(
                "clip {previous} on {} has no following clip to transition into",
                track.track
            ))
        })?;
        Ok(Self {
            timeline_id: timeline.id.clone(),
            frame_rate: timeline.frame_rate,
            track: track.track,
            range: FrameRange::new(prev.range.end, next.range.start),
            target: None,
            adjacent: Some(AdjacentClips {
                previous: prev.into(),
                next: next.into(),
            }),
        })
    }

    /// Anchor at a playhead position on a designated track.
    pub fn at_playhead(timeline: &Timeline, track: TrackRef, playhead: Frame) -> Self {
        Self {
            timeline_id: timeline.id.clone(),
            frame_rate: timeline.frame_rate,
            track,
            range: FrameRange::new(playhead, playhead),
            target: None,
            adjacent: None,
        }
    }

    pub fn start_timecode(&self) -> String {
        self.frame_rate.timecode(self.range.start)
    }

    pub fn end_timecode(&self) -> String {
        self.frame_rate.timecode(self.range.end)
    }

    /// Check the snapshot still describes `current`.
    pub fn validate_against(&self, current: &Timeline) -> Result<()> {
        if current.id != self.timeline_id {
            return Err(ReelgenError::StaleAnchor(format!(
                "active timeline changed from {} to {}",
                self.timeline_id, current.id
            )));
        }
        if current.frame_rate != self.frame_rate {
            return Err(ReelgenError::StaleAnchor(format!(
                "timeline frame rate changed from {} to {}",
                self.frame_rate.fps(),
                current.frame_rate.fps()
            )));
        }
        let track = current.track(&self.track).ok_or_else(|| {
            ReelgenError::StaleAnchor(format!("track {} no longer exists", self.track))
        })?;

        if let Some(target) = &self.target {
            expect_unchanged(track, target)?;
        }
        if let Some(adjacent) = &self.adjacent {
            expect_unchanged(track, &adjacent.previous)?;
            expect_unchanged(track, &adjacent.next)?;
            let following = track.neighbors(&adjacent.previous.id).1;
            if following.map(|c| &c.id) != Some(&adjacent.next.id) {
                return Err(ReelgenError::StaleAnchor(format!(
                    "clips {} and {} on {} are no longer adjacent",
                    adjacent.previous.id, adjacent.next.id, self.track
                )));
            }
        }
        Ok(())
    }
}

fn expect_unchanged(track: &Track, snapshot: &ClipSnapshot) -> Result<()> {
    match track.clip(&snapshot.id) {
        None => Err(ReelgenError::StaleAnchor(format!(
            "clip {} was removed from {}",
            snapshot.id, track.track
        ))),
        Some(clip) if clip.range != snapshot.range => Err(ReelgenError::StaleAnchor(format!(
            "clip {} moved from {} to {}",
            snapshot.id, snapshot.range, clip.range
        ))),
        Some(_) => Ok(()),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn clip(id: &str, start: Frame, end: Frame) -> TimelineClip {
        TimelineClip {
            id: ClipId(id.into()),
            name: id.into(),
            range: FrameRange::new(start, end),
            source: None,
        }
    }

    /// 24 fps timeline: V1 = a[0,120) b[120,240) c[240,360); A1 and A2 empty.
    pub(crate) fn sample_timeline() -> Timeline {
        let mut timeline = Timeline::new("tl-1", "Timeline 1", FrameRate(24.0));
        let mut v1 = Track::new(TrackRef::video(1));
        v1.clips = vec![clip("a", 0, 120), clip("b", 120, 240), clip("c", 240, 360)];
        timeline.tracks.push(v1);
        timeline.tracks.push(Track::new(TrackRef::audio(1)));
        timeline.tracks.push(Track::new(TrackRef::audio(2)));
        timeline
    }

    #[test]
    fn timecode_formatting() {
        let rate = FrameRate(24.0);
        assert_eq!(rate.timecode(0), "00:00:00:00");
        assert_eq!(rate.timecode(24 * 61 + 5), "00:01:01:05");
        assert_eq!(rate.timecode(24 * 3600), "01:00:00:00");
    }

    #[test]
    fn frame_conversion_between_rates() {
        assert_eq!(FrameRate(30.0).frames_for(12.3), 369);
        assert_eq!(FrameRate(24.0).convert(48, FrameRate(30.0)), 60);
        assert_eq!(FrameRate(25.0).convert(50, FrameRate(25.0)), 50);
    }

    #[test]
    fn range_overlap_is_half_open() {
        let a = FrameRange::new(0, 10);
        assert!(!a.overlaps(&FrameRange::new(10, 20)));
        assert!(a.overlaps(&FrameRange::new(9, 20)));
        assert!(a.contains(0));
        assert!(!a.contains(10));
    }

    #[test]
    fn neighbors_in_start_order() {
        let timeline = sample_timeline();
        let track = timeline.track(&TrackRef::video(1)).unwrap();
        let (prev, next) = track.neighbors(&ClipId("b".into()));
        assert_eq!(prev.unwrap().id.0, "a");
        assert_eq!(next.unwrap().id.0, "c");
        let (prev, next) = track.neighbors(&ClipId("a".into()));
        assert!(prev.is_none());
        assert_eq!(next.unwrap().id.0, "b");
    }

    #[test]
    fn boundary_anchor_captures_both_neighbours() {
        let timeline = sample_timeline();
        let anchor = TimelineAnchor::for_boundary(&timeline, &ClipId("a".into())).unwrap();
        let adjacent = anchor.adjacent.unwrap();
        assert_eq!(adjacent.previous.range, FrameRange::new(0, 120));
        assert_eq!(adjacent.next.range, FrameRange::new(120, 240));
        assert_eq!(anchor.range, FrameRange::new(120, 120));
    }

    #[test]
    fn boundary_anchor_requires_following_clip() {
        let timeline = sample_timeline();
        let err = TimelineAnchor::for_boundary(&timeline, &ClipId("c".into())).unwrap_err();
        assert!(matches!(err, ReelgenError::Validation(_)));
    }

    #[test]
    fn anchor_validates_against_unchanged_timeline() {
        let timeline = sample_timeline();
        let anchor = TimelineAnchor::for_clip(&timeline, &ClipId("b".into())).unwrap();
        assert_eq!(anchor.start_timecode(), "00:00:05:00");
        assert_eq!(anchor.end_timecode(), "00:00:10:00");
        anchor.validate_against(&timeline).unwrap();
    }

    #[test]
    fn interior_clip_anchor_ignores_its_neighbours() {
        let timeline = sample_timeline();
        let anchor = TimelineAnchor::for_clip(&timeline, &ClipId("b".into())).unwrap();
        assert!(anchor.adjacent.is_none());
        assert_eq!(anchor.target.as_ref().unwrap().range, FrameRange::new(120, 240));

        // Edits to a neighbour do not touch the clip being replaced.
        let mut edited = timeline.clone();
        edited.track_mut(&TrackRef::video(1)).unwrap().clips[2].range = FrameRange::new(250, 360);
        anchor.validate_against(&edited).unwrap();
    }

    #[test]
    fn anchor_detects_moved_clip() {
        let timeline = sample_timeline();
        let anchor = TimelineAnchor::for_clip(&timeline, &ClipId("b".into())).unwrap();

        let mut edited = timeline.clone();
        edited.track_mut(&TrackRef::video(1)).unwrap().clips[1].range = FrameRange::new(130, 250);
        let err = anchor.validate_against(&edited).unwrap_err();
        assert!(matches!(err, ReelgenError::StaleAnchor(_)));
    }

    #[test]
    fn anchor_detects_removed_track() {
        let timeline = sample_timeline();
        let anchor = TimelineAnchor::at_playhead(&timeline, TrackRef::audio(2), 100);

        let mut edited = timeline.clone();
        edited.tracks.retain(|t| t.track != TrackRef::audio(2));
        let err = anchor.validate_against(&edited).unwrap_err();
        assert!(err.to_string().contains("A2"));
    }

    #[test]
    fn anchor_detects_clip_inserted_between_neighbours() {
        let mut timeline = sample_timeline();
        // Leave a gap between a and b so a clip can slip in without moving either.
        timeline.track_mut(&TrackRef::video(1)).unwrap().clips[1].range = FrameRange::new(130, 240);
        let anchor = TimelineAnchor::for_boundary(&timeline, &ClipId("a".into())).unwrap();

        let track = timeline.track_mut(&TrackRef::video(1)).unwrap();
        track.clips.push(clip("x", 120, 130));
        track.sort_clips();
        let err = anchor.validate_against(&timeline).unwrap_err();
        assert!(err.to_string().contains("no longer adjacent"));
    }

    #[test]
    fn topmost_video_clip_wins() {
        let mut timeline = sample_timeline();
        let mut v2 = Track::new(TrackRef::video(2));
        v2.clips.push(clip("overlay", 100, 140));
        timeline.tracks.push(v2);
        let (track, found) = timeline.video_clip_at(110).unwrap();
        assert_eq!(track.track, TrackRef::video(2));
        assert_eq!(found.id.0, "overlay");
    }
}
