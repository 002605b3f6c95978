//! Capability interface to the host editor.
//!
//! The host owns the project, timeline and media pool; this crate only
//! reaches them through [`TimelineHost`] and [`MediaPool`]. [`MemoryHost`] is
//! an in-process host backed by a JSON state file, used by the CLI driver
//! and by tests.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ReelgenError, Result};
use crate::timeline::{
    ClipId, Frame, FrameRange, FrameRate, Timeline, TimelineClip, TrackKind, TrackRef,
};

/// Opaque handle to a media pool entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MediaHandle(pub String);

impl std::fmt::Display for MediaHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// What the media pool reports for a freshly imported file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaPoolItem {
    pub handle: MediaHandle,
    pub path: PathBuf,
    pub duration: Frame,
    pub frame_rate: FrameRate,
}

/// Playhead and current selection at invocation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionContext {
    pub playhead: Frame,
    #[serde(default)]
    pub selected_clip: Option<ClipId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InsertMode {
    /// Occupy the range; fails if another clip is in the way.
    Overwrite,
    /// Shift every clip starting at or after the insert point by the new
    /// clip's length.
    Ripple,
}

pub trait TimelineHost {
    /// Fresh snapshot of the active timeline.
    fn timeline(&self) -> Result<Timeline>;

    fn selection(&self) -> Result<SelectionContext>;

    fn insert_clip(
        &mut self,
        media: &MediaHandle,
        track: TrackRef,
        range: FrameRange,
        mode: InsertMode,
    ) -> Result<ClipId>;

    fn remove_clip(&mut self, clip: &ClipId) -> Result<()>;

    fn set_clip_range(&mut self, clip: &ClipId, range: FrameRange) -> Result<()>;

    /// Put back a clip removed earlier in this session, keeping its id.
    fn restore_clip(&mut self, track: TrackRef, clip: TimelineClip) -> Result<()>;

    /// Render a range of a track to a local file.
    fn export_range(&mut self, track: TrackRef, range: FrameRange) -> Result<PathBuf>;

    /// Export the picture at `frame` as a still image.
    fn export_still(&mut self, frame: Frame) -> Result<PathBuf>;
}

pub trait MediaPool {
    fn import_media(&mut self, path: &Path) -> Result<MediaPoolItem>;

    /// Folder holding the project's existing media, if one can be inferred.
    fn project_media_folder(&self) -> Option<PathBuf>;
}

const IMPORTABLE_EXTENSIONS: &[&str] = &["mp4", "mov", "mp3", "wav", "png", "jpg", "jpeg"];

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MemoryHostState {
    timeline: Timeline,
    selection: SelectionContext,
    #[serde(default)]
    media_folder: Option<PathBuf>,
    #[serde(default)]
    media_pool: BTreeMap<String, MediaPoolItem>,
    /// Duration reported for newly imported media, keyed by extension.
    #[serde(default)]
    import_durations: BTreeMap<String, Frame>,
    #[serde(default)]
    next_id: u64,
}

/// Host kept entirely in memory.
///
/// Exports return the source file of the clip covering the requested
/// position rather than rendering anything.
#[derive(Debug, Clone)]
pub struct MemoryHost {
    state: MemoryHostState,
}

impl MemoryHost {
    pub fn new(timeline: Timeline) -> Self {
        Self {
            state: MemoryHostState {
                timeline,
                selection: SelectionContext {
                    playhead: 0,
                    selected_clip: None,
                },
                media_folder: None,
                media_pool: BTreeMap::new(),
                import_durations: BTreeMap::new(),
                next_id: 1,
            },
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ReelgenError::Storage(format!("cannot read host state {}: {e}", path.display()))
        })?;
        let state: MemoryHostState = serde_json::from_str(&contents)?;
        Ok(Self { state })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.state)?;
        std::fs::write(path, json).map_err(|e| {
            ReelgenError::Storage(format!("cannot write host state {}: {e}", path.display()))
        })
    }

    pub fn with_playhead(mut self, playhead: Frame) -> Self {
        self.state.selection.playhead = playhead;
        self
    }

    pub fn with_selected_clip(mut self, clip: ClipId) -> Self {
        self.state.selection.selected_clip = Some(clip);
        self
    }

    pub fn with_media_folder(mut self, folder: PathBuf) -> Self {
        self.state.media_folder = Some(folder);
        self
    }

    /// Duration, in timeline frames, reported for imported files with `extension`.
    pub fn with_import_duration(mut self, extension: &str, frames: Frame) -> Self {
        self.state
            .import_durations
            .insert(extension.to_ascii_lowercase(), frames);
        self
    }

    pub fn media_pool(&self) -> impl Iterator<Item = &MediaPoolItem> {
        self.state.media_pool.values()
    }

    /// Direct access for simulating edits made by the user.
    pub fn timeline_mut(&mut self) -> &mut Timeline {
        &mut self.state.timeline
    }

    fn next_id(&mut self, prefix: &str) -> String {
        let id = format!("{prefix}-{}", self.state.next_id);
        self.state.next_id += 1;
        id
    }

    fn source_at(&self, track: Option<TrackRef>, frame: Frame) -> Result<PathBuf> {
        let timeline = &self.state.timeline;
        let clip = match track {
            Some(track) => timeline.track(&track).and_then(|t| t.clip_at(frame)),
            None => timeline.video_clip_at(frame).map(|(_, c)| c),
        };
        let clip = clip.ok_or_else(|| {
            ReelgenError::Storage(format!("no clip to export at frame {frame}"))
        })?;
        clip.source.clone().ok_or_else(|| {
            ReelgenError::Storage(format!("clip {} has no backing media file", clip.id))
        })
    }
}

impl TimelineHost for MemoryHost {
    fn timeline(&self) -> Result<Timeline> {
        Ok(self.state.timeline.clone())
    }

    fn selection(&self) -> Result<SelectionContext> {
        Ok(self.state.selection.clone())
    }

    fn insert_clip(
        &mut self,
        media: &MediaHandle,
        track: TrackRef,
        range: FrameRange,
        mode: InsertMode,
    ) -> Result<ClipId> {
        let item = self
            .state
            .media_pool
            .get(&media.0)
            .cloned()
            .ok_or_else(|| ReelgenError::Placement(format!("unknown media handle {media}")))?;
        if range.is_empty() {
            return Err(ReelgenError::Placement(format!("empty insert range {range}")));
        }
        let id = ClipId(self.next_id("clip"));

        let target = self
            .state
            .timeline
            .track_mut(&track)
            .ok_or_else(|| ReelgenError::Placement(format!("track {track} does not exist")))?;

        match mode {
            InsertMode::Overwrite => {
                if let Some(conflict) = target.find_overlap(&range, None) {
                    return Err(ReelgenError::Placement(format!(
                        "{range} overlaps clip {} on {track}",
                        conflict.id
                    )));
                }
            }
            InsertMode::Ripple => {
                let straddling = target
                    .clip_at(range.start)
                    .filter(|c| c.range.start < range.start);
                if let Some(conflict) = straddling {
                    return Err(ReelgenError::Placement(format!(
                        "clip {} straddles the insert point {}",
                        conflict.id, range.start
                    )));
                }
                for clip in target.clips.iter_mut().filter(|c| c.range.start >= range.start) {
                    clip.range = clip.range.shifted(range.len());
                }
            }
        }

        let name = item
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| media.0.clone());
        target.clips.push(TimelineClip {
            id: id.clone(),
            name,
            range,
            source: Some(item.path),
        });
        target.sort_clips();
        Ok(id)
    }

    fn remove_clip(&mut self, clip: &ClipId) -> Result<()> {
        for track in &mut self.state.timeline.tracks {
            if let Some(pos) = track.clips.iter().position(|c| &c.id == clip) {
                track.clips.remove(pos);
                return Ok(());
            }
        }
        Err(ReelgenError::Placement(format!("clip {clip} not found")))
    }

    fn set_clip_range(&mut self, clip: &ClipId, range: FrameRange) -> Result<()> {
        for track in &mut self.state.timeline.tracks {
            if let Some(found) = track.clips.iter_mut().find(|c| &c.id == clip) {
                found.range = range;
                track.sort_clips();
                return Ok(());
            }
        }
        Err(ReelgenError::Placement(format!("clip {clip} not found")))
    }

    fn restore_clip(&mut self, track: TrackRef, clip: TimelineClip) -> Result<()> {
        let target = self
            .state
            .timeline
            .track_mut(&track)
            .ok_or_else(|| ReelgenError::Placement(format!("track {track} does not exist")))?;
        if let Some(conflict) = target.find_overlap(&clip.range, None) {
            return Err(ReelgenError::Placement(format!(
                "cannot restore {}: {} overlaps clip {}",
                clip.id, clip.range, conflict.id
            )));
        }
        target.clips.push(clip);
        target.sort_clips();
        Ok(())
    }

    fn export_range(&mut self, track: TrackRef, range: FrameRange) -> Result<PathBuf> {
        self.source_at(Some(track), range.start)
    }

    fn export_still(&mut self, frame: Frame) -> Result<PathBuf> {
        self.source_at(None, frame)
    }
}

impl MediaPool for MemoryHost {
    fn import_media(&mut self, path: &Path) -> Result<MediaPoolItem> {
        if !path.is_file() {
            return Err(ReelgenError::Import(format!(
                "{} does not exist",
                path.display()
            )));
        }
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        if !IMPORTABLE_EXTENSIONS.contains(&extension.as_str()) {
            return Err(ReelgenError::Import(format!(
                "unsupported media format: {}",
                path.display()
            )));
        }
        let frame_rate = self.state.timeline.frame_rate;
        let duration = self
            .state
            .import_durations
            .get(&extension)
            .copied()
            .unwrap_or_else(|| frame_rate.frames_for(5.0));

        let handle = MediaHandle(self.next_id("media"));
        let item = MediaPoolItem {
            handle: handle.clone(),
            path: path.to_path_buf(),
            duration,
            frame_rate,
        };
        self.state.media_pool.insert(handle.0, item.clone());
        Ok(item)
    }

    fn project_media_folder(&self) -> Option<PathBuf> {
        if let Some(folder) = &self.state.media_folder {
            return Some(folder.clone());
        }
        self.state
            .media_pool
            .values()
            .find_map(|item| item.path.parent().map(Path::to_path_buf))
    }
}

/// Kind of track a clip must live on for a given use.
pub fn require_track_kind(track: TrackRef, kind: TrackKind) -> Result<()> {
    if track.kind == kind {
        Ok(())
    } else {
        let expected = match kind {
            TrackKind::Video => "video",
            TrackKind::Audio => "audio",
        };
        Err(ReelgenError::Placement(format!(
            "track {track} is not an {expected} track"
        )))
    }
}
