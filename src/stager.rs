//! Persisting downloaded artifacts and registering them with the media pool.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind as IoErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ReelgenError, Result};
use crate::host::{MediaHandle, MediaPool};
use crate::orchestrator::Artifact;
use crate::timeline::{Frame, FrameRate};

const MAX_STEM_LEN: usize = 64;
const MAX_SUFFIX: u32 = 10_000;

/// A generated file that now lives in the host's media pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagedMedia {
    pub local_path: PathBuf,
    pub handle: MediaHandle,
    /// Length in frames at `frame_rate`.
    pub duration: Frame,
    pub frame_rate: FrameRate,
}

impl StagedMedia {
    pub fn duration_secs(&self) -> f64 {
        self.frame_rate.seconds(self.duration)
    }
}

#[derive(Debug, Clone)]
pub struct MediaStager {
    staging_dir: Option<PathBuf>,
}

impl MediaStager {
    /// Stage into `staging_dir`, or into the host's project media folder when
    /// `None`.
    pub fn new(staging_dir: Option<PathBuf>) -> Self {
        Self { staging_dir }
    }

    /// Write the artifact to disk under a free name and import it.
    ///
    /// Takes the artifact by value: each fetched result can be staged once.
    /// Calling this twice with equal bytes still produces two pool entries.
    pub fn stage<P: MediaPool>(
        &self,
        pool: &mut P,
        artifact: Artifact,
        suggested_name: &str,
    ) -> Result<StagedMedia> {
        let dir = self.resolve_dir(pool)?;
        std::fs::create_dir_all(&dir).map_err(|e| {
            ReelgenError::Storage(format!("cannot create {}: {e}", dir.display()))
        })?;

        let stem = sanitize_stem(suggested_name, &artifact.job_id);
        let (path, mut file) = create_unique(&dir, &stem, artifact.extension)?;
        write_all(&mut file, &path, &artifact.bytes)?;
        info!(path = %path.display(), bytes = artifact.bytes.len(), "wrote generated media");

        match pool.import_media(&path) {
            Ok(item) => Ok(StagedMedia {
                local_path: path,
                handle: item.handle,
                duration: item.duration,
                frame_rate: item.frame_rate,
            }),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "media pool rejected file");
                let _ = std::fs::remove_file(&path);
                Err(match err {
                    ReelgenError::Import(_) => err,
                    other => ReelgenError::Import(other.to_string()),
                })
            }
        }
    }

    fn resolve_dir<P: MediaPool>(&self, pool: &P) -> Result<PathBuf> {
        if let Some(dir) = &self.staging_dir {
            return Ok(dir.clone());
        }
        pool.project_media_folder().ok_or_else(|| {
            ReelgenError::Import(
                "no project media folder could be resolved; set staging_dir".into(),
            )
        })
    }
}

/// Spaces become underscores; anything outside `[A-Za-z0-9._-]` is dropped.
fn sanitize_stem(suggested: &str, fallback: &str) -> String {
    let stem: String = suggested
        .trim()
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        .take(MAX_STEM_LEN)
        .collect();
    let stem = stem.trim_matches('.');
    if stem.is_empty() {
        format!("generated_{fallback}")
    } else {
        stem.to_string()
    }
}

fn create_unique(dir: &Path, stem: &str, extension: &str) -> Result<(PathBuf, File)> {
    for n in 0..MAX_SUFFIX {
        let name = if n == 0 {
            format!("{stem}.{extension}")
        } else {
            format!("{stem}_{n}.{extension}")
        };
        let path = dir.join(name);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == IoErrorKind::AlreadyExists => continue,
            Err(e) => {
                return Err(ReelgenError::Storage(format!(
                    "cannot create {}: {e}",
                    path.display()
                )));
            }
        }
    }
    Err(ReelgenError::Storage(format!(
        "no free file name for {stem}.{extension} in {}",
        dir.display()
    )))
}

fn write_all(file: &mut File, path: &Path, bytes: &[u8]) -> Result<()> {
    let result = file.write_all(bytes).and_then(|_| file.sync_all());
    if let Err(e) = result {
        let _ = std::fs::remove_file(path);
        return Err(ReelgenError::Storage(format!(
            "cannot write {}: {e}",
            path.display()
        )));
    }
    Ok(())
}
