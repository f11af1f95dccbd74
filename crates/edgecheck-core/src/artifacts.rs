//! Fleet-wide check that the recorder is still producing video files.
//!
//! Files land in hour buckets, `{artifact_root}/{YYYY}/{MM}/{DD}/{HH}/`, and
//! carry the camera in their name as `*_stream0{n}_*.mp4`. The verifier
//! looks at every bucket overlapping the recent window, newest first, and
//! accepts a camera's newest file if it was modified inside the window.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Local};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::CameraConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ArtifactStatus {
    Pass,
    Fail,
}

/// The file accepted as evidence for one camera.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FoundArtifact {
    pub path: PathBuf,
    pub minutes_ago: f64,
}

/// Outcome of the artifact search for the whole fleet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoArtifactResult {
    pub status: ArtifactStatus,
    pub found: BTreeMap<u32, FoundArtifact>,
    pub missing_cameras: BTreeSet<u32>,
}

impl VideoArtifactResult {
    pub fn found_cameras(&self) -> BTreeSet<u32> {
        self.found.keys().copied().collect()
    }

    pub fn is_pass(&self) -> bool {
        self.status == ArtifactStatus::Pass
    }
}

/// Hour bucket directory holding files written at `at`.
pub fn hour_dir(artifact_root: &Path, at: DateTime<Local>) -> PathBuf {
    artifact_root
        .join(at.format("%Y").to_string())
        .join(at.format("%m").to_string())
        .join(at.format("%d").to_string())
        .join(at.format("%H").to_string())
}

/// Existing hour buckets covering `now` back `window_minutes`, newest first.
pub fn candidate_dirs(
    artifact_root: &Path,
    now: DateTime<Local>,
    window_minutes: i64,
) -> Vec<PathBuf> {
    let dirs: BTreeSet<PathBuf> = (0..=window_minutes.max(0))
        .map(|minutes| hour_dir(artifact_root, now - Duration::minutes(minutes)))
        .collect();

    dirs.into_iter().rev().filter(|dir| dir.is_dir()).collect()
}

/// Whether `file_name` follows the recorder's naming for `camera`.
pub fn matches_camera(file_name: &str, camera: u32) -> bool {
    if file_name.starts_with('.') {
        return false;
    }
    let Some(stem) = file_name.strip_suffix(".mp4") else {
        return false;
    };
    stem.contains(&format!("_stream0{camera}_"))
}

/// Searches the artifact tree for recent recordings of every camera.
#[derive(Debug, Clone)]
pub struct VideoArtifactVerifier {
    artifact_root: PathBuf,
    window_minutes: i64,
}

impl VideoArtifactVerifier {
    pub fn new(artifact_root: impl Into<PathBuf>) -> Self {
        Self {
            artifact_root: artifact_root.into(),
            window_minutes: 10,
        }
    }

    pub fn from_config(config: &CameraConfig) -> Self {
        Self {
            artifact_root: config.artifact_root.clone(),
            window_minutes: config.artifact_window_minutes,
        }
    }

    pub fn verify(&self, camera_count: u32) -> VideoArtifactResult {
        self.verify_at(camera_count, Local::now())
    }

    pub fn verify_at(&self, camera_count: u32, now: DateTime<Local>) -> VideoArtifactResult {
        if camera_count > 9 {
            warn!(
                camera_count,
                "Artifact names encode the camera as stream0N; cameras above 9 are matched as stream0NN"
            );
        }

        let dirs = candidate_dirs(&self.artifact_root, now, self.window_minutes);
        debug!(dirs = ?dirs, "Artifact search directories");

        let mut found = BTreeMap::new();
        for dir in &dirs {
            let entries = match list_mp4_files(dir) {
                Ok(entries) => entries,
                Err(err) => {
                    warn!(dir = %dir.display(), error = %err, "Failed to list artifact directory");
                    continue;
                }
            };

            for camera in 1..=camera_count {
                if found.contains_key(&camera) {
                    continue;
                }
                let newest = entries
                    .iter()
                    .filter(|(name, _, _)| matches_camera(name, camera))
                    .max_by_key(|(_, _, modified)| *modified);
                let Some((_, path, modified)) = newest else {
                    continue;
                };

                let age = now - *modified;
                if age <= Duration::minutes(self.window_minutes) {
                    let minutes_ago = age.num_milliseconds() as f64 / 60_000.0;
                    debug!(camera, path = %path.display(), minutes_ago, "Accepted artifact");
                    found.insert(
                        camera,
                        FoundArtifact {
                            path: path.clone(),
                            minutes_ago,
                        },
                    );
                } else {
                    debug!(camera, path = %path.display(), "Newest artifact is outside the window");
                }
            }
        }

        let missing_cameras: BTreeSet<u32> =
            (1..=camera_count).filter(|n| !found.contains_key(n)).collect();
        let status = if missing_cameras.is_empty() {
            info!(found = found.len(), "Video artifacts verified");
            ArtifactStatus::Pass
        } else {
            warn!(missing = ?missing_cameras, "Cameras without recent video artifacts");
            ArtifactStatus::Fail
        };

        VideoArtifactResult {
            status,
            found,
            missing_cameras,
        }
    }
}

/// `(file name, path, mtime)` for each regular `.mp4` file in `dir`.
fn list_mp4_files(dir: &Path) -> std::io::Result<Vec<(String, PathBuf, DateTime<Local>)>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if !name.ends_with(".mp4") {
            continue;
        }
        // The recorder may rotate a file away between listing and stat.
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }
        let Ok(modified) = metadata.modified() else {
            continue;
        };
        files.push((name, entry.path(), DateTime::<Local>::from(modified)));
    }
    Ok(files)
}
