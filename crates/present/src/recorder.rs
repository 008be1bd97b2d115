//! Frame recording.
//!
//! Layout inside the recording directory:
//! ```text
//! 000001.ppm       - binary PPM (P6) per presented frame, named by step
//! manifest.json    - hash chain over every frame file
//! ```
//!
//! The manifest is held in memory while recording and written by
//! [`FrameRecorder::finish`], or on drop if `finish` was never called.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{Frame, PresentError, Presenter};

const MANIFEST_FILE: &str = "manifest.json";

/// One recorded frame in the manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingEntry {
    pub filename: String,
    pub step: u64,
    pub frame: u64,
    pub sha256: String,
    pub prev_hash: Option<String>,
}

/// Hash chain over all frames written to a recording directory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordingManifest {
    pub entries: Vec<RecordingEntry>,
}

/// Writes every frame it is given to disk.
pub struct FrameRecorder {
    root: PathBuf,
    manifest: RecordingManifest,
    dirty: bool,
}

impl FrameRecorder {
    /// Create the directory if needed and start a fresh manifest.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, PresentError> {
        let root = path.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        let recorder = Self {
            root,
            manifest: RecordingManifest::default(),
            dirty: false,
        };
        recorder.save_manifest()?;
        tracing::info!(dir = %recorder.root.display(), "recording frames");
        Ok(recorder)
    }

    /// Re-open an existing recording, e.g. to verify it.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PresentError> {
        let root = path.as_ref().to_path_buf();
        let manifest = serde_json::from_reader(std::fs::File::open(root.join(MANIFEST_FILE))?)?;
        Ok(Self {
            root,
            manifest,
            dirty: false,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manifest(&self) -> &RecordingManifest {
        &self.manifest
    }

    /// Write one frame and extend the hash chain. Returns the written path.
    pub fn record(&mut self, frame: &Frame<'_>) -> Result<PathBuf, PresentError> {
        frame.check()?;
        let filename = format!("{:06}.ppm", frame.step);
        let path = self.root.join(&filename);
        let bytes = encode_ppm(frame);
        std::fs::write(&path, &bytes)?;

        let prev_hash = self.manifest.entries.last().map(|e| e.sha256.clone());
        self.manifest.entries.push(RecordingEntry {
            filename,
            step: frame.step,
            frame: frame.image.frame,
            sha256: sha256_hex(&bytes),
            prev_hash,
        });
        self.dirty = true;
        Ok(path)
    }

    /// Write the manifest if frames were recorded since the last flush.
    pub fn finish(&mut self) -> Result<(), PresentError> {
        if self.dirty {
            self.save_manifest()?;
            self.dirty = false;
            tracing::debug!(frames = self.manifest.entries.len(), "recording manifest written");
        }
        Ok(())
    }

    /// Check chain continuity and every file's hash.
    pub fn verify(&self) -> Result<(), PresentError> {
        let mut prev_hash: Option<&str> = None;
        for entry in &self.manifest.entries {
            if entry.prev_hash.as_deref() != prev_hash {
                return Err(PresentError::IntegrityMismatch {
                    file: entry.filename.clone(),
                    expected: prev_hash.unwrap_or("None").to_string(),
                    actual: entry.prev_hash.clone().unwrap_or_else(|| "None".into()),
                });
            }
            let actual = sha256_hex(&std::fs::read(self.root.join(&entry.filename))?);
            if actual != entry.sha256 {
                return Err(PresentError::IntegrityMismatch {
                    file: entry.filename.clone(),
                    expected: entry.sha256.clone(),
                    actual,
                });
            }
            prev_hash = Some(&entry.sha256);
        }
        Ok(())
    }

    fn save_manifest(&self) -> Result<(), PresentError> {
        let file = std::fs::File::create(self.root.join(MANIFEST_FILE))?;
        serde_json::to_writer_pretty(file, &self.manifest)?;
        Ok(())
    }
}

impl Presenter for FrameRecorder {
    fn present(&mut self, frame: &Frame<'_>) -> Result<(), PresentError> {
        self.record(frame).map(|_| ())
    }

    fn finish(&mut self) -> Result<(), PresentError> {
        FrameRecorder::finish(self)
    }
}

impl Drop for FrameRecorder {
    fn drop(&mut self) {
        if let Err(err) = self.finish() {
            tracing::warn!(
                error = %err,
                dir = %self.root.display(),
                "failed to write recording manifest"
            );
        }
    }
}

fn encode_ppm(frame: &Frame<'_>) -> Vec<u8> {
    let header = format!("P6\n{} {}\n255\n", frame.image.width, frame.image.height);
    let mut bytes = Vec::with_capacity(header.len() + frame.image.pixels.len());
    bytes.extend_from_slice(header.as_bytes());
    bytes.extend_from_slice(&frame.image.pixels);
    bytes
}

fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}
