//! Presentation boundary.
//!
//! # Invariants
//! - Presenters only read frames. They never call the simulator, so adding or
//!   removing one cannot change tick cadence or entity state.
//! - Only the primary entity carries a [`CameraRig`].
//!
//! The debug presenter stands in for an on-screen surface; the recorder
//! writes every frame it is given to disk with a hash-chained manifest.

mod debug;
mod recorder;
mod rig;

pub use debug::DebugTextPresenter;
pub use recorder::{FrameRecorder, RecordingEntry, RecordingManifest};
pub use rig::{CameraRig, RigSpec, CAMERA_BLUEPRINT};

use simlink_client::CameraImage;

/// Errors from presenting or recording frames.
#[derive(Debug, thiserror::Error)]
pub enum PresentError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("integrity check failed for {file}: expected {expected}, got {actual}")]
    IntegrityMismatch {
        file: String,
        expected: String,
        actual: String,
    },
    #[error("frame {frame} has {actual} bytes, expected {expected}")]
    MalformedImage {
        frame: u64,
        expected: usize,
        actual: usize,
    },
}

/// One frame handed to a presenter.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    /// Controller step that produced the frame, starting at 1.
    pub step: u64,
    pub image: &'a CameraImage,
}

impl Frame<'_> {
    fn check(&self) -> Result<(), PresentError> {
        let expected = self.image.width as usize * self.image.height as usize * 3;
        if self.image.pixels.len() != expected {
            return Err(PresentError::MalformedImage {
                frame: self.image.frame,
                expected,
                actual: self.image.pixels.len(),
            });
        }
        Ok(())
    }
}

/// A sink for camera frames, called once per controller step.
pub trait Presenter {
    fn present(&mut self, frame: &Frame<'_>) -> Result<(), PresentError>;

    /// Flush anything buffered. Called once when the simulation is torn down.
    fn finish(&mut self) -> Result<(), PresentError> {
        Ok(())
    }
}
