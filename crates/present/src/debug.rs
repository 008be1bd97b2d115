use crate::{Frame, PresentError, Presenter};

/// Headless stand-in for an on-screen surface.
///
/// Produces a one-line text summary of every frame and keeps the most recent
/// one. Useful for CLI output, logging, and testing the presentation path.
#[derive(Debug)]
pub struct DebugTextPresenter {
    display: [u32; 2],
    frames_presented: u64,
    last: Option<String>,
}

impl DebugTextPresenter {
    pub fn new(display: [u32; 2]) -> Self {
        Self {
            display,
            frames_presented: 0,
            last: None,
        }
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    pub fn last(&self) -> Option<&str> {
        self.last.as_deref()
    }

    fn describe(&self, frame: &Frame<'_>) -> String {
        let image = frame.image;
        let pixels = image.pixels.len().max(1) as u64;
        let brightness = image.pixels.iter().map(|&p| u64::from(p)).sum::<u64>() / pixels;
        let scaled = if [image.width, image.height] == self.display {
            String::new()
        } else {
            format!(" scaled-to={}x{}", self.display[0], self.display[1])
        };
        format!(
            "step={} frame={} image={}x{}{} brightness={}",
            frame.step, image.frame, image.width, image.height, scaled, brightness
        )
    }
}

impl Default for DebugTextPresenter {
    fn default() -> Self {
        Self::new([1280, 720])
    }
}

impl Presenter for DebugTextPresenter {
    fn present(&mut self, frame: &Frame<'_>) -> Result<(), PresentError> {
        frame.check()?;
        let line = self.describe(frame);
        tracing::debug!(target: "simlink::present", "{line}");
        self.last = Some(line);
        self.frames_presented += 1;
        Ok(())
    }
}
