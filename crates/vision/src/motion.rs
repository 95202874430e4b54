//! Background-subtraction motion gate.

use crate::frame::Frame;

/// Value a changed pixel contributes to the score.
const LIT: u64 = 255;

/// Scores frames against an exponentially-weighted running background.
///
/// The background is seeded from the first frame and updated on every call,
/// so slow lighting drift is absorbed while abrupt change scores high.
#[derive(Debug, Clone)]
pub struct MotionGate {
    learning_rate: f32,
    pixel_threshold: u8,
    background: Option<Background>,
}

#[derive(Debug, Clone)]
struct Background {
    dims: (u32, u32),
    mean: Vec<f32>,
}

impl MotionGate {
    /// - `learning_rate`: weight of the new frame in the running average.
    /// - `pixel_threshold`: deltas strictly above this count as changed.
    pub fn new(learning_rate: f32, pixel_threshold: u8) -> Self {
        Self {
            learning_rate,
            pixel_threshold,
            background: None,
        }
    }

    /// Update the background with `frame` and return its motion score.
    ///
    /// The first frame (and any frame whose dimensions differ from the
    /// current background) seeds the model and scores 0.
    pub fn score(&mut self, frame: &Frame) -> u64 {
        let matches = match &self.background {
            Some(bg) if bg.dims == frame.dimensions() => true,
            Some(bg) => {
                tracing::warn!(
                    old = ?bg.dims,
                    new = ?frame.dimensions(),
                    "frame dimensions changed, reseeding background"
                );
                false
            }
            None => false,
        };
        if !matches {
            self.background = Some(Background {
                dims: frame.dimensions(),
                mean: frame.pixels().iter().map(|&p| p as f32).collect(),
            });
            return 0;
        }
        let Some(bg) = self.background.as_mut() else {
            return 0;
        };

        let alpha = self.learning_rate;
        let keep = 1.0 - alpha;
        let threshold = self.pixel_threshold;
        let mut lit = 0u64;

        for (mean, &pixel) in bg.mean.iter_mut().zip(frame.pixels()) {
            *mean = *mean * keep + pixel as f32 * alpha;
            let reference = mean.round().clamp(0.0, 255.0) as u8;
            if pixel.abs_diff(reference) > threshold {
                lit += 1;
            }
        }

        lit * LIT
    }

    /// Whether the background has been seeded.
    pub fn is_seeded(&self) -> bool {
        self.background.is_some()
    }

    /// Drop the background so the next frame reseeds it.
    pub fn reset(&mut self) {
        self.background = None;
    }
}
