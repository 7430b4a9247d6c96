//! Silence detection for the render tail.
//!
//! After the last event the synthesizer may still ring (release stages,
//! reverb). The detector watches the interleaved output and reports when it
//! has decayed below a fixed energy gate.

use crate::config::DEFAULT_SILENCE_THRESHOLD;

/// Mean of the squared samples, accumulated in `f64`. Zero for an empty slice.
pub fn mean_squared(samples: &[f32]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|&s| f64::from(s) * f64::from(s)).sum();
    sum / samples.len() as f64
}

/// Fixed-threshold energy gate over the most recent block.
#[derive(Debug, Clone)]
pub struct TailDetector {
    threshold: f64,
    last_power: f64,
    blocks_observed: u64,
}

impl TailDetector {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            last_power: 0.0,
            blocks_observed: 0,
        }
    }

    /// Records the power of a freshly rendered interleaved block.
    pub fn observe(&mut self, interleaved: &[f32]) {
        self.last_power = mean_squared(interleaved);
        self.blocks_observed += 1;
    }

    /// True once at least one block was seen and the latest one is at or
    /// below the threshold. Never true before the first block.
    pub fn is_silent(&self) -> bool {
        self.blocks_observed > 0 && self.last_power <= self.threshold
    }

    pub fn last_power(&self) -> f64 {
        self.last_power
    }

    pub fn blocks_observed(&self) -> u64 {
        self.blocks_observed
    }
}

impl Default for TailDetector {
    fn default() -> Self {
        Self::new(DEFAULT_SILENCE_THRESHOLD)
    }
}
