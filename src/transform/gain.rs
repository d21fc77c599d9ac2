//! Gain/volume control transform

use super::{BlockContext, Transform};

/// Scales the signal, gliding towards the target gain to avoid clicks.
///
/// The glide position is the transform's only state, so a fresh `Gain`
/// starts exactly at its target.
pub struct Gain {
    gain: f32,
    /// Smoothing to prevent clicks on rapid gain changes
    smoothed_gain: f32,
    /// Smoothing coefficient (0.0 = instant, 1.0 = no change)
    smooth_coeff: f32,
}

impl Gain {
    /// Create a new gain transform with the specified gain value
    pub fn new(gain: f32) -> Self {
        Self {
            gain,
            smoothed_gain: gain,
            smooth_coeff: 0.995, // ~7ms at 48kHz
        }
    }

    /// Set the smoothing time in milliseconds
    pub fn with_smoothing_ms(mut self, ms: f32, sample_rate: u32) -> Self {
        // Time constant: after `ms` milliseconds, we've reached ~63% of target
        let samples = (ms / 1000.0) * sample_rate as f32;
        self.smooth_coeff = if samples > 0.0 { (-1.0 / samples).exp() } else { 0.0 };
        self
    }

    /// Disable smoothing for instant gain changes
    pub fn without_smoothing(mut self) -> Self {
        self.smooth_coeff = 0.0;
        self
    }

    /// Start the glide from `gain` instead of the target (builder pattern).
    pub fn starting_at(mut self, gain: f32) -> Self {
        self.smoothed_gain = gain;
        self
    }

    #[inline]
    pub fn gain(&self) -> f32 {
        self.gain
    }

    /// Change the target gain. Takes effect from the next sample processed.
    pub fn set_gain(&mut self, gain: f32) {
        self.gain = gain;
    }
}

impl Transform for Gain {
    fn process(&mut self, _ctx: &BlockContext, input: &[f32], output: &mut [f32]) {
        let target = self.gain;
        let coeff = self.smooth_coeff;
        let mut gain = self.smoothed_gain;

        for (out_sample, &in_sample) in output.iter_mut().zip(input) {
            gain = target + coeff * (gain - target);
            *out_sample = in_sample * gain;
        }

        self.smoothed_gain = gain;
    }

    fn name(&self) -> &'static str {
        "gain"
    }
}
