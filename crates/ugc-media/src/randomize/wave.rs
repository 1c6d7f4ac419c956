//! Smooth time functions built from superposed sine waves.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;
use ugc_models::ParamRange;

use super::params::sample_range;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WaveComponent {
    pub amplitude: f64,
    pub frequency: f64,
    pub phase: f64,
}

/// `Σ amplitude · sin(2π · frequency · t + phase)`, fixed once per video.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WaveFunction {
    pub components: Vec<WaveComponent>,
}

impl WaveFunction {
    /// Draw `count` components. The peak amplitude is split evenly so the
    /// sum stays within `±peak`.
    pub fn sample<R: Rng + ?Sized>(
        rng: &mut R,
        count: usize,
        peak: f64,
        frequency: &ParamRange,
    ) -> Self {
        let count = count.max(1);
        let share = peak / count as f64;
        let components = (0..count)
            .map(|_| WaveComponent {
                amplitude: share * rng.random_range(0.5..=1.0),
                frequency: sample_range(rng, frequency),
                phase: rng.random_range(0.0..TAU),
            })
            .collect();
        Self { components }
    }

    pub fn eval(&self, t: f64) -> f64 {
        self.components
            .iter()
            .map(|c| c.amplitude * (TAU * c.frequency * t + c.phase).sin())
            .sum()
    }

    /// Upper bound of `|eval(t)|`.
    pub fn peak(&self) -> f64 {
        self.components.iter().map(|c| c.amplitude.abs()).sum()
    }

    pub fn is_flat(&self) -> bool {
        self.peak() == 0.0
    }
}
