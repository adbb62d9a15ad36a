//! AU Classifier
//!
//! Turns a feature vector and the frozen baseline into per-AU activation and
//! a 0-5 intensity level from the deviation magnitude. AUs listed in
//! `ClassifierParams::directional` only count movement along their polarity.
//! Thresholds drift slowly with the long-run activation rate so persistently
//! noisy AUs stop dominating.

use serde::Serialize;

use crate::calibration::BaselineProfile;
use crate::config::{ClassifierParams, DeviationMode};
use crate::types::{AuFeatureVector, AuId, AuMap, MAX_INTENSITY};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct AuState {
    pub available: bool,
    /// Signed deviation from baseline (relative or z-score)
    pub deviation: f64,
    pub activated: bool,
    pub intensity: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuResult {
    pub aus: AuMap<AuState>,
    pub calibrated: bool,
}

impl AuResult {
    pub fn is_active(&self, au: AuId) -> bool {
        self.aus[au].activated
    }

    pub fn active_count(&self) -> usize {
        self.aus.values().filter(|s| s.activated).count()
    }
}

pub struct AuClassifier {
    params: ClassifierParams,
    initial_thresholds: AuMap<f64>,
    thresholds: AuMap<f64>,
    activations: AuMap<u64>,
    observations: AuMap<u64>,
}

impl AuClassifier {
    pub fn new(params: ClassifierParams) -> Self {
        let initial_thresholds = AuMap::from_fn(|au| params.threshold_for(au));
        Self {
            params,
            thresholds: initial_thresholds,
            initial_thresholds,
            activations: AuMap::splat(0),
            observations: AuMap::splat(0),
        }
    }

    pub fn classify(
        &mut self,
        features: &AuFeatureVector,
        baseline: Option<&BaselineProfile>,
    ) -> AuResult {
        let Some(baseline) = baseline else {
            let aus = features.map(|_, value| AuState {
                available: value.is_some(),
                ..AuState::default()
            });
            return AuResult {
                aus,
                calibrated: false,
            };
        };

        let mut aus = AuMap::<AuState>::default();
        for (au, value) in features.iter() {
            let Some(value) = *value else {
                continue;
            };
            let deviation = self.deviation(au, value, baseline);
            let directed = self.magnitude(au, deviation);
            let activated = directed > self.thresholds[au];
            aus[au] = AuState {
                available: true,
                deviation,
                activated,
                intensity: self.intensity_level(directed),
            };
            self.adapt(au, activated);
        }

        AuResult {
            aus,
            calibrated: true,
        }
    }

    pub fn threshold(&self, au: AuId) -> f64 {
        self.thresholds[au]
    }

    /// Long-run activation rate since calibration.
    pub fn activation_rate(&self, au: AuId) -> f64 {
        let observed = self.observations[au];
        if observed == 0 {
            0.0
        } else {
            self.activations[au] as f64 / observed as f64
        }
    }

    pub fn reset(&mut self) {
        self.thresholds = self.initial_thresholds;
        self.activations = AuMap::splat(0);
        self.observations = AuMap::splat(0);
    }

    fn deviation(&self, au: AuId, value: f64, baseline: &BaselineProfile) -> f64 {
        let center = baseline.center_of(au);
        let scale = match self.params.mode {
            DeviationMode::Relative => center.abs().max(self.params.center_floor),
            DeviationMode::ZScore => baseline.spread_of(au).max(self.params.center_floor),
        };
        (value - center) / scale
    }

    fn magnitude(&self, au: AuId, deviation: f64) -> f64 {
        if self.params.directional.contains(&au) {
            au.polarity().project(deviation)
        } else {
            deviation.abs()
        }
    }

    fn intensity_level(&self, directed: f64) -> u8 {
        let level = self
            .params
            .intensity_boundaries
            .iter()
            .take_while(|b| directed >= **b)
            .count();
        level.min(MAX_INTENSITY as usize) as u8
    }

    fn adapt(&mut self, au: AuId, activated: bool) {
        self.observations[au] += 1;
        if activated {
            self.activations[au] += 1;
        }

        let adaptation = &self.params.adaptation;
        if !adaptation.enabled || self.observations[au] < adaptation.warmup_frames {
            return;
        }
        if self.observations[au] == adaptation.warmup_frames {
            tracing::debug!(au = au.as_str(), rate = self.activation_rate(au), "threshold adaptation started");
        }

        let rate = self.activation_rate(au);
        let factor = if rate > adaptation.upper_rate {
            adaptation.raise_factor
        } else if rate < adaptation.lower_rate {
            adaptation.lower_factor
        } else {
            return;
        };

        let initial = self.initial_thresholds[au];
        self.thresholds[au] = (self.thresholds[au] * factor)
            .clamp(initial * adaptation.min_scale, initial * adaptation.max_scale);
    }
}

impl Default for AuClassifier {
    fn default() -> Self {
        Self::new(ClassifierParams::default())
    }
}
