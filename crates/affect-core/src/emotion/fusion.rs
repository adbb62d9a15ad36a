//! Ensemble fusion of the per-source distributions.
//!
//! Fixed mode is a convex combination of the prior weights. Attention mode
//! scores each source by its own confidence and its feedback hit rate, and
//! blends the softmax of those scores with the prior.

use serde::{Deserialize, Serialize};

use crate::config::{FusionMode, FusionParams, SourceWeights};
use crate::types::{EmotionDistribution, EMOTION_COUNT};

use super::{EmotionSource, SourceEstimate};

/// Effective weight of each source for one frame; absent sources get 0.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct FusionWeights {
    pub au: f64,
    pub geometric: f64,
    pub voice: f64,
}

impl FusionWeights {
    pub fn get(&self, source: EmotionSource) -> f64 {
        match source {
            EmotionSource::Au => self.au,
            EmotionSource::Geometric => self.geometric,
            EmotionSource::Voice => self.voice,
        }
    }

    fn set(&mut self, source: EmotionSource, value: f64) {
        match source {
            EmotionSource::Au => self.au = value,
            EmotionSource::Geometric => self.geometric = value,
            EmotionSource::Voice => self.voice = value,
        }
    }
}

fn prior_weight(weights: &SourceWeights, source: EmotionSource) -> f64 {
    match source {
        EmotionSource::Au => weights.au,
        EmotionSource::Geometric => weights.geometric,
        EmotionSource::Voice => weights.voice,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SourceRecord {
    pub hits: u64,
    pub total: u64,
}

/// Feedback-tracked hit rate per source.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SourceTracker {
    pub au: SourceRecord,
    pub geometric: SourceRecord,
    pub voice: SourceRecord,
}

impl SourceTracker {
    fn record_mut(&mut self, source: EmotionSource) -> &mut SourceRecord {
        match source {
            EmotionSource::Au => &mut self.au,
            EmotionSource::Geometric => &mut self.geometric,
            EmotionSource::Voice => &mut self.voice,
        }
    }

    pub fn record(&mut self, source: EmotionSource, hit: bool) {
        let record = self.record_mut(source);
        record.total += 1;
        if hit {
            record.hits += 1;
        }
    }

    /// Laplace-smoothed hit rate; 0.5 before any feedback.
    pub fn accuracy(&self, source: EmotionSource) -> f64 {
        let record = match source {
            EmotionSource::Au => self.au,
            EmotionSource::Geometric => self.geometric,
            EmotionSource::Voice => self.voice,
        };
        (record.hits as f64 + 1.0) / (record.total as f64 + 2.0)
    }
}

pub struct EnsembleFusion {
    params: FusionParams,
}

impl EnsembleFusion {
    pub fn new(params: FusionParams) -> Self {
        Self { params }
    }

    pub fn weights(&self, sources: &[SourceEstimate], tracker: &SourceTracker) -> FusionWeights {
        let mut weights = FusionWeights::default();
        if sources.is_empty() {
            return weights;
        }

        let prior: Vec<f64> = sources
            .iter()
            .map(|s| prior_weight(&self.params.weights, s.source).max(0.0))
            .collect();
        let prior = normalize(prior);

        let combined = match self.params.mode {
            FusionMode::Fixed => prior,
            FusionMode::Attention => {
                let share = self.params.confidence_share;
                let scores: Vec<f64> = sources
                    .iter()
                    .map(|s| {
                        self.params.sharpness
                            * (share * s.confidence + (1.0 - share) * tracker.accuracy(s.source))
                    })
                    .collect();
                let attention = softmax(&scores);
                let blend = self.params.prior_blend;
                normalize(
                    prior
                        .iter()
                        .zip(attention.iter())
                        .map(|(p, a)| blend * p + (1.0 - blend) * a)
                        .collect(),
                )
            }
        };

        for (source, weight) in sources.iter().zip(combined) {
            weights.set(source.source, weight);
        }
        weights
    }

    pub fn fuse(
        &self,
        sources: &[SourceEstimate],
        tracker: &SourceTracker,
    ) -> (EmotionDistribution, FusionWeights) {
        let weights = self.weights(sources, tracker);
        let mut mixed = [0.0; EMOTION_COUNT];
        for source in sources {
            let w = weights.get(source.source);
            for (slot, p) in mixed.iter_mut().zip(source.distribution.as_array()) {
                *slot += w * p;
            }
        }
        (EmotionDistribution::from_scores(mixed), weights)
    }
}

fn softmax(scores: &[f64]) -> Vec<f64> {
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = scores.iter().map(|s| (s - max).exp()).collect();
    normalize(exps)
}

fn normalize(values: Vec<f64>) -> Vec<f64> {
    let total: f64 = values.iter().sum();
    if total <= 0.0 || !total.is_finite() {
        let n = values.len().max(1) as f64;
        return vec![1.0 / n; values.len()];
    }
    values.into_iter().map(|v| v / total).collect()
}
