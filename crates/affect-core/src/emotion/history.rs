//! Exponentially weighted attention over recent distributions.

use std::collections::VecDeque;

use crate::config::HistoryFilterParams;
use crate::types::{EmotionDistribution, EMOTION_COUNT};

pub struct HistoryFilter {
    window: usize,
    current_weight: f64,
    history: VecDeque<EmotionDistribution>,
}

impl HistoryFilter {
    pub fn new(params: &HistoryFilterParams) -> Self {
        Self {
            window: params.window.max(1),
            current_weight: params.current_weight.clamp(0.0, 1.0),
            history: VecDeque::with_capacity(params.window.max(1)),
        }
    }

    /// Blends `current` with the weighted history, then records `current`.
    pub fn apply(&mut self, current: EmotionDistribution) -> EmotionDistribution {
        let output = match self.weighted_history() {
            Some(past) => {
                let mut blended = [0.0; EMOTION_COUNT];
                for (i, slot) in blended.iter_mut().enumerate() {
                    *slot = self.current_weight * current.as_array()[i]
                        + (1.0 - self.current_weight) * past[i];
                }
                EmotionDistribution::from_scores(blended)
            }
            None => current,
        };

        self.history.push_back(current);
        if self.history.len() > self.window {
            self.history.pop_front();
        }
        output
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn reset(&mut self) {
        self.history.clear();
    }

    /// Weights `exp(linspace(-1, 0, n))`, oldest to newest.
    fn weighted_history(&self) -> Option<[f64; EMOTION_COUNT]> {
        let n = self.history.len();
        if n == 0 {
            return None;
        }
        let weight = |j: usize| {
            if n == 1 {
                1.0
            } else {
                (-1.0 + j as f64 / (n - 1) as f64).exp()
            }
        };

        let mut acc = [0.0; EMOTION_COUNT];
        let mut total = 0.0;
        for (j, dist) in self.history.iter().enumerate() {
            let w = weight(j);
            total += w;
            for (slot, p) in acc.iter_mut().zip(dist.as_array()) {
                *slot += w * p;
            }
        }
        Some(acc.map(|v| v / total))
    }
}

impl Default for HistoryFilter {
    fn default() -> Self {
        Self::new(&HistoryFilterParams::default())
    }
}
