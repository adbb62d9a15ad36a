//! Temporal Smoother
//!
//! Bounded sliding windows over the classifier output: majority vote for
//! activation, arithmetic mean for intensity. A second smoother votes over
//! the emotion label stream.

use std::collections::VecDeque;

use serde::Serialize;

use crate::classifier::AuResult;
use crate::config::SmoothingParams;
use crate::types::{AuId, AuMap, Emotion, EMOTION_COUNT};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct SmoothedAu {
    /// False until the AU has been observed at least once
    pub available: bool,
    pub active: bool,
    /// Mean intensity over the window, 0-5
    pub intensity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SmoothedAuState {
    pub aus: AuMap<SmoothedAu>,
    pub timestamp_ms: f64,
}

impl SmoothedAuState {
    pub fn empty(timestamp_ms: f64) -> Self {
        Self {
            aus: AuMap::default(),
            timestamp_ms,
        }
    }

    #[inline]
    pub fn is_active(&self, au: AuId) -> bool {
        self.aus[au].active
    }

    #[inline]
    pub fn intensity(&self, au: AuId) -> f64 {
        self.aus[au].intensity
    }

    pub fn active_count(&self) -> usize {
        self.aus.values().filter(|s| s.active).count()
    }

    pub fn active_aus(&self) -> impl Iterator<Item = AuId> + '_ {
        self.aus.iter().filter(|(_, s)| s.active).map(|(au, _)| au)
    }
}

#[derive(Debug, Clone, Default)]
struct AuWindow {
    activations: VecDeque<bool>,
    intensities: VecDeque<f64>,
    last: SmoothedAu,
}

impl AuWindow {
    fn push(&mut self, active: bool, intensity: f64, capacity: usize) -> SmoothedAu {
        self.activations.push_back(active);
        self.intensities.push_back(intensity);
        while self.activations.len() > capacity {
            self.activations.pop_front();
            self.intensities.pop_front();
        }

        let len = self.activations.len();
        let count = self.activations.iter().filter(|a| **a).count();
        self.last = SmoothedAu {
            available: true,
            active: 2 * count >= len,
            intensity: self.intensities.iter().sum::<f64>() / len as f64,
        };
        self.last
    }

    fn clear(&mut self) {
        self.activations.clear();
        self.intensities.clear();
        self.last = SmoothedAu::default();
    }
}

/// Recent smoothed intensities with their frame timestamps.
#[derive(Debug, Clone)]
pub struct IntensityHistory {
    capacity: usize,
    timestamps: VecDeque<f64>,
    series: AuMap<VecDeque<f64>>,
}

impl IntensityHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            timestamps: VecDeque::with_capacity(capacity),
            series: AuMap::from_fn(|_| VecDeque::with_capacity(capacity)),
        }
    }

    pub fn push(&mut self, state: &SmoothedAuState) {
        self.timestamps.push_back(state.timestamp_ms);
        if self.timestamps.len() > self.capacity {
            self.timestamps.pop_front();
        }
        for (au, values) in self.series.iter_mut() {
            values.push_back(state.aus[au].intensity);
            if values.len() > self.capacity {
                values.pop_front();
            }
        }
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn timestamps(&self) -> &VecDeque<f64> {
        &self.timestamps
    }

    pub fn series(&self, au: AuId) -> &VecDeque<f64> {
        &self.series[au]
    }

    pub fn clear(&mut self) {
        self.timestamps.clear();
        for (_, values) in self.series.iter_mut() {
            values.clear();
        }
    }
}

pub struct TemporalSmoother {
    window: usize,
    windows: AuMap<AuWindow>,
    history: IntensityHistory,
}

impl TemporalSmoother {
    pub fn new(params: &SmoothingParams) -> Self {
        Self {
            window: params.au_window.max(1),
            windows: AuMap::default(),
            history: IntensityHistory::new(params.intensity_history),
        }
    }

    /// Unavailable AUs are not pushed and keep their previous smoothed value.
    pub fn push(&mut self, result: &AuResult, timestamp_ms: f64) -> SmoothedAuState {
        let window = self.window;
        for (au, au_window) in self.windows.iter_mut() {
            let state = result.aus[au];
            if state.available {
                au_window.push(state.activated, f64::from(state.intensity), window);
            }
        }
        let smoothed = SmoothedAuState {
            aus: self.windows.map(|_, w| w.last),
            timestamp_ms,
        };
        self.history.push(&smoothed);
        smoothed
    }

    pub fn history(&self) -> &IntensityHistory {
        &self.history
    }

    pub fn reset(&mut self) {
        for (_, w) in self.windows.iter_mut() {
            w.clear();
        }
        self.history.clear();
    }
}

/// Majority vote over recent labels; ties go to the most recent contender.
pub struct LabelSmoother {
    window: usize,
    labels: VecDeque<Emotion>,
}

impl LabelSmoother {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            labels: VecDeque::with_capacity(window.max(1)),
        }
    }

    pub fn push(&mut self, label: Emotion) -> Emotion {
        self.labels.push_back(label);
        if self.labels.len() > self.window {
            self.labels.pop_front();
        }
        self.current().unwrap_or(label)
    }

    pub fn current(&self) -> Option<Emotion> {
        let mut counts = [0usize; EMOTION_COUNT];
        let mut last_seen = [0usize; EMOTION_COUNT];
        for (i, label) in self.labels.iter().enumerate() {
            counts[label.index()] += 1;
            last_seen[label.index()] = i;
        }
        Emotion::ALL
            .iter()
            .copied()
            .filter(|e| counts[e.index()] > 0)
            .max_by_key(|e| (counts[e.index()], last_seen[e.index()]))
    }

    pub fn reset(&mut self) {
        self.labels.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::AuState;

    fn result_with(au: AuId, activated: bool, intensity: u8) -> AuResult {
        let mut aus = AuMap::splat(AuState {
            available: true,
            ..Default::default()
        });
        aus[au] = AuState {
            available: true,
            deviation: 0.0,
            activated,
            intensity,
        };
        AuResult {
            aus,
            calibrated: true,
        }
    }

    #[test]
    fn test_majority_and_mean() {
        let mut smoother = TemporalSmoother::new(&SmoothingParams::default());
        let mut state = SmoothedAuState::empty(0.0);
        for (i, (active, level)) in [(true, 4), (true, 4), (false, 0), (true, 4), (false, 0)]
            .into_iter()
            .enumerate()
        {
            state = smoother.push(&result_with(AuId::Au4, active, level), i as f64);
        }
        assert!(state.is_active(AuId::Au4));
        assert!((state.intensity(AuId::Au4) - 2.4).abs() < 1e-12);
        assert!(!state.is_active(AuId::Au1));
    }

    #[test]
    fn test_even_window_tie_counts_as_active() {
        let mut smoother = TemporalSmoother::new(&SmoothingParams {
            au_window: 2,
            ..Default::default()
        });
        smoother.push(&result_with(AuId::Au4, true, 3), 0.0);
        let state = smoother.push(&result_with(AuId::Au4, false, 0), 1.0);
        assert!(state.is_active(AuId::Au4));
    }

    #[test]
    fn test_unavailable_holds_previous_value() {
        let mut smoother = TemporalSmoother::new(&SmoothingParams::default());
        let before = smoother.push(&result_with(AuId::Au12, true, 5), 0.0);
        let mut missing = result_with(AuId::Au12, false, 0);
        missing.aus[AuId::Au12].available = false;
        let after = smoother.push(&missing, 1.0);
        assert_eq!(before.aus[AuId::Au12], after.aus[AuId::Au12]);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut smoother = TemporalSmoother::new(&SmoothingParams::default());
        for i in 0..40 {
            smoother.push(&result_with(AuId::Au1, false, 0), i as f64);
        }
        let history = smoother.history();
        assert_eq!(history.len(), 20);
        assert_eq!(history.series(AuId::Au1).len(), 20);
        assert_eq!(history.timestamps().front().copied(), Some(20.0));
    }

    #[test]
    fn test_label_majority_with_recent_tie_break() {
        let mut labels = LabelSmoother::new(4);
        labels.push(Emotion::Sad);
        labels.push(Emotion::Sad);
        labels.push(Emotion::Happy);
        assert_eq!(labels.push(Emotion::Happy), Emotion::Happy);
        assert_eq!(labels.push(Emotion::Sad), Emotion::Sad);
    }

    #[test]
    fn test_label_majority_ignores_single_outlier() {
        let mut labels = LabelSmoother::new(5);
        for _ in 0..4 {
            labels.push(Emotion::Sad);
        }
        assert_eq!(labels.push(Emotion::Neutral), Emotion::Sad);
    }
}
