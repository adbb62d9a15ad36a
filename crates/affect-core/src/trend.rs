//! Temporal Trend Analyzer
//!
//! Long-window statistics over the reported label stream: how often the
//! label changes, how long positive and negative runs last, and whether
//! affect polarity is drifting downwards.

use std::collections::VecDeque;

use serde::Serialize;

use crate::config::TrendParams;
use crate::types::{Emotion, Valence};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrendMetrics {
    pub frames: usize,
    pub change_rate: f64,
    /// Mean positive-run length in frames
    pub positive_dwell: f64,
    /// Mean negative-run length in frames
    pub negative_dwell: f64,
    pub negative_ratio: f64,
    pub stability: f64,
    /// Polarity change per frame
    pub trend_slope: f64,
    pub micro_expression_rate: f64,
    pub depression_score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TrendSummary {
    InsufficientData { frames: usize, required: usize },
    Analyzed(TrendMetrics),
}

impl TrendSummary {
    pub fn metrics(&self) -> Option<&TrendMetrics> {
        match self {
            TrendSummary::Analyzed(m) => Some(m),
            TrendSummary::InsufficientData { .. } => None,
        }
    }
}

pub struct TemporalTrendAnalyzer {
    params: TrendParams,
    history: VecDeque<Emotion>,
}

impl TemporalTrendAnalyzer {
    pub fn new(params: TrendParams) -> Self {
        Self {
            history: VecDeque::with_capacity(params.long_window),
            params,
        }
    }

    pub fn push(&mut self, label: Emotion) {
        self.history.push_back(label);
        if self.history.len() > self.params.long_window {
            self.history.pop_front();
        }
    }

    pub fn analyze(&self) -> TrendSummary {
        let labels: Vec<Emotion> = self.history.iter().copied().collect();
        analyze_labels(&labels, &self.params)
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
}

impl Default for TemporalTrendAnalyzer {
    fn default() -> Self {
        Self::new(TrendParams::default())
    }
}

/// Analyzes the last `long_window` labels of `labels`.
pub fn analyze_labels(labels: &[Emotion], params: &TrendParams) -> TrendSummary {
    let labels = &labels[labels.len().saturating_sub(params.long_window)..];
    let n = labels.len();
    if n < params.short_window || n < 2 {
        return TrendSummary::InsufficientData {
            frames: n,
            required: params.short_window.max(2),
        };
    }

    let changes = labels.windows(2).filter(|w| w[0] != w[1]).count();
    let change_rate = changes as f64 / (n - 1) as f64;

    let runs = runs(labels);
    let mean_run = |valence: Valence| {
        let lengths: Vec<usize> = runs
            .iter()
            .filter(|(label, _)| label.valence() == valence)
            .map(|(_, len)| *len)
            .collect();
        if lengths.is_empty() {
            0.0
        } else {
            lengths.iter().sum::<usize>() as f64 / lengths.len() as f64
        }
    };
    let positive_dwell = mean_run(Valence::Positive);
    let negative_dwell = mean_run(Valence::Negative);

    let negative_ratio = labels.iter().filter(|l| l.is_negative()).count() as f64 / n as f64;
    let polarity: Vec<f64> = labels.iter().map(|l| l.polarity()).collect();
    let stability = 1.0 / (1.0 + compute_variance(&polarity));
    let trend_slope = compute_slope(&polarity);

    let short_runs = runs
        .iter()
        .filter(|(_, len)| *len < params.micro_run_frames)
        .count();
    let micro_expression_rate = short_runs as f64 / runs.len() as f64;

    let w = &params.weights;
    let low_change = 1.0 - (change_rate / params.change_rate_ceiling.max(f64::EPSILON)).min(1.0);
    let downward = (-trend_slope * params.long_window as f64 / 2.0).clamp(0.0, 1.0);
    let depression_score = (w.change * low_change
        + w.duration * negative_ratio
        + w.stability * stability
        + w.trend * downward
        + w.micro * (1.0 - micro_expression_rate))
        .clamp(0.0, 1.0);

    TrendSummary::Analyzed(TrendMetrics {
        frames: n,
        change_rate,
        positive_dwell,
        negative_dwell,
        negative_ratio,
        stability,
        trend_slope,
        micro_expression_rate,
        depression_score,
    })
}

/// Maximal runs of identical labels.
pub(crate) fn runs(labels: &[Emotion]) -> Vec<(Emotion, usize)> {
    let mut runs: Vec<(Emotion, usize)> = Vec::new();
    for label in labels {
        match runs.last_mut() {
            Some((current, len)) if current == label => *len += 1,
            _ => runs.push((*label, 1)),
        }
    }
    runs
}

/// Least-squares slope against the sample index, computed on centred
/// coordinates. Zero for fewer than two points.
pub fn compute_slope(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let x_mean = (n - 1) as f64 / 2.0;
    let y_mean = values.iter().sum::<f64>() / n as f64;
    let (covariance, spread) = values
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(cov, spread), (i, y)| {
            let dx = i as f64 - x_mean;
            (cov + dx * (y - y_mean), spread + dx * dx)
        });
    // spread is n(n^2 - 1)/12, positive for n >= 2
    covariance / spread
}

/// Population variance.
pub fn compute_variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    let mean = values.iter().sum::<f64>() / values.len() as f64;
    values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> TrendParams {
        TrendParams::default()
    }

    #[test]
    fn test_short_history_is_insufficient() {
        let labels = vec![Emotion::Sad; 89];
        assert_eq!(
            analyze_labels(&labels, &params()),
            TrendSummary::InsufficientData {
                frames: 89,
                required: 90
            }
        );
    }

    #[test]
    fn test_constant_sadness() {
        let labels = vec![Emotion::Sad; 300];
        let summary = analyze_labels(&labels, &params());
        let m = summary.metrics().unwrap();
        assert_eq!(m.change_rate, 0.0);
        assert_eq!(m.negative_dwell, 300.0);
        assert_eq!(m.positive_dwell, 0.0);
        assert_eq!(m.stability, 1.0);
        assert_eq!(m.micro_expression_rate, 0.0);
        // 0.25 + 0.30 + 0.20 + 0 + 0.10
        assert!((m.depression_score - 0.85).abs() < 1e-9);
    }

    #[test]
    fn test_alternating_labels_change_every_frame() {
        let labels: Vec<Emotion> = (0..100)
            .map(|i| if i % 2 == 0 { Emotion::Happy } else { Emotion::Sad })
            .collect();
        let m = *analyze_labels(&labels, &params()).metrics().unwrap();
        assert_eq!(m.change_rate, 1.0);
        assert_eq!(m.positive_dwell, 1.0);
        assert_eq!(m.micro_expression_rate, 1.0);
        assert!(m.stability < 1.0);
    }

    #[test]
    fn test_downward_drift_has_negative_slope() {
        let mut labels = vec![Emotion::Happy; 100];
        labels.extend(vec![Emotion::Neutral; 100]);
        labels.extend(vec![Emotion::Sad; 100]);
        let m = *analyze_labels(&labels, &params()).metrics().unwrap();
        assert!(m.trend_slope < 0.0);
        assert_eq!(m.positive_dwell, 100.0);
    }

    #[test]
    fn test_analyzer_keeps_long_window() {
        let mut analyzer = TemporalTrendAnalyzer::default();
        for _ in 0..1000 {
            analyzer.push(Emotion::Neutral);
        }
        assert_eq!(analyzer.len(), 900);
        analyzer.reset();
        assert!(analyzer.is_empty());
    }

    #[test]
    fn test_slope_of_line() {
        let values: Vec<f64> = (0..10).map(|i| 2.0 * i as f64 + 1.0).collect();
        assert!((compute_slope(&values) - 2.0).abs() < 1e-9);
        assert_eq!(compute_slope(&[1.0]), 0.0);
        assert!((compute_slope(&[3.0, 2.0, 1.0]) + 1.0).abs() < 1e-12);
        assert!(compute_slope(&[0.4; 6]).abs() < 1e-12);
        assert!((compute_variance(&[1.0, 3.0]) - 1.0).abs() < 1e-12);
    }
}
