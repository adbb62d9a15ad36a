//! Genuineness Analyzer
//!
//! Scores whether the current label looks spontaneous, from AU co-activation,
//! onset/offset smoothness, duration and persistence. Also compares the
//! macro label against recent micro-expressions to flag concealed affect.

use serde::Serialize;

use crate::config::GenuinenessParams;
use crate::micro::MicroExpressionEvent;
use crate::smoothing::{IntensityHistory, SmoothedAuState};
use crate::types::{AuId, Emotion};

/// Context for one verdict.
pub struct GenuinenessInput<'a> {
    pub state: &'a SmoothedAuState,
    /// Length of the current reported-label run
    pub duration_ms: f64,
    pub history: &'a IntensityHistory,
    /// Most recent labels, oldest first
    pub recent_labels: &'a [Emotion],
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct GenuinenessIndicators {
    pub coactivation: f64,
    pub au_ratio: f64,
    pub onset: f64,
    pub offset: f64,
    pub duration: f64,
    pub intensity: f64,
    pub persistence: f64,
}

impl GenuinenessIndicators {
    pub fn total(&self) -> f64 {
        self.coactivation
            + self.au_ratio
            + self.onset
            + self.offset
            + self.duration
            + self.intensity
            + self.persistence
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GenuinenessVerdict {
    pub is_genuine: bool,
    pub score: f64,
    pub threshold: f64,
    pub indicators: GenuinenessIndicators,
}

impl GenuinenessVerdict {
    /// Verdict for labels without a genuineness model.
    pub fn not_applicable() -> Self {
        Self {
            is_genuine: false,
            score: 0.0,
            threshold: 1.0,
            indicators: GenuinenessIndicators::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConcealmentRisk {
    Low,
    Moderate,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ConcealmentReport {
    pub hidden_count: usize,
    pub total_events: usize,
    pub inconsistency: f64,
    pub risk: ConcealmentRisk,
}

impl ConcealmentReport {
    pub fn none() -> Self {
        Self {
            hidden_count: 0,
            total_events: 0,
            inconsistency: 0.0,
            risk: ConcealmentRisk::Low,
        }
    }
}

fn key_aus(label: Emotion) -> &'static [AuId] {
    match label {
        Emotion::Sad => &[AuId::Au1, AuId::Au4, AuId::Au15],
        Emotion::Angry => &[AuId::Au4, AuId::Au7, AuId::Au23],
        Emotion::Fear => &[AuId::Au1, AuId::Au2, AuId::Au5, AuId::Au20],
        Emotion::Disgust => &[AuId::Au9, AuId::Au10],
        _ => &[],
    }
}

pub struct GenuinenessAnalyzer {
    params: GenuinenessParams,
}

impl GenuinenessAnalyzer {
    pub fn new(params: GenuinenessParams) -> Self {
        Self { params }
    }

    pub fn analyze(&self, label: Emotion, input: &GenuinenessInput<'_>) -> GenuinenessVerdict {
        match label {
            Emotion::Happy => self.analyze_smile(input),
            Emotion::Sad | Emotion::Angry | Emotion::Fear | Emotion::Disgust => {
                self.analyze_negative(label, input)
            }
            _ => GenuinenessVerdict::not_applicable(),
        }
    }

    fn analyze_smile(&self, input: &GenuinenessInput<'_>) -> GenuinenessVerdict {
        let p = &self.params;
        let state = input.state;
        let mut ind = GenuinenessIndicators::default();

        let au6 = state.is_active(AuId::Au6);
        let au12 = state.is_active(AuId::Au12);
        ind.coactivation = match (au6, au12) {
            (true, true) => 0.4,
            (false, true) => 0.2,
            _ => 0.0,
        };

        let au12_intensity = state.intensity(AuId::Au12);
        if au12_intensity > p.au12_floor {
            let ratio = state.intensity(AuId::Au6) / au12_intensity;
            ind.au_ratio = if ratio > p.ratio_strong {
                0.3
            } else if ratio > p.ratio_weak {
                0.15
            } else {
                0.0
            };
        }

        if (p.smile_min_ms..=p.smile_max_ms).contains(&input.duration_ms) {
            ind.duration = 0.1;
        }

        let (onset, offset) = self.onset_offset(input.history, AuId::Au12);
        ind.onset = if onset { 0.1 } else { 0.0 };
        ind.offset = if offset { 0.1 } else { 0.0 };

        self.verdict(ind, p.smile_threshold)
    }

    fn analyze_negative(&self, label: Emotion, input: &GenuinenessInput<'_>) -> GenuinenessVerdict {
        let p = &self.params;
        let keys = key_aus(label);
        let mut ind = GenuinenessIndicators::default();

        let active = keys.iter().filter(|au| input.state.is_active(**au)).count();
        ind.coactivation = 0.4 * active as f64 / keys.len() as f64;

        let mean_intensity =
            keys.iter().map(|au| input.state.intensity(*au)).sum::<f64>() / keys.len() as f64;
        ind.intensity = if (p.moderate_low..=p.moderate_high).contains(&mean_intensity) {
            0.3
        } else if mean_intensity > 0.0 {
            0.15
        } else {
            0.0
        };

        if input.duration_ms >= p.negative_min_ms {
            ind.duration = 0.15;
        }

        let recent = tail(input.recent_labels, p.persistence_frames);
        if !recent.is_empty() {
            let same = recent.iter().filter(|l| **l == label).count() as f64;
            if same / recent.len() as f64 > p.persistence_ratio {
                ind.persistence = 0.15;
            }
        }

        self.verdict(ind, p.negative_threshold)
    }

    fn verdict(&self, indicators: GenuinenessIndicators, threshold: f64) -> GenuinenessVerdict {
        let score = indicators.total().clamp(0.0, 1.0);
        GenuinenessVerdict {
            is_genuine: score >= threshold,
            score,
            threshold,
            indicators,
        }
    }

    /// Onset covers the first half of the recent frames, offset the second
    /// (sharing the middle frame). Each is natural when no per-frame step
    /// exceeds the configured maximum.
    fn onset_offset(&self, history: &IntensityHistory, au: AuId) -> (bool, bool) {
        let series: Vec<f64> = history.series(au).iter().copied().collect();
        let recent = tail(&series, self.params.dynamics_frames);
        if recent.len() < 4 {
            return (false, false);
        }
        let mid = recent.len() / 2;
        let smooth = |values: &[f64]| {
            values
                .windows(2)
                .map(|w| (w[1] - w[0]).abs())
                .fold(0.0, f64::max)
                < self.params.smooth_delta_max
        };
        (smooth(&recent[..=mid]), smooth(&recent[mid..]))
    }

    /// Micro events betraying negative affect under a happy or neutral face.
    pub fn detect_concealment(
        &self,
        macro_label: Emotion,
        events: &[MicroExpressionEvent],
    ) -> ConcealmentReport {
        if events.is_empty() {
            return ConcealmentReport::none();
        }
        let masking = matches!(macro_label, Emotion::Happy | Emotion::Neutral);
        let hidden_count = if masking {
            events
                .iter()
                .filter(|e| matches!(e.emotion, Some(Emotion::Sad | Emotion::Fear | Emotion::Angry)))
                .count()
        } else {
            0
        };

        let inconsistency = hidden_count as f64 / events.len() as f64;
        let risk = if inconsistency >= self.params.concealment_high {
            ConcealmentRisk::High
        } else if inconsistency >= self.params.concealment_moderate {
            ConcealmentRisk::Moderate
        } else {
            ConcealmentRisk::Low
        };

        ConcealmentReport {
            hidden_count,
            total_events: events.len(),
            inconsistency,
            risk,
        }
    }
}

impl Default for GenuinenessAnalyzer {
    fn default() -> Self {
        Self::new(GenuinenessParams::default())
    }
}

fn tail<T>(values: &[T], n: usize) -> &[T] {
    &values[values.len().saturating_sub(n)..]
}
