//! Observation window and per-channel aggregation.

use std::collections::VecDeque;

use serde::Serialize;

use crate::config::{
    ClinicalParams, DepressionAuWeights, OcularParams, TrendParams, VisualIndicatorWeights,
    VoiceIndicatorParams,
};
use crate::features::EyeMetrics;
use crate::smoothing::SmoothedAuState;
use crate::trend;
use crate::types::{AuId, Emotion, MAX_INTENSITY};
use crate::voice::VoiceSnapshot;

/// Everything the clinical scorer keeps about one processed frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameObservation {
    pub timestamp_ms: f64,
    pub calibrated: bool,
    /// Reported (smoothed) label
    pub label: Emotion,
    pub confidence: f64,
    pub intensity: f64,
    pub depression_au_score: f64,
    /// Active AUs outside the depression set
    pub expressive_activity: usize,
    /// AU1 and AU4 co-active
    pub brow_distress: bool,
    pub genuine_smile: bool,
    pub concealment: f64,
    pub eyes: Option<EyeMetrics>,
    pub blink: bool,
    pub voice: Option<VoiceSnapshot>,
}

/// `w * (0.5 + 0.5 * I/5)` averaged over active depression AUs, less a
/// penalty for active smile AUs.
pub fn depression_au_score(state: &SmoothedAuState, weights: &DepressionAuWeights) -> f64 {
    let contribution = |au: AuId, w: f64| w * (0.5 + 0.5 * state.intensity(au) / MAX_INTENSITY);
    let mean_active = |set: &[crate::config::AuWeight]| {
        let active: Vec<f64> = set
            .iter()
            .filter(|aw| state.is_active(aw.au))
            .map(|aw| contribution(aw.au, aw.weight))
            .collect();
        if active.is_empty() {
            0.0
        } else {
            active.iter().sum::<f64>() / active.len() as f64
        }
    };
    let score = mean_active(&weights.depression) - weights.positive_penalty * mean_active(&weights.positive);
    score.max(0.0)
}

pub fn expressive_activity(state: &SmoothedAuState, weights: &DepressionAuWeights) -> usize {
    state
        .active_aus()
        .filter(|au| !weights.is_depression_au(*au))
        .count()
}

pub struct ObservationWindow {
    capacity: usize,
    frames: VecDeque<FrameObservation>,
}

impl ObservationWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            frames: VecDeque::with_capacity(capacity.max(1)),
        }
    }

    pub fn push(&mut self, observation: FrameObservation) {
        self.frames.push_back(observation);
        if self.frames.len() > self.capacity {
            self.frames.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn frames(&self) -> &VecDeque<FrameObservation> {
        &self.frames
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }
}

// ==================== Visual ====================

fn ratio_of(frames: &VecDeque<FrameObservation>, pred: impl Fn(&FrameObservation) -> bool) -> f64 {
    if frames.is_empty() {
        return 0.0;
    }
    frames.iter().filter(|f| pred(f)).count() as f64 / frames.len() as f64
}

fn mean_of(frames: &VecDeque<FrameObservation>, value: impl Fn(&FrameObservation) -> f64) -> f64 {
    if frames.is_empty() {
        return 0.0;
    }
    frames.iter().map(value).sum::<f64>() / frames.len() as f64
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct VisualChannel {
    pub frames: usize,
    pub emotion_score: f64,
    /// `None` until at least one calibrated frame exists
    pub au_score: Option<f64>,
    pub concealment_score: f64,
    pub happy_ratio: f64,
    pub genuine_smile_ratio: f64,
    pub sad_ratio: f64,
    pub negative_ratio: f64,
    pub extreme_sad_ratio: f64,
    pub brow_distress_ratio: f64,
    pub expressive_activity: f64,
    pub change_rate: f64,
    /// Share of frames inside label runs shorter than 90 frames
    pub micro_rate: f64,
    pub mean_confidence: f64,
}

pub fn visual_channel(window: &ObservationWindow, params: &ClinicalParams) -> VisualChannel {
    let frames = window.frames();
    let n = frames.len();
    if n == 0 {
        return VisualChannel::default();
    }
    let emotion_weights = &params.emotion_weights;
    let emotion_score = mean_of(frames, |f| {
        emotion_weights.get(f.label) * f.confidence * (0.5 + 0.5 * f.intensity)
    });

    let calibrated: Vec<f64> = frames
        .iter()
        .filter(|f| f.calibrated)
        .map(|f| f.depression_au_score)
        .collect();
    let au_score = (!calibrated.is_empty())
        .then(|| calibrated.iter().sum::<f64>() / calibrated.len() as f64);

    let labels: Vec<Emotion> = frames.iter().map(|f| f.label).collect();
    let whole_window = TrendParams {
        short_window: 2,
        long_window: n,
        ..TrendParams::default()
    };
    let change_rate = trend::analyze_labels(&labels, &whole_window)
        .metrics()
        .map_or(0.0, |m| m.change_rate);
    // frames spent in short label runs, so one transition cannot dominate
    let micro_frames: usize = trend::runs(&labels)
        .iter()
        .filter(|(_, len)| *len < whole_window.micro_run_frames)
        .map(|(_, len)| *len)
        .sum();
    let micro_rate = micro_frames as f64 / n as f64;

    let self_harm_confidence = params.phq9.self_harm_confidence;
    VisualChannel {
        frames: n,
        emotion_score,
        au_score,
        concealment_score: mean_of(frames, |f| f.concealment),
        happy_ratio: ratio_of(frames, |f| f.label == Emotion::Happy),
        genuine_smile_ratio: ratio_of(frames, |f| f.genuine_smile),
        sad_ratio: ratio_of(frames, |f| f.label == Emotion::Sad),
        negative_ratio: ratio_of(frames, |f| f.label.is_negative()),
        extreme_sad_ratio: ratio_of(frames, |f| {
            f.label == Emotion::Sad && f.confidence > self_harm_confidence
        }),
        brow_distress_ratio: ratio_of(frames, |f| f.brow_distress),
        expressive_activity: mean_of(frames, |f| f.expressive_activity as f64),
        change_rate,
        micro_rate,
        mean_confidence: mean_of(frames, |f| f.confidence),
    }
}

// ==================== Ocular ====================

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct OcularChannel {
    pub coverage: f64,
    pub closure_ratio: f64,
    /// Blinks per minute, once the window spans long enough
    pub blink_rate: Option<f64>,
    pub asymmetry: f64,
    pub score: f64,
    pub valid: bool,
}

pub fn ocular_channel(window: &ObservationWindow, params: &OcularParams) -> OcularChannel {
    let frames = window.frames();
    let with_eyes: Vec<(&FrameObservation, EyeMetrics)> =
        frames.iter().filter_map(|f| f.eyes.map(|e| (f, e))).collect();
    if frames.is_empty() || with_eyes.is_empty() {
        return OcularChannel::default();
    }

    let m = with_eyes.len() as f64;
    let coverage = m / frames.len() as f64;
    let closure_ratio = with_eyes
        .iter()
        .filter(|(_, e)| e.mean_ear < params.closed_ear)
        .count() as f64
        / m;
    let asymmetry = with_eyes.iter().map(|(_, e)| e.asymmetry()).sum::<f64>() / m;

    let span_ms = match (with_eyes.first(), with_eyes.last()) {
        (Some((first, _)), Some((last, _))) => last.timestamp_ms - first.timestamp_ms,
        _ => 0.0,
    };
    let blink_rate = (span_ms >= params.blink_rate_min_span_ms).then(|| {
        let blinks = frames.iter().filter(|f| f.blink).count() as f64;
        blinks / (span_ms / 60_000.0)
    });

    let blink_component = match blink_rate {
        Some(rate) if rate < params.low_blink_rate => {
            params.low_blink_max * (params.low_blink_rate - rate) / params.low_blink_rate
        }
        Some(rate) if rate > params.high_blink_rate => {
            params.high_blink_max * ((rate - params.high_blink_rate) / params.high_blink_span).min(1.0)
        }
        _ => 0.0,
    };
    let score = (closure_ratio + blink_component + asymmetry * params.asymmetry_scale).clamp(0.0, 1.0);

    OcularChannel {
        coverage,
        closure_ratio,
        blink_rate,
        asymmetry,
        score,
        valid: coverage >= params.min_coverage,
    }
}

// ==================== Voice ====================

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct VoiceChannel {
    pub snapshots: usize,
    pub low_pitch: f64,
    pub low_energy: f64,
    pub monotone: f64,
    pub high_jitter: f64,
    pub score: f64,
    pub low_energy_ratio: f64,
    pub monotone_ratio: f64,
}

/// Aggregates the distinct snapshots seen in the window; `None` without any.
pub fn voice_channel(window: &ObservationWindow, params: &VoiceIndicatorParams) -> Option<VoiceChannel> {
    let mut snapshots: Vec<VoiceSnapshot> = Vec::new();
    for snapshot in window.frames().iter().filter_map(|f| f.voice) {
        if snapshots.last().map(|s| s.timestamp_ms) != Some(snapshot.timestamp_ms) {
            snapshots.push(snapshot);
        }
    }
    if snapshots.is_empty() {
        return None;
    }

    let n = snapshots.len() as f64;
    let mut channel = VoiceChannel {
        snapshots: snapshots.len(),
        ..Default::default()
    };
    for s in &snapshots {
        if s.is_voiced() && s.pitch_hz < params.low_pitch_hz {
            channel.low_pitch += ((params.low_pitch_hz - s.pitch_hz) / params.pitch_span_hz).min(1.0);
        }
        channel.low_energy += ((params.low_energy - s.energy) / params.low_energy).clamp(0.0, 1.0);
        if s.is_voiced() {
            channel.monotone += ((params.monotone_std_hz - s.pitch_std_hz) / params.monotone_std_hz).clamp(0.0, 1.0);
        }
        if s.jitter > params.jitter_floor {
            channel.high_jitter += (s.jitter / params.jitter_span).min(1.0);
        }
        if s.energy < params.low_energy {
            channel.low_energy_ratio += 1.0;
        }
        if s.is_voiced() && s.pitch_std_hz < params.monotone_std_hz {
            channel.monotone_ratio += 1.0;
        }
    }
    channel.low_pitch /= n;
    channel.low_energy /= n;
    channel.monotone /= n;
    channel.high_jitter /= n;
    channel.low_energy_ratio /= n;
    channel.monotone_ratio /= n;
    channel.score =
        ((channel.low_pitch + channel.low_energy + channel.monotone + channel.high_jitter) / 4.0).clamp(0.0, 1.0);
    Some(channel)
}

/// Weighted visual indicators, renormalised over those that are valid.
pub fn visual_modality_score(
    visual: &VisualChannel,
    ocular: &OcularChannel,
    weights: &VisualIndicatorWeights,
) -> f64 {
    let mut total = weights.emotion * visual.emotion_score + weights.concealment * visual.concealment_score;
    let mut weight = weights.emotion + weights.concealment;
    if let Some(au) = visual.au_score {
        total += weights.au * au;
        weight += weights.au;
    }
    if ocular.valid {
        total += weights.ocular * ocular.score;
        weight += weights.ocular;
    }
    if weight > 0.0 {
        (total / weight).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smoothing::SmoothedAu;

    fn observation(t: f64, label: Emotion) -> FrameObservation {
        FrameObservation {
            timestamp_ms: t,
            calibrated: true,
            label,
            confidence: 0.5,
            intensity: 0.0,
            depression_au_score: 0.0,
            expressive_activity: 0,
            brow_distress: false,
            genuine_smile: false,
            concealment: 0.0,
            eyes: Some(EyeMetrics {
                left_ear: 0.3,
                right_ear: 0.3,
                mean_ear: 0.3,
            }),
            blink: false,
            voice: None,
        }
    }

    #[test]
    fn test_depression_au_score() {
        let mut state = SmoothedAuState::empty(0.0);
        state.aus[AuId::Au4] = SmoothedAu {
            available: true,
            active: true,
            intensity: 5.0,
        };
        let weights = DepressionAuWeights::default();
        assert!((depression_au_score(&state, &weights) - 0.9).abs() < 1e-12);

        state.aus[AuId::Au12] = SmoothedAu {
            available: true,
            active: true,
            intensity: 5.0,
        };
        assert!((depression_au_score(&state, &weights) - (0.9 - 0.4 * 0.7)).abs() < 1e-12);
        assert_eq!(expressive_activity(&state, &weights), 1);
    }

    #[test]
    fn test_visual_ratios() {
        let mut window = ObservationWindow::new(10);
        for i in 0..4 {
            window.push(observation(i as f64, Emotion::Sad));
        }
        window.push(observation(4.0, Emotion::Happy));
        let visual = visual_channel(&window, &ClinicalParams::default());
        assert!((visual.sad_ratio - 0.8).abs() < 1e-12);
        assert!((visual.negative_ratio - 0.8).abs() < 1e-12);
        assert!((visual.happy_ratio - 0.2).abs() < 1e-12);
        assert!((visual.change_rate - 0.25).abs() < 1e-12);
        // 0.8 * 1.0 * 0.5 * 0.5
        assert!((visual.emotion_score - 0.2).abs() < 1e-12);
        assert_eq!(visual.au_score, Some(0.0));
    }

    #[test]
    fn test_window_capacity() {
        let mut window = ObservationWindow::new(3);
        for i in 0..5 {
            window.push(observation(i as f64, Emotion::Neutral));
        }
        assert_eq!(window.len(), 3);
        assert_eq!(window.frames().front().map(|f| f.timestamp_ms), Some(2.0));
    }

    #[test]
    fn test_blink_rate_needs_a_minute() {
        let mut window = ObservationWindow::new(4000);
        for i in 0..1800 {
            let mut obs = observation(i as f64 * 33.3, Emotion::Neutral);
            obs.blink = i % 300 == 0;
            window.push(obs);
        }
        let ocular = ocular_channel(&window, &OcularParams::default());
        assert!(ocular.blink_rate.is_none());
        assert!(ocular.valid);

        for i in 1800..2400 {
            let mut obs = observation(i as f64 * 33.3, Emotion::Neutral);
            obs.blink = i % 300 == 0;
            window.push(obs);
        }
        let ocular = ocular_channel(&window, &OcularParams::default());
        let rate = ocular.blink_rate.unwrap();
        assert!(rate > 5.0 && rate < 7.0);
        assert!(ocular.score > 0.0);
    }

    #[test]
    fn test_voice_indicators() {
        let mut window = ObservationWindow::new(10);
        let mut obs = observation(0.0, Emotion::Neutral);
        obs.voice = Some(VoiceSnapshot {
            pitch_hz: 100.0,
            pitch_std_hz: 5.0,
            energy: 0.015,
            jitter: 0.12,
            shimmer: 0.0,
            timestamp_ms: 0.0,
        });
        window.push(obs.clone());
        window.push(obs);
        let voice = voice_channel(&window, &VoiceIndicatorParams::default()).unwrap();
        assert_eq!(voice.snapshots, 1);
        assert!((voice.low_pitch - 0.5).abs() < 1e-12);
        assert!((voice.low_energy - 0.5).abs() < 1e-12);
        assert!((voice.monotone - 0.5).abs() < 1e-12);
        assert!((voice.high_jitter - 0.6).abs() < 1e-12);
        assert_eq!(voice.low_energy_ratio, 1.0);
    }

    #[test]
    fn test_visual_modality_renormalises() {
        let visual = VisualChannel {
            emotion_score: 0.5,
            au_score: None,
            ..Default::default()
        };
        let ocular = OcularChannel::default();
        let score = visual_modality_score(&visual, &ocular, &VisualIndicatorWeights::default());
        assert!((score - 0.4 * 0.5 / 0.5).abs() < 1e-12);
    }
}
