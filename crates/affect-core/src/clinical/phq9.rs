//! PHQ-9 item mapping, severity bands, score trend and recommendations.

use serde::Serialize;

use crate::config::Phq9Rules;
use crate::trend::compute_slope;

use super::channels::{OcularChannel, VisualChannel, VoiceChannel};

pub const ITEM_COUNT: usize = 9;
pub const MAX_ITEM_SCORE: u8 = 3;
pub const MAX_TOTAL: u8 = 27;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Minimal,
    Mild,
    Moderate,
    ModeratelySevere,
    Severe,
}

impl Severity {
    pub fn from_total(total: u8) -> Self {
        match total {
            0..=4 => Severity::Minimal,
            5..=9 => Severity::Mild,
            10..=14 => Severity::Moderate,
            15..=19 => Severity::ModeratelySevere,
            _ => Severity::Severe,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Minimal => "minimal",
            Severity::Mild => "mild",
            Severity::Moderate => "moderate",
            Severity::ModeratelySevere => "moderately_severe",
            Severity::Severe => "severe",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreTrend {
    Worsening,
    Stable,
    Improving,
    InsufficientData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClinicalScore {
    pub items: [u8; ITEM_COUNT],
    pub total: u8,
    pub severity: Severity,
    pub trend: ScoreTrend,
}

impl ClinicalScore {
    pub fn from_items(items: [u8; ITEM_COUNT], trend: ScoreTrend) -> Self {
        let items = items.map(|i| i.min(MAX_ITEM_SCORE));
        let total = items.iter().sum::<u8>().min(MAX_TOTAL);
        let severity = if items[8] >= 1 {
            Severity::Severe
        } else {
            Severity::from_total(total)
        };
        Self {
            items,
            total,
            severity,
            trend,
        }
    }
}

/// Level 3, 2, 1 when `value` exceeds the respective cut.
fn tier_above(value: f64, cuts: &[f64; 3]) -> u8 {
    if value > cuts[0] {
        3
    } else if value > cuts[1] {
        2
    } else if value > cuts[2] {
        1
    } else {
        0
    }
}

/// Level 3, 2, 1 when `value` falls below the respective cut.
fn tier_below(value: f64, cuts: &[f64; 3]) -> u8 {
    if value < cuts[0] {
        3
    } else if value < cuts[1] {
        2
    } else if value < cuts[2] {
        1
    } else {
        0
    }
}

/// Cap on the absence items so an expressionless but calm face does not read as depressed.
pub fn affect_gate(load: f64, rules: &Phq9Rules) -> u8 {
    let steps = &rules.gate_steps;
    if load < steps[0] {
        0
    } else if load < steps[1] {
        1
    } else if load < steps[2] {
        2
    } else {
        3
    }
}

pub fn score_items(
    visual: &VisualChannel,
    ocular: &OcularChannel,
    voice: Option<&VoiceChannel>,
    composite: f64,
    rules: &Phq9Rules,
) -> [u8; ITEM_COUNT] {
    let gate = affect_gate(composite.max(visual.negative_ratio), rules);
    let blink_rate = if ocular.valid { ocular.blink_rate } else { None };
    let mut items = [0u8; ITEM_COUNT];

    // 1 anhedonia
    items[0] = tier_below(visual.happy_ratio, &rules.anhedonia_happy)
        .min(tier_below(visual.genuine_smile_ratio, &rules.anhedonia_smile))
        .min(gate);

    // 2 depressed mood
    items[1] = tier_above(visual.sad_ratio, &rules.mood_sad).max(tier_above(visual.negative_ratio, &rules.mood_negative));

    // 3 sleep
    let closure = if ocular.valid {
        tier_above(ocular.closure_ratio, &rules.sleep_closure)
    } else {
        0
    };
    let blink = blink_rate
        .map(|r| tier_below(r, &rules.sleep_blink_low).max(tier_above(r, &rules.sleep_blink_high)))
        .unwrap_or(0);
    items[2] = closure.max(blink);

    // 4 fatigue
    let low_energy = voice.is_some_and(|v| v.low_energy_ratio > rules.fatigue_voice_energy);
    let fatigue = tier_below(visual.expressive_activity, &rules.fatigue_activity)
        .min(tier_below(visual.change_rate, &rules.fatigue_change));
    items[3] = (fatigue + u8::from(low_energy)).min(MAX_ITEM_SCORE).min(gate);

    // 5 appetite is not observable from face or voice
    items[4] = 0;

    // 6 guilt
    items[5] = tier_above(visual.brow_distress_ratio, &rules.guilt_ratio);

    // 7 concentration
    items[6] = blink_rate
        .map(|r| tier_above(r, &rules.concentration_blink))
        .unwrap_or(0);

    // 8 psychomotor
    let monotone = voice.is_some_and(|v| v.monotone_ratio > rules.psychomotor_voice_monotone);
    let psychomotor = tier_below(visual.change_rate, &rules.psychomotor_change)
        .min(tier_below(visual.micro_rate, &rules.psychomotor_micro));
    items[7] = (psychomotor + u8::from(monotone)).min(MAX_ITEM_SCORE).min(gate);

    // 9 self-harm
    items[8] = u8::from(visual.extreme_sad_ratio > rules.self_harm_ratio);

    items
}

/// Least-squares direction of recent totals, oldest first.
pub fn score_trend(totals: &[u8], min_points: usize, threshold: f64) -> ScoreTrend {
    if totals.len() < min_points.max(2) {
        return ScoreTrend::InsufficientData;
    }
    let values: Vec<f64> = totals.iter().map(|t| f64::from(*t)).collect();
    let slope = compute_slope(&values);
    if slope > threshold {
        ScoreTrend::Worsening
    } else if slope < -threshold {
        ScoreTrend::Improving
    } else {
        ScoreTrend::Stable
    }
}

pub fn recommendations(score: &ClinicalScore) -> Vec<String> {
    let mut lines = vec![match score.severity {
        Severity::Minimal => {
            "No significant depressive indicators were observed. Keep up regular routines and re-check periodically."
        }
        Severity::Mild => {
            "Mild depressive indicators were observed. Self-care and a follow-up screening in two weeks are suggested."
        }
        Severity::Moderate => {
            "Moderate depressive indicators were observed. A consultation with a mental health professional is recommended."
        }
        Severity::ModeratelySevere => {
            "Moderately severe depressive indicators were observed. Please arrange an evaluation with a mental health professional soon."
        }
        Severity::Severe => {
            "Severe depressive indicators were observed. Please contact a mental health professional promptly."
        }
    }
    .to_string()];

    if score.items[2] >= 2 {
        lines.push("Signs of sleep disturbance were observed. Consider discussing sleep quality with a clinician.".to_string());
    }
    if score.items[3] >= 2 {
        lines.push("Reduced expressive energy was observed. Keep an eye on fatigue and daily activity levels.".to_string());
    }
    if score.items[8] > 0 {
        lines.push(
            "If you are having thoughts of harming yourself, contact a crisis hotline or emergency services right away."
                .to_string(),
        );
    }
    lines.push("This screening is based on observed behaviour and is not a diagnosis.".to_string());
    lines
}

/// `0.6 * data_factor + 0.4 * mean label confidence`.
pub fn assessment_confidence(frames_seen: usize, mean_confidence: f64) -> f64 {
    let n = frames_seen as f64;
    let data_factor = if n < 300.0 {
        n / 300.0
    } else if n < 1800.0 {
        0.5 + 0.3 * (n - 300.0) / 1500.0
    } else if n < 3600.0 {
        0.8 + 0.2 * (n - 1800.0) / 1800.0
    } else {
        1.0
    };
    (0.6 * data_factor + 0.4 * mean_confidence.clamp(0.0, 1.0)).clamp(0.0, 1.0)
}
