use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AffectError, Result};
use crate::types::{AuId, Emotion};

/// Version stamped on every rule table; tables carrying another version are rejected.
pub const RULE_TABLE_VERSION: u32 = 1;

fn rule_table_version() -> u32 {
    RULE_TABLE_VERSION
}

// ==================== Calibration & Classification ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BaselineCenter {
    Mean,
    Median,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviationMode {
    Relative,
    ZScore,
}

impl DeviationMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "relative" => Some(DeviationMode::Relative),
            "zscore" | "z_score" => Some(DeviationMode::ZScore),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationParams {
    pub baseline_frames: usize,
    pub center: BaselineCenter,
    pub spread_floor: f64,
}

impl Default for CalibrationParams {
    fn default() -> Self {
        Self {
            baseline_frames: 300,
            center: BaselineCenter::Mean,
            spread_floor: 1e-3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdAdaptation {
    pub enabled: bool,
    pub warmup_frames: u64,
    pub upper_rate: f64,
    pub lower_rate: f64,
    pub raise_factor: f64,
    pub lower_factor: f64,
    pub min_scale: f64,
    pub max_scale: f64,
}

impl Default for ThresholdAdaptation {
    fn default() -> Self {
        Self {
            enabled: true,
            warmup_frames: 100,
            upper_rate: 0.5,
            lower_rate: 0.05,
            raise_factor: 1.01,
            lower_factor: 0.99,
            min_scale: 0.5,
            max_scale: 2.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierParams {
    pub mode: DeviationMode,
    /// Floor applied to `|centre|` (relative mode) or the spread (z-score mode)
    pub center_floor: f64,
    pub default_threshold: f64,
    pub thresholds: BTreeMap<AuId, f64>,
    /// AUs that only activate when the deviation follows their polarity.
    /// Every other AU is judged on `|d|`.
    pub directional: BTreeSet<AuId>,
    /// Deviation-magnitude boundaries for intensity levels 1..=5
    pub intensity_boundaries: [f64; 5],
    pub adaptation: ThresholdAdaptation,
}

impl Default for ClassifierParams {
    fn default() -> Self {
        Self {
            mode: DeviationMode::Relative,
            center_floor: 1e-3,
            default_threshold: 0.05,
            thresholds: BTreeMap::new(),
            directional: BTreeSet::new(),
            intensity_boundaries: [0.02, 0.05, 0.10, 0.20, 0.35],
            adaptation: ThresholdAdaptation::default(),
        }
    }
}

impl ClassifierParams {
    pub fn threshold_for(&self, au: AuId) -> f64 {
        self.thresholds
            .get(&au)
            .copied()
            .unwrap_or(self.default_threshold)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingParams {
    pub au_window: usize,
    pub label_window: usize,
    /// Frames of smoothed intensity retained for micro-expression scans
    pub intensity_history: usize,
}

impl Default for SmoothingParams {
    fn default() -> Self {
        Self {
            au_window: 5,
            label_window: 5,
            intensity_history: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MicroExpressionParams {
    pub amplitude_ratio: f64,
    pub min_peak: f64,
    pub min_duration_ms: f64,
    pub max_duration_ms: f64,
}

impl Default for MicroExpressionParams {
    fn default() -> Self {
        Self {
            amplitude_ratio: 2.0,
            min_peak: 2.0,
            min_duration_ms: 40.0,
            max_duration_ms: 500.0,
        }
    }
}

// ==================== Emotion Rule Tables ====================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AuWeight {
    pub au: AuId,
    pub weight: f64,
}

const fn w(au: AuId, weight: f64) -> AuWeight {
    AuWeight { au, weight }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionRule {
    pub emotion: Emotion,
    pub required: Vec<AuWeight>,
    #[serde(default)]
    pub optional: Vec<AuWeight>,
    #[serde(default)]
    pub incompatible: Vec<AuId>,
}

/// Strong co-activation that nudges the fused distribution towards one label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuCorrection {
    pub emotion: Emotion,
    pub aus: Vec<AuId>,
    pub min_intensity: f64,
    pub boost: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmotionRuleTable {
    #[serde(default = "rule_table_version")]
    pub version: u32,
    pub optional_factor: f64,
    pub incompatible_penalty: f64,
    /// Neutral scores `neutral_base - neutral_step * active_count`
    pub neutral_base: f64,
    pub neutral_step: f64,
    pub rules: Vec<EmotionRule>,
    #[serde(default)]
    pub corrections: Vec<AuCorrection>,
}

impl Default for EmotionRuleTable {
    fn default() -> Self {
        use AuId::*;
        Self {
            version: RULE_TABLE_VERSION,
            optional_factor: 0.5,
            incompatible_penalty: 0.3,
            neutral_base: 1.0,
            neutral_step: 0.25,
            rules: vec![
                EmotionRule {
                    emotion: Emotion::Happy,
                    required: vec![w(Au6, 0.7), w(Au12, 0.8)],
                    optional: vec![w(Au25, 0.3), w(Au26, 0.2)],
                    incompatible: vec![Au1, Au4, Au15],
                },
                EmotionRule {
                    emotion: Emotion::Sad,
                    required: vec![w(Au1, 0.6), w(Au4, 0.5), w(Au15, 0.6)],
                    optional: vec![w(Au17, 0.4)],
                    incompatible: vec![Au6, Au12],
                },
                EmotionRule {
                    emotion: Emotion::Angry,
                    required: vec![w(Au4, 0.7), w(Au7, 0.6)],
                    optional: vec![w(Au23, 0.5), w(Au24, 0.5)],
                    incompatible: vec![Au6, Au12],
                },
                EmotionRule {
                    emotion: Emotion::Fear,
                    required: vec![w(Au1, 0.6), w(Au2, 0.6), w(Au5, 0.7)],
                    optional: vec![w(Au20, 0.5), w(Au25, 0.4)],
                    incompatible: vec![Au12],
                },
                EmotionRule {
                    emotion: Emotion::Surprise,
                    required: vec![w(Au1, 0.6), w(Au2, 0.7), w(Au5, 0.8)],
                    optional: vec![w(Au25, 0.6), w(Au26, 0.6)],
                    incompatible: vec![],
                },
                EmotionRule {
                    emotion: Emotion::Disgust,
                    required: vec![w(Au9, 0.7), w(Au15, 0.5)],
                    optional: vec![w(Au17, 0.4), w(Au7, 0.4)],
                    incompatible: vec![Au6, Au12],
                },
                EmotionRule {
                    emotion: Emotion::Contempt,
                    required: vec![w(Au12, 0.5)],
                    optional: vec![w(Au14, 0.4)],
                    incompatible: vec![Au6],
                },
            ],
            corrections: vec![
                AuCorrection {
                    emotion: Emotion::Happy,
                    aus: vec![Au6, Au12],
                    min_intensity: 3.0,
                    boost: 0.2,
                },
                AuCorrection {
                    emotion: Emotion::Sad,
                    aus: vec![Au1, Au15],
                    min_intensity: 3.0,
                    boost: 0.2,
                },
            ],
        }
    }
}

impl EmotionRuleTable {
    pub fn rule_for(&self, emotion: Emotion) -> Option<&EmotionRule> {
        self.rules.iter().find(|r| r.emotion == emotion)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Comparison {
    Above,
    Below,
}

impl Comparison {
    #[inline]
    pub fn holds(self, value: f64, threshold: f64) -> bool {
        match self {
            Comparison::Above => value > threshold,
            Comparison::Below => value < threshold,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeometricFeature {
    EyebrowHeight,
    EyeOpenness,
    MouthOpenness,
    MouthCurvature,
    NoseLength,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeometricCondition {
    pub feature: GeometricFeature,
    pub comparison: Comparison,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometricRule {
    pub emotion: Emotion,
    pub strength: f64,
    pub conditions: Vec<GeometricCondition>,
}

/// Rules over inter-ocular-normalised face geometry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeometricRuleTable {
    #[serde(default = "rule_table_version")]
    pub version: u32,
    pub rules: Vec<GeometricRule>,
}

impl Default for GeometricRuleTable {
    fn default() -> Self {
        use Comparison::*;
        use GeometricFeature::*;
        let cond = |feature, comparison, value| GeometricCondition {
            feature,
            comparison,
            value,
        };
        Self {
            version: RULE_TABLE_VERSION,
            rules: vec![
                GeometricRule {
                    emotion: Emotion::Happy,
                    strength: 0.8,
                    conditions: vec![cond(MouthCurvature, Above, 0.06), cond(EyeOpenness, Below, 0.28)],
                },
                GeometricRule {
                    emotion: Emotion::Sad,
                    strength: 0.7,
                    conditions: vec![cond(MouthCurvature, Below, -0.04), cond(EyebrowHeight, Below, 0.30)],
                },
                GeometricRule {
                    emotion: Emotion::Angry,
                    strength: 0.6,
                    conditions: vec![cond(EyebrowHeight, Below, 0.20), cond(MouthOpenness, Below, 0.35)],
                },
                GeometricRule {
                    emotion: Emotion::Fear,
                    strength: 0.7,
                    conditions: vec![cond(EyebrowHeight, Above, 0.32), cond(EyeOpenness, Above, 0.38)],
                },
                GeometricRule {
                    emotion: Emotion::Surprise,
                    strength: 0.9,
                    conditions: vec![
                        cond(EyebrowHeight, Above, 0.34),
                        cond(EyeOpenness, Above, 0.40),
                        cond(MouthOpenness, Above, 0.60),
                    ],
                },
                GeometricRule {
                    emotion: Emotion::Disgust,
                    strength: 0.7,
                    conditions: vec![cond(NoseLength, Below, 0.40)],
                },
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoiceFeature {
    PitchHz,
    PitchStdHz,
    Energy,
    Jitter,
    Shimmer,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceRule {
    pub emotion: Emotion,
    pub feature: VoiceFeature,
    pub comparison: Comparison,
    pub value: f64,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceRuleTable {
    #[serde(default = "rule_table_version")]
    pub version: u32,
    pub neutral_base: f64,
    pub rules: Vec<VoiceRule>,
}

impl Default for VoiceRuleTable {
    fn default() -> Self {
        use Comparison::*;
        use VoiceFeature::*;
        let rule = |emotion, feature, comparison, value, score| VoiceRule {
            emotion,
            feature,
            comparison,
            value,
            score,
        };
        Self {
            version: RULE_TABLE_VERSION,
            neutral_base: 0.5,
            rules: vec![
                rule(Emotion::Sad, PitchHz, Below, 150.0, 0.3),
                rule(Emotion::Sad, Energy, Below, 0.02, 0.2),
                rule(Emotion::Sad, Jitter, Above, 0.1, 0.2),
                rule(Emotion::Happy, PitchHz, Above, 200.0, 0.3),
                rule(Emotion::Happy, Energy, Above, 0.05, 0.2),
                rule(Emotion::Happy, Jitter, Below, 0.05, 0.2),
                rule(Emotion::Angry, Energy, Above, 0.08, 0.3),
                rule(Emotion::Angry, Shimmer, Above, 0.15, 0.2),
                rule(Emotion::Fear, Jitter, Above, 0.15, 0.3),
                rule(Emotion::Fear, Shimmer, Above, 0.12, 0.2),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceIndicatorParams {
    pub low_pitch_hz: f64,
    pub pitch_span_hz: f64,
    pub low_energy: f64,
    pub monotone_std_hz: f64,
    pub jitter_floor: f64,
    pub jitter_span: f64,
}

impl Default for VoiceIndicatorParams {
    fn default() -> Self {
        Self {
            low_pitch_hz: 120.0,
            pitch_span_hz: 40.0,
            low_energy: 0.03,
            monotone_std_hz: 10.0,
            jitter_floor: 0.1,
            jitter_span: 0.2,
        }
    }
}

// ==================== Fusion ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FusionMode {
    Fixed,
    Attention,
}

impl FusionMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fixed" => Some(FusionMode::Fixed),
            "attention" => Some(FusionMode::Attention),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceWeights {
    pub au: f64,
    pub geometric: f64,
    pub voice: f64,
}

impl Default for SourceWeights {
    fn default() -> Self {
        Self {
            au: 0.6,
            geometric: 0.4,
            voice: 0.3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionParams {
    pub mode: FusionMode,
    pub weights: SourceWeights,
    /// Softmax temperature multiplier `k` in `exp(k * score)`
    pub sharpness: f64,
    /// Share of the fixed prior in the final attention weights
    pub prior_blend: f64,
    /// Share of confidence (vs feedback accuracy) in the attention score
    pub confidence_share: f64,
}

impl Default for FusionParams {
    fn default() -> Self {
        Self {
            mode: FusionMode::Attention,
            weights: SourceWeights::default(),
            sharpness: 2.0,
            prior_blend: 0.3,
            confidence_share: 0.6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryFilterParams {
    pub window: usize,
    pub current_weight: f64,
}

impl Default for HistoryFilterParams {
    fn default() -> Self {
        Self {
            window: 10,
            current_weight: 0.7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonalizationParams {
    pub reward_factor: f64,
    pub penalty_factor: f64,
    pub min_weight: f64,
    pub max_weight: f64,
    /// EMA rate for AU habits and expressiveness
    pub learning_rate: f64,
    /// Calibrated frames before AU gains leave 1.0
    pub min_samples: u64,
    /// Gain lost by an AU whose sensitivity is 1
    pub sensitivity_damping: f64,
    /// Gain added per unit of expressiveness below 0.5
    pub expressiveness_boost: f64,
    pub min_gain: f64,
    pub max_gain: f64,
}

impl Default for PersonalizationParams {
    fn default() -> Self {
        Self {
            reward_factor: 1.05,
            penalty_factor: 0.95,
            min_weight: 0.5,
            max_weight: 2.0,
            learning_rate: 0.01,
            min_samples: 300,
            sensitivity_damping: 0.3,
            expressiveness_boost: 0.2,
            min_gain: 0.5,
            max_gain: 1.5,
        }
    }
}

// ==================== Genuineness & Trend ====================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenuinenessParams {
    pub smile_threshold: f64,
    pub negative_threshold: f64,
    /// Largest per-frame intensity step (0-5 scale) still counted as natural
    pub smooth_delta_max: f64,
    pub dynamics_frames: usize,
    pub smile_min_ms: f64,
    pub smile_max_ms: f64,
    pub negative_min_ms: f64,
    pub persistence_frames: usize,
    pub persistence_ratio: f64,
    pub au12_floor: f64,
    pub ratio_strong: f64,
    pub ratio_weak: f64,
    pub moderate_low: f64,
    pub moderate_high: f64,
    /// Span of recent micro events weighed against the macro label
    pub concealment_window_ms: f64,
    pub concealment_moderate: f64,
    pub concealment_high: f64,
}

impl Default for GenuinenessParams {
    fn default() -> Self {
        Self {
            smile_threshold: 0.6,
            negative_threshold: 0.5,
            smooth_delta_max: 1.5,
            dynamics_frames: 10,
            smile_min_ms: 500.0,
            smile_max_ms: 4000.0,
            negative_min_ms: 500.0,
            persistence_frames: 10,
            persistence_ratio: 0.7,
            au12_floor: 0.5,
            ratio_strong: 0.6,
            ratio_weak: 0.3,
            moderate_low: 1.5,
            moderate_high: 4.0,
            concealment_window_ms: 10_000.0,
            concealment_moderate: 0.3,
            concealment_high: 0.6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TemporalWeights {
    pub change: f64,
    pub duration: f64,
    pub stability: f64,
    pub trend: f64,
    pub micro: f64,
}

impl Default for TemporalWeights {
    fn default() -> Self {
        Self {
            change: 0.25,
            duration: 0.30,
            stability: 0.20,
            trend: 0.15,
            micro: 0.10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendParams {
    pub short_window: usize,
    pub long_window: usize,
    pub micro_run_frames: usize,
    pub change_rate_ceiling: f64,
    pub weights: TemporalWeights,
}

impl Default for TrendParams {
    fn default() -> Self {
        Self {
            short_window: 90,
            long_window: 900,
            micro_run_frames: 90,
            change_rate_ceiling: 0.2,
            weights: TemporalWeights::default(),
        }
    }
}

// ==================== Ocular & Clinical ====================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcularParams {
    pub closed_ear: f64,
    pub blink_ear: f64,
    pub min_blink_ms: f64,
    pub max_blink_ms: f64,
    /// Observation span needed before a blink rate is trusted
    pub blink_rate_min_span_ms: f64,
    pub min_coverage: f64,
    pub low_blink_rate: f64,
    pub high_blink_rate: f64,
    pub low_blink_max: f64,
    pub high_blink_max: f64,
    pub high_blink_span: f64,
    pub asymmetry_scale: f64,
}

impl Default for OcularParams {
    fn default() -> Self {
        Self {
            closed_ear: 0.18,
            blink_ear: 0.20,
            min_blink_ms: 50.0,
            max_blink_ms: 400.0,
            blink_rate_min_span_ms: 60_000.0,
            min_coverage: 0.3,
            low_blink_rate: 10.0,
            high_blink_rate: 30.0,
            low_blink_max: 0.4,
            high_blink_max: 0.3,
            high_blink_span: 20.0,
            asymmetry_scale: 2.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelWeights {
    pub visual: f64,
    pub voice: f64,
}

impl Default for ChannelWeights {
    fn default() -> Self {
        Self {
            visual: 0.6,
            voice: 0.4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualIndicatorWeights {
    pub emotion: f64,
    pub au: f64,
    pub ocular: f64,
    pub concealment: f64,
}

impl Default for VisualIndicatorWeights {
    fn default() -> Self {
        Self {
            emotion: 0.4,
            au: 0.3,
            ocular: 0.2,
            concealment: 0.1,
        }
    }
}

/// Depression relevance of each sustained label
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmotionRiskWeights {
    pub neutral: f64,
    pub happy: f64,
    pub sad: f64,
    pub angry: f64,
    pub fear: f64,
    pub surprise: f64,
    pub disgust: f64,
    pub contempt: f64,
}

impl Default for EmotionRiskWeights {
    fn default() -> Self {
        Self {
            neutral: 0.1,
            happy: 0.0,
            sad: 1.0,
            angry: 0.5,
            fear: 0.6,
            surprise: 0.1,
            disgust: 0.4,
            contempt: 0.3,
        }
    }
}

impl EmotionRiskWeights {
    pub fn get(&self, emotion: Emotion) -> f64 {
        match emotion {
            Emotion::Neutral => self.neutral,
            Emotion::Happy => self.happy,
            Emotion::Sad => self.sad,
            Emotion::Angry => self.angry,
            Emotion::Fear => self.fear,
            Emotion::Surprise => self.surprise,
            Emotion::Disgust => self.disgust,
            Emotion::Contempt => self.contempt,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DepressionAuWeights {
    pub depression: Vec<AuWeight>,
    pub positive: Vec<AuWeight>,
    pub positive_penalty: f64,
}

impl Default for DepressionAuWeights {
    fn default() -> Self {
        use AuId::*;
        Self {
            depression: vec![
                w(Au1, 0.8),
                w(Au4, 0.9),
                w(Au15, 0.8),
                w(Au17, 0.5),
                w(Au7, 0.6),
                w(Au43, 0.7),
            ],
            positive: vec![w(Au6, 0.6), w(Au12, 0.7)],
            positive_penalty: 0.4,
        }
    }
}

impl DepressionAuWeights {
    pub fn is_depression_au(&self, au: AuId) -> bool {
        self.depression.iter().any(|d| d.au == au)
    }
}

/// Item thresholds, each array ordered from the level-3 cut down to level 1.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Phq9Rules {
    #[serde(default = "rule_table_version")]
    pub version: u32,
    /// Affect-load cut points lifting the cap of the absence items to 1, 2, 3
    pub gate_steps: [f64; 3],
    pub anhedonia_happy: [f64; 3],
    pub anhedonia_smile: [f64; 3],
    pub mood_sad: [f64; 3],
    pub mood_negative: [f64; 3],
    pub sleep_closure: [f64; 3],
    pub sleep_blink_low: [f64; 3],
    pub sleep_blink_high: [f64; 3],
    /// Mean count of active non-depression AUs; AUs read from one shared
    /// feature fire together, so the cuts sit above a single pair
    pub fatigue_activity: [f64; 3],
    pub fatigue_change: [f64; 3],
    pub fatigue_voice_energy: f64,
    pub guilt_ratio: [f64; 3],
    pub concentration_blink: [f64; 3],
    pub psychomotor_change: [f64; 3],
    pub psychomotor_micro: [f64; 3],
    pub psychomotor_voice_monotone: f64,
    pub self_harm_confidence: f64,
    pub self_harm_ratio: f64,
}

impl Default for Phq9Rules {
    fn default() -> Self {
        Self {
            version: RULE_TABLE_VERSION,
            gate_steps: [0.15, 0.30, 0.45],
            anhedonia_happy: [0.05, 0.10, 0.15],
            anhedonia_smile: [0.02, 0.05, 0.10],
            mood_sad: [0.40, 0.25, 0.15],
            mood_negative: [0.60, 0.45, 0.30],
            sleep_closure: [0.40, 0.30, 0.20],
            sleep_blink_low: [10.0, 12.0, 15.0],
            sleep_blink_high: [45.0, 40.0, 35.0],
            fatigue_activity: [1.2, 1.6, 2.0],
            fatigue_change: [0.05, 0.10, 0.15],
            fatigue_voice_energy: 0.5,
            guilt_ratio: [0.25, 0.15, 0.08],
            concentration_blink: [50.0, 42.0, 35.0],
            psychomotor_change: [0.05, 0.10, 0.15],
            psychomotor_micro: [0.05, 0.10, 0.15],
            psychomotor_voice_monotone: 0.5,
            self_harm_confidence: 0.9,
            self_harm_ratio: 0.6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClinicalParams {
    pub min_frames: usize,
    pub observation_window: usize,
    pub history_len: usize,
    pub trend_min_points: usize,
    pub trend_slope_threshold: f64,
    pub risk_low: f64,
    pub risk_medium: f64,
    pub voice_stale_ms: f64,
    pub channel_weights: ChannelWeights,
    pub visual_weights: VisualIndicatorWeights,
    pub emotion_weights: EmotionRiskWeights,
    pub depression_aus: DepressionAuWeights,
    pub phq9: Phq9Rules,
}

impl Default for ClinicalParams {
    fn default() -> Self {
        Self {
            min_frames: 300,
            observation_window: 1800,
            history_len: 10,
            trend_min_points: 3,
            trend_slope_threshold: 0.5,
            risk_low: 0.3,
            risk_medium: 0.6,
            voice_stale_ms: 3000.0,
            channel_weights: ChannelWeights::default(),
            visual_weights: VisualIndicatorWeights::default(),
            emotion_weights: EmotionRiskWeights::default(),
            depression_aus: DepressionAuWeights::default(),
            phq9: Phq9Rules::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureFlags {
    pub geometric_source: bool,
    pub voice_source: bool,
    pub history_filter: bool,
    pub personalization: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            geometric_source: true,
            voice_source: true,
            history_filter: true,
            personalization: true,
        }
    }
}

// ==================== Top-level ====================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AffectConfig {
    #[serde(default = "rule_table_version")]
    pub version: u32,
    pub calibration: CalibrationParams,
    pub classifier: ClassifierParams,
    pub smoothing: SmoothingParams,
    pub micro: MicroExpressionParams,
    pub rules: EmotionRuleTable,
    pub geometric: GeometricRuleTable,
    pub voice_rules: VoiceRuleTable,
    pub voice_indicators: VoiceIndicatorParams,
    pub fusion: FusionParams,
    pub history: HistoryFilterParams,
    pub personalization: PersonalizationParams,
    pub genuineness: GenuinenessParams,
    pub trend: TrendParams,
    pub ocular: OcularParams,
    pub clinical: ClinicalParams,
    pub feature_flags: FeatureFlags,
}

impl Default for AffectConfig {
    fn default() -> Self {
        Self {
            version: RULE_TABLE_VERSION,
            calibration: CalibrationParams::default(),
            classifier: ClassifierParams::default(),
            smoothing: SmoothingParams::default(),
            micro: MicroExpressionParams::default(),
            rules: EmotionRuleTable::default(),
            geometric: GeometricRuleTable::default(),
            voice_rules: VoiceRuleTable::default(),
            voice_indicators: VoiceIndicatorParams::default(),
            fusion: FusionParams::default(),
            history: HistoryFilterParams::default(),
            personalization: PersonalizationParams::default(),
            genuineness: GenuinenessParams::default(),
            trend: TrendParams::default(),
            ocular: OcularParams::default(),
            clinical: ClinicalParams::default(),
            feature_flags: FeatureFlags::default(),
        }
    }
}

impl AffectConfig {
    /// Defaults, optionally replaced by `AFFECT_CONFIG_PATH`, then patched by
    /// individual `AFFECT_*` variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// [`AffectConfig::from_env`] over any variable source. A variable that is
    /// set but unparseable is a [`AffectError::Config`], never a silent default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = match lookup("AFFECT_CONFIG_PATH").filter(|p| !p.trim().is_empty()) {
            Some(path) => Self::from_file(path.trim())?,
            None => Self::default(),
        };

        if let Some(val) = parse_var(&lookup, "AFFECT_BASELINE_FRAMES")? {
            config.calibration.baseline_frames = val;
        }
        if let Some(val) = parse_var(&lookup, "AFFECT_AU_WINDOW")? {
            config.smoothing.au_window = val;
        }
        if let Some(val) = parse_var(&lookup, "AFFECT_LABEL_WINDOW")? {
            config.smoothing.label_window = val;
        }
        if let Some(raw) = lookup("AFFECT_FUSION_MODE") {
            config.fusion.mode =
                FusionMode::parse(&raw).ok_or_else(|| invalid_var("AFFECT_FUSION_MODE", &raw))?;
        }
        if let Some(raw) = lookup("AFFECT_DEVIATION_MODE") {
            config.classifier.mode =
                DeviationMode::parse(&raw).ok_or_else(|| invalid_var("AFFECT_DEVIATION_MODE", &raw))?;
        }
        if let Some(val) = parse_var(&lookup, "AFFECT_GEOMETRIC_ENABLED")? {
            config.feature_flags.geometric_source = val;
        }
        if let Some(val) = parse_var(&lookup, "AFFECT_VOICE_ENABLED")? {
            config.feature_flags.voice_source = val;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, version) in [
            ("config", self.version),
            ("emotion rules", self.rules.version),
            ("geometric rules", self.geometric.version),
            ("voice rules", self.voice_rules.version),
            ("phq9 rules", self.clinical.phq9.version),
        ] {
            if version != RULE_TABLE_VERSION {
                tracing::warn!(table = name, version, "rule table version mismatch");
                return Err(AffectError::UnsupportedVersion {
                    found: version,
                    expected: RULE_TABLE_VERSION,
                });
            }
        }

        if self.calibration.baseline_frames == 0 {
            return Err(validation("calibration.baseline_frames must be positive"));
        }
        if self.calibration.spread_floor <= 0.0 || self.classifier.center_floor <= 0.0 {
            return Err(validation("epsilon floors must be positive"));
        }
        if self.smoothing.au_window == 0
            || self.smoothing.label_window == 0
            || self.smoothing.intensity_history < 3
        {
            return Err(validation("smoothing windows must be positive (intensity history >= 3)"));
        }
        if self.history.window == 0 || !(0.0..=1.0).contains(&self.history.current_weight) {
            return Err(validation("history filter window/current_weight out of range"));
        }
        let personal = &self.personalization;
        if !(personal.learning_rate > 0.0 && personal.learning_rate <= 1.0)
            || personal.min_gain <= 0.0
            || personal.min_gain > personal.max_gain
        {
            return Err(validation("personalization learning_rate or gain bounds out of range"));
        }

        let bounds = &self.classifier.intensity_boundaries;
        if bounds[0] <= 0.0 || bounds.windows(2).any(|p| p[1] <= p[0]) {
            return Err(validation("intensity boundaries must be positive and strictly increasing"));
        }
        if self.classifier.default_threshold <= 0.0
            || self.classifier.thresholds.values().any(|t| *t <= 0.0)
        {
            return Err(validation("AU thresholds must be positive"));
        }
        let adapt = &self.classifier.adaptation;
        if adapt.min_scale > 1.0 || adapt.max_scale < 1.0 || adapt.lower_rate > adapt.upper_rate {
            return Err(validation("threshold adaptation bounds are inconsistent"));
        }

        let weights = &self.fusion.weights;
        if [weights.au, weights.geometric, weights.voice].iter().any(|w| *w < 0.0)
            || weights.au <= 0.0
        {
            return Err(validation("fusion weights must be non-negative with a positive AU weight"));
        }
        if !(0.0..=1.0).contains(&self.fusion.prior_blend)
            || !(0.0..=1.0).contains(&self.fusion.confidence_share)
        {
            return Err(validation("fusion blend factors must lie in [0, 1]"));
        }

        if self.trend.short_window < 2 || self.trend.long_window < self.trend.short_window {
            return Err(validation("trend windows must satisfy 2 <= short <= long"));
        }
        let clinical = &self.clinical;
        if clinical.min_frames == 0 || clinical.min_frames > clinical.observation_window {
            return Err(validation("clinical.min_frames must be in 1..=observation_window"));
        }
        if clinical.history_len < clinical.trend_min_points || clinical.trend_min_points < 2 {
            return Err(validation("clinical history too short for trend regression"));
        }
        if clinical.channel_weights.visual <= 0.0 || clinical.channel_weights.voice < 0.0 {
            return Err(validation("channel weights must be positive"));
        }
        if clinical.risk_low >= clinical.risk_medium {
            return Err(validation("risk tier cut points must increase"));
        }

        for rule in &self.rules.rules {
            if rule.emotion == Emotion::Neutral {
                return Err(validation("neutral is scored implicitly and cannot carry AU rules"));
            }
            if rule.required.is_empty() {
                return Err(validation(format!("rule for {} has no required AUs", rule.emotion.as_str())));
            }
        }
        Ok(())
    }
}

fn validation(msg: impl Into<String>) -> AffectError {
    AffectError::Validation(msg.into())
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| invalid_var(key, &raw)),
    }
}

fn invalid_var(key: &str, raw: &str) -> AffectError {
    tracing::warn!(key, value = raw, "rejected configuration variable");
    AffectError::Config(format!("{key}={raw:?} is not a valid value"))
}
