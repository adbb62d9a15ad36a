//! Emotion Inference Engine
//!
//! AU rules, geometric rules and prosody rules each yield a distribution;
//! the ensemble fuses them, applies AU-pair corrections and personal
//! multipliers, then smooths against recent history.

pub mod fusion;
pub mod geometric;
pub mod history;
pub mod personalize;
pub mod prosody;
pub mod rules;

use serde::{Deserialize, Serialize};

use crate::config::{AffectConfig, EmotionRuleTable, FeatureFlags, GeometricRuleTable, VoiceRuleTable};
use crate::error::Result;
use crate::features::GeometricFeatures;
use crate::smoothing::SmoothedAuState;
use crate::types::{AuMap, Emotion, EmotionDistribution};
use crate::voice::VoiceSnapshot;

pub use fusion::{EnsembleFusion, FusionWeights, SourceTracker};
pub use history::HistoryFilter;
pub use personalize::{AuHabit, ExpressionProfile, Feedback, PersonalProfile, PersonalWeights};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmotionSource {
    Au,
    Geometric,
    Voice,
}

impl EmotionSource {
    pub const ALL: [EmotionSource; 3] = [EmotionSource::Au, EmotionSource::Geometric, EmotionSource::Voice];
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SourceEstimate {
    pub source: EmotionSource,
    pub distribution: EmotionDistribution,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmotionEstimate {
    pub label: Emotion,
    /// Entropy-calibrated confidence, 0-1
    pub confidence: f64,
    pub distribution: EmotionDistribution,
    /// Mean required-AU intensity of the winning rule, 0-1
    pub intensity: f64,
    pub weights: FusionWeights,
    pub sources: Vec<SourceEstimate>,
}

impl EmotionEstimate {
    /// Estimate for frames before any evidence exists.
    pub fn neutral() -> Self {
        Self {
            label: Emotion::Neutral,
            confidence: 0.0,
            distribution: EmotionDistribution::uniform(),
            intensity: 0.0,
            weights: FusionWeights::default(),
            sources: Vec::new(),
        }
    }
}

pub struct EmotionEngine {
    rules: EmotionRuleTable,
    geometric_rules: GeometricRuleTable,
    voice_rules: VoiceRuleTable,
    flags: FeatureFlags,
    fusion: EnsembleFusion,
    tracker: SourceTracker,
    history: HistoryFilter,
    personal: PersonalWeights,
    expression: ExpressionProfile,
    last: Option<(Emotion, Vec<(EmotionSource, Emotion)>)>,
}

impl EmotionEngine {
    pub fn new(config: &AffectConfig) -> Self {
        Self {
            rules: config.rules.clone(),
            geometric_rules: config.geometric.clone(),
            voice_rules: config.voice_rules.clone(),
            flags: config.feature_flags.clone(),
            fusion: EnsembleFusion::new(config.fusion.clone()),
            tracker: SourceTracker::default(),
            history: HistoryFilter::new(&config.history),
            personal: PersonalWeights::new(config.personalization.clone()),
            expression: ExpressionProfile::new(config.personalization.clone()),
            last: None,
        }
    }

    pub fn infer(
        &mut self,
        state: &SmoothedAuState,
        geometric: Option<&GeometricFeatures>,
        voice: Option<&VoiceSnapshot>,
    ) -> EmotionEstimate {
        let gains = if self.flags.personalization {
            self.expression.gains()
        } else {
            AuMap::splat(1.0)
        };
        let mut sources = vec![rules::score(state, &self.rules, &gains)];
        if self.flags.geometric_source {
            if let Some(features) = geometric {
                sources.push(geometric::score(features, &self.geometric_rules));
            }
        }
        if self.flags.voice_source {
            if let Some(snapshot) = voice {
                sources.push(prosody::score(snapshot, &self.voice_rules));
            }
        }

        let (fused, weights) = self.fusion.fuse(&sources, &self.tracker);
        let mut distribution = rules::apply_corrections(fused, state, &self.rules);
        if self.flags.personalization {
            distribution = distribution.reweighted(self.personal.weights());
        }
        if self.flags.history_filter {
            distribution = self.history.apply(distribution);
        }

        let (label, p_max) = distribution.top();
        let confidence = (p_max * (0.5 + 0.5 * (1.0 - distribution.normalized_entropy()))).clamp(0.0, 1.0);
        let intensity = rules::emotion_intensity(label, state, &self.rules);

        self.last = Some((
            label,
            sources.iter().map(|s| (s.source, s.distribution.top().0)).collect(),
        ));

        EmotionEstimate {
            label,
            confidence,
            distribution,
            intensity,
            weights,
            sources,
        }
    }

    /// Applies user feedback to the most recent estimate. Returns false when
    /// there is nothing to apply it to.
    pub fn feedback(&mut self, feedback: Feedback) -> bool {
        let Some((label, source_labels)) = self.last.as_ref() else {
            return false;
        };
        self.personal.apply(*label, feedback);
        for (source, source_label) in source_labels {
            let agreed = source_label == label;
            match (feedback, agreed) {
                (Feedback::Correct, agreed) => self.tracker.record(*source, agreed),
                (Feedback::Incorrect, true) => self.tracker.record(*source, false),
                // a dissenting source on a wrong estimate may or may not be right
                (Feedback::Incorrect, false) => {}
            }
        }
        true
    }

    /// Learns AU habits from a calibrated frame.
    pub fn observe(&mut self, state: &SmoothedAuState) {
        if self.flags.personalization {
            self.expression.observe(state);
        }
    }

    pub fn tracker(&self) -> &SourceTracker {
        &self.tracker
    }

    pub fn personal_weights(&self) -> &PersonalWeights {
        &self.personal
    }

    pub fn expression(&self) -> &ExpressionProfile {
        &self.expression
    }

    pub fn export_profile(&self) -> PersonalProfile {
        PersonalProfile::capture(&self.personal, &self.tracker, &self.expression)
    }

    pub fn import_profile(&mut self, profile: &PersonalProfile) -> Result<()> {
        profile.restore(&mut self.personal, &mut self.tracker, &mut self.expression)
    }

    /// Clears per-session history. Learned personal state survives.
    pub fn reset(&mut self) {
        self.history.reset();
        self.last = None;
    }

    /// Forgets everything learned about the subject.
    pub fn reset_profile(&mut self) {
        self.personal.reset();
        self.tracker = SourceTracker::default();
        self.expression.reset();
    }
}
