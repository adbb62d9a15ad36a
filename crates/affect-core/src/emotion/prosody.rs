//! Voice emotion source: additive prosody rules.

use crate::config::{VoiceFeature, VoiceRuleTable};
use crate::types::{Emotion, EmotionDistribution, EMOTION_COUNT};
use crate::voice::VoiceSnapshot;

use super::{EmotionSource, SourceEstimate};

fn feature_value(snapshot: &VoiceSnapshot, feature: VoiceFeature) -> f64 {
    match feature {
        VoiceFeature::PitchHz => snapshot.pitch_hz,
        VoiceFeature::PitchStdHz => snapshot.pitch_std_hz,
        VoiceFeature::Energy => snapshot.energy,
        VoiceFeature::Jitter => snapshot.jitter,
        VoiceFeature::Shimmer => snapshot.shimmer,
    }
}

pub fn score(snapshot: &VoiceSnapshot, table: &VoiceRuleTable) -> SourceEstimate {
    let mut scores = [0.0; EMOTION_COUNT];
    scores[Emotion::Neutral.index()] = table.neutral_base;

    for rule in &table.rules {
        // pitch is meaningless on unvoiced windows
        let pitch_rule = matches!(rule.feature, VoiceFeature::PitchHz | VoiceFeature::PitchStdHz);
        if pitch_rule && !snapshot.is_voiced() {
            continue;
        }
        if rule.comparison.holds(feature_value(snapshot, rule.feature), rule.value) {
            scores[rule.emotion.index()] += rule.score;
        }
    }

    let distribution = EmotionDistribution::from_scores(scores);
    SourceEstimate {
        source: EmotionSource::Voice,
        confidence: distribution.top().1,
        distribution,
    }
}
