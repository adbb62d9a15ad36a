//! Geometric emotion source: threshold rules over normalised face geometry.

use crate::config::{GeometricFeature, GeometricRuleTable};
use crate::features::GeometricFeatures;
use crate::types::{EmotionDistribution, EMOTION_COUNT};

use super::{EmotionSource, SourceEstimate};

fn feature_value(features: &GeometricFeatures, feature: GeometricFeature) -> f64 {
    match feature {
        GeometricFeature::EyebrowHeight => features.eyebrow_height,
        GeometricFeature::EyeOpenness => features.eye_openness,
        GeometricFeature::MouthOpenness => features.mouth_openness,
        GeometricFeature::MouthCurvature => features.mouth_curvature,
        GeometricFeature::NoseLength => features.nose_length,
    }
}

/// Fired rules share the mass in proportion to their strength. When nothing
/// fires the source is uniform with zero confidence.
pub fn score(features: &GeometricFeatures, table: &GeometricRuleTable) -> SourceEstimate {
    let mut scores = [0.0; EMOTION_COUNT];
    let mut fired_strength = 0.0;

    for rule in &table.rules {
        let fires = !rule.conditions.is_empty()
            && rule
                .conditions
                .iter()
                .all(|c| c.comparison.holds(feature_value(features, c.feature), c.value));
        if fires {
            scores[rule.emotion.index()] += rule.strength;
            fired_strength += rule.strength;
        }
    }

    SourceEstimate {
        source: EmotionSource::Geometric,
        distribution: EmotionDistribution::from_scores(scores),
        confidence: fired_strength.clamp(0.0, 1.0),
    }
}
