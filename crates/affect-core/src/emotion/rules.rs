//! AU rule scoring.

use crate::config::EmotionRuleTable;
use crate::smoothing::SmoothedAuState;
use crate::types::{AuId, AuMap, Emotion, EmotionDistribution, EMOTION_COUNT, MAX_INTENSITY};

use super::{EmotionSource, SourceEstimate};

/// Raw, unnormalised score per emotion. `gains` scales each AU's evidence
/// for this subject; penalties are not scaled.
pub fn rule_scores(
    state: &SmoothedAuState,
    table: &EmotionRuleTable,
    gains: &AuMap<f64>,
) -> [f64; EMOTION_COUNT] {
    let mut scores = [0.0; EMOTION_COUNT];
    let strength = |au: AuId| (1.0 + state.intensity(au) / MAX_INTENSITY) * gains[au];

    for rule in &table.rules {
        let mut score = 0.0;
        let mut satisfied = 0usize;
        for req in &rule.required {
            if state.is_active(req.au) {
                satisfied += 1;
                score += req.weight * strength(req.au);
            }
        }
        for opt in &rule.optional {
            if state.is_active(opt.au) {
                score += table.optional_factor * opt.weight * strength(opt.au);
            }
        }
        for au in &rule.incompatible {
            if state.is_active(*au) {
                score -= table.incompatible_penalty;
            }
        }
        if !rule.required.is_empty() {
            score *= satisfied as f64 / rule.required.len() as f64;
        }
        scores[rule.emotion.index()] += score.max(0.0);
    }

    let active = state.active_count() as f64;
    scores[Emotion::Neutral.index()] = (table.neutral_base - table.neutral_step * active).max(0.0);
    scores
}

pub fn score(state: &SmoothedAuState, table: &EmotionRuleTable, gains: &AuMap<f64>) -> SourceEstimate {
    let distribution = EmotionDistribution::from_scores(rule_scores(state, table, gains));
    SourceEstimate {
        source: EmotionSource::Au,
        confidence: distribution.top().1,
        distribution,
    }
}

/// Boosts labels whose signature AU pair is strongly co-active.
pub fn apply_corrections(
    distribution: EmotionDistribution,
    state: &SmoothedAuState,
    table: &EmotionRuleTable,
) -> EmotionDistribution {
    table.corrections.iter().fold(distribution, |dist, correction| {
        let fires = !correction.aus.is_empty()
            && correction
                .aus
                .iter()
                .all(|au| state.intensity(*au) > correction.min_intensity);
        if fires {
            dist.boosted(correction.emotion, correction.boost)
        } else {
            dist
        }
    })
}

/// Mean smoothed intensity of the label's required AUs, on a 0-1 scale.
pub fn emotion_intensity(label: Emotion, state: &SmoothedAuState, table: &EmotionRuleTable) -> f64 {
    let Some(rule) = table.rule_for(label) else {
        return 0.0;
    };
    if rule.required.is_empty() {
        return 0.0;
    }
    let sum: f64 = rule.required.iter().map(|r| state.intensity(r.au)).sum();
    (sum / rule.required.len() as f64 / MAX_INTENSITY).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smoothing::SmoothedAu;

    fn unit() -> AuMap<f64> {
        AuMap::splat(1.0)
    }

    fn state_with(active: &[(AuId, f64)]) -> SmoothedAuState {
        let mut state = SmoothedAuState::empty(0.0);
        for (_, au) in state.aus.iter_mut() {
            au.available = true;
        }
        for &(au, intensity) in active {
            state.aus[au] = SmoothedAu {
                available: true,
                active: true,
                intensity,
            };
        }
        state
    }

    #[test]
    fn test_no_activity_is_neutral() {
        let est = score(&state_with(&[]), &EmotionRuleTable::default(), &unit());
        assert_eq!(est.distribution.top().0, Emotion::Neutral);
        assert!((est.confidence - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_sad_signature() {
        let table = EmotionRuleTable::default();
        let state = state_with(&[(AuId::Au1, 4.0), (AuId::Au4, 4.0), (AuId::Au15, 4.0)]);
        let scores = rule_scores(&state, &table, &unit());
        let expected_sad = (0.6 + 0.5 + 0.6) * 1.8;
        assert!((scores[Emotion::Sad.index()] - expected_sad).abs() < 1e-12);
        assert!((scores[Emotion::Neutral.index()] - 0.25).abs() < 1e-12);
        assert_eq!(score(&state, &table, &unit()).distribution.top().0, Emotion::Sad);
    }

    #[test]
    fn test_partial_required_is_scaled() {
        let table = EmotionRuleTable::default();
        let state = state_with(&[(AuId::Au4, 0.0)]);
        let scores = rule_scores(&state, &table, &unit());
        // angry: 0.7 * 1.0 * (1/2)
        assert!((scores[Emotion::Angry.index()] - 0.35).abs() < 1e-12);
    }

    #[test]
    fn test_incompatible_floors_at_zero() {
        let table = EmotionRuleTable::default();
        let state = state_with(&[(AuId::Au12, 1.0), (AuId::Au6, 1.0)]);
        let scores = rule_scores(&state, &table, &unit());
        // contempt: 0.5 * 1.2 - 0.3 penalty for AU6
        assert!((scores[Emotion::Contempt.index()] - 0.3).abs() < 1e-12);
        assert_eq!(scores[Emotion::Sad.index()], 0.0);
    }

    #[test]
    fn test_gains_scale_evidence_not_penalties() {
        let table = EmotionRuleTable::default();
        let state = state_with(&[(AuId::Au1, 4.0), (AuId::Au4, 4.0), (AuId::Au15, 4.0), (AuId::Au12, 4.0)]);
        let mut gains = unit();
        gains[AuId::Au1] = 0.5;
        gains[AuId::Au4] = 0.5;
        gains[AuId::Au15] = 0.5;
        let scores = rule_scores(&state, &table, &gains);
        // sad: (0.6 + 0.5 + 0.6) * 1.8 * 0.5, less the AU12 penalty
        assert!((scores[Emotion::Sad.index()] - (1.7 * 1.8 * 0.5 - 0.3)).abs() < 1e-12);
        // contempt keeps full AU12 evidence
        assert!((scores[Emotion::Contempt.index()] - 0.5 * 1.8).abs() < 1e-12);
    }

    #[test]
    fn test_happy_correction() {
        let table = EmotionRuleTable::default();
        let state = state_with(&[(AuId::Au6, 4.0), (AuId::Au12, 4.0)]);
        let base = EmotionDistribution::uniform();
        let corrected = apply_corrections(base, &state, &table);
        assert!(corrected.get(Emotion::Happy) > base.get(Emotion::Happy));
        let sum: f64 = corrected.as_array().iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_intensity_uses_required_aus() {
        let table = EmotionRuleTable::default();
        let state = state_with(&[(AuId::Au1, 5.0), (AuId::Au4, 2.5), (AuId::Au15, 5.0)]);
        assert!((emotion_intensity(Emotion::Sad, &state, &table) - 0.8333333333).abs() < 1e-9);
        assert_eq!(emotion_intensity(Emotion::Neutral, &state, &table), 0.0);
    }
}
