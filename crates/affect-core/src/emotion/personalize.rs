//! Per-subject feedback multipliers, learned AU habits and the exportable
//! personal profile.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::{PersonalizationParams, RULE_TABLE_VERSION};
use crate::error::{AffectError, Result};
use crate::smoothing::SmoothedAuState;
use crate::types::{AuId, AuMap, Emotion, AU_COUNT, EMOTION_COUNT, MAX_INTENSITY};

use super::fusion::SourceTracker;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Feedback {
    Correct,
    Incorrect,
}

pub struct PersonalWeights {
    params: PersonalizationParams,
    weights: [f64; EMOTION_COUNT],
    feedback_count: u64,
}

impl PersonalWeights {
    pub fn new(params: PersonalizationParams) -> Self {
        Self {
            params,
            weights: [1.0; EMOTION_COUNT],
            feedback_count: 0,
        }
    }

    pub fn weights(&self) -> &[f64; EMOTION_COUNT] {
        &self.weights
    }

    pub fn get(&self, emotion: Emotion) -> f64 {
        self.weights[emotion.index()]
    }

    pub fn feedback_count(&self) -> u64 {
        self.feedback_count
    }

    pub fn apply(&mut self, label: Emotion, feedback: Feedback) {
        let factor = match feedback {
            Feedback::Correct => self.params.reward_factor,
            Feedback::Incorrect => self.params.penalty_factor,
        };
        let w = &mut self.weights[label.index()];
        *w = (*w * factor).clamp(self.params.min_weight, self.params.max_weight);
        self.feedback_count += 1;
    }

    pub fn reset(&mut self) {
        self.weights = [1.0; EMOTION_COUNT];
        self.feedback_count = 0;
    }

    fn load(&mut self, weights: &BTreeMap<Emotion, f64>, feedback_count: u64) -> Result<()> {
        let mut loaded = [1.0; EMOTION_COUNT];
        for (emotion, w) in weights {
            if !w.is_finite() || *w <= 0.0 {
                return Err(AffectError::Validation(format!(
                    "profile weight for {} must be positive",
                    emotion.as_str()
                )));
            }
            loaded[emotion.index()] = w.clamp(self.params.min_weight, self.params.max_weight);
        }
        self.weights = loaded;
        self.feedback_count = feedback_count;
        Ok(())
    }
}

impl Default for PersonalWeights {
    fn default() -> Self {
        Self::new(PersonalizationParams::default())
    }
}

/// Long-run habit of one AU for this subject.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AuHabit {
    /// Smoothed intensity, 0-5
    pub mean_intensity: f64,
    pub activation_rate: f64,
}

impl AuHabit {
    /// `mean_intensity * activation_rate`, normalised to 0-1.
    pub fn sensitivity(&self) -> f64 {
        (self.mean_intensity * self.activation_rate / MAX_INTENSITY).clamp(0.0, 1.0)
    }
}

/// Learns how strongly and how often this subject moves each AU, and turns
/// that into per-AU evidence gains for the rule source.
pub struct ExpressionProfile {
    params: PersonalizationParams,
    habits: AuMap<AuHabit>,
    expressiveness: f64,
    samples: u64,
}

impl ExpressionProfile {
    pub fn new(params: PersonalizationParams) -> Self {
        Self {
            params,
            habits: AuMap::default(),
            expressiveness: NEUTRAL_EXPRESSIVENESS,
            samples: 0,
        }
    }

    /// Folds one calibrated frame into the running habits.
    pub fn observe(&mut self, state: &SmoothedAuState) {
        let alpha = if self.samples == 0 { 1.0 } else { self.params.learning_rate };
        let mut intensities = Vec::with_capacity(AU_COUNT);
        for (au, smoothed) in state.aus.iter() {
            if !smoothed.available {
                continue;
            }
            intensities.push(smoothed.intensity);
            let habit = &mut self.habits[au];
            habit.mean_intensity += alpha * (smoothed.intensity - habit.mean_intensity);
            habit.activation_rate += alpha * (f64::from(u8::from(smoothed.active)) - habit.activation_rate);
        }
        if intensities.is_empty() {
            return;
        }

        let n = intensities.len() as f64;
        let mean = intensities.iter().sum::<f64>() / n;
        let std = (intensities.iter().map(|i| (i - mean).powi(2)).sum::<f64>() / n).sqrt();
        let frame_expressiveness = (std / 2.0).min(1.0);
        self.expressiveness += self.params.learning_rate * (frame_expressiveness - self.expressiveness);
        self.samples += 1;
    }

    pub fn habit(&self, au: AuId) -> AuHabit {
        self.habits[au]
    }

    pub fn expressiveness(&self) -> f64 {
        self.expressiveness
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }

    pub fn is_adapted(&self) -> bool {
        self.samples >= self.params.min_samples
    }

    /// Evidence multiplier per AU. Habitual AUs are damped and reserved
    /// subjects are amplified; all ones until enough frames are seen.
    pub fn gains(&self) -> AuMap<f64> {
        if !self.is_adapted() {
            return AuMap::splat(1.0);
        }
        let p = &self.params;
        let reserve = 1.0 + p.expressiveness_boost * (NEUTRAL_EXPRESSIVENESS - self.expressiveness);
        self.habits.map(|_, habit| {
            ((1.0 - p.sensitivity_damping * habit.sensitivity()) * reserve).clamp(p.min_gain, p.max_gain)
        })
    }

    pub fn reset(&mut self) {
        self.habits = AuMap::default();
        self.expressiveness = NEUTRAL_EXPRESSIVENESS;
        self.samples = 0;
    }

    fn snapshot(&self) -> ExpressionSnapshot {
        ExpressionSnapshot {
            expressiveness: self.expressiveness,
            samples: self.samples,
            habits: self.habits.iter().map(|(au, h)| (au, *h)).collect(),
        }
    }

    fn load(&mut self, snapshot: &ExpressionSnapshot) -> Result<()> {
        if !(0.0..=1.0).contains(&snapshot.expressiveness) {
            return Err(AffectError::Validation("profile expressiveness must be in [0, 1]".to_string()));
        }
        let mut habits = AuMap::<AuHabit>::default();
        for (au, habit) in &snapshot.habits {
            if !(0.0..=MAX_INTENSITY).contains(&habit.mean_intensity)
                || !(0.0..=1.0).contains(&habit.activation_rate)
            {
                return Err(AffectError::Validation(format!(
                    "profile habit for {} is out of range",
                    au.as_str()
                )));
            }
            habits[*au] = *habit;
        }
        self.habits = habits;
        self.expressiveness = snapshot.expressiveness;
        self.samples = snapshot.samples;
        Ok(())
    }
}

impl Default for ExpressionProfile {
    fn default() -> Self {
        Self::new(PersonalizationParams::default())
    }
}

const NEUTRAL_EXPRESSIVENESS: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpressionSnapshot {
    pub expressiveness: f64,
    pub samples: u64,
    pub habits: BTreeMap<AuId, AuHabit>,
}

impl Default for ExpressionSnapshot {
    fn default() -> Self {
        ExpressionProfile::default().snapshot()
    }
}

/// Serialisable learned state of one subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonalProfile {
    pub version: u32,
    pub emotion_weights: BTreeMap<Emotion, f64>,
    pub source_accuracy: SourceTracker,
    pub feedback_count: u64,
    #[serde(default)]
    pub expression: ExpressionSnapshot,
}

impl PersonalProfile {
    pub fn capture(weights: &PersonalWeights, tracker: &SourceTracker, expression: &ExpressionProfile) -> Self {
        Self {
            version: RULE_TABLE_VERSION,
            emotion_weights: Emotion::ALL.iter().map(|e| (*e, weights.get(*e))).collect(),
            source_accuracy: tracker.clone(),
            feedback_count: weights.feedback_count(),
            expression: expression.snapshot(),
        }
    }

    pub fn restore(
        &self,
        weights: &mut PersonalWeights,
        tracker: &mut SourceTracker,
        expression: &mut ExpressionProfile,
    ) -> Result<()> {
        if self.version != RULE_TABLE_VERSION {
            return Err(AffectError::UnsupportedVersion {
                found: self.version,
                expected: RULE_TABLE_VERSION,
            });
        }
        // validate everything before touching live state
        let mut staged = ExpressionProfile::new(expression.params.clone());
        staged.load(&self.expression)?;
        weights.load(&self.emotion_weights, self.feedback_count)?;
        *expression = staged;
        *tracker = self.source_accuracy.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emotion::EmotionSource;
    use crate::smoothing::SmoothedAu;

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

    fn blank_profile() -> PersonalProfile {
        PersonalProfile::capture(
            &PersonalWeights::default(),
            &SourceTracker::default(),
            &ExpressionProfile::default(),
        )
    }

    #[test]
    fn test_feedback_moves_weight_within_bounds() {
        let mut weights = PersonalWeights::default();
        weights.apply(Emotion::Sad, Feedback::Correct);
        assert!((weights.get(Emotion::Sad) - 1.05).abs() < 1e-12);

        for _ in 0..200 {
            weights.apply(Emotion::Happy, Feedback::Incorrect);
        }
        assert_eq!(weights.get(Emotion::Happy), 0.5);
        for _ in 0..200 {
            weights.apply(Emotion::Sad, Feedback::Correct);
        }
        assert_eq!(weights.get(Emotion::Sad), 2.0);
    }

    #[test]
    fn test_profile_roundtrip() {
        let mut weights = PersonalWeights::default();
        let mut tracker = SourceTracker::default();
        weights.apply(Emotion::Fear, Feedback::Correct);
        tracker.record(EmotionSource::Au, true);

        let mut expression = ExpressionProfile::default();
        expression.observe(&state_with(&[(AuId::Au12, 3.0)]));

        let json = serde_json::to_string(&PersonalProfile::capture(&weights, &tracker, &expression)).unwrap();
        let profile: PersonalProfile = serde_json::from_str(&json).unwrap();

        let mut restored = PersonalWeights::default();
        let mut restored_tracker = SourceTracker::default();
        let mut restored_expression = ExpressionProfile::default();
        profile
            .restore(&mut restored, &mut restored_tracker, &mut restored_expression)
            .unwrap();
        assert_eq!(restored.get(Emotion::Fear), weights.get(Emotion::Fear));
        assert_eq!(restored_tracker, tracker);
        assert_eq!(restored.feedback_count(), 1);
        assert_eq!(restored_expression.habit(AuId::Au12), expression.habit(AuId::Au12));
        assert_eq!(restored_expression.samples(), 1);
    }

    #[test]
    fn test_profile_without_expression_block_still_loads() {
        let mut value = serde_json::to_value(blank_profile()).unwrap();
        value.as_object_mut().unwrap().remove("expression");
        let profile: PersonalProfile = serde_json::from_value(value).unwrap();
        assert_eq!(profile.expression, ExpressionSnapshot::default());
    }

    #[test]
    fn test_profile_rejects_other_version() {
        let mut profile = blank_profile();
        profile.version = 9;
        let err = profile
            .restore(
                &mut PersonalWeights::default(),
                &mut SourceTracker::default(),
                &mut ExpressionProfile::default(),
            )
            .unwrap_err();
        assert!(matches!(err, AffectError::UnsupportedVersion { found: 9, .. }));
    }

    #[test]
    fn test_profile_rejects_negative_weight() {
        let mut profile = blank_profile();
        profile.emotion_weights.insert(Emotion::Sad, -1.0);
        assert!(profile
            .restore(
                &mut PersonalWeights::default(),
                &mut SourceTracker::default(),
                &mut ExpressionProfile::default(),
            )
            .is_err());
    }

    #[test]
    fn test_bad_habit_leaves_live_profile_untouched() {
        let mut profile = blank_profile();
        profile.expression.habits.insert(
            AuId::Au4,
            AuHabit {
                mean_intensity: 9.0,
                activation_rate: 0.5,
            },
        );
        let mut live = ExpressionProfile::default();
        live.observe(&state_with(&[(AuId::Au1, 2.0)]));
        let before = live.habit(AuId::Au1);
        assert!(profile
            .restore(&mut PersonalWeights::default(), &mut SourceTracker::default(), &mut live)
            .is_err());
        assert_eq!(live.habit(AuId::Au1), before);
    }

    #[test]
    fn test_gains_are_neutral_until_adapted() {
        let mut expression = ExpressionProfile::new(PersonalizationParams {
            min_samples: 5,
            ..Default::default()
        });
        let state = state_with(&[(AuId::Au1, 4.0)]);
        for _ in 0..4 {
            expression.observe(&state);
        }
        assert!(expression.gains().values().all(|g| *g == 1.0));
        expression.observe(&state);
        assert!(expression.is_adapted());
        let gains = expression.gains();
        // AU1 is a habit now and counts for less than an idle AU
        assert!(gains[AuId::Au1] < gains[AuId::Au4]);
        assert!(gains.values().all(|g| (0.5..=1.5).contains(g)));
    }

    #[test]
    fn test_habit_tracks_intensity_and_rate() {
        let mut expression = ExpressionProfile::default();
        expression.observe(&state_with(&[(AuId::Au15, 4.0)]));
        let habit = expression.habit(AuId::Au15);
        assert_eq!(habit.mean_intensity, 4.0);
        assert_eq!(habit.activation_rate, 1.0);
        assert!((habit.sensitivity() - 0.8).abs() < 1e-12);

        expression.observe(&state_with(&[]));
        let habit = expression.habit(AuId::Au15);
        assert!(habit.mean_intensity < 4.0 && habit.activation_rate < 1.0);
        assert_eq!(expression.habit(AuId::Au2).sensitivity(), 0.0);
    }

    #[test]
    fn test_reset_forgets_learning() {
        let mut weights = PersonalWeights::default();
        weights.apply(Emotion::Sad, Feedback::Incorrect);
        weights.reset();
        assert_eq!(weights.get(Emotion::Sad), 1.0);
        assert_eq!(weights.feedback_count(), 0);

        let mut expression = ExpressionProfile::default();
        expression.observe(&state_with(&[(AuId::Au1, 4.0)]));
        expression.reset();
        assert_eq!(expression.samples(), 0);
        assert_eq!(expression.habit(AuId::Au1), AuHabit::default());
        assert_eq!(expression.expressiveness(), 0.5);
    }
}
