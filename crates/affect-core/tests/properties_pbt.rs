//! Property-Based Tests for the affect pipeline
//!
//! Invariants:
//! - Baseline: features equal to the calibrated baseline never activate an AU
//! - Distributions: every fused distribution sums to 1 with values in [0, 1]
//! - Smoothing: re-feeding the smoothed label leaves it unchanged
//! - Clinical: totals stay in 0..=27, severity is monotonic, item 9 forces severe
//! - Concealment: a sad/fear micro event under a happy or neutral face is flagged
//! - Genuineness: a sustained, smooth AU6+AU12 smile is genuine

use proptest::prelude::*;

use affect_core::calibration::BaselineCalibrator;
use affect_core::classifier::AuClassifier;
use affect_core::clinical::{ClinicalScore, ScoreTrend, Severity};
use affect_core::config::{AffectConfig, CalibrationParams, ClassifierParams};
use affect_core::emotion::EmotionEngine;
use affect_core::genuineness::{GenuinenessAnalyzer, GenuinenessInput};
use affect_core::micro::MicroExpressionEvent;
use affect_core::smoothing::{IntensityHistory, LabelSmoother, SmoothedAu, SmoothedAuState};
use affect_core::types::{AuFeatureVector, AuId, AuMap, Emotion, AU_COUNT};

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_feature_vector() -> impl Strategy<Value = AuFeatureVector> {
    proptest::collection::vec(0.05f64..2.0, AU_COUNT)
        .prop_map(|values| AuMap::from_fn(|au| Some(values[au.index()])))
}

fn arb_smoothed_state() -> impl Strategy<Value = SmoothedAuState> {
    proptest::collection::vec((any::<bool>(), 0.0f64..=5.0), AU_COUNT).prop_map(|aus| {
        let mut state = SmoothedAuState::empty(0.0);
        for au in AuId::ALL {
            let (active, intensity) = aus[au.index()];
            state.aus[au] = SmoothedAu {
                available: true,
                active,
                intensity: if active { intensity } else { 0.0 },
            };
        }
        state
    })
}

fn arb_emotion() -> impl Strategy<Value = Emotion> {
    proptest::sample::select(Emotion::ALL.to_vec())
}

fn arb_masking_label() -> impl Strategy<Value = Emotion> {
    prop_oneof![Just(Emotion::Happy), Just(Emotion::Neutral)]
}

fn arb_micro_event() -> impl Strategy<Value = MicroExpressionEvent> {
    (proptest::sample::select(AuId::ALL.to_vec()), 2.0f64..=5.0, 40.0f64..=500.0).prop_map(
        |(au, peak_intensity, duration_ms)| MicroExpressionEvent {
            au,
            peak_intensity,
            duration_ms,
            peak_timestamp_ms: 0.0,
            emotion: au.associated_emotion(),
        },
    )
}

fn arb_items() -> impl Strategy<Value = [u8; 9]> {
    proptest::collection::vec(0u8..=3, 9).prop_map(|v| {
        let mut items = [0u8; 9];
        items.copy_from_slice(&v);
        items
    })
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #[test]
    fn baseline_features_stay_inactive(features in arb_feature_vector()) {
        let mut calibrator = BaselineCalibrator::new(CalibrationParams {
            baseline_frames: 20,
            ..Default::default()
        });
        for _ in 0..20 {
            calibrator.update(&features);
        }
        prop_assert!(calibrator.is_complete());

        let mut classifier = AuClassifier::new(ClassifierParams::default());
        let result = classifier.classify(&features, calibrator.profile());
        prop_assert!(result.calibrated);
        for (au, state) in result.aus.iter() {
            prop_assert!(!state.activated, "{:?} activated", au);
            prop_assert_eq!(state.intensity, 0);
        }
    }

    #[test]
    fn fused_distribution_is_normalised(states in proptest::collection::vec(arb_smoothed_state(), 1..12)) {
        let mut engine = EmotionEngine::new(&AffectConfig::default());
        for state in &states {
            let estimate = engine.infer(state, None, None);
            let values = estimate.distribution.as_array();
            let sum: f64 = values.iter().sum();
            prop_assert!((sum - 1.0).abs() < 1e-6);
            prop_assert!(values.iter().all(|v| (0.0..=1.0).contains(v)));
            prop_assert!((0.0..=1.0).contains(&estimate.confidence));
        }
    }

    #[test]
    fn label_smoothing_is_idempotent(labels in proptest::collection::vec(arb_emotion(), 1..40)) {
        let mut smoother = LabelSmoother::new(5);
        let mut smoothed = Emotion::Neutral;
        for label in &labels {
            smoothed = smoother.push(*label);
        }
        for _ in 0..5 {
            prop_assert_eq!(smoother.push(smoothed), smoothed);
        }
    }

    #[test]
    fn clinical_total_is_bounded(items in arb_items()) {
        let score = ClinicalScore::from_items(items, ScoreTrend::InsufficientData);
        prop_assert!(score.total <= 27);
        prop_assert_eq!(score.total, items.iter().sum::<u8>());
        if items[8] >= 1 {
            prop_assert_eq!(score.severity, Severity::Severe);
        } else {
            prop_assert_eq!(score.severity, Severity::from_total(score.total));
        }
    }

    #[test]
    fn severity_is_monotonic(a in 0u8..=27, b in 0u8..=27) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(Severity::from_total(lo) <= Severity::from_total(hi));
    }

    #[test]
    fn masked_negative_micro_event_is_flagged(
        label in arb_masking_label(),
        negative_au in prop_oneof![Just(AuId::Au15), Just(AuId::Au20)],
        others in proptest::collection::vec(arb_micro_event(), 0..6),
    ) {
        let mut events = others;
        events.push(MicroExpressionEvent {
            au: negative_au,
            peak_intensity: 3.0,
            duration_ms: 120.0,
            peak_timestamp_ms: 0.0,
            emotion: negative_au.associated_emotion(),
        });
        let report = GenuinenessAnalyzer::default().detect_concealment(label, &events);
        prop_assert!(report.hidden_count >= 1);
        prop_assert!(report.inconsistency > 0.0);
    }

    #[test]
    fn sustained_duchenne_smile_is_genuine(
        au6 in 3.0f64..=5.0,
        au12 in 3.0f64..=5.0,
        duration_ms in 500.0f64..=4000.0,
    ) {
        let mut state = SmoothedAuState::empty(0.0);
        for (au, intensity) in [(AuId::Au6, au6), (AuId::Au12, au12)] {
            state.aus[au] = SmoothedAu {
                available: true,
                active: true,
                intensity,
            };
        }
        let mut history = IntensityHistory::new(15);
        for i in 0..15 {
            history.push(&SmoothedAuState {
                timestamp_ms: i as f64 * 33.0,
                ..state.clone()
            });
        }
        let labels = [Emotion::Happy; 10];
        let verdict = GenuinenessAnalyzer::default().analyze(
            Emotion::Happy,
            &GenuinenessInput {
                state: &state,
                duration_ms,
                history: &history,
                recent_labels: &labels,
            },
        );
        prop_assert!(verdict.is_genuine);
        prop_assert!(verdict.score >= 0.6);
    }
}
