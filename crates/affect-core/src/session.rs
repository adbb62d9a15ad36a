//! Per-subject analysis session.
//!
//! Owns one instance of every pipeline stage and drives them frame by frame.
//! Nothing here is shared between sessions; voice snapshots arrive through
//! the session's [`VoiceMailbox`].

use std::collections::VecDeque;

use serde::Serialize;
use tracing::info;

use crate::calibration::{BaselineCalibrator, CalibrationStatus};
use crate::classifier::{AuClassifier, AuResult};
use crate::clinical::channels::{self, FrameObservation, ObservationWindow};
use crate::clinical::{ClinicalOutcome, ClinicalScorer};
use crate::config::AffectConfig;
use crate::emotion::{EmotionEngine, EmotionEstimate, Feedback, PersonalProfile};
use crate::error::Result;
use crate::features;
use crate::genuineness::{ConcealmentReport, GenuinenessAnalyzer, GenuinenessInput, GenuinenessVerdict};
use crate::micro::{MicroExpressionDetector, MicroExpressionEvent};
use crate::ocular::{BlinkDetector, BlinkEvent, BlinkStats};
use crate::smoothing::{LabelSmoother, SmoothedAuState, TemporalSmoother};
use crate::trend::{TemporalTrendAnalyzer, TrendSummary};
use crate::types::{AuId, Emotion, LandmarkFrame};
use crate::voice::{VoiceMailbox, VoiceReader};

const RECENT_LABELS: usize = 10;

/// Everything the pipeline produced for one frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameOutput {
    pub timestamp_ms: f64,
    pub calibration: CalibrationStatus,
    pub au_result: AuResult,
    pub smoothed: SmoothedAuState,
    pub estimate: EmotionEstimate,
    /// Majority-vote label; this is what downstream consumers should display
    pub reported_label: Emotion,
    pub micro_events: Vec<MicroExpressionEvent>,
    pub concealment: ConcealmentReport,
    pub genuineness: GenuinenessVerdict,
    pub blink: Option<BlinkEvent>,
    pub voice_present: bool,
}

pub struct AffectSession {
    config: AffectConfig,
    calibrator: BaselineCalibrator,
    classifier: AuClassifier,
    smoother: TemporalSmoother,
    labels: LabelSmoother,
    micro: MicroExpressionDetector,
    recent_events: VecDeque<MicroExpressionEvent>,
    engine: EmotionEngine,
    genuineness: GenuinenessAnalyzer,
    trend: TemporalTrendAnalyzer,
    blinks: BlinkDetector,
    voice: VoiceReader,
    window: ObservationWindow,
    clinical: ClinicalScorer,
    run_label: Option<Emotion>,
    run_start_ms: f64,
    recent_labels: Vec<Emotion>,
    voice_present: bool,
    frames_processed: usize,
}

impl AffectSession {
    pub fn new(config: AffectConfig) -> Self {
        Self::with_mailbox(config, VoiceMailbox::new())
    }

    /// Validates `config` before building the session.
    pub fn try_new(config: AffectConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(config))
    }

    /// Session reading voice snapshots from an existing mailbox.
    pub fn with_mailbox(config: AffectConfig, mailbox: VoiceMailbox) -> Self {
        Self {
            calibrator: BaselineCalibrator::new(config.calibration.clone()),
            classifier: AuClassifier::new(config.classifier.clone()),
            smoother: TemporalSmoother::new(&config.smoothing),
            labels: LabelSmoother::new(config.smoothing.label_window),
            micro: MicroExpressionDetector::new(config.micro.clone()),
            recent_events: VecDeque::new(),
            engine: EmotionEngine::new(&config),
            genuineness: GenuinenessAnalyzer::new(config.genuineness.clone()),
            trend: TemporalTrendAnalyzer::new(config.trend.clone()),
            blinks: BlinkDetector::new(&config.ocular),
            voice: VoiceReader::new(mailbox, config.clinical.voice_stale_ms),
            window: ObservationWindow::new(config.clinical.observation_window),
            clinical: ClinicalScorer::new(
                config.clinical.clone(),
                config.ocular.clone(),
                config.voice_indicators.clone(),
            ),
            run_label: None,
            run_start_ms: 0.0,
            recent_labels: Vec::with_capacity(RECENT_LABELS + 1),
            voice_present: false,
            frames_processed: 0,
            config,
        }
    }

    pub fn config(&self) -> &AffectConfig {
        &self.config
    }

    /// Handle for the capture thread to post voice snapshots into.
    pub fn voice_mailbox(&self) -> VoiceMailbox {
        self.voice.mailbox().clone()
    }

    pub fn process_frame(&mut self, frame: &LandmarkFrame) -> FrameOutput {
        let ts = frame.timestamp_ms;
        let features = features::extract(&frame.points);

        let calibration = self.calibrator.update(&features.aus);
        let au_result = self.classifier.classify(&features.aus, self.calibrator.profile());
        let smoothed = self.smoother.push(&au_result, ts);

        let micro_events = self.micro.detect_new(self.smoother.history());
        self.recent_events.extend(micro_events.iter().copied());
        let horizon = ts - self.config.genuineness.concealment_window_ms;
        while self
            .recent_events
            .front()
            .is_some_and(|e| e.peak_timestamp_ms < horizon)
        {
            self.recent_events.pop_front();
        }

        let voice = self.voice.read(ts);
        self.voice_present = voice.is_some();

        let estimate = self
            .engine
            .infer(&smoothed, features.geometric.as_ref(), voice.as_ref());
        if au_result.calibrated {
            self.engine.observe(&smoothed);
        }
        let reported_label = self.labels.push(estimate.label);

        if self.run_label != Some(reported_label) {
            self.run_label = Some(reported_label);
            self.run_start_ms = ts;
        }
        self.recent_labels.push(reported_label);
        if self.recent_labels.len() > RECENT_LABELS {
            self.recent_labels.remove(0);
        }
        self.trend.push(reported_label);

        let genuineness = self.genuineness.analyze(
            reported_label,
            &GenuinenessInput {
                state: &smoothed,
                duration_ms: ts - self.run_start_ms,
                history: self.smoother.history(),
                recent_labels: &self.recent_labels,
            },
        );
        let events: Vec<MicroExpressionEvent> = self.recent_events.iter().copied().collect();
        let concealment = self.genuineness.detect_concealment(reported_label, &events);

        let blink = self.blinks.detect(features.eyes.map(|e| e.mean_ear), ts);

        let depression_aus = &self.config.clinical.depression_aus;
        self.window.push(FrameObservation {
            timestamp_ms: ts,
            calibrated: au_result.calibrated,
            label: reported_label,
            confidence: estimate.confidence,
            intensity: estimate.intensity,
            depression_au_score: channels::depression_au_score(&smoothed, depression_aus),
            expressive_activity: channels::expressive_activity(&smoothed, depression_aus),
            brow_distress: smoothed.is_active(AuId::Au1) && smoothed.is_active(AuId::Au4),
            genuine_smile: reported_label == Emotion::Happy && genuineness.is_genuine,
            concealment: concealment.inconsistency,
            eyes: features.eyes,
            blink: blink.is_some(),
            voice,
        });
        self.frames_processed += 1;

        FrameOutput {
            timestamp_ms: ts,
            calibration,
            au_result,
            smoothed,
            estimate,
            reported_label,
            micro_events,
            concealment,
            genuineness,
            blink,
            voice_present: self.voice_present,
        }
    }

    /// Clinical assessment of the current observation window.
    pub fn assess(&mut self) -> ClinicalOutcome {
        self.clinical
            .assess(&self.window, self.voice_present, self.frames_processed)
    }

    pub fn trend(&self) -> TrendSummary {
        self.trend.analyze()
    }

    pub fn blink_stats(&self) -> BlinkStats {
        self.blinks.stats()
    }

    /// Applies feedback to the most recent estimate.
    pub fn feedback(&mut self, feedback: Feedback) -> bool {
        self.engine.feedback(feedback)
    }

    pub fn calibration_progress(&self) -> f64 {
        self.calibrator.progress()
    }

    pub fn is_ready(&self) -> bool {
        self.calibrator.is_complete()
    }

    pub fn frames_processed(&self) -> usize {
        self.frames_processed
    }

    pub fn export_profile(&self) -> PersonalProfile {
        self.engine.export_profile()
    }

    pub fn export_profile_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.engine.export_profile())?)
    }

    pub fn import_profile_json(&mut self, raw: &str) -> Result<()> {
        let profile: PersonalProfile = serde_json::from_str(raw)?;
        self.engine.import_profile(&profile)
    }

    /// Drops learned feedback weights, source accuracy and AU habits.
    /// Session state is untouched; see [`AffectSession::reset`].
    pub fn reset_profile(&mut self) {
        self.engine.reset_profile();
        info!("personal profile reset");
    }

    /// Starts over from calibration. Learned personal weights are kept.
    pub fn reset(&mut self) {
        self.calibrator.reset();
        self.classifier.reset();
        self.smoother.reset();
        self.labels.reset();
        self.micro.reset();
        self.recent_events.clear();
        self.engine.reset();
        self.trend.reset();
        self.blinks.reset();
        self.voice.reset();
        self.window.clear();
        self.clinical.reset();
        self.run_label = None;
        self.run_start_ms = 0.0;
        self.recent_labels.clear();
        self.voice_present = false;
        self.frames_processed = 0;
        info!("affect session reset");
    }
}

impl Default for AffectSession {
    fn default() -> Self {
        Self::new(AffectConfig::default())
    }
}
