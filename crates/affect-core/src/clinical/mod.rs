//! Multimodal Fusion & Clinical Scorer
//!
//! Aggregates the observation window into visual, ocular and voice channels,
//! fuses them into a composite risk and maps the supporting ratios onto the
//! nine PHQ-9 items.

pub mod channels;
pub mod phq9;

use std::collections::VecDeque;

use serde::Serialize;

use crate::config::{ClinicalParams, OcularParams, VoiceIndicatorParams};

pub use channels::{
    FrameObservation, ObservationWindow, OcularChannel, VisualChannel, VoiceChannel,
};
pub use phq9::{ClinicalScore, ScoreTrend, Severity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ModalityWeights {
    pub visual: f64,
    pub voice: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClinicalReport {
    pub score: ClinicalScore,
    pub visual: VisualChannel,
    pub ocular: OcularChannel,
    pub voice: Option<VoiceChannel>,
    pub visual_modality: f64,
    pub weights: ModalityWeights,
    pub composite: f64,
    pub risk: RiskTier,
    pub recommendations: Vec<String>,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ClinicalOutcome {
    InsufficientData { frames: usize, required: usize },
    Scored(Box<ClinicalReport>),
}

impl ClinicalOutcome {
    pub fn report(&self) -> Option<&ClinicalReport> {
        match self {
            ClinicalOutcome::Scored(report) => Some(report),
            ClinicalOutcome::InsufficientData { .. } => None,
        }
    }
}

pub struct ClinicalScorer {
    params: ClinicalParams,
    ocular: OcularParams,
    voice: VoiceIndicatorParams,
    totals: VecDeque<u8>,
}

impl ClinicalScorer {
    pub fn new(params: ClinicalParams, ocular: OcularParams, voice: VoiceIndicatorParams) -> Self {
        Self {
            totals: VecDeque::with_capacity(params.history_len),
            params,
            ocular,
            voice,
        }
    }

    /// Builds the channels from `window` and scores them. Voice only counts
    /// when `voice_present` says the channel is live right now.
    pub fn assess(&mut self, window: &ObservationWindow, voice_present: bool, frames_seen: usize) -> ClinicalOutcome {
        let visual = channels::visual_channel(window, &self.params);
        let ocular = channels::ocular_channel(window, &self.ocular);
        let voice = if voice_present {
            channels::voice_channel(window, &self.voice)
        } else {
            None
        };
        self.score(&visual, &ocular, voice.as_ref(), frames_seen)
    }

    pub fn score(
        &mut self,
        visual: &VisualChannel,
        ocular: &OcularChannel,
        voice: Option<&VoiceChannel>,
        frames_seen: usize,
    ) -> ClinicalOutcome {
        if visual.frames < self.params.min_frames {
            return ClinicalOutcome::InsufficientData {
                frames: visual.frames,
                required: self.params.min_frames,
            };
        }

        let visual_modality = channels::visual_modality_score(visual, ocular, &self.params.visual_weights);
        let weights = match voice {
            Some(_) => {
                let cw = &self.params.channel_weights;
                let sum = (cw.visual + cw.voice).max(f64::EPSILON);
                ModalityWeights {
                    visual: cw.visual / sum,
                    voice: cw.voice / sum,
                }
            }
            None => ModalityWeights {
                visual: 1.0,
                voice: 0.0,
            },
        };
        let composite = (weights.visual * visual_modality + weights.voice * voice.map_or(0.0, |v| v.score))
            .clamp(0.0, 1.0);
        let risk = self.risk_tier(composite);

        let items = phq9::score_items(visual, ocular, voice, composite, &self.params.phq9);
        let provisional = ClinicalScore::from_items(items, ScoreTrend::InsufficientData);
        self.totals.push_back(provisional.total);
        while self.totals.len() > self.params.history_len.max(1) {
            self.totals.pop_front();
        }
        let totals: Vec<u8> = self.totals.iter().copied().collect();
        let trend = phq9::score_trend(
            &totals,
            self.params.trend_min_points,
            self.params.trend_slope_threshold,
        );
        let score = ClinicalScore { trend, ..provisional };

        ClinicalOutcome::Scored(Box::new(ClinicalReport {
            recommendations: phq9::recommendations(&score),
            confidence: phq9::assessment_confidence(frames_seen, visual.mean_confidence),
            score,
            visual: *visual,
            ocular: *ocular,
            voice: voice.copied(),
            visual_modality,
            weights,
            composite,
            risk,
        }))
    }

    pub fn risk_tier(&self, composite: f64) -> RiskTier {
        if composite < self.params.risk_low {
            RiskTier::Low
        } else if composite < self.params.risk_medium {
            RiskTier::Medium
        } else {
            RiskTier::High
        }
    }

    /// Past totals, oldest first.
    pub fn totals(&self) -> &VecDeque<u8> {
        &self.totals
    }

    pub fn reset(&mut self) {
        self.totals.clear();
    }
}

impl Default for ClinicalScorer {
    fn default() -> Self {
        Self::new(
            ClinicalParams::default(),
            OcularParams::default(),
            VoiceIndicatorParams::default(),
        )
    }
}
