//! Affect Core
//!
//! Facial action-unit analysis over 68-point landmark streams: per-subject
//! baseline calibration, AU classification and smoothing, micro-expression
//! detection, rule-based emotion inference with ensemble fusion, genuineness
//! checks, long-window trend statistics and PHQ-9 depression-risk scoring.
//!
//! [`AffectSession`] wires every stage together; the individual stages are
//! public for callers that only need part of the pipeline.

pub mod calibration;
pub mod classifier;
pub mod clinical;
pub mod config;
pub mod emotion;
pub mod error;
pub mod features;
pub mod genuineness;
pub mod micro;
pub mod ocular;
pub mod session;
pub mod smoothing;
pub mod trend;
pub mod types;
pub mod voice;

pub use calibration::{BaselineCalibrator, BaselineProfile, CalibrationStatus};
pub use classifier::{AuClassifier, AuResult, AuState};
pub use clinical::{
    ClinicalOutcome, ClinicalReport, ClinicalScore, ClinicalScorer, RiskTier, ScoreTrend, Severity,
};
pub use config::AffectConfig;
pub use emotion::{EmotionEngine, EmotionEstimate, Feedback, PersonalProfile};
pub use error::{AffectError, Result};
pub use genuineness::{ConcealmentReport, ConcealmentRisk, GenuinenessAnalyzer, GenuinenessVerdict};
pub use micro::{MicroExpressionDetector, MicroExpressionEvent};
pub use session::{AffectSession, FrameOutput};
pub use smoothing::{SmoothedAuState, TemporalSmoother};
pub use trend::{TemporalTrendAnalyzer, TrendMetrics, TrendSummary};
pub use types::{AuId, AuMap, Emotion, EmotionDistribution, LandmarkFrame, Point2D};
pub use voice::{VoiceMailbox, VoiceSnapshot};
