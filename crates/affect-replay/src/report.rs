use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use affect_core::{ClinicalOutcome, Emotion, TrendSummary};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FrameCounts {
    pub total: usize,
    pub calibrated: usize,
    pub with_voice: usize,
    pub micro_events: usize,
    pub blinks: usize,
    pub feedback: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub session_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub frames: FrameCounts,
    pub label_counts: BTreeMap<Emotion, usize>,
    pub trend: TrendSummary,
    pub outcome: ClinicalOutcome,
}

impl SessionReport {
    pub fn new(
        frames: FrameCounts,
        label_counts: BTreeMap<Emotion, usize>,
        trend: TrendSummary,
        outcome: ClinicalOutcome,
    ) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            frames,
            label_counts,
            trend,
            outcome,
        }
    }
}
