//! Baseline Calibrator
//!
//! Collects the first N available samples of every AU feature and freezes
//! per-AU reference statistics once every buffer is full.

use serde::Serialize;

use crate::config::{BaselineCenter, CalibrationParams};
use crate::types::{AuFeatureVector, AuId, AuMap};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CalibrationStatus {
    InProgress { progress: f64 },
    Complete,
}

impl CalibrationStatus {
    pub fn progress(&self) -> f64 {
        match self {
            CalibrationStatus::InProgress { progress } => *progress,
            CalibrationStatus::Complete => 1.0,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, CalibrationStatus::Complete)
    }
}

/// Frozen reference statistics for one AU feature
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct BaselineStats {
    pub mean: f64,
    pub median: f64,
    /// Population standard deviation
    pub std: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BaselineProfile {
    pub stats: AuMap<BaselineStats>,
    pub center: BaselineCenter,
    pub spread_floor: f64,
    pub sample_count: usize,
}

impl BaselineProfile {
    /// Reference value deviations are measured from.
    #[inline]
    pub fn center_of(&self, au: AuId) -> f64 {
        let stats = &self.stats[au];
        match self.center {
            BaselineCenter::Mean => stats.mean,
            BaselineCenter::Median => stats.median,
        }
    }

    /// Spread floored to a safe divisor.
    #[inline]
    pub fn spread_of(&self, au: AuId) -> f64 {
        self.stats[au].std.max(self.spread_floor)
    }
}

pub struct BaselineCalibrator {
    params: CalibrationParams,
    buffers: AuMap<Vec<f64>>,
    profile: Option<BaselineProfile>,
}

impl BaselineCalibrator {
    pub fn new(params: CalibrationParams) -> Self {
        let capacity = params.baseline_frames;
        Self {
            params,
            buffers: AuMap::from_fn(|_| Vec::with_capacity(capacity)),
            profile: None,
        }
    }

    pub fn update(&mut self, features: &AuFeatureVector) -> CalibrationStatus {
        if self.profile.is_some() {
            return CalibrationStatus::Complete;
        }

        let capacity = self.params.baseline_frames;
        for (au, value) in features.iter() {
            if let Some(v) = value.filter(|v| v.is_finite()) {
                let buffer = &mut self.buffers[au];
                if buffer.len() < capacity {
                    buffer.push(v);
                }
            }
        }

        if self.buffers.values().all(|b| b.len() >= capacity) {
            let profile = self.freeze();
            tracing::info!(samples = profile.sample_count, "baseline calibration complete");
            self.profile = Some(profile);
            return CalibrationStatus::Complete;
        }

        CalibrationStatus::InProgress {
            progress: self.progress(),
        }
    }

    /// Minimum buffer fill ratio over all tracked AUs.
    pub fn progress(&self) -> f64 {
        if self.profile.is_some() {
            return 1.0;
        }
        let capacity = self.params.baseline_frames.max(1) as f64;
        self.buffers
            .values()
            .map(|b| b.len() as f64 / capacity)
            .fold(1.0, f64::min)
    }

    pub fn status(&self) -> CalibrationStatus {
        match self.profile {
            Some(_) => CalibrationStatus::Complete,
            None => CalibrationStatus::InProgress {
                progress: self.progress(),
            },
        }
    }

    pub fn profile(&self) -> Option<&BaselineProfile> {
        self.profile.as_ref()
    }

    pub fn is_complete(&self) -> bool {
        self.profile.is_some()
    }

    pub fn reset(&mut self) {
        for (_, buffer) in self.buffers.iter_mut() {
            buffer.clear();
        }
        self.profile = None;
    }

    fn freeze(&mut self) -> BaselineProfile {
        let stats = self.buffers.map(|_, samples| compute_stats(samples));
        for (_, buffer) in self.buffers.iter_mut() {
            buffer.clear();
            buffer.shrink_to_fit();
        }
        BaselineProfile {
            stats,
            center: self.params.center,
            spread_floor: self.params.spread_floor,
            sample_count: self.params.baseline_frames,
        }
    }
}

impl Default for BaselineCalibrator {
    fn default() -> Self {
        Self::new(CalibrationParams::default())
    }
}

fn compute_stats(samples: &[f64]) -> BaselineStats {
    if samples.is_empty() {
        return BaselineStats::default();
    }
    let n = samples.len() as f64;
    let mean = samples.iter().sum::<f64>() / n;
    let variance = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;

    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    let median = if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    };

    BaselineStats {
        mean,
        median,
        std: variance.sqrt(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(frames: usize) -> CalibrationParams {
        CalibrationParams {
            baseline_frames: frames,
            ..Default::default()
        }
    }

    fn constant_vector(v: f64) -> AuFeatureVector {
        AuMap::splat(Some(v))
    }

    #[test]
    fn test_completes_after_capacity() {
        let mut cal = BaselineCalibrator::new(params(3));
        assert!(!cal.update(&constant_vector(1.0)).is_complete());
        assert!(!cal.update(&constant_vector(2.0)).is_complete());
        assert!(cal.update(&constant_vector(3.0)).is_complete());

        let profile = cal.profile().unwrap();
        let stats = profile.stats[AuId::Au12];
        assert!((stats.mean - 2.0).abs() < 1e-12);
        assert!((stats.median - 2.0).abs() < 1e-12);
        assert!((stats.std - (2.0f64 / 3.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_unavailable_samples_are_skipped() {
        let mut cal = BaselineCalibrator::new(params(2));
        let mut partial = constant_vector(1.0);
        partial[AuId::Au43] = None;

        cal.update(&partial);
        let status = cal.update(&partial);
        // AU43 buffer is still empty
        assert_eq!(status, CalibrationStatus::InProgress { progress: 0.0 });

        cal.update(&constant_vector(1.0));
        assert!(cal.update(&constant_vector(1.0)).is_complete());
    }

    #[test]
    fn test_progress_is_min_fill_ratio() {
        let mut cal = BaselineCalibrator::new(params(4));
        cal.update(&constant_vector(1.0));
        assert!((cal.progress() - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_frozen_after_completion() {
        let mut cal = BaselineCalibrator::new(params(1));
        cal.update(&constant_vector(1.0));
        cal.update(&constant_vector(100.0));
        assert_eq!(cal.profile().unwrap().stats[AuId::Au1].mean, 1.0);
    }

    #[test]
    fn test_reset_clears_profile() {
        let mut cal = BaselineCalibrator::new(params(1));
        cal.update(&constant_vector(1.0));
        cal.reset();
        assert!(!cal.is_complete());
        assert_eq!(cal.progress(), 0.0);
    }

    #[test]
    fn test_median_center_and_spread_floor() {
        let mut cal = BaselineCalibrator::new(CalibrationParams {
            baseline_frames: 4,
            center: BaselineCenter::Median,
            spread_floor: 0.5,
        });
        for v in [1.0, 2.0, 3.0, 10.0] {
            cal.update(&constant_vector(v));
        }
        let profile = cal.profile().unwrap();
        assert_eq!(profile.center_of(AuId::Au4), 2.5);

        let mut flat = BaselineCalibrator::new(CalibrationParams {
            baseline_frames: 2,
            center: BaselineCenter::Mean,
            spread_floor: 0.5,
        });
        flat.update(&constant_vector(1.0));
        flat.update(&constant_vector(1.0));
        assert_eq!(flat.profile().unwrap().spread_of(AuId::Au4), 0.5);
    }
}
