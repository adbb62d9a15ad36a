//! Micro-Expression Detector
//!
//! Peak detection over the smoothed intensity history. A peak qualifies when
//! it stands well above the rest of the window and its half-maximum region
//! lasts 40-500 ms.

use serde::Serialize;

use crate::config::MicroExpressionParams;
use crate::smoothing::IntensityHistory;
use crate::types::{AuId, AuMap, Emotion};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MicroExpressionEvent {
    pub au: AuId,
    pub peak_intensity: f64,
    pub duration_ms: f64,
    pub peak_timestamp_ms: f64,
    pub emotion: Option<Emotion>,
}

pub struct MicroExpressionDetector {
    params: MicroExpressionParams,
    last_reported: AuMap<f64>,
}

impl MicroExpressionDetector {
    pub fn new(params: MicroExpressionParams) -> Self {
        Self {
            params,
            last_reported: AuMap::splat(f64::NEG_INFINITY),
        }
    }

    /// All qualifying peaks currently inside the history window.
    pub fn scan(&self, history: &IntensityHistory) -> Vec<MicroExpressionEvent> {
        if history.len() < 3 {
            return Vec::new();
        }
        let timestamps: Vec<f64> = history.timestamps().iter().copied().collect();
        let mut events = Vec::new();
        for au in AuId::ALL {
            let values: Vec<f64> = history.series(au).iter().copied().collect();
            if values.len() != timestamps.len() {
                continue;
            }
            events.extend(self.scan_series(au, &values, &timestamps));
        }
        events
    }

    /// Like [`scan`](Self::scan) but each peak is reported once, on the first
    /// frame it becomes visible.
    pub fn detect_new(&mut self, history: &IntensityHistory) -> Vec<MicroExpressionEvent> {
        let mut fresh = self.scan(history);
        fresh.retain(|e| e.peak_timestamp_ms > self.last_reported[e.au]);
        for event in &fresh {
            self.last_reported[event.au] = self.last_reported[event.au].max(event.peak_timestamp_ms);
        }
        fresh
    }

    pub fn reset(&mut self) {
        self.last_reported = AuMap::splat(f64::NEG_INFINITY);
    }

    fn scan_series(&self, au: AuId, values: &[f64], timestamps: &[f64]) -> Vec<MicroExpressionEvent> {
        let n = values.len();
        let total: f64 = values.iter().sum();
        let mut events = Vec::new();

        for i in 1..n - 1 {
            let peak = values[i];
            if !(peak > values[i - 1] && peak >= values[i + 1]) {
                continue;
            }
            if peak < self.params.min_peak {
                continue;
            }
            let surrounding = (total - peak) / (n - 1) as f64;
            if peak <= self.params.amplitude_ratio * surrounding {
                continue;
            }

            let half = peak / 2.0;
            let mut start = i;
            while start > 0 && values[start - 1] >= half {
                start -= 1;
            }
            let mut end = i;
            while end + 1 < n && values[end + 1] >= half {
                end += 1;
            }
            // onset or offset not yet inside the window
            if start == 0 || end + 1 == n {
                continue;
            }
            let duration_ms = timestamps[end] - timestamps[start];
            if duration_ms < self.params.min_duration_ms || duration_ms > self.params.max_duration_ms {
                continue;
            }

            events.push(MicroExpressionEvent {
                au,
                peak_intensity: peak,
                duration_ms,
                peak_timestamp_ms: timestamps[i],
                emotion: au.associated_emotion(),
            });
        }
        events
    }
}

impl Default for MicroExpressionDetector {
    fn default() -> Self {
        Self::new(MicroExpressionParams::default())
    }
}
