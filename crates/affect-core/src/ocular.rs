//! Blink detection over the per-frame eye aspect ratio.

use serde::Serialize;

use crate::config::OcularParams;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BlinkEvent {
    /// Time the eye reopened
    pub timestamp_ms: f64,
    pub duration_ms: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct BlinkStats {
    /// Blinks per minute; `None` until two blinks bound a measurable span
    pub blink_rate: Option<f64>,
    pub avg_blink_duration_ms: f64,
    pub blink_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlinkState {
    Open,
    Closing,
    Closed,
    Opening,
}

/// Open → Closing → Closed → Opening → Open state machine. A blink counts
/// only when the full closure lasted between the configured bounds.
pub struct BlinkDetector {
    state: BlinkState,
    ear_threshold: f64,
    min_blink_ms: f64,
    max_blink_ms: f64,
    close_start_ms: f64,
    events: Vec<BlinkEvent>,
    window_ms: f64,
}

impl BlinkDetector {
    pub fn new(params: &OcularParams) -> Self {
        Self {
            state: BlinkState::Open,
            ear_threshold: params.blink_ear,
            min_blink_ms: params.min_blink_ms,
            max_blink_ms: params.max_blink_ms,
            close_start_ms: 0.0,
            events: Vec::with_capacity(64),
            window_ms: params.blink_rate_min_span_ms,
        }
    }

    /// Feeds one EAR sample. Frames without a usable EAR leave the state untouched.
    pub fn detect(&mut self, ear: Option<f64>, timestamp_ms: f64) -> Option<BlinkEvent> {
        let ear = ear.filter(|e| e.is_finite())?;
        let threshold = self.ear_threshold;
        let closed_threshold = threshold * 0.8;
        let mut blink = None;

        match self.state {
            BlinkState::Open => {
                if ear < threshold {
                    self.state = BlinkState::Closing;
                    self.close_start_ms = timestamp_ms;
                }
            }
            BlinkState::Closing => {
                if ear < closed_threshold {
                    self.state = BlinkState::Closed;
                } else if ear >= threshold {
                    self.state = BlinkState::Open;
                }
            }
            BlinkState::Closed => {
                if ear >= closed_threshold {
                    self.state = BlinkState::Opening;
                }
            }
            BlinkState::Opening => {
                if ear >= threshold {
                    let duration_ms = timestamp_ms - self.close_start_ms;
                    if (self.min_blink_ms..=self.max_blink_ms).contains(&duration_ms) {
                        let event = BlinkEvent {
                            timestamp_ms,
                            duration_ms,
                        };
                        self.events.push(event);
                        blink = Some(event);
                    }
                    self.state = BlinkState::Open;
                } else if ear < closed_threshold {
                    self.state = BlinkState::Closed;
                }
            }
        }

        let cutoff = timestamp_ms - self.window_ms;
        self.events.retain(|e| e.timestamp_ms >= cutoff);
        blink
    }

    pub fn stats(&self) -> BlinkStats {
        let count = self.events.len();
        let avg_blink_duration_ms = if count > 0 {
            self.events.iter().map(|e| e.duration_ms).sum::<f64>() / count as f64
        } else {
            0.0
        };

        let blink_rate = match (self.events.first(), self.events.last()) {
            (Some(first), Some(last)) if count >= 2 => {
                let minutes = (last.timestamp_ms - first.timestamp_ms) / 60_000.0;
                (minutes > 0.0).then(|| count as f64 / minutes)
            }
            _ => None,
        };

        BlinkStats {
            blink_rate,
            avg_blink_duration_ms,
            blink_count: count,
        }
    }

    pub fn reset(&mut self) {
        self.state = BlinkState::Open;
        self.close_start_ms = 0.0;
        self.events.clear();
    }
}

impl Default for BlinkDetector {
    fn default() -> Self {
        Self::new(&OcularParams::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(detector: &mut BlinkDetector, samples: &[(f64, f64)]) -> Vec<BlinkEvent> {
        samples
            .iter()
            .filter_map(|&(ear, t)| detector.detect(Some(ear), t))
            .collect()
    }

    #[test]
    fn test_detects_normal_blink() {
        let mut detector = BlinkDetector::default();
        let events = feed(
            &mut detector,
            &[(0.30, 0.0), (0.19, 33.0), (0.10, 66.0), (0.10, 100.0), (0.17, 133.0), (0.30, 166.0)],
        );
        assert_eq!(events.len(), 1);
        assert!((events[0].duration_ms - 133.0).abs() < 1e-9);
    }

    #[test]
    fn test_ignores_partial_closure() {
        let mut detector = BlinkDetector::default();
        let events = feed(&mut detector, &[(0.30, 0.0), (0.19, 33.0), (0.30, 66.0)]);
        assert!(events.is_empty());
    }

    #[test]
    fn test_rejects_long_closure() {
        let mut detector = BlinkDetector::default();
        let mut samples = vec![(0.30, 0.0), (0.19, 33.0)];
        samples.extend((2..30).map(|i| (0.05, i as f64 * 33.0)));
        samples.push((0.30, 1000.0));
        assert!(feed(&mut detector, &samples).is_empty());
    }

    #[test]
    fn test_missing_ear_keeps_state() {
        let mut detector = BlinkDetector::default();
        detector.detect(Some(0.19), 0.0);
        detector.detect(Some(0.10), 33.0);
        assert!(detector.detect(None, 66.0).is_none());
        detector.detect(Some(0.17), 100.0);
        assert!(detector.detect(Some(0.30), 133.0).is_some());
    }

    #[test]
    fn test_rate_needs_two_blinks() {
        let mut detector = BlinkDetector::default();
        let blink = |start: f64| {
            vec![
                (0.19, start),
                (0.10, start + 33.0),
                (0.17, start + 66.0),
                (0.30, start + 100.0),
            ]
        };
        feed(&mut detector, &blink(0.0));
        assert_eq!(detector.stats().blink_rate, None);
        feed(&mut detector, &blink(6000.0));
        let stats = detector.stats();
        assert_eq!(stats.blink_count, 2);
        assert!((stats.blink_rate.unwrap() - 20.0).abs() < 1e-9);
    }
}
