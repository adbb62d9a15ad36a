//! JSON-lines frame input.
//!
//! One object per line:
//! `{"timestamp_ms": 33.3, "points": [[x, y], ...], "voice": {...}, "feedback": "correct"}`
//! where `voice` and `feedback` are optional. Blank lines are skipped.

use std::io::BufRead;

use serde::Deserialize;

use affect_core::{Feedback, LandmarkFrame, Point2D, VoiceSnapshot};

use crate::error::{ReplayError, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct FrameRecord {
    pub timestamp_ms: f64,
    pub points: Vec<[f64; 2]>,
    #[serde(default)]
    pub voice: Option<VoiceSnapshot>,
    #[serde(default)]
    pub feedback: Option<Feedback>,
}

impl FrameRecord {
    pub fn to_frame(&self) -> LandmarkFrame {
        let points = self.points.iter().map(|[x, y]| Point2D::new(*x, *y)).collect();
        LandmarkFrame::new(points, self.timestamp_ms)
    }
}

pub struct FrameReader<R> {
    input: R,
    line: usize,
    buf: String,
}

impl<R: BufRead> FrameReader<R> {
    pub fn new(input: R) -> Self {
        Self {
            input,
            line: 0,
            buf: String::new(),
        }
    }

    fn parse(&self, raw: &str) -> Result<FrameRecord> {
        let record: FrameRecord = serde_json::from_str(raw).map_err(|source| ReplayError::Parse {
            line: self.line,
            source,
        })?;
        if !record.timestamp_ms.is_finite() {
            return Err(ReplayError::InvalidFrame {
                line: self.line,
                message: "timestamp_ms must be finite".to_string(),
            });
        }
        Ok(record)
    }
}

impl<R: BufRead> Iterator for FrameReader<R> {
    type Item = Result<FrameRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.buf.clear();
            match self.input.read_line(&mut self.buf) {
                Ok(0) => return None,
                Ok(_) => {
                    self.line += 1;
                    let raw = self.buf.trim();
                    if raw.is_empty() {
                        continue;
                    }
                    return Some(self.parse(raw));
                }
                Err(err) => return Some(Err(err.into())),
            }
        }
    }
}
