//! Offline replay of recorded landmark sessions through the affect pipeline.

pub mod config;
pub mod error;
pub mod logging;
pub mod reader;
pub mod report;

use std::collections::BTreeMap;
use std::io::{BufRead, Write};

use tracing::{debug, info, warn};

use affect_core::{AffectConfig, AffectSession};

use crate::error::Result;
use crate::reader::FrameReader;
use crate::report::{FrameCounts, SessionReport};

/// Runs every frame from `input` through one session and returns the report.
pub fn replay<R: BufRead>(input: R, config: &AffectConfig) -> Result<SessionReport> {
    let mut session = AffectSession::try_new(config.clone())?;
    let mailbox = session.voice_mailbox();
    let mut counts = FrameCounts::default();
    let mut labels = BTreeMap::new();

    for record in FrameReader::new(input) {
        let record = record?;
        if let Some(voice) = record.voice {
            mailbox.post(voice);
        }

        let frame = record.to_frame();
        if !frame.is_complete() {
            debug!(timestamp_ms = frame.timestamp_ms, points = frame.points.len(), "incomplete landmark set");
        }
        let out = session.process_frame(&frame);

        counts.total += 1;
        counts.calibrated += usize::from(out.au_result.calibrated);
        counts.with_voice += usize::from(out.voice_present);
        counts.micro_events += out.micro_events.len();
        counts.blinks += usize::from(out.blink.is_some());
        *labels.entry(out.reported_label).or_insert(0) += 1;

        if let Some(feedback) = record.feedback {
            if session.feedback(feedback) {
                counts.feedback += 1;
            }
        }
    }

    if !session.is_ready() {
        warn!(frames = counts.total, "session ended before calibration completed");
    }
    let outcome = session.assess();
    info!(frames = counts.total, calibrated = counts.calibrated, "replay finished");

    Ok(SessionReport::new(counts, labels, session.trend(), outcome))
}

pub fn write_report<W: Write>(report: &SessionReport, mut out: W) -> Result<()> {
    serde_json::to_writer_pretty(&mut out, report)?;
    writeln!(out)?;
    out.flush()?;
    Ok(())
}
