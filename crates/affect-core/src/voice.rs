//! Voice hand-off between a capture thread and the frame loop.
//!
//! The capture side posts whole snapshots into a single shared slot; the
//! frame loop reads without blocking and falls back to the last snapshot it
//! managed to read when the slot is momentarily locked.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Prosodic features for one analysis window of speech.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceSnapshot {
    /// Fundamental frequency; 0 when the window is unvoiced
    pub pitch_hz: f64,
    pub pitch_std_hz: f64,
    /// RMS energy, 0-1
    pub energy: f64,
    pub jitter: f64,
    pub shimmer: f64,
    pub timestamp_ms: f64,
}

impl VoiceSnapshot {
    pub fn is_voiced(&self) -> bool {
        self.pitch_hz > 0.0
    }

    pub fn is_finite(&self) -> bool {
        [
            self.pitch_hz,
            self.pitch_std_hz,
            self.energy,
            self.jitter,
            self.shimmer,
            self.timestamp_ms,
        ]
        .iter()
        .all(|v| v.is_finite())
    }
}

#[derive(Debug, Clone, Default)]
pub struct VoiceMailbox {
    slot: Arc<Mutex<Option<VoiceSnapshot>>>,
}

impl VoiceMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn post(&self, snapshot: VoiceSnapshot) {
        *self.slot.lock() = Some(snapshot);
    }

    /// Marks the voice channel as gone (microphone stopped or muted).
    pub fn clear(&self) {
        *self.slot.lock() = None;
    }

    /// `None` when the slot is held by the writer at this instant.
    fn try_peek(&self) -> Option<Option<VoiceSnapshot>> {
        self.slot.try_lock().map(|guard| *guard)
    }
}

/// Frame-loop side of a [`VoiceMailbox`].
#[derive(Debug)]
pub struct VoiceReader {
    mailbox: VoiceMailbox,
    cached: Option<VoiceSnapshot>,
    stale_ms: f64,
    was_present: bool,
}

impl VoiceReader {
    pub fn new(mailbox: VoiceMailbox, stale_ms: f64) -> Self {
        Self {
            mailbox,
            cached: None,
            stale_ms,
            was_present: false,
        }
    }

    pub fn mailbox(&self) -> &VoiceMailbox {
        &self.mailbox
    }

    /// Current snapshot, if one is fresh relative to `now_ms`.
    pub fn read(&mut self, now_ms: f64) -> Option<VoiceSnapshot> {
        match self.mailbox.try_peek() {
            Some(latest) => self.cached = latest,
            None => tracing::debug!("voice mailbox busy, reusing cached snapshot"),
        }

        let fresh = self
            .cached
            .filter(|s| s.is_finite() && now_ms - s.timestamp_ms <= self.stale_ms);

        if self.was_present && fresh.is_none() {
            tracing::debug!(now_ms, "voice channel degraded to absent");
        }
        self.was_present = fresh.is_some();
        fresh
    }

    pub fn reset(&mut self) {
        self.cached = None;
        self.was_present = false;
    }
}
