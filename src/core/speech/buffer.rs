//! Accumulation of caller audio pending commit.

use bytes::Bytes;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::core::codec;

/// A contiguous run of caller audio handed to the engine in one commit.
#[derive(Debug, Clone)]
pub struct SpeechSegment {
    pub audio: Bytes,
    pub started_at: Instant,
}

impl SpeechSegment {
    pub fn len(&self) -> usize {
        self.audio.len()
    }

    pub fn is_empty(&self) -> bool {
        self.audio.is_empty()
    }

    pub fn duration(&self) -> Duration {
        codec::bytes_to_duration(self.audio.len())
    }
}

/// Buffers caller audio for the current turn.
///
/// A turn opens on the first speech frame. From then on every frame is kept,
/// pauses included, until a turn commit closes it. Outside a turn frames only
/// feed a small pre-roll ring so the onset of speech is not clipped.
#[derive(Debug)]
pub struct SpeechBuffer {
    audio: Vec<u8>,
    preroll: VecDeque<u8>,
    preroll_capacity: usize,
    turn_started_at: Option<Instant>,
    segment_started_at: Option<Instant>,
    new_bytes_since_commit: usize,
}

impl SpeechBuffer {
    pub fn new(preroll_capacity: usize) -> Self {
        Self {
            audio: Vec::with_capacity(codec::ms_to_bytes(2_000)),
            preroll: VecDeque::with_capacity(preroll_capacity),
            preroll_capacity,
            turn_started_at: None,
            segment_started_at: None,
            new_bytes_since_commit: 0,
        }
    }

    /// Append one inbound frame. Returns true if this frame opened a turn.
    pub fn accumulate(&mut self, frame: &[u8], is_speech: bool, now: Instant) -> bool {
        if self.turn_started_at.is_none() {
            if !is_speech {
                self.push_preroll(frame);
                return false;
            }

            self.turn_started_at = Some(now);
            self.segment_started_at = Some(now);
            let preroll_len = self.preroll.len();
            self.audio.extend(self.preroll.drain(..));
            self.new_bytes_since_commit += preroll_len;
            debug!(preroll_bytes = preroll_len, "Speech turn opened");
            self.append(frame, now);
            return true;
        }

        self.append(frame, now);
        false
    }

    fn append(&mut self, frame: &[u8], now: Instant) {
        if self.segment_started_at.is_none() {
            self.segment_started_at = Some(now);
        }
        self.audio.extend_from_slice(frame);
        self.new_bytes_since_commit += frame.len();
    }

    fn push_preroll(&mut self, frame: &[u8]) {
        if self.preroll_capacity == 0 {
            return;
        }
        self.preroll.extend(frame.iter().copied());
        let excess = self.preroll.len().saturating_sub(self.preroll_capacity);
        self.preroll.drain(..excess);
    }

    /// Bytes currently buffered for commit.
    pub fn len(&self) -> usize {
        self.audio.len()
    }

    pub fn is_empty(&self) -> bool {
        self.audio.is_empty()
    }

    /// Estimated duration of buffered audio.
    pub fn buffered_duration(&self) -> Duration {
        codec::bytes_to_duration(self.audio.len())
    }

    /// Bytes appended since the last commit.
    pub fn new_bytes_since_commit(&self) -> usize {
        self.new_bytes_since_commit
    }

    /// Whether a turn is open.
    pub fn in_turn(&self) -> bool {
        self.turn_started_at.is_some()
    }

    /// Start of the current turn, if one is open.
    pub fn turn_started_at(&self) -> Option<Instant> {
        self.turn_started_at
    }

    /// Elapsed time of the current turn.
    pub fn turn_elapsed(&self, now: Instant) -> Option<Duration> {
        self.turn_started_at.map(|at| now.duration_since(at))
    }

    /// Remove the buffered audio as a segment. The turn stays open.
    pub fn take(&mut self, now: Instant) -> SpeechSegment {
        let audio = Bytes::from(std::mem::take(&mut self.audio));
        let started_at = self.segment_started_at.take().unwrap_or(now);
        self.new_bytes_since_commit = 0;
        SpeechSegment { audio, started_at }
    }

    /// Close the current turn and reset the turn timer.
    pub fn close_turn(&mut self) {
        self.turn_started_at = None;
    }

    /// Drop all buffered audio and close the turn. Returns the dropped byte count.
    pub fn discard(&mut self) -> usize {
        let dropped = self.audio.len();
        self.audio.clear();
        self.preroll.clear();
        self.turn_started_at = None;
        self.segment_started_at = None;
        self.new_bytes_since_commit = 0;
        dropped
    }
}
