//! Rolling transcript buffers flushed at turn and response boundaries.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    Caller,
    Assistant,
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Caller => f.write_str("caller"),
            Self::Assistant => f.write_str("assistant"),
        }
    }
}

/// Accumulates streamed transcript text for one speaker.
///
/// `partial` holds deltas of the item currently being transcribed; completed
/// segments move into `text` until the next flush.
#[derive(Debug)]
pub struct TranscriptAccumulator {
    speaker: Speaker,
    partial: String,
    text: String,
}

impl TranscriptAccumulator {
    pub fn new(speaker: Speaker) -> Self {
        Self {
            speaker,
            partial: String::new(),
            text: String::new(),
        }
    }

    pub fn speaker(&self) -> Speaker {
        self.speaker
    }

    pub fn push_delta(&mut self, delta: &str) {
        self.partial.push_str(delta);
    }

    /// Replace the partial text with the final text of a segment.
    pub fn complete_segment(&mut self, final_text: &str) {
        self.partial.clear();
        let segment = final_text.trim();
        if segment.is_empty() {
            return;
        }
        if !self.text.is_empty() {
            self.text.push(' ');
        }
        self.text.push_str(segment);
    }

    /// Promote whatever partial text exists to a completed segment.
    pub fn complete_partial(&mut self) {
        let partial = std::mem::take(&mut self.partial);
        self.complete_segment(&partial);
    }

    pub fn partial(&self) -> &str {
        &self.partial
    }

    pub fn is_empty(&self) -> bool {
        self.partial.is_empty() && self.text.is_empty()
    }

    /// Take the accumulated text, leaving the buffer empty.
    pub fn flush(&mut self) -> Option<String> {
        self.complete_partial();
        let text = std::mem::take(&mut self.text);
        (!text.is_empty()).then_some(text)
    }

    pub fn clear(&mut self) {
        self.partial.clear();
        self.text.clear();
    }
}
