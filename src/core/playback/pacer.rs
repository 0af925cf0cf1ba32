//! Frame-paced playback queue.
//!
//! The pacer does not own a timer. The call runner ticks it once per frame
//! interval and forwards whatever [`PlaybackPacer::tick`] returns to the
//! transport.
//!
//! ```text
//! enqueue ──▶ Reframer ──▶ PlaybackQueue ──tick──▶ [Frame, Frame, Mark]
//!                              │
//!                 prebuffer gate: wait for `prebuffer_frames` or a mark
//!                 burst:          up to `max_burst_frames` above high water
//!                 cap:            oldest frames dropped beyond `max_queue_frames`
//!                 hold:           nothing behind a hold point leaves until released
//! ```

use bytes::Bytes;
use std::collections::VecDeque;
use tracing::{debug, info, warn};

use super::config::PacerConfig;
use super::framer::Reframer;

#[derive(Debug, Clone, PartialEq, Eq)]
enum QueueItem {
    Frame(Bytes),
    Mark(String),
    /// Playback stops here until the hold is released.
    Hold,
}

/// Something the transport must send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacerOutput {
    Frame(Bytes),
    /// End of an utterance.
    Mark(String),
}

/// Ordered frames and utterance marks. Only frames count toward the cap.
#[derive(Debug)]
pub struct PlaybackQueue {
    items: VecDeque<QueueItem>,
    frames: usize,
    max_frames: usize,
}

impl PlaybackQueue {
    pub fn new(max_frames: usize) -> Self {
        Self {
            items: VecDeque::new(),
            frames: 0,
            max_frames,
        }
    }

    /// Queue a frame, dropping the oldest frames beyond the cap.
    /// Returns how many frames were dropped.
    fn push_frame(&mut self, frame: Bytes) -> usize {
        self.items.push_back(QueueItem::Frame(frame));
        self.frames += 1;

        let mut dropped = 0;
        while self.frames > self.max_frames {
            let Some(index) = self
                .items
                .iter()
                .position(|item| matches!(item, QueueItem::Frame(_)))
            else {
                break;
            };
            self.items.remove(index);
            self.frames -= 1;
            dropped += 1;
        }
        dropped
    }

    fn push_mark(&mut self, name: String) {
        self.items.push_back(QueueItem::Mark(name));
    }

    fn push_hold(&mut self) {
        self.items.push_back(QueueItem::Hold);
    }

    fn remove_hold(&mut self) {
        if let Some(index) = self.hold_index() {
            self.items.remove(index);
        }
    }

    /// Drop the hold point and everything queued behind it. Returns the
    /// number of frames dropped.
    fn truncate_at_hold(&mut self) -> usize {
        let Some(index) = self.hold_index() else {
            return 0;
        };
        let dropped = self
            .items
            .drain(index..)
            .filter(|item| matches!(item, QueueItem::Frame(_)))
            .count();
        self.frames -= dropped;
        dropped
    }

    fn hold_index(&self) -> Option<usize> {
        self.items.iter().position(|item| matches!(item, QueueItem::Hold))
    }

    /// Whether the audio ahead of any hold point may start playing: either
    /// `prebuffer` frames are queued or an utterance end is reached.
    fn playable(&self, prebuffer: usize) -> bool {
        let mut frames = 0;
        for item in &self.items {
            match item {
                QueueItem::Frame(_) => {
                    frames += 1;
                    if frames >= prebuffer {
                        return true;
                    }
                }
                QueueItem::Mark(_) => return true,
                QueueItem::Hold => return false,
            }
        }
        false
    }

    fn front(&self) -> Option<&QueueItem> {
        self.items.front()
    }

    fn pop_front(&mut self) -> Option<QueueItem> {
        let item = self.items.pop_front()?;
        if matches!(item, QueueItem::Frame(_)) {
            self.frames -= 1;
        }
        Some(item)
    }

    /// Frames currently queued.
    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Drop everything. Returns the number of frames dropped.
    fn clear(&mut self) -> usize {
        let dropped = self.frames;
        self.items.clear();
        self.frames = 0;
        dropped
    }
}

/// Paces synthesized audio out at the transport frame rate.
#[derive(Debug)]
pub struct PlaybackPacer {
    config: PacerConfig,
    queue: PlaybackQueue,
    reframer: Reframer,
    held: bool,
    prebuffer_started: bool,
    utterance_active: bool,
    destroyed: bool,
    frames_sent: u64,
    frames_dropped: u64,
}

impl PlaybackPacer {
    pub fn new(config: PacerConfig) -> Self {
        let queue = PlaybackQueue::new(config.max_queue_frames);
        Self {
            config,
            queue,
            reframer: Reframer::default(),
            held: false,
            prebuffer_started: false,
            utterance_active: false,
            destroyed: false,
            frames_sent: 0,
            frames_dropped: 0,
        }
    }

    pub fn config(&self) -> &PacerConfig {
        &self.config
    }

    /// Reframe a chunk of µ-law audio and queue it. Returns the number of
    /// frames dropped to respect the queue cap.
    pub fn enqueue(&mut self, chunk: &[u8]) -> usize {
        if self.destroyed {
            debug!(bytes = chunk.len(), "Pacer destroyed, ignoring audio");
            return 0;
        }
        self.utterance_active = true;

        let mut dropped = 0;
        for frame in self.reframer.push(chunk) {
            dropped += self.queue.push_frame(frame);
        }
        if dropped > 0 {
            self.frames_dropped += dropped as u64;
            warn!(
                dropped = dropped,
                max_queue_frames = self.config.max_queue_frames,
                "Playback queue over capacity, dropped oldest frames"
            );
        }
        dropped
    }

    /// Close the current utterance: pad the remainder into a final frame and
    /// queue a mark behind it.
    pub fn mark_utterance_done(&mut self, name: impl Into<String>) {
        if self.destroyed {
            return;
        }
        if let Some(frame) = self.reframer.finish() {
            let dropped = self.queue.push_frame(frame);
            self.frames_dropped += dropped as u64;
        }
        let name = name.into();
        debug!(mark = %name, queued_frames = self.queue.frames(), "Utterance complete");
        self.queue.push_mark(name);
        self.utterance_active = false;
    }

    /// Hold back everything queued from now on until [`release`](Self::release)
    /// or [`discard_held`](Self::discard_held). Audio already queued still plays.
    pub fn hold(&mut self) {
        if self.destroyed || self.held {
            return;
        }
        self.queue.push_hold();
        self.held = true;
    }

    /// Let held audio play.
    pub fn release(&mut self) {
        if !self.held {
            return;
        }
        self.queue.remove_hold();
        self.held = false;
    }

    /// Drop held audio without touching what was queued before the hold.
    /// Returns the number of frames dropped.
    pub fn discard_held(&mut self) -> usize {
        if !self.held {
            return 0;
        }
        let dropped = self.queue.truncate_at_hold();
        self.reframer.clear();
        self.utterance_active = false;
        self.held = false;
        self.frames_dropped += dropped as u64;
        debug!(dropped = dropped, "Held playback discarded");
        dropped
    }

    pub fn is_held(&self) -> bool {
        self.held
    }

    /// One pacing tick.
    ///
    /// Nothing is sent until the prebuffer is satisfied. After that one frame
    /// is sent per tick, or a burst when the queue is above high water. A mark
    /// is sent as soon as the frames before it are out, and re-arms the
    /// prebuffer for the next utterance. A hold point stops the tick.
    pub fn tick(&mut self) -> Vec<PacerOutput> {
        let mut output = Vec::new();
        if self.destroyed || self.queue.is_empty() {
            return output;
        }

        if !self.prebuffer_started {
            if !self.queue.playable(self.config.prebuffer_frames) {
                return output;
            }
            self.prebuffer_started = true;
            debug!(queued_frames = self.queue.frames(), "Playback prebuffer satisfied");
        }

        let budget = if self.queue.frames() > self.config.high_water_frames {
            self.config.max_burst_frames.max(1)
        } else {
            1
        };

        let mut sent = 0;
        while let Some(item) = self.queue.front() {
            match item {
                QueueItem::Frame(_) if sent == budget => break,
                QueueItem::Hold => break,
                _ => {}
            }
            match self.queue.pop_front() {
                Some(QueueItem::Frame(frame)) => {
                    output.push(PacerOutput::Frame(frame));
                    sent += 1;
                }
                Some(QueueItem::Mark(name)) => {
                    output.push(PacerOutput::Mark(name));
                    self.prebuffer_started = false;
                    break;
                }
                Some(QueueItem::Hold) | None => break,
            }
        }
        self.frames_sent += sent as u64;
        output
    }

    /// Drop all queued audio for barge-in. The pacer stays usable.
    /// Returns the number of frames dropped.
    pub fn clear(&mut self) -> usize {
        let dropped = self.queue.clear();
        self.reframer.clear();
        self.held = false;
        self.prebuffer_started = false;
        self.utterance_active = false;
        if dropped > 0 {
            info!(dropped = dropped, "Playback cleared");
        }
        dropped
    }

    /// Stop accepting audio and discard everything queued.
    pub fn destroy(&mut self) -> usize {
        let dropped = self.clear();
        self.destroyed = true;
        dropped
    }

    pub fn queued_frames(&self) -> usize {
        self.queue.frames()
    }

    /// Whether any audio is queued or still being assembled.
    pub fn has_pending_audio(&self) -> bool {
        !self.queue.is_empty() || self.reframer.remainder_len() > 0 || self.utterance_active
    }

    pub fn is_prebuffer_started(&self) -> bool {
        self.prebuffer_started
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::codec::{FRAME_BYTES, MULAW_SILENCE};

    fn frames_in(output: &[PacerOutput]) -> usize {
        output
            .iter()
            .filter(|o| matches!(o, PacerOutput::Frame(_)))
            .count()
    }

    fn pacer() -> PlaybackPacer {
        PlaybackPacer::new(PacerConfig::default())
    }

    #[test]
    fn test_waits_for_prebuffer() {
        let mut pacer = pacer();
        pacer.enqueue(&[0x10; FRAME_BYTES * 3]);
        assert!(pacer.tick().is_empty());
        assert!(!pacer.is_prebuffer_started());

        pacer.enqueue(&[0x10; FRAME_BYTES]);
        assert_eq!(frames_in(&pacer.tick()), 1);
        assert!(pacer.is_prebuffer_started());
    }

    #[test]
    fn test_short_utterance_plays_once_marked() {
        let mut pacer = pacer();
        pacer.enqueue(&[0x10; FRAME_BYTES]);
        assert!(pacer.tick().is_empty());

        pacer.mark_utterance_done("utt-1");
        assert_eq!(
            pacer.tick(),
            vec![
                PacerOutput::Frame(Bytes::from(vec![0x10; FRAME_BYTES])),
                PacerOutput::Mark("utt-1".to_string()),
            ]
        );
        assert!(!pacer.is_prebuffer_started());
        assert!(!pacer.has_pending_audio());
    }

    #[test]
    fn test_one_frame_per_tick_below_high_water() {
        let mut pacer = pacer();
        pacer.enqueue(&[0x10; FRAME_BYTES * 10]);
        for _ in 0..10 {
            assert_eq!(frames_in(&pacer.tick()), 1);
        }
        assert!(pacer.tick().is_empty());
        assert_eq!(pacer.frames_sent(), 10);
    }

    #[test]
    fn test_burst_above_high_water_is_bounded() {
        let mut pacer = pacer();
        pacer.enqueue(&vec![0x10; FRAME_BYTES * 60]);
        assert_eq!(frames_in(&pacer.tick()), 3);
        assert_eq!(pacer.queued_frames(), 57);

        while pacer.queued_frames() > 50 {
            assert!(frames_in(&pacer.tick()) <= 3);
        }
        assert_eq!(frames_in(&pacer.tick()), 1);
    }

    #[test]
    fn test_queue_cap_drops_oldest_and_keeps_marks() {
        let config = PacerConfig {
            max_queue_frames: 10,
            ..Default::default()
        };
        let mut pacer = PlaybackPacer::new(config);
        pacer.enqueue(&[0x01; FRAME_BYTES * 4]);
        pacer.mark_utterance_done("first");
        let dropped = pacer.enqueue(&vec![0x02; FRAME_BYTES * 8]);

        assert_eq!(dropped, 2);
        assert_eq!(pacer.queued_frames(), 10);
        assert_eq!(pacer.frames_dropped(), 2);

        let mut outputs = Vec::new();
        for _ in 0..20 {
            outputs.extend(pacer.tick());
        }
        assert_eq!(frames_in(&outputs), 10);
        assert!(outputs.contains(&PacerOutput::Mark("first".to_string())));
        // The two surviving first-utterance frames precede the mark.
        assert_eq!(outputs[2], PacerOutput::Mark("first".to_string()));
    }

    #[test]
    fn test_unaligned_chunks_pad_only_the_last_frame() {
        let mut pacer = pacer();
        pacer.enqueue(&[0x20; 100]);
        pacer.enqueue(&[0x20; 250]);
        pacer.enqueue(&[0x20; 130]);
        pacer.enqueue(&[0x20; 15]);
        pacer.mark_utterance_done("utt");

        let mut frames = Vec::new();
        for _ in 0..10 {
            for output in pacer.tick() {
                if let PacerOutput::Frame(frame) = output {
                    frames.push(frame);
                }
            }
        }

        // 495 bytes: three full frames and a 15-byte tail.
        assert_eq!(frames.len(), 4);
        assert!(frames.iter().all(|f| f.len() == FRAME_BYTES));
        assert!(frames[..3].iter().all(|f| f.iter().all(|&b| b == 0x20)));
        assert!(frames[3][..15].iter().all(|&b| b == 0x20));
        assert!(frames[3][15..].iter().all(|&b| b == MULAW_SILENCE));
    }

    #[test]
    fn test_clear_keeps_pacer_usable() {
        let mut pacer = pacer();
        pacer.enqueue(&[0x10; FRAME_BYTES * 6 + 20]);
        assert_eq!(pacer.clear(), 6);
        assert!(!pacer.has_pending_audio());
        assert!(pacer.tick().is_empty());

        pacer.enqueue(&[0x10; FRAME_BYTES * 4]);
        assert_eq!(frames_in(&pacer.tick()), 1);
    }

    #[test]
    fn test_held_audio_waits_for_release() {
        let mut pacer = pacer();
        pacer.enqueue(&[0x01; FRAME_BYTES]);
        pacer.mark_utterance_done("first");
        pacer.hold();
        pacer.enqueue(&[0x02; FRAME_BYTES * 8]);
        pacer.mark_utterance_done("second");

        // The earlier utterance still plays out in full.
        assert_eq!(
            pacer.tick(),
            vec![
                PacerOutput::Frame(Bytes::from(vec![0x01; FRAME_BYTES])),
                PacerOutput::Mark("first".to_string()),
            ]
        );
        for _ in 0..5 {
            assert!(pacer.tick().is_empty());
        }
        assert!(pacer.is_held());
        assert!(pacer.has_pending_audio());

        pacer.release();
        let mut outputs = Vec::new();
        for _ in 0..10 {
            outputs.extend(pacer.tick());
        }
        assert_eq!(frames_in(&outputs), 8);
        assert_eq!(outputs.last(), Some(&PacerOutput::Mark("second".to_string())));
    }

    #[test]
    fn test_discard_held_keeps_earlier_audio() {
        let mut pacer = pacer();
        pacer.enqueue(&[0x01; FRAME_BYTES * 4]);
        pacer.hold();
        pacer.enqueue(&[0x02; FRAME_BYTES * 6 + 40]);

        assert_eq!(pacer.discard_held(), 6);
        assert!(!pacer.is_held());
        assert_eq!(pacer.queued_frames(), 4);
        assert_eq!(pacer.frames_dropped(), 6);

        let mut outputs = Vec::new();
        for _ in 0..6 {
            outputs.extend(pacer.tick());
        }
        assert_eq!(frames_in(&outputs), 4);
        assert!(outputs.iter().all(|o| match o {
            PacerOutput::Frame(frame) => frame.iter().all(|&b| b == 0x01),
            PacerOutput::Mark(_) => false,
        }));
    }

    #[test]
    fn test_clear_drops_hold() {
        let mut pacer = pacer();
        pacer.hold();
        pacer.enqueue(&[0x10; FRAME_BYTES * 4]);
        pacer.clear();
        assert!(!pacer.is_held());

        pacer.enqueue(&[0x10; FRAME_BYTES * 4]);
        assert_eq!(frames_in(&pacer.tick()), 1);
    }

    #[test]
    fn test_destroy_discards_and_rejects() {
        let mut pacer = pacer();
        pacer.enqueue(&[0x10; FRAME_BYTES * 8]);
        assert_eq!(pacer.destroy(), 8);
        assert_eq!(pacer.enqueue(&[0x10; FRAME_BYTES * 8]), 0);
        pacer.mark_utterance_done("late");
        assert_eq!(pacer.queued_frames(), 0);
        assert!(pacer.tick().is_empty());
        assert!(pacer.is_destroyed());
    }
}
