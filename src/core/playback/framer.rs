//! Reframing of arbitrary-length µ-law chunks into transport frames.

use bytes::Bytes;

use crate::core::codec::{FRAME_BYTES, MULAW_SILENCE};

/// Cuts a stream of chunks into fixed-size frames.
///
/// A partial tail is carried over to the next chunk of the same utterance and
/// only padded with silence when the utterance ends.
#[derive(Debug)]
pub struct Reframer {
    frame_bytes: usize,
    remainder: Vec<u8>,
}

impl Default for Reframer {
    fn default() -> Self {
        Self::new(FRAME_BYTES)
    }
}

impl Reframer {
    pub fn new(frame_bytes: usize) -> Self {
        Self {
            frame_bytes,
            remainder: Vec::with_capacity(frame_bytes),
        }
    }

    /// Append a chunk and return every complete frame it produced.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Bytes> {
        let mut frames = Vec::with_capacity((self.remainder.len() + chunk.len()) / self.frame_bytes);
        let mut input = chunk;

        if !self.remainder.is_empty() {
            let needed = self.frame_bytes - self.remainder.len();
            let take = needed.min(input.len());
            self.remainder.extend_from_slice(&input[..take]);
            input = &input[take..];
            if self.remainder.len() < self.frame_bytes {
                return frames;
            }
            frames.push(Bytes::from(std::mem::replace(
                &mut self.remainder,
                Vec::with_capacity(self.frame_bytes),
            )));
        }

        let mut exact = input.chunks_exact(self.frame_bytes);
        frames.extend(exact.by_ref().map(Bytes::copy_from_slice));
        self.remainder.extend_from_slice(exact.remainder());
        frames
    }

    /// Pad the carried tail with silence and return it as the final frame.
    pub fn finish(&mut self) -> Option<Bytes> {
        if self.remainder.is_empty() {
            return None;
        }
        let mut frame = std::mem::take(&mut self.remainder);
        frame.resize(self.frame_bytes, MULAW_SILENCE);
        Some(Bytes::from(frame))
    }

    pub fn remainder_len(&self) -> usize {
        self.remainder.len()
    }

    pub fn clear(&mut self) {
        self.remainder.clear();
    }
}
