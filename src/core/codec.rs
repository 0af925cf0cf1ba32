//! G.711 µ-law helpers for the 8 kHz telephony stream.
//!
//! Every byte on the media stream is one companded sample, so byte counts and
//! durations convert with a fixed factor of 8 bytes per millisecond.

use std::time::Duration;

/// Sample rate of the telephony stream.
pub const SAMPLE_RATE: u32 = 8000;

/// µ-law bytes per millisecond of audio at 8 kHz mono.
pub const BYTES_PER_MS: usize = 8;

/// Transport frame duration (the smallest addressable unit).
pub const FRAME_MS: u64 = 20;

/// Bytes per 20 ms transport frame.
pub const FRAME_BYTES: usize = BYTES_PER_MS * FRAME_MS as usize;

/// µ-law encoding of linear zero. Used for silence padding.
pub const MULAW_SILENCE: u8 = 0xFF;

const MULAW_BIAS: i32 = 0x84;
const MULAW_CLIP: i32 = 32635;

/// Distance of a µ-law code from the zero level, in code units (0..=127).
///
/// The code is stored bit-inverted with the sign in the top bit, so the
/// magnitude is the inverted low seven bits.
#[inline]
pub fn magnitude(code: u8) -> u8 {
    !code & 0x7F
}

/// Convert a byte count to the audio duration it carries.
#[inline]
pub fn bytes_to_duration(bytes: usize) -> Duration {
    Duration::from_millis((bytes / BYTES_PER_MS) as u64)
}

/// Convert a duration in milliseconds to a byte count.
#[inline]
pub const fn ms_to_bytes(ms: u64) -> usize {
    ms as usize * BYTES_PER_MS
}

/// Decode one µ-law code to a 16-bit linear sample.
pub fn decode(code: u8) -> i16 {
    let code = !code;
    let sign = code & 0x80;
    let exponent = ((code >> 4) & 0x07) as i32;
    let mantissa = (code & 0x0F) as i32;
    let magnitude = (((mantissa << 3) + MULAW_BIAS) << exponent) - MULAW_BIAS;
    if sign != 0 {
        -magnitude as i16
    } else {
        magnitude as i16
    }
}

/// Encode one 16-bit linear sample as µ-law.
pub fn encode(sample: i16) -> u8 {
    let mut pcm = sample as i32;
    let sign = if pcm < 0 {
        pcm = -pcm;
        0x80
    } else {
        0x00
    };
    pcm = pcm.min(MULAW_CLIP) + MULAW_BIAS;

    let mut exponent = 7;
    let mut mask = 0x4000;
    while exponent > 0 && pcm & mask == 0 {
        exponent -= 1;
        mask >>= 1;
    }
    let mantissa = (pcm >> (exponent + 3)) & 0x0F;
    !(sign | (exponent << 4) | mantissa) as u8
}

/// Convert 24 kHz little-endian PCM16 to 8 kHz µ-law.
///
/// Each output sample is the mean of three input samples, which is enough of a
/// low-pass for narrowband speech. A trailing odd byte is ignored.
pub fn pcm24k_to_mulaw(pcm: &[u8]) -> Vec<u8> {
    let samples: Vec<i16> = pcm
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect();

    samples
        .chunks(3)
        .map(|group| {
            let sum: i32 = group.iter().map(|&s| s as i32).sum();
            encode((sum / group.len() as i32) as i16)
        })
        .collect()
}
