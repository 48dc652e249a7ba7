//! Fixed-size PCM format record shared by every sound resource.

use crate::constants::{BIT_DEPTH, CHANNELS, SILENCE_16BIT, SILENCE_8BIT};
use crate::error::{AudioError, Result};

fn wide_block_align(channels: u16, bits_per_sample: u16) -> u32 {
    u32::from(channels) * u32::from(bits_per_sample) / 8
}

/// Interleaved integer PCM layout. Derived fields are computed once in
/// [`FormatDescriptor::new`] and never change afterwards.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FormatDescriptor {
    channels: u16,
    sample_rate: u32,
    bits_per_sample: u16,
    block_align: u16,
    avg_bytes_per_sec: u32,
}

impl FormatDescriptor {
    /// Builds a format from trusted values. Derived fields saturate rather
    /// than overflow; values from files or callers go through
    /// [`FormatDescriptor::try_new`].
    pub fn new(channels: u16, sample_rate: u32, bits_per_sample: u16) -> Self {
        let block_align = u16::try_from(wide_block_align(channels, bits_per_sample)).unwrap_or(u16::MAX);
        Self {
            channels,
            sample_rate,
            bits_per_sample,
            block_align,
            avg_bytes_per_sec: sample_rate.saturating_mul(block_align as u32),
        }
    }

    /// Like [`FormatDescriptor::new`], but rejects layouts whose block or
    /// byte rate does not fit the descriptor.
    pub fn try_new(channels: u16, sample_rate: u32, bits_per_sample: u16) -> Result<Self> {
        let wide = wide_block_align(channels, bits_per_sample);
        let block_align = u16::try_from(wide).map_err(|_| {
            AudioError::Config(format!(
                "{channels} channels of {bits_per_sample} bits make a {wide} byte block"
            ))
        })?;
        let avg_bytes_per_sec = sample_rate.checked_mul(block_align as u32).ok_or_else(|| {
            AudioError::Config(format!(
                "{sample_rate} Hz with {block_align} byte blocks overflows the byte rate"
            ))
        })?;
        Ok(Self {
            channels,
            sample_rate,
            bits_per_sample,
            block_align,
            avg_bytes_per_sec,
        })
    }

    /// 16-bit stereo at the given rate, the format used for the primary mix.
    pub fn stereo16(sample_rate: u32) -> Self {
        Self::new(CHANNELS, sample_rate, BIT_DEPTH)
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn bits_per_sample(&self) -> u16 {
        self.bits_per_sample
    }

    pub fn block_align(&self) -> u16 {
        self.block_align
    }

    pub fn avg_bytes_per_sec(&self) -> u32 {
        self.avg_bytes_per_sec
    }

    /// Byte value that plays back as silence: unsigned 8-bit PCM centers on
    /// 0x80, signed 16-bit on zero.
    pub fn silence_byte(&self) -> u8 {
        if self.bits_per_sample == 8 {
            SILENCE_8BIT
        } else {
            SILENCE_16BIT
        }
    }

    /// Converts a time offset into a byte offset into the PCM data.
    pub fn secs_to_bytes(&self, secs: f64) -> u64 {
        if secs <= 0.0 {
            return 0;
        }
        (secs * self.avg_bytes_per_sec as f64) as u64
    }

    /// Rounds `bytes` down so that each half of a double buffer holds a whole
    /// number of blocks.
    pub fn align_ring_size(&self, bytes: u32) -> u32 {
        let unit = (self.block_align.max(1) as u32) * 2;
        bytes - bytes % unit
    }
}
