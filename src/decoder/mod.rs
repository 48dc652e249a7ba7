//! Decoder adapters feeding file-backed sounds.
//!
//! Every decoder produces interleaved signed 16-bit little-endian PCM, which
//! is what the streaming ring and sample buffers store.

pub mod symphonia;
pub mod wav;

use anyhow::Result;
use byteorder::{ByteOrder, LittleEndian};
use itertools::Itertools;
use std::io::{Read, Seek};

pub use self::symphonia::SymphoniaDecoder;

/// Seekable byte stream a decoder reads its container from (read, seek, tell).
pub trait ByteSource: Read + Seek + Send + Sync {}

impl<T: Read + Seek + Send + Sync> ByteSource for T {}

/// Pull interface over a compressed audio stream.
pub trait StreamDecoder: Send {
    /// Reads up to `dst.len()` bytes of 16-bit signed PCM. Returns 0 at the
    /// end of the stream.
    fn read(&mut self, dst: &mut [u8]) -> Result<usize>;

    /// Length of the stream in sample frames, if the container reports it.
    fn total_samples(&self) -> Option<u64>;

    fn channels_and_rate(&self) -> (u16, u32);

    /// Repositions the stream at its first sample.
    fn rewind(&mut self) -> Result<()>;
}

/// Decodes the remainder of the stream into memory.
pub fn read_to_end(decoder: &mut dyn StreamDecoder) -> Result<Vec<u8>> {
    let mut pcm = Vec::new();
    let mut chunk = vec![0u8; 16 * 1024];
    loop {
        let read = decoder.read(&mut chunk)?;
        if read == 0 {
            break;
        }
        pcm.extend_from_slice(&chunk[..read]);
    }
    Ok(pcm)
}

/// Averages interleaved 16-bit stereo frames down to mono. A trailing
/// partial frame is dropped.
pub fn downmix_stereo_i16(stereo: &[u8]) -> Vec<u8> {
    let mut mono = vec![0u8; stereo.len() / 4 * 2];
    let frames = stereo
        .chunks_exact(2)
        .map(LittleEndian::read_i16)
        .tuples::<(i16, i16)>();
    for ((left, right), out) in frames.zip(mono.chunks_exact_mut(2)) {
        let mixed = ((left as i32 + right as i32) / 2) as i16;
        LittleEndian::write_i16(out, mixed);
    }
    mono
}
