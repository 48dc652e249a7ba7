//! WAV container loading for in-memory sample sounds.

use crate::format::FormatDescriptor;
use anyhow::{bail, Context, Result};
use byteorder::{LittleEndian, WriteBytesExt};
use hound::{SampleFormat, WavReader};
use std::io::Read;

/// True when `header` starts with a RIFF/WAVE signature.
pub fn is_wav(header: &[u8]) -> bool {
    header.len() >= 12 && &header[0..4] == b"RIFF" && &header[8..12] == b"WAVE"
}

/// Parses a WAV stream into its format and raw PCM bytes. 8-bit data stays
/// unsigned 8-bit; anything wider is reduced to signed 16-bit.
pub fn load<R: Read>(reader: R) -> Result<(FormatDescriptor, Vec<u8>)> {
    let mut reader = WavReader::new(reader).context("Invalid WAV header")?;
    let spec = reader.spec();

    if spec.sample_format == SampleFormat::Float {
        bail!("Floating point WAV data is not supported");
    }

    let mut pcm = Vec::with_capacity(reader.len() as usize * 2);
    let bits = match spec.bits_per_sample {
        8 => {
            // hound hands out 8-bit samples re-centered on zero
            for sample in reader.samples::<i8>() {
                pcm.push((sample? as i16 + 128) as u8);
            }
            8
        }
        16 => {
            for sample in reader.samples::<i16>() {
                pcm.write_i16::<LittleEndian>(sample?)?;
            }
            16
        }
        bits @ 17..=32 => {
            let shift = bits - 16;
            for sample in reader.samples::<i32>() {
                pcm.write_i16::<LittleEndian>((sample? >> shift) as i16)?;
            }
            16
        }
        bits => bail!("Unsupported WAV bit depth {bits}"),
    };

    Ok((FormatDescriptor::try_new(spec.channels, spec.sample_rate, bits)?, pcm))
}
