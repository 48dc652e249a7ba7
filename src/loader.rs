//! Turns files and byte streams into sound resources.

use crate::decoder::{downmix_stereo_i16, read_to_end, wav, ByteSource, StreamDecoder, SymphoniaDecoder};
use crate::error::{AudioError, Result};
use crate::format::FormatDescriptor;
use crate::resource::{SoundId, SoundMode, SoundResource};
use std::fs::File;
use std::io::{BufReader, Read, SeekFrom};
use std::path::{Path, PathBuf};

/// Where a sound's encoded data comes from.
pub enum SoundSource {
    Path(PathBuf),
    /// An already opened stream; `name` is used for logging and, through its
    /// extension, as a container hint.
    Stream {
        name: String,
        source: Box<dyn ByteSource>,
    },
}

impl SoundSource {
    pub fn path(path: impl Into<PathBuf>) -> Self {
        SoundSource::Path(path.into())
    }

    pub fn stream(name: impl Into<String>, source: impl ByteSource + 'static) -> Self {
        SoundSource::Stream {
            name: name.into(),
            source: Box::new(source),
        }
    }
}

/// Opens `source` as a file stream when `mode.streaming` is set, otherwise
/// decodes it completely into a sample. WAV data goes through the WAV
/// parser, anything else through symphonia.
pub fn load_sound(id: SoundId, source: SoundSource, mode: SoundMode) -> Result<SoundResource> {
    let (mut reader, name): (Box<dyn ByteSource>, String) = match source {
        SoundSource::Path(path) => (Box::new(File::open(&path)?), path.display().to_string()),
        SoundSource::Stream { name, source } => (source, name),
    };
    let extension = Path::new(&name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_string);

    let mut header = Vec::with_capacity(12);
    reader.by_ref().take(12).read_to_end(&mut header)?;
    reader.seek(SeekFrom::Start(0))?;

    if mode.streaming {
        let decoder = SymphoniaDecoder::open_with_hint(reader, extension.as_deref())
            .map_err(AudioError::Decoder)?;
        debug!("Opened {name} as a file stream");
        return SoundResource::file_stream(id, &name, mode, Box::new(decoder));
    }

    let (format, pcm) = if wav::is_wav(&header) {
        wav::load(BufReader::new(reader)).map_err(AudioError::Decoder)?
    } else {
        let mut decoder = SymphoniaDecoder::open_with_hint(reader, extension.as_deref())
            .map_err(AudioError::Decoder)?;
        let (channels, rate) = decoder.channels_and_rate();
        let pcm = read_to_end(&mut decoder).map_err(AudioError::Decoder)?;
        (FormatDescriptor::try_new(channels, rate, 16)?, pcm)
    };

    // 3D sounds are positioned as mono sources
    let (format, pcm) = if mode.mode_3d && format.channels() == 2 && format.bits_per_sample() == 16 {
        (
            FormatDescriptor::new(1, format.sample_rate(), 16),
            downmix_stereo_i16(&pcm),
        )
    } else {
        (format, pcm)
    };

    debug!(
        "Loaded {name}: {} bytes, {} ch, {} Hz, {} bit",
        pcm.len(),
        format.channels(),
        format.sample_rate(),
        format.bits_per_sample()
    );
    SoundResource::sample(id, &name, mode, format, pcm)
}
