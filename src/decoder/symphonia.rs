use super::{ByteSource, StreamDecoder};
use crate::constants::PRIMARY_SAMPLE_RATE;
use anyhow::{Context, Result};
use byteorder::{LittleEndian, WriteBytesExt};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Lets any [`ByteSource`] back a symphonia media stream.
struct SourceAdapter(Box<dyn ByteSource>);

impl Read for SourceAdapter {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

impl Seek for SourceAdapter {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.0.seek(pos)
    }
}

impl MediaSource for SourceAdapter {
    fn is_seekable(&self) -> bool {
        true
    }

    fn byte_len(&self) -> Option<u64> {
        None
    }
}

/// Streaming decoder for any container/codec symphonia supports.
pub struct SymphoniaDecoder {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    channels: u16,
    sample_rate: u32,
    total_frames: Option<u64>,
    sample_buf: Option<(SampleBuffer<i16>, u64)>,
    /// Decoded bytes not yet handed out by `read`
    pending: Vec<u8>,
    pending_pos: usize,
    eof: bool,
}

impl SymphoniaDecoder {
    pub fn open(source: Box<dyn ByteSource>) -> Result<Self> {
        Self::open_with_hint(source, None)
    }

    pub fn open_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).with_context(|| format!("Could not open {}", path.display()))?;
        let extension = path.extension().and_then(|e| e.to_str());
        Self::open_with_hint(Box::new(file), extension)
    }

    /// `extension` helps the probe guess the container when given.
    pub fn open_with_hint(source: Box<dyn ByteSource>, extension: Option<&str>) -> Result<Self> {
        let mss = MediaSourceStream::new(Box::new(SourceAdapter(source)), Default::default());

        let mut hint = Hint::new();
        if let Some(extension) = extension {
            hint.with_extension(extension);
        }

        let format_opts: FormatOptions = Default::default();
        let metadata_opts: MetadataOptions = Default::default();
        let decoder_opts: DecoderOptions = Default::default();

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &format_opts, &metadata_opts)
            .context("Unrecognized audio container")?;
        let format = probed.format;

        let track = format
            .default_track()
            .context("Could not find any tracks in stream")?;
        let params = track.codec_params.clone();
        let track_id = track.id;

        let decoder = symphonia::default::get_codecs()
            .make(&params, &decoder_opts)
            .context("Unsupported codec")?;

        let channels = params.channels.map(|c| c.count() as u16).unwrap_or(2);
        let sample_rate = params.sample_rate.unwrap_or_else(|| {
            warn!("Stream does not report a sample rate, assuming {PRIMARY_SAMPLE_RATE} Hz");
            PRIMARY_SAMPLE_RATE
        });

        Ok(Self {
            format,
            decoder,
            track_id,
            channels,
            sample_rate,
            total_frames: params.n_frames,
            sample_buf: None,
            pending: Vec::new(),
            pending_pos: 0,
            eof: false,
        })
    }

    /// Decodes the next packet of the selected track into `pending`. Returns
    /// false once the stream is exhausted.
    fn decode_next(&mut self) -> Result<bool> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                // Symphonia reports the regular end of stream as UnexpectedEof
                Err(SymphoniaError::IoError(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    return Ok(false);
                }
                Err(SymphoniaError::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(e) => return Err(e).context("Could not read packet"),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            let audio_buf = match self.decoder.decode(&packet) {
                Ok(audio_buf) => audio_buf,
                Err(SymphoniaError::DecodeError(e)) => {
                    warn!("Skipping undecodable packet: {e}");
                    continue;
                }
                Err(e) => return Err(e).context("Could not decode packet"),
            };

            let spec = *audio_buf.spec();
            let duration = audio_buf.capacity() as u64;
            let fits = matches!(&self.sample_buf, Some((_, cap)) if *cap >= duration);
            if !fits {
                self.sample_buf = Some((SampleBuffer::<i16>::new(duration, spec), duration));
            }

            if let Some((buf, _)) = &mut self.sample_buf {
                buf.copy_interleaved_ref(audio_buf);

                self.pending.clear();
                self.pending_pos = 0;
                for &sample in buf.samples() {
                    self.pending.write_i16::<LittleEndian>(sample)?;
                }
            }
            return Ok(true);
        }
    }
}

impl StreamDecoder for SymphoniaDecoder {
    fn read(&mut self, dst: &mut [u8]) -> Result<usize> {
        let mut written = 0;
        while written < dst.len() {
            if self.pending_pos < self.pending.len() {
                let n = (self.pending.len() - self.pending_pos).min(dst.len() - written);
                dst[written..written + n]
                    .copy_from_slice(&self.pending[self.pending_pos..self.pending_pos + n]);
                self.pending_pos += n;
                written += n;
                continue;
            }
            if self.eof {
                break;
            }
            if !self.decode_next()? {
                self.eof = true;
            }
        }
        Ok(written)
    }

    fn total_samples(&self) -> Option<u64> {
        self.total_frames
    }

    fn channels_and_rate(&self) -> (u16, u32) {
        (self.channels, self.sample_rate)
    }

    fn rewind(&mut self) -> Result<()> {
        self.format
            .seek(
                SeekMode::Accurate,
                SeekTo::TimeStamp {
                    ts: 0,
                    track_id: self.track_id,
                },
            )
            .context("Could not rewind stream")?;
        self.decoder.reset();
        self.pending.clear();
        self.pending_pos = 0;
        self.eof = false;
        Ok(())
    }
}
