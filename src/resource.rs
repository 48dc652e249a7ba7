//! Playable sound descriptions and the buffers they own.

use crate::backend::{AudioDevice, BufferCaps, BufferDesc, BufferId};
use crate::capture::CaptureSession;
use crate::constants::MAX_STREAM_BUFFER_BYTES;
use crate::decoder::{downmix_stereo_i16, StreamDecoder};
use crate::error::{invariant_violation, AudioError, Result};
use crate::format::FormatDescriptor;
use crate::pool::{Acquired, BufferPool};
use crate::stage::StreamStage;
use serde::{Deserialize, Serialize};

/// Bytes requested from a decoder per read while topping up the stage.
const DECODE_CHUNK_BYTES: usize = 16 * 1024;

/// Identifies a sound resource owned by an [`AudioWorld`](crate::world::AudioWorld).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SoundId(pub(crate) u32);

/// Creation flags for a sound.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct SoundMode {
    pub mode_3d: bool,
    pub looping: bool,
    pub streaming: bool,
    pub software_mix: bool,
    pub record: bool,
    /// Per-buffer effects. Not supported: duplicates cannot carry effects.
    pub ctrl_fx: bool,
}

impl SoundMode {
    pub fn with_3d(mut self) -> Self {
        self.mode_3d = true;
        self
    }

    pub fn with_looping(mut self) -> Self {
        self.looping = true;
        self
    }

    pub fn with_streaming(mut self) -> Self {
        self.streaming = true;
        self
    }

    pub fn with_software_mix(mut self) -> Self {
        self.software_mix = true;
        self
    }

    pub fn with_record(mut self) -> Self {
        self.record = true;
        self
    }
}

/// Pull callback for data-driven streams: `(dst, offset, max_len) -> bytes_read`,
/// where `offset` counts the bytes delivered so far.
pub type DataCallback = Box<dyn FnMut(&mut [u8], u64, usize) -> usize + Send>;

pub enum SoundResourceKind {
    /// Decoded PCM held in memory
    Sample { pcm: Vec<u8> },
    FileStream {
        decoder: Box<dyn StreamDecoder>,
        mono_downmix: bool,
        scratch: Vec<u8>,
    },
    DataStream { callback: DataCallback, offset: u64 },
    Capture(CaptureSession),
}

/// Which variant a sound is, without its payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SoundKind {
    Sample,
    FileStream,
    DataStream,
    Capture,
}

pub struct SoundResource {
    id: SoundId,
    name: String,
    mode: SoundMode,
    format: FormatDescriptor,
    buffer_byte_size: u32,
    pool: BufferPool,
    kind: SoundResourceKind,
}

fn check_mode(mode: &SoundMode) {
    if mode.ctrl_fx {
        invariant_violation("effects-capable buffers cannot be duplicated per voice");
    }
}

/// Size of a sample's single buffer; device buffers are addressed in u32.
pub(crate) fn sample_byte_size(name: &str, len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| {
        AudioError::Config(format!(
            "sound {name} has {len} bytes of sample data, more than one buffer holds"
        ))
    })
}

impl SoundResource {
    pub fn sample(id: SoundId, name: &str, mode: SoundMode, format: FormatDescriptor, pcm: Vec<u8>) -> Result<Self> {
        check_mode(&mode);
        if pcm.is_empty() {
            return Err(AudioError::Config(format!("sound {name} has no sample data")));
        }
        let buffer_byte_size = sample_byte_size(name, pcm.len())?;
        Ok(Self {
            id,
            name: name.to_string(),
            mode,
            format,
            buffer_byte_size,
            pool: BufferPool::new(),
            kind: SoundResourceKind::Sample { pcm },
        })
    }

    /// 3D sounds are positioned as mono sources, so stereo streams are
    /// downmixed when the sound is 3D.
    pub fn file_stream(id: SoundId, name: &str, mode: SoundMode, decoder: Box<dyn StreamDecoder>) -> Result<Self> {
        check_mode(&mode);
        let (channels, rate) = decoder.channels_and_rate();
        let mono_downmix = mode.mode_3d && channels == 2;
        let format = FormatDescriptor::try_new(if mono_downmix { 1 } else { channels }, rate, 16)?;
        Ok(Self {
            id,
            name: name.to_string(),
            mode,
            format,
            buffer_byte_size: format.align_ring_size(MAX_STREAM_BUFFER_BYTES),
            pool: BufferPool::new(),
            kind: SoundResourceKind::FileStream {
                decoder,
                mono_downmix,
                scratch: vec![0; DECODE_CHUNK_BYTES],
            },
        })
    }

    pub fn data_stream(
        id: SoundId,
        mode: SoundMode,
        format: FormatDescriptor,
        buffer_size: u32,
        callback: DataCallback,
    ) -> Result<Self> {
        check_mode(&mode);
        let buffer_byte_size = format.align_ring_size(buffer_size);
        if buffer_byte_size == 0 {
            return Err(AudioError::Config(format!(
                "stream buffer of {buffer_size} bytes holds no whole blocks"
            )));
        }
        Ok(Self {
            id,
            name: format!("data stream {}", id.0),
            mode,
            format,
            buffer_byte_size,
            pool: BufferPool::new(),
            kind: SoundResourceKind::DataStream {
                callback,
                offset: 0,
            },
        })
    }

    pub fn capture(id: SoundId, mode: SoundMode, format: FormatDescriptor, session: CaptureSession) -> Self {
        check_mode(&mode);
        Self {
            id,
            name: format!("capture {}", session.device().name),
            mode,
            format,
            buffer_byte_size: session.buffer_byte_size(),
            pool: BufferPool::new(),
            kind: SoundResourceKind::Capture(session),
        }
    }

    pub fn id(&self) -> SoundId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> SoundMode {
        self.mode
    }

    pub fn format(&self) -> FormatDescriptor {
        self.format
    }

    pub fn buffer_byte_size(&self) -> u32 {
        self.buffer_byte_size
    }

    /// Size of one half of the streaming ring, a whole number of blocks.
    pub fn half_size(&self) -> u32 {
        self.format.align_ring_size(self.buffer_byte_size) / 2
    }

    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    pub fn kind(&self) -> SoundKind {
        match self.kind {
            SoundResourceKind::Sample { .. } => SoundKind::Sample,
            SoundResourceKind::FileStream { .. } => SoundKind::FileStream,
            SoundResourceKind::DataStream { .. } => SoundKind::DataStream,
            SoundResourceKind::Capture(_) => SoundKind::Capture,
        }
    }

    pub fn is_streaming(&self) -> bool {
        matches!(
            self.kind,
            SoundResourceKind::FileStream { .. } | SoundResourceKind::DataStream { .. }
        )
    }

    pub fn is_file_stream(&self) -> bool {
        matches!(self.kind, SoundResourceKind::FileStream { .. })
    }

    pub fn pcm(&self) -> Option<&[u8]> {
        match &self.kind {
            SoundResourceKind::Sample { pcm } => Some(pcm),
            _ => None,
        }
    }

    pub fn capture_session(&mut self) -> Option<&mut CaptureSession> {
        match &mut self.kind {
            SoundResourceKind::Capture(session) => Some(session),
            _ => None,
        }
    }

    pub fn buffer_desc(&self) -> BufferDesc {
        BufferDesc {
            size: self.buffer_byte_size,
            format: self.format,
            caps: BufferCaps {
                ctrl_3d: self.mode.mode_3d,
                ctrl_pan: !self.mode.mode_3d,
                ctrl_volume: true,
                ctrl_frequency: true,
                ctrl_position_notify: self.is_streaming(),
                global_focus: true,
                software: self.mode.software_mix,
            },
        }
    }

    /// Takes a buffer from the pool. The first acquisition creates the
    /// original, whose realized size becomes this sound's buffer size.
    pub fn acquire_buffer(&mut self, device: &mut dyn AudioDevice) -> Result<Acquired> {
        if matches!(self.kind, SoundResourceKind::Capture(_)) {
            return Err(AudioError::not_ready(format!(
                "{} is a capture sound and cannot be played",
                self.name
            )));
        }
        let desc = self.buffer_desc();
        let acquired = self.pool.acquire(device, &desc)?;
        if let Some(realized) = acquired.realized_size {
            self.buffer_byte_size = realized;
        }
        Ok(acquired)
    }

    pub fn release_buffer(&mut self, buffer: BufferId) {
        self.pool.release(buffer);
    }

    pub fn mark_primed(&mut self) {
        self.pool.mark_primed();
    }

    /// Pulls up to `dst.len()` bytes from the stream source through `stage`.
    /// Returns the number of bytes written; fewer than requested means the
    /// source ran dry for now.
    pub fn pull_stream(&mut self, stage: &mut StreamStage, dst: &mut [u8]) -> usize {
        match &mut self.kind {
            SoundResourceKind::FileStream {
                decoder,
                mono_downmix,
                scratch,
            } => {
                while stage.buffered() < dst.len() && !stage.is_eof() {
                    let read = match decoder.read(scratch) {
                        Ok(read) => read,
                        Err(e) => {
                            warn!("Error while decoding {}: {e:#}", self.name);
                            0
                        }
                    };
                    if read == 0 {
                        stage.set_eof(true);
                        break;
                    }
                    if *mono_downmix {
                        stage.push_bytes(&downmix_stereo_i16(&scratch[..read]));
                    } else {
                        stage.push_bytes(&scratch[..read]);
                    }
                }
                stage.pull_into(dst)
            }
            SoundResourceKind::DataStream { callback, offset } => {
                let mut filled = 0;
                while filled < dst.len() {
                    let max_len = dst.len() - filled;
                    let read = callback(&mut dst[filled..], *offset, max_len).min(max_len);
                    if read == 0 {
                        break;
                    }
                    *offset += read as u64;
                    filled += read;
                }
                filled
            }
            SoundResourceKind::Sample { .. } | SoundResourceKind::Capture(_) => 0,
        }
    }

    /// Restarts a file stream at its first sample. Other sources have no start
    /// to return to.
    pub fn rewind_stream(&mut self, stage: &mut StreamStage) -> Result<()> {
        match &mut self.kind {
            SoundResourceKind::FileStream { decoder, .. } => {
                stage.clear();
                decoder.rewind().map_err(AudioError::Decoder)
            }
            _ => Ok(()),
        }
    }

    /// Releases every device object the sound owns. All of its buffers must
    /// already be back in the pool.
    pub fn destroy(&mut self, device: &mut dyn AudioDevice) {
        self.pool.destroy(device);
        if let SoundResourceKind::Capture(session) = &mut self.kind {
            session.close(device);
        }
        debug!("Destroyed sound {} ({:?})", self.name, self.id);
    }
}
