//! Test infrastructure for streammix integration tests.
//!
//! Provides a deterministic world over the in-memory device, a scripted
//! decoder and WAV fixtures written to temporary directories.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

// Re-export key types from the main crate
pub use streammix::backend::{AudioDevice, BufferId, CooperativeLevel, MemoryDevice, WindowHandle};
pub use streammix::channel::{ChannelId, ChannelState};
pub use streammix::decoder::StreamDecoder;
pub use streammix::error::{AudioError, DeviceErrorCode};
pub use streammix::format::FormatDescriptor;
pub use streammix::resource::{SoundKind, SoundMode};
pub use streammix::world::{AudioWorld, ChannelInfo, SoundInfo, VisibilityProbe};
pub use streammix::{AudioConfig, SoundSource, VirtualChannel};

pub const WINDOW: WindowHandle = WindowHandle(0x1234);

/// Config for tests: no refill thread, so every refill happens inside an
/// explicit `on_update` or `stream_refill_pass`.
pub fn test_config() -> AudioConfig {
    AudioConfig {
        background_refill: false,
        restore_sleep_ms: 0,
        restore_attempts: 5,
        ..AudioConfig::default()
    }
}

/// World with four 2D and two 3D channels over `device`.
pub fn make_world(device: &MemoryDevice) -> AudioWorld {
    AudioWorld::init(Box::new(device.clone()), WINDOW, 4, 2, &test_config()).unwrap()
}

pub fn make_world_with(device: &MemoryDevice, n_2d: usize, n_3d: usize, config: &AudioConfig) -> AudioWorld {
    AudioWorld::init(Box::new(device.clone()), WINDOW, n_2d, n_3d, config).unwrap()
}

/// Counting byte pattern, continuous across offsets.
pub fn pattern(offset: u64, len: usize) -> Vec<u8> {
    (0..len as u64).map(|i| ((offset + i) % 251) as u8 + 1).collect()
}

/// Decoder over a fixed byte script. With `dry_after_rewinds` set it
/// returns nothing once rewound that many times.
pub struct ScriptedDecoder {
    data: Vec<u8>,
    position: usize,
    rewinds: usize,
    dry_after_rewinds: Option<usize>,
}

impl ScriptedDecoder {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            position: 0,
            rewinds: 0,
            dry_after_rewinds: None,
        }
    }

    pub fn dry_after_rewinds(mut self, rewinds: usize) -> Self {
        self.dry_after_rewinds = Some(rewinds);
        self
    }
}

impl StreamDecoder for ScriptedDecoder {
    fn read(&mut self, dst: &mut [u8]) -> anyhow::Result<usize> {
        if self.dry_after_rewinds.is_some_and(|n| self.rewinds >= n) {
            return Ok(0);
        }
        let n = dst.len().min(self.data.len() - self.position);
        dst[..n].copy_from_slice(&self.data[self.position..self.position + n]);
        self.position += n;
        Ok(n)
    }

    fn total_samples(&self) -> Option<u64> {
        Some(self.data.len() as u64 / 4)
    }

    fn channels_and_rate(&self) -> (u16, u32) {
        (2, 44100)
    }

    fn rewind(&mut self) -> anyhow::Result<()> {
        self.rewinds += 1;
        self.position = 0;
        Ok(())
    }
}

/// Writes a WAV file of `frames` frames with a ramp signal and returns its
/// path.
pub fn write_wav(dir: &Path, name: &str, channels: u16, sample_rate: u32, bits: u16, frames: u32) -> PathBuf {
    let path = dir.join(name);
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: bits,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec).unwrap();
    for frame in 0..frames {
        for channel in 0..channels {
            match bits {
                8 => writer
                    .write_sample((((frame + channel as u32) % 200) as i32 - 100) as i8)
                    .unwrap(),
                _ => writer
                    .write_sample((((frame * 64 + channel as u32 * 1000) % 60000) as i32 - 30000) as i16)
                    .unwrap(),
            }
        }
    }
    writer.finalize().unwrap();
    path
}

/// Bytes of a WAV file kept in memory.
pub fn wav_bytes(channels: u16, sample_rate: u32, bits: u16, frames: u32) -> Vec<u8> {
    let dir = tempfile::tempdir().unwrap();
    let path = write_wav(dir.path(), "mem.wav", channels, sample_rate, bits, frames);
    std::fs::read(path).unwrap()
}

/// Interleaved 16-bit stereo silence of `frames` frames.
pub fn stereo_pcm(frames: usize) -> Vec<u8> {
    vec![0; frames * 4]
}

/// Buffer bound to a playing channel.
pub fn bound_buffer(world: &AudioWorld, channel: ChannelId) -> BufferId {
    world.channel_info(channel).unwrap().buffer.unwrap()
}
