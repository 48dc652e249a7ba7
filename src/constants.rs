// Output format negotiated for the primary mix buffer
pub const PRIMARY_SAMPLE_RATE: u32 = 44100; // 44.1 kHz sample rate
pub const FALLBACK_SAMPLE_RATE: u32 = 22050; // used when the device rejects 44.1 kHz
pub const BIT_DEPTH: u16 = 16; // 16 bits per sample
pub const CHANNELS: u16 = 2; // Stereo channel

/// Hard cap on hardware buffers (original + duplicates) per sound resource.
pub const MAX_BUFFERS_PER_SOUND: usize = 256;

/// Ring size used by every file-backed stream, independent of track length.
pub const MAX_STREAM_BUFFER_BYTES: u32 = 2 * 64 * 1024;

/// Play cursor seeks are aligned down to this many bytes.
pub const CURSOR_ALIGN: u32 = 4;

// Volume in hundredths of a decibel
pub const VOLUME_MIN: i32 = -10_000;
pub const VOLUME_MAX: i32 = 0;

// Pan in hundredths of a decibel of attenuation on the opposite side
pub const PAN_LEFT: i32 = -10_000;
pub const PAN_CENTER: i32 = 0;
pub const PAN_RIGHT: i32 = 10_000;

pub const FREQUENCY_MIN: u32 = 100;
pub const FREQUENCY_MAX: u32 = 200_000;

/// Linear volume at or below this is treated as silence.
pub const SILENT_VOLUME: f32 = 0.001;
/// Pan magnitudes below this snap to center.
pub const PAN_DEAD_ZONE: f32 = 0.001;
/// Pan magnitudes at or beyond this saturate to hard left/right.
pub const PAN_SATURATION: f32 = 0.999;

// Silence byte values by sample width
pub const SILENCE_8BIT: u8 = 0x80;
pub const SILENCE_16BIT: u8 = 0x00;
