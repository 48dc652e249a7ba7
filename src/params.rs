//! Playback request parameters and their conversion to device units.

use crate::constants::{
    CURSOR_ALIGN, FREQUENCY_MAX, FREQUENCY_MIN, PAN_CENTER, PAN_DEAD_ZONE, PAN_LEFT, PAN_RIGHT,
    PAN_SATURATION, SILENT_VOLUME, VOLUME_MAX, VOLUME_MIN,
};
use crate::format::FormatDescriptor;
use glam::Vec3;

/// A backend-agnostic playback request, served by a real channel while
/// attached.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VirtualChannel {
    /// Linear gain, 0.0 - 1.0
    pub volume: f32,
    /// -1.0 (left) - 1.0 (right), ignored for 3D sounds
    pub pan: f32,
    /// Playback rate multiplier
    pub pitch: f32,
    pub position: Vec3,
    pub velocity: Vec3,
    pub min_distance: f32,
    /// Where in the sound playback starts
    pub time_offset_secs: f64,
}

impl Default for VirtualChannel {
    fn default() -> Self {
        Self {
            volume: 1.0,
            pan: 0.0,
            pitch: 1.0,
            position: Vec3::ZERO,
            velocity: Vec3::ZERO,
            min_distance: 1.0,
            time_offset_secs: 0.0,
        }
    }
}

/// Linear gain to hundredths of a decibel.
pub fn volume_to_db(total_volume: f32) -> i32 {
    if total_volume <= SILENT_VOLUME {
        return VOLUME_MIN;
    }
    let db = (2000.0 * total_volume.log10()) as i32;
    db.clamp(VOLUME_MIN, VOLUME_MAX)
}

/// Duplicated buffers report the original's volume when both hold the same
/// value, so a duplicate never gets exactly the original's setting: it is
/// nudged one unit toward full volume, or down from it when already there.
pub fn distinct_duplicate_volume(computed: i32, original: i32) -> i32 {
    if computed != original {
        computed
    } else if computed == VOLUME_MAX {
        computed - 1
    } else {
        computed + 1
    }
}

/// Linear pan position to hundredths of a decibel of attenuation on the
/// opposite side. The magnitude rounds up, so every value outside the dead
/// zone moves off center.
pub fn pan_to_db(value: f32) -> i32 {
    let magnitude = value.abs();
    if magnitude < PAN_DEAD_ZONE || value.is_nan() {
        return PAN_CENTER;
    }
    if value >= PAN_SATURATION {
        return PAN_RIGHT;
    }
    if value <= -PAN_SATURATION {
        return PAN_LEFT;
    }
    let attenuation = (2000.0 * (1.0 - magnitude).log10()).abs().ceil() as i32;
    (attenuation * value.signum() as i32).clamp(PAN_LEFT, PAN_RIGHT)
}

pub fn pitch_to_frequency(pitch: f32, sample_rate: u32) -> u32 {
    let frequency = (sample_rate as f64 * pitch.max(0.0) as f64) as u64;
    frequency.clamp(FREQUENCY_MIN as u64, FREQUENCY_MAX as u64) as u32
}

/// Play cursor for a time offset: frame aligned, never past the last frame.
pub fn cursor_for_offset(format: &FormatDescriptor, secs: f64, buffer_byte_size: u32) -> u32 {
    let bytes = format.secs_to_bytes(secs);
    let aligned = bytes - bytes % CURSOR_ALIGN as u64;
    let last = buffer_byte_size.saturating_sub(CURSOR_ALIGN) as u64;
    aligned.min(last) as u32
}
