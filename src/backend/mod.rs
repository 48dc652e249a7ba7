//! Boundary to the native audio device.
//!
//! The engine never touches hardware memory directly: it asks the device to
//! create, duplicate, lock and play buffers identified by opaque handles.
//! Ownership of those handles is tracked by each sound's
//! [`BufferPool`](crate::pool::BufferPool), never by the handle itself.

pub mod memory;

use crate::error::DeviceError;
use crate::format::FormatDescriptor;
use glam::Vec3;

pub use memory::MemoryDevice;

pub type DeviceResult<T> = std::result::Result<T, DeviceError>;

/// Opaque handle to a playback buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u32);

/// Opaque handle to a capture buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CaptureBufferId(pub u32);

/// Native handle of the window that owns the device.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WindowHandle(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CooperativeLevel {
    Normal,
    /// Allows the primary format to be changed
    Priority,
}

/// Capabilities requested for a new playback buffer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BufferCaps {
    pub ctrl_3d: bool,
    pub ctrl_pan: bool,
    pub ctrl_volume: bool,
    pub ctrl_frequency: bool,
    pub ctrl_position_notify: bool,
    /// Keep playing when the owning window loses focus
    pub global_focus: bool,
    pub software: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferDesc {
    pub size: u32,
    pub format: FormatDescriptor,
    pub caps: BufferCaps,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BufferStatus {
    pub playing: bool,
    pub looping: bool,
    pub lost: bool,
}

/// Byte offsets into a playback buffer. The region between `play` and
/// `write` (wrapping) is committed to the hardware and must not be touched.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Cursors {
    pub play: u32,
    pub write: u32,
}

/// 3D listener state applied to the whole device.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ListenerParams {
    pub position: Vec3,
    pub velocity: Vec3,
    pub front: Vec3,
    pub top: Vec3,
    pub distance_factor: f32,
    pub rolloff_factor: f32,
    pub doppler_factor: f32,
}

impl Default for ListenerParams {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            velocity: Vec3::ZERO,
            front: Vec3::Z,
            top: Vec3::Y,
            distance_factor: 1.0,
            rolloff_factor: 1.0,
            doppler_factor: 1.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CaptureDeviceInfo {
    pub id: u32,
    pub name: String,
}

/// Native audio API surface used by the engine.
///
/// `lock` and `lock_capture` combine lock, access and unlock: the closure
/// receives the requested range as two segments, the second of which is
/// non-empty only when the range wraps past the end of the buffer.
pub trait AudioDevice: Send {
    fn set_cooperative_level(
        &mut self,
        window: WindowHandle,
        level: CooperativeLevel,
    ) -> DeviceResult<()>;
    fn set_primary_format(&mut self, format: &FormatDescriptor) -> DeviceResult<()>;

    fn create_buffer(&mut self, desc: &BufferDesc) -> DeviceResult<BufferId>;
    /// Creates a buffer sharing `original`'s sample data with independent
    /// volume, pan, frequency and position.
    fn duplicate_buffer(&mut self, original: BufferId) -> DeviceResult<BufferId>;
    fn release_buffer(&mut self, buffer: BufferId);
    /// Realized size in bytes, which may exceed the requested size.
    fn buffer_size(&self, buffer: BufferId) -> DeviceResult<u32>;
    fn status(&self, buffer: BufferId) -> DeviceResult<BufferStatus>;
    fn restore(&mut self, buffer: BufferId) -> DeviceResult<()>;
    fn lock(
        &mut self,
        buffer: BufferId,
        offset: u32,
        len: u32,
        access: &mut dyn FnMut(&mut [u8], &mut [u8]),
    ) -> DeviceResult<()>;

    fn play(&mut self, buffer: BufferId, looping: bool) -> DeviceResult<()>;
    fn stop(&mut self, buffer: BufferId) -> DeviceResult<()>;
    fn cursors(&self, buffer: BufferId) -> DeviceResult<Cursors>;
    fn set_cursor(&mut self, buffer: BufferId, position: u32) -> DeviceResult<()>;

    fn volume(&self, buffer: BufferId) -> DeviceResult<i32>;
    fn set_volume(&mut self, buffer: BufferId, volume: i32) -> DeviceResult<()>;
    fn set_pan(&mut self, buffer: BufferId, pan: i32) -> DeviceResult<()>;
    fn set_frequency(&mut self, buffer: BufferId, frequency: u32) -> DeviceResult<()>;

    /// Resolves the positional sub-interface of a 3D buffer.
    fn acquire_3d(&mut self, buffer: BufferId) -> DeviceResult<()>;
    fn release_3d(&mut self, buffer: BufferId);
    fn set_position_3d(&mut self, buffer: BufferId, position: Vec3) -> DeviceResult<()>;
    fn set_velocity_3d(&mut self, buffer: BufferId, velocity: Vec3) -> DeviceResult<()>;
    fn set_min_distance_3d(&mut self, buffer: BufferId, distance: f32) -> DeviceResult<()>;

    fn listener(&self) -> DeviceResult<ListenerParams>;
    fn set_listener(&mut self, params: &ListenerParams) -> DeviceResult<()>;

    fn enumerate_capture_devices(&mut self) -> Vec<CaptureDeviceInfo>;
    fn create_capture_buffer(
        &mut self,
        device: &CaptureDeviceInfo,
        format: &FormatDescriptor,
        size: u32,
    ) -> DeviceResult<CaptureBufferId>;
    fn release_capture_buffer(&mut self, buffer: CaptureBufferId);
    fn start_capture(&mut self, buffer: CaptureBufferId, looping: bool) -> DeviceResult<()>;
    fn stop_capture(&mut self, buffer: CaptureBufferId) -> DeviceResult<()>;
    /// Offset up to which captured data is safe to read.
    fn capture_position(&self, buffer: CaptureBufferId) -> DeviceResult<u32>;
    fn lock_capture(
        &mut self,
        buffer: CaptureBufferId,
        offset: u32,
        len: u32,
        access: &mut dyn FnMut(&[u8], &[u8]),
    ) -> DeviceResult<()>;
}
