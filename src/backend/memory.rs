//! In-process audio device.
//!
//! Buffers are plain byte vectors and cursors only move when [`MemoryDevice::advance`]
//! is called, so playback timing is fully under the driver's control. The
//! handle is cheap to clone: every clone observes and drives the same device,
//! which is how the demo binary and the tests steer hardware time while the
//! engine owns its own copy.

use super::{
    AudioDevice, BufferCaps, BufferDesc, BufferId, BufferStatus, CaptureBufferId,
    CaptureDeviceInfo, CooperativeLevel, Cursors, DeviceResult, ListenerParams, WindowHandle,
};
use crate::constants::{FREQUENCY_MAX, FREQUENCY_MIN, PAN_LEFT, PAN_RIGHT, VOLUME_MAX, VOLUME_MIN};
use crate::error::{DeviceError, DeviceErrorCode};
use crate::format::FormatDescriptor;
use glam::Vec3;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Byte pattern left in a buffer after it is restored from the lost state.
pub const RESTORED_GARBAGE: u8 = 0xAA;

/// How far the simulated write cursor runs ahead of the play cursor.
const WRITE_LEAD_MS: u32 = 15;

struct SimBuffer {
    data: Vec<u8>,
    format: FormatDescriptor,
    caps: BufferCaps,
    duplicate_of: Option<BufferId>,
    playing: bool,
    looping: bool,
    lost: bool,
    play: u32,
    write: u32,
    /// Sub-byte playback progress carried between `advance` calls
    carry: f64,
    volume: i32,
    pan: i32,
    frequency: u32,
    has_3d: bool,
    position: Vec3,
    velocity: Vec3,
    min_distance: f32,
}

impl SimBuffer {
    fn new(size: u32, format: FormatDescriptor, caps: BufferCaps) -> Self {
        Self {
            data: vec![format.silence_byte(); size as usize],
            format,
            caps,
            duplicate_of: None,
            playing: false,
            looping: false,
            lost: false,
            play: 0,
            write: 0,
            carry: 0.0,
            volume: VOLUME_MAX,
            pan: 0,
            frequency: format.sample_rate(),
            has_3d: false,
            position: Vec3::ZERO,
            velocity: Vec3::ZERO,
            min_distance: 1.0,
        }
    }

    fn size(&self) -> u32 {
        self.data.len() as u32
    }

    fn write_lead(&self) -> u32 {
        let block = self.format.block_align().max(1) as u32;
        let bytes_per_sec = self.frequency * block;
        let lead = bytes_per_sec * WRITE_LEAD_MS / 1000;
        (lead - lead % block).min(self.size().saturating_sub(block))
    }

    fn advance(&mut self, elapsed: Duration) {
        let size = self.size();
        if !self.playing || size == 0 {
            return;
        }
        let block = self.format.block_align().max(1) as u32;
        let bytes_per_sec = (self.frequency * block) as f64;
        let exact = elapsed.as_secs_f64() * bytes_per_sec + self.carry;
        let mut step = exact as u64;
        step -= step % block as u64;
        self.carry = exact - step as f64;

        let target = self.play as u64 + step;
        if target >= size as u64 && !self.looping {
            self.playing = false;
            self.play = 0;
            self.write = 0;
            self.carry = 0.0;
            return;
        }
        self.play = (target % size as u64) as u32;
        self.write = (self.play + self.write_lead()) % size;
    }
}

struct SimCapture {
    data: Vec<u8>,
    format: FormatDescriptor,
    position: u32,
    capturing: bool,
    looping: bool,
    carry: f64,
}

#[derive(Default)]
struct MemoryState {
    next_id: u32,
    buffers: HashMap<u32, SimBuffer>,
    captures: HashMap<u32, SimCapture>,
    capture_devices: Vec<CaptureDeviceInfo>,
    listener: ListenerParams,
    primary_format: Option<FormatDescriptor>,
    rejected_rates: Vec<u32>,
    cooperative: Option<(WindowHandle, CooperativeLevel)>,
    size_granularity: u32,
    failures: HashMap<&'static str, VecDeque<DeviceErrorCode>>,
}

impl MemoryState {
    fn check(&mut self, method: &'static str) -> DeviceResult<()> {
        match self.failures.get_mut(method).and_then(|q| q.pop_front()) {
            Some(code) => Err(DeviceError::new(code)),
            None => Ok(()),
        }
    }

    fn alloc_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn buffer(&self, id: BufferId) -> DeviceResult<&SimBuffer> {
        self.buffers
            .get(&id.0)
            .ok_or(DeviceError::new(DeviceErrorCode::InvalidParam))
    }

    fn buffer_mut(&mut self, id: BufferId) -> DeviceResult<&mut SimBuffer> {
        self.buffers
            .get_mut(&id.0)
            .ok_or(DeviceError::new(DeviceErrorCode::InvalidParam))
    }

    fn buffer_3d_mut(&mut self, id: BufferId) -> DeviceResult<&mut SimBuffer> {
        let buffer = self.buffer_mut(id)?;
        if !buffer.has_3d {
            return Err(DeviceError::new(DeviceErrorCode::InvalidCall));
        }
        Ok(buffer)
    }

    fn capture(&self, id: CaptureBufferId) -> DeviceResult<&SimCapture> {
        self.captures
            .get(&id.0)
            .ok_or(DeviceError::new(DeviceErrorCode::InvalidParam))
    }

    fn capture_mut(&mut self, id: CaptureBufferId) -> DeviceResult<&mut SimCapture> {
        self.captures
            .get_mut(&id.0)
            .ok_or(DeviceError::new(DeviceErrorCode::InvalidParam))
    }
}

/// Splits `[offset, offset + len)` of a ring of `size` bytes into the part
/// before the end of the ring and the part that wrapped to the start.
fn split_range(size: u32, offset: u32, len: u32) -> DeviceResult<(usize, usize, usize)> {
    if offset >= size || len > size {
        return Err(DeviceError::new(DeviceErrorCode::InvalidParam));
    }
    let first = len.min(size - offset);
    Ok((offset as usize, first as usize, (len - first) as usize))
}

#[derive(Clone, Default)]
pub struct MemoryDevice {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryDevice {
    pub fn new() -> Self {
        let device = Self::default();
        device.state().size_granularity = 1;
        device
    }

    /// Device with one capture endpoint registered.
    pub fn with_capture_device(name: &str) -> Self {
        let device = Self::new();
        device.add_capture_device(name);
        device
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| {
            warn!("Memory device mutex poisoned; continuing");
            e.into_inner()
        })
    }

    pub fn add_capture_device(&self, name: &str) -> u32 {
        let mut state = self.state();
        let id = state.alloc_id();
        state.capture_devices.push(CaptureDeviceInfo {
            id,
            name: name.to_string(),
        });
        id
    }

    /// Realized buffer sizes are rounded up to a multiple of `granularity`.
    pub fn set_size_granularity(&self, granularity: u32) {
        self.state().size_granularity = granularity.max(1);
    }

    /// Makes `set_primary_format` fail for this sample rate.
    pub fn reject_sample_rate(&self, rate: u32) {
        self.state().rejected_rates.push(rate);
    }

    /// Queues a failure for the next call of `method` (named as in
    /// [`AudioDevice`]).
    pub fn fail_next(&self, method: &'static str, code: DeviceErrorCode) {
        self.state()
            .failures
            .entry(method)
            .or_default()
            .push_back(code);
    }

    /// Advances hardware time for every playing buffer and running capture.
    pub fn advance(&self, elapsed: Duration) {
        let mut state = self.state();
        for buffer in state.buffers.values_mut() {
            buffer.advance(elapsed);
        }
        for capture in state.captures.values_mut() {
            if !capture.capturing || capture.data.is_empty() {
                continue;
            }
            let size = capture.data.len() as u64;
            let block = capture.format.block_align().max(1) as u64;
            let exact = elapsed.as_secs_f64() * capture.format.avg_bytes_per_sec() as f64
                + capture.carry;
            let mut step = exact as u64;
            step -= step % block;
            capture.carry = exact - step as f64;
            let target = capture.position as u64 + step;
            if target >= size && !capture.looping {
                capture.capturing = false;
            }
            capture.position = (target % size) as u32;
        }
    }

    pub fn set_cursors(&self, buffer: BufferId, play: u32, write: u32) {
        if let Some(buffer) = self.state().buffers.get_mut(&buffer.0) {
            buffer.play = play;
            buffer.write = write;
        }
    }

    /// Simulates the device reclaiming buffer memory.
    pub fn mark_lost(&self, buffer: BufferId) {
        if let Some(buffer) = self.state().buffers.get_mut(&buffer.0) {
            buffer.lost = true;
            buffer.playing = false;
        }
    }

    pub fn buffer_ids(&self) -> Vec<BufferId> {
        let mut ids: Vec<BufferId> = self.state().buffers.keys().map(|&id| BufferId(id)).collect();
        ids.sort();
        ids
    }

    pub fn live_buffers(&self) -> usize {
        self.state().buffers.len()
    }

    pub fn live_capture_buffers(&self) -> usize {
        self.state().captures.len()
    }

    pub fn buffer_data(&self, buffer: BufferId) -> Option<Vec<u8>> {
        self.state().buffers.get(&buffer.0).map(|b| b.data.clone())
    }

    pub fn duplicate_of(&self, buffer: BufferId) -> Option<BufferId> {
        self.state().buffers.get(&buffer.0).and_then(|b| b.duplicate_of)
    }

    pub fn is_playing(&self, buffer: BufferId) -> bool {
        self.state()
            .buffers
            .get(&buffer.0)
            .map(|b| b.playing)
            .unwrap_or(false)
    }

    pub fn buffer_pan(&self, buffer: BufferId) -> Option<i32> {
        self.state().buffers.get(&buffer.0).map(|b| b.pan)
    }

    pub fn buffer_frequency(&self, buffer: BufferId) -> Option<u32> {
        self.state().buffers.get(&buffer.0).map(|b| b.frequency)
    }

    pub fn buffer_position_3d(&self, buffer: BufferId) -> Option<(Vec3, Vec3, f32)> {
        self.state()
            .buffers
            .get(&buffer.0)
            .filter(|b| b.has_3d)
            .map(|b| (b.position, b.velocity, b.min_distance))
    }

    pub fn primary_format(&self) -> Option<FormatDescriptor> {
        self.state().primary_format
    }

    pub fn cooperative_level(&self) -> Option<(WindowHandle, CooperativeLevel)> {
        self.state().cooperative
    }

    pub fn capture_ids(&self) -> Vec<CaptureBufferId> {
        self.state()
            .captures
            .keys()
            .map(|&id| CaptureBufferId(id))
            .collect()
    }

    pub fn is_capturing(&self, buffer: CaptureBufferId) -> bool {
        self.state()
            .captures
            .get(&buffer.0)
            .map(|c| c.capturing)
            .unwrap_or(false)
    }

    /// Writes bytes into a capture buffer as if recorded, wrapping at its end.
    pub fn write_capture(&self, buffer: CaptureBufferId, offset: u32, bytes: &[u8]) {
        if let Some(capture) = self.state().captures.get_mut(&buffer.0) {
            let size = capture.data.len();
            for (i, &b) in bytes.iter().enumerate() {
                capture.data[(offset as usize + i) % size] = b;
            }
        }
    }

    pub fn set_capture_position(&self, buffer: CaptureBufferId, position: u32) {
        if let Some(capture) = self.state().captures.get_mut(&buffer.0) {
            capture.position = position;
        }
    }
}

impl AudioDevice for MemoryDevice {
    fn set_cooperative_level(
        &mut self,
        window: WindowHandle,
        level: CooperativeLevel,
    ) -> DeviceResult<()> {
        let mut state = self.state();
        state.check("set_cooperative_level")?;
        state.cooperative = Some((window, level));
        Ok(())
    }

    fn set_primary_format(&mut self, format: &FormatDescriptor) -> DeviceResult<()> {
        let mut state = self.state();
        state.check("set_primary_format")?;
        if state.rejected_rates.contains(&format.sample_rate()) {
            return Err(DeviceError::new(DeviceErrorCode::Unsupported));
        }
        state.primary_format = Some(*format);
        Ok(())
    }

    fn create_buffer(&mut self, desc: &BufferDesc) -> DeviceResult<BufferId> {
        let mut state = self.state();
        state.check("create_buffer")?;
        if desc.size == 0 {
            return Err(DeviceError::new(DeviceErrorCode::InvalidParam));
        }
        let granularity = state.size_granularity.max(1);
        let size = desc.size.div_ceil(granularity) * granularity;
        let id = state.alloc_id();
        state
            .buffers
            .insert(id, SimBuffer::new(size, desc.format, desc.caps));
        Ok(BufferId(id))
    }

    fn duplicate_buffer(&mut self, original: BufferId) -> DeviceResult<BufferId> {
        let mut state = self.state();
        state.check("duplicate_buffer")?;
        let source = state.buffer(original)?;
        if source.lost {
            return Err(DeviceError::new(DeviceErrorCode::BufferLost));
        }
        let mut copy = SimBuffer::new(source.size(), source.format, source.caps);
        copy.data.copy_from_slice(&source.data);
        copy.duplicate_of = Some(original);
        let id = state.alloc_id();
        state.buffers.insert(id, copy);
        Ok(BufferId(id))
    }

    fn release_buffer(&mut self, buffer: BufferId) {
        self.state().buffers.remove(&buffer.0);
    }

    fn buffer_size(&self, buffer: BufferId) -> DeviceResult<u32> {
        let mut state = self.state();
        state.check("buffer_size")?;
        Ok(state.buffer(buffer)?.size())
    }

    fn status(&self, buffer: BufferId) -> DeviceResult<BufferStatus> {
        let mut state = self.state();
        state.check("status")?;
        let buffer = state.buffer(buffer)?;
        Ok(BufferStatus {
            playing: buffer.playing,
            looping: buffer.looping,
            lost: buffer.lost,
        })
    }

    fn restore(&mut self, buffer: BufferId) -> DeviceResult<()> {
        let mut state = self.state();
        state.check("restore")?;
        let buffer = state.buffer_mut(buffer)?;
        if buffer.lost {
            buffer.lost = false;
            buffer.data.fill(RESTORED_GARBAGE);
        }
        Ok(())
    }

    fn lock(
        &mut self,
        buffer: BufferId,
        offset: u32,
        len: u32,
        access: &mut dyn FnMut(&mut [u8], &mut [u8]),
    ) -> DeviceResult<()> {
        let mut state = self.state();
        state.check("lock")?;
        let buffer = state.buffer_mut(buffer)?;
        if buffer.lost {
            return Err(DeviceError::new(DeviceErrorCode::BufferLost));
        }
        let (start, first, second) = split_range(buffer.size(), offset, len)?;
        let (head, tail) = buffer.data.split_at_mut(start);
        access(&mut tail[..first], &mut head[..second]);
        Ok(())
    }

    fn play(&mut self, buffer: BufferId, looping: bool) -> DeviceResult<()> {
        let mut state = self.state();
        state.check("play")?;
        let buffer = state.buffer_mut(buffer)?;
        if buffer.lost {
            return Err(DeviceError::new(DeviceErrorCode::BufferLost));
        }
        buffer.playing = true;
        buffer.looping = looping;
        buffer.write = (buffer.play + buffer.write_lead()) % buffer.size();
        Ok(())
    }

    fn stop(&mut self, buffer: BufferId) -> DeviceResult<()> {
        let mut state = self.state();
        state.check("stop")?;
        state.buffer_mut(buffer)?.playing = false;
        Ok(())
    }

    fn cursors(&self, buffer: BufferId) -> DeviceResult<Cursors> {
        let mut state = self.state();
        state.check("cursors")?;
        let buffer = state.buffer(buffer)?;
        Ok(Cursors {
            play: buffer.play,
            write: buffer.write,
        })
    }

    fn set_cursor(&mut self, buffer: BufferId, position: u32) -> DeviceResult<()> {
        let mut state = self.state();
        state.check("set_cursor")?;
        let buffer = state.buffer_mut(buffer)?;
        if position >= buffer.size() {
            return Err(DeviceError::new(DeviceErrorCode::InvalidParam));
        }
        buffer.play = position;
        buffer.write = (position + buffer.write_lead()) % buffer.size();
        buffer.carry = 0.0;
        Ok(())
    }

    fn volume(&self, buffer: BufferId) -> DeviceResult<i32> {
        let mut state = self.state();
        state.check("volume")?;
        Ok(state.buffer(buffer)?.volume)
    }

    fn set_volume(&mut self, buffer: BufferId, volume: i32) -> DeviceResult<()> {
        let mut state = self.state();
        state.check("set_volume")?;
        if !(VOLUME_MIN..=VOLUME_MAX).contains(&volume) {
            return Err(DeviceError::new(DeviceErrorCode::InvalidParam));
        }
        state.buffer_mut(buffer)?.volume = volume;
        Ok(())
    }

    fn set_pan(&mut self, buffer: BufferId, pan: i32) -> DeviceResult<()> {
        let mut state = self.state();
        state.check("set_pan")?;
        if !(PAN_LEFT..=PAN_RIGHT).contains(&pan) {
            return Err(DeviceError::new(DeviceErrorCode::InvalidParam));
        }
        state.buffer_mut(buffer)?.pan = pan;
        Ok(())
    }

    fn set_frequency(&mut self, buffer: BufferId, frequency: u32) -> DeviceResult<()> {
        let mut state = self.state();
        state.check("set_frequency")?;
        if !(FREQUENCY_MIN..=FREQUENCY_MAX).contains(&frequency) {
            return Err(DeviceError::new(DeviceErrorCode::InvalidParam));
        }
        state.buffer_mut(buffer)?.frequency = frequency;
        Ok(())
    }

    fn acquire_3d(&mut self, buffer: BufferId) -> DeviceResult<()> {
        let mut state = self.state();
        state.check("acquire_3d")?;
        let buffer = state.buffer_mut(buffer)?;
        if !buffer.caps.ctrl_3d {
            return Err(DeviceError::new(DeviceErrorCode::Unsupported));
        }
        buffer.has_3d = true;
        Ok(())
    }

    fn release_3d(&mut self, buffer: BufferId) {
        if let Some(buffer) = self.state().buffers.get_mut(&buffer.0) {
            buffer.has_3d = false;
        }
    }

    fn set_position_3d(&mut self, buffer: BufferId, position: Vec3) -> DeviceResult<()> {
        let mut state = self.state();
        state.check("set_position_3d")?;
        state.buffer_3d_mut(buffer)?.position = position;
        Ok(())
    }

    fn set_velocity_3d(&mut self, buffer: BufferId, velocity: Vec3) -> DeviceResult<()> {
        let mut state = self.state();
        state.check("set_velocity_3d")?;
        state.buffer_3d_mut(buffer)?.velocity = velocity;
        Ok(())
    }

    fn set_min_distance_3d(&mut self, buffer: BufferId, distance: f32) -> DeviceResult<()> {
        let mut state = self.state();
        state.check("set_min_distance_3d")?;
        state.buffer_3d_mut(buffer)?.min_distance = distance;
        Ok(())
    }

    fn listener(&self) -> DeviceResult<ListenerParams> {
        let mut state = self.state();
        state.check("listener")?;
        Ok(state.listener)
    }

    fn set_listener(&mut self, params: &ListenerParams) -> DeviceResult<()> {
        let mut state = self.state();
        state.check("set_listener")?;
        state.listener = *params;
        Ok(())
    }

    fn enumerate_capture_devices(&mut self) -> Vec<CaptureDeviceInfo> {
        self.state().capture_devices.clone()
    }

    fn create_capture_buffer(
        &mut self,
        device: &CaptureDeviceInfo,
        format: &FormatDescriptor,
        size: u32,
    ) -> DeviceResult<CaptureBufferId> {
        let mut state = self.state();
        state.check("create_capture_buffer")?;
        if size == 0 || !state.capture_devices.iter().any(|d| d.id == device.id) {
            return Err(DeviceError::new(DeviceErrorCode::InvalidParam));
        }
        let id = state.alloc_id();
        state.captures.insert(
            id,
            SimCapture {
                data: vec![format.silence_byte(); size as usize],
                format: *format,
                position: 0,
                capturing: false,
                looping: false,
                carry: 0.0,
            },
        );
        Ok(CaptureBufferId(id))
    }

    fn release_capture_buffer(&mut self, buffer: CaptureBufferId) {
        self.state().captures.remove(&buffer.0);
    }

    fn start_capture(&mut self, buffer: CaptureBufferId, looping: bool) -> DeviceResult<()> {
        let mut state = self.state();
        state.check("start_capture")?;
        let capture = state.capture_mut(buffer)?;
        capture.capturing = true;
        capture.looping = looping;
        Ok(())
    }

    fn stop_capture(&mut self, buffer: CaptureBufferId) -> DeviceResult<()> {
        let mut state = self.state();
        state.check("stop_capture")?;
        state.capture_mut(buffer)?.capturing = false;
        Ok(())
    }

    fn capture_position(&self, buffer: CaptureBufferId) -> DeviceResult<u32> {
        let mut state = self.state();
        state.check("capture_position")?;
        Ok(state.capture(buffer)?.position)
    }

    fn lock_capture(
        &mut self,
        buffer: CaptureBufferId,
        offset: u32,
        len: u32,
        access: &mut dyn FnMut(&[u8], &[u8]),
    ) -> DeviceResult<()> {
        let mut state = self.state();
        state.check("lock_capture")?;
        let capture = state.capture(buffer)?;
        let (start, first, second) = split_range(capture.data.len() as u32, offset, len)?;
        access(
            &capture.data[start..start + first],
            &capture.data[..second],
        );
        Ok(())
    }
}
