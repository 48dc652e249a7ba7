//! Recording from a capture device.
//!
//! The device writes into a looping capture buffer; [`CaptureSession::read`]
//! drains everything between the last read and the device's capture
//! cursor, which may straddle the end of the buffer.

use crate::backend::{AudioDevice, CaptureBufferId, CaptureDeviceInfo};
use crate::error::{AudioError, DeviceResultExt, Result};
use crate::format::FormatDescriptor;

/// Bytes between `read_position` and `cursor`, going forward around a ring
/// of `size` bytes.
pub fn available_bytes(read_position: u32, cursor: u32, size: u32) -> u32 {
    if size == 0 {
        return 0;
    }
    ((cursor as u64 + size as u64 - read_position as u64) % size as u64) as u32
}

pub struct CaptureSession {
    device: CaptureDeviceInfo,
    buffer: CaptureBufferId,
    buffer_byte_size: u32,
    read_position: u32,
}

impl CaptureSession {
    pub fn open(
        device: &mut dyn AudioDevice,
        info: &CaptureDeviceInfo,
        format: &FormatDescriptor,
        size: u32,
    ) -> Result<Self> {
        let buffer_byte_size = size - size % format.block_align().max(1) as u32;
        if buffer_byte_size == 0 {
            return Err(AudioError::Config(format!(
                "capture buffer of {size} bytes holds no whole blocks"
            )));
        }
        let buffer = device
            .create_capture_buffer(info, format, buffer_byte_size)
            .call("create_capture_buffer")?;
        Ok(Self {
            device: info.clone(),
            buffer,
            buffer_byte_size,
            read_position: 0,
        })
    }

    pub fn device(&self) -> &CaptureDeviceInfo {
        &self.device
    }

    pub fn buffer(&self) -> CaptureBufferId {
        self.buffer
    }

    pub fn buffer_byte_size(&self) -> u32 {
        self.buffer_byte_size
    }

    pub fn read_position(&self) -> u32 {
        self.read_position
    }

    pub(crate) fn set_read_position(&mut self, position: u32) {
        self.read_position = position % self.buffer_byte_size;
    }

    pub fn start(&mut self, device: &mut dyn AudioDevice) -> Result<()> {
        self.read_position = 0;
        device
            .start_capture(self.buffer, true)
            .call("start_capture")
    }

    pub fn stop(&mut self, device: &mut dyn AudioDevice) {
        // Failure is already logged and leaves nothing to undo
        device.stop_capture(self.buffer).call("stop_capture").ok();
    }

    /// Copies captured bytes into `dst` and returns how many were copied.
    /// Backend failures are logged and read as nothing captured.
    pub fn read(&mut self, device: &mut dyn AudioDevice, dst: &mut [u8]) -> usize {
        let cursor = match device.capture_position(self.buffer).call("capture_position") {
            Ok(cursor) => cursor,
            Err(_) => return 0,
        };

        let available = available_bytes(self.read_position, cursor, self.buffer_byte_size);
        let len = (dst.len() as u64).min(available as u64) as u32;
        if len == 0 {
            return 0;
        }

        let mut copied = 0;
        let locked = device.lock_capture(self.buffer, self.read_position, len, &mut |first, second| {
            dst[..first.len()].copy_from_slice(first);
            dst[first.len()..first.len() + second.len()].copy_from_slice(second);
            copied = first.len() + second.len();
        });
        if locked.call("lock_capture").is_err() {
            return 0;
        }

        self.read_position = (self.read_position + copied as u32) % self.buffer_byte_size;
        copied
    }

    pub fn close(&mut self, device: &mut dyn AudioDevice) {
        device.release_capture_buffer(self.buffer);
    }
}
