//! Per-sound accounting of hardware buffers.
//!
//! The first buffer ever created for a sound is the original and holds the
//! authoritative sample data. Every later buffer is a duplicate of it with
//! its own volume, pan, frequency and cursor, which is what makes several
//! simultaneous voices of one sound possible.

use crate::backend::{AudioDevice, BufferDesc, BufferId};
use crate::constants::MAX_BUFFERS_PER_SOUND;
use crate::error::{invariant_violation, DeviceResultExt, Result};

/// A buffer handed out by [`BufferPool::acquire`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Acquired {
    pub buffer: BufferId,
    /// The buffer is the original and holds no audio yet
    pub fresh: bool,
    /// Realized size of the original, reported only when `fresh`
    pub realized_size: Option<u32>,
}

#[derive(Debug, Default)]
pub struct BufferPool {
    all: Vec<BufferId>,
    free: Vec<BufferId>,
    /// The original has been written and played at least once
    primed: bool,
}

impl BufferPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pops a free buffer, or creates one: the original on first use, a
    /// duplicate of it afterwards. `desc` is only consulted for the original.
    pub fn acquire(&mut self, device: &mut dyn AudioDevice, desc: &BufferDesc) -> Result<Acquired> {
        if let Some(buffer) = self.free.pop() {
            return Ok(Acquired {
                buffer,
                fresh: !self.primed && self.is_original(buffer),
                realized_size: None,
            });
        }

        if self.all.len() >= MAX_BUFFERS_PER_SOUND {
            invariant_violation(format!(
                "more than {MAX_BUFFERS_PER_SOUND} simultaneous buffers requested for one sound"
            ));
        }

        let Some(&original) = self.all.first() else {
            let buffer = device.create_buffer(desc).call("create_buffer")?;
            let realized = match device.buffer_size(buffer).call("buffer_size") {
                Ok(size) => size,
                Err(e) => {
                    device.release_buffer(buffer);
                    return Err(e);
                }
            };
            if realized != desc.size {
                debug!(
                    "Device realized buffer {:?} at {realized} bytes ({} requested)",
                    buffer, desc.size
                );
            }
            self.all.push(buffer);
            return Ok(Acquired {
                buffer,
                fresh: true,
                realized_size: Some(realized),
            });
        };

        let buffer = device
            .duplicate_buffer(original)
            .call("duplicate_buffer")?;
        self.all.push(buffer);
        trace!(
            "Duplicated buffer {:?} as {:?} ({} total)",
            original,
            buffer,
            self.all.len()
        );
        Ok(Acquired {
            buffer,
            fresh: false,
            realized_size: None,
        })
    }

    /// Returns a buffer to the free list. The buffer keeps its content and
    /// stays allocated for the next voice.
    pub fn release(&mut self, buffer: BufferId) {
        if !self.all.contains(&buffer) {
            invariant_violation(format!("{buffer:?} released to a pool that does not own it"));
        }
        if self.free.contains(&buffer) {
            invariant_violation(format!("{buffer:?} released twice"));
        }
        self.free.push(buffer);
    }

    /// Releases every buffer back to the device. All buffers must be free;
    /// a buffer still in use means a channel binding leaked.
    pub fn destroy(&mut self, device: &mut dyn AudioDevice) {
        if self.all.len() != self.free.len() {
            invariant_violation(format!(
                "sound destroyed with {} of {} buffers still bound",
                self.in_use(),
                self.all.len()
            ));
        }
        // Duplicates go first so the original outlives every buffer sharing its data
        for buffer in self.all.drain(..).rev() {
            device.release_buffer(buffer);
        }
        self.free.clear();
        self.primed = false;
    }

    /// Records that the original holds audio, so reusing it needs no
    /// rewrite.
    pub fn mark_primed(&mut self) {
        self.primed = true;
    }

    pub fn original(&self) -> Option<BufferId> {
        self.all.first().copied()
    }

    pub fn is_original(&self, buffer: BufferId) -> bool {
        self.original() == Some(buffer)
    }

    pub fn contains(&self, buffer: BufferId) -> bool {
        self.all.contains(&buffer)
    }

    pub fn len(&self) -> usize {
        self.all.len()
    }

    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }

    pub fn free_len(&self) -> usize {
        self.free.len()
    }

    pub fn in_use(&self) -> usize {
        self.all.len() - self.free.len()
    }
}
