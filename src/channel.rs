//! Real channels: one playback request bound to one hardware buffer.
//!
//! # Streaming
//!
//! Streaming sounds play a fixed-size ring on hardware loop. Each half of
//! the ring is refilled from the source once the hardware has left it:
//!
//! ```text
//!  0                half               size
//!  [ first half     |  second half      ]
//!        ^ play  ^ write                     -> nothing to do
//!                     ^ play  ^ write        -> first half vacated, refill it
//!   ^ write             ^ play               -> write wrapped, keep waiting
//! ```
//!
//! A half is only refilled when both cursors have left it, so a refill
//! check that finds its half still in use is a no-op. That makes the check
//! safe to run from both the per-tick update and the refill thread in any
//! order.

use crate::backend::{AudioDevice, BufferId, Cursors};
use crate::error::{
    invariant_violation, AudioError, DeviceError, DeviceErrorCode, DeviceResultExt, Result,
};
use crate::params::{
    cursor_for_offset, distinct_duplicate_volume, pan_to_db, pitch_to_frequency, volume_to_db,
    VirtualChannel,
};
use crate::resource::{SoundId, SoundResource};
use crate::stage::StreamStage;
use std::thread;
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelState {
    Idle,
    Attaching,
    Playing,
    StreamRefill,
    Detaching,
}

/// Which pool of real channels a channel belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelKind {
    TwoD,
    ThreeD,
}

/// Handle to a playing channel. The generation makes handles from an
/// earlier playback on the same real channel inert.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChannelId {
    pub(crate) index: usize,
    pub(crate) generation: u32,
}

/// How hard to try bringing back a lost buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RestorePolicy {
    pub attempts: u32,
    pub sleep: Duration,
}

/// Result of one `update` pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateOutcome {
    Idle,
    Playing,
    /// Playback is over; the channel should be detached
    Finished,
}

#[derive(Clone, Copy, Debug, Default)]
struct Dirty {
    volume: bool,
    pan: bool,
    pitch: bool,
    position: bool,
}

impl Dirty {
    fn all() -> Self {
        Self {
            volume: true,
            pan: true,
            pitch: true,
            position: true,
        }
    }
}

/// Which half of the ring is free to refill, given which half is expected
/// next. `None` while either cursor is still inside the expected half.
pub fn vacated_half(expect_second: bool, cursors: Cursors, half_size: u32) -> Option<u32> {
    let play_in_second = cursors.play >= half_size;
    let write_in_second = cursors.write >= half_size;
    if expect_second {
        (!play_in_second && !write_in_second).then_some(1)
    } else {
        (play_in_second && write_in_second).then_some(0)
    }
}

/// Outcome of filling one chunk of a streaming ring.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StreamFill {
    /// Bytes that came from the source; the rest of the chunk is silence
    pub from_source: usize,
    /// The source rewound to fill the remainder
    pub rewound: bool,
    /// Nothing more will come from the source
    pub exhausted: bool,
}

/// Fills `dst` from the sound's stream source, padding with silence. A
/// looping file stream that runs short is rewound once to fill the rest.
pub fn fill_stream_chunk(sound: &mut SoundResource, stage: &mut StreamStage, dst: &mut [u8]) -> StreamFill {
    let looping = sound.mode().looping;
    let mut fill = StreamFill {
        from_source: sound.pull_stream(stage, dst),
        ..StreamFill::default()
    };

    let mut retried = false;
    if fill.from_source < dst.len() && looping && sound.is_file_stream() {
        retried = true;
        match sound.rewind_stream(stage) {
            Ok(()) => {
                fill.rewound = true;
                fill.from_source += sound.pull_stream(stage, &mut dst[fill.from_source..]);
            }
            Err(e) => warn!("Could not rewind {}: {e}", sound.name()),
        }
    }

    dst[fill.from_source..].fill(sound.format().silence_byte());
    fill.exhausted = fill.from_source == 0 && (!looping || retried);
    fill
}

/// Restores a buffer the device reports as lost. Returns true when the
/// buffer was restored and its content must be written again.
pub fn restore_if_lost(device: &mut dyn AudioDevice, buffer: BufferId, policy: RestorePolicy) -> Result<bool> {
    let status = device.status(buffer).call("status")?;
    if !status.lost {
        return Ok(false);
    }
    for attempt in 1..=policy.attempts.max(1) {
        match device.restore(buffer) {
            Ok(()) => {
                debug!("Restored lost buffer {buffer:?} after {attempt} attempt(s)");
                return Ok(true);
            }
            Err(e) if e.is_lost() => thread::sleep(policy.sleep),
            Err(e) => return Err(AudioError::device("restore", e)),
        }
    }
    Err(AudioError::device(
        "restore",
        DeviceError::new(DeviceErrorCode::BufferLost),
    ))
}

pub struct RealChannel {
    index: usize,
    kind: ChannelKind,
    generation: u32,
    state: ChannelState,
    bound_resource: Option<SoundId>,
    bound_buffer: Option<BufferId>,
    has_3d: bool,
    stream_stage: Option<StreamStage>,
    /// The second half of the ring is the next one to refill
    stream_flip: bool,
    pending_stop: bool,
    params: VirtualChannel,
    dirty: Dirty,
    restore: RestorePolicy,
}

impl RealChannel {
    pub fn new(index: usize, kind: ChannelKind, restore: RestorePolicy) -> Self {
        Self {
            index,
            kind,
            generation: 0,
            state: ChannelState::Idle,
            bound_resource: None,
            bound_buffer: None,
            has_3d: false,
            stream_stage: None,
            stream_flip: false,
            pending_stop: false,
            params: VirtualChannel::default(),
            dirty: Dirty::default(),
            restore,
        }
    }

    pub fn id(&self) -> ChannelId {
        ChannelId {
            index: self.index,
            generation: self.generation,
        }
    }

    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn is_bound(&self) -> bool {
        self.bound_buffer.is_some()
    }

    pub fn bound_resource(&self) -> Option<SoundId> {
        self.bound_resource
    }

    pub fn bound_buffer(&self) -> Option<BufferId> {
        self.bound_buffer
    }

    pub fn pending_stop(&self) -> bool {
        self.pending_stop
    }

    pub fn stream_flip(&self) -> bool {
        self.stream_flip
    }

    pub fn params(&self) -> &VirtualChannel {
        &self.params
    }

    /// The volume changed and has not been pushed yet.
    pub fn volume_dirty(&self) -> bool {
        self.dirty.volume
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.params.volume = volume;
        self.dirty.volume = true;
    }

    pub fn set_pan(&mut self, pan: f32) {
        self.params.pan = pan;
        self.dirty.pan = true;
    }

    pub fn set_pitch(&mut self, pitch: f32) {
        self.params.pitch = pitch;
        self.dirty.pitch = true;
    }

    pub fn set_position(&mut self, position: glam::Vec3, velocity: glam::Vec3) {
        self.params.position = position;
        self.params.velocity = velocity;
        self.dirty.position = true;
    }

    /// Binds the channel to `sound` and starts playback. On failure the
    /// channel is left idle with its buffer back in the pool.
    pub fn attach(
        &mut self,
        device: &mut dyn AudioDevice,
        sound: &mut SoundResource,
        params: VirtualChannel,
        master_volume: f32,
    ) -> Result<ChannelId> {
        if self.is_bound() {
            invariant_violation(format!("channel {} attached while still bound", self.index));
        }

        self.state = ChannelState::Attaching;
        let acquired = match sound.acquire_buffer(device) {
            Ok(acquired) => acquired,
            Err(e) => {
                self.state = ChannelState::Idle;
                return Err(e);
            }
        };

        self.generation = self.generation.wrapping_add(1);
        self.bound_resource = Some(sound.id());
        self.bound_buffer = Some(acquired.buffer);
        self.params = params;

        if let Err(e) = self.start(device, sound, acquired.fresh, master_volume) {
            warn!("Could not start {} on channel {}: {e}", sound.name(), self.index);
            self.detach(device, sound);
            return Err(e);
        }

        self.state = ChannelState::Playing;
        debug!(
            "Channel {} playing {} on {:?}",
            self.index,
            sound.name(),
            acquired.buffer
        );
        Ok(self.id())
    }

    fn start(
        &mut self,
        device: &mut dyn AudioDevice,
        sound: &mut SoundResource,
        fresh: bool,
        master_volume: f32,
    ) -> Result<()> {
        let Some(buffer) = self.bound_buffer else {
            return Ok(());
        };

        if sound.mode().mode_3d {
            device.acquire_3d(buffer).call("acquire_3d")?;
            self.has_3d = true;
        }

        let restored = restore_if_lost(device, buffer, self.restore)?;

        if sound.is_streaming() {
            let mut stage = StreamStage::with_capacity(sound.half_size() as usize);
            // A stream played before must start over from its first sample
            if !fresh {
                sound.rewind_stream(&mut stage)?;
            }
            self.stream_stage = Some(stage);
            self.begin_stream_play(device, sound)?;
        } else if fresh || restored {
            write_sample(device, buffer, sound)?;
        }

        self.dirty = Dirty::all();
        self.push_params(device, sound, master_volume)?;

        let cursor = cursor_for_offset(
            &sound.format(),
            self.params.time_offset_secs,
            sound.buffer_byte_size(),
        );
        device.set_cursor(buffer, cursor).call("set_cursor")?;

        // Streams always loop in hardware; the engine decides when they end
        let looping = sound.mode().looping || sound.is_streaming();
        device.play(buffer, looping).call("play")?;
        sound.mark_primed();
        Ok(())
    }

    /// Silences the whole ring, then fills both halves in order.
    fn begin_stream_play(&mut self, device: &mut dyn AudioDevice, sound: &mut SoundResource) -> Result<()> {
        let Some(buffer) = self.bound_buffer else {
            return Ok(());
        };

        let silence = sound.format().silence_byte();
        device
            .lock(buffer, 0, sound.buffer_byte_size(), &mut |first, second| {
                first.fill(silence);
                second.fill(silence);
            })
            .call("lock")?;

        self.pending_stop = false;
        self.stream_flip = false;
        self.refill_half(device, sound, 0)?;
        self.refill_half(device, sound, 1)?;
        self.stream_flip = false;
        Ok(())
    }

    fn refill_half(&mut self, device: &mut dyn AudioDevice, sound: &mut SoundResource, half: u32) -> Result<()> {
        let (Some(buffer), Some(stage)) = (self.bound_buffer, self.stream_stage.as_mut()) else {
            return Ok(());
        };

        let half_size = sound.half_size();
        let mut fill = StreamFill::default();
        device
            .lock(buffer, half * half_size, half_size, &mut |first, _| {
                fill = fill_stream_chunk(sound, stage, first);
            })
            .call("lock")?;

        trace!(
            "Channel {} refilled half {half} of {:?} with {} source bytes",
            self.index,
            buffer,
            fill.from_source
        );

        if fill.exhausted && !self.pending_stop {
            debug!("{} ran dry, stopping channel {} next tick", sound.name(), self.index);
            self.pending_stop = true;
        }
        Ok(())
    }

    /// Refills whichever half of the ring the hardware has vacated. Returns
    /// true when a half was written.
    pub fn stream_refill_check(&mut self, device: &mut dyn AudioDevice, sound: &mut SoundResource) -> Result<bool> {
        let Some(buffer) = self.bound_buffer else {
            return Ok(false);
        };
        if !sound.is_streaming() || self.pending_stop {
            return Ok(false);
        }

        let cursors = device.cursors(buffer).call("cursors")?;
        let Some(half) = vacated_half(self.stream_flip, cursors, sound.half_size()) else {
            return Ok(false);
        };

        self.state = ChannelState::StreamRefill;
        let result = self.refill_half(device, sound, half);
        self.state = ChannelState::Playing;
        result?;

        self.stream_flip = !self.stream_flip;
        Ok(true)
    }

    /// Per-tick work: applies a stop deferred from the previous tick, brings
    /// back lost buffers, pushes changed parameters and refills streams.
    pub fn update(
        &mut self,
        device: &mut dyn AudioDevice,
        sound: &mut SoundResource,
        master_volume: f32,
    ) -> Result<UpdateOutcome> {
        let Some(buffer) = self.bound_buffer else {
            return Ok(UpdateOutcome::Idle);
        };

        if self.pending_stop {
            return Ok(UpdateOutcome::Finished);
        }

        let status = device.status(buffer).call("status")?;
        if status.lost {
            self.recover_lost(device, sound)?;
        } else if !status.playing {
            return Ok(UpdateOutcome::Finished);
        }

        self.push_params(device, sound, master_volume)?;
        self.stream_refill_check(device, sound)?;
        Ok(UpdateOutcome::Playing)
    }

    fn recover_lost(&mut self, device: &mut dyn AudioDevice, sound: &mut SoundResource) -> Result<()> {
        let Some(buffer) = self.bound_buffer else {
            return Ok(());
        };
        if !restore_if_lost(device, buffer, self.restore)? {
            return Ok(());
        }

        if sound.is_streaming() {
            self.begin_stream_play(device, sound)?;
            device.set_cursor(buffer, 0).call("set_cursor")?;
        } else {
            write_sample(device, buffer, sound)?;
        }
        let looping = sound.mode().looping || sound.is_streaming();
        device.play(buffer, looping).call("play")
    }

    /// Pushes every parameter flagged as changed since the last push.
    pub fn push_params(&mut self, device: &mut dyn AudioDevice, sound: &SoundResource, master_volume: f32) -> Result<()> {
        let Some(buffer) = self.bound_buffer else {
            return Ok(());
        };

        if self.has_3d {
            if self.dirty.position {
                device
                    .set_position_3d(buffer, self.params.position)
                    .call("set_position_3d")?;
                device
                    .set_velocity_3d(buffer, self.params.velocity)
                    .call("set_velocity_3d")?;
                device
                    .set_min_distance_3d(buffer, self.params.min_distance)
                    .call("set_min_distance_3d")?;
            }
        } else if self.dirty.pan {
            device
                .set_pan(buffer, pan_to_db(self.params.pan))
                .call("set_pan")?;
        }
        self.dirty.position = false;
        self.dirty.pan = false;

        if self.dirty.pitch {
            let frequency = pitch_to_frequency(self.params.pitch, sound.format().sample_rate());
            device
                .set_frequency(buffer, frequency)
                .call("set_frequency")?;
            self.dirty.pitch = false;
        }

        if self.dirty.volume {
            self.push_volume(device, sound, master_volume)?;
        }
        Ok(())
    }

    /// Computes and sets the buffer volume. Returns the value written.
    pub fn push_volume(&mut self, device: &mut dyn AudioDevice, sound: &SoundResource, master_volume: f32) -> Result<i32> {
        let Some(buffer) = self.bound_buffer else {
            return Ok(crate::constants::VOLUME_MIN);
        };

        let computed = volume_to_db(self.params.volume * master_volume);
        let volume = match sound.pool().original() {
            Some(original) if original != buffer => {
                let original_volume = device.volume(original).call("volume")?;
                distinct_duplicate_volume(computed, original_volume)
            }
            _ => computed,
        };

        device.set_volume(buffer, volume).call("set_volume")?;
        self.dirty.volume = false;
        Ok(volume)
    }

    /// Marks the volume for recomputation on the next push.
    pub fn invalidate_volume(&mut self) {
        self.dirty.volume = true;
    }

    /// Unbinds the channel and returns its buffer to the pool. Safe to call
    /// on an idle channel or a half-attached one.
    pub fn detach(&mut self, device: &mut dyn AudioDevice, sound: &mut SoundResource) {
        self.state = ChannelState::Detaching;
        if let Some(buffer) = self.bound_buffer.take() {
            if self.has_3d {
                device.release_3d(buffer);
            }
            // A failed stop is logged; the buffer still goes back to the pool
            device.stop(buffer).call("stop").ok();
            sound.release_buffer(buffer);
            debug!("Channel {} released {:?} of {}", self.index, buffer, sound.name());
        }
        self.has_3d = false;
        self.stream_stage = None;
        self.pending_stop = false;
        self.stream_flip = false;
        self.bound_resource = None;
        self.dirty = Dirty::default();
        self.state = ChannelState::Idle;
    }
}

/// Copies a sample sound into its buffer, padding any tail the device added
/// beyond the sample data with silence.
fn write_sample(device: &mut dyn AudioDevice, buffer: BufferId, sound: &SoundResource) -> Result<()> {
    let Some(pcm) = sound.pcm() else {
        return Ok(());
    };
    let silence = sound.format().silence_byte();
    device
        .lock(buffer, 0, sound.buffer_byte_size(), &mut |first, second| {
            let n = pcm.len().min(first.len());
            first[..n].copy_from_slice(&pcm[..n]);
            first[n..].fill(silence);
            second.fill(silence);
        })
        .call("lock")
}
