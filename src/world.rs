//! The audio world: device, sounds, real channels and the refill thread.
//!
//! Everything mutable lives in a [`Mixer`] behind one mutex that the
//! per-tick update and the background refill thread both take. Whether the
//! world is active (not paused, window visible) is kept outside the mutex so
//! the refill thread can check it without contending.

use crate::backend::{
    AudioDevice, BufferId, CaptureDeviceInfo, CooperativeLevel, ListenerParams, WindowHandle,
};
use crate::capture::CaptureSession;
use crate::channel::{ChannelId, ChannelKind, ChannelState, RealChannel, UpdateOutcome};
use crate::config::AudioConfig;
use crate::constants::{FALLBACK_SAMPLE_RATE, PRIMARY_SAMPLE_RATE};
use crate::decoder::StreamDecoder;
use crate::error::{invariant_violation, AudioError, DeviceResultExt, Result};
use crate::format::FormatDescriptor;
use crate::loader::{load_sound, SoundSource};
use crate::params::VirtualChannel;
use crate::resource::{DataCallback, SoundId, SoundKind, SoundMode, SoundResource};
use crate::worker;
use glam::Vec3;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Reports whether the owning window is currently shown.
pub type VisibilityProbe = Box<dyn Fn() -> bool + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PoolStats {
    pub buffers: usize,
    pub free: usize,
    pub in_use: usize,
}

/// Snapshot of one sound resource.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SoundInfo {
    pub kind: SoundKind,
    pub mode: SoundMode,
    pub format: FormatDescriptor,
    pub buffer_byte_size: u32,
    pub pool: PoolStats,
    pub original: Option<BufferId>,
    pub bound_channels: usize,
}

/// Snapshot of one real channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChannelInfo {
    pub state: ChannelState,
    pub kind: ChannelKind,
    pub sound: Option<SoundId>,
    pub buffer: Option<BufferId>,
    pub pending_stop: bool,
    pub stream_flip: bool,
}

pub(crate) struct Shared {
    mixer: Mutex<Mixer>,
    stop: AtomicBool,
    paused: AtomicBool,
    window_visible: AtomicBool,
    mute_when_hidden: bool,
    visibility_probe: Mutex<Option<VisibilityProbe>>,
    next_sound_id: AtomicU32,
}

impl Shared {
    pub(crate) fn lock(&self) -> MutexGuard<'_, Mixer> {
        self.mixer.lock().unwrap_or_else(|e| {
            warn!("Audio mutex poisoned; continuing");
            e.into_inner()
        })
    }

    pub(crate) fn should_stop(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// Paused worlds and, with `mute_when_hidden`, hidden windows do no
    /// per-tick or refill work.
    pub(crate) fn is_active(&self) -> bool {
        if self.paused.load(Ordering::Acquire) {
            return false;
        }
        if !self.mute_when_hidden {
            return true;
        }
        if !self.window_visible.load(Ordering::Acquire) {
            return false;
        }
        let probe = self.visibility_probe.lock().unwrap_or_else(|e| e.into_inner());
        probe.as_ref().map_or(true, |probe| probe())
    }

    fn next_sound_id(&self) -> SoundId {
        SoundId(self.next_sound_id.fetch_add(1, Ordering::Relaxed))
    }
}

pub(crate) struct Mixer {
    device: Box<dyn AudioDevice>,
    sounds: HashMap<SoundId, SoundResource>,
    /// 2D channels first, then the 3D ones from `first_3d` on
    channels: Vec<RealChannel>,
    first_3d: usize,
    /// Indices of channels currently bound to a file stream
    file_stream_channels: Vec<usize>,
    capture_devices: Vec<CaptureDeviceInfo>,
    active_capture: Option<SoundId>,
    master_volume: f32,
    shut_down: bool,
}

impl Mixer {
    fn ensure_running(&self) -> Result<()> {
        if self.shut_down {
            return Err(AudioError::not_ready("the audio world is shut down"));
        }
        Ok(())
    }

    fn insert(&mut self, sound: SoundResource) -> Result<SoundId> {
        if let Err(e) = self.ensure_running() {
            let mut sound = sound;
            sound.destroy(&mut *self.device);
            return Err(e);
        }
        let id = sound.id();
        self.sounds.insert(id, sound);
        Ok(id)
    }

    fn channel(&self, id: ChannelId) -> Option<&RealChannel> {
        self.channels
            .get(id.index)
            .filter(|channel| channel.id() == id && channel.is_bound())
    }

    fn channel_mut(&mut self, id: ChannelId) -> Option<&mut RealChannel> {
        self.channels
            .get_mut(id.index)
            .filter(|channel| channel.id() == id && channel.is_bound())
    }

    fn play(&mut self, sound_id: SoundId, params: VirtualChannel) -> Result<ChannelId> {
        self.ensure_running()?;
        let Some(sound) = self.sounds.get_mut(&sound_id) else {
            return Err(AudioError::not_ready(format!("no sound {sound_id:?}")));
        };
        // A stream has one source position, so it can feed only one voice
        if sound.is_streaming() && sound.pool().in_use() > 0 {
            return Err(AudioError::not_ready(format!(
                "{} is a stream and already playing",
                sound.name()
            )));
        }

        let range = if sound.mode().mode_3d {
            self.first_3d..self.channels.len()
        } else {
            0..self.first_3d
        };
        let Some(index) = range.clone().find(|&i| !self.channels[i].is_bound()) else {
            return Err(AudioError::not_ready(format!(
                "all {} {} channels are busy",
                range.len(),
                if sound.mode().mode_3d { "3D" } else { "2D" }
            )));
        };

        let channel = &mut self.channels[index];
        let id = channel.attach(&mut *self.device, sound, params, self.master_volume)?;
        let on_original = channel
            .bound_buffer()
            .is_some_and(|buffer| sound.pool().is_original(buffer));
        if sound.is_file_stream() {
            self.file_stream_channels.push(index);
        }
        if on_original {
            self.cascade_original_volume(sound_id, index);
        }
        Ok(id)
    }

    /// Duplicates read back the original's volume, so when the original's
    /// volume changes the duplicates recompute theirs.
    fn cascade_original_volume(&mut self, sound_id: SoundId, from: usize) {
        let Some(sound) = self.sounds.get(&sound_id) else {
            return;
        };
        for (index, channel) in self.channels.iter_mut().enumerate() {
            if index == from || channel.bound_resource() != Some(sound_id) {
                continue;
            }
            channel.invalidate_volume();
            if let Err(e) = channel.push_volume(&mut *self.device, sound, self.master_volume) {
                debug!("Volume of channel {index} not refreshed: {e}");
            }
        }
    }

    fn detach(&mut self, index: usize) {
        let channel = &mut self.channels[index];
        let Some(sound_id) = channel.bound_resource() else {
            return;
        };
        let Some(sound) = self.sounds.get_mut(&sound_id) else {
            invariant_violation(format!("channel {index} bound to unknown sound {sound_id:?}"));
        };
        channel.detach(&mut *self.device, sound);
        self.file_stream_channels.retain(|&i| i != index);
    }

    fn stop(&mut self, id: ChannelId) {
        if self.channel(id).is_some() {
            self.detach(id.index);
        }
    }

    /// Runs `update` on every bound channel and detaches those that
    /// finished.
    fn update_all(&mut self) {
        for index in 0..self.channels.len() {
            let channel = &mut self.channels[index];
            let Some(sound_id) = channel.bound_resource() else {
                continue;
            };
            let Some(sound) = self.sounds.get_mut(&sound_id) else {
                invariant_violation(format!("channel {index} bound to unknown sound {sound_id:?}"));
            };

            let volume_changed = channel.volume_dirty();
            match channel.update(&mut *self.device, sound, self.master_volume) {
                Ok(UpdateOutcome::Finished) => {
                    debug!("Channel {index} finished {}", sound.name());
                    self.detach(index);
                }
                Ok(UpdateOutcome::Playing) => {
                    let on_original = channel
                        .bound_buffer()
                        .is_some_and(|buffer| sound.pool().is_original(buffer));
                    if volume_changed && on_original {
                        self.cascade_original_volume(sound_id, index);
                    }
                }
                Ok(UpdateOutcome::Idle) => {}
                Err(e) if e.is_device_lost() => {
                    warn!("Channel {index} lost its buffer for good, stopping it");
                    self.detach(index);
                }
                // Logged where it happened; retried next tick
                Err(_) => {}
            }
        }
    }

    /// One pass of the background refill over every file-stream channel.
    pub(crate) fn stream_refill_pass(&mut self) {
        for i in 0..self.file_stream_channels.len() {
            let index = self.file_stream_channels[i];
            let channel = &mut self.channels[index];
            let Some(sound) = channel
                .bound_resource()
                .and_then(|id| self.sounds.get_mut(&id))
            else {
                continue;
            };
            // Failures are logged by the device layer and retried next pass
            channel.stream_refill_check(&mut *self.device, sound).ok();
        }
    }

    fn set_paused(&mut self, paused: bool) {
        for channel in &self.channels {
            let (Some(buffer), Some(sound_id)) = (channel.bound_buffer(), channel.bound_resource()) else {
                continue;
            };
            let result = if paused {
                self.device.stop(buffer).call("stop")
            } else {
                let looping = self
                    .sounds
                    .get(&sound_id)
                    .is_some_and(|sound| sound.mode().looping || sound.is_streaming());
                self.device.play(buffer, looping).call("play")
            };
            if result.is_err() {
                debug!("Could not {} {buffer:?}", if paused { "pause" } else { "resume" });
            }
        }
    }

    fn set_master_volume(&mut self, volume: f32) {
        self.master_volume = volume.clamp(0.0, 1.0);
        for channel in self.channels.iter_mut().filter(|c| c.is_bound()) {
            channel.invalidate_volume();
        }
    }

    fn release_sound(&mut self, sound_id: SoundId) -> Result<()> {
        if !self.sounds.contains_key(&sound_id) {
            return Err(AudioError::not_ready(format!("no sound {sound_id:?}")));
        }
        for index in 0..self.channels.len() {
            if self.channels[index].bound_resource() == Some(sound_id) {
                self.detach(index);
            }
        }
        if self.active_capture == Some(sound_id) {
            self.record_stop();
        }
        if let Some(mut sound) = self.sounds.remove(&sound_id) {
            sound.destroy(&mut *self.device);
        }
        Ok(())
    }

    fn create_data_buffer(
        &mut self,
        id: SoundId,
        mode: SoundMode,
        format: FormatDescriptor,
        buffer_size: u32,
        callback: Option<DataCallback>,
    ) -> Result<SoundId> {
        self.ensure_running()?;
        let sound = if mode.record {
            let Some(info) = self.capture_devices.first().cloned() else {
                return Err(AudioError::not_ready("no capture device available"));
            };
            let session = CaptureSession::open(&mut *self.device, &info, &format, buffer_size)?;
            SoundResource::capture(id, mode, format, session)
        } else {
            let Some(callback) = callback else {
                return Err(AudioError::Config("a data stream needs a pull callback".to_string()));
            };
            SoundResource::data_stream(id, mode, format, buffer_size, callback)?
        };
        self.insert(sound)
    }

    fn record_start(&mut self, sound_id: SoundId) -> bool {
        if self.shut_down {
            return false;
        }
        if !self
            .sounds
            .get(&sound_id)
            .is_some_and(|s| s.kind() == SoundKind::Capture)
        {
            warn!("Sound {sound_id:?} is not a capture sound");
            return false;
        }
        if let Some(active) = self.active_capture {
            if active != sound_id {
                self.record_stop();
            }
        }
        let Some(session) = self.sounds.get_mut(&sound_id).and_then(|s| s.capture_session()) else {
            return false;
        };
        match session.start(&mut *self.device) {
            Ok(()) => {
                debug!("Recording from {}", session.device().name);
                self.active_capture = Some(sound_id);
                true
            }
            Err(_) => false,
        }
    }

    fn record_stop(&mut self) {
        let Some(sound_id) = self.active_capture.take() else {
            return;
        };
        if let Some(session) = self.sounds.get_mut(&sound_id).and_then(|s| s.capture_session()) {
            session.stop(&mut *self.device);
        }
    }

    fn record_read(&mut self, dst: &mut [u8]) -> usize {
        let Some(sound_id) = self.active_capture else {
            return 0;
        };
        match self.sounds.get_mut(&sound_id).and_then(|s| s.capture_session()) {
            Some(session) => session.read(&mut *self.device, dst),
            None => 0,
        }
    }

    /// Detaches every channel, stops recording and destroys every sound.
    fn release_all(&mut self) {
        if self.shut_down {
            return;
        }
        for index in 0..self.channels.len() {
            self.detach(index);
        }
        self.record_stop();
        let mut ids: Vec<SoundId> = self.sounds.keys().copied().collect();
        ids.sort();
        for id in ids {
            if let Some(mut sound) = self.sounds.remove(&id) {
                sound.destroy(&mut *self.device);
            }
        }
        self.shut_down = true;
    }
}

/// Sets the preferred primary format, falling back to the lower rate once.
fn negotiate_primary_format(device: &mut dyn AudioDevice) -> Result<FormatDescriptor> {
    let preferred = FormatDescriptor::stereo16(PRIMARY_SAMPLE_RATE);
    match device.set_primary_format(&preferred) {
        Ok(()) => return Ok(preferred),
        Err(e) => warn!(
            "Primary format {PRIMARY_SAMPLE_RATE} Hz rejected ({e}), trying {FALLBACK_SAMPLE_RATE} Hz"
        ),
    }
    let fallback = FormatDescriptor::stereo16(FALLBACK_SAMPLE_RATE);
    device
        .set_primary_format(&fallback)
        .call("set_primary_format")?;
    Ok(fallback)
}

pub struct AudioWorld {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
    primary_format: FormatDescriptor,
    shutdown_timeout: Duration,
    shut_down: bool,
}

impl AudioWorld {
    /// Takes exclusive control of `device` for `window`, negotiates the
    /// primary format, configures the listener, enumerates capture devices,
    /// preallocates `n_2d` + `n_3d` real channels and starts the refill
    /// thread.
    pub fn init(
        mut device: Box<dyn AudioDevice>,
        window: WindowHandle,
        n_2d: usize,
        n_3d: usize,
        config: &AudioConfig,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|e| AudioError::Config(format!("{e:#}")))?;

        device
            .set_cooperative_level(window, CooperativeLevel::Priority)
            .call("set_cooperative_level")?;
        let primary_format = negotiate_primary_format(&mut *device)?;

        let mut listener = device.listener().call("listener")?;
        listener.distance_factor = 1.0;
        listener.rolloff_factor = 0.0;
        listener.doppler_factor = config.doppler_scale;
        device.set_listener(&listener).call("set_listener")?;

        let capture_devices = device.enumerate_capture_devices();
        for info in &capture_devices {
            debug!("Capture device {}: {}", info.id, info.name);
        }

        let restore = config.restore_policy();
        let channels = (0..n_2d)
            .map(|i| RealChannel::new(i, ChannelKind::TwoD, restore))
            .chain((n_2d..n_2d + n_3d).map(|i| RealChannel::new(i, ChannelKind::ThreeD, restore)))
            .collect();

        let shared = Arc::new(Shared {
            mixer: Mutex::new(Mixer {
                device,
                sounds: HashMap::new(),
                channels,
                first_3d: n_2d,
                file_stream_channels: Vec::new(),
                capture_devices,
                active_capture: None,
                master_volume: 1.0,
                shut_down: false,
            }),
            stop: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            window_visible: AtomicBool::new(true),
            mute_when_hidden: config.mute_when_hidden,
            visibility_probe: Mutex::new(None),
            next_sound_id: AtomicU32::new(1),
        });

        let worker = if config.background_refill {
            Some(worker::spawn(shared.clone(), config.refill_interval(), config.inactive_poll())?)
        } else {
            None
        };

        info!(
            "Audio world ready: {} Hz primary, {n_2d} 2D + {n_3d} 3D channels",
            primary_format.sample_rate()
        );
        Ok(Self {
            shared,
            worker,
            primary_format,
            shutdown_timeout: config.shutdown_timeout(),
            shut_down: false,
        })
    }

    /// Init with the channel counts from `config`.
    pub fn with_config(device: Box<dyn AudioDevice>, window: WindowHandle, config: &AudioConfig) -> Result<Self> {
        Self::init(device, window, config.channels_2d, config.channels_3d, config)
    }

    pub fn primary_format(&self) -> FormatDescriptor {
        self.primary_format
    }

    pub fn has_refill_thread(&self) -> bool {
        self.worker.is_some()
    }

    pub fn create_from_name_or_stream(&self, source: SoundSource, mode: SoundMode) -> Result<SoundId> {
        // Decoding can take a while, so it happens outside the lock
        let sound = load_sound(self.shared.next_sound_id(), source, mode)?;
        self.shared.lock().insert(sound)
    }

    /// Creates a data-driven stream fed by `callback`, or with `mode.record`
    /// a capture sound on the first capture device.
    pub fn create_data_buffer(
        &self,
        mode: SoundMode,
        channels: u16,
        sample_rate: u32,
        buffer_size: u32,
        callback: Option<DataCallback>,
    ) -> Result<SoundId> {
        let format = FormatDescriptor::try_new(channels, sample_rate, 16)?;
        let id = self.shared.next_sound_id();
        self.shared
            .lock()
            .create_data_buffer(id, mode, format, buffer_size, callback)
    }

    /// Streams from a caller-supplied decoder rather than a named file.
    pub fn create_file_stream(&self, name: &str, mode: SoundMode, decoder: Box<dyn StreamDecoder>) -> Result<SoundId> {
        let sound = SoundResource::file_stream(self.shared.next_sound_id(), name, mode.with_streaming(), decoder)?;
        self.shared.lock().insert(sound)
    }

    pub fn create_sample(&self, name: &str, mode: SoundMode, format: FormatDescriptor, pcm: Vec<u8>) -> Result<SoundId> {
        let sound = SoundResource::sample(self.shared.next_sound_id(), name, mode, format, pcm)?;
        self.shared.lock().insert(sound)
    }

    /// Stops every channel playing `sound`, then destroys it.
    pub fn release_sound(&self, sound: SoundId) -> Result<()> {
        self.shared.lock().release_sound(sound)
    }

    pub fn play(&self, sound: SoundId, params: VirtualChannel) -> Result<ChannelId> {
        self.shared.lock().play(sound, params)
    }

    /// Stops the channel now. Stale handles are ignored.
    pub fn stop(&self, channel: ChannelId) {
        self.shared.lock().stop(channel);
    }

    pub fn is_playing(&self, channel: ChannelId) -> bool {
        self.shared.lock().channel(channel).is_some()
    }

    pub fn channel_state(&self, channel: ChannelId) -> ChannelState {
        self.shared
            .lock()
            .channel(channel)
            .map_or(ChannelState::Idle, RealChannel::state)
    }

    pub fn set_volume(&self, channel: ChannelId, volume: f32) {
        if let Some(channel) = self.shared.lock().channel_mut(channel) {
            channel.set_volume(volume);
        }
    }

    pub fn set_pan(&self, channel: ChannelId, pan: f32) {
        if let Some(channel) = self.shared.lock().channel_mut(channel) {
            channel.set_pan(pan);
        }
    }

    pub fn set_pitch(&self, channel: ChannelId, pitch: f32) {
        if let Some(channel) = self.shared.lock().channel_mut(channel) {
            channel.set_pitch(pitch);
        }
    }

    pub fn set_position(&self, channel: ChannelId, position: Vec3) {
        if let Some(channel) = self.shared.lock().channel_mut(channel) {
            let velocity = channel.params().velocity;
            channel.set_position(position, velocity);
        }
    }

    pub fn set_velocity(&self, channel: ChannelId, velocity: Vec3) {
        if let Some(channel) = self.shared.lock().channel_mut(channel) {
            let position = channel.params().position;
            channel.set_position(position, velocity);
        }
    }

    pub fn master_volume(&self) -> f32 {
        self.shared.lock().master_volume
    }

    /// Scales every channel's volume; applied on the next update.
    pub fn set_master_volume(&self, volume: f32) {
        self.shared.lock().set_master_volume(volume);
    }

    /// Pausing stops every bound buffer where it is; unpausing resumes them.
    pub fn set_paused(&self, paused: bool) {
        let mut mixer = self.shared.lock();
        if self.shared.paused.swap(paused, Ordering::AcqRel) == paused {
            return;
        }
        mixer.set_paused(paused);
        debug!("Audio {}", if paused { "paused" } else { "resumed" });
    }

    pub fn is_paused(&self) -> bool {
        self.shared.paused.load(Ordering::Acquire)
    }

    pub fn set_window_visible(&self, visible: bool) {
        self.shared.window_visible.store(visible, Ordering::Release);
    }

    pub fn set_visibility_probe(&self, probe: Option<VisibilityProbe>) {
        *self
            .shared
            .visibility_probe
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = probe;
    }

    pub fn is_active(&self) -> bool {
        self.shared.is_active()
    }

    pub fn listener(&self) -> Result<ListenerParams> {
        self.shared.lock().device.listener().call("listener")
    }

    pub fn set_listener(&self, params: &ListenerParams) -> Result<()> {
        self.shared
            .lock()
            .device
            .set_listener(params)
            .call("set_listener")
    }

    pub fn capture_devices(&self) -> Vec<CaptureDeviceInfo> {
        self.shared.lock().capture_devices.clone()
    }

    /// Starts looping capture on a capture sound, stopping any other
    /// capture first. Returns false when it could not be started.
    pub fn record_start(&self, sound: SoundId) -> bool {
        self.shared.lock().record_start(sound)
    }

    pub fn record_stop(&self) {
        self.shared.lock().record_stop();
    }

    pub fn is_recording(&self) -> bool {
        self.shared.lock().active_capture.is_some()
    }

    /// Copies newly captured bytes into `dst`, returning how many.
    pub fn record_read(&self, dst: &mut [u8]) -> usize {
        self.shared.lock().record_read(dst)
    }

    /// Per-tick work: deferred stops, lost-buffer recovery, parameter
    /// pushes and stream refills. Does nothing while the world is inactive.
    pub fn on_update(&self) {
        if !self.shared.is_active() {
            return;
        }
        let mut mixer = self.shared.lock();
        if !mixer.shut_down {
            mixer.update_all();
        }
    }

    /// One refill pass over the file-stream channels, the same work the
    /// refill thread does.
    pub fn stream_refill_pass(&self) {
        let mut mixer = self.shared.lock();
        if !mixer.shut_down {
            mixer.stream_refill_pass();
        }
    }

    pub fn sound_info(&self, sound: SoundId) -> Option<SoundInfo> {
        let mixer = self.shared.lock();
        let resource = mixer.sounds.get(&sound)?;
        let pool = resource.pool();
        Some(SoundInfo {
            kind: resource.kind(),
            mode: resource.mode(),
            format: resource.format(),
            buffer_byte_size: resource.buffer_byte_size(),
            pool: PoolStats {
                buffers: pool.len(),
                free: pool.free_len(),
                in_use: pool.in_use(),
            },
            original: pool.original(),
            bound_channels: mixer
                .channels
                .iter()
                .filter(|c| c.bound_resource() == Some(sound))
                .count(),
        })
    }

    pub fn channel_info(&self, channel: ChannelId) -> Option<ChannelInfo> {
        let mixer = self.shared.lock();
        let real = mixer.channels.get(channel.index)?;
        if real.id() != channel {
            return None;
        }
        Some(ChannelInfo {
            state: real.state(),
            kind: real.kind(),
            sound: real.bound_resource(),
            buffer: real.bound_buffer(),
            pending_stop: real.pending_stop(),
            stream_flip: real.stream_flip(),
        })
    }

    pub fn file_stream_channel_count(&self) -> usize {
        self.shared.lock().file_stream_channels.len()
    }

    pub fn sound_count(&self) -> usize {
        self.shared.lock().sounds.len()
    }

    /// Stops the refill thread, then releases every channel, capture and
    /// sound. Later calls return immediately.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        self.shared.stop.store(true, Ordering::Release);

        if let Some(handle) = self.worker.take() {
            let deadline = Instant::now() + self.shutdown_timeout;
            while !handle.is_finished() && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(1));
            }
            if handle.is_finished() {
                if handle.join().is_err() {
                    error!("Audio refill thread panicked");
                }
            } else {
                warn!(
                    "Audio refill thread still running after {:?}, leaving it behind",
                    self.shutdown_timeout
                );
            }
        }

        self.shared.lock().release_all();
        info!("Audio world shut down");
    }
}

impl Drop for AudioWorld {
    fn drop(&mut self) {
        self.shutdown();
    }
}
