//! Integration tests for streamed playback.
//!
//! File streams, data streams, refill passes and the deferred stop.

mod common;

use common::*;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use streammix::resource::DataCallback;

const HALF: usize = 65536;

fn play_stream(world: &AudioWorld, decoder: ScriptedDecoder, mode: SoundMode) -> (streammix::SoundId, ChannelId) {
    let sound = world
        .create_file_stream("scripted.ogg", mode, Box::new(decoder))
        .unwrap();
    let channel = world.play(sound, VirtualChannel::default()).unwrap();
    (sound, channel)
}

/// Attaching a file stream fills both halves of the ring from the decoder.
#[test]
fn test_file_stream_fills_ring_on_attach() {
    let device = MemoryDevice::new();
    let world = make_world(&device);
    let (sound, channel) = play_stream(&world, ScriptedDecoder::new(pattern(0, 1 << 20)), SoundMode::default());

    let info = world.sound_info(sound).unwrap();
    assert_eq!(info.kind, SoundKind::FileStream);
    assert!(info.mode.streaming);
    assert_eq!(info.buffer_byte_size, 2 * HALF as u32);

    let buffer = bound_buffer(&world, channel);
    assert_eq!(device.buffer_data(buffer).unwrap(), pattern(0, 2 * HALF));
    assert!(device.is_playing(buffer));
    assert_eq!(world.file_stream_channel_count(), 1);
}

/// A looping stream that is dry even after its rewind marks itself for
/// stopping on the refill tick, keeps playing through it, and is detached on
/// the next tick.
#[test]
fn test_dry_looping_stream_stops_one_tick_late() {
    let device = MemoryDevice::new();
    let world = make_world(&device);
    let decoder = ScriptedDecoder::new(pattern(0, HALF)).dry_after_rewinds(2);
    let (_, channel) = play_stream(&world, decoder, SoundMode::default().with_looping());
    let buffer = bound_buffer(&world, channel);

    // Both cursors past the first half: it gets refilled on this tick
    device.set_cursors(buffer, 70000, 72000);
    world.on_update();

    let info = world.channel_info(channel).unwrap();
    assert!(info.pending_stop);
    assert!(world.is_playing(channel));
    assert!(device.is_playing(buffer));

    world.on_update();

    assert!(!world.is_playing(channel));
    assert_eq!(world.channel_state(channel), ChannelState::Idle);
    assert_eq!(world.file_stream_channel_count(), 0);
}

/// A looping stream that reaches its end mid-half continues from its start.
#[test]
fn test_looping_stream_wraps_to_start() {
    let device = MemoryDevice::new();
    let world = make_world(&device);
    let len = 3 * HALF / 2;
    let (_, channel) = play_stream(&world, ScriptedDecoder::new(pattern(0, len)), SoundMode::default().with_looping());
    let buffer = bound_buffer(&world, channel);

    let data = device.buffer_data(buffer).unwrap();
    assert_eq!(&data[..len], &pattern(0, len)[..]);
    assert_eq!(&data[len..], &pattern(0, 2 * HALF - len)[..]);
}

/// The refill pass tops up file streams without a full update.
#[test]
fn test_refill_pass_follows_cursors() {
    let device = MemoryDevice::new();
    let world = make_world(&device);
    let (_, channel) = play_stream(&world, ScriptedDecoder::new(pattern(0, 1 << 20)), SoundMode::default());
    let buffer = bound_buffer(&world, channel);

    // Cursors still in the first half: nothing to do yet
    device.set_cursors(buffer, 1000, 3000);
    world.stream_refill_pass();
    assert_eq!(device.buffer_data(buffer).unwrap(), pattern(0, 2 * HALF));
    assert!(!world.channel_info(channel).unwrap().stream_flip);

    device.set_cursors(buffer, 70000, 72000);
    world.stream_refill_pass();

    let data = device.buffer_data(buffer).unwrap();
    assert_eq!(&data[..HALF], &pattern(2 * HALF as u64, HALF)[..]);
    assert_eq!(&data[HALF..], &pattern(HALF as u64, HALF)[..]);
    assert!(world.channel_info(channel).unwrap().stream_flip);

    // Same cursors again: the second half is the one expected next
    world.stream_refill_pass();
    assert_eq!(&device.buffer_data(buffer).unwrap()[..HALF], &pattern(2 * HALF as u64, HALF)[..]);

    device.set_cursors(buffer, 100, 2000);
    world.stream_refill_pass();
    assert_eq!(&device.buffer_data(buffer).unwrap()[HALF..], &pattern(3 * HALF as u64, HALF)[..]);
    assert!(!world.channel_info(channel).unwrap().stream_flip);
}

/// Playing a stream again after it stopped starts it over from the top.
#[test]
fn test_replayed_stream_rewinds() {
    let device = MemoryDevice::new();
    let world = make_world(&device);
    let (sound, channel) = play_stream(&world, ScriptedDecoder::new(pattern(0, 1 << 20)), SoundMode::default());
    let first = bound_buffer(&world, channel);
    world.stop(channel);

    let channel = world.play(sound, VirtualChannel::default()).unwrap();

    let buffer = bound_buffer(&world, channel);
    assert_eq!(buffer, first);
    assert_eq!(device.buffer_data(buffer).unwrap(), pattern(0, 2 * HALF));
    assert_eq!(world.sound_info(sound).unwrap().pool.buffers, 1);
}

/// A stream already playing refuses a second voice, and the first voice
/// keeps reading from where it was.
#[test]
fn test_stream_serves_one_voice_at_a_time() {
    let device = MemoryDevice::new();
    let world = make_world(&device);
    let (sound, channel) = play_stream(&world, ScriptedDecoder::new(pattern(0, 1 << 20)), SoundMode::default());
    let buffer = bound_buffer(&world, channel);
    device.set_cursors(buffer, 70000, 72000);
    world.stream_refill_pass();

    let second = world.play(sound, VirtualChannel::default());

    assert!(matches!(second, Err(AudioError::ResourceNotReady(_))));
    let info = world.sound_info(sound).unwrap();
    assert_eq!(info.pool.buffers, 1);
    assert_eq!(info.bound_channels, 1);

    device.set_cursors(buffer, 100, 2000);
    world.stream_refill_pass();
    assert_eq!(&device.buffer_data(buffer).unwrap()[HALF..], &pattern(3 * HALF as u64, HALF)[..]);

    // Once the first voice is gone the stream can be played again
    world.stop(channel);
    assert!(world.play(sound, VirtualChannel::default()).is_ok());
}

/// Data streams share one callback offset, so they are limited the same way.
#[test]
fn test_data_stream_serves_one_voice_at_a_time() {
    let device = MemoryDevice::new();
    let world = make_world(&device);
    let callback: DataCallback = Box::new(|dst: &mut [u8], offset: u64, max_len: usize| {
        dst[..max_len].copy_from_slice(&pattern(offset, max_len));
        max_len
    });
    let sound = world
        .create_data_buffer(SoundMode::default(), 2, 44100, 4096, Some(callback))
        .unwrap();
    world.play(sound, VirtualChannel::default()).unwrap();

    let second = world.play(sound, VirtualChannel::default());

    assert!(matches!(second, Err(AudioError::ResourceNotReady(_))));
}

/// Stopping a stream channel drops it from the file-stream list.
#[test]
fn test_file_stream_channel_list() {
    let device = MemoryDevice::new();
    let world = make_world(&device);
    let (_, first) = play_stream(&world, ScriptedDecoder::new(pattern(0, 1 << 18)), SoundMode::default());
    let (_, second) = play_stream(&world, ScriptedDecoder::new(pattern(0, 1 << 18)), SoundMode::default());
    assert_eq!(world.file_stream_channel_count(), 2);

    world.stop(first);
    assert_eq!(world.file_stream_channel_count(), 1);

    world.stop(second);
    assert_eq!(world.file_stream_channel_count(), 0);
}

/// Data streams pull from their callback with a running offset and stop
/// once it has nothing left.
#[test]
fn test_data_stream_pulls_from_callback() {
    let device = MemoryDevice::new();
    let world = make_world(&device);
    let total = 3000usize;
    let offsets = Arc::new(Mutex::new(Vec::new()));
    let seen = offsets.clone();
    let callback: DataCallback = Box::new(move |dst: &mut [u8], offset: u64, max_len: usize| {
        seen.lock().unwrap().push(offset);
        let n = total.saturating_sub(offset as usize).min(max_len);
        dst[..n].copy_from_slice(&pattern(offset, n));
        n
    });

    let sound = world
        .create_data_buffer(SoundMode::default(), 2, 44100, 4096, Some(callback))
        .unwrap();
    assert_eq!(world.sound_info(sound).unwrap().kind, SoundKind::DataStream);

    let channel = world.play(sound, VirtualChannel::default()).unwrap();
    let buffer = bound_buffer(&world, channel);
    // Data streams are not part of the refill pass
    assert_eq!(world.file_stream_channel_count(), 0);

    let data = device.buffer_data(buffer).unwrap();
    assert_eq!(&data[..total], &pattern(0, total)[..]);
    assert!(data[total..].iter().all(|&b| b == 0));
    assert_eq!(offsets.lock().unwrap()[..2], [0u64, 2048]);

    device.set_cursors(buffer, 3000, 3100);
    world.stream_refill_pass();
    assert!(!world.channel_info(channel).unwrap().stream_flip);

    world.on_update();
    assert!(world.channel_info(channel).unwrap().pending_stop);

    world.on_update();
    assert!(!world.is_playing(channel));
}

/// A data stream buffer smaller than one block is rejected.
#[test]
fn test_data_stream_needs_whole_blocks() {
    let device = MemoryDevice::new();
    let world = make_world(&device);
    let callback: DataCallback = Box::new(|_: &mut [u8], _: u64, _: usize| 0);

    let result = world.create_data_buffer(SoundMode::default(), 2, 44100, 3, Some(callback));

    assert!(matches!(result, Err(AudioError::Config(_))));
}

/// A channel count whose blocks do not fit the format is rejected up front.
#[test]
fn test_data_stream_rejects_oversized_format() {
    let device = MemoryDevice::new();
    let world = make_world(&device);
    let callback: DataCallback = Box::new(|_: &mut [u8], _: u64, _: usize| 0);

    let result = world.create_data_buffer(SoundMode::default(), 40000, 44100, 4096, Some(callback));

    assert!(matches!(result, Err(AudioError::Config(_))));
    assert_eq!(world.sound_count(), 0);
}

/// A WAV file streamed through symphonia matches its PCM and ends on its
/// own.
#[test]
fn test_wav_file_streams_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_wav(dir.path(), "half_second.wav", 2, 44100, 16, 22050);
    let expected: Vec<u8> = hound::WavReader::open(&path)
        .unwrap()
        .samples::<i16>()
        .flat_map(|s| s.unwrap().to_le_bytes())
        .collect();
    assert_eq!(expected.len(), 88200);

    let device = MemoryDevice::new();
    let world = make_world(&device);
    let sound = world
        .create_from_name_or_stream(SoundSource::path(&path), SoundMode::default().with_streaming())
        .unwrap();
    let channel = world.play(sound, VirtualChannel::default()).unwrap();
    let buffer = bound_buffer(&world, channel);

    let data = device.buffer_data(buffer).unwrap();
    assert_eq!(&data[..expected.len()], &expected[..]);
    assert!(data[expected.len()..].iter().all(|&b| b == 0));

    let mut ticks = 0;
    while world.is_playing(channel) && ticks < 200 {
        device.advance(Duration::from_millis(16));
        world.on_update();
        ticks += 1;
    }

    assert!(!world.is_playing(channel));
    assert_eq!(world.sound_info(sound).unwrap().pool.in_use, 0);
}

/// With the background thread running, streams are refilled without any
/// call to `on_update`.
#[test]
fn test_background_thread_refills() {
    let device = MemoryDevice::new();
    let config = AudioConfig {
        background_refill: true,
        refill_interval_ms: 1,
        inactive_poll_ms: 1,
        ..test_config()
    };
    let world = make_world_with(&device, 2, 0, &config);
    assert!(world.has_refill_thread());
    let (_, channel) = play_stream(&world, ScriptedDecoder::new(pattern(0, 1 << 20)), SoundMode::default());
    let buffer = bound_buffer(&world, channel);

    device.set_cursors(buffer, 70000, 72000);

    let deadline = Instant::now() + Duration::from_secs(2);
    while !world.channel_info(channel).unwrap().stream_flip && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(1));
    }

    assert!(world.channel_info(channel).unwrap().stream_flip);
    assert_eq!(&device.buffer_data(buffer).unwrap()[..HALF], &pattern(2 * HALF as u64, HALF)[..]);
}

/// The refill thread leaves streams alone while the world is paused.
#[test]
fn test_background_thread_idles_while_paused() {
    let device = MemoryDevice::new();
    let config = AudioConfig {
        background_refill: true,
        refill_interval_ms: 1,
        inactive_poll_ms: 1,
        ..test_config()
    };
    let world = make_world_with(&device, 2, 0, &config);
    let (_, channel) = play_stream(&world, ScriptedDecoder::new(pattern(0, 1 << 20)), SoundMode::default());
    let buffer = bound_buffer(&world, channel);

    world.set_paused(true);
    device.set_cursors(buffer, 70000, 72000);
    std::thread::sleep(Duration::from_millis(50));

    assert!(!world.channel_info(channel).unwrap().stream_flip);
    assert_eq!(&device.buffer_data(buffer).unwrap()[..HALF], &pattern(0, HALF)[..]);
}
