//! streammix demo player
//!
//! Streams one audio file through an [`AudioWorld`] on the in-memory device,
//! advancing simulated hardware time until playback ends.
//!
//! ```bash
//! streammix song.ogg
//! streammix song.ogg --3d --loop
//! ```

#[macro_use]
extern crate log;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};
use streammix::backend::WindowHandle;
use streammix::{config, AudioWorld, MemoryDevice, SoundMode, SoundSource, VirtualChannel};

const TICK: Duration = Duration::from_micros(16_667);

#[derive(Parser)]
#[command(name = "streammix")]
#[command(author, version, about = "Stream an audio file through the mixer")]
struct Args {
    /// Audio file to stream
    file: PathBuf,

    /// Play as a positional 3D sound
    #[arg(long = "3d")]
    three_d: bool,

    /// Loop the stream until interrupted
    #[arg(long = "loop")]
    looping: bool,

    /// Stop after this many seconds
    #[arg(long)]
    seconds: Option<u64>,
}

fn main() -> Result<()> {
    pretty_env_logger::init();
    let args = Args::parse();

    let config = config::load_or_default("streammix.toml")?;
    let device = MemoryDevice::new();
    let world = AudioWorld::with_config(Box::new(device.clone()), WindowHandle(0), &config)?;

    let mut mode = SoundMode::default().with_streaming();
    if args.three_d {
        mode = mode.with_3d();
    }
    if args.looping {
        mode = mode.with_looping();
    }

    let sound = world
        .create_from_name_or_stream(SoundSource::path(&args.file), mode)
        .with_context(|| format!("Could not open {}", args.file.display()))?;
    let channel = world.play(sound, VirtualChannel::default())?;
    info!("Playing {}", args.file.display());

    let started = Instant::now();
    let limit = args.seconds.map(Duration::from_secs);
    let mut last_report = Instant::now();
    while world.is_playing(channel) {
        if limit.is_some_and(|limit| started.elapsed() >= limit) {
            world.stop(channel);
            break;
        }
        device.advance(TICK);
        world.on_update();
        if last_report.elapsed() >= Duration::from_secs(1) {
            info!("{:.0}s played", started.elapsed().as_secs_f64());
            last_report = Instant::now();
        }
        thread::sleep(TICK);
    }

    info!("Done after {:.1}s", started.elapsed().as_secs_f64());
    world.release_sound(sound)?;
    Ok(())
}
