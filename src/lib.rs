//! streammix library crate
//!
//! A streaming audio mixing engine over a pluggable device backend. The
//! demo binary is in main.rs.

#[macro_use]
extern crate log;

pub mod backend;
pub mod capture;
pub mod channel;
pub mod config;
pub mod constants;
pub mod decoder;
pub mod error;
pub mod format;
pub mod loader;
pub mod params;
pub mod pool;
pub mod resource;
pub mod stage;
mod worker;
pub mod world;

pub use backend::{AudioDevice, MemoryDevice};
pub use config::AudioConfig;
pub use error::{AudioError, Result};
pub use format::FormatDescriptor;
pub use loader::SoundSource;
pub use params::VirtualChannel;
pub use resource::{SoundId, SoundMode};
pub use world::AudioWorld;

#[cfg(test)]
mod params_tests;
#[cfg(test)]
mod resource_tests;
