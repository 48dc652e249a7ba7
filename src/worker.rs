//! Background stream refill thread.

use crate::world::Shared;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Spawns the refill thread. It tops up file streams every `interval`
/// while the world is active, polls every `inactive_poll` otherwise, and
/// exits once the world asks it to stop.
pub(crate) fn spawn(shared: Arc<Shared>, interval: Duration, inactive_poll: Duration) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("audio-refill".to_string())
        .spawn(move || {
            debug!("Audio refill thread started");
            while !shared.should_stop() {
                if !shared.is_active() {
                    thread::sleep(inactive_poll);
                    continue;
                }
                shared.lock().stream_refill_pass();
                thread::sleep(interval);
            }
            debug!("Audio refill thread exiting");
        })
}
