//! Turns a Standard MIDI File into per-frame note trajectories.
//!
//! Parse a song with [`load_song`] or [`parse_song`], then drive a
//! [`FlowSession`] frame by frame into a [`FrameSink`].

use std::sync::atomic::{AtomicBool, Ordering};

pub mod cli;
pub mod config;
pub mod dynamics;
pub mod error;
pub mod flow;
pub mod midi;
pub mod render;
pub mod shear;
pub mod tempo;
pub mod types;

pub use config::FlowConfig;
pub use dynamics::{DynamicsEngine, PedalWindow, PitchRange};
pub use error::{FlowError, Result};
pub use flow::{FlowSession, FlowSummary};
pub use midi::{load_song, parse_song, ParseOptions};
pub use render::{FrameInfo, FrameSink, JsonLinesSink, MemorySink, NoteFrame};
pub use shear::ShearField;
pub use tempo::TempoMap;
pub use types::{Note, NoteHandle, NoteKind, NoteState, Song, Timing, Track, TrackSummary};

// Global shutdown flag for graceful Ctrl+C handling
static SHUTDOWN: AtomicBool = AtomicBool::new(false);

pub fn set_shutdown_flag() {
    SHUTDOWN.store(true, Ordering::Relaxed);
}

pub fn should_shutdown() -> bool {
    SHUTDOWN.load(Ordering::Relaxed)
}

/// `1h02m03s`, `2m05s` or `7s`.
pub fn format_duration(seconds: f64) -> String {
    let total = seconds.max(0.0).round() as u64;
    let hours = total / 3600;
    let minutes = (total / 60) % 60;
    let remaining_seconds = total % 60;

    if hours > 0 {
        format!("{}h{:02}m{:02}s", hours, minutes, remaining_seconds)
    } else if minutes > 0 {
        format!("{}m{:02}s", minutes, remaining_seconds)
    } else {
        format!("{}s", remaining_seconds)
    }
}

/// Parse `path` and simulate it with `config`, writing frames to `sink`.
pub fn simulate_file<P, S>(path: P, config: &FlowConfig, sink: &mut S) -> Result<FlowSummary>
where
    P: AsRef<std::path::Path>,
    S: FrameSink,
{
    config.validate()?;
    let options = ParseOptions {
        track_to_display: config.track_to_display,
    };
    let song = load_song(path, &options)?;
    let mut session = FlowSession::new(song, config)?;
    session.run(sink)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0.0), "0s");
        assert_eq!(format_duration(7.4), "7s");
        assert_eq!(format_duration(125.0), "2m05s");
        assert_eq!(format_duration(3723.0), "1h02m03s");
        assert_eq!(format_duration(-3.0), "0s");
    }
}
