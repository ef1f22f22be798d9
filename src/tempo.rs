//! Tick to seconds conversion.
//!
//! The map is a table of segments, one per tempo change, each holding the
//! tick it starts at, the elapsed time at that tick and the seconds per tick
//! that apply until the next segment. Lookups binary search the table.

use crate::types::Timing;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Segment {
    tick: u64,
    time: f64,
    seconds_per_tick: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TempoMap {
    segments: Vec<Segment>,
}

impl Default for TempoMap {
    fn default() -> Self {
        TempoMap::constant(Timing::Metrical(480), crate::types::DEFAULT_TEMPO)
    }
}

impl TempoMap {
    /// A single tempo for the whole song.
    pub fn constant(timing: Timing, tempo: u32) -> Self {
        TempoMap {
            segments: vec![Segment {
                tick: 0,
                time: 0.0,
                seconds_per_tick: timing.seconds_per_tick(tempo),
            }],
        }
    }

    /// Build from `(tick, microseconds per quarter)` events.
    ///
    /// Events are applied in tick order; events sharing a tick keep their
    /// relative order so the last one wins.
    pub fn from_events<I>(timing: Timing, initial_tempo: u32, events: I) -> Self
    where
        I: IntoIterator<Item = (u64, u32)>,
    {
        let mut events: Vec<(u64, u32)> = events.into_iter().collect();
        events.sort_by_key(|&(tick, _)| tick);

        let mut segments = Vec::with_capacity(events.len() + 1);
        let mut current = Segment {
            tick: 0,
            time: 0.0,
            seconds_per_tick: timing.seconds_per_tick(initial_tempo),
        };
        segments.push(current);

        for (tick, tempo) in events {
            let time = current.time + current.seconds_per_tick * (tick - current.tick) as f64;
            current = Segment {
                tick,
                time,
                seconds_per_tick: timing.seconds_per_tick(tempo),
            };
            segments.push(current);
        }

        TempoMap { segments }
    }

    /// Elapsed seconds at `tick`.
    pub fn song_time(&self, tick: u64) -> f64 {
        let after = self.segments.partition_point(|s| s.tick <= tick);
        // segments[0] starts at tick 0, so `after` is at least 1
        let segment = &self.segments[after.saturating_sub(1)];
        segment.time + segment.seconds_per_tick * (tick - segment.tick) as f64
    }

    /// Number of tempo changes, excluding the initial tempo.
    pub fn changes(&self) -> usize {
        self.segments.len() - 1
    }
}
