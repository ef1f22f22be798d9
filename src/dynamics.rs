//! Falling-note trajectories: layout on first visibility, then one
//! integration step per frame.

use std::f64::consts::TAU;

use log::trace;

use crate::config::FlowConfig;
use crate::error::Result;
use crate::shear::ShearField;
use crate::types::{Note, Song, NOTE_MAX_SPEED, TRAJECTORY_POINTS};

/// Longest stretch a sustain pedal may add to a note in one go (s).
pub const MAX_PEDAL_EXTENSION: f64 = 10.0;

/// Horizontal layout: the song's pitch extremes plus a margin either side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PitchRange {
    pub min: i32,
    pub max: i32,
    pub span: i32,
}

impl PitchRange {
    pub const MARGIN: i32 = 5;

    pub fn new(min_note: u8, max_note: u8) -> Self {
        let min = min_note as i32 - Self::MARGIN;
        let max = max_note as i32 + Self::MARGIN;
        PitchRange {
            min,
            max,
            span: max - min + 1,
        }
    }

    pub fn from_song(song: &Song) -> Self {
        PitchRange::new(song.min_note, song.max_note)
    }

    pub fn x_position(&self, pitch: u8, frame_width: f64) -> f64 {
        (pitch as i32 - self.min) as f64 / self.span as f64 * frame_width
    }
}

/// The part of a pedal interval the dynamics need.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PedalWindow {
    pub start_time: f64,
    pub stop_time: f64,
    pub speed: u8,
}

impl PedalWindow {
    pub fn of(note: &Note) -> Self {
        PedalWindow {
            start_time: note.start_time,
            stop_time: note.stop_time,
            speed: note.speed,
        }
    }

    pub fn is_down_at(&self, t: f64) -> bool {
        self.start_time <= t && self.stop_time > t
    }
}

pub struct DynamicsEngine {
    config: FlowConfig,
    range: PitchRange,
    n_tracks: usize,
    shear: ShearField,
}

impl DynamicsEngine {
    /// Builds the shear field for `song` once; every later update reads it.
    pub fn new(config: &FlowConfig, song: &Song) -> Result<Self> {
        config.validate()?;
        let shear = ShearField::from_config(config, song.max_time)?;
        Ok(DynamicsEngine::with_shear(
            config,
            PitchRange::from_song(song),
            song.tracks.len(),
            shear,
        ))
    }

    pub fn with_shear(
        config: &FlowConfig,
        range: PitchRange,
        n_tracks: usize,
        shear: ShearField,
    ) -> Self {
        DynamicsEngine {
            config: config.clone(),
            range,
            n_tracks: n_tracks.max(1),
            shear,
        }
    }

    pub fn range(&self) -> PitchRange {
        self.range
    }

    pub fn shear(&self) -> &ShearField {
        &self.shear
    }

    fn height(&self) -> f64 {
        self.config.frame_height as f64
    }

    fn width(&self) -> f64 {
        self.config.frame_width as f64
    }

    /// Downward acceleration in pixels/s².
    pub fn gravity(&self) -> f64 {
        let window = self.config.window_time_span;
        10.0 * self.config.note_acceleration * self.height() / window / window
    }

    /// Lay out the samples evenly from the head, `screen_time` below the
    /// top of the frame, up along the note's length.
    pub fn initialize(&self, note: &mut Note) {
        let window = self.config.window_time_span;
        let height = self.height();
        note.length = note.stop_time - note.start_time;

        let y_start = (note.screen_time / window * height).trunc();
        let y_stop = y_start - (note.length / window * height).trunc();
        let length = y_start - y_stop;
        let x = self.range.x_position(note.pitch, self.width());

        let d = &mut note.trajectory;
        d.mass = note.speed as f64 / NOTE_MAX_SPEED as f64;
        for i in 0..TRAJECTORY_POINTS {
            d.x[i] = x;
            d.y[i] = y_start - length * (i as f64 / (TRAJECTORY_POINTS - 1) as f64);
            d.vx[i] = 0.0;
            d.vy[i] = height / window;
        }
    }

    /// Advance `note` by `dt` seconds at video time `t`.
    pub fn update(
        &self,
        note: &mut Note,
        track: usize,
        dt: f64,
        t: f64,
        pedal: Option<PedalWindow>,
    ) {
        let height = self.height();
        let gravity = self.gravity();
        let wavelength = self.config.wiggle_wavelength * height;
        let track_phase = track as f64 / self.n_tracks as f64;
        let shear_weight = self.config.flow_shear_scale
            * (TAU * note.pitch as f64 / self.range.span as f64).sin();
        let wiggle_weight = 0.1 * self.width() * self.config.wiggle_amplitude
            / if note.trajectory.mass > 0.0 { note.trajectory.mass } else { 1.0 };

        let (extra_sustain, extension) = match pedal {
            Some(p) => (
                (p.stop_time - t).max(0.0),
                (p.stop_time - note.stop_time).min(MAX_PEDAL_EXTENSION),
            ),
            None => (0.0, 0.0),
        };
        let sustained = self.config.pedal_modifies_notelength
            && extra_sustain > 0.0
            && pedal.map_or(false, |p| {
                p.is_down_at(t)
                    && note.stop_time >= p.start_time
                    && note.stop_time < p.stop_time
                    && p.speed > 0
            });

        let mut on_screen = 0;
        for u in 0..TRAJECTORY_POINTS {
            let y = note.trajectory.y[u];
            if y >= 0.0 {
                on_screen += 1;
                let y_frac = y / height;
                let shear = self.shear.acceleration(y, t) * shear_weight;
                let phase = y / wavelength - (t - note.start_time) / self.config.wiggle_period
                    + track_phase;
                let wiggle = wiggle_weight * y_frac * y_frac * (TAU * phase).sin();
                let d = &mut note.trajectory;
                d.vy[u] += gravity * dt;
                d.vx[u] += (shear + wiggle) * dt;
            } else if sustained {
                trace!(
                    "pedal extends note {} ch {} by {:.3}s",
                    note.pitch,
                    note.channel,
                    extension
                );
                note.set_stop_time(note.stop_time + extension);
                let d = &mut note.trajectory;
                let remaining = (TRAJECTORY_POINTS - on_screen) as f64;
                for v in u..TRAJECTORY_POINTS {
                    d.y[v] = -d.vy[v] * (v - on_screen) as f64 * extra_sustain / remaining;
                }
                let last = TRAJECTORY_POINTS - 1;
                d.y[last] += d.vy[last] * dt;
                d.x[last] += d.vx[last] * dt;
                break;
            }

            let d = &mut note.trajectory;
            d.y[u] += d.vy[u] * dt;
            d.x[u] += d.vx[u] * dt;
        }
    }
}
