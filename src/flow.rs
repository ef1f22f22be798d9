//! Frame loop: decides which notes are on screen, drives their dynamics
//! and hands the result to a [`FrameSink`].

use log::{debug, info, log, Level};

use crate::config::FlowConfig;
use crate::dynamics::{DynamicsEngine, PedalWindow};
use crate::error::Result;
use crate::render::{FrameInfo, FrameSink, NoteFrame};
use crate::types::{
    NoteHandle, NoteState, Song, MIDI_CHANNELS, MIDI_NOTE_RANGE, NOTE_MAX_SPEED, TRAJECTORY_POINTS,
};
use crate::{format_duration, should_shutdown};

/// Which note last drew on a `(pitch, channel)` pair.
#[derive(Debug, Clone, Copy, Default)]
struct Slot {
    playing: bool,
    note: Option<NoteHandle>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlowSummary {
    /// Frames handed to the sink.
    pub frames: u64,
    /// Video time reached when the loop ended.
    pub video_time: f64,
    pub interrupted: bool,
}

pub struct FlowSession {
    song: Song,
    config: FlowConfig,
    engine: DynamicsEngine,
    slots: Vec<Slot>,
    pedal: Option<NoteHandle>,
    frame: u64,
    stop_time: f64,
}

fn slot_index(pitch: u8, channel: u8) -> usize {
    (channel as usize & 0x0f) * MIDI_NOTE_RANGE + (pitch as usize & 0x7f)
}

/// `255 * (0.2 + exp(-screen_time / half_life) * speed / 127)`, capped at 255.
pub fn opacity(screen_time: f64, half_life: f64, speed: u8) -> u8 {
    let alpha = 255.0
        * (0.2 + (-screen_time / half_life).exp() * speed as f64 / NOTE_MAX_SPEED as f64);
    alpha.min(255.0).floor().max(0.0) as u8
}

impl FlowSession {
    pub fn new(song: Song, config: &FlowConfig) -> Result<Self> {
        let engine = DynamicsEngine::new(config, &song)?;
        let stop_time = config.stop_time_for(song.max_time);
        debug!(
            "pitch range {:?}, stop at {:.2}s, {:.1} fps",
            engine.range(),
            stop_time,
            config.frame_rate
        );
        Ok(FlowSession {
            song,
            config: config.clone(),
            engine,
            slots: vec![Slot::default(); MIDI_NOTE_RANGE * MIDI_CHANNELS],
            pedal: None,
            frame: 0,
            stop_time,
        })
    }

    pub fn song(&self) -> &Song {
        &self.song
    }

    pub fn engine(&self) -> &DynamicsEngine {
        &self.engine
    }

    /// Video time of the first simulated frame; notes are warmed up for one
    /// window before `start_time`.
    pub fn first_video_time(&self) -> f64 {
        (self.config.start_time - self.config.window_time_span).max(0.0)
    }

    pub fn stop_time(&self) -> f64 {
        self.stop_time
    }

    fn background_scale(&self, t: f64) -> f64 {
        if !self.config.pedal_modifies_background {
            return 1.0;
        }
        match self.pedal.and_then(|h| self.song.note(h)) {
            Some(p) if p.start_time <= t && p.stop_time > t => p.speed as f64 / NOTE_MAX_SPEED as f64,
            _ => 1.0,
        }
    }

    fn pedal_window(&self) -> Option<PedalWindow> {
        self.pedal
            .and_then(|h| self.song.note(h))
            .map(PedalWindow::of)
    }

    /// Simulate one frame at video time `t`. Frames before `start_time`
    /// advance the dynamics without reaching the sink.
    pub fn step<S: FrameSink>(&mut self, t: f64, sink: &mut S) -> Result<()> {
        let dt = self.config.frame_period();
        let window = self.config.window_time_span;
        let height = self.config.frame_height as f64;
        let emit = t >= self.config.start_time;
        let min_visible = (-height / 100.0).trunc();
        let width = self.config.max_note_width as f64;

        if emit {
            sink.begin_frame(&FrameInfo {
                index: self.frame,
                video_time: t,
                background_scale: self.background_scale(t),
            })?;
        }

        for tr in 0..self.song.tracks.len() {
            if self.song.tracks[tr].is_transport_track {
                continue;
            }
            for n in 0..self.song.tracks[tr].notes.len() {
                let handle = NoteHandle { track: tr, index: n };
                let note = &self.song.tracks[tr].notes[n];
                if !(note.start_time <= t && note.stop_time + window > t) || note.is_tempo() {
                    continue;
                }
                if note.is_pedal() {
                    if note.start_time <= t && note.stop_time > t {
                        self.pedal = Some(handle);
                    }
                    continue;
                }
                if note.state == NoteState::Retired {
                    continue;
                }

                let key = slot_index(note.pitch, note.channel);
                let slot = self.slots[key];
                if let Some(previous) = slot.note.and_then(|h| self.song.note(h)) {
                    if slot.playing && previous.stop_time < t {
                        self.slots[key] = Slot::default();
                    }
                }
                let pedal = self.pedal_window();

                let note = &mut self.song.tracks[tr].notes[n];
                if note.state == NoteState::Pending {
                    note.screen_time = t - note.start_time;
                    note.state = NoteState::Playing;
                    self.engine.initialize(note);
                }

                let alpha = opacity(note.screen_time, self.config.note_visibility_half_life, note.speed);
                self.engine.update(note, tr, dt, t, pedal);

                if note.trajectory.y[TRAJECTORY_POINTS - 1] > height - 1.0 {
                    note.state = NoteState::Retired;
                    continue;
                }
                if !emit {
                    continue;
                }

                let points = note
                    .trajectory
                    .y
                    .iter()
                    .take_while(|&&y| y >= min_visible)
                    .count();
                let frame = NoteFrame {
                    track: tr,
                    note: n,
                    pitch: note.pitch,
                    channel: note.channel,
                    opacity: alpha,
                    width: width * note.speed as f64 / NOTE_MAX_SPEED as f64,
                    x: note.trajectory.x[..points].to_vec(),
                    y: note.trajectory.y[..points].to_vec(),
                };
                note.screen_time += dt;
                let start_time = note.start_time;
                sink.note(&frame)?;

                let slot = self.slots[key];
                if slot.playing {
                    if let Some(previous) = slot.note.filter(|&h| h != handle) {
                        if let Some(prev) = self.song.note_mut(previous) {
                            if prev.stop_time > start_time {
                                debug!(
                                    "note {} ch {} cut at {:.3}s by a newer note",
                                    prev.pitch, prev.channel, start_time
                                );
                                prev.set_stop_time(start_time);
                            }
                        }
                    }
                }
                self.slots[key] = Slot {
                    playing: true,
                    note: Some(handle),
                };
            }
        }

        if emit {
            sink.end_frame()?;
            self.frame += 1;
        }
        Ok(())
    }

    /// Step from [`first_video_time`](Self::first_video_time) to the stop
    /// time, or until the shutdown flag is raised.
    pub fn run<S: FrameSink>(&mut self, sink: &mut S) -> Result<FlowSummary> {
        let period = self.config.frame_period();
        let frames_per_report = self.config.frame_rate.round().max(1.0) as u64;
        let progress = if self.config.verbose {
            Level::Info
        } else {
            Level::Debug
        };
        let first = self.first_video_time();
        let mut step: u64 = 0;
        let mut t = first;
        let mut interrupted = false;

        info!(
            "simulating {} of video",
            format_duration(self.stop_time - self.config.start_time)
        );
        while t < self.stop_time {
            if should_shutdown() {
                info!("stopping at {}", format_duration(t));
                interrupted = true;
                break;
            }
            let before = self.frame;
            self.step(t, sink)?;
            if self.frame != before && before % frames_per_report == 0 {
                log!(
                    progress,
                    "{}, {} to go",
                    format_duration(t),
                    format_duration(self.stop_time - t)
                );
            }
            step += 1;
            t = first + step as f64 * period;
        }
        sink.finish()?;

        Ok(FlowSummary {
            frames: self.frame,
            video_time: t,
            interrupted,
        })
    }
}
