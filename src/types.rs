//! Song model produced by the parser and mutated by the flow engine.

use serde::Serialize;

use crate::error::{FlowError, Result};
use crate::tempo::TempoMap;

/// Number of samples along every note trajectory.
pub const TRAJECTORY_POINTS: usize = 41;
pub const NOTE_MAX_SPEED: u8 = 127;
pub const MIDI_CHANNELS: usize = 16;
pub const MIDI_NOTE_RANGE: usize = 128;
/// Microseconds per quarter note until a tempo event says otherwise (120 BPM).
pub const DEFAULT_TEMPO: u32 = 500_000;

/// Header division: ticks per quarter note, or SMPTE timecode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Timing {
    Metrical(u16),
    Timecode { fps: u8, ticks_per_frame: u8 },
}

impl Timing {
    pub fn from_division(division: u16) -> Result<Self> {
        if division & 0x8000 != 0 {
            let fps = ((division >> 8) as u8 as i8).unsigned_abs();
            let ticks_per_frame = (division & 0xff) as u8;
            if fps == 0 || ticks_per_frame == 0 {
                return Err(FlowError::MalformedContainer(format!(
                    "invalid SMPTE division 0x{:04x}",
                    division
                )));
            }
            Ok(Timing::Timecode { fps, ticks_per_frame })
        } else if division == 0 {
            Err(FlowError::MalformedContainer(
                "division of 0 ticks per quarter note".to_string(),
            ))
        } else {
            Ok(Timing::Metrical(division))
        }
    }

    /// Seconds per tick at `tempo` microseconds per quarter note.
    /// Timecode divisions ignore the tempo.
    pub fn seconds_per_tick(&self, tempo: u32) -> f64 {
        match *self {
            Timing::Metrical(division) => tempo as f64 / division as f64 / 1_000_000.0,
            Timing::Timecode { fps, ticks_per_frame } => {
                1.0 / (fps as f64 * ticks_per_frame as f64)
            }
        }
    }

    pub fn is_metrical(&self) -> bool {
        matches!(self, Timing::Metrical(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NoteKind {
    Voice,
    /// Sustain pedal interval (CC#64); `speed` holds the controller value.
    Pedal,
    Tempo { micros_per_quarter: u32 },
}

/// Render-time lifecycle of a note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum NoteState {
    #[default]
    Pending,
    Playing,
    /// Scrolled past the bottom of the frame.
    Retired,
}

/// Stable reference to a note inside a [`Song`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct NoteHandle {
    pub track: usize,
    pub index: usize,
}

/// Discretized falling shape of a note, head first.
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    pub x: [f64; TRAJECTORY_POINTS],
    pub y: [f64; TRAJECTORY_POINTS],
    pub vx: [f64; TRAJECTORY_POINTS],
    pub vy: [f64; TRAJECTORY_POINTS],
    pub mass: f64,
}

impl Default for Trajectory {
    fn default() -> Self {
        Trajectory {
            x: [0.0; TRAJECTORY_POINTS],
            y: [0.0; TRAJECTORY_POINTS],
            vx: [0.0; TRAJECTORY_POINTS],
            vy: [0.0; TRAJECTORY_POINTS],
            mass: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Note {
    pub pitch: u8,
    pub channel: u8,
    /// Note-on velocity, or the controller value for pedal intervals.
    pub speed: u8,
    pub kind: NoteKind,
    pub start_tick: u64,
    pub stop_tick: u64,
    pub start_time: f64,
    pub stop_time: f64,
    pub length: f64,
    #[serde(skip)]
    pub state: NoteState,
    #[serde(skip)]
    pub screen_time: f64,
    #[serde(skip)]
    pub trajectory: Trajectory,
}

impl Note {
    fn new(kind: NoteKind, pitch: u8, channel: u8, speed: u8, start_tick: u64, stop_tick: u64) -> Self {
        Note {
            pitch,
            channel,
            speed,
            kind,
            start_tick,
            stop_tick,
            start_time: 0.0,
            stop_time: 0.0,
            length: 0.0,
            state: NoteState::Pending,
            screen_time: 0.0,
            trajectory: Trajectory::default(),
        }
    }

    pub fn voice(pitch: u8, channel: u8, speed: u8, start_tick: u64, stop_tick: u64) -> Self {
        Note::new(NoteKind::Voice, pitch, channel, speed, start_tick, stop_tick)
    }

    pub fn pedal(channel: u8, speed: u8, start_tick: u64, stop_tick: u64) -> Self {
        Note::new(NoteKind::Pedal, 0, channel, speed, start_tick, stop_tick)
    }

    pub fn tempo(tick: u64, micros_per_quarter: u32) -> Self {
        Note::new(NoteKind::Tempo { micros_per_quarter }, 0, 0, 0, tick, tick)
    }

    pub fn is_voice(&self) -> bool {
        self.kind == NoteKind::Voice
    }

    pub fn is_pedal(&self) -> bool {
        self.kind == NoteKind::Pedal
    }

    pub fn is_tempo(&self) -> bool {
        matches!(self.kind, NoteKind::Tempo { .. })
    }

    pub fn is_playing(&self) -> bool {
        self.state == NoteState::Playing
    }

    pub fn tempo_value(&self) -> Option<u32> {
        match self.kind {
            NoteKind::Tempo { micros_per_quarter } => Some(micros_per_quarter),
            _ => None,
        }
    }

    /// Set `stop_time` and keep `length` in step with it.
    pub fn set_stop_time(&mut self, stop_time: f64) {
        self.stop_time = stop_time;
        self.length = self.stop_time - self.start_time;
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Track {
    /// Position in [`Song::tracks`].
    pub index: usize,
    /// Position of the chunk in the source file.
    pub source_index: usize,
    pub notes: Vec<Note>,
    pub is_tempo_track: bool,
    pub is_transport_track: bool,
    pub program: Option<u8>,
    pub name: Option<String>,
    pub copyright: Option<String>,
    pub text: Option<String>,
    pub instrument_name: Option<String>,
    pub lyric: Option<String>,
    pub marker: Option<String>,
    pub cue_point: Option<String>,
    pub sequencer_data: Option<String>,
}

impl Track {
    pub fn voice_notes(&self) -> impl Iterator<Item = &Note> {
        self.notes.iter().filter(|n| n.is_voice())
    }

    pub fn pedals(&self) -> impl Iterator<Item = &Note> {
        self.notes.iter().filter(|n| n.is_pedal())
    }

    /// `(tick, microseconds per quarter note)` in insertion order.
    pub fn tempo_events(&self) -> impl Iterator<Item = (u64, u32)> + '_ {
        self.notes
            .iter()
            .filter_map(|n| n.tempo_value().map(|tempo| (n.start_tick, tempo)))
    }

    pub fn summary(&self) -> TrackSummary {
        let mut channels = Vec::new();
        let mut pitch_range = (u8::MAX, u8::MIN);
        let mut note_count = 0;
        let mut sample_notes = Vec::new();

        for note in self.voice_notes() {
            note_count += 1;
            if !channels.contains(&note.channel) {
                channels.push(note.channel);
            }
            pitch_range.0 = pitch_range.0.min(note.pitch);
            pitch_range.1 = pitch_range.1.max(note.pitch);
            if sample_notes.len() < 5 {
                sample_notes.push(note.pitch);
            }
        }
        if note_count == 0 {
            pitch_range = (0, 0);
        }

        TrackSummary {
            index: self.index,
            name: self.name.clone(),
            program: self.program,
            guess: self.program.map(guess_instrument).map(str::to_string),
            channels,
            note_count,
            pedal_count: self.pedals().count(),
            tempo_changes: self.tempo_events().count(),
            pitch_range,
            sample_notes,
        }
    }
}

/// Overview of one track, for listings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackSummary {
    pub index: usize,
    pub name: Option<String>,
    pub program: Option<u8>,
    pub guess: Option<String>,
    pub channels: Vec<u8>,
    pub note_count: usize,
    pub pedal_count: usize,
    pub tempo_changes: usize,
    pub pitch_range: (u8, u8),
    pub sample_notes: Vec<u8>,
}

/// General MIDI instrument family for a program number.
pub fn guess_instrument(program: u8) -> &'static str {
    match program {
        0..=7 => "Piano",
        8..=15 => "Chromatic",
        16..=23 => "Organ",
        24..=31 => "Guitar",
        32..=39 => "Bass",
        40..=47 => "Strings",
        48..=55 => "Ensemble",
        56..=63 => "Brass",
        64..=71 => "Reed",
        72..=79 => "Pipe",
        80..=87 => "Synth Lead",
        88..=95 => "Synth Pad",
        96..=103 => "Synth Effects",
        104..=111 => "Ethnic",
        112..=119 => "Percussive",
        _ => "Sound Effects",
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Song {
    pub format: u16,
    pub timing: Timing,
    pub tracks: Vec<Track>,
    /// Initial tempo in microseconds per quarter note.
    pub tempo: u32,
    /// Latest voice note start or stop, in seconds.
    pub max_time: f64,
    pub min_note: u8,
    pub max_note: u8,
    pub note_span: u8,
    #[serde(skip)]
    tempo_map: TempoMap,
}

impl Song {
    pub fn new(format: u16, timing: Timing, tracks: Vec<Track>) -> Self {
        Song {
            format,
            timing,
            tracks,
            tempo: DEFAULT_TEMPO,
            max_time: 0.0,
            min_note: 0,
            max_note: 0,
            note_span: 0,
            tempo_map: TempoMap::constant(timing, DEFAULT_TEMPO),
        }
    }

    /// Resolve every tick to seconds and compute the song-level aggregates.
    pub fn finalize(&mut self) {
        self.tempo_map = match self.tracks.first() {
            Some(track) if track.is_tempo_track && self.timing.is_metrical() => {
                TempoMap::from_events(self.timing, self.tempo, track.tempo_events())
            }
            _ => TempoMap::constant(self.timing, self.tempo),
        };

        let mut max_time = 0.0f64;
        let mut pitches: Option<(u8, u8)> = None;

        for track in &mut self.tracks {
            for note in &mut track.notes {
                note.start_time = self.tempo_map.song_time(note.start_tick);
                note.stop_time = self.tempo_map.song_time(note.stop_tick);
                note.length = note.stop_time - note.start_time;

                if note.is_voice() {
                    pitches = Some(match pitches {
                        Some((lo, hi)) => (lo.min(note.pitch), hi.max(note.pitch)),
                        None => (note.pitch, note.pitch),
                    });
                    max_time = max_time.max(note.start_time).max(note.stop_time);
                }
            }
        }

        let (min_note, max_note) = pitches.unwrap_or((0, 0));
        self.max_time = max_time;
        self.min_note = min_note;
        self.max_note = max_note;
        self.note_span = max_note - min_note;
    }

    /// Elapsed seconds at `tick`, following the tempo track if there is one.
    pub fn song_time(&self, tick: u64) -> f64 {
        self.tempo_map.song_time(tick)
    }

    pub fn tempo_map(&self) -> &TempoMap {
        &self.tempo_map
    }

    pub fn has_tempo_track(&self) -> bool {
        self.tracks.first().map_or(false, |t| t.is_tempo_track)
    }

    pub fn note(&self, handle: NoteHandle) -> Option<&Note> {
        self.tracks.get(handle.track)?.notes.get(handle.index)
    }

    pub fn note_mut(&mut self, handle: NoteHandle) -> Option<&mut Note> {
        self.tracks.get_mut(handle.track)?.notes.get_mut(handle.index)
    }

    pub fn voice_note_count(&self) -> usize {
        self.tracks.iter().map(|t| t.voice_notes().count()).sum()
    }

    pub fn summaries(&self) -> Vec<TrackSummary> {
        self.tracks.iter().map(Track::summary).collect()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
