//! Pairs note-on/note-off and sustain down/up events into closed intervals.

use log::{trace, warn};

use crate::error::Result;
use crate::types::{Note, Track, MIDI_CHANNELS, MIDI_NOTE_RANGE};

/// Threshold at which CC#64 counts as pedal down.
pub const SUSTAIN_DOWN: u8 = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Sounding {
    start_tick: u64,
    speed: u8,
}

/// Builds one [`Track`], holding the open interval of every
/// `(pitch, channel)` pair and the open pedal interval of every channel.
#[derive(Debug)]
pub struct TrackBuilder {
    track: Track,
    sounding: Vec<Option<Sounding>>,
    pedals: [Option<Sounding>; MIDI_CHANNELS],
}

fn slot(channel: u8, pitch: u8) -> usize {
    (channel as usize & 0x0f) * MIDI_NOTE_RANGE + (pitch as usize & 0x7f)
}

impl TrackBuilder {
    pub fn new(index: usize, source_index: usize) -> Self {
        TrackBuilder {
            track: Track {
                index,
                source_index,
                ..Track::default()
            },
            sounding: vec![None; MIDI_CHANNELS * MIDI_NOTE_RANGE],
            pedals: [None; MIDI_CHANNELS],
        }
    }

    fn push(&mut self, note: Note) -> Result<()> {
        if self.track.notes.len() == self.track.notes.capacity() {
            let additional = self.track.notes.capacity().max(16);
            self.track.notes.try_reserve(additional)?;
        }
        self.track.notes.push(note);
        Ok(())
    }

    pub fn is_sounding(&self, channel: u8, pitch: u8) -> bool {
        self.sounding[slot(channel, pitch)].is_some()
    }

    pub fn note_on(&mut self, tick: u64, channel: u8, pitch: u8, velocity: u8) {
        let entry = &mut self.sounding[slot(channel, pitch)];
        if entry.is_some() {
            trace!("note {} ch {} already sounding at tick {}", pitch, channel, tick);
            return;
        }
        *entry = Some(Sounding {
            start_tick: tick,
            speed: velocity,
        });
    }

    pub fn note_off(&mut self, tick: u64, channel: u8, pitch: u8) -> Result<()> {
        match self.sounding[slot(channel, pitch)].take() {
            Some(open) => self.push(Note::voice(
                pitch & 0x7f,
                channel & 0x0f,
                open.speed,
                open.start_tick,
                tick,
            )),
            None => {
                trace!("note off {} ch {} at tick {} without note on", pitch, channel, tick);
                Ok(())
            }
        }
    }

    /// CC#64. While the pedal is down any further value of 64 or more closes
    /// the running interval and opens a new one at the same tick.
    pub fn sustain(&mut self, tick: u64, channel: u8, value: u8) -> Result<()> {
        let channel = channel & 0x0f;
        let current = self.pedals[channel as usize];
        match current {
            None if value >= SUSTAIN_DOWN => {
                self.pedals[channel as usize] = Some(Sounding {
                    start_tick: tick,
                    speed: value,
                });
            }
            None => trace!("pedal up on ch {} at tick {} while already up", channel, tick),
            Some(open) if value >= SUSTAIN_DOWN => {
                self.push(Note::pedal(channel, open.speed, open.start_tick, tick))?;
                self.pedals[channel as usize] = Some(Sounding {
                    start_tick: tick,
                    speed: value,
                });
            }
            Some(open) => {
                self.push(Note::pedal(channel, open.speed, open.start_tick, tick))?;
                self.pedals[channel as usize] = None;
            }
        }
        Ok(())
    }

    pub fn tempo(&mut self, tick: u64, micros_per_quarter: u32) -> Result<()> {
        self.push(Note::tempo(tick, micros_per_quarter))?;
        self.track.is_tempo_track = true;
        Ok(())
    }

    pub fn program(&mut self, program: u8) {
        self.track.program = Some(program & 0x7f);
    }

    /// Text-like meta events; anything else is skipped.
    pub fn meta(&mut self, kind: u8, data: &[u8]) {
        let text = || Some(String::from_utf8_lossy(data).into_owned());
        match kind {
            0x01 => self.track.text = text(),
            0x02 => self.track.copyright = text(),
            0x03 => {
                self.track.name = text();
                self.track.is_transport_track = self.track.name.as_deref() == Some("Transport");
            }
            0x04 => self.track.instrument_name = text(),
            0x05 => self.track.lyric = text(),
            0x06 => self.track.marker = text(),
            0x07 => self.track.cue_point = text(),
            0x7f => self.track.sequencer_data = text(),
            _ => trace!("skipping meta event 0x{:02x} ({} byte(s))", kind, data.len()),
        }
    }

    /// Close anything still open at `final_tick` and hand over the track.
    pub fn finish(mut self, final_tick: u64) -> Result<Track> {
        for channel in 0..MIDI_CHANNELS as u8 {
            for pitch in 0..MIDI_NOTE_RANGE as u8 {
                if self.is_sounding(channel, pitch) {
                    warn!(
                        "track {}: note {} ch {} never released, closing at tick {}",
                        self.track.index, pitch, channel, final_tick
                    );
                    self.note_off(final_tick, channel, pitch)?;
                }
            }
        }
        for channel in 0..MIDI_CHANNELS as u8 {
            if let Some(open) = self.pedals[channel as usize].take() {
                warn!(
                    "track {}: pedal on ch {} never released, closing at tick {}",
                    self.track.index, channel, final_tick
                );
                self.push(Note::pedal(channel, open.speed, open.start_tick, final_tick))?;
            }
        }
        Ok(self.track)
    }
}
