//! Running-status decoder for one `MTrk` chunk.

use log::{debug, trace};

use super::chunk::ByteCursor;
use super::track::TrackBuilder;
use crate::error::{FlowError, Result};
use crate::types::Track;

pub const META_END_OF_TRACK: u8 = 0x2f;
pub const META_TEMPO: u8 = 0x51;
pub const CONTROLLER_SUSTAIN: u8 = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackEvent<'a> {
    NoteOff { channel: u8, pitch: u8, velocity: u8 },
    NoteOn { channel: u8, pitch: u8, velocity: u8 },
    PolyPressure { channel: u8, pitch: u8, pressure: u8 },
    Controller { channel: u8, controller: u8, value: u8 },
    ProgramChange { channel: u8, program: u8 },
    ChannelPressure { channel: u8, pressure: u8 },
    PitchBend { channel: u8, value: u16 },
    Meta { kind: u8, data: &'a [u8] },
    /// Payload between 0xF0 and the terminating 0xF7.
    SysEx(&'a [u8]),
    /// Common and real-time system messages; data bytes are consumed.
    System(u8),
}

/// Iterates the events of one track, carrying the running status and the
/// absolute tick between reads.
#[derive(Debug, Clone)]
pub struct EventDecoder<'a> {
    cursor: ByteCursor<'a>,
    last_status: Option<u8>,
    tick: u64,
}

impl<'a> EventDecoder<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        EventDecoder {
            cursor: ByteCursor::new(data),
            last_status: None,
            tick: 0,
        }
    }

    /// Absolute tick of the last decoded event.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Next `(absolute tick, event)`, or `None` at the end of the chunk.
    pub fn next_event(&mut self) -> Result<Option<(u64, TrackEvent<'a>)>> {
        if self.cursor.is_empty() {
            return Ok(None);
        }

        let delta = self.cursor.read_vlq()?;
        self.tick = self.tick.saturating_add(delta);

        let next = self.cursor.read_u8()?;
        let event = if next & 0x80 != 0 {
            if next < 0xf0 {
                self.last_status = Some(next);
                self.channel_event(next, None)?
            } else {
                self.system_event(next)?
            }
        } else {
            // data byte: reuse the previous channel status
            let status = self.last_status.ok_or_else(|| {
                FlowError::MalformedContainer(format!(
                    "data byte 0x{:02x} at tick {} without a running status",
                    next, self.tick
                ))
            })?;
            self.channel_event(status, Some(next))?
        };

        Ok(Some((self.tick, event)))
    }

    fn data_byte(&mut self, first: &mut Option<u8>) -> Result<u8> {
        match first.take() {
            Some(b) => Ok(b),
            None => self.cursor.read_u8(),
        }
    }

    fn channel_event(&mut self, status: u8, mut first: Option<u8>) -> Result<TrackEvent<'a>> {
        let channel = status & 0x0f;
        let event = match status & 0xf0 {
            0x80 => TrackEvent::NoteOff {
                channel,
                pitch: self.data_byte(&mut first)?,
                velocity: self.data_byte(&mut first)?,
            },
            0x90 => TrackEvent::NoteOn {
                channel,
                pitch: self.data_byte(&mut first)?,
                velocity: self.data_byte(&mut first)?,
            },
            0xa0 => TrackEvent::PolyPressure {
                channel,
                pitch: self.data_byte(&mut first)?,
                pressure: self.data_byte(&mut first)?,
            },
            0xb0 => TrackEvent::Controller {
                channel,
                controller: self.data_byte(&mut first)?,
                value: self.data_byte(&mut first)?,
            },
            0xc0 => TrackEvent::ProgramChange {
                channel,
                program: self.data_byte(&mut first)?,
            },
            0xd0 => TrackEvent::ChannelPressure {
                channel,
                pressure: self.data_byte(&mut first)?,
            },
            _ => {
                let lsb = self.data_byte(&mut first)?;
                let msb = self.data_byte(&mut first)?;
                TrackEvent::PitchBend {
                    channel,
                    value: (u16::from(msb & 0x7f) << 7) | u16::from(lsb & 0x7f),
                }
            }
        };
        Ok(event)
    }

    fn system_event(&mut self, status: u8) -> Result<TrackEvent<'a>> {
        match status {
            0xff => {
                let kind = self.cursor.read_u8()?;
                let len = self.cursor.read_vlq_len()?;
                let data = self.cursor.take(len)?;
                Ok(TrackEvent::Meta { kind, data })
            }
            0xf0 => {
                let rest = self.cursor.rest();
                match rest.iter().position(|&b| b == 0xf7) {
                    Some(end) => {
                        let payload = self.cursor.take(end)?;
                        self.cursor.skip(1)?;
                        Ok(TrackEvent::SysEx(payload))
                    }
                    None => Err(FlowError::truncated(rest.len() + 1, rest.len())),
                }
            }
            0xf1 | 0xf3 => {
                self.cursor.skip(1)?;
                Ok(TrackEvent::System(status))
            }
            0xf2 => {
                self.cursor.skip(2)?;
                Ok(TrackEvent::System(status))
            }
            _ => Ok(TrackEvent::System(status)),
        }
    }
}

/// Decode one track chunk into a [`Track`].
///
/// Dangling notes and pedal intervals are closed at the tick of the last
/// event read.
pub fn decode_track(index: usize, source_index: usize, data: &[u8]) -> Result<Track> {
    let mut decoder = EventDecoder::new(data);
    let mut builder = TrackBuilder::new(index, source_index);

    while let Some((tick, event)) = decoder.next_event()? {
        match event {
            TrackEvent::NoteOn { channel, pitch, velocity } if velocity > 0 => {
                builder.note_on(tick, channel, pitch, velocity)
            }
            TrackEvent::NoteOn { channel, pitch, .. } | TrackEvent::NoteOff { channel, pitch, .. } => {
                builder.note_off(tick, channel, pitch)?
            }
            TrackEvent::Controller { channel, controller: CONTROLLER_SUSTAIN, value } => {
                builder.sustain(tick, channel, value)?
            }
            TrackEvent::ProgramChange { program, .. } => builder.program(program),
            TrackEvent::Meta { kind: META_END_OF_TRACK, .. } => break,
            TrackEvent::Meta { kind: META_TEMPO, data } => {
                if data.len() < 3 {
                    return Err(FlowError::truncated(3, data.len()));
                }
                let tempo = u32::from_be_bytes([0, data[0], data[1], data[2]]);
                builder.tempo(tick, tempo)?;
            }
            TrackEvent::Meta { kind, data } => builder.meta(kind, data),
            TrackEvent::SysEx(payload) => trace!("sysex of {} byte(s) at tick {}", payload.len(), tick),
            _ => {}
        }
    }

    let track = builder.finish(decoder.tick())?;
    debug!(
        "track {} (chunk {}): {} note(s){}{}",
        track.index,
        track.source_index,
        track.notes.len(),
        if track.is_tempo_track { ", tempo" } else { "" },
        if track.is_transport_track { ", transport" } else { "" },
    );
    Ok(track)
}
