#![allow(dead_code)]

use midly::num::{u15, u24, u28, u4, u7};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};

use e_flow::midi::chunk::write_vlq;

pub fn smf_bytes(format: Format, ticks_per_quarter: u16, tracks: Vec<Vec<TrackEvent<'static>>>) -> Vec<u8> {
    let mut smf = Smf::new(Header::new(format, Timing::Metrical(u15::new(ticks_per_quarter))));
    for mut track in tracks {
        track.push(end_of_track(0));
        smf.tracks.push(track);
    }
    let mut buf = Vec::new();
    smf.write(&mut buf).unwrap();
    buf
}

pub fn tempo(delta: u32, micros_per_quarter: u32) -> TrackEvent<'static> {
    TrackEvent {
        delta: u28::new(delta),
        kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(micros_per_quarter))),
    }
}

pub fn track_name(delta: u32, name: &'static str) -> TrackEvent<'static> {
    TrackEvent {
        delta: u28::new(delta),
        kind: TrackEventKind::Meta(MetaMessage::TrackName(name.as_bytes())),
    }
}

pub fn end_of_track(delta: u32) -> TrackEvent<'static> {
    TrackEvent {
        delta: u28::new(delta),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    }
}

fn midi(delta: u32, channel: u8, message: MidiMessage) -> TrackEvent<'static> {
    TrackEvent {
        delta: u28::new(delta),
        kind: TrackEventKind::Midi {
            channel: u4::new(channel),
            message,
        },
    }
}

pub fn note_on(delta: u32, channel: u8, key: u8, vel: u8) -> TrackEvent<'static> {
    midi(delta, channel, MidiMessage::NoteOn { key: u7::new(key), vel: u7::new(vel) })
}

pub fn note_off(delta: u32, channel: u8, key: u8) -> TrackEvent<'static> {
    midi(delta, channel, MidiMessage::NoteOff { key: u7::new(key), vel: u7::new(0) })
}

pub fn sustain(delta: u32, channel: u8, value: u8) -> TrackEvent<'static> {
    midi(
        delta,
        channel,
        MidiMessage::Controller { controller: u7::new(64), value: u7::new(value) },
    )
}

pub fn program(delta: u32, channel: u8, program: u8) -> TrackEvent<'static> {
    midi(delta, channel, MidiMessage::ProgramChange { program: u7::new(program) })
}

/// Hand-assembled file: header plus raw `MTrk` payloads.
pub fn raw_smf(format: u16, division: u16, tracks: &[Vec<u8>]) -> Vec<u8> {
    let mut out = b"MThd".to_vec();
    out.extend_from_slice(&6u32.to_be_bytes());
    out.extend_from_slice(&format.to_be_bytes());
    out.extend_from_slice(&(tracks.len() as u16).to_be_bytes());
    out.extend_from_slice(&division.to_be_bytes());
    for events in tracks {
        out.extend_from_slice(b"MTrk");
        out.extend_from_slice(&(events.len() as u32).to_be_bytes());
        out.extend_from_slice(events);
    }
    out
}

/// Raw event bytes with a VLQ delta in front.
pub fn raw_event(out: &mut Vec<u8>, delta: u64, bytes: &[u8]) {
    write_vlq(out, delta);
    out.extend_from_slice(bytes);
}
