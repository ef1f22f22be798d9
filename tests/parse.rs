mod common;

use common::*;
use e_flow::{parse_song, FlowError, NoteKind, ParseOptions, Timing};
use midly::Format;
use pretty_assertions::assert_eq;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

#[test]
fn single_note_resolves_to_seconds() {
    let data = smf_bytes(
        Format::Parallel,
        480,
        vec![
            vec![tempo(0, 500_000)],
            vec![note_on(0, 0, 60, 100), note_off(480, 0, 60)],
        ],
    );
    let song = parse_song(&data, &ParseOptions::default()).unwrap();

    assert!(song.tracks[0].is_tempo_track);
    let voices: Vec<_> = song.tracks[1].voice_notes().collect();
    assert_eq!(voices.len(), 1);
    assert_eq!(voices[0].pitch, 60);
    assert_eq!(voices[0].speed, 100);
    assert!(close(voices[0].start_time, 0.0));
    assert!(close(voices[0].stop_time, 0.5));
    assert!(close(song.max_time, 0.5));
    assert_eq!((song.min_note, song.max_note, song.note_span), (60, 60, 0));
}

#[test]
fn constant_tempo_without_tempo_track_is_exact() {
    let mut events = Vec::new();
    raw_event(&mut events, 0, &[0x90, 60, 100]);
    raw_event(&mut events, 480, &[0x80, 60, 0]);
    raw_event(&mut events, 0, &[0xff, 0x2f, 0x00]);
    let song = parse_song(&raw_smf(0, 480, &[events]), &ParseOptions::default()).unwrap();

    assert!(!song.has_tempo_track());
    let note = &song.tracks[0].notes[0];
    assert_eq!(note.stop_time, 480.0 * (500_000.0 / 480.0 / 1_000_000.0));
}

#[test]
fn sustain_pedal_becomes_one_interval() {
    let data = smf_bytes(
        Format::Parallel,
        480,
        vec![
            vec![tempo(0, 500_000)],
            vec![sustain(0, 0, 127), sustain(960, 0, 0)],
        ],
    );
    let song = parse_song(&data, &ParseOptions::default()).unwrap();

    let pedals: Vec<_> = song.tracks[1].pedals().collect();
    assert_eq!(pedals.len(), 1);
    assert_eq!(pedals[0].speed, 127);
    assert!(close(pedals[0].start_time, 0.0));
    assert!(close(pedals[0].stop_time, 1.0));
    // pedals do not count as notes
    assert_eq!(song.voice_note_count(), 0);
    assert_eq!(song.max_time, 0.0);
}

#[test]
fn short_header_is_truncated() {
    let data = [b'M', b'T', b'h', b'd', 0, 0, 0, 6, 0, 0, 0, 1];
    match parse_song(&data, &ParseOptions::default()) {
        Err(FlowError::TruncatedInput { needed, available }) => {
            assert_eq!((needed, available), (6, 4))
        }
        other => panic!("expected TruncatedInput, got {:?}", other.map(|s| s.tracks.len())),
    }
}

#[test]
fn wrong_header_tag_is_malformed() {
    let mut data = raw_smf(0, 96, &[vec![0x00, 0xff, 0x2f, 0x00]]);
    data[0..4].copy_from_slice(b"RIFF");
    assert!(matches!(
        parse_song(&data, &ParseOptions::default()),
        Err(FlowError::MalformedContainer(_))
    ));
}

#[test]
fn track_chunk_overrunning_file_is_truncated() {
    let mut data = raw_smf(0, 96, &[vec![0x00, 0xff, 0x2f, 0x00]]);
    data.truncate(data.len() - 2);
    assert!(parse_song(&data, &ParseOptions::default())
        .unwrap_err()
        .is_truncated());
}

#[test]
fn sequential_format_is_rejected() {
    let data = smf_bytes(Format::Sequential, 96, vec![vec![], vec![]]);
    assert!(matches!(
        parse_song(&data, &ParseOptions::default()),
        Err(FlowError::UnsupportedFormat(2))
    ));
}

#[test]
fn tempo_change_mid_song() {
    let data = smf_bytes(
        Format::Parallel,
        480,
        vec![
            vec![tempo(0, 500_000), tempo(960, 1_000_000)],
            vec![note_on(0, 0, 60, 100), note_off(1920, 0, 60)],
        ],
    );
    let song = parse_song(&data, &ParseOptions::default()).unwrap();
    let note = song.tracks[1].voice_notes().next().unwrap();
    // 2 beats at 120 BPM then 2 beats at 60 BPM
    assert!(close(note.stop_time, 1.0 + 2.0));
    assert!(close(song.song_time(1440), 2.0));
    assert_eq!(song.tempo_map().changes(), 2);
}

#[test]
fn format_zero_with_inline_tempo() {
    let data = smf_bytes(
        Format::SingleTrack,
        480,
        vec![vec![
            tempo(0, 1_000_000),
            note_on(0, 3, 64, 90),
            note_off(480, 3, 64),
        ]],
    );
    let song = parse_song(&data, &ParseOptions::default()).unwrap();
    assert_eq!(song.tracks.len(), 1);
    assert!(song.tracks[0].is_tempo_track);
    let note = song.tracks[0].voice_notes().next().unwrap();
    assert_eq!(note.channel, 3);
    assert!(close(note.stop_time, 1.0));
    assert_eq!((song.min_note, song.max_note), (64, 64));
    assert!(matches!(
        song.tracks[0].notes[0].kind,
        NoteKind::Tempo { micros_per_quarter: 1_000_000 }
    ));
}

#[test]
fn smpte_division_uses_frame_rate() {
    let mut events = Vec::new();
    raw_event(&mut events, 0, &[0xff, 0x51, 0x03, 0x0f, 0x42, 0x40]);
    raw_event(&mut events, 0, &[0x90, 70, 80]);
    raw_event(&mut events, 1000, &[0x80, 70, 0]);
    // -25 fps, 40 ticks per frame
    let division = ((-25i8 as u8 as u16) << 8) | 40;
    let song = parse_song(&raw_smf(0, division, &[events]), &ParseOptions::default()).unwrap();

    assert_eq!(song.timing, Timing::Timecode { fps: 25, ticks_per_frame: 40 });
    let note = song.tracks[0].voice_notes().next().unwrap();
    assert!(close(note.stop_time, 1.0));
}

#[test]
fn running_status_and_velocity_zero_note_off() {
    let mut events = Vec::new();
    raw_event(&mut events, 0, &[0x90, 60, 100]);
    raw_event(&mut events, 0, &[64, 100]);
    raw_event(&mut events, 240, &[60, 0]);
    raw_event(&mut events, 240, &[64, 0]);
    raw_event(&mut events, 0, &[0xff, 0x2f, 0x00]);
    let song = parse_song(&raw_smf(0, 480, &[events]), &ParseOptions::default()).unwrap();

    let spans: Vec<_> = song.tracks[0]
        .notes
        .iter()
        .map(|n| (n.pitch, n.start_tick, n.stop_tick))
        .collect();
    assert_eq!(spans, vec![(60, 0, 240), (64, 0, 480)]);
}

#[test]
fn unterminated_note_is_closed_at_last_event() {
    let mut events = Vec::new();
    raw_event(&mut events, 0, &[0x90, 60, 100]);
    raw_event(&mut events, 300, &[0xb0, 7, 100]);
    let song = parse_song(&raw_smf(0, 480, &[events]), &ParseOptions::default()).unwrap();
    let note = &song.tracks[0].notes[0];
    assert_eq!((note.start_tick, note.stop_tick), (0, 300));
}

#[test]
fn unknown_meta_and_sysex_are_skipped() {
    let mut events = Vec::new();
    raw_event(&mut events, 0, &[0xff, 0x21, 0x01, 0x00]);
    raw_event(&mut events, 0, &[0xf0, 0x7e, 0x7f, 0x09, 0x01, 0xf7]);
    raw_event(&mut events, 0, &[0xff, 0x58, 0x04, 4, 2, 24, 8]);
    raw_event(&mut events, 0, &[0x90, 50, 60]);
    raw_event(&mut events, 96, &[0x80, 50, 0]);
    raw_event(&mut events, 0, &[0xff, 0x2f, 0x00]);
    let song = parse_song(&raw_smf(0, 96, &[events]), &ParseOptions::default()).unwrap();
    assert_eq!(song.voice_note_count(), 1);
}

#[test]
fn track_names_programs_and_transport() {
    let data = smf_bytes(
        Format::Parallel,
        96,
        vec![
            vec![track_name(0, "Transport"), tempo(0, 500_000)],
            vec![
                track_name(0, "Violin"),
                program(0, 0, 40),
                note_on(0, 0, 67, 90),
                note_off(96, 0, 67),
            ],
        ],
    );
    let song = parse_song(&data, &ParseOptions::default()).unwrap();
    assert!(song.tracks[0].is_transport_track);
    assert!(!song.tracks[1].is_transport_track);

    let summary = song.tracks[1].summary();
    assert_eq!(summary.name.as_deref(), Some("Violin"));
    assert_eq!(summary.program, Some(40));
    assert_eq!(summary.guess.as_deref(), Some("Strings"));
    assert_eq!(summary.note_count, 1);
}

#[test]
fn track_selection_keeps_track_zero() {
    let data = smf_bytes(
        Format::Parallel,
        96,
        vec![
            vec![tempo(0, 500_000)],
            vec![note_on(0, 0, 40, 90), note_off(96, 0, 40)],
            vec![note_on(0, 1, 80, 90), note_off(96, 1, 80)],
        ],
    );
    let song = parse_song(&data, &ParseOptions::only_track(2)).unwrap();
    assert_eq!(song.tracks.len(), 2);
    assert!(song.tracks[0].is_tempo_track);
    assert_eq!(song.tracks[1].source_index, 2);
    assert_eq!((song.min_note, song.max_note), (80, 80));
}

#[test]
fn committed_notes_never_overlap_per_key() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut events = Vec::new();
    for _ in 0..2000 {
        let delta = rng.gen_range(0..30u64);
        let channel = rng.gen_range(0..2u8);
        let pitch = rng.gen_range(60..63u8);
        let status = (if rng.gen_bool(0.5) { 0x90 } else { 0x80 }) | channel;
        let velocity = if rng.gen_bool(0.2) { 0 } else { rng.gen_range(1..128u8) };
        raw_event(&mut events, delta, &[status, pitch, velocity]);
    }
    let song = parse_song(&raw_smf(0, 96, &[events]), &ParseOptions::default()).unwrap();

    let notes = &song.tracks[0].notes;
    assert!(!notes.is_empty());
    for (i, a) in notes.iter().enumerate() {
        assert!(a.stop_tick >= a.start_tick);
        for b in &notes[i + 1..] {
            if a.pitch == b.pitch && a.channel == b.channel {
                let disjoint = a.stop_tick <= b.start_tick || b.stop_tick <= a.start_tick;
                // zero-length notes touch but never cover anything
                let empty = a.start_tick == a.stop_tick || b.start_tick == b.stop_tick;
                assert!(
                    disjoint || empty,
                    "{:?} overlaps {:?}",
                    (a.start_tick, a.stop_tick),
                    (b.start_tick, b.stop_tick)
                );
            }
        }
    }
}

#[test]
fn song_time_is_monotonic_over_tempo_map() {
    let data = smf_bytes(
        Format::Parallel,
        120,
        vec![vec![
            tempo(0, 400_000),
            tempo(100, 900_000),
            tempo(0, 250_000),
            tempo(777, 1_500_000),
        ]],
    );
    let song = parse_song(&data, &ParseOptions::default()).unwrap();
    let mut last = song.song_time(0);
    for tick in 1..3000 {
        let now = song.song_time(tick);
        assert!(now >= last);
        last = now;
    }
}
