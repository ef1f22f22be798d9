//! Standard MIDI File parsing.

pub mod chunk;
pub mod decoder;
pub mod track;

use std::fs;
use std::path::Path;

use log::{debug, info, warn};

use crate::error::{FlowError, Result};
use crate::types::{Song, Timing};
use chunk::{read_chunk, ByteCursor, HEADER_LENGTH, HEADER_TAG, TRACK_TAG};

pub use decoder::{decode_track, EventDecoder, TrackEvent};
pub use track::TrackBuilder;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseOptions {
    /// Keep only track 0 and this track (by chunk position).
    pub track_to_display: Option<usize>,
}

impl ParseOptions {
    pub fn all_tracks() -> Self {
        ParseOptions::default()
    }

    pub fn only_track(index: usize) -> Self {
        ParseOptions {
            track_to_display: Some(index),
        }
    }

    fn keeps(&self, source_index: usize) -> bool {
        match self.track_to_display {
            Some(wanted) => source_index == 0 || source_index == wanted,
            None => true,
        }
    }
}

/// Parse a complete file into a [`Song`] with all times resolved.
pub fn parse_song(data: &[u8], options: &ParseOptions) -> Result<Song> {
    let mut cursor = ByteCursor::new(data);

    let header = read_chunk(&mut cursor)?;
    header.expect_tag(HEADER_TAG)?;
    if header.data.len() < HEADER_LENGTH {
        return Err(FlowError::truncated(HEADER_LENGTH, header.data.len()));
    }
    let mut fields = header.cursor();
    let format = fields.read_u16()?;
    let declared_tracks = fields.read_u16()? as usize;
    let division = fields.read_u16()?;

    if format > 1 {
        return Err(FlowError::UnsupportedFormat(format));
    }
    let timing = Timing::from_division(division)?;
    debug!(
        "format {}, {} track(s), division {:?}",
        format, declared_tracks, timing
    );

    if let Some(wanted) = options.track_to_display {
        if wanted >= declared_tracks {
            warn!(
                "track {} requested but the file has {} track(s)",
                wanted, declared_tracks
            );
        }
    }

    let mut tracks = Vec::new();
    for source_index in 0..declared_tracks {
        let chunk = read_chunk(&mut cursor)?;
        chunk.expect_tag(TRACK_TAG)?;
        if !options.keeps(source_index) {
            continue;
        }
        tracks.try_reserve(1)?;
        tracks.push(decode_track(tracks.len(), source_index, chunk.data)?);
    }

    let mut song = Song::new(format, timing, tracks);
    song.finalize();
    info!(
        "{} track(s), {} note(s), {:.2}s, pitches {}..={}",
        song.tracks.len(),
        song.voice_note_count(),
        song.max_time,
        song.min_note,
        song.max_note
    );
    Ok(song)
}

/// Read and parse a file from disk.
pub fn load_song<P: AsRef<Path>>(path: P, options: &ParseOptions) -> Result<Song> {
    let data = fs::read(path.as_ref())?;
    debug!("read {} byte(s) from {}", data.len(), path.as_ref().display());
    parse_song(&data, options)
}
