//! Renderer boundary.
//!
//! The frame loop hands each frame to a [`FrameSink`]: one `begin_frame`, a
//! `note` call per drawn note, then `end_frame`. Rasterizing the polygons is
//! left to whoever implements the sink.

use std::io::Write;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Per-frame values shared by every note in the frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameInfo {
    pub index: u64,
    pub video_time: f64,
    /// Background brightness multiplier, below 1 while a pedal dims it
    pub background_scale: f64,
}

/// One drawn note: the visible head of its trajectory plus drawing hints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteFrame {
    pub track: usize,
    pub note: usize,
    pub pitch: u8,
    pub channel: u8,
    pub opacity: u8,
    pub width: f64,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

impl NoteFrame {
    /// Closed outline of the trail: left edge head to tail, right edge back.
    pub fn outline(&self) -> Vec<(f64, f64)> {
        let half = self.width / 2.0;
        let left = self.x.iter().zip(&self.y).map(|(&x, &y)| (x - half, y));
        let right = self.x.iter().zip(&self.y).rev().map(|(&x, &y)| (x + half, y));
        left.chain(right).collect()
    }
}

pub trait FrameSink {
    fn begin_frame(&mut self, info: &FrameInfo) -> Result<()>;
    fn note(&mut self, note: &NoteFrame) -> Result<()>;
    fn end_frame(&mut self) -> Result<()>;

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameRecord {
    #[serde(flatten)]
    pub info: FrameInfo,
    pub notes: Vec<NoteFrame>,
}

/// Writes one JSON object per frame, newline separated.
pub struct JsonLinesSink<W: Write> {
    writer: W,
    current: Option<FrameRecord>,
    frames_written: u64,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        JsonLinesSink {
            writer,
            current: None,
            frames_written: 0,
        }
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> FrameSink for JsonLinesSink<W> {
    fn begin_frame(&mut self, info: &FrameInfo) -> Result<()> {
        self.current = Some(FrameRecord {
            info: info.clone(),
            notes: Vec::new(),
        });
        Ok(())
    }

    fn note(&mut self, note: &NoteFrame) -> Result<()> {
        if let Some(frame) = self.current.as_mut() {
            frame.notes.push(note.clone());
        }
        Ok(())
    }

    fn end_frame(&mut self) -> Result<()> {
        if let Some(frame) = self.current.take() {
            serde_json::to_writer(&mut self.writer, &frame)?;
            self.writer.write_all(b"\n")?;
            self.frames_written += 1;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Keeps every frame in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub frames: Vec<FrameRecord>,
}

impl FrameSink for MemorySink {
    fn begin_frame(&mut self, info: &FrameInfo) -> Result<()> {
        self.frames.push(FrameRecord {
            info: info.clone(),
            notes: Vec::new(),
        });
        Ok(())
    }

    fn note(&mut self, note: &NoteFrame) -> Result<()> {
        if let Some(frame) = self.frames.last_mut() {
            frame.notes.push(note.clone());
        }
        Ok(())
    }

    fn end_frame(&mut self) -> Result<()> {
        Ok(())
    }
}
