//! Tunables for the frame loop and the note dynamics.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{FlowError, Result};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
/// Configuration for trajectory simulation and frame output
pub struct FlowConfig {
    /// Video frames per second
    pub frame_rate: f64,
    pub frame_width: u32,
    pub frame_height: u32,
    /// Seconds a note takes to fall the height of the frame
    pub window_time_span: f64,
    /// Half life of the opacity boost after a note starts (s)
    pub note_visibility_half_life: f64,
    /// Trail width of a note at full velocity (px)
    pub max_note_width: u32,
    /// Height control points in the shear grid
    pub shear_y_points: usize,
    /// Seconds between time control points in the shear grid
    pub shear_delta_t: f64,
    /// Period of the travelling wiggle wave (s)
    pub wiggle_period: f64,
    /// Accepted for compatibility; the dynamics do not use it
    pub wiggle_offset: f64,
    pub wiggle_amplitude: f64,
    /// Wiggle wavelength as a fraction of frame height
    pub wiggle_wavelength: f64,
    pub note_acceleration: f64,
    pub flow_shear_scale: f64,
    /// Seed for the shear grid; a clock-based seed is used when absent
    pub random_seed: Option<u64>,
    /// Render only track 0 and this track
    pub track_to_display: Option<usize>,
    /// Video time of the first emitted frame (s)
    pub start_time: f64,
    /// Video time to stop at; absent or negative means song end plus `extra_time`
    pub stop_time: Option<f64>,
    /// Seconds to keep rendering after the song ends; defaults to the window span
    pub extra_time: Option<f64>,
    pub pedal_modifies_background: bool,
    pub pedal_modifies_notelength: bool,
    pub verbose: bool,
}

impl Default for FlowConfig {
    fn default() -> Self {
        FlowConfig {
            frame_rate: 30.0,
            frame_width: 1920,
            frame_height: 1080,
            window_time_span: 5.0,
            note_visibility_half_life: 10.0,
            max_note_width: 12,
            shear_y_points: 5,
            shear_delta_t: 5.0,
            wiggle_period: 2.0,
            wiggle_offset: 0.2,
            wiggle_amplitude: 1.0,
            wiggle_wavelength: 0.1,
            note_acceleration: 1.0,
            flow_shear_scale: 1.0,
            random_seed: None,
            track_to_display: None,
            start_time: 0.0,
            stop_time: None,
            extra_time: None,
            pedal_modifies_background: false,
            pedal_modifies_notelength: false,
            verbose: false,
        }
    }
}

impl FlowConfig {
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: FlowConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        fn positive(name: &str, value: f64) -> Result<()> {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(FlowError::InvalidConfig(format!(
                    "{} must be positive, got {}",
                    name, value
                )))
            }
        }

        positive("frame_rate", self.frame_rate)?;
        positive("frame_width", self.frame_width as f64)?;
        positive("frame_height", self.frame_height as f64)?;
        positive("window_time_span", self.window_time_span)?;
        positive("note_visibility_half_life", self.note_visibility_half_life)?;
        positive("shear_delta_t", self.shear_delta_t)?;
        positive("wiggle_period", self.wiggle_period)?;
        positive("wiggle_wavelength", self.wiggle_wavelength)?;
        if self.shear_y_points < 2 {
            return Err(FlowError::InvalidConfig(format!(
                "shear_y_points must be at least 2, got {}",
                self.shear_y_points
            )));
        }
        if self.start_time < 0.0 || !self.start_time.is_finite() {
            return Err(FlowError::InvalidConfig(format!(
                "start_time must be non-negative, got {}",
                self.start_time
            )));
        }
        if let Some(stop) = self.stop_time {
            if !stop.is_finite() {
                return Err(FlowError::InvalidConfig(format!(
                    "stop_time must be finite, got {}",
                    stop
                )));
            }
        }
        if let Some(extra) = self.extra_time {
            if extra < 0.0 || !extra.is_finite() {
                return Err(FlowError::InvalidConfig(format!(
                    "extra_time must be non-negative, got {}",
                    extra
                )));
            }
        }
        Ok(())
    }

    /// 3840x2160, wider notes and stronger lateral forcing.
    pub fn uhd(mut self) -> Self {
        self.frame_width = 3840;
        self.frame_height = 2160;
        self.max_note_width *= 2;
        self.flow_shear_scale *= 2.0;
        self.wiggle_amplitude *= 2.0;
        self
    }

    /// 640x480, narrower notes and weaker lateral forcing.
    pub fn sd(mut self) -> Self {
        self.frame_width = 640;
        self.frame_height = 480;
        self.max_note_width = (self.max_note_width / 3).max(3);
        self.flow_shear_scale /= 3.0;
        self.wiggle_amplitude /= 3.0;
        self
    }

    pub fn frame_period(&self) -> f64 {
        1.0 / self.frame_rate
    }

    pub fn extra_time(&self) -> f64 {
        self.extra_time.unwrap_or(self.window_time_span)
    }

    /// Where the frame loop stops for a song lasting `max_time` seconds.
    pub fn stop_time_for(&self, max_time: f64) -> f64 {
        match self.stop_time {
            Some(stop) if stop >= 0.0 => stop,
            _ => max_time + self.extra_time(),
        }
    }
}
