//! Seeded grid of lateral accelerations over (time, height).

use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::FlowConfig;
use crate::error::{FlowError, Result};

/// `n_times` x `n_heights` samples, row-major by time. Values grow with the
/// square of the normalized height, so the top of the frame is calm.
#[derive(Debug, Clone, PartialEq)]
pub struct ShearField {
    n_times: usize,
    n_heights: usize,
    values: Vec<f64>,
    max_time: f64,
    frame_height: f64,
}

/// Lower grid index, upper grid index and the fraction between them.
fn bracket(value: f64, n: usize) -> (usize, usize, f64) {
    if n < 2 || !(value > 0.0) {
        return (0, 0, 0.0);
    }
    let lower = value.floor() as usize;
    if lower + 1 >= n {
        return (n - 1, n - 1, 0.0);
    }
    (lower, lower + 1, value - lower as f64)
}

pub fn time_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
}

impl ShearField {
    pub fn new(
        n_times: usize,
        n_heights: usize,
        seed: u64,
        max_time: f64,
        frame_height: f64,
    ) -> Result<Self> {
        if n_times == 0 || n_heights < 2 {
            return Err(FlowError::InvalidConfig(format!(
                "shear grid needs at least 1x2 points, got {}x{}",
                n_times, n_heights
            )));
        }
        let len = n_times
            .checked_mul(n_heights)
            .ok_or(FlowError::OutOfMemory)?;
        let mut values = Vec::new();
        values.try_reserve_exact(len)?;

        let mut rng = StdRng::seed_from_u64(seed);
        for _ in 0..n_times {
            for yi in 0..n_heights {
                let r: f64 = rng.gen_range(-1.0..=1.0);
                let y_frac = yi as f64 / (n_heights - 1) as f64;
                values.push(r * y_frac * y_frac);
            }
        }

        Ok(ShearField {
            n_times,
            n_heights,
            values,
            max_time,
            frame_height,
        })
    }

    /// One time bucket per `shear_delta_t` seconds of song.
    pub fn from_config(config: &FlowConfig, max_time: f64) -> Result<Self> {
        let n_times = (max_time / config.shear_delta_t).floor().max(0.0) as usize + 1;
        let seed = match config.random_seed {
            Some(seed) => seed,
            None => {
                let seed = time_seed();
                warn!("no random seed given, using {}; output will not be reproducible", seed);
                seed
            }
        };
        debug!(
            "shear grid {}x{} for {:.2}s, seed {}",
            n_times, config.shear_y_points, max_time, seed
        );
        ShearField::new(
            n_times,
            config.shear_y_points,
            seed,
            max_time,
            config.frame_height as f64,
        )
    }

    pub fn value(&self, time_index: usize, height_index: usize) -> f64 {
        self.values[time_index * self.n_heights + height_index]
    }

    /// Lateral acceleration at pixel height `y` and song time `t`, clamped
    /// to the edge of the grid.
    pub fn acceleration(&self, y: f64, t: f64) -> f64 {
        let y_val = y / self.frame_height * (self.n_heights - 1) as f64;
        let t_val = if self.max_time > 0.0 {
            t / self.max_time * (self.n_times - 1) as f64
        } else {
            0.0
        };
        let (y0, y1, fy) = bracket(y_val, self.n_heights);
        let (t0, t1, ft) = bracket(t_val, self.n_times);

        let lower = self.value(t0, y0) + ft * (self.value(t1, y0) - self.value(t0, y0));
        let upper = self.value(t0, y1) + ft * (self.value(t1, y1) - self.value(t0, y1));
        lower + fy * (upper - lower)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_grid() {
        let a = ShearField::new(4, 5, 42, 20.0, 1080.0).unwrap();
        let b = ShearField::new(4, 5, 42, 20.0, 1080.0).unwrap();
        assert_eq!(a, b);
        let c = ShearField::new(4, 5, 43, 20.0, 1080.0).unwrap();
        assert_ne!(a.values, c.values);
    }

    #[test]
    fn top_row_is_zero_and_values_bounded() {
        let field = ShearField::new(6, 5, 1, 30.0, 1000.0).unwrap();
        for ti in 0..6 {
            assert_eq!(field.value(ti, 0), 0.0);
            for yi in 0..5 {
                let bound = (yi as f64 / 4.0).powi(2);
                assert!(field.value(ti, yi).abs() <= bound);
            }
        }
    }

    #[test]
    fn interpolation_hits_grid_points() {
        let field = ShearField::new(3, 5, 9, 10.0, 400.0).unwrap();
        // height 300 is grid row 3, time 5 is grid column 1
        assert!((field.acceleration(300.0, 5.0) - field.value(1, 3)).abs() < 1e-12);
        let mid = field.acceleration(250.0, 5.0);
        let expected = 0.5 * (field.value(1, 2) + field.value(1, 3));
        assert!((mid - expected).abs() < 1e-12);
    }

    #[test]
    fn out_of_range_clamps_to_edges() {
        let field = ShearField::new(3, 5, 9, 10.0, 400.0).unwrap();
        assert_eq!(field.acceleration(-50.0, -1.0), field.value(0, 0));
        assert_eq!(field.acceleration(4000.0, 99.0), field.value(2, 4));
    }

    #[test]
    fn zero_length_song_uses_first_column() {
        let field = ShearField::new(1, 3, 5, 0.0, 100.0).unwrap();
        assert_eq!(field.acceleration(100.0, 3.0), field.value(0, 2));
    }

    #[test]
    fn single_height_point_is_rejected() {
        assert!(ShearField::new(2, 1, 0, 1.0, 1.0).is_err());
    }
}
