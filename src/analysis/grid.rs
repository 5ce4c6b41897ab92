// Grid alignment and timing deviation scoring
//
// The beat grid is the line reference + k * grid_interval for integer k.
// Played onsets snap to the nearest grid position; the signed distance in
// milliseconds is the player's timing deviation (positive = late). Bar and
// beat coordinates assume 4/4 time.

use serde::{Deserialize, Serialize};

/// Grid subdivision selected at session start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GridResolution {
    #[default]
    #[serde(rename = "8th")]
    Eighth,
    #[serde(rename = "16th")]
    Sixteenth,
}

impl GridResolution {
    /// Grid subdivisions per beat: 2 for 8ths, 4 for 16ths
    pub fn subdivisions_per_beat(self) -> i64 {
        match self {
            GridResolution::Eighth => 2,
            GridResolution::Sixteenth => 4,
        }
    }
}

/// An onset snapped to the grid
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridDeviation {
    /// Signed deviation in milliseconds, rounded to one decimal
    pub deviation_ms: f64,
    /// Time of the nearest grid position in seconds
    pub nearest_grid_time: f64,
    /// Bar number; bar 1 starts at the reference (pre-reference bars are <= 0)
    pub bar: i64,
    /// Beat position inside the bar (1-based, two decimals)
    pub beat_position: f64,
}

/// Beat grid derived from bpm, resolution, and a reference time anchor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridConfig {
    pub bpm: f64,
    pub grid_resolution: GridResolution,
    pub reference_time: f64,
}

impl GridConfig {
    pub fn new(bpm: f64, grid_resolution: GridResolution, reference_time: f64) -> Self {
        Self {
            bpm,
            grid_resolution,
            reference_time,
        }
    }

    /// Duration of one beat in seconds
    pub fn beat_duration(&self) -> f64 {
        60.0 / self.bpm
    }

    /// Spacing of grid positions in seconds
    pub fn grid_interval(&self) -> f64 {
        self.beat_duration() / self.grid_resolution.subdivisions_per_beat() as f64
    }

    /// Snap an onset to the nearest grid position and score its deviation
    pub fn compute_deviation(&self, onset_time: f64) -> GridDeviation {
        let interval = self.grid_interval();
        let relative = onset_time - self.reference_time;
        let grid_index = (relative / interval).round() as i64;
        let nearest_grid_time = self.reference_time + grid_index as f64 * interval;
        let deviation_ms = (onset_time - nearest_grid_time) * 1000.0;

        // Bar and beat position in 4/4; Euclidean division keeps onsets
        // before the reference on a consistent grid (bars <= 0)
        let per_beat = self.grid_resolution.subdivisions_per_beat();
        let per_bar = 4 * per_beat;
        let bar = grid_index.div_euclid(per_bar) + 1;
        let position_in_bar = grid_index.rem_euclid(per_bar);
        let beat_position = 1.0 + position_in_bar as f64 / per_beat as f64;

        GridDeviation {
            deviation_ms: round_to(deviation_ms, 1),
            nearest_grid_time,
            bar,
            beat_position: round_to(beat_position, 2),
        }
    }
}

/// Round to a fixed number of decimals
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}
