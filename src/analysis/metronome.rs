// MetronomeDetector - blind tempo discovery and click tracking
//
// Accepts ALL onsets (clicks and played notes alike) and finds the dominant
// periodic pattern, which is the metronome. Two phases with no shared
// invariants, modeled as a tagged variant:
//
// - Unlocked: periodicity search over a sliding 6-second onset window. Every
//   onset pair at every divisor 1-4 proposes a candidate period; the
//   candidate aligning the most onsets (within 25 ms) wins. Four aligned
//   onsets lock the grid.
// - Locked: each onset is tested against the grid with a tolerance of
//   min(25% of the period, 50 ms). Accepted clicks accumulate, and every
//   4 clicks the grid is refit by ordinary least squares over the full
//   click history, which keeps the grid from drifting.

/// Aligned onsets required to lock
const MIN_PERIODIC_ONSETS: usize = 4;

/// Alignment tolerance for the periodicity search (25 ms)
const TOLERANCE_S: f64 = 0.025;

/// Shortest accepted period (240 BPM)
const MIN_PERIOD_S: f64 = 0.25;

/// Longest accepted period (40 BPM)
const MAX_PERIOD_S: f64 = 1.5;

/// Pre-lock search looks at the last 6 seconds of onsets
const WINDOW_S: f64 = 6.0;

/// Refit the grid every N accepted clicks
const REFIT_INTERVAL: u32 = 4;

/// Stop searching once a candidate aligns this many onsets
const EARLY_EXIT_ALIGNED: usize = 6;

/// Locked-grid payload: the fitted line plus the click history behind it
#[derive(Debug, Clone)]
pub struct LockedGrid {
    period_s: f64,
    reference_s: f64,
    bpm: f64,
    click_times: Vec<f64>,
    click_indices: Vec<i64>,
    clicks_since_refit: u32,
}

/// Detector phase
#[derive(Debug, Clone)]
enum MetronomeState {
    Unlocked {
        onsets: Vec<f64>,
        best_periodic_count: usize,
    },
    Locked(LockedGrid),
}

/// Metronome detector over a stream of onset times
#[derive(Debug, Clone)]
pub struct MetronomeDetector {
    state: MetronomeState,
    total_onsets: usize,
    /// Edge signal: set when a refit was accepted, cleared by take_grid_updated
    grid_updated: bool,
}

impl Default for MetronomeDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetronomeDetector {
    pub fn new() -> Self {
        Self {
            state: MetronomeState::Unlocked {
                onsets: Vec::new(),
                best_periodic_count: 0,
            },
            total_onsets: 0,
            grid_updated: false,
        }
    }

    /// Pre-lock: feed any onset time. Returns true if the grid just locked.
    pub fn add_onset(&mut self, time_seconds: f64) -> bool {
        self.total_onsets += 1;

        let MetronomeState::Unlocked { onsets, .. } = &mut self.state else {
            return false;
        };
        onsets.push(time_seconds);

        self.try_lock()
    }

    /// Search recent onsets for a periodic subset and lock on success
    fn try_lock(&mut self) -> bool {
        let MetronomeState::Unlocked {
            onsets,
            best_periodic_count,
        } = &mut self.state
        else {
            return false;
        };

        let Some(&latest) = onsets.last() else {
            return false;
        };
        let cutoff = latest - WINDOW_S;
        let times: Vec<f64> = onsets.iter().copied().filter(|&t| t >= cutoff).collect();
        if times.len() < 2 {
            return false;
        }

        let mut best_period: Option<f64> = None;
        let mut best_aligned: Vec<f64> = Vec::new();

        for i in 0..times.len() {
            for j in (i + 1)..times.len() {
                let raw_interval = times[j] - times[i];

                for divisor in 1..=4u32 {
                    let period = raw_interval / divisor as f64;
                    if !(MIN_PERIOD_S..=MAX_PERIOD_S).contains(&period) {
                        continue;
                    }

                    let aligned: Vec<f64> = times
                        .iter()
                        .copied()
                        .filter(|&t| {
                            let offset = (t - times[i]) / period;
                            let error_s = (offset - offset.round()).abs() * period;
                            error_s <= TOLERANCE_S
                        })
                        .collect();

                    if aligned.len() > best_aligned.len() {
                        best_aligned = aligned;
                        best_period = Some(period);
                    }
                }
            }
            if best_aligned.len() >= EARLY_EXIT_ALIGNED {
                break;
            }
        }

        *best_periodic_count = best_aligned.len();

        if let Some(period) = best_period {
            log::debug!(
                "[MetronomeDetector] search: {} onsets in window, best_periodic={}, period={:.0}ms ({:.0} BPM), need {}",
                times.len(),
                best_aligned.len(),
                period * 1000.0,
                60.0 / period,
                MIN_PERIODIC_ONSETS
            );
        }

        if best_aligned.len() < MIN_PERIODIC_ONSETS {
            return false;
        }
        let Some(candidate_period) = best_period else {
            return false;
        };

        let mut click_times = best_aligned;
        click_times.sort_by(f64::total_cmp);
        let base = click_times[0];
        let click_indices: Vec<i64> = click_times
            .iter()
            .map(|&t| ((t - base) / candidate_period).round() as i64)
            .collect();

        // Initial least-squares estimate; fall back to the raw candidate if
        // the fit leaves the valid period range
        let (period_s, reference_s) = fit_grid(&click_indices, &click_times)
            .filter(|&(p, _)| (MIN_PERIOD_S..=MAX_PERIOD_S).contains(&p))
            .unwrap_or((candidate_period, base));

        let grid = LockedGrid {
            period_s,
            reference_s,
            bpm: 60.0 / period_s,
            click_times,
            click_indices,
            clicks_since_refit: 0,
        };

        log::info!(
            "[MetronomeDetector] LOCKED: bpm={:.1}, period={:.2}ms, clicks={}, ref={:.3}s",
            grid.bpm,
            grid.period_s * 1000.0,
            grid.click_times.len(),
            grid.reference_s
        );

        self.state = MetronomeState::Locked(grid);
        true
    }

    /// Post-lock: test whether an onset is a metronome click and record it
    ///
    /// A click must land within min(25% of the period, 50 ms) of a grid line
    /// and at least half a period after the previous click (a played note
    /// sitting next to a grid line must not be double-counted as a click).
    /// Every 4 accepted clicks the grid is refit over the full history.
    pub fn track_onset(&mut self, onset_time: f64) -> bool {
        let MetronomeState::Locked(grid) = &mut self.state else {
            return false;
        };

        let offset = (onset_time - grid.reference_s) / grid.period_s;
        let nearest = offset.round();
        let error_ms = (offset - nearest).abs() * grid.period_s * 1000.0;

        let tolerance_ms = (grid.period_s * 250.0).min(50.0);
        if error_ms > tolerance_ms {
            return false;
        }

        if let Some(&last) = grid.click_times.last() {
            if onset_time - last < grid.period_s * 0.5 {
                return false;
            }
        }

        grid.click_times.push(onset_time);
        grid.click_indices.push(nearest as i64);
        grid.clicks_since_refit += 1;

        if grid.clicks_since_refit >= REFIT_INTERVAL {
            grid.clicks_since_refit = 0;
            if let Some((period, reference)) = fit_grid(&grid.click_indices, &grid.click_times)
                .filter(|&(p, _)| (MIN_PERIOD_S..=MAX_PERIOD_S).contains(&p))
            {
                let old_period = grid.period_s;
                grid.period_s = period;
                grid.reference_s = reference;
                grid.bpm = 60.0 / period;
                self.grid_updated = true;
                log::debug!(
                    "[MetronomeDetector] REFIT: period {:.2}ms -> {:.2}ms, bpm={:.1}, clicks={}",
                    old_period * 1000.0,
                    period * 1000.0,
                    grid.bpm,
                    grid.click_times.len()
                );
            }
        }

        true
    }

    /// Remove the most recently tracked click (spectral override undo)
    pub fn untrack_last_click(&mut self) {
        if let MetronomeState::Locked(grid) = &mut self.state {
            grid.click_times.pop();
            grid.click_indices.pop();
            grid.clicks_since_refit = grid.clicks_since_refit.saturating_sub(1);
        }
    }

    /// True once the grid has locked
    pub fn locked(&self) -> bool {
        matches!(self.state, MetronomeState::Locked(_))
    }

    pub fn bpm(&self) -> Option<f64> {
        match &self.state {
            MetronomeState::Locked(grid) => Some(grid.bpm),
            MetronomeState::Unlocked { .. } => None,
        }
    }

    pub fn period(&self) -> Option<f64> {
        match &self.state {
            MetronomeState::Locked(grid) => Some(grid.period_s),
            MetronomeState::Unlocked { .. } => None,
        }
    }

    pub fn reference(&self) -> Option<f64> {
        match &self.state {
            MetronomeState::Locked(grid) => Some(grid.reference_s),
            MetronomeState::Unlocked { .. } => None,
        }
    }

    /// Onsets fed to add_onset so far
    pub fn total_onsets(&self) -> usize {
        self.total_onsets
    }

    /// Progress counter: best periodic count pre-lock, click total post-lock
    pub fn click_count(&self) -> usize {
        match &self.state {
            MetronomeState::Unlocked {
                best_periodic_count,
                ..
            } => *best_periodic_count,
            MetronomeState::Locked(grid) => grid.click_times.len(),
        }
    }

    /// Recorded click times (empty before lock)
    pub fn click_times(&self) -> &[f64] {
        match &self.state {
            MetronomeState::Locked(grid) => &grid.click_times,
            MetronomeState::Unlocked { .. } => &[],
        }
    }

    /// Beat indices matching click_times (empty before lock)
    pub fn click_indices(&self) -> &[i64] {
        match &self.state {
            MetronomeState::Locked(grid) => &grid.click_indices,
            MetronomeState::Unlocked { .. } => &[],
        }
    }

    /// Consume the refit edge signal
    pub fn take_grid_updated(&mut self) -> bool {
        std::mem::take(&mut self.grid_updated)
    }
}

/// Ordinary least squares for time = reference + index * period
///
/// Returns None with fewer than two clicks or a degenerate index spread.
fn fit_grid(indices: &[i64], times: &[f64]) -> Option<(f64, f64)> {
    let n = indices.len();
    if n < 2 || n != times.len() {
        return None;
    }

    let n_f = n as f64;
    let mut sum_x = 0.0;
    let mut sum_y = 0.0;
    let mut sum_xy = 0.0;
    let mut sum_x2 = 0.0;
    for (&idx, &t) in indices.iter().zip(times.iter()) {
        let x = idx as f64;
        sum_x += x;
        sum_y += t;
        sum_xy += x * t;
        sum_x2 += x * x;
    }

    let denom = n_f * sum_x2 - sum_x * sum_x;
    if denom.abs() < 1e-12 {
        return None;
    }

    let period = (n_f * sum_xy - sum_x * sum_y) / denom;
    let reference = (sum_y - period * sum_x) / n_f;
    Some((period, reference))
}
