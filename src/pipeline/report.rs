// Session report statistics
//
// Computed offline from the events the pipeline classified online; the
// report never re-detects onsets (offline re-detection would produce times
// that do not match the real-time grid). Note statistics come from the
// recorded deviations; metronome statistics come from per-click residuals
// against the fitted grid line, which is more robust than raw inter-click
// intervals when an onset was misclassified.

use crate::analysis::grid::round_to;
use crate::analysis::metronome::MetronomeDetector;

use super::events::{MetronomeStats, NoteEvent, NoteStats};

/// Per-note timing statistics over the session's recorded note events
pub fn note_stats(events: &[NoteEvent], threshold_ms: f64) -> NoteStats {
    let deviations: Vec<f64> = events.iter().map(|e| e.deviation_ms).collect();
    let n = deviations.len();

    let abs_devs: Vec<f64> = deviations.iter().map(|d| d.abs()).collect();
    let worst_idx = abs_devs
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)
        .unwrap_or(0);
    let on_time = abs_devs.iter().filter(|&&d| d <= threshold_ms).count();

    let worst = &events[worst_idx];

    NoteStats {
        total_notes: n,
        mean_absolute_deviation_ms: round_to(mean(&abs_devs), 1),
        mean_signed_deviation_ms: round_to(mean(&deviations), 1),
        std_deviation_ms: round_to(population_std(&deviations), 1),
        median_deviation_ms: round_to(median(&deviations), 1),
        worst_deviation_ms: deviations[worst_idx],
        worst_deviation_position: format!("bar {}, beat {}", worst.bar, worst.beat_position),
        accuracy_percent: round_to(on_time as f64 / n as f64 * 100.0, 1),
    }
}

/// Metronome click consistency: jitter, drift, and overall quality
pub fn metronome_stats(detector: &MetronomeDetector) -> MetronomeStats {
    let click_times = detector.click_times();
    let click_indices = detector.click_indices();
    let (Some(period), Some(reference)) = (detector.period(), detector.reference()) else {
        return MetronomeStats::Insufficient {
            total_clicks: click_times.len(),
            error: "Too few clicks for analysis".into(),
        };
    };
    if click_times.len() < 3 {
        return MetronomeStats::Insufficient {
            total_clicks: click_times.len(),
            error: "Too few clicks for analysis".into(),
        };
    }

    // Per-click deviation from the fitted grid line
    let errors_ms: Vec<f64> = click_times
        .iter()
        .zip(click_indices.iter())
        .map(|(&t, &idx)| (t - (reference + idx as f64 * period)) * 1000.0)
        .collect();
    let abs_errors: Vec<f64> = errors_ms.iter().map(|e| e.abs()).collect();

    // A positive slope means the metronome runs slower than the fitted period
    let drift_ms_per_beat = if click_times.len() >= 4 {
        let indices: Vec<f64> = click_indices.iter().map(|&i| i as f64).collect();
        round_to(linear_slope(&indices, &errors_ms), 2)
    } else {
        0.0
    };

    let n = click_times.len();
    let tight = abs_errors.iter().filter(|&&e| e <= 2.0).count();
    let ok = abs_errors.iter().filter(|&&e| e <= 5.0).count();

    MetronomeStats::Consistency {
        total_clicks: n,
        expected_interval_ms: round_to(period * 1000.0, 1),
        jitter_ms: round_to(population_std(&errors_ms), 2),
        mean_error_ms: round_to(mean(&abs_errors), 2),
        max_error_ms: round_to(abs_errors.iter().cloned().fold(0.0, f64::max), 1),
        drift_ms_per_beat,
        tight_percent: round_to(tight as f64 / n as f64 * 100.0, 1),
        ok_percent: round_to(ok as f64 / n as f64 * 100.0, 1),
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn population_std(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Least-squares slope of y over x; 0 for degenerate inputs
fn linear_slope(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len().min(y.len());
    if n < 2 {
        return 0.0;
    }
    let n_f = n as f64;
    let sum_x: f64 = x[..n].iter().sum();
    let sum_y: f64 = y[..n].iter().sum();
    let sum_xy: f64 = x[..n].iter().zip(y[..n].iter()).map(|(a, b)| a * b).sum();
    let sum_x2: f64 = x[..n].iter().map(|a| a * a).sum();

    let denom = n_f * sum_x2 - sum_x * sum_x;
    if denom.abs() < 1e-12 {
        return 0.0;
    }
    (n_f * sum_xy - sum_x * sum_y) / denom
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::events::NoteKind;

    fn note(time: f64, deviation_ms: f64, bar: i64, beat: f64) -> NoteEvent {
        NoteEvent {
            time_seconds: time,
            nearest_grid_time: time - deviation_ms / 1000.0,
            deviation_ms,
            event_type: NoteKind::Note,
            pitch: None,
            bar,
            beat_position: beat,
        }
    }

    #[test]
    fn test_note_stats_basics() {
        let events = vec![
            note(1.0, 10.0, 1, 1.0),
            note(1.5, -20.0, 1, 2.0),
            note(2.0, 30.0, 1, 3.0),
            note(2.5, -40.0, 1, 4.0),
        ];
        let stats = note_stats(&events, 30.0);

        assert_eq!(stats.total_notes, 4);
        assert!((stats.mean_absolute_deviation_ms - 25.0).abs() < 1e-9);
        assert!((stats.mean_signed_deviation_ms - (-5.0)).abs() < 1e-9);
        assert!((stats.median_deviation_ms - (-5.0)).abs() < 1e-9);
        assert_eq!(stats.worst_deviation_ms, -40.0);
        assert_eq!(stats.worst_deviation_position, "bar 1, beat 4");
        // 3 of 4 within the 30ms threshold
        assert!((stats.accuracy_percent - 75.0).abs() < 1e-9);
    }

    #[test]
    fn test_note_stats_population_std() {
        let events = vec![note(1.0, 10.0, 1, 1.0), note(1.5, -10.0, 1, 2.0)];
        let stats = note_stats(&events, 30.0);
        assert!((stats.std_deviation_ms - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_metronome_stats_require_three_clicks() {
        let mut detector = MetronomeDetector::new();
        detector.add_onset(0.5);
        detector.add_onset(1.0);
        let stats = metronome_stats(&detector);
        match stats {
            MetronomeStats::Insufficient {
                total_clicks,
                error,
            } => {
                assert_eq!(total_clicks, 0);
                assert!(error.contains("Too few clicks"));
            }
            other => panic!("expected Insufficient, got {other:?}"),
        }
    }

    #[test]
    fn test_metronome_stats_perfect_clicks() {
        let mut detector = MetronomeDetector::new();
        for k in 0..4 {
            detector.add_onset(0.5 + 0.5 * k as f64);
        }
        for k in 4..12 {
            assert!(detector.track_onset(0.5 + 0.5 * k as f64));
        }

        match metronome_stats(&detector) {
            MetronomeStats::Consistency {
                total_clicks,
                expected_interval_ms,
                jitter_ms,
                mean_error_ms,
                max_error_ms,
                drift_ms_per_beat,
                tight_percent,
                ok_percent,
            } => {
                assert_eq!(total_clicks, 12);
                assert!((expected_interval_ms - 500.0).abs() < 1.0);
                assert!(jitter_ms < 0.5);
                assert!(mean_error_ms < 0.5);
                assert!(max_error_ms < 1.0);
                assert!(drift_ms_per_beat.abs() < 0.1);
                assert_eq!(tight_percent, 100.0);
                assert_eq!(ok_percent, 100.0);
            }
            other => panic!("expected Consistency, got {other:?}"),
        }
    }

    /// A metronome whose inter-click interval grows 1ms per beat: the
    /// periodic refits absorb the drift, so residuals against the final fit
    /// stay flat while the fitted tempo follows the slowdown.
    #[test]
    fn test_metronome_stats_tracked_drift() {
        let mut detector = MetronomeDetector::new();
        let mut t = 0.5;
        let mut interval = 0.5;
        for _ in 0..20 {
            if detector.locked() {
                assert!(detector.track_onset(t));
            } else {
                detector.add_onset(t);
            }
            t += interval;
            interval += 0.001;
        }

        match metronome_stats(&detector) {
            MetronomeStats::Consistency {
                total_clicks,
                expected_interval_ms,
                drift_ms_per_beat,
                ..
            } => {
                assert_eq!(total_clicks, 20);
                assert!(
                    drift_ms_per_beat.abs() <= 0.3,
                    "refits should flatten the residual drift, got {drift_ms_per_beat}"
                );
                assert!(
                    expected_interval_ms > 505.0,
                    "fitted interval {expected_interval_ms}ms should follow the slowdown"
                );
            }
            other => panic!("expected Consistency, got {other:?}"),
        }
    }
}
