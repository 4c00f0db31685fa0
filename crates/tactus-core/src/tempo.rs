//! The tempo map: a piecewise mapping between score time and beats.
//!
//! Scores place events in seconds; `time_to_beat` and `beat_to_time`
//! translate against a map of `(time, tempo)` breakpoints. Between
//! breakpoints the tempo-over-basis ratio changes with constant
//! acceleration, so a segment from tempo 60 to tempo 120 glides rather than
//! stepping. With no map installed both conversions are the identity.
//!
//! Beat positions at each breakpoint and per-segment accelerations are
//! precomputed when the map is installed; conversions are then a segment
//! search plus closed-form evaluation.

use thiserror::Error;

/// Maximum number of breakpoints in one map.
pub const TEMPO_POINTS_MAX: usize = 48;

/// Default reference beat: tempo 60 maps to ratio 1.0.
pub const DEFAULT_BASIS: f64 = 60.0;

/// Errors from tempo-map construction.
#[derive(Debug, Error, PartialEq)]
pub enum TempoError {
    /// A breakpoint carried tempo 0 (or below).
    #[error("tempo must be positive, got {0}")]
    NonPositiveTempo(f64),

    /// Breakpoint times must be nondecreasing.
    #[error("breakpoint times must be nondecreasing ({prev} then {next})")]
    NonMonotonic {
        /// Time of the earlier breakpoint.
        prev: f64,
        /// The offending later time.
        next: f64,
    },

    /// More breakpoints than [`TEMPO_POINTS_MAX`].
    #[error("too many tempo breakpoints ({0}, maximum {TEMPO_POINTS_MAX})")]
    TooManyPoints(usize),

    /// The basis must be a positive beat value.
    #[error("tempo basis must be positive, got {0}")]
    NonPositiveBasis(f64),
}

/// One precomputed breakpoint.
#[derive(Debug, Clone, Copy)]
struct TempoPoint {
    /// Score time in seconds.
    time: f64,
    /// Tempo over basis at this point.
    ratio: f64,
    /// Beat position at this point.
    beat: f64,
    /// Acceleration toward the next point (0 for the last segment).
    accel: f64,
}

/// Piecewise constant-acceleration tempo map.
#[derive(Debug, Clone)]
pub struct TempoMap {
    basis: f64,
    points: Vec<TempoPoint>,
}

impl Default for TempoMap {
    fn default() -> Self {
        Self::new()
    }
}

/// Beats accumulated over `dt` seconds starting at ratio `t` with
/// acceleration `a`.
fn segment_beats(dt: f64, t: f64, a: f64) -> f64 {
    if a == 0.0 {
        dt * t
    } else {
        ((t * t + 2.0 * a * dt).max(0.0).sqrt() - t) / a
    }
}

/// Seconds spanned by `db` beats starting at ratio `t` with acceleration
/// `a`. Exact inverse of [`segment_beats`].
fn segment_time(db: f64, t: f64, a: f64) -> f64 {
    if a == 0.0 { db / t } else { db * t + a * db * db / 2.0 }
}

impl TempoMap {
    /// Creates an empty (identity) map with the default basis.
    pub fn new() -> Self {
        Self {
            basis: DEFAULT_BASIS,
            points: Vec::new(),
        }
    }

    /// Sets the reference beat value used by subsequent
    /// [`set_map`](Self::set_map) calls.
    pub fn set_basis(&mut self, basis: f64) -> Result<(), TempoError> {
        if basis <= 0.0 {
            return Err(TempoError::NonPositiveBasis(basis));
        }
        self.basis = basis;
        Ok(())
    }

    /// The current basis.
    pub fn basis(&self) -> f64 {
        self.basis
    }

    /// Installs a map from `(time, tempo)` breakpoints, precomputing beat
    /// positions and segment accelerations. An empty slice clears the map.
    pub fn set_map(&mut self, breakpoints: &[(f64, f64)]) -> Result<(), TempoError> {
        if breakpoints.is_empty() {
            self.points.clear();
            return Ok(());
        }
        if breakpoints.len() > TEMPO_POINTS_MAX {
            return Err(TempoError::TooManyPoints(breakpoints.len()));
        }
        for window in breakpoints.windows(2) {
            if window[1].0 < window[0].0 {
                return Err(TempoError::NonMonotonic {
                    prev: window[0].0,
                    next: window[1].0,
                });
            }
        }
        if let Some(&(_, tempo)) = breakpoints.iter().find(|&&(_, tempo)| tempo <= 0.0) {
            return Err(TempoError::NonPositiveTempo(tempo));
        }

        let mut points: Vec<TempoPoint> = breakpoints
            .iter()
            .map(|&(time, tempo)| TempoPoint {
                time,
                ratio: tempo / self.basis,
                beat: 0.0,
                accel: 0.0,
            })
            .collect();

        // Constant tempo from time zero up to the first breakpoint.
        points[0].beat = points[0].time * points[0].ratio;

        for m in 0..points.len() - 1 {
            let dt = points[m + 1].time - points[m].time;
            let (t0, t1) = (points[m].ratio, points[m + 1].ratio);
            points[m].accel = if dt == 0.0 {
                0.0
            } else {
                (t1 * t1 - t0 * t0) / (2.0 * dt)
            };
            points[m + 1].beat = points[m].beat + segment_beats(dt, t0, points[m].accel);
        }

        self.points = points;
        Ok(())
    }

    /// Clears the map; conversions become the identity.
    pub fn clear(&mut self) {
        self.points.clear();
    }

    /// True when no map is installed.
    pub fn is_identity(&self) -> bool {
        self.points.is_empty()
    }

    /// Beats at score time `time` (seconds).
    pub fn time_to_beat(&self, time: f64) -> f64 {
        let Some(first) = self.points.first() else {
            return time;
        };
        if time < first.time {
            return time * first.ratio;
        }
        // Last breakpoint at or before `time`; extrapolation past the final
        // point holds its tempo.
        let m = self
            .points
            .iter()
            .rposition(|p| p.time <= time)
            .expect("time >= first.time");
        let p = self.points[m];
        let accel = if m + 1 < self.points.len() { p.accel } else { 0.0 };
        p.beat + segment_beats(time - p.time, p.ratio, accel)
    }

    /// Score time (seconds) at beat position `beat`. Inverse of
    /// [`time_to_beat`](Self::time_to_beat).
    pub fn beat_to_time(&self, beat: f64) -> f64 {
        let Some(first) = self.points.first() else {
            return beat;
        };
        if beat < first.beat {
            return beat / first.ratio;
        }
        let m = self
            .points
            .iter()
            .rposition(|p| p.beat <= beat)
            .expect("beat >= first.beat");
        let p = self.points[m];
        let accel = if m + 1 < self.points.len() { p.accel } else { 0.0 };
        p.time + segment_time(beat - p.beat, p.ratio, accel)
    }
}
