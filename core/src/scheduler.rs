//! Multi-rate epoch scheduler and fusion driver.
//!
//! The two sensor streams arrive at very different rates (GPS around 1 Hz, the
//! accelerometer an order of magnitude faster) and their timestamps never line
//! up exactly. The [`Scheduler`] merges the streams into a single time-ordered
//! sequence of epochs: a *combined* epoch when a fix and a sample fall within
//! the match tolerance of each other, a *predict-only* epoch when only a sample
//! is available. [`Fusion`] drives a [`PlanarKalmanFilter`] through that
//! sequence and accumulates the estimates into a [`FusionResult`].
//!
//! Scheduling rules:
//! - The accelerometer is the control stream; every emitted epoch consumes
//!   exactly one sample, and the run ends when the samples run out.
//! - A GPS fix older than the current sample by more than the tolerance is
//!   stale and is dropped without producing an epoch.
//! - The prediction interval `dt` is the smaller of the two streams' elapsed
//!   times since the previous epoch, floored at zero.
//! - Heading comes from the GPS fix on combined epochs; between fixes it is
//!   re-estimated from the filter's own displacement when there is one.

use log::{debug, info, warn};
use nalgebra::{Vector2, Vector4};
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use crate::earth::{self, UtmZone};
use crate::kalman::PlanarKalmanFilter;
use crate::messages::FusionConfig;
use crate::{estimate_heading, rotate_to_nav, FusionError, GpsFix, ImuSample};

/// Timestamp reported by a stream whose cursor has run off the end. Any real
/// timestamp compares smaller, so an exhausted stream never wins a merge.
const TIME_SENTINEL: f64 = f64::INFINITY;

/// How an epoch drives the filter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EpochKind {
    /// Accelerometer sample only; predict without a measurement update.
    PredictOnly,
    /// Time-matched fix and sample; predict, then update with the fix position.
    Combined,
}

impl std::fmt::Display for EpochKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EpochKind::PredictOnly => write!(f, "predict"),
            EpochKind::Combined => write!(f, "combined"),
        }
    }
}

/// One merged step of the two streams, ready to drive the filter.
#[derive(Clone, Copy, Debug)]
pub struct Epoch {
    pub kind: EpochKind,
    /// Timestamp of the consumed accelerometer sample, seconds
    pub time: f64,
    /// Prediction interval in seconds
    pub dt: f64,
    /// Navigation-frame acceleration `[east, north]` for the predict step
    pub control_input: Vector2<f64>,
    /// Planar position measurement `[easting, northing]`, combined epochs only
    pub measurement: Option<Vector2<f64>>,
}

/// Read position over a stream, with a flag that goes false at the end.
#[derive(Debug)]
struct StreamCursor {
    index: usize,
    len: usize,
    active: bool,
}

impl StreamCursor {
    fn new(len: usize) -> Self {
        StreamCursor {
            index: 0,
            len,
            active: len > 0,
        }
    }

    fn advance(&mut self, name: &'static str) -> Result<(), FusionError> {
        if !self.active {
            return Err(FusionError::SequenceExhausted(name));
        }
        self.index += 1;
        if self.index >= self.len {
            self.active = false;
        }
        Ok(())
    }

    fn remaining(&self) -> usize {
        self.len - self.index
    }
}

/// Merges the GPS and accelerometer streams into epochs.
///
/// Construction converts every fix into the planar frame of the first fix's
/// UTM zone, so the merge loop itself is pure time bookkeeping.
#[derive(Debug)]
pub struct Scheduler {
    gps_times: Vec<f64>,
    gps_positions: Vec<Vector2<f64>>,
    gps_headings: Vec<f64>,
    samples: Vec<ImuSample>,
    zone: UtmZone,
    first_fix_speed: f64,
    gps_cursor: StreamCursor,
    imu_cursor: StreamCursor,
    /// Time of the most recent epoch, the reference for the next dt
    last_epoch_time: f64,
    /// Most recent heading in degrees, used on epochs without a fix
    heading: f64,
    tolerance: f64,
}

impl Scheduler {
    /// Build a scheduler over two time-ordered streams sharing one clock.
    ///
    /// The first fix fixes the UTM zone for the whole run; a fix whose own zone
    /// is not adjacent to it is a conversion error.
    pub fn new(
        fixes: &[GpsFix],
        samples: &[ImuSample],
        config: &FusionConfig,
    ) -> Result<Self, FusionError> {
        let first = fixes.first().ok_or_else(|| {
            FusionError::Conversion("cannot initialize from an empty GPS stream".to_string())
        })?;
        let (easting, northing, zone) = earth::to_utm(first.latitude, first.longitude)?;
        info!(
            "fusing {} GPS fixes and {} IMU samples in UTM zone {}",
            fixes.len(),
            samples.len(),
            zone
        );

        let mut gps_positions = Vec::with_capacity(fixes.len());
        gps_positions.push(Vector2::new(easting, northing));
        for fix in &fixes[1..] {
            let (e, n) = earth::to_utm_in_zone(fix.latitude, fix.longitude, zone)?;
            gps_positions.push(Vector2::new(e, n));
        }

        let start = match samples.first() {
            Some(s) => first.elapsed.min(s.elapsed),
            None => first.elapsed,
        };
        Ok(Scheduler {
            gps_times: fixes.iter().map(|f| f.elapsed).collect(),
            gps_positions,
            gps_headings: fixes.iter().map(|f| f.heading).collect(),
            samples: samples.to_vec(),
            zone,
            first_fix_speed: first.speed,
            gps_cursor: StreamCursor::new(fixes.len()),
            imu_cursor: StreamCursor::new(samples.len()),
            last_epoch_time: start,
            heading: first.heading,
            tolerance: config.epoch_match_tolerance,
        })
    }

    /// UTM zone the whole run is expressed in.
    pub fn zone(&self) -> UtmZone {
        self.zone
    }

    /// Initial filter state from the first fix: its planar position, and its
    /// speed-along-heading resolved into east/north velocity components.
    pub fn initial_state(&self) -> Vector4<f64> {
        let position = self.gps_positions[0];
        let velocity = rotate_to_nav(self.first_fix_speed, 0.0, self.gps_headings[0]);
        Vector4::new(position[0], velocity[0], position[1], velocity[1])
    }

    fn gps_time(&self) -> f64 {
        if self.gps_cursor.active {
            self.gps_times[self.gps_cursor.index]
        } else {
            TIME_SENTINEL
        }
    }

    /// Fold a planar displacement into the running heading. No displacement
    /// leaves the heading unchanged.
    pub fn refresh_heading(&mut self, d_east: f64, d_north: f64) {
        if let Some(heading) = estimate_heading(d_east, d_north) {
            self.heading = heading;
        }
    }

    /// Produce the next epoch, or `None` when the accelerometer stream is
    /// exhausted. Stale fixes are consumed and dropped along the way.
    pub fn advance(&mut self) -> Result<Option<Epoch>, FusionError> {
        loop {
            if !self.imu_cursor.active {
                let leftover = self.gps_cursor.remaining();
                if leftover > 0 {
                    warn!(
                        "accelerometer stream ended with {} GPS fixes unconsumed",
                        leftover
                    );
                }
                return Ok(None);
            }
            let sample = self.samples[self.imu_cursor.index];
            let gps_time = self.gps_time();

            if gps_time < sample.elapsed - self.tolerance {
                debug!(
                    "dropping stale GPS fix at t={:.3} s (next sample at t={:.3} s)",
                    gps_time, sample.elapsed
                );
                self.gps_cursor.advance("gps")?;
                continue;
            }

            let combined = (gps_time - sample.elapsed).abs() < self.tolerance;
            let (kind, measurement) = if combined {
                self.heading = self.gps_headings[self.gps_cursor.index];
                (
                    EpochKind::Combined,
                    Some(self.gps_positions[self.gps_cursor.index]),
                )
            } else {
                (EpochKind::PredictOnly, None)
            };
            let control_input =
                rotate_to_nav(sample.accel_forward, sample.accel_lateral, self.heading);
            let dt_imu = sample.elapsed - self.last_epoch_time;
            let dt_gps = gps_time - self.last_epoch_time;
            let dt = dt_imu.min(dt_gps).max(0.0);

            if combined {
                self.gps_cursor.advance("gps")?;
            }
            self.imu_cursor.advance("imu")?;
            self.last_epoch_time = sample.elapsed;

            return Ok(Some(Epoch {
                kind,
                time: sample.elapsed,
                dt,
                control_input,
                measurement,
            }));
        }
    }
}

/// The fused track: one state per epoch, plus the frame it lives in.
///
/// States are the raw filter estimates `[easting, easting_vel, northing,
/// northing_vel]`. On an aborted run the entries appended so far remain valid.
#[derive(Debug, Clone)]
pub struct FusionResult {
    pub times: Vec<f64>,
    pub states: Vec<Vector4<f64>>,
    pub kinds: Vec<EpochKind>,
    pub zone: UtmZone,
}

impl FusionResult {
    pub fn new(zone: UtmZone) -> Self {
        FusionResult {
            times: Vec::new(),
            states: Vec::new(),
            kinds: Vec::new(),
            zone,
        }
    }

    pub fn push(&mut self, time: f64, state: Vector4<f64>, kind: EpochKind) {
        self.times.push(time);
        self.states.push(state);
        self.kinds.push(kind);
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Number of epochs that carried a measurement update.
    pub fn combined_epochs(&self) -> usize {
        self.kinds
            .iter()
            .filter(|k| **k == EpochKind::Combined)
            .count()
    }

    /// Write the track to CSV with both planar and geodetic coordinates.
    pub fn to_csv<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let mut file = File::create(path)?;
        writeln!(
            file,
            "time_s,easting_m,northing_m,vel_e_mps,vel_n_mps,lat_deg,lon_deg,epoch"
        )?;
        for ((time, state), kind) in self.times.iter().zip(&self.states).zip(&self.kinds) {
            let (lat, lon) =
                earth::to_wgs84(state[0], state[2], self.zone).map_err(io::Error::other)?;
            writeln!(
                file,
                "{:.3},{:.3},{:.3},{:.4},{:.4},{:.8},{:.8},{}",
                time, state[0], state[2], state[1], state[3], lat, lon, kind
            )?;
        }
        Ok(())
    }
}

/// A full fusion run: scheduler, filter, and the track built so far.
///
/// [`run_fusion`] is the one-shot entry point; owning a `Fusion` directly keeps
/// the partial [`FusionResult`] reachable when a step fails mid-run.
#[derive(Debug)]
pub struct Fusion {
    scheduler: Scheduler,
    filter: PlanarKalmanFilter,
    pub result: FusionResult,
}

impl Fusion {
    pub fn new(
        fixes: &[GpsFix],
        samples: &[ImuSample],
        config: &FusionConfig,
    ) -> Result<Self, FusionError> {
        let scheduler = Scheduler::new(fixes, samples, config)?;
        let filter = PlanarKalmanFilter::new(
            scheduler.initial_state(),
            config.initial_covariance_scale,
            config.position_uncertainty,
        );
        let result = FusionResult::new(scheduler.zone());
        Ok(Fusion {
            scheduler,
            filter,
            result,
        })
    }

    /// Process one epoch. Returns `false` once the streams are exhausted.
    pub fn step(&mut self) -> Result<bool, FusionError> {
        let epoch = match self.scheduler.advance()? {
            Some(epoch) => epoch,
            None => return Ok(false),
        };
        let before = self.filter.get_estimate();
        self.filter.predict(&epoch.control_input, epoch.dt);
        if let Some(measurement) = epoch.measurement {
            self.filter.update(&measurement)?;
        }
        let after = self.filter.get_estimate();
        self.scheduler
            .refresh_heading(after[0] - before[0], after[2] - before[2]);
        self.result.push(epoch.time, after, epoch.kind);
        Ok(true)
    }

    /// Run to the end of the streams.
    pub fn run(&mut self) -> Result<(), FusionError> {
        while self.step()? {}
        info!(
            "fusion complete: {} epochs ({} with GPS updates)",
            self.result.len(),
            self.result.combined_epochs()
        );
        Ok(())
    }

    pub fn filter(&self) -> &PlanarKalmanFilter {
        &self.filter
    }
}

/// Fuse two time-ordered sensor streams into a planar track.
pub fn run_fusion(
    fixes: &[GpsFix],
    samples: &[ImuSample],
    config: &FusionConfig,
) -> Result<FusionResult, FusionError> {
    let mut fusion = Fusion::new(fixes, samples, config)?;
    fusion.run()?;
    Ok(fusion.result)
}
