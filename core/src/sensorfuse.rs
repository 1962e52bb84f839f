//! Multi-rate GPS/IMU fusion toolbox for planar navigation
//!
//! This crate fuses two asynchronous, differently-rated sensor streams — low-rate
//! absolute GPS fixes (geodetic position, heading, speed) and high-rate body-frame
//! accelerometer samples — into a single, continuously updated estimate of planar
//! position and velocity. The filter state is the 4-vector
//! (easting, easting-velocity, northing, northing-velocity) in a local UTM frame,
//! with a 4x4 covariance tracking estimate uncertainty.
//!
//! The crate is primarily built off of three additional dependencies:
//! - [`nalgebra`](https://crates.io/crates/nalgebra): statically-sized linear algebra
//!   for the filter matrices. All filter shapes (4x4, 4x2, 2x4, 2x2) are checked at
//!   compile time.
//! - [`nav-types`](https://crates.io/crates/nav-types): WGS84 point types and
//!   straight-line distances, used to verify the planar projection in meters.
//! - [`serde`](https://crates.io/crates/serde) / [`csv`](https://crates.io/crates/csv):
//!   ingestion of the recorded sensor streams and export of the fused track.
//!
//! ## Crate overview
//!
//! - [earth]: WGS84 constants and the geodetic <-> UTM planar transform the filter
//!   operates in.
//! - [kalman]: the linear constant-acceleration Kalman filter (predict and
//!   Joseph-form update recurrences).
//! - [scheduler]: the multi-rate epoch scheduler that merges the two time-ordered
//!   streams, classifies each epoch, and drives the filter.
//! - [messages]: CSV record types for the sensor streams and the run configuration.
//! - [sim]: synthetic scenario generation for tests and demos.
//!
//! This root module holds the pieces shared by all of the above: the sensor sample
//! types, the body-to-navigation-frame acceleration rotation, the
//! displacement-based heading estimator, and the crate error type.
//!
//! ## Frames and conventions
//!
//! The navigation frame is the local planar east/north frame produced by the UTM
//! projection; the body frame is the sensor's own forward/lateral/vertical frame.
//! Headings are degrees clockwise from north in [0, 360). The body-to-navigation
//! rotation for a heading $h$ is
//!
//! $$
//! \begin{aligned}
//! a_N &= a_F \cos h + a_L \sin(h + 180°) \\\\
//! a_E &= a_F \sin h + a_L \cos h
//! \end{aligned}
//! $$
//!
//! where $a_F$ and $a_L$ are the forward and lateral body accelerations. The
//! vertical component is never used; the filter is strictly planar.

pub mod earth;
pub mod kalman;
pub mod messages;
pub mod scheduler;
pub mod sim;

use std::fmt::{self, Display};

use nalgebra::Vector2;

/// Errors raised by the fusion core.
///
/// None of these are transient: each indicates invalid input or configuration and
/// aborts the run. Partial results appended to the result sequence before the
/// failure remain available for diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub enum FusionError {
    /// Geodetic conversion given out-of-range coordinates or an inconsistent zone.
    /// Fatal: downstream planar distances would be silently wrong.
    Conversion(String),
    /// The 2x2 innovation covariance in the update step was not invertible. Cannot
    /// happen with a positive-definite measurement noise, so this signals a
    /// misconfiguration (e.g. zero position uncertainty).
    SingularInnovation,
    /// A stream cursor was asked to advance past its end. Handled internally by the
    /// scheduler's active flags; surfacing means a scheduler invariant was broken.
    SequenceExhausted(&'static str),
    /// Paired coordinate slices of different lengths passed to a batch conversion.
    MismatchedLength { left: usize, right: usize },
}
impl Display for FusionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FusionError::Conversion(msg) => write!(f, "coordinate conversion error: {}", msg),
            FusionError::SingularInnovation => {
                write!(f, "innovation covariance is singular; check measurement noise")
            }
            FusionError::SequenceExhausted(stream) => {
                write!(f, "{} stream advanced past its end", stream)
            }
            FusionError::MismatchedLength { left, right } => {
                write!(f, "paired sequences differ in length: {} vs {}", left, right)
            }
        }
    }
}
impl std::error::Error for FusionError {}

/// A single GPS fix, as delivered by the data-access layer.
///
/// Timestamps are seconds elapsed since the start of the run; the altitude is
/// carried for completeness but unused by the planar filter. Fixes are immutable
/// and consumed one at a time, in time order, by the scheduler.
#[derive(Clone, Copy, Debug, Default)]
pub struct GpsFix {
    /// Seconds since the first sample of the run
    pub elapsed: f64,
    /// WGS84 latitude in degrees
    pub latitude: f64,
    /// WGS84 longitude in degrees
    pub longitude: f64,
    /// Altitude in meters (unused by the planar filter)
    pub altitude: f64,
    /// Absolute ground speed in m/s
    pub speed: f64,
    /// Heading in degrees clockwise from north
    pub heading: f64,
}
impl Display for GpsFix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "GpsFix {{ t: {:.3} s, lat: {:.6} deg, lon: {:.6} deg, speed: {:.2} m/s, heading: {:.1} deg }}",
            self.elapsed, self.latitude, self.longitude, self.speed, self.heading
        )
    }
}

/// A single IMU sample: body-frame acceleration at one instant.
///
/// Only the forward and lateral components feed the filter; the vertical axis is
/// carried through from the source logs but ignored.
#[derive(Clone, Copy, Debug, Default)]
pub struct ImuSample {
    /// Seconds since the first sample of the run
    pub elapsed: f64,
    /// Acceleration along the body forward axis, m/s^2
    pub accel_forward: f64,
    /// Acceleration along the body right/lateral axis, m/s^2
    pub accel_lateral: f64,
    /// Acceleration along the body vertical axis, m/s^2 (unused)
    pub accel_vertical: f64,
}
impl Display for ImuSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ImuSample {{ t: {:.3} s, accel: [{:.4}, {:.4}, {:.4}] m/s^2 }}",
            self.elapsed, self.accel_forward, self.accel_lateral, self.accel_vertical
        )
    }
}

/// Rotate a body-frame planar acceleration into the navigation frame.
///
/// Given the forward and lateral body accelerations and a heading in degrees
/// clockwise from north, returns the control-input vector `[east, north]` used by
/// the filter's predict step:
///
/// $$
/// a_N = a_F \cos h + a_L \sin(h + 180°), \qquad
/// a_E = a_F \sin h + a_L \cos h
/// $$
///
/// Pure and total over all real headings; angles outside [0, 360) fold through
/// the trigonometric functions.
///
/// # Example
/// ```rust
/// use sensorfuse::rotate_to_nav;
/// // Heading due north: forward acceleration is all northing.
/// let u = rotate_to_nav(1.0, 0.0, 0.0);
/// assert!((u[0]).abs() < 1e-12 && (u[1] - 1.0).abs() < 1e-12);
/// ```
pub fn rotate_to_nav(accel_forward: f64, accel_lateral: f64, heading_degrees: f64) -> Vector2<f64> {
    let h = heading_degrees.to_radians();
    let north = accel_forward * h.cos() + accel_lateral * (h + std::f64::consts::PI).sin();
    let east = accel_forward * h.sin() + accel_lateral * h.cos();
    Vector2::new(east, north)
}

/// Estimate a heading from a planar displacement.
///
/// Returns `None` when both deltas are zero (no displacement, heading unchanged).
/// Cardinal directions are returned exactly when one delta is zero; otherwise
/// `atan(dE/dN)` is quadrant-corrected so the result lies in [0, 360) degrees.
/// This is only a fallback for epochs with no absolute heading measurement.
///
/// # Example
/// ```rust
/// use sensorfuse::estimate_heading;
/// assert_eq!(estimate_heading(0.0, 5.0), Some(0.0));
/// assert_eq!(estimate_heading(5.0, 0.0), Some(90.0));
/// assert_eq!(estimate_heading(0.0, 0.0), None);
/// ```
pub fn estimate_heading(d_east: f64, d_north: f64) -> Option<f64> {
    if d_east == 0.0 && d_north == 0.0 {
        return None;
    }
    if d_east == 0.0 {
        return Some(if d_north > 0.0 { 0.0 } else { 180.0 });
    }
    if d_north == 0.0 {
        return Some(if d_east > 0.0 { 90.0 } else { 270.0 });
    }
    let tmp = (d_east / d_north).atan().to_degrees();
    let heading = if d_north > 0.0 {
        // Northern quadrants: NE gives tmp directly, NW needs the full turn added.
        if d_east > 0.0 { tmp } else { 360.0 + tmp }
    } else {
        // Southern quadrants: atan's argument is negated by dN < 0 in both.
        180.0 + tmp
    };
    Some(heading)
}

/// Wrap an angle in degrees to the range [0, 360).
pub fn wrap_to_360(angle: f64) -> f64 {
    let mut wrapped = angle % 360.0;
    if wrapped < 0.0 {
        wrapped += 360.0;
    }
    wrapped
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_wrap_to_360() {
        assert_eq!(wrap_to_360(370.0), 10.0);
        assert_eq!(wrap_to_360(-10.0), 350.0);
        assert_eq!(wrap_to_360(0.0), 0.0);
        assert_eq!(wrap_to_360(720.0), 0.0);
    }
    #[test]
    fn test_heading_cardinals() {
        assert_eq!(estimate_heading(0.0, 5.0), Some(0.0));
        assert_eq!(estimate_heading(0.0, -5.0), Some(180.0));
        assert_eq!(estimate_heading(5.0, 0.0), Some(90.0));
        assert_eq!(estimate_heading(-5.0, 0.0), Some(270.0));
        assert_eq!(estimate_heading(0.0, 0.0), None);
    }
    #[test]
    fn test_heading_quadrants() {
        assert_approx_eq!(estimate_heading(1.0, 1.0).unwrap(), 45.0, 1e-9);
        assert_approx_eq!(estimate_heading(1.0, -1.0).unwrap(), 135.0, 1e-9);
        assert_approx_eq!(estimate_heading(-1.0, -1.0).unwrap(), 225.0, 1e-9);
        assert_approx_eq!(estimate_heading(-1.0, 1.0).unwrap(), 315.0, 1e-9);
    }
    #[test]
    fn test_heading_matches_atan2() {
        // The quadrant-corrected form must agree with atan2 everywhere off-axis.
        for &(de, dn) in &[(2.0, -1.0), (-3.0, 0.5), (0.3, 4.0), (-1.5, -2.5)] {
            let expected = wrap_to_360(f64::atan2(de, dn).to_degrees());
            assert_approx_eq!(estimate_heading(de, dn).unwrap(), expected, 1e-9);
        }
    }
    #[test]
    fn test_rotate_to_nav_cardinal_headings() {
        // Due north: forward maps to +N, lateral (right) to +E.
        let u = rotate_to_nav(2.0, 3.0, 0.0);
        assert_approx_eq!(u[0], 3.0, 1e-12);
        assert_approx_eq!(u[1], 2.0, 1e-12);
        // Due east: forward maps to +E, lateral (right) to -N.
        let u = rotate_to_nav(2.0, 3.0, 90.0);
        assert_approx_eq!(u[0], 2.0, 1e-12);
        assert_approx_eq!(u[1], -3.0, 1e-12);
        // Due south: forward maps to -N, lateral to -E.
        let u = rotate_to_nav(2.0, 3.0, 180.0);
        assert_approx_eq!(u[0], -3.0, 1e-12);
        assert_approx_eq!(u[1], -2.0, 1e-12);
    }
    #[test]
    fn test_rotate_to_nav_preserves_magnitude() {
        let u = rotate_to_nav(1.0, 2.0, 37.0);
        assert_approx_eq!(u.norm(), (1.0f64 + 4.0).sqrt(), 1e-12);
    }
    #[test]
    fn test_rotate_to_nav_total_over_headings() {
        let a = rotate_to_nav(1.0, -1.0, -90.0);
        let b = rotate_to_nav(1.0, -1.0, 270.0);
        assert_approx_eq!(a[0], b[0], 1e-12);
        assert_approx_eq!(a[1], b[1], 1e-12);
    }
}
