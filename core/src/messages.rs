//! CSV record types for the recorded sensor streams and the run configuration.
//!
//! The record structs mirror the columns of the source logs one-to-one: GPS rows
//! carry geodetic position, speed, and heading; IMU rows carry the raw body-frame
//! accelerometer triplet. Timestamps are logged as `YYYY:MM:DD hh:mm:ss[.fff]`
//! wall-clock strings; [`build_streams`] converts both files onto a shared
//! elapsed-seconds clock so the scheduler can merge them.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io;
use std::path::Path;

use crate::{FusionError, GpsFix, ImuSample};

/// Wall-clock format written by the sensor logger.
const TIME_FORMAT: &str = "%Y:%m:%d %H:%M:%S%.f";

/// Tuning knobs for a fusion run.
///
/// All fields have defaults matched to consumer-grade GPS receivers; a config
/// file only needs to name the fields it overrides.
///
/// ## Examples
///
/// ```
/// use sensorfuse::messages::FusionConfig;
///
/// let config = FusionConfig::default();
/// assert_eq!(config.position_uncertainty, 4.0);
/// assert_eq!(config.epoch_match_tolerance, 0.09);
/// ```
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FusionConfig {
    /// GPS position uncertainty, the scalar placed on the diagonal of the
    /// measurement noise covariance R.
    #[serde(default = "default_position_uncertainty")]
    pub position_uncertainty: f64,
    /// Scale of the initial state covariance, P0 = scale * I.
    #[serde(default = "default_initial_covariance_scale")]
    pub initial_covariance_scale: f64,
    /// Maximum clock difference, in seconds, for a GPS fix and an IMU sample to
    /// be treated as simultaneous.
    #[serde(default = "default_epoch_match_tolerance")]
    pub epoch_match_tolerance: f64,
}

fn default_position_uncertainty() -> f64 {
    4.0
}
fn default_initial_covariance_scale() -> f64 {
    100.0
}
fn default_epoch_match_tolerance() -> f64 {
    0.09
}

impl Default for FusionConfig {
    fn default() -> Self {
        FusionConfig {
            position_uncertainty: default_position_uncertainty(),
            initial_covariance_scale: default_initial_covariance_scale(),
            epoch_match_tolerance: default_epoch_match_tolerance(),
        }
    }
}

impl FusionConfig {
    /// Write the configuration to a JSON file (pretty-printed).
    pub fn to_json<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, self).map_err(io::Error::other)
    }

    /// Read the configuration from a JSON file. Missing fields take defaults.
    pub fn from_json<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = File::open(path)?;
        serde_json::from_reader(file).map_err(io::Error::other)
    }
}

/// One row of the GPS log.
///
/// Column names follow the logger's GNSS table. The `time` field is kept as the
/// raw string; parsing onto the run clock happens in [`build_streams`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GpsFixRecord {
    /// Wall-clock string, `YYYY:MM:DD hh:mm:ss[.fff]`
    pub time: String,
    /// WGS84 latitude in degrees
    pub lat: f64,
    /// WGS84 longitude in degrees
    pub lon: f64,
    /// Altitude in meters
    pub alt: f64,
    /// Absolute ground speed in m/s
    pub abs_vel: f64,
    /// Heading in degrees clockwise from north
    pub heading: f64,
}

/// One row of the accelerometer log, in the logger's camera frame.
///
/// In that frame +z points forward along the track and +y points right, so the
/// planar filter consumes `z` as forward and `y` as lateral acceleration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ImuSampleRecord {
    /// Wall-clock string, `YYYY:MM:DD hh:mm:ss[.fff]`
    pub time: String,
    /// Acceleration along the camera x axis (vertical), m/s^2
    pub x: f64,
    /// Acceleration along the camera y axis (right), m/s^2
    pub y: f64,
    /// Acceleration along the camera z axis (forward), m/s^2
    pub z: f64,
}

impl GpsFixRecord {
    /// Read a GPS log from a headered CSV file.
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Vec<Self>, Box<dyn std::error::Error>> {
        let mut rdr = csv::Reader::from_path(path)?;
        let mut records = Vec::new();
        for result in rdr.deserialize() {
            let record: Self = result?;
            records.push(record);
        }
        Ok(records)
    }

    /// Write GPS records to a CSV file, header included.
    pub fn to_csv<P: AsRef<Path>>(records: &[Self], path: P) -> io::Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        for record in records {
            writer.serialize(record)?;
        }
        writer.flush()?;
        Ok(())
    }
}

impl ImuSampleRecord {
    /// Read an accelerometer log from a headered CSV file.
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Vec<Self>, Box<dyn std::error::Error>> {
        let mut rdr = csv::Reader::from_path(path)?;
        let mut records = Vec::new();
        for result in rdr.deserialize() {
            let record: Self = result?;
            records.push(record);
        }
        Ok(records)
    }

    /// Write accelerometer records to a CSV file, header included.
    pub fn to_csv<P: AsRef<Path>>(records: &[Self], path: P) -> io::Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        for record in records {
            writer.serialize(record)?;
        }
        writer.flush()?;
        Ok(())
    }
}

fn parse_time(raw: &str) -> Result<NaiveDateTime, FusionError> {
    NaiveDateTime::parse_from_str(raw, TIME_FORMAT)
        .map_err(|e| FusionError::Conversion(format!("bad timestamp '{}': {}", raw, e)))
}

/// Convert both logs onto a shared elapsed-seconds clock.
///
/// The origin is the earliest timestamp seen in either stream, so elapsed times
/// from the two files are directly comparable. Rows must already be in time
/// order; the scheduler relies on that.
pub fn build_streams(
    gps_records: &[GpsFixRecord],
    imu_records: &[ImuSampleRecord],
) -> Result<(Vec<GpsFix>, Vec<ImuSample>), FusionError> {
    let gps_times: Vec<NaiveDateTime> = gps_records
        .iter()
        .map(|r| parse_time(&r.time))
        .collect::<Result<_, _>>()?;
    let imu_times: Vec<NaiveDateTime> = imu_records
        .iter()
        .map(|r| parse_time(&r.time))
        .collect::<Result<_, _>>()?;

    let origin = match (gps_times.first(), imu_times.first()) {
        (Some(&g), Some(&i)) => g.min(i),
        (Some(&g), None) => g,
        (None, Some(&i)) => i,
        (None, None) => {
            return Err(FusionError::Conversion("both sensor streams are empty".to_string()));
        }
    };
    // as_seconds_f64 keeps whatever sub-second precision the log carries.
    let elapsed = |t: NaiveDateTime| (t - origin).as_seconds_f64();

    let fixes = gps_records
        .iter()
        .zip(&gps_times)
        .map(|(r, &t)| GpsFix {
            elapsed: elapsed(t),
            latitude: r.lat,
            longitude: r.lon,
            altitude: r.alt,
            speed: r.abs_vel,
            heading: r.heading,
        })
        .collect();
    let samples = imu_records
        .iter()
        .zip(&imu_times)
        .map(|(r, &t)| ImuSample {
            elapsed: elapsed(t),
            accel_forward: r.z,
            accel_lateral: r.y,
            accel_vertical: r.x,
        })
        .collect();
    Ok((fixes, samples))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_config_defaults() {
        let config = FusionConfig::default();
        assert_eq!(config.position_uncertainty, 4.0);
        assert_eq!(config.initial_covariance_scale, 100.0);
        assert_eq!(config.epoch_match_tolerance, 0.09);
    }

    #[test]
    fn test_config_json_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let config = FusionConfig {
            position_uncertainty: 2.5,
            ..FusionConfig::default()
        };
        config.to_json(&path).unwrap();
        let loaded = FusionConfig::from_json(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_config_partial_json_takes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.json");
        std::fs::write(&path, r#"{ "position_uncertainty": 1.5 }"#).unwrap();
        let loaded = FusionConfig::from_json(&path).unwrap();
        assert_eq!(loaded.position_uncertainty, 1.5);
        assert_eq!(loaded.initial_covariance_scale, 100.0);
        assert_eq!(loaded.epoch_match_tolerance, 0.09);
    }

    #[test]
    fn test_gps_csv_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gps.csv");
        let records = vec![
            GpsFixRecord {
                time: "2023:05:01 12:00:00".to_string(),
                lat: 40.7128,
                lon: -74.0060,
                alt: 10.0,
                abs_vel: 3.2,
                heading: 88.5,
            },
            GpsFixRecord {
                time: "2023:05:01 12:00:01".to_string(),
                lat: 40.7129,
                lon: -74.0059,
                alt: 10.1,
                abs_vel: 3.3,
                heading: 89.0,
            },
        ];
        GpsFixRecord::to_csv(&records, &path).unwrap();
        let loaded = GpsFixRecord::from_csv(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_approx_eq!(loaded[1].lat, 40.7129, 1e-12);
        assert_eq!(loaded[0].time, "2023:05:01 12:00:00");
    }

    #[test]
    fn test_build_streams_shared_origin() {
        // IMU starts half a second before the first fix; its first sample defines t=0.
        let gps = vec![GpsFixRecord {
            time: "2023:05:01 12:00:01.000".to_string(),
            lat: 40.0,
            lon: -74.0,
            alt: 0.0,
            abs_vel: 0.0,
            heading: 0.0,
        }];
        let imu = vec![
            ImuSampleRecord {
                time: "2023:05:01 12:00:00.500".to_string(),
                x: 9.81,
                y: 0.1,
                z: 0.2,
            },
            ImuSampleRecord {
                time: "2023:05:01 12:00:00.700".to_string(),
                x: 9.81,
                y: 0.1,
                z: 0.2,
            },
        ];
        let (fixes, samples) = build_streams(&gps, &imu).unwrap();
        assert_approx_eq!(samples[0].elapsed, 0.0, 1e-9);
        assert_approx_eq!(samples[1].elapsed, 0.2, 1e-9);
        assert_approx_eq!(fixes[0].elapsed, 0.5, 1e-9);
    }

    #[test]
    fn test_build_streams_keeps_sub_millisecond_precision() {
        let imu = vec![
            ImuSampleRecord {
                time: "2023:05:01 12:00:00.000000".to_string(),
                x: 0.0,
                y: 0.0,
                z: 0.0,
            },
            ImuSampleRecord {
                time: "2023:05:01 12:00:00.000250".to_string(),
                x: 0.0,
                y: 0.0,
                z: 0.0,
            },
        ];
        let (_, samples) = build_streams(&[], &imu).unwrap();
        assert_approx_eq!(samples[1].elapsed, 0.00025, 1e-9);
    }

    #[test]
    fn test_build_streams_axis_mapping() {
        let imu = vec![ImuSampleRecord {
            time: "2023:05:01 12:00:00".to_string(),
            x: 1.0,
            y: 2.0,
            z: 3.0,
        }];
        let (_, samples) = build_streams(&[], &imu).unwrap();
        assert_eq!(samples[0].accel_forward, 3.0);
        assert_eq!(samples[0].accel_lateral, 2.0);
        assert_eq!(samples[0].accel_vertical, 1.0);
    }

    #[test]
    fn test_build_streams_rejects_bad_timestamp() {
        let imu = vec![ImuSampleRecord {
            time: "not a time".to_string(),
            x: 0.0,
            y: 0.0,
            z: 0.0,
        }];
        assert!(build_streams(&[], &imu).is_err());
    }

    #[test]
    fn test_build_streams_rejects_empty_input() {
        assert!(build_streams(&[], &[]).is_err());
    }
}
