//! Earth model and the geodetic <-> planar frame transform
//!
//! This module contains the WGS84 constants and the Universal Transverse Mercator
//! (UTM) projection that defines the local planar frame the filter estimates state
//! in. The Earth is modeled as the WGS84 ellipsoid; the projection uses the
//! standard Krueger series truncated at the sixth power of the reduced longitude,
//! which is accurate to well under a millimeter across a zone.
//!
//! # Zone identity
//!
//! A UTM position is only meaningful together with its zone: easting/northing
//! pairs from different zones are in different frames, and mixing them silently
//! corrupts distances. [`UtmZone`] carries that identity explicitly. The intended
//! usage over a run is:
//!
//! 1. Convert the first point with [`to_utm`] and keep the returned zone.
//! 2. Convert every subsequent point with [`to_utm_in_zone`], passing that zone.
//! 3. Convert back with [`to_wgs84`], again passing that zone.
//!
//! Re-deriving the zone per point is deliberately not offered as a batch
//! operation; [`to_utm_batch`] captures the zone from the first element and
//! forces it for the rest.
//!
//! For verifying the projection in meters this module leans on the
//! [`nav-types`](https://crates.io/crates/nav-types) crate, which provides the
//! WGS84/ECEF point types and conversions.

use crate::FusionError;
use ::nav_types::{ECEF, WGS84};

// Earth constants (WGS84)
/// Earth's equatorial radius in meters (semi-major axis $a$)
pub const EQUATORIAL_RADIUS: f64 = 6378137.0;
/// Earth's polar radius in meters (semi-minor axis $b$)
pub const POLAR_RADIUS: f64 = 6356752.31425;
/// Earth's first eccentricity ($e$)
pub const ECCENTRICITY: f64 = 0.0818191908425;
/// Earth's first eccentricity squared ($e^2$)
pub const ECCENTRICITY_SQUARED: f64 = ECCENTRICITY * ECCENTRICITY;
/// UTM central meridian scale factor ($k_0$)
pub const UTM_SCALE_FACTOR: f64 = 0.9996;
/// UTM false easting applied to every zone, meters
pub const FALSE_EASTING: f64 = 500_000.0;
/// UTM false northing applied in the southern hemisphere, meters
pub const FALSE_NORTHING: f64 = 10_000_000.0;

/// Latitude band letters for the UTM grid, south to north in 8 degree bands.
const BAND_LETTERS: &[u8] = b"CDEFGHJKLMNPQRSTUVWX";

/// Identity of a UTM zone: longitudinal zone number (1..=60) and latitude band.
///
/// The zone fixes the central meridian and hemisphere of the planar frame. It is
/// captured once per run from the first converted point and passed explicitly to
/// every subsequent conversion.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UtmZone {
    /// Longitudinal zone number, 1..=60
    pub number: u8,
    /// Latitude band letter, C..=X (I and O excluded)
    pub band: char,
}
impl std::fmt::Display for UtmZone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.number, self.band)
    }
}
impl UtmZone {
    /// Derive the zone containing a geodetic point.
    ///
    /// Applies the grid exceptions around Norway (32V) and Svalbard (31X/33X/
    /// 35X/37X). Fails when the point is outside the UTM domain: latitude must
    /// lie in [-80, 84] and longitude in [-180, 180].
    pub fn for_point(latitude: f64, longitude: f64) -> Result<UtmZone, FusionError> {
        check_geodetic_range(latitude, longitude)?;
        let band = BAND_LETTERS[(((latitude + 80.0) / 8.0).floor() as usize).min(19)] as char;
        let mut number = ((longitude + 180.0) / 6.0).floor() as i32 + 1;
        if number == 61 {
            number = 60; // longitude exactly +180
        }
        // Grid exceptions: southwest Norway and Svalbard use widened zones.
        if (56.0..64.0).contains(&latitude) && (3.0..12.0).contains(&longitude) {
            number = 32;
        } else if (72.0..=84.0).contains(&latitude) && longitude >= 0.0 && longitude < 42.0 {
            number = match longitude {
                l if l < 9.0 => 31,
                l if l < 21.0 => 33,
                l if l < 33.0 => 35,
                _ => 37,
            };
        }
        Ok(UtmZone {
            number: number as u8,
            band,
        })
    }
    /// True when the zone lies in the northern hemisphere (bands N through X).
    pub fn is_northern(&self) -> bool {
        self.band >= 'N'
    }
    /// Longitude of the zone's central meridian, degrees.
    pub fn central_meridian(&self) -> f64 {
        f64::from(self.number - 1) * 6.0 - 180.0 + 3.0
    }
    /// Validate the zone fields themselves (number and band letter).
    pub fn validate(&self) -> Result<(), FusionError> {
        if !(1..=60).contains(&self.number) {
            return Err(FusionError::Conversion(format!(
                "UTM zone number {} outside 1..=60",
                self.number
            )));
        }
        if !BAND_LETTERS.contains(&(self.band as u8)) {
            return Err(FusionError::Conversion(format!(
                "invalid UTM band letter '{}'",
                self.band
            )));
        }
        Ok(())
    }
}

fn check_geodetic_range(latitude: f64, longitude: f64) -> Result<(), FusionError> {
    if !latitude.is_finite() || !(-80.0..=84.0).contains(&latitude) {
        return Err(FusionError::Conversion(format!(
            "latitude {} outside the UTM domain [-80, 84]",
            latitude
        )));
    }
    if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
        return Err(FusionError::Conversion(format!(
            "longitude {} outside [-180, 180]",
            longitude
        )));
    }
    Ok(())
}

// Krueger series coefficients. These depend only on the ellipsoid, but f64::sqrt
// is not const, so they are computed on the fly; the cost is a handful of flops.
struct Series {
    m1: f64,
    m2: f64,
    m3: f64,
    m4: f64,
    p2: f64,
    p3: f64,
    p4: f64,
    p5: f64,
    e_p2: f64,
}
fn series() -> Series {
    let e = ECCENTRICITY_SQUARED;
    let e2 = e * e;
    let e3 = e2 * e;
    let sqrt_e = (1.0 - e).sqrt();
    let n = (1.0 - sqrt_e) / (1.0 + sqrt_e);
    let n2 = n * n;
    let n3 = n2 * n;
    let n4 = n3 * n;
    let n5 = n4 * n;
    Series {
        m1: 1.0 - e / 4.0 - 3.0 * e2 / 64.0 - 5.0 * e3 / 256.0,
        m2: 3.0 * e / 8.0 + 3.0 * e2 / 32.0 + 45.0 * e3 / 1024.0,
        m3: 15.0 * e2 / 256.0 + 45.0 * e3 / 1024.0,
        m4: 35.0 * e3 / 3072.0,
        p2: 3.0 / 2.0 * n - 27.0 / 32.0 * n3 + 269.0 / 512.0 * n5,
        p3: 21.0 / 16.0 * n2 - 55.0 / 32.0 * n4,
        p4: 151.0 / 96.0 * n3 - 417.0 / 128.0 * n5,
        p5: 1097.0 / 512.0 * n4,
        e_p2: e / (1.0 - e),
    }
}

/// Convert a geodetic point to UTM easting/northing, deriving the zone.
///
/// This is the entry point for the *first* point of a run: the returned
/// [`UtmZone`] must be captured and passed to [`to_utm_in_zone`] and
/// [`to_wgs84`] for every subsequent conversion, so that the whole run shares
/// one planar frame.
///
/// # Errors
/// [`FusionError::Conversion`] when the point lies outside the UTM domain.
///
/// # Example
/// ```rust
/// use sensorfuse::earth::to_utm;
/// let (easting, northing, zone) = to_utm(0.0, 3.0).unwrap();
/// assert!((easting - 500_000.0).abs() < 1e-6); // on the central meridian
/// assert!(northing.abs() < 1e-6); // on the equator
/// assert_eq!(zone.number, 31);
/// ```
pub fn to_utm(latitude: f64, longitude: f64) -> Result<(f64, f64, UtmZone), FusionError> {
    let zone = UtmZone::for_point(latitude, longitude)?;
    let (easting, northing) = project(latitude, longitude, &zone);
    Ok((easting, northing, zone))
}

/// Convert a geodetic point to UTM within an explicitly given zone.
///
/// Used for every point after the first, so the run stays in one frame even
/// when the trajectory strays across a zone boundary. The requested zone must
/// be the point's own zone or an adjacent one; forcing a far-away zone is an
/// error, since the series diverges and distances become meaningless.
pub fn to_utm_in_zone(
    latitude: f64,
    longitude: f64,
    zone: UtmZone,
) -> Result<(f64, f64), FusionError> {
    zone.validate()?;
    let natural = UtmZone::for_point(latitude, longitude)?;
    let gap = (i32::from(natural.number) - i32::from(zone.number)).rem_euclid(60);
    if gap > 1 && gap < 59 {
        return Err(FusionError::Conversion(format!(
            "point ({:.4}, {:.4}) lies in zone {}, not in or adjacent to requested zone {}",
            latitude, longitude, natural, zone
        )));
    }
    Ok(project(latitude, longitude, &zone))
}

/// Transverse Mercator forward projection, zone already validated.
fn project(latitude: f64, longitude: f64, zone: &UtmZone) -> (f64, f64) {
    let s = series();
    let lat = latitude.to_radians();
    let (lat_sin, lat_cos) = lat.sin_cos();
    let lat_tan = lat_sin / lat_cos;
    let lat_tan2 = lat_tan * lat_tan;
    let lat_tan4 = lat_tan2 * lat_tan2;

    let n = EQUATORIAL_RADIUS / (1.0 - ECCENTRICITY_SQUARED * lat_sin * lat_sin).sqrt();
    let c = s.e_p2 * lat_cos * lat_cos;
    let mut dlon = (longitude - zone.central_meridian()).to_radians();
    // Fold into (-pi, pi] so points near the antimeridian project sanely.
    if dlon > std::f64::consts::PI {
        dlon -= 2.0 * std::f64::consts::PI;
    } else if dlon < -std::f64::consts::PI {
        dlon += 2.0 * std::f64::consts::PI;
    }
    let a = lat_cos * dlon;
    let a2 = a * a;
    let a3 = a2 * a;
    let a4 = a3 * a;
    let a5 = a4 * a;
    let a6 = a5 * a;

    let m = EQUATORIAL_RADIUS
        * (s.m1 * lat - s.m2 * (2.0 * lat).sin() + s.m3 * (4.0 * lat).sin()
            - s.m4 * (6.0 * lat).sin());

    let easting = UTM_SCALE_FACTOR
        * n
        * (a + a3 / 6.0 * (1.0 - lat_tan2 + c)
            + a5 / 120.0 * (5.0 - 18.0 * lat_tan2 + lat_tan4 + 72.0 * c - 58.0 * s.e_p2))
        + FALSE_EASTING;
    let mut northing = UTM_SCALE_FACTOR
        * (m + n
            * lat_tan
            * (a2 / 2.0
                + a4 / 24.0 * (5.0 - lat_tan2 + 9.0 * c + 4.0 * c * c)
                + a6 / 720.0 * (61.0 - 58.0 * lat_tan2 + lat_tan4 + 600.0 * c - 330.0 * s.e_p2)));
    if latitude < 0.0 {
        northing += FALSE_NORTHING;
    }
    (easting, northing)
}

/// Convert a UTM easting/northing back to geodetic latitude/longitude.
///
/// The zone must be the one captured when the run's first point was converted;
/// the inverse is only a near-inverse of the forward transform within that
/// frame ([`to_utm`] then `to_wgs84` agrees with the original point to well
/// under a centimeter).
///
/// # Errors
/// [`FusionError::Conversion`] when the zone is invalid or the easting/
/// northing lie outside the zone's usable extent.
pub fn to_wgs84(easting: f64, northing: f64, zone: UtmZone) -> Result<(f64, f64), FusionError> {
    zone.validate()?;
    if !(100_000.0..1_000_000.0).contains(&easting) {
        return Err(FusionError::Conversion(format!(
            "easting {} outside the usable range [100000, 1000000)",
            easting
        )));
    }
    if !(0.0..=10_000_000.0).contains(&northing) {
        return Err(FusionError::Conversion(format!(
            "northing {} outside [0, 10000000]",
            northing
        )));
    }
    let s = series();
    let x = easting - FALSE_EASTING;
    let y = if zone.is_northern() {
        northing
    } else {
        northing - FALSE_NORTHING
    };
    let m = y / UTM_SCALE_FACTOR;
    let mu = m / (EQUATORIAL_RADIUS * s.m1);

    // Footpoint latitude from the rectifying latitude.
    let p_rad = mu
        + s.p2 * (2.0 * mu).sin()
        + s.p3 * (4.0 * mu).sin()
        + s.p4 * (6.0 * mu).sin()
        + s.p5 * (8.0 * mu).sin();
    let (p_sin, p_cos) = p_rad.sin_cos();
    let p_tan = p_sin / p_cos;
    let p_tan2 = p_tan * p_tan;
    let p_tan4 = p_tan2 * p_tan2;

    let ep_sin = 1.0 - ECCENTRICITY_SQUARED * p_sin * p_sin;
    let n = EQUATORIAL_RADIUS / ep_sin.sqrt();
    let r = (1.0 - ECCENTRICITY_SQUARED) / ep_sin;
    let c = s.e_p2 * p_cos * p_cos;
    let c2 = c * c;

    let d = x / (n * UTM_SCALE_FACTOR);
    let d2 = d * d;
    let d3 = d2 * d;
    let d4 = d3 * d;
    let d5 = d4 * d;
    let d6 = d5 * d;

    let latitude = p_rad
        - (p_tan / r)
            * (d2 / 2.0 - d4 / 24.0 * (5.0 + 3.0 * p_tan2 + 10.0 * c - 4.0 * c2 - 9.0 * s.e_p2)
                + d6 / 720.0
                    * (61.0 + 90.0 * p_tan2 + 298.0 * c + 45.0 * p_tan4
                        - 252.0 * s.e_p2
                        - 3.0 * c2));
    let longitude = (d - d3 / 6.0 * (1.0 + 2.0 * p_tan2 + c)
        + d5 / 120.0 * (5.0 - 2.0 * c + 28.0 * p_tan2 - 3.0 * c2 + 8.0 * s.e_p2 + 24.0 * p_tan4))
        / p_cos;
    let mut lon_deg = longitude.to_degrees() + zone.central_meridian();
    if lon_deg > 180.0 {
        lon_deg -= 360.0;
    } else if lon_deg < -180.0 {
        lon_deg += 360.0;
    }
    Ok((latitude.to_degrees(), lon_deg))
}

/// Batch-convert paired latitude/longitude slices into one shared planar frame.
///
/// The zone is derived from the first point and forced for the rest, exactly as
/// the scheduler does for a live run.
///
/// # Errors
/// - [`FusionError::MismatchedLength`] when the slices differ in length.
/// - [`FusionError::Conversion`] when the slices are empty or a point is out of
///   range of the captured zone.
pub fn to_utm_batch(
    latitudes: &[f64],
    longitudes: &[f64],
) -> Result<(Vec<f64>, Vec<f64>, UtmZone), FusionError> {
    if latitudes.len() != longitudes.len() {
        return Err(FusionError::MismatchedLength {
            left: latitudes.len(),
            right: longitudes.len(),
        });
    }
    let (first_lat, first_lon) = match (latitudes.first(), longitudes.first()) {
        (Some(lat), Some(lon)) => (*lat, *lon),
        _ => {
            return Err(FusionError::Conversion(
                "cannot derive a UTM zone from empty sequences".to_string(),
            ));
        }
    };
    let (e0, n0, zone) = to_utm(first_lat, first_lon)?;
    let mut eastings = Vec::with_capacity(latitudes.len());
    let mut northings = Vec::with_capacity(latitudes.len());
    eastings.push(e0);
    northings.push(n0);
    for (lat, lon) in latitudes.iter().zip(longitudes.iter()).skip(1) {
        let (e, n) = to_utm_in_zone(*lat, *lon, zone)?;
        eastings.push(e);
        northings.push(n);
    }
    Ok((eastings, northings, zone))
}

/// Straight-line (chord) distance in meters between two geodetic points.
///
/// Goes through ECEF via `nav-types`; for the short baselines this crate deals
/// in, chord and geodesic distances are indistinguishable. Used to express
/// projection round-trip errors in meters.
pub fn straight_line_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let a = ECEF::from(WGS84::from_degrees_and_meters(lat1, lon1, 0.0));
    let b = ECEF::from(WGS84::from_degrees_and_meters(lat2, lon2, 0.0));
    let (dx, dy, dz) = (a.x() - b.x(), a.y() - b.y(), a.z() - b.z());
    (dx * dx + dy * dy + dz * dz).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_zone_derivation() {
        let zone = UtmZone::for_point(40.7128, -74.0060).unwrap();
        assert_eq!(zone.number, 18);
        assert_eq!(zone.band, 'T');
        assert!(zone.is_northern());
        let zone = UtmZone::for_point(-33.8688, 151.2093).unwrap();
        assert_eq!(zone.number, 56);
        assert_eq!(zone.band, 'H');
        assert!(!zone.is_northern());
    }
    #[test]
    fn test_zone_exceptions() {
        // Southwest Norway belongs to the widened 32V.
        assert_eq!(UtmZone::for_point(60.0, 5.0).unwrap().number, 32);
        // Svalbard bands use 31/33/35/37 only.
        assert_eq!(UtmZone::for_point(78.0, 16.0).unwrap().number, 33);
        assert_eq!(UtmZone::for_point(78.0, 35.0).unwrap().number, 37);
    }
    #[test]
    fn test_out_of_range_rejected() {
        assert!(to_utm(85.0, 0.0).is_err());
        assert!(to_utm(-81.0, 0.0).is_err());
        assert!(to_utm(0.0, 181.0).is_err());
        assert!(to_utm(f64::NAN, 0.0).is_err());
    }
    #[test]
    fn test_central_meridian_equator() {
        let (easting, northing, zone) = to_utm(0.0, 3.0).unwrap();
        assert_approx_eq!(easting, 500_000.0, 1e-6);
        assert_approx_eq!(northing, 0.0, 1e-6);
        assert_eq!(zone.number, 31);
        assert_eq!(zone.central_meridian(), 3.0);
    }
    #[test]
    fn test_round_trip_sub_centimeter() {
        let points = [
            (40.7128, -74.0060),
            (-33.8688, 151.2093),
            (59.3293, 18.0686),
            (0.01, 0.01),
            (-45.0, -67.5),
        ];
        for (lat, lon) in points {
            let (e, n, zone) = to_utm(lat, lon).unwrap();
            let (lat2, lon2) = to_wgs84(e, n, zone).unwrap();
            let err = straight_line_distance(lat, lon, lat2, lon2);
            assert!(err < 0.01, "round trip error {} m at ({}, {})", err, lat, lon);
        }
    }
    #[test]
    fn test_forced_zone_stays_consistent() {
        // A pair of points straddling the 30/31 boundary, both projected into
        // the first point's zone: planar distance must track the geodesic
        // instead of jumping frames.
        let (e1, n1, zone) = to_utm(50.0, -0.01).unwrap();
        assert_eq!(zone.number, 30);
        let (e2, n2) = to_utm_in_zone(50.0, 0.01, zone).unwrap();
        let planar = ((e2 - e1).powi(2) + (n2 - n1).powi(2)).sqrt();
        let geodesic = straight_line_distance(50.0, -0.01, 50.0, 0.01);
        assert_approx_eq!(planar, geodesic, 0.5);
    }
    #[test]
    fn test_far_zone_rejected() {
        let zone = UtmZone { number: 10, band: 'T' };
        assert!(to_utm_in_zone(40.0, 30.0, zone).is_err());
    }
    #[test]
    fn test_invalid_zone_rejected() {
        assert!(to_wgs84(500_000.0, 0.0, UtmZone { number: 0, band: 'T' }).is_err());
        assert!(to_wgs84(500_000.0, 0.0, UtmZone { number: 31, band: 'I' }).is_err());
        assert!(to_wgs84(50_000.0, 0.0, UtmZone { number: 31, band: 'T' }).is_err());
        assert!(to_wgs84(500_000.0, -1.0, UtmZone { number: 31, band: 'T' }).is_err());
    }
    #[test]
    fn test_batch_conversion() {
        let lats = [40.0, 40.001, 40.002];
        let lons = [-74.0, -74.001, -74.002];
        let (es, ns, zone) = to_utm_batch(&lats, &lons).unwrap();
        assert_eq!(es.len(), 3);
        assert_eq!(ns.len(), 3);
        assert_eq!(zone.number, 18);
        // Northings increase with latitude in the northern hemisphere.
        assert!(ns[1] > ns[0] && ns[2] > ns[1]);
    }
    #[test]
    fn test_batch_mismatched_lengths() {
        let result = to_utm_batch(&[40.0, 41.0], &[-74.0]);
        assert_eq!(
            result.unwrap_err(),
            FusionError::MismatchedLength { left: 2, right: 1 }
        );
    }
    #[test]
    fn test_southern_hemisphere_false_northing() {
        let (_, northing, zone) = to_utm(-0.001, 3.0).unwrap();
        assert!(!zone.is_northern());
        assert!(northing > 9_999_000.0);
    }
}
