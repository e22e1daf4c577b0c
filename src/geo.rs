//! Great-circle distance between two coordinates.

use crate::models::Coordinate;

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Haversine distance between `from` and `to`, in meters.
///
/// Returns [`f64::INFINITY`] if any component is not finite, so a degenerate
/// coordinate always compares as "far away".
pub fn haversine_meters(from: &Coordinate, to: &Coordinate) -> f64 {
    let parts = [from.latitude, from.longitude, to.latitude, to.longitude];
    if parts.iter().any(|v| !v.is_finite()) {
        return f64::INFINITY;
    }

    let d_lat = (to.latitude - from.latitude).to_radians();
    let d_lon = (to.longitude - from.longitude).to_radians();

    let a = (d_lat / 2.0).sin() * (d_lat / 2.0).sin()
        + from.latitude.to_radians().cos()
            * to.latitude.to_radians().cos()
            * (d_lon / 2.0).sin()
            * (d_lon / 2.0).sin();
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}
