//! Spherical Mercator projection into the unit square.
//!
//! `x` grows eastward from 0 at -180° to 1 at 180°. `y` grows southward
//! from 0 at the northern Mercator limit to 1 at the southern one. At zoom
//! `z` the square is `extent * 2^z` pixels wide.

use std::f64::consts::PI;

/// Longitude to unit x.
#[must_use]
pub fn lng_x(lng: f64) -> f64 {
    lng / 360.0 + 0.5
}

/// Latitude to unit y, clamped to `[0, 1]` so the poles stay finite.
#[must_use]
pub fn lat_y(lat: f64) -> f64 {
    let sin = lat.to_radians().sin();
    let y = 0.5 - 0.25 * ((1.0 + sin) / (1.0 - sin)).ln() / PI;
    y.clamp(0.0, 1.0)
}

/// Unit x back to longitude.
#[must_use]
pub fn x_lng(x: f64) -> f64 {
    (x - 0.5) * 360.0
}

/// Unit y back to latitude.
#[must_use]
pub fn y_lat(y: f64) -> f64 {
    let y2 = (180.0 - y * 360.0).to_radians();
    360.0 * y2.exp().atan() / PI - 90.0
}

/// Radius in unit coordinates for a pixel radius at `zoom`.
#[must_use]
pub fn unit_radius(radius: f64, extent: f64, zoom: u8) -> f64 {
    radius / (extent * 2f64.powi(i32::from(zoom)))
}
