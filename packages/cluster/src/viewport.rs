//! Viewport validation and anti-meridian handling.
//!
//! Map clients report a viewport that crosses the anti-meridian either with
//! unwrapped longitudes (`west = 170, east = 190`) or with wrapped ones
//! (`west = 170, east = -170`). Both are normalized into two longitude
//! spans, one on each side of ±180°.

use watermap_point_models::BoundingBox;

use crate::IndexError;

/// A validated viewport split into one or two non-wrapping spans.
#[derive(Debug, Clone, PartialEq)]
pub struct Viewport {
    spans: Vec<BoundingBox>,
}

impl Viewport {
    /// Validates and normalizes `bbox`.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::InvalidViewport`] if any bound is not finite,
    /// if `west == east`, if `west > east` with a bound outside
    /// `[-180, 180]`, or if `south > north`.
    pub fn normalize(bbox: &BoundingBox) -> Result<Self, IndexError> {
        let BoundingBox {
            west,
            south,
            mut east,
            north,
        } = *bbox;

        if ![west, south, east, north].iter().all(|v| v.is_finite()) {
            return Err(IndexError::InvalidViewport {
                message: "bounding box values must be finite numbers".to_string(),
            });
        }
        #[allow(clippy::float_cmp)]
        let empty = west == east;
        if empty {
            return Err(IndexError::InvalidViewport {
                message: format!("west and east are both {west}"),
            });
        }
        if west > east {
            if !(-180.0..=180.0).contains(&west) || !(-180.0..=180.0).contains(&east) {
                return Err(IndexError::InvalidViewport {
                    message: format!(
                        "west ({west}) is greater than east ({east}) and not a wrapped longitude pair"
                    ),
                });
            }
            east += 360.0;
        }
        if south > north {
            return Err(IndexError::InvalidViewport {
                message: format!("south ({south}) must not exceed north ({north})"),
            });
        }

        let south = south.clamp(-90.0, 90.0);
        let north = north.clamp(-90.0, 90.0);

        if east - west >= 360.0 {
            return Ok(Self {
                spans: vec![BoundingBox::new(-180.0, south, 180.0, north)],
            });
        }

        let min_lng = wrap_longitude(west);
        #[allow(clippy::float_cmp)]
        let max_lng = if east == 180.0 {
            180.0
        } else {
            wrap_longitude(east)
        };

        let spans = if min_lng > max_lng {
            vec![
                BoundingBox::new(min_lng, south, 180.0, north),
                BoundingBox::new(-180.0, south, max_lng, north),
            ]
        } else {
            vec![BoundingBox::new(min_lng, south, max_lng, north)]
        };

        Ok(Self { spans })
    }

    /// The non-wrapping spans covering this viewport.
    #[must_use]
    pub fn spans(&self) -> &[BoundingBox] {
        &self.spans
    }

    /// Returns `true` if the viewport crosses the anti-meridian.
    #[must_use]
    pub fn wraps(&self) -> bool {
        self.spans.len() > 1
    }

    /// Returns `true` if `(lng, lat)` lies inside the viewport.
    #[must_use]
    pub fn contains(&self, lng: f64, lat: f64) -> bool {
        self.spans.iter().any(|s| {
            (s.west..=s.east).contains(&lng) && (s.south..=s.north).contains(&lat)
        })
    }
}

/// Wraps any longitude into `[-180, 180)`.
fn wrap_longitude(lng: f64) -> f64 {
    (lng + 180.0).rem_euclid(360.0) - 180.0
}
