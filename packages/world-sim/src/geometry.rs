//! geometry.rs — Planar primitives over `(lat, lng)`
//!
//! The cross product and intersection predicate treat spherical coordinates
//! as planar Cartesian. At the tight zoom levels the renderer targets this
//! matches the upstream game's own geometry; a spherical reimplementation
//! would disagree with it. Anyone upgrading to spherical math must do so
//! uniformly across this module.

use serde::{Deserialize, Serialize};

/// Geographic point in signed decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// Signed cross product of `(b − a) × (c − a)`.
///
/// The sign gives the orientation of `c` relative to the directed segment
/// `a → b`; the magnitude is twice the area of triangle `abc`.
pub fn cross(a: LatLng, b: LatLng, c: LatLng) -> f64 {
    (b.lng - a.lng) * (c.lat - a.lat) - (b.lat - a.lat) * (c.lng - a.lng)
}

fn sign(v: f64) -> i8 {
    if v > 0.0 {
        1
    } else if v < 0.0 {
        -1
    } else {
        0
    }
}

/// True iff segments `ab` and `cd` share an interior point.
///
/// Strict sign-change test on both segments: a collinear touch returns
/// false. Real geographic data is noisy enough that exact collinearity is
/// vanishingly rare, and the strict form avoids spurious deletions from
/// floating-point noise. Segments that share an endpoint *identifier* must
/// be filtered out by the caller before this test — coordinates alone cannot
/// tell a shared portal from a genuine crossing at the same spot.
pub fn segments_properly_intersect(a: LatLng, b: LatLng, c: LatLng, d: LatLng) -> bool {
    let s1 = sign(cross(a, b, c));
    let s2 = sign(cross(a, b, d));
    let s3 = sign(cross(c, d, a));
    let s4 = sign(cross(c, d, b));
    s1 != 0 && s2 != 0 && s3 != 0 && s4 != 0 && s1 != s2 && s3 != s4
}
