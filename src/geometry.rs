//! Planar geometry over normalized landmark positions.
//!
//! Only x and y are used; depth from the landmark model is too noisy for the
//! alignment checks.

use nalgebra::Point3;

type Point = Point3<f32>;

/// Interior angle at `b` formed by the rays `b -> a` and `b -> c`, in degrees
/// within [0, 180].
///
/// Returns `None` when either ray has zero length, since the angle is then
/// indeterminate.
pub fn angle_between(a: &Point, b: &Point, c: &Point) -> Option<f32> {
    let (bax, bay) = (a.x - b.x, a.y - b.y);
    let (bcx, bcy) = (c.x - b.x, c.y - b.y);

    if (bax == 0.0 && bay == 0.0) || (bcx == 0.0 && bcy == 0.0) {
        return None;
    }

    let radians = bcy.atan2(bcx) - bay.atan2(bax);
    let mut angle = radians.to_degrees().abs();
    if angle > 180.0 {
        angle = 360.0 - angle;
    }

    Some(angle)
}

/// Absolute difference of the two points' vertical coordinates.
pub fn vertical_delta(a: &Point, b: &Point) -> f32 {
    (a.y - b.y).abs()
}
