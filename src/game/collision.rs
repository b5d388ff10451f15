//! Collision Detection
//!
//! Radius checks and the push resolution used to separate players.

use crate::core::vec2::Vec2;

/// Check if a point lies strictly within `radius` of a centre.
///
/// Used for bullet hits and pickups, where the entity is treated as a point.
#[inline]
pub fn within_radius(point: Vec2, center: Vec2, radius: f64) -> bool {
    point.distance(center) < radius
}

/// Push vectors separating two overlapping circles.
///
/// Returns `(push_a, push_b)` where `push_b == -push_a`. Each push points
/// away from the other circle with magnitude `overlap * push_force`.
/// Non-overlapping and exactly coincident circles yield zero vectors;
/// coincident centres have no defined normal.
pub fn resolve_push(
    pos_a: Vec2,
    radius_a: f64,
    pos_b: Vec2,
    radius_b: f64,
    push_force: f64,
) -> (Vec2, Vec2) {
    let delta = pos_a - pos_b;
    let distance = delta.length();
    let min_distance = radius_a + radius_b;

    if distance >= min_distance || distance == 0.0 || !distance.is_finite() {
        return (Vec2::ZERO, Vec2::ZERO);
    }

    let normal = delta * (1.0 / distance);
    let push = normal * ((min_distance - distance) * push_force);
    (push, -push)
}
