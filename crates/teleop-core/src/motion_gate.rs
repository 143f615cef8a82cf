//! Motion gate – decides whether an accumulated offset is worth planning for.
//!
//! Sub-epsilon offsets are sensor noise or a released joystick; sending them
//! to IK and the planner only produces near-zero trajectories and keeps the
//! planner busy.

use teleop_types::Vec3;

/// Per-axis magnitude (metres) at or below which motion is treated as noise.
pub const MOTION_EPSILON: f64 = 1e-4;

/// Return `true` if any component of `offset` exceeds [`MOTION_EPSILON`].
///
/// An offset sitting exactly on the epsilon is not significant.
pub fn is_significant(offset: Vec3) -> bool {
    offset.x.abs() > MOTION_EPSILON
        || offset.y.abs() > MOTION_EPSILON
        || offset.z.abs() > MOTION_EPSILON
}
