//! [`SimPlanner`] – joint-space planner for the [`SimArm`].
//!
//! Plans a straight joint-space move from the arm's current configuration to
//! the requested target, validates it against joint limits and the collision
//! floor, and time-parameterises it under the configured velocity and
//! acceleration scaling.

use std::time::Duration;

use teleop_core::TrajectoryPlanner;
use teleop_types::{
    JointSolution, JointTrajectory, PlanResult, PlannerSettings, TeleopError, TrajectoryPoint,
};
use tracing::debug;

use crate::arm::{JOINT_LIMIT, SimArm};

/// Unscaled joint velocity limit, rad/s.
pub const MAX_JOINT_VELOCITY: f64 = std::f64::consts::PI;

/// Unscaled joint acceleration limit, rad/s².
pub const MAX_JOINT_ACCELERATION: f64 = 2.0 * std::f64::consts::PI;

/// Spacing between generated waypoints.
const WAYPOINT_SPACING: Duration = Duration::from_millis(50);

/// Upper bound on waypoints per trajectory.
const MAX_WAYPOINTS: usize = 200;

/// Planner bound to one simulated arm.
pub struct SimPlanner {
    arm: SimArm,
    settings: PlannerSettings,
}

impl SimPlanner {
    /// # Errors
    ///
    /// Returns [`TeleopError::InvalidConfig`] if `settings` fail validation.
    pub fn new(arm: SimArm, settings: PlannerSettings) -> Result<Self, TeleopError> {
        settings.validate()?;
        Ok(Self { arm, settings })
    }

    /// Minimum duration of a rest-to-rest move of `distance` radians.
    fn move_duration(&self, distance: f64) -> Duration {
        if distance <= 0.0 {
            return Duration::ZERO;
        }
        let v = MAX_JOINT_VELOCITY * self.settings.max_velocity_scaling;
        let a = MAX_JOINT_ACCELERATION * self.settings.max_acceleration_scaling;
        // Triangular profile when the joint never reaches full speed,
        // trapezoidal otherwise.
        let secs = if distance <= v * v / a {
            2.0 * (distance / a).sqrt()
        } else {
            distance / v + v / a
        };
        Duration::from_secs_f64(secs)
    }
}

impl TrajectoryPlanner for SimPlanner {
    fn plan_to_joint_target(&mut self, target: &JointSolution) -> Result<PlanResult, TeleopError> {
        self.arm.ensure_online("planner")?;

        if let Some(reason) = self.arm.planner_failure() {
            return Ok(PlanResult::Failure(reason));
        }
        if target.positions.len() != SimArm::joint_names().len() {
            return Ok(PlanResult::Failure(format!(
                "target has {} joints, expected {}",
                target.positions.len(),
                SimArm::joint_names().len()
            )));
        }
        if target.positions.iter().any(|q| !q.is_finite() || q.abs() > JOINT_LIMIT) {
            return Ok(PlanResult::Failure("target violates joint limits".to_string()));
        }
        // Straight joint-space moves are straight Cartesian moves for this
        // arm, so the goal clearing the floor means the whole path does.
        let goal = SimArm::forward(&target.positions);
        let floor = self.arm.floor_z();
        if goal.z < floor + self.settings.goal_position_tolerance {
            return Ok(PlanResult::Failure(format!(
                "goal z={:.4} collides with floor at z={floor:.4}",
                goal.z
            )));
        }

        let start = self.arm.joints();
        let distance = start
            .iter()
            .zip(&target.positions)
            .map(|(a, b)| (b - a).abs())
            .fold(0.0, f64::max);
        let duration = self.move_duration(distance);

        let steps = ((duration.as_secs_f64() / WAYPOINT_SPACING.as_secs_f64()).ceil() as usize)
            .clamp(1, MAX_WAYPOINTS - 1);
        let mean_velocity: Vec<f64> = start
            .iter()
            .zip(&target.positions)
            .map(|(a, b)| {
                if duration.is_zero() {
                    0.0
                } else {
                    (b - a) / duration.as_secs_f64()
                }
            })
            .collect();

        let points = (0..=steps)
            .map(|i| {
                let s = i as f64 / steps as f64;
                let at_rest = i == 0 || i == steps;
                TrajectoryPoint {
                    positions: start
                        .iter()
                        .zip(&target.positions)
                        .map(|(a, b)| a + (b - a) * s)
                        .collect(),
                    velocities: if at_rest {
                        vec![0.0; start.len()]
                    } else {
                        mean_velocity.clone()
                    },
                    time_from_start: duration.mul_f64(s),
                }
            })
            .collect();

        debug!(
            distance_rad = distance,
            duration_ms = duration.as_millis() as u64,
            waypoints = steps + 1,
            "sim plan ready"
        );
        Ok(PlanResult::Success(JointTrajectory {
            joint_names: SimArm::joint_names(),
            points,
        }))
    }
}
