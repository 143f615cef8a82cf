use std::ops::{Add, Mul};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// ────────────────────────────────────────────────────────────────────────────
// Geometry
// ────────────────────────────────────────────────────────────────────────────

/// A Cartesian 3-vector in metres (positions and displacements).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    /// Create a new vector.
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// The zero vector.
    pub const fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    /// `true` when no component is NaN or infinite.
    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl Add for Vec3 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Mul<f64> for Vec3 {
    type Output = Self;

    fn mul(self, k: f64) -> Self {
        Self::new(self.x * k, self.y * k, self.z * k)
    }
}

/// A unit quaternion (w, x, y, z convention).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub w: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Quaternion {
    /// Create a quaternion.  The caller is responsible for providing a unit
    /// quaternion (|q| = 1).
    pub const fn new(w: f64, x: f64, y: f64, z: f64) -> Self {
        Self { w, x, y, z }
    }

    /// The identity rotation.
    pub const fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 0.0)
    }
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::identity()
    }
}

/// End-effector pose: Cartesian position plus orientation.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub position: Vec3,
    pub orientation: Quaternion,
}

impl Pose {
    pub const fn new(position: Vec3, orientation: Quaternion) -> Self {
        Self {
            position,
            orientation,
        }
    }

    /// Return this pose shifted by `offset`.  Orientation is carried over
    /// unchanged.
    pub fn translated(self, offset: Vec3) -> Self {
        Self {
            position: self.position + offset,
            orientation: self.orientation,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Operator input
// ────────────────────────────────────────────────────────────────────────────

/// One incremental motion command from the operator's input device.
///
/// Raw, unscaled displacement.  The accumulator multiplies it by the
/// configured sensitivity before adding it to the pending offset.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MotionDelta {
    pub dx: f64,
    pub dy: f64,
    pub dz: f64,
}

impl MotionDelta {
    pub const fn new(dx: f64, dy: f64, dz: f64) -> Self {
        Self { dx, dy, dz }
    }

    /// View the delta as a displacement vector.
    pub fn as_vec3(self) -> Vec3 {
        Vec3::new(self.dx, self.dy, self.dz)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Joint space
// ────────────────────────────────────────────────────────────────────────────

/// Live joint positions of the controlled group, in radians.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct JointState {
    pub names: Vec<String>,
    pub positions: Vec<f64>,
}

/// Joint angles produced by inverse kinematics for a target pose.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct JointSolution {
    pub names: Vec<String>,
    pub positions: Vec<f64>,
}

/// A single timed waypoint of a [`JointTrajectory`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TrajectoryPoint {
    pub positions: Vec<f64>,
    pub velocities: Vec<f64>,
    pub time_from_start: Duration,
}

/// Ordered joint-position waypoints with timing, as handed to the execution
/// channel.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct JointTrajectory {
    pub joint_names: Vec<String>,
    pub points: Vec<TrajectoryPoint>,
}

impl JointTrajectory {
    /// Number of waypoints.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Time stamp of the last waypoint, or zero for an empty trajectory.
    pub fn duration(&self) -> Duration {
        self.points
            .last()
            .map(|p| p.time_from_start)
            .unwrap_or_default()
    }

    /// Joint positions of the last waypoint.
    pub fn final_positions(&self) -> Option<&[f64]> {
        self.points.last().map(|p| p.positions.as_slice())
    }

    /// `true` when the trajectory has at least one waypoint, every waypoint
    /// carries one position per joint, and time stamps never go backwards.
    pub fn is_well_formed(&self) -> bool {
        let n = self.joint_names.len();
        !self.points.is_empty()
            && self.points.iter().all(|p| {
                p.positions.len() == n && (p.velocities.is_empty() || p.velocities.len() == n)
            })
            && self
                .points
                .windows(2)
                .all(|w| w[0].time_from_start <= w[1].time_from_start)
    }
}

/// Outcome of asking the planner for a trajectory to a joint target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PlanResult {
    /// A validated, collision-checked trajectory ready for execution.
    Success(JointTrajectory),
    /// The planner could not produce a trajectory; the string is the
    /// planner's own explanation.
    Failure(String),
}

/// Velocity/acceleration scaling and goal tolerances enforced by the planner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerSettings {
    /// Fraction of each joint's maximum velocity, in `(0, 1]`.
    pub max_velocity_scaling: f64,
    /// Fraction of each joint's maximum acceleration, in `(0, 1]`.
    pub max_acceleration_scaling: f64,
    /// Goal position tolerance in metres.
    pub goal_position_tolerance: f64,
    /// Goal orientation tolerance in radians.
    pub goal_orientation_tolerance: f64,
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self {
            max_velocity_scaling: 0.1,
            max_acceleration_scaling: 0.1,
            goal_position_tolerance: 0.0005,
            goal_orientation_tolerance: 0.001,
        }
    }
}

impl PlannerSettings {
    /// Check that both scaling factors lie in `(0, 1]` and both tolerances
    /// are positive.
    pub fn validate(&self) -> Result<(), TeleopError> {
        let in_unit = |v: f64| v > 0.0 && v <= 1.0;
        if !in_unit(self.max_velocity_scaling) {
            return Err(TeleopError::InvalidConfig(format!(
                "max_velocity_scaling must be in (0, 1], got {}",
                self.max_velocity_scaling
            )));
        }
        if !in_unit(self.max_acceleration_scaling) {
            return Err(TeleopError::InvalidConfig(format!(
                "max_acceleration_scaling must be in (0, 1], got {}",
                self.max_acceleration_scaling
            )));
        }
        if !(self.goal_position_tolerance > 0.0 && self.goal_orientation_tolerance > 0.0) {
            return Err(TeleopError::InvalidConfig(
                "goal tolerances must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Bus envelope
// ────────────────────────────────────────────────────────────────────────────

/// Unified event wrapper for the bridge's publish/subscribe bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g. `"teleop-cli::stdin"`
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    /// Wrap `payload` in a freshly stamped event.
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Variants of data routed over the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    /// Operator input destined for the accumulator.
    MotionCommand(MotionDelta),
    /// A planned trajectory destined for the execution channel.
    Trajectory(JointTrajectory),
}

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

/// Error type shared by every crate in the bridge.
///
/// `StateUnavailable`, `ServiceUnavailable` and `Channel` are fatal for the
/// planning loop: they mean a collaborator is gone, not that one cycle failed.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TeleopError {
    #[error("Invalid motion delta: {0}")]
    InvalidDelta(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Robot state unavailable: {0}")]
    StateUnavailable(String),

    #[error("Service {service} unavailable: {details}")]
    ServiceUnavailable { service: String, details: String },

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Parsing error: {0}")]
    Parsing(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl TeleopError {
    /// `true` for errors that should stop the planning loop and be surfaced
    /// to the process supervisor.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TeleopError::StateUnavailable(_)
                | TeleopError::ServiceUnavailable { .. }
                | TeleopError::Channel(_)
        )
    }
}
