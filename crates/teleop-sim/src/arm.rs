//! [`SimArm`] – an in-process 6-DOF arm for headless runs and CI.
//!
//! The arm uses a decoupled kinematic model: the first three joints move the
//! tool centre point linearly along x, y and z (`METRES_PER_RADIAN` each),
//! and the three wrist joints only ever hold their angle.  That keeps IK
//! closed-form while still exercising every path of the planning loop:
//! unreachable targets, orientation changes the wrist cannot make, planner
//! rejections and lost connections.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use teleop_core::{IkSolver, RobotStateProvider};
//! use teleop_sim::SimArm;
//! use teleop_types::Vec3;
//!
//! let mut arm = SimArm::new();
//! let pose = arm.current_pose().unwrap();
//! let seed = arm.current_joint_state().unwrap();
//! let target = pose.translated(Vec3::new(0.01, 0.0, 0.0));
//!
//! let solution = arm
//!     .solve("ur_manipulator", &target, &seed, Duration::ZERO)
//!     .unwrap()
//!     .expect("target is inside the workspace");
//! assert!((solution.positions[0] - 0.02).abs() < 1e-12);
//! ```

use std::f64::consts::PI;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use teleop_core::{IkSolver, RobotStateProvider};
use teleop_types::{
    JointSolution, JointState, JointTrajectory, Pose, Quaternion, TeleopError, Vec3,
};
use tracing::{debug, info};

/// Cartesian travel of the tool per radian of each positioning joint.
pub const METRES_PER_RADIAN: f64 = 0.5;

/// Symmetric limit on every joint, in radians.
pub const JOINT_LIMIT: f64 = PI;

/// Tool position with all joints at zero.
pub const HOME_POSITION: Vec3 = Vec3::new(0.4, 0.0, 0.4);

/// Joint model group the simulated arm answers to.
pub const SIM_PLANNING_GROUP: &str = "ur_manipulator";

/// Joint names of the simulated group, base to tool.
pub const SIM_JOINT_NAMES: [&str; 6] = [
    "shoulder_pan_joint",
    "shoulder_lift_joint",
    "elbow_joint",
    "wrist_1_joint",
    "wrist_2_joint",
    "wrist_3_joint",
];

#[derive(Debug)]
struct ArmState {
    joints: [f64; 6],
    orientation: Quaternion,
    floor_z: f64,
    online: bool,
    planner_failure: Option<String>,
}

/// Cloneable handle to one simulated arm.  All clones see the same state.
#[derive(Debug, Clone)]
pub struct SimArm {
    state: Arc<Mutex<ArmState>>,
}

impl Default for SimArm {
    fn default() -> Self {
        Self::new()
    }
}

impl SimArm {
    /// An online arm at its home configuration with the floor at `z = 0`.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ArmState {
                joints: [0.0; 6],
                orientation: Quaternion::identity(),
                floor_z: 0.0,
                online: true,
                planner_failure: None,
            })),
        }
    }

    /// Tool position for the given joint angles.
    pub fn forward(joints: &[f64]) -> Vec3 {
        let q = |i: usize| joints.get(i).copied().unwrap_or(0.0);
        HOME_POSITION + Vec3::new(q(0), q(1), q(2)) * METRES_PER_RADIAN
    }

    /// Joint names as owned strings.
    pub fn joint_names() -> Vec<String> {
        SIM_JOINT_NAMES.iter().map(|s| s.to_string()).collect()
    }

    /// Current joint angles.
    pub fn joints(&self) -> [f64; 6] {
        self.lock().joints
    }

    /// Teleport the arm to `joints`, bypassing planning.
    pub fn set_joints(&self, joints: [f64; 6]) {
        self.lock().joints = joints;
    }

    /// Height of the collision floor.
    pub fn floor_z(&self) -> f64 {
        self.lock().floor_z
    }

    pub fn set_floor_z(&self, z: f64) {
        self.lock().floor_z = z;
    }

    /// Simulate losing (or regaining) the connection to the robot and its
    /// planning services.
    pub fn set_online(&self, online: bool) {
        self.lock().online = online;
    }

    /// Make every plan fail with `reason` until cleared with `None`.
    pub fn set_planner_failure(&self, reason: Option<String>) {
        self.lock().planner_failure = reason;
    }

    pub(crate) fn planner_failure(&self) -> Option<String> {
        self.lock().planner_failure.clone()
    }

    pub(crate) fn ensure_online(&self, service: &str) -> Result<(), TeleopError> {
        if self.lock().online {
            Ok(())
        } else {
            Err(TeleopError::ServiceUnavailable {
                service: service.to_string(),
                details: "simulated arm is offline".to_string(),
            })
        }
    }

    /// Execute `trajectory` by moving straight to its last waypoint.
    ///
    /// # Errors
    ///
    /// Returns [`TeleopError::InvalidConfig`] if the trajectory's joints do
    /// not match this arm, and [`TeleopError::StateUnavailable`] when offline.
    pub fn execute(&self, trajectory: &JointTrajectory) -> Result<(), TeleopError> {
        if trajectory.joint_names != Self::joint_names() {
            return Err(TeleopError::InvalidConfig(format!(
                "trajectory joints {:?} do not match the simulated arm",
                trajectory.joint_names
            )));
        }
        let Some(last) = trajectory.final_positions() else {
            return Ok(());
        };
        let mut state = self.lock();
        if !state.online {
            return Err(TeleopError::StateUnavailable(
                "simulated arm is offline".to_string(),
            ));
        }
        for (joint, target) in state.joints.iter_mut().zip(last) {
            *joint = *target;
        }
        let tcp = Self::forward(&state.joints);
        info!(
            x = tcp.x,
            y = tcp.y,
            z = tcp.z,
            duration_ms = trajectory.duration().as_millis() as u64,
            "sim arm executed trajectory"
        );
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, ArmState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RobotStateProvider for SimArm {
    fn current_pose(&mut self) -> Result<Pose, TeleopError> {
        let state = self.lock();
        if !state.online {
            return Err(TeleopError::StateUnavailable(
                "simulated arm is offline".to_string(),
            ));
        }
        Ok(Pose::new(Self::forward(&state.joints), state.orientation))
    }

    fn current_joint_state(&mut self) -> Result<JointState, TeleopError> {
        let state = self.lock();
        if !state.online {
            return Err(TeleopError::StateUnavailable(
                "simulated arm is offline".to_string(),
            ));
        }
        Ok(JointState {
            names: Self::joint_names(),
            positions: state.joints.to_vec(),
        })
    }
}

impl IkSolver for SimArm {
    fn solve(
        &mut self,
        group: &str,
        target: &Pose,
        seed: &JointState,
        _timeout: Duration,
    ) -> Result<Option<JointSolution>, TeleopError> {
        self.ensure_online("ik")?;
        // The group is checked once by `sim_collaborators`; any other group
        // simply has no joints here to solve for.
        if group != SIM_PLANNING_GROUP {
            debug!(group, "IK requested for an unknown group; no solution");
            return Ok(None);
        }
        if seed.positions.len() != SIM_JOINT_NAMES.len() {
            return Err(TeleopError::InvalidConfig(format!(
                "IK seed has {} joints, expected {}",
                seed.positions.len(),
                SIM_JOINT_NAMES.len()
            )));
        }
        // The wrist only holds its angle, so any orientation change is out of reach.
        if target.orientation != self.lock().orientation {
            debug!("IK target changes orientation; no solution");
            return Ok(None);
        }

        let rel = Vec3::new(
            target.position.x - HOME_POSITION.x,
            target.position.y - HOME_POSITION.y,
            target.position.z - HOME_POSITION.z,
        ) * (1.0 / METRES_PER_RADIAN);
        let mut positions = seed.positions.clone();
        positions[0] = rel.x;
        positions[1] = rel.y;
        positions[2] = rel.z;

        if positions[..3].iter().any(|q| q.abs() > JOINT_LIMIT) {
            debug!(
                x = target.position.x,
                y = target.position.y,
                z = target.position.z,
                "IK target outside workspace"
            );
            return Ok(None);
        }
        Ok(Some(JointSolution {
            names: Self::joint_names(),
            positions,
        }))
    }
}
