//! Narrow interfaces to the external motion-planning stack.
//!
//! The planning loop owns one implementation of each trait and calls them
//! from its own thread only, so implementations need `Send` but not `Sync`.
//! Swapping a simulated robot for a real one means swapping these objects;
//! the loop itself never changes.
//!
//! # Failure convention
//!
//! * `Err(_)` – the collaborator itself is unreachable (connection lost,
//!   service crashed).  The loop stops and surfaces the error.
//! * `Ok(None)` / [`PlanResult::Failure`] – the request was served but had
//!   no answer this time.  The cycle is dropped and the loop carries on.

use std::time::Duration;

use teleop_types::{JointSolution, JointState, JointTrajectory, PlanResult, Pose, TeleopError};

/// Live robot state, read at call time.
pub trait RobotStateProvider: Send {
    /// Current end-effector pose.
    fn current_pose(&mut self) -> Result<Pose, TeleopError>;

    /// Current joint positions of the controlled group.
    fn current_joint_state(&mut self) -> Result<JointState, TeleopError>;
}

/// Inverse-kinematics solver.
pub trait IkSolver: Send {
    /// Solve for joint angles placing the end effector of `group` at
    /// `target`, starting the search from `seed`.
    ///
    /// A zero `timeout` means the solver's own default.
    fn solve(
        &mut self,
        group: &str,
        target: &Pose,
        seed: &JointState,
        timeout: Duration,
    ) -> Result<Option<JointSolution>, TeleopError>;
}

/// Trajectory planner and validator.
pub trait TrajectoryPlanner: Send {
    /// Plan a collision-free trajectory from the robot's current state to
    /// `target`, honouring the planner's configured scaling and tolerances.
    fn plan_to_joint_target(&mut self, target: &JointSolution) -> Result<PlanResult, TeleopError>;
}

/// Execution channel for planned trajectories.
pub trait TrajectorySink: Send {
    /// Hand `trajectory` to downstream execution.
    fn publish(&mut self, trajectory: JointTrajectory) -> Result<(), TeleopError>;
}
