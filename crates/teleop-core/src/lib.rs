//! `teleop-core` – the teleoperation control loop
//!
//! Turns a stream of small Cartesian deltas into joint trajectories at a
//! fixed cadence.  Everything here is transport- and robot-agnostic; the
//! robot, IK solver, planner and execution channel are reached through the
//! traits in [`collaborators`].
//!
//! # Modules
//!
//! - [`accumulator`] – [`CommandAccumulator`][accumulator::CommandAccumulator]:
//!   mutex-guarded running sum of scaled operator deltas with an atomic
//!   read-and-clear.  The only state shared across threads.
//! - [`motion_gate`] – [`is_significant`][motion_gate::is_significant]:
//!   suppresses planning for noise-level offsets.
//! - [`collaborators`] – [`RobotStateProvider`], [`IkSolver`],
//!   [`TrajectoryPlanner`] and [`TrajectorySink`].
//! - [`driver`] – [`PlanningCycleDriver`][driver::PlanningCycleDriver]:
//!   the periodic Gated → PlanningRequested → Dispatched/Rejected loop.

pub mod accumulator;
pub mod collaborators;
pub mod driver;
pub mod motion_gate;

pub use accumulator::CommandAccumulator;
pub use collaborators::{IkSolver, RobotStateProvider, TrajectoryPlanner, TrajectorySink};
pub use driver::{
    Collaborators, CycleOutcome, CycleStats, DriverConfig, PlanningCycleDriver, RejectReason,
};
pub use motion_gate::{MOTION_EPSILON, is_significant};
