//! `teleop-sim` – simulated robot for CI and hardware-free runs
//!
//! Provides stand-ins for every external collaborator of the planning loop
//! so the full bridge can run in tests and on a laptop.
//!
//! # Modules
//!
//! - [`arm`] – [`SimArm`]: shared arm state implementing
//!   [`RobotStateProvider`][teleop_core::RobotStateProvider] and
//!   [`IkSolver`][teleop_core::IkSolver], plus trajectory execution.
//! - [`planner`] – [`SimPlanner`]: a
//!   [`TrajectoryPlanner`][teleop_core::TrajectoryPlanner] honouring
//!   [`PlannerSettings`].
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use teleop_core::{CommandAccumulator, DriverConfig, PlanningCycleDriver};
//! use teleop_middleware::{BusTrajectorySink, EventBus};
//! use teleop_sim::{SIM_PLANNING_GROUP, SimArm, sim_collaborators};
//! use teleop_types::PlannerSettings;
//!
//! let arm = SimArm::new();
//! let sink = BusTrajectorySink::new(EventBus::default(), "teleop-sim::doc");
//! let collaborators = sim_collaborators(
//!     &arm,
//!     SIM_PLANNING_GROUP,
//!     PlannerSettings::default(),
//!     Box::new(sink),
//! )
//! .unwrap();
//! let accumulator = Arc::new(CommandAccumulator::new(1.0).unwrap());
//! let driver =
//!     PlanningCycleDriver::new(accumulator, collaborators, DriverConfig::default()).unwrap();
//! assert_eq!(driver.stats().cycles, 0);
//! ```

pub mod arm;
pub mod planner;

pub use arm::{SIM_JOINT_NAMES, SIM_PLANNING_GROUP, SimArm};
pub use planner::SimPlanner;

use teleop_core::{Collaborators, TrajectorySink};
use teleop_types::{PlannerSettings, TeleopError};

/// Wire `arm` into a complete [`Collaborators`] bundle for the planning loop,
/// publishing to `sink`.
///
/// # Errors
///
/// Returns [`TeleopError::InvalidConfig`] if `planning_group` is not the
/// simulated arm's group or `settings` fail validation.
pub fn sim_collaborators(
    arm: &SimArm,
    planning_group: &str,
    settings: PlannerSettings,
    sink: Box<dyn TrajectorySink>,
) -> Result<Collaborators, TeleopError> {
    if planning_group != SIM_PLANNING_GROUP {
        return Err(TeleopError::InvalidConfig(format!(
            "unknown planning group '{planning_group}'; the simulated arm only has '{SIM_PLANNING_GROUP}'"
        )));
    }
    Ok(Collaborators {
        robot: Box::new(arm.clone()),
        ik: Box::new(arm.clone()),
        planner: Box::new(SimPlanner::new(arm.clone(), settings)?),
        sink,
    })
}
