//! [`PlanningCycleDriver`] – the fixed-cadence planning loop.
//!
//! Each cycle walks the same state machine:
//!
//! ```text
//! Idle ──sleep(period)──▶ Gated ──significant──▶ PlanningRequested ──▶ Dispatched
//!   ▲                       │                           │                  │
//!   │                       └──noise──┐                 └──▶ Rejected      │
//!   └─────────────────────────────────┴──────────────────────────┴─────────┘
//! ```
//!
//! 1. **Gated** – read-and-clear the [`CommandAccumulator`].  If the snapshot
//!    fails the [motion gate](crate::motion_gate), go back to sleep without
//!    contacting anything.
//! 2. **PlanningRequested** – read the robot's *current* pose and joint state,
//!    shift the pose by the snapshot (orientation untouched), solve IK seeded
//!    from the current joints, then ask the planner for a trajectory to the
//!    solution.
//! 3. **Dispatched** – publish the planner's trajectory verbatim.
//! 4. **Rejected** – no IK solution or planner failure.  The snapshot is
//!    dropped, never restored: the robot may have moved since, and the
//!    operator's next input accumulates against a clean baseline.
//!
//! The offset is cleared before any planning starts, so input arriving while
//! a plan is in flight lands in the next cycle instead of being lost or
//! applied twice.  Planning calls block; a slow planner stretches the cycle
//! rather than overlapping two requests.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::sync::atomic::AtomicBool;
//! use teleop_core::{CommandAccumulator, Collaborators, DriverConfig, PlanningCycleDriver};
//!
//! # fn collaborators() -> Collaborators { unimplemented!() }
//! let accumulator = Arc::new(CommandAccumulator::new(1.0).unwrap());
//! let driver = PlanningCycleDriver::new(
//!     Arc::clone(&accumulator),
//!     collaborators(),
//!     DriverConfig::default(),
//! )
//! .unwrap();
//! let shutdown = Arc::new(AtomicBool::new(false));
//! let handle = driver.spawn(Arc::clone(&shutdown)).unwrap();
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use teleop_types::{PlanResult, TeleopError};
use tracing::{debug, error, info, warn};

use crate::accumulator::CommandAccumulator;
use crate::collaborators::{IkSolver, RobotStateProvider, TrajectoryPlanner, TrajectorySink};
use crate::motion_gate;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Nominal control period.
pub const DEFAULT_CYCLE_PERIOD: Duration = Duration::from_millis(100);

/// Joint model group driven by default.
pub const DEFAULT_PLANNING_GROUP: &str = "ur_manipulator";

/// Configuration bundle for [`PlanningCycleDriver`].
#[derive(Debug, Clone, PartialEq)]
pub struct DriverConfig {
    /// Sleep between the end of one cycle and the start of the next.
    pub period: Duration,
    /// Joint model group passed to the IK solver.
    pub planning_group: String,
    /// IK time budget; zero lets the solver use its own default.
    pub ik_timeout: Duration,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            period: DEFAULT_CYCLE_PERIOD,
            planning_group: DEFAULT_PLANNING_GROUP.to_string(),
            ik_timeout: Duration::ZERO,
        }
    }
}

impl DriverConfig {
    /// # Errors
    ///
    /// Returns [`TeleopError::InvalidConfig`] for a zero period or an empty
    /// planning group.
    pub fn validate(&self) -> Result<(), TeleopError> {
        if self.period.is_zero() {
            return Err(TeleopError::InvalidConfig(
                "cycle period must be greater than zero".to_string(),
            ));
        }
        if self.planning_group.trim().is_empty() {
            return Err(TeleopError::InvalidConfig(
                "planning group must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// The external services the driver owns for its whole lifetime.
pub struct Collaborators {
    pub robot: Box<dyn RobotStateProvider>,
    pub ik: Box<dyn IkSolver>,
    pub planner: Box<dyn TrajectoryPlanner>,
    pub sink: Box<dyn TrajectorySink>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Cycle results
// ─────────────────────────────────────────────────────────────────────────────

/// Why a cycle ended without dispatching anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// IK found no joint configuration for the target pose.
    NoIkSolution,
    /// The planner reported failure, or returned a malformed trajectory.
    PlannerFailure(String),
}

/// What a single call to [`PlanningCycleDriver::run_cycle`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The offset was below the motion gate; nothing was contacted.
    Suppressed,
    /// A trajectory with `waypoints` points was published.
    Dispatched { waypoints: usize },
    /// Planning was attempted and abandoned.
    Rejected(RejectReason),
}

/// Running counters over the driver's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleStats {
    pub cycles: u64,
    pub suppressed: u64,
    pub dispatched: u64,
    pub rejected: u64,
}

impl CycleStats {
    fn record(&mut self, outcome: &CycleOutcome) {
        self.cycles += 1;
        match outcome {
            CycleOutcome::Suppressed => self.suppressed += 1,
            CycleOutcome::Dispatched { .. } => self.dispatched += 1,
            CycleOutcome::Rejected(_) => self.rejected += 1,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Driver
// ─────────────────────────────────────────────────────────────────────────────

/// Converts accumulated operator input into dispatched joint trajectories,
/// one cycle at a time.
pub struct PlanningCycleDriver {
    accumulator: Arc<CommandAccumulator>,
    robot: Box<dyn RobotStateProvider>,
    ik: Box<dyn IkSolver>,
    planner: Box<dyn TrajectoryPlanner>,
    sink: Box<dyn TrajectorySink>,
    config: DriverConfig,
    stats: CycleStats,
}

impl PlanningCycleDriver {
    /// # Errors
    ///
    /// Returns [`TeleopError::InvalidConfig`] if `config` fails validation.
    pub fn new(
        accumulator: Arc<CommandAccumulator>,
        collaborators: Collaborators,
        config: DriverConfig,
    ) -> Result<Self, TeleopError> {
        config.validate()?;
        let Collaborators {
            robot,
            ik,
            planner,
            sink,
        } = collaborators;
        Ok(Self {
            accumulator,
            robot,
            ik,
            planner,
            sink,
            config,
            stats: CycleStats::default(),
        })
    }

    pub fn stats(&self) -> CycleStats {
        self.stats
    }

    /// Run one Gated → PlanningRequested → Dispatched/Rejected pass without
    /// sleeping.
    ///
    /// # Errors
    ///
    /// Only fatal collaborator errors are returned.  The offset has already
    /// been cleared by then.
    pub fn run_cycle(&mut self) -> Result<CycleOutcome, TeleopError> {
        let outcome = self.plan_once()?;
        self.stats.record(&outcome);
        Ok(outcome)
    }

    fn plan_once(&mut self) -> Result<CycleOutcome, TeleopError> {
        // ── Gated ──────────────────────────────────────────────────────────
        let offset = self.accumulator.take();
        if !motion_gate::is_significant(offset) {
            return Ok(CycleOutcome::Suppressed);
        }

        // ── PlanningRequested ──────────────────────────────────────────────
        let current = self.robot.current_pose()?;
        let seed = self.robot.current_joint_state()?;
        let target = current.translated(offset);
        debug!(
            x = target.position.x,
            y = target.position.y,
            z = target.position.z,
            "goal pos"
        );

        let Some(solution) = self.ik.solve(
            &self.config.planning_group,
            &target,
            &seed,
            self.config.ik_timeout,
        )?
        else {
            warn!(
                group = %self.config.planning_group,
                x = target.position.x,
                y = target.position.y,
                z = target.position.z,
                "no IK solution; dropping offset"
            );
            return Ok(CycleOutcome::Rejected(RejectReason::NoIkSolution));
        };

        let trajectory = match self.planner.plan_to_joint_target(&solution)? {
            PlanResult::Success(trajectory) => trajectory,
            PlanResult::Failure(reason) => {
                warn!(reason = %reason, "planning failed; dropping offset");
                return Ok(CycleOutcome::Rejected(RejectReason::PlannerFailure(reason)));
            }
        };
        if !trajectory.is_well_formed() {
            warn!(
                waypoints = trajectory.len(),
                joints = trajectory.joint_names.len(),
                "planner returned a malformed trajectory; dropping offset"
            );
            return Ok(CycleOutcome::Rejected(RejectReason::PlannerFailure(
                "malformed trajectory".to_string(),
            )));
        }

        // ── Dispatched ─────────────────────────────────────────────────────
        let waypoints = trajectory.len();
        self.sink.publish(trajectory)?;
        debug!(waypoints, "trajectory dispatched");
        Ok(CycleOutcome::Dispatched { waypoints })
    }

    /// Sleep–cycle until `shutdown` is raised.
    ///
    /// # Errors
    ///
    /// Stops at the first fatal collaborator error and returns it.
    pub fn run(&mut self, shutdown: &AtomicBool) -> Result<CycleStats, TeleopError> {
        info!(
            period_ms = self.config.period.as_millis() as u64,
            group = %self.config.planning_group,
            scale = self.accumulator.scale(),
            "planning loop started"
        );
        while !shutdown.load(Ordering::Acquire) {
            thread::sleep(self.config.period);
            if shutdown.load(Ordering::Acquire) {
                break;
            }
            if let Err(e) = self.run_cycle() {
                error!(error = %e, "planning loop stopped on fatal error");
                return Err(e);
            }
        }
        info!(
            cycles = self.stats.cycles,
            dispatched = self.stats.dispatched,
            rejected = self.stats.rejected,
            suppressed = self.stats.suppressed,
            "planning loop stopped"
        );
        Ok(self.stats)
    }

    /// Move the driver onto its own thread and [`run`](Self::run) it there.
    pub fn spawn(
        mut self,
        shutdown: Arc<AtomicBool>,
    ) -> std::io::Result<JoinHandle<Result<CycleStats, TeleopError>>> {
        thread::Builder::new()
            .name("teleop-planner".to_string())
            .spawn(move || self.run(&shutdown))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Instant;
    use teleop_types::{
        JointSolution, JointState, JointTrajectory, MotionDelta, Pose, Quaternion,
        TrajectoryPoint, Vec3,
    };

    // ------------------------------------------------------------------
    // Test doubles sharing one recording
    // ------------------------------------------------------------------

    struct Recording {
        pose: Pose,
        joints: Vec<f64>,
        ik_answers: bool,
        plan_result: Option<PlanResult>,
        fail_state: bool,
        ik_requests: Vec<(String, Pose, JointState)>,
        plan_requests: Vec<JointSolution>,
        published: Vec<JointTrajectory>,
    }

    impl Default for Recording {
        fn default() -> Self {
            Self {
                pose: Pose::default(),
                joints: vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6],
                ik_answers: true,
                plan_result: None,
                fail_state: false,
                ik_requests: Vec::new(),
                plan_requests: Vec::new(),
                published: Vec::new(),
            }
        }
    }

    type Shared = Arc<Mutex<Recording>>;

    fn names() -> Vec<String> {
        (1..=6).map(|i| format!("joint_{i}")).collect()
    }

    fn trajectory_to(positions: &[f64]) -> JointTrajectory {
        JointTrajectory {
            joint_names: names(),
            points: vec![
                TrajectoryPoint {
                    positions: vec![0.0; 6],
                    velocities: Vec::new(),
                    time_from_start: Duration::ZERO,
                },
                TrajectoryPoint {
                    positions: positions.to_vec(),
                    velocities: Vec::new(),
                    time_from_start: Duration::from_millis(200),
                },
            ],
        }
    }

    struct MockRobot(Shared);
    impl RobotStateProvider for MockRobot {
        fn current_pose(&mut self) -> Result<Pose, TeleopError> {
            let rec = self.0.lock().unwrap();
            if rec.fail_state {
                return Err(TeleopError::StateUnavailable("robot offline".into()));
            }
            Ok(rec.pose)
        }
        fn current_joint_state(&mut self) -> Result<JointState, TeleopError> {
            let rec = self.0.lock().unwrap();
            Ok(JointState {
                names: names(),
                positions: rec.joints.clone(),
            })
        }
    }

    struct MockIk(Shared);
    impl IkSolver for MockIk {
        fn solve(
            &mut self,
            group: &str,
            target: &Pose,
            seed: &JointState,
            _timeout: Duration,
        ) -> Result<Option<JointSolution>, TeleopError> {
            let mut rec = self.0.lock().unwrap();
            rec.ik_requests
                .push((group.to_string(), *target, seed.clone()));
            if !rec.ik_answers {
                return Ok(None);
            }
            Ok(Some(JointSolution {
                names: names(),
                positions: vec![target.position.x, target.position.y, target.position.z, 0.0, 0.0, 0.0],
            }))
        }
    }

    struct MockPlanner(Shared);
    impl TrajectoryPlanner for MockPlanner {
        fn plan_to_joint_target(&mut self, target: &JointSolution) -> Result<PlanResult, TeleopError> {
            let mut rec = self.0.lock().unwrap();
            rec.plan_requests.push(target.clone());
            Ok(rec
                .plan_result
                .clone()
                .unwrap_or_else(|| PlanResult::Success(trajectory_to(&target.positions))))
        }
    }

    struct MockSink(Shared);
    impl TrajectorySink for MockSink {
        fn publish(&mut self, trajectory: JointTrajectory) -> Result<(), TeleopError> {
            self.0.lock().unwrap().published.push(trajectory);
            Ok(())
        }
    }

    fn make_driver(config: DriverConfig) -> (Arc<CommandAccumulator>, Shared, PlanningCycleDriver) {
        let acc = Arc::new(CommandAccumulator::new(1.0).unwrap());
        let rec: Shared = Arc::new(Mutex::new(Recording::default()));
        let driver = PlanningCycleDriver::new(
            Arc::clone(&acc),
            Collaborators {
                robot: Box::new(MockRobot(Arc::clone(&rec))),
                ik: Box::new(MockIk(Arc::clone(&rec))),
                planner: Box::new(MockPlanner(Arc::clone(&rec))),
                sink: Box::new(MockSink(Arc::clone(&rec))),
            },
            config,
        )
        .unwrap();
        (acc, rec, driver)
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    // ------------------------------------------------------------------
    // Cycle outcomes
    // ------------------------------------------------------------------

    #[test]
    fn combined_deltas_produce_one_planning_request() {
        let (acc, rec, mut driver) = make_driver(DriverConfig::default());
        acc.accumulate(MotionDelta::new(0.001, 0.0, 0.0)).unwrap();
        acc.accumulate(MotionDelta::new(0.001, 0.0, 0.0)).unwrap();
        acc.accumulate(MotionDelta::new(0.0005, 0.0, 0.0)).unwrap();

        let outcome = driver.run_cycle().unwrap();
        assert_eq!(outcome, CycleOutcome::Dispatched { waypoints: 2 });

        let rec = rec.lock().unwrap();
        assert_eq!(rec.ik_requests.len(), 1);
        assert_eq!(rec.plan_requests.len(), 1);
        assert_eq!(rec.published.len(), 1);
        assert!(close(rec.ik_requests[0].1.position.x, 0.0025));
        assert_eq!(acc.take(), Vec3::zero());
    }

    #[test]
    fn noise_level_input_is_suppressed_and_cleared() {
        let (acc, rec, mut driver) = make_driver(DriverConfig::default());
        acc.accumulate(MotionDelta::new(0.00001, 0.00002, 0.0)).unwrap();

        assert_eq!(driver.run_cycle().unwrap(), CycleOutcome::Suppressed);

        let rec = rec.lock().unwrap();
        assert!(rec.ik_requests.is_empty());
        assert!(rec.plan_requests.is_empty());
        assert!(rec.published.is_empty());
        assert_eq!(acc.take(), Vec3::zero());
    }

    #[test]
    fn ik_failure_dispatches_nothing_and_drops_offset() {
        let (acc, rec, mut driver) = make_driver(DriverConfig::default());
        {
            let mut r = rec.lock().unwrap();
            r.pose = Pose::new(Vec3::new(1.0, 0.0, 0.0), Quaternion::identity());
            r.ik_answers = false;
        }
        acc.accumulate(MotionDelta::new(0.01, 0.0, 0.0)).unwrap();

        assert_eq!(
            driver.run_cycle().unwrap(),
            CycleOutcome::Rejected(RejectReason::NoIkSolution)
        );
        assert!(rec.lock().unwrap().published.is_empty());
        assert!(rec.lock().unwrap().plan_requests.is_empty());
        assert_eq!(acc.take(), Vec3::zero());

        // No new input: nothing left over to plan for.
        assert_eq!(driver.run_cycle().unwrap(), CycleOutcome::Suppressed);
        assert_eq!(rec.lock().unwrap().ik_requests.len(), 1);

        // Fresh input is applied to the current pose only.
        rec.lock().unwrap().ik_answers = true;
        acc.accumulate(MotionDelta::new(0.0, 0.002, 0.0)).unwrap();
        driver.run_cycle().unwrap();
        let r = rec.lock().unwrap();
        let target = r.ik_requests[1].1.position;
        assert!(close(target.x, 1.0));
        assert!(close(target.y, 0.002));
    }

    #[test]
    fn planner_failure_dispatches_nothing() {
        let (acc, rec, mut driver) = make_driver(DriverConfig::default());
        rec.lock().unwrap().plan_result = Some(PlanResult::Failure("goal in collision".into()));
        acc.accumulate(MotionDelta::new(0.0, 0.0, 0.05)).unwrap();

        assert_eq!(
            driver.run_cycle().unwrap(),
            CycleOutcome::Rejected(RejectReason::PlannerFailure("goal in collision".into()))
        );
        assert!(rec.lock().unwrap().published.is_empty());
        assert_eq!(acc.take(), Vec3::zero());
    }

    #[test]
    fn malformed_trajectory_is_not_dispatched() {
        let (acc, rec, mut driver) = make_driver(DriverConfig::default());
        rec.lock().unwrap().plan_result = Some(PlanResult::Success(JointTrajectory::default()));
        acc.accumulate(MotionDelta::new(0.01, 0.0, 0.0)).unwrap();

        assert!(matches!(
            driver.run_cycle().unwrap(),
            CycleOutcome::Rejected(RejectReason::PlannerFailure(_))
        ));
        assert!(rec.lock().unwrap().published.is_empty());
    }

    #[test]
    fn successful_cycle_leaves_no_residual_offset() {
        let (acc, rec, mut driver) = make_driver(DriverConfig::default());
        rec.lock().unwrap().pose = Pose::new(Vec3::new(0.4, 0.1, 0.3), Quaternion::identity());
        acc.accumulate(MotionDelta::new(0.01, 0.0, 0.0)).unwrap();
        assert!(matches!(driver.run_cycle().unwrap(), CycleOutcome::Dispatched { .. }));

        assert_eq!(driver.run_cycle().unwrap(), CycleOutcome::Suppressed);

        acc.accumulate(MotionDelta::new(0.0, 0.0, 0.001)).unwrap();
        driver.run_cycle().unwrap();
        let r = rec.lock().unwrap();
        assert_eq!(r.ik_requests.len(), 2);
        let target = r.ik_requests[1].1.position;
        assert!(close(target.x, 0.4));
        assert!(close(target.y, 0.1));
        assert!(close(target.z, 0.301));
    }

    #[test]
    fn target_is_relative_to_current_pose_not_previous_target() {
        let (acc, rec, mut driver) = make_driver(DriverConfig::default());
        rec.lock().unwrap().pose = Pose::new(Vec3::new(1.0, 0.0, 0.0), Quaternion::identity());
        acc.accumulate(MotionDelta::new(0.1, 0.0, 0.0)).unwrap();
        driver.run_cycle().unwrap();

        // The robot has only covered part of the first trajectory.
        rec.lock().unwrap().pose = Pose::new(Vec3::new(1.03, 0.0, 0.0), Quaternion::identity());
        acc.accumulate(MotionDelta::new(0.1, 0.0, 0.0)).unwrap();
        driver.run_cycle().unwrap();

        let r = rec.lock().unwrap();
        assert!(close(r.ik_requests[0].1.position.x, 1.1));
        assert!(close(r.ik_requests[1].1.position.x, 1.13));
    }

    #[test]
    fn ik_is_seeded_from_current_joints_and_keeps_orientation() {
        let config = DriverConfig {
            planning_group: "left_arm".to_string(),
            ..DriverConfig::default()
        };
        let (acc, rec, mut driver) = make_driver(config);
        let orientation = Quaternion::new(0.0, 0.0, 1.0, 0.0);
        {
            let mut r = rec.lock().unwrap();
            r.pose = Pose::new(Vec3::new(0.2, 0.2, 0.2), orientation);
            r.joints = vec![1.0, -1.0, 0.5, 0.0, 0.25, 3.0];
        }
        acc.accumulate(MotionDelta::new(0.0, -0.01, 0.0)).unwrap();
        driver.run_cycle().unwrap();

        let r = rec.lock().unwrap();
        let (group, target, seed) = &r.ik_requests[0];
        assert_eq!(group, "left_arm");
        assert_eq!(target.orientation, orientation);
        assert_eq!(seed.positions, vec![1.0, -1.0, 0.5, 0.0, 0.25, 3.0]);
    }

    #[test]
    fn dispatched_trajectory_is_published_verbatim() {
        let (acc, rec, mut driver) = make_driver(DriverConfig::default());
        let planned = trajectory_to(&[0.9, 0.8, 0.7, 0.6, 0.5, 0.4]);
        rec.lock().unwrap().plan_result = Some(PlanResult::Success(planned.clone()));
        acc.accumulate(MotionDelta::new(0.01, 0.0, 0.0)).unwrap();
        driver.run_cycle().unwrap();
        assert_eq!(rec.lock().unwrap().published, vec![planned]);
    }

    #[test]
    fn fatal_state_error_propagates_after_clearing_offset() {
        let (acc, rec, mut driver) = make_driver(DriverConfig::default());
        rec.lock().unwrap().fail_state = true;
        acc.accumulate(MotionDelta::new(0.01, 0.0, 0.0)).unwrap();

        let err = driver.run_cycle().unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(acc.take(), Vec3::zero());
        assert_eq!(driver.stats().cycles, 0);
    }

    #[test]
    fn stats_count_each_outcome() {
        let (acc, rec, mut driver) = make_driver(DriverConfig::default());
        driver.run_cycle().unwrap();
        acc.accumulate(MotionDelta::new(0.01, 0.0, 0.0)).unwrap();
        driver.run_cycle().unwrap();
        rec.lock().unwrap().ik_answers = false;
        acc.accumulate(MotionDelta::new(0.01, 0.0, 0.0)).unwrap();
        driver.run_cycle().unwrap();

        assert_eq!(
            driver.stats(),
            CycleStats {
                cycles: 3,
                suppressed: 1,
                dispatched: 1,
                rejected: 1,
            }
        );
    }

    #[test]
    fn invalid_config_is_rejected() {
        let zero_period = DriverConfig {
            period: Duration::ZERO,
            ..DriverConfig::default()
        };
        assert!(zero_period.validate().is_err());
        let no_group = DriverConfig {
            planning_group: "  ".to_string(),
            ..DriverConfig::default()
        };
        assert!(no_group.validate().is_err());
        assert!(DriverConfig::default().validate().is_ok());
    }

    // ------------------------------------------------------------------
    // Threaded loop
    // ------------------------------------------------------------------

    #[test]
    fn spawned_loop_dispatches_and_stops_on_shutdown() {
        let config = DriverConfig {
            period: Duration::from_millis(5),
            ..DriverConfig::default()
        };
        let (acc, rec, driver) = make_driver(config);
        let shutdown = Arc::new(AtomicBool::new(false));
        let handle = driver.spawn(Arc::clone(&shutdown)).unwrap();

        acc.accumulate(MotionDelta::new(0.02, 0.0, 0.0)).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while rec.lock().unwrap().published.is_empty() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }

        shutdown.store(true, Ordering::Release);
        let stats = handle.join().unwrap().unwrap();
        assert_eq!(stats.dispatched, 1);
        assert_eq!(rec.lock().unwrap().published.len(), 1);
    }

    #[test]
    fn loop_returns_fatal_error() {
        let config = DriverConfig {
            period: Duration::from_millis(1),
            ..DriverConfig::default()
        };
        let (acc, rec, mut driver) = make_driver(config);
        rec.lock().unwrap().fail_state = true;
        acc.accumulate(MotionDelta::new(0.02, 0.0, 0.0)).unwrap();

        let shutdown = AtomicBool::new(false);
        let err = driver.run(&shutdown).unwrap_err();
        assert!(matches!(err, TeleopError::StateUnavailable(_)));
    }

    #[test]
    fn raised_shutdown_flag_stops_loop_without_cycling() {
        let (_acc, _rec, mut driver) = make_driver(DriverConfig::default());
        let shutdown = AtomicBool::new(true);
        let stats = driver.run(&shutdown).unwrap();
        assert_eq!(stats.cycles, 0);
    }
}
