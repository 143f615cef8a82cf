//! Outbound side: planned trajectories → [`Topic::Trajectories`].

use teleop_core::TrajectorySink;
use teleop_types::{Event, EventPayload, JointTrajectory, TeleopError};
use tracing::{debug, warn};

use crate::bus::{EventBus, Topic};

/// [`TrajectorySink`] that publishes each trajectory as an
/// [`EventPayload::Trajectory`] event.
pub struct BusTrajectorySink {
    bus: EventBus,
    source: String,
}

impl BusTrajectorySink {
    pub fn new(bus: EventBus, source: impl Into<String>) -> Self {
        Self {
            bus,
            source: source.into(),
        }
    }
}

impl TrajectorySink for BusTrajectorySink {
    fn publish(&mut self, trajectory: JointTrajectory) -> Result<(), TeleopError> {
        let waypoints = trajectory.len();
        if self.bus.subscriber_count(Topic::Trajectories) == 0 {
            warn!(
                topic = Topic::Trajectories.name(),
                waypoints, "no executor subscribed; trajectory discarded"
            );
            return Ok(());
        }
        let event = Event::new(self.source.clone(), EventPayload::Trajectory(trajectory));
        let receivers = self.bus.publish_to(Topic::Trajectories, event)?;
        debug!(receivers, waypoints, "trajectory published");
        Ok(())
    }
}
