//! Inbound side: operator motion commands → [`CommandAccumulator`].
//!
//! [`spawn_command_listener`] runs on the Tokio runtime and feeds every
//! [`EventPayload::MotionCommand`] published on [`Topic::MotionCommands`]
//! into the shared accumulator.  [`parse_motion_command`] and
//! [`publish_motion_command`] are the matching producer helpers used by
//! text front-ends.

use std::sync::Arc;

use serde::Deserialize;
use teleop_core::CommandAccumulator;
use teleop_types::{Event, EventPayload, MotionDelta, TeleopError};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::bus::{EventBus, Topic};

/// Maximum byte length of a single text command.
pub const MAX_COMMAND_BYTES: usize = 1024;

/// What the listener did before the bus closed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenerStats {
    pub accepted: u64,
    pub rejected: u64,
    pub lagged: u64,
}

/// Subscribe to [`Topic::MotionCommands`] and spawn a task that accumulates
/// every received delta.
///
/// The subscription is taken before this function returns, so commands
/// published afterwards are never missed.  The task ends when every
/// [`EventBus`] handle has been dropped.
///
/// Must be called from within a Tokio runtime.
pub fn spawn_command_listener(
    bus: &EventBus,
    accumulator: Arc<CommandAccumulator>,
) -> JoinHandle<ListenerStats> {
    let mut rx = bus.subscribe_to(Topic::MotionCommands);
    tokio::spawn(async move {
        let mut stats = ListenerStats::default();
        loop {
            match rx.recv().await {
                Ok(Event {
                    payload: EventPayload::MotionCommand(delta),
                    source,
                    ..
                }) => match accumulator.accumulate(delta) {
                    Ok(()) => stats.accepted += 1,
                    Err(e) => {
                        stats.rejected += 1;
                        warn!(source = %source, error = %e, "motion command rejected");
                    }
                },
                Ok(other) => {
                    debug!(source = %other.source, "ignoring non-motion event on command topic");
                }
                Err(RecvError::Lagged(n)) => {
                    stats.lagged += n;
                    warn!(lagged_by = n, "command listener lagged; deltas dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
        info!(
            accepted = stats.accepted,
            rejected = stats.rejected,
            lagged = stats.lagged,
            "command listener stopped"
        );
        stats
    })
}

/// Publish `delta` on [`Topic::MotionCommands`] on behalf of `source`.
pub fn publish_motion_command(
    bus: &EventBus,
    source: &str,
    delta: MotionDelta,
) -> Result<usize, TeleopError> {
    bus.publish_to(
        Topic::MotionCommands,
        Event::new(source, EventPayload::MotionCommand(delta)),
    )
}

#[derive(Deserialize)]
struct JsonCommand {
    #[serde(default)]
    dx: f64,
    #[serde(default)]
    dy: f64,
    #[serde(default)]
    dz: f64,
}

/// Decode one text command.
///
/// Accepts either three whitespace-separated numbers (`"0.001 0 -0.002"`) or
/// a JSON object with optional `dx`, `dy`, `dz` fields
/// (`{"dx": 0.001, "dz": -0.002}`).  Finiteness is checked later by the
/// accumulator.
///
/// # Errors
///
/// Returns [`TeleopError::Parsing`] for oversized, empty or malformed input.
pub fn parse_motion_command(line: &str) -> Result<MotionDelta, TeleopError> {
    if line.len() > MAX_COMMAND_BYTES {
        return Err(TeleopError::Parsing(format!(
            "command is {} bytes, exceeding the limit of {}",
            line.len(),
            MAX_COMMAND_BYTES
        )));
    }
    let line = line.trim();
    if line.is_empty() {
        return Err(TeleopError::Parsing("empty command".to_string()));
    }

    if line.starts_with('{') {
        let cmd: JsonCommand = serde_json::from_str(line)
            .map_err(|e| TeleopError::Parsing(format!("invalid JSON command: {e}")))?;
        return Ok(MotionDelta::new(cmd.dx, cmd.dy, cmd.dz));
    }

    let values = line
        .split_whitespace()
        .map(|tok| {
            tok.parse::<f64>()
                .map_err(|e| TeleopError::Parsing(format!("'{tok}' is not a number: {e}")))
        })
        .collect::<Result<Vec<_>, _>>()?;
    match values.as_slice() {
        [dx, dy, dz] => Ok(MotionDelta::new(*dx, *dy, *dz)),
        _ => Err(TeleopError::Parsing(format!(
            "expected 3 values (dx dy dz), got {}",
            values.len()
        ))),
    }
}
