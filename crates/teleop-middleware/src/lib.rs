//! `teleop-middleware` – input and output channels
//!
//! Carries operator commands into the control loop and planned trajectories
//! out of it, without caring what sits on either end.
//!
//! # Modules
//!
//! - [`bus`] – topic-based publish/subscribe event bus built on Tokio
//!   broadcast channels.
//! - [`command_listener`] – async task feeding motion commands from the bus
//!   into a [`CommandAccumulator`][teleop_core::CommandAccumulator], plus the
//!   text decoding used by command front-ends.
//! - [`trajectory_sink`] – [`BusTrajectorySink`], the bus-backed
//!   [`TrajectorySink`][teleop_core::TrajectorySink].

pub mod bus;
pub mod command_listener;
pub mod trajectory_sink;

pub use bus::{EventBus, Topic, TopicReceiver};
pub use command_listener::{
    ListenerStats, parse_motion_command, publish_motion_command, spawn_command_listener,
};
pub use trajectory_sink::BusTrajectorySink;
