//! Agent liveness
//!
//! An agent's `status` is derived from its health record: it is evaluated
//! against the staleness threshold on every read (see [`LivenessTracker`])
//! and periodically by the background [`LivenessSweeper`].

pub mod liveness;
pub mod sweeper;

pub use liveness::{evaluate, HeartbeatAck, LivenessEvaluation, LivenessTracker, SweepReport};
pub use sweeper::LivenessSweeper;
