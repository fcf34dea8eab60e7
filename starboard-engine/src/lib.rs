//! starboard-engine: the reconciliation state machine
//!
//! For every inbound platform signal the engine computes the store and
//! board-channel mutations required to keep each tracked message's board
//! copy consistent with its original, under concurrent and out-of-order
//! delivery. Consistency is eventual: any update dropped to rate limiting
//! is repaired by the next signal touching the same row or by a full
//! recomputation.

pub mod command;
mod engine;

pub use command::RecomputeMode;
pub use engine::{Engine, EngineConfig, EngineError, EngineResult};
