//! State module for tracking per-application progress
//!
//! # Components
//!
//! - `ItemPhase`: where one application is inside a harvest session
//! - `TerminalState`: what a loaded listing reported (no records / has records)
//! - `ObservationPosition` / `Positions`: the position-indexed artifact list

mod phase;
mod position;

// Re-export main types
pub use phase::{ItemPhase, TerminalState};
pub use position::{
    format_failed_indices, parse_failed_indices, ObservationPosition, Positions,
    FAILED_SENTINEL, POSITION_SEPARATOR, PRESENT_SENTINEL,
};
