//! Shared state for multi-agent grid worlds.
//!
//! Grid cells and agents are fixed-width integer records in shared buffers
//! ([`state::StateArray`]), read and written through typed views that work
//! the same for one record or a batch of them. A [`grid::Grid`] encodes to
//! and decodes from a `(width, height, 3)` integer tensor and renders
//! through a process-wide tile cache.

use serde::{Deserialize, Serialize};

pub mod agent;
pub mod constants;
pub mod error;
pub mod grid;
pub mod plane;
pub mod rendering;
pub mod state;
pub mod tile_cache;
pub mod world_object;

pub use agent::{Agent, AgentConfig, AgentState, Mission};
pub use constants::{Color, Direction, DoorState, ObjType};
pub use error::{Error, Result};
pub use grid::{Entity, Grid};
pub use world_object::{WorldObj, WorldObjState};

/// Unique identifier for agents.
pub type EntityId = usize;

/// Represents a 2D coordinate.
///
/// Signed so that positions one step off the grid (e.g. in front of an
/// agent facing a border) are representable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub const fn new(x: i32, y: i32) -> Self {
        Position { x, y }
    }
}
