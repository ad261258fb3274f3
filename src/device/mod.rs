//! Device model: the tile grid, tile kinds, and hardware limits.

pub mod arch_spec;
pub mod tile;
pub mod topology;

pub use tile::{
    Buffer, BufferId, ElemType, Lock, LockId, Neighbors, TileId, TileKind, TileLimits,
};
pub use topology::GridTopology;
