//! npu-fabric
//!
//! Configures a spatial array of compute tiles (an AIE-style grid of
//! shim, mem, and core tiles) for tiled dataflow computation and emits
//! the control-processor instruction stream that programs the DMA
//! engines, locks, and routing fabric.
//!
//! # Pipeline
//!
//! 1. Build a [`device::GridTopology`] from a [`config::DeviceDescriptor`]
//!    (or the built-in NPU1 layout) and place buffers/locks on tiles.
//! 2. Route [`flow::Flow`]s between tile ports with [`flow::FlowRouter`],
//!    which draws channel ids from [`alloc::ResourceAllocator`].
//! 3. Wrap producer/consumer traffic in a [`fifo::ObjectFifo`] for
//!    depth-bounded buffering over lock pairs.
//! 4. Compute strided sub-tile geometry with
//!    [`tiling::tiling_calculator_n_tiles`] and materialize the
//!    device-programming stream with
//!    [`emit::InstructionStreamBuilder`].
//!
//! All configuration errors are fail-fast and surface at the offending
//! request; see [`error::ConfigurationError`].

pub mod alloc;
pub mod config;
pub mod device;
pub mod emit;
pub mod error;
pub mod fifo;
pub mod flow;
pub mod tiling;

pub use alloc::ResourceAllocator;
pub use config::DeviceDescriptor;
pub use device::{GridTopology, TileId, TileKind};
pub use emit::{InstructionStream, InstructionStreamBuilder};
pub use error::{ConfigurationError, HostError};
pub use fifo::ObjectFifo;
pub use flow::{Flow, FlowRouter, Switching};
pub use tiling::{tiling_calculator_n_tiles, TilingPlan};
