//! Control-processor opcodes and the finalized instruction stream.
//!
//! These are the exact operations the host hands to the control
//! processor, in order: BD programming, queue pushes, lock releases,
//! core enables, sync barriers, and host-address patches. Byte-level
//! encoding belongs to the external loader; field presence and ordering
//! are this crate's contract.

use smallvec::SmallVec;

use crate::fifo::{LockAcquire, LockRelease};
use crate::tiling::DimPair;

/// DMA queue direction, from the channel's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Stream to memory (receive).
    S2mm,
    /// Memory to stream (send).
    Mm2s,
}

/// One control-processor instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    /// Program a shim-tile buffer descriptor.
    WriteBd {
        /// Column of the shim tile.
        column: u8,
        /// Buffer descriptor id on that tile.
        bd_id: u32,
        /// Host buffer the transfer reads/writes (argument index).
        ddr_id: u8,
        /// Transfer length in elements.
        buffer_length: usize,
        /// Starting element offset into the host buffer.
        offset: usize,
        /// Up to 3 (size, stride) pairs, outermost first.
        dims: SmallVec<[DimPair; 3]>,
        /// Lock to wait on before the transfer, if any.
        lock_acquire: Option<LockAcquire>,
        /// Lock to signal after the transfer, if any.
        lock_release: Option<LockRelease>,
        /// Next BD in the chain, if chained.
        next_bd: Option<u32>,
        /// Times the DMA replays this descriptor without reprogramming.
        repeat_count: u32,
    },

    /// Bind a written BD to a channel's task queue.
    PushQueue {
        /// Channel direction.
        direction: Direction,
        /// Channel index.
        channel: u32,
        /// Column of the tile.
        column: u8,
        /// Previously written BD.
        bd_id: u32,
    },

    /// Set a lock's value (also used to program initial values).
    LockRelease {
        /// Column of the owning tile.
        column: u8,
        /// Lock index on that tile.
        lock_id: u32,
        /// Value to release with.
        value: u8,
    },

    /// Enable the core at (column, row).
    EnableCores {
        /// Column index.
        column: u8,
        /// Row index.
        row: u8,
    },

    /// Block the host until the channel's outstanding transfers complete.
    Sync {
        /// Channel to wait on.
        channel: u32,
        /// Column to wait on.
        column: u8,
    },

    /// Patch a BD's address field with a host buffer address.
    UpdateTensorAddr {
        /// Column of the shim tile.
        column: u8,
        /// BD whose address field is patched.
        bd_id: u32,
        /// Host virtual address.
        host_address: u64,
    },
}

/// The finalized, immutable instruction stream.
///
/// Produced exactly once by
/// [`InstructionStreamBuilder::finish`](super::InstructionStreamBuilder::finish)
/// and consumed by the external loader.
#[derive(Debug, Clone, PartialEq)]
pub struct InstructionStream {
    instructions: Vec<Instruction>,
}

impl InstructionStream {
    pub(crate) fn new(instructions: Vec<Instruction>) -> Self {
        Self { instructions }
    }

    /// The instructions, in execution order.
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Number of instructions.
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// True if the stream is empty.
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Iterate the instructions.
    pub fn iter(&self) -> std::slice::Iter<'_, Instruction> {
        self.instructions.iter()
    }
}

impl<'a> IntoIterator for &'a InstructionStream {
    type Item = &'a Instruction;
    type IntoIter = std::slice::Iter<'a, Instruction>;

    fn into_iter(self) -> Self::IntoIter {
        self.instructions.iter()
    }
}
