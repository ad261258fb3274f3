//! Ordered instruction stream synthesis.
//!
//! The builder accumulates opcodes in two phases: setup (lock
//! initialization, core enables, host-address patches) and transfers
//! (BD writes, queue pushes, syncs). Finalization concatenates setup
//! before transfers, so every lock init and core enable precedes any
//! transfer that depends on it regardless of call order.
//!
//! Ordering invariants are enforced at the offending call:
//! - a BD must be written before it is pushed;
//! - a channel must be pushed before it is synced.
//!
//! The builder is finalized exactly once: [`finish`] consumes it and
//! the resulting [`InstructionStream`] is immutable.
//!
//! [`finish`]: InstructionStreamBuilder::finish

use std::collections::BTreeSet;

use smallvec::SmallVec;

use crate::device::arch_spec::MAX_BD_DIMENSIONS;
use crate::device::{GridTopology, TileId};
use crate::error::{ConfigurationError, Result};
use crate::fifo::{LockAcquire, LockRelease, ObjectFifo};
use crate::tiling::{DimPair, TilingPlan};

use super::instruction::{Direction, Instruction, InstructionStream};

/// Arguments for programming one buffer descriptor.
#[derive(Debug, Clone)]
pub struct BdWrite {
    /// Column of the shim tile.
    pub column: u8,
    /// Buffer descriptor id.
    pub bd_id: u32,
    /// Host buffer argument index.
    pub ddr_id: u8,
    /// Transfer length in elements.
    pub buffer_length: usize,
    /// Starting element offset.
    pub offset: usize,
    /// Up to 3 (size, stride) pairs, outermost first.
    pub dims: SmallVec<[DimPair; 3]>,
    /// Optional lock to wait on before the transfer.
    pub lock_acquire: Option<LockAcquire>,
    /// Optional lock to signal after the transfer.
    pub lock_release: Option<LockRelease>,
    /// Next BD in the chain.
    pub next_bd: Option<u32>,
    /// DMA auto-replay count (honored verbatim by the engine).
    pub repeat_count: u32,
}

impl BdWrite {
    /// A plain 1D transfer of `buffer_length` elements.
    pub fn linear(column: u8, bd_id: u32, ddr_id: u8, buffer_length: usize) -> Self {
        Self {
            column,
            bd_id,
            ddr_id,
            buffer_length,
            offset: 0,
            dims: SmallVec::new(),
            lock_acquire: None,
            lock_release: None,
            next_bd: None,
            repeat_count: 0,
        }
    }
}

/// One strided sub-tile transfer derived from a tiling plan.
#[derive(Debug, Clone, Copy)]
pub struct TensorSlice<'a> {
    /// Column of the shim tile.
    pub column: u8,
    /// Channel direction (MM2S to feed the array, S2MM to drain it).
    pub direction: Direction,
    /// Channel index, from the flow endpoint.
    pub channel: u32,
    /// Buffer descriptor id.
    pub bd_id: u32,
    /// Host buffer argument index.
    pub ddr_id: u8,
    /// Tiling geometry of the host tensor.
    pub plan: &'a TilingPlan,
    /// Which sub-tile row to transfer.
    pub tile_row: usize,
    /// Which sub-tile column to transfer.
    pub tile_col: usize,
}

/// Accumulates opcodes into an ordered sequence; finalized once.
#[derive(Debug, Default)]
pub struct InstructionStreamBuilder {
    setup: Vec<Instruction>,
    transfers: Vec<Instruction>,
    written_bds: BTreeSet<(u8, u32)>,
    pushed_channels: BTreeSet<(u32, u8)>,
    enabled_cores: BTreeSet<(u8, u8)>,
    init_locks: BTreeSet<(u8, u32)>,
}

impl InstructionStreamBuilder {
    /// Fresh builder.
    pub fn new() -> Self {
        Self::default()
    }

    // === Setup phase ===

    /// Program a lock's initial value (a `lock_release` carrying it).
    ///
    /// Emitted once per (column, lock): repeated calls for the same lock
    /// are ignored so helpers can be called per-transfer safely.
    pub fn init_lock(&mut self, column: u8, lock_id: u32, value: u8) {
        if self.init_locks.insert((column, lock_id)) {
            self.setup.push(Instruction::LockRelease { column, lock_id, value });
        } else {
            log::debug!("lock {lock_id} on column {column} already initialized");
        }
    }

    /// Initialize an object FIFO's lock pair.
    ///
    /// This is the emission-time checkpoint for the depth invariant: a
    /// FIFO whose acquire/release counts did not balance is rejected
    /// here with [`ConfigurationError::UnbalancedLock`].
    pub fn init_fifo(&mut self, topo: &GridTopology, fifo: &ObjectFifo) -> Result<()> {
        topo.check_active(fifo.producer())?;
        if !fifo.is_balanced() {
            return Err(ConfigurationError::UnbalancedLock {
                fifo: fifo.name().to_owned(),
                reason: format!(
                    "unreleased slots at emission: produce={}, consume={}",
                    fifo.outstanding(crate::fifo::FifoRole::Produce),
                    fifo.outstanding(crate::fifo::FifoRole::Consume),
                ),
            });
        }
        for (lock, value) in fifo.lock_inits() {
            self.init_lock(lock.tile.col, lock.id, value);
        }
        Ok(())
    }

    /// Enable the core on a compute tile. Emitted once per tile.
    pub fn enable_core(&mut self, topo: &GridTopology, tile: TileId) -> Result<()> {
        topo.check_active(tile)?;
        if !topo.limits_of(tile)?.runs_program {
            return Err(ConfigurationError::StreamOrderingViolation(format!(
                "tile {tile} cannot run a program"
            )));
        }
        if self.enabled_cores.insert((tile.col, tile.row)) {
            self.setup.push(Instruction::EnableCores { column: tile.col, row: tile.row });
        }
        Ok(())
    }

    /// Patch a BD's host address (tensor upload/download target).
    pub fn update_tensor_addr(&mut self, column: u8, bd_id: u32, host_address: u64) {
        self.setup.push(Instruction::UpdateTensorAddr { column, bd_id, host_address });
    }

    // === Transfer phase ===

    /// Program a buffer descriptor.
    pub fn write_bd(&mut self, bd: BdWrite) -> Result<()> {
        if bd.dims.len() > MAX_BD_DIMENSIONS {
            return Err(ConfigurationError::StreamOrderingViolation(format!(
                "BD {} on column {} carries {} dimension pairs; the DMA addresses at most {}",
                bd.bd_id,
                bd.column,
                bd.dims.len(),
                MAX_BD_DIMENSIONS
            )));
        }
        self.written_bds.insert((bd.column, bd.bd_id));
        self.transfers.push(Instruction::WriteBd {
            column: bd.column,
            bd_id: bd.bd_id,
            ddr_id: bd.ddr_id,
            buffer_length: bd.buffer_length,
            offset: bd.offset,
            dims: bd.dims,
            lock_acquire: bd.lock_acquire,
            lock_release: bd.lock_release,
            next_bd: bd.next_bd,
            repeat_count: bd.repeat_count,
        });
        Ok(())
    }

    /// Bind a previously written BD to a channel queue.
    ///
    /// Pushing a BD that was never written is a programmer defect,
    /// reported as [`ConfigurationError::StreamOrderingViolation`].
    pub fn push_queue(
        &mut self,
        direction: Direction,
        channel: u32,
        column: u8,
        bd_id: u32,
    ) -> Result<()> {
        if !self.written_bds.contains(&(column, bd_id)) {
            return Err(ConfigurationError::StreamOrderingViolation(format!(
                "push of BD {bd_id} on column {column} before it was written"
            )));
        }
        self.pushed_channels.insert((channel, column));
        self.transfers.push(Instruction::PushQueue { direction, channel, column, bd_id });
        Ok(())
    }

    /// Wait for a channel's outstanding transfers to complete.
    ///
    /// At least one push on the (channel, column) must precede the sync.
    pub fn sync(&mut self, channel: u32, column: u8) -> Result<()> {
        if !self.pushed_channels.contains(&(channel, column)) {
            return Err(ConfigurationError::StreamOrderingViolation(format!(
                "sync on channel {channel} column {column} with no preceding push"
            )));
        }
        self.transfers.push(Instruction::Sync { channel, column });
        Ok(())
    }

    /// Emit the write_bd + push_queue pair for one strided sub-tile
    /// transfer between host memory and a shim channel.
    pub fn tensor_slice(&mut self, slice: TensorSlice<'_>) -> Result<()> {
        let offset = slice
            .plan
            .tile_offset(slice.tile_row, slice.tile_col)
            .ok_or_else(|| {
                ConfigurationError::StreamOrderingViolation(format!(
                    "sub-tile ({}, {}) outside the {:?} tiling grid",
                    slice.tile_row,
                    slice.tile_col,
                    slice.plan.grid_shape()
                ))
            })?;
        self.write_bd(BdWrite {
            column: slice.column,
            bd_id: slice.bd_id,
            ddr_id: slice.ddr_id,
            buffer_length: slice.plan.buffer_length(),
            offset,
            dims: SmallVec::from_slice(&[slice.plan.d1, slice.plan.d0]),
            lock_acquire: None,
            lock_release: None,
            next_bd: None,
            repeat_count: 0,
        })?;
        self.push_queue(slice.direction, slice.channel, slice.column, slice.bd_id)
    }

    /// Finalize: setup instructions, then transfers. Consumes the
    /// builder; the stream is immutable afterwards.
    pub fn finish(self) -> InstructionStream {
        let mut instructions = self.setup;
        instructions.extend(self.transfers);
        log::debug!("finalized instruction stream: {} instructions", instructions.len());
        InstructionStream::new(instructions)
    }
}
