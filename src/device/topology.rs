//! The fixed tile grid: kinds, limits, erasure, and resource placement.
//!
//! Cells are addressed by `(column, row)` with bounds-checked accessors;
//! there is no implicit slicing or broadcasting: multi-tile selections are
//! explicit ordered collections built by the caller. Tiles are stored in a
//! flat `Vec` indexed `col * rows + row`.
//!
//! # Erasure
//!
//! A cell may be marked erased (defective or deliberately unused column).
//! Erasure removes the tile from the active grid: every subsequent
//! placement, lookup, routing, or emission referencing it fails with
//! [`ConfigurationError::TileErased`], and neighbor queries skip it.

use smallvec::SmallVec;

use crate::alloc::ResourceAllocator;
use crate::config::DeviceDescriptor;
use crate::error::{ConfigurationError, ResourceKind, Result};

use super::arch_spec;
use super::tile::{
    Buffer, BufferId, ElemType, Lock, LockId, Neighbors, TileId, TileKind, TileLimits,
};

/// One grid cell and the resources placed on it.
#[derive(Debug)]
struct Cell {
    kind: TileKind,
    erased: bool,
    buffers: Vec<Buffer>,
    locks: Vec<Lock>,
    /// Bump cursor for buffer base addresses within the tile's data memory.
    next_addr: usize,
}

/// The physical grid: columns × rows, kind per cell, per-kind limits.
///
/// Constructed explicitly and idempotently at the start of a configuration
/// session; no process-wide state.
#[derive(Debug)]
pub struct GridTopology {
    cols: u8,
    rows: u8,
    cells: Vec<Cell>,
    shim_limits: TileLimits,
    mem_limits: TileLimits,
    core_limits: TileLimits,
}

impl GridTopology {
    /// Build a topology from a device descriptor.
    ///
    /// Rejects degenerate grids and descriptors whose shim/mem rows fall
    /// outside the declared row count.
    pub fn from_descriptor(desc: &DeviceDescriptor) -> Result<Self> {
        if desc.columns == 0 || desc.rows == 0 || desc.shim_row >= desc.rows {
            return Err(ConfigurationError::OutOfBounds {
                col: 0,
                row: desc.shim_row,
                cols: desc.columns,
                rows: desc.rows,
            });
        }
        if let Some(&bad) = desc.mem_rows.iter().find(|&&r| r >= desc.rows) {
            return Err(ConfigurationError::OutOfBounds {
                col: 0,
                row: bad,
                cols: desc.columns,
                rows: desc.rows,
            });
        }
        let mut cells = Vec::with_capacity(desc.columns as usize * desc.rows as usize);
        for _col in 0..desc.columns {
            for row in 0..desc.rows {
                cells.push(Cell {
                    kind: desc.kind_of_row(row),
                    erased: false,
                    buffers: Vec::new(),
                    locks: Vec::new(),
                    next_addr: 0,
                });
            }
        }
        Ok(Self {
            cols: desc.columns,
            rows: desc.rows,
            cells,
            shim_limits: desc.limits(TileKind::Shim),
            mem_limits: desc.limits(TileKind::Mem),
            core_limits: desc.limits(TileKind::Core),
        })
    }

    /// NPU1 layout: 5 columns × 6 rows, row 0 shim, row 1 mem, rows 2-5
    /// core, AIE2 hardware limits.
    pub fn npu1() -> Self {
        let desc = DeviceDescriptor::npu1();
        // Infallible for the built-in descriptor.
        Self::from_descriptor(&desc).unwrap_or_else(|_| unreachable!())
    }

    /// Number of columns.
    #[inline]
    pub fn cols(&self) -> u8 {
        self.cols
    }

    /// Number of rows.
    #[inline]
    pub fn rows(&self) -> u8 {
        self.rows
    }

    #[inline]
    fn index(&self, tile: TileId) -> usize {
        tile.col as usize * self.rows as usize + tile.row as usize
    }

    fn cell(&self, tile: TileId) -> Result<&Cell> {
        if tile.col >= self.cols || tile.row >= self.rows {
            return Err(ConfigurationError::OutOfBounds {
                col: tile.col,
                row: tile.row,
                cols: self.cols,
                rows: self.rows,
            });
        }
        Ok(&self.cells[self.index(tile)])
    }

    fn active_cell(&self, tile: TileId) -> Result<&Cell> {
        let cell = self.cell(tile)?;
        if cell.erased {
            return Err(ConfigurationError::TileErased { tile });
        }
        Ok(cell)
    }

    fn active_cell_mut(&mut self, tile: TileId) -> Result<&mut Cell> {
        self.active_cell(tile)?;
        let idx = self.index(tile);
        Ok(&mut self.cells[idx])
    }

    /// Kind of the tile at `tile`, bounds-checked. Erased tiles still
    /// report their kind.
    pub fn kind(&self, tile: TileId) -> Result<TileKind> {
        Ok(self.cell(tile)?.kind)
    }

    /// Hardware limits for a tile kind.
    #[inline]
    pub fn limits(&self, kind: TileKind) -> TileLimits {
        match kind {
            TileKind::Shim => self.shim_limits,
            TileKind::Mem => self.mem_limits,
            TileKind::Core => self.core_limits,
        }
    }

    /// Hardware limits of the tile at `tile`.
    pub fn limits_of(&self, tile: TileId) -> Result<TileLimits> {
        Ok(self.limits(self.cell(tile)?.kind))
    }

    /// Fail unless `tile` is in bounds and not erased.
    pub fn check_active(&self, tile: TileId) -> Result<()> {
        self.active_cell(tile).map(|_| ())
    }

    /// True if the tile is in bounds and marked erased.
    pub fn is_erased(&self, tile: TileId) -> bool {
        self.cell(tile).map(|c| c.erased).unwrap_or(false)
    }

    /// Mark a cell erased, invalidating every resource placed on it.
    ///
    /// Idempotent. Flows already built against the tile are invalidated at
    /// emission time; new requests fail immediately.
    pub fn erase(&mut self, tile: TileId) -> Result<()> {
        let idx = {
            self.cell(tile)?;
            self.index(tile)
        };
        let cell = &mut self.cells[idx];
        if !cell.erased {
            log::debug!(
                "erasing tile {tile} ({} buffers, {} locks invalidated)",
                cell.buffers.len(),
                cell.locks.len()
            );
            cell.erased = true;
        }
        Ok(())
    }

    /// Neighbor tiles of `tile` in the four cardinal directions.
    ///
    /// Erased neighbors are reported as `None`: they are no longer part
    /// of the active grid.
    pub fn neighbors(&self, tile: TileId) -> Result<Neighbors> {
        self.cell(tile)?;
        let live = |col: u8, row: u8| {
            let id = TileId::new(col, row);
            (self.cell(id).is_ok() && !self.is_erased(id)).then_some(id)
        };
        Ok(Neighbors {
            north: tile.row.checked_add(1).and_then(|r| live(tile.col, r)),
            south: tile.row.checked_sub(1).and_then(|r| live(tile.col, r)),
            east: tile.col.checked_add(1).and_then(|c| live(c, tile.row)),
            west: tile.col.checked_sub(1).and_then(|c| live(c, tile.row)),
        })
    }

    /// Iterate active tiles in column-major order (deterministic).
    pub fn tiles(&self) -> impl Iterator<Item = TileId> + '_ {
        (0..self.cols).flat_map(move |col| {
            (0..self.rows).filter_map(move |row| {
                let id = TileId::new(col, row);
                (!self.is_erased(id)).then_some(id)
            })
        })
    }

    /// Iterate active tiles of one kind, column-major.
    pub fn tiles_of_kind(&self, kind: TileKind) -> impl Iterator<Item = TileId> + '_ {
        self.tiles()
            .filter(move |&t| self.cells[self.index(t)].kind == kind)
    }

    // === Resource placement ===

    /// Place a buffer in a tile's data memory.
    ///
    /// Fails on shim tiles (no data memory), erased tiles, and when the
    /// tile's remaining capacity cannot hold the buffer. Base addresses
    /// are bump-allocated, 16-byte aligned.
    pub fn place_buffer(
        &mut self,
        tile: TileId,
        shape: &[usize],
        elem_type: ElemType,
        initial_value: Option<Vec<u8>>,
    ) -> Result<BufferId> {
        let limits = self.limits_of(tile)?;
        let cell = self.active_cell_mut(tile)?;

        let size: usize = shape.iter().product::<usize>() * elem_type.size_bytes();
        let addr = cell.next_addr.next_multiple_of(arch_spec::BUFFER_ALIGNMENT);
        if limits.data_memory == 0 || addr + size > limits.data_memory {
            return Err(ConfigurationError::BufferTooLarge {
                tile,
                requested: size,
                capacity: limits.data_memory.saturating_sub(addr),
            });
        }

        let index = cell.buffers.len() as u32;
        cell.buffers.push(Buffer {
            tile,
            shape: SmallVec::from_slice(shape),
            elem_type,
            address: addr,
            initial_value,
        });
        cell.next_addr = addr + size;
        log::debug!("placed buffer {index} on tile {tile} at 0x{addr:05X} ({size} bytes)");
        Ok(BufferId { tile, index })
    }

    /// Look up a placed buffer. Fails if its tile has been erased.
    pub fn buffer(&self, id: BufferId) -> Result<&Buffer> {
        let cell = self.active_cell(id.tile)?;
        cell.buffers.get(id.index as usize).ok_or_else(|| {
            ConfigurationError::StreamOrderingViolation(format!(
                "buffer {} on tile {} was never placed",
                id.index, id.tile
            ))
        })
    }

    /// Buffers placed on a tile, in placement order.
    pub fn buffers(&self, tile: TileId) -> Result<&[Buffer]> {
        Ok(&self.active_cell(tile)?.buffers)
    }

    /// Place a lock on a tile with an initial value.
    ///
    /// The hardware lock index comes from the allocator: the sole writer
    /// of lock ids. The initial value is emitted as a `lock_release`
    /// before any dependent transfer.
    pub fn place_lock(
        &mut self,
        allocator: &mut ResourceAllocator,
        tile: TileId,
        init: u8,
    ) -> Result<LockId> {
        let limits = self.limits_of(tile)?;
        self.check_active(tile)?;
        let id = allocator.allocate(tile, ResourceKind::Lock, limits.locks)?;
        let lock_id = LockId { tile, id };
        let cell = self.active_cell_mut(tile)?;
        cell.locks.push(Lock {
            id: lock_id,
            init: init.min(arch_spec::LOCK_MAX_VALUE),
        });
        Ok(lock_id)
    }

    /// Locks placed on a tile, in placement order.
    pub fn locks(&self, tile: TileId) -> Result<&[Lock]> {
        Ok(&self.active_cell(tile)?.locks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_npu1_layout() {
        let topo = GridTopology::npu1();
        assert_eq!(topo.cols(), 5);
        assert_eq!(topo.rows(), 6);
        assert_eq!(topo.kind(TileId::new(0, 0)).unwrap(), TileKind::Shim);
        assert_eq!(topo.kind(TileId::new(2, 1)).unwrap(), TileKind::Mem);
        assert_eq!(topo.kind(TileId::new(4, 5)).unwrap(), TileKind::Core);
    }

    #[test]
    fn test_out_of_bounds() {
        let topo = GridTopology::npu1();
        assert!(matches!(
            topo.kind(TileId::new(5, 0)),
            Err(ConfigurationError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_neighbors() {
        let topo = GridTopology::npu1();
        let n = topo.neighbors(TileId::new(0, 0)).unwrap();
        assert_eq!(n.north, Some(TileId::new(0, 1)));
        assert_eq!(n.south, None);
        assert_eq!(n.east, Some(TileId::new(1, 0)));
        assert_eq!(n.west, None);

        let n = topo.neighbors(TileId::new(2, 3)).unwrap();
        assert_eq!(n.north, Some(TileId::new(2, 4)));
        assert_eq!(n.south, Some(TileId::new(2, 2)));
    }

    #[test]
    fn test_erase_cascades() {
        let mut topo = GridTopology::npu1();
        let mut alloc = ResourceAllocator::new();
        let tile = TileId::new(0, 1);
        let buf = topo
            .place_buffer(tile, &[32], ElemType::I32, None)
            .unwrap();
        topo.place_lock(&mut alloc, tile, 0).unwrap();

        topo.erase(tile).unwrap();
        assert!(topo.is_erased(tile));
        assert!(matches!(
            topo.buffer(buf),
            Err(ConfigurationError::TileErased { .. })
        ));
        assert!(matches!(
            topo.locks(tile),
            Err(ConfigurationError::TileErased { .. })
        ));
        assert!(matches!(
            topo.place_buffer(tile, &[1], ElemType::I32, None),
            Err(ConfigurationError::TileErased { .. })
        ));

        // Erased tiles disappear from neighbor queries.
        let n = topo.neighbors(TileId::new(0, 0)).unwrap();
        assert_eq!(n.north, None);
    }

    #[test]
    fn test_shim_has_no_data_memory() {
        let mut topo = GridTopology::npu1();
        assert!(matches!(
            topo.place_buffer(TileId::new(0, 0), &[4], ElemType::I32, None),
            Err(ConfigurationError::BufferTooLarge { .. })
        ));
    }

    #[test]
    fn test_buffer_addresses_bump_aligned() {
        let mut topo = GridTopology::npu1();
        let tile = TileId::new(0, 2);
        let a = topo.place_buffer(tile, &[3], ElemType::I32, None).unwrap();
        let b = topo.place_buffer(tile, &[4], ElemType::I32, None).unwrap();
        assert_eq!(topo.buffer(a).unwrap().address, 0);
        // 12 bytes rounds up to the 16-byte bank alignment.
        assert_eq!(topo.buffer(b).unwrap().address, 16);
    }

    #[test]
    fn test_buffer_capacity_enforced() {
        let mut topo = GridTopology::npu1();
        let tile = TileId::new(1, 2);
        // 64 KB compute tile memory: a 17K-element i32 buffer won't fit.
        assert!(matches!(
            topo.place_buffer(tile, &[17 * 1024], ElemType::I32, None),
            Err(ConfigurationError::BufferTooLarge { .. })
        ));
    }

    #[test]
    fn test_bad_descriptor_rejected() {
        let mut desc = crate::config::DeviceDescriptor::npu1();
        desc.mem_rows = vec![9];
        assert!(matches!(
            GridTopology::from_descriptor(&desc),
            Err(ConfigurationError::OutOfBounds { .. })
        ));
        desc.mem_rows = vec![1];
        desc.rows = 0;
        assert!(GridTopology::from_descriptor(&desc).is_err());
    }

    #[test]
    fn test_tiles_of_kind_deterministic() {
        let topo = GridTopology::npu1();
        let shims: Vec<_> = topo.tiles_of_kind(TileKind::Shim).collect();
        assert_eq!(shims.len(), 5);
        assert_eq!(shims[0], TileId::new(0, 0));
        assert_eq!(shims[4], TileId::new(4, 0));
    }
}
