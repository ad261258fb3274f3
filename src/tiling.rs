//! Sub-tile geometry for strided DMA access.
//!
//! A 2D tensor of shape M×N in a row-major linear buffer is split into
//! `n_tile_rows × n_tile_cols` uniform sub-tiles. Each sub-tile is
//! described by two (size, stride) dimension pairs suitable for the DMA
//! buffer-descriptor dimension registers:
//!
//! - `d1`: one row of the sub-tile per iteration; stride is the full row
//!   pitch N of the enclosing buffer.
//! - `d0`: contiguous elements within a row; stride 1.
//!
//! For `M = N = 32` split 2×1, a sub-tile is 16 rows of 32 elements:
//! `d1 = (16, 32)`, `d0 = (32, 1)`, and the second tile starts at linear
//! offset `16 * 32 = 512`.
//!
//! Purely combinatorial; holds no device state.

use crate::error::{ConfigurationError, Result};

/// One (size, stride) dimension pair of a strided access pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DimPair {
    /// Iteration count along this dimension (in elements).
    pub size: usize,
    /// Linear-memory step between successive iterations (in elements).
    pub stride: usize,
}

/// Derived geometry for one uniform split of an M×N tensor.
///
/// Not persisted: recompute from the same inputs for reproducibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TilingPlan {
    m: usize,
    n: usize,
    n_tile_rows: usize,
    n_tile_cols: usize,
    /// Outer dimension: sub-tile rows.
    pub d1: DimPair,
    /// Inner dimension: contiguous sub-tile columns.
    pub d0: DimPair,
}

/// Compute the tiling plan for splitting an `m`×`n` row-major tensor into
/// `n_tile_rows` × `n_tile_cols` uniform sub-tiles.
///
/// Both tile counts must be positive and divide the corresponding extent
/// evenly; ragged tilings are rejected with
/// [`ConfigurationError::UnevenTiling`].
pub fn tiling_calculator_n_tiles(
    m: usize,
    n: usize,
    n_tile_rows: usize,
    n_tile_cols: usize,
) -> Result<TilingPlan> {
    if n_tile_rows == 0 || m % n_tile_rows != 0 {
        return Err(ConfigurationError::UnevenTiling { extent: m, tiles: n_tile_rows });
    }
    if n_tile_cols == 0 || n % n_tile_cols != 0 {
        return Err(ConfigurationError::UnevenTiling { extent: n, tiles: n_tile_cols });
    }

    Ok(TilingPlan {
        m,
        n,
        n_tile_rows,
        n_tile_cols,
        d1: DimPair { size: m / n_tile_rows, stride: n },
        d0: DimPair { size: n / n_tile_cols, stride: 1 },
    })
}

impl TilingPlan {
    /// Tensor extents (M, N).
    #[inline]
    pub fn tensor_shape(&self) -> (usize, usize) {
        (self.m, self.n)
    }

    /// Tile-grid extents (rows, cols).
    #[inline]
    pub fn grid_shape(&self) -> (usize, usize) {
        (self.n_tile_rows, self.n_tile_cols)
    }

    /// Elements in one sub-tile (the BD `buffer_length` field).
    #[inline]
    pub fn buffer_length(&self) -> usize {
        self.d1.size * self.d0.size
    }

    /// Linear element offset of the sub-tile at (`tile_row`, `tile_col`).
    ///
    /// Returns `None` if the coordinates are outside the tile grid.
    pub fn tile_offset(&self, tile_row: usize, tile_col: usize) -> Option<usize> {
        if tile_row >= self.n_tile_rows || tile_col >= self.n_tile_cols {
            return None;
        }
        Some(tile_row * self.d1.size * self.d1.stride + tile_col * self.d0.size * self.d0.stride)
    }

    /// Enumerate the linear element offsets covered by the sub-tile at
    /// (`tile_row`, `tile_col`), in transfer order (d1 outer, d0 inner).
    ///
    /// This is the address sequence a DMA engine programmed with this
    /// plan's dimension pairs would generate.
    pub fn element_offsets(&self, tile_row: usize, tile_col: usize) -> Option<Vec<usize>> {
        let base = self.tile_offset(tile_row, tile_col)?;
        let mut offsets = Vec::with_capacity(self.buffer_length());
        for i1 in 0..self.d1.size {
            for i0 in 0..self.d0.size {
                offsets.push(base + i1 * self.d1.stride + i0 * self.d0.stride);
            }
        }
        Some(offsets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nonsquare_2x1_split() {
        // 32x32 split into 2 tile rows, 1 tile col: sub-tiles are 16x32.
        let plan = tiling_calculator_n_tiles(32, 32, 2, 1).unwrap();
        assert_eq!(plan.d1, DimPair { size: 16, stride: 32 });
        assert_eq!(plan.d0, DimPair { size: 32, stride: 1 });
        assert_eq!(plan.buffer_length(), 16 * 32);
        assert_eq!(plan.tile_offset(0, 0), Some(0));
        assert_eq!(plan.tile_offset(1, 0), Some(16 * 32));
        assert_eq!(plan.tile_offset(2, 0), None);
    }

    #[test]
    fn test_nonsquare_1x2_split() {
        let plan = tiling_calculator_n_tiles(32, 32, 1, 2).unwrap();
        assert_eq!(plan.d1, DimPair { size: 32, stride: 32 });
        assert_eq!(plan.d0, DimPair { size: 16, stride: 1 });
        assert_eq!(plan.tile_offset(0, 1), Some(16));
    }

    #[test]
    fn test_2x2_split_offsets() {
        // The four quadrants of a 32x32 buffer.
        let plan = tiling_calculator_n_tiles(32, 32, 2, 2).unwrap();
        assert_eq!(plan.tile_offset(0, 0), Some(0));
        assert_eq!(plan.tile_offset(0, 1), Some(16));
        assert_eq!(plan.tile_offset(1, 0), Some(512));
        assert_eq!(plan.tile_offset(1, 1), Some(512 + 16));
    }

    #[test]
    fn test_uneven_tiling_rejected() {
        assert!(matches!(
            tiling_calculator_n_tiles(32, 32, 5, 1),
            Err(ConfigurationError::UnevenTiling { extent: 32, tiles: 5 })
        ));
        assert!(matches!(
            tiling_calculator_n_tiles(32, 30, 2, 4),
            Err(ConfigurationError::UnevenTiling { extent: 30, tiles: 4 })
        ));
        // Zero tile counts are uneven by definition.
        assert!(tiling_calculator_n_tiles(32, 32, 0, 1).is_err());
    }

    #[test]
    fn test_round_trip_reconstruction() {
        // Concatenating all sub-tiles through the computed offsets must
        // visit every element of the original buffer exactly once.
        for &(m, n, tr, tc) in &[(32, 32, 2, 2), (8, 12, 4, 3), (16, 16, 1, 4), (6, 4, 2, 1)] {
            let plan = tiling_calculator_n_tiles(m, n, tr, tc).unwrap();
            let mut seen = vec![0u32; m * n];
            for r in 0..tr {
                for c in 0..tc {
                    for off in plan.element_offsets(r, c).unwrap() {
                        seen[off] += 1;
                    }
                }
            }
            assert!(seen.iter().all(|&count| count == 1), "m={m} n={n} tr={tr} tc={tc}");
        }
    }

    #[test]
    fn test_transfer_order_is_row_major_within_tile() {
        let plan = tiling_calculator_n_tiles(4, 4, 2, 2).unwrap();
        // Bottom-right quadrant of a 4x4: rows 2-3, cols 2-3.
        let offsets = plan.element_offsets(1, 1).unwrap();
        assert_eq!(offsets, vec![10, 11, 14, 15]);
    }
}
