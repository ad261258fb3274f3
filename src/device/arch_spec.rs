//! AIE2 architecture constants and the NPU1 grid shape.
//!
//! Hardware sizes (memory, lock, buffer-descriptor and DMA-channel counts)
//! are the AIE-ML values documented in AMD AM020/AM025; the NPU1 grid shape
//! mirrors the Phoenix/HawkPoint layout (5 columns, 6 rows: row 0 shim,
//! row 1 mem, rows 2-5 compute).

// ============================================================================
// Grid shape (NPU1 / Phoenix)
// ============================================================================

/// Columns in the NPU1 grid.
pub const NPU1_COLUMNS: u8 = 5;

/// Rows in the NPU1 grid (row 0 shim, row 1 mem, rows 2-5 compute).
pub const NPU1_ROWS: u8 = 6;

// ============================================================================
// Data memory (AM020 Ch4, Ch5)
// ============================================================================

/// Data memory per compute tile: 64 KB.
pub const COMPUTE_TILE_DATA_MEMORY_SIZE: usize = 64 * 1024;

/// Data memory per memory tile: 512 KB.
pub const MEM_TILE_DATA_MEMORY_SIZE: usize = 512 * 1024;

// ============================================================================
// Locks (AM020 Ch2, Ch5)
// ============================================================================

/// Semaphore locks per shim tile.
pub const SHIM_TILE_NUM_LOCKS: u32 = 16;

/// Semaphore locks per memory tile.
pub const MEM_TILE_NUM_LOCKS: u32 = 64;

/// Semaphore locks per compute tile.
pub const COMPUTE_TILE_NUM_LOCKS: u32 = 16;

/// Maximum value of a 6-bit semaphore lock (0-63).
pub const LOCK_MAX_VALUE: u8 = 63;

// ============================================================================
// DMA buffer descriptors (AM020 Ch2, AM025)
// ============================================================================

/// Buffer descriptors per shim tile.
pub const SHIM_TILE_NUM_BDS: u32 = 16;

/// Buffer descriptors per memory tile (24 S2MM + 24 MM2S).
pub const MEM_TILE_NUM_BDS: u32 = 48;

/// Buffer descriptors per compute tile.
pub const COMPUTE_TILE_NUM_BDS: u32 = 16;

/// Maximum (size, stride) dimensions a buffer descriptor may carry.
pub const MAX_BD_DIMENSIONS: usize = 3;

// ============================================================================
// DMA channels (AM020 Ch2, Appendix A)
// ============================================================================

/// Stream-to-memory DMA channels per shim tile.
pub const SHIM_TILE_S2MM_CHANNELS: u32 = 2;

/// Memory-to-stream DMA channels per shim tile.
pub const SHIM_TILE_MM2S_CHANNELS: u32 = 2;

/// Stream-to-memory DMA channels per memory tile.
pub const MEM_TILE_S2MM_CHANNELS: u32 = 6;

/// Memory-to-stream DMA channels per memory tile.
pub const MEM_TILE_MM2S_CHANNELS: u32 = 6;

/// Stream-to-memory DMA channels per compute tile.
pub const COMPUTE_TILE_S2MM_CHANNELS: u32 = 2;

/// Memory-to-stream DMA channels per compute tile.
pub const COMPUTE_TILE_MM2S_CHANNELS: u32 = 2;

// ============================================================================
// Buffer placement (AM020 Ch4)
// ============================================================================

/// Buffer base-address alignment in bytes.
pub const BUFFER_ALIGNMENT: usize = 16;
