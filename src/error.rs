//! Error types for configuration and host execution.
//!
//! Every configuration-time defect is fail-fast: the offending request
//! returns the error immediately and no partial device programming is
//! emitted. Host-side failures (a `sync` wait running out of time) are a
//! separate, retryable category.

use thiserror::Error;

use crate::device::TileId;

/// Resource kinds tracked per tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    /// Stream-to-memory DMA channel (receive).
    S2mmChannel,
    /// Memory-to-stream DMA channel (send).
    Mm2sChannel,
    /// Semaphore lock.
    Lock,
    /// DMA buffer descriptor.
    BufferDescriptor,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ResourceKind::S2mmChannel => "S2MM channel",
            ResourceKind::Mm2sChannel => "MM2S channel",
            ResourceKind::Lock => "lock",
            ResourceKind::BufferDescriptor => "buffer descriptor",
        };
        f.write_str(s)
    }
}

/// Configuration-time defects. All are non-retryable: the caller must fix
/// the design and rebuild the session.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// Tensor dimension not evenly divisible by the requested tile count.
    #[error("uneven tiling: extent {extent} not divisible by {tiles} tiles")]
    UnevenTiling {
        /// Tensor extent along the offending axis.
        extent: usize,
        /// Requested tile count along that axis.
        tiles: usize,
    },

    /// Allocation exceeded a tile-kind hardware limit.
    #[error("{kind} allocation on tile {tile} exceeds hardware limit of {limit}")]
    ResourceExhausted {
        /// Tile the allocation was requested on.
        tile: TileId,
        /// Resource kind that ran out.
        kind: ResourceKind,
        /// The per-tile hardware limit that was hit.
        limit: u32,
    },

    /// Requested flow has no valid path under the fabric model.
    #[error("unroutable flow {src} -> {dest}: {reason}")]
    Unroutable {
        /// Flow source tile.
        src: TileId,
        /// Flow destination tile.
        dest: TileId,
        /// Why the fabric model rejects the pairing.
        reason: String,
    },

    /// Resource referenced on a tile marked erased.
    #[error("tile {tile} is erased")]
    TileErased {
        /// The erased tile.
        tile: TileId,
    },

    /// ObjectFifo acquire/release counts cannot satisfy the depth invariant.
    #[error("unbalanced lock protocol on fifo '{fifo}': {reason}")]
    UnbalancedLock {
        /// Name of the offending fifo.
        fifo: String,
        /// Which invariant was violated.
        reason: String,
    },

    /// Programmer defect in builder use: a push or sync of a BD that was
    /// never written, malformed BD geometry, or a dangling resource
    /// handle.
    ///
    /// Unreachable with correct builder use; surfaced as an error rather
    /// than a panic so callers see the defect at the offending request.
    #[error("stream ordering violation: {0}")]
    StreamOrderingViolation(String),

    /// Buffer placement does not fit the tile's data memory.
    #[error("buffer of {requested} bytes does not fit tile {tile} (capacity {capacity} bytes)")]
    BufferTooLarge {
        /// Tile the buffer was placed on.
        tile: TileId,
        /// Requested buffer size in bytes.
        requested: usize,
        /// Remaining data-memory capacity.
        capacity: usize,
    },

    /// Coordinates outside the declared grid.
    #[error("tile ({col}, {row}) is out of bounds for a {cols}x{rows} grid")]
    OutOfBounds {
        /// Requested column.
        col: u8,
        /// Requested row.
        row: u8,
        /// Grid column count.
        cols: u8,
        /// Grid row count.
        rows: u8,
    },
}

/// Host-side execution failures. Retryable by the caller: reissue the
/// stream (possibly after reconfiguration) with a longer timeout.
#[derive(Debug, Error)]
pub enum HostError {
    /// A `sync` wait did not complete within the caller-supplied timeout.
    #[error("sync on column {column} channel {channel} timed out after {timeout_ms} ms")]
    SyncTimeout {
        /// Column the sync names.
        column: u8,
        /// Channel the sync names.
        channel: u8,
        /// Timeout the caller supplied.
        timeout_ms: u64,
    },
}

/// Convenience alias for configuration results.
pub type Result<T> = std::result::Result<T, ConfigurationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ConfigurationError::UnevenTiling { extent: 32, tiles: 5 };
        assert_eq!(
            err.to_string(),
            "uneven tiling: extent 32 not divisible by 5 tiles"
        );
    }

    #[test]
    fn test_resource_kind_display() {
        assert_eq!(ResourceKind::Mm2sChannel.to_string(), "MM2S channel");
        assert_eq!(ResourceKind::Lock.to_string(), "lock");
    }
}
