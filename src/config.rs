//! Device topology descriptors.
//!
//! A descriptor names the deployment target: grid shape, which rows hold
//! which tile kinds, and optional overrides of the per-kind hardware
//! limits. Descriptors are plain data: loading one never touches global
//! state; the caller hands it to [`crate::device::GridTopology`] at the
//! start of a configuration session.
//!
//! # Descriptor File Format
//!
//! ```toml
//! # npu-fabric.toml
//! columns = 5
//! rows = 6
//! shim_row = 0
//! mem_rows = [1]
//!
//! [limits.mem]
//! s2mm_channels = 6
//! mm2s_channels = 6
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::device::arch_spec;
use crate::device::{TileKind, TileLimits};

/// Partial per-kind limit overrides; unset fields fall back to the AIE2
/// defaults for that kind.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsOverride {
    pub s2mm_channels: Option<u32>,
    pub mm2s_channels: Option<u32>,
    pub locks: Option<u32>,
    pub buffer_descriptors: Option<u32>,
    pub data_memory: Option<usize>,
}

impl LimitsOverride {
    fn apply(&self, mut base: TileLimits) -> TileLimits {
        if let Some(v) = self.s2mm_channels {
            base.s2mm_channels = v;
        }
        if let Some(v) = self.mm2s_channels {
            base.mm2s_channels = v;
        }
        if let Some(v) = self.locks {
            base.locks = v;
        }
        if let Some(v) = self.buffer_descriptors {
            base.buffer_descriptors = v;
        }
        if let Some(v) = self.data_memory {
            base.data_memory = v;
        }
        base
    }
}

/// Per-kind limit overrides, keyed by kind name.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsSection {
    pub shim: LimitsOverride,
    pub mem: LimitsOverride,
    pub core: LimitsOverride,
}

/// Device topology descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceDescriptor {
    /// Number of columns.
    pub columns: u8,
    /// Number of rows.
    pub rows: u8,
    /// Row holding shim tiles.
    pub shim_row: u8,
    /// Rows holding mem tiles; every remaining row is core tiles.
    pub mem_rows: Vec<u8>,
    /// Optional limit overrides per tile kind.
    pub limits: LimitsSection,
}

impl Default for DeviceDescriptor {
    fn default() -> Self {
        Self::npu1()
    }
}

impl DeviceDescriptor {
    /// The NPU1 (Phoenix/HawkPoint) layout: 5 columns, 6 rows, row 0
    /// shim, row 1 mem, rows 2-5 core.
    pub fn npu1() -> Self {
        Self {
            columns: arch_spec::NPU1_COLUMNS,
            rows: arch_spec::NPU1_ROWS,
            shim_row: 0,
            mem_rows: vec![1],
            limits: LimitsSection::default(),
        }
    }

    /// Tile kind of a row under this descriptor.
    pub fn kind_of_row(&self, row: u8) -> TileKind {
        if row == self.shim_row {
            TileKind::Shim
        } else if self.mem_rows.contains(&row) {
            TileKind::Mem
        } else {
            TileKind::Core
        }
    }

    /// Effective limits for a tile kind (defaults plus overrides).
    pub fn limits(&self, kind: TileKind) -> TileLimits {
        let over = match kind {
            TileKind::Shim => &self.limits.shim,
            TileKind::Mem => &self.limits.mem,
            TileKind::Core => &self.limits.core,
        };
        over.apply(TileLimits::for_kind(kind))
    }

    /// Parse a descriptor from TOML text.
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    /// Load a descriptor from a TOML file.
    ///
    /// Returns `None` (with a warning logged) if the file is missing or
    /// malformed, so callers can fall back to a built-in layout.
    pub fn load_from_file(path: &Path) -> Option<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                log::warn!("cannot read device descriptor {}: {}", path.display(), e);
                return None;
            }
        };
        match Self::from_toml_str(&contents) {
            Ok(desc) => {
                log::debug!("loaded device descriptor from {}", path.display());
                Some(desc)
            }
            Err(e) => {
                log::warn!("malformed device descriptor {}: {}", path.display(), e);
                None
            }
        }
    }
}
