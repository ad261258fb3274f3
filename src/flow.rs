//! Flows: routed paths between tile ports over the switch fabric.
//!
//! A flow is an endpoint record: source tile + MM2S channel to dest tile
//! + S2MM channel. The router only validates endpoint legality and
//! allocates the channels; carving the physical switchbox path is the
//! fabric's concern. No implicit routing through intermediate tiles is
//! synthesized: a shim-to-core path must be built explicitly as
//! shim→mem and mem→core flows.
//!
//! Broadcast fans one allocated source channel out to several
//! destinations. Reverse flows swap the roles for gather/return paths.
//! Packet-switched flows carry a packet id and multiplex several logical
//! flows over one shared physical channel per tile and direction.

use std::collections::BTreeMap;

use crate::alloc::ResourceAllocator;
use crate::device::{GridTopology, TileId, TileKind};
use crate::error::{ConfigurationError, ResourceKind, Result};

/// Switching mode of a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Switching {
    /// Dedicated circuit through the fabric.
    Circuit,
    /// Packet-switched; several logical flows may share a channel pair.
    Packet {
        /// Packet id carried in the stream header.
        id: u8,
    },
}

/// A routed connection between two tile ports.
#[derive(Debug, Clone)]
pub struct Flow {
    /// Source tile.
    pub source: TileId,
    /// MM2S channel on the source tile.
    pub source_channel: u32,
    /// Destination tile.
    pub dest: TileId,
    /// S2MM channel on the destination tile.
    pub dest_channel: u32,
    /// Circuit or packet switching.
    pub mode: Switching,
    /// Optional label on the source endpoint, for filtered lookup.
    pub source_annot: Option<String>,
    /// Optional label on the dest endpoint, for filtered lookup.
    pub dest_annot: Option<String>,
}

/// Handle to a flow held by the router.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowId(usize);

/// Builds and indexes [`Flow`] records, consulting the allocator for
/// channel ids.
#[derive(Debug, Default)]
pub struct FlowRouter {
    flows: Vec<Flow>,
    /// Shared MM2S channel per source tile for packet flows.
    packet_mm2s: BTreeMap<TileId, u32>,
    /// Shared S2MM channel per dest tile for packet flows.
    packet_s2mm: BTreeMap<TileId, u32>,
}

impl FlowRouter {
    /// Fresh router for a new configuration session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect `source` to `dest`, allocating one channel on each side
    /// (for circuit flows) or reusing the tiles' shared packet channels.
    pub fn connect(
        &mut self,
        topo: &GridTopology,
        alloc: &mut ResourceAllocator,
        source: TileId,
        dest: TileId,
        mode: Switching,
    ) -> Result<FlowId> {
        self.connect_annotated(topo, alloc, source, dest, mode, None, None)
    }

    /// [`connect`](Self::connect) with endpoint annotations.
    #[allow(clippy::too_many_arguments)]
    pub fn connect_annotated(
        &mut self,
        topo: &GridTopology,
        alloc: &mut ResourceAllocator,
        source: TileId,
        dest: TileId,
        mode: Switching,
        source_annot: Option<&str>,
        dest_annot: Option<&str>,
    ) -> Result<FlowId> {
        check_route(topo, source, dest)?;
        let source_channel = self.source_channel(topo, alloc, source, mode)?;
        let dest_channel = self.dest_channel(topo, alloc, dest, mode)?;
        Ok(self.push(Flow {
            source,
            source_channel,
            dest,
            dest_channel,
            mode,
            source_annot: source_annot.map(str::to_owned),
            dest_annot: dest_annot.map(str::to_owned),
        }))
    }

    /// Broadcast from `source` to every tile in `dests`, in order.
    ///
    /// Exactly one source channel is allocated and shared by all returned
    /// flows; each destination gets its own channel.
    pub fn broadcast(
        &mut self,
        topo: &GridTopology,
        alloc: &mut ResourceAllocator,
        source: TileId,
        dests: &[TileId],
    ) -> Result<Vec<FlowId>> {
        for &dest in dests {
            check_route(topo, source, dest)?;
        }
        if dests.is_empty() {
            return Ok(Vec::new());
        }

        let limits = topo.limits_of(source)?;
        let source_channel =
            alloc.allocate(source, ResourceKind::Mm2sChannel, limits.mm2s_channels)?;
        log::debug!(
            "broadcast from {source} channel {source_channel} to {} dests",
            dests.len()
        );

        let mut ids = Vec::with_capacity(dests.len());
        for &dest in dests {
            let dest_channel = self.dest_channel(topo, alloc, dest, Switching::Circuit)?;
            ids.push(self.push(Flow {
                source,
                source_channel,
                dest,
                dest_channel,
                mode: Switching::Circuit,
                source_annot: None,
                dest_annot: None,
            }));
        }
        Ok(ids)
    }

    /// Gather: build one flow from each tile in `sources` into `dest`.
    ///
    /// The symmetric helper for return paths: source/dest roles are the
    /// reverse of a broadcast over the same tile set.
    pub fn reverse(
        &mut self,
        topo: &GridTopology,
        alloc: &mut ResourceAllocator,
        sources: &[TileId],
        dest: TileId,
    ) -> Result<Vec<FlowId>> {
        sources
            .iter()
            .map(|&src| self.connect(topo, alloc, src, dest, Switching::Circuit))
            .collect()
    }

    /// Look up a flow by handle.
    pub fn flow(&self, id: FlowId) -> &Flow {
        &self.flows[id.0]
    }

    /// All flows, in creation order.
    pub fn flows(&self) -> &[Flow] {
        &self.flows
    }

    /// Flows whose source is `tile`, optionally filtered by source
    /// annotation.
    pub fn flows_from(&self, tile: TileId, annot: Option<&str>) -> Vec<FlowId> {
        self.filtered(|f| {
            f.source == tile && annot.is_none_or(|a| f.source_annot.as_deref() == Some(a))
        })
    }

    /// Flows whose destination is `tile`, optionally filtered by dest
    /// annotation.
    pub fn flows_into(&self, tile: TileId, annot: Option<&str>) -> Vec<FlowId> {
        self.filtered(|f| {
            f.dest == tile && annot.is_none_or(|a| f.dest_annot.as_deref() == Some(a))
        })
    }

    fn filtered(&self, pred: impl Fn(&Flow) -> bool) -> Vec<FlowId> {
        self.flows
            .iter()
            .enumerate()
            .filter(|(_, f)| pred(f))
            .map(|(i, _)| FlowId(i))
            .collect()
    }

    fn push(&mut self, flow: Flow) -> FlowId {
        log::debug!(
            "flow {} ch{} -> {} ch{} ({:?})",
            flow.source,
            flow.source_channel,
            flow.dest,
            flow.dest_channel,
            flow.mode
        );
        self.flows.push(flow);
        FlowId(self.flows.len() - 1)
    }

    // Packet flows share one physical channel per (tile, direction); the
    // shared channel is allocated on first use and never re-allocated.
    fn source_channel(
        &mut self,
        topo: &GridTopology,
        alloc: &mut ResourceAllocator,
        tile: TileId,
        mode: Switching,
    ) -> Result<u32> {
        let limits = topo.limits_of(tile)?;
        match mode {
            Switching::Circuit => {
                alloc.allocate(tile, ResourceKind::Mm2sChannel, limits.mm2s_channels)
            }
            Switching::Packet { .. } => match self.packet_mm2s.get(&tile) {
                Some(&ch) => Ok(ch),
                None => {
                    let ch =
                        alloc.allocate(tile, ResourceKind::Mm2sChannel, limits.mm2s_channels)?;
                    self.packet_mm2s.insert(tile, ch);
                    Ok(ch)
                }
            },
        }
    }

    fn dest_channel(
        &mut self,
        topo: &GridTopology,
        alloc: &mut ResourceAllocator,
        tile: TileId,
        mode: Switching,
    ) -> Result<u32> {
        let limits = topo.limits_of(tile)?;
        match mode {
            Switching::Circuit => {
                alloc.allocate(tile, ResourceKind::S2mmChannel, limits.s2mm_channels)
            }
            Switching::Packet { .. } => match self.packet_s2mm.get(&tile) {
                Some(&ch) => Ok(ch),
                None => {
                    let ch =
                        alloc.allocate(tile, ResourceKind::S2mmChannel, limits.s2mm_channels)?;
                    self.packet_s2mm.insert(tile, ch);
                    Ok(ch)
                }
            },
        }
    }
}

// Endpoint legality under the fabric model. Shim tiles only reach the mem
// tile adjacent in their own column; everything else pairs freely.
fn check_route(topo: &GridTopology, source: TileId, dest: TileId) -> Result<()> {
    topo.check_active(source)?;
    topo.check_active(dest)?;

    if source == dest {
        return Err(ConfigurationError::Unroutable {
            src: source,
            dest,
            reason: "source and destination are the same tile".into(),
        });
    }

    let src_kind = topo.kind(source)?;
    let dst_kind = topo.kind(dest)?;

    let shim_pairing_ok = |shim: TileId, other: TileId, other_kind: TileKind| {
        other_kind == TileKind::Mem
            && other.col == shim.col
            && other.row.abs_diff(shim.row) == 1
    };

    match (src_kind, dst_kind) {
        (TileKind::Shim, _) if !shim_pairing_ok(source, dest, dst_kind) => {
            Err(ConfigurationError::Unroutable {
                src: source,
                dest,
                reason: "shim tiles only reach the adjacent mem tile in their column".into(),
            })
        }
        (_, TileKind::Shim) if !shim_pairing_ok(dest, source, src_kind) => {
            Err(ConfigurationError::Unroutable {
                src: source,
                dest,
                reason: "shim tiles only reach the adjacent mem tile in their column".into(),
            })
        }
        _ => Ok(()),
    }
}
