//! Bounded circular-buffer protocol layered on lock pairs.
//!
//! An object FIFO connects one producer tile to one or more consumer
//! tiles through `depth` buffer slots and a pair of counting locks:
//!
//! - the producer lock starts at `depth` (slots available to produce);
//! - the consumer lock starts at `0` (elements available to consume).
//!
//! Acquire decrements one lock of the pair, release increments the other,
//! so the emitted BD lock specs realize the slot state machine
//! `Free → Filling → Full → Draining → Free` without any shared-memory
//! access outside the protocol.
//!
//! Acquire/release pairing is ownership-checked: [`ObjectFifo::acquire`]
//! returns a [`SlotGrant`] that must be given back to
//! [`ObjectFifo::release`], which consumes it. Acquiring past `depth`
//! with no intervening release is rejected as a configuration defect.

use smallvec::SmallVec;

use crate::alloc::ResourceAllocator;
use crate::device::arch_spec::{LOCK_MAX_VALUE, MAX_BD_DIMENSIONS};
use crate::device::{BufferId, ElemType, GridTopology, LockId, TileId};
use crate::error::{ConfigurationError, Result};
use crate::tiling::DimPair;

/// Which side of the protocol a call acts for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FifoRole {
    /// The producing DMA/core filling slots.
    Produce,
    /// A consuming DMA/core draining slots.
    Consume,
}

/// How the emitted lock-acquire waits on the semaphore value.
///
/// `Exact` waits for the value to equal the requested count: used for
/// one-shot and repeat-count descriptors that must see a specific state.
/// `GreaterEqual` waits for at-least the requested count: the steady
/// state for circular producer/consumer protocols, where more slots than
/// requested may already be available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireMode {
    /// Wait until the lock value equals the requested count.
    Exact,
    /// Wait until the lock value is at least the requested count.
    GreaterEqual,
}

/// Lock-acquire spec carried by a buffer descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockAcquire {
    /// Lock to wait on.
    pub lock: LockId,
    /// Value to wait for and subtract.
    pub value: u8,
    /// Exact or threshold wait.
    pub mode: AcquireMode,
}

/// Lock-release spec carried by a buffer descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockRelease {
    /// Lock to signal.
    pub lock: LockId,
    /// Value to add.
    pub value: u8,
}

/// Per-slot protocol state, tracked at configuration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Available to the producer.
    Free,
    /// Acquired for producing.
    Filling,
    /// Produced, awaiting a consumer.
    Full,
    /// Acquired for consuming.
    Draining,
}

/// Handle to acquired slots. Must be passed back to
/// [`ObjectFifo::release`]; dropping it without releasing leaves the
/// protocol unbalanced, which emission-time validation reports.
#[derive(Debug)]
#[must_use = "acquired slots must be released back to the fifo"]
pub struct SlotGrant {
    role: FifoRole,
    mode: AcquireMode,
    slots: SmallVec<[usize; 4]>,
    buffers: SmallVec<[BufferId; 4]>,
}

impl SlotGrant {
    /// Which role acquired the slots.
    #[inline]
    pub fn role(&self) -> FifoRole {
        self.role
    }

    /// Acquire mode carried into the emitted lock spec.
    #[inline]
    pub fn mode(&self) -> AcquireMode {
        self.mode
    }

    /// Buffers backing the acquired slots, oldest first.
    #[inline]
    pub fn buffers(&self) -> &[BufferId] {
        &self.buffers
    }

    /// Number of acquired slots.
    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True if the grant holds no slots.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// A depth-bounded producer/consumer FIFO between tiles.
#[derive(Debug)]
pub struct ObjectFifo {
    name: String,
    producer: TileId,
    consumers: Vec<TileId>,
    depth: u32,
    slots: Vec<BufferId>,
    producer_lock: LockId,
    consumer_lock: LockId,
    /// Optional stream-side dimension transform per consumer.
    consumer_dims: Vec<Option<Vec<DimPair>>>,

    // Configuration-time protocol tracking.
    states: Vec<SlotState>,
    produce_cursor: usize,
    consume_cursor: usize,
    outstanding_produce: u32,
    outstanding_consume: u32,
}

impl ObjectFifo {
    /// Create a FIFO: place `depth` slot buffers of `shape`×`elem_type`
    /// on the producer tile and allocate the lock pair there.
    ///
    /// `consumer_dims`, when given, must carry one entry per consumer;
    /// each transform is at most 3 (size, stride) pairs, matching the BD
    /// dimension registers.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        topo: &mut GridTopology,
        alloc: &mut ResourceAllocator,
        name: &str,
        producer: TileId,
        consumers: &[TileId],
        depth: u32,
        shape: &[usize],
        elem_type: ElemType,
        consumer_dims: Option<Vec<Option<Vec<DimPair>>>>,
    ) -> Result<Self> {
        if consumers.is_empty() || depth == 0 {
            return Err(ConfigurationError::UnbalancedLock {
                fifo: name.to_owned(),
                reason: "a fifo needs at least one consumer and depth >= 1".into(),
            });
        }
        if depth > LOCK_MAX_VALUE as u32 {
            return Err(ConfigurationError::UnbalancedLock {
                fifo: name.to_owned(),
                reason: format!(
                    "depth {depth} cannot be held by a 6-bit lock (max {LOCK_MAX_VALUE})"
                ),
            });
        }
        topo.check_active(producer)?;
        for &c in consumers {
            topo.check_active(c)?;
        }

        let consumer_dims = match consumer_dims {
            Some(dims) => {
                if dims.len() != consumers.len() {
                    return Err(ConfigurationError::UnbalancedLock {
                        fifo: name.to_owned(),
                        reason: format!(
                            "{} dimension transforms for {} consumers",
                            dims.len(),
                            consumers.len()
                        ),
                    });
                }
                if let Some(bad) = dims
                    .iter()
                    .flatten()
                    .find(|d| d.len() > MAX_BD_DIMENSIONS)
                {
                    return Err(ConfigurationError::UnbalancedLock {
                        fifo: name.to_owned(),
                        reason: format!(
                            "dimension transform has {} pairs; BDs address at most {}",
                            bad.len(),
                            MAX_BD_DIMENSIONS
                        ),
                    });
                }
                dims
            }
            None => vec![None; consumers.len()],
        };

        let mut slots = Vec::with_capacity(depth as usize);
        for _ in 0..depth {
            slots.push(topo.place_buffer(producer, shape, elem_type, None)?);
        }
        let producer_lock = topo.place_lock(alloc, producer, depth as u8)?;
        let consumer_lock = topo.place_lock(alloc, producer, 0)?;

        log::debug!("fifo '{name}' on {producer}: depth {depth}, {} consumers", consumers.len());

        Ok(Self {
            name: name.to_owned(),
            producer,
            consumers: consumers.to_vec(),
            depth,
            slots,
            producer_lock,
            consumer_lock,
            consumer_dims,
            states: vec![SlotState::Free; depth as usize],
            produce_cursor: 0,
            consume_cursor: 0,
            outstanding_produce: 0,
            outstanding_consume: 0,
        })
    }

    /// FIFO name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Producer tile.
    #[inline]
    pub fn producer(&self) -> TileId {
        self.producer
    }

    /// Consumer tiles, in declaration order.
    #[inline]
    pub fn consumers(&self) -> &[TileId] {
        &self.consumers
    }

    /// Maximum concurrently acquired-but-unreleased slots per role.
    #[inline]
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Slot buffers, in ring order.
    #[inline]
    pub fn slots(&self) -> &[BufferId] {
        &self.slots
    }

    /// Stream-side dimension transform for consumer `index`, if any.
    pub fn consumer_dims(&self, index: usize) -> Option<&[DimPair]> {
        self.consumer_dims.get(index)?.as_deref()
    }

    /// Protocol state of slot `index`.
    pub fn slot_state(&self, index: usize) -> Option<SlotState> {
        self.states.get(index).copied()
    }

    /// The lock pair's initial values, emitted before any transfer.
    pub fn lock_inits(&self) -> [(LockId, u8); 2] {
        [(self.producer_lock, self.depth as u8), (self.consumer_lock, 0)]
    }

    /// Acquire `count` slots for `role`.
    ///
    /// Conceptually blocks (realized as a lock-acquire in the emitted
    /// stream) until `count` slots are available; at configuration time
    /// this validates the depth invariant: acquired-but-unreleased slots
    /// per role never exceed `depth`. `mode` is carried into the emitted
    /// lock spec: see [`AcquireMode`] for the convention.
    pub fn acquire(&mut self, role: FifoRole, count: u32, mode: AcquireMode) -> Result<SlotGrant> {
        if count == 0 {
            return Err(ConfigurationError::UnbalancedLock {
                fifo: self.name.clone(),
                reason: "acquire of zero slots".into(),
            });
        }
        let outstanding = match role {
            FifoRole::Produce => self.outstanding_produce,
            FifoRole::Consume => self.outstanding_consume,
        };
        if outstanding + count > self.depth {
            return Err(ConfigurationError::UnbalancedLock {
                fifo: self.name.clone(),
                reason: format!(
                    "acquiring {count} more slots for {role:?} with {outstanding} \
                     outstanding exceeds depth {}",
                    self.depth
                ),
            });
        }

        let mut slots = SmallVec::new();
        let mut buffers = SmallVec::new();
        for _ in 0..count {
            let idx = match role {
                FifoRole::Produce => {
                    let idx = self.produce_cursor;
                    self.produce_cursor = (self.produce_cursor + 1) % self.depth as usize;
                    self.states[idx] = SlotState::Filling;
                    idx
                }
                FifoRole::Consume => {
                    let idx = self.consume_cursor;
                    self.consume_cursor = (self.consume_cursor + 1) % self.depth as usize;
                    self.states[idx] = SlotState::Draining;
                    idx
                }
            };
            slots.push(idx);
            buffers.push(self.slots[idx]);
        }
        match role {
            FifoRole::Produce => self.outstanding_produce += count,
            FifoRole::Consume => self.outstanding_consume += count,
        }
        Ok(SlotGrant { role, mode, slots, buffers })
    }

    /// Release the slots of a grant, opening them for the opposite role.
    ///
    /// Consuming the grant is what enforces acquire/release pairing: a
    /// release without a matching acquire cannot be expressed.
    pub fn release(&mut self, grant: SlotGrant) {
        let count = grant.slots.len() as u32;
        for &idx in &grant.slots {
            self.states[idx] = match grant.role {
                FifoRole::Produce => SlotState::Full,
                FifoRole::Consume => SlotState::Free,
            };
        }
        match grant.role {
            FifoRole::Produce => self.outstanding_produce -= count,
            FifoRole::Consume => self.outstanding_consume -= count,
        }
    }

    /// Outstanding acquired-but-unreleased slots for `role`.
    pub fn outstanding(&self, role: FifoRole) -> u32 {
        match role {
            FifoRole::Produce => self.outstanding_produce,
            FifoRole::Consume => self.outstanding_consume,
        }
    }

    /// True if both roles have released everything they acquired.
    ///
    /// The emitter validates this before materializing the stream.
    pub fn is_balanced(&self) -> bool {
        self.outstanding_produce == 0 && self.outstanding_consume == 0
    }

    /// BD lock specs for the producer side: wait for `count` free slots,
    /// then signal `count` elements to the consumer lock.
    pub fn producer_bd_locks(&self, count: u8, mode: AcquireMode) -> (LockAcquire, LockRelease) {
        (
            LockAcquire { lock: self.producer_lock, value: count, mode },
            LockRelease { lock: self.consumer_lock, value: count },
        )
    }

    /// BD lock specs for a consumer side: wait for `count` full elements,
    /// then hand the slots back to the producer lock.
    pub fn consumer_bd_locks(&self, count: u8, mode: AcquireMode) -> (LockAcquire, LockRelease) {
        (
            LockAcquire { lock: self.consumer_lock, value: count, mode },
            LockRelease { lock: self.producer_lock, value: count },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fifo(depth: u32) -> (GridTopology, ObjectFifo) {
        let mut topo = GridTopology::npu1();
        let mut alloc = ResourceAllocator::new();
        let fifo = ObjectFifo::new(
            &mut topo,
            &mut alloc,
            "af",
            TileId::new(0, 1),
            &[TileId::new(0, 2)],
            depth,
            &[32],
            ElemType::I32,
            None,
        )
        .unwrap();
        (topo, fifo)
    }

    #[test]
    fn test_lock_pair_initial_values() {
        let (_, fifo) = fifo(4);
        let [(p, p_init), (c, c_init)] = fifo.lock_inits();
        assert_eq!(p_init, 4);
        assert_eq!(c_init, 0);
        assert_ne!(p.id, c.id);
        assert_eq!(p.tile, TileId::new(0, 1));
    }

    #[test]
    fn test_depth_bound_enforced() {
        let (_, mut fifo) = fifo(4);
        let g = fifo
            .acquire(FifoRole::Produce, 4, AcquireMode::GreaterEqual)
            .unwrap();
        assert_eq!(g.len(), 4);
        // Fifth concurrent acquire with nothing released: rejected.
        assert!(matches!(
            fifo.acquire(FifoRole::Produce, 1, AcquireMode::GreaterEqual),
            Err(ConfigurationError::UnbalancedLock { .. })
        ));
        fifo.release(g);
        assert!(fifo
            .acquire(FifoRole::Produce, 1, AcquireMode::GreaterEqual)
            .is_ok());
    }

    #[test]
    fn test_roles_bounded_independently() {
        let (_, mut fifo) = fifo(2);
        let p = fifo
            .acquire(FifoRole::Produce, 2, AcquireMode::GreaterEqual)
            .unwrap();
        // The consumer side is bounded by `depth` independently.
        let c = fifo
            .acquire(FifoRole::Consume, 2, AcquireMode::GreaterEqual)
            .unwrap();
        assert_eq!(fifo.outstanding(FifoRole::Produce), 2);
        assert_eq!(fifo.outstanding(FifoRole::Consume), 2);
        fifo.release(p);
        fifo.release(c);
        assert!(fifo.is_balanced());
    }

    #[test]
    fn test_wraparound_slot_order() {
        let (_, mut fifo) = fifo(2);
        let a = fifo
            .acquire(FifoRole::Produce, 1, AcquireMode::GreaterEqual)
            .unwrap();
        let first = a.buffers()[0];
        fifo.release(a);
        let b = fifo
            .acquire(FifoRole::Produce, 1, AcquireMode::GreaterEqual)
            .unwrap();
        let second = b.buffers()[0];
        fifo.release(b);
        let c = fifo
            .acquire(FifoRole::Produce, 1, AcquireMode::GreaterEqual)
            .unwrap();
        // Depth 2: the third acquire wraps to the first slot.
        assert_eq!(c.buffers()[0], first);
        assert_ne!(first, second);
        fifo.release(c);
    }

    #[test]
    fn test_slot_state_machine() {
        let (_, mut fifo) = fifo(2);
        assert_eq!(fifo.slot_state(0), Some(SlotState::Free));
        let p = fifo
            .acquire(FifoRole::Produce, 1, AcquireMode::GreaterEqual)
            .unwrap();
        assert_eq!(fifo.slot_state(0), Some(SlotState::Filling));
        fifo.release(p);
        assert_eq!(fifo.slot_state(0), Some(SlotState::Full));
        let c = fifo
            .acquire(FifoRole::Consume, 1, AcquireMode::GreaterEqual)
            .unwrap();
        assert_eq!(fifo.slot_state(0), Some(SlotState::Draining));
        fifo.release(c);
        assert_eq!(fifo.slot_state(0), Some(SlotState::Free));
    }

    #[test]
    fn test_bd_lock_specs_are_paired() {
        let (_, fifo) = fifo(2);
        let (p_acq, p_rel) = fifo.producer_bd_locks(1, AcquireMode::GreaterEqual);
        let (c_acq, c_rel) = fifo.consumer_bd_locks(1, AcquireMode::GreaterEqual);
        // Producer waits on the lock the consumer releases, and vice versa.
        assert_eq!(p_acq.lock, c_rel.lock);
        assert_eq!(c_acq.lock, p_rel.lock);
    }

    #[test]
    fn test_zero_depth_and_no_consumers_rejected() {
        let mut topo = GridTopology::npu1();
        let mut alloc = ResourceAllocator::new();
        assert!(ObjectFifo::new(
            &mut topo,
            &mut alloc,
            "bad",
            TileId::new(0, 1),
            &[],
            2,
            &[8],
            ElemType::I32,
            None,
        )
        .is_err());
        assert!(ObjectFifo::new(
            &mut topo,
            &mut alloc,
            "bad",
            TileId::new(0, 1),
            &[TileId::new(0, 2)],
            0,
            &[8],
            ElemType::I32,
            None,
        )
        .is_err());
    }

    #[test]
    fn test_consumer_dims_validated() {
        let mut topo = GridTopology::npu1();
        let mut alloc = ResourceAllocator::new();
        let too_many = vec![Some(vec![DimPair { size: 1, stride: 1 }; 4])];
        assert!(matches!(
            ObjectFifo::new(
                &mut topo,
                &mut alloc,
                "bad",
                TileId::new(0, 1),
                &[TileId::new(0, 2)],
                2,
                &[8],
                ElemType::I32,
                Some(too_many),
            ),
            Err(ConfigurationError::UnbalancedLock { .. })
        ));
    }
}
