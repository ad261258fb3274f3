//! 2x2 spatial tiled matrix multiply configuration.
//!
//! Reproduces the classic non-square spatial tiling: a 32x32 matmul
//! split across four core tiles, with A split 2x1, B split 1x2, and the
//! result C split 2x2. Operand columns 0-1 feed the cores through their
//! mem tiles; result columns 2-3 gather the products back out to host
//! memory. Prints the synthesized control-processor instruction stream.
//!
//! Run with `cargo run --example tiled_matmul`.

use anyhow::Result;
use npu_fabric::device::ElemType;
use npu_fabric::emit::{Direction, InstructionStreamBuilder, TensorSlice};
use npu_fabric::fifo::{AcquireMode, FifoRole};
use npu_fabric::{
    tiling_calculator_n_tiles, FlowRouter, GridTopology, ObjectFifo, ResourceAllocator,
    Switching, TileId,
};

fn main() -> Result<()> {
    env_logger::init();

    const M: usize = 32;
    const N: usize = 32;

    let plan_a = tiling_calculator_n_tiles(M, N, 2, 1)?;
    let plan_b = tiling_calculator_n_tiles(M, N, 1, 2)?;
    let plan_c = tiling_calculator_n_tiles(M, N, 2, 2)?;

    let mut topo = GridTopology::npu1();
    let mut alloc = ResourceAllocator::new();
    let mut router = FlowRouter::new();
    let mut builder = InstructionStreamBuilder::new();

    let (tile_m_a, tile_n_a) = (plan_a.d1.size, plan_a.d0.size);
    let (tile_m_b, tile_n_b) = (plan_b.d1.size, plan_b.d0.size);
    let (tile_m_c, tile_n_c) = (plan_c.d1.size, plan_c.d0.size);

    // Operand columns: shim feeds the column's mem tile, the mem tile
    // broadcasts to the two cores stacked above it.
    for col in [0u8, 1u8] {
        let shim = TileId::new(col, 0);
        let mem = TileId::new(col, 1);
        let cores = [TileId::new(col, 2), TileId::new(col, 3)];

        // A slice for this column.
        let a_in = router.connect(&topo, &mut alloc, shim, mem, Switching::Circuit)?;
        router.broadcast(&topo, &mut alloc, mem, &cores)?;

        // B slice for this column (broadcast across the core row).
        let b_in = router.connect(&topo, &mut alloc, shim, mem, Switching::Circuit)?;
        let b_dests = [TileId::new(0, 2 + col), TileId::new(1, 2 + col)];
        router.broadcast(&topo, &mut alloc, mem, &b_dests)?;

        // Mem-tile staging: one depth-2 fifo per operand.
        let fifo_a = ObjectFifo::new(
            &mut topo,
            &mut alloc,
            &format!("a{col}"),
            mem,
            &cores,
            2,
            &[tile_m_a, tile_n_a],
            ElemType::I32,
            None,
        )?;
        let mut fifo_b = ObjectFifo::new(
            &mut topo,
            &mut alloc,
            &format!("b{col}"),
            mem,
            &b_dests,
            2,
            &[tile_m_b, tile_n_b],
            ElemType::I32,
            None,
        )?;

        // Describe one steady-state iteration of the b fifo protocol.
        let produced = fifo_b.acquire(FifoRole::Produce, 1, AcquireMode::GreaterEqual)?;
        fifo_b.release(produced);
        let consumed = fifo_b.acquire(FifoRole::Consume, 1, AcquireMode::GreaterEqual)?;
        fifo_b.release(consumed);

        builder.init_fifo(&topo, &fifo_a)?;
        builder.init_fifo(&topo, &fifo_b)?;

        // Host-side descriptors: one sub-tile of A and one of B per column.
        builder.tensor_slice(TensorSlice {
            column: col,
            direction: Direction::Mm2s,
            channel: router.flow(a_in).source_channel,
            bd_id: 0,
            ddr_id: 0,
            plan: &plan_a,
            tile_row: col as usize,
            tile_col: 0,
        })?;
        builder.tensor_slice(TensorSlice {
            column: col,
            direction: Direction::Mm2s,
            channel: router.flow(b_in).source_channel,
            bd_id: 1,
            ddr_id: 1,
            plan: &plan_b,
            tile_row: 0,
            tile_col: col as usize,
        })?;
    }

    // Core tiles: local operand/result buffers and the lock protocol the
    // core program holds while multiplying.
    for col in [0u8, 1u8] {
        for row in [2u8, 3u8] {
            let tile = TileId::new(col, row);
            topo.place_buffer(tile, &[tile_m_a, tile_n_a], ElemType::I32, None)?;
            topo.place_buffer(tile, &[tile_m_b, tile_n_b], ElemType::I32, None)?;
            topo.place_buffer(tile, &[tile_m_c, tile_n_c], ElemType::I32, None)?;
            for init in [1u8, 0, 1, 0, 1, 0] {
                topo.place_lock(&mut alloc, tile, init)?;
            }
            builder.enable_core(&topo, tile)?;
        }
    }

    // Result path: each product column's mem tile gathers two C quadrants
    // from the cores, then forwards them down to its shim tile.
    let mut drains = Vec::new();
    for (i, col) in [2u8, 3u8].into_iter().enumerate() {
        let mem = TileId::new(col, 1);
        let shim = TileId::new(col, 0);
        let producers = [TileId::new(i as u8, 2), TileId::new(i as u8, 3)];
        router.reverse(&topo, &mut alloc, &producers, mem)?;

        for _ in 0..2 {
            let out = router.connect(&topo, &mut alloc, mem, shim, Switching::Circuit)?;
            drains.push((col, router.flow(out).dest_channel));
        }
    }

    // Host buffer addresses for A, B, C as the runtime mapped them.
    let host_addrs = [0x4000_0000u64, 0x4000_1000, 0x4000_2000];
    for col in [0u8, 1u8] {
        builder.update_tensor_addr(col, 0, host_addrs[0]);
        builder.update_tensor_addr(col, 1, host_addrs[1]);
    }

    // Drain the four C quadrants to host memory and wait on each channel.
    let quadrants = [(0, 0), (0, 1), (1, 0), (1, 1)];
    for (bd_id, ((column, channel), (tr, tc))) in
        drains.iter().zip(quadrants).enumerate()
    {
        builder.tensor_slice(TensorSlice {
            column: *column,
            direction: Direction::S2mm,
            channel: *channel,
            bd_id: bd_id as u32,
            ddr_id: 2,
            plan: &plan_c,
            tile_row: tr,
            tile_col: tc,
        })?;
        builder.sync(*channel, *column)?;
    }

    let stream = builder.finish();
    println!("synthesized {} instructions:", stream.len());
    for inst in &stream {
        println!("  {inst:?}");
    }
    Ok(())
}
