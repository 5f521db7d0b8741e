#![allow(clippy::too_many_arguments)]
#![cfg_attr(target_arch = "spirv", no_std)]
//! Compute entry points for the block time-step pipeline.
//!
//! All three kernels share descriptor set 0:
//!
//! | binding | buffer                      |
//! |---------|-----------------------------|
//! | 0       | `Body` mirror               |
//! | 1       | `Predictor` for every body  |
//! | 2       | active (i-particle) indices |
//! | 3       | partial `Forces`, one row of `n_active` per j-partition |
//! | 4       | reduced `Forces` per active particle |

use kernels::{Body, Forces, KernelConstants, Predictor, interact, partition_range, predict};
use spirv_std::arch::workgroup_memory_barrier_with_group_sync;
use spirv_std::glam::UVec3;
use spirv_std::spirv;

#[spirv(compute(threads(64)))]
pub fn predict_cs(
    #[spirv(global_invocation_id)] id: UVec3,
    #[spirv(push_constant)] constants: &KernelConstants,
    #[spirv(storage_buffer, descriptor_set = 0, binding = 0)] bodies: &[Body],
    #[spirv(storage_buffer, descriptor_set = 0, binding = 1)] predicted: &mut [Predictor],
) {
    let i = id.x as usize;
    if i < constants.n as usize {
        predicted[i] = predict(&bodies[i], constants.t_global);
    }
}

/// One workgroup handles `B` i-particles against one j-partition. The
/// partition is walked in tiles of `B` j-particles, each tile staged in
/// workgroup memory once and read by every invocation.
fn forces_tile<const B: usize>(
    local: u32,
    group: u32,
    partition: u32,
    constants: &KernelConstants,
    predicted: &[Predictor],
    active: &[u32],
    partial: &mut [Forces],
    tile: &mut [Predictor; B],
) {
    let ii = group * B as u32 + local;
    let live = ii < constants.n_active;
    // Idle invocations still load tiles and hit every barrier.
    let i = if live { active[ii as usize] } else { active[0] };
    let pi = predicted[i as usize];

    let (start, end) = partition_range(partition, constants.j_partitions, constants.n);
    let mut acc = Forces::ZERO;
    let mut base = start;
    while base < end {
        let j = base + local;
        if j < end {
            tile[local as usize] = predicted[j as usize];
        }
        unsafe { workgroup_memory_barrier_with_group_sync() };

        let width = if end - base < B as u32 {
            end - base
        } else {
            B as u32
        };
        let mut k = 0;
        while k < width {
            if base + k != i {
                interact(
                    &pi,
                    &tile[k as usize],
                    constants.softening2,
                    constants.g,
                    &mut acc,
                );
            }
            k += 1;
        }
        unsafe { workgroup_memory_barrier_with_group_sync() };
        base += B as u32;
    }

    if live {
        partial[(partition * constants.n_active + ii) as usize] = acc;
    }
}

macro_rules! forces_entry {
    ($name:ident, $block:literal) => {
        #[spirv(compute(threads($block)))]
        pub fn $name(
            #[spirv(local_invocation_id)] local: UVec3,
            #[spirv(workgroup_id)] group: UVec3,
            #[spirv(push_constant)] constants: &KernelConstants,
            #[spirv(storage_buffer, descriptor_set = 0, binding = 1)] predicted: &[Predictor],
            #[spirv(storage_buffer, descriptor_set = 0, binding = 2)] active: &[u32],
            #[spirv(storage_buffer, descriptor_set = 0, binding = 3)] partial: &mut [Forces],
            #[spirv(workgroup)] tile: &mut [Predictor; $block],
        ) {
            forces_tile::<$block>(
                local.x, group.x, group.y, constants, predicted, active, partial, tile,
            );
        }
    };
}

forces_entry!(forces_32_cs, 32);
forces_entry!(forces_64_cs, 64);
forces_entry!(forces_128_cs, 128);
forces_entry!(forces_256_cs, 256);

/// Sum the per-partition partials in partition order.
#[spirv(compute(threads(64)))]
pub fn reduce_cs(
    #[spirv(global_invocation_id)] id: UVec3,
    #[spirv(push_constant)] constants: &KernelConstants,
    #[spirv(storage_buffer, descriptor_set = 0, binding = 3)] partial: &[Forces],
    #[spirv(storage_buffer, descriptor_set = 0, binding = 4)] forces: &mut [Forces],
) {
    let ii = id.x;
    if ii >= constants.n_active {
        return;
    }
    let mut acc = Forces::ZERO;
    let mut p = 0;
    while p < constants.j_partitions {
        acc.accumulate(&partial[(p * constants.n_active + ii) as usize]);
        p += 1;
    }
    forces[ii as usize] = acc;
}
