//! wgpu force backend running the rust-gpu kernels from the `shaders` crate.
//!
//! Each force evaluation is one submission: the active index list is written,
//! the tiled force kernel fills one row of partial sums per j-partition
//! (dispatch `(ceil(n_active / block), j_partitions, 1)`), the reduce kernel
//! sums them in partition order and only the reduced rows are read back.

use std::mem::size_of;

use kernels::{Forces, KernelConstants, PARTICLE_THREADS};
use wgpu::{ComputePass, ComputePipeline};

use crate::{
    backend::ForceBackend,
    config::SimulationConfig,
    error::HermiteError,
    store::ParticleStore,
};

mod buffers;
mod context;
mod pipelines;

use buffers::DeviceBuffers;
pub use context::GpuContext;
use pipelines::KernelPipelines;
pub use pipelines::forces_entry_point;

pub struct GpuBackend {
    ctx: GpuContext,
    pipelines: KernelPipelines,
    buffers: Option<DeviceBuffers>,
    constants: KernelConstants,
    block_size: u32,
}

fn dispatch(
    pass: &mut ComputePass<'_>,
    pipeline: &ComputePipeline,
    buffers: &DeviceBuffers,
    constants: &KernelConstants,
    groups: (u32, u32),
) {
    pass.set_pipeline(pipeline);
    pass.set_bind_group(0, &buffers.bind_group, &[]);
    pass.set_push_constants(0, bytemuck::bytes_of(constants));
    pass.dispatch_workgroups(groups.0, groups.1, 1);
}

impl GpuBackend {
    /// Open the device selected by `HERMITE_GPU_ADAPTER` and build the kernels.
    pub async fn new(config: &SimulationConfig) -> Result<Self, HermiteError> {
        let ctx = GpuContext::new().await?;
        let pipelines = KernelPipelines::new(&ctx.device, config.block_size)?;

        Ok(Self {
            ctx,
            pipelines,
            buffers: None,
            constants: KernelConstants {
                j_partitions: config.j_partitions as u32,
                softening2: config.softening2,
                g: config.g,
                ..Default::default()
            },
            block_size: config.block_size as u32,
        })
    }

    pub fn adapter_name(&self) -> &str {
        &self.ctx.adapter_info.name
    }

    fn buffers(&self) -> Result<&DeviceBuffers, HermiteError> {
        self.buffers
            .as_ref()
            .ok_or_else(|| HermiteError::Transfer("no particles uploaded".to_owned()))
    }

    fn check_groups(&self, groups: u32) -> Result<u32, HermiteError> {
        let limit = self.ctx.limits.max_compute_workgroups_per_dimension;
        if groups > limit {
            return Err(HermiteError::DispatchTooLarge { groups, limit });
        }
        Ok(groups)
    }

    fn read_forces(&self, out: &mut [Forces]) -> Result<(), HermiteError> {
        let buffers = self.buffers()?;
        let bytes = (out.len() * size_of::<Forces>()) as u64;
        let slice = buffers.staging.slice(..bytes);

        let (sender, receiver) = futures::channel::oneshot::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.ctx
            .device
            .poll(wgpu::PollType::Wait)
            .map_err(|e| HermiteError::Transfer(e.to_string()))?;
        futures::executor::block_on(receiver)
            .map_err(|_| HermiteError::Transfer("map callback dropped".to_owned()))?
            .map_err(|e| HermiteError::Transfer(e.to_string()))?;

        {
            let data = slice.get_mapped_range();
            // Mapped memory carries no alignment guarantee for `Forces`.
            bytemuck::cast_slice_mut::<Forces, u8>(out).copy_from_slice(&data);
        }
        buffers.staging.unmap();
        Ok(())
    }
}

impl ForceBackend for GpuBackend {
    fn name(&self) -> &str {
        "gpu"
    }

    fn upload(&mut self, store: &ParticleStore) -> Result<(), HermiteError> {
        let n = store.len();
        let partitions = self.constants.j_partitions as usize;
        buffers::check_binding_sizes(n, partitions, &self.ctx.limits)?;
        let buffers = DeviceBuffers::new(
            &self.ctx.device,
            &self.pipelines.layout,
            n,
            partitions,
        );
        buffers.write_all(&self.ctx.queue, store);
        log::debug!(
            "gpu backend: {} bytes of device buffers for {n} particles",
            buffers.allocated_bytes()
        );
        self.constants.n = n as u32;
        self.buffers = Some(buffers);
        Ok(())
    }

    fn sync_rows(&mut self, store: &ParticleStore, rows: &[usize]) -> Result<(), HermiteError> {
        self.buffers()?.write_rows(&self.ctx.queue, store, rows);
        Ok(())
    }

    fn predict(&mut self, t_global: f64) -> Result<(), HermiteError> {
        self.constants.t_global = t_global;
        let buffers = self.buffers()?;
        let groups = self.check_groups((buffers.n as u32).div_ceil(PARTICLE_THREADS))?;

        let mut encoder = self
            .ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("predict"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("predict"),
                timestamp_writes: None,
            });
            dispatch(
                &mut pass,
                &self.pipelines.predict,
                buffers,
                &self.constants,
                (groups, 1),
            );
        }
        self.ctx.queue.submit(Some(encoder.finish()));
        Ok(())
    }

    fn compute_forces(&mut self, active: &[u32], out: &mut [Forces]) -> Result<(), HermiteError> {
        let n_active = active.len();
        if n_active == 0 {
            return Ok(());
        }
        self.constants.n_active = n_active as u32;
        let constants = self.constants;
        let buffers = self.buffers()?;
        if n_active > buffers.n {
            return Err(HermiteError::Transfer(format!(
                "{n_active} active particles exceed the {} uploaded",
                buffers.n
            )));
        }

        let tiles = self.check_groups((n_active as u32).div_ceil(self.block_size))?;
        let partitions = self.check_groups(constants.j_partitions)?;
        let reduce_groups = self.check_groups((n_active as u32).div_ceil(PARTICLE_THREADS))?;

        self.ctx
            .queue
            .write_buffer(&buffers.active, 0, bytemuck::cast_slice(active));

        let mut encoder = self
            .ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("forces"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("forces"),
                timestamp_writes: None,
            });
            dispatch(
                &mut pass,
                &self.pipelines.forces,
                buffers,
                &constants,
                (tiles, partitions),
            );
            dispatch(
                &mut pass,
                &self.pipelines.reduce,
                buffers,
                &constants,
                (reduce_groups, 1),
            );
        }
        let bytes = (n_active * size_of::<Forces>()) as u64;
        encoder.copy_buffer_to_buffer(&buffers.forces, 0, &buffers.staging, 0, bytes);
        self.ctx.queue.submit(Some(encoder.finish()));

        self.read_forces(&mut out[..n_active])
    }
}
