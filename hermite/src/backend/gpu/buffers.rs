use std::mem::size_of;

use kernels::{Body, Forces, Predictor};
use wgpu::{BindGroup, BindGroupLayout, Buffer, BufferUsages, Device, Queue};

use crate::{backend::row_runs, error::HermiteError, store::ParticleStore};

/// Byte size of each storage binding for `n` particles and `partitions`
/// j-partitions, in binding order.
pub(crate) fn binding_sizes(n: usize, partitions: usize) -> [(&'static str, u64); 5] {
    let n = n as u64;
    [
        ("bodies", n * size_of::<Body>() as u64),
        ("predicted", n * size_of::<Predictor>() as u64),
        ("active", n * size_of::<u32>() as u64),
        (
            "partial forces",
            partitions as u64 * n * size_of::<Forces>() as u64,
        ),
        ("forces", n * size_of::<Forces>() as u64),
    ]
}

/// Reject layouts the device cannot bind, before wgpu validation panics.
pub(crate) fn check_binding_sizes(
    n: usize,
    partitions: usize,
    limits: &wgpu::Limits,
) -> Result<(), HermiteError> {
    let limit = (limits.max_storage_buffer_binding_size as u64).min(limits.max_buffer_size);
    for (buffer, bytes) in binding_sizes(n, partitions) {
        if bytes > limit {
            return Err(HermiteError::BufferTooLarge {
                buffer,
                bytes,
                limit,
            });
        }
    }
    Ok(())
}

fn storage(device: &Device, (label, size): (&str, u64), extra: BufferUsages) -> Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size,
        usage: BufferUsages::STORAGE | extra,
        mapped_at_creation: false,
    })
}

/// Device-side arrays, sized for `n` particles all active at once.
pub(crate) struct DeviceBuffers {
    pub bodies: Buffer,
    pub predicted: Buffer,
    pub partial: Buffer,
    pub forces: Buffer,
    pub active: Buffer,
    pub staging: Buffer,
    pub bind_group: BindGroup,
    pub n: usize,
}

impl DeviceBuffers {
    pub fn new(device: &Device, layout: &BindGroupLayout, n: usize, partitions: usize) -> Self {
        let [bodies, predicted, active, partial, forces] = binding_sizes(n, partitions);
        let bodies = storage(device, bodies, BufferUsages::COPY_DST);
        let predicted = storage(device, predicted, BufferUsages::empty());
        let active = storage(device, active, BufferUsages::COPY_DST);
        let partial = storage(device, partial, BufferUsages::empty());
        let forces = storage(device, forces, BufferUsages::COPY_SRC);
        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("forces staging"),
            size: forces.size(),
            usage: BufferUsages::MAP_READ | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("hermite bind group"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: bodies.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: predicted.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: active.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: partial.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: forces.as_entire_binding(),
                },
            ],
        });

        Self {
            bodies,
            predicted,
            partial,
            forces,
            active,
            staging,
            bind_group,
            n,
        }
    }

    pub fn allocated_bytes(&self) -> u64 {
        [
            &self.bodies,
            &self.predicted,
            &self.active,
            &self.partial,
            &self.forces,
            &self.staging,
        ]
        .iter()
        .map(|b| b.size())
        .sum()
    }

    pub fn write_all(&self, queue: &Queue, store: &ParticleStore) {
        queue.write_buffer(&self.bodies, 0, bytemuck::cast_slice(&store.device_rows()));
    }

    /// Write the listed rows, one transfer per contiguous run.
    pub fn write_rows(&self, queue: &Queue, store: &ParticleStore, rows: &[usize]) {
        for run in row_runs(rows) {
            let offset = (run.start * size_of::<Body>()) as u64;
            let data: Vec<Body> = run.map(|i| store.device_row(i)).collect();
            queue.write_buffer(&self.bodies, offset, bytemuck::cast_slice(&data));
        }
    }
}
