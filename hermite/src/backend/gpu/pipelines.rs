use wgpu::{
    BindGroupLayout, BindGroupLayoutEntry, ComputePipeline, Device, PipelineCompilationOptions,
    PipelineLayout, PipelineLayoutDescriptor, ShaderModule, ShaderStages,
};

use crate::{backend::gpu::context::PUSH_CONSTANT_SIZE, error::HermiteError};

/// Storage bindings shared by every kernel: bodies, predicted, active,
/// partial forces, reduced forces.
pub const BINDINGS: u32 = 5;

#[cfg(feature = "gpu")]
fn shader_module(device: &Device) -> Result<ShaderModule, HermiteError> {
    Ok(device.create_shader_module(wgpu::include_spirv!(env!("shaders.spv"))))
}

#[cfg(not(feature = "gpu"))]
fn shader_module(_device: &Device) -> Result<ShaderModule, HermiteError> {
    Err(HermiteError::ShaderUnavailable)
}

/// Force kernel entry point compiled for a tile width.
pub fn forces_entry_point(block_size: usize) -> Result<&'static str, HermiteError> {
    match block_size {
        32 => Ok("forces_32_cs"),
        64 => Ok("forces_64_cs"),
        128 => Ok("forces_128_cs"),
        256 => Ok("forces_256_cs"),
        other => Err(HermiteError::UnsupportedBlockSize(other)),
    }
}

pub(crate) struct KernelPipelines {
    pub layout: BindGroupLayout,
    pub predict: ComputePipeline,
    pub forces: ComputePipeline,
    pub reduce: ComputePipeline,
}

impl KernelPipelines {
    pub fn new(device: &Device, block_size: usize) -> Result<Self, HermiteError> {
        let forces_entry = forces_entry_point(block_size)?;
        let module = shader_module(device)?;

        let entries: Vec<BindGroupLayoutEntry> = (0..BINDINGS)
            .map(|binding| BindGroupLayoutEntry {
                binding,
                visibility: ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage { read_only: false },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            })
            .collect();
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("hermite bind group layout"),
            entries: &entries,
        });

        let pipeline_layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
            label: Some("hermite pipeline layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[wgpu::PushConstantRange {
                stages: ShaderStages::COMPUTE,
                range: 0..PUSH_CONSTANT_SIZE,
            }],
        });

        let pipeline = |entry_point: &str| {
            create_pipeline(device, &pipeline_layout, &module, entry_point)
        };

        Ok(Self {
            predict: pipeline("predict_cs"),
            forces: pipeline(forces_entry),
            reduce: pipeline("reduce_cs"),
            layout,
        })
    }
}

fn create_pipeline(
    device: &Device,
    layout: &PipelineLayout,
    module: &ShaderModule,
    entry_point: &str,
) -> ComputePipeline {
    device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(entry_point),
        layout: Some(layout),
        module,
        entry_point: Some(entry_point),
        compilation_options: PipelineCompilationOptions::default(),
        cache: None,
    })
}
