//! Adapter and device selection.
//!
//! Set `HERMITE_GPU_ADAPTER` to pick the GPU:
//!
//! | Value        | Behavior |
//! |--------------|----------|
//! | unset/`auto` | first discrete GPU with `SHADER_F64`, else any with it |
//! | `0`, `1`, …  | adapter by enumeration index |
//! | other        | case-insensitive substring of the adapter name |

use wgpu::{Adapter, Device, Features, Queue};

use crate::error::HermiteError;

/// Features every kernel depends on.
pub fn required_features() -> Features {
    Features::SHADER_F64 | Features::PUSH_CONSTANTS
}

/// Push-constant bytes the kernels need.
pub const PUSH_CONSTANT_SIZE: u32 = std::mem::size_of::<kernels::KernelConstants>() as u32;

pub struct GpuContext {
    pub adapter_info: wgpu::AdapterInfo,
    pub device: Device,
    pub queue: Queue,
    pub limits: wgpu::Limits,
}

fn backends_from_env() -> wgpu::Backends {
    match std::env::var("HERMITE_WGPU_BACKEND").as_deref() {
        Ok("vulkan") => wgpu::Backends::VULKAN,
        Ok("metal") => wgpu::Backends::METAL,
        Ok("dx12") => wgpu::Backends::DX12,
        _ => wgpu::Backends::all(),
    }
}

fn select_adapter(adapters: Vec<Adapter>, selector: &str) -> Result<Adapter, HermiteError> {
    if adapters.is_empty() {
        return Err(HermiteError::NoAdapter("no adapters enumerated".to_owned()));
    }

    if selector.is_empty() || selector == "auto" {
        let mut fallback = None;
        for adapter in adapters {
            if !adapter.features().contains(Features::SHADER_F64) {
                continue;
            }
            if adapter.get_info().device_type == wgpu::DeviceType::DiscreteGpu {
                return Ok(adapter);
            }
            fallback.get_or_insert(adapter);
        }
        return fallback.ok_or_else(|| {
            HermiteError::NoAdapter("no adapter supports SHADER_F64".to_owned())
        });
    }

    if let Ok(idx) = selector.parse::<usize>() {
        let count = adapters.len();
        return adapters.into_iter().nth(idx).ok_or_else(|| {
            HermiteError::NoAdapter(format!("adapter index {idx} out of range ({count} found)"))
        });
    }

    adapters
        .into_iter()
        .find(|a| a.get_info().name.to_ascii_lowercase().contains(selector))
        .ok_or_else(|| HermiteError::NoAdapter(format!("no adapter matching '{selector}'")))
}

impl GpuContext {
    pub async fn new() -> Result<Self, HermiteError> {
        let backends = backends_from_env();
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends,
            ..Default::default()
        });
        let selector = std::env::var("HERMITE_GPU_ADAPTER")
            .unwrap_or_default()
            .trim()
            .to_lowercase();
        let adapter = select_adapter(instance.enumerate_adapters(backends), &selector)?;
        let adapter_info = adapter.get_info();

        if !adapter.features().contains(Features::SHADER_F64) {
            return Err(HermiteError::NoShaderF64(adapter_info.name));
        }
        if !adapter.features().contains(Features::PUSH_CONSTANTS) {
            return Err(HermiteError::DeviceCreation(format!(
                "{} does not support push constants",
                adapter_info.name
            )));
        }
        let adapter_limits = adapter.limits();
        if adapter_limits.max_push_constant_size < PUSH_CONSTANT_SIZE {
            return Err(HermiteError::DeviceCreation(format!(
                "{} allows {} push-constant bytes, {PUSH_CONSTANT_SIZE} needed",
                adapter_info.name, adapter_limits.max_push_constant_size
            )));
        }

        let required_limits = wgpu::Limits {
            max_push_constant_size: PUSH_CONSTANT_SIZE,
            max_storage_buffer_binding_size: adapter_limits.max_storage_buffer_binding_size,
            max_buffer_size: adapter_limits.max_buffer_size,
            max_compute_workgroup_size_x: adapter_limits.max_compute_workgroup_size_x,
            max_compute_invocations_per_workgroup: adapter_limits
                .max_compute_invocations_per_workgroup,
            max_compute_workgroup_storage_size: adapter_limits.max_compute_workgroup_storage_size,
            ..wgpu::Limits::default()
        };

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("hermite device"),
                required_features: required_features(),
                required_limits: required_limits.clone(),
                ..Default::default()
            })
            .await
            .map_err(|e| HermiteError::DeviceCreation(e.to_string()))?;

        log::info!(
            "GPU adapter: {} ({:?}, {:?})",
            adapter_info.name,
            adapter_info.device_type,
            adapter_info.backend
        );

        Ok(Self {
            adapter_info,
            device,
            queue,
            limits: required_limits,
        })
    }
}
