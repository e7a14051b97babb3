//! Headless GPU context.

use oep_core::{OepError, Result};
use std::sync::Arc;
use tracing::{info, warn};

/// GPU device and queue without a presentation surface.
pub struct GpuContext {
    pub instance: wgpu::Instance,
    pub adapter: wgpu::Adapter,
    pub device: Arc<wgpu::Device>,
    pub queue: Arc<wgpu::Queue>,
}

impl GpuContext {
    /// Create a context on the primary backend of the platform (Metal,
    /// Vulkan or DX12). Without a hardware adapter, falls back to the
    /// backend's software rasterizer if it has one.
    pub async fn new() -> Result<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let adapter = match Self::adapter(&instance, false).await {
            Some(adapter) => adapter,
            None => {
                warn!("No hardware GPU adapter, trying a fallback adapter");
                Self::adapter(&instance, true)
                    .await
                    .ok_or_else(|| OepError::Gpu("No suitable GPU adapter found".to_string()))?
            }
        };

        let info = adapter.get_info();
        info!(
            adapter = %info.name,
            backend = ?info.backend,
            device_type = ?info.device_type,
            "Using GPU adapter"
        );

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Offscreen Effect Player"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits {
                        max_texture_dimension_2d: 8192,
                        ..wgpu::Limits::downlevel_defaults()
                    },
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await
            .map_err(|e| OepError::Gpu(format!("Failed to create device: {}", e)))?;

        Ok(Self {
            instance,
            adapter,
            device: Arc::new(device),
            queue: Arc::new(queue),
        })
    }

    async fn adapter(instance: &wgpu::Instance, fallback: bool) -> Option<wgpu::Adapter> {
        instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: fallback,
            })
            .await
    }

    /// Blocking `new`, for callers outside an async runtime.
    pub fn new_blocking() -> Result<Self> {
        pollster::block_on(Self::new())
    }

    pub fn adapter_info(&self) -> wgpu::AdapterInfo {
        self.adapter.get_info()
    }
}
