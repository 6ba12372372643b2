//! GPU device and window surface setup
//!
//! `GpuContext` holds the device-level resources (instance, adapter, device,
//! queue) and `WindowSurface` the swapchain for the player window.

use std::sync::Arc;

use winit::window::Window;

use crate::video::SurfaceError;

/// Device-level GPU resources
pub struct GpuContext {
    /// The wgpu instance
    pub instance: wgpu::Instance,
    /// The selected GPU adapter
    pub adapter: wgpu::Adapter,
    /// The GPU device for creating resources
    pub device: wgpu::Device,
    /// The command queue for submitting GPU work
    pub queue: wgpu::Queue,
    /// The preferred surface format (sRGB when available)
    pub surface_format: wgpu::TextureFormat,
}

impl GpuContext {
    /// Create the device for `window` and the surface presenting into it.
    ///
    /// The surface is returned alongside the context because it was needed
    /// to pick a compatible adapter.
    pub async fn new(window: Arc<Window>) -> Result<(Self, wgpu::Surface<'static>), SurfaceError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance
            .create_surface(window)
            .map_err(|e| SurfaceError::Init(format!("failed to create surface: {e}")))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| SurfaceError::Init("no suitable GPU adapter".to_string()))?;

        tracing::info!("Using GPU: {}", adapter.get_info().name);
        tracing::info!("Backend: {:?}", adapter.get_info().backend);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Media Player Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default().using_resolution(adapter.limits()),
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await
            .map_err(|e| SurfaceError::Init(format!("failed to create device: {e}")))?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first())
            .copied()
            .ok_or_else(|| SurfaceError::Init("surface reports no supported formats".to_string()))?;

        tracing::info!("Surface format: {:?}", surface_format);

        Ok((
            Self {
                instance,
                adapter,
                device,
                queue,
                surface_format,
            },
            surface,
        ))
    }
}

/// Pick a present mode: FIFO with vsync, otherwise the lowest-latency mode available
pub fn select_present_mode(available: &[wgpu::PresentMode], vsync: bool) -> wgpu::PresentMode {
    if vsync {
        return wgpu::PresentMode::Fifo;
    }
    if available.contains(&wgpu::PresentMode::Immediate) {
        wgpu::PresentMode::Immediate
    } else if available.contains(&wgpu::PresentMode::Mailbox) {
        wgpu::PresentMode::Mailbox
    } else {
        wgpu::PresentMode::Fifo
    }
}

/// The swapchain of the player window
pub struct WindowSurface {
    pub surface: wgpu::Surface<'static>,
    pub config: wgpu::SurfaceConfiguration,
}

impl WindowSurface {
    /// Configure `surface` for the given size
    pub fn new(gpu: &GpuContext, surface: wgpu::Surface<'static>, width: u32, height: u32, vsync: bool) -> Self {
        let surface_caps = surface.get_capabilities(&gpu.adapter);
        let present_mode = select_present_mode(&surface_caps.present_modes, vsync);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: gpu.surface_format,
            width: width.max(1),
            height: height.max(1),
            present_mode,
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 1,
        };

        surface.configure(&gpu.device, &config);
        tracing::debug!(width = config.width, height = config.height, ?present_mode, "Configured surface");

        Self { surface, config }
    }

    /// Resize the swapchain. Zero-sized (minimised) windows are ignored.
    pub fn resize(&mut self, gpu: &GpuContext, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.config.width = width;
            self.config.height = height;
            self.surface.configure(&gpu.device, &self.config);
        }
    }

    /// Re-apply the current configuration after the surface was lost or outdated
    pub fn reconfigure(&self, gpu: &GpuContext) {
        self.surface.configure(&gpu.device, &self.config);
    }

    pub fn size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }
}
