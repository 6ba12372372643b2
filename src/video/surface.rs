//! Presentation surface: window, swapchain, video quad and input polling
//!
//! The surface does not run the winit event loop; the caller drives it by
//! calling `render_frame` or `process_input`, each of which pumps pending
//! window events without blocking.

use std::sync::Arc;
use std::time::Duration;

use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::platform::pump_events::{EventLoopExtPumpEvents, PumpStatus};
use winit::window::{Window, WindowAttributes, WindowId};

use super::{SurfaceError, VideoRenderer, VideoTexture};
use crate::gpu_context::{GpuContext, WindowSurface};

/// Pump iterations to wait for the platform to deliver `resumed` at startup
const WINDOW_CREATE_ATTEMPTS: usize = 100;
const WINDOW_CREATE_POLL: Duration = Duration::from_millis(10);

/// Receives windowing and GPU error messages for the lifetime of the surface
pub type ErrorCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Sees every pressed key before the built-in Escape handling.
/// Returning `true` requests that the surface close.
pub type KeyCallback = Box<dyn FnMut(&Key) -> bool>;

/// Everything `Surface::init` needs besides the frame size
pub struct SurfaceOptions {
    pub title: String,
    pub vsync: bool,
    pub on_error: Option<ErrorCallback>,
    pub on_key: Option<KeyCallback>,
}

impl Default for SurfaceOptions {
    fn default() -> Self {
        Self {
            title: "Media Player".to_string(),
            vsync: false,
            on_error: None,
            on_key: None,
        }
    }
}

/// GPU handles an overlay draws with, valid for one frame
pub struct OverlayContext<'a> {
    pub device: &'a wgpu::Device,
    pub queue: &'a wgpu::Queue,
    pub encoder: &'a mut wgpu::CommandEncoder,
    /// The swapchain image the video quad was just drawn into
    pub target: &'a wgpu::TextureView,
    pub format: wgpu::TextureFormat,
    /// Target size in pixels
    pub size: (u32, u32),
}

/// Drawn on top of the video quad every frame, before present
pub trait Overlay {
    fn draw(&mut self, context: &mut OverlayContext<'_>);
}

/// Window state fed by the event pump
struct WindowEvents {
    attributes: WindowAttributes,
    window: Option<Arc<Window>>,
    create_error: Option<String>,
    close_requested: bool,
    resized: Option<PhysicalSize<u32>>,
    on_key: Option<KeyCallback>,
}

impl WindowEvents {
    fn new(attributes: WindowAttributes, on_key: Option<KeyCallback>) -> Self {
        Self {
            attributes,
            window: None,
            create_error: None,
            close_requested: false,
            resized: None,
            on_key,
        }
    }

    fn handle_key(&mut self, key: &Key) {
        if let Some(on_key) = self.on_key.as_mut() {
            if on_key(key) {
                self.close_requested = true;
            }
        }
        if *key == Key::Named(NamedKey::Escape) {
            self.close_requested = true;
        }
    }
}

impl ApplicationHandler for WindowEvents {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        match event_loop.create_window(self.attributes.clone()) {
            Ok(window) => self.window = Some(Arc::new(window)),
            Err(err) => self.create_error = Some(err.to_string()),
        }
    }

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => self.close_requested = true,
            WindowEvent::Resized(size) => self.resized = Some(size),
            WindowEvent::KeyboardInput { event, .. } if event.state == ElementState::Pressed => {
                self.handle_key(&event.logical_key);
            }
            _ => {}
        }
    }
}

fn report(on_error: &Option<ErrorCallback>, err: SurfaceError) -> SurfaceError {
    tracing::error!(error = %err, "Presentation surface error");
    if let Some(on_error) = on_error {
        on_error(&err.to_string());
    }
    err
}

/// A window presenting RGB24 video frames through a full-screen textured quad
pub struct Surface {
    overlay: Option<Box<dyn Overlay>>,
    bind_group: Option<wgpu::BindGroup>,
    texture: Option<VideoTexture>,
    renderer: Option<VideoRenderer>,
    window_surface: Option<WindowSurface>,
    gpu: Option<GpuContext>,
    events: WindowEvents,
    event_loop: Option<EventLoop<()>>,
    on_error: Option<ErrorCallback>,
    width: u32,
    height: u32,
    should_close: bool,
    closed: bool,
}

impl Surface {
    /// Open a `width` x `height` window and build the video pipeline for frames of that size.
    ///
    /// Anything created before a failing step is released before the error is returned.
    pub fn init(width: u32, height: u32, options: SurfaceOptions) -> Result<Self, SurfaceError> {
        let SurfaceOptions {
            title,
            vsync,
            on_error,
            on_key,
        } = options;

        if width == 0 || height == 0 {
            return Err(report(
                &on_error,
                SurfaceError::Init(format!("invalid surface size {width}x{height}")),
            ));
        }

        let mut event_loop = EventLoop::new()
            .map_err(|e| report(&on_error, SurfaceError::Init(format!("failed to create event loop: {e}"))))?;

        let attributes = Window::default_attributes()
            .with_title(title)
            .with_inner_size(PhysicalSize::new(width, height));
        let mut events = WindowEvents::new(attributes, on_key);

        for _ in 0..WINDOW_CREATE_ATTEMPTS {
            if events.window.is_some() || events.create_error.is_some() {
                break;
            }
            if let PumpStatus::Exit(code) = event_loop.pump_app_events(Some(WINDOW_CREATE_POLL), &mut events) {
                return Err(report(
                    &on_error,
                    SurfaceError::Init(format!("event loop exited with code {code} during startup")),
                ));
            }
        }

        let window = match (events.window.clone(), events.create_error.take()) {
            (Some(window), _) => window,
            (None, Some(err)) => {
                return Err(report(&on_error, SurfaceError::Init(format!("failed to create window: {err}"))));
            }
            (None, None) => {
                return Err(report(&on_error, SurfaceError::Init("window was never created".to_string())));
            }
        };

        let (gpu, surface) = pollster::block_on(GpuContext::new(window.clone())).map_err(|e| report(&on_error, e))?;

        let device_errors = on_error.clone();
        gpu.device.on_uncaptured_error(Box::new(move |err| {
            tracing::error!(error = %err, "GPU error");
            if let Some(on_error) = &device_errors {
                on_error(&err.to_string());
            }
        }));

        let size = window.inner_size();
        let window_surface = WindowSurface::new(&gpu, surface, size.width, size.height, vsync);
        let texture = VideoTexture::new(&gpu.device, width, height);
        let renderer = VideoRenderer::new(&gpu.device, gpu.surface_format);
        let bind_group = renderer.create_bind_group(&gpu.device, &texture);

        tracing::info!(width, height, vsync, "Presentation surface ready");

        Ok(Self {
            overlay: None,
            bind_group: Some(bind_group),
            texture: Some(texture),
            renderer: Some(renderer),
            window_surface: Some(window_surface),
            gpu: Some(gpu),
            events,
            event_loop: Some(event_loop),
            on_error,
            width,
            height,
            should_close: false,
            closed: false,
        })
    }

    /// Width of frames this surface accepts
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height of frames this surface accepts
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Current swapchain size; differs from the frame size after a resize
    pub fn window_size(&self) -> Option<(u32, u32)> {
        self.window_surface.as_ref().map(|s| s.size())
    }

    pub fn set_overlay(&mut self, overlay: Box<dyn Overlay>) {
        self.overlay = Some(overlay);
    }

    /// Upload, draw, overlay, present, poll input, then sleep for `delay`.
    pub fn render_frame(&mut self, rgb: &[u8], width: u32, height: u32, delay: Duration) -> Result<(), SurfaceError> {
        if let Err(err) = self.present(rgb, width, height) {
            return Err(match err {
                SurfaceError::Present(_) => report(&self.on_error, err),
                other => other,
            });
        }

        self.process_input();

        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        Ok(())
    }

    fn present(&mut self, rgb: &[u8], width: u32, height: u32) -> Result<(), SurfaceError> {
        let (Some(gpu), Some(window_surface), Some(texture), Some(renderer), Some(bind_group)) = (
            self.gpu.as_ref(),
            self.window_surface.as_ref(),
            self.texture.as_mut(),
            self.renderer.as_ref(),
            self.bind_group.as_ref(),
        ) else {
            return Err(SurfaceError::Closed);
        };

        texture.upload_rgb(&gpu.queue, rgb, width, height)?;

        let frame = match window_surface.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                tracing::debug!("Surface lost or outdated, reconfiguring");
                window_surface.reconfigure(gpu);
                return Ok(());
            }
            Err(wgpu::SurfaceError::Timeout) => {
                tracing::warn!("Timed out acquiring swapchain image, frame dropped");
                return Ok(());
            }
            Err(err) => return Err(SurfaceError::Present(err.to_string())),
        };

        let view = frame.texture.create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Video Frame Encoder"),
        });

        renderer.render(&mut encoder, &view, bind_group);

        if let Some(overlay) = self.overlay.as_mut() {
            overlay.draw(&mut OverlayContext {
                device: &gpu.device,
                queue: &gpu.queue,
                encoder: &mut encoder,
                target: &view,
                format: gpu.surface_format,
                size: window_surface.size(),
            });
        }

        gpu.queue.submit(std::iter::once(encoder.finish()));
        if let Some(window) = self.events.window.as_ref() {
            window.pre_present_notify();
        }
        frame.present();
        Ok(())
    }

    /// Pump pending window events without blocking
    pub fn process_input(&mut self) {
        let Some(event_loop) = self.event_loop.as_mut() else {
            self.should_close = true;
            return;
        };

        if let PumpStatus::Exit(_) = event_loop.pump_app_events(Some(Duration::ZERO), &mut self.events) {
            self.should_close = true;
        }
        if self.events.close_requested {
            self.should_close = true;
        }

        if let Some(size) = self.events.resized.take() {
            if let (Some(gpu), Some(window_surface)) = (self.gpu.as_ref(), self.window_surface.as_mut()) {
                window_surface.resize(gpu, size.width, size.height);
                tracing::debug!(width = size.width, height = size.height, "Window resized");
            }
        }
    }

    /// Whether the window was closed or Escape was pressed
    pub fn should_close(&self) -> bool {
        self.should_close || self.closed
    }

    /// Release overlay, texture, buffers and pipeline, GPU context, then the window.
    /// Idempotent.
    pub fn cleanup(&mut self) {
        if self.closed {
            return;
        }
        self.overlay.take();
        self.bind_group.take();
        self.texture.take();
        self.renderer.take();
        self.window_surface.take();
        self.gpu.take();
        self.events.window.take();
        self.event_loop.take();
        self.closed = true;
        self.should_close = true;
        tracing::debug!("Presentation surface released");
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        self.cleanup();
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    #[test]
    fn test_escape_requests_close() {
        let mut events = WindowEvents::new(Window::default_attributes(), None);
        events.handle_key(&Key::Named(NamedKey::Space));
        assert!(!events.close_requested);
        events.handle_key(&Key::Named(NamedKey::Escape));
        assert!(events.close_requested);
    }

    #[test]
    fn test_key_callback_sees_keys_first() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = seen.clone();
        let on_key: KeyCallback = Box::new(move |key| {
            log.borrow_mut().push(key.clone());
            *key == Key::Named(NamedKey::Enter)
        });
        let mut events = WindowEvents::new(Window::default_attributes(), Some(on_key));

        events.handle_key(&Key::Named(NamedKey::Space));
        assert!(!events.close_requested);
        events.handle_key(&Key::Named(NamedKey::Enter));
        assert!(events.close_requested);

        assert_eq!(
            *seen.borrow(),
            vec![Key::Named(NamedKey::Space), Key::Named(NamedKey::Enter)]
        );
    }

    #[test]
    fn test_default_options() {
        let options = SurfaceOptions::default();
        assert_eq!(options.title, "Media Player");
        assert!(!options.vsync);
        assert!(options.on_error.is_none());
    }

    #[test]
    fn test_report_invokes_error_callback() {
        let messages = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = messages.clone();
        let on_error: Option<ErrorCallback> = Some(Arc::new(move |msg: &str| {
            sink.lock().unwrap().push(msg.to_string());
        }));

        let err = report(&on_error, SurfaceError::Init("no adapter".to_string()));
        assert!(matches!(err, SurfaceError::Init(_)));
        assert_eq!(
            messages.lock().unwrap().as_slice(),
            ["Failed to initialize presentation surface: no adapter".to_string()]
        );
    }
}
