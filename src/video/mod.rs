//! Presentation of decoded video
//!
//! - `VideoTexture`: RGBA texture plus RGB24 upload path
//! - `VideoRenderer`: full-screen quad pipeline
//! - `Surface`: window, swapchain and input polling around both

mod error;
mod renderer;
mod surface;
mod texture;

pub use error::SurfaceError;
pub use renderer::{QuadVertex, VideoRenderer, QUAD_INDICES, QUAD_VERTICES};
pub use surface::{ErrorCallback, KeyCallback, Overlay, OverlayContext, Surface, SurfaceOptions};
pub use texture::{expand_rgb_to_rgba, validate_rgb_frame, VideoTexture, RGBA_BYTES_PER_PIXEL};
