//! GPU texture for video frames
//!
//! Holds the RGBA texture sampled by the quad and a staging buffer used to
//! widen packed RGB24 frames to RGBA before upload.

use super::SurfaceError;

/// Bytes per texel of the GPU texture
pub const RGBA_BYTES_PER_PIXEL: usize = 4;

/// Widen packed RGB24 pixels into opaque RGBA8.
///
/// `rgba` must hold `rgb.len() / 3 * 4` bytes.
pub fn expand_rgb_to_rgba(rgb: &[u8], rgba: &mut [u8]) {
    debug_assert_eq!(rgb.len() / 3 * RGBA_BYTES_PER_PIXEL, rgba.len());
    for (src, dst) in rgb.chunks_exact(3).zip(rgba.chunks_exact_mut(RGBA_BYTES_PER_PIXEL)) {
        dst[0] = src[0];
        dst[1] = src[1];
        dst[2] = src[2];
        dst[3] = u8::MAX;
    }
}

/// Check that an RGB24 buffer matches the texture geometry
pub fn validate_rgb_frame(
    rgb_len: usize,
    width: u32,
    height: u32,
    texture_width: u32,
    texture_height: u32,
) -> Result<(), SurfaceError> {
    let expected_len = texture_width as usize * texture_height as usize * 3;
    if width != texture_width || height != texture_height || rgb_len != expected_len {
        return Err(SurfaceError::FrameSizeMismatch {
            width,
            height,
            len: rgb_len,
            expected_width: texture_width,
            expected_height: texture_height,
            expected_len,
        });
    }
    Ok(())
}

/// A GPU texture for displaying video frames
///
/// Bind groups are created separately by `VideoRenderer`.
pub struct VideoTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    width: u32,
    height: u32,
    /// RGBA staging, reused across uploads
    staging: Vec<u8>,
}

impl VideoTexture {
    /// Create a new video texture with the specified dimensions
    pub fn new(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let (texture, view) = Self::create_texture(device, width, height);

        Self {
            texture,
            view,
            width,
            height,
            staging: vec![0; width as usize * height as usize * RGBA_BYTES_PER_PIXEL],
        }
    }

    fn create_texture(device: &wgpu::Device, width: u32, height: u32) -> (wgpu::Texture, wgpu::TextureView) {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Video Texture"),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            // Decoded RGB is gamma-encoded
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::COPY_DST | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        (texture, view)
    }

    /// Upload a tightly packed RGB24 frame.
    ///
    /// Frames whose dimensions or length differ from the texture are rejected
    /// without touching the GPU.
    pub fn upload_rgb(&mut self, queue: &wgpu::Queue, rgb: &[u8], width: u32, height: u32) -> Result<(), SurfaceError> {
        validate_rgb_frame(rgb.len(), width, height, self.width, self.height)?;
        expand_rgb_to_rgba(rgb, &mut self.staging);

        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &self.staging,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(width * RGBA_BYTES_PER_PIXEL as u32),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_rgb_to_rgba() {
        let rgb = [255u8, 0, 0, 1, 2, 3];
        let mut rgba = [0u8; 8];
        expand_rgb_to_rgba(&rgb, &mut rgba);
        assert_eq!(rgba, [255, 0, 0, 255, 1, 2, 3, 255]);
    }

    #[test]
    fn test_validate_rgb_frame() {
        assert!(validate_rgb_frame(320 * 240 * 3, 320, 240, 320, 240).is_ok());

        let err = validate_rgb_frame(640 * 480 * 3, 640, 480, 320, 240).unwrap_err();
        assert!(matches!(
            err,
            SurfaceError::FrameSizeMismatch {
                width: 640,
                expected_width: 320,
                ..
            }
        ));

        // Right dimensions, truncated buffer
        assert!(validate_rgb_frame(100, 320, 240, 320, 240).is_err());
    }
}
