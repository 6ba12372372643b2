//! Borrowed views into the decoder's scratch buffers
//!
//! A view is valid until the next `decode_frame()` call; the borrow checker
//! enforces that, since decoding needs `&mut` access to the source.

/// Bytes per pixel of the packed RGB24 output
pub const RGB24_BYTES_PER_PIXEL: usize = 3;

/// A converted video frame: tightly packed RGB24, row-major, no padding
#[derive(Debug, Clone, Copy)]
pub struct VideoFrame<'a> {
    /// Pixel data, `width * height * 3` bytes
    pub data: &'a [u8],
    pub width: u32,
    pub height: u32,
    /// Presentation timestamp in seconds, if the container provided one
    pub pts: Option<f64>,
}

impl<'a> VideoFrame<'a> {
    /// Get the expected data size for RGB24 frame dimensions (width * height * 3)
    pub fn expected_size(width: u32, height: u32) -> usize {
        (width as usize) * (height as usize) * RGB24_BYTES_PER_PIXEL
    }

    /// Check if the frame data has the correct size
    pub fn is_valid(&self) -> bool {
        self.data.len() == Self::expected_size(self.width, self.height)
    }

    /// Bytes per row
    pub fn stride(&self) -> usize {
        (self.width as usize) * RGB24_BYTES_PER_PIXEL
    }

    /// RGB triple at pixel (x, y)
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize) * self.stride() + (x as usize) * RGB24_BYTES_PER_PIXEL;
        self.data
            .get(offset..offset + RGB24_BYTES_PER_PIXEL)
            .map(|px| [px[0], px[1], px[2]])
    }
}

/// Copy `height` rows of `row_bytes` each out of a strided plane into `dst`.
///
/// `dst` must hold exactly `row_bytes * height` bytes.
pub(crate) fn pack_rows(src: &[u8], src_stride: usize, row_bytes: usize, height: usize, dst: &mut [u8]) {
    debug_assert_eq!(dst.len(), row_bytes * height);
    if src_stride == row_bytes {
        dst.copy_from_slice(&src[..row_bytes * height]);
        return;
    }
    for (y, row) in dst.chunks_exact_mut(row_bytes).enumerate() {
        let start = y * src_stride;
        row.copy_from_slice(&src[start..start + row_bytes]);
    }
}
