use thiserror::Error;

/// Errors raised by the presentation surface
#[derive(Error, Debug)]
pub enum SurfaceError {
    /// Window, GPU device or pipeline creation failed
    #[error("Failed to initialize presentation surface: {0}")]
    Init(String),
    /// A frame does not match the dimensions the texture was created with
    #[error(
        "Frame of {width}x{height} ({len} bytes) does not match surface texture {expected_width}x{expected_height} ({expected_len} bytes)"
    )]
    FrameSizeMismatch {
        width: u32,
        height: u32,
        len: usize,
        expected_width: u32,
        expected_height: u32,
        expected_len: usize,
    },
    /// The swapchain could not provide or present a frame
    #[error("Failed to present frame: {0}")]
    Present(String),
    /// The surface was already cleaned up
    #[error("Surface is closed")]
    Closed,
}
