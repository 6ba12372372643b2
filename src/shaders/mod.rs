//! Embedded WGSL shaders

/// Pass-through quad shader: `vs_main` forwards clip-space positions and
/// texture coordinates, `fs_main` samples binding 0 with the sampler at binding 1
pub const VIDEO_QUAD_SHADER: &str = include_str!("video_quad.wgsl");

/// Vertex stage entry point of [`VIDEO_QUAD_SHADER`]
pub const VERTEX_ENTRY: &str = "vs_main";

/// Fragment stage entry point of [`VIDEO_QUAD_SHADER`]
pub const FRAGMENT_ENTRY: &str = "fs_main";
