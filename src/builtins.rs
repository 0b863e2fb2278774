//! Builtin Uniforms
//!
//! Every pass sees a fixed per-frame uniform record at group 0, binding 0:
//! elapsed time, delta time, frame counter and output resolution. The
//! facade writes it once per frame; shaders reach it through the WGSL
//! preamble prepended to every user source.

use bytemuck::{Pod, Zeroable};

/// Per-frame uniform record, 24 bytes.
///
/// Field offsets match the WGSL `Builtins` struct in [`BUILTIN_PREAMBLE`]:
/// `resolution` is a `vec2<u32>` with 8-byte alignment, which puts it at
/// offset 16 and leaves 4 bytes of padding after `frame`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct BuiltinUniforms {
    /// Elapsed time in seconds.
    pub time: f32,
    /// Time since the previous frame in seconds.
    pub delta: f32,
    /// Monotonic frame counter.
    pub frame: u32,
    pub _pad: u32,
    /// Output width in pixels.
    pub width: u32,
    /// Output height in pixels.
    pub height: u32,
}

impl BuiltinUniforms {
    #[must_use]
    pub fn new(time: f32, delta: f32, frame: u32, resolution: (u32, u32)) -> Self {
        Self {
            time,
            delta,
            frame,
            _pad: 0,
            width: resolution.0,
            height: resolution.1,
        }
    }
}

/// Size of the builtin uniform buffer in bytes.
pub const BUILTIN_UNIFORM_SIZE: u64 = size_of::<BuiltinUniforms>() as u64;

/// WGSL source prepended to every user shader before compilation.
///
/// Ends with a blank line so user source starts on a fresh line; diagnostics
/// subtract [`PREAMBLE_LINES`] / the preamble byte length to report
/// user-visible locations.
pub const BUILTIN_PREAMBLE: &str = "\
struct Builtins {
    time: f32,
    delta: f32,
    frame: u32,
    resolution: vec2<u32>,
}

@group(0) @binding(0) var<uniform> builtins: Builtins;

";

/// Number of source lines [`BUILTIN_PREAMBLE`] occupies.
pub const PREAMBLE_LINES: u32 = 9;
