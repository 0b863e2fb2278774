//! GPU Context
//!
//! The [`GpuContext`] holds the live GPU handles the compiler works
//! against: device and queue. Device acquisition and loss handling belong
//! to the embedding application; this crate only consumes an already-live
//! handle, passed explicitly into every constructor and compile call.

/// Injected GPU handle pair.
///
/// `wgpu::Device` and `wgpu::Queue` are internally reference counted, so
/// the context is cheap to clone: compile jobs take their own copy and stay
/// valid while the caller keeps editing the graph.
#[derive(Clone)]
pub struct GpuContext {
    /// The wgpu device for resource and pipeline creation
    pub device: wgpu::Device,
    /// The command queue for uploads and frame submission
    pub queue: wgpu::Queue,
}

impl GpuContext {
    /// Wraps an already-acquired device/queue pair.
    #[must_use]
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        Self { device, queue }
    }
}
