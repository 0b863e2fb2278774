//! Sampler Compilation
//!
//! Sampler nodes are stateless, so an entry compiled once is carried
//! unchanged for as long as the node exists. Creation cannot fail: the
//! descriptor is fixed linear filtering with default addressing.

use crate::analyze::ProgramMap;
use crate::blueprint::NodeId;
use crate::cache::{Dispose, ResourceCompiler};
use crate::context::GpuContext;

/// One compiled sampler generation entry.
pub struct CompiledSampler {
    pub sampler: wgpu::Sampler,
}

impl Dispose for CompiledSampler {
    fn dispose(&self) {
        // Samplers hold no destroyable allocation; dropping the handle is
        // all the release there is.
    }
}

/// [`ResourceCompiler`] strategy for samplers.
pub struct SamplerCompiler;

impl ResourceCompiler for SamplerCompiler {
    type Key = NodeId;
    type Descriptor = ();
    type Output = CompiledSampler;

    const KIND: &'static str = "samplers";

    fn enumerate(map: &ProgramMap) -> Vec<(Self::Key, Self::Descriptor)> {
        map.samplers.keys().map(|id| (id.clone(), ())).collect()
    }

    fn needs_recompile((): &Self::Descriptor, _existing: &Self::Output) -> bool {
        false
    }

    async fn compile(
        gpu: &GpuContext,
        key: &Self::Key,
        (): Self::Descriptor,
        _map: &ProgramMap,
    ) -> Self::Output {
        let sampler = gpu.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(key.as_str()),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        CompiledSampler { sampler }
    }
}
