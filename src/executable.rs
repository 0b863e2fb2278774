//! Frame Execution
//!
//! An [`Executable`] is the replayable form of one linked generation: a
//! list of linked passes plus the depth-stencil attachment they share.
//! `run` encodes every pass into a single command encoder and submits once,
//! so intra-frame ordering is exactly encode order and nothing straddles a
//! submission boundary.

use crate::blueprint::NodeId;
use crate::context::GpuContext;
use crate::linker::DEPTH_STENCIL_FORMAT;

// ─── Linked passes ────────────────────────────────────────────────────────────

/// A linked render pass: the prerecorded bundle plus its clear policy.
/// The bundle keeps its pipeline and bind groups alive on its own.
pub struct LinkedRender {
    pub(crate) id: NodeId,
    pub(crate) bundle: wgpu::RenderBundle,
    pub(crate) clear: bool,
    pub(crate) clear_color: wgpu::Color,
}

/// A linked compute pass, dispatched directly every frame.
pub struct LinkedCompute {
    pub(crate) id: NodeId,
    pub(crate) pipeline: wgpu::ComputePipeline,
    pub(crate) bind_groups: Vec<wgpu::BindGroup>,
    pub(crate) dispatch: [u32; 3],
}

/// One pass that survived linking.
pub enum LinkedPass {
    Render(LinkedRender),
    Compute(LinkedCompute),
}

impl LinkedPass {
    /// Blueprint node this pass was linked from.
    #[must_use]
    pub fn id(&self) -> &NodeId {
        match self {
            Self::Render(pass) => &pass.id,
            Self::Compute(pass) => &pass.id,
        }
    }
}

// ─── Depth attachment ─────────────────────────────────────────────────────────

struct DepthAttachment {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    size: (u32, u32),
}

// ─── Executable ───────────────────────────────────────────────────────────────

/// Replayable frame program produced by the linker.
pub struct Executable {
    gpu: GpuContext,
    passes: Vec<LinkedPass>,
    /// Allocated on the first rendered frame, recreated on resize.
    depth: Option<DepthAttachment>,
}

impl Executable {
    pub(crate) fn new(gpu: GpuContext, passes: Vec<LinkedPass>) -> Self {
        Self {
            gpu,
            passes,
            depth: None,
        }
    }

    /// Passes that linked, in pass order.
    #[must_use]
    pub fn passes(&self) -> &[LinkedPass] {
        &self.passes
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    /// Encodes every linked pass against `target` and submits the frame.
    pub fn run(&mut self, target: &wgpu::TextureView, resolution: (u32, u32)) {
        // Minimized surface; nothing can be attached this frame.
        if resolution.0 == 0 || resolution.1 == 0 {
            return;
        }

        if self
            .passes
            .iter()
            .any(|pass| matches!(pass, LinkedPass::Render(_)))
        {
            self.ensure_depth(resolution);
        }

        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            });

        for pass in &self.passes {
            match pass {
                LinkedPass::Compute(pass) => {
                    let mut cpass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                        label: Some(pass.id.as_str()),
                        timestamp_writes: None,
                    });
                    cpass.set_pipeline(&pass.pipeline);
                    for (index, group) in pass.bind_groups.iter().enumerate() {
                        cpass.set_bind_group(index as u32, group, &[]);
                    }
                    let [x, y, z] = pass.dispatch;
                    cpass.dispatch_workgroups(x, y, z);
                }
                LinkedPass::Render(pass) => {
                    let Some(depth) = self.depth.as_ref() else {
                        continue;
                    };
                    let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                        label: Some(pass.id.as_str()),
                        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                            view: target,
                            resolve_target: None,
                            ops: wgpu::Operations {
                                load: if pass.clear {
                                    wgpu::LoadOp::Clear(pass.clear_color)
                                } else {
                                    wgpu::LoadOp::Load
                                },
                                store: wgpu::StoreOp::Store,
                            },
                            depth_slice: None,
                        })],
                        depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                            view: &depth.view,
                            depth_ops: Some(wgpu::Operations {
                                load: if pass.clear {
                                    wgpu::LoadOp::Clear(1.0)
                                } else {
                                    wgpu::LoadOp::Load
                                },
                                store: wgpu::StoreOp::Store,
                            }),
                            stencil_ops: Some(wgpu::Operations {
                                load: if pass.clear {
                                    wgpu::LoadOp::Clear(1)
                                } else {
                                    wgpu::LoadOp::Load
                                },
                                store: wgpu::StoreOp::Store,
                            }),
                        }),
                        timestamp_writes: None,
                        occlusion_query_set: None,
                        multiview_mask: None,
                    });
                    rpass.execute_bundles(std::iter::once(&pass.bundle));
                }
            }
        }

        self.gpu.queue.submit(std::iter::once(encoder.finish()));
    }

    /// Keeps the shared depth-stencil attachment sized to the frame.
    /// Reallocates (destroying the old texture) only when the size changed.
    fn ensure_depth(&mut self, resolution: (u32, u32)) {
        if let Some(depth) = &self.depth
            && depth.size == resolution
        {
            return;
        }
        if let Some(old) = self.depth.take() {
            old.texture.destroy();
        }

        let texture = self.gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Depth-Stencil Attachment"),
            size: wgpu::Extent3d {
                width: resolution.0,
                height: resolution.1,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_STENCIL_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        self.depth = Some(DepthAttachment {
            texture,
            view,
            size: resolution,
        });
    }
}
