//! Pass Linking
//!
//! The linker turns one installed generation into an [`Executable`]: per
//! pass it assembles bind groups from the planned binding slots, builds the
//! pipeline, and for render passes prerecords the draw into a
//! `wgpu::RenderBundle` that `run` replays every frame.
//!
//! Linking is best effort. A pass whose shader is missing, whose entry
//! point does not exist, or whose pipeline the device rejects is logged and
//! left out; the executable holds whatever subset survived, still in pass
//! order. Missing resources cost a single binding entry, never the pass.

use crate::analyze::{Pass, PlannedBinding, ProgramMap};
use crate::blueprint::{BindingKind, ComputeNode, NodeId, RenderNode, ShaderId};
use crate::context::GpuContext;
use crate::executable::{Executable, LinkedCompute, LinkedPass, LinkedRender};
use crate::program::Generation;

/// Depth-stencil format shared by every render pass and the executable's
/// attachment. Fixed policy; per-node state is limited to the compare
/// function.
pub const DEPTH_STENCIL_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24PlusStencil8;

/// Links one generation against an output format.
///
/// Borrows the generation's compiled resources for the duration of the
/// link; the produced [`Executable`] owns only device objects (pipelines,
/// bind groups, bundles), so the generation can be recompiled underneath
/// it.
pub struct Linker<'a> {
    gpu: &'a GpuContext,
    builtin_buffer: &'a wgpu::Buffer,
    output_format: wgpu::TextureFormat,
    generation: &'a Generation,
}

impl<'a> Linker<'a> {
    #[must_use]
    pub fn new(
        gpu: &'a GpuContext,
        builtin_buffer: &'a wgpu::Buffer,
        output_format: wgpu::TextureFormat,
        generation: &'a Generation,
    ) -> Self {
        Self {
            gpu,
            builtin_buffer,
            output_format,
            generation,
        }
    }

    /// Links every pass in pass order, filtering out the ones that fail.
    ///
    /// Each pass links inside its own validation error scope, so a device
    /// rejection anywhere in its bind groups, pipeline or bundle drops that
    /// pass alone.
    pub async fn link(self) -> Executable {
        let Some(map) = self.generation.map() else {
            return Executable::new(self.gpu.clone(), Vec::new());
        };

        let mut passes = Vec::new();
        for id in &map.pass_order {
            let Some(pass) = map.passes.get(id) else {
                continue;
            };

            let scope = self.gpu.device.push_error_scope(wgpu::ErrorFilter::Validation);
            let bindings = self.assemble_groups(map, id, pass);
            let linked = match pass {
                Pass::Render(node) => self.link_render(id, node, &bindings),
                Pass::Compute(node) => self.link_compute(id, node, bindings),
            };
            let error = scope.pop().await;

            match (linked, error) {
                (Some(linked), None) => passes.push(linked),
                (Some(_), Some(error)) => {
                    log::error!("pass {id}: rejected by the device, dropping pass: {error}");
                }
                (None, _) => {}
            }
        }

        log::debug!("linked {}/{} passes", passes.len(), map.pass_order.len());
        Executable::new(self.gpu.clone(), passes)
    }

    // ─── Bind groups ──────────────────────────────────────────────────────

    /// Builds the dense bind-group array of one pass.
    ///
    /// Group 0 always exists and starts with the implicit builtin-uniform
    /// entry at binding 0. Planned entries whose resource did not compile
    /// are skipped, which keeps the layout and the bound resources in
    /// lockstep.
    fn assemble_groups(&self, map: &ProgramMap, pass_id: &NodeId, pass: &Pass) -> PassBindings {
        let planned = map.bindings_for(pass_id);
        let group_count = planned.len().max(1);
        let mut layouts = Vec::with_capacity(group_count);
        let mut groups = Vec::with_capacity(group_count);

        for group_index in 0..group_count {
            let mut layout_entries = Vec::new();
            let mut resources = Vec::new();

            if group_index == 0 {
                layout_entries.push(wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: pass.visibility(),
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                });
                resources.push(wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.builtin_buffer.as_entire_binding(),
                });
            }

            for slot in planned.get(group_index).into_iter().flatten() {
                let (index, planned_binding) = slot;
                let Some(resource) = self.resolve(pass_id, planned_binding) else {
                    continue;
                };
                layout_entries.push(planned_binding.layout);
                resources.push(wgpu::BindGroupEntry {
                    binding: *index,
                    resource,
                });
            }

            let label = format!("{pass_id} group {group_index}");
            let layout = self
                .gpu
                .device
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some(&label),
                    entries: &layout_entries,
                });
            groups.push(
                self.gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some(&label),
                    layout: &layout,
                    entries: &resources,
                }),
            );
            layouts.push(layout);
        }

        PassBindings { layouts, groups }
    }

    /// Resolves one planned binding to the compiled resource behind it.
    /// A missing or empty-compiled resource drops the entry with a warning.
    fn resolve(
        &self,
        pass_id: &NodeId,
        planned: &PlannedBinding,
    ) -> Option<wgpu::BindingResource<'a>> {
        let source = &planned.source;
        match planned.kind {
            BindingKind::Buffer(_) => {
                let buffer = self
                    .generation
                    .buffers()
                    .get(source)
                    .and_then(|compiled| compiled.buffer.as_ref());
                let Some(buffer) = buffer else {
                    log::warn!("pass {pass_id}: buffer {source} is not compiled, dropping binding");
                    return None;
                };
                Some(buffer.as_entire_binding())
            }
            BindingKind::Texture => {
                let view = self
                    .generation
                    .textures()
                    .get(source)
                    .and_then(|compiled| compiled.view.as_ref());
                let Some(view) = view else {
                    log::warn!("pass {pass_id}: texture {source} is not compiled, dropping binding");
                    return None;
                };
                Some(wgpu::BindingResource::TextureView(view))
            }
            BindingKind::Sampler => {
                let Some(compiled) = self.generation.samplers().get(source) else {
                    log::warn!("pass {pass_id}: sampler {source} is not compiled, dropping binding");
                    return None;
                };
                Some(wgpu::BindingResource::Sampler(&compiled.sampler))
            }
        }
    }

    // ─── Pipelines ────────────────────────────────────────────────────────

    /// Fetches a usable module and checks the entry point, logging why a
    /// pass cannot link.
    fn usable_module(
        &self,
        pass_id: &NodeId,
        shader: &ShaderId,
        entry_point: &str,
    ) -> Option<&'a wgpu::ShaderModule> {
        let Some(compiled) = self.generation.shaders().get(shader) else {
            log::error!("pass {pass_id}: shader {shader} not found, dropping pass");
            return None;
        };
        let Some(module) = compiled.module.as_ref() else {
            log::error!("pass {pass_id}: shader {shader} did not compile, dropping pass");
            return None;
        };
        if !compiled.has_entry_point(entry_point) {
            log::error!(
                "pass {pass_id}: shader {shader} has no entry point `{entry_point}`, dropping pass"
            );
            return None;
        }
        Some(module)
    }

    fn pipeline_layout(&self, label: &str, bindings: &PassBindings) -> wgpu::PipelineLayout {
        let layouts: Vec<Option<&wgpu::BindGroupLayout>> =
            bindings.layouts.iter().map(Some).collect();
        self.gpu
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(label),
                bind_group_layouts: &layouts,
                immediate_size: 0,
            })
    }

    fn link_render(
        &self,
        id: &NodeId,
        node: &RenderNode,
        bindings: &PassBindings,
    ) -> Option<LinkedPass> {
        let vertex = self.usable_module(id, &node.vertex_shader, &node.vertex_entry)?;
        let fragment = self.usable_module(id, &node.fragment_shader, &node.fragment_entry)?;

        let strip_index_format = match node.topology {
            wgpu::PrimitiveTopology::LineStrip | wgpu::PrimitiveTopology::TriangleStrip => {
                Some(wgpu::IndexFormat::Uint32)
            }
            _ => None,
        };

        let label = format!("{id} render pipeline");
        let layout = self.pipeline_layout(&label, bindings);
        let pipeline = self
            .gpu
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(&label),
                layout: Some(&layout),
                vertex: wgpu::VertexState {
                    module: vertex,
                    entry_point: Some(&node.vertex_entry),
                    buffers: &[],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: fragment,
                    entry_point: Some(&node.fragment_entry),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: self.output_format,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: node.topology,
                    strip_index_format,
                    ..Default::default()
                },
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: DEPTH_STENCIL_FORMAT,
                    depth_write_enabled: Some(true),
                    depth_compare: Some(node.depth_compare),
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
                multisample: wgpu::MultisampleState::default(),
                multiview_mask: None,
                cache: None,
            });

        // The bundle records everything the pass replays per frame; it
        // keeps the pipeline and bind groups alive on its own.
        let mut encoder =
            self.gpu
                .device
                .create_render_bundle_encoder(&wgpu::RenderBundleEncoderDescriptor {
                    label: Some(id.as_str()),
                    color_formats: &[Some(self.output_format)],
                    depth_stencil: Some(wgpu::RenderBundleDepthStencil {
                        format: DEPTH_STENCIL_FORMAT,
                        depth_read_only: false,
                        stencil_read_only: false,
                    }),
                    sample_count: 1,
                    multiview: None,
                });
        encoder.set_pipeline(&pipeline);
        for (index, group) in bindings.groups.iter().enumerate() {
            encoder.set_bind_group(index as u32, group, &[]);
        }
        encoder.draw(0..node.vertex_count, 0..node.instance_count);
        let bundle = encoder.finish(&wgpu::RenderBundleDescriptor {
            label: Some(id.as_str()),
        });

        Some(LinkedPass::Render(LinkedRender {
            id: id.clone(),
            bundle,
            clear: node.clear,
            clear_color: node.clear_color,
        }))
    }

    fn link_compute(
        &self,
        id: &NodeId,
        node: &ComputeNode,
        bindings: PassBindings,
    ) -> Option<LinkedPass> {
        let module = self.usable_module(id, &node.shader, &node.entry_point)?;

        let label = format!("{id} compute pipeline");
        let layout = self.pipeline_layout(&label, &bindings);
        let pipeline = self
            .gpu
            .device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(&label),
                layout: Some(&layout),
                module,
                entry_point: Some(&node.entry_point),
                compilation_options: Default::default(),
                cache: None,
            });

        Some(LinkedPass::Compute(LinkedCompute {
            id: id.clone(),
            pipeline,
            bind_groups: bindings.groups,
            dispatch: node.dispatch,
        }))
    }
}

/// Bind-group layouts and groups of one pass, index-aligned.
struct PassBindings {
    layouts: Vec<wgpu::BindGroupLayout>,
    groups: Vec<wgpu::BindGroup>,
}
