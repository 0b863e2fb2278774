//! Graph Analysis
//!
//! [`ProgramMap::analyze`] turns one [`Blueprint`] snapshot into everything
//! the caches and the linker need: classified node maps, per-pass bind-group
//! structure, aggregated resource usage flags and a topological pass
//! execution order.
//!
//! Analysis is a pure function of the blueprint value. Invalid edges never
//! abort it; they are dropped with a warning and the rest of the graph
//! compiles. The one hard failure is a cycle in the queue-edge subgraph,
//! which would leave passes permanently unschedulable.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::blueprint::{
    BindingEdge, BindingKind, Blueprint, BufferNode, ComputeNode, Connection, MAX_BIND_GROUPS,
    Node, NodeId, QueueEdge, RenderNode, SamplerNode, Shader, ShaderId, StorageAccess, TextureNode,
};
use crate::errors::{PatchbayError, Result};

// ─── Pass nodes ───────────────────────────────────────────────────────────────

/// A schedulable unit of work, extracted from the blueprint.
#[derive(Debug, Clone)]
pub enum Pass {
    Render(RenderNode),
    Compute(ComputeNode),
}

impl Pass {
    /// Shader stages a binding targeting this pass is visible to.
    #[must_use]
    pub fn visibility(&self) -> wgpu::ShaderStages {
        match self {
            Self::Render(_) => wgpu::ShaderStages::VERTEX_FRAGMENT,
            Self::Compute(_) => wgpu::ShaderStages::COMPUTE,
        }
    }

    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Render(_) => "render",
            Self::Compute(_) => "compute",
        }
    }
}

// ─── Planned bindings ─────────────────────────────────────────────────────────

/// One resolved binding slot: the layout entry handed to
/// `create_bind_group_layout` plus the resource node to bind there.
#[derive(Debug, Clone)]
pub struct PlannedBinding {
    pub layout: wgpu::BindGroupLayoutEntry,
    pub kind: BindingKind,
    pub source: NodeId,
}

/// Binding slots of one group, ordered by binding index.
pub type BindGroupSlots = BTreeMap<u32, PlannedBinding>;

/// Dense bind-group array of one pass, `0..=max used group`.
pub type PassGroups = SmallVec<[BindGroupSlots; MAX_BIND_GROUPS as usize]>;

// ─── Program map ──────────────────────────────────────────────────────────────

/// Derived view of one blueprint, consumed by the caches and the linker
/// and discarded with its generation.
#[derive(Debug, Default)]
pub struct ProgramMap {
    pub shaders: FxHashMap<ShaderId, Shader>,
    pub buffers: FxHashMap<NodeId, BufferNode>,
    pub textures: FxHashMap<NodeId, TextureNode>,
    pub samplers: FxHashMap<NodeId, SamplerNode>,
    pub passes: FxHashMap<NodeId, Pass>,
    /// Pass ID to its dense bind-group array.
    pub bindings: FxHashMap<NodeId, PassGroups>,
    /// Usage flags aggregated over every binding referencing the buffer.
    /// Buffers never referenced have no entry and compile to nothing.
    pub buffer_usage: FxHashMap<NodeId, wgpu::BufferUsages>,
    pub texture_usage: FxHashMap<NodeId, wgpu::TextureUsages>,
    /// Topologically sorted pass IDs, layer by layer.
    pub pass_order: Vec<NodeId>,
}

impl ProgramMap {
    /// Analyzes one blueprint snapshot.
    ///
    /// The map owns clones of everything it keeps (IDs, sources and image
    /// payloads are reference counted), so later blueprint edits cannot
    /// reach into a compile already in flight.
    ///
    /// # Errors
    ///
    /// [`PatchbayError::QueueCycle`] when queue edges form a cycle among
    /// passes; every other fault is recovered locally.
    pub fn analyze(blueprint: &Blueprint) -> Result<Self> {
        let mut map = Self::default();
        let mut binding_edges: Vec<(&NodeId, &BindingEdge)> = Vec::new();
        let mut queue_edges: Vec<(&NodeId, &QueueEdge)> = Vec::new();

        // Classification pass. Blueprint maps are ordered, so everything
        // downstream sees edges in node-ID order.
        for (id, node) in &blueprint.nodes {
            match node {
                Node::Buffer(buffer) => {
                    map.buffers.insert(id.clone(), buffer.clone());
                }
                Node::Texture(texture) => {
                    map.textures.insert(id.clone(), texture.clone());
                }
                Node::Sampler(sampler) => {
                    map.samplers.insert(id.clone(), *sampler);
                }
                Node::Compute(compute) => {
                    map.passes.insert(id.clone(), Pass::Compute(compute.clone()));
                }
                Node::Render(render) => {
                    map.passes.insert(id.clone(), Pass::Render(render.clone()));
                }
                Node::Connection(Connection::Binding(edge)) => {
                    binding_edges.push((id, edge));
                }
                Node::Connection(Connection::Queue(edge)) => {
                    queue_edges.push((id, edge));
                }
            }
        }

        map.shaders = blueprint
            .shaders
            .iter()
            .map(|(id, shader)| (id.clone(), shader.clone()))
            .collect();

        for (conn_id, edge) in binding_edges {
            map.resolve_binding(conn_id, edge);
        }

        map.schedule(&queue_edges)?;
        Ok(map)
    }

    /// Bind-group slots of a pass; empty when it has no bindings.
    #[must_use]
    pub fn bindings_for(&self, pass: &NodeId) -> &[BindGroupSlots] {
        self.bindings.get(pass).map_or(&[], SmallVec::as_slice)
    }

    // ─── Binding resolution ───────────────────────────────────────────────

    /// Validates one binding edge and, if it survives, records its layout
    /// entry and usage contribution. Every rejection is a warning, never an
    /// error.
    fn resolve_binding(&mut self, conn_id: &NodeId, edge: &BindingEdge) {
        let Some(pass) = self.passes.get(&edge.target) else {
            log::warn!(
                "binding {conn_id}: target pass {} not found, dropping edge",
                edge.target
            );
            return;
        };

        if edge.group >= MAX_BIND_GROUPS {
            log::warn!(
                "binding {conn_id}: group {} exceeds the bind group limit ({MAX_BIND_GROUPS}), dropping edge",
                edge.group
            );
            return;
        }

        // (0, 0) carries the builtin uniforms in every pass.
        if edge.group == 0 && edge.index == 0 {
            log::warn!(
                "binding {conn_id}: group 0 binding 0 is reserved for builtin uniforms, dropping edge"
            );
            return;
        }

        let visibility = pass.visibility();

        let ty = match edge.kind {
            BindingKind::Buffer(access) => {
                if !self.buffers.contains_key(&edge.source) {
                    self.warn_source_mismatch(conn_id, edge);
                    return;
                }
                let (ty, usage) = match access {
                    StorageAccess::Uniform => (
                        wgpu::BufferBindingType::Uniform,
                        wgpu::BufferUsages::UNIFORM,
                    ),
                    StorageAccess::ReadOnly => (
                        wgpu::BufferBindingType::Storage { read_only: true },
                        wgpu::BufferUsages::STORAGE,
                    ),
                    StorageAccess::ReadWrite => (
                        wgpu::BufferBindingType::Storage { read_only: false },
                        wgpu::BufferUsages::STORAGE,
                    ),
                };
                *self
                    .buffer_usage
                    .entry(edge.source.clone())
                    .or_insert(wgpu::BufferUsages::empty()) |= usage;
                wgpu::BindingType::Buffer {
                    ty,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                }
            }
            BindingKind::Texture => {
                if !self.textures.contains_key(&edge.source) {
                    self.warn_source_mismatch(conn_id, edge);
                    return;
                }
                *self
                    .texture_usage
                    .entry(edge.source.clone())
                    .or_insert(wgpu::TextureUsages::empty()) |=
                    wgpu::TextureUsages::TEXTURE_BINDING;
                wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                }
            }
            BindingKind::Sampler => {
                if !self.samplers.contains_key(&edge.source) {
                    self.warn_source_mismatch(conn_id, edge);
                    return;
                }
                wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering)
            }
        };

        let groups = self.bindings.entry(edge.target.clone()).or_default();
        let group = edge.group as usize;
        if groups.len() <= group {
            groups.resize_with(group + 1, BTreeMap::new);
        }

        match groups[group].entry(edge.index) {
            Entry::Occupied(_) => {
                log::warn!(
                    "binding {conn_id}: slot (group {}, binding {}) on pass {} already taken, first declaration wins",
                    edge.group,
                    edge.index,
                    edge.target
                );
            }
            Entry::Vacant(slot) => {
                slot.insert(PlannedBinding {
                    layout: wgpu::BindGroupLayoutEntry {
                        binding: edge.index,
                        visibility,
                        ty,
                        count: None,
                    },
                    kind: edge.kind,
                    source: edge.source.clone(),
                });
            }
        }
    }

    fn warn_source_mismatch(&self, conn_id: &NodeId, edge: &BindingEdge) {
        let actual = self.resource_label(&edge.source);
        log::warn!(
            "binding {conn_id}: source {} is {actual}, expected a {} node, dropping edge",
            edge.source,
            edge.kind.label()
        );
    }

    fn resource_label(&self, id: &NodeId) -> &'static str {
        if self.buffers.contains_key(id) {
            "a buffer"
        } else if self.textures.contains_key(id) {
            "a texture"
        } else if self.samplers.contains_key(id) {
            "a sampler"
        } else if self.passes.contains_key(id) {
            "a pass"
        } else {
            "missing"
        }
    }

    // ─── Scheduling ───────────────────────────────────────────────────────

    /// Orders passes by layered peeling of the queue-edge graph.
    ///
    /// Each layer holds the passes whose dependencies are all scheduled;
    /// layers are sorted by ID so the order is deterministic. Passes that
    /// never reach zero pending dependencies sit on a cycle, which fails
    /// the whole analysis.
    fn schedule(&mut self, queue_edges: &[(&NodeId, &QueueEdge)]) -> Result<()> {
        let mut pending: FxHashMap<&NodeId, usize> =
            self.passes.keys().map(|id| (id, 0)).collect();
        let mut dependents: FxHashMap<&NodeId, Vec<&NodeId>> = FxHashMap::default();

        for (conn_id, edge) in queue_edges {
            if !self.passes.contains_key(&edge.source) || !self.passes.contains_key(&edge.target) {
                log::warn!(
                    "queue edge {conn_id}: {} -> {} references a missing pass, dropping edge",
                    edge.source,
                    edge.target
                );
                continue;
            }
            dependents.entry(&edge.source).or_default().push(&edge.target);
            if let Some(count) = pending.get_mut(&edge.target) {
                *count += 1;
            }
        }

        let mut layer: Vec<&NodeId> = pending
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(id, _)| *id)
            .collect();
        layer.sort();

        let mut order: Vec<NodeId> = Vec::with_capacity(self.passes.len());
        while !layer.is_empty() {
            let mut next: Vec<&NodeId> = Vec::new();
            for id in &layer {
                for dependent in dependents.get(*id).into_iter().flatten() {
                    if let Some(count) = pending.get_mut(*dependent) {
                        *count -= 1;
                        if *count == 0 {
                            next.push(*dependent);
                        }
                    }
                }
            }
            order.extend(layer.iter().map(|id| (*id).clone()));
            next.sort();
            layer = next;
        }

        if order.len() < self.passes.len() {
            let mut stalled: Vec<NodeId> = pending
                .iter()
                .filter(|(_, count)| **count > 0)
                .map(|(id, _)| (*id).clone())
                .collect();
            stalled.sort();
            log::error!(
                "queue edges form a cycle, {} pass(es) can never run: {stalled:?}",
                stalled.len()
            );
            return Err(PatchbayError::QueueCycle { stalled });
        }

        self.pass_order = order;
        Ok(())
    }
}
