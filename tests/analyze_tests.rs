//! Graph Analysis Integration Tests
//!
//! Tests for:
//! - Node classification into resource/pass/connection maps
//! - Binding resolution: slots, visibility, rejected edges, usage flags
//! - Scheduling: topological pass order, layer determinism, cycle errors
//!
//! Analysis is a pure function of the blueprint, so none of this needs a
//! GPU device.

use patchbay::analyze::ProgramMap;
use patchbay::blueprint::{
    BindingEdge, BindingKind, Blueprint, BufferInit, BufferNode, ComputeNode, Connection, Node,
    NodeId, QueueEdge, RenderNode, SamplerNode, Shader, StorageAccess, TextureNode,
};
use patchbay::errors::PatchbayError;

fn buffer(size: u64) -> Node {
    Node::Buffer(BufferNode {
        size,
        init: BufferInit::Zero,
    })
}

fn compute(shader: &str) -> Node {
    Node::Compute(ComputeNode::new(shader, [1, 1, 1]))
}

fn render(vs: &str, fs: &str) -> Node {
    Node::Render(RenderNode::new(vs, fs))
}

fn binding(kind: BindingKind, group: u32, index: u32, source: &str, target: &str) -> Node {
    Node::Connection(Connection::Binding(BindingEdge {
        kind,
        group,
        index,
        source: source.into(),
        target: target.into(),
    }))
}

fn queue(source: &str, target: &str) -> Node {
    Node::Connection(Connection::Queue(QueueEdge {
        source: source.into(),
        target: target.into(),
    }))
}

fn ids(order: &[NodeId]) -> Vec<&str> {
    order.iter().map(NodeId::as_str).collect()
}

// ============================================================================
// Classification
// ============================================================================

#[test]
fn classify_sorts_nodes_into_maps() {
    let mut blueprint = Blueprint::new();
    blueprint
        .insert_node("buf", buffer(64))
        .insert_node("tex", Node::Texture(TextureNode::default()))
        .insert_node("smp", Node::Sampler(SamplerNode))
        .insert_node("draw", render("shader", "shader"))
        .insert_node("sim", compute("shader"))
        .insert_shader("shader", Shader::new("shader", "fn noop() {}"));

    let map = ProgramMap::analyze(&blueprint).unwrap();

    assert_eq!(map.buffers.len(), 1);
    assert_eq!(map.textures.len(), 1);
    assert_eq!(map.samplers.len(), 1);
    assert_eq!(map.passes.len(), 2);
    assert_eq!(map.shaders.len(), 1);
    assert!(map.buffers.contains_key(&"buf".into()));
    assert!(map.passes.contains_key(&"draw".into()));
    assert!(map.passes.contains_key(&"sim".into()));
}

#[test]
fn classify_empty_blueprint_is_valid() {
    let map = ProgramMap::analyze(&Blueprint::new()).unwrap();
    assert!(map.pass_order.is_empty());
    assert!(map.passes.is_empty());
}

// ============================================================================
// Binding Resolution
// ============================================================================

#[test]
fn binding_lands_in_declared_slot() {
    let mut blueprint = Blueprint::new();
    blueprint
        .insert_node("buf", buffer(16))
        .insert_node("sim", compute("cs"))
        .insert_node(
            "edge",
            binding(
                BindingKind::Buffer(StorageAccess::ReadWrite),
                1,
                2,
                "buf",
                "sim",
            ),
        );

    let map = ProgramMap::analyze(&blueprint).unwrap();
    let groups = map.bindings_for(&"sim".into());

    assert_eq!(groups.len(), 2);
    assert!(groups[0].is_empty());
    let planned = &groups[1][&2];
    assert_eq!(planned.source.as_str(), "buf");
    assert_eq!(planned.layout.binding, 2);
    assert_eq!(planned.layout.visibility, wgpu::ShaderStages::COMPUTE);
}

#[test]
fn binding_visibility_follows_pass_kind() {
    let mut blueprint = Blueprint::new();
    blueprint
        .insert_node("buf", buffer(16))
        .insert_node("draw", render("vs", "fs"))
        .insert_node(
            "edge",
            binding(
                BindingKind::Buffer(StorageAccess::Uniform),
                0,
                1,
                "buf",
                "draw",
            ),
        );

    let map = ProgramMap::analyze(&blueprint).unwrap();
    let planned = &map.bindings_for(&"draw".into())[0][&1];
    assert_eq!(planned.layout.visibility, wgpu::ShaderStages::VERTEX_FRAGMENT);
}

#[test]
fn binding_type_mismatch_is_dropped() {
    // A sampler bound through a buffer binding must not reach any group.
    let mut blueprint = Blueprint::new();
    blueprint
        .insert_node("smp", Node::Sampler(SamplerNode))
        .insert_node("sim", compute("cs"))
        .insert_node(
            "edge",
            binding(
                BindingKind::Buffer(StorageAccess::ReadOnly),
                0,
                1,
                "smp",
                "sim",
            ),
        );

    let map = ProgramMap::analyze(&blueprint).unwrap();
    assert!(map.bindings_for(&"sim".into()).iter().all(|g| g.is_empty()));
    assert!(map.buffer_usage.is_empty());
}

#[test]
fn binding_to_missing_source_is_dropped() {
    let mut blueprint = Blueprint::new();
    blueprint.insert_node("sim", compute("cs")).insert_node(
        "edge",
        binding(BindingKind::Texture, 0, 1, "ghost", "sim"),
    );

    let map = ProgramMap::analyze(&blueprint).unwrap();
    assert!(map.bindings_for(&"sim".into()).iter().all(|g| g.is_empty()));
}

#[test]
fn binding_to_missing_pass_is_dropped() {
    let mut blueprint = Blueprint::new();
    blueprint.insert_node("buf", buffer(16)).insert_node(
        "edge",
        binding(
            BindingKind::Buffer(StorageAccess::Uniform),
            0,
            1,
            "buf",
            "ghost",
        ),
    );

    let map = ProgramMap::analyze(&blueprint).unwrap();
    assert!(map.bindings.is_empty());
    // The edge never resolved, so it must not contribute usage either.
    assert!(map.buffer_usage.is_empty());
}

#[test]
fn binding_beyond_group_limit_is_dropped_but_pass_survives() {
    let mut blueprint = Blueprint::new();
    blueprint
        .insert_node("a", buffer(16))
        .insert_node("b", buffer(16))
        .insert_node("sim", compute("cs"))
        .insert_node(
            "edge-hi",
            binding(
                BindingKind::Buffer(StorageAccess::ReadWrite),
                4,
                0,
                "a",
                "sim",
            ),
        )
        .insert_node(
            "edge-ok",
            binding(
                BindingKind::Buffer(StorageAccess::ReadWrite),
                1,
                1,
                "b",
                "sim",
            ),
        );

    let map = ProgramMap::analyze(&blueprint).unwrap();
    let groups = map.bindings_for(&"sim".into());

    assert_eq!(groups.len(), 2);
    assert!(groups[1].contains_key(&1));
    assert!(!map.buffer_usage.contains_key(&"a".into()));
    assert_eq!(map.pass_order.len(), 1);
}

#[test]
fn binding_to_reserved_builtin_slot_is_dropped() {
    let mut blueprint = Blueprint::new();
    blueprint
        .insert_node("buf", buffer(16))
        .insert_node("sim", compute("cs"))
        .insert_node(
            "edge",
            binding(
                BindingKind::Buffer(StorageAccess::Uniform),
                0,
                0,
                "buf",
                "sim",
            ),
        );

    let map = ProgramMap::analyze(&blueprint).unwrap();
    assert!(map.bindings_for(&"sim".into()).iter().all(|g| g.is_empty()));
}

#[test]
fn binding_duplicate_slot_first_declared_wins() {
    // Connection nodes resolve in ID order, so "edge-1" is declared first.
    let mut blueprint = Blueprint::new();
    blueprint
        .insert_node("a", buffer(16))
        .insert_node("b", buffer(16))
        .insert_node("sim", compute("cs"))
        .insert_node(
            "edge-2",
            binding(
                BindingKind::Buffer(StorageAccess::ReadWrite),
                0,
                1,
                "b",
                "sim",
            ),
        )
        .insert_node(
            "edge-1",
            binding(
                BindingKind::Buffer(StorageAccess::ReadWrite),
                0,
                1,
                "a",
                "sim",
            ),
        );

    let map = ProgramMap::analyze(&blueprint).unwrap();
    let planned = &map.bindings_for(&"sim".into())[0][&1];
    assert_eq!(planned.source.as_str(), "a");
}

// ============================================================================
// Usage Aggregation
// ============================================================================

#[test]
fn usage_aggregates_across_all_edges() {
    // Scenario: one buffer read as uniform by a render pass and written as
    // storage by a compute pass.
    let mut blueprint = Blueprint::new();
    blueprint
        .insert_node("buf", buffer(256))
        .insert_node("draw", render("vs", "fs"))
        .insert_node("sim", compute("cs"))
        .insert_node(
            "edge-u",
            binding(
                BindingKind::Buffer(StorageAccess::Uniform),
                0,
                1,
                "buf",
                "draw",
            ),
        )
        .insert_node(
            "edge-s",
            binding(
                BindingKind::Buffer(StorageAccess::ReadWrite),
                0,
                1,
                "buf",
                "sim",
            ),
        );

    let map = ProgramMap::analyze(&blueprint).unwrap();
    let usage = map.buffer_usage[&"buf".into()];
    assert!(usage.contains(wgpu::BufferUsages::UNIFORM));
    assert!(usage.contains(wgpu::BufferUsages::STORAGE));
}

#[test]
fn usage_shared_storage_buffer_between_passes() {
    // Scenario B: A --queue--> B sharing one storage buffer.
    let mut blueprint = Blueprint::new();
    blueprint
        .insert_node("buf", buffer(1024))
        .insert_node("a", compute("cs"))
        .insert_node("b", compute("cs"))
        .insert_node(
            "read",
            binding(
                BindingKind::Buffer(StorageAccess::ReadOnly),
                0,
                1,
                "buf",
                "a",
            ),
        )
        .insert_node(
            "write",
            binding(
                BindingKind::Buffer(StorageAccess::ReadWrite),
                0,
                1,
                "buf",
                "b",
            ),
        )
        .insert_node("order", queue("a", "b"));

    let map = ProgramMap::analyze(&blueprint).unwrap();
    assert_eq!(map.buffer_usage[&"buf".into()], wgpu::BufferUsages::STORAGE);
    assert_eq!(ids(&map.pass_order), ["a", "b"]);
}

#[test]
fn usage_absent_for_unreferenced_buffer() {
    let mut blueprint = Blueprint::new();
    blueprint
        .insert_node("orphan", buffer(64))
        .insert_node("sim", compute("cs"));

    let map = ProgramMap::analyze(&blueprint).unwrap();
    assert!(!map.buffer_usage.contains_key(&"orphan".into()));
}

#[test]
fn usage_counts_type_valid_edge_even_when_slot_is_taken() {
    // The duplicate edge loses its slot but still references the buffer.
    let mut blueprint = Blueprint::new();
    blueprint
        .insert_node("a", buffer(16))
        .insert_node("b", buffer(16))
        .insert_node("sim", compute("cs"))
        .insert_node(
            "edge-1",
            binding(
                BindingKind::Buffer(StorageAccess::Uniform),
                0,
                1,
                "a",
                "sim",
            ),
        )
        .insert_node(
            "edge-2",
            binding(
                BindingKind::Buffer(StorageAccess::ReadWrite),
                0,
                1,
                "b",
                "sim",
            ),
        );

    let map = ProgramMap::analyze(&blueprint).unwrap();
    assert_eq!(
        map.bindings_for(&"sim".into())[0][&1].source.as_str(),
        "a"
    );
    assert_eq!(map.buffer_usage[&"b".into()], wgpu::BufferUsages::STORAGE);
}

#[test]
fn usage_texture_binding_flag() {
    let mut blueprint = Blueprint::new();
    blueprint
        .insert_node("tex", Node::Texture(TextureNode::default()))
        .insert_node("draw", render("vs", "fs"))
        .insert_node("edge", binding(BindingKind::Texture, 1, 0, "tex", "draw"));

    let map = ProgramMap::analyze(&blueprint).unwrap();
    assert_eq!(
        map.texture_usage[&"tex".into()],
        wgpu::TextureUsages::TEXTURE_BINDING
    );
}

// ============================================================================
// Scheduling
// ============================================================================

#[test]
fn schedule_unordered_passes_sort_by_id() {
    let mut blueprint = Blueprint::new();
    blueprint
        .insert_node("c", compute("cs"))
        .insert_node("a", compute("cs"))
        .insert_node("b", compute("cs"));

    let map = ProgramMap::analyze(&blueprint).unwrap();
    assert_eq!(ids(&map.pass_order), ["a", "b", "c"]);
}

#[test]
fn schedule_respects_queue_edges() {
    let mut blueprint = Blueprint::new();
    blueprint
        .insert_node("a", compute("cs"))
        .insert_node("b", compute("cs"))
        .insert_node("c", compute("cs"))
        .insert_node("e1", queue("c", "b"))
        .insert_node("e2", queue("b", "a"));

    let map = ProgramMap::analyze(&blueprint).unwrap();
    assert_eq!(ids(&map.pass_order), ["c", "b", "a"]);
}

#[test]
fn schedule_every_queue_edge_is_honored() {
    // Diamond: root before both branches, both branches before sink.
    let mut blueprint = Blueprint::new();
    blueprint
        .insert_node("root", compute("cs"))
        .insert_node("left", compute("cs"))
        .insert_node("right", compute("cs"))
        .insert_node("sink", compute("cs"))
        .insert_node("e1", queue("root", "left"))
        .insert_node("e2", queue("root", "right"))
        .insert_node("e3", queue("left", "sink"))
        .insert_node("e4", queue("right", "sink"));

    let map = ProgramMap::analyze(&blueprint).unwrap();
    let order = ids(&map.pass_order);
    assert_eq!(order.len(), 4);

    let position = |id: &str| order.iter().position(|x| *x == id).unwrap();
    assert!(position("root") < position("left"));
    assert!(position("root") < position("right"));
    assert!(position("left") < position("sink"));
    assert!(position("right") < position("sink"));
}

#[test]
fn schedule_mixes_render_and_compute() {
    let mut blueprint = Blueprint::new();
    blueprint
        .insert_node("sim", compute("cs"))
        .insert_node("draw", render("vs", "fs"))
        .insert_node("e", queue("sim", "draw"));

    let map = ProgramMap::analyze(&blueprint).unwrap();
    assert_eq!(ids(&map.pass_order), ["sim", "draw"]);
}

#[test]
fn schedule_drops_queue_edge_with_missing_endpoint() {
    let mut blueprint = Blueprint::new();
    blueprint
        .insert_node("a", compute("cs"))
        .insert_node("b", compute("cs"))
        .insert_node("dangling", queue("a", "ghost"))
        .insert_node("backward", queue("b", "a"));

    let map = ProgramMap::analyze(&blueprint).unwrap();
    assert_eq!(ids(&map.pass_order), ["b", "a"]);
}

#[test]
fn schedule_queue_edge_between_resources_is_ignored() {
    // Queue edges only order passes; resource endpoints are invalid.
    let mut blueprint = Blueprint::new();
    blueprint
        .insert_node("buf", buffer(16))
        .insert_node("sim", compute("cs"))
        .insert_node("bad", queue("buf", "sim"));

    let map = ProgramMap::analyze(&blueprint).unwrap();
    assert_eq!(ids(&map.pass_order), ["sim"]);
}

#[test]
fn schedule_cycle_is_a_hard_error() {
    let mut blueprint = Blueprint::new();
    blueprint
        .insert_node("a", compute("cs"))
        .insert_node("b", compute("cs"))
        .insert_node("c", compute("cs"))
        .insert_node("e1", queue("a", "b"))
        .insert_node("e2", queue("b", "a"));

    let error = ProgramMap::analyze(&blueprint).unwrap_err();
    match error {
        PatchbayError::QueueCycle { stalled } => {
            assert_eq!(ids(&stalled), ["a", "b"]);
        }
        other => panic!("expected QueueCycle, got {other:?}"),
    }
}

#[test]
fn schedule_self_edge_is_a_cycle() {
    let mut blueprint = Blueprint::new();
    blueprint
        .insert_node("a", compute("cs"))
        .insert_node("loop", queue("a", "a"));

    assert!(matches!(
        ProgramMap::analyze(&blueprint),
        Err(PatchbayError::QueueCycle { .. })
    ));
}

#[test]
fn schedule_downstream_of_cycle_counts_as_stalled() {
    let mut blueprint = Blueprint::new();
    blueprint
        .insert_node("a", compute("cs"))
        .insert_node("b", compute("cs"))
        .insert_node("after", compute("cs"))
        .insert_node("e1", queue("a", "b"))
        .insert_node("e2", queue("b", "a"))
        .insert_node("e3", queue("b", "after"));

    let error = ProgramMap::analyze(&blueprint).unwrap_err();
    match error {
        PatchbayError::QueueCycle { stalled } => {
            assert_eq!(ids(&stalled), ["a", "after", "b"]);
        }
        other => panic!("expected QueueCycle, got {other:?}"),
    }
}

#[test]
fn schedule_is_deterministic() {
    let mut blueprint = Blueprint::new();
    blueprint
        .insert_node("x", compute("cs"))
        .insert_node("y", render("vs", "fs"))
        .insert_node("z", compute("cs"))
        .insert_node("e", queue("z", "x"));

    let first = ProgramMap::analyze(&blueprint).unwrap();
    let second = ProgramMap::analyze(&blueprint).unwrap();
    assert_eq!(first.pass_order, second.pass_order);
}
