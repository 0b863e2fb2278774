//! Blueprint Data Model
//!
//! A [`Blueprint`] is one editable snapshot of a GPU program graph: resource
//! nodes (buffers, textures, samplers), pass nodes (render, compute),
//! connection nodes (bindings and queue edges) and a table of WGSL shader
//! sources. It is the immutable input to one compile; the editor mutates its
//! own copy and hands a fresh snapshot to [`Program::set_blueprint`].
//!
//! Node and connection kinds are closed enums so that every consumption
//! site matches exhaustively; adding a variant fails to compile until all
//! sites handle it.
//!
//! [`Program::set_blueprint`]: crate::program::Program::set_blueprint

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use xxhash_rust::xxh3::xxh3_64;

/// Maximum number of bind groups a pass may address (WebGPU guaranteed
/// minimum). Bindings with `group >= MAX_BIND_GROUPS` are dropped during
/// analysis.
pub const MAX_BIND_GROUPS: u32 = 4;

// ─── Identifiers ──────────────────────────────────────────────────────────────

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(Arc<str>);

        impl $name {
            /// Borrows the underlying string.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(Arc::from(s))
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(Arc::from(s))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:?}", &*self.0)
            }
        }
    };
}

define_id! {
    /// Identifier of a node within one [`Blueprint`]. Assigned by the
    /// editor; cheap to clone and hash.
    NodeId
}

define_id! {
    /// Identifier of a shader source within one [`Blueprint`].
    ShaderId
}

// ─── Shaders ──────────────────────────────────────────────────────────────────

/// A WGSL shader source as authored by the user, without the builtin
/// uniform preamble (prepended at compile time).
#[derive(Debug, Clone)]
pub struct Shader {
    /// Display name used in labels and diagnostics.
    pub name: String,
    /// User-visible WGSL source text.
    pub source: String,
}

impl Shader {
    #[must_use]
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
        }
    }
}

// ─── Image payloads ───────────────────────────────────────────────────────────

/// Encoded image bytes (png/jpeg) attached to a texture node.
///
/// The content hash is computed once at construction and drives texture
/// recompilation: equal bytes never recompile, changed bytes always do,
/// regardless of which allocation carries them.
#[derive(Debug, Clone)]
pub struct ImageData {
    bytes: Arc<[u8]>,
    content_hash: u64,
}

impl ImageData {
    #[must_use]
    pub fn new(bytes: impl Into<Arc<[u8]>>) -> Self {
        let bytes = bytes.into();
        let content_hash = xxh3_64(&bytes);
        Self {
            bytes,
            content_hash,
        }
    }

    /// The encoded payload.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// xxh3 hash of the encoded payload.
    #[must_use]
    pub fn content_hash(&self) -> u64 {
        self.content_hash
    }
}

// ─── Resource nodes ───────────────────────────────────────────────────────────

/// How a buffer's initial contents are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BufferInit {
    /// No explicit fill; the buffer starts zeroed.
    #[default]
    Zero,
    /// Random 32-bit words reinterpreted as floats uniform in `[-1, 1]`.
    RandomFloats,
    /// Raw random 32-bit words.
    RandomUints,
}

/// A GPU buffer node. Usage flags are not authored here; they are
/// aggregated from the binding edges that reference the buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferNode {
    /// Size in bytes.
    pub size: u64,
    pub init: BufferInit,
}

impl BufferNode {
    #[must_use]
    pub fn new(size: u64, init: BufferInit) -> Self {
        Self { size, init }
    }
}

/// A 2-D texture node, optionally backed by an encoded image payload.
/// Without a payload the node compiles to an uncompiled (null) texture.
#[derive(Debug, Clone)]
pub struct TextureNode {
    pub image: Option<ImageData>,
    /// Declared size; the compiled texture is sized to the decoded bitmap.
    pub width: u32,
    pub height: u32,
    pub format: wgpu::TextureFormat,
    pub mip_level_count: u32,
    pub sample_count: u32,
}

impl Default for TextureNode {
    fn default() -> Self {
        Self {
            image: None,
            width: 1,
            height: 1,
            format: wgpu::TextureFormat::Rgba8Unorm,
            mip_level_count: 1,
            sample_count: 1,
        }
    }
}

impl TextureNode {
    /// A texture node carrying an encoded image payload.
    #[must_use]
    pub fn with_image(image: ImageData) -> Self {
        Self {
            image: Some(image),
            ..Self::default()
        }
    }
}

/// A sampler node. Stateless: compiled once, never recompiled.
#[derive(Debug, Clone, Copy, Default)]
pub struct SamplerNode;

// ─── Pass nodes ───────────────────────────────────────────────────────────────

/// A compute pass node.
#[derive(Debug, Clone)]
pub struct ComputeNode {
    pub shader: ShaderId,
    pub entry_point: String,
    /// Workgroup counts per axis. Zero on any axis dispatches nothing.
    pub dispatch: [u32; 3],
}

impl ComputeNode {
    #[must_use]
    pub fn new(shader: impl Into<ShaderId>, dispatch: [u32; 3]) -> Self {
        Self {
            shader: shader.into(),
            entry_point: "main".to_string(),
            dispatch,
        }
    }
}

/// A render pass node drawing a fixed vertex/instance range against the
/// frame's output target.
#[derive(Debug, Clone)]
pub struct RenderNode {
    pub vertex_shader: ShaderId,
    pub vertex_entry: String,
    pub fragment_shader: ShaderId,
    pub fragment_entry: String,
    pub topology: wgpu::PrimitiveTopology,
    pub vertex_count: u32,
    pub instance_count: u32,
    /// Clear the output and depth attachments before drawing, or keep
    /// whatever earlier passes produced.
    pub clear: bool,
    pub clear_color: wgpu::Color,
    pub depth_compare: wgpu::CompareFunction,
}

impl RenderNode {
    /// A triangle-list render node with the conventional `vs_main` /
    /// `fs_main` entry points drawing one triangle.
    #[must_use]
    pub fn new(vertex_shader: impl Into<ShaderId>, fragment_shader: impl Into<ShaderId>) -> Self {
        Self {
            vertex_shader: vertex_shader.into(),
            vertex_entry: "vs_main".to_string(),
            fragment_shader: fragment_shader.into(),
            fragment_entry: "fs_main".to_string(),
            topology: wgpu::PrimitiveTopology::TriangleList,
            vertex_count: 3,
            instance_count: 1,
            clear: true,
            clear_color: wgpu::Color::BLACK,
            depth_compare: wgpu::CompareFunction::Less,
        }
    }
}

// ─── Connection nodes ─────────────────────────────────────────────────────────

/// How a buffer binding is exposed to the shader, and which usage flag it
/// implies on the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageAccess {
    /// `var<uniform>`; implies `BufferUsages::UNIFORM`.
    Uniform,
    /// `var<storage, read>`; implies `BufferUsages::STORAGE`.
    ReadOnly,
    /// `var<storage, read_write>`; implies `BufferUsages::STORAGE`.
    ReadWrite,
}

/// Declared kind of a binding edge. The source node's type must match,
/// otherwise the edge is dropped during analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    Buffer(StorageAccess),
    Texture,
    Sampler,
}

impl BindingKind {
    /// Short label for warnings.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Buffer(_) => "buffer",
            Self::Texture => "texture",
            Self::Sampler => "sampler",
        }
    }
}

/// A binding edge: exposes `source` to `target` at `(group, index)`.
#[derive(Debug, Clone)]
pub struct BindingEdge {
    pub kind: BindingKind,
    pub group: u32,
    pub index: u32,
    /// Resource node made visible to the pass.
    pub source: NodeId,
    /// Pass node receiving the binding.
    pub target: NodeId,
}

/// A queue edge: `source` must execute before `target`.
#[derive(Debug, Clone)]
pub struct QueueEdge {
    pub source: NodeId,
    pub target: NodeId,
}

/// A connection node, either a data binding or an execution-order edge.
#[derive(Debug, Clone)]
pub enum Connection {
    Binding(BindingEdge),
    Queue(QueueEdge),
}

// ─── Nodes ────────────────────────────────────────────────────────────────────

/// One graph node. Closed set: every consumer matches exhaustively.
#[derive(Debug, Clone)]
pub enum Node {
    Buffer(BufferNode),
    Texture(TextureNode),
    Sampler(SamplerNode),
    Compute(ComputeNode),
    Render(RenderNode),
    Connection(Connection),
}

impl Node {
    /// Short label for warnings.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Buffer(_) => "buffer",
            Self::Texture(_) => "texture",
            Self::Sampler(_) => "sampler",
            Self::Compute(_) => "compute",
            Self::Render(_) => "render",
            Self::Connection(_) => "connection",
        }
    }
}

// ─── Blueprint ────────────────────────────────────────────────────────────────

/// One snapshot of the program graph.
///
/// Nodes and shaders live in ordered maps, so everything derived from a
/// Blueprint (binding resolution order, duplicate-slot resolution,
/// topological layers) is a deterministic function of its value.
#[derive(Debug, Clone, Default)]
pub struct Blueprint {
    pub nodes: BTreeMap<NodeId, Node>,
    pub shaders: BTreeMap<ShaderId, Shader>,
}

impl Blueprint {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a node.
    pub fn insert_node(&mut self, id: impl Into<NodeId>, node: Node) -> &mut Self {
        self.nodes.insert(id.into(), node);
        self
    }

    /// Inserts or replaces a shader source.
    pub fn insert_shader(&mut self, id: impl Into<ShaderId>, shader: Shader) -> &mut Self {
        self.shaders.insert(id.into(), shader);
        self
    }

    /// Removes a node, if present.
    pub fn remove_node(&mut self, id: &NodeId) -> Option<Node> {
        self.nodes.remove(id)
    }

    /// Removes a shader, if present.
    pub fn remove_shader(&mut self, id: &ShaderId) -> Option<Shader> {
        self.shaders.remove(id)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.shaders.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_data_hash_tracks_content_not_allocation() {
        let a = ImageData::new(vec![1u8, 2, 3, 4]);
        let b = ImageData::new(vec![1u8, 2, 3, 4]);
        let c = ImageData::new(vec![1u8, 2, 3, 5]);

        assert_eq!(a.content_hash(), b.content_hash());
        assert_ne!(a.content_hash(), c.content_hash());
    }

    #[test]
    fn node_ids_compare_by_value() {
        let a = NodeId::from("pass-a");
        let b = NodeId::from("pass-a".to_string());
        assert_eq!(a, b);
        assert_eq!(format!("{a}"), "pass-a");
    }
}
