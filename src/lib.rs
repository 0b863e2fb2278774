#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]

pub mod analyze;
pub mod blueprint;
pub mod builtins;
pub mod cache;
pub mod context;
pub mod errors;
pub mod executable;
pub mod linker;
pub mod program;

pub use analyze::{Pass, PlannedBinding, ProgramMap};
pub use blueprint::{
    BindingEdge, BindingKind, Blueprint, BufferInit, BufferNode, ComputeNode, Connection,
    ImageData, MAX_BIND_GROUPS, Node, NodeId, QueueEdge, RenderNode, SamplerNode, Shader, ShaderId,
    StorageAccess, TextureNode,
};
pub use builtins::{BUILTIN_PREAMBLE, BUILTIN_UNIFORM_SIZE, BuiltinUniforms};
pub use cache::{
    CompiledBuffer, CompiledSampler, CompiledShader, CompiledTexture, DiagnosticSeverity,
    ResourceCache, ShaderDiagnostic,
};
pub use context::GpuContext;
pub use errors::{PatchbayError, Result};
pub use executable::{Executable, LinkedPass};
pub use linker::{DEPTH_STENCIL_FORMAT, Linker};
pub use program::{
    CompileJob, CompileStatus, DiagnosticsMap, Generation, PendingGeneration, Program,
};
