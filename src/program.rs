//! Program Facade
//!
//! [`Program`] owns the live generation (compiled caches plus program map),
//! the builtin-uniform buffer and the linked [`Executable`], and runs the
//! recompile protocol on top of them.
//!
//! Every blueprint mutation and output-format change bumps an epoch and
//! hands back a [`CompileJob`]; the display loop drives the job and feeds
//! the finished [`PendingGeneration`] to [`Program::install`]. Install only
//! accepts the newest epoch, so at most one generation is ever installed;
//! a superseded generation is discarded with its freshly compiled resources
//! disposed. A failed compile leaves the previous generation and executable
//! untouched.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::analyze::ProgramMap;
use crate::blueprint::{Blueprint, NodeId, ShaderId};
use crate::builtins::{BUILTIN_UNIFORM_SIZE, BuiltinUniforms};
use crate::cache::{
    BufferCompiler, PendingCache, ResourceCache, SamplerCompiler, ShaderCompiler, ShaderDiagnostic,
    TextureCompiler,
};
use crate::context::GpuContext;
use crate::errors::{PatchbayError, Result};
use crate::executable::Executable;
use crate::linker::Linker;

/// Diagnostics of every shader in the generation, usable modules included
/// (theirs are empty).
pub type DiagnosticsMap = FxHashMap<ShaderId, Vec<ShaderDiagnostic>>;

type DiagnosticsCallback = Box<dyn FnMut(&DiagnosticsMap)>;

// ─── Generations ──────────────────────────────────────────────────────────────

/// One complete compiled resource set plus the map it was compiled from.
///
/// The initial generation is empty; every later one is built by
/// [`Program::install`] from a [`PendingGeneration`].
#[derive(Default)]
pub struct Generation {
    map: Option<Arc<ProgramMap>>,
    shaders: ResourceCache<ShaderCompiler>,
    buffers: ResourceCache<BufferCompiler>,
    textures: ResourceCache<TextureCompiler>,
    samplers: ResourceCache<SamplerCompiler>,
}

impl Generation {
    #[must_use]
    pub fn map(&self) -> Option<&ProgramMap> {
        self.map.as_deref()
    }

    #[must_use]
    pub fn shaders(&self) -> &ResourceCache<ShaderCompiler> {
        &self.shaders
    }

    #[must_use]
    pub fn buffers(&self) -> &ResourceCache<BufferCompiler> {
        &self.buffers
    }

    #[must_use]
    pub fn textures(&self) -> &ResourceCache<TextureCompiler> {
        &self.textures
    }

    #[must_use]
    pub fn samplers(&self) -> &ResourceCache<SamplerCompiler> {
        &self.samplers
    }

    fn teardown(&mut self) {
        self.map = None;
        self.shaders.teardown();
        self.buffers.teardown();
        self.textures.teardown();
        self.samplers.teardown();
    }
}

// ─── Compile jobs ─────────────────────────────────────────────────────────────

/// An owned compile of one blueprint snapshot against a base generation.
///
/// The job borrows nothing from the facade, so the display loop can drive
/// it while edits keep arriving; whether its result still matters is
/// decided at install time by the epoch it carries.
pub struct CompileJob {
    epoch: u64,
    gpu: GpuContext,
    base: Arc<Generation>,
    blueprint: Blueprint,
}

impl CompileJob {
    /// Analyzes the snapshot and compiles all four caches concurrently.
    ///
    /// # Errors
    ///
    /// [`PatchbayError::QueueCycle`] from analysis; resource compiles
    /// themselves never fail the job.
    pub async fn run(self) -> Result<PendingGeneration> {
        let map = Arc::new(ProgramMap::analyze(&self.blueprint)?);
        let (shaders, buffers, textures, samplers) = futures::join!(
            self.base.shaders.compile(&self.gpu, &map),
            self.base.buffers.compile(&self.gpu, &map),
            self.base.textures.compile(&self.gpu, &map),
            self.base.samplers.compile(&self.gpu, &map),
        );
        Ok(PendingGeneration {
            epoch: self.epoch,
            map,
            shaders,
            buffers,
            textures,
            samplers,
        })
    }
}

/// A finished compile waiting for [`Program::install`].
pub struct PendingGeneration {
    epoch: u64,
    map: Arc<ProgramMap>,
    shaders: PendingCache<ShaderCompiler>,
    buffers: PendingCache<BufferCompiler>,
    textures: PendingCache<TextureCompiler>,
    samplers: PendingCache<SamplerCompiler>,
}

impl PendingGeneration {
    /// The map this generation was compiled from.
    #[must_use]
    pub fn map(&self) -> &ProgramMap {
        &self.map
    }

    #[must_use]
    pub fn shaders(&self) -> &PendingCache<ShaderCompiler> {
        &self.shaders
    }

    #[must_use]
    pub fn buffers(&self) -> &PendingCache<BufferCompiler> {
        &self.buffers
    }

    #[must_use]
    pub fn textures(&self) -> &PendingCache<TextureCompiler> {
        &self.textures
    }

    #[must_use]
    pub fn samplers(&self) -> &PendingCache<SamplerCompiler> {
        &self.samplers
    }

    fn discard(self) {
        self.shaders.discard();
        self.buffers.discard();
        self.textures.discard();
        self.samplers.discard();
    }
}

/// What [`Program::install`] did with a finished compile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileStatus {
    /// The generation went live and the executable was relinked.
    Installed,
    /// A newer edit superseded this compile before it installed; its fresh
    /// resources were disposed.
    Superseded,
}

// ─── Program ──────────────────────────────────────────────────────────────────

/// The facade the display loop talks to.
pub struct Program {
    gpu: GpuContext,
    output_format: wgpu::TextureFormat,
    builtin_buffer: wgpu::Buffer,
    blueprint: Blueprint,
    live: Arc<Generation>,
    executable: Option<Executable>,
    epoch: u64,
    diagnostics: DiagnosticsMap,
    diagnostics_callback: Option<DiagnosticsCallback>,
}

impl Program {
    #[must_use]
    pub fn new(gpu: GpuContext, output_format: wgpu::TextureFormat) -> Self {
        let builtin_buffer = create_builtin_buffer(&gpu);
        Self {
            gpu,
            output_format,
            builtin_buffer,
            blueprint: Blueprint::new(),
            live: Arc::new(Generation::default()),
            executable: None,
            epoch: 0,
            diagnostics: DiagnosticsMap::default(),
            diagnostics_callback: None,
        }
    }

    // ─── Recompile protocol ───────────────────────────────────────────────

    /// Replaces the blueprint and begins a new compile.
    #[must_use]
    pub fn set_blueprint(&mut self, blueprint: Blueprint) -> CompileJob {
        self.blueprint = blueprint;
        self.begin_compile()
    }

    /// Changes the output format. Pipelines and bundles bake the format
    /// in, so an actual change recompiles; setting the current format is
    /// a no-op.
    #[must_use]
    pub fn set_output_format(&mut self, format: wgpu::TextureFormat) -> Option<CompileJob> {
        if self.output_format == format {
            return None;
        }
        self.output_format = format;
        Some(self.begin_compile())
    }

    fn begin_compile(&mut self) -> CompileJob {
        self.epoch += 1;
        CompileJob {
            epoch: self.epoch,
            gpu: self.gpu.clone(),
            base: Arc::clone(&self.live),
            blueprint: self.blueprint.clone(),
        }
    }

    /// Commits a finished compile, relinks the executable and notifies the
    /// diagnostics callback.
    ///
    /// A generation whose epoch is no longer current is discarded instead,
    /// leaving the installed one untouched.
    ///
    /// # Errors
    ///
    /// [`PatchbayError::NoUsablePasses`] when the compiled graph schedules
    /// nothing; the generation is discarded and the previous one stays
    /// live.
    pub async fn install(&mut self, pending: PendingGeneration) -> Result<CompileStatus> {
        if pending.epoch != self.epoch {
            log::debug!(
                "discarding superseded generation (epoch {}, current {})",
                pending.epoch,
                self.epoch
            );
            pending.discard();
            return Ok(CompileStatus::Superseded);
        }

        if pending.map.pass_order.is_empty() {
            pending.discard();
            return Err(PatchbayError::NoUsablePasses);
        }

        let PendingGeneration {
            epoch: _,
            map,
            shaders,
            buffers,
            textures,
            samplers,
        } = pending;
        self.live = Arc::new(Generation {
            map: Some(Arc::clone(&map)),
            shaders: shaders.install(&self.live.shaders),
            buffers: buffers.install(&self.live.buffers),
            textures: textures.install(&self.live.textures),
            samplers: samplers.install(&self.live.samplers),
        });

        self.diagnostics = self
            .live
            .shaders
            .iter()
            .map(|(id, compiled)| (id.clone(), compiled.diagnostics.clone()))
            .collect();
        if let Some(callback) = self.diagnostics_callback.as_mut() {
            callback(&self.diagnostics);
        }

        let linker = Linker::new(&self.gpu, &self.builtin_buffer, self.output_format, &self.live);
        self.executable = Some(linker.link().await);
        Ok(CompileStatus::Installed)
    }

    /// Begin, drive and install one compile in a single await. Convenience
    /// for callers without their own job scheduling.
    pub async fn compile_now(&mut self, blueprint: Blueprint) -> Result<CompileStatus> {
        let pending = self.set_blueprint(blueprint).run().await?;
        self.install(pending).await
    }

    // ─── Frame interface ──────────────────────────────────────────────────

    /// Writes the per-frame builtin uniforms. Call immediately before
    /// [`Program::run`].
    pub fn update_uniforms(&self, time: f32, delta: f32, frame_index: u32, resolution: (u32, u32)) {
        let uniforms = BuiltinUniforms::new(time, delta, frame_index, resolution);
        self.gpu
            .queue
            .write_buffer(&self.builtin_buffer, 0, bytemuck::bytes_of(&uniforms));
    }

    /// Replays the linked executable against `target`. A program with no
    /// installed compile is a no-op frame.
    pub fn run(&mut self, target: &wgpu::TextureView, resolution: (u32, u32)) {
        if let Some(executable) = self.executable.as_mut() {
            executable.run(target, resolution);
        }
    }

    /// Registers the callback invoked after every install with the new
    /// shader-diagnostics map.
    pub fn on_shaders_compiled(&mut self, callback: impl FnMut(&DiagnosticsMap) + 'static) {
        self.diagnostics_callback = Some(Box::new(callback));
    }

    // ─── Device loss ──────────────────────────────────────────────────────

    /// Rebuilds the facade on a reacquired device after the previous one
    /// was lost. All cached resources are torn down; the retained blueprint
    /// is recompiled from an empty generation.
    ///
    /// Returns `None` when the blueprint is empty and there is nothing to
    /// rebuild yet.
    pub fn handle_device_lost(&mut self, gpu: GpuContext) -> Option<CompileJob> {
        log::warn!("device lost, rebuilding all cached resources");
        self.executable = None;
        if let Some(generation) = Arc::get_mut(&mut self.live) {
            generation.teardown();
        }
        self.live = Arc::new(Generation::default());
        self.diagnostics = DiagnosticsMap::default();
        // Compiles issued against the dead device must never install.
        self.epoch += 1;
        self.gpu = gpu;
        self.builtin_buffer = create_builtin_buffer(&self.gpu);

        if self.blueprint.is_empty() {
            return None;
        }
        Some(self.begin_compile())
    }

    // ─── Accessors ────────────────────────────────────────────────────────

    /// Scheduled pass IDs of the live generation.
    #[must_use]
    pub fn pass_order(&self) -> &[NodeId] {
        self.live
            .map()
            .map_or(&[], |map| map.pass_order.as_slice())
    }

    /// Diagnostics of the most recently installed compile.
    #[must_use]
    pub fn diagnostics(&self) -> &DiagnosticsMap {
        &self.diagnostics
    }

    /// The live generation: compiled caches plus program map.
    #[must_use]
    pub fn generation(&self) -> &Generation {
        &self.live
    }

    /// The linked executable, once a compile has installed.
    #[must_use]
    pub fn executable(&self) -> Option<&Executable> {
        self.executable.as_ref()
    }

    #[must_use]
    pub fn output_format(&self) -> wgpu::TextureFormat {
        self.output_format
    }

    #[must_use]
    pub fn blueprint(&self) -> &Blueprint {
        &self.blueprint
    }
}

fn create_builtin_buffer(gpu: &GpuContext) -> wgpu::Buffer {
    gpu.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Builtin Uniforms"),
        size: BUILTIN_UNIFORM_SIZE,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}
