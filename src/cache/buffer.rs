//! Buffer Compilation
//!
//! Buffers are allocated with exactly the usage flags aggregated from the
//! binding edges that reference them. A buffer nothing binds carries no
//! usage and compiles to nothing at all; it costs zero GPU memory until an
//! edge appears. Initial contents follow the node's init policy: zeroed by
//! the driver, or filled with random 32-bit words (raw, or reinterpreted
//! as floats uniform in [-1, 1]).

use rand::RngExt;
use wgpu::util::DeviceExt;

use crate::analyze::ProgramMap;
use crate::blueprint::{BufferInit, NodeId};
use crate::cache::{Dispose, ResourceCompiler};
use crate::context::GpuContext;

/// Words generated per fill round (64 KiB), bounding scratch memory for
/// large buffers.
const FILL_CHUNK_WORDS: usize = 16 * 1024;

// ─── Random fills ─────────────────────────────────────────────────────────────

fn random_float_bits(word: u32) -> u32 {
    // Uniform in [-1, 1].
    let unit = word as f32 / u32::MAX as f32;
    unit.mul_add(2.0, -1.0).to_bits()
}

/// Random initial contents for `byte_len` bytes, as 32-bit words.
fn random_fill(byte_len: usize, init: BufferInit) -> Vec<u8> {
    let word_count = byte_len.div_ceil(4);
    let mut words: Vec<u32> = Vec::with_capacity(word_count);
    let mut rng = rand::rng();

    while words.len() < word_count {
        let round = FILL_CHUNK_WORDS.min(word_count - words.len());
        for _ in 0..round {
            let word: u32 = rng.random();
            words.push(match init {
                BufferInit::RandomFloats => random_float_bits(word),
                BufferInit::RandomUints | BufferInit::Zero => word,
            });
        }
    }

    bytemuck::cast_slice::<u32, u8>(&words)[..byte_len].to_vec()
}

// ─── Compiled buffers ─────────────────────────────────────────────────────────

/// One compiled buffer generation entry.
pub struct CompiledBuffer {
    /// `None` when no binding references the buffer (or creation failed).
    pub buffer: Option<wgpu::Buffer>,
    size: u64,
    init: BufferInit,
    usage: wgpu::BufferUsages,
}

impl Dispose for CompiledBuffer {
    fn dispose(&self) {
        if let Some(buffer) = &self.buffer {
            buffer.destroy();
        }
    }
}

// ─── Compiler strategy ────────────────────────────────────────────────────────

/// Descriptor snapshot of one buffer node plus its aggregated usage.
pub struct BufferDescriptor {
    size: u64,
    init: BufferInit,
    usage: wgpu::BufferUsages,
}

/// [`ResourceCompiler`] strategy for buffers.
pub struct BufferCompiler;

impl ResourceCompiler for BufferCompiler {
    type Key = NodeId;
    type Descriptor = BufferDescriptor;
    type Output = CompiledBuffer;

    const KIND: &'static str = "buffers";

    fn enumerate(map: &ProgramMap) -> Vec<(Self::Key, Self::Descriptor)> {
        map.buffers
            .iter()
            .map(|(id, node)| {
                (
                    id.clone(),
                    BufferDescriptor {
                        size: node.size,
                        init: node.init,
                        usage: map
                            .buffer_usage
                            .get(id)
                            .copied()
                            .unwrap_or(wgpu::BufferUsages::empty()),
                    },
                )
            })
            .collect()
    }

    fn needs_recompile(desc: &Self::Descriptor, existing: &Self::Output) -> bool {
        desc.size != existing.size || desc.init != existing.init || desc.usage != existing.usage
    }

    async fn compile(
        gpu: &GpuContext,
        key: &Self::Key,
        desc: Self::Descriptor,
        _map: &ProgramMap,
    ) -> Self::Output {
        let BufferDescriptor { size, init, usage } = desc;

        if usage.is_empty() {
            log::debug!("buffer {key}: no consumers, skipping allocation");
            return CompiledBuffer {
                buffer: None,
                size,
                init,
                usage,
            };
        }

        let scope = gpu.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let buffer = match init {
            BufferInit::Zero => gpu.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(key.as_str()),
                size,
                usage,
                mapped_at_creation: false,
            }),
            BufferInit::RandomFloats | BufferInit::RandomUints => {
                let contents = random_fill(size as usize, init);
                gpu.device
                    .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some(key.as_str()),
                        contents: &contents,
                        usage,
                    })
            }
        };
        let buffer = match scope.pop().await {
            None => Some(buffer),
            Some(error) => {
                log::warn!("buffer {key}: creation rejected: {error}");
                None
            }
        };

        CompiledBuffer {
            buffer,
            size,
            init,
            usage,
        }
    }
}
