//! Offscreen demo patch: a compute pass relaxes a random 1-D field every
//! frame, a render pass plots it as a glowing band, and the last frame is
//! saved to `patch.png`.
//!
//! Run with `cargo run --example patch`.

use patchbay::blueprint::{
    BindingEdge, BindingKind, Blueprint, BufferInit, BufferNode, ComputeNode, Connection, Node,
    QueueEdge, RenderNode, Shader, StorageAccess,
};
use patchbay::context::GpuContext;
use patchbay::program::Program;

const RESOLUTION: (u32, u32) = (512, 512);
const FRAMES: u32 = 120;

const RELAX: &str = "\
@group(0) @binding(1) var<storage, read_write> field: array<f32>;

@compute @workgroup_size(64)
fn main(@builtin(global_invocation_id) id: vec3<u32>) {
    let n = arrayLength(&field);
    if (id.x >= n) {
        return;
    }
    let left = field[(id.x + n - 1u) % n];
    let right = field[(id.x + 1u) % n];
    field[id.x] = mix(field[id.x], 0.5 * (left + right), 0.35);
}
";

const PLOT: &str = "\
@group(0) @binding(1) var<storage, read> field: array<f32>;

@vertex
fn vs_main(@builtin(vertex_index) index: u32) -> @builtin(position) vec4<f32> {
    var corners = array<vec2<f32>, 3>(
        vec2<f32>(-1.0, -3.0),
        vec2<f32>(3.0, 1.0),
        vec2<f32>(-1.0, 1.0),
    );
    return vec4<f32>(corners[index], 0.0, 1.0);
}

@fragment
fn fs_main(@builtin(position) position: vec4<f32>) -> @location(0) vec4<f32> {
    let resolution = vec2<f32>(builtins.resolution);
    let uv = position.xy / resolution;
    let n = arrayLength(&field);
    let sample = field[u32(uv.x * f32(n - 1u))];
    let center = 0.5 + 0.35 * sample;
    let band = smoothstep(0.02, 0.0, abs(uv.y - center));
    let glow = 0.6 + 0.4 * sin(builtins.time);
    return vec4<f32>(band * glow, band * 0.5, 0.25 + 0.15 * sample, 1.0);
}
";

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let gpu = acquire_device()?;
    let mut program = Program::new(gpu.clone(), wgpu::TextureFormat::Rgba8Unorm);
    program.on_shaders_compiled(|diagnostics| {
        for (shader, messages) in diagnostics {
            for diagnostic in messages {
                log::warn!(
                    "{shader}:{}:{}: {}",
                    diagnostic.line,
                    diagnostic.column,
                    diagnostic.message
                );
            }
        }
    });

    // === 1. Patch the graph ===
    let mut blueprint = Blueprint::new();
    blueprint
        .insert_shader("relax", Shader::new("relax", RELAX))
        .insert_shader("plot", Shader::new("plot", PLOT))
        .insert_node(
            "field",
            Node::Buffer(BufferNode {
                size: 1024,
                init: BufferInit::RandomFloats,
            }),
        )
        .insert_node("relax", Node::Compute(ComputeNode::new("relax", [4, 1, 1])))
        .insert_node("plot", Node::Render(RenderNode::new("plot", "plot")))
        .insert_node(
            "field-to-relax",
            Node::Connection(Connection::Binding(BindingEdge {
                kind: BindingKind::Buffer(StorageAccess::ReadWrite),
                group: 0,
                index: 1,
                source: "field".into(),
                target: "relax".into(),
            })),
        )
        .insert_node(
            "field-to-plot",
            Node::Connection(Connection::Binding(BindingEdge {
                kind: BindingKind::Buffer(StorageAccess::ReadOnly),
                group: 0,
                index: 1,
                source: "field".into(),
                target: "plot".into(),
            })),
        )
        .insert_node(
            "relax-before-plot",
            Node::Connection(Connection::Queue(QueueEdge {
                source: "relax".into(),
                target: "plot".into(),
            })),
        );

    // === 2. Compile ===
    pollster::block_on(program.compile_now(blueprint))?;
    println!("scheduled passes: {:?}", program.pass_order());

    // === 3. Run offscreen ===
    let target = gpu.device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Demo Target"),
        size: wgpu::Extent3d {
            width: RESOLUTION.0,
            height: RESOLUTION.1,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8Unorm,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    });
    let view = target.create_view(&wgpu::TextureViewDescriptor::default());
    for frame in 0..FRAMES {
        let time = frame as f32 / 60.0;
        program.update_uniforms(time, 1.0 / 60.0, frame, RESOLUTION);
        program.run(&view, RESOLUTION);
    }

    // === 4. Save the last frame ===
    let pixels = read_back(&gpu, &target)?;
    let image = image::RgbaImage::from_raw(RESOLUTION.0, RESOLUTION.1, pixels)
        .ok_or_else(|| anyhow::anyhow!("readback size mismatch"))?;
    image.save("patch.png")?;
    println!("rendered {FRAMES} frames, wrote patch.png");
    Ok(())
}

fn acquire_device() -> anyhow::Result<GpuContext> {
    pollster::block_on(async {
        let instance = wgpu::Instance::default();
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions::default())
            .await?;
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Patch Demo"),
                memory_hints: wgpu::MemoryHints::Performance,
                ..Default::default()
            })
            .await?;
        Ok(GpuContext::new(device, queue))
    })
}

/// Copies the target texture into a staging buffer and maps it.
fn read_back(gpu: &GpuContext, texture: &wgpu::Texture) -> anyhow::Result<Vec<u8>> {
    let bytes_per_row = texture.width() * 4;
    let staging = gpu.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Readback Buffer"),
        size: u64::from(bytes_per_row * texture.height()),
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = gpu
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Readback Encoder"),
        });
    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::TexelCopyBufferInfo {
            buffer: &staging,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(bytes_per_row),
                rows_per_image: Some(texture.height()),
            },
        },
        texture.size(),
    );
    gpu.queue.submit(std::iter::once(encoder.finish()));

    let slice = staging.slice(..);
    let (sender, receiver) = futures::channel::oneshot::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = sender.send(result);
    });
    gpu.device.poll(wgpu::PollType::wait_indefinitely())?;
    pollster::block_on(receiver)??;

    let pixels = slice.get_mapped_range().to_vec();
    staging.unmap();
    Ok(pixels)
}
