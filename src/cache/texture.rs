//! Texture Compilation
//!
//! A texture node compiles only when it carries an image payload: the
//! payload is decoded to RGBA8, a 2-D texture sized to the decoded bitmap
//! is allocated, and the pixels are uploaded through the queue. Payload
//! identity is the content hash computed at [`ImageData`] construction, so
//! re-attaching equal bytes never reallocates and mutated bytes always do.
//!
//! [`ImageData`]: crate::blueprint::ImageData

use crate::analyze::ProgramMap;
use crate::blueprint::{ImageData, NodeId};
use crate::cache::{Dispose, ResourceCompiler};
use crate::context::GpuContext;

/// One compiled texture generation entry.
pub struct CompiledTexture {
    /// `None` without an image payload (or when decode/creation failed).
    pub texture: Option<wgpu::Texture>,
    pub view: Option<wgpu::TextureView>,
    content_hash: Option<u64>,
}

impl Dispose for CompiledTexture {
    fn dispose(&self) {
        if let Some(texture) = &self.texture {
            texture.destroy();
        }
    }
}

/// Descriptor snapshot of one texture node plus its aggregated usage.
pub struct TextureDescriptor {
    image: Option<ImageData>,
    format: wgpu::TextureFormat,
    mip_level_count: u32,
    sample_count: u32,
    usage: wgpu::TextureUsages,
}

/// [`ResourceCompiler`] strategy for textures.
pub struct TextureCompiler;

impl ResourceCompiler for TextureCompiler {
    type Key = NodeId;
    type Descriptor = TextureDescriptor;
    type Output = CompiledTexture;

    const KIND: &'static str = "textures";

    fn enumerate(map: &ProgramMap) -> Vec<(Self::Key, Self::Descriptor)> {
        map.textures
            .iter()
            .map(|(id, node)| {
                (
                    id.clone(),
                    TextureDescriptor {
                        image: node.image.clone(),
                        format: node.format,
                        mip_level_count: node.mip_level_count,
                        sample_count: node.sample_count,
                        usage: map
                            .texture_usage
                            .get(id)
                            .copied()
                            .unwrap_or(wgpu::TextureUsages::empty()),
                    },
                )
            })
            .collect()
    }

    fn needs_recompile(desc: &Self::Descriptor, existing: &Self::Output) -> bool {
        desc.image.as_ref().map(ImageData::content_hash) != existing.content_hash
    }

    async fn compile(
        gpu: &GpuContext,
        key: &Self::Key,
        desc: Self::Descriptor,
        _map: &ProgramMap,
    ) -> Self::Output {
        let content_hash = desc.image.as_ref().map(ImageData::content_hash);

        let Some(image) = &desc.image else {
            log::debug!("texture {key}: no image payload, skipping allocation");
            return CompiledTexture {
                texture: None,
                view: None,
                content_hash,
            };
        };

        let rgba = match image::load_from_memory(image.bytes()) {
            Ok(decoded) => decoded.to_rgba8(),
            Err(error) => {
                log::warn!("texture {key}: image decode failed: {error}");
                return CompiledTexture {
                    texture: None,
                    view: None,
                    content_hash,
                };
            }
        };
        let (width, height) = rgba.dimensions();
        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };

        let scope = gpu.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let texture = gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(key.as_str()),
            size,
            mip_level_count: desc.mip_level_count,
            sample_count: desc.sample_count,
            dimension: wgpu::TextureDimension::D2,
            format: desc.format,
            usage: desc.usage | wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        gpu.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &rgba,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * width),
                rows_per_image: Some(height),
            },
            size,
        );
        match scope.pop().await {
            None => {
                let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
                CompiledTexture {
                    texture: Some(texture),
                    view: Some(view),
                    content_hash,
                }
            }
            Some(error) => {
                log::warn!("texture {key}: creation rejected: {error}");
                CompiledTexture {
                    texture: None,
                    view: None,
                    content_hash,
                }
            }
        }
    }
}
