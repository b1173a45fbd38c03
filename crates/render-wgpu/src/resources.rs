use std::collections::HashMap;

use prism_render::{
    FramebufferDesc, RenderError, TextureDesc, TextureFormat, TextureHandle, TextureKind,
    VertexLayout,
};

/// Map a backend-neutral format onto wgpu.
pub fn texture_format(format: TextureFormat) -> wgpu::TextureFormat {
    match format {
        TextureFormat::Rgba8 => wgpu::TextureFormat::Rgba8Unorm,
        TextureFormat::Rg16F => wgpu::TextureFormat::Rg16Float,
        TextureFormat::Depth32F => wgpu::TextureFormat::Depth32Float,
        TextureFormat::Depth16 => wgpu::TextureFormat::Depth16Unorm,
    }
}

/// Handle-indexed storage. Ids come from the backend's shared counter.
#[derive(Debug)]
pub struct Slots<T> {
    items: HashMap<u32, T>,
}

impl<T> Default for Slots<T> {
    fn default() -> Self {
        Self {
            items: HashMap::new(),
        }
    }
}

impl<T> Slots<T> {
    pub fn insert(&mut self, id: u32, item: T) {
        self.items.insert(id, item);
    }

    pub fn get(&self, id: u32) -> Option<&T> {
        self.items.get(&id)
    }

    pub fn remove(&mut self, id: u32) -> Option<T> {
        self.items.remove(&id)
    }

    pub fn contains(&self, id: u32) -> bool {
        self.items.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }
}

pub struct GpuBuffer {
    pub buffer: wgpu::Buffer,
    pub layout: Option<VertexLayout>,
}

pub struct GpuTexture {
    pub texture: wgpu::Texture,
    /// Sampling view; cube textures get a cube view.
    pub view: wgpu::TextureView,
    pub desc: TextureDesc,
}

impl GpuTexture {
    pub fn create(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        desc: &TextureDesc,
        data: Option<&[u8]>,
        render_target: bool,
    ) -> Result<Self, RenderError> {
        if desc.width == 0 || desc.height == 0 {
            return Err(RenderError::Backend(format!(
                "texture `{}` has zero size",
                desc.label
            )));
        }
        if let Some(bytes) = data {
            if desc.format.is_depth() {
                return Err(RenderError::Backend(format!(
                    "depth texture `{}` cannot take initial data",
                    desc.label
                )));
            }
            if bytes.len() != desc.byte_len() {
                return Err(RenderError::TextureData {
                    label: desc.label.clone(),
                    expected: desc.byte_len(),
                    actual: bytes.len(),
                });
            }
        }
        let layers = desc.kind.layers() as u32;
        let size = wgpu::Extent3d {
            width: desc.width,
            height: desc.height,
            depth_or_array_layers: layers,
        };
        let mut usage = wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST;
        if render_target {
            usage |= wgpu::TextureUsages::RENDER_ATTACHMENT;
        }
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&desc.label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: texture_format(desc.format),
            usage,
            view_formats: &[],
        });

        if let Some(bytes) = data {
            let bpp = desc.format.bytes_per_pixel() as u32;
            queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture: &texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                bytes,
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(desc.width * bpp),
                    rows_per_image: Some(desc.height),
                },
                size,
            );
        }

        let dimension = match desc.kind {
            TextureKind::D2 => wgpu::TextureViewDimension::D2,
            TextureKind::Cube => wgpu::TextureViewDimension::Cube,
        };
        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(&desc.label),
            dimension: Some(dimension),
            ..Default::default()
        });
        Ok(Self {
            texture,
            view,
            desc: desc.clone(),
        })
    }
}

/// Framebuffer attachments live in the texture table, colors first.
pub struct GpuFramebuffer {
    pub desc: FramebufferDesc,
    pub attachments: Vec<TextureHandle>,
}

impl GpuFramebuffer {
    pub fn color(&self, index: usize) -> Option<TextureHandle> {
        if index < self.desc.color_formats.len() {
            self.attachments.get(index).copied()
        } else {
            None
        }
    }

    pub fn depth(&self) -> Option<TextureHandle> {
        self.desc
            .depth_format
            .and_then(|_| self.attachments.last().copied())
    }

    pub fn color_formats(&self) -> Vec<wgpu::TextureFormat> {
        self.desc
            .color_formats
            .iter()
            .map(|f| texture_format(*f))
            .collect()
    }

    pub fn depth_format(&self) -> Option<wgpu::TextureFormat> {
        self.desc.depth_format.map(texture_format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_map_to_sampleable_wgpu_formats() {
        assert_eq!(
            texture_format(TextureFormat::Rg16F),
            wgpu::TextureFormat::Rg16Float
        );
        assert!(texture_format(TextureFormat::Depth32F).has_depth_aspect());
        assert!(!texture_format(TextureFormat::Rgba8).has_depth_aspect());
    }

    #[test]
    fn slots_track_live_entries() {
        let mut slots = Slots::default();
        slots.insert(3, "a");
        slots.insert(5, "b");
        assert_eq!(slots.len(), 2);
        assert_eq!(slots.remove(3), Some("a"));
        assert!(!slots.contains(3));
        assert_eq!(slots.get(5), Some(&"b"));
    }

    #[test]
    fn framebuffer_addresses_depth_last() {
        let fb = GpuFramebuffer {
            desc: FramebufferDesc {
                label: "fb".into(),
                width: 1,
                height: 1,
                color_formats: vec![TextureFormat::Rgba8, TextureFormat::Rg16F],
                depth_format: Some(TextureFormat::Depth32F),
            },
            attachments: vec![TextureHandle(1), TextureHandle(2), TextureHandle(3)],
        };
        assert_eq!(fb.color(1), Some(TextureHandle(2)));
        assert_eq!(fb.color(2), None);
        assert_eq!(fb.depth(), Some(TextureHandle(3)));
        assert_eq!(
            fb.color_formats(),
            vec![wgpu::TextureFormat::Rgba8Unorm, wgpu::TextureFormat::Rg16Float]
        );
    }
}
