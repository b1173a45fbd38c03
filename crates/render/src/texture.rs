use serde::Serialize;

use crate::backend::{GraphicsBackend, RenderError, TextureHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TextureFormat {
    Rgba8,
    Rg16F,
    Depth32F,
    Depth16,
}

impl TextureFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            TextureFormat::Rgba8 | TextureFormat::Depth32F => 4,
            TextureFormat::Rg16F => 4,
            TextureFormat::Depth16 => 2,
        }
    }

    pub fn is_depth(self) -> bool {
        matches!(self, TextureFormat::Depth32F | TextureFormat::Depth16)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TextureKind {
    D2,
    Cube,
}

impl TextureKind {
    pub fn layers(self) -> usize {
        match self {
            TextureKind::D2 => 1,
            TextureKind::Cube => 6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextureDesc {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub kind: TextureKind,
}

impl TextureDesc {
    pub fn new_2d(label: impl Into<String>, width: u32, height: u32, format: TextureFormat) -> Self {
        Self {
            label: label.into(),
            width,
            height,
            format,
            kind: TextureKind::D2,
        }
    }

    pub fn new_cube(label: impl Into<String>, size: u32, format: TextureFormat) -> Self {
        Self {
            label: label.into(),
            width: size,
            height: size,
            format,
            kind: TextureKind::Cube,
        }
    }

    /// Size of the initial data for every layer.
    pub fn byte_len(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_pixel() * self.kind.layers()
    }
}

/// A sampled texture and the description it was created with.
///
/// Shared between materials through `Arc`. The handle stays valid until
/// [`Texture::destroy`] runs or the backend drops it.
#[derive(Debug, PartialEq)]
pub struct Texture {
    handle: TextureHandle,
    desc: TextureDesc,
}

impl Texture {
    pub fn new(
        backend: &mut dyn GraphicsBackend,
        desc: TextureDesc,
        data: Option<&[u8]>,
    ) -> Result<Self, RenderError> {
        if let Some(data) = data {
            if data.len() != desc.byte_len() {
                return Err(RenderError::TextureData {
                    label: desc.label.clone(),
                    expected: desc.byte_len(),
                    actual: data.len(),
                });
            }
        }
        let handle = backend.create_texture(&desc, data)?;
        tracing::debug!(
            "created texture `{}` {}x{} {:?}",
            desc.label,
            desc.width,
            desc.height,
            desc.kind
        );
        Ok(Self { handle, desc })
    }

    /// 1x1 RGBA8 texture filled with one color.
    pub fn solid(
        backend: &mut dyn GraphicsBackend,
        label: impl Into<String>,
        rgba: [u8; 4],
    ) -> Result<Self, RenderError> {
        let desc = TextureDesc::new_2d(label, 1, 1, TextureFormat::Rgba8);
        Self::new(backend, desc, Some(&rgba))
    }

    pub fn handle(&self) -> TextureHandle {
        self.handle
    }

    pub fn desc(&self) -> &TextureDesc {
        &self.desc
    }

    pub fn destroy(self, backend: &mut dyn GraphicsBackend) {
        backend.destroy_texture(self.handle);
    }
}
