use glam::{Mat3, Mat4, Vec2, Vec3, Vec4};
use serde::Serialize;

use crate::mesh::VertexLayout;
use crate::state::RenderState;
use crate::texture::{TextureDesc, TextureFormat};

/// Vertex or index buffer owned by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct BufferHandle(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TextureHandle(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct FramebufferHandle(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ProgramHandle(pub u32);

/// View recorded during the current frame. Ids restart at zero every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ViewId(pub u16);

/// Built-in shader programs. The backend owns their source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ProgramKind {
    /// Writes the four geometry color attachments and depth.
    Geometry,
    /// Depth only, from the light.
    Shadow,
    /// Environment cubemap behind the scene.
    Sky,
    /// Presents one color texture to the backbuffer.
    ToneMap,
    /// Presents a depth texture as linear grey.
    DepthView,
}

/// What the backend can do differently from its peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Capabilities {
    /// Clip space depth is `-1..1` instead of `0..1`.
    pub homogeneous_depth: bool,
    /// Texture coordinate origin is the bottom left corner.
    pub origin_bottom_left: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FramebufferDesc {
    pub label: String,
    pub width: u32,
    pub height: u32,
    /// Color attachments, addressed by position.
    pub color_formats: Vec<TextureFormat>,
    /// Depth attachment, addressed after the last color attachment.
    pub depth_format: Option<TextureFormat>,
}

impl FramebufferDesc {
    pub fn attachment_count(&self) -> usize {
        self.color_formats.len() + usize::from(self.depth_format.is_some())
    }
}

/// Where a view renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ViewTarget {
    /// The swap surface.
    Backbuffer,
    /// Every attachment of a framebuffer.
    Framebuffer(FramebufferHandle),
    /// One color attachment of a framebuffer plus that framebuffer's depth.
    Composite {
        framebuffer: FramebufferHandle,
        color: usize,
    },
}

/// Per-view clear values. `None` keeps existing contents.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Clear {
    pub color: Option<[f32; 4]>,
    pub depth: Option<f32>,
}

impl Clear {
    pub const LOAD: Clear = Clear {
        color: None,
        depth: None,
    };
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewDesc {
    pub name: &'static str,
    pub target: ViewTarget,
    /// Viewport size in pixels, origin top left.
    pub rect: (u32, u32),
    pub clear: Clear,
    pub view: Mat4,
    pub proj: Mat4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TextureBinding {
    pub stage: u8,
    pub texture: TextureHandle,
}

/// Material uniforms for [`ProgramKind::Geometry`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeometryUniforms {
    pub normal_matrix: Mat3,
    pub base_color_factor: Vec4,
    /// `(metallic, roughness, normal_scale, occlusion_strength)`.
    pub factors: Vec4,
    pub emissive_factor: Vec3,
    /// Bit `n` set when sampler stage `n` holds a real texture.
    pub has_textures: u32,
    /// Direction light travels, world space.
    pub light_direction: Vec3,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkyUniforms {
    /// Columns are camera right, up and forward.
    pub basis: Mat3,
    /// `tan(fov / 2) * aspect` and `tan(fov / 2)`.
    pub tan_half_fov: Vec2,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToneUniforms {
    pub exposure: f32,
    /// 0 regular, 1 decode octahedral normal, 2 raw channels, 3 depth.
    pub mode: u32,
    pub near: f32,
    pub far: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum DrawUniforms {
    #[default]
    None,
    Geometry(GeometryUniforms),
    Sky(SkyUniforms),
    Tone(ToneUniforms),
}

/// One draw submitted into a view.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawCall {
    pub program: ProgramHandle,
    pub state: RenderState,
    pub transform: Mat4,
    pub vertex_buffer: BufferHandle,
    pub index_buffer: Option<BufferHandle>,
    /// Index count when indexed, vertex count otherwise.
    pub count: u32,
    pub textures: Vec<TextureBinding>,
    pub uniforms: DrawUniforms,
}

impl DrawCall {
    pub fn texture_at(&self, stage: u8) -> Option<TextureHandle> {
        self.textures
            .iter()
            .find(|b| b.stage == stage)
            .map(|b| b.texture)
    }
}

/// Errors surfaced by backends and resource constructors.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("invalid {kind} handle {id}")]
    InvalidHandle { kind: &'static str, id: u32 },
    #[error("mesh `{label}`: {reason}")]
    InvalidMesh { label: String, reason: String },
    #[error("texture `{label}`: expected {expected} bytes of data, got {actual}")]
    TextureData {
        label: String,
        expected: usize,
        actual: usize,
    },
    #[error("submesh index {index} out of range ({count} submeshes)")]
    SubMeshOutOfRange { index: usize, count: usize },
    #[error("backend initialization failed: {0}")]
    Init(String),
    #[error("backend error: {0}")]
    Backend(String),
}

/// Low-level graphics device used by every pass.
///
/// Commands submitted between two [`frame`](GraphicsBackend::frame) calls
/// execute in view order, and within a view in submission order.
pub trait GraphicsBackend {
    fn capabilities(&self) -> Capabilities;

    /// Start recording a frame. Views and draws left over from a frame
    /// that never reached [`frame`](GraphicsBackend::frame) are dropped.
    fn begin_frame(&mut self);

    /// Resize the swap surface.
    fn reset(&mut self, width: u32, height: u32);

    fn create_vertex_buffer(
        &mut self,
        label: &str,
        layout: VertexLayout,
        data: &[u8],
    ) -> Result<BufferHandle, RenderError>;

    fn create_index_buffer(
        &mut self,
        label: &str,
        indices: &[u32],
    ) -> Result<BufferHandle, RenderError>;

    fn destroy_buffer(&mut self, handle: BufferHandle);

    /// Cube textures take six faces back to back in `+X -X +Y -Y +Z -Z` order.
    fn create_texture(
        &mut self,
        desc: &TextureDesc,
        data: Option<&[u8]>,
    ) -> Result<TextureHandle, RenderError>;

    fn destroy_texture(&mut self, handle: TextureHandle);

    fn is_valid_texture(&self, handle: TextureHandle) -> bool;

    fn create_framebuffer(
        &mut self,
        desc: &FramebufferDesc,
    ) -> Result<FramebufferHandle, RenderError>;

    /// Sampleable texture behind attachment `index`, depth last.
    fn framebuffer_texture(&self, handle: FramebufferHandle, index: usize)
    -> Option<TextureHandle>;

    /// Destroys the framebuffer and its attachment textures.
    fn destroy_framebuffer(&mut self, handle: FramebufferHandle);

    fn create_program(&mut self, kind: ProgramKind) -> Result<ProgramHandle, RenderError>;

    fn begin_view(&mut self, desc: &ViewDesc) -> ViewId;

    fn submit(&mut self, view: ViewId, draw: &DrawCall);

    /// Paint the debug overlay on top of everything recorded so far.
    fn submit_overlay(&mut self) {}

    /// Execute the recorded views and present.
    fn frame(&mut self) -> Result<(), RenderError>;
}
