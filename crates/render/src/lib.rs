//! Rendering interface: everything a render pass needs from a graphics backend.
//!
//! # Invariants
//! - Passes talk to the GPU only through [`GraphicsBackend`].
//! - Handles are plain ids; ownership lives with the type that created them
//!   ([`Mesh`], [`Texture`], or the pass that built a framebuffer).
//! - A [`Mesh`] vertex buffer never changes after construction.
//!
//! [`RecordingBackend`] implements the interface without a GPU. It records
//! every command so callers can inspect exactly what a frame submitted.

mod backend;
mod material;
mod mesh;
pub mod primitives;
mod recording;
mod state;
mod texture;

pub use backend::{
    BufferHandle, Capabilities, Clear, DrawCall, DrawUniforms, FramebufferDesc,
    FramebufferHandle, GeometryUniforms, GraphicsBackend, ProgramHandle, ProgramKind,
    RenderError, SkyUniforms, TextureBinding, TextureHandle, ToneUniforms, ViewDesc, ViewId,
    ViewTarget,
};
pub use material::{Material, TextureSlot};
pub use mesh::{Mesh, SubMesh, Vertex, VertexLayout};
pub use recording::{Command, RecordingBackend};
pub use state::{BlendMode, ColorWrite, CullFace, DepthTest, RenderState};
pub use texture::{Texture, TextureDesc, TextureFormat, TextureKind};

pub fn crate_info() -> &'static str {
    "prism-render v0.1.0"
}
