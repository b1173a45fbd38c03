//! wgpu implementation of the prism graphics backend.
//!
//! Every [`prism_render::ProgramKind`] has a WGSL program in [`shaders`].
//! Pipelines are built on first use for each combination of program, render
//! state and target formats.
//!
//! # Invariants
//! - Per-draw uniforms live in one buffer addressed by dynamic offsets.
//! - The egui overlay is painted after every pipeline view, only when the
//!   renderer submits the overlay slot.

mod gpu;
mod overlay;
mod pipelines;
mod resources;
pub mod shaders;

pub use gpu::WgpuBackend;
pub use overlay::OverlayFrame;
