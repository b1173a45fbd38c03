//! Multi-pass render pipeline.
//!
//! # Invariants
//! - Passes run in a fixed order every frame: geometry, shadow, sky, tone,
//!   then the optional overlay.
//! - Viewport-sized resources are recreated only when a pass observes a new
//!   reset epoch, and never while a pass is recording.
//! - Every view and projection matrix is right-handed.
//!
//! The shading here is the forward variant: the geometry pass lights
//! attachment 0 directly, the shadow map is produced and exposed but no
//! lighting stage consumes it yet.

mod frame;
mod gbuffer;
mod geometry;
mod renderer;
mod shadow;
mod sky;
mod tone;

pub use frame::{EpochTracker, FixedWindow, FrameState, WindowState};
pub use gbuffer::GBufferAttachment;
pub use geometry::{GeometryPass, MaterialBinding, normal_matrix};
pub use renderer::{PassTiming, Renderer, RendererStats};
pub use shadow::{LightView, SHADOW_FAR, SHADOW_HALF_EXTENT, SHADOW_NEAR, ShadowPass};
pub use sky::{SkyPass, sky_basis};
pub use tone::TonePass;

pub fn crate_info() -> &'static str {
    "prism-pipeline v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("pipeline"));
    }
}
