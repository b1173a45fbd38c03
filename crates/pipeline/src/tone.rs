use glam::Mat4;
use prism_common::{DebugBuffer, FrameSamples};
use prism_render::{
    BufferHandle, Clear, DrawCall, DrawUniforms, GraphicsBackend, ProgramHandle, ProgramKind,
    RenderError, RenderState, TextureBinding, ToneUniforms, VertexLayout, ViewDesc, ViewTarget,
    primitives,
};

use crate::frame::{EpochTracker, FrameState};
use crate::gbuffer::GBufferAttachment;
use crate::geometry::GeometryPass;

const MODE_SHADED: u32 = 0;
const MODE_NORMAL: u32 = 1;
const MODE_RAW: u32 = 2;
const MODE_DEPTH: u32 = 3;

/// Resolves a geometry buffer attachment into the backbuffer.
pub struct TonePass {
    epoch: EpochTracker,
    vertex_buffer: Option<BufferHandle>,
    program: ProgramHandle,
    depth_program: ProgramHandle,
    samples: FrameSamples,
    recreations: u64,
}

impl TonePass {
    pub fn new(backend: &mut dyn GraphicsBackend) -> Result<Self, RenderError> {
        Ok(Self {
            epoch: EpochTracker::default(),
            vertex_buffer: None,
            program: backend.create_program(ProgramKind::ToneMap)?,
            depth_program: backend.create_program(ProgramKind::DepthView)?,
            samples: FrameSamples::new(),
            recreations: 0,
        })
    }

    /// Attachment sampled and shader mode for a debug selection.
    pub fn source(debug: DebugBuffer) -> (GBufferAttachment, u32) {
        match GBufferAttachment::for_debug(debug) {
            None => (GBufferAttachment::DiffuseRoughness, MODE_SHADED),
            Some(GBufferAttachment::Normal) => (GBufferAttachment::Normal, MODE_NORMAL),
            Some(GBufferAttachment::Depth) => (GBufferAttachment::Depth, MODE_DEPTH),
            Some(other) => (other, MODE_RAW),
        }
    }

    pub fn render(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        frame: &FrameState,
        geometry: &GeometryPass,
        debug: DebugBuffer,
        exposure: f32,
    ) -> Result<(), RenderError> {
        let _span = tracing::debug_span!("tone_pass").entered();
        self.samples.begin();
        let result = self.record(backend, frame, geometry, debug, exposure);
        self.samples.end();
        result
    }

    fn record(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        frame: &FrameState,
        geometry: &GeometryPass,
        debug: DebugBuffer,
        exposure: f32,
    ) -> Result<(), RenderError> {
        let vertex_buffer = self.ensure_vertex_buffer(backend, frame)?;
        let (attachment, mode) = Self::source(debug);
        let Some(texture) = geometry.attachment(&*backend, attachment) else {
            tracing::warn!("tone pass skipped: geometry buffer has no {:?}", attachment);
            return Ok(());
        };
        let program = if mode == MODE_DEPTH {
            self.depth_program
        } else {
            self.program
        };

        let view = backend.begin_view(&ViewDesc {
            name: "tone",
            target: ViewTarget::Backbuffer,
            rect: frame.size(),
            clear: Clear {
                color: Some([0.0, 0.0, 0.0, 1.0]),
                depth: None,
            },
            view: Mat4::IDENTITY,
            proj: Mat4::IDENTITY,
        });
        backend.submit(
            view,
            &DrawCall {
                program,
                state: RenderState::FULLSCREEN,
                transform: Mat4::IDENTITY,
                vertex_buffer,
                index_buffer: None,
                count: 3,
                textures: vec![TextureBinding { stage: 0, texture }],
                uniforms: DrawUniforms::Tone(ToneUniforms {
                    exposure,
                    mode,
                    near: frame.near,
                    far: frame.far,
                }),
            },
        );
        Ok(())
    }

    fn ensure_vertex_buffer(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        frame: &FrameState,
    ) -> Result<BufferHandle, RenderError> {
        let stale = self.epoch.observe(frame);
        if let (false, Some(vb)) = (stale, self.vertex_buffer) {
            return Ok(vb);
        }
        if let Some(old) = self.vertex_buffer.take() {
            backend.destroy_buffer(old);
        }
        let triangle = primitives::fullscreen_triangle(0.0);
        let vb = backend.create_vertex_buffer(
            "tone-triangle",
            VertexLayout::Position,
            bytemuck::cast_slice(&triangle),
        )?;
        tracing::debug!("tone triangle recreated (epoch {})", frame.reset_epoch());
        self.vertex_buffer = Some(vb);
        self.recreations += 1;
        Ok(vb)
    }

    pub fn samples(&self) -> &FrameSamples {
        &self.samples
    }

    pub fn recreation_count(&self) -> u64 {
        self.recreations
    }

    pub fn destroy(self, backend: &mut dyn GraphicsBackend) {
        if let Some(vb) = self.vertex_buffer {
            backend.destroy_buffer(vb);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prism_render::{ColorWrite, RecordingBackend};
    use prism_scene::World;

    fn rendered_geometry(backend: &mut RecordingBackend, frame: &FrameState) -> GeometryPass {
        let mut geometry = GeometryPass::new(backend, [0.0; 4]).unwrap();
        geometry.render(backend, frame, &World::new()).unwrap();
        geometry
    }

    #[test]
    fn samples_color_attachment_zero_by_default() {
        let mut backend = RecordingBackend::new();
        let frame = FrameState::new(32, 32);
        let geometry = rendered_geometry(&mut backend, &frame);
        let mut tone = TonePass::new(&mut backend).unwrap();
        tone.render(&mut backend, &frame, &geometry, DebugBuffer::None, 1.0)
            .unwrap();

        let draws = backend.draws_in("tone");
        assert_eq!(draws.len(), 1);
        let expected = geometry
            .attachment(&backend, GBufferAttachment::DiffuseRoughness)
            .unwrap();
        assert_eq!(draws[0].texture_at(0), Some(expected));
        assert_eq!(draws[0].state.color_write, ColorWrite::Rgb);
        assert!(draws[0].state.depth_test.is_none());
        assert!(!draws[0].state.depth_write);
        let (_, view) = backend.views().last().copied().unwrap();
        assert_eq!(view.target, ViewTarget::Backbuffer);
    }

    #[test]
    fn depth_debug_uses_depth_program() {
        let mut backend = RecordingBackend::new();
        let frame = FrameState::new(32, 32);
        let geometry = rendered_geometry(&mut backend, &frame);
        let mut tone = TonePass::new(&mut backend).unwrap();
        tone.render(&mut backend, &frame, &geometry, DebugBuffer::Depth, 1.0)
            .unwrap();

        let draw = backend.draws_in("tone")[0].clone();
        assert_eq!(backend.program_kind(draw.program), Some(ProgramKind::DepthView));
        assert_eq!(
            draw.texture_at(0),
            geometry.attachment(&backend, GBufferAttachment::Depth)
        );
    }

    #[test]
    fn debug_sources() {
        assert_eq!(
            TonePass::source(DebugBuffer::Normal),
            (GBufferAttachment::Normal, MODE_NORMAL)
        );
        assert_eq!(
            TonePass::source(DebugBuffer::FresnelMetallic),
            (GBufferAttachment::FresnelMetallic, MODE_RAW)
        );
        assert_eq!(
            TonePass::source(DebugBuffer::None),
            (GBufferAttachment::DiffuseRoughness, MODE_SHADED)
        );
    }

    #[test]
    fn vertex_buffer_follows_epoch() {
        let mut backend = RecordingBackend::new();
        let mut frame = FrameState::new(32, 32);
        let mut geometry = rendered_geometry(&mut backend, &frame);
        let mut tone = TonePass::new(&mut backend).unwrap();
        tone.render(&mut backend, &frame, &geometry, DebugBuffer::None, 1.0)
            .unwrap();
        tone.render(&mut backend, &frame, &geometry, DebugBuffer::None, 1.0)
            .unwrap();
        assert_eq!(tone.recreation_count(), 1);

        frame.resize(64, 64);
        geometry.render(&mut backend, &frame, &World::new()).unwrap();
        tone.render(&mut backend, &frame, &geometry, DebugBuffer::None, 1.0)
            .unwrap();
        assert_eq!(tone.recreation_count(), 2);
    }
}
