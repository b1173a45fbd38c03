use glam::{Mat3, Mat4, Vec2, Vec3};
use prism_common::FrameSamples;
use prism_render::{
    BufferHandle, Clear, ColorWrite, DepthTest, DrawCall, DrawUniforms, FramebufferHandle,
    GraphicsBackend, ProgramHandle, ProgramKind, RenderError, RenderState, SkyUniforms,
    TextureBinding, VertexLayout, ViewDesc, ViewTarget, primitives,
};
use prism_scene::{Environment, Projection, World};

use crate::frame::FrameState;
use crate::gbuffer::GBufferAttachment;

/// Rotation-only camera basis with columns right, up, forward.
///
/// Right-handed, matching the view matrix: `right = forward x up`.
pub fn sky_basis(forward: Vec3) -> Mat3 {
    let forward = forward.normalize_or_zero();
    let forward = if forward == Vec3::ZERO { Vec3::Z } else { forward };
    let reference = if forward.cross(Vec3::Y).length_squared() < 1e-6 {
        Vec3::Z
    } else {
        Vec3::Y
    };
    let right = forward.cross(reference).normalize();
    let up = right.cross(forward);
    Mat3::from_cols(right, up, forward)
}

/// Environment background, drawn only where the geometry pass left the
/// cleared far depth.
pub struct SkyPass {
    vertex_buffer: BufferHandle,
    program: ProgramHandle,
    samples: FrameSamples,
}

impl SkyPass {
    /// Depth equal against the far plane, never writing depth.
    pub const STATE: RenderState = RenderState {
        color_write: ColorWrite::Rgb,
        depth_write: false,
        depth_test: Some(DepthTest::Equal),
        blend: None,
        cull: None,
    };

    pub fn new(backend: &mut dyn GraphicsBackend) -> Result<Self, RenderError> {
        let triangle = primitives::fullscreen_triangle(1.0);
        let vertex_buffer = backend.create_vertex_buffer(
            "sky-triangle",
            VertexLayout::Position,
            bytemuck::cast_slice(&triangle),
        )?;
        Ok(Self {
            vertex_buffer,
            program: backend.create_program(ProgramKind::Sky)?,
            samples: FrameSamples::new(),
        })
    }

    /// Composite the sky cubemap behind the geometry buffer contents.
    /// Records nothing when the world has no live sky texture.
    pub fn render(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        frame: &FrameState,
        world: &World,
        gbuffer: FramebufferHandle,
    ) -> Result<(), RenderError> {
        let _span = tracing::debug_span!("sky_pass").entered();
        self.samples.begin();
        self.record(backend, frame, world, gbuffer);
        self.samples.end();
        Ok(())
    }

    fn record(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        frame: &FrameState,
        world: &World,
        gbuffer: FramebufferHandle,
    ) {
        let Some(sky) = world.environment(Environment::Sky) else {
            return;
        };
        if !backend.is_valid_texture(sky.handle()) {
            tracing::warn!("sky texture {:?} is no longer valid", sky.handle());
            return;
        }

        let ray_spread = ray_spread(frame);
        let view = backend.begin_view(&ViewDesc {
            name: "sky",
            target: ViewTarget::Composite {
                framebuffer: gbuffer,
                color: GBufferAttachment::DiffuseRoughness.index(),
            },
            rect: frame.size(),
            clear: Clear::LOAD,
            view: Mat4::IDENTITY,
            proj: Mat4::IDENTITY,
        });
        backend.submit(
            view,
            &DrawCall {
                program: self.program,
                state: Self::STATE,
                transform: Mat4::IDENTITY,
                vertex_buffer: self.vertex_buffer,
                index_buffer: None,
                count: 3,
                textures: vec![TextureBinding {
                    stage: 0,
                    texture: sky.handle(),
                }],
                uniforms: DrawUniforms::Sky(SkyUniforms {
                    basis: sky_basis(frame.camera_forward),
                    tan_half_fov: ray_spread,
                }),
            },
        );
    }

    pub fn samples(&self) -> &FrameSamples {
        &self.samples
    }

    pub fn destroy(self, backend: &mut dyn GraphicsBackend) {
        backend.destroy_buffer(self.vertex_buffer);
    }
}

/// Per-axis tangent of the half view angle. Orthographic rays are all
/// parallel to the view direction, so the spread is zero.
fn ray_spread(frame: &FrameState) -> Vec2 {
    match frame.projection {
        Projection::Perspective => {
            let tan_half = (frame.fov_degrees.to_radians() * 0.5).tan();
            Vec2::new(tan_half * frame.aspect(), tan_half)
        }
        Projection::Orthographic => Vec2::ZERO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prism_render::{RecordingBackend, Texture, TextureDesc, TextureFormat};
    use std::sync::Arc;

    fn sky_world(backend: &mut RecordingBackend) -> World {
        let desc = TextureDesc::new_cube("sky", 1, TextureFormat::Rgba8);
        let tex = Texture::new(backend, desc, Some(&[0u8; 24])).unwrap();
        let mut world = World::new();
        world.set_environment(Environment::Sky, Some(Arc::new(tex)));
        world
    }

    #[test]
    fn basis_is_orthonormal_and_right_handed() {
        for fwd in [Vec3::Z, Vec3::new(0.3, 0.2, -0.9), Vec3::NEG_X] {
            let b = sky_basis(fwd);
            assert!((b.z_axis - fwd.normalize()).length() < 1e-5);
            assert!(b.x_axis.dot(b.y_axis).abs() < 1e-5);
            assert!(b.x_axis.dot(b.z_axis).abs() < 1e-5);
            assert!((b.determinant().abs() - 1.0).abs() < 1e-4);
            assert!(b.y_axis.y > 0.0);
        }
        // looking down +Z in a right-handed frame puts -X on the right
        assert!((sky_basis(Vec3::Z).x_axis - Vec3::NEG_X).length() < 1e-6);
    }

    #[test]
    fn basis_ignores_camera_position() {
        // only the direction reaches the basis; there is no translation column
        let b = sky_basis(Vec3::new(0.0, 0.0, 10.0));
        assert_eq!(b, sky_basis(Vec3::Z));
    }

    #[test]
    fn vertical_forward_is_handled() {
        let b = sky_basis(Vec3::Y);
        assert!(b.x_axis.is_finite() && b.y_axis.is_finite());
        assert!((b.x_axis.length() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn draws_triangle_with_depth_equal_and_no_depth_write() {
        let mut backend = RecordingBackend::new();
        let world = sky_world(&mut backend);
        let mut pass = SkyPass::new(&mut backend).unwrap();
        let gbuffer = FramebufferHandle(99);
        pass.render(&mut backend, &FrameState::new(16, 9), &world, gbuffer)
            .unwrap();

        let draws = backend.draws_in("sky");
        assert_eq!(draws.len(), 1);
        let draw = draws[0];
        assert_eq!(draw.count, 3);
        assert!(draw.index_buffer.is_none());
        assert!(!draw.state.depth_write);
        assert_eq!(draw.state.depth_test, Some(DepthTest::Equal));

        let (_, view) = backend.views()[0];
        assert_eq!(view.clear, Clear::LOAD);
        assert_eq!(
            view.target,
            ViewTarget::Composite {
                framebuffer: gbuffer,
                color: 0
            }
        );
    }

    #[test]
    fn triangle_sits_on_far_plane() {
        let tri = primitives::fullscreen_triangle(1.0);
        assert!(tri.iter().all(|v| v[2] == 1.0));
        let bytes: &[u8] = bytemuck::cast_slice(&tri);
        assert_eq!(bytes.len(), 36);
    }

    #[test]
    fn orthographic_frame_samples_only_the_view_direction() {
        let mut backend = RecordingBackend::new();
        let world = sky_world(&mut backend);
        let mut pass = SkyPass::new(&mut backend).unwrap();
        let mut frame = FrameState::new(16, 9);
        let gbuffer = FramebufferHandle(99);

        pass.render(&mut backend, &frame, &world, gbuffer).unwrap();
        frame.projection = Projection::Orthographic;
        pass.render(&mut backend, &frame, &world, gbuffer).unwrap();

        let spreads: Vec<Vec2> = backend
            .draws_in("sky")
            .iter()
            .filter_map(|d| match &d.uniforms {
                DrawUniforms::Sky(u) => Some(u.tan_half_fov),
                _ => None,
            })
            .collect();
        assert_eq!(spreads.len(), 2);
        let tan_half = (70.0f32.to_radians() * 0.5).tan();
        assert!((spreads[0].y - tan_half).abs() < 1e-6);
        assert!((spreads[0].x - tan_half * 16.0 / 9.0).abs() < 1e-5);
        assert_eq!(spreads[1], Vec2::ZERO);
    }

    #[test]
    fn missing_sky_records_nothing() {
        let mut backend = RecordingBackend::new();
        let mut pass = SkyPass::new(&mut backend).unwrap();
        pass.render(&mut backend, &FrameState::new(8, 8), &World::new(), FramebufferHandle(1))
            .unwrap();
        assert!(backend.views().is_empty());
        assert_eq!(pass.samples().len(), 1);
    }
}
