use glam::{Mat3, Mat4};
use prism_common::FrameSamples;
use prism_render::{
    BlendMode, Clear, CullFace, DrawCall, DrawUniforms, FramebufferDesc, FramebufferHandle,
    GeometryUniforms, GraphicsBackend, Material, ProgramHandle, ProgramKind, RenderError,
    RenderState, Texture, TextureBinding, TextureHandle, TextureSlot, ViewDesc, ViewTarget,
};
use prism_scene::World;

use crate::frame::{EpochTracker, FrameState};
use crate::gbuffer::GBufferAttachment;

/// Cofactor matrix of the model's upper 3x3.
///
/// Equal to `det(M) * inverse(M)^T`, so it keeps normals perpendicular
/// under non-uniform scale without a full inverse. Shaders renormalize.
pub fn normal_matrix(model: &Mat4) -> Mat3 {
    let m = Mat3::from_mat4(*model);
    Mat3::from_cols(
        m.y_axis.cross(m.z_axis),
        m.z_axis.cross(m.x_axis),
        m.x_axis.cross(m.y_axis),
    )
}

/// Textures bound for one draw and the mask of which ones are real.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaterialBinding {
    /// Indexed by [`TextureSlot`].
    pub textures: [TextureHandle; TextureSlot::COUNT],
    pub mask: u32,
}

impl MaterialBinding {
    pub fn is_bound(&self, slot: TextureSlot) -> bool {
        self.mask & slot.bit() != 0
    }

    pub fn bindings(&self) -> Vec<TextureBinding> {
        TextureSlot::ALL
            .iter()
            .map(|slot| TextureBinding {
                stage: slot.stage(),
                texture: self.textures[*slot as usize],
            })
            .collect()
    }
}

/// Rasterizes every renderable entity into the geometry buffer.
pub struct GeometryPass {
    epoch: EpochTracker,
    framebuffer: Option<FramebufferHandle>,
    program: ProgramHandle,
    default_texture: Texture,
    default_material: Material,
    clear_color: [f32; 4],
    samples: FrameSamples,
    recreations: u64,
}

impl GeometryPass {
    pub fn new(backend: &mut dyn GraphicsBackend, clear_color: [f32; 4]) -> Result<Self, RenderError> {
        let program = backend.create_program(ProgramKind::Geometry)?;
        let default_texture = Texture::solid(backend, "default-white", [255; 4])?;
        Ok(Self {
            epoch: EpochTracker::default(),
            framebuffer: None,
            program,
            default_texture,
            default_material: Material::default(),
            clear_color,
            samples: FrameSamples::new(),
            recreations: 0,
        })
    }

    /// Bind each material texture that exists and is alive, else
    /// `fallback`. Bit `n` of the mask is set for real textures only.
    pub fn bind_material(
        backend: &dyn GraphicsBackend,
        material: &Material,
        fallback: TextureHandle,
    ) -> MaterialBinding {
        let mut binding = MaterialBinding {
            textures: [fallback; TextureSlot::COUNT],
            mask: 0,
        };
        for slot in TextureSlot::ALL {
            let live = material
                .texture(slot)
                .map(|t| t.handle())
                .filter(|h| backend.is_valid_texture(*h));
            if let Some(handle) = live {
                binding.textures[slot as usize] = handle;
                binding.mask |= slot.bit();
            }
        }
        binding
    }

    /// Depth test and write always; blending and culling follow the flags.
    pub fn render_state(material: &Material) -> RenderState {
        RenderState::OPAQUE
            .with_blend(material.blend.then_some(BlendMode::Alpha))
            .with_cull((!material.double_sided).then_some(CullFace::Back))
    }

    pub fn render(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        frame: &FrameState,
        world: &World,
    ) -> Result<(), RenderError> {
        let _span = tracing::debug_span!("geometry_pass").entered();
        self.samples.begin();
        let result = self.record(backend, frame, world);
        self.samples.end();
        result
    }

    fn record(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        frame: &FrameState,
        world: &World,
    ) -> Result<(), RenderError> {
        let fb = self.ensure_framebuffer(backend, frame)?;
        let view = backend.begin_view(&ViewDesc {
            name: "geometry",
            target: ViewTarget::Framebuffer(fb),
            rect: frame.size(),
            clear: Clear {
                color: Some(self.clear_color),
                depth: Some(1.0),
            },
            view: frame.view,
            proj: frame.proj,
        });

        let fallback = self.default_texture.handle();
        let light_direction = world.light_direction();
        let mut draws = 0u32;
        for entity in world.entities() {
            if entity.renderables().is_empty() {
                continue;
            }
            let model = entity.transform.matrix();
            let normal = normal_matrix(&model);
            for mesh in entity.renderables() {
                for sm in mesh.submeshes() {
                    let material = sm
                        .material()
                        .map(|m| m.as_ref())
                        .unwrap_or(&self.default_material);
                    let binding = Self::bind_material(&*backend, material, fallback);
                    let call = DrawCall {
                        program: self.program,
                        state: Self::render_state(material),
                        transform: model,
                        vertex_buffer: mesh.vertex_buffer(),
                        index_buffer: Some(sm.index_buffer()),
                        count: sm.index_count(),
                        textures: binding.bindings(),
                        uniforms: DrawUniforms::Geometry(GeometryUniforms {
                            normal_matrix: normal,
                            base_color_factor: material.base_color_factor,
                            factors: material.packed_factors(),
                            emissive_factor: material.emissive_factor,
                            has_textures: binding.mask,
                            light_direction,
                        }),
                    };
                    backend.submit(view, &call);
                    draws += 1;
                }
            }
        }
        tracing::trace!("geometry pass submitted {} draws", draws);
        Ok(())
    }

    fn ensure_framebuffer(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        frame: &FrameState,
    ) -> Result<FramebufferHandle, RenderError> {
        let stale = self.epoch.observe(frame);
        if let (false, Some(fb)) = (stale, self.framebuffer) {
            return Ok(fb);
        }
        if let Some(old) = self.framebuffer.take() {
            backend.destroy_framebuffer(old);
        }
        let desc = FramebufferDesc {
            label: "gbuffer".into(),
            width: frame.width(),
            height: frame.height(),
            color_formats: GBufferAttachment::COLORS.iter().map(|a| a.format()).collect(),
            depth_format: Some(GBufferAttachment::Depth.format()),
        };
        let fb = backend.create_framebuffer(&desc)?;
        tracing::debug!(
            "geometry buffer recreated at {}x{} (epoch {})",
            desc.width,
            desc.height,
            frame.reset_epoch()
        );
        self.framebuffer = Some(fb);
        self.recreations += 1;
        Ok(fb)
    }

    pub fn framebuffer(&self) -> Option<FramebufferHandle> {
        self.framebuffer
    }

    pub fn attachment(
        &self,
        backend: &dyn GraphicsBackend,
        attachment: GBufferAttachment,
    ) -> Option<TextureHandle> {
        backend.framebuffer_texture(self.framebuffer?, attachment.index())
    }

    pub fn default_texture(&self) -> TextureHandle {
        self.default_texture.handle()
    }

    pub fn samples(&self) -> &FrameSamples {
        &self.samples
    }

    /// Times the geometry buffer has been (re)created.
    pub fn recreation_count(&self) -> u64 {
        self.recreations
    }

    pub fn destroy(self, backend: &mut dyn GraphicsBackend) {
        if let Some(fb) = self.framebuffer {
            backend.destroy_framebuffer(fb);
        }
        self.default_texture.destroy(backend);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Quat, Vec3};
    use prism_render::{ColorWrite, DepthTest, RecordingBackend};
    use std::sync::Arc;

    fn texture(backend: &mut RecordingBackend, label: &str) -> Arc<Texture> {
        Arc::new(Texture::solid(backend, label, [10, 20, 30, 255]).unwrap())
    }

    #[test]
    fn normal_matrix_of_rotation_is_rotation() {
        let rot = Quat::from_euler(glam::EulerRot::YXZ, 0.7, -0.3, 1.1);
        let model = Mat4::from_quat(rot);
        let n = normal_matrix(&model);
        assert!(n.abs_diff_eq(Mat3::from_quat(rot), 1e-5));
    }

    #[test]
    fn normal_matrix_ignores_translation() {
        let model = Mat4::from_translation(Vec3::new(4.0, -2.0, 9.0));
        assert!(normal_matrix(&model).abs_diff_eq(Mat3::IDENTITY, 1e-6));
    }

    #[test]
    fn uniform_scale_only_scales_normals() {
        let rot = Quat::from_rotation_z(0.4);
        let model = Mat4::from_scale_rotation_translation(Vec3::splat(3.0), rot, Vec3::ZERO);
        let n = normal_matrix(&model);
        assert!((n * (1.0 / 9.0)).abs_diff_eq(Mat3::from_quat(rot), 1e-5));
    }

    #[test]
    fn non_uniform_scale_keeps_normals_perpendicular() {
        let model = Mat4::from_scale_rotation_translation(
            Vec3::new(4.0, 1.0, 0.5),
            Quat::from_rotation_y(0.6),
            Vec3::ZERO,
        );
        // a 45 degree slope: tangent and its normal in object space
        let tangent = Vec3::new(1.0, 1.0, 0.0);
        let normal = Vec3::new(-1.0, 1.0, 0.0);
        let t = model.transform_vector3(tangent);
        let n = normal_matrix(&model) * normal;
        assert!(t.dot(n).abs() < 1e-5);
        // the naive model transform does not keep it perpendicular
        assert!(t.dot(model.transform_vector3(normal)).abs() > 0.1);
    }

    #[test]
    fn bare_material_binds_default_everywhere() {
        let mut backend = RecordingBackend::new();
        let fallback = texture(&mut backend, "white").handle();
        let binding = GeometryPass::bind_material(&backend, &Material::default(), fallback);
        assert_eq!(binding.mask, 0);
        assert!(binding.textures.iter().all(|t| *t == fallback));
        let stages: Vec<u8> = binding.bindings().iter().map(|b| b.stage).collect();
        assert_eq!(stages, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn mask_bits_follow_slots() {
        let mut backend = RecordingBackend::new();
        let fallback = texture(&mut backend, "white").handle();
        let base = texture(&mut backend, "base");
        let emissive = texture(&mut backend, "emissive");
        let material = Material::default()
            .with_texture(TextureSlot::BaseColor, base.clone())
            .with_texture(TextureSlot::Emissive, emissive.clone());
        let binding = GeometryPass::bind_material(&backend, &material, fallback);
        assert_eq!(binding.mask, 0b100001);
        assert!(binding.is_bound(TextureSlot::BaseColor));
        assert!(!binding.is_bound(TextureSlot::Normal));
        assert_eq!(binding.textures[0], base.handle());
        assert_eq!(binding.textures[5], emissive.handle());
        assert_eq!(binding.textures[3], fallback);
    }

    #[test]
    fn dead_texture_is_substituted() {
        let mut backend = RecordingBackend::new();
        let fallback = texture(&mut backend, "white").handle();
        let normal = texture(&mut backend, "normal");
        let material = Material::default().with_texture(TextureSlot::Normal, normal.clone());
        backend.invalidate_texture(normal.handle());
        let binding = GeometryPass::bind_material(&backend, &material, fallback);
        assert_eq!(binding.mask, 0);
        assert_eq!(binding.textures[TextureSlot::Normal as usize], fallback);
    }

    #[test]
    fn state_follows_material_flags() {
        let opaque = GeometryPass::render_state(&Material::default());
        assert_eq!(opaque.color_write, ColorWrite::Rgba);
        assert!(opaque.depth_write);
        assert_eq!(opaque.depth_test, Some(DepthTest::Less));
        assert_eq!(opaque.cull, Some(CullFace::Back));
        assert!(opaque.blend.is_none());

        let blended = GeometryPass::render_state(&Material::default().with_blend(true));
        assert_eq!(blended.blend, Some(BlendMode::Alpha));
        assert_eq!(blended.cull, Some(CullFace::Back));
        assert!(blended.depth_write);

        let two_sided = GeometryPass::render_state(&Material::default().with_double_sided(true));
        assert!(two_sided.cull.is_none());
        assert!(two_sided.blend.is_none());
    }

    #[test]
    fn framebuffer_is_created_lazily() {
        let mut backend = RecordingBackend::new();
        let mut pass = GeometryPass::new(&mut backend, [0.0; 4]).unwrap();
        assert!(pass.framebuffer().is_none());

        let frame = FrameState::new(64, 32);
        pass.render(&mut backend, &frame, &World::new()).unwrap();
        pass.render(&mut backend, &frame, &World::new()).unwrap();
        assert_eq!(pass.recreation_count(), 1);

        let created = backend.framebuffer_creations();
        assert_eq!(created.len(), 1);
        assert_eq!((created[0].width, created[0].height), (64, 32));
        assert_eq!(created[0].attachment_count(), GBufferAttachment::COUNT);
        assert!(pass.attachment(&backend, GBufferAttachment::Depth).is_some());
        assert_eq!(pass.samples().len(), 2);
    }

    #[test]
    fn clear_uses_configured_color_and_far_depth() {
        let mut backend = RecordingBackend::new();
        let color = [0.1, 0.2, 0.3, 1.0];
        let mut pass = GeometryPass::new(&mut backend, color).unwrap();
        pass.render(&mut backend, &FrameState::new(8, 8), &World::new())
            .unwrap();
        let (_, view) = backend.views()[0];
        assert_eq!(view.clear.color, Some(color));
        assert_eq!(view.clear.depth, Some(1.0));
    }
}
