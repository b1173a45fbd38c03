use glam::{Mat4, Vec3};
use prism_common::FrameSamples;
use prism_render::{
    Capabilities, Clear, ColorWrite, CullFace, DepthTest, DrawCall, DrawUniforms,
    FramebufferDesc, FramebufferHandle, GraphicsBackend, ProgramHandle, ProgramKind,
    RenderError, RenderState, TextureFormat, TextureHandle, ViewDesc, ViewTarget,
};
use prism_scene::World;

use crate::frame::{EpochTracker, FrameState, orthographic};

/// Half width and height of the light frustum, world units.
pub const SHADOW_HALF_EXTENT: f32 = 30.0;
pub const SHADOW_NEAR: f32 = -100.0;
pub const SHADOW_FAR: f32 = 100.0;

/// Light camera for the directional light.
///
/// The frustum is fixed; it does not adapt to scene content.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightView {
    pub eye: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    pub view: Mat4,
    pub proj: Mat4,
}

impl LightView {
    /// Eye at the light direction used as an offset from the origin.
    pub fn from_direction(direction: Vec3, caps: Capabilities) -> Self {
        let eye = direction;
        let target = Vec3::ZERO;
        // world up is degenerate for a vertical light
        let up = if direction.normalize_or_zero().cross(Vec3::Y).length_squared() < 1e-6 {
            Vec3::Z
        } else {
            Vec3::Y
        };
        let e = SHADOW_HALF_EXTENT;
        Self {
            eye,
            target,
            up,
            view: Mat4::look_at_rh(eye, target, up),
            proj: orthographic(-e, e, -e, e, SHADOW_NEAR, SHADOW_FAR, caps),
        }
    }

    pub fn view_proj(&self) -> Mat4 {
        self.proj * self.view
    }
}

/// Depth-only render of the scene from the directional light.
pub struct ShadowPass {
    epoch: EpochTracker,
    framebuffer: Option<FramebufferHandle>,
    resolution: u32,
    program: ProgramHandle,
    light: Option<LightView>,
    samples: FrameSamples,
    recreations: u64,
}

impl ShadowPass {
    pub const STATE: RenderState = RenderState {
        color_write: ColorWrite::None,
        depth_write: true,
        depth_test: Some(DepthTest::Less),
        blend: None,
        cull: Some(CullFace::Front),
    };

    pub fn new(backend: &mut dyn GraphicsBackend) -> Result<Self, RenderError> {
        Ok(Self {
            epoch: EpochTracker::default(),
            framebuffer: None,
            resolution: 0,
            program: backend.create_program(ProgramKind::Shadow)?,
            light: None,
            samples: FrameSamples::new(),
            recreations: 0,
        })
    }

    /// Render into a `resolution` square depth map.
    pub fn render(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        frame: &FrameState,
        world: &World,
        resolution: u32,
    ) -> Result<(), RenderError> {
        let _span = tracing::debug_span!("shadow_pass").entered();
        self.samples.begin();
        let result = self.record(backend, frame, world, resolution.max(1));
        self.samples.end();
        result
    }

    fn record(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        frame: &FrameState,
        world: &World,
        resolution: u32,
    ) -> Result<(), RenderError> {
        let fb = self.ensure_framebuffer(backend, frame, resolution)?;
        let light = LightView::from_direction(world.light_direction(), backend.capabilities());
        self.light = Some(light);

        let view = backend.begin_view(&ViewDesc {
            name: "shadow",
            target: ViewTarget::Framebuffer(fb),
            rect: (resolution, resolution),
            clear: Clear {
                color: None,
                depth: Some(1.0),
            },
            view: light.view,
            proj: light.proj,
        });
        for entity in world.entities() {
            let model = entity.transform.matrix();
            for mesh in entity.renderables() {
                for sm in mesh.submeshes() {
                    backend.submit(
                        view,
                        &DrawCall {
                            program: self.program,
                            state: Self::STATE,
                            transform: model,
                            vertex_buffer: mesh.vertex_buffer(),
                            index_buffer: Some(sm.index_buffer()),
                            count: sm.index_count(),
                            textures: Vec::new(),
                            uniforms: DrawUniforms::None,
                        },
                    );
                }
            }
        }
        Ok(())
    }

    fn ensure_framebuffer(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        frame: &FrameState,
        resolution: u32,
    ) -> Result<FramebufferHandle, RenderError> {
        let stale = self.epoch.observe(frame);
        if let (false, Some(fb)) = (stale, self.framebuffer) {
            if self.resolution == resolution {
                return Ok(fb);
            }
        }
        if let Some(old) = self.framebuffer.take() {
            backend.destroy_framebuffer(old);
        }
        let fb = backend.create_framebuffer(&FramebufferDesc {
            label: "shadow-map".into(),
            width: resolution,
            height: resolution,
            color_formats: Vec::new(),
            depth_format: Some(TextureFormat::Depth16),
        })?;
        tracing::debug!("shadow map recreated at {}x{}", resolution, resolution);
        self.framebuffer = Some(fb);
        self.resolution = resolution;
        self.recreations += 1;
        Ok(fb)
    }

    /// Depth texture of the last render.
    pub fn shadow_map(&self, backend: &dyn GraphicsBackend) -> Option<TextureHandle> {
        backend.framebuffer_texture(self.framebuffer?, 0)
    }

    /// Light camera used by the last render.
    pub fn light_view(&self) -> Option<&LightView> {
        self.light.as_ref()
    }

    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    pub fn samples(&self) -> &FrameSamples {
        &self.samples
    }

    pub fn recreation_count(&self) -> u64 {
        self.recreations
    }

    pub fn destroy(self, backend: &mut dyn GraphicsBackend) {
        if let Some(fb) = self.framebuffer {
            backend.destroy_framebuffer(fb);
        }
    }
}
