use std::fmt;

use prism_common::{FrameSamples, Settings, SettingsError};
use prism_render::{GraphicsBackend, RenderError};
use prism_scene::World;
use serde::Serialize;

use crate::frame::{FrameState, WindowState};
use crate::geometry::GeometryPass;
use crate::shadow::ShadowPass;
use crate::sky::SkyPass;
use crate::tone::TonePass;

/// Rolling timing of one pipeline stage, milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PassTiming {
    pub name: &'static str,
    pub avg: f32,
    pub min: f32,
    pub max: f32,
    pub samples: usize,
}

impl PassTiming {
    fn from_samples(name: &'static str, s: &FrameSamples) -> Self {
        Self {
            name,
            avg: s.avg(),
            min: s.min(),
            max: s.max(),
            samples: s.len(),
        }
    }
}

/// Snapshot of renderer counters for a debug overlay or a report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RendererStats {
    pub frames: u64,
    pub width: u32,
    pub height: u32,
    pub reset_epoch: u64,
    pub passes: Vec<PassTiming>,
}

impl fmt::Display for RendererStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Frames: {} at {}x{} (epoch {})",
            self.frames, self.width, self.height, self.reset_epoch
        )?;
        for p in &self.passes {
            writeln!(
                f,
                "  {:<8} avg {:>7.3} ms  min {:>7.3}  max {:>7.3}",
                p.name, p.avg, p.min, p.max
            )?;
        }
        Ok(())
    }
}

/// Owns the frame state and every pass, and runs them in order.
///
/// # Invariants
/// - `render` runs geometry, shadow, sky, tone, then the overlay if enabled,
///   then presents.
/// - A resolution change observed while the window is closing is ignored
///   for that frame and picked up by the next open frame.
pub struct Renderer<B: GraphicsBackend> {
    backend: B,
    settings: Settings,
    frame: FrameState,
    geometry: GeometryPass,
    shadow: ShadowPass,
    sky: SkyPass,
    tone: TonePass,
    overlay_samples: FrameSamples,
    total_samples: FrameSamples,
    frames: u64,
}

impl<B: GraphicsBackend> Renderer<B> {
    pub fn new(
        mut backend: B,
        settings: Settings,
        window: &dyn WindowState,
    ) -> Result<Self, RenderError> {
        settings
            .validate()
            .map_err(|e| RenderError::Init(e.to_string()))?;
        let (width, height) = window.size();
        let frame = FrameState::new(width, height);
        backend.reset(frame.width(), frame.height());

        let geometry = GeometryPass::new(&mut backend, settings.renderer.clear_color)?;
        let shadow = ShadowPass::new(&mut backend)?;
        let sky = SkyPass::new(&mut backend)?;
        let tone = TonePass::new(&mut backend)?;
        tracing::info!(
            "renderer initialized at {}x{}, shadow map {}",
            frame.width(),
            frame.height(),
            settings.renderer.shadow_map_resolution
        );
        Ok(Self {
            backend,
            settings,
            frame,
            geometry,
            shadow,
            sky,
            tone,
            overlay_samples: FrameSamples::new(),
            total_samples: FrameSamples::new(),
            frames: 0,
        })
    }

    /// Render and present one frame of `world` through its active camera.
    pub fn render(&mut self, window: &dyn WindowState, world: &World) -> Result<(), RenderError> {
        let _span = tracing::debug_span!("render_frame", frame = self.frames).entered();
        self.total_samples.begin();

        self.check_resize(window);
        self.backend.begin_frame();
        debug_assert!(world.camera().is_some(), "render called without an active camera");
        if let Some(camera) = world.camera() {
            self.frame.update_camera(camera, self.backend.capabilities());
        }

        let result = self.run_passes(world);
        self.total_samples.end();
        result?;
        self.frames += 1;
        Ok(())
    }

    fn check_resize(&mut self, window: &dyn WindowState) {
        let (width, height) = window.size();
        let (width, height) = (width.max(1), height.max(1));
        if (width, height) == self.frame.size() {
            return;
        }
        if window.is_closed() {
            tracing::debug!("ignoring resize to {}x{} while closing", width, height);
            return;
        }
        self.backend.reset(width, height);
        self.frame.resize(width, height);
        tracing::info!(
            "viewport resized to {}x{} (epoch {})",
            width,
            height,
            self.frame.reset_epoch()
        );
    }

    fn run_passes(&mut self, world: &World) -> Result<(), RenderError> {
        let backend: &mut dyn GraphicsBackend = &mut self.backend;
        let renderer = &self.settings.renderer;

        self.geometry.render(backend, &self.frame, world)?;
        self.shadow
            .render(backend, &self.frame, world, renderer.shadow_map_resolution)?;
        if let Some(gbuffer) = self.geometry.framebuffer() {
            self.sky.render(backend, &self.frame, world, gbuffer)?;
        }
        self.tone.render(
            backend,
            &self.frame,
            &self.geometry,
            self.settings.debugging.buffer,
            renderer.exposure,
        )?;
        if self.settings.debugging.show_overlay {
            self.overlay_samples.begin();
            backend.submit_overlay();
            self.overlay_samples.end();
        }
        backend.frame()
    }

    pub fn stats(&self) -> RendererStats {
        RendererStats {
            frames: self.frames,
            width: self.frame.width(),
            height: self.frame.height(),
            reset_epoch: self.frame.reset_epoch(),
            passes: vec![
                PassTiming::from_samples("shadow", self.shadow.samples()),
                PassTiming::from_samples("geometry", self.geometry.samples()),
                PassTiming::from_samples("sky", self.sky.samples()),
                PassTiming::from_samples("tone", self.tone.samples()),
                PassTiming::from_samples("overlay", &self.overlay_samples),
                PassTiming::from_samples("total", &self.total_samples),
            ],
        }
    }

    pub fn frame_state(&self) -> &FrameState {
        &self.frame
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Apply a runtime change from the next frame on. A change that fails
    /// validation is rejected and the current settings stay in place.
    pub fn update_settings(
        &mut self,
        change: impl FnOnce(&mut Settings),
    ) -> Result<(), SettingsError> {
        let mut next = self.settings.clone();
        change(&mut next);
        next.validate()?;
        self.settings = next;
        Ok(())
    }

    pub fn geometry(&self) -> &GeometryPass {
        &self.geometry
    }

    pub fn shadow(&self) -> &ShadowPass {
        &self.shadow
    }

    pub fn sky(&self) -> &SkyPass {
        &self.sky
    }

    pub fn tone(&self) -> &TonePass {
        &self.tone
    }

    /// Release pass resources and hand the backend back.
    pub fn shutdown(self) -> B {
        let Self {
            mut backend,
            geometry,
            shadow,
            sky,
            tone,
            frames,
            ..
        } = self;
        geometry.destroy(&mut backend);
        shadow.destroy(&mut backend);
        sky.destroy(&mut backend);
        tone.destroy(&mut backend);
        tracing::info!("renderer shut down after {} frames", frames);
        backend
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FixedWindow;
    use prism_render::{Command, RecordingBackend};

    fn renderer(width: u32, height: u32) -> Renderer<RecordingBackend> {
        Renderer::new(
            RecordingBackend::new(),
            Settings::default(),
            &FixedWindow::new(width, height),
        )
        .unwrap()
    }

    fn view_order(backend: &RecordingBackend) -> Vec<&'static str> {
        backend.views().iter().map(|(_, d)| d.name).collect()
    }

    #[test]
    fn passes_run_in_fixed_order() {
        let mut r = renderer(320, 200);
        r.render(&FixedWindow::new(320, 200), &World::new()).unwrap();
        assert_eq!(view_order(r.backend()), vec!["geometry", "shadow", "tone"]);
        assert!(matches!(
            r.backend().commands().last(),
            Some(Command::Frame { index: 0 })
        ));
    }

    #[test]
    fn overlay_runs_after_tone_when_enabled() {
        let mut r = renderer(320, 200);
        r.update_settings(|s| s.debugging.show_overlay = true).unwrap();
        r.render(&FixedWindow::new(320, 200), &World::new()).unwrap();

        let cmds = r.backend().commands();
        let overlay = cmds.iter().position(|c| matches!(c, Command::Overlay));
        let tone = cmds.iter().position(
            |c| matches!(c, Command::BeginView { desc, .. } if desc.name == "tone"),
        );
        let frame = cmds.iter().position(|c| matches!(c, Command::Frame { .. }));
        assert!(tone < overlay && overlay < frame);
    }

    #[test]
    fn invalid_runtime_settings_are_rejected() {
        let mut r = renderer(320, 200);
        let err = r
            .update_settings(|s| s.renderer.shadow_map_resolution = 16_384)
            .unwrap_err();
        assert!(matches!(err, SettingsError::Invalid { .. }));
        assert_eq!(r.settings().renderer.shadow_map_resolution, 512);

        r.update_settings(|s| s.renderer.shadow_map_resolution = 1024)
            .unwrap();
        r.render(&FixedWindow::new(320, 200), &World::new()).unwrap();
        assert_eq!(r.shadow().resolution(), 1024);
    }

    #[test]
    fn invalid_initial_settings_fail_construction() {
        let mut settings = Settings::default();
        settings.renderer.exposure = 0.0;
        let result = Renderer::new(RecordingBackend::new(), settings, &FixedWindow::new(8, 8));
        assert!(matches!(result, Err(RenderError::Init(_))));
    }

    #[test]
    fn failed_frame_does_not_leak_views_into_the_next() {
        let window = FixedWindow::new(320, 200);
        let world = World::new();
        let mut r = renderer(320, 200);
        r.render(&window, &world).unwrap();

        // geometry records its view, then the shadow map cannot be recreated
        r.update_settings(|s| s.renderer.shadow_map_resolution = 256)
            .unwrap();
        r.backend_mut().set_fail_framebuffers(true);
        assert!(r.render(&window, &world).is_err());
        assert_eq!(r.frames_rendered(), 1);

        r.backend_mut().set_fail_framebuffers(false);
        r.backend_mut().take_commands();
        r.render(&window, &world).unwrap();
        let ids: Vec<u16> = r.backend().views().iter().map(|(id, _)| id.0).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn overlay_is_skipped_by_default() {
        let mut r = renderer(320, 200);
        r.render(&FixedWindow::new(320, 200), &World::new()).unwrap();
        assert_eq!(r.backend().count(|c| matches!(c, Command::Overlay)), 0);
    }

    #[test]
    fn resize_while_closing_is_deferred() {
        let mut r = renderer(640, 480);
        let world = World::new();
        r.render(&FixedWindow::new(640, 480), &world).unwrap();
        let epoch = r.frame_state().reset_epoch();

        let closing = FixedWindow {
            width: 800,
            height: 600,
            closed: true,
        };
        r.render(&closing, &world).unwrap();
        assert_eq!(r.frame_state().size(), (640, 480));
        assert_eq!(r.frame_state().reset_epoch(), epoch);

        r.render(&FixedWindow::new(800, 600), &world).unwrap();
        assert_eq!(r.frame_state().size(), (800, 600));
        assert_eq!(r.frame_state().reset_epoch(), epoch + 1);
        assert_eq!(r.backend().surface_size(), (800, 600));
    }

    #[test]
    fn camera_matrices_follow_world_camera() {
        let mut r = renderer(100, 100);
        let mut world = World::new();
        if let Some(cam) = world.camera_mut() {
            cam.position = glam::Vec3::new(0.0, 5.0, -10.0);
        }
        r.render(&FixedWindow::new(100, 100), &world).unwrap();
        assert_eq!(r.frame_state().camera_position, glam::Vec3::new(0.0, 5.0, -10.0));
    }

    #[test]
    fn stats_cover_every_stage() {
        let mut r = renderer(64, 64);
        for _ in 0..3 {
            r.render(&FixedWindow::new(64, 64), &World::new()).unwrap();
        }
        let stats = r.stats();
        assert_eq!(stats.frames, 3);
        let names: Vec<_> = stats.passes.iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["shadow", "geometry", "sky", "tone", "overlay", "total"]);
        let total = stats.passes.iter().find(|p| p.name == "total").unwrap();
        assert_eq!(total.samples, 3);
        assert!(stats.to_string().contains("geometry"));
    }

    #[test]
    fn shutdown_releases_pass_resources() {
        let mut r = renderer(64, 64);
        r.render(&FixedWindow::new(64, 64), &World::new()).unwrap();
        let backend = r.shutdown();
        assert_eq!(backend.live_framebuffer_count(), 0);
        assert_eq!(backend.live_buffer_count(), 0);
        assert_eq!(backend.live_texture_count(), 0);
    }
}
