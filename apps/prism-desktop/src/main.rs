use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use egui::Context as EguiContext;
use prism_common::{DebugBuffer, Settings};
use prism_input::{Action, InputState, Key};
use prism_pipeline::{Renderer, RendererStats, WindowState};
use prism_render_wgpu::{OverlayFrame, WgpuBackend};
use prism_scene::{EntityId, FlyCameraController, World};
use tracing_subscriber::EnvFilter;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{DeviceEvent, ElementState, KeyEvent, MouseButton, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{CursorGrabMode, Window, WindowId};

#[derive(Parser)]
#[command(name = "prism-desktop", about = "Prism desktop viewer")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Settings file (YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long, default_value = "1280")]
    width: u32,
    #[arg(long, default_value = "720")]
    height: u32,
}

fn map_key(code: KeyCode) -> Option<Key> {
    Some(match code {
        KeyCode::KeyW => Key::W,
        KeyCode::KeyA => Key::A,
        KeyCode::KeyS => Key::S,
        KeyCode::KeyD => Key::D,
        KeyCode::KeyQ => Key::Q,
        KeyCode::KeyE => Key::E,
        KeyCode::Space => Key::Space,
        KeyCode::ShiftLeft | KeyCode::ShiftRight => Key::Shift,
        KeyCode::ControlLeft | KeyCode::ControlRight => Key::Ctrl,
        KeyCode::Tab => Key::Tab,
        KeyCode::F1 => Key::F1,
        KeyCode::Escape => Key::Escape,
        _ => return None,
    })
}

fn next_debug_buffer(current: DebugBuffer) -> DebugBuffer {
    let all = DebugBuffer::ALL;
    let index = all.iter().position(|b| *b == current).unwrap_or(0);
    all[(index + 1) % all.len()]
}

/// Size and lifecycle of the winit window as the renderer sees it.
struct Viewport {
    size: PhysicalSize<u32>,
    closing: bool,
}

impl WindowState for Viewport {
    fn size(&self) -> (u32, u32) {
        (self.size.width, self.size.height)
    }

    fn is_closed(&self) -> bool {
        self.closing
    }
}

fn draw_overlay(ctx: &EguiContext, stats: &RendererStats, buffer: &mut DebugBuffer) {
    egui::Window::new("Renderer")
        .default_pos([12.0, 12.0])
        .resizable(false)
        .show(ctx, |ui| {
            ui.label(format!(
                "{}x{}  frame {}  epoch {}",
                stats.width, stats.height, stats.frames, stats.reset_epoch
            ));
            ui.separator();
            egui::Grid::new("pass_timings").striped(true).show(ui, |ui| {
                ui.label("pass");
                ui.label("avg ms");
                ui.label("max ms");
                ui.end_row();
                for pass in &stats.passes {
                    ui.label(pass.name);
                    ui.label(format!("{:.3}", pass.avg));
                    ui.label(format!("{:.3}", pass.max));
                    ui.end_row();
                }
            });
            ui.separator();
            egui::ComboBox::from_label("Debug buffer")
                .selected_text(buffer.label())
                .show_ui(ui, |ui| {
                    for candidate in DebugBuffer::ALL {
                        ui.selectable_value(buffer, candidate, candidate.label());
                    }
                });
            ui.small("F1: overlay | Tab: buffer | RMB: look | WASD/QE: move");
        });
}

/// Everything created once the event loop hands out a window.
struct Gpu {
    window: Arc<Window>,
    renderer: Renderer<WgpuBackend>,
    egui_winit: egui_winit::State,
}

struct App {
    settings: Settings,
    initial_size: PhysicalSize<u32>,
    world: World,
    camera: Option<EntityId>,
    input: InputState,
    egui_ctx: EguiContext,
    gpu: Option<Gpu>,
    mouse_captured: bool,
    closing: bool,
}

impl App {
    fn new(settings: Settings, initial_size: PhysicalSize<u32>) -> Self {
        Self {
            settings,
            initial_size,
            world: World::new(),
            camera: None,
            input: InputState::default(),
            egui_ctx: EguiContext::default(),
            gpu: None,
            mouse_captured: false,
            closing: false,
        }
    }

    fn init_gpu(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let attrs = Window::default_attributes()
            .with_title("Prism")
            .with_inner_size(self.initial_size);
        let window = Arc::new(event_loop.create_window(attrs)?);
        let size = window.inner_size();

        let backend = WgpuBackend::new(window.clone(), size.width, size.height)?;
        tracing::info!(
            "GPU initialized on {} ({:?})",
            backend.adapter_info().name,
            backend.adapter_info().backend
        );
        let viewport = Viewport {
            size,
            closing: false,
        };
        let mut renderer = Renderer::new(backend, self.settings.clone(), &viewport)?;
        let scene =
            prism_scene::demo::populate(&mut self.world, renderer.backend_mut(), &self.settings.camera)?;
        self.camera = Some(scene.camera);

        let egui_winit = egui_winit::State::new(
            self.egui_ctx.clone(),
            egui::ViewportId::ROOT,
            &window,
            Some(window.scale_factor() as f32),
            None,
            None,
        );
        self.gpu = Some(Gpu {
            window,
            renderer,
            egui_winit,
        });
        Ok(())
    }

    fn set_mouse_captured(&mut self, captured: bool) {
        self.mouse_captured = captured;
        if let Some(gpu) = &self.gpu {
            gpu.window.set_cursor_visible(!captured);
            let mode = if captured {
                CursorGrabMode::Confined
            } else {
                CursorGrabMode::None
            };
            if let Err(e) = gpu.window.set_cursor_grab(mode) {
                tracing::debug!("cursor grab unavailable: {e}");
            }
        }
    }

    fn handle_actions(&mut self, event_loop: &ActiveEventLoop) {
        let mut quit = false;
        for action in self.input.take_triggered() {
            if action == Action::Quit {
                quit = true;
                continue;
            }
            let Some(gpu) = &mut self.gpu else {
                continue;
            };
            let applied = match action {
                Action::ToggleOverlay => gpu
                    .renderer
                    .update_settings(|s| s.debugging.show_overlay = !s.debugging.show_overlay),
                Action::CycleDebugBuffer => gpu.renderer.update_settings(|s| {
                    s.debugging.buffer = next_debug_buffer(s.debugging.buffer);
                    tracing::info!("debug buffer: {}", s.debugging.buffer.label());
                }),
                _ => Ok(()),
            };
            if let Err(e) = applied {
                tracing::warn!("ignoring {action:?}: {e}");
            }
        }
        if quit {
            self.shutdown(event_loop);
        }
    }

    fn redraw(&mut self) {
        if let Some(id) = self.camera {
            match self.world.entity_mut(id) {
                Ok(entity) => {
                    if let Some(controller) = entity.component_mut::<FlyCameraController>() {
                        self.input.apply(controller, self.settings.camera.fly_speed);
                    }
                }
                Err(e) => tracing::warn!("camera entity missing: {e}"),
            }
        }
        self.world.update();

        let Some(gpu) = &mut self.gpu else {
            return;
        };
        let stats = gpu.renderer.stats();
        let mut buffer = gpu.renderer.settings().debugging.buffer;
        let show_overlay = gpu.renderer.settings().debugging.show_overlay;

        let raw_input = gpu.egui_winit.take_egui_input(&gpu.window);
        let full_output = self.egui_ctx.run(raw_input, |ctx| {
            if show_overlay {
                draw_overlay(ctx, &stats, &mut buffer);
            }
        });
        gpu.egui_winit
            .handle_platform_output(&gpu.window, full_output.platform_output);
        let primitives = self
            .egui_ctx
            .tessellate(full_output.shapes, full_output.pixels_per_point);
        gpu.renderer.backend_mut().set_overlay(OverlayFrame {
            primitives,
            textures_delta: full_output.textures_delta,
            pixels_per_point: full_output.pixels_per_point,
        });
        if let Err(e) = gpu.renderer.update_settings(|s| s.debugging.buffer = buffer) {
            tracing::warn!("debug buffer not applied: {e}");
        }

        let viewport = Viewport {
            size: gpu.window.inner_size(),
            closing: self.closing,
        };
        if let Err(e) = gpu.renderer.render(&viewport, &self.world) {
            tracing::error!("frame failed: {e}");
        }
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        self.closing = true;
        if let Some(gpu) = self.gpu.take() {
            let frames = gpu.renderer.frames_rendered();
            let mut backend = gpu.renderer.shutdown();
            std::mem::replace(&mut self.world, World::new()).destroy(&mut backend);
            tracing::info!("rendered {frames} frames");
        }
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.gpu.is_some() {
            return;
        }
        if let Err(e) = self.init_gpu(event_loop) {
            tracing::error!("failed to initialize renderer: {e:#}");
            event_loop.exit();
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        if let Some(gpu) = &mut self.gpu {
            let response = gpu.egui_winit.on_window_event(&gpu.window, &event);
            if response.consumed {
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => self.shutdown(event_loop),
            WindowEvent::Focused(false) => {
                self.input.release_all();
                self.set_mouse_captured(false);
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(code),
                        state,
                        repeat,
                        ..
                    },
                ..
            } => {
                if let Some(key) = map_key(code) {
                    match state {
                        ElementState::Pressed if !repeat => self.input.key_down(key),
                        ElementState::Pressed => {}
                        ElementState::Released => self.input.key_up(key),
                    }
                }
                self.handle_actions(event_loop);
            }
            WindowEvent::MouseInput {
                button: MouseButton::Right,
                state,
                ..
            } => self.set_mouse_captured(state == ElementState::Pressed),
            WindowEvent::RedrawRequested => self.redraw(),
            _ => {}
        }
    }

    fn device_event(
        &mut self,
        _event_loop: &ActiveEventLoop,
        _device_id: winit::event::DeviceId,
        event: DeviceEvent,
    ) {
        if let DeviceEvent::MouseMotion { delta } = event {
            if self.mouse_captured {
                self.input.mouse_motion(delta.0 as f32, delta.1 as f32);
            }
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(gpu) = &self.gpu {
            gpu.window.request_redraw();
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    let settings = match &cli.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    tracing::info!("prism-desktop starting");

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(settings, PhysicalSize::new(cli.width, cli.height));
    event_loop.run_app(&mut app)?;

    Ok(())
}
