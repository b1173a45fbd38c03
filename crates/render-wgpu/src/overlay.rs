/// Tessellated egui output for one frame.
pub struct OverlayFrame {
    pub primitives: Vec<egui::ClippedPrimitive>,
    pub textures_delta: egui::TexturesDelta,
    pub pixels_per_point: f32,
}

/// Paints egui on top of the backbuffer after the pipeline's views.
pub(crate) struct OverlayPainter {
    renderer: egui_wgpu::Renderer,
    pending: Option<OverlayFrame>,
    to_free: Vec<egui::TextureId>,
}

impl OverlayPainter {
    pub fn new(device: &wgpu::Device, format: wgpu::TextureFormat) -> Self {
        Self {
            renderer: egui_wgpu::Renderer::new(device, format, None, 1, false),
            pending: None,
            to_free: Vec::new(),
        }
    }

    /// Replace the pending frame. Texture updates of a frame that was never
    /// painted are kept so the font atlas is not lost.
    pub fn set(&mut self, mut frame: OverlayFrame) {
        if let Some(previous) = self.pending.take() {
            let mut delta = previous.textures_delta;
            delta.append(frame.textures_delta);
            frame.textures_delta = delta;
        }
        self.pending = Some(frame);
    }

    /// Upload texture changes and, when `draw` is set, record the egui pass.
    /// Returns command buffers that must be submitted before `encoder`.
    pub fn paint(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        target: &wgpu::TextureView,
        size_in_pixels: [u32; 2],
        draw: bool,
    ) -> Vec<wgpu::CommandBuffer> {
        let Some(frame) = self.pending.take() else {
            return Vec::new();
        };
        for (id, delta) in &frame.textures_delta.set {
            self.renderer.update_texture(device, queue, *id, delta);
        }
        self.to_free.extend(frame.textures_delta.free.iter().copied());
        if !draw {
            return Vec::new();
        }

        let screen = egui_wgpu::ScreenDescriptor {
            size_in_pixels,
            pixels_per_point: frame.pixels_per_point,
        };
        let commands =
            self.renderer
                .update_buffers(device, queue, encoder, &frame.primitives, &screen);
        let mut pass = encoder
            .begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("overlay_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                ..Default::default()
            })
            .forget_lifetime();
        self.renderer.render(&mut pass, &frame.primitives, &screen);
        commands
    }

    /// Release egui textures once the frame that used them is submitted.
    pub fn release_freed(&mut self) {
        for id in self.to_free.drain(..) {
            self.renderer.free_texture(&id);
        }
    }
}
