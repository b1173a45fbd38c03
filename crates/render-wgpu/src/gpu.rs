use std::collections::HashMap;

use bytemuck::{Pod, Zeroable};
use glam::{Mat3, Mat4};
use prism_render::{
    BufferHandle, Capabilities, DrawCall, DrawUniforms, FramebufferDesc, FramebufferHandle,
    GraphicsBackend, ProgramHandle, ProgramKind, RenderError, RenderState, TextureDesc,
    TextureFormat, TextureHandle, TextureKind, VertexLayout, ViewDesc, ViewId, ViewTarget,
};
use wgpu::util::DeviceExt;

use crate::overlay::{OverlayFrame, OverlayPainter};
use crate::pipelines::{PipelineCache, PipelineKey, TextureGroup, vertex_layout};
use crate::resources::{GpuBuffer, GpuFramebuffer, GpuTexture, Slots};

/// Uniforms of one draw. Mirrors `struct Draw` in the WGSL programs.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct DrawBlock {
    view_proj: [[f32; 4]; 4],
    model: [[f32; 4]; 4],
    normal: [[f32; 4]; 3],
    base_color: [f32; 4],
    factors: [f32; 4],
    emissive: [f32; 4],
    light: [f32; 4],
    params: [f32; 4],
    flags: [u32; 4],
}

fn mat3_columns(m: Mat3) -> [[f32; 4]; 3] {
    [
        m.x_axis.extend(0.0).to_array(),
        m.y_axis.extend(0.0).to_array(),
        m.z_axis.extend(0.0).to_array(),
    ]
}

impl DrawBlock {
    fn new(view_proj: Mat4, draw: &DrawCall) -> Self {
        let mut block = Self::zeroed();
        block.view_proj = view_proj.to_cols_array_2d();
        block.model = draw.transform.to_cols_array_2d();
        match draw.uniforms {
            DrawUniforms::None => {}
            DrawUniforms::Geometry(g) => {
                block.normal = mat3_columns(g.normal_matrix);
                block.base_color = g.base_color_factor.to_array();
                block.factors = g.factors.to_array();
                block.emissive = g.emissive_factor.extend(0.0).to_array();
                block.light = g.light_direction.extend(0.0).to_array();
                block.flags = [g.has_textures, 0, u32::from(draw.state.blend.is_some()), 0];
            }
            DrawUniforms::Sky(s) => {
                block.normal = mat3_columns(s.basis);
                block.params = [s.tan_half_fov.x, s.tan_half_fov.y, 0.0, 0.0];
            }
            DrawUniforms::Tone(t) => {
                block.params = [t.exposure, t.near, t.far, 0.0];
                block.flags = [0, t.mode, 0, 0];
            }
        }
        block
    }
}

fn align_to(value: u64, alignment: u64) -> u64 {
    value.div_ceil(alignment) * alignment
}

struct RecordedDraw {
    kind: ProgramKind,
    state: RenderState,
    vertex_buffer: BufferHandle,
    index_buffer: Option<BufferHandle>,
    count: u32,
    textures: Vec<TextureHandle>,
    offset: u32,
}

struct RecordedView {
    desc: ViewDesc,
    draws: Vec<RecordedDraw>,
}

/// Attachments of a view, resolved against the resource tables.
struct Target {
    /// `None` is the swap surface.
    colors: Vec<Option<TextureHandle>>,
    depth: Option<TextureHandle>,
    color_formats: Vec<wgpu::TextureFormat>,
    depth_format: Option<wgpu::TextureFormat>,
    size: (u32, u32),
}

type BindKey = (TextureGroup, Vec<TextureHandle>);

struct PreparedDraw {
    pipeline: PipelineKey,
    textures: Option<BindKey>,
    vertex_buffer: BufferHandle,
    index_buffer: Option<BufferHandle>,
    count: u32,
    offset: u32,
}

/// [`GraphicsBackend`] on a wgpu device and window surface.
///
/// Views and draws are recorded as they are submitted and encoded into one
/// command buffer by [`frame`](GraphicsBackend::frame).
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
    adapter_info: wgpu::AdapterInfo,
    next_id: u32,
    buffers: Slots<GpuBuffer>,
    textures: Slots<GpuTexture>,
    framebuffers: Slots<GpuFramebuffer>,
    programs: Slots<ProgramKind>,
    pipelines: PipelineCache,
    bind_groups: HashMap<BindKey, wgpu::BindGroup>,
    repeat_sampler: wgpu::Sampler,
    clamp_sampler: wgpu::Sampler,
    white: TextureHandle,
    block_stride: u64,
    uniform_data: Vec<u8>,
    uniform_buffer: wgpu::Buffer,
    draw_group: wgpu::BindGroup,
    views: Vec<RecordedView>,
    overlay: OverlayPainter,
    overlay_requested: bool,
}

impl WgpuBackend {
    /// Open a device that can present to `target`.
    pub fn new(
        target: impl Into<wgpu::SurfaceTarget<'static>>,
        width: u32,
        height: u32,
    ) -> Result<Self, RenderError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let surface = instance
            .create_surface(target)
            .map_err(|e| RenderError::Init(format!("create surface: {e}")))?;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .ok_or_else(|| RenderError::Init("no compatible adapter".into()))?;

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("prism_device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: Default::default(),
            },
            None,
        ))
        .map_err(|e| RenderError::Init(format!("request device: {e}")))?;

        let caps = surface.get_capabilities(&adapter);
        let format = caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .or_else(|| caps.formats.first())
            .copied()
            .ok_or_else(|| RenderError::Init("surface reports no formats".into()))?;
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: width.max(1),
            height: height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let block_size = std::mem::size_of::<DrawBlock>() as u64;
        let block_stride = align_to(
            block_size,
            u64::from(device.limits().min_uniform_buffer_offset_alignment),
        );
        let pipelines = PipelineCache::new(&device, block_size);
        let uniform_buffer = Self::create_uniform_buffer(&device, block_stride * 64);
        let draw_group = Self::create_draw_group(&device, &pipelines, &uniform_buffer, block_size);

        let sampler = |label, address_mode| {
            device.create_sampler(&wgpu::SamplerDescriptor {
                label: Some(label),
                address_mode_u: address_mode,
                address_mode_v: address_mode,
                address_mode_w: address_mode,
                mag_filter: wgpu::FilterMode::Linear,
                min_filter: wgpu::FilterMode::Linear,
                ..Default::default()
            })
        };
        let repeat_sampler = sampler("repeat_sampler", wgpu::AddressMode::Repeat);
        let clamp_sampler = sampler("clamp_sampler", wgpu::AddressMode::ClampToEdge);

        let overlay = OverlayPainter::new(&device, format);
        let adapter_info = adapter.get_info();
        tracing::info!(
            "wgpu backend on {} ({}), surface {:?}",
            adapter_info.name,
            adapter_info.backend.to_str(),
            format
        );

        let mut backend = Self {
            device,
            queue,
            surface,
            config,
            adapter_info,
            next_id: 1,
            buffers: Slots::default(),
            textures: Slots::default(),
            framebuffers: Slots::default(),
            programs: Slots::default(),
            pipelines,
            bind_groups: HashMap::new(),
            repeat_sampler,
            clamp_sampler,
            white: TextureHandle(0),
            block_stride,
            uniform_data: Vec::new(),
            uniform_buffer,
            draw_group,
            views: Vec::new(),
            overlay,
            overlay_requested: false,
        };
        let white = TextureDesc::new_2d("fallback_white", 1, 1, TextureFormat::Rgba8);
        backend.white = backend.create_texture(&white, Some(&[255; 4]))?;
        Ok(backend)
    }

    fn create_uniform_buffer(device: &wgpu::Device, size: u64) -> wgpu::Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("draw_blocks"),
            size,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    fn create_draw_group(
        device: &wgpu::Device,
        pipelines: &PipelineCache,
        buffer: &wgpu::Buffer,
        block_size: u64,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("draw_blocks_group"),
            layout: &pipelines.draw_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer,
                    offset: 0,
                    size: wgpu::BufferSize::new(block_size),
                }),
            }],
        })
    }

    fn next_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    pub fn adapter_info(&self) -> &wgpu::AdapterInfo {
        &self.adapter_info
    }

    pub fn pipeline_count(&self) -> usize {
        self.pipelines.pipeline_count()
    }

    /// Live buffers, textures and framebuffers.
    pub fn resource_counts(&self) -> (usize, usize, usize) {
        (
            self.buffers.len(),
            self.textures.len(),
            self.framebuffers.len(),
        )
    }

    /// Hand over this frame's egui output. Painted only if the renderer
    /// submits the overlay slot.
    pub fn set_overlay(&mut self, frame: OverlayFrame) {
        self.overlay.set(frame);
    }

    fn resolve_target(&self, target: ViewTarget) -> Option<Target> {
        match target {
            ViewTarget::Backbuffer => Some(Target {
                colors: vec![None],
                depth: None,
                color_formats: vec![self.config.format],
                depth_format: None,
                size: (self.config.width, self.config.height),
            }),
            ViewTarget::Framebuffer(handle) => {
                let fb = self.framebuffers.get(handle.0)?;
                Some(Target {
                    colors: (0..fb.desc.color_formats.len())
                        .map(|i| fb.color(i))
                        .collect(),
                    depth: fb.depth(),
                    color_formats: fb.color_formats(),
                    depth_format: fb.depth_format(),
                    size: (fb.desc.width, fb.desc.height),
                })
            }
            ViewTarget::Composite { framebuffer, color } => {
                let fb = self.framebuffers.get(framebuffer.0)?;
                let format = fb.color_formats().get(color).copied()?;
                Some(Target {
                    colors: vec![Some(fb.color(color)?)],
                    depth: fb.depth(),
                    color_formats: vec![format],
                    depth_format: fb.depth_format(),
                    size: (fb.desc.width, fb.desc.height),
                })
            }
        }
    }

    fn texture_fits(&self, group: TextureGroup, handle: TextureHandle) -> bool {
        let Some(texture) = self.textures.get(handle.0) else {
            return false;
        };
        let desc = &texture.desc;
        match group {
            TextureGroup::Material | TextureGroup::Color => {
                desc.kind == TextureKind::D2 && !desc.format.is_depth()
            }
            TextureGroup::Cube => desc.kind == TextureKind::Cube,
            TextureGroup::Depth => desc.format.is_depth(),
        }
    }

    fn prepare_bind_group(&mut self, key: &BindKey) -> bool {
        if self.bind_groups.contains_key(key) {
            return true;
        }
        let (group, handles) = key;
        if !handles.iter().all(|h| self.texture_fits(*group, *h)) {
            return false;
        }
        let Some(layout) = self.pipelines.texture_layout_for(*group) else {
            return false;
        };
        let mut entries: Vec<wgpu::BindGroupEntry> = Vec::new();
        for (binding, handle) in handles.iter().enumerate() {
            let Some(texture) = self.textures.get(handle.0) else {
                return false;
            };
            entries.push(wgpu::BindGroupEntry {
                binding: binding as u32,
                resource: wgpu::BindingResource::TextureView(&texture.view),
            });
        }
        let sampler = match group {
            TextureGroup::Material => Some(&self.repeat_sampler),
            TextureGroup::Cube | TextureGroup::Color => Some(&self.clamp_sampler),
            TextureGroup::Depth => None,
        };
        if let Some(sampler) = sampler {
            entries.push(wgpu::BindGroupEntry {
                binding: handles.len() as u32,
                resource: wgpu::BindingResource::Sampler(sampler),
            });
        }
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("textures_group"),
            layout,
            entries: &entries,
        });
        self.bind_groups.insert(key.clone(), bind_group);
        true
    }

    fn prepare_draw(&mut self, target: &Target, draw: &RecordedDraw) -> Option<PreparedDraw> {
        let Some(buffer) = self.buffers.get(draw.vertex_buffer.0) else {
            tracing::warn!("draw skipped: vertex buffer {:?} is gone", draw.vertex_buffer);
            return None;
        };
        if buffer.layout != Some(vertex_layout(draw.kind)) {
            tracing::warn!("draw skipped: {:?} program needs another vertex layout", draw.kind);
            return None;
        }
        if let Some(ib) = draw.index_buffer {
            if !self.buffers.contains(ib.0) {
                tracing::warn!("draw skipped: index buffer {:?} is gone", ib);
                return None;
            }
        }
        let textures = match TextureGroup::for_program(draw.kind) {
            Some(group) => {
                let key = (group, draw.textures.clone());
                if !self.prepare_bind_group(&key) {
                    tracing::warn!("draw skipped: textures {:?} do not fit {:?}", key.1, group);
                    return None;
                }
                Some(key)
            }
            None => None,
        };
        let pipeline = PipelineKey {
            kind: draw.kind,
            state: draw.state,
            colors: target.color_formats.clone(),
            depth: target.depth_format,
        };
        self.pipelines.prepare(&self.device, &pipeline);
        Some(PreparedDraw {
            pipeline,
            textures,
            vertex_buffer: draw.vertex_buffer,
            index_buffer: draw.index_buffer,
            count: draw.count,
            offset: draw.offset,
        })
    }

    fn upload_uniforms(&mut self) {
        if self.uniform_data.is_empty() {
            return;
        }
        let needed = self.uniform_data.len() as u64;
        if needed > self.uniform_buffer.size() {
            let size = needed.next_power_of_two();
            tracing::debug!("growing draw block buffer to {} bytes", size);
            self.uniform_buffer = Self::create_uniform_buffer(&self.device, size);
            self.draw_group = Self::create_draw_group(
                &self.device,
                &self.pipelines,
                &self.uniform_buffer,
                std::mem::size_of::<DrawBlock>() as u64,
            );
        }
        self.queue
            .write_buffer(&self.uniform_buffer, 0, &self.uniform_data);
    }

    fn load_op<V>(value: Option<V>) -> wgpu::LoadOp<V> {
        match value {
            Some(v) => wgpu::LoadOp::Clear(v),
            None => wgpu::LoadOp::Load,
        }
    }

    fn encode(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        backbuffer: &wgpu::TextureView,
        prepared: &[(ViewDesc, Target, Vec<PreparedDraw>)],
    ) {
        for (desc, target, draws) in prepared {
            let clear_color = desc.clear.color.map(|c| wgpu::Color {
                r: f64::from(c[0]),
                g: f64::from(c[1]),
                b: f64::from(c[2]),
                a: f64::from(c[3]),
            });
            let color_attachments: Vec<Option<wgpu::RenderPassColorAttachment>> = target
                .colors
                .iter()
                .map(|attachment| {
                    let view = match attachment {
                        None => Some(backbuffer),
                        Some(handle) => self.textures.get(handle.0).map(|t| &t.view),
                    };
                    view.map(|view| wgpu::RenderPassColorAttachment {
                        view,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: Self::load_op(clear_color),
                            store: wgpu::StoreOp::Store,
                        },
                    })
                })
                .collect();
            let depth_stencil_attachment = target
                .depth
                .and_then(|h| self.textures.get(h.0))
                .map(|t| wgpu::RenderPassDepthStencilAttachment {
                    view: &t.view,
                    depth_ops: Some(wgpu::Operations {
                        load: Self::load_op(desc.clear.depth),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                });

            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(desc.name),
                color_attachments: &color_attachments,
                depth_stencil_attachment,
                ..Default::default()
            });
            let width = desc.rect.0.clamp(1, target.size.0.max(1));
            let height = desc.rect.1.clamp(1, target.size.1.max(1));
            pass.set_viewport(0.0, 0.0, width as f32, height as f32, 0.0, 1.0);

            for draw in draws {
                let Some(pipeline) = self.pipelines.get(&draw.pipeline) else {
                    continue;
                };
                let Some(vertex_buffer) = self.buffers.get(draw.vertex_buffer.0) else {
                    continue;
                };
                pass.set_pipeline(pipeline);
                pass.set_bind_group(0, &self.draw_group, &[draw.offset]);
                if let Some(key) = &draw.textures {
                    if let Some(group) = self.bind_groups.get(key) {
                        pass.set_bind_group(1, group, &[]);
                    }
                }
                pass.set_vertex_buffer(0, vertex_buffer.buffer.slice(..));
                match draw.index_buffer.and_then(|ib| self.buffers.get(ib.0)) {
                    Some(index_buffer) => {
                        pass.set_index_buffer(
                            index_buffer.buffer.slice(..),
                            wgpu::IndexFormat::Uint32,
                        );
                        pass.draw_indexed(0..draw.count, 0, 0..1);
                    }
                    None => pass.draw(0..draw.count, 0..1),
                }
            }
        }
    }
}

impl GraphicsBackend for WgpuBackend {
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            homogeneous_depth: false,
            origin_bottom_left: false,
        }
    }

    fn begin_frame(&mut self) {
        if !self.views.is_empty() {
            tracing::debug!("dropping {} unpresented views", self.views.len());
        }
        self.views.clear();
        self.uniform_data.clear();
        self.overlay_requested = false;
    }

    fn reset(&mut self, width: u32, height: u32) {
        self.config.width = width.max(1);
        self.config.height = height.max(1);
        self.surface.configure(&self.device, &self.config);
        tracing::debug!("surface configured at {}x{}", self.config.width, self.config.height);
    }

    fn create_vertex_buffer(
        &mut self,
        label: &str,
        layout: VertexLayout,
        data: &[u8],
    ) -> Result<BufferHandle, RenderError> {
        if data.is_empty() || data.len() % layout.stride() != 0 {
            return Err(RenderError::Backend(format!(
                "vertex buffer `{label}`: {} bytes is not a multiple of stride {}",
                data.len(),
                layout.stride()
            )));
        }
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: data,
                usage: wgpu::BufferUsages::VERTEX,
            });
        let id = self.next_id();
        self.buffers.insert(
            id,
            GpuBuffer {
                buffer,
                layout: Some(layout),
            },
        );
        Ok(BufferHandle(id))
    }

    fn create_index_buffer(
        &mut self,
        label: &str,
        indices: &[u32],
    ) -> Result<BufferHandle, RenderError> {
        if indices.is_empty() {
            return Err(RenderError::Backend(format!("index buffer `{label}` is empty")));
        }
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytemuck::cast_slice(indices),
                usage: wgpu::BufferUsages::INDEX,
            });
        let id = self.next_id();
        self.buffers.insert(
            id,
            GpuBuffer {
                buffer,
                layout: None,
            },
        );
        Ok(BufferHandle(id))
    }

    fn destroy_buffer(&mut self, handle: BufferHandle) {
        if let Some(buffer) = self.buffers.remove(handle.0) {
            buffer.buffer.destroy();
        }
    }

    fn create_texture(
        &mut self,
        desc: &TextureDesc,
        data: Option<&[u8]>,
    ) -> Result<TextureHandle, RenderError> {
        let texture = GpuTexture::create(&self.device, &self.queue, desc, data, false)?;
        let id = self.next_id();
        self.textures.insert(id, texture);
        Ok(TextureHandle(id))
    }

    fn destroy_texture(&mut self, handle: TextureHandle) {
        if let Some(texture) = self.textures.remove(handle.0) {
            texture.texture.destroy();
            self.bind_groups.retain(|(_, handles), _| !handles.contains(&handle));
        }
    }

    fn is_valid_texture(&self, handle: TextureHandle) -> bool {
        self.textures.contains(handle.0)
    }

    fn create_framebuffer(
        &mut self,
        desc: &FramebufferDesc,
    ) -> Result<FramebufferHandle, RenderError> {
        if desc.width == 0 || desc.height == 0 {
            return Err(RenderError::Backend(format!(
                "framebuffer `{}` has zero size",
                desc.label
            )));
        }
        let formats = desc.color_formats.iter().copied().chain(desc.depth_format);
        let mut attachments = Vec::with_capacity(desc.attachment_count());
        for (index, format) in formats.enumerate() {
            let attachment = TextureDesc::new_2d(
                format!("{}[{index}]", desc.label),
                desc.width,
                desc.height,
                format,
            );
            let texture = match GpuTexture::create(&self.device, &self.queue, &attachment, None, true)
            {
                Ok(texture) => texture,
                Err(e) => {
                    for handle in attachments {
                        self.destroy_texture(handle);
                    }
                    return Err(e);
                }
            };
            let id = self.next_id();
            self.textures.insert(id, texture);
            attachments.push(TextureHandle(id));
        }
        let id = self.next_id();
        self.framebuffers.insert(
            id,
            GpuFramebuffer {
                desc: desc.clone(),
                attachments,
            },
        );
        tracing::debug!(
            "framebuffer `{}` {}x{} with {} attachments",
            desc.label,
            desc.width,
            desc.height,
            desc.attachment_count()
        );
        Ok(FramebufferHandle(id))
    }

    fn framebuffer_texture(
        &self,
        handle: FramebufferHandle,
        index: usize,
    ) -> Option<TextureHandle> {
        self.framebuffers
            .get(handle.0)
            .and_then(|fb| fb.attachments.get(index).copied())
    }

    fn destroy_framebuffer(&mut self, handle: FramebufferHandle) {
        if let Some(fb) = self.framebuffers.remove(handle.0) {
            for texture in fb.attachments {
                self.destroy_texture(texture);
            }
        }
    }

    fn create_program(&mut self, kind: ProgramKind) -> Result<ProgramHandle, RenderError> {
        self.pipelines.load_program(&self.device, kind);
        let id = self.next_id();
        self.programs.insert(id, kind);
        Ok(ProgramHandle(id))
    }

    fn begin_view(&mut self, desc: &ViewDesc) -> ViewId {
        let id = ViewId(self.views.len() as u16);
        self.views.push(RecordedView {
            desc: desc.clone(),
            draws: Vec::new(),
        });
        id
    }

    fn submit(&mut self, view: ViewId, draw: &DrawCall) {
        let Some(&kind) = self.programs.get(draw.program.0) else {
            tracing::warn!("draw with unknown program {:?}", draw.program);
            return;
        };
        let Some(recorded) = self.views.get(usize::from(view.0)) else {
            tracing::warn!("draw into unknown view {:?}", view);
            return;
        };
        let view_proj = recorded.desc.proj * recorded.desc.view;

        let textures = match TextureGroup::for_program(kind) {
            Some(TextureGroup::Material) => (0..TextureGroup::Material.stages() as u8)
                .map(|stage| draw.texture_at(stage).unwrap_or(self.white))
                .collect(),
            Some(group) => {
                let bound: Option<Vec<TextureHandle>> = (0..group.stages() as u8)
                    .map(|stage| draw.texture_at(stage))
                    .collect();
                let Some(bound) = bound else {
                    tracing::warn!("{:?} draw without its texture", kind);
                    return;
                };
                bound
            }
            None => Vec::new(),
        };

        let offset = self.uniform_data.len();
        let block = DrawBlock::new(view_proj, draw);
        self.uniform_data.extend_from_slice(bytemuck::bytes_of(&block));
        self.uniform_data
            .resize(offset + self.block_stride as usize, 0);

        if let Some(recorded) = self.views.get_mut(usize::from(view.0)) {
            recorded.draws.push(RecordedDraw {
                kind,
                state: draw.state,
                vertex_buffer: draw.vertex_buffer,
                index_buffer: draw.index_buffer,
                count: draw.count,
                textures,
                offset: offset as u32,
            });
        }
    }

    fn submit_overlay(&mut self) {
        self.overlay_requested = true;
    }

    fn frame(&mut self) -> Result<(), RenderError> {
        let views = std::mem::take(&mut self.views);
        let overlay_requested = std::mem::take(&mut self.overlay_requested);

        let output = match self.surface.get_current_texture() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                tracing::debug!("surface lost, reconfiguring");
                self.surface.configure(&self.device, &self.config);
                self.uniform_data.clear();
                return Ok(());
            }
            Err(wgpu::SurfaceError::Timeout) => {
                tracing::warn!("surface timeout, frame dropped");
                self.uniform_data.clear();
                return Ok(());
            }
            Err(e) => {
                self.uniform_data.clear();
                return Err(RenderError::Backend(format!("surface: {e}")));
            }
        };
        self.upload_uniforms();

        let mut prepared = Vec::with_capacity(views.len());
        for view in views {
            let Some(target) = self.resolve_target(view.desc.target) else {
                tracing::warn!("view `{}` skipped: target is gone", view.desc.name);
                continue;
            };
            let draws: Vec<PreparedDraw> = view
                .draws
                .iter()
                .filter_map(|draw| self.prepare_draw(&target, draw))
                .collect();
            prepared.push((view.desc, target, draws));
        }

        let backbuffer = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("frame_encoder"),
            });
        self.encode(&mut encoder, &backbuffer, &prepared);

        let size = [self.config.width, self.config.height];
        let overlay_commands = self.overlay.paint(
            &self.device,
            &self.queue,
            &mut encoder,
            &backbuffer,
            size,
            overlay_requested,
        );
        self.queue.submit(
            overlay_commands
                .into_iter()
                .chain(std::iter::once(encoder.finish())),
        );
        output.present();
        self.overlay.release_freed();
        self.uniform_data.clear();
        Ok(())
    }
}
