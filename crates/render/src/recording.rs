use std::collections::{BTreeMap, BTreeSet};

use crate::backend::{
    BufferHandle, Capabilities, DrawCall, FramebufferDesc, FramebufferHandle, GraphicsBackend,
    ProgramHandle, ProgramKind, RenderError, TextureHandle, ViewDesc, ViewId,
};
use crate::mesh::VertexLayout;
use crate::texture::{TextureDesc, TextureFormat};

/// Everything a [`RecordingBackend`] was asked to do, in call order.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Reset {
        width: u32,
        height: u32,
    },
    CreateVertexBuffer {
        handle: BufferHandle,
        label: String,
        layout: VertexLayout,
        bytes: usize,
    },
    CreateIndexBuffer {
        handle: BufferHandle,
        label: String,
        count: usize,
    },
    CreateTexture {
        handle: TextureHandle,
        desc: TextureDesc,
    },
    CreateFramebuffer {
        handle: FramebufferHandle,
        desc: FramebufferDesc,
    },
    CreateProgram {
        handle: ProgramHandle,
        kind: ProgramKind,
    },
    DestroyBuffer(BufferHandle),
    DestroyTexture(TextureHandle),
    DestroyFramebuffer(FramebufferHandle),
    BeginView {
        view: ViewId,
        desc: ViewDesc,
    },
    Draw {
        view: ViewId,
        call: DrawCall,
    },
    Overlay,
    Frame {
        index: u64,
    },
}

impl Command {
    /// Variant name, for grouping a recording.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Reset { .. } => "reset",
            Command::CreateVertexBuffer { .. } => "create_vertex_buffer",
            Command::CreateIndexBuffer { .. } => "create_index_buffer",
            Command::CreateTexture { .. } => "create_texture",
            Command::CreateFramebuffer { .. } => "create_framebuffer",
            Command::CreateProgram { .. } => "create_program",
            Command::DestroyBuffer(_) => "destroy_buffer",
            Command::DestroyTexture(_) => "destroy_texture",
            Command::DestroyFramebuffer(_) => "destroy_framebuffer",
            Command::BeginView { .. } => "begin_view",
            Command::Draw { .. } => "draw",
            Command::Overlay => "overlay",
            Command::Frame { .. } => "frame",
        }
    }
}

/// Headless [`GraphicsBackend`] that records commands instead of drawing.
///
/// Handles of every kind come from one counter and are never reused, so a
/// destroyed handle stays invalid.
#[derive(Debug, Default)]
pub struct RecordingBackend {
    caps: Capabilities,
    commands: Vec<Command>,
    next_id: u32,
    buffers: BTreeSet<BufferHandle>,
    textures: BTreeSet<TextureHandle>,
    framebuffers: BTreeMap<FramebufferHandle, Vec<TextureHandle>>,
    programs: BTreeMap<ProgramHandle, ProgramKind>,
    surface: (u32, u32),
    views_this_frame: u16,
    frames: u64,
    fail_framebuffers: bool,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capabilities(caps: Capabilities) -> Self {
        Self {
            caps,
            ..Default::default()
        }
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Drain the log, keeping resource state.
    pub fn take_commands(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.commands)
    }

    pub fn frame_count(&self) -> u64 {
        self.frames
    }

    pub fn surface_size(&self) -> (u32, u32) {
        self.surface
    }

    pub fn live_buffer_count(&self) -> usize {
        self.buffers.len()
    }

    pub fn live_texture_count(&self) -> usize {
        self.textures.len()
    }

    pub fn live_framebuffer_count(&self) -> usize {
        self.framebuffers.len()
    }

    pub fn program_kind(&self, handle: ProgramHandle) -> Option<ProgramKind> {
        self.programs.get(&handle).copied()
    }

    /// Simulate a texture lost behind the caller's back.
    pub fn invalidate_texture(&mut self, handle: TextureHandle) {
        self.textures.remove(&handle);
    }

    /// Make framebuffer creation fail until switched off again.
    pub fn set_fail_framebuffers(&mut self, fail: bool) {
        self.fail_framebuffers = fail;
    }

    /// Views recorded in the log, in order.
    pub fn views(&self) -> Vec<(ViewId, &ViewDesc)> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                Command::BeginView { view, desc } => Some((*view, desc)),
                _ => None,
            })
            .collect()
    }

    /// Draws recorded in the log, each tagged with its view name.
    pub fn draws(&self) -> Vec<(&'static str, &DrawCall)> {
        let mut names = BTreeMap::new();
        let mut out = Vec::new();
        for c in &self.commands {
            match c {
                Command::BeginView { view, desc } => {
                    names.insert(*view, desc.name);
                }
                Command::Draw { view, call } => {
                    out.push((names.get(view).copied().unwrap_or("?"), call));
                }
                Command::Frame { .. } => names.clear(),
                _ => {}
            }
        }
        out
    }

    pub fn draws_in(&self, view_name: &str) -> Vec<&DrawCall> {
        self.draws()
            .into_iter()
            .filter(|(name, _)| *name == view_name)
            .map(|(_, call)| call)
            .collect()
    }

    /// Framebuffers created in the log, in order.
    pub fn framebuffer_creations(&self) -> Vec<&FramebufferDesc> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                Command::CreateFramebuffer { desc, .. } => Some(desc),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, pred: impl Fn(&Command) -> bool) -> usize {
        self.commands.iter().filter(|c| pred(c)).count()
    }

    fn alloc(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

impl GraphicsBackend for RecordingBackend {
    fn capabilities(&self) -> Capabilities {
        self.caps
    }

    fn begin_frame(&mut self) {
        if self.views_this_frame > 0 {
            tracing::debug!("dropping {} unpresented views", self.views_this_frame);
        }
        self.views_this_frame = 0;
    }

    fn reset(&mut self, width: u32, height: u32) {
        self.surface = (width, height);
        self.commands.push(Command::Reset { width, height });
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
        let handle = BufferHandle(self.alloc());
        self.buffers.insert(handle);
        self.commands.push(Command::CreateVertexBuffer {
            handle,
            label: label.to_string(),
            layout,
            bytes: data.len(),
        });
        Ok(handle)
    }

    fn create_index_buffer(
        &mut self,
        label: &str,
        indices: &[u32],
    ) -> Result<BufferHandle, RenderError> {
        let handle = BufferHandle(self.alloc());
        self.buffers.insert(handle);
        self.commands.push(Command::CreateIndexBuffer {
            handle,
            label: label.to_string(),
            count: indices.len(),
        });
        Ok(handle)
    }

    fn destroy_buffer(&mut self, handle: BufferHandle) {
        if !self.buffers.remove(&handle) {
            tracing::warn!("destroying unknown buffer {:?}", handle);
        }
        self.commands.push(Command::DestroyBuffer(handle));
    }

    fn create_texture(
        &mut self,
        desc: &TextureDesc,
        data: Option<&[u8]>,
    ) -> Result<TextureHandle, RenderError> {
        if desc.width == 0 || desc.height == 0 {
            return Err(RenderError::Backend(format!(
                "texture `{}` has zero size",
                desc.label
            )));
        }
        if let Some(data) = data {
            if data.len() != desc.byte_len() {
                return Err(RenderError::TextureData {
                    label: desc.label.clone(),
                    expected: desc.byte_len(),
                    actual: data.len(),
                });
            }
        }
        let handle = TextureHandle(self.alloc());
        self.textures.insert(handle);
        self.commands.push(Command::CreateTexture {
            handle,
            desc: desc.clone(),
        });
        Ok(handle)
    }

    fn destroy_texture(&mut self, handle: TextureHandle) {
        self.textures.remove(&handle);
        self.commands.push(Command::DestroyTexture(handle));
    }

    fn is_valid_texture(&self, handle: TextureHandle) -> bool {
        self.textures.contains(&handle)
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
        if self.fail_framebuffers {
            return Err(RenderError::Backend(format!(
                "framebuffer `{}`: device lost",
                desc.label
            )));
        }
        let handle = FramebufferHandle(self.alloc());
        let formats: Vec<TextureFormat> = desc
            .color_formats
            .iter()
            .copied()
            .chain(desc.depth_format)
            .collect();
        let mut attachments = Vec::with_capacity(formats.len());
        for format in formats {
            let id = TextureHandle(self.alloc());
            self.textures.insert(id);
            attachments.push(id);
            tracing::trace!("framebuffer {:?} attachment {:?} {:?}", handle, id, format);
        }
        self.framebuffers.insert(handle, attachments);
        self.commands.push(Command::CreateFramebuffer {
            handle,
            desc: desc.clone(),
        });
        Ok(handle)
    }

    fn framebuffer_texture(
        &self,
        handle: FramebufferHandle,
        index: usize,
    ) -> Option<TextureHandle> {
        self.framebuffers.get(&handle)?.get(index).copied()
    }

    fn destroy_framebuffer(&mut self, handle: FramebufferHandle) {
        if let Some(attachments) = self.framebuffers.remove(&handle) {
            for t in attachments {
                self.textures.remove(&t);
            }
        }
        self.commands.push(Command::DestroyFramebuffer(handle));
    }

    fn create_program(&mut self, kind: ProgramKind) -> Result<ProgramHandle, RenderError> {
        let handle = ProgramHandle(self.alloc());
        self.programs.insert(handle, kind);
        self.commands.push(Command::CreateProgram { handle, kind });
        Ok(handle)
    }

    fn begin_view(&mut self, desc: &ViewDesc) -> ViewId {
        let view = ViewId(self.views_this_frame);
        self.views_this_frame += 1;
        self.commands.push(Command::BeginView {
            view,
            desc: desc.clone(),
        });
        view
    }

    fn submit(&mut self, view: ViewId, draw: &DrawCall) {
        if view.0 >= self.views_this_frame {
            tracing::warn!("draw submitted to view {:?} before it began", view);
        }
        self.commands.push(Command::Draw {
            view,
            call: draw.clone(),
        });
    }

    fn submit_overlay(&mut self) {
        self.commands.push(Command::Overlay);
    }

    fn frame(&mut self) -> Result<(), RenderError> {
        self.commands.push(Command::Frame { index: self.frames });
        self.frames += 1;
        self.views_this_frame = 0;
        Ok(())
    }
}
