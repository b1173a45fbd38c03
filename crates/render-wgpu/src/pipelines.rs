use std::collections::HashMap;

use prism_render::{
    BlendMode, ColorWrite, CullFace, DepthTest, ProgramKind, RenderState, TextureSlot,
    VertexLayout,
};

use crate::shaders;

/// Texture group expected at group 1 by a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureGroup {
    Material,
    Cube,
    Color,
    Depth,
}

impl TextureGroup {
    pub fn for_program(kind: ProgramKind) -> Option<TextureGroup> {
        match kind {
            ProgramKind::Geometry => Some(TextureGroup::Material),
            ProgramKind::Shadow => None,
            ProgramKind::Sky => Some(TextureGroup::Cube),
            ProgramKind::ToneMap => Some(TextureGroup::Color),
            ProgramKind::DepthView => Some(TextureGroup::Depth),
        }
    }

    /// Number of texture stages the group binds.
    pub fn stages(self) -> usize {
        match self {
            TextureGroup::Material => TextureSlot::COUNT,
            _ => 1,
        }
    }

    fn has_sampler(self) -> bool {
        self != TextureGroup::Depth
    }
}

pub fn vertex_layout(kind: ProgramKind) -> VertexLayout {
    if shaders::uses_fullscreen_vertex(kind) {
        VertexLayout::Position
    } else {
        VertexLayout::Mesh
    }
}

/// Everything a render pipeline is specialized on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PipelineKey {
    pub kind: ProgramKind,
    pub state: RenderState,
    pub colors: Vec<wgpu::TextureFormat>,
    pub depth: Option<wgpu::TextureFormat>,
}

fn color_writes(write: ColorWrite) -> wgpu::ColorWrites {
    match write {
        ColorWrite::None => wgpu::ColorWrites::empty(),
        ColorWrite::Rgb => wgpu::ColorWrites::COLOR,
        ColorWrite::Rgba => wgpu::ColorWrites::ALL,
    }
}

fn compare(test: Option<DepthTest>) -> wgpu::CompareFunction {
    match test {
        None | Some(DepthTest::Always) => wgpu::CompareFunction::Always,
        Some(DepthTest::Less) => wgpu::CompareFunction::Less,
        Some(DepthTest::LessEqual) => wgpu::CompareFunction::LessEqual,
        Some(DepthTest::Equal) => wgpu::CompareFunction::Equal,
    }
}

fn blend(mode: Option<BlendMode>) -> Option<wgpu::BlendState> {
    mode.map(|BlendMode::Alpha| wgpu::BlendState::ALPHA_BLENDING)
}

fn cull(face: Option<CullFace>) -> Option<wgpu::Face> {
    face.map(|f| match f {
        CullFace::Back => wgpu::Face::Back,
        CullFace::Front => wgpu::Face::Front,
    })
}

/// Color target states for `key`. Only attachment 0 blends; the other
/// targets hold packed normals and material parameters.
fn color_targets(key: &PipelineKey) -> Vec<Option<wgpu::ColorTargetState>> {
    key.colors
        .iter()
        .enumerate()
        .map(|(index, format)| {
            Some(wgpu::ColorTargetState {
                format: *format,
                blend: if index == 0 {
                    blend(key.state.blend)
                } else {
                    None
                },
                write_mask: color_writes(key.state.color_write),
            })
        })
        .collect()
}

/// Bind group layouts plus shader modules and the pipelines built from them.
pub struct PipelineCache {
    pub draw_layout: wgpu::BindGroupLayout,
    texture_layouts: HashMap<TextureGroup, wgpu::BindGroupLayout>,
    modules: HashMap<ProgramKind, wgpu::ShaderModule>,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
}

impl PipelineCache {
    pub fn new(device: &wgpu::Device, draw_block_size: u64) -> Self {
        let draw_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("draw_block_layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: wgpu::BufferSize::new(draw_block_size),
                },
                count: None,
            }],
        });

        let groups = [
            TextureGroup::Material,
            TextureGroup::Cube,
            TextureGroup::Color,
            TextureGroup::Depth,
        ];
        let texture_layouts = groups
            .into_iter()
            .map(|g| (g, Self::texture_layout(device, g)))
            .collect();

        Self {
            draw_layout,
            texture_layouts,
            modules: HashMap::new(),
            pipelines: HashMap::new(),
        }
    }

    fn texture_layout(device: &wgpu::Device, group: TextureGroup) -> wgpu::BindGroupLayout {
        let (sample_type, view_dimension) = match group {
            TextureGroup::Material | TextureGroup::Color => (
                wgpu::TextureSampleType::Float { filterable: true },
                wgpu::TextureViewDimension::D2,
            ),
            TextureGroup::Cube => (
                wgpu::TextureSampleType::Float { filterable: true },
                wgpu::TextureViewDimension::Cube,
            ),
            TextureGroup::Depth => (
                wgpu::TextureSampleType::Depth,
                wgpu::TextureViewDimension::D2,
            ),
        };
        let mut entries: Vec<wgpu::BindGroupLayoutEntry> = (0..group.stages() as u32)
            .map(|binding| wgpu::BindGroupLayoutEntry {
                binding,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type,
                    view_dimension,
                    multisampled: false,
                },
                count: None,
            })
            .collect();
        if group.has_sampler() {
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: group.stages() as u32,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            });
        }
        device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(&format!("{group:?}_textures_layout")),
            entries: &entries,
        })
    }

    pub fn texture_layout_for(&self, group: TextureGroup) -> Option<&wgpu::BindGroupLayout> {
        self.texture_layouts.get(&group)
    }

    /// Compile the program's shader module if it is not loaded yet.
    pub fn load_program(&mut self, device: &wgpu::Device, kind: ProgramKind) {
        self.modules.entry(kind).or_insert_with(|| {
            tracing::debug!("compiling {:?} program", kind);
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&format!("{kind:?}_program")),
                source: wgpu::ShaderSource::Wgsl(shaders::source(kind).into()),
            })
        });
    }

    pub fn get(&self, key: &PipelineKey) -> Option<&wgpu::RenderPipeline> {
        self.pipelines.get(key)
    }

    pub fn pipeline_count(&self) -> usize {
        self.pipelines.len()
    }

    /// Build the pipeline for `key` unless it already exists.
    pub fn prepare(&mut self, device: &wgpu::Device, key: &PipelineKey) {
        if self.pipelines.contains_key(key) {
            return;
        }
        self.load_program(device, key.kind);
        let Some(module) = self.modules.get(&key.kind) else {
            return;
        };

        let mut layouts = vec![&self.draw_layout];
        if let Some(group) = TextureGroup::for_program(key.kind) {
            if let Some(layout) = self.texture_layouts.get(&group) {
                layouts.push(layout);
            }
        }
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(&format!("{:?}_pipeline_layout", key.kind)),
            bind_group_layouts: &layouts,
            push_constant_ranges: &[],
        });

        let mesh_attributes = wgpu::vertex_attr_array![
            0 => Float32x3,
            1 => Float32x3,
            2 => Float32x4,
            3 => Float32x2,
        ];
        let position_attributes = wgpu::vertex_attr_array![0 => Float32x3];
        let vertex_layout = vertex_layout(key.kind);
        let attributes: &[wgpu::VertexAttribute] = match (vertex_layout, key.kind) {
            (VertexLayout::Mesh, ProgramKind::Geometry) => &mesh_attributes,
            _ => &position_attributes,
        };
        let buffers = [wgpu::VertexBufferLayout {
            array_stride: vertex_layout.stride() as u64,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes,
        }];

        let targets = color_targets(key);
        let fragment = if shaders::has_fragment_stage(key.kind) {
            Some(wgpu::FragmentState {
                module,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &targets,
            })
        } else {
            None
        };

        let depth_stencil = key.depth.map(|format| wgpu::DepthStencilState {
            format,
            depth_write_enabled: key.state.depth_write,
            depth_compare: compare(key.state.depth_test),
            stencil: Default::default(),
            bias: Default::default(),
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(&format!("{:?}_pipeline", key.kind)),
            layout: Some(&layout),
            vertex: wgpu::VertexState {
                module,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &buffers,
            },
            fragment,
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: cull(key.state.cull),
                ..Default::default()
            },
            depth_stencil,
            multisample: Default::default(),
            multiview: None,
            cache: None,
        });
        tracing::debug!(
            "built {:?} pipeline for {} color targets",
            key.kind,
            key.colors.len()
        );
        self.pipelines.insert(key.clone(), pipeline);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_function_state_maps_onto_wgpu() {
        assert_eq!(color_writes(ColorWrite::Rgb), wgpu::ColorWrites::COLOR);
        assert!(color_writes(ColorWrite::None).is_empty());
        assert_eq!(compare(None), wgpu::CompareFunction::Always);
        assert_eq!(compare(Some(DepthTest::Equal)), wgpu::CompareFunction::Equal);
        assert_eq!(cull(Some(CullFace::Front)), Some(wgpu::Face::Front));
        assert_eq!(
            blend(Some(BlendMode::Alpha)),
            Some(wgpu::BlendState::ALPHA_BLENDING)
        );
        assert_eq!(blend(None), None);
    }

    #[test]
    fn blending_touches_only_the_first_target() {
        let key = PipelineKey {
            kind: ProgramKind::Geometry,
            state: RenderState::OPAQUE.with_blend(Some(BlendMode::Alpha)),
            colors: vec![
                wgpu::TextureFormat::Rgba8Unorm,
                wgpu::TextureFormat::Rg16Float,
                wgpu::TextureFormat::Rgba8Unorm,
                wgpu::TextureFormat::Rgba8Unorm,
            ],
            depth: Some(wgpu::TextureFormat::Depth32Float),
        };
        let targets = color_targets(&key);
        assert_eq!(targets.len(), 4);
        let blends: Vec<_> = targets.iter().map(|t| t.as_ref().and_then(|t| t.blend)).collect();
        assert_eq!(blends[0], Some(wgpu::BlendState::ALPHA_BLENDING));
        assert!(blends[1..].iter().all(Option::is_none));
        assert_eq!(
            targets[1].as_ref().map(|t| t.format),
            Some(wgpu::TextureFormat::Rg16Float)
        );
    }

    #[test]
    fn programs_pick_their_texture_group() {
        assert_eq!(
            TextureGroup::for_program(ProgramKind::Geometry).map(TextureGroup::stages),
            Some(6)
        );
        assert_eq!(TextureGroup::for_program(ProgramKind::Shadow), None);
        assert_eq!(
            TextureGroup::for_program(ProgramKind::DepthView),
            Some(TextureGroup::Depth)
        );
        assert!(!TextureGroup::Depth.has_sampler());
    }

    #[test]
    fn fullscreen_programs_take_positions_only() {
        assert_eq!(vertex_layout(ProgramKind::Sky), VertexLayout::Position);
        assert_eq!(vertex_layout(ProgramKind::Shadow), VertexLayout::Mesh);
    }
}
