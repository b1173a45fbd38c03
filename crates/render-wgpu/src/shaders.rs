use prism_render::ProgramKind;

/// Per-draw block at group 0, bound with a dynamic offset.
/// Layout must match `DrawBlock` in `gpu.rs`.
const DRAW_BLOCK: &str = r#"
struct Draw {
    view_proj: mat4x4<f32>,
    model: mat4x4<f32>,
    normal0: vec4<f32>,
    normal1: vec4<f32>,
    normal2: vec4<f32>,
    base_color: vec4<f32>,
    factors: vec4<f32>,
    emissive: vec4<f32>,
    light: vec4<f32>,
    params: vec4<f32>,
    flags: vec4<u32>,
};

@group(0) @binding(0)
var<uniform> u: Draw;

fn normal_matrix() -> mat3x3<f32> {
    return mat3x3<f32>(u.normal0.xyz, u.normal1.xyz, u.normal2.xyz);
}
"#;

/// Fullscreen triangle vertex stage shared by sky, tone and depth view.
const FULLSCREEN: &str = r#"
struct FullscreenOutput {
    @builtin(position) clip: vec4<f32>,
    @location(0) ndc: vec2<f32>,
    @location(1) uv: vec2<f32>,
};

@vertex
fn vs_main(@location(0) position: vec3<f32>) -> FullscreenOutput {
    var out: FullscreenOutput;
    out.clip = vec4<f32>(position, 1.0);
    out.ndc = position.xy;
    out.uv = vec2<f32>(position.x * 0.5 + 0.5, 0.5 - position.y * 0.5);
    return out;
}
"#;

const GEOMETRY: &str = r#"
@group(1) @binding(0) var t_base_color: texture_2d<f32>;
@group(1) @binding(1) var t_metallic: texture_2d<f32>;
@group(1) @binding(2) var t_roughness: texture_2d<f32>;
@group(1) @binding(3) var t_normal: texture_2d<f32>;
@group(1) @binding(4) var t_occlusion: texture_2d<f32>;
@group(1) @binding(5) var t_emissive: texture_2d<f32>;
@group(1) @binding(6) var s_material: sampler;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) tangent: vec4<f32>,
    @location(3) uv: vec2<f32>,
};

struct VertexOutput {
    @builtin(position) clip: vec4<f32>,
    @location(0) normal: vec3<f32>,
    @location(1) tangent: vec4<f32>,
    @location(2) uv: vec2<f32>,
};

@vertex
fn vs_main(in: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    out.clip = u.view_proj * u.model * vec4<f32>(in.position, 1.0);
    out.normal = normal_matrix() * in.normal;
    out.tangent = vec4<f32>((u.model * vec4<f32>(in.tangent.xyz, 0.0)).xyz, in.tangent.w);
    out.uv = in.uv;
    return out;
}

struct GBufferOutput {
    @location(0) diffuse_roughness: vec4<f32>,
    @location(1) normal: vec2<f32>,
    @location(2) fresnel_metallic: vec4<f32>,
    @location(3) emissive_occlusion: vec4<f32>,
};

fn has_texture(stage: u32) -> bool {
    return (u.flags.x & (1u << stage)) != 0u;
}

fn oct_wrap(v: vec2<f32>) -> vec2<f32> {
    let s = select(vec2<f32>(-1.0), vec2<f32>(1.0), v >= vec2<f32>(0.0));
    return (1.0 - abs(v.yx)) * s;
}

fn encode_normal(n: vec3<f32>) -> vec2<f32> {
    var p = n.xy / (abs(n.x) + abs(n.y) + abs(n.z));
    if n.z < 0.0 {
        p = oct_wrap(p);
    }
    return p;
}

@fragment
fn fs_main(in: VertexOutput) -> GBufferOutput {
    let base_tex = textureSample(t_base_color, s_material, in.uv);
    let metallic_tex = textureSample(t_metallic, s_material, in.uv);
    let roughness_tex = textureSample(t_roughness, s_material, in.uv);
    let normal_tex = textureSample(t_normal, s_material, in.uv);
    let occlusion_tex = textureSample(t_occlusion, s_material, in.uv);
    let emissive_tex = textureSample(t_emissive, s_material, in.uv);

    let base = u.base_color * select(vec4<f32>(1.0), base_tex, has_texture(0u));
    let metallic = u.factors.x * select(1.0, metallic_tex.b, has_texture(1u));
    let roughness = u.factors.y * select(1.0, roughness_tex.g, has_texture(2u));
    let occlusion = select(1.0, mix(1.0, occlusion_tex.r, u.factors.w), has_texture(4u));
    let emissive = u.emissive.xyz * select(vec3<f32>(1.0), emissive_tex.rgb, has_texture(5u));

    var n = normalize(in.normal);
    let t = normalize(in.tangent.xyz - n * dot(n, in.tangent.xyz));
    let b = cross(n, t) * in.tangent.w;
    let sampled = normal_tex.xyz * 2.0 - 1.0;
    let mapped = normalize(mat3x3<f32>(t, b, n) * vec3<f32>(sampled.xy * u.factors.z, sampled.z));
    n = select(n, mapped, has_texture(3u));

    let l = normalize(-u.light.xyz);
    let ndl = max(dot(n, l), 0.0);
    let lit = base.rgb * (0.15 * occlusion + ndl * (1.0 - 0.5 * metallic)) + emissive;

    var out: GBufferOutput;
    // blended draws carry coverage in alpha instead of roughness
    out.diffuse_roughness = vec4<f32>(lit, select(roughness, base.a, u.flags.z != 0u));
    out.normal = encode_normal(n);
    out.fresnel_metallic = vec4<f32>(mix(vec3<f32>(0.04), base.rgb, metallic), metallic);
    out.emissive_occlusion = vec4<f32>(emissive, occlusion);
    return out;
}
"#;

const SHADOW: &str = r#"
@vertex
fn vs_main(@location(0) position: vec3<f32>) -> @builtin(position) vec4<f32> {
    return u.view_proj * u.model * vec4<f32>(position, 1.0);
}
"#;

const SKY: &str = r#"
@group(1) @binding(0) var t_sky: texture_cube<f32>;
@group(1) @binding(1) var s_sky: sampler;

@fragment
fn fs_main(in: FullscreenOutput) -> @location(0) vec4<f32> {
    let dir = normal_matrix() * vec3<f32>(in.ndc.x * u.params.x, in.ndc.y * u.params.y, 1.0);
    return vec4<f32>(textureSample(t_sky, s_sky, normalize(dir)).rgb, 1.0);
}
"#;

const TONE: &str = r#"
@group(1) @binding(0) var t_source: texture_2d<f32>;
@group(1) @binding(1) var s_source: sampler;

fn decode_normal(e: vec2<f32>) -> vec3<f32> {
    var n = vec3<f32>(e.x, e.y, 1.0 - abs(e.x) - abs(e.y));
    let t = max(-n.z, 0.0);
    n.x += select(t, -t, n.x >= 0.0);
    n.y += select(t, -t, n.y >= 0.0);
    return normalize(n);
}

@fragment
fn fs_main(in: FullscreenOutput) -> @location(0) vec4<f32> {
    let texel = textureSample(t_source, s_source, in.uv);
    let mode = u.flags.y;
    if mode == 1u {
        return vec4<f32>(decode_normal(texel.xy) * 0.5 + 0.5, 1.0);
    }
    if mode == 2u {
        return vec4<f32>(texel.rgb, 1.0);
    }
    return vec4<f32>(vec3<f32>(1.0) - exp(-texel.rgb * u.params.x), 1.0);
}
"#;

const DEPTH_VIEW: &str = r#"
@group(1) @binding(0) var t_depth: texture_depth_2d;

@fragment
fn fs_main(in: FullscreenOutput) -> @location(0) vec4<f32> {
    let size = vec2<i32>(textureDimensions(t_depth));
    let coord = clamp(vec2<i32>(in.clip.xy), vec2<i32>(0), size - vec2<i32>(1));
    let d = textureLoad(t_depth, coord, 0);
    let near = u.params.y;
    let far = u.params.z;
    let z = near * far / (far - d * (far - near));
    let v = sqrt(clamp((z - near) / (far - near), 0.0, 1.0));
    return vec4<f32>(vec3<f32>(v), 1.0);
}
"#;

/// Full WGSL source for a built-in program.
pub fn source(kind: ProgramKind) -> String {
    let body = match kind {
        ProgramKind::Geometry => GEOMETRY,
        ProgramKind::Shadow => SHADOW,
        ProgramKind::Sky => SKY,
        ProgramKind::ToneMap => TONE,
        ProgramKind::DepthView => DEPTH_VIEW,
    };
    let fullscreen = if uses_fullscreen_vertex(kind) {
        FULLSCREEN
    } else {
        ""
    };
    format!("{DRAW_BLOCK}{fullscreen}{body}")
}

pub fn uses_fullscreen_vertex(kind: ProgramKind) -> bool {
    matches!(
        kind,
        ProgramKind::Sky | ProgramKind::ToneMap | ProgramKind::DepthView
    )
}

/// Programs without a fragment stage write depth only.
pub fn has_fragment_stage(kind: ProgramKind) -> bool {
    kind != ProgramKind::Shadow
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [ProgramKind; 5] = [
        ProgramKind::Geometry,
        ProgramKind::Shadow,
        ProgramKind::Sky,
        ProgramKind::ToneMap,
        ProgramKind::DepthView,
    ];

    #[test]
    fn every_program_has_a_vertex_entry() {
        for kind in ALL {
            let src = source(kind);
            assert_eq!(src.matches("fn vs_main").count(), 1, "{kind:?}");
            assert!(src.contains("var<uniform> u: Draw"));
        }
    }

    #[test]
    fn fragment_entries_match_stage_table() {
        for kind in ALL {
            assert_eq!(source(kind).contains("fn fs_main"), has_fragment_stage(kind));
        }
    }

    #[test]
    fn geometry_writes_four_targets() {
        let src = source(ProgramKind::Geometry);
        for location in 0..4 {
            assert!(src.contains(&format!("@location({location})")));
        }
    }
}
