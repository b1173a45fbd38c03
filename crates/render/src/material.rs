use std::sync::Arc;

use glam::{Vec3, Vec4};

use crate::texture::Texture;

/// Texture slots of a [`Material`].
///
/// The discriminant is both the sampler stage and the bit position in the
/// geometry pass texture mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TextureSlot {
    BaseColor = 0,
    Metallic = 1,
    Roughness = 2,
    Normal = 3,
    Occlusion = 4,
    Emissive = 5,
}

impl TextureSlot {
    pub const COUNT: usize = 6;

    pub const ALL: [TextureSlot; Self::COUNT] = [
        TextureSlot::BaseColor,
        TextureSlot::Metallic,
        TextureSlot::Roughness,
        TextureSlot::Normal,
        TextureSlot::Occlusion,
        TextureSlot::Emissive,
    ];

    pub fn stage(self) -> u8 {
        self as u8
    }

    pub fn bit(self) -> u32 {
        1 << self as u32
    }
}

/// Surface description shared by sub-meshes.
///
/// Factors are always meaningful. When a slot holds a texture the shader
/// multiplies the sampled value by the factor.
#[derive(Debug, Clone)]
pub struct Material {
    pub blend: bool,
    pub double_sided: bool,
    pub base_color_factor: Vec4,
    pub metallic_factor: f32,
    pub roughness_factor: f32,
    pub normal_scale: f32,
    pub occlusion_strength: f32,
    pub emissive_factor: Vec3,
    textures: [Option<Arc<Texture>>; TextureSlot::COUNT],
}

impl Default for Material {
    fn default() -> Self {
        Self {
            blend: false,
            double_sided: false,
            base_color_factor: Vec4::ONE,
            metallic_factor: 1.0,
            roughness_factor: 1.0,
            normal_scale: 1.0,
            occlusion_strength: 1.0,
            emissive_factor: Vec3::ZERO,
            textures: Default::default(),
        }
    }
}

impl Material {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_color(mut self, color: Vec4) -> Self {
        self.base_color_factor = color;
        self
    }

    pub fn with_metallic_roughness(mut self, metallic: f32, roughness: f32) -> Self {
        self.metallic_factor = metallic;
        self.roughness_factor = roughness;
        self
    }

    pub fn with_emissive(mut self, emissive: Vec3) -> Self {
        self.emissive_factor = emissive;
        self
    }

    pub fn with_blend(mut self, blend: bool) -> Self {
        self.blend = blend;
        self
    }

    pub fn with_double_sided(mut self, double_sided: bool) -> Self {
        self.double_sided = double_sided;
        self
    }

    pub fn with_texture(mut self, slot: TextureSlot, texture: Arc<Texture>) -> Self {
        self.textures[slot as usize] = Some(texture);
        self
    }

    pub fn texture(&self, slot: TextureSlot) -> Option<&Arc<Texture>> {
        self.textures[slot as usize].as_ref()
    }

    pub fn set_texture(&mut self, slot: TextureSlot, texture: Option<Arc<Texture>>) {
        self.textures[slot as usize] = texture;
    }

    /// `(metallic, roughness, normal_scale, occlusion_strength)`.
    pub fn packed_factors(&self) -> Vec4 {
        Vec4::new(
            self.metallic_factor,
            self.roughness_factor,
            self.normal_scale,
            self.occlusion_strength,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::RecordingBackend;

    #[test]
    fn default_factors() {
        let m = Material::default();
        assert_eq!(m.base_color_factor, Vec4::ONE);
        assert_eq!(m.packed_factors(), Vec4::ONE);
        assert_eq!(m.emissive_factor, Vec3::ZERO);
        assert!(!m.blend);
        assert!(!m.double_sided);
        assert!(TextureSlot::ALL.iter().all(|s| m.texture(*s).is_none()));
    }

    #[test]
    fn slot_bits_are_ordinal() {
        assert_eq!(TextureSlot::BaseColor.bit(), 0b000001);
        assert_eq!(TextureSlot::Normal.bit(), 0b001000);
        assert_eq!(TextureSlot::Emissive.bit(), 0b100000);
        for (i, slot) in TextureSlot::ALL.iter().enumerate() {
            assert_eq!(slot.stage() as usize, i);
        }
    }

    #[test]
    fn set_and_clear_texture() {
        let mut backend = RecordingBackend::new();
        let tex = Arc::new(Texture::solid(&mut backend, "n", [128, 128, 255, 255]).unwrap());
        let mut m = Material::new().with_texture(TextureSlot::Normal, tex.clone());
        assert!(m.texture(TextureSlot::Normal).is_some());
        assert!(m.texture(TextureSlot::BaseColor).is_none());
        m.set_texture(TextureSlot::Normal, None);
        assert!(m.texture(TextureSlot::Normal).is_none());
    }
}
