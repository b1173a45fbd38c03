use serde::{Deserialize, Serialize};
use std::path::Path;

/// Errors produced while loading settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid setting `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Which geometry buffer channel the tone pass presents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebugBuffer {
    /// Regular shaded output.
    #[default]
    None,
    DiffuseRoughness,
    Normal,
    FresnelMetallic,
    EmissiveOcclusion,
    Depth,
}

impl DebugBuffer {
    pub const ALL: [DebugBuffer; 6] = [
        DebugBuffer::None,
        DebugBuffer::DiffuseRoughness,
        DebugBuffer::Normal,
        DebugBuffer::FresnelMetallic,
        DebugBuffer::EmissiveOcclusion,
        DebugBuffer::Depth,
    ];

    pub fn label(self) -> &'static str {
        match self {
            DebugBuffer::None => "None",
            DebugBuffer::DiffuseRoughness => "Diffuse / Roughness",
            DebugBuffer::Normal => "Normal",
            DebugBuffer::FresnelMetallic => "Fresnel / Metallic",
            DebugBuffer::EmissiveOcclusion => "Emissive / Occlusion",
            DebugBuffer::Depth => "Depth",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererSettings {
    /// Edge length of the square shadow map in texels.
    pub shadow_map_resolution: u32,
    /// Geometry buffer clear color, RGBA in 0..1.
    pub clear_color: [f32; 4],
    pub exposure: f32,
}

impl Default for RendererSettings {
    fn default() -> Self {
        let grey = 0x30 as f32 / 255.0;
        Self {
            shadow_map_resolution: 512,
            clear_color: [grey, grey, grey, 1.0],
            exposure: 1.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebuggingSettings {
    pub buffer: DebugBuffer,
    pub show_overlay: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSettings {
    /// Fly camera speed in units per second.
    pub fly_speed: f32,
    /// Degrees of rotation per pixel of mouse motion.
    pub look_sensitivity: f32,
    pub smooth_position: f32,
    pub smooth_rotation: f32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            fly_speed: 5.0,
            look_sensitivity: 0.1,
            smooth_position: 3.0,
            smooth_rotation: 10.0,
        }
    }
}

/// Renderer and tooling configuration.
///
/// Every section is optional in YAML; missing fields take their defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub renderer: RendererSettings,
    pub debugging: DebuggingSettings,
    pub camera: CameraSettings,
}

impl Settings {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, SettingsError> {
        let settings: Settings = serde_yaml::from_str(yaml)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let settings = Self::from_yaml_str(&text)?;
        tracing::info!("loaded settings from {}", path.display());
        Ok(settings)
    }

    pub fn to_yaml_string(&self) -> Result<String, SettingsError> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        let res = self.renderer.shadow_map_resolution;
        if res == 0 || res > 8192 {
            return Err(SettingsError::Invalid {
                field: "renderer.shadow_map_resolution",
                reason: format!("{res} is outside 1..=8192"),
            });
        }
        if !(self.renderer.exposure.is_finite() && self.renderer.exposure > 0.0) {
            return Err(SettingsError::Invalid {
                field: "renderer.exposure",
                reason: format!("{} must be positive", self.renderer.exposure),
            });
        }
        if self.camera.fly_speed < 0.0 {
            return Err(SettingsError::Invalid {
                field: "camera.fly_speed",
                reason: "must not be negative".into(),
            });
        }
        Ok(())
    }
}
