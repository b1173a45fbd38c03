//! Shared types used across the prism crates.
//!
//! # Invariants
//! - Quaternions cross crate and file boundaries as `[w, x, y, z]`.
//! - `Settings` is constructed once and handed to consumers by reference.

pub mod samples;
pub mod settings;
pub mod types;

pub use samples::{FrameSamples, SAMPLE_COUNT};
pub use settings::{
    CameraSettings, DebugBuffer, DebuggingSettings, RendererSettings, Settings, SettingsError,
};
pub use types::{EntityId, Transform, quat_from_wxyz, quat_to_wxyz};
