use glam::{Mat4, Vec3};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Projection {
    #[default]
    Perspective,
    /// Symmetric frustum as wide and tall as the viewport in pixels.
    Orthographic,
}

/// Active camera of a [`World`](crate::World).
///
/// Holds data only. View and projection matrices are derived by the
/// renderer each frame with a right-handed convention.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub projection: Projection,
    /// Vertical field of view in degrees.
    pub fov_degrees: f32,
    pub near: f32,
    pub far: f32,
    pub position: Vec3,
    /// Look-at point.
    pub target: Vec3,
    pub up: Vec3,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            projection: Projection::Perspective,
            fov_degrees: 70.0,
            near: 0.1,
            far: 1000.0,
            position: Vec3::new(0.0, 0.0, -1.0),
            target: Vec3::ZERO,
            up: Vec3::Y,
        }
    }
}

impl Camera {
    pub fn looking_at(position: Vec3, target: Vec3) -> Self {
        Self {
            position,
            target,
            ..Default::default()
        }
    }

    /// Unit view direction. Falls back to +Z when target equals position.
    pub fn forward(&self) -> Vec3 {
        let dir = self.target - self.position;
        if dir.length_squared() > f32::EPSILON {
            dir.normalize()
        } else {
            Vec3::Z
        }
    }

    /// Right-handed world-to-view matrix along [`forward`](Self::forward).
    /// An `up` that is zero or parallel to the view direction is replaced
    /// by a world axis.
    pub fn view_matrix(&self) -> Mat4 {
        let forward = self.forward();
        let mut up = self.up.normalize_or_zero();
        if up.cross(forward).length_squared() < 1e-6 {
            up = if forward.y.abs() < 0.99 { Vec3::Y } else { Vec3::Z };
        }
        Mat4::look_to_rh(self.position, forward, up)
    }
}
