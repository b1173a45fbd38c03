use glam::{Mat4, Vec3};
use prism_render::Capabilities;
use prism_scene::{Camera, Projection};

/// Window as seen by the renderer, polled once per frame.
pub trait WindowState {
    /// Drawable size in pixels.
    fn size(&self) -> (u32, u32);

    /// True while the window is being torn down.
    fn is_closed(&self) -> bool;
}

/// Window with a size set by the caller. Used headless and in tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedWindow {
    pub width: u32,
    pub height: u32,
    pub closed: bool,
}

impl FixedWindow {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            closed: false,
        }
    }
}

impl WindowState for FixedWindow {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

/// Per-frame render context shared by every pass.
///
/// Matrices are rewritten each frame. Only the resolution and the reset
/// epoch carry over: the epoch goes up by one whenever the resolution
/// changes, and starts at 1 so a fresh [`EpochTracker`] is stale.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameState {
    pub view: Mat4,
    pub proj: Mat4,
    pub camera_position: Vec3,
    pub camera_forward: Vec3,
    pub camera_up: Vec3,
    pub projection: Projection,
    pub fov_degrees: f32,
    pub near: f32,
    pub far: f32,
    width: u32,
    height: u32,
    reset_epoch: u64,
}

impl FrameState {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            view: Mat4::IDENTITY,
            proj: Mat4::IDENTITY,
            camera_position: Vec3::ZERO,
            camera_forward: Vec3::Z,
            camera_up: Vec3::Y,
            projection: Projection::Perspective,
            fov_degrees: 70.0,
            near: 0.1,
            far: 1000.0,
            width: width.max(1),
            height: height.max(1),
            reset_epoch: 1,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height as f32
    }

    pub fn reset_epoch(&self) -> u64 {
        self.reset_epoch
    }

    /// Record a new resolution. Returns true and bumps the epoch if it changed.
    pub fn resize(&mut self, width: u32, height: u32) -> bool {
        let (width, height) = (width.max(1), height.max(1));
        if (width, height) == (self.width, self.height) {
            return false;
        }
        self.width = width;
        self.height = height;
        self.reset_epoch += 1;
        true
    }

    /// Derive view and projection from the camera for the current viewport.
    pub fn update_camera(&mut self, camera: &Camera, caps: Capabilities) {
        self.view = camera.view_matrix();
        self.projection = camera.projection;
        self.proj = projection_matrix(camera, self.width, self.height, caps);
        self.camera_position = camera.position;
        self.camera_forward = camera.forward();
        self.camera_up = camera.up;
        self.fov_degrees = camera.fov_degrees;
        self.near = camera.near;
        self.far = camera.far;
    }

    pub fn view_proj(&self) -> Mat4 {
        self.proj * self.view
    }
}

fn projection_matrix(camera: &Camera, width: u32, height: u32, caps: Capabilities) -> Mat4 {
    let (near, far) = (camera.near, camera.far);
    match camera.projection {
        Projection::Perspective => {
            let fov = camera.fov_degrees.to_radians();
            let aspect = width as f32 / height as f32;
            if caps.homogeneous_depth {
                Mat4::perspective_rh_gl(fov, aspect, near, far)
            } else {
                Mat4::perspective_rh(fov, aspect, near, far)
            }
        }
        Projection::Orthographic => {
            let hw = width as f32 * 0.5;
            let hh = height as f32 * 0.5;
            orthographic(-hw, hw, -hh, hh, near, far, caps)
        }
    }
}

/// Right-handed orthographic projection honoring the backend depth range.
pub(crate) fn orthographic(
    left: f32,
    right: f32,
    bottom: f32,
    top: f32,
    near: f32,
    far: f32,
    caps: Capabilities,
) -> Mat4 {
    if caps.homogeneous_depth {
        Mat4::orthographic_rh_gl(left, right, bottom, top, near, far)
    } else {
        Mat4::orthographic_rh(left, right, bottom, top, near, far)
    }
}

/// Last reset epoch a pass has handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EpochTracker {
    seen: u64,
}

impl EpochTracker {
    pub fn is_stale(&self, frame: &FrameState) -> bool {
        self.seen != frame.reset_epoch
    }

    /// Returns true once per epoch: the caller must recreate its resources.
    pub fn observe(&mut self, frame: &FrameState) -> bool {
        let stale = self.is_stale(frame);
        self.seen = frame.reset_epoch;
        stale
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    #[test]
    fn fresh_tracker_is_stale_once() {
        let frame = FrameState::new(640, 480);
        let mut t = EpochTracker::default();
        assert!(t.observe(&frame));
        assert!(!t.observe(&frame));
    }

    #[test]
    fn resize_bumps_epoch_only_on_change() {
        let mut frame = FrameState::new(1280, 720);
        let e = frame.reset_epoch();
        assert!(!frame.resize(1280, 720));
        assert_eq!(frame.reset_epoch(), e);
        assert!(frame.resize(1920, 1080));
        assert_eq!(frame.reset_epoch(), e + 1);
        assert_eq!(frame.size(), (1920, 1080));
    }

    #[test]
    fn zero_size_is_clamped() {
        let mut frame = FrameState::new(0, 0);
        assert_eq!(frame.size(), (1, 1));
        assert!(!frame.resize(0, 0));
    }

    #[test]
    fn perspective_view_is_right_handed() {
        let mut frame = FrameState::new(800, 600);
        let cam = Camera::looking_at(Vec3::ZERO, Vec3::new(0.0, 0.0, 5.0));
        frame.update_camera(&cam, Capabilities::default());
        // point in front of the camera lands in the 0..1 depth range
        let clip = frame.view_proj() * Vec4::new(0.0, 0.0, 5.0, 1.0);
        let ndc_z = clip.z / clip.w;
        assert!(clip.w > 0.0);
        assert!((0.0..=1.0).contains(&ndc_z));
        // right-handed: looking down +Z puts -X on the right of the screen
        let right = frame.view_proj() * Vec4::new(-1.0, 0.0, 5.0, 1.0);
        assert!(right.x / right.w > 0.0);
    }

    #[test]
    fn homogeneous_depth_uses_minus_one_near() {
        let caps = Capabilities {
            homogeneous_depth: true,
            ..Default::default()
        };
        let mut frame = FrameState::new(800, 600);
        let cam = Camera::looking_at(Vec3::ZERO, Vec3::Z);
        frame.update_camera(&cam, caps);
        let clip = frame.view_proj() * Vec4::new(0.0, 0.0, cam.near, 1.0);
        assert!((clip.z / clip.w + 1.0).abs() < 1e-4);
    }

    #[test]
    fn orthographic_spans_half_viewport() {
        let mut frame = FrameState::new(200, 100);
        let cam = Camera {
            projection: Projection::Orthographic,
            ..Camera::looking_at(Vec3::ZERO, Vec3::Z)
        };
        frame.update_camera(&cam, Capabilities::default());
        // x = -100 in view space (screen right for a +Z look) maps to ndc 1
        let edge = frame.view_proj() * Vec4::new(-100.0, 50.0, 1.0, 1.0);
        assert!((edge.x - 1.0).abs() < 1e-5);
        assert!((edge.y - 1.0).abs() < 1e-5);
    }
}
