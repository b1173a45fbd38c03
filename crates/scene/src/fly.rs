use glam::{Quat, Vec2, Vec3};
use prism_common::{CameraSettings, EntityId};

use crate::component::{Component, UpdateContext};

const PITCH_LIMIT_DEGREES: f32 = 70.0;

/// Smoothed fly camera driving its entity and the world camera.
///
/// Input is applied in `pre_update`; the camera is synced in `post_update`.
/// Yaw 0 looks down +Z, positive pitch looks up.
#[derive(Debug, Clone)]
pub struct FlyCameraController {
    /// Units per second at full input.
    pub speed: f32,
    /// Degrees per pixel of look input.
    pub sensitivity: f32,
    pub smooth_position: f32,
    pub smooth_rotation: f32,
    owner: Option<EntityId>,
    yaw: f32,
    pitch: f32,
    smooth_yaw: f32,
    smooth_pitch: f32,
    velocity: Vec3,
    move_input: Vec3,
    look_input: Vec2,
}

impl Default for FlyCameraController {
    fn default() -> Self {
        Self::from_settings(&CameraSettings::default())
    }
}

impl FlyCameraController {
    pub fn from_settings(settings: &CameraSettings) -> Self {
        Self {
            speed: settings.fly_speed,
            sensitivity: settings.look_sensitivity,
            smooth_position: settings.smooth_position,
            smooth_rotation: settings.smooth_rotation,
            owner: None,
            yaw: 0.0,
            pitch: 0.0,
            smooth_yaw: 0.0,
            smooth_pitch: 0.0,
            velocity: Vec3::ZERO,
            move_input: Vec3::ZERO,
            look_input: Vec2::ZERO,
        }
    }

    /// Start facing the given yaw and pitch, degrees.
    pub fn with_orientation(mut self, yaw: f32, pitch: f32) -> Self {
        self.yaw = yaw;
        self.pitch = pitch.clamp(-PITCH_LIMIT_DEGREES, PITCH_LIMIT_DEGREES);
        self.smooth_yaw = self.yaw;
        self.smooth_pitch = self.pitch;
        self
    }

    /// Held movement: x strafes right, y rises, z moves forward.
    /// Longer than unit length is clamped.
    pub fn set_move_input(&mut self, input: Vec3) {
        self.move_input = input.clamp_length_max(1.0);
    }

    /// Accumulate a mouse delta in pixels. Consumed by the next update.
    pub fn add_look_input(&mut self, delta: Vec2) {
        self.look_input += delta;
    }

    pub fn owner(&self) -> Option<EntityId> {
        self.owner
    }

    pub fn velocity(&self) -> Vec3 {
        self.velocity
    }

    /// Smoothed yaw and pitch in degrees.
    pub fn orientation(&self) -> (f32, f32) {
        (self.smooth_yaw, self.smooth_pitch)
    }

    pub fn forward(&self) -> Vec3 {
        let yaw = self.smooth_yaw.to_radians();
        let pitch = self.smooth_pitch.to_radians();
        Vec3::new(pitch.cos() * yaw.sin(), pitch.sin(), pitch.cos() * yaw.cos())
    }

    pub fn right(&self) -> Vec3 {
        self.forward().cross(Vec3::Y).normalize_or_zero()
    }

    fn rotation(&self) -> Quat {
        Quat::from_rotation_y(self.smooth_yaw.to_radians())
            * Quat::from_rotation_x(-self.smooth_pitch.to_radians())
    }
}

impl Component for FlyCameraController {
    fn on_attach(&mut self, owner: EntityId) {
        self.owner = Some(owner);
    }

    fn pre_update(&mut self, cx: &mut UpdateContext<'_>, dt: f32) {
        let look = std::mem::take(&mut self.look_input);
        self.yaw += look.x * self.sensitivity;
        self.pitch = (self.pitch - look.y * self.sensitivity)
            .clamp(-PITCH_LIMIT_DEGREES, PITCH_LIMIT_DEGREES);

        let turn = (self.smooth_rotation * dt).min(1.0);
        self.smooth_yaw += (self.yaw - self.smooth_yaw) * turn;
        self.smooth_pitch += (self.pitch - self.smooth_pitch) * turn;

        let forward = self.forward();
        let right = self.right();
        let target = (forward * self.move_input.z + right * self.move_input.x + Vec3::Y * self.move_input.y)
            * self.speed;
        let blend = (self.smooth_position * dt).min(1.0);
        self.velocity = self.velocity.lerp(target, blend);

        cx.transform.position += self.velocity * dt;
        cx.transform.rotation = self.rotation();
    }

    fn post_update(&mut self, cx: &mut UpdateContext<'_>, _dt: f32) {
        if let Some(camera) = cx.camera.as_deref_mut() {
            camera.position = cx.transform.position;
            camera.target = cx.transform.position + self.forward();
            camera.up = Vec3::Y;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::World;

    #[test]
    fn attach_records_owner() {
        let mut world = World::new();
        let e = world.spawn("cam");
        let id = e.id();
        let c = e.add_component(FlyCameraController::default()).unwrap();
        assert_eq!(c.owner(), Some(id));
    }

    #[test]
    fn default_orientation_faces_positive_z() {
        let c = FlyCameraController::default();
        assert!((c.forward() - Vec3::Z).length() < 1e-6);
        assert!((c.right() - Vec3::NEG_X).length() < 1e-6);
        assert!(c.rotation().mul_vec3(Vec3::Z).abs_diff_eq(c.forward(), 1e-6));
    }

    #[test]
    fn rotation_matches_forward_when_pitched() {
        let c = FlyCameraController::default().with_orientation(40.0, 25.0);
        assert!(c.rotation().mul_vec3(Vec3::Z).abs_diff_eq(c.forward(), 1e-5));
    }

    #[test]
    fn pitch_is_clamped() {
        let mut world = World::new();
        let id = {
            let e = world.spawn("cam");
            let c = e.add_component(FlyCameraController::default()).unwrap();
            c.add_look_input(Vec2::new(0.0, -10_000.0));
            e.id()
        };
        for _ in 0..200 {
            world.step(0.05);
        }
        let c = world
            .entity(id)
            .and_then(|e| e.component::<FlyCameraController>())
            .unwrap();
        let (_, pitch) = c.orientation();
        assert!(pitch <= PITCH_LIMIT_DEGREES + 1e-3);
        assert!(pitch > PITCH_LIMIT_DEGREES - 0.5);
    }

    #[test]
    fn speed_converges_monotonically_to_target() {
        let mut world = World::new();
        let id = {
            let e = world.spawn("cam");
            let c = e.add_component(FlyCameraController::default()).unwrap();
            c.set_move_input(Vec3::Z);
            e.id()
        };
        let target = FlyCameraController::default().speed;

        let mut previous = 0.0;
        for frame in 0..120 {
            world.step(1.0 / 60.0);
            let speed = world
                .entity(id)
                .and_then(|e| e.component::<FlyCameraController>())
                .map(|c| c.velocity().length())
                .unwrap();
            assert!(speed >= previous, "frame {frame}: {speed} < {previous}");
            assert!(speed <= target + 1e-4);
            previous = speed;
        }
        assert!(previous > target * 0.9);
    }

    #[test]
    fn post_update_syncs_world_camera() {
        let mut world = World::new();
        {
            let e = world.spawn("cam");
            e.transform.position = Vec3::new(1.0, 2.0, 3.0);
            e.add_component(FlyCameraController::default()).unwrap();
        }
        world.step(0.0);
        let cam = world.camera().unwrap();
        assert_eq!(cam.position, Vec3::new(1.0, 2.0, 3.0));
        assert!((cam.target - Vec3::new(1.0, 2.0, 4.0)).length() < 1e-6);
    }
}
