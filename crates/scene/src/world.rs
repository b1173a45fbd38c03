use std::sync::Arc;
use std::time::Instant;

use glam::Vec3;
use prism_common::{EntityId, FrameSamples};
use prism_render::{GraphicsBackend, Texture};

use crate::SceneError;
use crate::camera::Camera;
use crate::entity::Entity;

/// Longest step a single `update` may advance, in seconds.
pub const MAX_FRAME_DT: f32 = 0.1;

/// Environment cubemap slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Environment {
    /// Background drawn by the sky pass.
    Sky = 0,
    Diffuse = 1,
    Specular = 2,
}

impl Environment {
    pub const COUNT: usize = 3;
}

/// Owns the scene and drives the per-frame update tick.
///
/// # Invariants
/// - Entities update in spawn order and are never removed individually.
/// - `dt` is zero on the first `update` and never exceeds [`MAX_FRAME_DT`].
pub struct World {
    entities: Vec<Entity>,
    camera: Option<Camera>,
    light_direction: Vec3,
    environment: [Option<Arc<Texture>>; Environment::COUNT],
    last_update: Option<Instant>,
    frame: u64,
    frame_samples: FrameSamples,
    game_samples: FrameSamples,
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl World {
    /// Empty world with a default camera and a slanted sun.
    pub fn new() -> Self {
        Self {
            entities: Vec::new(),
            camera: Some(Camera::default()),
            light_direction: Vec3::new(0.3, -1.0, 0.5).normalize(),
            environment: Default::default(),
            last_update: None,
            frame: 0,
            frame_samples: FrameSamples::new(),
            game_samples: FrameSamples::new(),
        }
    }

    /// Spawn an entity at the origin and return it for setup.
    pub fn spawn(&mut self, name: impl Into<String>) -> &mut Entity {
        let entity = Entity::new(name);
        tracing::info!("spawned entity `{}` {:?}", entity.name(), entity.id());
        self.entities.push(entity);
        let last = self.entities.len() - 1;
        &mut self.entities[last]
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.iter().find(|e| e.id() == id)
    }

    pub fn entity_mut(&mut self, id: EntityId) -> Result<&mut Entity, SceneError> {
        self.entities
            .iter_mut()
            .find(|e| e.id() == id)
            .ok_or(SceneError::UnknownEntity(id))
    }

    pub fn camera(&self) -> Option<&Camera> {
        self.camera.as_ref()
    }

    pub fn camera_mut(&mut self) -> Option<&mut Camera> {
        self.camera.as_mut()
    }

    pub fn set_camera(&mut self, camera: Option<Camera>) {
        self.camera = camera;
    }

    /// Unit direction the directional light travels.
    pub fn light_direction(&self) -> Vec3 {
        self.light_direction
    }

    pub fn set_light_direction(&mut self, direction: Vec3) -> Result<(), SceneError> {
        if !direction.is_finite() || direction.length_squared() <= f32::EPSILON {
            return Err(SceneError::InvalidLightDirection);
        }
        self.light_direction = direction.normalize();
        Ok(())
    }

    pub fn environment(&self, slot: Environment) -> Option<&Arc<Texture>> {
        self.environment[slot as usize].as_ref()
    }

    pub fn set_environment(&mut self, slot: Environment, texture: Option<Arc<Texture>>) {
        self.environment[slot as usize] = texture;
    }

    /// Number of completed update ticks.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Wall time between consecutive `update` calls, ms.
    pub fn frame_samples(&self) -> &FrameSamples {
        &self.frame_samples
    }

    /// Time spent inside `update`, ms.
    pub fn game_samples(&self) -> &FrameSamples {
        &self.game_samples
    }

    /// Advance one host frame using the monotonic clock. Returns the `dt` used.
    pub fn update(&mut self) -> f32 {
        let now = Instant::now();
        let dt = match self.last_update {
            Some(prev) => {
                let elapsed = now.duration_since(prev).as_secs_f32();
                self.frame_samples.push(elapsed * 1000.0);
                elapsed.min(MAX_FRAME_DT)
            }
            None => 0.0,
        };
        self.last_update = Some(now);

        self.game_samples.begin();
        self.step(dt);
        self.game_samples.end();
        dt
    }

    /// Advance with a caller-chosen `dt`, clamped to `0..=MAX_FRAME_DT`.
    pub fn step(&mut self, dt: f32) {
        let dt = dt.clamp(0.0, MAX_FRAME_DT);
        let _span = tracing::trace_span!("world_step", frame = self.frame).entered();
        let mut camera = self.camera.as_mut();
        for entity in &mut self.entities {
            entity.tick(camera.as_deref_mut(), dt);
        }
        self.frame += 1;
    }

    /// Release every mesh and environment texture no longer shared elsewhere.
    pub fn destroy(mut self, backend: &mut dyn GraphicsBackend) {
        let mut meshes = Vec::new();
        for entity in &mut self.entities {
            meshes.extend(entity.take_renderables());
        }
        self.entities.clear();

        let mut released = 0usize;
        for mesh in meshes {
            if let Ok(mesh) = Arc::try_unwrap(mesh) {
                mesh.destroy(backend);
                released += 1;
            }
        }
        for slot in &mut self.environment {
            if let Some(tex) = slot.take() {
                if let Ok(tex) = Arc::try_unwrap(tex) {
                    tex.destroy(backend);
                }
            }
        }
        tracing::info!("world destroyed, released {} meshes", released);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{Component, EntityLogic, UpdateContext};
    use crate::MeshComponent;
    use prism_render::{Mesh, RecordingBackend, primitives};
    use std::cell::RefCell;
    use std::rc::Rc;

    type Log = Rc<RefCell<Vec<String>>>;

    struct Tracer {
        tag: &'static str,
        log: Log,
    }

    impl Component for Tracer {
        fn pre_update(&mut self, _cx: &mut UpdateContext<'_>, _dt: f32) {
            self.log.borrow_mut().push(format!("{}.pre", self.tag));
        }

        fn post_update(&mut self, _cx: &mut UpdateContext<'_>, _dt: f32) {
            self.log.borrow_mut().push(format!("{}.post", self.tag));
        }
    }

    struct TracerB(Tracer);

    impl Component for TracerB {
        fn pre_update(&mut self, cx: &mut UpdateContext<'_>, dt: f32) {
            self.0.pre_update(cx, dt);
        }

        fn post_update(&mut self, cx: &mut UpdateContext<'_>, dt: f32) {
            self.0.post_update(cx, dt);
        }
    }

    struct Logic {
        tag: &'static str,
        log: Log,
    }

    impl EntityLogic for Logic {
        fn update(&mut self, _cx: &mut UpdateContext<'_>, _dt: f32) {
            self.log.borrow_mut().push(format!("{}.update", self.tag));
        }
    }

    fn tracer(tag: &'static str, log: &Log) -> Tracer {
        Tracer {
            tag,
            log: log.clone(),
        }
    }

    #[test]
    fn phases_run_pre_update_post_per_entity() {
        let log: Log = Rc::default();
        let mut world = World::new();
        {
            let e = world.spawn("first");
            e.add_component(tracer("a1", &log)).unwrap();
            e.add_component(TracerB(tracer("b1", &log))).unwrap();
            e.set_logic(Logic {
                tag: "e1",
                log: log.clone(),
            });
        }
        {
            let e = world.spawn("second");
            e.add_component(tracer("a2", &log)).unwrap();
        }

        world.step(0.016);
        assert_eq!(
            *log.borrow(),
            vec![
                "a1.pre", "b1.pre", "e1.update", "a1.post", "b1.post", "a2.pre", "a2.post"
            ]
        );
    }

    #[test]
    fn order_holds_every_frame() {
        let log: Log = Rc::default();
        let mut world = World::new();
        world.spawn("e").add_component(tracer("c", &log)).unwrap();
        for _ in 0..3 {
            world.step(0.01);
        }
        assert_eq!(log.borrow().len(), 6);
        for pair in log.borrow().chunks(2) {
            assert_eq!(pair, ["c.pre", "c.post"]);
        }
        assert_eq!(world.frame(), 3);
    }

    #[test]
    fn first_update_has_zero_dt() {
        let mut world = World::new();
        assert_eq!(world.update(), 0.0);
        let dt = world.update();
        assert!((0.0..=MAX_FRAME_DT).contains(&dt));
        assert_eq!(world.frame_samples().len(), 1);
        assert_eq!(world.game_samples().len(), 2);
    }

    struct DtRecorder(Rc<RefCell<Vec<f32>>>);

    impl Component for DtRecorder {
        fn pre_update(&mut self, _cx: &mut UpdateContext<'_>, dt: f32) {
            self.0.borrow_mut().push(dt);
        }
    }

    #[test]
    fn step_clamps_large_dt() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut world = World::new();
        world
            .spawn("e")
            .add_component(DtRecorder(seen.clone()))
            .unwrap();
        world.step(5.0);
        world.step(-1.0);
        assert_eq!(*seen.borrow(), vec![MAX_FRAME_DT, 0.0]);
    }

    #[test]
    fn light_direction_is_normalized() {
        let mut world = World::new();
        world.set_light_direction(Vec3::new(0.0, -4.0, 0.0)).unwrap();
        assert_eq!(world.light_direction(), Vec3::NEG_Y);
        assert!(world.set_light_direction(Vec3::ZERO).is_err());
        assert!(world.set_light_direction(Vec3::NAN).is_err());
    }

    #[test]
    fn entity_lookup() {
        let mut world = World::new();
        let id = world.spawn("x").id();
        assert_eq!(world.entity(id).map(|e| e.name()), Some("x"));
        assert!(world.entity_mut(EntityId::new()).is_err());
    }

    #[test]
    fn destroy_releases_unshared_meshes() {
        let mut backend = RecordingBackend::new();
        let (v, i) = primitives::cube(1.0);
        let mesh = Arc::new(Mesh::from_indices(&mut backend, "cube", &v, i).unwrap());

        let mut world = World::new();
        world
            .spawn("a")
            .add_component(MeshComponent::new(mesh.clone()))
            .unwrap();
        world
            .spawn("b")
            .add_component(MeshComponent::new(mesh))
            .unwrap();
        assert_eq!(backend.live_buffer_count(), 2);

        world.destroy(&mut backend);
        assert_eq!(backend.live_buffer_count(), 0);
    }
}
