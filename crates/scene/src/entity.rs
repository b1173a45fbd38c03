use std::any::TypeId;
use std::sync::Arc;

use prism_common::{EntityId, Transform};
use prism_render::Mesh;

use crate::SceneError;
use crate::camera::Camera;
use crate::component::{Component, EntityLogic, UpdateContext};

/// Scene node: a transform plus an ordered set of components.
///
/// Created through [`World::spawn`](crate::World::spawn).
pub struct Entity {
    id: EntityId,
    name: String,
    pub transform: Transform,
    components: Vec<(TypeId, Box<dyn Component>)>,
    logic: Option<Box<dyn EntityLogic>>,
    renderables: Vec<Arc<Mesh>>,
}

impl std::fmt::Debug for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let components: Vec<&str> = self.components.iter().map(|(_, c)| c.type_label()).collect();
        f.debug_struct("Entity")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("transform", &self.transform)
            .field("components", &components)
            .field("renderables", &self.renderables.len())
            .finish()
    }
}

impl Entity {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            id: EntityId::new(),
            name: name.into(),
            transform: Transform::default(),
            components: Vec::new(),
            logic: None,
            renderables: Vec::new(),
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attach a component. A second component of the same type is rejected.
    pub fn add_component<C: Component>(&mut self, component: C) -> Result<&mut C, SceneError> {
        let type_id = TypeId::of::<C>();
        if self.components.iter().any(|(t, _)| *t == type_id) {
            return Err(SceneError::DuplicateComponent {
                entity: self.id,
                component: std::any::type_name::<C>(),
            });
        }
        let mut boxed: Box<dyn Component> = Box::new(component);
        boxed.on_attach(self.id);
        if let Some(mesh) = boxed.renderable() {
            self.renderables.push(mesh);
        }
        tracing::debug!("entity `{}` attached {}", self.name, boxed.type_label());
        self.components.push((type_id, boxed));

        let (_, last) = self
            .components
            .last_mut()
            .ok_or(SceneError::UnknownEntity(self.id))?;
        let last: &mut dyn Component = &mut **last;
        last.as_any_mut()
            .downcast_mut::<C>()
            .ok_or(SceneError::UnknownEntity(self.id))
    }

    pub fn with_component<C: Component>(mut self, component: C) -> Result<Self, SceneError> {
        self.add_component(component)?;
        Ok(self)
    }

    pub fn component<C: Component>(&self) -> Option<&C> {
        let type_id = TypeId::of::<C>();
        self.components
            .iter()
            .find(|(t, _)| *t == type_id)
            .and_then(|(_, c)| {
                let c: &dyn Component = &**c;
                c.as_any().downcast_ref::<C>()
            })
    }

    pub fn component_mut<C: Component>(&mut self) -> Option<&mut C> {
        let type_id = TypeId::of::<C>();
        self.components
            .iter_mut()
            .find(|(t, _)| *t == type_id)
            .and_then(|(_, c)| {
                let c: &mut dyn Component = &mut **c;
                c.as_any_mut().downcast_mut::<C>()
            })
    }

    pub fn has_component<C: Component>(&self) -> bool {
        let type_id = TypeId::of::<C>();
        self.components.iter().any(|(t, _)| *t == type_id)
    }

    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    /// Replace the entity's own update hook.
    pub fn set_logic(&mut self, logic: impl EntityLogic + 'static) {
        self.logic = Some(Box::new(logic));
    }

    /// Meshes contributed by attached components, in attach order.
    pub fn renderables(&self) -> &[Arc<Mesh>] {
        &self.renderables
    }

    pub(crate) fn take_renderables(&mut self) -> Vec<Arc<Mesh>> {
        std::mem::take(&mut self.renderables)
    }

    /// Run the three update phases.
    pub(crate) fn tick(&mut self, camera: Option<&mut Camera>, dt: f32) {
        let mut cx = UpdateContext {
            owner: self.id,
            transform: &mut self.transform,
            camera,
        };
        for (_, c) in &mut self.components {
            c.pre_update(&mut cx, dt);
        }
        if let Some(logic) = &mut self.logic {
            logic.update(&mut cx, dt);
        }
        for (_, c) in &mut self.components {
            c.post_update(&mut cx, dt);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MeshComponent;
    use prism_common::EntityId;
    use prism_render::{RecordingBackend, primitives};

    #[derive(Debug, Default)]
    struct Counter {
        owner: Option<EntityId>,
        pre: u32,
        post: u32,
    }

    impl Component for Counter {
        fn on_attach(&mut self, owner: EntityId) {
            self.owner = Some(owner);
        }

        fn pre_update(&mut self, _cx: &mut UpdateContext<'_>, _dt: f32) {
            self.pre += 1;
        }

        fn post_update(&mut self, _cx: &mut UpdateContext<'_>, _dt: f32) {
            self.post += 1;
        }
    }

    struct Marker;
    impl Component for Marker {}

    #[test]
    fn attach_records_owner() {
        let mut e = Entity::new("e");
        let id = e.id();
        let c = e.add_component(Counter::default()).unwrap();
        assert_eq!(c.owner, Some(id));
    }

    #[test]
    fn duplicate_component_is_rejected() {
        let mut e = Entity::new("e");
        e.add_component(Counter::default()).unwrap();
        e.component_mut::<Counter>().unwrap().pre = 7;

        let err = e.add_component(Counter::default()).unwrap_err();
        assert!(matches!(err, SceneError::DuplicateComponent { .. }));
        // original instance untouched
        assert_eq!(e.component::<Counter>().unwrap().pre, 7);
        assert_eq!(e.component_count(), 1);
    }

    #[test]
    fn lookup_by_type() {
        let mut e = Entity::new("e");
        e.add_component(Marker).unwrap();
        assert!(e.has_component::<Marker>());
        assert!(!e.has_component::<Counter>());
        assert!(e.component::<Counter>().is_none());
    }

    #[test]
    fn tick_runs_both_phases() {
        let mut e = Entity::new("e");
        e.add_component(Counter::default()).unwrap();
        e.tick(None, 0.016);
        e.tick(None, 0.016);
        let c = e.component::<Counter>().unwrap();
        assert_eq!((c.pre, c.post), (2, 2));
    }

    #[test]
    fn mesh_component_registers_renderable() {
        let mut backend = RecordingBackend::new();
        let (v, i) = primitives::cube(1.0);
        let mesh = Arc::new(Mesh::from_indices(&mut backend, "cube", &v, i).unwrap());

        let mut e = Entity::new("e");
        assert!(e.renderables().is_empty());
        e.add_component(Marker).unwrap();
        e.add_component(MeshComponent::new(mesh.clone())).unwrap();
        assert_eq!(e.renderables().len(), 1);
        assert!(Arc::ptr_eq(&e.renderables()[0], &mesh));
    }
}
