use std::any::Any;
use std::sync::Arc;

use prism_common::{EntityId, Transform};
use prism_render::Mesh;

use crate::camera::Camera;

/// Upcast to `Any` for typed component lookup.
pub trait AsAny {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// State a component may touch during an update phase.
pub struct UpdateContext<'a> {
    pub owner: EntityId,
    pub transform: &'a mut Transform,
    /// The world's active camera, if one is set.
    pub camera: Option<&'a mut Camera>,
}

/// Behavior attached to an [`Entity`](crate::Entity).
///
/// Hooks run in attach order. Input-driven state belongs in `pre_update`;
/// propagation to other objects belongs in `post_update`.
pub trait Component: AsAny + 'static {
    /// Called once when the component joins its entity.
    fn on_attach(&mut self, _owner: EntityId) {}

    fn pre_update(&mut self, _cx: &mut UpdateContext<'_>, _dt: f32) {}

    fn post_update(&mut self, _cx: &mut UpdateContext<'_>, _dt: f32) {}

    /// Mesh to draw for the owning entity. Queried once at attach time.
    fn renderable(&self) -> Option<Arc<Mesh>> {
        None
    }

    fn type_label(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Entity-level update, run between the two component phases.
pub trait EntityLogic {
    fn update(&mut self, cx: &mut UpdateContext<'_>, dt: f32);
}

/// Makes its entity drawable.
#[derive(Debug, Clone)]
pub struct MeshComponent {
    mesh: Arc<Mesh>,
}

impl MeshComponent {
    pub fn new(mesh: Arc<Mesh>) -> Self {
        Self { mesh }
    }

    pub fn mesh(&self) -> &Arc<Mesh> {
        &self.mesh
    }
}

impl Component for MeshComponent {
    fn renderable(&self) -> Option<Arc<Mesh>> {
        Some(self.mesh.clone())
    }
}
