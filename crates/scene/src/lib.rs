//! Scene graph: entities, components and the world update loop.
//!
//! # Invariants
//! - Every entity runs `pre_update` on all components, then its own logic,
//!   then `post_update` on all components. Entities run in spawn order.
//! - An entity holds at most one component per concrete type.
//! - Renderable meshes are discovered once, when a component is attached.
//! - Components know their owner only by [`EntityId`]; nothing holds a
//!   reference back into the world.

mod camera;
mod component;
pub mod demo;
mod entity;
mod fly;
mod world;

pub use camera::{Camera, Projection};
pub use component::{AsAny, Component, EntityLogic, MeshComponent, UpdateContext};
pub use entity::Entity;
pub use fly::FlyCameraController;
pub use prism_common::EntityId;
pub use world::{Environment, MAX_FRAME_DT, World};

/// Errors from scene mutation.
#[derive(Debug, thiserror::Error)]
pub enum SceneError {
    #[error("entity {entity:?} already has a `{component}` component")]
    DuplicateComponent {
        entity: EntityId,
        component: &'static str,
    },
    #[error("unknown entity {0:?}")]
    UnknownEntity(EntityId),
    #[error("light direction must be non-zero and finite")]
    InvalidLightDirection,
}
