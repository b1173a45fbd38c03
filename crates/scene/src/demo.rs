//! Sample scene shared by the desktop viewer and the headless runner.

use std::sync::Arc;

use glam::{Quat, Vec3, Vec4};
use prism_common::{CameraSettings, EntityId, Transform};
use prism_render::{
    GraphicsBackend, Material, Mesh, RenderError, Texture, TextureDesc, TextureFormat,
    TextureSlot, primitives,
};

use crate::SceneError;
use crate::component::{EntityLogic, MeshComponent, UpdateContext};
use crate::fly::FlyCameraController;
use crate::world::{Environment, World};

const CHECKER_SIZE: u32 = 64;
const CHECKER_CELL: u32 = 8;
const SKY_FACE_SIZE: u32 = 32;

const ZENITH: Vec3 = Vec3::new(0.18, 0.36, 0.75);
const HORIZON: Vec3 = Vec3::new(0.78, 0.84, 0.92);
const GROUND: Vec3 = Vec3::new(0.22, 0.2, 0.18);

#[derive(Debug, thiserror::Error)]
pub enum DemoError {
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Scene(#[from] SceneError),
}

/// Entities created by [`populate`].
#[derive(Debug, Clone, Copy)]
pub struct DemoScene {
    pub camera: EntityId,
    pub floor: EntityId,
    pub cubes: [EntityId; 3],
}

/// Turns its entity about +Y at a fixed rate.
#[derive(Debug, Clone, Copy)]
pub struct Spin {
    /// Radians per second.
    pub rate: f32,
}

impl EntityLogic for Spin {
    fn update(&mut self, cx: &mut UpdateContext<'_>, dt: f32) {
        cx.transform.rotation = Quat::from_rotation_y(self.rate * dt) * cx.transform.rotation;
    }
}

/// RGBA8 checkerboard, `cell` pixels per square.
pub fn checker_pixels(size: u32, cell: u32, a: [u8; 4], b: [u8; 4]) -> Vec<u8> {
    let cell = cell.max(1);
    let mut out = Vec::with_capacity((size * size * 4) as usize);
    for y in 0..size {
        for x in 0..size {
            let odd = ((x / cell) + (y / cell)) % 2 == 1;
            out.extend_from_slice(if odd { &b } else { &a });
        }
    }
    out
}

/// Direction through texel center `(x, y)` of cube face `face`, faces
/// ordered +X, -X, +Y, -Y, +Z, -Z.
fn cube_direction(face: usize, x: u32, y: u32, size: u32) -> Vec3 {
    let u = (x as f32 + 0.5) / size as f32 * 2.0 - 1.0;
    let v = (y as f32 + 0.5) / size as f32 * 2.0 - 1.0;
    let dir = match face {
        0 => Vec3::new(1.0, -v, -u),
        1 => Vec3::new(-1.0, -v, u),
        2 => Vec3::new(u, 1.0, v),
        3 => Vec3::new(u, -1.0, -v),
        4 => Vec3::new(u, -v, 1.0),
        _ => Vec3::new(-u, -v, -1.0),
    };
    dir.normalize()
}

fn sky_color(dir: Vec3) -> Vec3 {
    if dir.y >= 0.0 {
        HORIZON.lerp(ZENITH, dir.y.sqrt())
    } else {
        HORIZON.lerp(GROUND, (-dir.y).sqrt().min(1.0))
    }
}

/// Six RGBA8 faces of a vertical gradient sky.
pub fn gradient_sky_pixels(size: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity((size * size * 4 * 6) as usize);
    for face in 0..6 {
        for y in 0..size {
            for x in 0..size {
                let c = sky_color(cube_direction(face, x, y, size)) * 255.0;
                out.extend_from_slice(&[c.x as u8, c.y as u8, c.z as u8, 255]);
            }
        }
    }
    out
}

fn spawn_mesh(
    world: &mut World,
    backend: &mut dyn GraphicsBackend,
    name: &str,
    geometry: (Vec<prism_render::Vertex>, Vec<u32>),
    material: Material,
    transform: Transform,
) -> Result<EntityId, DemoError> {
    let (vertices, indices) = geometry;
    let mut mesh = Mesh::from_indices(backend, name, &vertices, indices)?;
    mesh.set_material(Arc::new(material));

    let entity = world.spawn(name);
    entity.transform = transform;
    entity.add_component(MeshComponent::new(Arc::new(mesh)))?;
    Ok(entity.id())
}

/// Fill `world` with a floor, three cubes, a sky and a fly camera.
pub fn populate(
    world: &mut World,
    backend: &mut dyn GraphicsBackend,
    camera_settings: &CameraSettings,
) -> Result<DemoScene, DemoError> {
    let sky = Texture::new(
        backend,
        TextureDesc::new_cube("sky", SKY_FACE_SIZE, TextureFormat::Rgba8),
        Some(&gradient_sky_pixels(SKY_FACE_SIZE)),
    )?;
    world.set_environment(Environment::Sky, Some(Arc::new(sky)));

    let checker = Texture::new(
        backend,
        TextureDesc::new_2d("checker", CHECKER_SIZE, CHECKER_SIZE, TextureFormat::Rgba8),
        Some(&checker_pixels(
            CHECKER_SIZE,
            CHECKER_CELL,
            [230, 230, 230, 255],
            [40, 40, 48, 255],
        )),
    )?;
    let checker = Arc::new(checker);

    let floor = spawn_mesh(
        world,
        backend,
        "floor",
        primitives::plane(10.0),
        Material::new()
            .with_base_color(Vec4::new(0.55, 0.55, 0.5, 1.0))
            .with_metallic_roughness(0.0, 0.9),
        Transform::default(),
    )?;

    let checkered = spawn_mesh(
        world,
        backend,
        "checker-cube",
        primitives::cube(1.0),
        Material::new().with_texture(TextureSlot::BaseColor, checker),
        Transform::from_position(Vec3::new(-2.0, 0.5, 0.0)),
    )?;

    let glass = spawn_mesh(
        world,
        backend,
        "glass-cube",
        primitives::cube(1.0),
        Material::new()
            .with_base_color(Vec4::new(0.3, 0.6, 0.9, 0.4))
            .with_metallic_roughness(0.0, 0.1)
            .with_blend(true),
        Transform::from_position(Vec3::new(0.0, 0.5, 0.0)),
    )?;
    world.entity_mut(glass)?.set_logic(Spin { rate: 0.6 });

    let glowing = spawn_mesh(
        world,
        backend,
        "glow-cube",
        primitives::cube(0.6),
        Material::new()
            .with_base_color(Vec4::new(0.9, 0.4, 0.1, 1.0))
            .with_emissive(Vec3::new(1.5, 0.6, 0.1)),
        Transform::from_position(Vec3::new(2.0, 0.3, 0.0)),
    )?;

    let camera = {
        let entity = world.spawn("camera");
        entity.transform = Transform::from_position(Vec3::new(0.0, 2.0, -6.0));
        let controller =
            FlyCameraController::from_settings(camera_settings).with_orientation(0.0, -15.0);
        entity.add_component(controller)?;
        entity.id()
    };

    tracing::info!("demo scene ready with {} entities", world.entity_count());
    Ok(DemoScene {
        camera,
        floor,
        cubes: [checkered, glass, glowing],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use prism_render::{Command, RecordingBackend};

    #[test]
    fn checker_alternates_per_cell() {
        let px = checker_pixels(4, 2, [1, 1, 1, 1], [2, 2, 2, 2]);
        assert_eq!(px.len(), 4 * 4 * 4);
        assert_eq!(px[0], 1);
        // (2, 0) starts the second cell
        assert_eq!(px[2 * 4], 2);
        // (2, 2) is diagonal, back to the first color
        assert_eq!(px[(2 * 4 + 2) * 4], 1);
    }

    #[test]
    fn sky_is_brighter_blue_toward_zenith() {
        let px = gradient_sky_pixels(8);
        assert_eq!(px.len(), 8 * 8 * 4 * 6);
        let up = sky_color(Vec3::Y);
        let down = sky_color(Vec3::NEG_Y);
        assert!(up.z > down.z);
        assert!((sky_color(Vec3::X) - HORIZON).length() < 1e-6);
    }

    #[test]
    fn cube_directions_point_at_their_face() {
        let axes = [Vec3::X, Vec3::NEG_X, Vec3::Y, Vec3::NEG_Y, Vec3::Z, Vec3::NEG_Z];
        for (face, axis) in axes.iter().enumerate() {
            let d = cube_direction(face, 3, 4, 8);
            assert!(d.dot(*axis) > 0.5, "face {face}");
        }
    }

    #[test]
    fn populate_builds_drawable_scene() {
        let mut backend = RecordingBackend::new();
        let mut world = World::new();
        let scene = populate(&mut world, &mut backend, &CameraSettings::default()).unwrap();

        assert_eq!(world.entity_count(), 5);
        assert!(world.environment(Environment::Sky).is_some());
        let drawable = world.entities().iter().filter(|e| !e.renderables().is_empty()).count();
        assert_eq!(drawable, 4);
        assert!(
            world
                .entity(scene.camera)
                .and_then(|e| e.component::<FlyCameraController>())
                .is_some()
        );
        let textures = backend
            .take_commands()
            .iter()
            .filter(|c| matches!(c, Command::CreateTexture { .. }))
            .count();
        assert_eq!(textures, 2);
    }

    #[test]
    fn spinning_cube_turns_while_others_stay() {
        let mut backend = RecordingBackend::new();
        let mut world = World::new();
        let scene = populate(&mut world, &mut backend, &CameraSettings::default()).unwrap();
        for _ in 0..5 {
            world.step(0.1);
        }

        let glass = world.entity(scene.cubes[1]).unwrap();
        let turned = glass.transform.rotation.angle_between(Quat::IDENTITY);
        assert!((turned - 0.6 * 0.5).abs() < 1e-3, "turned {turned}");
        let glow = world.entity(scene.cubes[2]).unwrap();
        assert_eq!(glow.transform.rotation, Quat::IDENTITY);
    }
}
