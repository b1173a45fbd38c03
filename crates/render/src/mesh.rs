use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use serde::Serialize;

use crate::backend::{BufferHandle, GraphicsBackend, RenderError};
use crate::material::Material;

/// Vertex layouts understood by every backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum VertexLayout {
    /// [`Vertex`].
    Mesh,
    /// `[f32; 3]` clip-space position, used by fullscreen triangles.
    Position,
}

impl VertexLayout {
    pub fn stride(self) -> usize {
        match self {
            VertexLayout::Mesh => std::mem::size_of::<Vertex>(),
            VertexLayout::Position => std::mem::size_of::<[f32; 3]>(),
        }
    }
}

/// Mesh vertex: position, normal, tangent (w = handedness), uv.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub tangent: [f32; 4],
    pub uv: [f32; 2],
}

impl Vertex {
    pub fn new(position: [f32; 3], normal: [f32; 3], tangent: [f32; 4], uv: [f32; 2]) -> Self {
        Self {
            position,
            normal,
            tangent,
            uv,
        }
    }
}

/// Index range of a mesh drawn with one material.
#[derive(Debug, Clone)]
pub struct SubMesh {
    index_buffer: BufferHandle,
    index_count: u32,
    material: Option<Arc<Material>>,
}

impl SubMesh {
    pub fn index_buffer(&self) -> BufferHandle {
        self.index_buffer
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    pub fn material(&self) -> Option<&Arc<Material>> {
        self.material.as_ref()
    }
}

/// GPU geometry: one immutable vertex buffer and its sub-meshes.
///
/// # Invariants
/// - The vertex buffer is created in the constructor and never replaced.
/// - Every index is below `vertex_count`.
/// - [`Mesh::destroy`] releases the vertex buffer and every index buffer.
#[derive(Debug)]
pub struct Mesh {
    label: String,
    vertex_buffer: BufferHandle,
    vertex_count: u32,
    submeshes: Vec<SubMesh>,
}

/// `len` as a draw count, rejecting lengths that do not fit in `u32`.
fn checked_count(label: &str, what: &str, len: usize) -> Result<u32, RenderError> {
    u32::try_from(len).map_err(|_| RenderError::InvalidMesh {
        label: label.to_string(),
        reason: format!("{len} {what} exceed the u32 draw range"),
    })
}

impl Mesh {
    /// Build a mesh from vertices and `(indices, material)` groups.
    pub fn new(
        backend: &mut dyn GraphicsBackend,
        label: impl Into<String>,
        vertices: &[Vertex],
        groups: Vec<(Vec<u32>, Option<Arc<Material>>)>,
    ) -> Result<Self, RenderError> {
        let label = label.into();
        if vertices.is_empty() {
            return Err(RenderError::InvalidMesh {
                label,
                reason: "no vertices".into(),
            });
        }
        let vertex_count = checked_count(&label, "vertices", vertices.len())?;
        for (i, (indices, _)) in groups.iter().enumerate() {
            checked_count(&label, "indices", indices.len())?;
            if indices.is_empty() {
                return Err(RenderError::InvalidMesh {
                    label,
                    reason: format!("submesh {i} has no indices"),
                });
            }
            if let Some(bad) = indices.iter().find(|&&ix| ix >= vertex_count) {
                return Err(RenderError::InvalidMesh {
                    label,
                    reason: format!("submesh {i} index {bad} >= vertex count {vertex_count}"),
                });
            }
        }

        let vertex_buffer =
            backend.create_vertex_buffer(&label, VertexLayout::Mesh, bytemuck::cast_slice(vertices))?;
        let mut submeshes: Vec<SubMesh> = Vec::with_capacity(groups.len());
        for (indices, material) in groups {
            let index_buffer = match backend.create_index_buffer(&label, &indices) {
                Ok(handle) => handle,
                Err(e) => {
                    backend.destroy_buffer(vertex_buffer);
                    for sm in &submeshes {
                        backend.destroy_buffer(sm.index_buffer);
                    }
                    return Err(e);
                }
            };
            submeshes.push(SubMesh {
                index_buffer,
                // bounded by the check above
                index_count: indices.len() as u32,
                material,
            });
        }

        tracing::debug!(
            "created mesh `{}`: {} vertices, {} submeshes",
            label,
            vertex_count,
            submeshes.len()
        );
        Ok(Self {
            label,
            vertex_buffer,
            vertex_count,
            submeshes,
        })
    }

    /// Single sub-mesh without a material.
    pub fn from_indices(
        backend: &mut dyn GraphicsBackend,
        label: impl Into<String>,
        vertices: &[Vertex],
        indices: Vec<u32>,
    ) -> Result<Self, RenderError> {
        Self::new(backend, label, vertices, vec![(indices, None)])
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn vertex_buffer(&self) -> BufferHandle {
        self.vertex_buffer
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    pub fn submeshes(&self) -> &[SubMesh] {
        &self.submeshes
    }

    /// Apply one material to every sub-mesh.
    pub fn set_material(&mut self, material: Arc<Material>) {
        for sm in &mut self.submeshes {
            sm.material = Some(material.clone());
        }
    }

    pub fn set_submesh_material(
        &mut self,
        index: usize,
        material: Option<Arc<Material>>,
    ) -> Result<(), RenderError> {
        let count = self.submeshes.len();
        let sm = self
            .submeshes
            .get_mut(index)
            .ok_or(RenderError::SubMeshOutOfRange { index, count })?;
        sm.material = material;
        Ok(())
    }

    pub fn destroy(self, backend: &mut dyn GraphicsBackend) {
        for sm in &self.submeshes {
            backend.destroy_buffer(sm.index_buffer);
        }
        backend.destroy_buffer(self.vertex_buffer);
        tracing::debug!("destroyed mesh `{}`", self.label);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives;
    use crate::recording::{Command, RecordingBackend};

    #[test]
    fn vertex_is_tightly_packed() {
        assert_eq!(std::mem::size_of::<Vertex>(), 48);
        assert_eq!(VertexLayout::Mesh.stride(), 48);
        assert_eq!(VertexLayout::Position.stride(), 12);
    }

    #[test]
    fn from_indices_creates_one_submesh() {
        let mut backend = RecordingBackend::new();
        let (v, i) = primitives::cube(1.0);
        let mesh = Mesh::from_indices(&mut backend, "cube", &v, i).unwrap();
        assert_eq!(mesh.submeshes().len(), 1);
        assert_eq!(mesh.submeshes()[0].index_count(), 36);
        assert_eq!(mesh.vertex_count(), 24);
        assert!(mesh.submeshes()[0].material().is_none());
        assert_eq!(backend.live_buffer_count(), 2);
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let mut backend = RecordingBackend::new();
        let (v, _) = primitives::cube(1.0);
        let err = Mesh::from_indices(&mut backend, "bad", &v, vec![0, 1, 99]).unwrap_err();
        assert!(matches!(err, RenderError::InvalidMesh { .. }));
        assert_eq!(backend.live_buffer_count(), 0);
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn counts_beyond_u32_are_rejected() {
        assert_eq!(checked_count("m", "vertices", 24).unwrap(), 24);
        let too_many = u32::MAX as usize + 1;
        let err = checked_count("m", "vertices", too_many).unwrap_err();
        assert!(matches!(err, RenderError::InvalidMesh { ref label, .. } if label == "m"));
    }

    #[test]
    fn empty_vertices_are_rejected() {
        let mut backend = RecordingBackend::new();
        assert!(Mesh::from_indices(&mut backend, "empty", &[], vec![0]).is_err());
    }

    #[test]
    fn set_material_reaches_every_submesh() {
        let mut backend = RecordingBackend::new();
        let (v, i) = primitives::cube(1.0);
        let mut mesh =
            Mesh::new(&mut backend, "two", &v, vec![(i.clone(), None), (i, None)]).unwrap();
        let mat = Arc::new(Material::default().with_blend(true));
        mesh.set_material(mat.clone());
        assert!(mesh.submeshes().iter().all(|s| s.material().is_some()));

        mesh.set_submesh_material(1, None).unwrap();
        assert!(mesh.submeshes()[1].material().is_none());
        assert!(matches!(
            mesh.set_submesh_material(5, None),
            Err(RenderError::SubMeshOutOfRange { index: 5, count: 2 })
        ));
        assert_eq!(Arc::strong_count(&mat), 2);
    }

    #[test]
    fn destroy_releases_all_buffers() {
        let mut backend = RecordingBackend::new();
        let (v, i) = primitives::cube(1.0);
        let mesh = Mesh::new(&mut backend, "m", &v, vec![(i.clone(), None), (i, None)]).unwrap();
        let vb = mesh.vertex_buffer();
        assert_eq!(backend.live_buffer_count(), 3);
        mesh.destroy(&mut backend);
        assert_eq!(backend.live_buffer_count(), 0);
        assert!(
            backend
                .commands()
                .iter()
                .any(|c| matches!(c, Command::DestroyBuffer(h) if *h == vb))
        );
    }
}
