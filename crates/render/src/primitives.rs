//! Procedural geometry used by demos and tests.

use crate::mesh::Vertex;

/// Face of a cube: normal, tangent (u axis) and bitangent (v axis).
const CUBE_FACES: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
    ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
    ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
    ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
    ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
    ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
    ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
];

/// Axis-aligned cube centered at the origin, 24 vertices, CCW front faces.
pub fn cube(size: f32) -> (Vec<Vertex>, Vec<u32>) {
    let p = size * 0.5;
    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);
    for (n, t, b) in CUBE_FACES {
        let base = vertices.len() as u32;
        #[rustfmt::skip]
        let corners = [
            (-1.0, -1.0, [0.0, 1.0]),
            ( 1.0, -1.0, [1.0, 1.0]),
            ( 1.0,  1.0, [1.0, 0.0]),
            (-1.0,  1.0, [0.0, 0.0]),
        ];
        for (su, sv, uv) in corners {
            let position = [
                (n[0] + t[0] * su + b[0] * sv) * p,
                (n[1] + t[1] * su + b[1] * sv) * p,
                (n[2] + t[2] * su + b[2] * sv) * p,
            ];
            vertices.push(Vertex::new(position, n, [t[0], t[1], t[2], 1.0], uv));
        }
        indices.extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 3, base]);
    }
    (vertices, indices)
}

/// Square in the XZ plane facing +Y.
pub fn plane(half_extent: f32) -> (Vec<Vertex>, Vec<u32>) {
    let e = half_extent;
    let n = [0.0, 1.0, 0.0];
    let t = [1.0, 0.0, 0.0, 1.0];
    #[rustfmt::skip]
    let vertices = vec![
        Vertex::new([-e, 0.0,  e], n, t, [0.0, 1.0]),
        Vertex::new([ e, 0.0,  e], n, t, [1.0, 1.0]),
        Vertex::new([ e, 0.0, -e], n, t, [1.0, 0.0]),
        Vertex::new([-e, 0.0, -e], n, t, [0.0, 0.0]),
    ];
    (vertices, vec![0, 1, 2, 2, 3, 0])
}

/// Fullscreen triangle in clip space at depth `z`.
///
/// Covers `[-1, 1]` on both axes after clipping with a single primitive.
pub fn fullscreen_triangle(z: f32) -> [[f32; 3]; 3] {
    [[-1.0, -1.0, z], [3.0, -1.0, z], [-1.0, 3.0, z]]
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn face_normal(v: &[Vertex], tri: &[u32]) -> Vec3 {
        let a = Vec3::from(v[tri[0] as usize].position);
        let b = Vec3::from(v[tri[1] as usize].position);
        let c = Vec3::from(v[tri[2] as usize].position);
        (b - a).cross(c - a).normalize()
    }

    #[test]
    fn cube_triangles_wind_counter_clockwise() {
        let (v, i) = cube(2.0);
        assert_eq!(v.len(), 24);
        assert_eq!(i.len(), 36);
        for tri in i.chunks(3) {
            let geometric = face_normal(&v, tri);
            let declared = Vec3::from(v[tri[0] as usize].normal);
            assert!(geometric.dot(declared) > 0.99, "{geometric} vs {declared}");
        }
    }

    #[test]
    fn cube_extent_matches_size() {
        let (v, _) = cube(2.0);
        for vert in &v {
            assert!(vert.position.iter().all(|c| c.abs() == 1.0));
        }
    }

    #[test]
    fn plane_faces_up() {
        let (v, i) = plane(5.0);
        assert!(face_normal(&v, &i[0..3]).dot(Vec3::Y) > 0.99);
    }

    #[test]
    fn fullscreen_triangle_covers_clip_square() {
        let tri = fullscreen_triangle(1.0);
        assert_eq!(tri[0], [-1.0, -1.0, 1.0]);
        // hypotenuse passes through (1, 1)
        let (x1, y1) = (tri[1][0], tri[1][1]);
        let (x2, y2) = (tri[2][0], tri[2][1]);
        let t = (1.0 - x1) / (x2 - x1);
        assert!((y1 + t * (y2 - y1) - 1.0).abs() < 1e-6);
    }
}
