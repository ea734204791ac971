//! Polygon triangulation by ear clipping.

use crate::scene::{Face, VertexAttribute};
use glam::{DVec2, DVec3};

/// Reusable triangulation scratch space.
///
/// Output triangles are corner indices into the mesh's corner stream and
/// keep the winding of the source polygon. A face with `n >= 3` corners
/// always yields exactly `n - 2` triangles.
pub struct Triangulator {
    indices: Vec<u32>,
    remaining: Vec<usize>,
    points: Vec<DVec2>,
}

impl Triangulator {
    /// Create a triangulator sized for faces of up to `max_triangles` triangles.
    pub fn with_capacity(max_triangles: usize) -> Self {
        Self {
            indices: Vec::with_capacity(max_triangles * 3),
            remaining: Vec::with_capacity(max_triangles + 2),
            points: Vec::with_capacity(max_triangles + 2),
        }
    }

    /// Triangulate `face`, returning three corner indices per triangle.
    pub fn triangulate(&mut self, positions: &VertexAttribute<[f64; 3]>, face: Face) -> &[u32] {
        self.indices.clear();
        let begin = face.index_begin;
        let n = face.num_indices as usize;

        match n {
            0..=2 => {}
            3 => self.indices.extend_from_slice(&[begin, begin + 1, begin + 2]),
            _ => {
                self.project(positions, face);
                if !self.clip_ears(begin) {
                    self.fan_remaining(begin);
                }
            }
        }
        &self.indices
    }

    /// Project the face onto the plane that drops its dominant normal axis.
    fn project(&mut self, positions: &VertexAttribute<[f64; 3]>, face: Face) {
        let normal = face_normal(positions, face).abs();
        self.points.clear();
        self.points.extend(face.corners().map(|corner| {
            let p = corner_position(positions, corner);
            if normal.x >= normal.y && normal.x >= normal.z {
                DVec2::new(p.y, p.z)
            } else if normal.y >= normal.z {
                DVec2::new(p.z, p.x)
            } else {
                DVec2::new(p.x, p.y)
            }
        }));
        self.remaining.clear();
        self.remaining.extend(0..self.points.len());
    }

    /// Clip ears until a triangle remains. Returns `false` if no ear could be
    /// found, leaving the unclipped polygon in `remaining`.
    fn clip_ears(&mut self, begin: u32) -> bool {
        let orientation = signed_area(&self.points).signum();
        if orientation == 0.0 {
            return false;
        }

        let mut k = 1;
        let mut misses = 0;
        while self.remaining.len() > 3 {
            let len = self.remaining.len();
            let prev = self.remaining[(k + len - 1) % len];
            let curr = self.remaining[k];
            let next = self.remaining[(k + 1) % len];

            if self.is_ear(prev, curr, next, orientation) {
                self.push_triangle(begin, prev, curr, next);
                self.remaining.remove(k);
                if k >= self.remaining.len() {
                    k = 0;
                }
                misses = 0;
            } else {
                k = (k + 1) % len;
                misses += 1;
                if misses > len {
                    return false;
                }
            }
        }

        let (a, b, c) = (self.remaining[0], self.remaining[1], self.remaining[2]);
        self.push_triangle(begin, a, b, c);
        true
    }

    fn is_ear(&self, prev: usize, curr: usize, next: usize, orientation: f64) -> bool {
        let (a, b, c) = (self.points[prev], self.points[curr], self.points[next]);
        if (b - a).perp_dot(c - b) * orientation <= 0.0 {
            return false;
        }
        !self.remaining.iter().any(|&i| {
            if i == prev || i == curr || i == next {
                return false;
            }
            let p = self.points[i];
            if p == a || p == b || p == c {
                return false;
            }
            (b - a).perp_dot(p - a) * orientation >= 0.0
                && (c - b).perp_dot(p - b) * orientation >= 0.0
                && (a - c).perp_dot(p - c) * orientation >= 0.0
        })
    }

    fn fan_remaining(&mut self, begin: u32) {
        for i in 1..self.remaining.len().saturating_sub(1) {
            let (a, b, c) = (self.remaining[0], self.remaining[i], self.remaining[i + 1]);
            self.push_triangle(begin, a, b, c);
        }
    }

    fn push_triangle(&mut self, begin: u32, a: usize, b: usize, c: usize) {
        self.indices
            .extend_from_slice(&[begin + a as u32, begin + b as u32, begin + c as u32]);
    }
}

fn corner_position(positions: &VertexAttribute<[f64; 3]>, corner: usize) -> DVec3 {
    positions.get(corner).map(DVec3::from).unwrap_or(DVec3::ZERO)
}

fn signed_area(points: &[DVec2]) -> f64 {
    let n = points.len();
    (0..n)
        .map(|i| points[i].perp_dot(points[(i + 1) % n]))
        .sum::<f64>()
        * 0.5
}

/// Area-weighted normal of `face` in local space (not normalized).
///
/// Sum of the fan cross products around the first corner; zero for
/// degenerate faces.
pub fn face_normal(positions: &VertexAttribute<[f64; 3]>, face: Face) -> DVec3 {
    let mut corners = face.corners();
    let Some(first) = corners.next() else {
        return DVec3::ZERO;
    };
    let origin = corner_position(positions, first);
    let rest: Vec<DVec3> = corners
        .map(|corner| corner_position(positions, corner) - origin)
        .collect();
    rest.windows(2).map(|w| w[0].cross(w[1])).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::RawMesh;

    fn triangles(mesh: &RawMesh, face: usize) -> Vec<[u32; 3]> {
        let mut triangulator = Triangulator::with_capacity(mesh.max_face_triangles());
        triangulator
            .triangulate(&mesh.vertex_position, mesh.faces[face])
            .chunks(3)
            .map(|t| [t[0], t[1], t[2]])
            .collect()
    }

    #[test]
    fn test_triangle_passes_through() {
        let mesh = RawMesh::from_polygons(vec![[0.0; 3]; 3], &[&[0, 1, 2]]);
        assert_eq!(triangles(&mesh, 0), vec![[0, 1, 2]]);
    }

    #[test]
    fn test_degenerate_face_yields_nothing() {
        let mesh = RawMesh::from_polygons(vec![[0.0; 3]; 2], &[&[0, 1]]);
        assert!(triangles(&mesh, 0).is_empty());
    }

    #[test]
    fn test_convex_quad() {
        let mesh = RawMesh::from_polygons(
            vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0]],
            &[&[0, 1, 2, 3]],
        );
        assert_eq!(triangles(&mesh, 0), vec![[0, 1, 2], [0, 2, 3]]);
    }

    #[test]
    fn test_corner_offsets_follow_face_start() {
        let mesh = RawMesh::from_polygons(
            vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0]],
            &[&[0, 1, 2], &[0, 1, 2, 3]],
        );
        assert_eq!(triangles(&mesh, 1), vec![[3, 4, 5], [3, 5, 6]]);
    }

    #[test]
    fn test_concave_polygon_stays_inside() {
        // An arrow pointing up in the XZ plane; corner 4 is the reflex notch.
        let positions = vec![
            [0.0, 0.0, 0.0],
            [2.0, 0.0, 0.0],
            [2.0, 0.0, 2.0],
            [1.0, 0.0, 3.0],
            [1.0, 0.0, 1.0],
            [0.0, 0.0, 2.0],
        ];
        let mesh = RawMesh::from_polygons(positions.clone(), &[&[0, 1, 2, 3, 4, 5]]);
        let tris = triangles(&mesh, 0);
        assert_eq!(tris.len(), 4);

        // Total triangle area equals the polygon area (no overlap, no spill).
        let area: f64 = tris
            .iter()
            .map(|t| {
                let p = |i: u32| DVec3::from(positions[i as usize]);
                (p(t[1]) - p(t[0])).cross(p(t[2]) - p(t[0])).length() * 0.5
            })
            .sum();
        let polygon = face_normal(&mesh.vertex_position, mesh.faces[0]).length() * 0.5;
        assert!((area - polygon).abs() < 1e-9);
    }

    #[test]
    fn test_collinear_polygon_falls_back_to_fan() {
        let mesh = RawMesh::from_polygons(
            vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [2.0, 0.0, 0.0], [3.0, 0.0, 0.0]],
            &[&[0, 1, 2, 3]],
        );
        assert_eq!(triangles(&mesh, 0), vec![[0, 1, 2], [0, 2, 3]]);
    }

    #[test]
    fn test_face_normal() {
        let mesh = RawMesh::from_polygons(
            vec![[0.0, 0.0, 0.0], [2.0, 0.0, 0.0], [2.0, 2.0, 0.0], [0.0, 2.0, 0.0]],
            &[&[0, 1, 2, 3]],
        );
        let n = face_normal(&mesh.vertex_position, mesh.faces[0]);
        assert_eq!(n, DVec3::new(0.0, 0.0, 8.0));
    }
}
