//! Heightfield mesh core: Perlin-displaced grid generation and localized,
//! incremental deformation.
//!
//! The grid spans the X/Z plane with height on Y. Vertices are stored
//! row-major with index `x * (z_size + 1) + z`, so a row shares its X
//! coordinate and walks along Z.

use bevy::prelude::*;
use noise::{NoiseFn, Perlin};

/// Offset added to noise sample coordinates so integer grid points don't all
/// land on the lattice zeros of the permutation-based noise function.
const NOISE_SAMPLE_OFFSET: f64 = 0.1;

/// A regular grid of vertices with Perlin-noise-displaced height, plus the
/// triangle/normal/tangent buffers needed to turn it into a render mesh.
#[derive(Debug, Clone, Component)]
pub struct Heightfield {
    x_size: u32,
    z_size: u32,
    scale: f32,
    pub positions: Vec<Vec3>,
    pub uvs: Vec<Vec2>,
    pub indices: Vec<u32>,
    pub normals: Vec<Vec3>,
    pub tangents: Vec<Vec4>,
}

impl Heightfield {
    /// Build a full heightfield: vertices, UVs, triangles, normals, tangents.
    ///
    /// `x_size`/`z_size` are cell counts; the vertex grid is one larger in
    /// each direction. Height is `perlin(x, z) * height_multiplier` sampled at
    /// `noise_scale` frequency.
    pub fn generate(
        x_size: u32,
        z_size: u32,
        scale: f32,
        uv_scale: f32,
        noise_scale: f32,
        height_multiplier: f32,
        seed: u32,
    ) -> Self {
        let perlin = Perlin::new(seed);
        let vertex_count = ((x_size + 1) * (z_size + 1)) as usize;
        let mut positions = Vec::with_capacity(vertex_count);
        let mut uvs = Vec::with_capacity(vertex_count);

        for x in 0..=x_size {
            for z in 0..=z_size {
                let height = perlin.get([
                    (x as f32 * noise_scale) as f64 + NOISE_SAMPLE_OFFSET,
                    (z as f32 * noise_scale) as f64 + NOISE_SAMPLE_OFFSET,
                ]) as f32
                    * height_multiplier;
                positions.push(Vec3::new(x as f32 * scale, height, z as f32 * scale));
                uvs.push(Vec2::new(x as f32 * uv_scale, z as f32 * uv_scale));
            }
        }

        let mut field = Heightfield {
            x_size,
            z_size,
            scale,
            positions,
            uvs,
            indices: Self::generate_triangles(x_size, z_size),
            normals: Vec::new(),
            tangents: Vec::new(),
        };
        field.recalculate_tangents();
        field
    }

    /// Two triangles per grid cell, counter-clockwise when viewed from +Y.
    fn generate_triangles(x_size: u32, z_size: u32) -> Vec<u32> {
        let stride = z_size + 1;
        let mut indices = Vec::with_capacity((6 * x_size * z_size) as usize);
        let mut vertex = 0u32;
        for _x in 0..x_size {
            for _z in 0..z_size {
                indices.extend_from_slice(&[
                    vertex,
                    vertex + 1,
                    vertex + stride,
                    vertex + 1,
                    vertex + stride + 1,
                    vertex + stride,
                ]);
                vertex += 1;
            }
            vertex += 1;
        }
        indices
    }

    pub fn x_size(&self) -> u32 {
        self.x_size
    }

    pub fn z_size(&self) -> u32 {
        self.z_size
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty() || self.indices.is_empty()
    }

    #[inline]
    fn vertex_index(&self, x: u32, z: u32) -> usize {
        (x * (self.z_size + 1) + z) as usize
    }

    /// Full normal/tangent recompute: per-triangle face normals and
    /// UV-gradient tangents accumulated per vertex, then orthonormalized.
    /// Used after wholesale (re)generation; deformation uses the cheaper
    /// windowed variant instead.
    pub fn recalculate_tangents(&mut self) {
        let count = self.positions.len();
        let mut normals = vec![Vec3::ZERO; count];
        let mut tangents = vec![Vec3::ZERO; count];

        for tri in self.indices.chunks_exact(3) {
            let (i0, i1, i2) = (tri[0] as usize, tri[1] as usize, tri[2] as usize);
            let (p0, p1, p2) = (self.positions[i0], self.positions[i1], self.positions[i2]);
            let edge1 = p1 - p0;
            let edge2 = p2 - p0;
            let face_normal = edge1.cross(edge2);

            let duv1 = self.uvs[i1] - self.uvs[i0];
            let duv2 = self.uvs[i2] - self.uvs[i0];
            let det = duv1.x * duv2.y - duv2.x * duv1.y;
            let face_tangent = if det.abs() > f32::EPSILON {
                (edge1 * duv2.y - edge2 * duv1.y) / det
            } else {
                Vec3::X
            };

            for &i in &[i0, i1, i2] {
                normals[i] += face_normal;
                tangents[i] += face_tangent;
            }
        }

        self.normals = normals
            .iter()
            .map(|n| n.normalize_or_zero())
            .collect();
        self.tangents = normals
            .iter()
            .zip(&tangents)
            .map(|(&n, &t)| {
                let n = n.normalize_or_zero();
                // Gram-Schmidt against the vertex normal.
                let t = (t - n * n.dot(t)).normalize_or_zero();
                t.extend(1.0)
            })
            .collect();
    }

    /// Push every vertex within `radius` of `impact` (local space) down by
    /// `depth`, then renormalize the touched window plus a one-cell halo.
    ///
    /// Returns whether any vertex moved; an impact outside the grid or a
    /// non-positive radius is a no-op, as is an ungenerated mesh.
    pub fn deform(&mut self, impact: Vec3, radius: f32, depth: Vec3) -> bool {
        if self.is_empty() || radius <= 0.0 || self.scale <= 0.0 {
            return false;
        }

        // Index window covering the radius, one extra step of slack, clamped
        // to the vertex grid.
        let steps = (radius / self.scale).ceil() as i64 + 1;
        let center_x = (impact.x / self.scale).round() as i64;
        let center_z = (impact.z / self.scale).round() as i64;
        let x0 = (center_x - steps).clamp(0, self.x_size as i64) as u32;
        let x1 = (center_x + steps).clamp(0, self.x_size as i64) as u32;
        let z0 = (center_z - steps).clamp(0, self.z_size as i64) as u32;
        let z1 = (center_z + steps).clamp(0, self.z_size as i64) as u32;

        let radius_sq = radius * radius;
        let mut modified = false;
        for x in x0..=x1 {
            for z in z0..=z1 {
                let i = self.vertex_index(x, z);
                if self.positions[i].distance_squared(impact) < radius_sq {
                    self.positions[i] -= depth;
                    modified = true;
                }
            }
        }

        if modified {
            self.renormalize_window(
                x0.saturating_sub(1),
                (x1 + 1).min(self.x_size),
                z0.saturating_sub(1),
                (z1 + 1).min(self.z_size),
            );
        }
        modified
    }

    /// Finite-difference renormalization of an index window. Normals come
    /// from the cross product of the two neighbor-to-neighbor tangent vectors
    /// (neighbors clamped at grid edges); an approximation of the averaged
    /// triangle normal that keeps deformation cost proportional to the
    /// affected area.
    fn renormalize_window(&mut self, x0: u32, x1: u32, z0: u32, z1: u32) {
        for x in x0..=x1 {
            for z in z0..=z1 {
                let left = self.vertex_index(x.saturating_sub(1), z);
                let right = self.vertex_index((x + 1).min(self.x_size), z);
                let down = self.vertex_index(x, z.saturating_sub(1));
                let up = self.vertex_index(x, (z + 1).min(self.z_size));

                let tangent_x = self.positions[right] - self.positions[left];
                let tangent_z = self.positions[up] - self.positions[down];

                let i = self.vertex_index(x, z);
                self.normals[i] = tangent_z.cross(tangent_x).normalize_or_zero();
                self.tangents[i] = tangent_x.normalize_or_zero().extend(1.0);
            }
        }
    }

    /// Normal at the vertex nearest to a local-space point, for impact
    /// notifications. `None` when the mesh is empty.
    pub fn normal_near(&self, local_point: Vec3) -> Option<Vec3> {
        if self.is_empty() || self.scale <= 0.0 {
            return None;
        }
        let x = (local_point.x / self.scale)
            .round()
            .clamp(0.0, self.x_size as f32) as u32;
        let z = (local_point.z / self.scale)
            .round()
            .clamp(0.0, self.z_size as f32) as u32;
        self.normals.get(self.vertex_index(x, z)).copied()
    }

    /// Position of a uniformly sampled grid vertex, for portal placement.
    pub fn random_vertex<R: rand::Rng>(&self, rng: &mut R) -> Option<Vec3> {
        if self.positions.is_empty() {
            return None;
        }
        let i = rng.gen_range(0..self.positions.len());
        Some(self.positions[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_field(x_size: u32, z_size: u32, scale: f32) -> Heightfield {
        // Zero multiplier flattens the noise contribution entirely.
        Heightfield::generate(x_size, z_size, scale, 1.0, 0.1, 0.0, 0)
    }

    #[test]
    fn vertex_and_triangle_counts_match_grid() {
        for (x, z) in [(1, 1), (2, 3), (10, 10), (7, 1)] {
            let field = Heightfield::generate(x, z, 100.0, 1.0, 0.05, 300.0, 42);
            assert_eq!(field.positions.len(), ((x + 1) * (z + 1)) as usize);
            assert_eq!(field.uvs.len(), field.positions.len());
            assert_eq!(field.indices.len(), (6 * x * z) as usize);
            assert!(field
                .indices
                .iter()
                .all(|&i| (i as usize) < field.positions.len()));
        }
    }

    #[test]
    fn flat_grid_winding_faces_up() {
        let field = flat_field(4, 3, 50.0);
        for tri in field.indices.chunks_exact(3) {
            let p0 = field.positions[tri[0] as usize];
            let p1 = field.positions[tri[1] as usize];
            let p2 = field.positions[tri[2] as usize];
            let normal = (p1 - p0).cross(p2 - p0);
            assert!(normal.y > 0.0, "triangle {tri:?} winds downward");
        }
    }

    #[test]
    fn generated_normals_are_unit_length() {
        let field = Heightfield::generate(6, 6, 100.0, 1.0, 0.3, 250.0, 7);
        for n in &field.normals {
            assert!((n.length() - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn deform_with_non_positive_radius_is_noop() {
        let mut field = flat_field(4, 4, 100.0);
        let before = field.positions.clone();
        assert!(!field.deform(Vec3::new(200.0, 0.0, 200.0), 0.0, Vec3::Y * 10.0));
        assert!(!field.deform(Vec3::new(200.0, 0.0, 200.0), -5.0, Vec3::Y * 10.0));
        assert_eq!(field.positions, before);
    }

    #[test]
    fn deform_far_outside_grid_is_noop() {
        let mut field = flat_field(4, 4, 100.0);
        let before = field.positions.clone();
        assert!(!field.deform(Vec3::new(1e6, 0.0, 1e6), 50.0, Vec3::Y * 10.0));
        assert_eq!(field.positions, before);
    }

    #[test]
    fn deform_covering_whole_grid_hits_every_vertex_once() {
        let mut field = flat_field(3, 3, 10.0);
        let center = Vec3::new(15.0, 0.0, 15.0);
        let depth = Vec3::Y * 2.0;
        assert!(field.deform(center, 1000.0, depth));
        for p in &field.positions {
            assert!((p.y - (-2.0)).abs() < 1e-6, "vertex at {p:?}");
        }
    }

    #[test]
    fn deform_renormalizes_touched_region_to_unit_length() {
        let mut field = flat_field(8, 8, 10.0);
        assert!(field.deform(Vec3::new(40.0, 0.0, 40.0), 25.0, Vec3::Y * 5.0));
        for n in &field.normals {
            assert!((n.length() - 1.0).abs() < 1e-4);
        }
        // The crater must actually tilt normals near its rim.
        assert!(field.normals.iter().any(|n| n.y < 0.999));
    }

    #[test]
    fn crater_matches_radius_boundary() {
        // 2x2 cells at scale 100, flat: vertices at 0/100/200 on both axes.
        // A radius-120 hit at the grid center reaches the center vertex and
        // the four edge midpoints (distance 100) but not the corners
        // (distance ~141).
        let mut field = flat_field(2, 2, 100.0);
        let impact = Vec3::new(100.0, 0.0, 100.0);
        assert!(field.deform(impact, 120.0, Vec3::Y * 10.0));
        for (i, p) in field.positions.iter().enumerate() {
            let x = (i as u32) / 3;
            let z = (i as u32) % 3;
            let original = Vec3::new(x as f32 * 100.0, 0.0, z as f32 * 100.0);
            if original.distance(impact) < 120.0 {
                assert!((p.y + 10.0).abs() < 1e-6, "vertex ({x},{z}) not sunk");
            } else {
                assert!(p.y.abs() < 1e-6, "vertex ({x},{z}) moved");
            }
        }
    }

    #[test]
    fn deform_near_edge_clamps_indices() {
        let mut field = flat_field(4, 4, 10.0);
        // Impact at the corner; window clamps rather than wrapping/underflow.
        assert!(field.deform(Vec3::ZERO, 15.0, Vec3::Y));
        assert!((field.positions[0].y + 1.0).abs() < 1e-6);
        for n in &field.normals {
            assert!((n.length() - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn normal_near_reports_crater_wall_tilt() {
        let mut field = flat_field(8, 8, 10.0);
        field.deform(Vec3::new(40.0, 0.0, 40.0), 15.0, Vec3::Y * 8.0);
        let rim = field.normal_near(Vec3::new(50.0, 0.0, 40.0)).unwrap();
        assert!(rim.y < 1.0);
        assert!((rim.length() - 1.0).abs() < 1e-4);
    }
}
