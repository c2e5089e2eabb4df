//! CPU-side mesh data, primitives and spatial transforms.
//!
//! This module provides the geometry building blocks used by the scene graph:
//!
//! - [`Vertex3d`] is the vertex format shared by every pipeline: position, normal, UV and tangent
//! - [`MeshData`] holds vertex/index data kept on the CPU so it can be both uploaded and picked against
//! - [`Transform`] is the position, rotation and scale of a scene graph node
//!
//! Meshes stay on the CPU until a backend draws them. The wgpu backend
//! uploads each [`MeshId`](crate::library::MeshId) the first time it is seen,
//! while the picking engine intersects rays against the same [`MeshData`].
//!
//! # Primitives
//!
//! ```
//! use scenerig::MeshData;
//!
//! let cube = MeshData::cube(1.0);
//! assert_eq!(cube.triangle_count(), 12);
//!
//! let grid = MeshData::grid(100.0, 10.0);
//! assert!(grid.is_lines());
//! ```
//!
//! # Vertex Layout
//!
//! | Attribute | Format    | Offset | Shader Location |
//! |-----------|-----------|--------|-----------------|
//! | position  | Float32x3 | 0      | 0               |
//! | normal    | Float32x3 | 12     | 1               |
//! | uv        | Float32x2 | 24     | 2               |
//! | tangent   | Float32x3 | 32     | 3               |

use glam::{Mat4, Quat, Vec2, Vec3};

/// A vertex with position, normal, texture coordinates and tangent.
///
/// The tangent is only read by pipelines that sample a normal map, but every
/// mesh carries one so a single vertex layout serves all passes.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex3d {
    /// Model-space position.
    pub position: [f32; 3],
    /// Surface normal (normalized).
    pub normal: [f32; 3],
    /// Texture coordinates, typically in `[0, 1]`.
    pub uv: [f32; 2],
    /// Tangent along increasing `u`, used for tangent-space normal mapping.
    pub tangent: [f32; 3],
}

impl Vertex3d {
    /// The wgpu vertex buffer layout descriptor for this vertex type.
    pub const LAYOUT: wgpu::VertexBufferLayout<'static> = wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<Vertex3d>() as u64,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &[
            // position
            wgpu::VertexAttribute {
                offset: 0,
                shader_location: 0,
                format: wgpu::VertexFormat::Float32x3,
            },
            // normal
            wgpu::VertexAttribute {
                offset: 12,
                shader_location: 1,
                format: wgpu::VertexFormat::Float32x3,
            },
            // uv
            wgpu::VertexAttribute {
                offset: 24,
                shader_location: 2,
                format: wgpu::VertexFormat::Float32x2,
            },
            // tangent
            wgpu::VertexAttribute {
                offset: 32,
                shader_location: 3,
                format: wgpu::VertexFormat::Float32x3,
            },
        ],
    };

    /// Creates a vertex with a default +X tangent.
    pub fn new(position: [f32; 3], normal: [f32; 3], uv: [f32; 2]) -> Self {
        Self {
            position,
            normal,
            uv,
            tangent: [1.0, 0.0, 0.0],
        }
    }

    /// Creates a vertex for line primitives, which carry no surface data.
    pub fn point(position: Vec3) -> Self {
        Self::new(position.to_array(), [0.0, 0.0, 1.0], [0.0, 0.0])
    }

    pub fn position(&self) -> Vec3 {
        Vec3::from_array(self.position)
    }
}

/// How the indices of a [`MeshData`] are assembled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Topology {
    /// Every three indices form a triangle.
    Triangles,
    /// Every two indices form a line segment.
    Lines,
}

/// Geometry kept on the CPU: vertices, indices and topology.
///
/// Triangle meshes are pickable; line meshes (grids, rays, frustum outlines)
/// are only ever drawn.
#[derive(Clone, Debug, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<Vertex3d>,
    pub indices: Vec<u32>,
    pub topology: Topology,
}

impl MeshData {
    /// Creates a triangle mesh and fills in per-vertex tangents.
    pub fn triangles(vertices: Vec<Vertex3d>, indices: Vec<u32>) -> Self {
        let mut mesh = Self {
            vertices,
            indices,
            topology: Topology::Triangles,
        };
        mesh.compute_tangents();
        mesh
    }

    /// Creates a line list from pairs of end points.
    pub fn lines(segments: &[(Vec3, Vec3)]) -> Self {
        let mut vertices = Vec::with_capacity(segments.len() * 2);
        for (a, b) in segments {
            vertices.push(Vertex3d::point(*a));
            vertices.push(Vertex3d::point(*b));
        }
        let indices = (0..vertices.len() as u32).collect();
        Self {
            vertices,
            indices,
            topology: Topology::Lines,
        }
    }

    pub fn is_lines(&self) -> bool {
        self.topology == Topology::Lines
    }

    /// Number of triangles, or zero for line meshes.
    pub fn triangle_count(&self) -> usize {
        match self.topology {
            Topology::Triangles => self.indices.len() / 3,
            Topology::Lines => 0,
        }
    }

    /// Returns the corners of triangle `index`, if it exists.
    pub fn triangle(&self, index: usize) -> Option<[Vec3; 3]> {
        if index >= self.triangle_count() {
            return None;
        }
        let i = index * 3;
        let corner = |k: usize| {
            self.vertices
                .get(self.indices[i + k] as usize)
                .map(Vertex3d::position)
        };
        Some([corner(0)?, corner(1)?, corner(2)?])
    }

    /// Iterates over all triangles in index order.
    pub fn triangles_iter(&self) -> impl Iterator<Item = [Vec3; 3]> + '_ {
        (0..self.triangle_count()).filter_map(|i| self.triangle(i))
    }

    /// Axis-aligned bounds as `(min, max)`, or `None` for an empty mesh.
    pub fn bounds(&self) -> Option<(Vec3, Vec3)> {
        let first = self.vertices.first()?.position();
        Some(self.vertices.iter().fold((first, first), |(min, max), v| {
            let p = v.position();
            (min.min(p), max.max(p))
        }))
    }

    fn compute_tangents(&mut self) {
        let mut accum = vec![Vec3::ZERO; self.vertices.len()];

        for tri in self.indices.chunks_exact(3) {
            let [a, b, c] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
            if a >= self.vertices.len() || b >= self.vertices.len() || c >= self.vertices.len() {
                continue;
            }
            let (p0, p1, p2) = (
                self.vertices[a].position(),
                self.vertices[b].position(),
                self.vertices[c].position(),
            );
            let (uv0, uv1, uv2) = (
                Vec2::from_array(self.vertices[a].uv),
                Vec2::from_array(self.vertices[b].uv),
                Vec2::from_array(self.vertices[c].uv),
            );
            let (e1, e2) = (p1 - p0, p2 - p0);
            let (d1, d2) = (uv1 - uv0, uv2 - uv0);
            let det = d1.x * d2.y - d2.x * d1.y;
            if det.abs() < f32::EPSILON {
                continue;
            }
            let tangent = (e1 * d2.y - e2 * d1.y) / det;
            for i in [a, b, c] {
                accum[i] += tangent;
            }
        }

        for (vertex, t) in self.vertices.iter_mut().zip(accum) {
            let n = Vec3::from_array(vertex.normal);
            // Gram-Schmidt against the normal
            let t = (t - n * n.dot(t)).normalize_or_zero();
            if t != Vec3::ZERO {
                vertex.tangent = t.to_array();
            }
        }
    }

    /// A cube of edge length `size` centered at the origin.
    ///
    /// Each face has its own four vertices so normals stay flat.
    pub fn cube(size: f32) -> Self {
        let h = size * 0.5;
        #[rustfmt::skip]
        let vertices = vec![
            // Front face (Z+)
            Vertex3d::new([-h, -h,  h], [ 0.0,  0.0,  1.0], [0.0, 0.0]),
            Vertex3d::new([ h, -h,  h], [ 0.0,  0.0,  1.0], [1.0, 0.0]),
            Vertex3d::new([ h,  h,  h], [ 0.0,  0.0,  1.0], [1.0, 1.0]),
            Vertex3d::new([-h,  h,  h], [ 0.0,  0.0,  1.0], [0.0, 1.0]),
            // Back face (Z-)
            Vertex3d::new([ h, -h, -h], [ 0.0,  0.0, -1.0], [0.0, 0.0]),
            Vertex3d::new([-h, -h, -h], [ 0.0,  0.0, -1.0], [1.0, 0.0]),
            Vertex3d::new([-h,  h, -h], [ 0.0,  0.0, -1.0], [1.0, 1.0]),
            Vertex3d::new([ h,  h, -h], [ 0.0,  0.0, -1.0], [0.0, 1.0]),
            // Top face (Y+)
            Vertex3d::new([-h,  h,  h], [ 0.0,  1.0,  0.0], [0.0, 0.0]),
            Vertex3d::new([ h,  h,  h], [ 0.0,  1.0,  0.0], [1.0, 0.0]),
            Vertex3d::new([ h,  h, -h], [ 0.0,  1.0,  0.0], [1.0, 1.0]),
            Vertex3d::new([-h,  h, -h], [ 0.0,  1.0,  0.0], [0.0, 1.0]),
            // Bottom face (Y-)
            Vertex3d::new([-h, -h, -h], [ 0.0, -1.0,  0.0], [0.0, 0.0]),
            Vertex3d::new([ h, -h, -h], [ 0.0, -1.0,  0.0], [1.0, 0.0]),
            Vertex3d::new([ h, -h,  h], [ 0.0, -1.0,  0.0], [1.0, 1.0]),
            Vertex3d::new([-h, -h,  h], [ 0.0, -1.0,  0.0], [0.0, 1.0]),
            // Right face (X+)
            Vertex3d::new([ h, -h,  h], [ 1.0,  0.0,  0.0], [0.0, 0.0]),
            Vertex3d::new([ h, -h, -h], [ 1.0,  0.0,  0.0], [1.0, 0.0]),
            Vertex3d::new([ h,  h, -h], [ 1.0,  0.0,  0.0], [1.0, 1.0]),
            Vertex3d::new([ h,  h,  h], [ 1.0,  0.0,  0.0], [0.0, 1.0]),
            // Left face (X-)
            Vertex3d::new([-h, -h, -h], [-1.0,  0.0,  0.0], [0.0, 0.0]),
            Vertex3d::new([-h, -h,  h], [-1.0,  0.0,  0.0], [1.0, 0.0]),
            Vertex3d::new([-h,  h,  h], [-1.0,  0.0,  0.0], [1.0, 1.0]),
            Vertex3d::new([-h,  h, -h], [-1.0,  0.0,  0.0], [0.0, 1.0]),
        ];

        #[rustfmt::skip]
        let indices: Vec<u32> = vec![
            0,  1,  2,  2,  3,  0,  // front
            4,  5,  6,  6,  7,  4,  // back
            8,  9,  10, 10, 11, 8,  // top
            12, 13, 14, 14, 15, 12, // bottom
            16, 17, 18, 18, 19, 16, // right
            20, 21, 22, 22, 23, 20, // left
        ];

        Self::triangles(vertices, indices)
    }

    /// A UV sphere of the given radius.
    pub fn sphere(radius: f32, segments: u32, rings: u32) -> Self {
        let mut vertices = Vec::new();
        let mut indices = Vec::new();

        for ring in 0..=rings {
            let phi = std::f32::consts::PI * ring as f32 / rings as f32;
            let y = phi.cos();
            let ring_radius = phi.sin();

            for seg in 0..=segments {
                let theta = 2.0 * std::f32::consts::PI * seg as f32 / segments as f32;
                let x = ring_radius * theta.cos();
                let z = ring_radius * theta.sin();

                vertices.push(Vertex3d::new(
                    [x * radius, y * radius, z * radius],
                    [x, y, z],
                    [seg as f32 / segments as f32, ring as f32 / rings as f32],
                ));
            }
        }

        for ring in 0..rings {
            for seg in 0..segments {
                let current = ring * (segments + 1) + seg;
                let next = current + segments + 1;

                indices.extend_from_slice(&[current, next, current + 1]);
                indices.extend_from_slice(&[current + 1, next, next + 1]);
            }
        }

        Self::triangles(vertices, indices)
    }

    /// A `width` x `height` rectangle in the XY plane facing +Z, with its
    /// top-left corner at the origin.
    ///
    /// This is the base geometry of shapes and diamonds, which are laid out
    /// in 2D device coordinates.
    pub fn quad(width: f32, height: f32) -> Self {
        let vertices = vec![
            Vertex3d::new([0.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 0.0]),
            Vertex3d::new([width, 0.0, 0.0], [0.0, 0.0, 1.0], [1.0, 0.0]),
            Vertex3d::new([width, height, 0.0], [0.0, 0.0, 1.0], [1.0, 1.0]),
            Vertex3d::new([0.0, height, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0]),
        ];
        Self::triangles(vertices, vec![0, 1, 2, 2, 3, 0])
    }

    /// A square line grid in the XY plane spanning `[0, size]` on both axes.
    pub fn grid(size: f32, spacing: f32) -> Self {
        let mut segments = Vec::new();
        if spacing > 0.0 {
            let count = (size / spacing).floor() as u32;
            for i in 0..=count {
                let d = i as f32 * spacing;
                segments.push((Vec3::new(d, 0.0, 0.0), Vec3::new(d, size, 0.0)));
                segments.push((Vec3::new(0.0, d, 0.0), Vec3::new(size, d, 0.0)));
            }
        }
        Self::lines(&segments)
    }

    /// A single line segment from `origin` along `direction` for `length` units.
    pub fn ray_line(origin: Vec3, direction: Vec3, length: f32) -> Self {
        Self::lines(&[(origin, origin + direction * length)])
    }
}

/// Position, rotation and scale of a node relative to its parent.
///
/// # Transformation Order
///
/// [`Transform::matrix()`] applies **Scale → Rotate → Translate**.
///
/// ```
/// use scenerig::{Transform, Vec3, Quat};
///
/// let transform = Transform::new()
///     .position(Vec3::new(0.0, 5.0, -10.0))
///     .rotation(Quat::from_rotation_y(std::f32::consts::PI / 4.0))
///     .uniform_scale(2.0);
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    /// Translation relative to the parent.
    pub position: Vec3,
    /// Rotation as a unit quaternion.
    pub rotation: Quat,
    /// Scale factors for each axis.
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    /// Creates an identity transform.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a transform positioned at the given location.
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    pub fn position(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    pub fn rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    pub fn uniform_scale(mut self, scale: f32) -> Self {
        self.scale = Vec3::splat(scale);
        self
    }

    /// Converts this transform to a 4×4 matrix (SRT order).
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }
}
