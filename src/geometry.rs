//! The geometry component.
//!
//! A [`Geometry`] says what an entity draws. Three flavours exist, and they
//! differ in which texture layers their pipelines receive:
//!
//! - [`GeometryKind::Model`] is an arbitrary triangle mesh
//! - [`GeometryKind::Shape`] is a flat 2D quad, optionally cut out by a shape texture
//! - [`GeometryKind::Diamond`] is a quad masked to a diamond by a mask texture
//!
//! Geometry is also the picking engine's source of triangles: only pickable
//! geometry backed by a triangle mesh can be hit by a pick ray.

use crate::library::{Library, MeshId, TextureId};
use crate::mesh::MeshData;

/// Which flavour of geometry an entity carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GeometryKind {
    Model,
    /// `shape_texture` is set when the shape is cut out by a mask.
    Shape { shape_texture: Option<TextureId> },
    Diamond { mask: TextureId },
}

/// Drawable (and optionally pickable) geometry attached to an entity.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Geometry {
    pub kind: GeometryKind,
    pub mesh: MeshId,
    pub pickable: bool,
}

impl Geometry {
    /// A pickable model mesh.
    pub fn model(mesh: MeshId) -> Self {
        Self {
            kind: GeometryKind::Model,
            mesh,
            pickable: true,
        }
    }

    /// A pickable 2D shape.
    pub fn shape(mesh: MeshId, shape_texture: Option<TextureId>) -> Self {
        Self {
            kind: GeometryKind::Shape { shape_texture },
            mesh,
            pickable: true,
        }
    }

    /// A pickable diamond cut out by `mask`.
    pub fn diamond(mesh: MeshId, mask: TextureId) -> Self {
        Self {
            kind: GeometryKind::Diamond { mask },
            mesh,
            pickable: true,
        }
    }

    pub fn with_pickable(mut self, pickable: bool) -> Self {
        self.pickable = pickable;
        self
    }

    /// The mesh to draw.
    pub fn primitive(&self) -> MeshId {
        self.mesh
    }

    /// The mesh to pick against, if this geometry is pickable and its mesh
    /// is a triangle mesh.
    pub fn mesh<'a>(&self, library: &'a Library) -> Option<&'a MeshData> {
        if !self.pickable {
            return None;
        }
        library.mesh(self.mesh).filter(|mesh| !mesh.is_lines())
    }

    pub fn is_shape(&self) -> bool {
        matches!(self.kind, GeometryKind::Shape { .. })
    }

    pub fn is_diamond(&self) -> bool {
        matches!(self.kind, GeometryKind::Diamond { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::TextureData;

    #[test]
    fn test_pick_mesh_requires_triangles() {
        let mut library = Library::new();
        let cube = library.add_mesh(MeshData::cube(1.0));
        let grid = library.add_mesh(MeshData::grid(10.0, 1.0));

        assert!(Geometry::model(cube).mesh(&library).is_some());
        assert!(Geometry::model(grid).mesh(&library).is_none());
        assert!(
            Geometry::model(cube)
                .with_pickable(false)
                .mesh(&library)
                .is_none()
        );
    }

    #[test]
    fn test_kind_queries() {
        let mut library = Library::new();
        let quad = library.add_mesh(MeshData::quad(1.0, 1.0));
        let mask = library.add_texture(TextureData::diamond_mask(8));

        assert!(Geometry::diamond(quad, mask).is_diamond());
        assert!(Geometry::shape(quad, None).is_shape());
        assert!(!Geometry::model(quad).is_shape());
    }
}
