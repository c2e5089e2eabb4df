//! Asset registry with type-safe handles.
//!
//! Geometry and material components never own GPU resources. They refer to
//! meshes and textures through [`MeshId`] and [`TextureId`] handles into a
//! [`Library`], which keeps the CPU-side data. Backends upload lazily from
//! the library, and the picking engine reads the same mesh data.
//!
//! # Example
//!
//! ```
//! use scenerig::{Library, MeshData, TextureData};
//!
//! let mut library = Library::new();
//! let cube = library.add_mesh(MeshData::cube(1.0));
//! let mask = library.add_texture(TextureData::diamond_mask(64));
//!
//! assert!(library.mesh(cube).is_some());
//! assert_eq!(library.texture(mask).unwrap().width, 64);
//! ```

use crate::color::Color;
use crate::mesh::MeshData;

/// Handle to a mesh stored in a [`Library`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshId(pub(crate) usize);

/// Handle to a texture stored in a [`Library`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub(crate) usize);

/// RGBA8 pixel data for a 2D texture.
#[derive(Clone, Debug, PartialEq)]
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    /// Tightly packed rows of RGBA8 pixels.
    pub pixels: Vec<u8>,
}

impl TextureData {
    /// Wraps raw pixels. Returns `None` if the buffer size doesn't match.
    pub fn from_rgba(width: u32, height: u32, pixels: Vec<u8>) -> Option<Self> {
        if pixels.len() != (width * height * 4) as usize {
            return None;
        }
        Some(Self {
            width,
            height,
            pixels,
        })
    }

    /// A 1x1 texture of a single color.
    pub fn solid(color: Color) -> Self {
        let to_u8 = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        Self {
            width: 1,
            height: 1,
            pixels: vec![to_u8(color.r), to_u8(color.g), to_u8(color.b), to_u8(color.a)],
        }
    }

    /// A square mask that is opaque inside a centered diamond and fades to
    /// transparent over a one-texel border.
    ///
    /// Diamond geometry samples this in layer 0 so that anything outside the
    /// diamond is discarded.
    pub fn diamond_mask(size: u32) -> Self {
        let mut pixels = vec![0u8; (size * size * 4) as usize];
        let half = size as f32 * 0.5;

        for y in 0..size {
            for x in 0..size {
                let dx = (x as f32 + 0.5 - half).abs();
                let dy = (y as f32 + 0.5 - half).abs();
                let coverage = (half - (dx + dy)).clamp(0.0, 1.0);
                let idx = ((y * size + x) * 4) as usize;
                pixels[idx..idx + 3].copy_from_slice(&[255, 255, 255]);
                pixels[idx + 3] = (coverage * 255.0) as u8;
            }
        }

        Self {
            width: size,
            height: size,
            pixels,
        }
    }

    /// A two-color checkerboard, handy as a placeholder material texture.
    pub fn checker(size: u32, cell: u32, a: Color, b: Color) -> Self {
        let a = Self::solid(a).pixels;
        let b = Self::solid(b).pixels;
        let cell = cell.max(1);
        let mut pixels = Vec::with_capacity((size * size * 4) as usize);

        for y in 0..size {
            for x in 0..size {
                let texel = if ((x / cell) + (y / cell)) % 2 == 0 { &a } else { &b };
                pixels.extend_from_slice(texel);
            }
        }

        Self {
            width: size,
            height: size,
            pixels,
        }
    }
}

/// Registry of meshes and textures addressed by handle.
#[derive(Debug, Default)]
pub struct Library {
    meshes: Vec<MeshData>,
    mesh_revisions: Vec<u32>,
    textures: Vec<TextureData>,
}

impl Library {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_mesh(&mut self, mesh: MeshData) -> MeshId {
        let idx = self.meshes.len();
        self.meshes.push(mesh);
        self.mesh_revisions.push(0);
        MeshId(idx)
    }

    pub fn add_texture(&mut self, texture: TextureData) -> TextureId {
        let idx = self.textures.len();
        self.textures.push(texture);
        TextureId(idx)
    }

    pub fn mesh(&self, id: MeshId) -> Option<&MeshData> {
        self.meshes.get(id.0)
    }

    /// Replaces the data behind an existing handle, e.g. after a shape is
    /// resized.
    pub fn replace_mesh(&mut self, id: MeshId, mesh: MeshData) -> bool {
        match self.meshes.get_mut(id.0) {
            Some(slot) => {
                *slot = mesh;
                self.mesh_revisions[id.0] += 1;
                true
            }
            None => false,
        }
    }

    /// Incremented each time the mesh behind `id` is replaced, so uploaded
    /// copies can tell they are stale.
    pub fn mesh_revision(&self, id: MeshId) -> u32 {
        self.mesh_revisions.get(id.0).copied().unwrap_or(0)
    }

    pub fn texture(&self, id: TextureId) -> Option<&TextureData> {
        self.textures.get(id.0)
    }

    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }
}
