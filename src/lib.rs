//! # Scenerig
//!
//! **The render core of an interactive 3D scene editor.**
//!
//! A transform hierarchy of entities with components, a navigation camera
//! rig that maps an emulated device screen into the editor view, a
//! multi-pass renderer (shadow map, depth of field, opaque and translucent
//! color passes, editor overlays), ray picking and grab manipulation of
//! entities.
//!
//! ## Quick Start
//!
//! ```no_run
//! use scenerig::*;
//! use scenerig::geometry::Geometry;
//! use scenerig::scene::Component;
//!
//! fn main() -> Result<()> {
//!     run_editor(EngineConfig::new().device_size(480.0, 800.0), |scene, library, backend| {
//!         let cube = library.add_mesh(MeshData::cube(100.0));
//!         let entity = scene.spawn_child(scene.root(), "cube")?;
//!         scene.set_translation(entity, Vec3::new(240.0, 400.0, 0.0))?;
//!         scene.add_component(entity, Component::Geometry(Geometry::model(cube)))?;
//!
//!         camera_view::spawn_shadow_light(scene, backend, &EngineConfig::new())?;
//!         Ok(())
//!     })
//! }
//! ```
//!
//! ## Without a window
//!
//! Everything except [`run_editor`] and [`GpuContext`] works against the
//! [`RenderBackend`](backend::RenderBackend) trait. The
//! [`CommandRecorder`](backend::CommandRecorder) backend records what a
//! frame would draw, which is how the editor logic is tested:
//!
//! ```
//! use scenerig::backend::CommandRecorder;
//! use scenerig::camera_view::CameraView;
//! use scenerig::{EngineConfig, SceneGraph};
//!
//! let mut scene = SceneGraph::new();
//! let mut backend = CommandRecorder::new();
//! let view = CameraView::new(&mut scene, &mut backend, &EngineConfig::new()).unwrap();
//! assert!(scene.camera(view.rig().camera).is_some());
//! ```

pub mod app;
pub mod arcball;
pub mod backend;
pub mod camera;
pub mod camera_rig;
pub mod camera_view;
pub mod color;
pub mod config;
pub mod dof;
pub mod error;
pub mod geometry;
pub mod gpu;
pub mod grab;
pub mod input;
pub mod journal;
pub mod library;
pub mod light;
pub mod material;
pub mod mesh;
pub mod overlay;
pub mod picking;
pub mod pipeline_cache;
pub mod renderer;
pub mod scene;
pub mod texture;

pub use app::run_editor;
pub use camera::Camera;
pub use color::{Color, Rect};
pub use config::EngineConfig;
pub use error::{Result, RigError};
pub use gpu::GpuContext;
pub use library::{Library, TextureData};
pub use mesh::{MeshData, Transform};
pub use scene::SceneGraph;

// Re-export glam math types for convenience
pub use glam::{Mat4, Quat, Vec2, Vec3, Vec4};

pub use hecs::Entity;
