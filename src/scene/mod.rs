//! The scene graph: an entity hierarchy with components and depth-first
//! traversal.
//!
//! Entities live in a single [`hecs::World`] owned by [`SceneGraph`]. Every
//! entity carries a [`Node`] with its local transform and links to its parent
//! and children, plus any number of [`Component`]s.
//!
//! Rendering and picking walk the hierarchy with [`SceneGraph::traverse`],
//! which keeps a [`TransformStack`] in sync with the walk so that visitors
//! can read an entity's world matrix from the top of the stack.
//!
//! # Example
//!
//! ```
//! use scenerig::{SceneGraph, Vec3};
//!
//! let mut scene = SceneGraph::new();
//! let arm = scene.spawn_child(scene.root(), "arm").unwrap();
//! let hand = scene.spawn_child(arm, "hand").unwrap();
//!
//! scene.set_translation(arm, Vec3::new(1.0, 0.0, 0.0)).unwrap();
//! scene.set_translation(hand, Vec3::new(0.0, 2.0, 0.0)).unwrap();
//!
//! let world = scene.world_transform(hand).unwrap();
//! assert_eq!(world.transform_point3(Vec3::ZERO), Vec3::new(1.0, 2.0, 0.0));
//! ```

mod graph;
mod traverse;

pub use graph::{Component, ComponentKind, Node, PipelineStamp, SceneGraph};
pub use traverse::{TransformStack, VisitFlags, Visitor};
