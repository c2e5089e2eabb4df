//! Error types shared across the crate.
//!
//! Most editor operations either succeed or are silently skipped (an entity
//! without geometry simply isn't drawn or picked). [`RigError`] covers the
//! remaining cases where an operation has to be aborted: singular transforms
//! during grab setup, stale entity handles, invalid reparenting, and GPU or
//! windowing setup failures.

use thiserror::Error;

use crate::scene::ComponentKind;

/// Errors produced by the scene graph, the manipulation tools and GPU setup.
#[derive(Debug, Error)]
pub enum RigError {
    /// A transform that had to be inverted has a zero determinant.
    #[error("transform is not invertible")]
    SingularTransform,

    /// The operation needs a parent entity but the entity is a root.
    #[error("entity {0:?} has no parent")]
    NoParent(hecs::Entity),

    /// The handle does not refer to a live entity.
    #[error("no such entity: {0:?}")]
    NoSuchEntity(hecs::Entity),

    /// The entity exists but lacks a required component.
    #[error("entity {entity:?} has no {kind:?} component")]
    MissingComponent {
        entity: hecs::Entity,
        kind: ComponentKind,
    },

    /// Reparenting would create a cycle.
    #[error("cannot parent {child:?} under {parent:?}: it is a descendant")]
    InvalidReparent {
        child: hecs::Entity,
        parent: hecs::Entity,
    },

    #[error("failed to create surface: {0}")]
    Surface(#[from] wgpu::CreateSurfaceError),

    #[error("no suitable GPU adapter: {0}")]
    AdapterUnavailable(#[from] wgpu::RequestAdapterError),

    #[error("failed to create device: {0}")]
    DeviceRequest(#[from] wgpu::RequestDeviceError),

    #[error("failed to acquire frame: {0}")]
    Frame(#[from] wgpu::SurfaceError),

    #[error("event loop error: {0}")]
    EventLoop(#[from] winit::error::EventLoopError),

    #[error("failed to create window: {0}")]
    Window(#[from] winit::error::OsError),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, RigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let mut world = hecs::World::new();
        let entity = world.spawn(());

        assert_eq!(
            RigError::SingularTransform.to_string(),
            "transform is not invertible"
        );
        assert!(RigError::NoParent(entity).to_string().contains("no parent"));
        let missing = RigError::MissingComponent {
            entity,
            kind: ComponentKind::Camera,
        };
        assert!(missing.to_string().contains("Camera"));
    }
}
