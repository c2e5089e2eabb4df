//! Pointer grabs that translate an entity in its parent's space.
//!
//! Starting a grab works out how one window pixel of pointer motion maps
//! to a translation in the parent's local space at the entity's depth. From
//! then on every motion event sets the entity's position to its start
//! position plus the mapped offset of the whole drag, so the result only
//! depends on where the pointer is now, not on how it got there.

use glam::{Mat4, Vec2, Vec3};
use hecs::Entity;

use crate::camera::Camera;
use crate::error::{Result, RigError};
use crate::scene::SceneGraph;

/// What a grab does with its translation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GrabTranslate {
    /// Moves the entity along with the pointer.
    Entity,
    /// Moves the entity against the pointer, so the scene under it appears
    /// to follow the pointer. Used to pan the camera rig origin.
    ScenePan,
}

/// State captured when a grab starts.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GrabClosure {
    pub entity: Entity,
    /// Pointer position at the start of the grab.
    pub grab: Vec2,
    /// Entity position at the start of the grab.
    pub start: Vec3,
    /// Parent-space translation per window pixel along X and Y.
    pub x_vec: Vec3,
    pub y_vec: Vec3,
    /// Set by the first motion event.
    pub moved: bool,
    pub translate: GrabTranslate,
}

impl GrabClosure {
    /// Works out the pixel-to-parent-space basis for dragging `entity` as
    /// seen through `camera`.
    pub fn new(
        scene: &SceneGraph,
        camera: &Camera,
        entity: Entity,
        pointer: Vec2,
        translate: GrabTranslate,
    ) -> Result<Self> {
        let start = scene
            .transform(entity)
            .ok_or(RigError::NoSuchEntity(entity))?
            .position;
        let parent = scene.parent(entity).ok_or(RigError::NoParent(entity))?;
        let parent_world = scene
            .world_transform(parent)
            .ok_or(RigError::NoSuchEntity(parent))?;

        let parent_modelview = *camera.view_transform() * parent_world;
        if parent_modelview.determinant().abs() < f32::EPSILON {
            log::warn!("cannot grab {entity:?}: parent transform is not invertible");
            return Err(RigError::SingularTransform);
        }
        let inverse = parent_modelview.inverse();

        // Depth of the entity's origin in eye coordinates.
        let entity_z = parent_modelview.transform_point3(Vec3::ZERO).z;

        let eye_point = |window: Vec2| {
            let p = camera.unproject_window_coord(&Mat4::IDENTITY, &Mat4::IDENTITY, entity_z, window);
            inverse.transform_point3(Vec3::new(p.x, p.y, entity_z))
        };
        let origin = eye_point(Vec2::ZERO);
        let x_vec = eye_point(Vec2::X) - origin;
        let y_vec = eye_point(Vec2::Y) - origin;

        Ok(Self {
            entity,
            grab: pointer,
            start,
            x_vec,
            y_vec,
            moved: false,
            translate,
        })
    }

    /// Parent-space offset for the pointer at `pointer`.
    pub fn rel(&self, pointer: Vec2) -> Vec3 {
        let delta = pointer - self.grab;
        self.x_vec * delta.x + self.y_vec * delta.y
    }

    /// Position the entity should have for the pointer at `pointer`.
    pub fn position(&self, pointer: Vec2) -> Vec3 {
        match self.translate {
            GrabTranslate::Entity => self.start + self.rel(pointer),
            GrabTranslate::ScenePan => self.start - self.rel(pointer),
        }
    }
}

/// Summary of a finished grab.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GrabDone {
    pub entity: Entity,
    pub moved: bool,
    pub start: Vec3,
    pub rel: Vec3,
    pub translate: GrabTranslate,
}

impl GrabDone {
    /// Final position for an entity grab.
    pub fn end(&self) -> Vec3 {
        self.start + self.rel
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum GrabState {
    #[default]
    Idle,
    Dragging(GrabClosure),
}

impl GrabState {
    pub fn is_dragging(&self) -> bool {
        matches!(self, GrabState::Dragging(_))
    }

    pub fn closure(&self) -> Option<&GrabClosure> {
        match self {
            GrabState::Dragging(closure) => Some(closure),
            GrabState::Idle => None,
        }
    }

    /// Starts a grab. On error the state is left unchanged.
    pub fn begin(
        &mut self,
        scene: &SceneGraph,
        camera: &Camera,
        entity: Entity,
        pointer: Vec2,
        translate: GrabTranslate,
    ) -> Result<()> {
        *self = GrabState::Dragging(GrabClosure::new(scene, camera, entity, pointer, translate)?);
        Ok(())
    }

    /// Applies pointer motion. Returns false if no grab is active.
    pub fn motion(&mut self, scene: &mut SceneGraph, pointer: Vec2) -> bool {
        let GrabState::Dragging(closure) = self else {
            return false;
        };
        closure.moved = true;
        if let Err(err) = scene.set_translation(closure.entity, closure.position(pointer)) {
            log::warn!("dropping grab: {err}");
            *self = GrabState::Idle;
        }
        true
    }

    /// Ends the grab and reports how it went.
    pub fn release(&mut self, pointer: Vec2) -> Option<GrabDone> {
        let GrabState::Dragging(closure) = std::mem::take(self) else {
            return None;
        };
        Some(GrabDone {
            entity: closure.entity,
            moved: closure.moved,
            start: closure.start,
            rel: closure.rel(pointer),
            translate: closure.translate,
        })
    }

    /// Drops the grab without reporting it.
    pub fn cancel(&mut self) {
        *self = GrabState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera() -> Camera {
        let mut camera = Camera::perspective(10.0, 10.0, 100.0);
        camera.set_viewport(0.0, 0.0, 400.0, 400.0);
        camera
    }

    fn scene() -> (SceneGraph, Entity) {
        let mut scene = SceneGraph::new();
        let parent = scene.spawn_child(scene.root(), "parent").unwrap();
        scene.set_translation(parent, Vec3::new(0.0, 0.0, -30.0)).unwrap();
        let e = scene.spawn_child(parent, "e").unwrap();
        scene.set_translation(e, Vec3::new(1.0, 2.0, 0.0)).unwrap();
        (scene, e)
    }

    #[test]
    fn test_final_position_depends_only_on_total_motion() {
        let (mut scene, e) = scene();
        let camera = camera();
        let mut grab = GrabState::Idle;
        grab.begin(&scene, &camera, e, Vec2::new(100.0, 100.0), GrabTranslate::Entity)
            .unwrap();

        grab.motion(&mut scene, Vec2::new(130.0, 90.0));
        grab.motion(&mut scene, Vec2::new(80.0, 140.0));
        grab.motion(&mut scene, Vec2::new(110.0, 120.0));
        let wandering = scene.transform(e).unwrap().position;

        let (mut direct_scene, e2) = self::scene();
        let mut direct = GrabState::Idle;
        direct
            .begin(&direct_scene, &camera, e2, Vec2::new(100.0, 100.0), GrabTranslate::Entity)
            .unwrap();
        direct.motion(&mut direct_scene, Vec2::new(110.0, 120.0));
        let straight = direct_scene.transform(e2).unwrap().position;

        assert!(wandering.abs_diff_eq(straight, 1e-5));

        let closure = grab.closure().unwrap();
        let expected = Vec3::new(1.0, 2.0, 0.0) + closure.x_vec * 10.0 + closure.y_vec * 20.0;
        assert!(wandering.abs_diff_eq(expected, 1e-5));
    }

    #[test]
    fn test_basis_follows_screen_axes() {
        let (scene, e) = scene();
        let closure =
            GrabClosure::new(&scene, &camera(), e, Vec2::ZERO, GrabTranslate::Entity).unwrap();
        // window x grows right, window y grows down
        assert!(closure.x_vec.x > 0.0);
        assert!(closure.y_vec.y < 0.0);
        assert!(closure.x_vec.z.abs() < 1e-5);
        assert!((closure.x_vec.x + closure.y_vec.y).abs() < 1e-5);
    }

    #[test]
    fn test_release_without_motion_is_not_moved() {
        let (scene, e) = scene();
        let mut grab = GrabState::Idle;
        grab.begin(&scene, &camera(), e, Vec2::new(5.0, 5.0), GrabTranslate::Entity)
            .unwrap();
        let done = grab.release(Vec2::new(5.0, 5.0)).unwrap();
        assert!(!done.moved);
        assert_eq!(done.end(), Vec3::new(1.0, 2.0, 0.0));
        assert_eq!(grab, GrabState::Idle);
        assert!(grab.release(Vec2::ZERO).is_none());
    }

    #[test]
    fn test_scene_pan_moves_against_pointer() {
        let (mut scene, e) = scene();
        let mut grab = GrabState::Idle;
        grab.begin(&scene, &camera(), e, Vec2::ZERO, GrabTranslate::ScenePan)
            .unwrap();
        grab.motion(&mut scene, Vec2::new(10.0, 0.0));
        assert!(scene.transform(e).unwrap().position.x < 1.0);
        let done = grab.release(Vec2::new(10.0, 0.0)).unwrap();
        assert!(done.moved);
    }

    #[test]
    fn test_root_and_singular_parents_are_rejected() {
        let (mut scene, e) = scene();
        let root = scene.root();
        let mut grab = GrabState::Idle;
        assert!(matches!(
            grab.begin(&scene, &camera(), root, Vec2::ZERO, GrabTranslate::Entity),
            Err(RigError::NoParent(_))
        ));

        let parent = scene.parent(e).unwrap();
        scene.set_scale(parent, Vec3::new(1.0, 0.0, 1.0)).unwrap();
        assert!(matches!(
            grab.begin(&scene, &camera(), e, Vec2::ZERO, GrabTranslate::Entity),
            Err(RigError::SingularTransform)
        ));
        assert!(!grab.is_dragging());
    }

    #[test]
    fn test_cancel_drops_grab() {
        let (scene, e) = scene();
        let mut grab = GrabState::Idle;
        grab.begin(&scene, &camera(), e, Vec2::ZERO, GrabTranslate::Entity)
            .unwrap();
        grab.cancel();
        assert!(!grab.is_dragging());
    }
}
