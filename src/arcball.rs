//! Shoemake arcball rotation for camera orbiting.
//!
//! Pointer positions are projected onto a virtual sphere centred on the
//! view. The rotation between the sphere point at mouse-down and the current
//! one is the drag quaternion, which callers compose with whatever rotation
//! they saved when the drag started.

use glam::{Quat, Vec2, Vec3};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Arcball {
    center: Vec2,
    radius: f32,
    down: Vec3,
    q_drag: Quat,
}

impl Default for Arcball {
    fn default() -> Self {
        Self::new(Vec2::ZERO, 1.0)
    }
}

impl Arcball {
    pub fn new(center: Vec2, radius: f32) -> Self {
        Self {
            center,
            radius,
            down: Vec3::Z,
            q_drag: Quat::IDENTITY,
        }
    }

    /// Re-centres the ball, typically after the view was resized.
    pub fn init(&mut self, center: Vec2, radius: f32) {
        *self = Self::new(center, radius);
    }

    /// Maps a window point onto the unit sphere. Points outside the ball are
    /// pulled onto its silhouette.
    fn sphere_point(&self, x: f32, y: f32) -> Vec3 {
        let r = if self.radius > 0.0 { self.radius } else { 1.0 };
        let p = Vec2::new((x - self.center.x) / r, (y - self.center.y) / r);
        let mag = p.length_squared();
        if mag > 1.0 {
            let p = p / mag.sqrt();
            Vec3::new(p.x, p.y, 0.0)
        } else {
            Vec3::new(p.x, p.y, (1.0 - mag).sqrt())
        }
    }

    pub fn mouse_down(&mut self, x: f32, y: f32) {
        self.down = self.sphere_point(x, y);
        self.q_drag = Quat::IDENTITY;
    }

    /// Updates and returns the drag rotation for the pointer at `(x, y)`.
    pub fn mouse_motion(&mut self, x: f32, y: f32) -> Quat {
        let to = self.sphere_point(x, y);
        let axis = self.down.cross(to);
        self.q_drag = Quat::from_xyzw(axis.x, axis.y, axis.z, self.down.dot(to));
        self.q_drag
    }

    pub fn q_drag(&self) -> Quat {
        self.q_drag
    }
}
