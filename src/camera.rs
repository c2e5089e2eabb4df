//! The camera component.
//!
//! A [`Camera`] describes how a scene is projected into a viewport of a
//! framebuffer. It does **not** follow its entity's transform on its own:
//! the renderer computes a view transform from the entity hierarchy and
//! pushes it with [`Camera::set_view_transform`] before each pass.
//!
//! The projection matrix and its inverse are cached and recomputed whenever
//! a projection parameter changes. Every change also bumps [`Camera::age`],
//! which lets the render context skip rebinding unchanged camera state.
//!
//! Matrices follow wgpu conventions: right handed, the camera looks down
//! -Z, and clip-space depth spans `[0, 1]`.
//!
//! # Example
//!
//! ```
//! use scenerig::{Camera, Vec2};
//!
//! let mut camera = Camera::perspective(10.0, 10.0, 100.0);
//! camera.set_viewport(0.0, 0.0, 800.0, 600.0);
//!
//! // The centre of the viewport unprojects onto the view axis.
//! let p = camera.unproject_window_coord(
//!     &glam::Mat4::IDENTITY,
//!     &glam::Mat4::IDENTITY,
//!     -30.0,
//!     Vec2::new(400.0, 299.0),
//! );
//! assert!(p.x.abs() < 1e-3 && p.y.abs() < 1e-3);
//! ```

use glam::{Mat4, Vec2, Vec3, Vec4};

use crate::backend::{CameraState, FramebufferTarget};
use crate::color::Color;
use crate::mesh::MeshData;

/// Projection mode and its mode-specific parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Projection {
    /// Symmetric perspective with a vertical field of view in degrees. The
    /// aspect ratio comes from the viewport.
    Perspective { fov_y: f32 },
    /// Orthographic bounds: `(x1, y1)` is the top-left corner, `(x2, y2)`
    /// the bottom-right.
    Orthographic { x1: f32, y1: f32, x2: f32, y2: f32 },
}

#[derive(Clone, Debug)]
pub struct Camera {
    viewport: [f32; 4],
    projection: Projection,
    near: f32,
    far: f32,
    zoom: f32,

    view_transform: Mat4,
    inverse_view_transform: Mat4,
    input_transform: Mat4,

    projection_matrix: Mat4,
    inverse_projection: Mat4,

    framebuffer: FramebufferTarget,
    clear: bool,
    background: Color,

    age: u32,
}

impl Camera {
    /// A perspective camera with the given vertical field of view in degrees.
    pub fn perspective(fov_y: f32, near: f32, far: f32) -> Self {
        Self::with_projection(Projection::Perspective { fov_y }, near, far)
    }

    /// An orthographic camera, typically for 2D overlays or light shadows.
    pub fn orthographic(x1: f32, y1: f32, x2: f32, y2: f32, near: f32, far: f32) -> Self {
        Self::with_projection(Projection::Orthographic { x1, y1, x2, y2 }, near, far)
    }

    fn with_projection(projection: Projection, near: f32, far: f32) -> Self {
        let mut camera = Self {
            viewport: [0.0, 0.0, 1.0, 1.0],
            projection,
            near,
            far,
            zoom: 1.0,
            view_transform: Mat4::IDENTITY,
            inverse_view_transform: Mat4::IDENTITY,
            input_transform: Mat4::IDENTITY,
            projection_matrix: Mat4::IDENTITY,
            inverse_projection: Mat4::IDENTITY,
            framebuffer: FramebufferTarget::Onscreen,
            clear: true,
            background: Color::BLACK,
            age: 0,
        };
        camera.update_projection();
        camera
    }

    fn update_projection(&mut self) {
        let zoom = if self.zoom > 0.0 { self.zoom } else { 1.0 };

        self.projection_matrix = match self.projection {
            Projection::Perspective { fov_y } => {
                let [_, _, w, h] = self.viewport;
                let aspect = if h > 0.0 { w / h } else { 1.0 };
                let half = (fov_y.to_radians() * 0.5).tan() / zoom;
                Mat4::perspective_rh(2.0 * half.atan(), aspect, self.near, self.far)
            }
            Projection::Orthographic { x1, y1, x2, y2 } => {
                let cx = (x1 + x2) * 0.5;
                let cy = (y1 + y2) * 0.5;
                let hw = (x2 - x1) * 0.5 / zoom;
                let hh = (y2 - y1) * 0.5 / zoom;
                Mat4::orthographic_rh(cx - hw, cx + hw, cy + hh, cy - hh, self.near, self.far)
            }
        };
        self.inverse_projection = self.projection_matrix.inverse();
        self.age = self.age.wrapping_add(1);
    }

    pub fn viewport(&self) -> [f32; 4] {
        self.viewport
    }

    pub fn set_viewport(&mut self, x: f32, y: f32, width: f32, height: f32) {
        let viewport = [x, y, width, height];
        if viewport == self.viewport {
            return;
        }
        let resized = self.viewport[2] != width || self.viewport[3] != height;
        self.viewport = viewport;
        if resized {
            self.update_projection();
        } else {
            self.age = self.age.wrapping_add(1);
        }
    }

    pub fn projection_mode(&self) -> Projection {
        self.projection
    }

    pub fn set_projection_mode(&mut self, projection: Projection) {
        self.projection = projection;
        self.update_projection();
    }

    /// Vertical field of view in degrees, or `None` for orthographic cameras.
    pub fn field_of_view(&self) -> Option<f32> {
        match self.projection {
            Projection::Perspective { fov_y } => Some(fov_y),
            Projection::Orthographic { .. } => None,
        }
    }

    /// Switches to a perspective projection with the given field of view.
    pub fn set_field_of_view(&mut self, fov_y: f32) {
        self.set_projection_mode(Projection::Perspective { fov_y });
    }

    pub fn set_orthographic_coordinates(&mut self, x1: f32, y1: f32, x2: f32, y2: f32) {
        self.set_projection_mode(Projection::Orthographic { x1, y1, x2, y2 });
    }

    pub fn near_plane(&self) -> f32 {
        self.near
    }

    pub fn set_near_plane(&mut self, near: f32) {
        self.near = near;
        self.update_projection();
    }

    pub fn far_plane(&self) -> f32 {
        self.far
    }

    pub fn set_far_plane(&mut self, far: f32) {
        self.far = far;
        self.update_projection();
    }

    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    /// Scales the projection about the view centre. Values `<= 0` disable
    /// the zoom until a positive value is set.
    pub fn set_zoom(&mut self, zoom: f32) {
        self.zoom = zoom;
        self.update_projection();
    }

    pub fn projection(&self) -> &Mat4 {
        &self.projection_matrix
    }

    pub fn inverse_projection(&self) -> &Mat4 {
        &self.inverse_projection
    }

    pub fn view_transform(&self) -> &Mat4 {
        &self.view_transform
    }

    pub fn inverse_view_transform(&self) -> &Mat4 {
        &self.inverse_view_transform
    }

    pub fn set_view_transform(&mut self, view: Mat4) {
        if view == self.view_transform {
            return;
        }
        self.view_transform = view;
        self.inverse_view_transform = view.inverse();
        self.age = self.age.wrapping_add(1);
    }

    /// Sets the transform mapping raw window coordinates into this camera's
    /// window space, used when the view is nested inside other widgets.
    pub fn set_input_transform(&mut self, transform: Mat4) {
        self.input_transform = transform;
    }

    /// Maps a raw window coordinate through the input transform.
    pub fn transform_window_coordinate(&self, x: f32, y: f32) -> Vec2 {
        self.input_transform
            .transform_point3(Vec3::new(x, y, 0.0))
            .truncate()
    }

    pub fn framebuffer(&self) -> FramebufferTarget {
        self.framebuffer
    }

    pub fn set_framebuffer(&mut self, framebuffer: FramebufferTarget) {
        if framebuffer != self.framebuffer {
            self.framebuffer = framebuffer;
            self.age = self.age.wrapping_add(1);
        }
    }

    /// Whether flushing this camera clears its viewport first.
    pub fn clears(&self) -> bool {
        self.clear
    }

    pub fn set_clear(&mut self, clear: bool) {
        self.clear = clear;
    }

    pub fn background_color(&self) -> Color {
        self.background
    }

    pub fn set_background_color(&mut self, color: Color) {
        self.background = color;
    }

    /// Incremented on every change that affects GPU camera state.
    pub fn age(&self) -> u32 {
        self.age
    }

    /// Snapshot of everything a backend needs to bind this camera.
    pub fn state(&self) -> CameraState {
        CameraState {
            framebuffer: self.framebuffer,
            viewport: self.viewport,
            projection: self.projection_matrix,
            view: self.view_transform,
            clear: self.clear.then_some(self.background),
        }
    }

    /// Converts window coordinates to normalized device coordinates.
    ///
    /// Window Y grows downwards, NDC Y grows upwards.
    pub fn window_to_ndc(&self, window: Vec2) -> Vec2 {
        let [vx, vy, vw, vh] = self.viewport;
        Vec2::new(
            (window.x - vx) * 2.0 / vw - 1.0,
            (vh - 1.0 + vy - window.y) * 2.0 / vh - 1.0,
        )
    }

    /// Unprojects a window coordinate onto the plane at model-space depth
    /// `object_z` of the given modelview, returning model-space X and Y.
    pub fn unproject_window_coord(
        &self,
        modelview: &Mat4,
        inverse_modelview: &Mat4,
        object_z: f32,
        window: Vec2,
    ) -> Vec2 {
        let eye_point = *modelview * Vec4::new(0.0, 0.0, object_z, 1.0);
        let clip = self.projection_matrix * eye_point;
        let ndc_z = clip.z / clip.w;

        let ndc = self.window_to_ndc(window);
        let eye = self.inverse_projection * Vec4::new(ndc.x, ndc.y, ndc_z, 1.0);
        let eye = Vec4::new(eye.x / eye.w, eye.y / eye.w, eye.z / eye.w, 1.0);

        let object = *inverse_modelview * eye;
        Vec2::new(object.x, object.y)
    }

    /// Line outline of the view frustum in the camera's local space.
    ///
    /// Editors draw this for cameras that are part of the scene, such as the
    /// shadow-casting light.
    pub fn frustum_primitive(&self) -> MeshData {
        let corner = |x: f32, y: f32, z: f32| {
            let p = self.inverse_projection * Vec4::new(x, y, z, 1.0);
            p.truncate() / p.w
        };
        let near = [
            corner(-1.0, -1.0, 0.0),
            corner(1.0, -1.0, 0.0),
            corner(1.0, 1.0, 0.0),
            corner(-1.0, 1.0, 0.0),
        ];
        let far = [
            corner(-1.0, -1.0, 1.0),
            corner(1.0, -1.0, 1.0),
            corner(1.0, 1.0, 1.0),
            corner(-1.0, 1.0, 1.0),
        ];

        let mut segments = Vec::with_capacity(12);
        for i in 0..4 {
            let j = (i + 1) % 4;
            segments.push((near[i], near[j]));
            segments.push((far[i], far[j]));
            segments.push((near[i], far[i]));
        }
        MeshData::lines(&segments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 0.001
    }

    #[test]
    fn test_inverse_projection_is_cached_inverse() {
        let mut camera = Camera::perspective(45.0, 0.1, 100.0);
        camera.set_viewport(0.0, 0.0, 640.0, 480.0);
        let product = *camera.projection() * *camera.inverse_projection();
        assert!(product.abs_diff_eq(Mat4::IDENTITY, 1e-4));
    }

    #[test]
    fn test_zoom_narrows_frustum() {
        let mut camera = Camera::perspective(60.0, 1.0, 10.0);
        camera.set_viewport(0.0, 0.0, 100.0, 100.0);
        let before = camera.projection().x_axis.x;
        camera.set_zoom(2.0);
        assert!(approx(camera.projection().x_axis.x, before * 2.0));
    }

    #[test]
    fn test_zero_zoom_falls_back_to_unzoomed() {
        let mut camera = Camera::orthographic(0.0, 0.0, 100.0, 100.0, -1.0, 1.0);
        let unzoomed = *camera.projection();
        camera.set_zoom(0.0);
        assert!(camera.projection().abs_diff_eq(unzoomed, 1e-6));
    }

    #[test]
    fn test_orthographic_top_left_origin() {
        let camera = Camera::orthographic(0.0, 0.0, 200.0, 100.0, -1.0, 1.0);
        let top_left = camera.projection().project_point3(Vec3::ZERO);
        assert!(approx(top_left.x, -1.0));
        assert!(approx(top_left.y, 1.0));
    }

    #[test]
    fn test_view_transform_inverse() {
        let mut camera = Camera::perspective(45.0, 0.1, 100.0);
        let age = camera.age();
        camera.set_view_transform(Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0)));
        assert!(camera.age() != age);
        let p = camera
            .inverse_view_transform()
            .transform_point3(Vec3::new(1.0, 2.0, 3.0));
        assert!(p.abs_diff_eq(Vec3::ZERO, 1e-5));
    }

    #[test]
    fn test_unproject_one_pixel_offset_scales_with_depth() {
        let mut camera = Camera::perspective(10.0, 10.0, 100.0);
        camera.set_viewport(0.0, 0.0, 400.0, 400.0);
        let id = Mat4::IDENTITY;

        let origin = camera.unproject_window_coord(&id, &id, -30.0, Vec2::new(0.0, 0.0));
        let unit_x = camera.unproject_window_coord(&id, &id, -30.0, Vec2::new(1.0, 0.0));
        let far_origin = camera.unproject_window_coord(&id, &id, -60.0, Vec2::new(0.0, 0.0));
        let far_unit_x = camera.unproject_window_coord(&id, &id, -60.0, Vec2::new(1.0, 0.0));

        let near_step = unit_x.x - origin.x;
        let far_step = far_unit_x.x - far_origin.x;
        assert!(near_step > 0.0);
        assert!(approx(far_step / near_step, 2.0));
    }

    #[test]
    fn test_window_to_ndc_flips_y() {
        let mut camera = Camera::perspective(45.0, 0.1, 100.0);
        camera.set_viewport(0.0, 0.0, 100.0, 100.0);
        let ndc = camera.window_to_ndc(Vec2::new(0.0, 0.0));
        assert!(approx(ndc.x, -1.0));
        assert!(ndc.y > 0.9);
    }

    #[test]
    fn test_frustum_primitive_has_twelve_edges() {
        let camera = Camera::orthographic(-1.0, -1.0, 1.0, 1.0, 0.0, 10.0);
        let frustum = camera.frustum_primitive();
        assert!(frustum.is_lines());
        assert_eq!(frustum.vertices.len(), 24);
    }
}
