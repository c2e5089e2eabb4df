//! Navigation rig for the editor's view camera.
//!
//! Rather than computing a view matrix from orbit angles, the view camera
//! hangs off a chain of plain scene entities, each of which models one
//! aspect of navigation:
//!
//! ```text
//! rig:camera_to_origin      pan: translation to the orbit origin
//! └─ rig:camera_rotate      orbit: arcball rotation about the origin
//!    └─ rig:camera_armature zoom: distance from the origin along Z
//!       └─ rig:camera_origin_offset   device centre back to device (0, 0)
//!          └─ rig:camera_dev_scale    device units to view pixels
//!             └─ rig:camera_screen_pos  centres the device area
//!                └─ rig:camera        the view camera
//! ```
//!
//! `rig:camera_2d_view` holds the transform that maps the `z_2d` plane to
//! top-left-origin pixels. It is kept up to date but not linked into the
//! camera's parent chain; the same mapping reaches the camera through
//! [`CameraRig::main_view`].
//!
//! Because every link is an ordinary entity, the camera's world transform
//! comes from [`SceneGraph::world_transform`] like any other entity, and
//! the renderer needs no special cases for the editor camera.
//!
//! # Example
//!
//! ```
//! use scenerig::camera_rig::CameraRig;
//! use scenerig::{EngineConfig, SceneGraph};
//!
//! let mut scene = SceneGraph::new();
//! let config = EngineConfig::new().device_size(800.0, 600.0);
//! let root = scene.root();
//! let mut rig = CameraRig::new(&mut scene, root, &config)?;
//! rig.resize(&mut scene, 400.0, 400.0)?;
//! rig.initialize(&mut scene, 800.0, 600.0)?;
//!
//! assert!((rig.screen_area().x - 400.0).abs() < 0.001);
//! assert!((rig.screen_area().y - 300.0).abs() < 0.001);
//! assert!((rig.device_scale() - 0.5).abs() < 0.001);
//! # Ok::<(), scenerig::RigError>(())
//! ```

use glam::{Mat4, Quat, Vec2, Vec3, Vec4};
use hecs::Entity;

use crate::arcball::Arcball;
use crate::camera::Camera;
use crate::config::EngineConfig;
use crate::error::{Result, RigError};
use crate::scene::{Component, ComponentKind, SceneGraph};

/// Initial armature length before the first projection update.
const INITIAL_ARMATURE_LENGTH: f32 = 10.0;

pub struct CameraRig {
    pub to_origin: Entity,
    pub rotate: Entity,
    pub armature: Entity,
    pub origin_offset: Entity,
    pub dev_scale: Entity,
    pub screen_pos: Entity,
    pub view_2d: Entity,
    pub camera: Entity,

    fov_y: f32,
    z_near: f32,
    z_far: f32,
    z_2d: f32,

    view_size: Vec2,
    device_size: Vec2,
    screen_area: Vec2,
    device_scale: f32,
    view_camera_z: f32,
    main_view: Mat4,

    arcball: Arcball,
    saved_rotation: Quat,
}

impl CameraRig {
    /// Builds the rig chain under `parent` and attaches a non-clearing
    /// perspective camera to its tip.
    pub fn new(scene: &mut SceneGraph, parent: Entity, config: &EngineConfig) -> Result<Self> {
        let to_origin = scene.spawn_child(parent, "rig:camera_to_origin")?;
        let rotate = scene.spawn_child(to_origin, "rig:camera_rotate")?;
        let armature = scene.spawn_child(rotate, "rig:camera_armature")?;
        let origin_offset = scene.spawn_child(armature, "rig:camera_origin_offset")?;
        let dev_scale = scene.spawn_child(origin_offset, "rig:camera_dev_scale")?;
        let screen_pos = scene.spawn_child(dev_scale, "rig:camera_screen_pos")?;
        let view_2d = scene.spawn("rig:camera_2d_view");
        let camera = scene.spawn_child(screen_pos, "rig:camera")?;

        let mut component = Camera::perspective(config.fov_y, config.z_near, config.z_far);
        component.set_clear(false);
        component.set_background_color(config.background);
        scene.add_component(camera, Component::Camera(component))?;

        Ok(Self {
            to_origin,
            rotate,
            armature,
            origin_offset,
            dev_scale,
            screen_pos,
            view_2d,
            camera,
            fov_y: config.fov_y,
            z_near: config.z_near,
            z_far: config.z_far,
            z_2d: config.z_2d,
            view_size: Vec2::new(config.width as f32, config.height as f32),
            device_size: Vec2::new(config.device_width, config.device_height),
            screen_area: Vec2::ZERO,
            device_scale: 1.0,
            view_camera_z: INITIAL_ARMATURE_LENGTH,
            main_view: Mat4::IDENTITY,
            arcball: Arcball::default(),
            saved_rotation: Quat::IDENTITY,
        })
    }

    /// Centres the orbit origin on the device and recomputes the rig for
    /// the current view size.
    pub fn initialize(&mut self, scene: &mut SceneGraph, device_width: f32, device_height: f32) -> Result<()> {
        let origin = Vec3::new(device_width / 2.0, device_height / 2.0, 0.0);
        scene.set_translation(
            self.origin_offset,
            Vec3::new(-device_width / 2.0, -(device_height / 2.0), 0.0),
        )?;
        self.set_pan(scene, origin)?;
        self.set_zoom(scene, INITIAL_ARMATURE_LENGTH)?;

        let view = self.view_size;
        self.recompute_device_transform(scene, device_width, device_height, view.x, view.y)
    }

    /// Applies a new view size and re-centres the arcball on it.
    pub fn resize(&mut self, scene: &mut SceneGraph, width: f32, height: f32) -> Result<()> {
        let device = self.device_size;
        self.recompute_device_transform(scene, device.x, device.y, width, height)?;
        self.arcball.init(
            Vec2::new(width / 2.0, height / 2.0),
            (width * width + height * height).sqrt() / 2.0,
        );
        Ok(())
    }

    /// Fits the device screen into the view and updates the device scale
    /// and screen position links, then the view and projection.
    pub fn recompute_device_transform(
        &mut self,
        scene: &mut SceneGraph,
        device_width: f32,
        device_height: f32,
        view_width: f32,
        view_height: f32,
    ) -> Result<()> {
        self.device_size = Vec2::new(device_width, device_height);
        self.view_size = Vec2::new(view_width, view_height);
        if device_width <= 0.0 || device_height <= 0.0 || view_width <= 0.0 || view_height <= 0.0 {
            log::debug!("skipping device transform for an empty view or device");
            return Ok(());
        }

        let device_aspect = device_width / device_height;
        let view_aspect = view_width / view_height;

        // a slimmer device fits the view's height, anything else its width
        if device_aspect < view_aspect {
            let height = view_height;
            let width = height * device_aspect;
            self.screen_area = Vec2::new(width, height);
            scene.set_translation(
                self.screen_pos,
                Vec3::new(-(view_width / 2.0) + width / 2.0, 0.0, 0.0),
            )?;
        } else {
            let width = view_width;
            let height = width / device_aspect;
            self.screen_area = Vec2::new(width, height);
            scene.set_translation(
                self.screen_pos,
                Vec3::new(0.0, -(view_height / 2.0) + height / 2.0, 0.0),
            )?;
        }

        // the screen area has the device's aspect, so one scale fits both axes
        self.device_scale = self.screen_area.x / device_width;
        scene.set_scale(self.dev_scale, Vec3::splat(1.0 / self.device_scale))?;

        self.update_view_and_projection(scene)
    }

    /// Recomputes the 2D-plane mapping, the camera projection and the
    /// armature length that places the `z_2d` plane at the device plane.
    pub fn update_view_and_projection(&mut self, scene: &mut SceneGraph) -> Result<()> {
        let Vec2 { x: width, y: height } = self.view_size;
        let aspect = width / height;

        let top = self.z_near * (self.fov_y * std::f32::consts::PI / 360.0).tan();
        let left = -top * aspect;
        let right = top * aspect;
        let bottom = -top;

        let left_2d = left / self.z_near * self.z_2d;
        let right_2d = right / self.z_near * self.z_2d;
        let top_2d = top / self.z_near * self.z_2d;
        let bottom_2d = bottom / self.z_near * self.z_2d;

        // frustum cross-section at z_2d per view pixel
        let width_scale = (right_2d - left_2d) / width;
        let height_scale = (top_2d - bottom_2d) / height;

        self.main_view = Mat4::from_translation(Vec3::new(left_2d, top_2d, 0.0))
            * Mat4::from_scale(Vec3::new(width_scale, -height_scale, width_scale));

        {
            let mut camera = scene
                .camera_mut(self.camera)
                .ok_or(RigError::MissingComponent {
                    entity: self.camera,
                    kind: ComponentKind::Camera,
                })?;
            camera.set_field_of_view(self.fov_y);
            camera.set_near_plane(self.z_near);
            camera.set_far_plane(self.z_far);
        }

        let plane = self.main_view.inverse() * Vec4::new(0.0, 0.0, self.z_2d, 1.0);
        self.set_zoom(scene, plane.z / self.device_scale)?;

        scene.set_translation(self.view_2d, Vec3::new(-left_2d, -top_2d, 0.0))?;
        scene.set_rotation(self.view_2d, Quat::from_rotation_z(std::f32::consts::PI))?;
        scene.set_scale(self.view_2d, Vec3::splat(1.0 / width_scale))?;
        Ok(())
    }

    pub fn set_orbit(&self, scene: &mut SceneGraph, rotation: Quat) -> Result<()> {
        scene.set_rotation(self.rotate, rotation)
    }

    pub fn orbit(&self, scene: &SceneGraph) -> Quat {
        scene
            .transform(self.rotate)
            .map(|t| t.rotation)
            .unwrap_or(Quat::IDENTITY)
    }

    /// Sets the armature length, the camera's distance from the origin.
    pub fn set_zoom(&mut self, scene: &mut SceneGraph, length: f32) -> Result<()> {
        self.view_camera_z = length;
        scene.set_translation(self.armature, Vec3::new(0.0, 0.0, length))
    }

    /// Moves the orbit origin.
    pub fn set_pan(&self, scene: &mut SceneGraph, origin: Vec3) -> Result<()> {
        scene.set_translation(self.to_origin, origin)
    }

    /// Current orbit origin, which scene pans move directly.
    pub fn origin(&self, scene: &SceneGraph) -> Vec3 {
        scene
            .transform(self.to_origin)
            .map(|t| t.position)
            .unwrap_or(Vec3::ZERO)
    }

    /// Starts an arcball drag at a window position.
    pub fn begin_orbit(&mut self, scene: &SceneGraph, window: Vec2) {
        self.saved_rotation = self.orbit(scene);
        let ball = self.mirror(window);
        self.arcball.mouse_down(ball.x, ball.y);
    }

    /// Rotates the rig by the drag from [`begin_orbit`](Self::begin_orbit)
    /// to `window`.
    pub fn drag_orbit(&mut self, scene: &mut SceneGraph, window: Vec2) -> Result<()> {
        let ball = self.mirror(window);
        let q_drag = self.arcball.mouse_motion(ball.x, ball.y);
        self.set_orbit(scene, self.saved_rotation * q_drag)
    }

    fn mirror(&self, window: Vec2) -> Vec2 {
        self.view_size - window
    }

    pub fn main_view(&self) -> &Mat4 {
        &self.main_view
    }

    pub fn device_scale(&self) -> f32 {
        self.device_scale
    }

    /// Size in view pixels of the letterboxed device screen.
    pub fn screen_area(&self) -> Vec2 {
        self.screen_area
    }

    pub fn view_size(&self) -> Vec2 {
        self.view_size
    }

    pub fn device_size(&self) -> Vec2 {
        self.device_size
    }

    pub fn view_camera_z(&self) -> f32 {
        self.view_camera_z
    }

    pub fn arcball(&self) -> &Arcball {
        &self.arcball
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rig(view: (f32, f32), device: (f32, f32)) -> (SceneGraph, CameraRig) {
        let mut scene = SceneGraph::new();
        let config = EngineConfig::new()
            .size(view.0 as u32, view.1 as u32)
            .device_size(device.0, device.1);
        let root = scene.root();
        let mut rig = CameraRig::new(&mut scene, root, &config).unwrap();
        rig.resize(&mut scene, view.0, view.1).unwrap();
        rig.initialize(&mut scene, device.0, device.1).unwrap();
        scene
            .camera_mut(rig.camera)
            .unwrap()
            .set_viewport(0.0, 0.0, view.0, view.1);
        (scene, rig)
    }

    fn project(scene: &SceneGraph, rig: &CameraRig, p: Vec3) -> Vec3 {
        let world = scene.world_transform(rig.camera).unwrap();
        let view = *rig.main_view() * world.inverse();
        let camera = scene.camera(rig.camera).unwrap();
        (*camera.projection() * view).project_point3(p)
    }

    #[test]
    fn test_chain_order_and_labels() {
        let (scene, rig) = rig((400.0, 300.0), (800.0, 600.0));
        assert_eq!(scene.parent(rig.rotate), Some(rig.to_origin));
        assert_eq!(scene.parent(rig.armature), Some(rig.rotate));
        assert_eq!(scene.parent(rig.origin_offset), Some(rig.armature));
        assert_eq!(scene.parent(rig.dev_scale), Some(rig.origin_offset));
        assert_eq!(scene.parent(rig.screen_pos), Some(rig.dev_scale));
        assert_eq!(scene.parent(rig.camera), Some(rig.screen_pos));
        assert_eq!(scene.parent(rig.view_2d), None);
        assert_eq!(scene.label(rig.armature).as_deref(), Some("rig:camera_armature"));
        assert!(!scene.camera(rig.camera).unwrap().clears());
    }

    #[test]
    fn test_device_fit_into_square_view() {
        let (scene, rig) = rig((400.0, 400.0), (800.0, 600.0));
        assert!((rig.screen_area().x - 400.0).abs() < 0.001);
        assert!((rig.screen_area().y - 300.0).abs() < 0.001);
        assert!((rig.device_scale() - 0.5).abs() < 0.001);

        let scale = scene.transform(rig.dev_scale).unwrap().scale;
        assert!((scale.x - 2.0).abs() < 0.001);
        let screen_pos = scene.transform(rig.screen_pos).unwrap().position;
        assert!(screen_pos.x.abs() < 0.001);
        assert!((screen_pos.y + 50.0).abs() < 0.001);
    }

    #[test]
    fn test_portrait_device_fits_landscape_view_height() {
        let (scene, rig) = rig((800.0, 600.0), (480.0, 800.0));
        assert!((rig.screen_area().x - 360.0).abs() < 0.001);
        assert!((rig.screen_area().y - 600.0).abs() < 0.001);
        assert!((rig.device_scale() - 0.75).abs() < 0.001);

        let screen_pos = scene.transform(rig.screen_pos).unwrap().position;
        assert!((screen_pos.x + 220.0).abs() < 0.001);
        assert!(screen_pos.y.abs() < 0.001);
    }

    #[test]
    fn test_screen_area_stays_inside_view() {
        let cases = [
            ((800.0, 600.0), (480.0, 800.0)),
            ((400.0, 400.0), (800.0, 600.0)),
            ((300.0, 900.0), (800.0, 600.0)),
            ((1600.0, 400.0), (480.0, 800.0)),
        ];
        for (view, device) in cases {
            let (_, rig) = rig(view, device);
            let area = rig.screen_area();
            assert!(area.x <= view.0 + 0.001 && area.y <= view.1 + 0.001, "{view:?} {device:?}");
            // one axis always fills the view
            assert!((area.x - view.0).abs() < 0.001 || (area.y - view.1).abs() < 0.001);
            assert!((area.x / area.y - device.0 / device.1).abs() < 0.001);
        }
    }

    #[test]
    fn test_equal_aspect_fits_width() {
        let (scene, rig) = rig((400.0, 300.0), (800.0, 600.0));
        assert!((rig.screen_area().x - 400.0).abs() < 0.001);
        assert!((rig.screen_area().y - 300.0).abs() < 0.001);
        assert!((rig.device_scale() - 0.5).abs() < 0.001);
        let screen_pos = scene.transform(rig.screen_pos).unwrap().position;
        assert!(screen_pos.abs_diff_eq(Vec3::ZERO, 1e-4));
    }

    #[test]
    fn test_device_corners_fill_the_view() {
        let (scene, rig) = rig((400.0, 300.0), (800.0, 600.0));

        let centre = project(&scene, &rig, Vec3::new(400.0, 300.0, 0.0));
        assert!(centre.x.abs() < 0.001 && centre.y.abs() < 0.001);

        let top_left = project(&scene, &rig, Vec3::ZERO);
        assert!((top_left.x + 1.0).abs() < 0.001);
        assert!((top_left.y - 1.0).abs() < 0.001);

        let bottom_right = project(&scene, &rig, Vec3::new(800.0, 600.0, 0.0));
        assert!((bottom_right.x - 1.0).abs() < 0.001);
        assert!((bottom_right.y + 1.0).abs() < 0.001);
    }

    #[test]
    fn test_device_plane_sits_at_z_2d() {
        let (scene, rig) = rig((400.0, 300.0), (800.0, 600.0));
        let world = scene.world_transform(rig.camera).unwrap();
        let eye = (*rig.main_view() * world.inverse()).transform_point3(Vec3::new(100.0, 50.0, 0.0));
        assert!((eye.z + 30.0).abs() < 0.001);
    }

    #[test]
    fn test_pan_and_zoom_move_links() {
        let (mut scene, mut rig) = rig((400.0, 300.0), (800.0, 600.0));
        assert_eq!(rig.origin(&scene), Vec3::new(400.0, 300.0, 0.0));

        rig.set_pan(&mut scene, Vec3::new(1.0, 2.0, 3.0)).unwrap();
        assert_eq!(rig.origin(&scene), Vec3::new(1.0, 2.0, 3.0));

        rig.set_zoom(&mut scene, 42.0).unwrap();
        assert_eq!(rig.view_camera_z(), 42.0);
        assert_eq!(
            scene.transform(rig.armature).unwrap().position,
            Vec3::new(0.0, 0.0, 42.0)
        );
    }

    #[test]
    fn test_orbit_drag_composes_with_saved_rotation() {
        let (mut scene, mut rig) = rig((400.0, 400.0), (800.0, 600.0));
        let saved = Quat::from_rotation_y(0.3);
        rig.set_orbit(&mut scene, saved).unwrap();

        rig.begin_orbit(&scene, Vec2::new(200.0, 200.0));
        rig.drag_orbit(&mut scene, Vec2::new(200.0, 200.0)).unwrap();
        assert!(rig.orbit(&scene).abs_diff_eq(saved, 1e-5));

        rig.drag_orbit(&mut scene, Vec2::new(260.0, 200.0)).unwrap();
        let expected = saved * rig.arcball().q_drag();
        assert!(rig.orbit(&scene).abs_diff_eq(expected, 1e-5));
        assert!(!rig.orbit(&scene).abs_diff_eq(saved, 1e-3));
    }
}
