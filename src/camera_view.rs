//! The editor's 3D view.
//!
//! [`CameraView`] ties the navigation rig, picking, grabs and the
//! multi-pass renderer together. It turns pointer and key events into
//! selection, entity moves and camera navigation, and paints a frame:
//!
//! 1. a background rectangle in the outer camera
//! 2. the shadow pass from the scene light
//! 3. the view camera's passes, through the depth-of-field effect when it
//!    is enabled
//! 4. editor overlays: pick ray, grid and the selection gizmo
//!
//! The view expects the outer (window) camera to be flushed on the
//! [`RenderContext`] when [`CameraView::paint`] is called, and leaves it
//! flushed afterwards.

use std::rc::Rc;

use glam::{Mat4, Vec2, Vec3};
use hecs::Entity;
use winit::keyboard::KeyCode;

use crate::backend::{
    DrawUniforms, FramebufferDesc, FramebufferTarget, PipelineDesc, PipelineId, RenderBackend,
};
use crate::camera::Camera;
use crate::camera_rig::CameraRig;
use crate::color::{Color, Rect};
use crate::config::EngineConfig;
use crate::dof::DofEffect;
use crate::error::{Result, RigError};
use crate::grab::{GrabState, GrabTranslate};
use crate::input::{ButtonState, InputEvent, InputStatus, KeyAction, MotionAction};
use crate::journal::EditJournal;
use crate::library::Library;
use crate::light::Light;
use crate::mesh::MeshData;
use crate::overlay::Overlays;
use crate::picking::{pick, Ray};
use crate::renderer::{PaintContext, RenderContext, RenderPass, Renderer};
use crate::scene::{Component, ComponentKind, SceneGraph};

/// Spawns the scene light with an orthographic shadow camera rendering
/// into a depth-only framebuffer, and registers it as the scene's light.
pub fn spawn_shadow_light<B: RenderBackend + ?Sized>(
    scene: &mut SceneGraph,
    backend: &mut B,
    config: &EngineConfig,
) -> Result<Entity> {
    let size = config.shadow_map_size.max(1);
    let shadow_map = backend.create_framebuffer(FramebufferDesc {
        label: "Shadow Map".into(),
        width: size,
        height: size,
        color: false,
    });

    let half_width = config.device_width;
    let half_height = config.device_height;
    let mut camera = Camera::orthographic(
        -half_width,
        -half_height,
        half_width,
        half_height,
        1.0,
        config.device_width.max(config.device_height) * 4.0,
    );
    camera.set_viewport(0.0, 0.0, size as f32, size as f32);
    camera.set_framebuffer(FramebufferTarget::Offscreen(shadow_map));
    camera.set_background_color(Color::WHITE);

    let light = scene.spawn_child(scene.root(), "light")?;
    scene.add_component(light, Component::Light(Light::default()))?;
    scene.add_component(light, Component::Camera(camera))?;
    scene.set_cast_shadow(light, false)?;
    scene.set_light(Some(light));
    Ok(light)
}

pub struct CameraView {
    rig: CameraRig,
    renderer: Renderer,
    dof: DofEffect,
    overlays: Overlays,
    background: PipelineId,
    background_color: Color,

    width: f32,
    height: f32,
    position: Vec2,
    last_viewport: Option<Vec2>,
    dirty_viewport_size: bool,

    selection: Option<Entity>,
    grab: GrabState,
    pick_ray: Option<Rc<MeshData>>,

    enable_dof: bool,
    debug_pick_ray: bool,
    play_mode: bool,
    device_mode: bool,
}

impl CameraView {
    /// Rigs a view camera into `scene` and centres it on the device.
    pub fn new<B: RenderBackend + ?Sized>(
        scene: &mut SceneGraph,
        backend: &mut B,
        config: &EngineConfig,
    ) -> Result<Self> {
        let mut rig = CameraRig::new(scene, scene.root(), config)?;
        let (width, height) = (config.width as f32, config.height as f32);
        rig.resize(scene, width, height)?;
        rig.initialize(scene, config.device_width, config.device_height)?;

        let background = backend.create_pipeline(&PipelineDesc::new("view-background"));

        Ok(Self {
            rig,
            renderer: Renderer::new(config.focal_distance, config.depth_of_field),
            dof: DofEffect::new(backend),
            overlays: Overlays::new(backend, config.grid_size, config.grid_spacing),
            background,
            background_color: config.background,
            width,
            height,
            position: Vec2::ZERO,
            last_viewport: None,
            dirty_viewport_size: true,
            selection: None,
            grab: GrabState::Idle,
            pick_ray: None,
            enable_dof: config.enable_dof,
            debug_pick_ray: config.debug_pick_ray,
            play_mode: config.play_mode,
            device_mode: config.device_mode,
        })
    }

    pub fn rig(&self) -> &CameraRig {
        &self.rig
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    pub fn size(&self) -> Vec2 {
        Vec2::new(self.width, self.height)
    }

    /// Resizes the view. The viewport is pushed on the next paint.
    pub fn set_size(&mut self, scene: &mut SceneGraph, width: f32, height: f32) -> Result<()> {
        if width == self.width && height == self.height {
            return Ok(());
        }
        self.width = width;
        self.height = height;
        self.dirty_viewport_size = true;
        self.rig.resize(scene, width, height)
    }

    /// Places the view inside the window. Pointer events are mapped into
    /// the view's own coordinates.
    pub fn set_position(&mut self, scene: &SceneGraph, x: f32, y: f32) {
        self.position = Vec2::new(x, y);
        if let Some(mut camera) = scene.camera_mut(self.rig.camera) {
            camera.set_input_transform(Mat4::from_translation(Vec3::new(-x, -y, 0.0)));
        }
    }

    pub fn selected(&self) -> Option<Entity> {
        self.selection
    }

    pub fn select(&mut self, scene: &SceneGraph, entity: Option<Entity>) {
        self.selection = entity;
        match entity {
            Some(entity) => self.overlays.gizmo.update(scene, entity),
            None => self.overlays.gizmo.clear(),
        }
    }

    pub fn grab(&self) -> &GrabState {
        &self.grab
    }

    pub fn pick_ray(&self) -> Option<&Rc<MeshData>> {
        self.pick_ray.as_ref()
    }

    pub fn play_mode(&self) -> bool {
        self.play_mode
    }

    pub fn set_play_mode(&mut self, enabled: bool) {
        log::info!("play mode {}", if enabled { "on" } else { "off" });
        self.play_mode = enabled;
    }

    pub fn set_device_mode(&mut self, enabled: bool) {
        self.device_mode = enabled;
    }

    pub fn set_depth_of_field(&mut self, enabled: bool) {
        self.enable_dof = enabled;
    }

    pub fn set_debug_pick_ray(&mut self, enabled: bool) {
        self.debug_pick_ray = enabled;
        if !enabled {
            self.pick_ray = None;
        }
    }

    /// Drops any grab in progress without committing it.
    pub fn ungrab(&mut self) {
        self.grab.cancel();
    }

    /// Pushes the view's viewport to the camera if its rounded window
    /// position moved or its size changed since the last push.
    fn sync_viewport(&mut self, scene: &SceneGraph) {
        let anchor = self.position.round();
        if self.last_viewport == Some(anchor) && !self.dirty_viewport_size {
            return;
        }
        let Some(mut camera) = scene.camera_mut(self.rig.camera) else {
            return;
        };
        camera.set_viewport(anchor.x, anchor.y, self.width, self.height);
        self.last_viewport = Some(anchor);
        self.dirty_viewport_size = false;
    }

    /// The view camera with an up-to-date viewport and view transform.
    fn view_camera(&mut self, scene: &SceneGraph) -> Option<Camera> {
        self.sync_viewport(scene);
        Renderer::camera_update_view(
            scene,
            self.rig.camera,
            RenderPass::ColorUnblended,
            self.rig.main_view(),
        );
        scene.camera(self.rig.camera).map(|c| Camera::clone(&c))
    }

    /// Handles one input event. Events arriving during a grab go to the
    /// grab first.
    pub fn handle_input(
        &mut self,
        event: &InputEvent,
        scene: &mut SceneGraph,
        library: &Library,
        journal: &mut dyn EditJournal,
    ) -> InputStatus {
        if self.device_mode {
            return InputStatus::Unhandled;
        }

        match *event {
            InputEvent::Motion {
                action,
                state,
                position,
                modifiers,
            } => {
                let Some(camera) = self.view_camera(scene) else {
                    return InputStatus::Unhandled;
                };
                let pointer = camera.transform_window_coordinate(position.x, position.y);

                if self.grab.is_dragging() {
                    return self.grab_motion(action, pointer, scene, journal);
                }

                match action {
                    MotionAction::Down if state == ButtonState::BUTTON_1 => {
                        self.pick_and_grab(&camera, pointer, scene, library)
                    }
                    MotionAction::Down if state == ButtonState::BUTTON_2 && !modifiers.shift => {
                        self.rig.begin_orbit(scene, pointer);
                        InputStatus::Handled
                    }
                    MotionAction::Move if state == ButtonState::BUTTON_2 && modifiers.shift => {
                        let pan = self.grab.begin(
                            scene,
                            &camera,
                            self.rig.to_origin,
                            pointer,
                            GrabTranslate::ScenePan,
                        );
                        match pan {
                            Ok(()) => InputStatus::Handled,
                            Err(_) => InputStatus::Unhandled,
                        }
                    }
                    MotionAction::Move if state == ButtonState::BUTTON_2 => {
                        match self.rig.drag_orbit(scene, pointer) {
                            Ok(()) => InputStatus::Handled,
                            Err(err) => {
                                log::warn!("orbit failed: {err}");
                                InputStatus::Unhandled
                            }
                        }
                    }
                    _ => InputStatus::Unhandled,
                }
            }
            InputEvent::Key {
                action: KeyAction::Up,
                key,
                ..
            } => {
                self.key_released(key, scene, journal);
                InputStatus::Unhandled
            }
            InputEvent::Key { .. } => InputStatus::Unhandled,
        }
    }

    fn pick_and_grab(
        &mut self,
        camera: &Camera,
        pointer: Vec2,
        scene: &SceneGraph,
        library: &Library,
    ) -> InputStatus {
        let ray = Ray::pick_ray(camera, pointer);
        if self.debug_pick_ray {
            let length = camera.far_plane() - camera.near_plane();
            self.pick_ray = Some(Rc::new(ray.debug_line(length)));
        }

        let picked = pick(scene, library, scene.root(), camera, &ray).map(|hit| hit.entity);
        self.select(scene, picked);

        if let Some(entity) = picked
            && self
                .grab
                .begin(scene, camera, entity, pointer, GrabTranslate::Entity)
                .is_err()
        {
            return InputStatus::Unhandled;
        }
        InputStatus::Handled
    }

    fn grab_motion(
        &mut self,
        action: MotionAction,
        pointer: Vec2,
        scene: &mut SceneGraph,
        journal: &mut dyn EditJournal,
    ) -> InputStatus {
        match action {
            MotionAction::Move => {
                self.grab.motion(scene, pointer);
                if let Some(entity) = self.selection {
                    self.overlays.gizmo.update(scene, entity);
                }
                InputStatus::Handled
            }
            MotionAction::Up => {
                if let Some(done) = self.grab.release(pointer)
                    && done.translate == GrabTranslate::Entity
                    && done.moved
                {
                    let end = done.end();
                    journal.move_entity(done.entity, end.x, end.y, end.z, false);
                }
                InputStatus::Handled
            }
            MotionAction::Down => InputStatus::Unhandled,
        }
    }

    fn key_released(&mut self, key: KeyCode, scene: &mut SceneGraph, journal: &mut dyn EditJournal) {
        match key {
            KeyCode::Minus => self.scale_zoom(scene, |zoom| zoom * 0.8),
            KeyCode::Equal => self.scale_zoom(scene, |zoom| if zoom != 0.0 { zoom * 1.2 } else { 0.1 }),
            KeyCode::KeyP => self.set_play_mode(!self.play_mode),
            KeyCode::Delete => {
                let Some(entity) = self.selection else {
                    return;
                };
                self.grab.cancel();
                if let Err(err) = journal.delete_entity(scene, entity) {
                    log::warn!("failed to delete {entity:?}: {err}");
                }
                self.select(scene, None);
                self.renderer.cache_mut().prune(scene);
            }
            _ => {}
        }
    }

    fn scale_zoom(&self, scene: &SceneGraph, f: impl FnOnce(f32) -> f32) {
        if let Some(mut camera) = scene.camera_mut(self.rig.camera) {
            let zoom = f(camera.zoom());
            camera.set_zoom(zoom);
        }
    }

    fn paint_context(&self) -> PaintContext {
        let device = self.rig.device_size();
        PaintContext {
            play_mode: self.play_mode,
            device_mode: self.device_mode,
            ..PaintContext::new(device.x, device.y)
        }
    }

    /// Paints the view into the outer camera's framebuffer.
    pub fn paint<B: RenderBackend + ?Sized>(
        &mut self,
        context: &mut RenderContext,
        scene: &SceneGraph,
        backend: &mut B,
    ) -> Result<()> {
        let camera_entity = self.rig.camera;
        let missing_camera = RigError::MissingComponent {
            entity: camera_entity,
            kind: ComponentKind::Camera,
        };
        let framebuffer = context.bound().map(|s| s.framebuffer).unwrap_or_default();
        scene
            .camera_mut(camera_entity)
            .ok_or(missing_camera)?
            .set_framebuffer(framebuffer);

        let uniforms = DrawUniforms {
            color: self.background_color.to_array(),
            ..Default::default()
        };
        backend.draw_rectangle(
            self.background,
            Rect::new(self.position.x, self.position.y, self.width, self.height),
            uniforms,
        );

        context.suspend_camera();

        let paint = self.paint_context();
        if let Some(light) = scene.light() {
            self.renderer.paint_camera_entity(
                context,
                &paint.with_pass(RenderPass::Shadow),
                scene,
                light,
                &Mat4::IDENTITY,
                backend,
            );
        }

        self.sync_viewport(scene);
        let main_view = *self.rig.main_view();
        Renderer::camera_update_view(scene, camera_entity, RenderPass::ColorUnblended, &main_view);

        if self.enable_dof {
            self.paint_with_dof(context, &paint, scene, &main_view, backend);
        } else {
            for pass in [RenderPass::ColorUnblended, RenderPass::ColorBlended] {
                self.renderer.paint_camera_entity(
                    context,
                    &paint.with_pass(pass),
                    scene,
                    camera_entity,
                    &main_view,
                    backend,
                );
            }
            context.resume_camera(backend);
        }

        self.paint_overlays(context, scene, backend);
        Ok(())
    }

    fn paint_with_dof<B: RenderBackend + ?Sized>(
        &mut self,
        context: &mut RenderContext,
        paint: &PaintContext,
        scene: &SceneGraph,
        main_view: &Mat4,
        backend: &mut B,
    ) {
        let camera_entity = self.rig.camera;
        let Some((framebuffer, [x, y, width, height])) = scene
            .camera(camera_entity)
            .map(|c| (c.framebuffer(), c.viewport()))
        else {
            return;
        };
        self.dof
            .set_framebuffer_size(backend, width as u32, height as u32);

        let passes: [(FramebufferTarget, Color, &[RenderPass]); 2] = [
            (self.dof.depth_pass_fb(), Color::WHITE, &[RenderPass::DofDepth]),
            (
                self.dof.color_pass_fb(),
                self.background_color,
                &[RenderPass::ColorUnblended, RenderPass::ColorBlended],
            ),
        ];
        for (target, clear, passes) in passes {
            let Some(camera) = scene.camera_mut(camera_entity).map(|mut c| {
                c.set_framebuffer(target);
                c.set_viewport(0.0, 0.0, width, height);
                Camera::clone(&c)
            }) else {
                return;
            };
            context.flush_camera(backend, &camera);
            context.clear(backend, clear);
            context.end_frame();

            for &pass in passes {
                self.renderer.paint_camera_entity(
                    context,
                    &paint.with_pass(pass),
                    scene,
                    camera_entity,
                    main_view,
                    backend,
                );
            }
        }

        if let Some(mut camera) = scene.camera_mut(camera_entity) {
            camera.set_framebuffer(framebuffer);
            camera.set_viewport(x, y, width, height);
        }

        context.resume_camera(backend);
        self.dof.draw_rectangle(
            backend,
            Rect::new(self.position.x, self.position.y, self.width, self.height),
        );
    }

    fn paint_overlays<B: RenderBackend + ?Sized>(
        &mut self,
        context: &mut RenderContext,
        scene: &SceneGraph,
        backend: &mut B,
    ) {
        let pick_ray = self.pick_ray.as_ref().filter(|_| self.debug_pick_ray);
        let draw_tools = !self.device_mode && !self.play_mode;
        if pick_ray.is_none() && !draw_tools {
            return;
        }
        let Some(camera) = scene.camera(self.rig.camera).map(|c| Camera::clone(&c)) else {
            return;
        };
        let view = *camera.view_transform();

        context.suspend_camera();
        context.flush_camera(backend, &camera);

        if let Some(ray) = pick_ray {
            self.overlays.draw_pick_ray(backend, ray, &view);
        }
        if draw_tools {
            self.overlays
                .draw_grid(backend, &view, self.rig.device_scale());
            if let Some(entity) = self.selection {
                self.overlays.gizmo.update(scene, entity);
                self.overlays.draw_gizmo(backend, &view);
            }
        }

        context.end_frame();
        context.resume_camera(backend);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{CommandRecorder, GpuCommand, MeshSource};
    use crate::geometry::Geometry;
    use crate::input::Modifiers;
    use crate::journal::{JournalEntry, RecordingJournal};

    struct Fixture {
        scene: SceneGraph,
        library: Library,
        backend: CommandRecorder,
        view: CameraView,
        cube: Entity,
        journal: RecordingJournal,
    }

    fn fixture(config: EngineConfig) -> Fixture {
        let mut scene = SceneGraph::new();
        let mut library = Library::new();
        let mut backend = CommandRecorder::new();

        let mesh = library.add_mesh(MeshData::cube(100.0));
        let cube = scene.spawn_child(scene.root(), "cube").unwrap();
        scene
            .add_component(cube, Component::Geometry(Geometry::model(mesh)))
            .unwrap();
        scene.set_translation(cube, Vec3::new(400.0, 300.0, 0.0)).unwrap();

        let view = CameraView::new(&mut scene, &mut backend, &config).unwrap();
        Fixture {
            scene,
            library,
            backend,
            view,
            cube,
            journal: RecordingJournal::new(),
        }
    }

    fn config() -> EngineConfig {
        EngineConfig::new().size(800, 600).device_size(800.0, 600.0)
    }

    fn motion(action: MotionAction, state: ButtonState, x: f32, y: f32, shift: bool) -> InputEvent {
        InputEvent::Motion {
            action,
            state,
            position: Vec2::new(x, y),
            modifiers: Modifiers {
                shift,
                ..Default::default()
            },
        }
    }

    fn key_up(key: KeyCode) -> InputEvent {
        InputEvent::Key {
            action: KeyAction::Up,
            key,
            modifiers: Modifiers::default(),
        }
    }

    impl Fixture {
        fn send(&mut self, event: InputEvent) -> InputStatus {
            self.view
                .handle_input(&event, &mut self.scene, &self.library, &mut self.journal)
        }

        fn paint(&mut self) {
            let mut outer = Camera::orthographic(0.0, 0.0, 800.0, 600.0, -1.0, 1.0);
            outer.set_viewport(0.0, 0.0, 800.0, 600.0);
            let mut context = RenderContext::new();
            context.flush_camera(&mut self.backend, &outer);
            self.view
                .paint(&mut context, &self.scene, &mut self.backend)
                .unwrap();
            context.end_frame();
            assert!(context.is_balanced());
        }

        fn transient_draws(&self) -> usize {
            self.backend
                .commands()
                .iter()
                .filter(|c| matches!(c, GpuCommand::Draw(d) if matches!(d.mesh, MeshSource::Transient(_))))
                .count()
        }
    }

    #[test]
    fn test_click_selects_and_drag_commits_move() {
        let mut f = fixture(config());

        let status = f.send(motion(MotionAction::Down, ButtonState::BUTTON_1, 400.0, 299.0, false));
        assert_eq!(status, InputStatus::Handled);
        assert_eq!(f.view.selected(), Some(f.cube));
        assert!(f.view.grab().is_dragging());

        f.send(motion(MotionAction::Move, ButtonState::BUTTON_1, 410.0, 299.0, false));
        let position = f.scene.transform(f.cube).unwrap().position;
        assert!((position.x - 410.0).abs() < 0.01);
        assert!((position.y - 300.0).abs() < 0.01);

        f.send(motion(MotionAction::Up, ButtonState::BUTTON_1, 410.0, 299.0, false));
        assert!(!f.view.grab().is_dragging());
        match &f.journal.entries()[0] {
            JournalEntry::Move {
                entity,
                position,
                mergable,
            } => {
                assert_eq!(*entity, f.cube);
                assert!((position.x - 410.0).abs() < 0.01);
                assert!(!mergable);
            }
            other => panic!("unexpected entry {other:?}"),
        }
    }

    #[test]
    fn test_click_without_motion_is_not_journaled() {
        let mut f = fixture(config());
        f.send(motion(MotionAction::Down, ButtonState::BUTTON_1, 400.0, 299.0, false));
        f.send(motion(MotionAction::Up, ButtonState::BUTTON_1, 400.0, 299.0, false));
        assert_eq!(f.view.selected(), Some(f.cube));
        assert!(f.journal.is_empty());
    }

    #[test]
    fn test_click_on_empty_space_clears_selection() {
        let mut f = fixture(config());
        f.send(motion(MotionAction::Down, ButtonState::BUTTON_1, 400.0, 299.0, false));
        f.send(motion(MotionAction::Up, ButtonState::BUTTON_1, 400.0, 299.0, false));

        let status = f.send(motion(MotionAction::Down, ButtonState::BUTTON_1, 10.0, 10.0, false));
        assert_eq!(status, InputStatus::Handled);
        assert_eq!(f.view.selected(), None);
        assert!(!f.view.grab().is_dragging());
    }

    #[test]
    fn test_shift_middle_drag_pans_against_pointer() {
        let mut f = fixture(config());
        let origin = f.view.rig().origin(&f.scene);

        assert_eq!(
            f.send(motion(MotionAction::Down, ButtonState::BUTTON_2, 400.0, 299.0, true)),
            InputStatus::Unhandled
        );
        f.send(motion(MotionAction::Move, ButtonState::BUTTON_2, 400.0, 299.0, true));
        f.send(motion(MotionAction::Move, ButtonState::BUTTON_2, 410.0, 299.0, true));

        let panned = f.view.rig().origin(&f.scene);
        assert!((panned.x - (origin.x - 10.0)).abs() < 0.01);
        f.send(motion(MotionAction::Up, ButtonState::BUTTON_2, 410.0, 299.0, true));
        assert!(f.journal.is_empty());
    }

    #[test]
    fn test_middle_drag_orbits() {
        let mut f = fixture(config());
        f.send(motion(MotionAction::Down, ButtonState::BUTTON_2, 400.0, 300.0, false));
        f.send(motion(MotionAction::Move, ButtonState::BUTTON_2, 450.0, 300.0, false));
        let orbit = f.view.rig().orbit(&f.scene);
        assert!(!orbit.abs_diff_eq(glam::Quat::IDENTITY, 1e-3));
    }

    #[test]
    fn test_zoom_keys() {
        let mut f = fixture(config());
        let camera = f.view.rig().camera;
        let zoom = |f: &Fixture| f.scene.camera(camera).unwrap().zoom();

        f.send(key_up(KeyCode::Minus));
        assert!((zoom(&f) - 0.8).abs() < 0.001);
        f.send(key_up(KeyCode::Equal));
        assert!((zoom(&f) - 0.96).abs() < 0.001);

        f.scene.camera_mut(camera).unwrap().set_zoom(0.0);
        f.send(key_up(KeyCode::Equal));
        assert!((zoom(&f) - 0.1).abs() < 0.001);
    }

    #[test]
    fn test_play_key_and_delete() {
        let mut f = fixture(config());
        f.send(key_up(KeyCode::KeyP));
        assert!(f.view.play_mode());

        f.send(motion(MotionAction::Down, ButtonState::BUTTON_1, 400.0, 299.0, false));
        f.send(motion(MotionAction::Up, ButtonState::BUTTON_1, 400.0, 299.0, false));
        f.send(key_up(KeyCode::Delete));
        assert!(!f.scene.contains(f.cube));
        assert_eq!(f.view.selected(), None);
        assert!(matches!(f.journal.entries()[0], JournalEntry::Delete { .. }));
    }

    #[test]
    fn test_device_mode_ignores_input() {
        let mut f = fixture(config().device_mode(true));
        let status = f.send(motion(MotionAction::Down, ButtonState::BUTTON_1, 400.0, 299.0, false));
        assert_eq!(status, InputStatus::Unhandled);
        assert_eq!(f.view.selected(), None);
    }

    #[test]
    fn test_dof_frame_clears_pass_targets_and_composites() {
        let mut f = fixture(config());
        f.paint();

        let clears: Vec<_> = f
            .backend
            .commands()
            .iter()
            .filter_map(|c| match c {
                GpuCommand::Clear(target, color) => Some((*target, *color)),
                _ => None,
            })
            .collect();
        assert_eq!(clears.len(), 2);
        assert_eq!(clears[0], (f.view.dof.depth_pass_fb(), Color::WHITE));
        assert_eq!(clears[1].0, f.view.dof.color_pass_fb());
        assert_eq!(f.view.dof.size(), (800, 600));

        // view background, device rect in the color pass, composite
        let rectangles = f
            .backend
            .commands()
            .iter()
            .filter(|c| matches!(c, GpuCommand::DrawRectangle(..)))
            .count();
        assert_eq!(rectangles, 3);

        // the camera is back on the outer framebuffer afterwards
        let camera = f.scene.camera(f.view.rig().camera).unwrap();
        assert_eq!(camera.framebuffer(), FramebufferTarget::Onscreen);
        assert_eq!(camera.viewport(), [0.0, 0.0, 800.0, 600.0]);
    }

    #[test]
    fn test_frame_without_dof_draws_scene_once_per_color_pass() {
        let mut f = fixture(config().depth_of_field(false));
        f.paint();
        let mesh_draws = f
            .backend
            .commands()
            .iter()
            .filter(|c| matches!(c, GpuCommand::Draw(d) if matches!(d.mesh, MeshSource::Library(_))))
            .count();
        assert_eq!(mesh_draws, 1);
        assert!(!f.backend.commands().iter().any(|c| matches!(c, GpuCommand::Clear(..))));
    }

    #[test]
    fn test_shadow_pass_renders_into_light_framebuffer() {
        let mut f = fixture(config().depth_of_field(false));
        let light = spawn_shadow_light(&mut f.scene, &mut f.backend, &config()).unwrap();
        let shadow_fb = f.scene.camera(light).unwrap().framebuffer();
        f.paint();

        let bound_shadow = f
            .backend
            .commands()
            .iter()
            .any(|c| matches!(c, GpuCommand::BindCamera(state) if state.framebuffer == shadow_fb && state.clear.is_some()));
        assert!(bound_shadow);
    }

    #[test]
    fn test_overlays_only_in_edit_mode() {
        let mut f = fixture(config().depth_of_field(false));
        f.paint();
        let edit_draws = f.transient_draws();
        assert_eq!(edit_draws, 16);

        let mut f = fixture(config().depth_of_field(false).play_mode(true));
        f.paint();
        assert_eq!(f.transient_draws(), 0);
    }

    #[test]
    fn test_debug_pick_ray_is_kept_and_drawn() {
        let mut f = fixture(config().depth_of_field(false).play_mode(true).debug_pick_ray(true));
        f.send(motion(MotionAction::Down, ButtonState::BUTTON_1, 100.0, 100.0, false));
        assert!(f.view.pick_ray().is_some());
        f.paint();
        assert_eq!(f.transient_draws(), 1);
    }

    #[test]
    fn test_viewport_follows_view_position() {
        let mut f = fixture(config());
        f.view.set_position(&f.scene, 10.4, 20.6);
        f.paint();
        let camera = f.scene.camera(f.view.rig().camera).unwrap();
        assert_eq!(camera.viewport(), [10.0, 21.0, 800.0, 600.0]);
    }
}
