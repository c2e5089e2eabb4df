//! Multi-pass scene painting.
//!
//! A frame paints the scene several times from two cameras:
//!
//! | Pass | Camera | Slot | Draws |
//! |------|--------|------|-------|
//! | [`RenderPass::Shadow`] | light | mask | visible shadow casters |
//! | [`RenderPass::DofDepth`] | view | mask | everything visible |
//! | [`RenderPass::ColorUnblended`] | view | color | opaque entities |
//! | [`RenderPass::ColorBlended`] | view | color | translucent entities |
//!
//! [`Renderer::paint_camera_entity`] syncs a camera's view transform from
//! the hierarchy, flushes it through the [`RenderContext`] and walks the
//! scene with a visitor that draws each entity with its cached pipeline.
//! Uniforms (modelview, normal matrix, shadow matrix, light and material
//! parameters) are rebuilt for every draw.

use glam::{Mat3, Mat4, Vec3};
use hecs::Entity;

use crate::backend::{
    CameraState, DrawCall, DrawUniforms, MeshSource, PipelineDesc, PipelineId, RenderBackend,
};
use crate::camera::Camera;
use crate::color::{Color, Rect};
use crate::light::LightUniforms;
use crate::pipeline_cache::{CacheSlot, PipelineCache};
use crate::scene::{SceneGraph, TransformStack, VisitFlags, Visitor};

/// One traversal of the scene with a particular purpose.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RenderPass {
    Shadow,
    DofDepth,
    ColorUnblended,
    ColorBlended,
}

impl RenderPass {
    /// Which cached pipeline of an entity this pass draws with.
    pub fn cache_slot(self) -> CacheSlot {
        match self {
            RenderPass::Shadow | RenderPass::DofDepth => CacheSlot::Mask,
            RenderPass::ColorUnblended | RenderPass::ColorBlended => CacheSlot::Color,
        }
    }

    pub fn is_color(self) -> bool {
        self.cache_slot() == CacheSlot::Color
    }
}

/// Per-pass painting state handed down the traversal.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PaintContext {
    pub pass: RenderPass,
    pub play_mode: bool,
    pub device_mode: bool,
    /// Size of the emulated device screen in scene units.
    pub device_width: f32,
    pub device_height: f32,
}

impl PaintContext {
    pub fn new(device_width: f32, device_height: f32) -> Self {
        Self {
            pass: RenderPass::ColorUnblended,
            play_mode: false,
            device_mode: false,
            device_width,
            device_height,
        }
    }

    pub fn with_pass(self, pass: RenderPass) -> Self {
        Self { pass, ..self }
    }
}

/// Tracks which camera is bound and enforces flush / end-frame and
/// suspend / resume nesting.
///
/// A camera is *flushed* to start drawing with it and *ended* when done.
/// An in-frame camera can be *suspended* while another camera draws, and is
/// rebound when it is *resumed*.
#[derive(Debug, Default)]
pub struct RenderContext {
    bound: Option<CameraState>,
    in_frame: bool,
    suspended: Vec<CameraState>,
    binds: usize,
}

impl RenderContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `camera` for drawing. Rebinding an unchanged camera that
    /// doesn't clear is skipped.
    pub fn flush_camera<B: RenderBackend + ?Sized>(&mut self, backend: &mut B, camera: &Camera) {
        debug_assert!(!self.in_frame, "camera flushed inside another camera's frame");
        self.bind(backend, camera.state());
        self.in_frame = true;
    }

    pub fn end_frame(&mut self) {
        debug_assert!(self.in_frame, "end_frame without a flushed camera");
        self.in_frame = false;
    }

    /// Steps out of the current camera's frame so another camera can draw.
    pub fn suspend_camera(&mut self) {
        debug_assert!(self.in_frame, "suspending a camera that isn't in a frame");
        if let Some(state) = self.bound {
            self.suspended.push(state);
        }
        self.in_frame = false;
    }

    /// Rebinds the most recently suspended camera and re-enters its frame.
    pub fn resume_camera<B: RenderBackend + ?Sized>(&mut self, backend: &mut B) {
        debug_assert!(!self.in_frame, "resuming while another camera is in a frame");
        let Some(state) = self.suspended.pop() else {
            debug_assert!(false, "resume without a suspended camera");
            return;
        };
        self.bind(backend, state);
        self.in_frame = true;
    }

    /// Clears the whole framebuffer of the bound camera.
    pub fn clear<B: RenderBackend + ?Sized>(&self, backend: &mut B, color: Color) {
        if let Some(state) = &self.bound {
            backend.clear(state.framebuffer, color);
        }
    }

    pub fn bound(&self) -> Option<&CameraState> {
        self.bound.as_ref()
    }

    pub fn in_frame(&self) -> bool {
        self.in_frame
    }

    /// Number of camera binds actually sent to the backend.
    pub fn bind_count(&self) -> usize {
        self.binds
    }

    /// True when no camera is in a frame or suspended.
    pub fn is_balanced(&self) -> bool {
        !self.in_frame && self.suspended.is_empty()
    }

    fn bind<B: RenderBackend + ?Sized>(&mut self, backend: &mut B, state: CameraState) {
        let settled = CameraState {
            clear: None,
            ..state
        };
        if state.clear.is_none() && self.bound == Some(settled) {
            return;
        }
        backend.bind_camera(&state);
        self.bound = Some(settled);
        self.binds += 1;
    }
}

/// Maps shadow clip space to shadow map texture coordinates. Clip depth is
/// already in `[0, 1]` so Z passes through.
pub fn shadow_bias() -> Mat4 {
    Mat4::from_translation(Vec3::new(0.5, 0.5, 0.0)) * Mat4::from_scale(Vec3::new(0.5, 0.5, 1.0))
}

/// Inverse transpose of the modelview's upper 3x3, widened to a `Mat4`.
pub fn normal_matrix(modelview: &Mat4) -> Mat4 {
    Mat4::from_mat3(Mat3::from_mat4(*modelview).inverse().transpose())
}

/// Light state shared by every draw of a color pass.
#[derive(Clone, Copy, Debug)]
struct LightFrame {
    uniforms: LightUniforms,
    /// bias * light projection * inverse light world; the model's world
    /// matrix completes the shadow matrix.
    shadow_base: Mat4,
}

impl LightFrame {
    fn new(scene: &SceneGraph, view: &Mat4) -> Option<Self> {
        let entity = scene.light()?;
        let light = *scene.light_component(entity)?;
        let world = scene.world_transform(entity)?;
        let shadow_base = match scene.camera(entity) {
            Some(camera) => shadow_bias() * *camera.projection() * world.inverse(),
            None => Mat4::IDENTITY,
        };
        Some(Self {
            uniforms: light.uniforms(&world, view),
            shadow_base,
        })
    }
}

pub struct Renderer {
    cache: PipelineCache,
    focal_distance: f32,
    depth_of_field: f32,
    background: Option<PipelineId>,
    frustum: Option<PipelineId>,
}

impl Renderer {
    pub fn new(focal_distance: f32, depth_of_field: f32) -> Self {
        Self {
            cache: PipelineCache::new(),
            focal_distance,
            depth_of_field,
            background: None,
            frustum: None,
        }
    }

    pub fn cache(&self) -> &PipelineCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut PipelineCache {
        &mut self.cache
    }

    pub fn set_focal_parameters(&mut self, focal_distance: f32, depth_of_field: f32) {
        self.focal_distance = focal_distance;
        self.depth_of_field = depth_of_field;
    }

    /// Recomputes the view transform of `camera` from its world transform.
    ///
    /// View cameras see through `main_view`; the shadow pass uses the bare
    /// inverse world transform, flipped in Y.
    pub fn camera_update_view(
        scene: &SceneGraph,
        camera: Entity,
        pass: RenderPass,
        main_view: &Mat4,
    ) -> bool {
        let Some(world) = scene.world_transform(camera) else {
            return false;
        };
        let Some(mut component) = scene.camera_mut(camera) else {
            return false;
        };

        let view = if pass == RenderPass::Shadow {
            Mat4::from_scale(Vec3::new(1.0, -1.0, 1.0)) * world.inverse()
        } else {
            *main_view * world.inverse()
        };
        component.set_view_transform(view);
        true
    }

    /// Paints the scene once from `camera` in the pass named by `paint`.
    #[allow(clippy::too_many_arguments)]
    pub fn paint_camera_entity<B: RenderBackend + ?Sized>(
        &mut self,
        context: &mut RenderContext,
        paint: &PaintContext,
        scene: &SceneGraph,
        camera: Entity,
        main_view: &Mat4,
        backend: &mut B,
    ) {
        if !Self::camera_update_view(scene, camera, paint.pass, main_view) {
            log::warn!("cannot paint from {camera:?}: no camera component");
            return;
        }
        let Some(component) = scene.camera(camera).map(|c| Camera::clone(&c)) else {
            return;
        };

        context.flush_camera(backend, &component);
        self.paint_scene(paint, scene, component.view_transform(), backend);
        context.end_frame();
    }

    /// Walks the whole scene drawing every eligible entity with the bound
    /// camera. Opaque color passes first fill the device area with black.
    pub fn paint_scene<B: RenderBackend + ?Sized>(
        &mut self,
        paint: &PaintContext,
        scene: &SceneGraph,
        view: &Mat4,
        backend: &mut B,
    ) {
        if paint.pass == RenderPass::ColorUnblended {
            let background = *self.background.get_or_insert_with(|| {
                backend.create_pipeline(&PipelineDesc::new("scene-background"))
            });
            let uniforms = DrawUniforms {
                color: Color::BLACK.to_array(),
                ..Default::default()
            };
            backend.draw_rectangle(
                background,
                Rect::new(0.0, 0.0, paint.device_width, paint.device_height),
                uniforms,
            );
        }

        let frustum = *self
            .frustum
            .get_or_insert_with(|| backend.create_pipeline(&PipelineDesc::new("frustum").with_depth()));

        let light = if paint.pass.is_color() {
            LightFrame::new(scene, view)
        } else {
            None
        };

        let mut visitor = PaintVisitor {
            cache: &mut self.cache,
            backend,
            paint,
            view: *view,
            light,
            dof: [-self.focal_distance, self.depth_of_field, 0.0, 0.0],
            frustum,
        };
        let mut stack = TransformStack::new();
        scene.traverse(scene.root(), &mut stack, &mut visitor);
        debug_assert!(stack.is_balanced());
    }
}

struct PaintVisitor<'a, B: RenderBackend + ?Sized> {
    cache: &'a mut PipelineCache,
    backend: &'a mut B,
    paint: &'a PaintContext,
    view: Mat4,
    light: Option<LightFrame>,
    dof: [f32; 4],
    frustum: PipelineId,
}

impl<B: RenderBackend + ?Sized> PaintVisitor<'_, B> {
    fn draw_light_frustum(&mut self, scene: &SceneGraph, entity: Entity, modelview: Mat4) {
        let Some(camera) = scene.camera(entity) else {
            return;
        };
        let mesh = camera.frustum_primitive();
        self.backend.draw_primitive(DrawCall {
            pipeline: self.frustum,
            mesh: MeshSource::Transient(std::rc::Rc::new(mesh)),
            uniforms: DrawUniforms::with_modelview(modelview),
        });
    }
}

impl<B: RenderBackend + ?Sized> Visitor for PaintVisitor<'_, B> {
    fn pre_visit(&mut self, scene: &SceneGraph, entity: Entity, stack: &TransformStack) -> VisitFlags {
        let pass = self.paint.pass;
        let Some(node) = scene.node(entity) else {
            return VisitFlags::Continue;
        };
        if !node.visible || (pass == RenderPass::Shadow && !node.cast_shadow) {
            return VisitFlags::Continue;
        }
        drop(node);

        let world = stack.top();
        let modelview = self.view * world;

        let Some(geometry) = scene.geometry(entity).map(|g| *g) else {
            if !self.paint.play_mode
                && pass == RenderPass::ColorUnblended
                && scene.light() == Some(entity)
            {
                self.draw_light_frustum(scene, entity, modelview);
            }
            return VisitFlags::Continue;
        };

        let translucent = scene
            .material(entity)
            .is_some_and(|material| material.is_translucent());
        match pass {
            RenderPass::ColorUnblended if translucent => return VisitFlags::Continue,
            RenderPass::ColorBlended if !translucent => return VisitFlags::Continue,
            _ => {}
        }

        let Some(pipeline) = self.cache.get_or_build(scene, entity, pass, &mut *self.backend) else {
            return VisitFlags::Continue;
        };

        let mut uniforms = DrawUniforms::with_modelview(modelview);
        uniforms.color = pipeline.desc().base_color.to_array();
        uniforms.dof = self.dof;

        if pass.is_color() {
            uniforms.normal_matrix = normal_matrix(&modelview).to_cols_array_2d();
            if let Some(light) = &self.light {
                uniforms.light = light.uniforms;
                uniforms.shadow_matrix = (light.shadow_base * world).to_cols_array_2d();
            }
            if let Some(material) = scene.material(entity) {
                uniforms.material = material.uniforms();
            }
        }

        self.backend.draw_primitive(DrawCall {
            pipeline: pipeline.id(),
            mesh: MeshSource::Library(geometry.primitive()),
            uniforms,
        });
        VisitFlags::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{CommandRecorder, GpuCommand};
    use crate::geometry::Geometry;
    use crate::library::MeshId;
    use crate::light::Light;
    use crate::material::Material;
    use crate::scene::Component;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 0.001
    }

    fn scene_with_camera() -> (SceneGraph, Entity) {
        let mut scene = SceneGraph::new();
        let camera = scene.spawn_child(scene.root(), "camera").unwrap();
        scene
            .add_component(camera, Component::Camera(Camera::perspective(10.0, 10.0, 100.0)))
            .unwrap();
        scene.set_translation(camera, Vec3::new(0.0, 0.0, 30.0)).unwrap();
        (scene, camera)
    }

    fn add_model(scene: &mut SceneGraph, label: &str) -> Entity {
        let e = scene.spawn_child(scene.root(), label).unwrap();
        scene
            .add_component(e, Component::Geometry(Geometry::model(MeshId(0))))
            .unwrap();
        e
    }

    fn mesh_draws(recorder: &CommandRecorder) -> Vec<DrawUniforms> {
        recorder
            .commands()
            .iter()
            .filter_map(|c| match c {
                GpuCommand::Draw(draw) if matches!(draw.mesh, MeshSource::Library(_)) => {
                    Some(draw.uniforms)
                }
                _ => None,
            })
            .collect()
    }

    fn paint(scene: &SceneGraph, camera: Entity, pass: RenderPass) -> CommandRecorder {
        let mut renderer = Renderer::new(30.0, 3.0);
        let mut context = RenderContext::new();
        let mut backend = CommandRecorder::new();
        let paint = PaintContext::new(100.0, 100.0).with_pass(pass);
        renderer.paint_camera_entity(
            &mut context,
            &paint,
            scene,
            camera,
            &Mat4::IDENTITY,
            &mut backend,
        );
        assert!(context.is_balanced());
        backend
    }

    #[test]
    fn test_color_pass_draws_with_base_color_and_focal_params() {
        let (mut scene, camera) = scene_with_camera();
        add_model(&mut scene, "model");

        let backend = paint(&scene, camera, RenderPass::ColorUnblended);
        let draws = mesh_draws(&backend);
        assert_eq!(draws.len(), 1);
        assert!(approx(draws[0].color[0], 0.8));
        assert_eq!(draws[0].dof, [-30.0, 3.0, 0.0, 0.0]);

        let rectangles = backend
            .commands()
            .iter()
            .filter(|c| matches!(c, GpuCommand::DrawRectangle(..)))
            .count();
        assert_eq!(rectangles, 1);
    }

    #[test]
    fn test_modelview_includes_camera_view() {
        let (mut scene, camera) = scene_with_camera();
        let model = add_model(&mut scene, "model");
        scene.set_translation(model, Vec3::new(1.0, 0.0, 0.0)).unwrap();

        let backend = paint(&scene, camera, RenderPass::ColorUnblended);
        let mv = Mat4::from_cols_array_2d(&mesh_draws(&backend)[0].modelview);
        let eye = mv.transform_point3(Vec3::ZERO);
        assert!(eye.abs_diff_eq(Vec3::new(1.0, 0.0, -30.0), 1e-4));
    }

    #[test]
    fn test_translucent_entities_draw_in_blended_pass_only() {
        let (mut scene, camera) = scene_with_camera();
        add_model(&mut scene, "opaque");
        let glass = add_model(&mut scene, "glass");
        scene
            .add_component(
                glass,
                Component::Material(Material::new().with_diffuse(Color::grey(1.0).with_alpha(0.5))),
            )
            .unwrap();

        assert_eq!(mesh_draws(&paint(&scene, camera, RenderPass::ColorUnblended)).len(), 1);
        assert_eq!(mesh_draws(&paint(&scene, camera, RenderPass::ColorBlended)).len(), 1);
        assert_eq!(mesh_draws(&paint(&scene, camera, RenderPass::DofDepth)).len(), 2);
    }

    #[test]
    fn test_shadow_pass_skips_non_casters() {
        let (mut scene, camera) = scene_with_camera();
        add_model(&mut scene, "caster");
        let flat = add_model(&mut scene, "flat");
        scene.set_cast_shadow(flat, false).unwrap();

        assert_eq!(mesh_draws(&paint(&scene, camera, RenderPass::Shadow)).len(), 1);
    }

    #[test]
    fn test_invisible_parent_still_paints_children() {
        let (mut scene, camera) = scene_with_camera();
        let parent = add_model(&mut scene, "parent");
        let child = scene.spawn_child(parent, "child").unwrap();
        scene
            .add_component(child, Component::Geometry(Geometry::model(MeshId(0))))
            .unwrap();
        scene.set_visible(parent, false).unwrap();

        assert_eq!(mesh_draws(&paint(&scene, camera, RenderPass::ColorUnblended)).len(), 1);
    }

    #[test]
    fn test_light_frustum_only_in_edit_mode() {
        let (mut scene, camera) = scene_with_camera();
        let light = scene.spawn_child(scene.root(), "light").unwrap();
        scene
            .add_component(light, Component::Light(Light::default()))
            .unwrap();
        scene
            .add_component(
                light,
                Component::Camera(Camera::orthographic(-10.0, -10.0, 10.0, 10.0, 1.0, 50.0)),
            )
            .unwrap();
        scene.set_light(Some(light));

        let transient = |backend: &CommandRecorder| {
            backend
                .commands()
                .iter()
                .filter(|c| matches!(c, GpuCommand::Draw(d) if matches!(d.mesh, MeshSource::Transient(_))))
                .count()
        };
        assert_eq!(transient(&paint(&scene, camera, RenderPass::ColorUnblended)), 1);

        let mut renderer = Renderer::new(30.0, 3.0);
        let mut context = RenderContext::new();
        let mut backend = CommandRecorder::new();
        let mut ctx = PaintContext::new(100.0, 100.0);
        ctx.play_mode = true;
        renderer.paint_camera_entity(&mut context, &ctx, &scene, camera, &Mat4::IDENTITY, &mut backend);
        assert_eq!(transient(&backend), 0);
    }

    #[test]
    fn test_shadow_view_is_flipped() {
        let (mut scene, camera) = scene_with_camera();
        assert!(Renderer::camera_update_view(
            &scene,
            camera,
            RenderPass::Shadow,
            &Mat4::from_scale(Vec3::splat(2.0)),
        ));
        let view = *scene.camera(camera).unwrap().view_transform();
        let p = view.transform_point3(Vec3::new(0.0, 1.0, 0.0));
        assert!(p.abs_diff_eq(Vec3::new(0.0, -1.0, -30.0), 1e-4));

        let e = scene.spawn_child(scene.root(), "no-camera").unwrap();
        assert!(!Renderer::camera_update_view(&scene, e, RenderPass::Shadow, &Mat4::IDENTITY));
        scene.despawn(e).unwrap();
    }

    #[test]
    fn test_receiving_entity_gets_shadow_matrix() {
        let (mut scene, camera) = scene_with_camera();
        let floor = add_model(&mut scene, "floor");
        scene.set_receive_shadow(floor, true).unwrap();
        let light = scene.spawn_child(scene.root(), "light").unwrap();
        scene
            .add_component(light, Component::Light(Light::default()))
            .unwrap();
        scene
            .add_component(
                light,
                Component::Camera(Camera::orthographic(-10.0, -10.0, 10.0, 10.0, 1.0, 50.0)),
            )
            .unwrap();
        scene.set_translation(light, Vec3::new(0.0, 0.0, 20.0)).unwrap();
        scene.set_light(Some(light));

        let draws = mesh_draws(&paint(&scene, camera, RenderPass::ColorUnblended));
        let shadow = Mat4::from_cols_array_2d(&draws[0].shadow_matrix);
        // the light looks straight down at the floor's origin
        let coords = shadow.project_point3(Vec3::ZERO);
        assert!(approx(coords.x, 0.5));
        assert!(approx(coords.y, 0.5));
        assert!(coords.z > 0.0 && coords.z < 1.0);
    }

    #[test]
    fn test_normal_matrix_undoes_non_uniform_scale() {
        let mv = Mat4::from_scale(Vec3::new(2.0, 1.0, 1.0));
        let n = normal_matrix(&mv);
        assert!(approx(n.x_axis.x, 0.5));
        assert!(approx(n.y_axis.y, 1.0));
    }

    #[test]
    fn test_render_context_nesting_and_dirty_check() {
        let mut backend = CommandRecorder::new();
        let mut context = RenderContext::new();
        let mut outer = Camera::orthographic(0.0, 0.0, 100.0, 100.0, -1.0, 1.0);
        outer.set_clear(false);
        let mut inner = Camera::perspective(10.0, 10.0, 100.0);
        inner.set_clear(false);

        context.flush_camera(&mut backend, &outer);
        context.suspend_camera();
        context.flush_camera(&mut backend, &inner);
        context.end_frame();
        context.resume_camera(&mut backend);
        assert_eq!(context.bound().map(|s| s.projection), Some(*outer.projection()));
        context.end_frame();
        assert!(context.is_balanced());
        assert_eq!(context.bind_count(), 3);

        // same camera again is not rebound
        context.flush_camera(&mut backend, &outer);
        context.end_frame();
        assert_eq!(context.bind_count(), 3);
    }

    #[test]
    fn test_pass_slots() {
        assert_eq!(RenderPass::Shadow.cache_slot(), CacheSlot::Mask);
        assert_eq!(RenderPass::DofDepth.cache_slot(), CacheSlot::Mask);
        assert!(RenderPass::ColorBlended.is_color());
        assert!(!RenderPass::Shadow.is_color());
    }
}
