//! Editor overlays drawn over the painted scene: the debug pick ray, the
//! reference grid and the selection gizmo.

use std::rc::Rc;

use glam::{Mat4, Vec3};
use hecs::Entity;

use crate::backend::{BlendMode, DrawCall, DrawUniforms, MeshSource, PipelineDesc, PipelineId, RenderBackend};
use crate::color::Color;
use crate::mesh::MeshData;
use crate::scene::SceneGraph;

/// Sub-pixel sample positions for 16x jittered antialiasing.
pub const JITTER_OFFSETS: [[f32; 2]; 16] = [
    [0.375, 0.4375],
    [0.625, 0.0625],
    [0.875, 0.1875],
    [0.125, 0.0625],
    [0.375, 0.6875],
    [0.875, 0.4375],
    [0.625, 0.5625],
    [0.375, 0.9375],
    [0.625, 0.3125],
    [0.125, 0.5625],
    [0.125, 0.8125],
    [0.375, 0.1875],
    [0.875, 0.9375],
    [0.875, 0.6875],
    [0.125, 0.3125],
    [0.625, 0.8125],
];

/// Draws `mesh` once per jitter offset with a sixteenth of `color`.
///
/// Offsets are in view pixels; `pixel_size` is the size of one view pixel
/// in the mesh's model units. `pipeline` must blend premultiplied colors additively so that the
/// samples sum to the full color where all of them overlap.
pub fn draw_jittered<B: RenderBackend + ?Sized>(
    backend: &mut B,
    pipeline: PipelineId,
    mesh: &MeshSource,
    modelview: Mat4,
    pixel_size: f32,
    color: Color,
) {
    let n = JITTER_OFFSETS.len() as f32;
    let sample = [color.r / n, color.g / n, color.b / n, 1.0 / n];

    for [x, y] in JITTER_OFFSETS {
        let offset = Mat4::from_translation(Vec3::new(x, y, 0.0) * pixel_size);
        let mut uniforms = DrawUniforms::with_modelview(modelview * offset);
        uniforms.color = sample;
        backend.draw_primitive(DrawCall {
            pipeline,
            mesh: mesh.clone(),
            uniforms,
        });
    }
}

/// Axis-line translate gizmo that follows the selected entity.
#[derive(Clone, Debug)]
pub struct ToolGizmo {
    length: f32,
    axes: [Rc<MeshData>; 3],
    position: Option<Vec3>,
}

impl ToolGizmo {
    pub fn new(length: f32) -> Self {
        let axis = |dir: Vec3| Rc::new(MeshData::lines(&[(Vec3::ZERO, dir)]));
        Self {
            length,
            axes: [axis(Vec3::X), axis(Vec3::Y), axis(Vec3::Z)],
            position: None,
        }
    }

    /// Moves the gizmo to the world origin of `entity`.
    pub fn update(&mut self, scene: &SceneGraph, entity: Entity) {
        self.position = scene
            .world_transform(entity)
            .map(|world| world.transform_point3(Vec3::ZERO));
    }

    /// Hides the gizmo until the next update.
    pub fn clear(&mut self) {
        self.position = None;
    }

    pub fn position(&self) -> Option<Vec3> {
        self.position
    }

    pub fn draw<B: RenderBackend + ?Sized>(&self, backend: &mut B, pipeline: PipelineId, view: &Mat4) {
        let Some(position) = self.position else {
            return;
        };
        let modelview = *view
            * Mat4::from_translation(position)
            * Mat4::from_scale(Vec3::splat(self.length));
        let colors = [
            Color::rgb(1.0, 0.2, 0.2),
            Color::rgb(0.2, 1.0, 0.2),
            Color::rgb(0.3, 0.3, 1.0),
        ];

        for (axis, color) in self.axes.iter().zip(colors) {
            let mut uniforms = DrawUniforms::with_modelview(modelview);
            uniforms.color = color.to_array();
            backend.draw_primitive(DrawCall {
                pipeline,
                mesh: MeshSource::Transient(axis.clone()),
                uniforms,
            });
        }
    }
}

/// Pipelines and meshes for the editor overlays.
pub struct Overlays {
    jitter: PipelineId,
    lines: PipelineId,
    grid: MeshSource,
    pub gizmo: ToolGizmo,
}

impl Overlays {
    pub fn new<B: RenderBackend + ?Sized>(backend: &mut B, grid_size: f32, grid_spacing: f32) -> Self {
        let jitter = backend.create_pipeline(
            &PipelineDesc::new("overlay-jittered").with_blend(BlendMode::Premultiplied),
        );
        let lines = backend.create_pipeline(&PipelineDesc::new("overlay-lines"));
        Self {
            jitter,
            lines,
            grid: MeshSource::Transient(Rc::new(MeshData::grid(grid_size, grid_spacing))),
            gizmo: ToolGizmo::new(grid_spacing * 2.0),
        }
    }

    /// Antialiased reference grid in the plane of the device screen.
    /// `device_scale` is view pixels per device unit.
    pub fn draw_grid<B: RenderBackend + ?Sized>(
        &self,
        backend: &mut B,
        view: &Mat4,
        device_scale: f32,
    ) {
        let pixel_size = if device_scale > 0.0 { 1.0 / device_scale } else { 1.0 };
        draw_jittered(backend, self.jitter, &self.grid, *view, pixel_size, Color::grey(0.5));
    }

    /// World-space pick ray line.
    pub fn draw_pick_ray<B: RenderBackend + ?Sized>(
        &self,
        backend: &mut B,
        ray: &Rc<MeshData>,
        view: &Mat4,
    ) {
        let mut uniforms = DrawUniforms::with_modelview(*view);
        uniforms.color = Color::rgb(1.0, 0.0, 0.0).to_array();
        backend.draw_primitive(DrawCall {
            pipeline: self.lines,
            mesh: MeshSource::Transient(ray.clone()),
            uniforms,
        });
    }

    pub fn draw_gizmo<B: RenderBackend + ?Sized>(&self, backend: &mut B, view: &Mat4) {
        self.gizmo.draw(backend, self.lines, view);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{CommandRecorder, GpuCommand};

    fn draws(backend: &CommandRecorder) -> Vec<DrawCall> {
        backend
            .commands()
            .iter()
            .filter_map(|c| match c {
                GpuCommand::Draw(draw) => Some(draw.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_jitter_samples_sum_to_full_alpha() {
        let alpha: f32 = JITTER_OFFSETS.iter().map(|_| 1.0 / 16.0).sum();
        assert!((alpha - 1.0).abs() < 0.001);

        let mut backend = CommandRecorder::new();
        let pipeline = backend.create_pipeline(&PipelineDesc::new("p"));
        let mesh = MeshSource::Transient(Rc::new(MeshData::grid(10.0, 1.0)));
        draw_jittered(&mut backend, pipeline, &mesh, Mat4::IDENTITY, 1.0, Color::grey(0.5));

        let draws = draws(&backend);
        assert_eq!(draws.len(), 16);
        let total_alpha: f32 = draws.iter().map(|d| d.uniforms.color[3]).sum();
        let total_red: f32 = draws.iter().map(|d| d.uniforms.color[0]).sum();
        assert!((total_alpha - 1.0).abs() < 0.001);
        assert!((total_red - 0.5).abs() < 0.001);
    }

    #[test]
    fn test_jitter_offsets_are_applied() {
        let mut backend = CommandRecorder::new();
        let pipeline = backend.create_pipeline(&PipelineDesc::new("p"));
        let mesh = MeshSource::Transient(Rc::new(MeshData::grid(10.0, 1.0)));
        draw_jittered(&mut backend, pipeline, &mesh, Mat4::IDENTITY, 1.0, Color::WHITE);

        let first = Mat4::from_cols_array_2d(&draws(&backend)[0].uniforms.modelview);
        let p = first.transform_point3(Vec3::ZERO);
        assert!(p.abs_diff_eq(Vec3::new(0.375, 0.4375, 0.0), 1e-6));
    }

    #[test]
    fn test_grid_jitter_is_sized_in_view_pixels() {
        let mut backend = CommandRecorder::new();
        let overlays = Overlays::new(&mut backend, 100.0, 10.0);
        // half a view pixel per device unit: a pixel spans two device units
        overlays.draw_grid(&mut backend, &Mat4::IDENTITY, 0.5);

        let first = Mat4::from_cols_array_2d(&draws(&backend)[0].uniforms.modelview);
        let p = first.transform_point3(Vec3::ZERO);
        assert!((p.x - 0.75).abs() < 0.001);
        assert!((p.y - 0.875).abs() < 0.001);
    }

    #[test]
    fn test_gizmo_follows_entity() {
        let mut scene = SceneGraph::new();
        let e = scene.spawn_child(scene.root(), "e").unwrap();
        scene.set_translation(e, Vec3::new(4.0, 5.0, 6.0)).unwrap();

        let mut backend = CommandRecorder::new();
        let overlays = Overlays::new(&mut backend, 100.0, 10.0);
        let mut gizmo = overlays.gizmo.clone();
        gizmo.draw(&mut backend, overlays.lines, &Mat4::IDENTITY);
        assert!(draws(&backend).is_empty());

        gizmo.update(&scene, e);
        assert_eq!(gizmo.position(), Some(Vec3::new(4.0, 5.0, 6.0)));
        gizmo.draw(&mut backend, overlays.lines, &Mat4::IDENTITY);
        assert_eq!(draws(&backend).len(), 3);
    }
}
