//! Ray picking against scene geometry.
//!
//! A pick ray is cast from the view camera through a window coordinate.
//! [`pick`] walks the scene, moves the ray into each pickable entity's
//! local space, intersects it with the entity's triangles and keeps the hit
//! nearest to the camera.
//!
//! # Example
//!
//! ```
//! use scenerig::{Camera, Library, MeshData, SceneGraph, Vec2, Vec3};
//! use scenerig::geometry::Geometry;
//! use scenerig::picking::{pick, Ray};
//! use scenerig::scene::Component;
//!
//! let mut library = Library::new();
//! let cube = library.add_mesh(MeshData::cube(2.0));
//!
//! let mut scene = SceneGraph::new();
//! let box_entity = scene.spawn_child(scene.root(), "box").unwrap();
//! scene.add_component(box_entity, Component::Geometry(Geometry::model(cube))).unwrap();
//!
//! let mut camera = Camera::perspective(45.0, 0.1, 100.0);
//! camera.set_viewport(0.0, 0.0, 200.0, 200.0);
//! camera.set_view_transform(glam::Mat4::from_translation(Vec3::new(0.0, 0.0, -10.0)));
//!
//! let ray = Ray::pick_ray(&camera, Vec2::new(100.0, 100.0));
//! let hit = pick(&scene, &library, scene.root(), &camera, &ray).unwrap();
//! assert_eq!(hit.entity, box_entity);
//! assert!((hit.depth + 9.0).abs() < 0.01);
//! ```

use glam::{Mat4, Vec2, Vec3, Vec4};
use hecs::Entity;

use crate::camera::Camera;
use crate::library::Library;
use crate::mesh::MeshData;
use crate::scene::{SceneGraph, TransformStack, VisitFlags, Visitor};

const EPSILON: f32 = 1e-6;

/// A ray with an origin and a normalized direction.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl Ray {
    /// The direction is normalized.
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalize_or_zero(),
        }
    }

    /// World-space ray through window coordinate `window` of `camera`,
    /// starting on the near plane.
    pub fn pick_ray(camera: &Camera, window: Vec2) -> Self {
        let ndc = camera.window_to_ndc(window);
        let unproject = |z: f32| {
            let eye = *camera.inverse_projection() * Vec4::new(ndc.x, ndc.y, z, 1.0);
            let eye = eye.truncate() / eye.w;
            camera.inverse_view_transform().transform_point3(eye)
        };
        let near = unproject(0.0);
        let far = unproject(1.0);
        Self::new(near, far - near)
    }

    #[inline]
    pub fn point_at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }

    /// The same ray expressed through `transform`. The direction is not
    /// renormalized, so distances along the result are comparable with
    /// distances along `self` only for rigid transforms.
    pub fn transform(&self, transform: &Mat4) -> Self {
        Self {
            origin: transform.transform_point3(self.origin),
            direction: transform.transform_vector3(self.direction),
        }
    }

    /// Möller–Trumbore ray/triangle test. Returns the ray parameter of the
    /// hit; hits behind the origin are ignored.
    pub fn intersect_triangle(&self, [a, b, c]: [Vec3; 3]) -> Option<f32> {
        let edge1 = b - a;
        let edge2 = c - a;
        let p = self.direction.cross(edge2);
        let det = edge1.dot(p);
        if det.abs() < EPSILON {
            return None;
        }
        let inv_det = 1.0 / det;

        let s = self.origin - a;
        let u = s.dot(p) * inv_det;
        if !(0.0..=1.0).contains(&u) {
            return None;
        }

        let q = s.cross(edge1);
        let v = self.direction.dot(q) * inv_det;
        if v < 0.0 || u + v > 1.0 {
            return None;
        }

        let t = edge2.dot(q) * inv_det;
        (t > EPSILON).then_some(t)
    }

    /// Line mesh from the origin along the ray, for the debug overlay.
    pub fn debug_line(&self, length: f32) -> MeshData {
        MeshData::ray_line(self.origin, self.direction, length)
    }
}

/// Nearest triangle hit along a ray.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MeshHit {
    pub index: usize,
    pub t: f32,
}

impl MeshData {
    /// Intersects `ray` with every triangle, returning the nearest hit.
    /// Line meshes never hit.
    pub fn intersect_ray(&self, ray: &Ray) -> Option<MeshHit> {
        self.triangles_iter()
            .enumerate()
            .filter_map(|(index, tri)| ray.intersect_triangle(tri).map(|t| MeshHit { index, t }))
            .fold(None, |best: Option<MeshHit>, hit| match best {
                Some(b) if b.t <= hit.t => Some(b),
                _ => Some(hit),
            })
    }
}

/// The entity under a pick ray.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PickResult {
    pub entity: Entity,
    /// Index of the hit triangle in the entity's mesh.
    pub index: usize,
    /// Eye-space Z of the hit. Larger is nearer the camera.
    pub depth: f32,
}

struct PickVisitor<'a> {
    library: &'a Library,
    view: Mat4,
    ray: Ray,
    best: Option<PickResult>,
    best_depth: f32,
}

impl Visitor for PickVisitor<'_> {
    fn pre_visit(&mut self, scene: &SceneGraph, entity: Entity, stack: &TransformStack) -> VisitFlags {
        if scene.node(entity).is_none_or(|node| !node.visible) {
            return VisitFlags::Continue;
        }
        let Some(geometry) = scene.geometry(entity).map(|g| *g) else {
            return VisitFlags::Continue;
        };
        let Some(mesh) = geometry.mesh(self.library) else {
            return VisitFlags::Continue;
        };

        let world = stack.top();
        if world.determinant().abs() < EPSILON {
            return VisitFlags::Continue;
        }
        let local_ray = self.ray.transform(&world.inverse());

        if let Some(hit) = mesh.intersect_ray(&local_ray) {
            let point = local_ray.point_at(hit.t);
            let eye = (self.view * world).transform_point3(point);
            if eye.z > self.best_depth {
                self.best_depth = eye.z;
                self.best = Some(PickResult {
                    entity,
                    index: hit.index,
                    depth: eye.z,
                });
            }
        }
        VisitFlags::Continue
    }
}

/// Finds the visible, pickable entity below `root` whose hit is nearest to
/// `camera`. Ties go to the entity visited first.
pub fn pick(
    scene: &SceneGraph,
    library: &Library,
    root: Entity,
    camera: &Camera,
    ray: &Ray,
) -> Option<PickResult> {
    let mut visitor = PickVisitor {
        library,
        view: *camera.view_transform(),
        ray: *ray,
        best: None,
        best_depth: f32::NEG_INFINITY,
    };
    let base = scene
        .parent(root)
        .and_then(|parent| scene.world_transform(parent))
        .unwrap_or(Mat4::IDENTITY);
    let mut stack = TransformStack::with_base(base);
    scene.traverse(root, &mut stack, &mut visitor);
    debug_assert!(stack.is_balanced());

    if let Some(hit) = &visitor.best {
        log::debug!(
            "picked {:?}, triangle #{}, depth {:.2}",
            hit.entity,
            hit.index,
            hit.depth
        );
    }
    visitor.best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Geometry;
    use crate::scene::Component;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 0.001
    }

    fn camera() -> Camera {
        let mut camera = Camera::perspective(45.0, 0.1, 100.0);
        camera.set_viewport(0.0, 0.0, 200.0, 200.0);
        camera
    }

    fn add_quad(scene: &mut SceneGraph, library: &mut Library, label: &str, z: f32) -> Entity {
        let mesh = library.add_mesh(MeshData::quad(2.0, 2.0));
        let e = scene.spawn_child(scene.root(), label).unwrap();
        scene
            .add_component(e, Component::Geometry(Geometry::model(mesh)))
            .unwrap();
        scene.set_translation(e, Vec3::new(-1.0, -1.0, z)).unwrap();
        e
    }

    #[test]
    fn test_triangle_hit_and_miss() {
        let tri = [Vec3::ZERO, Vec3::X, Vec3::Y];
        let down = Ray::new(Vec3::new(0.25, 0.25, 1.0), -Vec3::Z);
        assert!(approx(down.intersect_triangle(tri).unwrap(), 1.0));

        let beside = Ray::new(Vec3::new(2.0, 2.0, 1.0), -Vec3::Z);
        assert!(beside.intersect_triangle(tri).is_none());

        let behind = Ray::new(Vec3::new(0.25, 0.25, -1.0), -Vec3::Z);
        assert!(behind.intersect_triangle(tri).is_none());
    }

    #[test]
    fn test_mesh_reports_nearest_triangle() {
        let cube = MeshData::cube(2.0);
        let ray = Ray::new(Vec3::new(0.0, 0.0, 10.0), -Vec3::Z);
        let hit = cube.intersect_ray(&ray).unwrap();
        assert!(approx(hit.t, 9.0));

        let lines = MeshData::grid(10.0, 1.0);
        assert!(lines.intersect_ray(&ray).is_none());
    }

    #[test]
    fn test_pick_ray_through_center() {
        let camera = camera();
        let ray = Ray::pick_ray(&camera, Vec2::new(100.0, 99.0));
        assert!(ray.direction.abs_diff_eq(-Vec3::Z, 1e-3));
        assert!(approx(ray.origin.z, -0.1));
    }

    #[test]
    fn test_nearest_hit_wins() {
        let mut scene = SceneGraph::new();
        let mut library = Library::new();
        let far = add_quad(&mut scene, &mut library, "far", -20.0);
        let near = add_quad(&mut scene, &mut library, "near", -5.0);

        let camera = camera();
        let ray = Ray::new(Vec3::ZERO, -Vec3::Z);
        let hit = pick(&scene, &library, scene.root(), &camera, &ray).unwrap();
        assert_eq!(hit.entity, near);
        assert!(approx(hit.depth, -5.0));

        scene.set_visible(near, false).unwrap();
        let hit = pick(&scene, &library, scene.root(), &camera, &ray).unwrap();
        assert_eq!(hit.entity, far);
    }

    #[test]
    fn test_any_finite_depth_beats_no_hit() {
        let mut scene = SceneGraph::new();
        let mut library = Library::new();
        let distant = add_quad(&mut scene, &mut library, "distant", -1.0e6);

        let ray = Ray::new(Vec3::ZERO, -Vec3::Z);
        let hit = pick(&scene, &library, scene.root(), &camera(), &ray).unwrap();
        assert_eq!(hit.entity, distant);
        assert!((hit.depth + 1.0e6).abs() < 1.0);
    }

    #[test]
    fn test_exact_tie_goes_to_first_visited() {
        let mut scene = SceneGraph::new();
        let mut library = Library::new();
        let first = add_quad(&mut scene, &mut library, "first", -5.0);
        add_quad(&mut scene, &mut library, "second", -5.0);

        let ray = Ray::new(Vec3::ZERO, -Vec3::Z);
        let hit = pick(&scene, &library, scene.root(), &camera(), &ray).unwrap();
        assert_eq!(hit.entity, first);
    }

    #[test]
    fn test_non_pickable_parent_children_still_hit() {
        let mut scene = SceneGraph::new();
        let mut library = Library::new();
        let parent = add_quad(&mut scene, &mut library, "parent", -5.0);
        scene
            .add_component(
                parent,
                Component::Geometry(Geometry::model(library.add_mesh(MeshData::quad(2.0, 2.0))).with_pickable(false)),
            )
            .unwrap();
        let mesh = library.add_mesh(MeshData::quad(2.0, 2.0));
        let child = scene.spawn_child(parent, "child").unwrap();
        scene
            .add_component(child, Component::Geometry(Geometry::model(mesh)))
            .unwrap();
        scene.set_translation(child, Vec3::new(0.0, 0.0, -5.0)).unwrap();

        let ray = Ray::new(Vec3::ZERO, -Vec3::Z);
        let hit = pick(&scene, &library, scene.root(), &camera(), &ray).unwrap();
        assert_eq!(hit.entity, child);
        assert!(approx(hit.depth, -10.0));
    }

    #[test]
    fn test_scaled_entity_depth_is_in_eye_space() {
        let mut scene = SceneGraph::new();
        let mut library = Library::new();
        let e = add_quad(&mut scene, &mut library, "scaled", -8.0);
        scene.set_scale(e, Vec3::splat(3.0)).unwrap();

        let mut camera = camera();
        camera.set_view_transform(Mat4::from_translation(Vec3::new(0.0, 0.0, -2.0)));
        let ray = Ray::new(Vec3::ZERO, -Vec3::Z);
        let hit = pick(&scene, &library, scene.root(), &camera, &ray).unwrap();
        assert!(approx(hit.depth, -10.0));
    }
}
