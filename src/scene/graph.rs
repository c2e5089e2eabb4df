use glam::{Mat4, Quat, Vec3};
use hecs::{Entity, World};

use crate::camera::Camera;
use crate::error::{Result, RigError};
use crate::geometry::Geometry;
use crate::light::Light;
use crate::material::Material;
use crate::mesh::Transform;

/// Hierarchy record carried by every entity.
#[derive(Clone, Debug)]
pub struct Node {
    pub label: String,
    pub transform: Transform,
    pub visible: bool,
    pub cast_shadow: bool,
    pub receive_shadow: bool,
    parent: Option<Entity>,
    children: Vec<Entity>,
}

impl Node {
    fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            transform: Transform::default(),
            visible: true,
            cast_shadow: true,
            receive_shadow: false,
            parent: None,
            children: Vec::new(),
        }
    }

    pub fn parent(&self) -> Option<Entity> {
        self.parent
    }

    /// Children in insertion order, which is also traversal order.
    pub fn children(&self) -> &[Entity] {
        &self.children
    }
}

/// Generation counter for an entity's cached pipelines.
///
/// Bumped whenever a change makes the entity's pipelines stale; pipeline
/// caches compare it against the generation they built for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PipelineStamp(pub u32);

/// A component that can be attached to an entity.
#[derive(Clone, Debug)]
pub enum Component {
    Geometry(Geometry),
    Material(Material),
    Camera(Camera),
    Light(Light),
}

impl Component {
    pub fn kind(&self) -> ComponentKind {
        match self {
            Component::Geometry(_) => ComponentKind::Geometry,
            Component::Material(_) => ComponentKind::Material,
            Component::Camera(_) => ComponentKind::Camera,
            Component::Light(_) => ComponentKind::Light,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    Geometry,
    Material,
    Camera,
    Light,
}

/// Entity arena plus hierarchy.
///
/// A graph always has a root entity. Entities created with
/// [`SceneGraph::spawn`] are detached until they are added somewhere below
/// the root; detached subtrees are never rendered or picked.
pub struct SceneGraph {
    world: World,
    root: Entity,
    light: Option<Entity>,
}

impl Default for SceneGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneGraph {
    pub fn new() -> Self {
        let mut world = World::new();
        let root = world.spawn((Node::new("root"), PipelineStamp::default()));
        Self {
            world,
            root,
            light: None,
        }
    }

    pub fn root(&self) -> Entity {
        self.root
    }

    pub fn contains(&self, entity: Entity) -> bool {
        self.world.contains(entity)
    }

    /// Number of live entities, including the root.
    pub fn len(&self) -> usize {
        self.world.len() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.world.is_empty()
    }

    /// Creates a detached entity.
    pub fn spawn(&mut self, label: impl Into<String>) -> Entity {
        self.world
            .spawn((Node::new(label), PipelineStamp::default()))
    }

    /// Creates an entity as the last child of `parent`.
    pub fn spawn_child(&mut self, parent: Entity, label: impl Into<String>) -> Result<Entity> {
        if !self.contains(parent) {
            return Err(RigError::NoSuchEntity(parent));
        }
        let child = self.spawn(label);
        self.add_child(parent, child)?;
        Ok(child)
    }

    pub fn node(&self, entity: Entity) -> Option<hecs::Ref<'_, Node>> {
        self.world.get::<&Node>(entity).ok()
    }

    fn node_mut(&self, entity: Entity) -> Result<hecs::RefMut<'_, Node>> {
        self.world
            .get::<&mut Node>(entity)
            .map_err(|_| RigError::NoSuchEntity(entity))
    }

    pub fn parent(&self, entity: Entity) -> Option<Entity> {
        self.node(entity)?.parent
    }

    pub fn children(&self, entity: Entity) -> Vec<Entity> {
        self.node(entity)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    pub fn label(&self, entity: Entity) -> Option<String> {
        self.node(entity).map(|n| n.label.clone())
    }

    /// Whether `ancestor` is `entity` itself or one of its ancestors.
    pub fn is_ancestor(&self, ancestor: Entity, entity: Entity) -> bool {
        let mut cursor = Some(entity);
        while let Some(e) = cursor {
            if e == ancestor {
                return true;
            }
            cursor = self.parent(e);
        }
        false
    }

    /// Makes `child` the last child of `parent`, detaching it from any
    /// previous parent.
    ///
    /// Fails with [`RigError::InvalidReparent`] if `parent` is `child` or one
    /// of its descendants.
    pub fn add_child(&mut self, parent: Entity, child: Entity) -> Result<()> {
        if !self.contains(parent) {
            return Err(RigError::NoSuchEntity(parent));
        }
        if !self.contains(child) {
            return Err(RigError::NoSuchEntity(child));
        }
        if self.is_ancestor(child, parent) {
            return Err(RigError::InvalidReparent { child, parent });
        }

        if let Some(old) = self.parent(child) {
            self.remove_child(old, child)?;
        }
        self.node_mut(parent)?.children.push(child);
        self.node_mut(child)?.parent = Some(parent);
        Ok(())
    }

    /// Detaches `child` from `parent`. The child keeps its own subtree.
    pub fn remove_child(&mut self, parent: Entity, child: Entity) -> Result<()> {
        if self.parent(child) != Some(parent) {
            return Err(RigError::NoParent(child));
        }
        self.node_mut(parent)?.children.retain(|&c| c != child);
        self.node_mut(child)?.parent = None;
        Ok(())
    }

    /// Removes an entity and its whole subtree.
    pub fn despawn(&mut self, entity: Entity) -> Result<()> {
        if entity == self.root {
            return Err(RigError::NoParent(entity));
        }
        if let Some(parent) = self.parent(entity) {
            self.remove_child(parent, entity)?;
        }

        let mut pending = vec![entity];
        while let Some(e) = pending.pop() {
            pending.extend(self.children(e));
            if self.light == Some(e) {
                self.light = None;
            }
            self.world
                .despawn(e)
                .map_err(|_| RigError::NoSuchEntity(e))?;
        }
        Ok(())
    }

    pub fn transform(&self, entity: Entity) -> Option<Transform> {
        self.node(entity).map(|n| n.transform)
    }

    pub fn set_transform(&mut self, entity: Entity, transform: Transform) -> Result<()> {
        self.node_mut(entity)?.transform = transform;
        Ok(())
    }

    pub fn set_translation(&mut self, entity: Entity, translation: Vec3) -> Result<()> {
        self.node_mut(entity)?.transform.position = translation;
        Ok(())
    }

    pub fn set_rotation(&mut self, entity: Entity, rotation: Quat) -> Result<()> {
        self.node_mut(entity)?.transform.rotation = rotation;
        Ok(())
    }

    pub fn set_scale(&mut self, entity: Entity, scale: Vec3) -> Result<()> {
        self.node_mut(entity)?.transform.scale = scale;
        Ok(())
    }

    pub fn set_visible(&mut self, entity: Entity, visible: bool) -> Result<()> {
        self.node_mut(entity)?.visible = visible;
        Ok(())
    }

    pub fn set_cast_shadow(&mut self, entity: Entity, cast_shadow: bool) -> Result<()> {
        self.node_mut(entity)?.cast_shadow = cast_shadow;
        Ok(())
    }

    /// Receiving shadows adds a shadow-map layer to the color pipeline, so a
    /// change invalidates the entity's pipelines.
    pub fn set_receive_shadow(&mut self, entity: Entity, receive_shadow: bool) -> Result<()> {
        let changed = {
            let mut node = self.node_mut(entity)?;
            let changed = node.receive_shadow != receive_shadow;
            node.receive_shadow = receive_shadow;
            changed
        };
        if changed {
            self.invalidate_pipelines(entity)?;
        }
        Ok(())
    }

    /// Local matrix of `entity`.
    pub fn local_transform(&self, entity: Entity) -> Option<Mat4> {
        self.transform(entity).map(|t| t.matrix())
    }

    /// Product of all ancestor transforms and the entity's own, root first.
    pub fn world_transform(&self, entity: Entity) -> Option<Mat4> {
        let mut matrix = self.local_transform(entity)?;
        let mut cursor = self.parent(entity);
        while let Some(parent) = cursor {
            matrix = self.local_transform(parent)? * matrix;
            cursor = self.parent(parent);
        }
        Some(matrix)
    }

    /// Attaches a component, replacing any existing one of the same kind.
    ///
    /// Geometry and material changes invalidate the entity's pipelines.
    pub fn add_component(&mut self, entity: Entity, component: Component) -> Result<()> {
        let kind = component.kind();
        let inserted = match component {
            Component::Geometry(c) => self.world.insert_one(entity, c),
            Component::Material(c) => self.world.insert_one(entity, c),
            Component::Camera(c) => self.world.insert_one(entity, c),
            Component::Light(c) => self.world.insert_one(entity, c),
        };
        inserted.map_err(|_| RigError::NoSuchEntity(entity))?;

        if matches!(kind, ComponentKind::Geometry | ComponentKind::Material) {
            self.invalidate_pipelines(entity)?;
        }
        Ok(())
    }

    /// Detaches a component of the given kind and returns it.
    pub fn remove_component(&mut self, entity: Entity, kind: ComponentKind) -> Result<Component> {
        let missing = |_| RigError::MissingComponent { entity, kind };
        let removed = match kind {
            ComponentKind::Geometry => self
                .world
                .remove_one::<Geometry>(entity)
                .map(Component::Geometry)
                .map_err(missing)?,
            ComponentKind::Material => self
                .world
                .remove_one::<Material>(entity)
                .map(Component::Material)
                .map_err(missing)?,
            ComponentKind::Camera => self
                .world
                .remove_one::<Camera>(entity)
                .map(Component::Camera)
                .map_err(missing)?,
            ComponentKind::Light => self
                .world
                .remove_one::<Light>(entity)
                .map(Component::Light)
                .map_err(missing)?,
        };

        if matches!(kind, ComponentKind::Geometry | ComponentKind::Material) {
            self.invalidate_pipelines(entity)?;
        }
        Ok(removed)
    }

    /// Kinds of the components currently attached to `entity`.
    pub fn component_kinds(&self, entity: Entity) -> Vec<ComponentKind> {
        let Ok(entry) = self.world.entity(entity) else {
            return Vec::new();
        };
        let mut kinds = Vec::new();
        if entry.has::<Geometry>() {
            kinds.push(ComponentKind::Geometry);
        }
        if entry.has::<Material>() {
            kinds.push(ComponentKind::Material);
        }
        if entry.has::<Camera>() {
            kinds.push(ComponentKind::Camera);
        }
        if entry.has::<Light>() {
            kinds.push(ComponentKind::Light);
        }
        kinds
    }

    pub fn geometry(&self, entity: Entity) -> Option<hecs::Ref<'_, Geometry>> {
        self.world.get::<&Geometry>(entity).ok()
    }

    pub fn material(&self, entity: Entity) -> Option<hecs::Ref<'_, Material>> {
        self.world.get::<&Material>(entity).ok()
    }

    pub fn camera(&self, entity: Entity) -> Option<hecs::Ref<'_, Camera>> {
        self.world.get::<&Camera>(entity).ok()
    }

    pub fn camera_mut(&self, entity: Entity) -> Option<hecs::RefMut<'_, Camera>> {
        self.world.get::<&mut Camera>(entity).ok()
    }

    pub fn light_component(&self, entity: Entity) -> Option<hecs::Ref<'_, Light>> {
        self.world.get::<&Light>(entity).ok()
    }

    /// Edits an entity's material in place.
    ///
    /// If the edit changes the material's texture layers the entity's
    /// pipelines are invalidated.
    pub fn update_material<R>(
        &mut self,
        entity: Entity,
        edit: impl FnOnce(&mut Material) -> R,
    ) -> Result<R> {
        let (result, relayered) = {
            let mut material =
                self.world
                    .get::<&mut Material>(entity)
                    .map_err(|_| RigError::MissingComponent {
                        entity,
                        kind: ComponentKind::Material,
                    })?;
            // translucency picks the blend mode baked into the color pipeline
            let before = (material.layer_key(), material.is_translucent());
            let result = edit(&mut material);
            (result, before != (material.layer_key(), material.is_translucent()))
        };
        if relayered {
            self.invalidate_pipelines(entity)?;
        }
        Ok(result)
    }

    /// Registers the entity whose [`Light`] and camera drive lighting and
    /// the shadow pass.
    ///
    /// Shadow receivers sample the light's depth attachment, so their
    /// pipelines go stale when the light changes.
    pub fn set_light(&mut self, entity: Option<Entity>) {
        if self.light == entity {
            return;
        }
        self.light = entity;
        for (_, (node, stamp)) in self.world.query_mut::<(&Node, &mut PipelineStamp)>() {
            if node.receive_shadow {
                stamp.0 = stamp.0.wrapping_add(1);
            }
        }
    }

    pub fn light(&self) -> Option<Entity> {
        self.light
    }

    pub fn pipeline_stamp(&self, entity: Entity) -> PipelineStamp {
        self.world
            .get::<&PipelineStamp>(entity)
            .map(|s| *s)
            .unwrap_or_default()
    }

    /// Marks every cached pipeline of `entity` stale.
    pub fn invalidate_pipelines(&mut self, entity: Entity) -> Result<()> {
        let mut stamp = self
            .world
            .get::<&mut PipelineStamp>(entity)
            .map_err(|_| RigError::NoSuchEntity(entity))?;
        stamp.0 = stamp.0.wrapping_add(1);
        log::debug!("invalidated pipelines of {entity:?}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::{MeshId, TextureId};
    use crate::color::Color;

    #[test]
    fn test_world_transform_composes_ancestors() {
        let mut scene = SceneGraph::new();
        let a = scene.spawn_child(scene.root(), "a").unwrap();
        let b = scene.spawn_child(a, "b").unwrap();
        scene
            .set_rotation(a, Quat::from_rotation_z(std::f32::consts::FRAC_PI_2))
            .unwrap();
        scene.set_translation(b, Vec3::new(1.0, 0.0, 0.0)).unwrap();

        let p = scene.world_transform(b).unwrap().transform_point3(Vec3::ZERO);
        assert!(p.abs_diff_eq(Vec3::new(0.0, 1.0, 0.0), 1e-5));
    }

    #[test]
    fn test_reparent_moves_child() {
        let mut scene = SceneGraph::new();
        let a = scene.spawn_child(scene.root(), "a").unwrap();
        let b = scene.spawn_child(scene.root(), "b").unwrap();
        let c = scene.spawn_child(a, "c").unwrap();

        scene.add_child(b, c).unwrap();
        assert!(scene.children(a).is_empty());
        assert_eq!(scene.children(b), vec![c]);
        assert_eq!(scene.parent(c), Some(b));
    }

    #[test]
    fn test_reparent_under_descendant_is_rejected() {
        let mut scene = SceneGraph::new();
        let a = scene.spawn_child(scene.root(), "a").unwrap();
        let b = scene.spawn_child(a, "b").unwrap();

        assert!(matches!(
            scene.add_child(b, a),
            Err(RigError::InvalidReparent { .. })
        ));
        assert!(matches!(
            scene.add_child(a, a),
            Err(RigError::InvalidReparent { .. })
        ));
        assert_eq!(scene.parent(a), Some(scene.root()));
    }

    #[test]
    fn test_despawn_is_recursive() {
        let mut scene = SceneGraph::new();
        let a = scene.spawn_child(scene.root(), "a").unwrap();
        let b = scene.spawn_child(a, "b").unwrap();
        scene.set_light(Some(b));

        scene.despawn(a).unwrap();
        assert!(!scene.contains(a));
        assert!(!scene.contains(b));
        assert_eq!(scene.light(), None);
        assert!(scene.children(scene.root()).is_empty());
        assert!(scene.despawn(scene.root()).is_err());
    }

    #[test]
    fn test_components_round_trip() {
        let mut scene = SceneGraph::new();
        let e = scene.spawn_child(scene.root(), "e").unwrap();
        scene
            .add_component(e, Component::Geometry(Geometry::model(MeshId(0))))
            .unwrap();
        scene
            .add_component(e, Component::Light(Light::default()))
            .unwrap();

        assert_eq!(
            scene.component_kinds(e),
            vec![ComponentKind::Geometry, ComponentKind::Light]
        );
        assert!(scene.geometry(e).is_some());

        let removed = scene.remove_component(e, ComponentKind::Light).unwrap();
        assert_eq!(removed.kind(), ComponentKind::Light);
        assert!(matches!(
            scene.remove_component(e, ComponentKind::Light),
            Err(RigError::MissingComponent { .. })
        ));
    }

    #[test]
    fn test_pipeline_invalidation_triggers() {
        let mut scene = SceneGraph::new();
        let e = scene.spawn_child(scene.root(), "e").unwrap();
        let s0 = scene.pipeline_stamp(e);

        scene
            .add_component(e, Component::Material(Material::new()))
            .unwrap();
        let s1 = scene.pipeline_stamp(e);
        assert_ne!(s0, s1);

        // uniform-only edits keep pipelines
        scene
            .update_material(e, |m| m.set_shininess(10.0))
            .unwrap();
        assert_eq!(scene.pipeline_stamp(e), s1);

        scene
            .update_material(e, |m| m.set_texture(Some(TextureId(1))))
            .unwrap();
        let s2 = scene.pipeline_stamp(e);
        assert_ne!(s1, s2);

        scene.set_receive_shadow(e, true).unwrap();
        assert_ne!(scene.pipeline_stamp(e), s2);
    }

    #[test]
    fn test_translucency_flip_invalidates() {
        let mut scene = SceneGraph::new();
        let e = scene.spawn_child(scene.root(), "e").unwrap();
        scene
            .add_component(e, Component::Material(Material::new()))
            .unwrap();
        let opaque = scene.pipeline_stamp(e);

        scene
            .update_material(e, |m| m.set_diffuse(Color::grey(1.0).with_alpha(0.5)))
            .unwrap();
        let translucent = scene.pipeline_stamp(e);
        assert_ne!(opaque, translucent);

        // still translucent, no rebuild needed
        scene
            .update_material(e, |m| m.set_diffuse(Color::grey(0.2).with_alpha(0.4)))
            .unwrap();
        assert_eq!(scene.pipeline_stamp(e), translucent);

        scene
            .update_material(e, |m| m.set_diffuse(Color::WHITE))
            .unwrap();
        assert_ne!(scene.pipeline_stamp(e), translucent);
    }

    #[test]
    fn test_set_light_invalidates_shadow_receivers() {
        let mut scene = SceneGraph::new();
        let receiver = scene.spawn_child(scene.root(), "receiver").unwrap();
        let other = scene.spawn_child(scene.root(), "other").unwrap();
        let light = scene.spawn_child(scene.root(), "light").unwrap();
        scene.set_receive_shadow(receiver, true).unwrap();
        let (r0, o0) = (scene.pipeline_stamp(receiver), scene.pipeline_stamp(other));

        scene.set_light(Some(light));
        assert_ne!(scene.pipeline_stamp(receiver), r0);
        assert_eq!(scene.pipeline_stamp(other), o0);

        let r1 = scene.pipeline_stamp(receiver);
        scene.set_light(Some(light));
        assert_eq!(scene.pipeline_stamp(receiver), r1);
    }
}
