use glam::Mat4;
use hecs::Entity;

use super::SceneGraph;

/// What a visitor wants the traversal to do after visiting a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VisitFlags {
    Continue,
    /// Don't descend into this node's children.
    SkipChildren,
    /// Stop the whole traversal.
    Break,
}

/// Callbacks for [`SceneGraph::traverse`].
///
/// When `pre_visit` runs, the top of the stack is the world matrix of
/// `entity`. `post_visit` runs for every pre-visited node, with the same
/// stack top, before the node's matrix is popped.
pub trait Visitor {
    fn pre_visit(&mut self, scene: &SceneGraph, entity: Entity, stack: &TransformStack)
    -> VisitFlags;

    fn post_visit(&mut self, _scene: &SceneGraph, _entity: Entity, _stack: &TransformStack) {}
}

/// Matrix stack kept in step with a depth-first walk.
///
/// Each push composes the new local matrix with the current top. Push and
/// pop counts are recorded so callers can assert the walk stayed balanced.
#[derive(Clone, Debug)]
pub struct TransformStack {
    stack: Vec<Mat4>,
    pushes: usize,
    pops: usize,
}

impl Default for TransformStack {
    fn default() -> Self {
        Self::new()
    }
}

impl TransformStack {
    pub fn new() -> Self {
        Self::with_base(Mat4::IDENTITY)
    }

    /// A stack whose bottom entry is `base` instead of identity.
    pub fn with_base(base: Mat4) -> Self {
        Self {
            stack: vec![base],
            pushes: 0,
            pops: 0,
        }
    }

    pub fn push(&mut self, local: Mat4) {
        let top = self.top();
        self.stack.push(top * local);
        self.pushes += 1;
    }

    /// Pops one entry. The base entry is never popped.
    pub fn pop(&mut self) {
        debug_assert!(self.stack.len() > 1, "transform stack underflow");
        if self.stack.len() > 1 {
            self.stack.pop();
            self.pops += 1;
        }
    }

    pub fn top(&self) -> Mat4 {
        self.stack.last().copied().unwrap_or(Mat4::IDENTITY)
    }

    /// Entries above the base.
    pub fn depth(&self) -> usize {
        self.stack.len() - 1
    }

    pub fn push_count(&self) -> usize {
        self.pushes
    }

    pub fn pop_count(&self) -> usize {
        self.pops
    }

    pub fn is_balanced(&self) -> bool {
        self.pushes == self.pops && self.depth() == 0
    }
}

impl SceneGraph {
    /// Depth-first walk of the subtree at `start`.
    ///
    /// The traversal pushes each node's local matrix before `pre_visit` and
    /// pops it after `post_visit`, so the stack is balanced on return even
    /// when a visitor breaks out early. Returns [`VisitFlags::Break`] if the
    /// walk was stopped.
    pub fn traverse(
        &self,
        start: Entity,
        stack: &mut TransformStack,
        visitor: &mut impl Visitor,
    ) -> VisitFlags {
        let Some(local) = self.local_transform(start) else {
            return VisitFlags::Continue;
        };

        stack.push(local);
        let mut flags = visitor.pre_visit(self, start, stack);

        if flags == VisitFlags::Continue {
            for child in self.children(start) {
                if self.traverse(child, stack, visitor) == VisitFlags::Break {
                    flags = VisitFlags::Break;
                    break;
                }
            }
        }

        visitor.post_visit(self, start, stack);
        stack.pop();

        match flags {
            VisitFlags::Break => VisitFlags::Break,
            _ => VisitFlags::Continue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Quat, Vec3};

    struct Recorder {
        order: Vec<Entity>,
        worlds: Vec<(Entity, Mat4)>,
        stop_at: Option<Entity>,
        skip: Option<Entity>,
    }

    impl Recorder {
        fn new() -> Self {
            Self {
                order: Vec::new(),
                worlds: Vec::new(),
                stop_at: None,
                skip: None,
            }
        }
    }

    impl Visitor for Recorder {
        fn pre_visit(
            &mut self,
            _scene: &SceneGraph,
            entity: Entity,
            stack: &TransformStack,
        ) -> VisitFlags {
            self.order.push(entity);
            self.worlds.push((entity, stack.top()));
            if self.stop_at == Some(entity) {
                VisitFlags::Break
            } else if self.skip == Some(entity) {
                VisitFlags::SkipChildren
            } else {
                VisitFlags::Continue
            }
        }
    }

    fn chain() -> (SceneGraph, Entity, Entity, Entity) {
        let mut scene = SceneGraph::new();
        let a = scene.spawn_child(scene.root(), "a").unwrap();
        let b = scene.spawn_child(a, "b").unwrap();
        let c = scene.spawn_child(scene.root(), "c").unwrap();
        scene.set_translation(a, Vec3::new(1.0, 2.0, 3.0)).unwrap();
        scene
            .set_rotation(a, Quat::from_rotation_y(0.7))
            .unwrap();
        scene.set_scale(b, Vec3::new(2.0, 1.0, 0.5)).unwrap();
        scene.set_translation(b, Vec3::new(0.0, -4.0, 1.0)).unwrap();
        (scene, a, b, c)
    }

    #[test]
    fn test_stack_matches_direct_multiplication() {
        let (scene, a, b, _) = chain();
        let mut stack = TransformStack::new();
        let mut recorder = Recorder::new();
        scene.traverse(scene.root(), &mut stack, &mut recorder);

        let expected = scene.local_transform(scene.root()).unwrap()
            * scene.local_transform(a).unwrap()
            * scene.local_transform(b).unwrap();
        let (_, got) = recorder.worlds.iter().find(|(e, _)| *e == b).unwrap();
        assert!(got.abs_diff_eq(expected, 1e-5));
        assert!(got.abs_diff_eq(scene.world_transform(b).unwrap(), 1e-5));
    }

    #[test]
    fn test_depth_first_order() {
        let (scene, a, b, c) = chain();
        let mut stack = TransformStack::new();
        let mut recorder = Recorder::new();
        scene.traverse(scene.root(), &mut stack, &mut recorder);
        assert_eq!(recorder.order, vec![scene.root(), a, b, c]);
        assert!(stack.is_balanced());
        assert_eq!(stack.push_count(), 4);
    }

    #[test]
    fn test_balanced_after_early_exit() {
        let (scene, _, b, c) = chain();
        let mut stack = TransformStack::new();
        let mut recorder = Recorder::new();
        recorder.stop_at = Some(b);

        let flags = scene.traverse(scene.root(), &mut stack, &mut recorder);
        assert_eq!(flags, VisitFlags::Break);
        assert!(!recorder.order.contains(&c));
        assert_eq!(stack.push_count(), stack.pop_count());
        assert!(stack.is_balanced());
    }

    #[test]
    fn test_skip_children() {
        let (scene, a, b, c) = chain();
        let mut stack = TransformStack::new();
        let mut recorder = Recorder::new();
        recorder.skip = Some(a);

        let flags = scene.traverse(scene.root(), &mut stack, &mut recorder);
        assert_eq!(flags, VisitFlags::Continue);
        assert_eq!(recorder.order, vec![scene.root(), a, c]);
        assert!(!recorder.order.contains(&b));
        assert!(stack.is_balanced());
    }

    #[test]
    fn test_base_matrix_is_kept() {
        let base = Mat4::from_translation(Vec3::X);
        let mut stack = TransformStack::with_base(base);
        stack.push(Mat4::from_translation(Vec3::Y));
        assert_eq!(stack.top().transform_point3(Vec3::ZERO), Vec3::new(1.0, 1.0, 0.0));
        stack.pop();
        assert_eq!(stack.top(), base);
        assert!(stack.is_balanced());
    }
}
