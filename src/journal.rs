//! Edit journal interface.
//!
//! The camera view reports finished edits to an [`EditJournal`] so that an
//! undo log can record them. The log itself lives outside this crate;
//! [`RecordingJournal`] keeps a plain list, which is enough for the demo
//! binary and for tests.

use glam::Vec3;
use hecs::Entity;

use crate::error::Result;
use crate::scene::SceneGraph;

pub trait EditJournal {
    /// Records that `entity` was moved to `(x, y, z)`. A mergable move may
    /// be folded into the previous move of the same entity.
    fn move_entity(&mut self, entity: Entity, x: f32, y: f32, z: f32, mergable: bool);

    /// Removes `entity` from the scene and records the deletion.
    fn delete_entity(&mut self, scene: &mut SceneGraph, entity: Entity) -> Result<()>;
}

#[derive(Clone, Debug, PartialEq)]
pub enum JournalEntry {
    Move {
        entity: Entity,
        position: Vec3,
        mergable: bool,
    },
    Delete {
        entity: Entity,
        label: String,
    },
}

/// Journal that keeps every entry in memory.
#[derive(Clone, Debug, Default)]
pub struct RecordingJournal {
    entries: Vec<JournalEntry>,
}

impl RecordingJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[JournalEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl EditJournal for RecordingJournal {
    fn move_entity(&mut self, entity: Entity, x: f32, y: f32, z: f32, mergable: bool) {
        let position = Vec3::new(x, y, z);
        if mergable
            && let Some(JournalEntry::Move {
                entity: last,
                position: last_position,
                mergable: true,
            }) = self.entries.last_mut()
            && *last == entity
        {
            *last_position = position;
            return;
        }
        self.entries.push(JournalEntry::Move {
            entity,
            position,
            mergable,
        });
    }

    fn delete_entity(&mut self, scene: &mut SceneGraph, entity: Entity) -> Result<()> {
        let label = scene.label(entity).unwrap_or_default();
        scene.despawn(entity)?;
        log::debug!("deleted {entity:?} ({label})");
        self.entries.push(JournalEntry::Delete { entity, label });
        Ok(())
    }
}
