//! Per-entity pipeline memoization.
//!
//! Every drawable entity needs two pipelines: a *mask* pipeline used by the
//! shadow and depth-of-field depth passes, and a *color* pipeline used by
//! both color passes. Building one means assembling layers and shader
//! snippets from the entity's geometry and material, so the result is
//! cached per (entity, slot). An entry is reused while the entity's
//! pipeline stamp and the scene state baked into it (translucency, the
//! light's shadow map) are unchanged.
//!
//! Mask pipelines derive from a template built once per cache. Entities
//! with plain geometry share a single depth-of-field pipeline, and diamonds
//! share one pipeline per mask texture.

use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;

use hecs::Entity;

use crate::backend::{
    layer, BlendMode, ColorMask, FramebufferTarget, LayerSource, PipelineDesc, PipelineId,
    RenderBackend, Snippet,
};
use crate::color::Color;
use crate::geometry::GeometryKind;
use crate::library::TextureId;
use crate::renderer::RenderPass;
use crate::scene::{PipelineStamp, SceneGraph};

/// Grey every color pipeline starts from before texturing and lighting.
pub const BASE_COLOR: Color = Color::grey(0.8);

/// A built pipeline and how often it has been reused.
#[derive(Debug)]
pub struct Pipeline {
    id: PipelineId,
    desc: PipelineDesc,
    age: Cell<u32>,
}

impl Pipeline {
    pub fn id(&self) -> PipelineId {
        self.id
    }

    pub fn desc(&self) -> &PipelineDesc {
        &self.desc
    }

    /// Number of times the pipeline was returned from the cache.
    pub fn age(&self) -> u32 {
        self.age.get()
    }

    fn touch(&self) {
        self.age.set(self.age.get().wrapping_add(1));
    }
}

/// Which of an entity's two cached pipelines a pass uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CacheSlot {
    Mask,
    Color,
}

/// Scene state baked into a color pipeline that the entity's stamp doesn't
/// cover on its own.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct BuildInputs {
    translucent: bool,
    shadow_map: Option<LayerSource>,
}

impl BuildInputs {
    fn of(scene: &SceneGraph, entity: Entity, slot: CacheSlot) -> Self {
        if slot == CacheSlot::Mask {
            return Self::default();
        }
        let translucent = scene
            .material(entity)
            .is_some_and(|material| material.is_translucent());
        let receive_shadow = scene.node(entity).is_some_and(|node| node.receive_shadow);
        Self {
            translucent,
            shadow_map: receive_shadow.then(|| shadow_map_source(scene)).flatten(),
        }
    }
}

struct Entry {
    stamp: PipelineStamp,
    inputs: BuildInputs,
    pipeline: Rc<Pipeline>,
}

#[derive(Default)]
struct PipelineSlots {
    mask: Option<Entry>,
    color: Option<Entry>,
}

impl PipelineSlots {
    fn slot(&mut self, slot: CacheSlot) -> &mut Option<Entry> {
        match slot {
            CacheSlot::Mask => &mut self.mask,
            CacheSlot::Color => &mut self.color,
        }
    }
}

#[derive(Default)]
pub struct PipelineCache {
    entries: HashMap<Entity, PipelineSlots>,
    template: Option<PipelineDesc>,
    dof_pipeline: Option<Rc<Pipeline>>,
    diamond_pipelines: HashMap<TextureId, Rc<Pipeline>>,
    builds: usize,
}

impl PipelineCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of pipelines this cache has asked the backend for.
    pub fn build_count(&self) -> usize {
        self.builds
    }

    /// Returns the pipeline `entity` should be drawn with in `pass`, building
    /// it on a miss. Entities without geometry have none.
    pub fn get_or_build<B: RenderBackend + ?Sized>(
        &mut self,
        scene: &SceneGraph,
        entity: Entity,
        pass: RenderPass,
        backend: &mut B,
    ) -> Option<Rc<Pipeline>> {
        let slot = pass.cache_slot();
        let stamp = scene.pipeline_stamp(entity);
        let inputs = BuildInputs::of(scene, entity, slot);

        if let Some(entry) = self
            .entries
            .get(&entity)
            .and_then(|slots| match slot {
                CacheSlot::Mask => slots.mask.as_ref(),
                CacheSlot::Color => slots.color.as_ref(),
            })
            .filter(|entry| entry.stamp == stamp && entry.inputs == inputs)
        {
            entry.pipeline.touch();
            return Some(entry.pipeline.clone());
        }

        let pipeline = match slot {
            CacheSlot::Mask => self.build_mask(scene, entity, backend)?,
            CacheSlot::Color => self.build_color(scene, entity, backend)?,
        };

        *self.entries.entry(entity).or_default().slot(slot) = Some(Entry {
            stamp,
            inputs,
            pipeline: pipeline.clone(),
        });
        Some(pipeline)
    }

    /// Drops both cached pipelines of `entity`.
    pub fn invalidate(&mut self, entity: Entity) {
        if self.entries.remove(&entity).is_some() {
            log::debug!("dropped cached pipelines of {entity:?}");
        }
    }

    /// Forgets entries of entities that no longer exist.
    pub fn prune(&mut self, scene: &SceneGraph) {
        self.entries.retain(|&entity, _| scene.contains(entity));
    }

    pub fn cached(&self, entity: Entity, slot: CacheSlot) -> Option<Rc<Pipeline>> {
        let slots = self.entries.get(&entity)?;
        let entry = match slot {
            CacheSlot::Mask => slots.mask.as_ref(),
            CacheSlot::Color => slots.color.as_ref(),
        }?;
        Some(entry.pipeline.clone())
    }

    fn create<B: RenderBackend + ?Sized>(&mut self, desc: PipelineDesc, backend: &mut B) -> Rc<Pipeline> {
        log::debug!("creating pipeline {:?}", desc.label);
        self.builds += 1;
        Rc::new(Pipeline {
            id: backend.create_pipeline(&desc),
            desc,
            age: Cell::new(0),
        })
    }

    /// Depth-of-field template: writes only alpha, depth tested, with the
    /// blur factor computed per vertex.
    fn template(&mut self) -> PipelineDesc {
        self.template
            .get_or_insert_with(|| {
                PipelineDesc::new("dof-template")
                    .with_color_mask(ColorMask::AlphaOnly)
                    .with_blend(BlendMode::AddSource)
                    .with_depth()
                    .with_snippet(Snippet::DofBlur)
            })
            .clone()
    }

    fn dof_pipeline<B: RenderBackend + ?Sized>(&mut self, backend: &mut B) -> Rc<Pipeline> {
        if let Some(pipeline) = &self.dof_pipeline {
            return pipeline.clone();
        }
        let mut desc = self.template();
        desc.label = "dof".into();
        desc.add_snippet(Snippet::DofAlpha);
        let pipeline = self.create(desc, backend);
        self.dof_pipeline = Some(pipeline.clone());
        pipeline
    }

    fn diamond_desc(&mut self) -> PipelineDesc {
        let mut desc = self.template();
        desc.label = "dof-diamond".into();
        desc.add_snippet(Snippet::DiamondDiscard);
        desc.add_snippet(Snippet::DofAlpha);
        desc
    }

    fn diamond_pipeline<B: RenderBackend + ?Sized>(
        &mut self,
        mask: TextureId,
        backend: &mut B,
    ) -> Rc<Pipeline> {
        if let Some(pipeline) = self.diamond_pipelines.get(&mask) {
            return pipeline.clone();
        }
        let desc = self
            .diamond_desc()
            .with_layer(layer::SHAPE, LayerSource::Texture(mask));
        let pipeline = self.create(desc, backend);
        self.diamond_pipelines.insert(mask, pipeline.clone());
        pipeline
    }

    fn build_mask<B: RenderBackend + ?Sized>(
        &mut self,
        scene: &SceneGraph,
        entity: Entity,
        backend: &mut B,
    ) -> Option<Rc<Pipeline>> {
        let kind = scene.geometry(entity)?.kind;

        let pipeline = match kind {
            GeometryKind::Diamond { mask } => self.diamond_pipeline(mask, backend),
            GeometryKind::Shape { shape_texture } => {
                let mut desc = self.diamond_desc();
                desc.label = "dof-shape".into();
                if let Some(texture) = shape_texture {
                    desc.set_layer(layer::SHAPE, LayerSource::Texture(texture));
                }
                if let Some(material) = scene.material(entity) {
                    if let Some(texture) = material.texture() {
                        desc.set_layer(layer::MATERIAL, LayerSource::Texture(texture));
                    }
                    if let Some(mask) = material.alpha_mask() {
                        desc.set_layer(layer::ALPHA_MASK, LayerSource::Texture(mask));
                        desc.add_snippet(Snippet::AlphaMaskThreshold);
                    }
                }
                self.create(desc, backend)
            }
            GeometryKind::Model => self.dof_pipeline(backend),
        };
        Some(pipeline)
    }

    fn build_color<B: RenderBackend + ?Sized>(
        &mut self,
        scene: &SceneGraph,
        entity: Entity,
        backend: &mut B,
    ) -> Option<Rc<Pipeline>> {
        let kind = scene.geometry(entity)?.kind;
        let inputs = BuildInputs::of(scene, entity, CacheSlot::Color);

        let mut desc = PipelineDesc::new(format!(
            "color:{}",
            scene.label(entity).unwrap_or_default()
        ))
        .with_color(BASE_COLOR)
        .with_depth();

        let mut material_lighting = false;
        let mut normal_mapped = false;
        if let Some(material) = scene.material(entity) {
            material_lighting = true;
            if let Some(texture) = material.texture() {
                desc.set_layer(layer::MATERIAL, LayerSource::Texture(texture));
            }
            if let Some(mask) = material.alpha_mask() {
                desc.set_layer(layer::ALPHA_MASK, LayerSource::Texture(mask));
                desc.add_snippet(Snippet::AlphaMaskThreshold);
            }
            if let Some(normal_map) = material.normal_map() {
                desc.set_layer(layer::NORMAL_MAP, LayerSource::Texture(normal_map));
                normal_mapped = true;
            }
        }
        if inputs.translucent {
            desc.blend = BlendMode::Alpha;
        }
        desc.add_snippet(Snippet::Lighting {
            material: material_lighting,
            normal_map: normal_mapped,
        });

        if scene.node(entity)?.receive_shadow {
            desc.add_snippet(Snippet::ShadowCoords);
            if let Some(source) = inputs.shadow_map {
                desc.set_layer(layer::SHADOW_MAP, source);
                desc.add_snippet(Snippet::ShadowMap);
            }
        }

        match kind {
            GeometryKind::Shape {
                shape_texture: Some(texture),
            } => desc.set_layer(layer::SHAPE, LayerSource::Texture(texture)),
            GeometryKind::Diamond { mask } => {
                desc.set_layer(layer::SHAPE, LayerSource::Texture(mask))
            }
            _ => {}
        }

        Some(self.create(desc, backend))
    }
}

/// Depth attachment of the registered light's framebuffer, if any.
pub fn shadow_map_source(scene: &SceneGraph) -> Option<LayerSource> {
    let light = scene.light()?;
    match scene.camera(light)?.framebuffer() {
        FramebufferTarget::Offscreen(fb) => Some(LayerSource::FramebufferDepth(fb)),
        FramebufferTarget::Onscreen => None,
    }
}
