//! The GPU abstraction used by the renderer.
//!
//! Rendering code never talks to wgpu directly. It describes pipelines with
//! [`PipelineDesc`], creates offscreen [`FramebufferId`]s, binds camera state
//! and issues draws through the [`RenderBackend`] trait.
//!
//! Two implementations exist:
//!
//! - [`CommandRecorder`] appends every call to a command list. It needs no
//!   device, so tests use it to check what a frame would draw.
//! - [`WgpuExecutor`] replays a recorded frame on a wgpu device, building
//!   pipelines and uploading meshes and textures on first use.
//!
//! ```
//! use scenerig::backend::{CommandRecorder, GpuCommand, PipelineDesc, RenderBackend};
//!
//! let mut recorder = CommandRecorder::new();
//! let pipeline = recorder.create_pipeline(&PipelineDesc::new("grid"));
//! assert!(matches!(recorder.commands()[0], GpuCommand::CreatePipeline(id, _) if id == pipeline));
//! ```

mod commands;
pub mod wgpu_backend;

pub use commands::{CommandRecorder, GpuCommand};
pub use wgpu_backend::WgpuExecutor;

use std::rc::Rc;

use glam::Mat4;

use crate::color::{Color, Rect};
use crate::library::{MeshId, TextureId};
use crate::light::LightUniforms;
use crate::material::MaterialUniforms;
use crate::mesh::MeshData;

/// Handle to a pipeline created through a [`RenderBackend`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PipelineId(pub(crate) usize);

/// Handle to an offscreen framebuffer created through a [`RenderBackend`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FramebufferId(pub(crate) usize);

/// Where a camera renders to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum FramebufferTarget {
    /// The window surface.
    #[default]
    Onscreen,
    Offscreen(FramebufferId),
}

/// Texture layer slots understood by the entity shader.
pub mod layer {
    /// Shape cut-out texture or diamond mask. Also the composite's color input.
    pub const SHAPE: u32 = 0;
    /// Material texture. Also the composite's depth-pass input.
    pub const MATERIAL: u32 = 1;
    pub const ALPHA_MASK: u32 = 2;
    pub const NORMAL_MAP: u32 = 5;
    pub const SHADOW_MAP: u32 = 7;
}

/// What a texture layer samples.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LayerSource {
    Texture(TextureId),
    FramebufferColor(FramebufferId),
    FramebufferDepth(FramebufferId),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Layer {
    pub slot: u32,
    pub source: LayerSource,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BlendMode {
    #[default]
    Replace,
    /// Standard `src_alpha, 1 - src_alpha` blending.
    Alpha,
    /// `dst = src + dst * (1 - src_alpha)` for premultiplied colors, used to
    /// accumulate jittered samples.
    Premultiplied,
    /// `dst = src`, written with `ADD(SRC, 0)` so masked channels survive.
    AddSource,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ColorMask {
    #[default]
    All,
    AlphaOnly,
}

/// Shader fragments a pipeline is assembled from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Snippet {
    /// Vertex stage computes the depth-of-field blur factor.
    DofBlur,
    /// Fragment alpha is replaced by the blur factor.
    DofAlpha,
    /// Discards fragments whose masked alpha is zero.
    DiamondDiscard,
    /// Discards fragments where the alpha-mask layer is at or below the
    /// material threshold.
    AlphaMaskThreshold,
    /// Per-fragment lighting. `material` selects material coefficients
    /// over the fixed fallback; `normal_map` lights in tangent space.
    Lighting { material: bool, normal_map: bool },
    /// Vertex stage computes shadow-map coordinates.
    ShadowCoords,
    /// Fragment stage darkens shadowed fragments.
    ShadowMap,
    /// Depth-of-field composite of the color and depth passes.
    DofComposite,
}

/// Everything needed to build a pipeline. Two equal descriptions produce
/// equivalent pipelines.
#[derive(Clone, Debug, PartialEq)]
pub struct PipelineDesc {
    pub label: String,
    pub base_color: Color,
    pub depth_test: bool,
    pub depth_write: bool,
    pub blend: BlendMode,
    pub color_mask: ColorMask,
    pub layers: Vec<Layer>,
    pub snippets: Vec<Snippet>,
}

impl PipelineDesc {
    /// An opaque white pipeline without depth testing.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            base_color: Color::WHITE,
            depth_test: false,
            depth_write: false,
            blend: BlendMode::Replace,
            color_mask: ColorMask::All,
            layers: Vec::new(),
            snippets: Vec::new(),
        }
    }

    pub fn with_color(mut self, color: Color) -> Self {
        self.base_color = color;
        self
    }

    /// Enables depth testing and writing.
    pub fn with_depth(mut self) -> Self {
        self.depth_test = true;
        self.depth_write = true;
        self
    }

    pub fn with_blend(mut self, blend: BlendMode) -> Self {
        self.blend = blend;
        self
    }

    pub fn with_color_mask(mut self, mask: ColorMask) -> Self {
        self.color_mask = mask;
        self
    }

    /// Sets the source of a layer slot, replacing any existing one.
    pub fn set_layer(&mut self, slot: u32, source: LayerSource) {
        self.layers.retain(|l| l.slot != slot);
        self.layers.push(Layer { slot, source });
        self.layers.sort_by_key(|l| l.slot);
    }

    pub fn with_layer(mut self, slot: u32, source: LayerSource) -> Self {
        self.set_layer(slot, source);
        self
    }

    pub fn layer(&self, slot: u32) -> Option<LayerSource> {
        self.layers.iter().find(|l| l.slot == slot).map(|l| l.source)
    }

    pub fn add_snippet(&mut self, snippet: Snippet) {
        if !self.snippets.contains(&snippet) {
            self.snippets.push(snippet);
        }
    }

    pub fn with_snippet(mut self, snippet: Snippet) -> Self {
        self.add_snippet(snippet);
        self
    }

    pub fn has_snippet(&self, snippet: Snippet) -> bool {
        self.snippets.contains(&snippet)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FramebufferDesc {
    pub label: String,
    pub width: u32,
    pub height: u32,
    /// Whether the framebuffer has a color attachment. Depth is always present.
    pub color: bool,
}

/// Camera state bound for subsequent draws.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraState {
    pub framebuffer: FramebufferTarget,
    pub viewport: [f32; 4],
    pub projection: Mat4,
    pub view: Mat4,
    /// Clear color applied to the viewport when the camera is flushed.
    pub clear: Option<Color>,
}

/// Per-draw uniforms as laid out in the entity shader.
///
/// `projection` is filled in by the backend from the bound camera.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct DrawUniforms {
    pub projection: [[f32; 4]; 4],
    pub modelview: [[f32; 4]; 4],
    /// Upper 3x3 holds the normal matrix.
    pub normal_matrix: [[f32; 4]; 4],
    pub shadow_matrix: [[f32; 4]; 4],
    pub color: [f32; 4],
    /// `x` focal distance, `y` depth of field.
    pub dof: [f32; 4],
    pub material: MaterialUniforms,
    pub light: LightUniforms,
}

impl Default for DrawUniforms {
    fn default() -> Self {
        let identity = Mat4::IDENTITY.to_cols_array_2d();
        Self {
            projection: identity,
            modelview: identity,
            normal_matrix: identity,
            shadow_matrix: identity,
            color: Color::WHITE.to_array(),
            dof: [0.0, 1.0, 0.0, 0.0],
            material: MaterialUniforms::default(),
            light: LightUniforms::default(),
        }
    }
}

impl DrawUniforms {
    pub fn with_modelview(modelview: Mat4) -> Self {
        Self {
            modelview: modelview.to_cols_array_2d(),
            ..Default::default()
        }
    }
}

/// Geometry for a draw: a library mesh or one built just for this frame.
#[derive(Clone, Debug, PartialEq)]
pub enum MeshSource {
    Library(MeshId),
    Transient(Rc<MeshData>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct DrawCall {
    pub pipeline: PipelineId,
    pub mesh: MeshSource,
    pub uniforms: DrawUniforms,
}

/// Rendering operations the renderer needs from a GPU.
pub trait RenderBackend {
    fn create_pipeline(&mut self, desc: &PipelineDesc) -> PipelineId;

    fn create_framebuffer(&mut self, desc: FramebufferDesc) -> FramebufferId;

    fn resize_framebuffer(&mut self, framebuffer: FramebufferId, width: u32, height: u32);

    fn framebuffer_size(&self, framebuffer: FramebufferId) -> Option<(u32, u32)>;

    /// Layer source sampling a framebuffer's depth or color attachment.
    fn framebuffer_texture(&self, framebuffer: FramebufferId, depth: bool) -> LayerSource {
        if depth {
            LayerSource::FramebufferDepth(framebuffer)
        } else {
            LayerSource::FramebufferColor(framebuffer)
        }
    }

    /// Makes `camera` the target of subsequent draws, clearing its viewport
    /// if it asks for it.
    fn bind_camera(&mut self, camera: &CameraState);

    /// Clears color and depth of a whole framebuffer.
    fn clear(&mut self, target: FramebufferTarget, color: Color);

    fn draw_primitive(&mut self, draw: DrawCall);

    /// Draws `rect` in the bound camera's space at z = 0.
    fn draw_rectangle(&mut self, pipeline: PipelineId, rect: Rect, uniforms: DrawUniforms);
}
