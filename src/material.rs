//! The material component: lighting coefficients and texture layers.

use crate::color::Color;
use crate::library::TextureId;

/// Material uniforms as laid out in the entity shader.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MaterialUniforms {
    pub ambient: [f32; 4],
    pub diffuse: [f32; 4],
    pub specular: [f32; 4],
    pub shininess: f32,
    pub alpha_threshold: f32,
    pub _pad: [f32; 2],
}

/// Surface properties of an entity.
///
/// Color and scalar properties only affect uniforms; every change bumps
/// [`Material::uniforms_age`]. Texture layers and translucency change the
/// pipeline itself, so the scene graph invalidates cached pipelines when
/// [`Material::layer_key`] or [`Material::is_translucent`] changes.
#[derive(Clone, Debug, PartialEq)]
pub struct Material {
    ambient: Color,
    diffuse: Color,
    specular: Color,
    shininess: f32,
    alpha_mask_threshold: f32,
    texture: Option<TextureId>,
    normal_map: Option<TextureId>,
    alpha_mask: Option<TextureId>,
    uniforms_age: u32,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            ambient: Color::grey(0.23),
            diffuse: Color::grey(0.75),
            specular: Color::grey(0.64),
            shininess: 100.0,
            alpha_mask_threshold: 0.0,
            texture: None,
            normal_map: None,
            alpha_mask: None,
            uniforms_age: 0,
        }
    }
}

impl Material {
    pub const MAX_SHININESS: f32 = 1000.0;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_texture(mut self, texture: TextureId) -> Self {
        self.texture = Some(texture);
        self
    }

    pub fn with_normal_map(mut self, normal_map: TextureId) -> Self {
        self.normal_map = Some(normal_map);
        self
    }

    pub fn with_alpha_mask(mut self, alpha_mask: TextureId) -> Self {
        self.alpha_mask = Some(alpha_mask);
        self
    }

    pub fn with_diffuse(mut self, diffuse: Color) -> Self {
        self.set_diffuse(diffuse);
        self
    }

    pub fn ambient(&self) -> Color {
        self.ambient
    }

    pub fn set_ambient(&mut self, color: Color) {
        self.ambient = color;
        self.uniforms_age += 1;
    }

    pub fn diffuse(&self) -> Color {
        self.diffuse
    }

    pub fn set_diffuse(&mut self, color: Color) {
        self.diffuse = color;
        self.uniforms_age += 1;
    }

    pub fn specular(&self) -> Color {
        self.specular
    }

    pub fn set_specular(&mut self, color: Color) {
        self.specular = color;
        self.uniforms_age += 1;
    }

    pub fn shininess(&self) -> f32 {
        self.shininess
    }

    /// Sets the specular exponent, clamped to `[0, 1000]`.
    pub fn set_shininess(&mut self, shininess: f32) {
        self.shininess = shininess.clamp(0.0, Self::MAX_SHININESS);
        self.uniforms_age += 1;
    }

    pub fn alpha_mask_threshold(&self) -> f32 {
        self.alpha_mask_threshold
    }

    /// Sets the alpha-mask discard threshold, clamped to `[0, 1]`.
    pub fn set_alpha_mask_threshold(&mut self, threshold: f32) {
        self.alpha_mask_threshold = threshold.clamp(0.0, 1.0);
        self.uniforms_age += 1;
    }

    pub fn texture(&self) -> Option<TextureId> {
        self.texture
    }

    pub fn set_texture(&mut self, texture: Option<TextureId>) {
        self.texture = texture;
    }

    pub fn normal_map(&self) -> Option<TextureId> {
        self.normal_map
    }

    pub fn set_normal_map(&mut self, normal_map: Option<TextureId>) {
        self.normal_map = normal_map;
    }

    pub fn alpha_mask(&self) -> Option<TextureId> {
        self.alpha_mask
    }

    pub fn set_alpha_mask(&mut self, alpha_mask: Option<TextureId>) {
        self.alpha_mask = alpha_mask;
    }

    /// The texture layers that shape a pipeline. A change here means any
    /// cached pipeline for the entity is stale.
    pub fn layer_key(&self) -> (Option<TextureId>, Option<TextureId>, Option<TextureId>) {
        (self.texture, self.normal_map, self.alpha_mask)
    }

    /// Whether the material needs to be drawn in the blended color pass:
    /// its diffuse alpha is below one or it carries an alpha mask.
    pub fn is_translucent(&self) -> bool {
        self.diffuse.a < 1.0 || self.alpha_mask.is_some()
    }

    /// Incremented every time a uniform-affecting property changes.
    pub fn uniforms_age(&self) -> u32 {
        self.uniforms_age
    }

    pub fn uniforms(&self) -> MaterialUniforms {
        MaterialUniforms {
            ambient: self.ambient.to_array(),
            diffuse: self.diffuse.to_array(),
            specular: self.specular.to_array(),
            shininess: self.shininess,
            alpha_threshold: self.alpha_mask_threshold,
            _pad: [0.0; 2],
        }
    }
}
