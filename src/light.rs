//! The light component.
//!
//! A scene has at most one light that matters to the renderer: the entity
//! registered as the scene's light. Besides a [`Light`] it carries a
//! [`Camera`](crate::Camera) whose framebuffer receives the shadow map. The
//! light shines along its entity's local +Z axis.

use glam::{Mat4, Vec3};

use crate::color::Color;

/// Light uniforms as laid out in the entity shader.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LightUniforms {
    pub ambient: [f32; 4],
    pub diffuse: [f32; 4],
    pub specular: [f32; 4],
    /// Normalized direction towards the light, in eye space. `w` is unused.
    pub direction: [f32; 4],
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Light {
    pub ambient: Color,
    pub diffuse: Color,
    pub specular: Color,
}

impl Default for Light {
    fn default() -> Self {
        Self {
            ambient: Color::grey(0.2),
            diffuse: Color::grey(0.6),
            specular: Color::grey(0.4),
        }
    }
}

impl Light {
    pub fn new(ambient: Color, diffuse: Color, specular: Color) -> Self {
        Self {
            ambient,
            diffuse,
            specular,
        }
    }

    /// Direction the light shines from, in world space.
    pub fn world_direction(light_world: &Mat4) -> Vec3 {
        light_world.transform_vector3(Vec3::Z).normalize_or_zero()
    }

    /// Uniforms for a draw seen through `view`.
    pub fn uniforms(&self, light_world: &Mat4, view: &Mat4) -> LightUniforms {
        let dir = view
            .transform_vector3(Self::world_direction(light_world))
            .normalize_or_zero();
        LightUniforms {
            ambient: self.ambient.to_array(),
            diffuse: self.diffuse.to_array(),
            specular: self.specular.to_array(),
            direction: [dir.x, dir.y, dir.z, 0.0],
        }
    }
}
