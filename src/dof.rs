//! Depth-of-field post effect.
//!
//! The view is painted twice into offscreen targets: a depth pass whose
//! alpha holds each fragment's focus (1 in focus, 0 fully blurred) and a
//! regular color pass. [`DofEffect::draw_rectangle`] composites the two
//! into the destination, blurring the color image where focus is low.

use crate::backend::{
    layer, DrawUniforms, FramebufferDesc, FramebufferId, FramebufferTarget, PipelineDesc,
    PipelineId, RenderBackend, Snippet,
};
use crate::color::Rect;

pub struct DofEffect {
    depth_pass: FramebufferId,
    color_pass: FramebufferId,
    composite: PipelineId,
    size: (u32, u32),
}

impl DofEffect {
    pub fn new<B: RenderBackend + ?Sized>(backend: &mut B) -> Self {
        let depth_pass = backend.create_framebuffer(FramebufferDesc {
            label: "DoF Depth Pass".into(),
            width: 1,
            height: 1,
            color: true,
        });
        let color_pass = backend.create_framebuffer(FramebufferDesc {
            label: "DoF Color Pass".into(),
            width: 1,
            height: 1,
            color: true,
        });

        let desc = PipelineDesc::new("dof-composite")
            .with_layer(layer::SHAPE, backend.framebuffer_texture(color_pass, false))
            .with_layer(layer::MATERIAL, backend.framebuffer_texture(depth_pass, false))
            .with_snippet(Snippet::DofComposite);
        let composite = backend.create_pipeline(&desc);

        Self {
            depth_pass,
            color_pass,
            composite,
            size: (1, 1),
        }
    }

    /// Resizes both pass targets. Does nothing if the size is unchanged.
    pub fn set_framebuffer_size<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        width: u32,
        height: u32,
    ) {
        let size = (width.max(1), height.max(1));
        if self.size == size {
            return;
        }
        backend.resize_framebuffer(self.depth_pass, size.0, size.1);
        backend.resize_framebuffer(self.color_pass, size.0, size.1);
        self.size = size;
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    pub fn depth_pass_fb(&self) -> FramebufferTarget {
        FramebufferTarget::Offscreen(self.depth_pass)
    }

    pub fn color_pass_fb(&self) -> FramebufferTarget {
        FramebufferTarget::Offscreen(self.color_pass)
    }

    /// Composites the passes into `rect` of the bound camera.
    pub fn draw_rectangle<B: RenderBackend + ?Sized>(&self, backend: &mut B, rect: Rect) {
        backend.draw_rectangle(self.composite, rect, DrawUniforms::default());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{CommandRecorder, GpuCommand, LayerSource};

    #[test]
    fn test_composite_samples_both_passes() {
        let mut backend = CommandRecorder::new();
        let dof = DofEffect::new(&mut backend);

        let FramebufferTarget::Offscreen(color) = dof.color_pass_fb() else {
            panic!("color pass should be offscreen");
        };
        let desc = backend.pipeline_desc(dof.composite).unwrap();
        assert_eq!(desc.layer(layer::SHAPE), Some(LayerSource::FramebufferColor(color)));
        assert!(desc.has_snippet(Snippet::DofComposite));
    }

    #[test]
    fn test_resize_only_when_changed() {
        let mut backend = CommandRecorder::new();
        let mut dof = DofEffect::new(&mut backend);
        backend.take_commands();

        dof.set_framebuffer_size(&mut backend, 320, 240);
        dof.set_framebuffer_size(&mut backend, 320, 240);
        let resizes = backend
            .commands()
            .iter()
            .filter(|c| matches!(c, GpuCommand::ResizeFramebuffer(..)))
            .count();
        assert_eq!(resizes, 2);
        assert_eq!(backend.framebuffer_size(dof.depth_pass), Some((320, 240)));
        assert_eq!(dof.size(), (320, 240));
    }
}
