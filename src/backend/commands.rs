use std::collections::HashMap;

use crate::color::{Color, Rect};

use super::{
    CameraState, DrawCall, DrawUniforms, FramebufferDesc, FramebufferId, FramebufferTarget,
    PipelineDesc, PipelineId, RenderBackend,
};

/// A recorded backend call.
#[derive(Clone, Debug, PartialEq)]
pub enum GpuCommand {
    CreatePipeline(PipelineId, PipelineDesc),
    CreateFramebuffer(FramebufferId, FramebufferDesc),
    ResizeFramebuffer(FramebufferId, u32, u32),
    BindCamera(CameraState),
    Clear(FramebufferTarget, Color),
    Draw(DrawCall),
    DrawRectangle(PipelineId, Rect, DrawUniforms),
}

impl GpuCommand {
    pub fn is_draw(&self) -> bool {
        matches!(self, GpuCommand::Draw(_) | GpuCommand::DrawRectangle(..))
    }
}

/// A [`RenderBackend`] that records calls instead of executing them.
///
/// Pipeline descriptions and framebuffer sizes are also kept so lookups
/// work after the commands have been taken.
#[derive(Debug, Default)]
pub struct CommandRecorder {
    commands: Vec<GpuCommand>,
    pipelines: Vec<PipelineDesc>,
    framebuffers: HashMap<FramebufferId, (u32, u32)>,
    next_framebuffer: usize,
}

impl CommandRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> &[GpuCommand] {
        &self.commands
    }

    /// Drains the recorded commands, e.g. to hand a frame to an executor.
    pub fn take_commands(&mut self) -> Vec<GpuCommand> {
        std::mem::take(&mut self.commands)
    }

    pub fn pipeline_desc(&self, id: PipelineId) -> Option<&PipelineDesc> {
        self.pipelines.get(id.0)
    }

    pub fn pipeline_count(&self) -> usize {
        self.pipelines.len()
    }

    pub fn draws(&self) -> impl Iterator<Item = &GpuCommand> {
        self.commands.iter().filter(|c| c.is_draw())
    }
}

impl RenderBackend for CommandRecorder {
    fn create_pipeline(&mut self, desc: &PipelineDesc) -> PipelineId {
        let id = PipelineId(self.pipelines.len());
        self.pipelines.push(desc.clone());
        self.commands.push(GpuCommand::CreatePipeline(id, desc.clone()));
        id
    }

    fn create_framebuffer(&mut self, desc: FramebufferDesc) -> FramebufferId {
        let id = FramebufferId(self.next_framebuffer);
        self.next_framebuffer += 1;
        self.framebuffers.insert(id, (desc.width, desc.height));
        self.commands.push(GpuCommand::CreateFramebuffer(id, desc));
        id
    }

    fn resize_framebuffer(&mut self, framebuffer: FramebufferId, width: u32, height: u32) {
        self.framebuffers.insert(framebuffer, (width, height));
        self.commands
            .push(GpuCommand::ResizeFramebuffer(framebuffer, width, height));
    }

    fn framebuffer_size(&self, framebuffer: FramebufferId) -> Option<(u32, u32)> {
        self.framebuffers.get(&framebuffer).copied()
    }

    fn bind_camera(&mut self, camera: &CameraState) {
        self.commands.push(GpuCommand::BindCamera(*camera));
    }

    fn clear(&mut self, target: FramebufferTarget, color: Color) {
        self.commands.push(GpuCommand::Clear(target, color));
    }

    fn draw_primitive(&mut self, draw: DrawCall) {
        self.commands.push(GpuCommand::Draw(draw));
    }

    fn draw_rectangle(&mut self, pipeline: PipelineId, rect: Rect, uniforms: DrawUniforms) {
        self.commands
            .push(GpuCommand::DrawRectangle(pipeline, rect, uniforms));
    }
}
