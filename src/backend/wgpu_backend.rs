//! Replays recorded frames on a wgpu device.
//!
//! The executor keeps every GPU resource the recorded commands refer to:
//! pipelines (built per topology and target format on first use), offscreen
//! framebuffers, uploaded library meshes and textures, and texture bind
//! groups keyed by the layer sources they bind.
//!
//! A frame is split into segments, one render pass each, wherever the
//! target framebuffer changes or a clear is requested. All per-draw
//! uniforms of a frame go into a single buffer addressed with dynamic
//! offsets.

use std::collections::HashMap;
use std::num::NonZeroU64;

use glam::{Mat4, Vec3};
use wgpu::util::DeviceExt;

use super::{
    layer, BlendMode, CameraState, ColorMask, DrawUniforms, FramebufferId, FramebufferTarget,
    GpuCommand, LayerSource, MeshSource, PipelineDesc, PipelineId, Snippet,
};
use crate::color::{Color, Rect};
use crate::library::{Library, MeshId};
use crate::mesh::{MeshData, Topology, Vertex3d};
use crate::texture::{RenderTarget, Texture, DEPTH_FORMAT, OFFSCREEN_FORMAT};

const SHADER_SOURCE: &str = include_str!("../shaders/entity.wgsl");

/// Slots of the texture bind group, in binding order.
const COLOR_SLOTS: [u32; 4] = [
    layer::SHAPE,
    layer::MATERIAL,
    layer::ALPHA_MASK,
    layer::NORMAL_MAP,
];

type PipelineKey = (PipelineId, Topology, Option<wgpu::TextureFormat>);
type LayerKey = [Option<LayerSource>; 5];

struct GpuMesh {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
    revision: u32,
}

impl GpuMesh {
    fn upload(device: &wgpu::Device, mesh: &MeshData, revision: u32, label: &str) -> Self {
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label} Vertices")),
            contents: bytemuck::cast_slice(&mesh.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label} Indices")),
            contents: bytemuck::cast_slice(&mesh.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        Self {
            vertex_buffer,
            index_buffer,
            index_count: mesh.indices.len() as u32,
            revision,
        }
    }
}

#[derive(Clone, Copy)]
enum MeshRef {
    Library(MeshId),
    Transient(usize),
}

struct DrawOp {
    pipeline: PipelineKey,
    mesh: MeshRef,
    layers: LayerKey,
    uniform_index: u32,
    viewport: [f32; 4],
}

struct Segment {
    target: FramebufferTarget,
    clear: Option<Color>,
    draws: Vec<DrawOp>,
}

/// Executes recorded [`GpuCommand`]s with wgpu.
pub struct WgpuExecutor {
    surface_format: wgpu::TextureFormat,
    uniform_stride: u64,

    uniform_layout: wgpu::BindGroupLayout,
    texture_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,

    uniform_buffer: wgpu::Buffer,
    uniform_capacity: u64,
    uniform_bind_group: wgpu::BindGroup,

    color_sampler: wgpu::Sampler,
    shadow_sampler: wgpu::Sampler,
    white: Texture,
    far_depth: Texture,
    surface_depth: Option<Texture>,

    descs: Vec<Option<PipelineDesc>>,
    shaders: HashMap<String, wgpu::ShaderModule>,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
    framebuffers: HashMap<FramebufferId, RenderTarget>,
    meshes: HashMap<MeshId, GpuMesh>,
    textures: HashMap<crate::library::TextureId, Texture>,
    bind_groups: HashMap<LayerKey, wgpu::BindGroup>,
}

impl WgpuExecutor {
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue, surface_format: wgpu::TextureFormat) -> Self {
        let uniform_size = std::mem::size_of::<DrawUniforms>() as u64;
        let alignment = device.limits().min_uniform_buffer_offset_alignment as u64;
        let uniform_stride = uniform_size.div_ceil(alignment) * alignment;

        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Draw Uniforms Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: NonZeroU64::new(uniform_size),
                },
                count: None,
            }],
        });

        let color_texture = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        };
        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Layer Textures Layout"),
            entries: &[
                color_texture(0),
                color_texture(1),
                color_texture(2),
                color_texture(3),
                wgpu::BindGroupLayoutEntry {
                    binding: 4,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Depth,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 5,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 6,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::NonFiltering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Entity Pipeline Layout"),
            bind_group_layouts: &[&uniform_layout, &texture_layout],
            push_constant_ranges: &[],
        });

        let uniform_capacity = 64;
        let (uniform_buffer, uniform_bind_group) =
            Self::create_uniforms(device, &uniform_layout, uniform_stride, uniform_capacity);

        let color_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Layer Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });
        let shadow_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Shadow Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let white = Texture::from_data(
            device,
            queue,
            &crate::library::TextureData::solid(Color::WHITE),
            "Default White Texture",
        );

        // Depth textures can't be written directly; clear one to the far plane.
        let far_depth = Texture::attachment(device, 1, 1, DEPTH_FORMAT, "Default Depth Texture");
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Default Depth Clear"),
        });
        {
            let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Default Depth Clear"),
                color_attachments: &[],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &far_depth.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
        }
        queue.submit(std::iter::once(encoder.finish()));

        Self {
            surface_format,
            uniform_stride,
            uniform_layout,
            texture_layout,
            pipeline_layout,
            uniform_buffer,
            uniform_capacity,
            uniform_bind_group,
            color_sampler,
            shadow_sampler,
            white,
            far_depth,
            surface_depth: None,
            descs: Vec::new(),
            shaders: HashMap::new(),
            pipelines: HashMap::new(),
            framebuffers: HashMap::new(),
            meshes: HashMap::new(),
            textures: HashMap::new(),
            bind_groups: HashMap::new(),
        }
    }

    fn create_uniforms(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        stride: u64,
        capacity: u64,
    ) -> (wgpu::Buffer, wgpu::BindGroup) {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Draw Uniforms"),
            size: stride * capacity,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Draw Uniforms Bind Group"),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &buffer,
                    offset: 0,
                    size: wgpu::BufferSize::new(std::mem::size_of::<DrawUniforms>() as u64),
                }),
            }],
        });
        (buffer, bind_group)
    }

    /// Replays one frame of commands, rendering onscreen draws into
    /// `surface`.
    pub fn execute(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        library: &Library,
        commands: Vec<GpuCommand>,
        surface: &wgpu::TextureView,
        surface_size: (u32, u32),
    ) {
        let mut segments: Vec<Segment> = Vec::new();
        let mut uniforms: Vec<DrawUniforms> = Vec::new();
        let mut transient: Vec<MeshData> = Vec::new();
        let mut camera: Option<CameraState> = None;

        for command in commands {
            match command {
                GpuCommand::CreatePipeline(id, desc) => {
                    if self.descs.len() <= id.0 {
                        self.descs.resize(id.0 + 1, None);
                    }
                    self.descs[id.0] = Some(desc);
                }
                GpuCommand::CreateFramebuffer(id, desc) => {
                    let target = RenderTarget::new(device, &desc.label, desc.width, desc.height, desc.color);
                    self.framebuffers.insert(id, target);
                }
                GpuCommand::ResizeFramebuffer(id, width, height) => {
                    if let Some(target) = self.framebuffers.get_mut(&id)
                        && target.ensure_size(device, width, height)
                    {
                        // bind groups may point at the old attachments
                        self.bind_groups.clear();
                    }
                }
                GpuCommand::BindCamera(state) => {
                    if let Some(color) = state.clear {
                        segments.push(Segment {
                            target: state.framebuffer,
                            clear: Some(color),
                            draws: Vec::new(),
                        });
                    }
                    camera = Some(state);
                }
                GpuCommand::Clear(target, color) => {
                    segments.push(Segment {
                        target,
                        clear: Some(color),
                        draws: Vec::new(),
                    });
                }
                GpuCommand::Draw(draw) => {
                    let Some(state) = camera else {
                        log::warn!("draw without a bound camera");
                        continue;
                    };
                    let (mesh, topology) = match draw.mesh {
                        MeshSource::Library(id) => match library.mesh(id) {
                            Some(data) => (MeshRef::Library(id), data.topology),
                            None => continue,
                        },
                        MeshSource::Transient(data) => {
                            let topology = data.topology;
                            transient.push((*data).clone());
                            (MeshRef::Transient(transient.len() - 1), topology)
                        }
                    };
                    self.push_draw(&mut segments, &mut uniforms, &state, draw.pipeline, mesh, topology, draw.uniforms);
                }
                GpuCommand::DrawRectangle(pipeline, rect, mut draw_uniforms) => {
                    let Some(state) = camera else {
                        log::warn!("rectangle without a bound camera");
                        continue;
                    };
                    transient.push(rectangle_mesh(rect));
                    draw_uniforms.modelview = state.view.to_cols_array_2d();
                    let mesh = MeshRef::Transient(transient.len() - 1);
                    self.push_draw(&mut segments, &mut uniforms, &state, pipeline, mesh, Topology::Triangles, draw_uniforms);
                }
            }
        }

        self.ensure_surface_depth(device, surface_size);
        self.write_uniforms(device, queue, &uniforms);

        let transient: Vec<GpuMesh> = transient
            .iter()
            .map(|mesh| GpuMesh::upload(device, mesh, 0, "Transient"))
            .collect();

        for segment in &segments {
            for op in &segment.draws {
                self.prepare(device, queue, library, op);
            }
        }

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Scene Encoder"),
        });

        for segment in &segments {
            self.encode_segment(&mut encoder, segment, &transient, surface, surface_size);
        }

        queue.submit(std::iter::once(encoder.finish()));
    }

    #[allow(clippy::too_many_arguments)]
    fn push_draw(
        &self,
        segments: &mut Vec<Segment>,
        uniforms: &mut Vec<DrawUniforms>,
        camera: &CameraState,
        pipeline: PipelineId,
        mesh: MeshRef,
        topology: Topology,
        mut draw_uniforms: DrawUniforms,
    ) {
        let Some(desc) = self.descs.get(pipeline.0).and_then(Option::as_ref) else {
            log::warn!("draw with unknown pipeline {pipeline:?}");
            return;
        };

        let format = match camera.framebuffer {
            FramebufferTarget::Onscreen => Some(self.surface_format),
            FramebufferTarget::Offscreen(id) => self
                .framebuffers
                .get(&id)
                .and_then(|fb| fb.color.as_ref())
                .map(|_| OFFSCREEN_FORMAT),
        };

        draw_uniforms.projection = camera.projection.to_cols_array_2d();
        uniforms.push(draw_uniforms);

        let needs_segment = segments
            .last()
            .is_none_or(|s| s.target != camera.framebuffer);
        if needs_segment {
            segments.push(Segment {
                target: camera.framebuffer,
                clear: None,
                draws: Vec::new(),
            });
        }

        let op = DrawOp {
            pipeline: (pipeline, topology, format),
            mesh,
            layers: layer_key(desc),
            uniform_index: (uniforms.len() - 1) as u32,
            viewport: camera.viewport,
        };
        if let Some(segment) = segments.last_mut() {
            segment.draws.push(op);
        }
    }

    fn ensure_surface_depth(&mut self, device: &wgpu::Device, (width, height): (u32, u32)) {
        let stale = self
            .surface_depth
            .as_ref()
            .is_none_or(|d| d.width != width || d.height != height);
        if stale {
            self.surface_depth = Some(Texture::attachment(device, width, height, DEPTH_FORMAT, "Surface Depth"));
        }
    }

    fn write_uniforms(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, uniforms: &[DrawUniforms]) {
        let count = uniforms.len() as u64;
        if count > self.uniform_capacity {
            self.uniform_capacity = count.next_power_of_two();
            let (buffer, bind_group) = Self::create_uniforms(
                device,
                &self.uniform_layout,
                self.uniform_stride,
                self.uniform_capacity,
            );
            self.uniform_buffer = buffer;
            self.uniform_bind_group = bind_group;
        }

        let stride = self.uniform_stride as usize;
        let mut bytes = vec![0u8; stride * uniforms.len()];
        for (i, u) in uniforms.iter().enumerate() {
            let data = bytemuck::bytes_of(u);
            bytes[i * stride..i * stride + data.len()].copy_from_slice(data);
        }
        if !bytes.is_empty() {
            queue.write_buffer(&self.uniform_buffer, 0, &bytes);
        }
    }

    /// Makes sure the pipeline, mesh and bind group of a draw exist.
    fn prepare(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, library: &Library, op: &DrawOp) {
        if let MeshRef::Library(id) = op.mesh {
            let revision = library.mesh_revision(id);
            let stale = self.meshes.get(&id).is_none_or(|m| m.revision != revision);
            if stale && let Some(data) = library.mesh(id) {
                self.meshes
                    .insert(id, GpuMesh::upload(device, data, revision, &format!("Mesh {}", id.0)));
            }
        }

        for source in op.layers.iter().flatten() {
            if let LayerSource::Texture(id) = source
                && !self.textures.contains_key(id)
                && let Some(data) = library.texture(*id)
            {
                self.textures
                    .insert(*id, Texture::from_data(device, queue, data, &format!("Texture {}", id.0)));
            }
        }

        if !self.bind_groups.contains_key(&op.layers) {
            let bind_group = self.create_layer_bind_group(device, &op.layers);
            self.bind_groups.insert(op.layers, bind_group);
        }

        if !self.pipelines.contains_key(&op.pipeline) {
            let (id, topology, format) = op.pipeline;
            if let Some(desc) = self.descs.get(id.0).cloned().flatten() {
                let pipeline = self.build_pipeline(device, &desc, topology, format);
                self.pipelines.insert(op.pipeline, pipeline);
            }
        }
    }

    fn color_view(&self, source: Option<LayerSource>) -> &wgpu::TextureView {
        match source {
            Some(LayerSource::Texture(id)) => self.textures.get(&id).map(|t| &t.view),
            Some(LayerSource::FramebufferColor(fb)) => self
                .framebuffers
                .get(&fb)
                .and_then(|t| t.color.as_ref())
                .map(|t| &t.view),
            Some(LayerSource::FramebufferDepth(_)) => {
                log::warn!("depth attachment bound to a color layer; using white");
                None
            }
            None => None,
        }
        .unwrap_or(&self.white.view)
    }

    fn depth_view(&self, source: Option<LayerSource>) -> &wgpu::TextureView {
        match source {
            Some(LayerSource::FramebufferDepth(fb)) => self.framebuffers.get(&fb).map(|t| &t.depth.view),
            _ => None,
        }
        .unwrap_or(&self.far_depth.view)
    }

    fn create_layer_bind_group(&self, device: &wgpu::Device, layers: &LayerKey) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Layer Textures"),
            layout: &self.texture_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(self.color_view(layers[0])),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(self.color_view(layers[1])),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(self.color_view(layers[2])),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(self.color_view(layers[3])),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::TextureView(self.depth_view(layers[4])),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: wgpu::BindingResource::Sampler(&self.color_sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 6,
                    resource: wgpu::BindingResource::Sampler(&self.shadow_sampler),
                },
            ],
        })
    }

    fn build_pipeline(
        &mut self,
        device: &wgpu::Device,
        desc: &PipelineDesc,
        topology: Topology,
        format: Option<wgpu::TextureFormat>,
    ) -> wgpu::RenderPipeline {
        log::debug!("building pipeline {:?} ({topology:?})", desc.label);

        let source = shader_source(desc);
        let shader = self
            .shaders
            .entry(source.clone())
            .or_insert_with(|| {
                device.create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some("Entity Shader"),
                    source: wgpu::ShaderSource::Wgsl(source.into()),
                })
            })
            .clone();

        let blend = match desc.blend {
            BlendMode::Replace | BlendMode::AddSource => wgpu::BlendState::REPLACE,
            BlendMode::Alpha => wgpu::BlendState::ALPHA_BLENDING,
            BlendMode::Premultiplied => wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING,
        };
        let write_mask = match desc.color_mask {
            ColorMask::All => wgpu::ColorWrites::ALL,
            ColorMask::AlphaOnly => wgpu::ColorWrites::ALPHA,
        };
        let targets: Vec<Option<wgpu::ColorTargetState>> = format
            .map(|format| wgpu::ColorTargetState {
                format,
                blend: Some(blend),
                write_mask,
            })
            .into_iter()
            .map(Some)
            .collect();

        device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(&desc.label),
            layout: Some(&self.pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs"),
                buffers: &[Vertex3d::LAYOUT],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs"),
                targets: &targets,
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: match topology {
                    Topology::Triangles => wgpu::PrimitiveTopology::TriangleList,
                    Topology::Lines => wgpu::PrimitiveTopology::LineList,
                },
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: desc.depth_write,
                depth_compare: if desc.depth_test {
                    wgpu::CompareFunction::LessEqual
                } else {
                    wgpu::CompareFunction::Always
                },
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        })
    }

    fn encode_segment(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        segment: &Segment,
        transient: &[GpuMesh],
        surface: &wgpu::TextureView,
        surface_size: (u32, u32),
    ) {
        let (color_view, depth_view, size) = match segment.target {
            FramebufferTarget::Onscreen => {
                let Some(depth) = self.surface_depth.as_ref() else {
                    return;
                };
                (Some(surface), &depth.view, surface_size)
            }
            FramebufferTarget::Offscreen(id) => {
                let Some(fb) = self.framebuffers.get(&id) else {
                    log::warn!("render into unknown framebuffer {id:?}");
                    return;
                };
                (fb.color.as_ref().map(|c| &c.view), &fb.depth.view, fb.size())
            }
        };

        let color_load = match segment.clear {
            Some(color) => wgpu::LoadOp::Clear(color.into()),
            None => wgpu::LoadOp::Load,
        };
        let depth_load = match segment.clear {
            Some(_) => wgpu::LoadOp::Clear(1.0),
            None => wgpu::LoadOp::Load,
        };

        let color_attachments: Vec<Option<wgpu::RenderPassColorAttachment>> = color_view
            .map(|view| wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: color_load,
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })
            .into_iter()
            .map(Some)
            .collect();

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Scene Pass"),
            color_attachments: &color_attachments,
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: depth_view,
                depth_ops: Some(wgpu::Operations {
                    load: depth_load,
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        for op in &segment.draws {
            let Some(pipeline) = self.pipelines.get(&op.pipeline) else {
                continue;
            };
            let Some(bind_group) = self.bind_groups.get(&op.layers) else {
                continue;
            };
            let mesh = match op.mesh {
                MeshRef::Library(id) => self.meshes.get(&id),
                MeshRef::Transient(index) => transient.get(index),
            };
            let Some(mesh) = mesh else {
                continue;
            };
            let Some([x, y, w, h]) = clamp_viewport(op.viewport, size) else {
                continue;
            };

            pass.set_viewport(x, y, w, h, 0.0, 1.0);
            pass.set_pipeline(pipeline);
            let offset = (op.uniform_index as u64 * self.uniform_stride) as u32;
            pass.set_bind_group(0, &self.uniform_bind_group, &[offset]);
            pass.set_bind_group(1, bind_group, &[]);
            pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
            pass.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
            pass.draw_indexed(0..mesh.index_count, 0, 0..1);
        }
    }
}

fn layer_key(desc: &PipelineDesc) -> LayerKey {
    [
        desc.layer(COLOR_SLOTS[0]),
        desc.layer(COLOR_SLOTS[1]),
        desc.layer(COLOR_SLOTS[2]),
        desc.layer(COLOR_SLOTS[3]),
        desc.layer(layer::SHADOW_MAP),
    ]
}

/// WGSL feature flags for a pipeline, in the order the shader declares them.
fn shader_flags(desc: &PipelineDesc) -> [(&'static str, bool); 15] {
    let lighting = desc.snippets.iter().find_map(|s| match s {
        Snippet::Lighting {
            material,
            normal_map,
        } => Some((*material, *normal_map)),
        _ => None,
    });
    let has_normal_map = desc.layer(layer::NORMAL_MAP).is_some();

    [
        ("HAS_SHAPE", desc.layer(layer::SHAPE).is_some()),
        ("HAS_MATERIAL_TEXTURE", desc.layer(layer::MATERIAL).is_some()),
        ("HAS_ALPHA_MASK", desc.layer(layer::ALPHA_MASK).is_some()),
        ("HAS_NORMAL_MAP", has_normal_map),
        ("HAS_SHADOW_MAP", desc.layer(layer::SHADOW_MAP).is_some()),
        ("DOF_BLUR", desc.has_snippet(Snippet::DofBlur)),
        ("DOF_ALPHA", desc.has_snippet(Snippet::DofAlpha)),
        ("DIAMOND_DISCARD", desc.has_snippet(Snippet::DiamondDiscard)),
        ("ALPHA_MASK_THRESHOLD", desc.has_snippet(Snippet::AlphaMaskThreshold)),
        ("LIGHTING", lighting.is_some()),
        ("LIGHTING_MATERIAL", lighting.is_some_and(|(m, _)| m)),
        ("LIGHTING_NORMAL_MAP", has_normal_map && lighting.is_some_and(|(_, n)| n)),
        ("SHADOW_COORDS", desc.has_snippet(Snippet::ShadowCoords)),
        ("SHADOW_MAP", desc.has_snippet(Snippet::ShadowMap)),
        ("DOF_COMPOSITE", desc.has_snippet(Snippet::DofComposite)),
    ]
}

fn shader_source(desc: &PipelineDesc) -> String {
    let mut source = String::new();
    for (name, value) in shader_flags(desc) {
        source.push_str(&format!("const {name}: bool = {value};\n"));
    }
    source.push_str(SHADER_SOURCE);
    source
}

/// A rectangle in camera space at z = 0, with UVs spanning the texture.
fn rectangle_mesh(rect: Rect) -> MeshData {
    let mut mesh = MeshData::quad(rect.width, rect.height);
    let offset = Mat4::from_translation(Vec3::new(rect.x, rect.y, 0.0));
    for v in &mut mesh.vertices {
        v.position = offset.transform_point3(v.position()).to_array();
    }
    mesh
}

/// Clips a viewport to the target. Returns `None` if nothing is left.
fn clamp_viewport(viewport: [f32; 4], (width, height): (u32, u32)) -> Option<[f32; 4]> {
    let [x, y, w, h] = viewport;
    let x0 = x.max(0.0);
    let y0 = y.max(0.0);
    let x1 = (x + w).min(width as f32);
    let y1 = (y + h).min(height as f32);
    (x1 > x0 && y1 > y0).then_some([x0, y0, x1 - x0, y1 - y0])
}
