//! GPU textures and offscreen render targets.

use wgpu::util::DeviceExt;

use crate::library::TextureData;

/// Color format of offscreen color attachments.
pub const OFFSCREEN_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// A GPU texture with a default view.
#[derive(Debug)]
pub struct Texture {
    #[allow(dead_code)]
    pub(crate) texture: wgpu::Texture,
    pub(crate) view: wgpu::TextureView,
    pub width: u32,
    pub height: u32,
}

impl Texture {
    /// Uploads library pixel data as an sRGB texture.
    pub fn from_data(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        data: &TextureData,
        label: &str,
    ) -> Self {
        let texture = device.create_texture_with_data(
            queue,
            &wgpu::TextureDescriptor {
                label: Some(label),
                size: wgpu::Extent3d {
                    width: data.width,
                    height: data.height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8UnormSrgb,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            &data.pixels,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        Self {
            texture,
            view,
            width: data.width,
            height: data.height,
        }
    }

    /// A texture that can be rendered to and sampled afterwards.
    pub fn attachment(
        device: &wgpu::Device,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
        label: &str,
    ) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        Self {
            texture,
            view,
            width,
            height,
        }
    }
}

/// Color and depth attachments of an offscreen framebuffer.
pub struct RenderTarget {
    pub label: String,
    pub color: Option<Texture>,
    pub depth: Texture,
    width: u32,
    height: u32,
}

impl RenderTarget {
    pub fn new(device: &wgpu::Device, label: &str, width: u32, height: u32, color: bool) -> Self {
        let color = color.then(|| {
            Texture::attachment(
                device,
                width,
                height,
                OFFSCREEN_FORMAT,
                &format!("{label} Color"),
            )
        });
        let depth = Texture::attachment(device, width, height, DEPTH_FORMAT, &format!("{label} Depth"));
        Self {
            label: label.to_owned(),
            color,
            depth,
            width,
            height,
        }
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Recreates the attachments if the size changed. Returns whether it did.
    pub fn ensure_size(&mut self, device: &wgpu::Device, width: u32, height: u32) -> bool {
        if self.width == width && self.height == height {
            return false;
        }
        let label = std::mem::take(&mut self.label);
        *self = Self::new(device, &label, width, height, self.color.is_some());
        true
    }
}
