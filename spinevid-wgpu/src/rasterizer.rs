use crate::renderer::DrawListRenderer;
use crate::{PageSet, RasterError};
use spinevid::DrawList;
use std::collections::HashMap;

const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Row pitch of a `width`-pixel RGBA8 readback, rounded up to wgpu's copy alignment.
pub fn padded_bytes_per_row(width: u32) -> u32 {
    let unpadded = width * 4;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}

struct RenderTarget {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    readback: wgpu::Buffer,
    padded_row: u32,
}

impl RenderTarget {
    fn new(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("spinevid frame target"),
            size: extent(width, height),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TARGET_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let padded_row = padded_bytes_per_row(width);
        let readback = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("spinevid frame readback"),
            size: u64::from(padded_row) * u64::from(height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        Self {
            texture,
            view,
            readback,
            padded_row,
        }
    }
}

struct UploadedPages {
    set_id: u64,
    bind_groups: Vec<wgpu::BindGroup>,
}

/// One graphics context: a headless device, its pipelines, and render targets cached per
/// canvas size.
///
/// Holds one device and queue; each render worker owns its own rasterizer.
pub struct FrameRasterizer {
    device: wgpu::Device,
    queue: wgpu::Queue,
    renderer: DrawListRenderer,
    targets: HashMap<(u32, u32), RenderTarget>,
    pages: Option<UploadedPages>,
}

impl FrameRasterizer {
    pub fn new() -> Result<Self, RasterError> {
        let instance = wgpu::Instance::default();
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            compatible_surface: None,
            power_preference: wgpu::PowerPreference::HighPerformance,
            force_fallback_adapter: false,
        }))
        .map_err(|e| RasterError::NoAdapter {
            message: e.to_string(),
        })?;
        log::debug!("rasterizer adapter: {:?}", adapter.get_info());

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("spinevid device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default().using_resolution(adapter.limits()),
            experimental_features: Default::default(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: Default::default(),
        }))
        .map_err(|e| RasterError::RequestDevice {
            message: e.to_string(),
        })?;

        let renderer = DrawListRenderer::new(&device, TARGET_FORMAT);
        Ok(Self {
            device,
            queue,
            renderer,
            targets: HashMap::new(),
            pages: None,
        })
    }

    /// Rasterizes `draw_list` onto a transparent `width` x `height` canvas and returns the
    /// tightly packed RGBA8 rows, top row first.
    pub fn render(
        &mut self,
        pages: &PageSet,
        draw_list: &DrawList,
        width: u32,
        height: u32,
    ) -> Result<Vec<u8>, RasterError> {
        let max = self.device.limits().max_texture_dimension_2d;
        if width == 0 || height == 0 || width > max || height > max {
            return Err(RasterError::CanvasSize { width, height });
        }
        if let Some(draw) = draw_list.draws.iter().find(|d| d.texture_page >= pages.len()) {
            return Err(RasterError::MissingPage {
                page: draw.texture_page,
                available: pages.len(),
            });
        }

        self.ensure_pages(pages);
        let device = &self.device;
        let target = self
            .targets
            .entry((width, height))
            .or_insert_with(|| RenderTarget::new(device, width, height));

        self.renderer
            .prepare(&self.device, &self.queue, draw_list, width, height);

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("spinevid frame encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("spinevid frame pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target.view,
                    resolve_target: None,
                    depth_slice: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            if let Some(uploaded) = &self.pages {
                self.renderer
                    .draw(&mut pass, draw_list, &uploaded.bind_groups);
            }
        }
        encoder.copy_texture_to_buffer(
            target.texture.as_image_copy(),
            wgpu::TexelCopyBufferInfo {
                buffer: &target.readback,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(target.padded_row),
                    rows_per_image: Some(height),
                },
            },
            extent(width, height),
        );
        self.queue.submit([encoder.finish()]);

        read_back(&self.device, &target.readback, width, height, target.padded_row)
    }

    fn ensure_pages(&mut self, pages: &PageSet) {
        if self.pages.as_ref().is_some_and(|p| p.set_id == pages.id()) {
            return;
        }
        let bind_groups = pages
            .pages()
            .iter()
            .map(|image| {
                let texture = self.device.create_texture(&wgpu::TextureDescriptor {
                    label: Some("spinevid page texture"),
                    size: extent(image.width, image.height),
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format: wgpu::TextureFormat::Rgba8Unorm,
                    usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                    view_formats: &[],
                });
                self.queue.write_texture(
                    texture.as_image_copy(),
                    &image.pixels,
                    wgpu::TexelCopyBufferLayout {
                        offset: 0,
                        bytes_per_row: Some(4 * image.width),
                        rows_per_image: Some(image.height),
                    },
                    extent(image.width, image.height),
                );
                let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
                self.renderer
                    .page_bind_group(&self.device, &view, &image.page)
            })
            .collect();
        log::debug!("uploaded {} atlas pages (set {})", pages.len(), pages.id());
        self.pages = Some(UploadedPages {
            set_id: pages.id(),
            bind_groups,
        });
    }
}

fn extent(width: u32, height: u32) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    }
}

fn read_back(
    device: &wgpu::Device,
    buffer: &wgpu::Buffer,
    width: u32,
    height: u32,
    padded_row: u32,
) -> Result<Vec<u8>, RasterError> {
    let slice = buffer.slice(..);
    let (tx, rx) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    device
        .poll(wgpu::PollType::wait_indefinitely())
        .map_err(|e| RasterError::Readback {
            message: e.to_string(),
        })?;
    rx.recv()
        .map_err(|e| RasterError::Readback {
            message: e.to_string(),
        })?
        .map_err(|e| RasterError::Readback {
            message: e.to_string(),
        })?;

    let pixels = {
        let mapped = slice.get_mapped_range();
        unpad_rows(&mapped, width, height, padded_row)
    };
    buffer.unmap();
    Ok(pixels)
}

fn unpad_rows(padded: &[u8], width: u32, height: u32, padded_row: u32) -> Vec<u8> {
    let row = (width * 4) as usize;
    let mut out = Vec::with_capacity(row * height as usize);
    for chunk in padded.chunks(padded_row as usize).take(height as usize) {
        out.extend_from_slice(&chunk[..row]);
    }
    out
}
