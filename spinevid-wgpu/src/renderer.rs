use spinevid::{AtlasFilter, AtlasPage, AtlasWrap, BlendMode, DrawList, Vertex};
use wgpu::util::DeviceExt;

const BLEND_MODES: [BlendMode; 4] = [
    BlendMode::Normal,
    BlendMode::Additive,
    BlendMode::Multiply,
    BlendMode::Screen,
];

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct GpuVertex {
    position: [f32; 2],
    uv: [f32; 2],
    light: [f32; 4],
    dark: [f32; 4],
}

impl From<&Vertex> for GpuVertex {
    fn from(v: &Vertex) -> Self {
        Self {
            position: v.position,
            uv: v.uv,
            light: v.color,
            dark: v.dark_color,
        }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct Globals {
    clip_from_canvas: [[f32; 4]; 4],
}

/// A GPU buffer that doubles its capacity whenever a frame outgrows it.
struct GrowableBuffer {
    label: &'static str,
    usage: wgpu::BufferUsages,
    buffer: wgpu::Buffer,
    capacity: u64,
}

impl GrowableBuffer {
    fn new(device: &wgpu::Device, label: &'static str, usage: wgpu::BufferUsages) -> Self {
        let usage = usage | wgpu::BufferUsages::COPY_DST;
        let capacity = 16 * 1024;
        Self {
            label,
            usage,
            buffer: Self::allocate(device, label, usage, capacity),
            capacity,
        }
    }

    fn allocate(
        device: &wgpu::Device,
        label: &str,
        usage: wgpu::BufferUsages,
        size: u64,
    ) -> wgpu::Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage,
            mapped_at_creation: false,
        })
    }

    fn write(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, bytes: &[u8]) {
        let needed = bytes.len() as u64;
        if needed > self.capacity {
            while self.capacity < needed {
                self.capacity *= 2;
            }
            log::trace!("growing {} to {} bytes", self.label, self.capacity);
            self.buffer = Self::allocate(device, self.label, self.usage, self.capacity);
        }
        // Writes must be a multiple of four bytes; vertices and u32 indices always are.
        if !bytes.is_empty() {
            queue.write_buffer(&self.buffer, 0, bytes);
        }
    }
}

/// Records [`DrawList`]s into a render pass over a pixel canvas.
///
/// One pipeline exists per blend mode and alpha convention; draws pick theirs and the bind
/// group of their atlas page.
pub struct DrawListRenderer {
    /// Indexed by [`pipeline_slot`].
    pipelines: Vec<wgpu::RenderPipeline>,
    globals: wgpu::Buffer,
    globals_bind_group: wgpu::BindGroup,
    page_layout: wgpu::BindGroupLayout,
    vertices: GrowableBuffer,
    indices: GrowableBuffer,
}

fn pipeline_slot(blend: BlendMode, premultiplied_alpha: bool) -> usize {
    let blend = match blend {
        BlendMode::Normal => 0,
        BlendMode::Additive => 1,
        BlendMode::Multiply => 2,
        BlendMode::Screen => 3,
    };
    blend * 2 + usize::from(premultiplied_alpha)
}

impl DrawListRenderer {
    pub fn new(device: &wgpu::Device, format: wgpu::TextureFormat) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("spinevid two-color shader"),
            source: wgpu::ShaderSource::Wgsl(SHADER.into()),
        });

        let globals_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("spinevid globals layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });
        let page_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("spinevid page layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        multisampled: false,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("spinevid pipeline layout"),
            bind_group_layouts: &[&globals_layout, &page_layout],
            push_constant_ranges: &[],
        });

        let mut pipelines = Vec::with_capacity(BLEND_MODES.len() * 2);
        for blend in BLEND_MODES {
            for premultiplied_alpha in [false, true] {
                debug_assert_eq!(pipelines.len(), pipeline_slot(blend, premultiplied_alpha));
                pipelines.push(create_pipeline(
                    device,
                    &layout,
                    &shader,
                    format,
                    blend_state(blend, premultiplied_alpha),
                ));
            }
        }

        let globals = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("spinevid globals"),
            contents: bytemuck::bytes_of(&Globals {
                clip_from_canvas: canvas_projection(1, 1),
            }),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let globals_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("spinevid globals"),
            layout: &globals_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: globals.as_entire_binding(),
            }],
        });

        Self {
            pipelines,
            globals,
            globals_bind_group,
            page_layout,
            vertices: GrowableBuffer::new(device, "spinevid vertices", wgpu::BufferUsages::VERTEX),
            indices: GrowableBuffer::new(device, "spinevid indices", wgpu::BufferUsages::INDEX),
        }
    }

    /// Binds an uploaded page texture with a sampler built from the page's atlas settings.
    pub fn page_bind_group(
        &self,
        device: &wgpu::Device,
        view: &wgpu::TextureView,
        page: &AtlasPage,
    ) -> wgpu::BindGroup {
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("spinevid page sampler"),
            mag_filter: filter_mode(&page.mag_filter),
            min_filter: filter_mode(&page.min_filter),
            address_mode_u: address_mode(page.wrap_u),
            address_mode_v: address_mode(page.wrap_v),
            ..Default::default()
        });
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("spinevid page"),
            layout: &self.page_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&sampler),
                },
            ],
        })
    }

    /// Uploads the projection for a `width` x `height` canvas and the list's geometry.
    pub fn prepare(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        draw_list: &DrawList,
        width: u32,
        height: u32,
    ) {
        let globals = Globals {
            clip_from_canvas: canvas_projection(width, height),
        };
        queue.write_buffer(&self.globals, 0, bytemuck::bytes_of(&globals));

        let vertices: Vec<GpuVertex> = draw_list.vertices.iter().map(GpuVertex::from).collect();
        self.vertices.write(device, queue, bytemuck::cast_slice(&vertices));
        self.indices.write(device, queue, bytemuck::cast_slice(&draw_list.indices));
    }

    /// Records the draws of the list last passed to [`DrawListRenderer::prepare`].
    /// Draws on pages outside `pages` are skipped.
    pub fn draw(
        &self,
        pass: &mut wgpu::RenderPass<'_>,
        draw_list: &DrawList,
        pages: &[wgpu::BindGroup],
    ) {
        if draw_list.indices.is_empty() {
            return;
        }
        pass.set_bind_group(0, &self.globals_bind_group, &[]);
        pass.set_vertex_buffer(0, self.vertices.buffer.slice(..));
        pass.set_index_buffer(self.indices.buffer.slice(..), wgpu::IndexFormat::Uint32);

        for draw in &draw_list.draws {
            let Some(page) = pages.get(draw.texture_page) else {
                log::trace!("skipping draw on unknown page {}", draw.texture_page);
                continue;
            };
            let slot = pipeline_slot(draw.blend, draw.premultiplied_alpha);
            pass.set_pipeline(&self.pipelines[slot]);
            pass.set_bind_group(1, page, &[]);
            let first = draw.first_index as u32;
            pass.draw_indexed(first..first + draw.index_count as u32, 0, 0..1);
        }
    }
}

fn create_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    shader: &wgpu::ShaderModule,
    format: wgpu::TextureFormat,
    blend: wgpu::BlendState,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("spinevid pipeline"),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: Some("vs_main"),
            compilation_options: Default::default(),
            buffers: &[wgpu::VertexBufferLayout {
                array_stride: std::mem::size_of::<GpuVertex>() as u64,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &wgpu::vertex_attr_array![
                    0 => Float32x2,
                    1 => Float32x2,
                    2 => Float32x4,
                    3 => Float32x4
                ],
            }],
        },
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: Some("fs_main"),
            compilation_options: Default::default(),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: Some(blend),
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            cull_mode: None,
            ..Default::default()
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}

/// Source color factor and shared destination factor of the Spine GL blend functions;
/// alpha always uses `ONE` as its source factor.
fn blend_state(blend: BlendMode, premultiplied_alpha: bool) -> wgpu::BlendState {
    use wgpu::BlendFactor as F;

    let straight_src = if premultiplied_alpha { F::One } else { F::SrcAlpha };
    let (src, dst) = match blend {
        BlendMode::Normal => (straight_src, F::OneMinusSrcAlpha),
        BlendMode::Additive => (straight_src, F::One),
        BlendMode::Multiply => (F::Dst, F::OneMinusSrcAlpha),
        BlendMode::Screen => (F::One, F::OneMinusSrc),
    };
    wgpu::BlendState {
        color: wgpu::BlendComponent {
            src_factor: src,
            dst_factor: dst,
            operation: wgpu::BlendOperation::Add,
        },
        alpha: wgpu::BlendComponent {
            src_factor: F::One,
            dst_factor: dst,
            operation: wgpu::BlendOperation::Add,
        },
    }
}

/// Column-major orthographic projection of a `width` x `height` pixel canvas with its origin
/// at the top left and y pointing down.
pub fn canvas_projection(width: u32, height: u32) -> [[f32; 4]; 4] {
    let sx = 2.0 / width.max(1) as f32;
    let sy = 2.0 / height.max(1) as f32;
    [
        [sx, 0.0, 0.0, 0.0],
        [0.0, -sy, 0.0, 0.0],
        [0.0, 0.0, 1.0, 0.0],
        [-1.0, 1.0, 0.0, 1.0],
    ]
}

fn address_mode(wrap: AtlasWrap) -> wgpu::AddressMode {
    match wrap {
        AtlasWrap::ClampToEdge => wgpu::AddressMode::ClampToEdge,
        AtlasWrap::Repeat => wgpu::AddressMode::Repeat,
    }
}

/// Pages are uploaded without mip levels, so only the texel filter of a mipmap mode matters.
fn filter_mode(filter: &AtlasFilter) -> wgpu::FilterMode {
    match filter {
        AtlasFilter::Nearest
        | AtlasFilter::MipMapNearestNearest
        | AtlasFilter::MipMapNearestLinear => wgpu::FilterMode::Nearest,
        AtlasFilter::Linear
        | AtlasFilter::MipMap
        | AtlasFilter::MipMapLinearNearest
        | AtlasFilter::MipMapLinearLinear
        | AtlasFilter::Other(_) => wgpu::FilterMode::Linear,
    }
}

const SHADER: &str = r#"
struct Globals {
  clip_from_canvas: mat4x4<f32>,
};

@group(0) @binding(0) var<uniform> globals: Globals;
@group(1) @binding(0) var page: texture_2d<f32>;
@group(1) @binding(1) var page_sampler: sampler;

struct Varyings {
  @builtin(position) clip: vec4<f32>,
  @location(0) uv: vec2<f32>,
  @location(1) light: vec4<f32>,
  @location(2) dark: vec4<f32>,
};

@vertex
fn vs_main(
  @location(0) position: vec2<f32>,
  @location(1) uv: vec2<f32>,
  @location(2) light: vec4<f32>,
  @location(3) dark: vec4<f32>,
) -> Varyings {
  return Varyings(globals.clip_from_canvas * vec4<f32>(position, 0.0, 1.0), uv, light, dark);
}

// Two-color tint: the dark color fills where the texel is dark, scaled by texel alpha.
@fragment
fn fs_main(v: Varyings) -> @location(0) vec4<f32> {
  let texel = textureSample(page, page_sampler, v.uv);
  let dark_weight = (texel.a - 1.0) * v.dark.a + 1.0 - texel.rgb;
  let rgb = dark_weight * v.dark.rgb + texel.rgb * v.light.rgb;
  return vec4<f32>(rgb, texel.a * v.light.a);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use wgpu::BlendFactor;

    fn project(m: [[f32; 4]; 4], x: f32, y: f32) -> [f32; 2] {
        [
            m[0][0] * x + m[1][0] * y + m[3][0],
            m[0][1] * x + m[1][1] * y + m[3][1],
        ]
    }

    #[test]
    fn canvas_corners_map_to_clip_corners() {
        let m = canvas_projection(200, 100);
        assert_eq!(project(m, 0.0, 0.0), [-1.0, 1.0]);
        assert_eq!(project(m, 200.0, 100.0), [1.0, -1.0]);
        assert_eq!(project(m, 100.0, 50.0), [0.0, 0.0]);
    }

    #[test]
    fn pipeline_slots_are_dense() {
        let mut slots: Vec<_> = BLEND_MODES
            .iter()
            .flat_map(|&b| [pipeline_slot(b, false), pipeline_slot(b, true)])
            .collect();
        slots.sort_unstable();
        assert_eq!(slots, (0..8).collect::<Vec<_>>());
    }

    #[test]
    fn blend_factors_follow_alpha_convention() {
        let normal = blend_state(BlendMode::Normal, false);
        assert_eq!(normal.color.src_factor, BlendFactor::SrcAlpha);
        assert_eq!(normal.color.dst_factor, BlendFactor::OneMinusSrcAlpha);
        assert_eq!(normal.alpha.src_factor, BlendFactor::One);
        assert_eq!(blend_state(BlendMode::Normal, true).color.src_factor, BlendFactor::One);

        let additive = blend_state(BlendMode::Additive, false);
        assert_eq!(additive.alpha.dst_factor, BlendFactor::One);
        assert_eq!(blend_state(BlendMode::Multiply, true).color.src_factor, BlendFactor::Dst);

        let screen = blend_state(BlendMode::Screen, false);
        assert_eq!(
            (screen.color.src_factor, screen.color.dst_factor),
            (BlendFactor::One, BlendFactor::OneMinusSrc)
        );
    }

    #[test]
    fn mipmap_filters_use_their_texel_filter() {
        use wgpu::FilterMode;
        assert_eq!(filter_mode(&AtlasFilter::Nearest), FilterMode::Nearest);
        assert_eq!(filter_mode(&AtlasFilter::MipMapNearestLinear), FilterMode::Nearest);
        assert_eq!(filter_mode(&AtlasFilter::MipMapLinearNearest), FilterMode::Linear);
        assert_eq!(filter_mode(&AtlasFilter::Other("Weird".into())), FilterMode::Linear);
        assert_eq!(address_mode(AtlasWrap::Repeat), wgpu::AddressMode::Repeat);
    }
}
