use std::collections::HashMap;

use wgpu::util::DeviceExt;

use crate::error::{RenderError, Result};
use crate::math::Rect;

use super::backend::RenderBackend;
use super::handle::ResourcePool;
use super::pipeline_builder::{PipelineBuilder, DEPTH_FORMAT};
use super::types::{
    BlendMode, Capabilities, ClearFlags, Color, DepthBufferHandle, FrameBufferHandle,
    MeshHandle, ProgramHandle, ProgramSource, RenderTarget, TextureDescriptor, TextureFilter,
    TextureFormat, TextureHandle, UniformScope, VertexLayout, WrapMode,
};
use super::vertex::MeshData;

pub const MAX_TEXTURE_SLOTS: usize = 4;
/// Bound size of each uniform block; shader-side structs must fit inside it.
pub const UNIFORM_BLOCK_SIZE: u64 = 512;
const UNIFORM_ALIGNMENT: usize = 256;

fn wgpu_format(format: TextureFormat) -> wgpu::TextureFormat {
    match format {
        TextureFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        TextureFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
        TextureFormat::Rgba32Float => wgpu::TextureFormat::Rgba32Float,
        TextureFormat::R32Float => wgpu::TextureFormat::R32Float,
        TextureFormat::Rg32Float => wgpu::TextureFormat::Rg32Float,
    }
}

struct TextureRecord {
    desc: TextureDescriptor,
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    sampler: wgpu::Sampler,
}

struct DepthRecord {
    view: wgpu::TextureView,
    width: u32,
    height: u32,
}

struct FrameBufferRecord {
    color: Option<TextureHandle>,
    depth: Option<DepthBufferHandle>,
}

struct MeshRecord {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
}

struct ProgramRecord {
    label: String,
    module: wgpu::ShaderModule,
    vertex_entry: &'static str,
    fragment_entry: &'static str,
    layout: VertexLayout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct PipelineKey {
    program: ProgramHandle,
    color_format: wgpu::TextureFormat,
    has_depth: bool,
    depth_test: bool,
    depth_write: bool,
    blend: Option<BlendMode>,
    color_write: bool,
}

type TextureSet = [Option<TextureHandle>; MAX_TEXTURE_SLOTS];

struct DrawOp {
    pipeline: PipelineKey,
    textures: TextureSet,
    pass_offset: u32,
    instance_offset: u32,
    mesh: Option<MeshHandle>,
}

enum PassOp {
    Viewport(Rect),
    Draw(DrawOp),
}

struct Segment {
    target: RenderTarget,
    color_clear: Option<Color>,
    depth_clear: bool,
    ops: Vec<PassOp>,
}

impl Segment {
    fn new(target: RenderTarget) -> Self {
        Self {
            target,
            color_clear: None,
            depth_clear: false,
            ops: Vec::new(),
        }
    }

    fn is_noop(&self) -> bool {
        self.color_clear.is_none() && !self.depth_clear && self.ops.is_empty()
    }
}

/// Draws through wgpu. Commands are recorded per render target and encoded as one render
/// pass per target switch when the frame finishes.
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    capabilities: Capabilities,

    output_format: wgpu::TextureFormat,
    output_size: (u32, u32),
    output_view: Option<wgpu::TextureView>,
    headless_output: Option<wgpu::Texture>,

    uniform_layout: wgpu::BindGroupLayout,
    texture_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    uniform_buffer: wgpu::Buffer,
    uniform_capacity: u64,
    uniform_bind_group: wgpu::BindGroup,
    uniform_staging: Vec<u8>,

    fallback_view: wgpu::TextureView,
    fallback_sampler: wgpu::Sampler,

    textures: ResourcePool<TextureRecord>,
    depth_buffers: ResourcePool<DepthRecord>,
    framebuffers: ResourcePool<FrameBufferRecord>,
    meshes: ResourcePool<MeshRecord>,
    programs: ResourcePool<ProgramRecord>,

    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
    texture_bind_groups: HashMap<TextureSet, wgpu::BindGroup>,

    segments: Vec<Segment>,
    current: Segment,
    viewport: Option<Rect>,
    clear_color: Color,
    blend: Option<BlendMode>,
    depth_test: bool,
    depth_write: bool,
    color_write: bool,
    program: Option<ProgramHandle>,
    bound_textures: TextureSet,
    pass_offset: u32,
    instance_offset: u32,
}

impl WgpuBackend {
    /// Creates a device with an offscreen output target.
    pub fn new_headless(width: u32, height: u32) -> Result<Self> {
        pollster::block_on(async {
            let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
                backends: wgpu::Backends::all(),
                ..Default::default()
            });

            let adapter = instance
                .request_adapter(&wgpu::RequestAdapterOptions {
                    power_preference: wgpu::PowerPreference::HighPerformance,
                    compatible_surface: None,
                    force_fallback_adapter: false,
                })
                .await
                .map_err(|_| RenderError::NoAdapter)?;

            log::info!("Using adapter: {:?}", adapter.get_info());

            let mut required_features = wgpu::Features::empty();
            if adapter.features().contains(wgpu::Features::FLOAT32_FILTERABLE) {
                required_features |= wgpu::Features::FLOAT32_FILTERABLE;
            }

            let (device, queue) = adapter
                .request_device(&wgpu::DeviceDescriptor {
                    label: Some("HybridRendererDevice"),
                    required_features,
                    required_limits: wgpu::Limits::default(),
                    experimental_features: wgpu::ExperimentalFeatures::disabled(),
                    memory_hints: wgpu::MemoryHints::Performance,
                    trace: wgpu::Trace::Off,
                })
                .await
                .map_err(|err| RenderError::RequestDevice(err.to_string()))?;

            let mut backend =
                Self::from_device(device, queue, wgpu::TextureFormat::Rgba8Unorm, width, height);
            backend.create_headless_output();
            Ok(backend)
        })
    }

    fn create_headless_output(&mut self) {
        let output = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("HeadlessOutput"),
            size: wgpu::Extent3d {
                width: self.output_size.0,
                height: self.output_size.1,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: self.output_format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        self.output_view = Some(output.create_view(&wgpu::TextureViewDescriptor::default()));
        if let Some(previous) = self.headless_output.replace(output) {
            previous.destroy();
        }
    }

    /// Reallocates the offscreen output. Only meaningful for backends made with
    /// [`WgpuBackend::new_headless`].
    pub fn resize_headless(&mut self, width: u32, height: u32) {
        if self.headless_output.is_none() {
            log::warn!("resize_headless called on a surface-backed renderer");
            return;
        }
        let size = (width.max(1), height.max(1));
        if size != self.output_size {
            self.output_size = size;
            self.create_headless_output();
        }
    }

    /// Texture bind groups currently cached for reuse across draws.
    pub fn cached_bind_groups(&self) -> usize {
        self.texture_bind_groups.len()
    }

    /// Wraps an existing device. The host supplies the output view each frame through
    /// [`WgpuBackend::set_output_view`].
    pub fn from_device(
        device: wgpu::Device,
        queue: wgpu::Queue,
        output_format: wgpu::TextureFormat,
        width: u32,
        height: u32,
    ) -> Self {
        let features = device.features();
        let capabilities = Capabilities {
            float_render_targets: true,
            float32_filterable: features.contains(wgpu::Features::FLOAT32_FILTERABLE),
            max_texture_size: device.limits().max_texture_dimension_2d,
        };

        let uniform_entry = |binding: u32| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: true,
                min_binding_size: None,
            },
            count: None,
        };
        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("UniformBindLayout"),
            entries: &[uniform_entry(0), uniform_entry(1)],
        });

        let mut texture_entries = Vec::with_capacity(MAX_TEXTURE_SLOTS * 2);
        for slot in 0..MAX_TEXTURE_SLOTS as u32 {
            texture_entries.push(wgpu::BindGroupLayoutEntry {
                binding: slot * 2,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            });
            texture_entries.push(wgpu::BindGroupLayoutEntry {
                binding: slot * 2 + 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            });
        }
        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("TextureBindLayout"),
            entries: &texture_entries,
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("ProgramPipelineLayout"),
            bind_group_layouts: &[&uniform_layout, &texture_layout],
            push_constant_ranges: &[],
        });

        let uniform_capacity = UNIFORM_BLOCK_SIZE * 64;
        let (uniform_buffer, uniform_bind_group) =
            Self::create_uniform_buffer(&device, &uniform_layout, uniform_capacity);

        let fallback = device.create_texture_with_data(
            &queue,
            &wgpu::TextureDescriptor {
                label: Some("FallbackWhite"),
                size: wgpu::Extent3d {
                    width: 1,
                    height: 1,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8Unorm,
                usage: wgpu::TextureUsages::TEXTURE_BINDING,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            &[255, 255, 255, 255],
        );
        let fallback_view = fallback.create_view(&wgpu::TextureViewDescriptor::default());
        let fallback_sampler = Self::create_sampler(&device, TextureFilter::Nearest, WrapMode::Clamp);

        let output_size = (width.max(1), height.max(1));

        Self {
            device,
            queue,
            capabilities,
            output_format,
            output_size,
            output_view: None,
            headless_output: None,
            uniform_layout,
            texture_layout,
            pipeline_layout,
            uniform_buffer,
            uniform_capacity,
            uniform_bind_group,
            uniform_staging: vec![0; UNIFORM_BLOCK_SIZE as usize],
            fallback_view,
            fallback_sampler,
            textures: ResourcePool::new(),
            depth_buffers: ResourcePool::new(),
            framebuffers: ResourcePool::new(),
            meshes: ResourcePool::new(),
            programs: ResourcePool::new(),
            pipelines: HashMap::new(),
            texture_bind_groups: HashMap::new(),
            segments: Vec::new(),
            current: Segment::new(RenderTarget::Output),
            viewport: None,
            clear_color: Color::BLACK,
            blend: None,
            depth_test: true,
            depth_write: true,
            color_write: true,
            program: None,
            bound_textures: [None; MAX_TEXTURE_SLOTS],
            pass_offset: 0,
            instance_offset: 0,
        }
    }

    /// Output view for the next frame, typically the current surface texture.
    pub fn set_output_view(&mut self, view: wgpu::TextureView, width: u32, height: u32) {
        self.output_view = Some(view);
        self.output_size = (width.max(1), height.max(1));
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn headless_output(&self) -> Option<&wgpu::Texture> {
        self.headless_output.as_ref()
    }

    fn create_uniform_buffer(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        capacity: u64,
    ) -> (wgpu::Buffer, wgpu::BindGroup) {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("UniformRing"),
            size: capacity,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let binding = |binding: u32| wgpu::BindGroupEntry {
            binding,
            resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                buffer: &buffer,
                offset: 0,
                size: wgpu::BufferSize::new(UNIFORM_BLOCK_SIZE),
            }),
        };
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("UniformRingBindGroup"),
            layout,
            entries: &[binding(0), binding(1)],
        });
        (buffer, bind_group)
    }

    fn create_sampler(device: &wgpu::Device, filter: TextureFilter, wrap: WrapMode) -> wgpu::Sampler {
        let address_mode = match wrap {
            WrapMode::Clamp => wgpu::AddressMode::ClampToEdge,
            WrapMode::Repeat => wgpu::AddressMode::Repeat,
        };
        let filter_mode = match filter {
            TextureFilter::Nearest => wgpu::FilterMode::Nearest,
            TextureFilter::Bilinear => wgpu::FilterMode::Linear,
        };
        device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("TextureSampler"),
            address_mode_u: address_mode,
            address_mode_v: address_mode,
            address_mode_w: address_mode,
            mag_filter: filter_mode,
            min_filter: filter_mode,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        })
    }

    fn allocate_texture(&self, desc: &TextureDescriptor) -> (wgpu::Texture, wgpu::TextureView) {
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&*desc.label),
            size: wgpu::Extent3d {
                width: desc.width.max(1),
                height: desc.height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu_format(desc.format),
            usage: wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        (texture, view)
    }

    fn allocate_depth(&self, width: u32, height: u32) -> wgpu::TextureView {
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("DepthBuffer"),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        texture.create_view(&wgpu::TextureViewDescriptor::default())
    }

    fn target_formats(&self, target: RenderTarget) -> (wgpu::TextureFormat, bool) {
        match target {
            RenderTarget::Output => (self.output_format, false),
            RenderTarget::FrameBuffer(handle) => match self.framebuffers.get(handle) {
                Some(record) => {
                    let format = record
                        .color
                        .and_then(|color| self.textures.get(color))
                        .map(|texture| wgpu_format(texture.desc.format))
                        .unwrap_or(self.output_format);
                    (format, record.depth.is_some())
                }
                None => (self.output_format, false),
            },
        }
    }

    fn push_uniforms(&mut self, data: &[u8]) -> u32 {
        let offset = self.uniform_staging.len();
        let block = UNIFORM_BLOCK_SIZE as usize;
        let len = if data.len() > block {
            log::warn!(
                "Uniform block of {} bytes exceeds {} bytes and was truncated",
                data.len(),
                block
            );
            block
        } else {
            data.len()
        };
        self.uniform_staging.extend_from_slice(&data[..len]);
        let padded = len.div_ceil(UNIFORM_ALIGNMENT).max(1) * UNIFORM_ALIGNMENT;
        self.uniform_staging.resize(offset + padded, 0);
        offset as u32
    }

    fn close_segment(&mut self) {
        let target = self.current.target;
        let segment = std::mem::replace(&mut self.current, Segment::new(target));
        if !segment.is_noop() {
            self.segments.push(segment);
        }
    }

    fn record_draw(&mut self, mesh: Option<MeshHandle>) {
        let Some(program) = self.program else {
            log::warn!("Draw issued without a bound program");
            return;
        };
        let Some(layout) = self.programs.get(program).map(|p| p.layout) else {
            return;
        };
        if mesh.is_some() != (layout == VertexLayout::Mesh) {
            log::warn!("Program vertex layout does not match the draw call");
            return;
        }
        let (color_format, has_depth) = self.target_formats(self.current.target);
        let op = DrawOp {
            pipeline: PipelineKey {
                program,
                color_format,
                has_depth,
                depth_test: self.depth_test,
                depth_write: self.depth_write,
                blend: self.blend,
                color_write: self.color_write,
            },
            textures: self.bound_textures,
            pass_offset: self.pass_offset,
            instance_offset: self.instance_offset,
            mesh,
        };
        self.current.ops.push(PassOp::Draw(op));
    }

    fn ensure_pipeline(&mut self, key: PipelineKey) {
        if self.pipelines.contains_key(&key) {
            return;
        }
        let Some(program) = self.programs.get(key.program) else {
            return;
        };
        let mut builder = PipelineBuilder::new(&self.device, &self.pipeline_layout, &program.module)
            .with_label(&program.label)
            .with_entries(program.vertex_entry, program.fragment_entry)
            .with_vertex_layout(program.layout)
            .with_color_target(key.color_format, key.blend, key.color_write);
        if key.has_depth {
            builder = builder.with_depth(key.depth_test, key.depth_write);
        }
        let pipeline = builder.build();
        self.pipelines.insert(key, pipeline);
    }

    fn ensure_texture_bind_group(&mut self, set: TextureSet) {
        if self.texture_bind_groups.contains_key(&set) {
            return;
        }
        let mut entries = Vec::with_capacity(MAX_TEXTURE_SLOTS * 2);
        for (slot, texture) in set.iter().enumerate() {
            let record = texture.and_then(|handle| self.textures.get(handle));
            let (view, sampler) = match record {
                Some(record) => (&record.view, &record.sampler),
                None => (&self.fallback_view, &self.fallback_sampler),
            };
            entries.push(wgpu::BindGroupEntry {
                binding: slot as u32 * 2,
                resource: wgpu::BindingResource::TextureView(view),
            });
            entries.push(wgpu::BindGroupEntry {
                binding: slot as u32 * 2 + 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            });
        }
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("TextureBindGroup"),
            layout: &self.texture_layout,
            entries: &entries,
        });
        self.texture_bind_groups.insert(set, bind_group);
    }

    fn ensure_uniform_capacity(&mut self) {
        let required = self.uniform_staging.len() as u64 + UNIFORM_BLOCK_SIZE;
        if required <= self.uniform_capacity {
            return;
        }
        let new_capacity = required.max(self.uniform_capacity * 2);
        log::info!(
            "Growing uniform ring: {} -> {} bytes",
            self.uniform_capacity,
            new_capacity
        );
        let (buffer, bind_group) =
            Self::create_uniform_buffer(&self.device, &self.uniform_layout, new_capacity);
        self.uniform_buffer = buffer;
        self.uniform_bind_group = bind_group;
        self.uniform_capacity = new_capacity;
    }

    fn encode_segment(&self, encoder: &mut wgpu::CommandEncoder, segment: &Segment) {
        let (color_view, depth_view) = match segment.target {
            RenderTarget::Output => (self.output_view.as_ref(), None),
            RenderTarget::FrameBuffer(handle) => match self.framebuffers.get(handle) {
                Some(record) => (
                    record
                        .color
                        .and_then(|color| self.textures.get(color))
                        .map(|texture| &texture.view),
                    record
                        .depth
                        .and_then(|depth| self.depth_buffers.get(depth))
                        .map(|depth| &depth.view),
                ),
                None => (None, None),
            },
        };
        let Some(color_view) = color_view else {
            log::warn!("Skipping pass for unresolved target {:?}", segment.target);
            return;
        };

        let load = match segment.color_clear {
            Some(color) => wgpu::LoadOp::Clear(wgpu::Color {
                r: color.r as f64,
                g: color.g as f64,
                b: color.b as f64,
                a: color.a as f64,
            }),
            None => wgpu::LoadOp::Load,
        };
        let depth_load = if segment.depth_clear {
            wgpu::LoadOp::Clear(1.0)
        } else {
            wgpu::LoadOp::Load
        };

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("HybridRendererPass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: color_view,
                resolve_target: None,
                depth_slice: None,
                ops: wgpu::Operations {
                    load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: depth_view.map(|view| wgpu::RenderPassDepthStencilAttachment {
                view,
                depth_ops: Some(wgpu::Operations {
                    load: depth_load,
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        for op in &segment.ops {
            match op {
                PassOp::Viewport(rect) => pass.set_viewport(
                    rect.x as f32,
                    rect.y as f32,
                    rect.width as f32,
                    rect.height as f32,
                    0.0,
                    1.0,
                ),
                PassOp::Draw(draw) => {
                    let (Some(pipeline), Some(textures)) = (
                        self.pipelines.get(&draw.pipeline),
                        self.texture_bind_groups.get(&draw.textures),
                    ) else {
                        continue;
                    };
                    pass.set_pipeline(pipeline);
                    pass.set_bind_group(
                        0,
                        &self.uniform_bind_group,
                        &[draw.pass_offset, draw.instance_offset],
                    );
                    pass.set_bind_group(1, textures, &[]);
                    match draw.mesh.and_then(|mesh| self.meshes.get(mesh)) {
                        Some(mesh) => {
                            pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
                            pass.set_index_buffer(
                                mesh.index_buffer.slice(..),
                                wgpu::IndexFormat::Uint32,
                            );
                            pass.draw_indexed(0..mesh.index_count, 0, 0..1);
                        }
                        None if draw.mesh.is_none() => pass.draw(0..3, 0..1),
                        None => {}
                    }
                }
            }
        }
    }
}

impl RenderBackend for WgpuBackend {
    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn output_size(&self) -> (u32, u32) {
        self.output_size
    }

    fn create_texture(&mut self, desc: &TextureDescriptor) -> TextureHandle {
        let (texture, view) = self.allocate_texture(desc);
        let sampler = Self::create_sampler(&self.device, desc.filter, desc.wrap);
        self.textures.insert(TextureRecord {
            desc: desc.clone(),
            texture,
            view,
            sampler,
        })
    }

    fn resize_texture(&mut self, texture: TextureHandle, width: u32, height: u32) {
        let Some(mut desc) = self.textures.get(texture).map(|record| record.desc.clone()) else {
            return;
        };
        desc.width = width;
        desc.height = height;
        let (new_texture, view) = self.allocate_texture(&desc);
        if let Some(record) = self.textures.get_mut(texture) {
            record.desc = desc;
            record.texture = new_texture;
            record.view = view;
        }
        self.texture_bind_groups.clear();
    }

    fn upload_texture(&mut self, texture: TextureHandle, data: &[u8]) {
        let Some(record) = self.textures.get(texture) else {
            return;
        };
        let desc = &record.desc;
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &record.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(desc.format.bytes_per_pixel() * desc.width),
                rows_per_image: Some(desc.height),
            },
            wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: 1,
            },
        );
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        if let Some(record) = self.textures.remove(texture) {
            record.texture.destroy();
            self.texture_bind_groups.clear();
        }
    }

    fn create_depth_buffer(&mut self, width: u32, height: u32) -> DepthBufferHandle {
        let view = self.allocate_depth(width, height);
        self.depth_buffers.insert(DepthRecord {
            view,
            width,
            height,
        })
    }

    fn resize_depth_buffer(&mut self, depth: DepthBufferHandle, width: u32, height: u32) {
        let view = self.allocate_depth(width, height);
        if let Some(record) = self.depth_buffers.get_mut(depth) {
            record.view = view;
            record.width = width;
            record.height = height;
        }
    }

    fn destroy_depth_buffer(&mut self, depth: DepthBufferHandle) {
        self.depth_buffers.remove(depth);
    }

    fn create_framebuffer(
        &mut self,
        colors: &[TextureHandle],
        depth: Option<DepthBufferHandle>,
    ) -> FrameBufferHandle {
        if colors.len() > 1 {
            log::warn!("Only the first color attachment is bound; got {}", colors.len());
        }
        self.framebuffers.insert(FrameBufferRecord {
            color: colors.first().copied(),
            depth,
        })
    }

    fn destroy_framebuffer(&mut self, framebuffer: FrameBufferHandle) {
        self.framebuffers.remove(framebuffer);
    }

    fn create_mesh(&mut self, data: &MeshData) -> MeshHandle {
        let vertex_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("MeshVertices"),
                contents: bytemuck::cast_slice(&data.vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });
        let index_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("MeshIndices"),
                contents: bytemuck::cast_slice(&data.indices),
                usage: wgpu::BufferUsages::INDEX,
            });
        self.meshes.insert(MeshRecord {
            vertex_buffer,
            index_buffer,
            index_count: data.indices.len() as u32,
        })
    }

    fn destroy_mesh(&mut self, mesh: MeshHandle) {
        self.meshes.remove(mesh);
    }

    fn create_program(&mut self, source: &ProgramSource) -> Result<ProgramHandle> {
        if let Some(entry) = source.missing_entry_point() {
            return Err(RenderError::ProgramLink {
                label: source.label.to_string(),
                message: format!("entry point '{entry}' not found"),
            });
        }
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&*source.label),
                source: wgpu::ShaderSource::Wgsl(source.source.clone()),
            });
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(RenderError::ShaderCompilation {
                label: source.label.to_string(),
                message: err.to_string(),
            });
        }
        Ok(self.programs.insert(ProgramRecord {
            label: source.label.to_string(),
            module,
            vertex_entry: source.vertex_entry,
            fragment_entry: source.fragment_entry,
            layout: source.layout,
        }))
    }

    fn destroy_program(&mut self, program: ProgramHandle) {
        self.programs.remove(program);
        self.pipelines.retain(|key, _| key.program != program);
        if self.program == Some(program) {
            self.program = None;
        }
    }

    fn set_render_target(&mut self, target: RenderTarget) {
        if self.current.target != target {
            self.close_segment();
            self.current.target = target;
        }
        self.viewport = None;
    }

    fn render_target(&self) -> RenderTarget {
        self.current.target
    }

    fn set_viewport(&mut self, rect: Rect) {
        if self.viewport != Some(rect) {
            self.viewport = Some(rect);
            self.current.ops.push(PassOp::Viewport(rect));
        }
    }

    fn set_clear_color(&mut self, color: Color) {
        self.clear_color = color;
    }

    fn clear(&mut self, flags: ClearFlags) {
        if !self.current.ops.is_empty() {
            let viewport = self.viewport;
            self.close_segment();
            if let Some(rect) = viewport {
                self.current.ops.push(PassOp::Viewport(rect));
            }
        }
        if flags.contains(ClearFlags::COLOR) {
            self.current.color_clear = Some(self.clear_color);
        }
        if flags.contains(ClearFlags::DEPTH) {
            self.current.depth_clear = true;
        }
    }

    fn set_blend_state(&mut self, blend: Option<BlendMode>) {
        self.blend = blend;
    }

    fn set_depth_test(&mut self, enabled: bool) {
        self.depth_test = enabled;
    }

    fn set_depth_mask(&mut self, write: bool) {
        self.depth_write = write;
    }

    fn set_color_mask(&mut self, write: bool) {
        self.color_write = write;
    }

    fn use_program(&mut self, program: ProgramHandle) {
        self.program = Some(program);
    }

    fn set_uniforms(&mut self, scope: UniformScope, data: &[u8]) {
        let offset = self.push_uniforms(data);
        match scope {
            UniformScope::Pass => self.pass_offset = offset,
            UniformScope::Instance => self.instance_offset = offset,
        }
    }

    fn bind_texture(&mut self, slot: u32, texture: TextureHandle) {
        match self.bound_textures.get_mut(slot as usize) {
            Some(bound) => *bound = Some(texture),
            None => log::warn!("Texture slot {slot} exceeds {MAX_TEXTURE_SLOTS} slots"),
        }
    }

    fn draw_mesh(&mut self, mesh: MeshHandle) {
        self.record_draw(Some(mesh));
    }

    fn draw_fullscreen(&mut self) {
        self.record_draw(None);
    }

    fn finish_frame(&mut self) {
        self.close_segment();
        let mut segments = std::mem::take(&mut self.segments);

        for segment in &segments {
            for op in &segment.ops {
                if let PassOp::Draw(draw) = op {
                    self.ensure_pipeline(draw.pipeline);
                    self.ensure_texture_bind_group(draw.textures);
                }
            }
        }

        self.ensure_uniform_capacity();
        self.queue
            .write_buffer(&self.uniform_buffer, 0, &self.uniform_staging);

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("HybridRendererEncoder"),
            });
        for segment in &segments {
            self.encode_segment(&mut encoder, segment);
        }
        self.queue.submit(std::iter::once(encoder.finish()));

        segments.clear();
        self.segments = segments;
        self.uniform_staging.truncate(UNIFORM_BLOCK_SIZE as usize);
        self.pass_offset = 0;
        self.instance_offset = 0;
        self.bound_textures = [None; MAX_TEXTURE_SLOTS];
        self.viewport = None;
    }
}
