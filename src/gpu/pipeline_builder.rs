use super::types::{BlendMode, VertexLayout};
use super::vertex::Vertex;

pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Fixed-function blend for a [`BlendMode`]. `None` replaces the destination.
pub fn blend_state(blend: Option<BlendMode>) -> wgpu::BlendState {
    let component = |src_factor, dst_factor| wgpu::BlendComponent {
        src_factor,
        dst_factor,
        operation: wgpu::BlendOperation::Add,
    };
    match blend {
        None => wgpu::BlendState::REPLACE,
        Some(BlendMode::Alpha) => wgpu::BlendState::ALPHA_BLENDING,
        Some(BlendMode::Additive) => {
            let additive = component(wgpu::BlendFactor::One, wgpu::BlendFactor::One);
            wgpu::BlendState {
                color: additive,
                alpha: additive,
            }
        }
        Some(BlendMode::Multiply) => {
            let multiply = component(wgpu::BlendFactor::Dst, wgpu::BlendFactor::Zero);
            wgpu::BlendState {
                color: multiply,
                alpha: multiply,
            }
        }
    }
}

/// Depth comparison for the depth-test switch. Lit passes redraw the base pass's surfaces, so
/// equal depths must pass.
pub fn depth_compare(depth_test: bool) -> wgpu::CompareFunction {
    if depth_test {
        wgpu::CompareFunction::LessEqual
    } else {
        wgpu::CompareFunction::Always
    }
}

/// Builds the pipeline for one program under one combination of backend render state.
pub struct PipelineBuilder<'a> {
    device: &'a wgpu::Device,
    layout: &'a wgpu::PipelineLayout,
    module: &'a wgpu::ShaderModule,
    label: Option<&'a str>,
    vertex_entry: &'a str,
    fragment_entry: &'a str,
    vertex_layout: VertexLayout,
    color_target: Option<wgpu::ColorTargetState>,
    depth_stencil: Option<wgpu::DepthStencilState>,
}

impl<'a> PipelineBuilder<'a> {
    pub fn new(
        device: &'a wgpu::Device,
        layout: &'a wgpu::PipelineLayout,
        module: &'a wgpu::ShaderModule,
    ) -> Self {
        Self {
            device,
            layout,
            module,
            label: None,
            vertex_entry: "vs_main",
            fragment_entry: "fs_main",
            vertex_layout: VertexLayout::Mesh,
            color_target: None,
            depth_stencil: None,
        }
    }

    pub fn with_label(mut self, label: &'a str) -> Self {
        self.label = Some(label);
        self
    }

    pub fn with_entries(mut self, vertex: &'a str, fragment: &'a str) -> Self {
        self.vertex_entry = vertex;
        self.fragment_entry = fragment;
        self
    }

    /// Fullscreen programs take no vertex buffer and are never culled.
    pub fn with_vertex_layout(mut self, vertex_layout: VertexLayout) -> Self {
        self.vertex_layout = vertex_layout;
        self
    }

    pub fn with_color_target(
        mut self,
        format: wgpu::TextureFormat,
        blend: Option<BlendMode>,
        color_write: bool,
    ) -> Self {
        let write_mask = if color_write {
            wgpu::ColorWrites::ALL
        } else {
            wgpu::ColorWrites::empty()
        };
        self.color_target = Some(wgpu::ColorTargetState {
            format,
            blend: Some(blend_state(blend)),
            write_mask,
        });
        self
    }

    pub fn with_depth(mut self, depth_test: bool, depth_write: bool) -> Self {
        self.depth_stencil = Some(wgpu::DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled: depth_write,
            depth_compare: depth_compare(depth_test),
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        });
        self
    }

    pub fn build(self) -> wgpu::RenderPipeline {
        let (buffers, cull_mode) = match self.vertex_layout {
            VertexLayout::Mesh => (vec![Vertex::layout()], Some(wgpu::Face::Back)),
            VertexLayout::Fullscreen => (Vec::new(), None),
        };
        let targets = [self.color_target];

        self.device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: self.label,
                layout: Some(self.layout),
                vertex: wgpu::VertexState {
                    module: self.module,
                    entry_point: Some(self.vertex_entry),
                    buffers: &buffers,
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: self.module,
                    entry_point: Some(self.fragment_entry),
                    targets: &targets,
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    cull_mode,
                    ..Default::default()
                },
                depth_stencil: self.depth_stencil,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            })
    }
}
