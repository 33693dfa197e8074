//! Headless backend that records every command instead of talking to a GPU.

use crate::error::{RenderError, Result};
use crate::math::Rect;

use super::backend::RenderBackend;
use super::handle::ResourcePool;
use super::types::{
    BlendMode, Capabilities, ClearFlags, Color, DepthBufferHandle, FrameBufferHandle,
    MeshHandle, ProgramHandle, ProgramSource, RenderTarget, TextureDescriptor, TextureHandle,
    UniformScope,
};
use super::vertex::MeshData;

#[derive(Debug, Clone, PartialEq)]
pub struct DrawCall {
    pub target: RenderTarget,
    pub viewport: Rect,
    pub program: Option<ProgramHandle>,
    /// `None` for fullscreen triangles.
    pub mesh: Option<MeshHandle>,
    pub blend: Option<BlendMode>,
    pub depth_test: bool,
    pub depth_write: bool,
    pub color_write: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SetRenderTarget(RenderTarget),
    SetViewport(Rect),
    Clear {
        target: RenderTarget,
        flags: ClearFlags,
        color: Color,
    },
    UseProgram(ProgramHandle),
    SetUniforms {
        scope: UniformScope,
        size: usize,
    },
    BindTexture {
        slot: u32,
        texture: TextureHandle,
    },
    Draw(DrawCall),
    FinishFrame,
}

/// Running totals of storage allocations, used to verify steady-state frames allocate nothing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocationCounters {
    pub textures_created: usize,
    pub texture_reallocations: usize,
    pub depth_buffers_created: usize,
    pub depth_reallocations: usize,
    pub framebuffers_created: usize,
    pub programs_created: usize,
    pub meshes_created: usize,
}

impl AllocationCounters {
    pub fn total(&self) -> usize {
        self.textures_created
            + self.texture_reallocations
            + self.depth_buffers_created
            + self.depth_reallocations
            + self.framebuffers_created
            + self.programs_created
            + self.meshes_created
    }
}

#[derive(Debug, Clone)]
struct FrameBufferRecord {
    colors: Vec<TextureHandle>,
    depth: Option<DepthBufferHandle>,
}

pub struct RecordingBackend {
    capabilities: Capabilities,
    output_size: (u32, u32),
    textures: ResourcePool<TextureDescriptor>,
    depth_buffers: ResourcePool<(u32, u32)>,
    framebuffers: ResourcePool<FrameBufferRecord>,
    programs: ResourcePool<String>,
    meshes: ResourcePool<usize>,
    failing_programs: Vec<String>,
    counters: AllocationCounters,
    commands: Vec<Command>,
    target: RenderTarget,
    viewport: Rect,
    clear_color: Color,
    blend: Option<BlendMode>,
    depth_test: bool,
    depth_write: bool,
    color_write: bool,
    program: Option<ProgramHandle>,
}

impl RecordingBackend {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            capabilities: Capabilities::default(),
            output_size: (width.max(1), height.max(1)),
            textures: ResourcePool::new(),
            depth_buffers: ResourcePool::new(),
            framebuffers: ResourcePool::new(),
            programs: ResourcePool::new(),
            meshes: ResourcePool::new(),
            failing_programs: Vec::new(),
            counters: AllocationCounters::default(),
            commands: Vec::new(),
            target: RenderTarget::Output,
            viewport: Rect::new(0, 0, width.max(1), height.max(1)),
            clear_color: Color::BLACK,
            blend: None,
            depth_test: true,
            depth_write: true,
            color_write: true,
            program: None,
        }
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn set_output_size(&mut self, width: u32, height: u32) {
        self.output_size = (width.max(1), height.max(1));
    }

    /// Programs whose label contains `pattern` fail to compile.
    pub fn fail_programs_matching(&mut self, pattern: impl Into<String>) {
        self.failing_programs.push(pattern.into());
    }

    pub fn counters(&self) -> AllocationCounters {
        self.counters
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    pub fn draws(&self) -> impl Iterator<Item = &DrawCall> {
        self.commands.iter().filter_map(|command| match command {
            Command::Draw(draw) => Some(draw),
            _ => None,
        })
    }

    pub fn draws_to(&self, target: RenderTarget) -> impl Iterator<Item = &DrawCall> {
        self.draws().filter(move |draw| draw.target == target)
    }

    pub fn program_label(&self, program: ProgramHandle) -> Option<&str> {
        self.programs.get(program).map(String::as_str)
    }

    pub fn texture_descriptor(&self, texture: TextureHandle) -> Option<&TextureDescriptor> {
        self.textures.get(texture)
    }

    pub fn framebuffer_attachments(
        &self,
        framebuffer: FrameBufferHandle,
    ) -> Option<(&[TextureHandle], Option<DepthBufferHandle>)> {
        self.framebuffers
            .get(framebuffer)
            .map(|record| (record.colors.as_slice(), record.depth))
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn live_framebuffers(&self) -> usize {
        self.framebuffers.len()
    }

    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }

    fn record_draw(&mut self, mesh: Option<MeshHandle>) {
        let draw = DrawCall {
            target: self.target,
            viewport: self.viewport,
            program: self.program,
            mesh,
            blend: self.blend,
            depth_test: self.depth_test,
            depth_write: self.depth_write,
            color_write: self.color_write,
        };
        self.commands.push(Command::Draw(draw));
    }

    fn target_size(&self, target: RenderTarget) -> (u32, u32) {
        match target {
            RenderTarget::Output => self.output_size,
            RenderTarget::FrameBuffer(handle) => self
                .framebuffers
                .get(handle)
                .and_then(|record| {
                    record
                        .colors
                        .first()
                        .and_then(|color| self.textures.get(*color))
                        .map(|desc| (desc.width, desc.height))
                        .or_else(|| record.depth.and_then(|d| self.depth_buffers.get(d).copied()))
                })
                .unwrap_or((1, 1)),
        }
    }
}

impl RenderBackend for RecordingBackend {
    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn output_size(&self) -> (u32, u32) {
        self.output_size
    }

    fn create_texture(&mut self, desc: &TextureDescriptor) -> TextureHandle {
        self.counters.textures_created += 1;
        self.textures.insert(desc.clone())
    }

    fn resize_texture(&mut self, texture: TextureHandle, width: u32, height: u32) {
        if let Some(desc) = self.textures.get_mut(texture) {
            desc.width = width;
            desc.height = height;
            self.counters.texture_reallocations += 1;
        }
    }

    fn upload_texture(&mut self, texture: TextureHandle, data: &[u8]) {
        if let Some(desc) = self.textures.get(texture) {
            let expected = (desc.width * desc.height * desc.format.bytes_per_pixel()) as usize;
            if data.len() != expected {
                log::warn!(
                    "Texture '{}' upload of {} bytes, expected {}",
                    desc.label,
                    data.len(),
                    expected
                );
            }
        }
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        self.textures.remove(texture);
    }

    fn create_depth_buffer(&mut self, width: u32, height: u32) -> DepthBufferHandle {
        self.counters.depth_buffers_created += 1;
        self.depth_buffers.insert((width, height))
    }

    fn resize_depth_buffer(&mut self, depth: DepthBufferHandle, width: u32, height: u32) {
        if let Some(size) = self.depth_buffers.get_mut(depth) {
            *size = (width, height);
            self.counters.depth_reallocations += 1;
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
        self.counters.framebuffers_created += 1;
        self.framebuffers.insert(FrameBufferRecord {
            colors: colors.to_vec(),
            depth,
        })
    }

    fn destroy_framebuffer(&mut self, framebuffer: FrameBufferHandle) {
        self.framebuffers.remove(framebuffer);
    }

    fn create_mesh(&mut self, data: &MeshData) -> MeshHandle {
        self.counters.meshes_created += 1;
        self.meshes.insert(data.indices.len())
    }

    fn destroy_mesh(&mut self, mesh: MeshHandle) {
        self.meshes.remove(mesh);
    }

    fn create_program(&mut self, source: &ProgramSource) -> Result<ProgramHandle> {
        if self
            .failing_programs
            .iter()
            .any(|pattern| source.label.contains(pattern.as_str()))
        {
            return Err(RenderError::ShaderCompilation {
                label: source.label.to_string(),
                message: format!("entry point '{}' rejected", source.fragment_entry),
            });
        }
        if let Some(entry) = source.missing_entry_point() {
            return Err(RenderError::ProgramLink {
                label: source.label.to_string(),
                message: format!("entry point '{entry}' not found"),
            });
        }
        self.counters.programs_created += 1;
        Ok(self.programs.insert(source.label.to_string()))
    }

    fn destroy_program(&mut self, program: ProgramHandle) {
        self.programs.remove(program);
        if self.program == Some(program) {
            self.program = None;
        }
    }

    fn set_render_target(&mut self, target: RenderTarget) {
        self.target = target;
        let (width, height) = self.target_size(target);
        self.viewport = Rect::new(0, 0, width, height);
        self.commands.push(Command::SetRenderTarget(target));
    }

    fn render_target(&self) -> RenderTarget {
        self.target
    }

    fn set_viewport(&mut self, rect: Rect) {
        self.viewport = rect;
        self.commands.push(Command::SetViewport(rect));
    }

    fn set_clear_color(&mut self, color: Color) {
        self.clear_color = color;
    }

    fn clear(&mut self, flags: ClearFlags) {
        self.commands.push(Command::Clear {
            target: self.target,
            flags,
            color: self.clear_color,
        });
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
        self.commands.push(Command::UseProgram(program));
    }

    fn set_uniforms(&mut self, scope: UniformScope, data: &[u8]) {
        self.commands.push(Command::SetUniforms {
            scope,
            size: data.len(),
        });
    }

    fn bind_texture(&mut self, slot: u32, texture: TextureHandle) {
        self.commands.push(Command::BindTexture { slot, texture });
    }

    fn draw_mesh(&mut self, mesh: MeshHandle) {
        self.record_draw(Some(mesh));
    }

    fn draw_fullscreen(&mut self) {
        self.record_draw(None);
    }

    fn finish_frame(&mut self) {
        self.commands.push(Command::FinishFrame);
    }
}
