use crate::error::Result;
use crate::math::Rect;

use super::types::{
    BlendMode, Capabilities, ClearFlags, Color, DepthBufferHandle, FrameBufferHandle,
    MeshHandle, ProgramHandle, ProgramSource, RenderTarget, TextureDescriptor, TextureHandle,
    UniformScope,
};
use super::vertex::MeshData;

/// The explicit graphics context every renderer stage draws through.
///
/// State set here (target, viewport, blend, masks, program) persists until changed, so
/// callers can rely on it between calls within a frame. Handles stay valid across
/// `resize_*` calls; only `destroy_*` invalidates them.
pub trait RenderBackend {
    fn capabilities(&self) -> Capabilities;

    /// Pixel size of [`RenderTarget::Output`].
    fn output_size(&self) -> (u32, u32);

    fn create_texture(&mut self, desc: &TextureDescriptor) -> TextureHandle;
    /// Reallocates storage. Contents are undefined afterwards.
    fn resize_texture(&mut self, texture: TextureHandle, width: u32, height: u32);
    /// Replaces the full contents; `data` is tightly packed rows in the texture's format.
    fn upload_texture(&mut self, texture: TextureHandle, data: &[u8]);
    fn destroy_texture(&mut self, texture: TextureHandle);

    fn create_depth_buffer(&mut self, width: u32, height: u32) -> DepthBufferHandle;
    fn resize_depth_buffer(&mut self, depth: DepthBufferHandle, width: u32, height: u32);
    fn destroy_depth_buffer(&mut self, depth: DepthBufferHandle);

    fn create_framebuffer(
        &mut self,
        colors: &[TextureHandle],
        depth: Option<DepthBufferHandle>,
    ) -> FrameBufferHandle;
    fn destroy_framebuffer(&mut self, framebuffer: FrameBufferHandle);

    fn create_mesh(&mut self, data: &MeshData) -> MeshHandle;
    fn destroy_mesh(&mut self, mesh: MeshHandle);

    fn create_program(&mut self, source: &ProgramSource) -> Result<ProgramHandle>;
    fn destroy_program(&mut self, program: ProgramHandle);

    fn set_render_target(&mut self, target: RenderTarget);
    fn render_target(&self) -> RenderTarget;
    fn set_viewport(&mut self, rect: Rect);
    fn set_clear_color(&mut self, color: Color);
    fn clear(&mut self, flags: ClearFlags);
    fn set_blend_state(&mut self, blend: Option<BlendMode>);
    fn set_depth_test(&mut self, enabled: bool);
    fn set_depth_mask(&mut self, write: bool);
    fn set_color_mask(&mut self, write: bool);

    fn use_program(&mut self, program: ProgramHandle);
    /// Uniform data for the bound program. Pass-scope data persists across instance draws.
    fn set_uniforms(&mut self, scope: UniformScope, data: &[u8]);
    fn bind_texture(&mut self, slot: u32, texture: TextureHandle);

    fn draw_mesh(&mut self, mesh: MeshHandle);
    /// Draws a screen-covering triangle with the bound program.
    fn draw_fullscreen(&mut self);

    /// Submits everything recorded since the previous call.
    fn finish_frame(&mut self);
}
