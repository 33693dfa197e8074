use crate::gpu::{
    Capabilities, Color, DepthBuffer, FrameBuffer, RenderBackend, RenderTarget, Texture2D,
    TextureFilter, TextureFormat, TextureHandle, WrapMode,
};

/// Cleared value: a normal facing the camera at maximum depth.
pub const NORMAL_DEPTH_CLEAR: Color = Color::BLUE;

/// View-space normal and linear depth in one target.
///
/// `rg` holds the normal's xy remapped to 0..1, `b` the view depth divided by the camera's far
/// distance. Requests for a full G-buffer are served by this target too.
#[derive(Debug)]
pub struct GBuffer {
    normal_depth: Texture2D,
    fbo: FrameBuffer,
}

impl GBuffer {
    pub fn new(capabilities: &Capabilities) -> Self {
        let format = if capabilities.float_render_targets {
            TextureFormat::Rgba16Float
        } else {
            TextureFormat::Rgba8Unorm
        };
        Self {
            normal_depth: Texture2D::new("NormalDepth", format, TextureFilter::Nearest, WrapMode::Clamp),
            fbo: FrameBuffer::new(),
        }
    }

    /// Returns `true` when storage was (re)allocated.
    pub fn init(&mut self, ctx: &mut dyn RenderBackend, width: u32, height: u32, depth: &DepthBuffer) -> bool {
        let reallocated = self.normal_depth.init_empty(ctx, width, height);
        self.fbo.init(ctx, &[&self.normal_depth], Some(depth));
        reallocated
    }

    pub fn normal_depth(&self) -> Option<TextureHandle> {
        self.normal_depth.handle()
    }

    pub fn format(&self) -> TextureFormat {
        self.normal_depth.format()
    }

    pub fn target(&self) -> Option<RenderTarget> {
        self.fbo.target()
    }

    pub fn size(&self) -> (u32, u32) {
        self.normal_depth.size()
    }

    pub fn dispose(&mut self, ctx: &mut dyn RenderBackend) {
        self.fbo.dispose(ctx);
        self.normal_depth.dispose(ctx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::RecordingBackend;

    #[test]
    fn falls_back_to_unorm_without_float_targets() {
        let caps = Capabilities {
            float_render_targets: false,
            ..Capabilities::default()
        };
        assert_eq!(GBuffer::new(&caps).format(), TextureFormat::Rgba8Unorm);
        assert_eq!(GBuffer::new(&Capabilities::default()).format(), TextureFormat::Rgba16Float);
    }

    #[test]
    fn init_is_idempotent_for_a_size() {
        let mut ctx = RecordingBackend::new(32, 32);
        let mut depth = DepthBuffer::new();
        depth.init(&mut ctx, 32, 32);
        let mut gbuffer = GBuffer::new(&ctx.capabilities());
        assert!(gbuffer.init(&mut ctx, 32, 32, &depth));
        assert!(!gbuffer.init(&mut ctx, 32, 32, &depth));
        assert_eq!(ctx.counters().framebuffers_created, 1);
        assert!(matches!(gbuffer.target(), Some(RenderTarget::FrameBuffer(_))));
    }
}
