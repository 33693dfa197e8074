use crate::gpu::{
    DepthBuffer, FrameBuffer, RenderBackend, RenderTarget, Texture2D, TextureFilter,
    TextureFormat, TextureHandle, WrapMode,
};

/// One HDR colour texture and the framebuffer that pairs it with the shared depth buffer.
#[derive(Debug)]
pub struct HdrBuffers {
    texture: Texture2D,
    fbo_depth: FrameBuffer,
}

impl HdrBuffers {
    fn new(label: &'static str, format: TextureFormat) -> Self {
        Self {
            texture: Texture2D::new(label, format, TextureFilter::Bilinear, WrapMode::Clamp),
            fbo_depth: FrameBuffer::new(),
        }
    }

    fn init(&mut self, ctx: &mut dyn RenderBackend, width: u32, height: u32, depth: &DepthBuffer) -> bool {
        let reallocated = self.texture.init_empty(ctx, width, height);
        self.fbo_depth.init(ctx, &[&self.texture], Some(depth));
        reallocated
    }

    pub fn texture(&self) -> Option<TextureHandle> {
        self.texture.handle()
    }

    pub fn target(&self) -> Option<RenderTarget> {
        self.fbo_depth.target()
    }

    pub fn size(&self) -> (u32, u32) {
        self.texture.size()
    }

    fn dispose(&mut self, ctx: &mut dyn RenderBackend) {
        self.fbo_depth.dispose(ctx);
        self.texture.dispose(ctx);
    }
}

/// Front/back HDR pair. Passes draw into the front and effects read the back, so a swap hands
/// the last result to the next stage without copying.
#[derive(Debug)]
pub struct HdrPingPong {
    front: HdrBuffers,
    back: HdrBuffers,
    depth: DepthBuffer,
}

impl HdrPingPong {
    pub fn new(format: TextureFormat) -> Self {
        Self {
            front: HdrBuffers::new("HdrFront", format),
            back: HdrBuffers::new("HdrBack", format),
            depth: DepthBuffer::new(),
        }
    }

    /// Returns `true` when anything was (re)allocated.
    pub fn resize(&mut self, ctx: &mut dyn RenderBackend, width: u32, height: u32) -> bool {
        let depth = self.depth.init(ctx, width, height);
        let front = self.front.init(ctx, width, height, &self.depth);
        let back = self.back.init(ctx, width, height, &self.depth);
        if depth || front || back {
            log::info!("HDR buffers resized to {}x{}", width, height);
        }
        depth || front || back
    }

    pub fn swap(&mut self) {
        std::mem::swap(&mut self.front, &mut self.back);
    }

    pub fn front(&self) -> &HdrBuffers {
        &self.front
    }

    pub fn back(&self) -> &HdrBuffers {
        &self.back
    }

    pub fn front_target(&self) -> Option<RenderTarget> {
        self.front.target()
    }

    pub fn front_texture(&self) -> Option<TextureHandle> {
        self.front.texture()
    }

    pub fn back_texture(&self) -> Option<TextureHandle> {
        self.back.texture()
    }

    pub fn depth(&self) -> &DepthBuffer {
        &self.depth
    }

    pub fn size(&self) -> (u32, u32) {
        self.front.size()
    }

    pub fn dispose(&mut self, ctx: &mut dyn RenderBackend) {
        self.front.dispose(ctx);
        self.back.dispose(ctx);
        self.depth.dispose(ctx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::RecordingBackend;

    #[test]
    fn both_targets_share_one_depth_buffer() {
        let mut ctx = RecordingBackend::new(64, 64);
        let mut hdr = HdrPingPong::new(TextureFormat::Rgba16Float);
        assert!(hdr.resize(&mut ctx, 64, 32));

        let depth = hdr.depth().handle();
        for target in [hdr.front_target(), hdr.back().target()] {
            let Some(RenderTarget::FrameBuffer(fbo)) = target else {
                panic!("hdr target not allocated");
            };
            let (_, attached) = ctx.framebuffer_attachments(fbo).unwrap();
            assert_eq!(attached, depth);
        }
    }

    #[test]
    fn resize_to_same_size_allocates_nothing() {
        let mut ctx = RecordingBackend::new(64, 64);
        let mut hdr = HdrPingPong::new(TextureFormat::Rgba16Float);
        hdr.resize(&mut ctx, 64, 64);
        let before = ctx.counters();
        assert!(!hdr.resize(&mut ctx, 64, 64));
        assert_eq!(ctx.counters(), before);
    }

    #[test]
    fn swap_exchanges_front_and_back() {
        let mut ctx = RecordingBackend::new(8, 8);
        let mut hdr = HdrPingPong::new(TextureFormat::Rgba16Float);
        hdr.resize(&mut ctx, 8, 8);
        let (front, back) = (hdr.front_texture(), hdr.back_texture());
        hdr.swap();
        assert_eq!(hdr.front_texture(), back);
        assert_eq!(hdr.back_texture(), front);
    }
}
