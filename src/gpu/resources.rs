use std::borrow::Cow;

use super::backend::RenderBackend;
use super::types::{
    DepthBufferHandle, FrameBufferHandle, RenderTarget, TextureDescriptor, TextureFilter,
    TextureFormat, TextureHandle, WrapMode,
};

/// Lazily allocated 2D texture. Storage is (re)allocated only when the requested size
/// differs from the current one.
#[derive(Debug)]
pub struct Texture2D {
    label: Cow<'static, str>,
    format: TextureFormat,
    filter: TextureFilter,
    wrap: WrapMode,
    handle: Option<TextureHandle>,
    width: u32,
    height: u32,
}

impl Texture2D {
    pub fn new(
        label: impl Into<Cow<'static, str>>,
        format: TextureFormat,
        filter: TextureFilter,
        wrap: WrapMode,
    ) -> Self {
        Self {
            label: label.into(),
            format,
            filter,
            wrap,
            handle: None,
            width: 0,
            height: 0,
        }
    }

    /// Returns `true` when storage was (re)allocated.
    pub fn init_empty(&mut self, ctx: &mut dyn RenderBackend, width: u32, height: u32) -> bool {
        let (width, height) = (width.max(1), height.max(1));
        match self.handle {
            Some(_) if self.width == width && self.height == height => false,
            Some(handle) => {
                ctx.resize_texture(handle, width, height);
                self.width = width;
                self.height = height;
                true
            }
            None => {
                let handle = ctx.create_texture(&TextureDescriptor {
                    label: self.label.clone(),
                    width,
                    height,
                    format: self.format,
                    filter: self.filter,
                    wrap: self.wrap,
                });
                self.handle = Some(handle);
                self.width = width;
                self.height = height;
                true
            }
        }
    }

    pub fn upload_data(&mut self, ctx: &mut dyn RenderBackend, width: u32, height: u32, data: &[u8]) {
        self.init_empty(ctx, width, height);
        if let Some(handle) = self.handle {
            ctx.upload_texture(handle, data);
        }
    }

    pub fn handle(&self) -> Option<TextureHandle> {
        self.handle
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn format(&self) -> TextureFormat {
        self.format
    }

    pub fn dispose(&mut self, ctx: &mut dyn RenderBackend) {
        if let Some(handle) = self.handle.take() {
            ctx.destroy_texture(handle);
        }
        self.width = 0;
        self.height = 0;
    }
}

#[derive(Debug, Default)]
pub struct DepthBuffer {
    handle: Option<DepthBufferHandle>,
    width: u32,
    height: u32,
}

impl DepthBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn init(&mut self, ctx: &mut dyn RenderBackend, width: u32, height: u32) -> bool {
        let (width, height) = (width.max(1), height.max(1));
        match self.handle {
            Some(_) if self.width == width && self.height == height => return false,
            Some(handle) => ctx.resize_depth_buffer(handle, width, height),
            None => self.handle = Some(ctx.create_depth_buffer(width, height)),
        }
        self.width = width;
        self.height = height;
        true
    }

    pub fn handle(&self) -> Option<DepthBufferHandle> {
        self.handle
    }

    pub fn dispose(&mut self, ctx: &mut dyn RenderBackend) {
        if let Some(handle) = self.handle.take() {
            ctx.destroy_depth_buffer(handle);
        }
    }
}

/// Binds color attachments and an optional depth buffer into one render target. Handles
/// survive resizes, so the binding is created once and reused.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    handle: Option<FrameBufferHandle>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn init(
        &mut self,
        ctx: &mut dyn RenderBackend,
        colors: &[&Texture2D],
        depth: Option<&DepthBuffer>,
    ) -> Option<FrameBufferHandle> {
        if self.handle.is_none() {
            let color_handles: Vec<TextureHandle> =
                colors.iter().filter_map(|texture| texture.handle()).collect();
            if color_handles.len() != colors.len() {
                log::warn!("Framebuffer attachments must be allocated before binding");
                return None;
            }
            let depth_handle = depth.and_then(DepthBuffer::handle);
            self.handle = Some(ctx.create_framebuffer(&color_handles, depth_handle));
        }
        self.handle
    }

    pub fn handle(&self) -> Option<FrameBufferHandle> {
        self.handle
    }

    /// `None` until [`FrameBuffer::init`] has bound the attachments.
    pub fn target(&self) -> Option<RenderTarget> {
        self.handle.map(RenderTarget::FrameBuffer)
    }

    pub fn dispose(&mut self, ctx: &mut dyn RenderBackend) {
        if let Some(handle) = self.handle.take() {
            ctx.destroy_framebuffer(handle);
        }
    }
}
