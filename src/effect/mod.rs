//! Full-screen post effects run over the HDR ping-pong buffers.

pub mod blur;
pub mod composite;
pub mod fog;
pub mod hbao;
pub mod ssr;
pub mod tonemap;

use bytemuck::Pod;

use crate::camera::Camera;
use crate::gpu::{Capabilities, RenderBackend, RenderTarget, TextureHandle, UniformScope};
use crate::material::Shader;
use crate::render::hdr::HdrPingPong;

pub use blur::{BlurEffect, CenteredGaussianCurve, GaussianBlurPass};
pub use composite::CompositePasses;
pub use fog::FogEffect;
pub use hbao::{Hbao, HbaoSettings};
pub use ssr::{ScreenSpaceReflections, SsrSettings};
pub use tonemap::TonemapEffect;

/// What an effect may read and write while it runs.
pub struct EffectContext<'a> {
    pub ctx: &'a mut dyn RenderBackend,
    pub hdr: &'a mut HdrPingPong,
    pub camera: &'a Camera,
    pub normal_depth: Option<TextureHandle>,
    pub render_size: (u32, u32),
}

impl EffectContext<'_> {
    /// Latest full-resolution result.
    pub fn hdr_source(&self) -> Option<TextureHandle> {
        self.hdr.back_texture()
    }

    pub fn hdr_target(&self) -> Option<RenderTarget> {
        self.hdr.front_target()
    }

    /// For effects that need more than one full-resolution pass.
    pub fn swap_hdr(&mut self) {
        self.hdr.swap();
    }
}

pub trait Effect {
    fn name(&self) -> &str;

    fn is_supported(&self, _capabilities: &Capabilities) -> bool {
        true
    }

    fn needs_normal_depth(&self) -> bool {
        false
    }

    /// The result is already gamma corrected, so the composite only copies.
    fn outputs_gamma(&self) -> bool {
        false
    }

    /// Reads [`EffectContext::hdr_source`] and writes [`EffectContext::hdr_target`]. Returns the
    /// number of draws issued, zero when the HDR target was left untouched.
    fn render(&mut self, fx: &mut EffectContext<'_>, dt: f32) -> usize;

    fn dispose(&mut self, _ctx: &mut dyn RenderBackend) {}
}

/// Effects that produce an occlusion texture for the lit passes instead of touching the HDR
/// buffers. Rendered before lighting.
pub trait AmbientOcclusion: Effect {
    fn ao_texture(&self) -> Option<TextureHandle>;
}

/// Binds `shader`, its uniforms and textures (slot = index) and draws a full-screen triangle.
pub(crate) fn draw_fullscreen_pass<U: Pod>(
    ctx: &mut dyn RenderBackend,
    shader: &Shader,
    uniforms: &U,
    textures: &[Option<TextureHandle>],
) -> bool {
    if !shader.bind(ctx) {
        return false;
    }
    ctx.set_uniforms(UniformScope::Pass, bytemuck::bytes_of(uniforms));
    for (slot, texture) in textures.iter().enumerate() {
        if let Some(texture) = texture {
            ctx.bind_texture(slot as u32, *texture);
        }
    }
    ctx.draw_fullscreen();
    true
}
