use bytemuck::{Pod, Zeroable};

use crate::error::Result;
use crate::gpu::{ProgramSource, RenderBackend};
use crate::material::Shader;
use crate::settings::DebugSettings;

use super::composite::DEFAULT_GAMMA;
use super::{draw_fullscreen_pass, Effect, EffectContext};

const TONEMAP_SHADER: &str = concat!(
    include_str!("../shader/fullscreen.wgsl"),
    include_str!("../shader/tonemap.wgsl")
);

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct TonemapUniforms {
    params: [f32; 4],
}

/// Reinhard tone mapping followed by gamma correction.
#[derive(Debug)]
pub struct TonemapEffect {
    shader: Shader,
    pub exposure: f32,
}

impl TonemapEffect {
    pub fn new(ctx: &mut dyn RenderBackend, debug: &DebugSettings) -> Result<Self> {
        let source = ProgramSource::fullscreen("tonemap", TONEMAP_SHADER, "fs_tonemap");
        Ok(Self {
            shader: Shader::compile(ctx, &source, debug)?,
            exposure: 1.0,
        })
    }

    pub fn with_exposure(mut self, exposure: f32) -> Self {
        self.exposure = exposure;
        self
    }
}

impl Effect for TonemapEffect {
    fn name(&self) -> &str {
        "tonemap"
    }

    fn outputs_gamma(&self) -> bool {
        true
    }

    fn render(&mut self, fx: &mut EffectContext<'_>, _dt: f32) -> usize {
        let Some(source) = fx.hdr_source() else {
            return 0;
        };
        let uniforms = TonemapUniforms {
            params: [self.exposure, 1.0 / DEFAULT_GAMMA, 0.0, 0.0],
        };
        let Some(target) = fx.hdr_target() else {
            return 0;
        };
        fx.ctx.set_render_target(target);
        usize::from(draw_fullscreen_pass(fx.ctx, &self.shader, &uniforms, &[Some(source)]))
    }

    fn dispose(&mut self, ctx: &mut dyn RenderBackend) {
        self.shader.dispose(ctx);
    }
}
