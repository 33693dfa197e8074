use bytemuck::{Pod, Zeroable};
use glam::Vec3;

use crate::error::Result;
use crate::gpu::{ProgramSource, RenderBackend};
use crate::material::Shader;
use crate::settings::DebugSettings;

use super::{draw_fullscreen_pass, Effect, EffectContext};

const FOG_SHADER: &str = concat!(
    include_str!("../shader/fullscreen.wgsl"),
    include_str!("../shader/fog.wgsl")
);

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct FogUniforms {
    tint: [f32; 4],
    params: [f32; 4],
}

/// Exponential distance fog read from the normal/depth buffer.
#[derive(Debug)]
pub struct FogEffect {
    shader: Shader,
    pub density: f32,
    pub tint: Vec3,
    pub start_distance: f32,
}

impl FogEffect {
    pub fn new(ctx: &mut dyn RenderBackend, debug: &DebugSettings) -> Result<Self> {
        let source = ProgramSource::fullscreen("fog", FOG_SHADER, "fs_fog");
        Ok(Self {
            shader: Shader::compile(ctx, &source, debug)?,
            density: 0.001,
            tint: Vec3::ONE,
            start_distance: 0.0,
        })
    }

    pub fn with_density(mut self, density: f32) -> Self {
        self.density = density;
        self
    }

    pub fn with_tint(mut self, tint: Vec3) -> Self {
        self.tint = tint;
        self
    }

    pub fn with_start_distance(mut self, start_distance: f32) -> Self {
        self.start_distance = start_distance;
        self
    }
}

impl Effect for FogEffect {
    fn name(&self) -> &str {
        "fog"
    }

    fn needs_normal_depth(&self) -> bool {
        true
    }

    fn render(&mut self, fx: &mut EffectContext<'_>, _dt: f32) -> usize {
        let Some(source) = fx.hdr_source() else {
            return 0;
        };
        let uniforms = FogUniforms {
            tint: self.tint.extend(1.0).to_array(),
            params: [
                self.density,
                self.start_distance,
                fx.camera.far_distance(),
                0.0,
            ],
        };
        let Some(target) = fx.hdr_target() else {
            return 0;
        };
        fx.ctx.set_render_target(target);
        let drawn = draw_fullscreen_pass(
            fx.ctx,
            &self.shader,
            &uniforms,
            &[Some(source), fx.normal_depth],
        );
        usize::from(drawn)
    }

    fn dispose(&mut self, ctx: &mut dyn RenderBackend) {
        self.shader.dispose(ctx);
    }
}
