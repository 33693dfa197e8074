use bytemuck::{Pod, Zeroable};

use crate::error::Result;
use crate::gpu::{ProgramSource, RenderBackend, TextureHandle};
use crate::material::Shader;
use crate::settings::DebugSettings;

use super::draw_fullscreen_pass;

const COPY_SHADER: &str = concat!(
    include_str!("../shader/fullscreen.wgsl"),
    include_str!("../shader/copy.wgsl")
);

pub const DEFAULT_GAMMA: f32 = 2.2;

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct CopyUniforms {
    params: [f32; 4],
}

/// Plain copy, gamma-correcting copy and the single-channel debug view.
#[derive(Debug)]
pub struct CompositePasses {
    copy: Shader,
    gamma: Shader,
    single_channel: Shader,
    gamma_value: f32,
}

impl CompositePasses {
    pub fn new(ctx: &mut dyn RenderBackend, debug: &DebugSettings) -> Result<Self> {
        let compile = |ctx: &mut dyn RenderBackend, label: &'static str, entry: &'static str| {
            Shader::compile(ctx, &ProgramSource::fullscreen(label, COPY_SHADER, entry), debug)
        };
        Ok(Self {
            copy: compile(ctx, "copy", "fs_copy")?,
            gamma: compile(ctx, "gamma_copy", "fs_gamma")?,
            single_channel: compile(ctx, "single_channel_copy", "fs_single_channel")?,
            gamma_value: DEFAULT_GAMMA,
        })
    }

    pub fn gamma(&self) -> f32 {
        self.gamma_value
    }

    pub fn set_gamma(&mut self, gamma: f32) {
        self.gamma_value = gamma.max(f32::EPSILON);
    }

    /// Copies `source` into the bound target.
    pub fn copy(&self, ctx: &mut dyn RenderBackend, source: TextureHandle) -> bool {
        draw_fullscreen_pass(ctx, &self.copy, &self.uniforms(), &[Some(source)])
    }

    pub fn gamma_correct(&self, ctx: &mut dyn RenderBackend, source: TextureHandle) -> bool {
        draw_fullscreen_pass(ctx, &self.gamma, &self.uniforms(), &[Some(source)])
    }

    /// Shows the red channel of `source` as greyscale.
    pub fn single_channel(&self, ctx: &mut dyn RenderBackend, source: TextureHandle) -> bool {
        draw_fullscreen_pass(ctx, &self.single_channel, &self.uniforms(), &[Some(source)])
    }

    pub fn dispose(&mut self, ctx: &mut dyn RenderBackend) {
        self.copy.dispose(ctx);
        self.gamma.dispose(ctx);
        self.single_channel.dispose(ctx);
    }

    fn uniforms(&self) -> CopyUniforms {
        CopyUniforms {
            params: [1.0 / self.gamma_value, 0.0, 0.0, 0.0],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::RecordingBackend;

    #[test]
    fn lenient_compile_failure_skips_the_draw() {
        let mut ctx = RecordingBackend::new(4, 4);
        ctx.fail_programs_matching("gamma");
        let passes = CompositePasses::new(&mut ctx, &DebugSettings::lenient()).unwrap();
        assert!(!passes.gamma_correct(&mut ctx, TextureHandle::new(0)));
        assert!(passes.copy(&mut ctx, TextureHandle::new(0)));
        assert_eq!(ctx.draws().count(), 1);
    }
}
