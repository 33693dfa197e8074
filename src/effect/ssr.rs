use bytemuck::{Pod, Zeroable};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::gpu::{
    Capabilities, ClearFlags, Color, FrameBuffer, ProgramSource, RenderBackend, Texture2D,
    TextureFilter, TextureFormat, TextureHandle, WrapMode,
};
use crate::material::Shader;
use crate::settings::DebugSettings;

use super::hbao::{dither_data, DITHER_SEED, DITHER_SIZE};
use super::{draw_fullscreen_pass, Effect, EffectContext};

const SSR_SHADER: &str = concat!(
    include_str!("../shader/fullscreen.wgsl"),
    include_str!("../shader/ssr.wgsl")
);
const SSR_COMPOSITE_SHADER: &str = concat!(
    include_str!("../shader/fullscreen.wgsl"),
    include_str!("../shader/ssr_composite.wgsl")
);

pub const MAX_SAMPLES: u32 = 64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SsrSettings {
    pub num_samples: u32,
    /// Pixels skipped per sample.
    pub step_size: f32,
    /// View-space length of the traced ray.
    pub max_distance: f32,
    /// Trace resolution relative to the render size, at most 1.
    pub scale: f32,
    pub strength: f32,
}

impl Default for SsrSettings {
    fn default() -> Self {
        Self::with_samples(5)
    }
}

impl SsrSettings {
    pub fn with_samples(num_samples: u32) -> Self {
        let num_samples = num_samples.clamp(1, MAX_SAMPLES);
        Self {
            num_samples,
            step_size: (500.0 / num_samples as f32).max(1.0),
            max_distance: 500.0,
            scale: 0.5,
            strength: 1.0,
        }
    }

    pub fn validate(mut self) -> Self {
        if !(1..=MAX_SAMPLES).contains(&self.num_samples) {
            log::warn!("SSR sample count {} outside 1..={}", self.num_samples, MAX_SAMPLES);
            self.num_samples = self.num_samples.clamp(1, MAX_SAMPLES);
        }
        if self.step_size < 1.0 {
            self.step_size = 1.0;
        }
        if self.max_distance <= 0.0 {
            self.max_distance = Self::default().max_distance;
        }
        self.scale = clamp_scale(self.scale).unwrap_or(Self::default().scale);
        self
    }
}

fn clamp_scale(scale: f32) -> Option<f32> {
    (scale > 0.0).then(|| scale.min(1.0))
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct SsrUniforms {
    projection: [[f32; 4]; 4],
    inverse_projection: [[f32; 4]; 4],
    dither_scale: [f32; 2],
    source_size: [f32; 2],
    step_size: f32,
    max_distance: f32,
    camera_far: f32,
    num_samples: u32,
    thickness: f32,
    _pad: [f32; 3],
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct SsrCompositeUniforms {
    params: [f32; 4],
}

/// Screen-space reflections traced from the normal/depth buffer into a reduced-resolution
/// texture, then added over the HDR image.
pub struct ScreenSpaceReflections {
    settings: SsrSettings,
    trace_pass: Shader,
    composite_pass: Shader,
    dither_texture: Texture2D,
    ssr_texture: Texture2D,
    fbo: FrameBuffer,
    dither_scale: [f32; 2],
}

impl ScreenSpaceReflections {
    pub fn new(
        ctx: &mut dyn RenderBackend,
        settings: SsrSettings,
        debug: &DebugSettings,
    ) -> Result<Self> {
        let settings = settings.validate();
        let trace_pass = Shader::compile(
            ctx,
            &ProgramSource::fullscreen("ssr", SSR_SHADER, "fs_ssr"),
            debug,
        )?;
        let composite_pass = Shader::compile(
            ctx,
            &ProgramSource::fullscreen("ssr_composite", SSR_COMPOSITE_SHADER, "fs_ssr_composite"),
            debug,
        )?;

        let mut rng = SmallRng::seed_from_u64(DITHER_SEED);
        let mut dither_texture = Texture2D::new(
            "SsrDither",
            TextureFormat::Rgba8Unorm,
            TextureFilter::Nearest,
            WrapMode::Repeat,
        );
        dither_texture.upload_data(ctx, DITHER_SIZE, DITHER_SIZE, &dither_data(&mut rng));

        log::debug!("Created SSR with {} samples", settings.num_samples);

        Ok(Self {
            settings,
            trace_pass,
            composite_pass,
            dither_texture,
            ssr_texture: Texture2D::new(
                "SsrResult",
                TextureFormat::Rgba16Float,
                TextureFilter::Bilinear,
                WrapMode::Clamp,
            ),
            fbo: FrameBuffer::new(),
            dither_scale: [1.0, 1.0],
        })
    }

    pub fn settings(&self) -> &SsrSettings {
        &self.settings
    }

    pub fn set_step_size(&mut self, step_size: f32) {
        self.settings.step_size = step_size.max(1.0);
    }

    pub fn set_max_distance(&mut self, max_distance: f32) {
        if max_distance > 0.0 {
            self.settings.max_distance = max_distance;
        }
    }

    /// Values above 1 are clamped to full resolution.
    pub fn set_scale(&mut self, scale: f32) {
        if let Some(scale) = clamp_scale(scale) {
            self.settings.scale = scale;
        }
    }

    pub fn set_strength(&mut self, strength: f32) {
        self.settings.strength = strength.max(0.0);
    }

    pub fn ssr_texture(&self) -> Option<TextureHandle> {
        self.ssr_texture.handle()
    }

    pub fn ssr_size(&self) -> (u32, u32) {
        self.ssr_texture.size()
    }

    fn ensure_target(&mut self, ctx: &mut dyn RenderBackend, width: u32, height: u32) {
        if self.ssr_texture.init_empty(ctx, width, height) {
            self.dither_scale = [
                width as f32 / DITHER_SIZE as f32,
                height as f32 / DITHER_SIZE as f32,
            ];
            log::info!("SSR target resized to {}x{}", width, height);
        }
        self.fbo.init(ctx, &[&self.ssr_texture], None);
    }

    fn uniforms(&self, fx: &EffectContext<'_>) -> SsrUniforms {
        let projection = fx.camera.projection_matrix();
        let (width, height) = fx.render_size;
        SsrUniforms {
            projection: projection.to_cols_array_2d(),
            inverse_projection: projection.inverse().to_cols_array_2d(),
            dither_scale: self.dither_scale,
            source_size: [width as f32, height as f32],
            step_size: self.settings.step_size,
            max_distance: self.settings.max_distance,
            camera_far: fx.camera.far_distance(),
            num_samples: self.settings.num_samples,
            // a hit is accepted within one sample's worth of depth
            thickness: self.settings.max_distance / self.settings.num_samples as f32,
            _pad: [0.0; 3],
        }
    }
}

impl Effect for ScreenSpaceReflections {
    fn name(&self) -> &str {
        "ssr"
    }

    fn is_supported(&self, capabilities: &Capabilities) -> bool {
        capabilities.float_render_targets
    }

    fn needs_normal_depth(&self) -> bool {
        true
    }

    fn render(&mut self, fx: &mut EffectContext<'_>, _dt: f32) -> usize {
        let (Some(source), Some(hdr_target), Some(normal_depth)) =
            (fx.hdr_source(), fx.hdr_target(), fx.normal_depth)
        else {
            return 0;
        };

        let (render_width, render_height) = fx.render_size;
        let width = ((render_width as f32 * self.settings.scale) as u32).max(1);
        let height = ((render_height as f32 * self.settings.scale) as u32).max(1);
        self.ensure_target(fx.ctx, width, height);
        let Some(ssr_target) = self.fbo.target() else {
            return 0;
        };

        let uniforms = self.uniforms(fx);
        let ctx = &mut *fx.ctx;
        ctx.set_render_target(ssr_target);
        ctx.set_clear_color(Color::TRANSPARENT);
        ctx.clear(ClearFlags::COLOR);
        let textures = [Some(source), Some(normal_depth), self.dither_texture.handle()];
        if !draw_fullscreen_pass(ctx, &self.trace_pass, &uniforms, &textures) {
            return 0;
        }

        ctx.set_render_target(hdr_target);
        let composite = SsrCompositeUniforms {
            params: [self.settings.strength, 0.0, 0.0, 0.0],
        };
        let textures = [Some(source), self.ssr_texture.handle()];
        if !draw_fullscreen_pass(ctx, &self.composite_pass, &composite, &textures) {
            return 0;
        }
        2
    }

    fn dispose(&mut self, ctx: &mut dyn RenderBackend) {
        self.fbo.dispose(ctx);
        self.ssr_texture.dispose(ctx);
        self.dither_texture.dispose(ctx);
        self.trace_pass.dispose(ctx);
        self.composite_pass.dispose(ctx);
    }
}
