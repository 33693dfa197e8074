use std::f32::consts::TAU;

use bytemuck::{Pod, Zeroable};
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::gpu::{
    ClearFlags, FrameBuffer, ProgramSource, RenderBackend, Texture2D, TextureFilter, TextureFormat,
    TextureHandle, WrapMode,
};
use crate::material::Shader;
use crate::settings::DebugSettings;

use super::{draw_fullscreen_pass, AmbientOcclusion, Effect, EffectContext};

const HBAO_SHADER: &str = concat!(
    include_str!("../shader/fullscreen.wgsl"),
    include_str!("../shader/hbao.wgsl")
);
const AO_BLUR_SHADER: &str = concat!(
    include_str!("../shader/fullscreen.wgsl"),
    include_str!("../shader/ao_blur.wgsl")
);

pub const MAX_RAYS: u32 = 32;
pub const MAX_SAMPLES_PER_RAY: u32 = 32;
const SAMPLE_DIR_TEXTURE_SIZE: u32 = 256;
pub(super) const DITHER_SIZE: u32 = 4;
pub(super) const DITHER_SEED: u64 = 0x4842_414f;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HbaoSettings {
    pub num_rays: u32,
    pub num_samples_per_ray: u32,
    pub strength: f32,
    pub bias: f32,
    pub fall_off_distance: f32,
    /// View-space radius of the sampled hemisphere.
    pub sample_radius: f32,
    /// AO resolution relative to the render size.
    pub scale: f32,
}

impl Default for HbaoSettings {
    fn default() -> Self {
        Self {
            num_rays: 4,
            num_samples_per_ray: 4,
            strength: 1.0,
            bias: 0.01,
            fall_off_distance: 1.0,
            sample_radius: 0.5,
            scale: 0.5,
        }
    }
}

impl HbaoSettings {
    pub fn validate(mut self) -> Self {
        if !(1..=MAX_RAYS).contains(&self.num_rays) {
            log::warn!("HBAO ray count {} outside 1..={}", self.num_rays, MAX_RAYS);
            self.num_rays = self.num_rays.clamp(1, MAX_RAYS);
        }
        if !(1..=MAX_SAMPLES_PER_RAY).contains(&self.num_samples_per_ray) {
            log::warn!(
                "HBAO samples per ray {} outside 1..={}",
                self.num_samples_per_ray,
                MAX_SAMPLES_PER_RAY
            );
            self.num_samples_per_ray = self.num_samples_per_ray.clamp(1, MAX_SAMPLES_PER_RAY);
        }
        if !(self.scale > 0.0 && self.scale <= 1.0) {
            self.scale = Self::default().scale;
        }
        if self.fall_off_distance <= 0.0 {
            self.fall_off_distance = Self::default().fall_off_distance;
        }
        self
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct HbaoUniforms {
    inverse_projection: [[f32; 4]; 4],
    dither_scale: [f32; 2],
    half_sample_radius: f32,
    strength_per_ray: f32,
    rcp_fall_off_distance: f32,
    bias: f32,
    num_rays: u32,
    num_samples_per_ray: u32,
    camera_far: f32,
    projection_scale: f32,
    _pad: [f32; 2],
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct AoBlurUniforms {
    half_texel_offset: [f32; 2],
    _pad: [f32; 2],
}

/// RGBA8 unit directions around the circle, `(cos, sin) * 0.5 + 0.5`.
fn sample_dir_data() -> Vec<u8> {
    let mut data = Vec::with_capacity((SAMPLE_DIR_TEXTURE_SIZE * 4) as usize);
    for i in 0..SAMPLE_DIR_TEXTURE_SIZE {
        let angle = i as f32 / SAMPLE_DIR_TEXTURE_SIZE as f32 * TAU;
        data.push(unit_to_byte(angle.cos() * 0.5 + 0.5));
        data.push(unit_to_byte(angle.sin() * 0.5 + 0.5));
        data.push(0x00);
        data.push(0xff);
    }
    data
}

/// 4x4 RGBA8 tile of shuffled ray-angle (r) and step (g) offsets.
pub(super) fn dither_data(rng: &mut SmallRng) -> Vec<u8> {
    let count = (DITHER_SIZE * DITHER_SIZE) as usize;
    let mut angle_offsets: Vec<f32> = (0..count).map(|i| i as f32 / 16.0).collect();
    let mut step_offsets: Vec<f32> = (0..count).map(|i| i as f32 / 15.0).collect();
    angle_offsets.shuffle(rng);
    step_offsets.shuffle(rng);

    angle_offsets
        .iter()
        .zip(&step_offsets)
        .flat_map(|(angle, step)| [unit_to_byte(*angle), unit_to_byte(*step), 0x00, 0xff])
        .collect()
}

fn unit_to_byte(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Horizon-based ambient occlusion at reduced resolution, blurred horizontally then
/// vertically.
pub struct Hbao {
    settings: HbaoSettings,
    ao_pass: Shader,
    blur_pass: Shader,
    sample_dir_texture: Texture2D,
    dither_texture: Texture2D,
    ao_texture: Texture2D,
    back_texture: Texture2D,
    ao_fbo: FrameBuffer,
    back_fbo: FrameBuffer,
    dither_scale: [f32; 2],
}

impl Hbao {
    pub fn new(
        ctx: &mut dyn RenderBackend,
        settings: HbaoSettings,
        debug: &DebugSettings,
    ) -> Result<Self> {
        let settings = settings.validate();
        let ao_pass = Shader::compile(
            ctx,
            &ProgramSource::fullscreen("hbao", HBAO_SHADER, "fs_hbao"),
            debug,
        )?;
        let blur_pass = Shader::compile(
            ctx,
            &ProgramSource::fullscreen("ao_blur", AO_BLUR_SHADER, "fs_ao_blur"),
            debug,
        )?;

        let lookup = |label: &'static str| {
            Texture2D::new(label, TextureFormat::Rgba8Unorm, TextureFilter::Nearest, WrapMode::Repeat)
        };
        let mut sample_dir_texture = lookup("HbaoSampleDirs");
        sample_dir_texture.upload_data(ctx, SAMPLE_DIR_TEXTURE_SIZE, 1, &sample_dir_data());

        let mut rng = SmallRng::seed_from_u64(DITHER_SEED);
        let mut dither_texture = lookup("HbaoDither");
        dither_texture.upload_data(ctx, DITHER_SIZE, DITHER_SIZE, &dither_data(&mut rng));

        let ao_target = |label: &'static str| {
            Texture2D::new(label, TextureFormat::Rgba8Unorm, TextureFilter::Bilinear, WrapMode::Clamp)
        };

        log::debug!(
            "Created HBAO with {} rays x {} samples",
            settings.num_rays,
            settings.num_samples_per_ray
        );

        Ok(Self {
            settings,
            ao_pass,
            blur_pass,
            sample_dir_texture,
            dither_texture,
            ao_texture: ao_target("HbaoResult"),
            back_texture: ao_target("HbaoBack"),
            ao_fbo: FrameBuffer::new(),
            back_fbo: FrameBuffer::new(),
            dither_scale: [1.0, 1.0],
        })
    }

    pub fn settings(&self) -> &HbaoSettings {
        &self.settings
    }

    /// Ray and sample counts are fixed at construction.
    pub fn set_strength(&mut self, strength: f32) {
        self.settings.strength = strength;
    }

    pub fn set_bias(&mut self, bias: f32) {
        self.settings.bias = bias;
    }

    pub fn set_fall_off_distance(&mut self, distance: f32) {
        if distance > 0.0 {
            self.settings.fall_off_distance = distance;
        }
    }

    pub fn set_sample_radius(&mut self, radius: f32) {
        self.settings.sample_radius = radius;
    }

    pub fn set_scale(&mut self, scale: f32) {
        if scale > 0.0 && scale <= 1.0 {
            self.settings.scale = scale;
        }
    }

    pub fn ao_size(&self) -> (u32, u32) {
        self.ao_texture.size()
    }

    fn ensure_targets(&mut self, ctx: &mut dyn RenderBackend, width: u32, height: u32) {
        if self.ao_texture.init_empty(ctx, width, height) {
            self.back_texture.init_empty(ctx, width, height);
            self.dither_scale = [
                width as f32 / DITHER_SIZE as f32,
                height as f32 / DITHER_SIZE as f32,
            ];
            log::info!("HBAO targets resized to {}x{}", width, height);
        }
        self.ao_fbo.init(ctx, &[&self.ao_texture], None);
        self.back_fbo.init(ctx, &[&self.back_texture], None);
    }

    fn uniforms(&self, fx: &EffectContext<'_>) -> HbaoUniforms {
        let projection = fx.camera.projection_matrix();
        // view-space length at unit depth -> UV-space length
        let projection_scale = projection.y_axis.y * 0.5;
        HbaoUniforms {
            inverse_projection: projection.inverse().to_cols_array_2d(),
            dither_scale: self.dither_scale,
            half_sample_radius: self.settings.sample_radius * 0.5,
            strength_per_ray: self.settings.strength / self.settings.num_rays as f32,
            rcp_fall_off_distance: 1.0 / self.settings.fall_off_distance,
            bias: self.settings.bias,
            num_rays: self.settings.num_rays,
            num_samples_per_ray: self.settings.num_samples_per_ray,
            camera_far: fx.camera.far_distance(),
            projection_scale,
            _pad: [0.0; 2],
        }
    }
}

impl Effect for Hbao {
    fn name(&self) -> &str {
        "hbao"
    }

    fn needs_normal_depth(&self) -> bool {
        true
    }

    fn render(&mut self, fx: &mut EffectContext<'_>, _dt: f32) -> usize {
        let (render_width, render_height) = fx.render_size;
        let width = ((render_width as f32 * self.settings.scale) as u32).max(1);
        let height = ((render_height as f32 * self.settings.scale) as u32).max(1);
        self.ensure_targets(fx.ctx, width, height);
        let (Some(ao_target), Some(back_target)) = (self.ao_fbo.target(), self.back_fbo.target())
        else {
            return 0;
        };

        let uniforms = self.uniforms(fx);
        let ctx = &mut *fx.ctx;
        ctx.set_blend_state(None);
        ctx.set_depth_test(false);
        ctx.set_depth_mask(false);

        let mut draws = 0;
        ctx.set_render_target(ao_target);
        ctx.clear(ClearFlags::COLOR);
        let textures = [
            fx.normal_depth,
            self.dither_texture.handle(),
            self.sample_dir_texture.handle(),
        ];
        if !draw_fullscreen_pass(ctx, &self.ao_pass, &uniforms, &textures) {
            return draws;
        }
        draws += 1;

        let passes = [
            (back_target, self.ao_texture.handle(), [0.5 / width as f32, 0.0]),
            (ao_target, self.back_texture.handle(), [0.0, 0.5 / height as f32]),
        ];
        for (target, source, half_texel_offset) in passes {
            ctx.set_render_target(target);
            ctx.clear(ClearFlags::COLOR);
            let uniforms = AoBlurUniforms {
                half_texel_offset,
                _pad: [0.0; 2],
            };
            if draw_fullscreen_pass(ctx, &self.blur_pass, &uniforms, &[source]) {
                draws += 1;
            }
        }
        draws
    }

    fn dispose(&mut self, ctx: &mut dyn RenderBackend) {
        self.ao_fbo.dispose(ctx);
        self.back_fbo.dispose(ctx);
        self.ao_texture.dispose(ctx);
        self.back_texture.dispose(ctx);
        self.dither_texture.dispose(ctx);
        self.sample_dir_texture.dispose(ctx);
        self.ao_pass.dispose(ctx);
        self.blur_pass.dispose(ctx);
    }
}

impl AmbientOcclusion for Hbao {
    fn ao_texture(&self) -> Option<TextureHandle> {
        self.ao_texture.handle()
    }
}
