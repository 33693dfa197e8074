use bytemuck::{Pod, Zeroable};
use glam::Vec2;

use crate::error::Result;
use crate::gpu::{ProgramSource, RenderBackend, TextureHandle};
use crate::material::Shader;
use crate::settings::DebugSettings;
use crate::shadow::ShadowFilterSettings;

use super::{draw_fullscreen_pass, Effect, EffectContext};

const BLUR_SHADER: &str = concat!(
    include_str!("../shader/fullscreen.wgsl"),
    include_str!("../shader/gaussian_blur.wgsl")
);

/// Weight at the radius edge relative to the centre.
const GAUSSIAN_EPSILON: f32 = 0.01;
const MAX_WEIGHTS: usize = 32;

/// Unnormalised gaussian centred at zero, `evaluate(0) == 1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CenteredGaussianCurve {
    variance: f32,
}

impl CenteredGaussianCurve {
    pub fn new(variance: f32) -> Self {
        Self {
            variance: variance.max(0.0),
        }
    }

    /// Curve that has fallen to `epsilon` at `radius`.
    pub fn from_radius(radius: f32, epsilon: f32) -> Self {
        let std_dev = radius / (-2.0 * epsilon.ln()).sqrt();
        Self::new(std_dev * std_dev)
    }

    pub fn variance(&self) -> f32 {
        self.variance
    }

    pub fn evaluate(&self, x: f32) -> f32 {
        if self.variance <= 0.0 {
            return if x == 0.0 { 1.0 } else { 0.0 };
        }
        (-x * x / (2.0 * self.variance)).exp()
    }
}

/// One-sided weights `w[0..=radius]` normalised so that `w[0] + 2 * sum(w[1..])` is one.
pub fn gaussian_weights(radius: u32) -> Vec<f32> {
    let radius = radius.min(ShadowFilterSettings::MAX_BLUR_RADIUS);
    let curve = CenteredGaussianCurve::from_radius(radius as f32, GAUSSIAN_EPSILON);
    let mut weights: Vec<f32> = (0..=radius).map(|j| curve.evaluate(j as f32)).collect();

    let total: f32 = weights
        .iter()
        .enumerate()
        .map(|(j, weight)| if j > 0 { weight * 2.0 } else { *weight })
        .sum();
    for weight in &mut weights {
        *weight /= total;
    }
    weights
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct BlurUniforms {
    step: [f32; 2],
    radius: u32,
    _pad: u32,
    weights: [[f32; 4]; MAX_WEIGHTS / 4],
}

/// A single separable gaussian blur direction. Call twice with perpendicular steps for a
/// full blur.
#[derive(Debug)]
pub struct GaussianBlurPass {
    shader: Shader,
    radius: u32,
    weights: Vec<f32>,
}

impl GaussianBlurPass {
    pub fn new(ctx: &mut dyn RenderBackend, radius: u32, debug: &DebugSettings) -> Result<Self> {
        let source = ProgramSource::fullscreen("gaussian_blur", BLUR_SHADER, "fs_gaussian_blur");
        let weights = gaussian_weights(radius);
        Ok(Self {
            shader: Shader::compile(ctx, &source, debug)?,
            radius: weights.len() as u32 - 1,
            weights,
        })
    }

    pub fn radius(&self) -> u32 {
        self.radius
    }

    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    pub fn is_ready(&self) -> bool {
        self.shader.is_ready()
    }

    /// Blurs `source` into the bound target, `step` apart in UV units.
    pub fn execute(&self, ctx: &mut dyn RenderBackend, source: TextureHandle, step: Vec2) -> bool {
        let mut uniforms = BlurUniforms {
            step: step.to_array(),
            radius: self.radius,
            _pad: 0,
            weights: [[0.0; 4]; MAX_WEIGHTS / 4],
        };
        for (i, weight) in self.weights.iter().enumerate() {
            uniforms.weights[i / 4][i % 4] = *weight;
        }
        draw_fullscreen_pass(ctx, &self.shader, &uniforms, &[Some(source)])
    }

    pub fn dispose(&mut self, ctx: &mut dyn RenderBackend) {
        self.shader.dispose(ctx);
    }
}

/// Full-screen gaussian blur of the HDR image.
#[derive(Debug)]
pub struct BlurEffect {
    pass: GaussianBlurPass,
}

impl BlurEffect {
    pub fn new(ctx: &mut dyn RenderBackend, radius: u32, debug: &DebugSettings) -> Result<Self> {
        Ok(Self {
            pass: GaussianBlurPass::new(ctx, radius, debug)?,
        })
    }

    pub fn radius(&self) -> u32 {
        self.pass.radius()
    }
}

impl Effect for BlurEffect {
    fn name(&self) -> &str {
        "blur"
    }

    fn render(&mut self, fx: &mut EffectContext<'_>, _dt: f32) -> usize {
        let (width, height) = fx.render_size;
        let texel = Vec2::new(1.0 / width.max(1) as f32, 1.0 / height.max(1) as f32);
        let mut draws = 0;

        for (i, step) in [Vec2::new(texel.x, 0.0), Vec2::new(0.0, texel.y)]
            .into_iter()
            .enumerate()
        {
            let (Some(source), Some(target)) = (fx.hdr_source(), fx.hdr_target()) else {
                return draws;
            };
            fx.ctx.set_render_target(target);
            if !self.pass.execute(fx.ctx, source, step) {
                return draws;
            }
            draws += 1;
            // the vertical pass reads what the horizontal one wrote
            if i == 0 {
                fx.swap_hdr();
            }
        }
        draws
    }

    fn dispose(&mut self, ctx: &mut dyn RenderBackend) {
        self.pass.dispose(ctx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn curve_reaches_epsilon_at_radius() {
        let curve = CenteredGaussianCurve::from_radius(4.0, 0.01);
        assert_eq!(curve.evaluate(0.0), 1.0);
        assert!((curve.evaluate(4.0) - 0.01).abs() < 1e-5);
    }

    #[test]
    fn weights_sum_to_one_over_both_sides() {
        for radius in [1, 2, 5, 31] {
            let weights = gaussian_weights(radius);
            assert_eq!(weights.len(), radius as usize + 1);
            let total = weights[0] + 2.0 * weights[1..].iter().sum::<f32>();
            assert!((total - 1.0).abs() < 1e-5, "radius {radius}: {total}");
            assert!(weights.windows(2).all(|pair| pair[0] > pair[1]));
        }
    }

    #[test]
    fn zero_radius_is_identity() {
        assert_eq!(gaussian_weights(0), vec![1.0]);
    }

    #[test]
    fn oversized_radius_is_clamped() {
        assert_eq!(gaussian_weights(100).len(), MAX_WEIGHTS);
    }
}
