use log::warn;
use serde::{Deserialize, Serialize};

use crate::gpu::{Capabilities, TextureFormat};

/// How directional shadow maps are written and sampled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShadowFilterKind {
    /// Single depth comparison.
    Hard,
    /// Percentage-closer filtering over a small kernel.
    #[default]
    Pcf,
    /// Depth moments, pre-blurred after rendering.
    Variance,
}

impl ShadowFilterKind {
    /// Whether the map needs a back buffer for separable blur passes.
    pub fn blurs(self) -> bool {
        matches!(self, ShadowFilterKind::Variance)
    }

    pub fn map_format(self, capabilities: &Capabilities) -> TextureFormat {
        match (self, capabilities.float32_filterable) {
            (ShadowFilterKind::Variance, true) => TextureFormat::Rg32Float,
            (ShadowFilterKind::Hard | ShadowFilterKind::Pcf, true) => TextureFormat::R32Float,
            (_, false) => TextureFormat::Rgba16Float,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShadowFilterSettings {
    #[serde(default)]
    pub kind: ShadowFilterKind,
    /// World-space margin added around every cascade so filter kernels don't sample outside it.
    #[serde(default = "ShadowFilterSettings::default_softness")]
    pub softness: f32,
    #[serde(default = "ShadowFilterSettings::default_blur_passes")]
    pub blur_passes: u32,
    #[serde(default = "ShadowFilterSettings::default_blur_radius")]
    pub blur_radius: u32,
    #[serde(default = "ShadowFilterSettings::default_depth_bias")]
    pub depth_bias: f32,
}

impl Default for ShadowFilterSettings {
    fn default() -> Self {
        Self {
            kind: ShadowFilterKind::default(),
            softness: Self::default_softness(),
            blur_passes: Self::default_blur_passes(),
            blur_radius: Self::default_blur_radius(),
            depth_bias: Self::default_depth_bias(),
        }
    }
}

impl ShadowFilterSettings {
    pub const MAX_BLUR_RADIUS: u32 = 31;

    pub fn validate(mut self) -> Self {
        if !self.softness.is_finite() || self.softness <= 0.0 {
            warn!("Shadow softness must be positive. Using default value.");
            self.softness = Self::default_softness();
        }
        if self.blur_radius > Self::MAX_BLUR_RADIUS {
            warn!(
                "Shadow blur radius {} exceeds {}. Clamping.",
                self.blur_radius,
                Self::MAX_BLUR_RADIUS
            );
            self.blur_radius = Self::MAX_BLUR_RADIUS;
        }
        if !self.depth_bias.is_finite() {
            self.depth_bias = Self::default_depth_bias();
        }
        self
    }

    /// Number of blur iterations actually run after the depth pass.
    pub fn blurs(&self) -> u32 {
        if self.kind.blurs() {
            self.blur_passes
        } else {
            0
        }
    }

    const fn default_softness() -> f32 {
        0.1
    }

    const fn default_blur_passes() -> u32 {
        1
    }

    const fn default_blur_radius() -> u32 {
        2
    }

    const fn default_depth_bias() -> f32 {
        0.005
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_variance_blurs() {
        let mut settings = ShadowFilterSettings {
            blur_passes: 3,
            ..ShadowFilterSettings::default()
        };
        assert_eq!(settings.blurs(), 0);
        settings.kind = ShadowFilterKind::Variance;
        assert_eq!(settings.blurs(), 3);
    }

    #[test]
    fn map_format_falls_back_without_float32_filtering() {
        let caps = Capabilities {
            float32_filterable: false,
            ..Capabilities::default()
        };
        assert_eq!(
            ShadowFilterKind::Variance.map_format(&caps),
            TextureFormat::Rgba16Float
        );
        assert_eq!(
            ShadowFilterKind::Pcf.map_format(&Capabilities::default()),
            TextureFormat::R32Float
        );
    }

    #[test]
    fn validate_fixes_softness_and_radius() {
        let settings = ShadowFilterSettings {
            softness: -1.0,
            blur_radius: 100,
            ..ShadowFilterSettings::default()
        }
        .validate();
        assert_eq!(settings.softness, 0.1);
        assert_eq!(settings.blur_radius, ShadowFilterSettings::MAX_BLUR_RADIUS);
    }
}
