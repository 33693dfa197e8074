use std::path::Path;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::gpu::{Color, TextureFormat};
use crate::shadow::{ShadowFilterSettings, MAX_CASCADES};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebugRenderMode {
    #[default]
    None,
    /// Composite shows the ambient occlusion texture instead of the lit image.
    Ao,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugSettings {
    /// Shader compile failures abort instead of degrading to a logged no-op.
    #[serde(default = "DebugSettings::default_throw_on_shader_error")]
    pub throw_on_shader_error: bool,
    #[serde(default)]
    pub render_mode: DebugRenderMode,
}

impl Default for DebugSettings {
    fn default() -> Self {
        Self {
            throw_on_shader_error: Self::default_throw_on_shader_error(),
            render_mode: DebugRenderMode::None,
        }
    }
}

impl DebugSettings {
    const fn default_throw_on_shader_error() -> bool {
        true
    }

    pub fn lenient() -> Self {
        Self {
            throw_on_shader_error: false,
            render_mode: DebugRenderMode::None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderSettings {
    #[serde(default = "RenderSettings::default_shadow_map_size")]
    pub shadow_map_size: u32,
    #[serde(default = "RenderSettings::default_num_cascades")]
    pub num_cascades: u32,
    #[serde(default)]
    pub shadow_filter: ShadowFilterSettings,
    #[serde(default = "RenderSettings::default_hdr_format")]
    pub hdr_format: TextureFormat,
    #[serde(default = "RenderSettings::default_render_scale")]
    pub render_scale: f32,
    #[serde(default)]
    pub depth_prepass: bool,
    #[serde(default = "RenderSettings::default_background_color")]
    pub background_color: Color,
    #[serde(default)]
    pub debug: DebugSettings,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            shadow_map_size: Self::default_shadow_map_size(),
            num_cascades: Self::default_num_cascades(),
            shadow_filter: ShadowFilterSettings::default(),
            hdr_format: Self::default_hdr_format(),
            render_scale: Self::default_render_scale(),
            depth_prepass: false,
            background_color: Self::default_background_color(),
            debug: DebugSettings::default(),
        }
    }
}

impl RenderSettings {
    /// Reads settings, falling back to defaults when the file is missing or malformed.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match Self::try_load_from_path(path) {
            Ok(settings) => {
                info!("Loaded render settings from {:?}", path);
                settings
            }
            Err(crate::error::RenderError::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {
                info!(
                    "Render settings file {:?} not found. Using default settings.",
                    path
                );
                RenderSettings::default()
            }
            Err(err) => {
                warn!(
                    "Failed to load {:?} ({}). Falling back to default render settings.",
                    path, err
                );
                RenderSettings::default()
            }
        }
    }

    pub fn try_load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let settings: RenderSettings = serde_json::from_str(json)?;
        Ok(settings.validate())
    }

    pub fn validate(mut self) -> Self {
        if self.shadow_map_size == 0 {
            warn!("Shadow map size must be greater than zero. Using default value.");
            self.shadow_map_size = Self::default_shadow_map_size();
        }

        let max_cascades = MAX_CASCADES as u32;
        if !(1..=max_cascades).contains(&self.num_cascades) {
            let clamped = self.num_cascades.clamp(1, max_cascades);
            warn!(
                "Cascade count {} outside 1..={}. Using {} instead.",
                self.num_cascades, max_cascades, clamped
            );
            self.num_cascades = clamped;
        }

        if !self.render_scale.is_finite() || self.render_scale <= 0.0 {
            warn!("Render scale must be positive. Using 1.0 instead.");
            self.render_scale = Self::default_render_scale();
        }

        if !self.hdr_format.is_float() {
            warn!(
                "HDR format {:?} is not a float format. Using default value.",
                self.hdr_format
            );
            self.hdr_format = Self::default_hdr_format();
        }

        self.shadow_filter = self.shadow_filter.validate();
        self
    }

    const fn default_shadow_map_size() -> u32 {
        1024
    }

    const fn default_num_cascades() -> u32 {
        3
    }

    const fn default_hdr_format() -> TextureFormat {
        TextureFormat::Rgba16Float
    }

    const fn default_render_scale() -> f32 {
        1.0
    }

    const fn default_background_color() -> Color {
        Color::BLACK
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shadow::ShadowFilterKind;

    fn invalid_settings() -> RenderSettings {
        RenderSettings {
            shadow_map_size: 0,
            num_cascades: 9,
            render_scale: -2.0,
            hdr_format: TextureFormat::Rgba8Unorm,
            ..RenderSettings::default()
        }
    }

    #[test]
    fn validate_replaces_invalid_values_with_defaults() {
        let validated = invalid_settings().validate();
        let defaults = RenderSettings::default();

        assert_eq!(validated.shadow_map_size, defaults.shadow_map_size);
        assert_eq!(validated.num_cascades, MAX_CASCADES as u32);
        assert_eq!(validated.render_scale, defaults.render_scale);
        assert_eq!(validated.hdr_format, defaults.hdr_format);
    }

    #[test]
    fn validate_preserves_valid_values() {
        let valid = RenderSettings {
            shadow_map_size: 2048,
            num_cascades: 2,
            render_scale: 0.5,
            depth_prepass: true,
            ..RenderSettings::default()
        };

        let validated = valid.clone().validate();
        assert_eq!(validated, valid);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let settings = RenderSettings::from_json(
            r#"{ "num_cascades": 4, "shadow_filter": { "kind": "variance" }, "debug": { "render_mode": "ao" } }"#,
        )
        .unwrap();

        assert_eq!(settings.num_cascades, 4);
        assert_eq!(settings.shadow_map_size, 1024);
        assert_eq!(settings.shadow_filter.kind, ShadowFilterKind::Variance);
        assert_eq!(settings.debug.render_mode, DebugRenderMode::Ao);
        assert!(settings.debug.throw_on_shader_error);
    }

    #[test]
    fn zero_cascades_clamp_to_one() {
        let settings = RenderSettings::from_json(r#"{ "num_cascades": 0 }"#).unwrap();
        assert_eq!(settings.num_cascades, 1);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let settings = RenderSettings::load_from_path("does/not/exist/settings.json");
        assert_eq!(settings, RenderSettings::default());
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(matches!(
            RenderSettings::from_json("{ not json"),
            Err(crate::error::RenderError::Settings(_))
        ));
    }
}
