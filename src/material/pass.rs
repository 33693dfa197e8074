use crate::camera::Camera;
use crate::gpu::{RenderBackend, TextureHandle};
use crate::light::CollectedLight;
use crate::render::RenderItem;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassType {
    Base,
    DirLight,
    DirLightShadow,
    PointLight,
    SpotLight,
    LightProbe,
    ShadowDepth,
    GBufferNormalDepth,
}

impl PassType {
    pub const COUNT: usize = 8;

    pub const ALL: [PassType; Self::COUNT] = [
        PassType::Base,
        PassType::DirLight,
        PassType::DirLightShadow,
        PassType::PointLight,
        PassType::SpotLight,
        PassType::LightProbe,
        PassType::ShadowDepth,
        PassType::GBufferNormalDepth,
    ];

    /// Passes that add one light's contribution to the lit result.
    pub const LIT: [PassType; 5] = [
        PassType::DirLight,
        PassType::DirLightShadow,
        PassType::PointLight,
        PassType::SpotLight,
        PassType::LightProbe,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Per-pass inputs shared by every item drawn under one pass binding.
#[derive(Clone, Copy)]
pub struct FrameContext<'a> {
    pub camera: &'a Camera,
    pub light: Option<&'a CollectedLight>,
    /// AO result, or the 1x1 white fallback.
    pub ao_texture: Option<TextureHandle>,
    pub normal_depth: Option<TextureHandle>,
    /// Copy of the opaque HDR result for materials that sample it.
    pub backbuffer: Option<TextureHandle>,
    pub render_size: (u32, u32),
}

impl<'a> FrameContext<'a> {
    pub fn new(camera: &'a Camera) -> Self {
        let size = camera.render_target_resolution();
        Self {
            camera,
            light: None,
            ao_texture: None,
            normal_depth: None,
            backbuffer: None,
            render_size: (size.x, size.y),
        }
    }

    pub fn with_light(self, light: Option<&'a CollectedLight>) -> Self {
        Self { light, ..self }
    }
}

/// One program plus the state it needs, bound once and then updated per drawn item.
pub trait MaterialPass: Send + Sync {
    fn label(&self) -> &str;

    fn is_ready(&self) -> bool {
        true
    }

    /// Binds program, textures and pass-wide uniforms. Returns `false` when the pass cannot
    /// draw, in which case its items are skipped.
    fn update_pass_render_state(&self, ctx: &mut dyn RenderBackend, frame: &FrameContext<'_>) -> bool;

    fn update_instance_render_state(
        &self,
        ctx: &mut dyn RenderBackend,
        camera: &Camera,
        item: &RenderItem,
        light: Option<&CollectedLight>,
    );

    fn dispose(&self, _ctx: &mut dyn RenderBackend) {}
}
