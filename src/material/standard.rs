// material/standard.rs
use std::sync::Arc;

use glam::Vec4;
use parking_lot::RwLock;

use crate::camera::Camera;
use crate::error::Result;
use crate::gpu::{BlendMode, ProgramSource, RenderBackend, UniformScope};
use crate::light::{CollectedLight, LightKind};
use crate::render::RenderItem;
use crate::settings::DebugSettings;

use super::pass::{FrameContext, MaterialPass, PassType};
use super::uniforms::{InstanceUniforms, PassUniforms};
use super::{Material, Shader};

const LIT_SHADER: &str = include_str!("../shader/lit.wgsl");

pub const AO_SLOT: u32 = 0;
pub const SHADOW_MAP_SLOT: u32 = 1;
pub const BACKBUFFER_SLOT: u32 = 2;
pub const PROBE_SPECULAR_SLOT: u32 = 3;

/// Surface description shared by every pass of one standard material.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceParams {
    pub color: Vec4,
    pub roughness: f32,
    pub metallic: f32,
    pub emission: f32,
    pub transparent: bool,
    pub needs_backbuffer: bool,
}

impl Default for SurfaceParams {
    fn default() -> Self {
        Self {
            color: Vec4::ONE,
            roughness: 0.5,
            metallic: 0.0,
            emission: 0.0,
            transparent: false,
            needs_backbuffer: false,
        }
    }
}

impl SurfaceParams {
    pub fn color(color: Vec4) -> Self {
        Self {
            color,
            transparent: color.w < 1.0,
            ..Self::default()
        }
    }

    fn instance_params(&self) -> Vec4 {
        Vec4::new(self.roughness, self.metallic, self.emission, self.color.w)
    }
}

fn fragment_entry(pass_type: PassType) -> &'static str {
    match pass_type {
        PassType::Base => "fs_base",
        PassType::DirLight => "fs_dir_light",
        PassType::DirLightShadow => "fs_dir_light_shadow",
        PassType::PointLight => "fs_point_light",
        PassType::SpotLight => "fs_spot_light",
        PassType::LightProbe => "fs_light_probe",
        PassType::ShadowDepth => "fs_shadow_depth",
        PassType::GBufferNormalDepth => "fs_normal_depth",
    }
}

fn program_label(pass_type: PassType) -> String {
    format!("standard_{}", &fragment_entry(pass_type)[3..])
}

/// One pass of a [`StandardMaterial`]: a shared program plus this material's surface.
pub struct ShaderPass {
    label: String,
    pass_type: PassType,
    shader: Arc<RwLock<Shader>>,
    surface: SurfaceParams,
}

impl ShaderPass {
    pub fn pass_type(&self) -> PassType {
        self.pass_type
    }

    pub fn surface(&self) -> &SurfaceParams {
        &self.surface
    }

    fn apply_render_state(&self, ctx: &mut dyn RenderBackend) {
        let transparent = self.surface.transparent;
        match self.pass_type {
            PassType::Base => {
                ctx.set_blend_state(transparent.then_some(BlendMode::Alpha));
                ctx.set_depth_test(true);
                ctx.set_depth_mask(!transparent);
            }
            PassType::DirLight
            | PassType::DirLightShadow
            | PassType::PointLight
            | PassType::SpotLight
            | PassType::LightProbe => {
                // lights accumulate on top of the base pass
                ctx.set_blend_state(Some(BlendMode::Additive));
                ctx.set_depth_test(true);
                ctx.set_depth_mask(false);
            }
            PassType::ShadowDepth | PassType::GBufferNormalDepth => {
                ctx.set_blend_state(None);
                ctx.set_depth_test(true);
                ctx.set_depth_mask(true);
            }
        }
    }
}

impl MaterialPass for ShaderPass {
    fn label(&self) -> &str {
        &self.label
    }

    fn is_ready(&self) -> bool {
        self.shader.read().is_ready()
    }

    fn update_pass_render_state(&self, ctx: &mut dyn RenderBackend, frame: &FrameContext<'_>) -> bool {
        if !self.shader.read().bind(ctx) {
            return false;
        }
        self.apply_render_state(ctx);

        let uniforms = PassUniforms::new(frame);
        ctx.set_uniforms(UniformScope::Pass, bytemuck::bytes_of(&uniforms));

        if let Some(ao) = frame.ao_texture {
            ctx.bind_texture(AO_SLOT, ao);
        }
        if let Some(light) = frame.light {
            if let Some(shadow) = &light.shadow {
                ctx.bind_texture(SHADOW_MAP_SLOT, shadow.shadow_map);
            }
            if let LightKind::Probe {
                specular: Some(specular),
                ..
            } = light.kind
            {
                ctx.bind_texture(PROBE_SPECULAR_SLOT, specular);
            }
        }
        if self.surface.needs_backbuffer {
            if let Some(backbuffer) = frame.backbuffer {
                ctx.bind_texture(BACKBUFFER_SLOT, backbuffer);
            }
        }
        true
    }

    fn update_instance_render_state(
        &self,
        ctx: &mut dyn RenderBackend,
        _camera: &Camera,
        item: &RenderItem,
        _light: Option<&CollectedLight>,
    ) {
        let uniforms = InstanceUniforms::new(
            item.world_matrix,
            self.surface.color,
            self.surface.instance_params(),
        );
        ctx.set_uniforms(UniformScope::Instance, bytemuck::bytes_of(&uniforms));
    }
}

/// Compiles the lit programs once and hands out materials that share them.
pub struct StandardMaterial {
    programs: Vec<Arc<RwLock<Shader>>>,
}

impl StandardMaterial {
    pub fn new(ctx: &mut dyn RenderBackend, debug: &DebugSettings) -> Result<Self> {
        let mut programs = Vec::with_capacity(PassType::COUNT);
        for pass_type in PassType::ALL {
            let source =
                ProgramSource::mesh(program_label(pass_type), LIT_SHADER, fragment_entry(pass_type));
            programs.push(Arc::new(RwLock::new(Shader::compile(ctx, &source, debug)?)));
        }
        log::debug!("Standard material programs ready");
        Ok(Self { programs })
    }

    /// Opaque surfaces get every pass; transparent ones don't cast shadows or write normals.
    pub fn create(&self, name: &str, surface: SurfaceParams) -> Arc<Material> {
        if surface.transparent {
            let passes: Vec<PassType> = PassType::ALL
                .into_iter()
                .filter(|pass| !matches!(pass, PassType::ShadowDepth | PassType::GBufferNormalDepth))
                .collect();
            self.create_with_passes(name, surface, &passes)
        } else {
            self.create_with_passes(name, surface, &PassType::ALL)
        }
    }

    pub fn create_with_passes(
        &self,
        name: &str,
        surface: SurfaceParams,
        passes: &[PassType],
    ) -> Arc<Material> {
        let mut builder = Material::builder(name)
            .transparent(surface.transparent)
            .needs_backbuffer(surface.needs_backbuffer);
        for pass_type in passes {
            let pass = ShaderPass {
                label: format!("{name}/{}", program_label(*pass_type)),
                pass_type: *pass_type,
                shader: Arc::clone(&self.programs[pass_type.index()]),
                surface,
            };
            builder = builder.with_pass(*pass_type, Arc::new(pass));
        }
        Arc::new(builder.build())
    }

    pub fn is_ready(&self) -> bool {
        self.programs.iter().all(|program| program.read().is_ready())
    }

    pub fn dispose(&mut self, ctx: &mut dyn RenderBackend) {
        for program in &self.programs {
            program.write().dispose(ctx);
        }
    }
}
