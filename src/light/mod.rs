pub mod assignment;

use glam::{Mat4, Vec3};

use crate::error::Result;
use crate::gpu::{RenderBackend, TextureHandle};
use crate::material::PassType;
use crate::math::{BoundingSphere, LightBounds};
use crate::settings::RenderSettings;
use crate::shadow::{CascadeShadowMapRenderer, ShadowFilterKind, MAX_CASCADES};

pub use assignment::{AsyncTaskQueue, FixedLightsSystem};

pub struct DirectionalLight {
    pub color: Vec3,
    pub intensity: f32,
    pub cast_shadows: bool,
    /// Overrides the configured shadow depth bias for this light.
    pub depth_bias: Option<f32>,
    shadow: Option<CascadeShadowMapRenderer>,
}

impl DirectionalLight {
    pub fn new(color: Vec3, intensity: f32) -> Self {
        Self {
            color,
            intensity,
            cast_shadows: false,
            depth_bias: None,
            shadow: None,
        }
    }

    pub fn with_shadows(mut self, cast_shadows: bool) -> Self {
        self.cast_shadows = cast_shadows;
        self
    }

    /// Creates the shadow renderer on first use and keeps its cascade count and map size in
    /// step with `settings`.
    pub fn shadow_renderer_mut(
        &mut self,
        ctx: &mut dyn RenderBackend,
        settings: &RenderSettings,
    ) -> Result<&mut CascadeShadowMapRenderer> {
        let renderer = match self.shadow.take() {
            Some(renderer) => renderer,
            None => CascadeShadowMapRenderer::new(ctx, settings)?,
        };
        let renderer = self.shadow.insert(renderer);
        renderer.set_num_cascades(settings.num_cascades);
        renderer.set_shadow_map_size(settings.shadow_map_size);
        renderer.check_limits(&ctx.capabilities())?;
        Ok(renderer)
    }

    pub fn shadow_renderer(&self) -> Option<&CascadeShadowMapRenderer> {
        self.shadow.as_ref()
    }

    pub fn dispose(&mut self, ctx: &mut dyn RenderBackend) {
        if let Some(mut shadow) = self.shadow.take() {
            shadow.dispose(ctx);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointLight {
    pub color: Vec3,
    pub intensity: f32,
    pub radius: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpotLight {
    pub color: Vec3,
    pub intensity: f32,
    pub radius: f32,
    pub inner_angle: f32,
    pub outer_angle: f32,
}

/// Ambient lighting sample: second-order spherical harmonics for diffuse.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightProbe {
    pub diffuse_sh: [Vec3; 9],
    pub intensity: f32,
    pub specular: Option<TextureHandle>,
}

impl LightProbe {
    pub fn uniform_ambient(color: Vec3) -> Self {
        let mut diffuse_sh = [Vec3::ZERO; 9];
        // Y00 = 0.282095; irradiance from a constant band
        diffuse_sh[0] = color / 0.282_095;
        Self {
            diffuse_sh,
            intensity: 1.0,
            specular: None,
        }
    }
}

pub enum Light {
    Directional(DirectionalLight),
    Point(PointLight),
    Spot(SpotLight),
    Probe(LightProbe),
}

impl Light {
    pub fn cast_shadows(&self) -> bool {
        match self {
            Light::Directional(light) => light.cast_shadows,
            Light::Point(_) | Light::Spot(_) | Light::Probe(_) => false,
        }
    }

    /// Releases the shadow map of a directional light.
    pub fn dispose(&mut self, ctx: &mut dyn RenderBackend) {
        if let Light::Directional(light) = self {
            light.dispose(ctx);
        }
    }

    pub fn world_bounds(&self, world_matrix: &Mat4) -> LightBounds {
        let position = world_matrix.w_axis.truncate();
        match self {
            Light::Directional(_) | Light::Probe(_) => LightBounds::Infinite,
            Light::Point(light) => LightBounds::Sphere(BoundingSphere::new(position, light.radius)),
            Light::Spot(light) => LightBounds::Sphere(BoundingSphere::new(position, light.radius)),
        }
    }

    pub fn snapshot(&self, world_matrix: &Mat4) -> LightKind {
        let position = world_matrix.w_axis.truncate();
        let direction = (-world_matrix.z_axis.truncate()).normalize_or_zero();
        match self {
            Light::Directional(light) => LightKind::Directional {
                direction,
                color: light.color * light.intensity,
                cast_shadows: light.cast_shadows,
            },
            Light::Point(light) => LightKind::Point {
                position,
                color: light.color * light.intensity,
                radius: light.radius,
            },
            Light::Spot(light) => LightKind::Spot {
                position,
                direction,
                color: light.color * light.intensity,
                radius: light.radius,
                cos_inner: light.inner_angle.cos(),
                cos_outer: light.outer_angle.cos(),
            },
            Light::Probe(probe) => LightKind::Probe {
                diffuse_sh: probe.diffuse_sh,
                intensity: probe.intensity,
                specular: probe.specular,
            },
        }
    }
}

/// Plain-data copy of a light taken at collection time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LightKind {
    Directional {
        direction: Vec3,
        color: Vec3,
        cast_shadows: bool,
    },
    Point {
        position: Vec3,
        color: Vec3,
        radius: f32,
    },
    Spot {
        position: Vec3,
        direction: Vec3,
        color: Vec3,
        radius: f32,
        cos_inner: f32,
        cos_outer: f32,
    },
    Probe {
        diffuse_sh: [Vec3; 9],
        intensity: f32,
        specular: Option<TextureHandle>,
    },
}

/// What a shadowed lighting pass needs to sample one light's cascades.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowBinding {
    pub shadow_map: TextureHandle,
    pub num_cascades: u32,
    pub shadow_matrices: [Mat4; MAX_CASCADES],
    pub split_distances: [f32; MAX_CASCADES],
    pub filter: ShadowFilterKind,
    pub softness: f32,
    pub depth_bias: f32,
    pub texel_size: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollectedLight {
    pub entity: hecs::Entity,
    pub world_matrix: Mat4,
    pub kind: LightKind,
    pub world_bounds: LightBounds,
    pub shadow: Option<ShadowBinding>,
}

impl CollectedLight {
    pub fn new(entity: hecs::Entity, light: &Light, world_matrix: &Mat4) -> Self {
        Self {
            entity,
            world_matrix: *world_matrix,
            kind: light.snapshot(world_matrix),
            world_bounds: light.world_bounds(world_matrix),
            shadow: None,
        }
    }

    /// Lighting pass used for this light.
    pub fn pass_type(&self) -> PassType {
        match self.kind {
            LightKind::Probe { .. } => PassType::LightProbe,
            LightKind::Directional { .. } if self.shadow.is_some() => PassType::DirLightShadow,
            LightKind::Directional { .. } => PassType::DirLight,
            LightKind::Point { .. } => PassType::PointLight,
            LightKind::Spot { .. } => PassType::SpotLight,
        }
    }

    /// Whether the light is applied to every item or only to those its bounds reach.
    pub fn is_local(&self) -> bool {
        match self.kind {
            LightKind::Directional { .. } | LightKind::Probe { .. } => false,
            LightKind::Point { .. } | LightKind::Spot { .. } => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::BoundingAabb;

    fn entity() -> hecs::Entity {
        hecs::World::new().spawn(())
    }

    #[test]
    fn directional_light_points_down_negative_z() {
        let light = Light::Directional(DirectionalLight::new(Vec3::ONE, 2.0));
        let rotation = Mat4::from_rotation_x(-std::f32::consts::FRAC_PI_2);
        match light.snapshot(&rotation) {
            LightKind::Directional { direction, color, .. } => {
                assert!(direction.abs_diff_eq(Vec3::NEG_Y, 1e-5));
                assert_eq!(color, Vec3::splat(2.0));
            }
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn point_light_bounds_reach_radius_only() {
        let light = Light::Point(PointLight {
            color: Vec3::ONE,
            intensity: 1.0,
            radius: 2.0,
        });
        let bounds = light.world_bounds(&Mat4::from_translation(Vec3::new(10.0, 0.0, 0.0)));
        let near = BoundingAabb::new(Vec3::new(7.0, -1.0, -1.0), Vec3::new(8.5, 1.0, 1.0));
        let far = BoundingAabb::new(Vec3::new(-1.0, -1.0, -1.0), Vec3::ONE);
        assert!(bounds.intersects_aabb(&near));
        assert!(!bounds.intersects_aabb(&far));
    }

    #[test]
    fn pass_type_follows_light_kind() {
        let dir = Light::Directional(DirectionalLight::new(Vec3::ONE, 1.0).with_shadows(true));
        let mut collected = CollectedLight::new(entity(), &dir, &Mat4::IDENTITY);
        assert_eq!(collected.pass_type(), PassType::DirLight);
        collected.shadow = Some(ShadowBinding {
            shadow_map: TextureHandle::new(0),
            num_cascades: 1,
            shadow_matrices: [Mat4::IDENTITY; MAX_CASCADES],
            split_distances: [0.0; MAX_CASCADES],
            filter: ShadowFilterKind::Pcf,
            softness: 0.1,
            depth_bias: 0.0,
            texel_size: 1.0,
        });
        assert_eq!(collected.pass_type(), PassType::DirLightShadow);

        let probe = Light::Probe(LightProbe::uniform_ambient(Vec3::splat(0.2)));
        let collected = CollectedLight::new(entity(), &probe, &Mat4::IDENTITY);
        assert_eq!(collected.pass_type(), PassType::LightProbe);
        assert!(!collected.is_local());
    }
}
