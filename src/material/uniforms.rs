// material/uniforms.rs
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec4};

use crate::light::{CollectedLight, LightKind};
use crate::shadow::{ShadowFilterKind, MAX_CASCADES};

use super::pass::FrameContext;

/// Camera, light and shadow data shared by every item drawn under one pass binding.
///
/// Light probes have no shadow, so their nine SH coefficients reuse the shadow matrix block:
/// coefficient `k` sits in column `k % 4` of matrix `k / 4`.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug)]
pub struct PassUniforms {
    pub view_proj: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
    pub camera_position: [f32; 4],
    pub light_color: [f32; 4],
    pub light_position: [f32; 4],
    pub light_direction: [f32; 4],
    pub shadow_matrices: [[[f32; 4]; 4]; MAX_CASCADES],
    pub split_distances: [f32; 4],
    pub shadow_params: [f32; 4],
    pub render_size: [f32; 4],
    pub filter_params: [f32; 4],
}

impl PassUniforms {
    pub fn new(frame: &FrameContext<'_>) -> Self {
        let camera = frame.camera;
        let (width, height) = (frame.render_size.0.max(1) as f32, frame.render_size.1.max(1) as f32);
        let mut uniforms = Self {
            view_proj: camera.view_projection().to_cols_array_2d(),
            view: camera.view_matrix().to_cols_array_2d(),
            camera_position: camera.position().extend(camera.far_distance()).to_array(),
            render_size: [width, height, 1.0 / width, 1.0 / height],
            ..Self::zeroed()
        };
        if let Some(light) = frame.light {
            uniforms.set_light(light);
        }
        uniforms
    }

    fn set_light(&mut self, light: &CollectedLight) {
        match light.kind {
            LightKind::Directional { direction, color, .. } => {
                self.light_color = color.extend(1.0).to_array();
                self.light_direction = direction.extend(0.0).to_array();
            }
            LightKind::Point {
                position,
                color,
                radius,
            } => {
                self.light_color = color.extend(1.0).to_array();
                self.light_position = position.extend(radius).to_array();
            }
            LightKind::Spot {
                position,
                direction,
                color,
                radius,
                cos_inner,
                cos_outer,
            } => {
                self.light_color = color.extend(cos_inner).to_array();
                self.light_position = position.extend(radius).to_array();
                self.light_direction = direction.extend(cos_outer).to_array();
            }
            LightKind::Probe {
                diffuse_sh,
                intensity,
                ..
            } => {
                self.light_color = [intensity, intensity, intensity, 1.0];
                for (k, coefficient) in diffuse_sh.iter().enumerate() {
                    self.shadow_matrices[k / 4][k % 4] = coefficient.extend(0.0).to_array();
                }
            }
        }

        if let Some(shadow) = &light.shadow {
            for (target, matrix) in self.shadow_matrices.iter_mut().zip(&shadow.shadow_matrices) {
                *target = matrix.to_cols_array_2d();
            }
            self.split_distances = shadow.split_distances;
            self.shadow_params = [
                shadow.num_cascades as f32,
                shadow.softness,
                shadow.depth_bias,
                shadow.texel_size,
            ];
            self.filter_params = [filter_index(shadow.filter), 0.0, 0.0, 0.0];
        }
    }
}

fn filter_index(kind: ShadowFilterKind) -> f32 {
    match kind {
        ShadowFilterKind::Hard => 0.0,
        ShadowFilterKind::Pcf => 1.0,
        ShadowFilterKind::Variance => 2.0,
    }
}

/// Per-item transform and surface parameters.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug)]
pub struct InstanceUniforms {
    pub world: [[f32; 4]; 4],
    pub normal_matrix: [[f32; 4]; 4],
    pub color: [f32; 4],
    /// x roughness, y metallic, z emission
    pub params: [f32; 4],
}

impl InstanceUniforms {
    pub fn new(world: Mat4, color: Vec4, params: Vec4) -> Self {
        Self {
            world: world.to_cols_array_2d(),
            normal_matrix: world.inverse().transpose().to_cols_array_2d(),
            color: color.to_array(),
            params: params.to_array(),
        }
    }
}
