use glam::{Mat4, Vec2, Vec3};

use crate::camera::Camera;
use crate::effect::blur::GaussianBlurPass;
use crate::error::{RenderError, Result};
use crate::gpu::{
    Capabilities, ClearFlags, Color, DepthBuffer, FrameBuffer, RenderBackend, Texture2D, TextureFilter,
    TextureFormat, WrapMode,
};
use crate::light::ShadowBinding;
use crate::material::{FrameContext, PassType};
use crate::math::{BoundingAabb, Plane, Rect};
use crate::render::pass::render_pass;
use crate::scene::Scene;
use crate::settings::{DebugSettings, RenderSettings};

use super::atlas::AtlasLayout;
use super::caster_collector::CascadeShadowCasterCollector;
use super::filter::ShadowFilterSettings;
use super::splits::CascadeSplits;
use super::MAX_CASCADES;

/// Cascade extents are rounded up to whole world units so they only change in steps.
const SCALE_SNAP: f32 = 1.0;
const MIN_DEPTH_RANGE: f32 = 0.01;
/// Only view planes facing along the light by more than this bound the caster region.
const CULL_PLANE_THRESHOLD: f32 = 0.001;

/// Second shadow texture used as the intermediate target of separable blurs.
struct ShadowBackBuffer {
    texture: Texture2D,
    framebuffer: FrameBuffer,
    blur: GaussianBlurPass,
}

impl ShadowBackBuffer {
    fn new(
        ctx: &mut dyn RenderBackend,
        format: TextureFormat,
        filter: &ShadowFilterSettings,
        debug: &DebugSettings,
    ) -> Result<Self> {
        Ok(Self {
            texture: shadow_texture("ShadowMapBack", format),
            framebuffer: FrameBuffer::new(),
            blur: GaussianBlurPass::new(ctx, filter.blur_radius, debug)?,
        })
    }

    fn init(&mut self, ctx: &mut dyn RenderBackend, width: u32, height: u32) {
        self.texture.init_empty(ctx, width, height);
        self.framebuffer.init(ctx, &[&self.texture], None);
    }

    /// Ping-pongs front -> back (horizontal) -> front (vertical) `passes` times.
    fn blur(
        &mut self,
        ctx: &mut dyn RenderBackend,
        front_map: &Texture2D,
        front: &FrameBuffer,
        passes: u32,
    ) -> usize {
        let (Some(front_texture), Some(back_texture), Some(back_target), Some(front_target)) = (
            front_map.handle(),
            self.texture.handle(),
            self.framebuffer.target(),
            front.target(),
        ) else {
            return 0;
        };
        let (width, height) = front_map.size();
        let texel = Vec2::new(1.0 / width as f32, 1.0 / height as f32);

        ctx.set_depth_test(false);
        ctx.set_depth_mask(false);

        let mut draws = 0;
        for _ in 0..passes {
            ctx.set_render_target(back_target);
            if self.blur.execute(ctx, front_texture, Vec2::new(texel.x, 0.0)) {
                draws += 1;
            }
            ctx.set_render_target(front_target);
            if self.blur.execute(ctx, back_texture, Vec2::new(0.0, texel.y)) {
                draws += 1;
            }
        }

        ctx.set_depth_test(true);
        ctx.set_depth_mask(true);
        draws
    }

    fn dispose(&mut self, ctx: &mut dyn RenderBackend) {
        self.framebuffer.dispose(ctx);
        self.texture.dispose(ctx);
        self.blur.dispose(ctx);
    }
}

fn shadow_texture(label: &'static str, format: TextureFormat) -> Texture2D {
    Texture2D::new(label, format, TextureFilter::Bilinear, WrapMode::Clamp)
}

fn check_atlas_limits(
    num_cascades: usize,
    shadow_map_size: u32,
    capabilities: &Capabilities,
) -> Result<()> {
    let (width, height) = AtlasLayout::new(num_cascades, shadow_map_size).texture_size();
    if width.max(height) > capabilities.max_texture_size {
        return Err(RenderError::InvalidShadowConfig(format!(
            "{num_cascades} cascades of {shadow_map_size}px need a {width}x{height} atlas, \
             device limit is {}",
            capabilities.max_texture_size
        )));
    }
    Ok(())
}

fn cascade_camera() -> Camera {
    Camera::orthographic_off_center(-1.0, 1.0, 1.0, -1.0)
}

/// Renders one directional light's cascaded shadow map.
///
/// Every frame the view frustum is cut into slices at the split distances, each slice gets an
/// orthographic camera fitted to it and to the casters in it, and all cascades are drawn into
/// tiles of one atlas texture.
pub struct CascadeShadowMapRenderer {
    num_cascades: usize,
    shadow_map_size: u32,
    filter: ShadowFilterSettings,
    map_invalid: bool,
    shadow_map: Texture2D,
    depth_buffer: DepthBuffer,
    front: FrameBuffer,
    back: Option<ShadowBackBuffer>,
    layout: AtlasLayout,
    uv_transforms: [Mat4; MAX_CASCADES],
    splits: CascadeSplits,
    cameras: Vec<Camera>,
    shadow_matrices: [Mat4; MAX_CASCADES],
    light_matrix: Mat4,
    inverse_light_matrix: Mat4,
    collector_camera: Camera,
    min_z: f32,
    cull_planes: Vec<Plane>,
    local_bounds: BoundingAabb,
    caster_collector: CascadeShadowCasterCollector,
}

impl CascadeShadowMapRenderer {
    pub fn new(ctx: &mut dyn RenderBackend, settings: &RenderSettings) -> Result<Self> {
        let num_cascades = (settings.num_cascades as usize).clamp(1, MAX_CASCADES);
        let shadow_map_size = settings.shadow_map_size.max(1);
        let filter = settings.shadow_filter.clone();
        let capabilities = ctx.capabilities();
        check_atlas_limits(num_cascades, shadow_map_size, &capabilities)?;
        let format = filter.kind.map_format(&capabilities);

        let back = if filter.kind.blurs() {
            Some(ShadowBackBuffer::new(ctx, format, &filter, &settings.debug)?)
        } else {
            None
        };

        log::debug!(
            "Created cascade shadow renderer: {} cascades, {}px tiles, {:?} filter",
            num_cascades,
            shadow_map_size,
            filter.kind
        );

        Ok(Self {
            num_cascades,
            shadow_map_size,
            filter,
            map_invalid: true,
            shadow_map: shadow_texture("ShadowMap", format),
            depth_buffer: DepthBuffer::new(),
            front: FrameBuffer::new(),
            back,
            layout: AtlasLayout::new(num_cascades, shadow_map_size),
            uv_transforms: [Mat4::IDENTITY; MAX_CASCADES],
            splits: CascadeSplits::new(num_cascades),
            cameras: (0..num_cascades).map(|_| cascade_camera()).collect(),
            shadow_matrices: [Mat4::IDENTITY; MAX_CASCADES],
            light_matrix: Mat4::IDENTITY,
            inverse_light_matrix: Mat4::IDENTITY,
            collector_camera: cascade_camera(),
            min_z: 0.0,
            cull_planes: Vec::with_capacity(10),
            local_bounds: BoundingAabb::EMPTY,
            caster_collector: CascadeShadowCasterCollector::new(num_cascades),
        })
    }

    pub fn num_cascades(&self) -> usize {
        self.num_cascades
    }

    /// Fails when the atlas for the current cascade count and tile size exceeds the device
    /// limit.
    pub fn check_limits(&self, capabilities: &Capabilities) -> Result<()> {
        check_atlas_limits(self.num_cascades, self.shadow_map_size, capabilities)
    }

    /// Resets split ratios, cameras and the caster collector and reallocates the atlas on
    /// the next render.
    pub fn set_num_cascades(&mut self, value: u32) {
        let value = (value as usize).clamp(1, MAX_CASCADES);
        if value == self.num_cascades {
            return;
        }
        self.num_cascades = value;
        self.map_invalid = true;
        self.splits = CascadeSplits::new(value);
        self.cameras = (0..value).map(|_| cascade_camera()).collect();
        self.caster_collector = CascadeShadowCasterCollector::new(value);
    }

    pub fn shadow_map_size(&self) -> u32 {
        self.shadow_map_size
    }

    pub fn set_shadow_map_size(&mut self, value: u32) {
        let value = value.max(1);
        if value == self.shadow_map_size {
            return;
        }
        self.shadow_map_size = value;
        self.map_invalid = true;
    }

    /// Overrides the split ratios: one per cascade, strictly increasing, the last being 1.
    pub fn set_split_ratios(&mut self, ratios: &[f32]) -> Result<()> {
        self.splits.set_ratios(ratios)
    }

    pub fn split_ratios(&self) -> &[f32] {
        self.splits.ratios()
    }

    pub fn split_distances(&self) -> &[f32] {
        self.splits.distances()
    }

    pub fn split_planes(&self) -> &[Plane] {
        self.splits.planes()
    }

    /// World to atlas UV and depth for one cascade. `None` past the cascade count.
    pub fn shadow_matrix(&self, cascade: usize) -> Option<Mat4> {
        self.shadow_matrices[..self.num_cascades].get(cascade).copied()
    }

    pub fn cascade_camera(&self, cascade: usize) -> Option<&Camera> {
        self.cameras.get(cascade)
    }

    pub fn collector_camera(&self) -> &Camera {
        &self.collector_camera
    }

    pub fn cull_planes(&self) -> &[Plane] {
        &self.cull_planes
    }

    pub fn caster_collector(&self) -> &CascadeShadowCasterCollector {
        &self.caster_collector
    }

    pub fn atlas(&self) -> &AtlasLayout {
        &self.layout
    }

    pub fn viewports(&self) -> Vec<Rect> {
        self.layout.viewports().collect()
    }

    pub fn shadow_map(&self) -> &Texture2D {
        &self.shadow_map
    }

    pub fn has_back_buffer(&self) -> bool {
        self.back.is_some()
    }

    pub fn filter(&self) -> &ShadowFilterSettings {
        &self.filter
    }

    /// Everything a lit pass needs to sample this map. `None` before the first render.
    pub fn binding(&self, depth_bias: f32) -> Option<ShadowBinding> {
        let shadow_map = self.shadow_map.handle()?;
        Some(ShadowBinding {
            shadow_map,
            num_cascades: self.num_cascades as u32,
            shadow_matrices: self.shadow_matrices,
            split_distances: self.splits.padded_distances(),
            filter: self.filter.kind,
            softness: self.filter.softness,
            depth_bias,
            texel_size: 1.0 / self.shadow_map_size as f32,
        })
    }

    /// Fits the cascades to `view_camera`, collects casters from `scene` and draws them.
    /// Returns the number of draw calls issued.
    pub fn render(
        &mut self,
        ctx: &mut dyn RenderBackend,
        view_camera: &Camera,
        light_matrix: Mat4,
        scene: &Scene,
    ) -> usize {
        if self.map_invalid {
            self.init_shadow_map(ctx);
        }

        self.light_matrix = light_matrix;
        self.inverse_light_matrix = light_matrix.inverse();
        self.update_collector_camera(view_camera);
        self.splits.update(view_camera);
        self.update_cull_planes(view_camera);
        self.collect_shadow_casters(scene);
        self.update_cascade_cameras(view_camera);

        let Some(target) = self.front.target() else {
            log::warn!("Shadow atlas is not allocated");
            return 0;
        };
        ctx.set_render_target(target);
        ctx.set_blend_state(None);
        ctx.set_depth_test(true);
        ctx.set_depth_mask(true);
        ctx.set_color_mask(true);
        ctx.set_clear_color(Color::WHITE);
        ctx.clear(ClearFlags::ALL);

        let mut draws = 0;
        for cascade in 0..self.num_cascades {
            let list = self.caster_collector.render_list(cascade);
            if list.is_empty() {
                continue;
            }
            ctx.set_viewport(self.layout.viewport(cascade));
            let frame = FrameContext::new(&self.cameras[cascade]);
            draws += render_pass(
                ctx,
                &frame,
                PassType::ShadowDepth,
                self.caster_collector.arena(),
                list,
            );
        }

        let blur_passes = self.filter.blurs();
        if let Some(back) = self.back.as_mut() {
            draws += back.blur(ctx, &self.shadow_map, &self.front, blur_passes);
        }

        log::trace!(
            "Shadow map: {} draws, lists {:?}",
            draws,
            (0..self.num_cascades)
                .map(|cascade| self.caster_collector.render_list(cascade).len())
                .collect::<Vec<_>>()
        );
        draws
    }

    pub fn dispose(&mut self, ctx: &mut dyn RenderBackend) {
        self.front.dispose(ctx);
        self.depth_buffer.dispose(ctx);
        self.shadow_map.dispose(ctx);
        if let Some(back) = self.back.as_mut() {
            back.dispose(ctx);
        }
        self.map_invalid = true;
    }

    fn init_shadow_map(&mut self, ctx: &mut dyn RenderBackend) {
        self.layout = AtlasLayout::new(self.num_cascades, self.shadow_map_size);
        let (width, height) = self.layout.texture_size();

        self.shadow_map.init_empty(ctx, width, height);
        self.depth_buffer.init(ctx, width, height);
        self.front
            .init(ctx, &[&self.shadow_map], Some(&self.depth_buffer));
        if let Some(back) = self.back.as_mut() {
            back.init(ctx, width, height);
        }

        self.uv_transforms = self.layout.uv_transforms();
        self.map_invalid = false;
        log::info!(
            "Shadow atlas {}x{} for {} cascades",
            width,
            height,
            self.num_cascades
        );
    }

    /// Overview camera around the whole view frustum in light space. Only its side planes are
    /// used, for culling.
    fn update_collector_camera(&mut self, view_camera: &Camera) {
        let mut min = Vec3::splat(f32::INFINITY);
        let mut max = Vec3::splat(f32::NEG_INFINITY);
        for corner in view_camera.frustum().corners() {
            let local = self.inverse_light_matrix.transform_point3(*corner);
            min = min.min(local);
            max = max.max(local);
        }

        self.min_z = min.z;

        let (width, height) = self.layout.texture_size();
        self.collector_camera.set_world_matrix(self.light_matrix);
        self.collector_camera
            .set_bounds(min.x, max.x + 1.0, max.y + 1.0, min.y);
        self.collector_camera
            .set_render_target_resolution(width, height);
    }

    fn update_cull_planes(&mut self, view_camera: &Camera) {
        self.cull_planes.clear();
        self.cull_planes
            .extend_from_slice(self.collector_camera.frustum().side_planes());

        let light_direction = (-self.light_matrix.z_axis.truncate()).normalize_or_zero();
        for plane in view_camera.frustum().planes() {
            // past these planes, shadows only fall further away from the view
            if plane.normal.dot(light_direction) > CULL_PLANE_THRESHOLD {
                self.cull_planes.push(*plane);
            }
        }
    }

    fn collect_shadow_casters(&mut self, scene: &Scene) {
        self.caster_collector.set_split_planes(self.splits.planes());
        self.caster_collector.set_cull_planes(&self.cull_planes);
        self.caster_collector.collect(scene);
    }

    fn update_cascade_cameras(&mut self, view_camera: &Camera) {
        let caster_bounds = *self.caster_collector.bounds();
        let has_casters = !caster_bounds.is_empty();
        self.local_bounds = caster_bounds.transformed(self.inverse_light_matrix);
        let min_bound = self.local_bounds.min;
        let max_bound = self.local_bounds.max;

        let (texture_width, texture_height) = self.layout.texture_size();
        let softness = self.filter.softness;
        let corners = view_camera.frustum().corners();

        let mut near_ratio = 0.0;
        for cascade in 0..self.num_cascades {
            let far_ratio = self.splits.ratios()[cascade];

            let mut min = Vec3::splat(f32::INFINITY);
            let mut max = Vec3::splat(f32::NEG_INFINITY);
            for i in 0..4 {
                let near_corner = corners[i];
                let edge = corners[i + 4] - near_corner;
                let slice_near = self
                    .inverse_light_matrix
                    .transform_point3(near_corner + edge * near_ratio);
                let slice_far = self
                    .inverse_light_matrix
                    .transform_point3(near_corner + edge * far_ratio);
                min = min.min(slice_near).min(slice_far);
                max = max.max(slice_near).max(slice_far);
            }
            near_ratio = far_ratio;

            // never reach beyond the view frustum's depth
            min.z = min.z.max(self.min_z);

            let (mut left, mut right, mut bottom, mut top) = (min.x, max.x, min.y, max.y);
            if has_casters {
                left = left.max(min_bound.x);
                right = right.min(max_bound.x);
                bottom = bottom.max(min_bound.y);
                top = top.min(max_bound.y);
            }

            let width = (((right - left) / SCALE_SNAP).ceil() * SCALE_SNAP).max(SCALE_SNAP);
            let height = (((top - bottom) / SCALE_SNAP).ceil() * SCALE_SNAP).max(SCALE_SNAP);

            // snap the origin to texel increments to avoid shimmering
            let offset_snap_x = texture_width as f32 / width * 0.5;
            let offset_snap_y = texture_height as f32 / height * 0.5;
            let left = (left * offset_snap_x).floor() / offset_snap_x;
            let bottom = (bottom * offset_snap_y).floor() / offset_snap_y;
            let right = left + width;
            let top = bottom + height;

            // casters in front of the slice still throw shadows into it, so near is not
            // clipped to the frustum
            let near = if has_casters { -max_bound.z } else { -max.z };
            let mut far = -min.z;
            if far - near < MIN_DEPTH_RANGE {
                far = near + MIN_DEPTH_RANGE;
            }

            let camera = &mut self.cameras[cascade];
            camera.set_world_matrix(self.light_matrix);
            camera.set_bounds(
                left - softness,
                right + softness,
                top + softness,
                bottom - softness,
            );
            camera.set_clip_distances(near, far);
            camera.set_render_target_resolution(texture_width, texture_height);

            self.shadow_matrices[cascade] = self.uv_transforms[cascade] * camera.view_projection();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{RecordingBackend, RenderTarget};
    use crate::shadow::ShadowFilterKind;

    fn settings(num_cascades: u32, kind: ShadowFilterKind) -> RenderSettings {
        RenderSettings {
            num_cascades,
            shadow_map_size: 256,
            shadow_filter: ShadowFilterSettings {
                kind,
                ..ShadowFilterSettings::default()
            },
            ..RenderSettings::default()
        }
    }

    fn view_camera() -> Camera {
        let mut camera = Camera::perspective(60f32.to_radians(), 0.5, 50.0);
        camera.set_render_target_resolution(320, 240);
        camera.look_at(Vec3::new(0.0, 2.0, 10.0), Vec3::ZERO, Vec3::Y);
        camera
    }

    fn sun() -> Mat4 {
        crate::scene::Transform::looking_to(Vec3::ZERO, Vec3::new(0.3, -1.0, -0.2), Vec3::X)
            .matrix()
    }

    #[test]
    fn back_buffer_only_for_blurred_filters() {
        let mut ctx = RecordingBackend::new(64, 64);
        let pcf = CascadeShadowMapRenderer::new(&mut ctx, &settings(3, ShadowFilterKind::Pcf)).unwrap();
        assert!(!pcf.has_back_buffer());
        let vsm =
            CascadeShadowMapRenderer::new(&mut ctx, &settings(3, ShadowFilterKind::Variance)).unwrap();
        assert!(vsm.has_back_buffer());
    }

    #[test]
    fn oversized_atlas_is_rejected() {
        let mut ctx = RecordingBackend::new(64, 64).with_capabilities(Capabilities {
            max_texture_size: 1024,
            ..Capabilities::default()
        });
        let mut settings = settings(3, ShadowFilterKind::Pcf);
        settings.shadow_map_size = 1024;
        assert!(matches!(
            CascadeShadowMapRenderer::new(&mut ctx, &settings),
            Err(RenderError::InvalidShadowConfig(_))
        ));
        settings.num_cascades = 1;
        assert!(CascadeShadowMapRenderer::new(&mut ctx, &settings).is_ok());
    }

    #[test]
    fn empty_scene_clears_but_draws_nothing() {
        let mut ctx = RecordingBackend::new(64, 64);
        let mut renderer =
            CascadeShadowMapRenderer::new(&mut ctx, &settings(3, ShadowFilterKind::Pcf)).unwrap();
        let draws = renderer.render(&mut ctx, &view_camera(), sun(), &Scene::new());
        assert_eq!(draws, 0);
        assert_eq!(ctx.draws().count(), 0);
        assert!(ctx
            .commands()
            .iter()
            .any(|command| matches!(command, crate::gpu::Command::Clear { color, .. } if *color == Color::WHITE)));
    }

    #[test]
    fn cascade_count_change_reallocates_atlas() {
        let mut ctx = RecordingBackend::new(64, 64);
        let mut renderer =
            CascadeShadowMapRenderer::new(&mut ctx, &settings(1, ShadowFilterKind::Pcf)).unwrap();
        let scene = Scene::new();
        renderer.render(&mut ctx, &view_camera(), sun(), &scene);
        assert_eq!(renderer.shadow_map().size(), (256, 256));

        assert!(renderer.shadow_matrix(1).is_none());
        assert!(renderer.cascade_camera(1).is_none());

        renderer.set_num_cascades(4);
        assert_eq!(renderer.split_ratios().len(), 4);
        renderer.render(&mut ctx, &view_camera(), sun(), &scene);
        assert_eq!(renderer.shadow_map().size(), (512, 512));
        assert!(renderer.shadow_matrix(3).is_some());
        assert!(renderer.cascade_camera(3).is_some());
        assert!(renderer.shadow_matrix(4).is_none());
        assert_eq!(ctx.counters().textures_created, 1);
        assert_eq!(ctx.counters().texture_reallocations, 1);
    }

    #[test]
    fn split_distances_follow_ratios() {
        let mut ctx = RecordingBackend::new(64, 64);
        let mut renderer =
            CascadeShadowMapRenderer::new(&mut ctx, &settings(3, ShadowFilterKind::Hard)).unwrap();
        renderer.set_split_ratios(&[0.1, 0.5, 1.0]).unwrap();
        renderer.render(&mut ctx, &view_camera(), sun(), &Scene::new());
        let distances = renderer.split_distances();
        assert!((distances[0] - (0.5 + 0.1 * 49.5)).abs() < 1e-4);
        assert!((distances[2] - 50.0).abs() < 1e-4);
    }

    #[test]
    fn cull_planes_include_collector_sides() {
        let mut ctx = RecordingBackend::new(64, 64);
        let mut renderer =
            CascadeShadowMapRenderer::new(&mut ctx, &settings(2, ShadowFilterKind::Pcf)).unwrap();
        renderer.render(&mut ctx, &view_camera(), sun(), &Scene::new());
        let planes = renderer.cull_planes();
        assert!(planes.len() > 4);
        assert!(planes.len() <= 10);
        assert_eq!(&planes[..4], renderer.collector_camera().frustum().side_planes());
    }

    #[test]
    fn shadow_pass_targets_the_atlas() {
        let mut ctx = RecordingBackend::new(64, 64);
        let mut renderer =
            CascadeShadowMapRenderer::new(&mut ctx, &settings(2, ShadowFilterKind::Pcf)).unwrap();
        renderer.render(&mut ctx, &view_camera(), sun(), &Scene::new());
        assert!(matches!(ctx.render_target(), RenderTarget::FrameBuffer(_)));
        assert!(renderer.binding(0.01).is_some());
    }
}
