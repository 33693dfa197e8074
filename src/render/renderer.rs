// render/renderer.rs
use crate::camera::Camera;
use crate::effect::{AmbientOcclusion, CompositePasses, Effect, EffectContext};
use crate::error::Result;
use crate::gpu::{
    ClearFlags, Color, FrameBuffer, RenderBackend, RenderTarget, Texture2D, TextureFilter,
    TextureFormat, TextureHandle, WrapMode,
};
use crate::light::{CollectedLight, Light, LightKind};
use crate::material::{FrameContext, PassType};
use crate::scene::Scene;
use crate::settings::{DebugRenderMode, RenderSettings};

use super::collector::RenderCollector;
use super::gbuffer::{GBuffer, NORMAL_DEPTH_CLEAR};
use super::hdr::HdrPingPong;
use super::item::{ItemId, RenderItemArena};
use super::pass::{render_pass, render_pass_in_bounds};
use super::stats::RendererStats;

const WHITE_TEXEL: [u8; 4] = [255, 255, 255, 255];

/// Forward renderer over HDR ping-pong buffers.
///
/// A frame runs: resize, collect, shadow maps, normal/depth, ambient occlusion, opaque base and
/// lighting, optional backbuffer copy, transparent base and lighting, effects, composite.
pub struct Renderer {
    settings: RenderSettings,
    hdr: HdrPingPong,
    gbuffer: GBuffer,
    collector: RenderCollector,
    composite: CompositePasses,
    effects: Vec<Box<dyn Effect>>,
    ambient_occlusion: Option<Box<dyn AmbientOcclusion>>,
    ao_dummy: Texture2D,
    backbuffer: Texture2D,
    backbuffer_fbo: FrameBuffer,
    render_size: (u32, u32),
    stats: RendererStats,
}

impl Renderer {
    pub fn new(ctx: &mut dyn RenderBackend, settings: RenderSettings) -> Result<Self> {
        let mut settings = settings.validate();
        let capabilities = ctx.capabilities();

        if !capabilities.float_render_targets {
            log::warn!("Float render targets unsupported, HDR buffers fall back to 8 bit");
            settings.hdr_format = TextureFormat::Rgba8Unorm;
        } else if settings.hdr_format == TextureFormat::Rgba32Float
            && !capabilities.float32_filterable
        {
            log::warn!("32-bit float textures are not filterable, using 16-bit HDR buffers");
            settings.hdr_format = TextureFormat::Rgba16Float;
        }

        let composite = CompositePasses::new(ctx, &settings.debug)?;

        let mut ao_dummy =
            Texture2D::new("AoDummy", TextureFormat::Rgba8Unorm, TextureFilter::Nearest, WrapMode::Clamp);
        ao_dummy.upload_data(ctx, 1, 1, &WHITE_TEXEL);

        log::info!(
            "Renderer created: {:?} HDR, {} cascades, {}px shadow tiles",
            settings.hdr_format,
            settings.num_cascades,
            settings.shadow_map_size
        );

        Ok(Self {
            hdr: HdrPingPong::new(settings.hdr_format),
            gbuffer: GBuffer::new(&capabilities),
            backbuffer: Texture2D::new(
                "Backbuffer",
                settings.hdr_format,
                TextureFilter::Bilinear,
                WrapMode::Clamp,
            ),
            backbuffer_fbo: FrameBuffer::new(),
            collector: RenderCollector::new(),
            composite,
            effects: Vec::new(),
            ambient_occlusion: None,
            ao_dummy,
            render_size: (0, 0),
            stats: RendererStats::default(),
            settings,
        })
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    pub fn set_depth_prepass(&mut self, enabled: bool) {
        self.settings.depth_prepass = enabled;
    }

    pub fn set_background_color(&mut self, color: Color) {
        self.settings.background_color = color;
    }

    pub fn set_debug_render_mode(&mut self, mode: DebugRenderMode) {
        self.settings.debug.render_mode = mode;
    }

    /// Shadow renderers pick up the new cascade count on their next render.
    pub fn set_num_cascades(&mut self, num_cascades: u32) {
        self.settings.num_cascades = num_cascades;
        self.settings = self.settings.clone().validate();
    }

    pub fn set_shadow_map_size(&mut self, size: u32) {
        self.settings.shadow_map_size = size;
        self.settings = self.settings.clone().validate();
    }

    /// Effects run in the order they were added.
    pub fn add_effect(&mut self, effect: Box<dyn Effect>) {
        log::debug!("Added effect '{}'", effect.name());
        self.effects.push(effect);
    }

    pub fn effects(&self) -> &[Box<dyn Effect>] {
        &self.effects
    }

    /// Replaces the ambient occlusion effect, returning the previous one so the caller can
    /// dispose it.
    pub fn set_ambient_occlusion(
        &mut self,
        ambient_occlusion: Option<Box<dyn AmbientOcclusion>>,
    ) -> Option<Box<dyn AmbientOcclusion>> {
        std::mem::replace(&mut self.ambient_occlusion, ambient_occlusion)
    }

    pub fn has_ambient_occlusion(&self) -> bool {
        self.ambient_occlusion.is_some()
    }

    pub fn collector(&self) -> &RenderCollector {
        &self.collector
    }

    pub fn hdr(&self) -> &HdrPingPong {
        &self.hdr
    }

    pub fn gbuffer(&self) -> &GBuffer {
        &self.gbuffer
    }

    pub fn render_size(&self) -> (u32, u32) {
        self.render_size
    }

    pub fn last_frame_stats(&self) -> RendererStats {
        self.stats
    }

    /// Texture the lit passes read occlusion from this frame.
    pub fn ao_texture(&self) -> Option<TextureHandle> {
        self.ambient_occlusion
            .as_ref()
            .and_then(|ao| ao.ao_texture())
            .or_else(|| self.ao_dummy.handle())
    }

    /// Renders `scene` as seen by `camera` into `output` and submits the frame.
    pub fn render(
        &mut self,
        ctx: &mut dyn RenderBackend,
        camera: &mut Camera,
        scene: &Scene,
        dt: f32,
        output: RenderTarget,
    ) -> Result<()> {
        self.stats = RendererStats::default();

        self.resize(ctx);
        let Some(hdr_target) = self.hdr.front_target() else {
            log::warn!("HDR buffers are not allocated, skipping frame");
            return Ok(());
        };
        camera.set_render_target_resolution(self.render_size.0, self.render_size.1);
        let camera = &*camera;

        self.collector.collect(camera, scene);
        self.stats.opaque_items = self.collector.opaque().len() as u32;
        self.stats.transparent_items = self.collector.transparent().len() as u32;
        self.stats.light_count = self.collector.lights().len() as u32;

        self.render_shadow_maps(ctx, camera, scene)?;

        let normal_depth = if self.needs_normal_depth(ctx) {
            self.render_normal_depth(ctx, camera)
        } else {
            None
        };

        let ao_texture = self.render_ambient_occlusion(ctx, camera, normal_depth, dt);

        let mut frame = FrameContext {
            camera,
            light: None,
            ao_texture,
            normal_depth,
            backbuffer: None,
            render_size: self.render_size,
        };

        ctx.set_render_target(hdr_target);
        ctx.set_color_mask(true);
        ctx.set_depth_mask(true);
        ctx.set_depth_test(true);
        ctx.set_blend_state(None);
        ctx.set_clear_color(self.settings.background_color);
        ctx.clear(ClearFlags::ALL);

        if self.settings.depth_prepass {
            ctx.set_color_mask(false);
            self.stats.depth_prepass_draw_calls = render_pass(
                ctx,
                &frame,
                PassType::GBufferNormalDepth,
                self.collector.arena(),
                self.collector.opaque(),
            ) as u32;
            ctx.set_color_mask(true);
        }

        self.stats.opaque_draw_calls =
            render_lit(ctx, &frame, self.collector.arena(), self.collector.opaque(), self.collector.lights())
                as u32;

        if self.collector.needs_backbuffer() {
            frame.backbuffer = self.copy_to_backbuffer(ctx);
            ctx.set_render_target(hdr_target);
        }

        self.stats.transparent_draw_calls = render_lit(
            ctx,
            &frame,
            self.collector.arena(),
            self.collector.transparent(),
            self.collector.lights(),
        ) as u32;

        let gamma_applied = self.render_effects(ctx, camera, normal_depth, dt);
        self.render_composite(ctx, output, ao_texture, gamma_applied);

        ctx.finish_frame();

        log::trace!("Frame stats: {:?}", self.stats);
        Ok(())
    }

    fn resize(&mut self, ctx: &mut dyn RenderBackend) {
        let (output_width, output_height) = ctx.output_size();
        let scale = self.settings.render_scale;
        let width = ((output_width as f32 * scale).round() as u32).max(1);
        let height = ((output_height as f32 * scale).round() as u32).max(1);
        self.hdr.resize(ctx, width, height);
        self.render_size = (width, height);
    }

    fn render_shadow_maps(
        &mut self,
        ctx: &mut dyn RenderBackend,
        camera: &Camera,
        scene: &Scene,
    ) -> Result<()> {
        for i in 0..self.collector.shadow_casting_lights().len() {
            let index = self.collector.shadow_casting_lights()[i];
            let (entity, world_matrix) = {
                let light = &self.collector.lights()[index];
                (light.entity, light.world_matrix)
            };

            let Ok(mut component) = scene.world().get::<&mut Light>(entity) else {
                continue;
            };
            let Light::Directional(light) = &mut *component else {
                continue;
            };

            let depth_bias = light
                .depth_bias
                .unwrap_or(self.settings.shadow_filter.depth_bias);
            let shadow = light.shadow_renderer_mut(ctx, &self.settings)?;
            self.stats.shadow_draw_calls += shadow.render(ctx, camera, world_matrix, scene) as u32;
            self.collector.lights_mut()[index].shadow = shadow.binding(depth_bias);
        }
        Ok(())
    }

    fn needs_normal_depth(&self, ctx: &dyn RenderBackend) -> bool {
        let capabilities = ctx.capabilities();
        self.collector.needs_normal_depth()
            || self.collector.needs_gbuffer()
            || self.ambient_occlusion.is_some()
            || self
                .effects
                .iter()
                .any(|effect| effect.is_supported(&capabilities) && effect.needs_normal_depth())
    }

    fn render_normal_depth(&mut self, ctx: &mut dyn RenderBackend, camera: &Camera) -> Option<TextureHandle> {
        let (width, height) = self.render_size;
        if self.gbuffer.init(ctx, width, height, self.hdr.depth()) {
            log::info!("Normal/depth target resized to {}x{}", width, height);
        }

        let target = self.gbuffer.target()?;
        ctx.set_render_target(target);
        ctx.set_blend_state(None);
        ctx.set_color_mask(true);
        ctx.set_depth_test(true);
        ctx.set_depth_mask(true);
        ctx.set_clear_color(NORMAL_DEPTH_CLEAR);
        ctx.clear(ClearFlags::ALL);

        let mut frame = FrameContext::new(camera);
        frame.render_size = self.render_size;
        self.stats.normal_depth_draw_calls = render_pass(
            ctx,
            &frame,
            PassType::GBufferNormalDepth,
            self.collector.arena(),
            self.collector.opaque(),
        ) as u32;

        self.gbuffer.normal_depth()
    }

    fn render_ambient_occlusion(
        &mut self,
        ctx: &mut dyn RenderBackend,
        camera: &Camera,
        normal_depth: Option<TextureHandle>,
        dt: f32,
    ) -> Option<TextureHandle> {
        let Some(ao) = self.ambient_occlusion.as_mut() else {
            return self.ao_dummy.handle();
        };
        let mut fx = EffectContext {
            ctx,
            hdr: &mut self.hdr,
            camera,
            normal_depth,
            render_size: self.render_size,
        };
        self.stats.effect_draw_calls += ao.render(&mut fx, dt) as u32;
        ao.ao_texture().or_else(|| self.ao_dummy.handle())
    }

    /// Copies the opaque result so transparent materials can sample what lies behind them.
    fn copy_to_backbuffer(&mut self, ctx: &mut dyn RenderBackend) -> Option<TextureHandle> {
        let (width, height) = self.render_size;
        self.backbuffer.init_empty(ctx, width, height);
        self.backbuffer_fbo.init(ctx, &[&self.backbuffer], None);
        let source = self.hdr.front_texture()?;
        let target = self.backbuffer_fbo.target()?;

        ctx.set_render_target(target);
        ctx.set_blend_state(None);
        ctx.set_depth_test(false);
        ctx.set_depth_mask(false);
        if self.composite.copy(ctx, source) {
            self.stats.composite_draw_calls += 1;
        }
        ctx.set_depth_test(true);
        ctx.set_depth_mask(true);
        self.backbuffer.handle()
    }

    /// Returns whether an effect already applied gamma.
    fn render_effects(
        &mut self,
        ctx: &mut dyn RenderBackend,
        camera: &Camera,
        normal_depth: Option<TextureHandle>,
        dt: f32,
    ) -> bool {
        self.hdr.swap();

        let capabilities = ctx.capabilities();
        let mut gamma_applied = false;
        for effect in &mut self.effects {
            if !effect.is_supported(&capabilities) {
                continue;
            }
            ctx.set_blend_state(None);
            ctx.set_depth_test(false);
            ctx.set_depth_mask(false);

            let mut fx = EffectContext {
                ctx: &mut *ctx,
                hdr: &mut self.hdr,
                camera,
                normal_depth,
                render_size: self.render_size,
            };
            let draws = effect.render(&mut fx, dt);
            if draws == 0 {
                // nothing written, the back buffer still holds the latest result
                continue;
            }
            self.stats.effect_draw_calls += draws as u32;
            gamma_applied |= effect.outputs_gamma();
            self.hdr.swap();
        }
        gamma_applied
    }

    fn render_composite(
        &mut self,
        ctx: &mut dyn RenderBackend,
        output: RenderTarget,
        ao_texture: Option<TextureHandle>,
        gamma_applied: bool,
    ) {
        ctx.set_render_target(output);
        ctx.set_blend_state(None);
        ctx.set_depth_test(false);
        ctx.set_depth_mask(false);
        ctx.set_color_mask(true);

        let drawn = match self.settings.debug.render_mode {
            DebugRenderMode::Ao => ao_texture
                .is_some_and(|texture| self.composite.single_channel(ctx, texture)),
            DebugRenderMode::None => match self.hdr.back_texture() {
                Some(source) if gamma_applied => self.composite.copy(ctx, source),
                Some(source) => self.composite.gamma_correct(ctx, source),
                None => false,
            },
        };
        if drawn {
            self.stats.composite_draw_calls += 1;
        }
    }

    pub fn dispose(&mut self, ctx: &mut dyn RenderBackend) {
        for effect in &mut self.effects {
            effect.dispose(ctx);
        }
        self.effects.clear();
        if let Some(mut ao) = self.ambient_occlusion.take() {
            ao.dispose(ctx);
        }
        self.composite.dispose(ctx);
        self.backbuffer_fbo.dispose(ctx);
        self.backbuffer.dispose(ctx);
        self.ao_dummy.dispose(ctx);
        self.gbuffer.dispose(ctx);
        self.hdr.dispose(ctx);
        log::info!("Renderer disposed");
    }
}

/// Base pass followed by one additive pass per light that reaches the list.
fn render_lit(
    ctx: &mut dyn RenderBackend,
    frame: &FrameContext<'_>,
    arena: &RenderItemArena,
    list: &[ItemId],
    lights: &[CollectedLight],
) -> usize {
    if list.is_empty() {
        return 0;
    }
    let mut draws = render_pass(ctx, frame, PassType::Base, arena, list);

    for light in lights {
        let lit = frame.with_light(Some(light));
        draws += match light.kind {
            LightKind::Probe { .. } => render_pass(ctx, &lit, PassType::LightProbe, arena, list),
            LightKind::Directional { .. } => render_pass(ctx, &lit, light.pass_type(), arena, list),
            LightKind::Point { .. } => render_pass_in_bounds(
                ctx,
                &lit,
                PassType::PointLight,
                arena,
                list,
                &light.world_bounds,
            ),
            LightKind::Spot { .. } => render_pass_in_bounds(
                ctx,
                &lit,
                PassType::SpotLight,
                arena,
                list,
                &light.world_bounds,
            ),
        };
    }
    draws
}
