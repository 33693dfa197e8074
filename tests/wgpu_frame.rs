use std::sync::Arc;

use glam::{Vec3, Vec4};

use hybrid_renderer::effect::{BlurEffect, FogEffect, Hbao, HbaoSettings, TonemapEffect};
use hybrid_renderer::gpu::{MeshData, ProgramSource, RenderBackend, RenderTarget, WgpuBackend};
use hybrid_renderer::light::{DirectionalLight, Light, LightProbe, PointLight};
use hybrid_renderer::material::{Material, StandardMaterial, SurfaceParams};
use hybrid_renderer::render::RendererStats;
use hybrid_renderer::scene::{ModelInstance, Scene, Transform};
use hybrid_renderer::settings::DebugSettings;
use hybrid_renderer::shadow::ShadowFilterKind;
use hybrid_renderer::{Camera, RenderError, RenderSettings, Renderer};

fn headless(width: u32, height: u32) -> Option<WgpuBackend> {
    hybrid_renderer::init_logging();
    match WgpuBackend::new_headless(width, height) {
        Ok(ctx) => Some(ctx),
        Err(RenderError::NoAdapter) => {
            eprintln!("no GPU adapter available, skipping");
            None
        }
        Err(err) => panic!("failed to create headless device: {err}"),
    }
}

fn capture_validation_errors(ctx: &WgpuBackend) {
    ctx.device().push_error_scope(wgpu::ErrorFilter::Validation);
}

fn assert_no_validation_errors(ctx: &WgpuBackend) {
    let error = pollster::block_on(ctx.device().pop_error_scope());
    assert!(error.is_none(), "validation error: {error:?}");
}

fn spawn_box(
    scene: &mut Scene,
    ctx: &mut dyn RenderBackend,
    material: &Arc<Material>,
    half_extents: [f32; 3],
    position: Vec3,
) {
    let data = MeshData::cuboid(half_extents);
    let bounds = data.bounds();
    let mesh = ctx.create_mesh(&data);
    scene.spawn_model(
        "box",
        Transform::from_translation(position),
        ModelInstance::single(mesh, Arc::clone(material), bounds),
    );
}

fn build_scene(ctx: &mut dyn RenderBackend, materials: &StandardMaterial) -> Scene {
    let grey = materials.create("grey", SurfaceParams::color(Vec4::new(0.6, 0.6, 0.6, 1.0)));
    let water = materials.create(
        "water",
        SurfaceParams {
            needs_backbuffer: true,
            ..SurfaceParams::color(Vec4::new(0.1, 0.3, 0.5, 0.7))
        },
    );

    let mut scene = Scene::new();
    spawn_box(&mut scene, ctx, &grey, [20.0, 0.1, 20.0], Vec3::new(0.0, -1.0, -10.0));
    spawn_box(&mut scene, ctx, &grey, [0.5, 0.5, 0.5], Vec3::new(0.0, 0.0, -6.0));
    spawn_box(&mut scene, ctx, &water, [1.0, 0.2, 1.0], Vec3::new(1.5, -0.5, -4.0));

    scene.spawn_light(
        "sun",
        Transform::looking_to(Vec3::ZERO, Vec3::new(0.3, -1.0, -0.2), Vec3::X),
        Light::Directional(DirectionalLight::new(Vec3::ONE, 3.0).with_shadows(true)),
    );
    scene.spawn_light(
        "lamp",
        Transform::from_translation(Vec3::new(0.0, 1.0, -6.0)),
        Light::Point(PointLight {
            color: Vec3::new(1.0, 0.8, 0.6),
            intensity: 2.0,
            radius: 4.0,
        }),
    );
    scene.spawn_light(
        "sky",
        Transform::IDENTITY,
        Light::Probe(LightProbe::uniform_ambient(Vec3::splat(0.2))),
    );
    scene.update_world_transforms();
    scene
}

fn camera() -> Camera {
    let mut camera = Camera::perspective(60f32.to_radians(), 0.1, 60.0);
    camera.look_at(Vec3::new(0.0, 2.0, 2.0), Vec3::new(0.0, 0.0, -8.0), Vec3::Y);
    camera
}

fn add_effects(ctx: &mut WgpuBackend, renderer: &mut Renderer) {
    let debug = DebugSettings::default();
    let hbao = Hbao::new(ctx, HbaoSettings::default(), &debug).unwrap();
    renderer.set_ambient_occlusion(Some(Box::new(hbao)));
    renderer.add_effect(Box::new(FogEffect::new(ctx, &debug).unwrap()));
    renderer.add_effect(Box::new(BlurEffect::new(ctx, 2, &debug).unwrap()));
    renderer.add_effect(Box::new(TonemapEffect::new(ctx, &debug).unwrap()));
}

/// Renders three frames with `filter` and returns the stats of the last one.
fn render_frames(ctx: &mut WgpuBackend, filter: ShadowFilterKind) -> RendererStats {
    let mut settings = RenderSettings::default();
    settings.shadow_filter.kind = filter;

    capture_validation_errors(ctx);
    let mut renderer = Renderer::new(ctx, settings.clone()).unwrap();
    add_effects(ctx, &mut renderer);
    let materials = StandardMaterial::new(ctx, &settings.debug).unwrap();
    let scene = build_scene(ctx, &materials);
    assert_no_validation_errors(ctx);

    let mut camera = camera();
    for _ in 0..3 {
        capture_validation_errors(ctx);
        renderer
            .render(ctx, &mut camera, &scene, 0.016, RenderTarget::Output)
            .unwrap();
        assert_no_validation_errors(ctx);
    }
    let stats = renderer.last_frame_stats();

    drop(scene);
    drop(materials);
    renderer.dispose(ctx);
    stats
}

#[test]
fn frames_render_with_every_shadow_filter() {
    let Some(mut ctx) = headless(64, 64) else {
        return;
    };

    let pcf = render_frames(&mut ctx, ShadowFilterKind::Pcf);
    let hard = render_frames(&mut ctx, ShadowFilterKind::Hard);
    let variance = render_frames(&mut ctx, ShadowFilterKind::Variance);

    for stats in [pcf, hard, variance] {
        assert_eq!(stats.light_count, 3);
        assert_eq!(stats.opaque_items, 2);
        assert_eq!(stats.transparent_items, 1);
        assert!(stats.shadow_draw_calls > 0);
        // base, sun and probe for both opaque items, plus the lamp where it reaches
        assert!(stats.opaque_draw_calls >= 6, "{stats:?}");
        // hbao with its two blurs, fog, two blur directions, tonemap
        assert_eq!(stats.effect_draw_calls, 7);
        assert_eq!(stats.composite_draw_calls, 2);
    }
    assert_eq!(pcf.shadow_draw_calls, hard.shadow_draw_calls);
    assert!(variance.shadow_draw_calls > pcf.shadow_draw_calls);
}

#[test]
fn resizing_the_output_between_frames() {
    let Some(mut ctx) = headless(64, 64) else {
        return;
    };
    let settings = RenderSettings::default();
    let mut renderer = Renderer::new(&mut ctx, settings.clone()).unwrap();
    add_effects(&mut ctx, &mut renderer);
    let materials = StandardMaterial::new(&mut ctx, &settings.debug).unwrap();
    let scene = build_scene(&mut ctx, &materials);
    let mut camera = camera();

    for (width, height) in [(64, 64), (96, 48), (96, 48), (32, 80)] {
        ctx.resize_headless(width, height);
        capture_validation_errors(&ctx);
        renderer
            .render(&mut ctx, &mut camera, &scene, 0.016, RenderTarget::Output)
            .unwrap();
        assert_no_validation_errors(&ctx);
        assert_eq!(renderer.render_size(), (width, height));
        assert_eq!(ctx.output_size(), (width, height));
        let output = ctx.headless_output().map(|texture| (texture.width(), texture.height()));
        assert_eq!(output, Some((width, height)));
    }

    assert!(ctx.cached_bind_groups() > 0);
    renderer.dispose(&mut ctx);
    assert_eq!(ctx.cached_bind_groups(), 0);
}

#[test]
fn invalid_wgsl_is_reported_as_a_compile_error() {
    let Some(mut ctx) = headless(8, 8) else {
        return;
    };
    let source = ProgramSource::fullscreen(
        "broken",
        "fn vs_fullscreen() {} fn fs_broken() -> f32 { return undefined_value; }",
        "fs_broken",
    );
    assert!(matches!(
        ctx.create_program(&source),
        Err(RenderError::ShaderCompilation { .. })
    ));

    let missing = ProgramSource::fullscreen("missing", "fn vs_fullscreen() {}", "fs_missing");
    assert!(matches!(
        ctx.create_program(&missing),
        Err(RenderError::ProgramLink { .. })
    ));
}
