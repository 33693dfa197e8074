use std::sync::Arc;

use glam::{Vec3, Vec4};

use hybrid_renderer::effect::{
    BlurEffect, FogEffect, Hbao, HbaoSettings, ScreenSpaceReflections, SsrSettings, TonemapEffect,
};
use hybrid_renderer::gpu::{
    Color, Command, DrawCall, MeshData, RecordingBackend, RenderBackend, RenderTarget,
};
use hybrid_renderer::light::{DirectionalLight, Light, PointLight};
use hybrid_renderer::material::standard::BACKBUFFER_SLOT;
use hybrid_renderer::material::{Material, PassType, StandardMaterial, SurfaceParams};
use hybrid_renderer::render::HdrPingPong;
use hybrid_renderer::scene::{ModelInstance, Scene, Transform};
use hybrid_renderer::settings::{DebugRenderMode, DebugSettings};
use hybrid_renderer::{Camera, RenderError, RenderSettings, Renderer};

struct Fixture {
    ctx: RecordingBackend,
    renderer: Renderer,
    materials: StandardMaterial,
    scene: Scene,
    camera: Camera,
}

impl Fixture {
    fn new(settings: RenderSettings) -> Self {
        let mut ctx = RecordingBackend::new(320, 240);
        let renderer = Renderer::new(&mut ctx, settings.clone()).unwrap();
        let materials = StandardMaterial::new(&mut ctx, &settings.debug).unwrap();
        let mut camera = Camera::perspective(60f32.to_radians(), 0.5, 100.0);
        camera.look_at(Vec3::new(0.0, 2.0, 0.0), Vec3::new(0.0, 0.0, -10.0), Vec3::Y);
        Self {
            ctx,
            renderer,
            materials,
            scene: Scene::new(),
            camera,
        }
    }

    fn spawn_cube(&mut self, material: &Arc<Material>, position: Vec3) -> hecs::Entity {
        let data = MeshData::cuboid([0.5, 0.5, 0.5]);
        let bounds = data.bounds();
        let mesh = self.ctx.create_mesh(&data);
        self.scene.spawn_model(
            "cube",
            Transform::from_translation(position),
            ModelInstance::single(mesh, Arc::clone(material), bounds),
        )
    }

    fn spawn_point_light(&mut self, position: Vec3, radius: f32) -> hecs::Entity {
        self.scene.spawn_light(
            "lamp",
            Transform::from_translation(position),
            Light::Point(PointLight {
                color: Vec3::ONE,
                intensity: 1.0,
                radius,
            }),
        )
    }

    fn spawn_sun(&mut self) -> hecs::Entity {
        self.scene.spawn_light(
            "sun",
            Transform::looking_to(Vec3::ZERO, Vec3::new(0.2, -1.0, -0.3), Vec3::X),
            Light::Directional(DirectionalLight::new(Vec3::ONE, 3.0).with_shadows(true)),
        )
    }

    fn render(&mut self) {
        self.scene.update_world_transforms();
        self.ctx.clear_commands();
        self.renderer
            .render(
                &mut self.ctx,
                &mut self.camera,
                &self.scene,
                0.016,
                RenderTarget::Output,
            )
            .unwrap();
    }

    fn draws_with_program(&self, label: &str) -> Vec<&DrawCall> {
        self.ctx
            .draws()
            .filter(|draw| {
                draw.program
                    .and_then(|program| self.ctx.program_label(program))
                    == Some(label)
            })
            .collect()
    }

    fn output_draws(&self) -> Vec<&str> {
        self.ctx
            .draws_to(RenderTarget::Output)
            .filter_map(|draw| draw.program.and_then(|program| self.ctx.program_label(program)))
            .collect()
    }
}

fn grey() -> SurfaceParams {
    SurfaceParams::color(Vec4::new(0.6, 0.6, 0.6, 1.0))
}

#[test]
fn steady_frames_allocate_nothing() {
    let mut fixture = Fixture::new(RenderSettings::default());
    let material = fixture.materials.create("grey", grey());
    fixture.spawn_cube(&material, Vec3::new(0.0, 0.0, -8.0));
    fixture.spawn_cube(&material, Vec3::new(2.0, 0.0, -20.0));
    fixture.spawn_sun();
    fixture.spawn_point_light(Vec3::new(0.0, 1.0, -8.0), 4.0);

    let debug = DebugSettings::default();
    let hbao = Hbao::new(&mut fixture.ctx, HbaoSettings::default(), &debug).unwrap();
    fixture.renderer.set_ambient_occlusion(Some(Box::new(hbao)));
    let blur = BlurEffect::new(&mut fixture.ctx, 3, &debug).unwrap();
    fixture.renderer.add_effect(Box::new(blur));
    let fog = FogEffect::new(&mut fixture.ctx, &debug).unwrap();
    fixture.renderer.add_effect(Box::new(fog));

    fixture.render();
    let after_first = fixture.ctx.counters();
    let live_textures = fixture.ctx.live_textures();

    fixture.render();
    assert_eq!(fixture.ctx.counters(), after_first);
    assert_eq!(fixture.ctx.live_textures(), live_textures);

    fixture.ctx.set_output_size(640, 480);
    fixture.render();
    assert!(fixture.ctx.counters().texture_reallocations > after_first.texture_reallocations);
    assert_eq!(fixture.renderer.render_size(), (640, 480));
}

#[test]
fn render_scale_sizes_the_hdr_buffers() {
    let settings = RenderSettings {
        render_scale: 0.5,
        ..RenderSettings::default()
    };
    let mut fixture = Fixture::new(settings);
    fixture.render();
    assert_eq!(fixture.renderer.render_size(), (160, 120));
    assert_eq!(fixture.renderer.hdr().size(), (160, 120));
    assert_eq!(fixture.camera.render_target_resolution().x, 160);
}

#[test]
fn hdr_swap_twice_restores_the_buffers() {
    let mut ctx = RecordingBackend::new(64, 64);
    let mut hdr = HdrPingPong::new(RenderSettings::default().hdr_format);
    hdr.resize(&mut ctx, 64, 64);
    let (front, back) = (hdr.front_texture(), hdr.back_texture());
    assert_ne!(front, back);

    hdr.swap();
    assert_eq!((hdr.front_texture(), hdr.back_texture()), (back, front));
    hdr.swap();
    assert_eq!((hdr.front_texture(), hdr.back_texture()), (front, back));
}

#[test]
fn point_light_out_of_reach_draws_nothing() {
    let mut fixture = Fixture::new(RenderSettings::default());
    let material = fixture.materials.create("grey", grey());
    fixture.spawn_cube(&material, Vec3::new(0.0, 0.0, -8.0));
    fixture.spawn_point_light(Vec3::new(10.0, 0.0, -40.0), 2.0);
    fixture.render();

    assert_eq!(fixture.renderer.collector().lights().len(), 1);
    assert!(fixture.draws_with_program("standard_point_light").is_empty());
    assert_eq!(fixture.draws_with_program("standard_base").len(), 1);

    fixture.spawn_point_light(Vec3::new(0.5, 0.0, -8.0), 2.0);
    fixture.render();
    let lit = fixture.draws_with_program("standard_point_light");
    assert_eq!(lit.len(), 1);
    assert!(lit[0].blend.is_some());
    assert!(!lit[0].depth_write);
}

#[test]
fn shadowed_sun_uses_the_shadow_pass() {
    let mut fixture = Fixture::new(RenderSettings::default());
    let material = fixture.materials.create("grey", grey());
    fixture.spawn_cube(&material, Vec3::new(0.0, 0.0, -8.0));
    fixture.spawn_sun();
    fixture.render();

    assert_eq!(fixture.draws_with_program("standard_dir_light_shadow").len(), 1);
    assert!(fixture.draws_with_program("standard_dir_light").is_empty());
    assert!(!fixture.draws_with_program("standard_shadow_depth").is_empty());
    assert!(fixture.renderer.collector().lights()[0].shadow.is_some());
}

#[test]
fn opaque_draws_before_transparent_then_composite() {
    let mut fixture = Fixture::new(RenderSettings::default());
    let opaque = fixture.materials.create("grey", grey());
    let glass = fixture
        .materials
        .create("glass", SurfaceParams::color(Vec4::new(0.2, 0.4, 1.0, 0.5)));
    fixture.spawn_cube(&glass, Vec3::new(0.0, 0.0, -4.0));
    fixture.spawn_cube(&opaque, Vec3::new(0.0, 0.0, -12.0));
    fixture.render();

    let base: Vec<_> = fixture.draws_with_program("standard_base");
    assert_eq!(base.len(), 2);
    assert!(base[0].blend.is_none() && base[0].depth_write);
    assert!(base[1].blend.is_some() && !base[1].depth_write);

    assert_eq!(fixture.output_draws(), vec!["gamma_copy"]);
    assert!(matches!(fixture.ctx.commands().last(), Some(Command::FinishFrame)));

    let stats = fixture.renderer.last_frame_stats();
    assert_eq!(stats.opaque_items, 1);
    assert_eq!(stats.transparent_items, 1);
    assert_eq!(stats.composite_draw_calls, 1);
}

#[test]
fn hdr_target_is_cleared_with_the_background() {
    let mut fixture = Fixture::new(RenderSettings::default());
    fixture.renderer.set_background_color(Color::new(0.1, 0.2, 0.3, 1.0));
    fixture.render();

    let hdr_target = fixture.renderer.hdr().back().target().unwrap();
    assert!(fixture.ctx.commands().iter().any(|command| matches!(
        command,
        Command::Clear { target, color, .. }
            if *target == hdr_target && *color == Color::new(0.1, 0.2, 0.3, 1.0)
    )));
}

#[test]
fn gamma_effect_turns_composite_into_a_copy() {
    let mut fixture = Fixture::new(RenderSettings::default());
    let tonemap = TonemapEffect::new(&mut fixture.ctx, &DebugSettings::default()).unwrap();
    fixture.renderer.add_effect(Box::new(tonemap));
    fixture.render();

    assert_eq!(fixture.draws_with_program("tonemap").len(), 1);
    assert_eq!(fixture.output_draws(), vec!["copy"]);
    assert_eq!(fixture.renderer.last_frame_stats().effect_draw_calls, 1);
}

#[test]
fn ao_debug_mode_shows_the_occlusion_texture() {
    let mut fixture = Fixture::new(RenderSettings::default());
    let material = fixture.materials.create("grey", grey());
    fixture.spawn_cube(&material, Vec3::new(0.0, 0.0, -8.0));
    let hbao = Hbao::new(&mut fixture.ctx, HbaoSettings::default(), &DebugSettings::default())
        .unwrap();
    fixture.renderer.set_ambient_occlusion(Some(Box::new(hbao)));
    fixture.renderer.set_debug_render_mode(DebugRenderMode::Ao);
    fixture.render();

    assert_eq!(fixture.output_draws(), vec!["single_channel_copy"]);
    assert_eq!(fixture.draws_with_program("standard_normal_depth").len(), 1);
    assert_eq!(fixture.draws_with_program("hbao").len(), 1);
    assert_eq!(fixture.draws_with_program("ao_blur").len(), 2);
    assert_ne!(fixture.renderer.ao_texture(), None);
}

#[test]
fn depth_prepass_writes_depth_only() {
    let mut fixture = Fixture::new(RenderSettings {
        depth_prepass: true,
        ..RenderSettings::default()
    });
    let material = fixture.materials.create("grey", grey());
    fixture.spawn_cube(&material, Vec3::new(0.0, 0.0, -8.0));
    fixture.spawn_cube(&material, Vec3::new(1.0, 0.0, -10.0));
    fixture.render();

    let prepass: Vec<_> = fixture
        .ctx
        .draws()
        .filter(|draw| !draw.color_write)
        .collect();
    assert_eq!(prepass.len(), 2);
    assert!(prepass.iter().all(|draw| draw.depth_write));
    assert_eq!(fixture.renderer.last_frame_stats().depth_prepass_draw_calls, 2);
}

#[test]
fn refracting_material_reads_a_copy_of_the_opaque_image() {
    let mut fixture = Fixture::new(RenderSettings::default());
    let opaque = fixture.materials.create("grey", grey());
    let water = fixture.materials.create(
        "water",
        SurfaceParams {
            needs_backbuffer: true,
            ..SurfaceParams::color(Vec4::new(0.1, 0.3, 0.5, 0.7))
        },
    );
    fixture.spawn_cube(&opaque, Vec3::new(0.0, 0.0, -12.0));
    fixture.spawn_cube(&water, Vec3::new(0.0, 0.0, -5.0));
    fixture.render();

    assert!(fixture.renderer.collector().needs_backbuffer());
    assert_eq!(fixture.draws_with_program("copy").len(), 1);
    assert!(fixture.ctx.commands().iter().any(|command| matches!(
        command,
        Command::BindTexture { slot, .. } if *slot == BACKBUFFER_SLOT
    )));
}

#[test]
fn backbuffer_copy_reuses_its_texture_at_a_steady_size() {
    let mut fixture = Fixture::new(RenderSettings::default());
    let opaque = fixture.materials.create("grey", grey());
    let water = fixture.materials.create(
        "water",
        SurfaceParams {
            needs_backbuffer: true,
            ..SurfaceParams::color(Vec4::new(0.1, 0.3, 0.5, 0.7))
        },
    );
    fixture.spawn_cube(&opaque, Vec3::new(0.0, 0.0, -12.0));
    fixture.spawn_cube(&water, Vec3::new(0.0, 0.0, -5.0));

    fixture.render();
    let after_first = fixture.ctx.counters();

    fixture.render();
    let after_second = fixture.ctx.counters();
    assert_eq!(fixture.draws_with_program("copy").len(), 1);
    assert_eq!(after_second.textures_created, after_first.textures_created);
    assert_eq!(after_second.texture_reallocations, after_first.texture_reallocations);
    assert_eq!(after_second.framebuffers_created, after_first.framebuffers_created);

    fixture.ctx.set_output_size(400, 300);
    fixture.render();
    let after_resize = fixture.ctx.counters();
    assert_eq!(after_resize.textures_created, after_first.textures_created);
    assert!(after_resize.texture_reallocations > after_second.texture_reallocations);
    let copy = fixture.draws_with_program("copy");
    assert_eq!(copy[0].viewport.width, 400);
}

#[test]
fn reflections_trace_the_normal_depth_buffer_into_the_hdr_chain() {
    let mut fixture = Fixture::new(RenderSettings::default());
    let material = fixture.materials.create("grey", grey());
    fixture.spawn_cube(&material, Vec3::new(0.0, 0.0, -8.0));
    let ssr = ScreenSpaceReflections::new(
        &mut fixture.ctx,
        SsrSettings::default(),
        &DebugSettings::default(),
    )
    .unwrap();
    fixture.renderer.add_effect(Box::new(ssr));
    fixture.render();

    assert_eq!(fixture.draws_with_program("standard_normal_depth").len(), 1);

    let trace = fixture.draws_with_program("ssr");
    assert_eq!(trace.len(), 1);
    assert_eq!((trace[0].viewport.width, trace[0].viewport.height), (160, 120));

    let composite = fixture.draws_with_program("ssr_composite");
    assert_eq!(composite.len(), 1);
    assert_eq!(Some(composite[0].target), fixture.renderer.hdr().back().target());
    assert_eq!(fixture.renderer.last_frame_stats().effect_draw_calls, 2);
    assert_eq!(fixture.output_draws(), vec!["gamma_copy"]);
}

#[test]
fn failed_blur_leaves_the_lit_image_for_the_composite() {
    let mut fixture = Fixture::new(RenderSettings {
        debug: DebugSettings::lenient(),
        ..RenderSettings::default()
    });
    let background = Color::new(0.1, 0.2, 0.3, 1.0);
    fixture.renderer.set_background_color(background);
    fixture.ctx.fail_programs_matching("gaussian_blur");
    let blur = BlurEffect::new(&mut fixture.ctx, 3, &DebugSettings::lenient()).unwrap();
    fixture.renderer.add_effect(Box::new(blur));
    fixture.render();

    assert!(fixture.draws_with_program("gaussian_blur").is_empty());
    assert_eq!(fixture.renderer.last_frame_stats().effect_draw_calls, 0);

    let lit = fixture.renderer.hdr().back().target().unwrap();
    assert!(fixture.ctx.commands().iter().any(|command| matches!(
        command,
        Command::Clear { target, color, .. } if *target == lit && *color == background
    )));
}

#[test]
fn materials_without_a_pass_are_not_drawn_in_it() {
    let mut fixture = Fixture::new(RenderSettings::default());
    let unlit = fixture
        .materials
        .create_with_passes("unlit", grey(), &[PassType::Base]);
    fixture.spawn_cube(&unlit, Vec3::new(0.0, 0.0, -8.0));
    fixture.spawn_sun();
    fixture.render();

    assert_eq!(fixture.draws_with_program("standard_base").len(), 1);
    assert!(fixture.draws_with_program("standard_dir_light_shadow").is_empty());
    assert!(fixture.draws_with_program("standard_shadow_depth").is_empty());
}

#[test]
fn strict_shader_errors_abort_construction() {
    let mut ctx = RecordingBackend::new(64, 64);
    ctx.fail_programs_matching("gamma");
    let result = Renderer::new(&mut ctx, RenderSettings::default());
    assert!(matches!(result, Err(RenderError::ShaderCompilation { .. })));
}

#[test]
fn lenient_shader_errors_skip_the_broken_pass() {
    let mut ctx = RecordingBackend::new(64, 64);
    ctx.fail_programs_matching("gamma");
    ctx.fail_programs_matching("point_light");
    let settings = RenderSettings {
        debug: DebugSettings::lenient(),
        ..RenderSettings::default()
    };
    let mut renderer = Renderer::new(&mut ctx, settings.clone()).unwrap();
    let materials = StandardMaterial::new(&mut ctx, &settings.debug).unwrap();
    assert!(!materials.is_ready());

    let material = materials.create("grey", grey());
    let mut scene = Scene::new();
    let data = MeshData::cuboid([0.5, 0.5, 0.5]);
    let bounds = data.bounds();
    let mesh = ctx.create_mesh(&data);
    scene.spawn_model(
        "cube",
        Transform::from_translation(Vec3::new(0.0, 0.0, -5.0)),
        ModelInstance::single(mesh, material, bounds),
    );
    scene.spawn_light(
        "lamp",
        Transform::from_translation(Vec3::new(0.0, 0.0, -4.0)),
        Light::Point(PointLight {
            color: Vec3::ONE,
            intensity: 1.0,
            radius: 3.0,
        }),
    );
    scene.update_world_transforms();

    let mut camera = Camera::perspective(60f32.to_radians(), 0.5, 50.0);
    camera.look_at(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y);
    renderer
        .render(&mut ctx, &mut camera, &scene, 0.016, RenderTarget::Output)
        .unwrap();

    assert_eq!(ctx.draws_to(RenderTarget::Output).count(), 0);
    assert_eq!(renderer.last_frame_stats().opaque_draw_calls, 1);
    assert!(matches!(ctx.commands().last(), Some(Command::FinishFrame)));
}
