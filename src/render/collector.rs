// render/collector.rs
use std::cmp::Ordering;
use std::sync::Arc;

use glam::{Mat4, Vec3};

use crate::camera::Camera;
use crate::light::{CollectedLight, Light};
use crate::math::{BoundingAabb, Plane};
use crate::scene::{ModelInstance, Scene, SceneVisitor};

use super::item::{CameraRef, ItemId, RenderItem, RenderItemArena, RenderList};

/// Gathers what one camera sees in one walk over the scene.
///
/// Opaque items come out sorted front to back, transparent ones back to front. Lights keep
/// the order the scene visited them in.
#[derive(Debug, Default)]
pub struct RenderCollector {
    frustum_planes: [Plane; 6],
    view_matrix: Mat4,
    arena: RenderItemArena,
    opaque: RenderList,
    transparent: RenderList,
    lights: Vec<CollectedLight>,
    shadow_casting_lights: Vec<usize>,
    needs_normal_depth: bool,
    needs_gbuffer: bool,
    needs_backbuffer: bool,
    bounds: BoundingAabb,
}

impl RenderCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collect(&mut self, camera: &Camera, scene: &Scene) {
        self.reset();
        self.frustum_planes = *camera.frustum().planes();
        self.view_matrix = camera.view_matrix();

        scene.accept_visitor(self);

        let arena = &self.arena;
        let hint = |id: &ItemId| arena.get(*id).map_or(0.0, |item| item.render_order_hint);
        self.opaque
            .sort_by(|a, b| hint(a).partial_cmp(&hint(b)).unwrap_or(Ordering::Equal));
        self.transparent
            .sort_by(|a, b| hint(b).partial_cmp(&hint(a)).unwrap_or(Ordering::Equal));

        log::trace!(
            "Collected {} opaque, {} transparent, {} lights",
            self.opaque.len(),
            self.transparent.len(),
            self.lights.len()
        );
    }

    fn reset(&mut self) {
        self.arena.reset();
        self.opaque.clear();
        self.transparent.clear();
        self.lights.clear();
        self.shadow_casting_lights.clear();
        self.needs_normal_depth = false;
        self.needs_gbuffer = false;
        self.needs_backbuffer = false;
        self.bounds.clear();
    }

    pub fn arena(&self) -> &RenderItemArena {
        &self.arena
    }

    pub fn opaque(&self) -> &[ItemId] {
        &self.opaque
    }

    pub fn transparent(&self) -> &[ItemId] {
        &self.transparent
    }

    pub fn lights(&self) -> &[CollectedLight] {
        &self.lights
    }

    pub fn lights_mut(&mut self) -> &mut [CollectedLight] {
        &mut self.lights
    }

    /// Indices into [`RenderCollector::lights`] of the lights that cast shadows.
    pub fn shadow_casting_lights(&self) -> &[usize] {
        &self.shadow_casting_lights
    }

    pub fn needs_normal_depth(&self) -> bool {
        self.needs_normal_depth
    }

    pub fn needs_gbuffer(&self) -> bool {
        self.needs_gbuffer
    }

    pub fn needs_backbuffer(&self) -> bool {
        self.needs_backbuffer
    }

    /// World bounds of every collected model.
    pub fn bounds(&self) -> &BoundingAabb {
        &self.bounds
    }

    fn view_depth(&self, point: Vec3) -> f32 {
        -self.view_matrix.transform_point3(point).z
    }
}

impl SceneVisitor for RenderCollector {
    fn qualifies(&self, visible: bool, world_bounds: &BoundingAabb) -> bool {
        visible && world_bounds.intersects_convex_solid(&self.frustum_planes)
    }

    fn visit_model_instance(
        &mut self,
        entity: hecs::Entity,
        instance: &ModelInstance,
        world_matrix: &Mat4,
        world_bounds: &BoundingAabb,
    ) {
        let depth = self.view_depth(world_bounds.center());
        let mut collected = false;

        for mesh in &instance.meshes {
            let material = &mesh.material;
            let Some(pass_type) = material.primary_pass() else {
                continue;
            };

            let id = self.arena.push(RenderItem {
                entity,
                world_matrix: *world_matrix,
                mesh: mesh.mesh,
                skeleton_matrices: mesh.skeleton_matrices.clone(),
                material: Arc::clone(material),
                pass_type,
                camera: CameraRef::View,
                world_bounds: *world_bounds,
                render_order_hint: depth,
            });

            if material.is_transparent() {
                self.transparent.push(id);
            } else {
                self.opaque.push(id);
            }

            self.needs_normal_depth |= material.needs_normal_depth();
            self.needs_gbuffer |= material.needs_gbuffer();
            self.needs_backbuffer |= material.needs_backbuffer();
            collected = true;
        }

        if collected {
            self.bounds.grow_to_include(world_bounds);
        }
    }

    fn visit_light(&mut self, entity: hecs::Entity, light: &Light, world_matrix: &Mat4) {
        if light.cast_shadows() {
            self.shadow_casting_lights.push(self.lights.len());
        }
        self.lights
            .push(CollectedLight::new(entity, light, world_matrix));
    }
}
