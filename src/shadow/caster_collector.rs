use std::sync::Arc;

use glam::Mat4;

use crate::material::PassType;
use crate::math::{BoundingAabb, Plane, PlaneSide};
use crate::render::item::{CameraRef, ItemId, RenderItem, RenderItemArena, RenderList};
use crate::scene::{ModelInstance, Scene, SceneVisitor};

use super::MAX_CASCADES;

/// Sorts shadow casters into per-cascade draw lists.
///
/// A caster is tested against the split planes from nearest to farthest. Lying entirely beyond
/// a split keeps it out of that cascade. Lying entirely before a split means no farther cascade
/// can see it, so testing stops there. The last cascade needs no test.
#[derive(Debug)]
pub struct CascadeShadowCasterCollector {
    num_cascades: usize,
    split_planes: [Plane; MAX_CASCADES],
    cull_planes: Vec<Plane>,
    arena: RenderItemArena,
    lists: [RenderList; MAX_CASCADES],
    bounds: BoundingAabb,
}

impl CascadeShadowCasterCollector {
    pub fn new(num_cascades: usize) -> Self {
        Self {
            num_cascades: num_cascades.clamp(1, MAX_CASCADES),
            split_planes: [Plane::default(); MAX_CASCADES],
            cull_planes: Vec::new(),
            arena: RenderItemArena::new(),
            lists: Default::default(),
            bounds: BoundingAabb::EMPTY,
        }
    }

    pub fn num_cascades(&self) -> usize {
        self.num_cascades
    }

    pub fn set_split_planes(&mut self, planes: &[Plane]) {
        for (target, plane) in self.split_planes.iter_mut().zip(planes) {
            *target = *plane;
        }
    }

    pub fn set_cull_planes(&mut self, planes: &[Plane]) {
        self.cull_planes.clear();
        self.cull_planes.extend_from_slice(planes);
    }

    pub fn collect(&mut self, scene: &Scene) {
        self.bounds.clear();
        self.arena.reset();
        for list in &mut self.lists {
            list.clear();
        }
        scene.accept_visitor(self);
    }

    pub fn render_list(&self, cascade: usize) -> &[ItemId] {
        &self.lists[cascade]
    }

    pub fn arena(&self) -> &RenderItemArena {
        &self.arena
    }

    /// World-space bounds of every caster seen in the last collection.
    pub fn bounds(&self) -> &BoundingAabb {
        &self.bounds
    }

    fn add_to_cascade(
        &mut self,
        cascade: usize,
        entity: hecs::Entity,
        instance: &ModelInstance,
        world_matrix: &Mat4,
        world_bounds: &BoundingAabb,
    ) {
        for mesh in &instance.meshes {
            if !mesh.material.has_pass(PassType::ShadowDepth) {
                continue;
            }
            let id = self.arena.push(RenderItem {
                entity,
                world_matrix: *world_matrix,
                mesh: mesh.mesh,
                skeleton_matrices: mesh.skeleton_matrices.clone(),
                material: Arc::clone(&mesh.material),
                pass_type: PassType::ShadowDepth,
                camera: CameraRef::Cascade(cascade as u8),
                world_bounds: *world_bounds,
                render_order_hint: 0.0,
            });
            self.lists[cascade].push(id);
        }
    }
}

impl SceneVisitor for CascadeShadowCasterCollector {
    fn qualifies(&self, visible: bool, world_bounds: &BoundingAabb) -> bool {
        visible && world_bounds.intersects_convex_solid(&self.cull_planes)
    }

    fn visit_model_instance(
        &mut self,
        entity: hecs::Entity,
        instance: &ModelInstance,
        world_matrix: &Mat4,
        world_bounds: &BoundingAabb,
    ) {
        if !instance.cast_shadows {
            return;
        }

        self.bounds.grow_to_include(world_bounds);

        let last_cascade = self.num_cascades - 1;
        for cascade in 0..=last_cascade {
            let side = if cascade == last_cascade {
                PlaneSide::Back
            } else {
                world_bounds.classify_against_plane(&self.split_planes[cascade])
            };

            if side == PlaneSide::Front {
                continue;
            }

            self.add_to_cascade(cascade, entity, instance, world_matrix, world_bounds);

            if side == PlaneSide::Back {
                return;
            }
        }
    }

    // Runs while the owning light is mutably borrowed.
    fn visits_lights(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::MeshHandle;
    use crate::material::{Material, MaterialPass};
    use crate::scene::Transform;
    use glam::Vec3;

    struct DepthOnly;

    impl MaterialPass for DepthOnly {
        fn label(&self) -> &str {
            "depth"
        }

        fn update_pass_render_state(
            &self,
            _: &mut dyn crate::gpu::RenderBackend,
            _: &crate::material::FrameContext<'_>,
        ) -> bool {
            true
        }

        fn update_instance_render_state(
            &self,
            _: &mut dyn crate::gpu::RenderBackend,
            _: &crate::camera::Camera,
            _: &RenderItem,
            _: Option<&crate::light::CollectedLight>,
        ) {
        }
    }

    fn caster_material() -> Arc<Material> {
        Arc::new(
            Material::builder("caster")
                .with_pass(PassType::ShadowDepth, Arc::new(DepthOnly))
                .build(),
        )
    }

    // Camera at the origin looking down -Z: split `i` sits at z = -distance_i.
    fn split_planes(distances: &[f32]) -> Vec<Plane> {
        distances
            .iter()
            .map(|distance| Plane::new(Vec3::NEG_Z, -distance))
            .collect()
    }

    fn collect(z_ranges: &[(f32, f32)]) -> (CascadeShadowCasterCollector, Vec<hecs::Entity>) {
        let material = caster_material();
        let mut scene = Scene::new();
        let entities = z_ranges
            .iter()
            .map(|(near, far)| {
                let bounds = BoundingAabb::new(Vec3::new(-1.0, -1.0, -far), Vec3::new(1.0, 1.0, -near));
                scene.spawn_model(
                    "caster",
                    Transform::IDENTITY,
                    ModelInstance::single(MeshHandle::new(0), Arc::clone(&material), bounds),
                )
            })
            .collect();

        let mut collector = CascadeShadowCasterCollector::new(3);
        collector.set_split_planes(&split_planes(&[10.0, 20.0, 100.0]));
        collector.collect(&scene);
        (collector, entities)
    }

    fn entities_in(collector: &CascadeShadowCasterCollector, cascade: usize) -> Vec<hecs::Entity> {
        collector
            .arena()
            .resolve(collector.render_list(cascade))
            .map(|item| item.entity)
            .collect()
    }

    #[test]
    fn contained_caster_stops_at_its_cascade() {
        let (collector, entities) = collect(&[(2.0, 4.0)]);
        assert_eq!(entities_in(&collector, 0), entities);
        assert!(entities_in(&collector, 1).is_empty());
        assert!(entities_in(&collector, 2).is_empty());
    }

    #[test]
    fn caster_beyond_first_split_skips_it() {
        let (collector, entities) = collect(&[(12.0, 15.0)]);
        assert!(entities_in(&collector, 0).is_empty());
        assert_eq!(entities_in(&collector, 1), entities);
        assert!(entities_in(&collector, 2).is_empty());
    }

    #[test]
    fn straddling_caster_lands_in_both_cascades() {
        let (collector, entities) = collect(&[(18.0, 22.0)]);
        assert!(entities_in(&collector, 0).is_empty());
        assert_eq!(entities_in(&collector, 1), entities);
        assert_eq!(entities_in(&collector, 2), entities);
    }

    #[test]
    fn far_caster_only_in_last_cascade() {
        let (collector, entities) = collect(&[(40.0, 50.0)]);
        assert!(entities_in(&collector, 0).is_empty());
        assert!(entities_in(&collector, 1).is_empty());
        assert_eq!(entities_in(&collector, 2), entities);
    }

    #[test]
    fn bounds_cover_every_caster() {
        let (collector, _) = collect(&[(2.0, 4.0), (40.0, 50.0)]);
        let bounds = collector.bounds();
        assert_eq!(bounds.min.z, -50.0);
        assert_eq!(bounds.max.z, -2.0);
    }

    #[test]
    fn cull_planes_reject_casters() {
        let material = caster_material();
        let mut scene = Scene::new();
        scene.spawn_model(
            "outside",
            Transform::from_translation(Vec3::new(50.0, 0.0, -5.0)),
            ModelInstance::single(
                MeshHandle::new(0),
                material,
                BoundingAabb::new(Vec3::splat(-1.0), Vec3::ONE),
            ),
        );
        let mut collector = CascadeShadowCasterCollector::new(1);
        collector.set_cull_planes(&[Plane::new(Vec3::X, -10.0)]);
        collector.collect(&scene);
        assert!(collector.render_list(0).is_empty());
        assert!(collector.bounds().is_empty());
    }
}
