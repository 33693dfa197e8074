use std::sync::Arc;

use glam::Mat4;
use hecs::World;

use crate::gpu::RenderBackend;
use crate::light::Light;
use crate::material::Material;
use crate::math::{BoundingAabb, LightBounds};
use crate::scene::components::{
    Children, InheritedVisibility, ModelInstance, Name, Parent, TransformComponent, Visible,
    WorldTransform,
};
use crate::scene::hierarchy;
use crate::scene::Transform;

/// Callbacks for a single walk over the scene.
///
/// The scene asks [`SceneVisitor::qualifies`] before handing over any model or light, so
/// visitors decide culling themselves.
pub trait SceneVisitor {
    fn qualifies(&self, visible: bool, world_bounds: &BoundingAabb) -> bool;

    fn visit_model_instance(
        &mut self,
        entity: hecs::Entity,
        instance: &ModelInstance,
        world_matrix: &Mat4,
        world_bounds: &BoundingAabb,
    );

    fn visit_light(&mut self, _entity: hecs::Entity, _light: &Light, _world_matrix: &Mat4) {}

    /// Visitors that run while a light is borrowed mutably return `false` here.
    fn visits_lights(&self) -> bool {
        true
    }
}

pub struct Scene {
    pub world: World,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    pub fn new() -> Self {
        Self {
            world: World::new(),
        }
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn spawn_model(&mut self, name: &str, transform: Transform, instance: ModelInstance) -> hecs::Entity {
        let world_matrix = transform.matrix();
        self.world.spawn((
            Name::new(name),
            TransformComponent(transform),
            WorldTransform(world_matrix),
            Visible(true),
            InheritedVisibility(true),
            instance,
        ))
    }

    pub fn spawn_light(&mut self, name: &str, transform: Transform, light: Light) -> hecs::Entity {
        let world_matrix = transform.matrix();
        self.world.spawn((
            Name::new(name),
            TransformComponent(transform),
            WorldTransform(world_matrix),
            Visible(true),
            InheritedVisibility(true),
            light,
        ))
    }

    /// Re-parents `child`. Returns `false` when either entity no longer exists.
    pub fn set_parent(&mut self, child: hecs::Entity, parent: hecs::Entity) -> bool {
        if !self.world.contains(child) || !self.world.contains(parent) || child == parent {
            return false;
        }
        self.detach(child);
        if self.world.insert_one(child, Parent(parent)).is_err() {
            return false;
        }
        if let Ok(mut children) = self.world.get::<&mut Children>(parent) {
            children.0.push(child);
            return true;
        }
        self.world.insert_one(parent, Children(vec![child])).is_ok()
    }

    fn detach(&mut self, child: hecs::Entity) {
        let Ok(previous) = self.world.remove_one::<Parent>(child) else {
            return;
        };
        if let Ok(mut children) = self.world.get::<&mut Children>(previous.0) {
            children.0.retain(|entity| *entity != child);
        }
    }

    pub fn set_transform(&mut self, entity: hecs::Entity, transform: Transform) {
        if let Ok(mut component) = self.world.get::<&mut TransformComponent>(entity) {
            component.0 = transform;
        }
    }

    pub fn set_visible(&mut self, entity: hecs::Entity, visible: bool) {
        if let Ok(mut component) = self.world.get::<&mut Visible>(entity) {
            component.0 = visible;
        }
    }

    pub fn despawn(&mut self, entity: hecs::Entity) {
        self.detach(entity);
        if let Ok(children) = self.world.remove_one::<Children>(entity) {
            for child in children.0 {
                let _ = self.world.remove_one::<Parent>(child);
            }
        }
        if self.world.despawn(entity).is_err() {
            log::warn!("Tried to despawn missing entity {:?}", entity);
        }
    }

    pub fn update_world_transforms(&mut self) {
        hierarchy::propagate_transforms(&mut self.world);
    }

    pub fn accept_visitor(&self, visitor: &mut dyn SceneVisitor) {
        let mut models =
            self.world
                .query::<(&ModelInstance, &WorldTransform, Option<&InheritedVisibility>)>();
        for (entity, (instance, world_transform, visibility)) in models.iter() {
            let visible = visibility.map_or(true, |v| v.0);
            let world_bounds = instance.world_bounds(&world_transform.0);
            if visitor.qualifies(visible, &world_bounds) {
                visitor.visit_model_instance(entity, instance, &world_transform.0, &world_bounds);
            }
        }

        if !visitor.visits_lights() {
            return;
        }

        let mut lights =
            self.world
                .query::<(&Light, &WorldTransform, Option<&InheritedVisibility>)>();
        for (entity, (light, world_transform, visibility)) in lights.iter() {
            let visible = visibility.map_or(true, |v| v.0);
            let bounds = match light.world_bounds(&world_transform.0) {
                LightBounds::Infinite => BoundingAabb::INFINITE,
                LightBounds::Sphere(sphere) => sphere.to_aabb(),
            };
            if visitor.qualifies(visible, &bounds) {
                visitor.visit_light(entity, light, &world_transform.0);
            }
        }
    }

    /// Every light entity, in a stable order for a given world state.
    pub fn light_entities(&self) -> Vec<hecs::Entity> {
        let mut entities: Vec<hecs::Entity> = self
            .world
            .query::<&Light>()
            .iter()
            .map(|(entity, _)| entity)
            .collect();
        entities.sort_unstable_by_key(|entity| entity.to_bits());
        entities
    }

    /// Every distinct material referenced by a model.
    pub fn materials(&self) -> Vec<Arc<Material>> {
        let mut materials: Vec<Arc<Material>> = Vec::new();
        for (_, instance) in self.world.query::<&ModelInstance>().iter() {
            for mesh in &instance.meshes {
                if !materials.iter().any(|known| Arc::ptr_eq(known, &mesh.material)) {
                    materials.push(Arc::clone(&mesh.material));
                }
            }
        }
        materials
    }

    /// Releases GPU resources owned by scene components.
    pub fn dispose(&mut self, ctx: &mut dyn RenderBackend) {
        for (_, light) in self.world.query_mut::<&mut Light>() {
            light.dispose(ctx);
        }
        for material in self.materials() {
            material.dispose(ctx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::MeshHandle;
    use crate::light::{DirectionalLight, PointLight};
    use glam::Vec3;

    #[derive(Default)]
    struct Recorder {
        models: Vec<hecs::Entity>,
        lights: Vec<hecs::Entity>,
        skip_lights: bool,
    }

    impl SceneVisitor for Recorder {
        fn qualifies(&self, visible: bool, _: &BoundingAabb) -> bool {
            visible
        }

        fn visit_model_instance(&mut self, entity: hecs::Entity, _: &ModelInstance, _: &Mat4, _: &BoundingAabb) {
            self.models.push(entity);
        }

        fn visit_light(&mut self, entity: hecs::Entity, _: &Light, _: &Mat4) {
            self.lights.push(entity);
        }

        fn visits_lights(&self) -> bool {
            !self.skip_lights
        }
    }

    fn model(material: &Arc<Material>) -> ModelInstance {
        ModelInstance::single(
            MeshHandle::new(0),
            Arc::clone(material),
            BoundingAabb::new(Vec3::splat(-1.0), Vec3::ONE),
        )
    }

    #[test]
    fn visitor_sees_visible_models_and_lights() {
        let material = Arc::new(Material::builder("m").build());
        let mut scene = Scene::new();
        let shown = scene.spawn_model("shown", Transform::IDENTITY, model(&material));
        let hidden = scene.spawn_model("hidden", Transform::IDENTITY, model(&material));
        let light = scene.spawn_light(
            "sun",
            Transform::IDENTITY,
            Light::Directional(DirectionalLight::new(Vec3::ONE, 1.0)),
        );
        scene.set_visible(hidden, false);
        scene.update_world_transforms();

        let mut recorder = Recorder::default();
        scene.accept_visitor(&mut recorder);
        assert_eq!(recorder.models, vec![shown]);
        assert_eq!(recorder.lights, vec![light]);

        let mut recorder = Recorder {
            skip_lights: true,
            ..Recorder::default()
        };
        scene.accept_visitor(&mut recorder);
        assert!(recorder.lights.is_empty());
    }

    #[test]
    fn materials_are_deduplicated() {
        let a = Arc::new(Material::builder("a").build());
        let b = Arc::new(Material::builder("b").build());
        let mut scene = Scene::new();
        scene.spawn_model("one", Transform::IDENTITY, model(&a));
        scene.spawn_model("two", Transform::IDENTITY, model(&a));
        scene.spawn_model("three", Transform::IDENTITY, model(&b));
        assert_eq!(scene.materials().len(), 2);
    }

    #[test]
    fn children_follow_their_parent() {
        let material = Arc::new(Material::builder("m").build());
        let mut scene = Scene::new();
        let parent = scene.spawn_model(
            "parent",
            Transform::from_translation(Vec3::new(0.0, 3.0, 0.0)),
            model(&material),
        );
        let child = scene.spawn_light(
            "lamp",
            Transform::from_translation(Vec3::new(1.0, 0.0, 0.0)),
            Light::Point(PointLight {
                color: Vec3::ONE,
                intensity: 1.0,
                radius: 2.0,
            }),
        );
        assert!(scene.set_parent(child, parent));
        scene.update_world_transforms();

        let world = scene.world.get::<&WorldTransform>(child).unwrap().0;
        assert!(world.w_axis.truncate().abs_diff_eq(Vec3::new(1.0, 3.0, 0.0), 1e-6));

        scene.despawn(parent);
        assert!(scene.world.get::<&Parent>(child).is_err());
    }
}
