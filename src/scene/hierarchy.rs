use glam::Mat4;
use hecs::World;

use crate::scene::components::{
    Children, InheritedVisibility, Parent, TransformComponent, Visible, WorldTransform,
};

/// Recomputes world matrices and inherited visibility from every root down.
pub(crate) fn propagate_transforms(world: &mut World) {
    let roots: Vec<hecs::Entity> = world
        .query::<&TransformComponent>()
        .without::<&Parent>()
        .iter()
        .map(|(entity, _)| entity)
        .collect();

    log::trace!("Propagating transforms from {} root entities", roots.len());

    let mut stack: Vec<(hecs::Entity, Mat4, bool)> = Vec::new();

    for root in roots {
        stack.push((root, Mat4::IDENTITY, true));

        while let Some((entity, parent_world, parent_visible)) = stack.pop() {
            let local = match world.get::<&TransformComponent>(entity) {
                Ok(t) => t.0.matrix(),
                Err(_) => {
                    log::trace!("Entity {:?} has no TransformComponent, skipping", entity);
                    continue;
                }
            };

            let world_matrix = parent_world * local;
            let visible = parent_visible
                && world
                    .get::<&Visible>(entity)
                    .map(|visible| visible.0)
                    .unwrap_or(true);

            let updated = match world.query_one_mut::<(&mut WorldTransform, &mut InheritedVisibility)>(entity) {
                Ok((world_transform, inherited)) => {
                    world_transform.0 = world_matrix;
                    inherited.0 = visible;
                    true
                }
                Err(_) => false,
            };

            if !updated {
                if let Err(e) = world.insert(
                    entity,
                    (WorldTransform(world_matrix), InheritedVisibility(visible)),
                ) {
                    log::error!(
                        "Failed to insert WorldTransform for entity {:?}: {:?}",
                        entity,
                        e
                    );
                    continue;
                }
            }

            if let Ok(children) = world.get::<&Children>(entity) {
                for &child in children.0.iter().rev() {
                    stack.push((child, world_matrix, visible));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::components::Name;
    use crate::scene::Transform;
    use glam::{Quat, Vec3};

    fn spawn_pair(world: &mut World, parent: Transform, child: Transform) -> (hecs::Entity, hecs::Entity) {
        let parent_entity = world.spawn((Name::new("Parent"), TransformComponent(parent)));
        let child_entity = world.spawn((
            Name::new("Child"),
            TransformComponent(child),
            Parent(parent_entity),
        ));
        world
            .insert_one(parent_entity, Children(vec![child_entity]))
            .ok();
        (parent_entity, child_entity)
    }

    fn translation(world: &World, entity: hecs::Entity) -> Vec3 {
        world.get::<&WorldTransform>(entity).unwrap().0.w_axis.truncate()
    }

    #[test]
    fn test_transform_propagation_simple() {
        let mut world = World::new();
        let (parent, child) = spawn_pair(
            &mut world,
            Transform::from_translation(Vec3::new(5.0, 0.0, 0.0)),
            Transform::from_translation(Vec3::new(2.0, 0.0, 0.0)),
        );

        propagate_transforms(&mut world);

        assert_eq!(translation(&world, parent), Vec3::new(5.0, 0.0, 0.0));
        assert_eq!(translation(&world, child), Vec3::new(7.0, 0.0, 0.0));
    }

    #[test]
    fn test_transform_propagation_rotation() {
        let mut world = World::new();
        let (_, child) = spawn_pair(
            &mut world,
            Transform::new(
                Vec3::ZERO,
                Quat::from_rotation_y(std::f32::consts::FRAC_PI_2),
                Vec3::ONE,
            ),
            Transform::from_translation(Vec3::new(1.0, 0.0, 0.0)),
        );

        propagate_transforms(&mut world);

        assert!(translation(&world, child).abs_diff_eq(Vec3::new(0.0, 0.0, -1.0), 1e-5));
    }

    #[test]
    fn test_transform_propagation_updates_existing_world_transform() {
        let mut world = World::new();
        let (parent, child) = spawn_pair(
            &mut world,
            Transform::IDENTITY,
            Transform::from_translation(Vec3::new(2.0, 0.0, 0.0)),
        );

        propagate_transforms(&mut world);
        assert_eq!(translation(&world, child), Vec3::new(2.0, 0.0, 0.0));

        {
            let mut parent_transform = world.get::<&mut TransformComponent>(parent).unwrap();
            parent_transform.0.translation = Vec3::new(1.0, 0.0, 0.0);
        }

        propagate_transforms(&mut world);
        assert_eq!(translation(&world, child), Vec3::new(3.0, 0.0, 0.0));
    }

    #[test]
    fn hidden_parent_hides_children() {
        let mut world = World::new();
        let (parent, child) = spawn_pair(&mut world, Transform::IDENTITY, Transform::IDENTITY);
        world.insert_one(parent, Visible(false)).ok();

        propagate_transforms(&mut world);

        assert!(!world.get::<&InheritedVisibility>(child).unwrap().0);
        assert!(!world.get::<&InheritedVisibility>(parent).unwrap().0);
    }
}
