// scene/mod.rs

pub mod components;
mod hierarchy;
#[allow(clippy::module_inception)]
pub mod scene;
pub mod transform;

pub use scene::{Scene, SceneVisitor};
pub use transform::Transform;

pub use components::{
    Children, InheritedVisibility, MeshInstance, ModelInstance, Name, Parent, TransformComponent,
    Visible, WorldTransform,
};
