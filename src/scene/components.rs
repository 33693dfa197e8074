// scene/components.rs
// Plain hecs components

use std::sync::Arc;

use glam::Mat4;

use crate::gpu::MeshHandle;
use crate::material::Material;
use crate::math::BoundingAabb;
use crate::scene::Transform;

// ============================================================================
// Spatial Components
// ============================================================================

/// Local transform relative to the parent
#[derive(Debug, Clone, Copy)]
pub struct TransformComponent(pub Transform);

/// World-space matrix (computed from hierarchy)
#[derive(Debug, Clone, Copy)]
pub struct WorldTransform(pub Mat4);

/// Own visibility flag
#[derive(Debug, Clone, Copy)]
pub struct Visible(pub bool);

impl Default for Visible {
    fn default() -> Self {
        Self(true)
    }
}

/// Visibility after combining every ancestor's flag
#[derive(Debug, Clone, Copy)]
pub struct InheritedVisibility(pub bool);

// ============================================================================
// Rendering Components
// ============================================================================

/// One drawable mesh with its material.
#[derive(Debug, Clone)]
pub struct MeshInstance {
    pub mesh: MeshHandle,
    pub material: Arc<Material>,
    pub skeleton_matrices: Option<Arc<[Mat4]>>,
}

impl MeshInstance {
    pub fn new(mesh: MeshHandle, material: Arc<Material>) -> Self {
        Self {
            mesh,
            material,
            skeleton_matrices: None,
        }
    }
}

/// A group of meshes sharing one transform and one bounding box.
#[derive(Debug, Clone)]
pub struct ModelInstance {
    pub meshes: Vec<MeshInstance>,
    pub local_bounds: BoundingAabb,
    pub cast_shadows: bool,
}

impl ModelInstance {
    pub fn new(meshes: Vec<MeshInstance>, local_bounds: BoundingAabb) -> Self {
        Self {
            meshes,
            local_bounds,
            cast_shadows: true,
        }
    }

    pub fn single(mesh: MeshHandle, material: Arc<Material>, local_bounds: BoundingAabb) -> Self {
        Self::new(vec![MeshInstance::new(mesh, material)], local_bounds)
    }

    pub fn with_shadows(mut self, cast_shadows: bool) -> Self {
        self.cast_shadows = cast_shadows;
        self
    }

    pub fn world_bounds(&self, world_matrix: &Mat4) -> BoundingAabb {
        self.local_bounds.transformed(*world_matrix)
    }
}

// ============================================================================
// Utility Components
// ============================================================================

/// Name component for debugging
#[derive(Debug, Clone)]
pub struct Name(pub String);

impl Name {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

// ============================================================================
// Hierarchy Components
// ============================================================================

/// Parent entity reference
#[derive(Debug, Clone, Copy)]
pub struct Parent(pub hecs::Entity);

/// List of children entities
#[derive(Debug, Clone, Default)]
pub struct Children(pub Vec<hecs::Entity>);
