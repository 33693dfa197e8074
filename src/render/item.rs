use std::sync::Arc;

use glam::Mat4;

use crate::gpu::MeshHandle;
use crate::material::{Material, PassType};
use crate::math::BoundingAabb;

/// Which camera an item was collected for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CameraRef {
    View,
    Cascade(u8),
}

/// One mesh drawn with one material for one camera.
///
/// The world matrix and bounds are copies taken at collection time.
#[derive(Debug, Clone)]
pub struct RenderItem {
    pub entity: hecs::Entity,
    pub world_matrix: Mat4,
    pub mesh: MeshHandle,
    pub skeleton_matrices: Option<Arc<[Mat4]>>,
    pub material: Arc<Material>,
    /// A pass `material` has.
    pub pass_type: PassType,
    pub camera: CameraRef,
    pub world_bounds: BoundingAabb,
    pub render_order_hint: f32,
}

/// Index into a [`RenderItemArena`], valid only for the collection that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ItemId {
    index: u32,
    generation: u32,
}

impl ItemId {
    pub fn index(&self) -> usize {
        self.index as usize
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

pub type RenderList = Vec<ItemId>;

/// Per-frame item storage. `reset` keeps the allocation, so steady-state frames don't allocate.
#[derive(Debug, Default)]
pub struct RenderItemArena {
    items: Vec<RenderItem>,
    generation: u32,
}

impl RenderItemArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops every item and invalidates all previously issued ids.
    pub fn reset(&mut self) {
        self.items.clear();
        self.generation = self.generation.wrapping_add(1);
    }

    pub fn push(&mut self, item: RenderItem) -> ItemId {
        let id = ItemId {
            index: self.items.len() as u32,
            generation: self.generation,
        };
        self.items.push(item);
        id
    }

    pub fn get(&self, id: ItemId) -> Option<&RenderItem> {
        if id.generation != self.generation {
            return None;
        }
        self.items.get(id.index())
    }

    pub fn resolve<'a>(&'a self, list: &'a [ItemId]) -> impl Iterator<Item = &'a RenderItem> + 'a {
        list.iter().filter_map(move |id| self.get(*id))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.items.capacity()
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}
