use glam::{Mat4, Vec3};

use crate::math::Rect;

use super::MAX_CASCADES;

/// Placement of up to four square cascade tiles in one shadow texture.
///
/// One cascade gets the whole texture. Otherwise the atlas is two tiles wide and as many rows
/// high as needed, filled left to right, top to bottom.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtlasLayout {
    num_cascades: usize,
    tile_size: u32,
    maps_wide: u32,
    maps_high: u32,
}

impl AtlasLayout {
    pub fn new(num_cascades: usize, tile_size: u32) -> Self {
        let num_cascades = num_cascades.clamp(1, MAX_CASCADES);
        let maps_wide = if num_cascades > 1 { 2 } else { 1 };
        let maps_high = num_cascades.div_ceil(2) as u32;
        Self {
            num_cascades,
            tile_size: tile_size.max(1),
            maps_wide,
            maps_high,
        }
    }

    pub fn num_cascades(&self) -> usize {
        self.num_cascades
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    /// Tiles across and down.
    pub fn grid(&self) -> (u32, u32) {
        (self.maps_wide, self.maps_high)
    }

    pub fn texture_size(&self) -> (u32, u32) {
        (
            self.tile_size * self.maps_wide,
            self.tile_size * self.maps_high,
        )
    }

    pub fn viewport(&self, cascade: usize) -> Rect {
        let column = (cascade % 2) as u32;
        let row = (cascade / 2) as u32;
        Rect::new(
            column * self.tile_size,
            row * self.tile_size,
            self.tile_size,
            self.tile_size,
        )
    }

    pub fn viewports(&self) -> impl Iterator<Item = Rect> + '_ {
        (0..self.num_cascades).map(|cascade| self.viewport(cascade))
    }

    /// Maps clip space of a cascade camera to texture coordinates inside its tile.
    ///
    /// Texture V grows downwards while clip Y grows upwards, so Y is flipped. Depth is already
    /// in `[0, 1]` and passes through.
    pub fn uv_transform(&self, cascade: usize) -> Mat4 {
        let (width, height) = self.texture_size();
        let tile = self.viewport(cascade);
        let offset = Vec3::new(
            tile.x as f32 / width as f32,
            tile.y as f32 / height as f32,
            0.0,
        );
        let tile_scale = Vec3::new(
            1.0 / self.maps_wide as f32,
            1.0 / self.maps_high as f32,
            1.0,
        );

        Mat4::from_translation(offset)
            * Mat4::from_scale(tile_scale)
            * Mat4::from_translation(Vec3::new(0.5, 0.5, 0.0))
            * Mat4::from_scale(Vec3::new(0.5, -0.5, 1.0))
    }

    pub fn uv_transforms(&self) -> [Mat4; MAX_CASCADES] {
        let mut transforms = [Mat4::IDENTITY; MAX_CASCADES];
        for (cascade, transform) in transforms.iter_mut().enumerate() {
            *transform = self.uv_transform(cascade.min(self.num_cascades - 1));
        }
        transforms
    }
}
