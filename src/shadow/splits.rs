use glam::Vec3;

use crate::camera::Camera;
use crate::error::{RenderError, Result};
use crate::math::Plane;

use super::MAX_CASCADES;

/// Each split sits at this fraction of the next farther one.
pub const SPLIT_FALLOFF: f32 = 0.33;

/// Default ratios, built outward from the far plane: the last is 1, each earlier one is the
/// next times [`SPLIT_FALLOFF`].
pub fn default_split_ratios(num_cascades: usize) -> [f32; MAX_CASCADES] {
    let num_cascades = num_cascades.clamp(1, MAX_CASCADES);
    let mut ratios = [1.0; MAX_CASCADES];
    let mut ratio = 1.0;
    for index in (0..num_cascades).rev() {
        ratios[index] = ratio;
        ratio *= SPLIT_FALLOFF;
    }
    ratios
}

pub fn validate_split_ratios(ratios: &[f32], num_cascades: usize) -> Result<()> {
    let increasing = ratios.windows(2).all(|pair| pair[0] < pair[1]);
    let in_range = ratios.iter().all(|ratio| *ratio > 0.0 && *ratio <= 1.0);
    let ends_at_far = ratios.last() == Some(&1.0);
    if ratios.len() != num_cascades || !increasing || !in_range || !ends_at_far {
        return Err(RenderError::InvalidSplitRatios(ratios.to_vec()));
    }
    Ok(())
}

/// Split ratios plus the per-frame distances and world-space planes derived from them.
///
/// A split plane's normal is the view direction, so the `Front` side of split `i` is everything
/// beyond cascade `i`.
#[derive(Debug, Clone)]
pub struct CascadeSplits {
    num_cascades: usize,
    ratios: [f32; MAX_CASCADES],
    distances: [f32; MAX_CASCADES],
    planes: [Plane; MAX_CASCADES],
}

impl CascadeSplits {
    pub fn new(num_cascades: usize) -> Self {
        let num_cascades = num_cascades.clamp(1, MAX_CASCADES);
        Self {
            num_cascades,
            ratios: default_split_ratios(num_cascades),
            distances: [0.0; MAX_CASCADES],
            planes: [Plane::default(); MAX_CASCADES],
        }
    }

    pub fn num_cascades(&self) -> usize {
        self.num_cascades
    }

    pub fn ratios(&self) -> &[f32] {
        &self.ratios[..self.num_cascades]
    }

    pub fn set_ratios(&mut self, ratios: &[f32]) -> Result<()> {
        validate_split_ratios(ratios, self.num_cascades)?;
        self.ratios[..self.num_cascades].copy_from_slice(ratios);
        Ok(())
    }

    /// View-space distance of each split, valid after [`CascadeSplits::update`].
    pub fn distances(&self) -> &[f32] {
        &self.distances[..self.num_cascades]
    }

    /// Distances padded to [`MAX_CASCADES`] for uniform upload. Unused entries repeat the far
    /// split.
    pub fn padded_distances(&self) -> [f32; MAX_CASCADES] {
        let mut padded = self.distances;
        let last = self.distances[self.num_cascades - 1];
        for distance in padded.iter_mut().skip(self.num_cascades) {
            *distance = last;
        }
        padded
    }

    pub fn planes(&self) -> &[Plane] {
        &self.planes[..self.num_cascades]
    }

    pub fn update(&mut self, view_camera: &Camera) {
        let near = view_camera.near_distance();
        let range = view_camera.far_distance() - near;
        let world_matrix = view_camera.world_matrix();

        for index in 0..self.num_cascades {
            let distance = near + self.ratios[index] * range;
            self.distances[index] = distance;
            self.planes[index] = Plane::new(Vec3::NEG_Z, -distance).transformed(world_matrix);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{BoundingAabb, PlaneSide};

    #[test]
    fn default_ratios_increase_and_end_at_far_plane() {
        for num_cascades in 1..=MAX_CASCADES {
            let splits = CascadeSplits::new(num_cascades);
            let ratios = splits.ratios();
            assert_eq!(ratios.len(), num_cascades);
            assert_eq!(*ratios.last().unwrap(), 1.0);
            assert!(ratios.windows(2).all(|pair| pair[0] < pair[1]));
            assert!(validate_split_ratios(ratios, num_cascades).is_ok());
        }
    }

    #[test]
    fn each_ratio_is_a_third_of_the_next() {
        let ratios = default_split_ratios(3);
        assert!((ratios[1] - 0.33).abs() < 1e-6);
        assert!((ratios[0] - 0.33 * 0.33).abs() < 1e-6);
    }

    #[test]
    fn invalid_ratios_are_rejected() {
        assert!(validate_split_ratios(&[0.2, 0.1, 1.0], 3).is_err());
        assert!(validate_split_ratios(&[0.1, 0.5], 2).is_err());
        assert!(validate_split_ratios(&[0.1, 1.0], 3).is_err());
        assert!(validate_split_ratios(&[0.0, 1.0], 2).is_err());

        let mut splits = CascadeSplits::new(2);
        assert!(splits.set_ratios(&[0.5, 0.4]).is_err());
        assert_eq!(splits.ratios(), &[0.33, 1.0]);
    }

    #[test]
    fn split_planes_face_away_from_the_camera() {
        let mut camera = Camera::perspective(60f32.to_radians(), 1.0, 101.0);
        camera.look_at(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO, Vec3::Y);

        let mut splits = CascadeSplits::new(2);
        splits.set_ratios(&[0.1, 1.0]).unwrap();
        splits.update(&camera);

        assert!((splits.distances()[0] - 11.0).abs() < 1e-4);
        assert!((splits.distances()[1] - 101.0).abs() < 1e-4);

        // split 0 lies 11 units in front of the camera, at world z = -1
        let plane = splits.planes()[0];
        assert!(plane.signed_distance(Vec3::new(0.0, 0.0, -1.0)).abs() < 1e-4);

        let beyond = BoundingAabb::new(Vec3::new(-1.0, -1.0, -6.0), Vec3::new(1.0, 1.0, -3.0));
        let before = BoundingAabb::new(Vec3::new(-1.0, -1.0, 2.0), Vec3::new(1.0, 1.0, 4.0));
        assert_eq!(beyond.classify_against_plane(&plane), PlaneSide::Front);
        assert_eq!(before.classify_against_plane(&plane), PlaneSide::Back);
    }

    #[test]
    fn padded_distances_repeat_the_last_split() {
        let camera = Camera::perspective(1.0, 0.5, 10.5);
        let mut splits = CascadeSplits::new(2);
        splits.update(&camera);
        let padded = splits.padded_distances();
        assert_eq!(padded[2], padded[1]);
        assert!((padded[3] - 10.5).abs() < 1e-5);
    }
}
