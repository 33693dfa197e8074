use glam::{Mat4, Vec3};

use super::plane::{Plane, PlaneSide};

/// Axis-aligned bounding box. An empty box has `min > max` and grows from nothing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingAabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Default for BoundingAabb {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl BoundingAabb {
    pub const EMPTY: Self = Self {
        min: Vec3::splat(f32::INFINITY),
        max: Vec3::splat(f32::NEG_INFINITY),
    };

    pub const INFINITE: Self = Self {
        min: Vec3::splat(f32::NEG_INFINITY),
        max: Vec3::splat(f32::INFINITY),
    };

    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self {
            min: min.min(max),
            max: max.max(min),
        }
    }

    pub fn from_center_extents(center: Vec3, half_extents: Vec3) -> Self {
        Self::new(center - half_extents, center + half_extents)
    }

    pub fn from_points(points: &[Vec3]) -> Self {
        let mut bounds = Self::EMPTY;
        for point in points {
            bounds.grow_to_include_point(*point);
        }
        bounds
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn is_infinite(&self) -> bool {
        !self.is_empty() && (!self.min.is_finite() || !self.max.is_finite())
    }

    pub fn clear(&mut self) {
        *self = Self::EMPTY;
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn half_extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    pub fn grow_to_include_point(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    pub fn grow_to_include(&mut self, other: &BoundingAabb) {
        if other.is_empty() {
            return;
        }
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    /// Bounds of this box after an affine transform (Arvo's method).
    pub fn transformed(&self, matrix: Mat4) -> Self {
        if self.is_empty() || self.is_infinite() {
            return *self;
        }
        let center = matrix.transform_point3(self.center());
        let extents = self.half_extents();
        let abs_x = matrix.x_axis.truncate().abs();
        let abs_y = matrix.y_axis.truncate().abs();
        let abs_z = matrix.z_axis.truncate().abs();
        let new_extents = abs_x * extents.x + abs_y * extents.y + abs_z * extents.z;
        Self::from_center_extents(center, new_extents)
    }

    pub fn intersects(&self, other: &BoundingAabb) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        self.min.cmple(other.max).all() && other.min.cmple(self.max).all()
    }

    pub fn contains_point(&self, point: Vec3) -> bool {
        self.min.cmple(point).all() && point.cmple(self.max).all()
    }

    pub fn classify_against_plane(&self, plane: &Plane) -> PlaneSide {
        if self.is_infinite() {
            return PlaneSide::Intersecting;
        }
        let center_distance = plane.signed_distance(self.center());
        let radius = self.half_extents().dot(plane.normal.abs());
        if center_distance > radius {
            PlaneSide::Front
        } else if center_distance < -radius {
            PlaneSide::Back
        } else {
            PlaneSide::Intersecting
        }
    }

    /// False only when the box lies entirely in front of one of the (outward facing) planes.
    pub fn intersects_convex_solid(&self, planes: &[Plane]) -> bool {
        if self.is_empty() {
            return false;
        }
        planes
            .iter()
            .all(|plane| self.classify_against_plane(plane) != PlaneSide::Front)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingSphere {
    pub center: Vec3,
    pub radius: f32,
}

impl BoundingSphere {
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self {
            center,
            radius: radius.max(0.0),
        }
    }

    pub fn intersects_aabb(&self, aabb: &BoundingAabb) -> bool {
        if aabb.is_empty() {
            return false;
        }
        if aabb.is_infinite() {
            return true;
        }
        let closest = self.center.clamp(aabb.min, aabb.max);
        closest.distance_squared(self.center) <= self.radius * self.radius
    }

    pub fn to_aabb(&self) -> BoundingAabb {
        BoundingAabb::from_center_extents(self.center, Vec3::splat(self.radius))
    }
}

/// World-space extent of a light's influence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LightBounds {
    Infinite,
    Sphere(BoundingSphere),
}

impl LightBounds {
    pub fn intersects_aabb(&self, aabb: &BoundingAabb) -> bool {
        match self {
            LightBounds::Infinite => !aabb.is_empty(),
            LightBounds::Sphere(sphere) => sphere.intersects_aabb(aabb),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_box_grows_to_include_bounds() {
        let mut bounds = BoundingAabb::EMPTY;
        assert!(bounds.is_empty());
        bounds.grow_to_include(&BoundingAabb::new(Vec3::ZERO, Vec3::ONE));
        bounds.grow_to_include(&BoundingAabb::new(Vec3::splat(-2.0), Vec3::splat(-1.0)));
        assert_eq!(bounds.min, Vec3::splat(-2.0));
        assert_eq!(bounds.max, Vec3::ONE);
    }

    #[test]
    fn classification_against_plane() {
        let plane = Plane::from_point_normal(Vec3::new(0.0, 0.0, -10.0), Vec3::NEG_Z);
        let beyond = BoundingAabb::new(Vec3::new(-1.0, -1.0, -14.0), Vec3::new(1.0, 1.0, -12.0));
        let before = BoundingAabb::new(Vec3::new(-1.0, -1.0, -8.0), Vec3::new(1.0, 1.0, -2.0));
        let straddle = BoundingAabb::new(Vec3::new(-1.0, -1.0, -11.0), Vec3::new(1.0, 1.0, -9.0));
        assert_eq!(beyond.classify_against_plane(&plane), PlaneSide::Front);
        assert_eq!(before.classify_against_plane(&plane), PlaneSide::Back);
        assert_eq!(straddle.classify_against_plane(&plane), PlaneSide::Intersecting);
    }

    #[test]
    fn transformed_box_contains_rotated_corners() {
        let bounds = BoundingAabb::new(Vec3::splat(-1.0), Vec3::splat(1.0));
        let matrix = Mat4::from_rotation_y(std::f32::consts::FRAC_PI_4)
            * Mat4::from_translation(Vec3::new(3.0, 0.0, 0.0));
        let transformed = bounds.transformed(matrix);
        for x in [-1.0, 1.0] {
            for y in [-1.0, 1.0] {
                for z in [-1.0, 1.0] {
                    let p = matrix.transform_point3(Vec3::new(x, y, z));
                    assert!(transformed.min.cmple(p + 1e-4).all());
                    assert!(transformed.max.cmpge(p - 1e-4).all());
                }
            }
        }
    }

    #[test]
    fn sphere_aabb_intersection() {
        let sphere = BoundingSphere::new(Vec3::ZERO, 2.0);
        let near = BoundingAabb::new(Vec3::new(1.5, -0.5, -0.5), Vec3::new(3.0, 0.5, 0.5));
        let far = BoundingAabb::new(Vec3::new(5.0, 5.0, 5.0), Vec3::new(6.0, 6.0, 6.0));
        assert!(sphere.intersects_aabb(&near));
        assert!(!sphere.intersects_aabb(&far));
        assert!(LightBounds::Infinite.intersects_aabb(&far));
    }
}
