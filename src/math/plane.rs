use glam::{Mat4, Vec3, Vec4};

/// Which side of a plane a volume lies on. `Front` is the half-space the normal points into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaneSide {
    Front,
    Back,
    Intersecting,
}

/// Plane in `normal · p + distance = 0` form.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    pub normal: Vec3,
    pub distance: f32,
}

impl Default for Plane {
    fn default() -> Self {
        Self {
            normal: Vec3::Z,
            distance: 0.0,
        }
    }
}

impl Plane {
    pub fn new(normal: Vec3, distance: f32) -> Self {
        Self { normal, distance }
    }

    pub fn from_point_normal(point: Vec3, normal: Vec3) -> Self {
        let normal = normal.normalize_or_zero();
        Self {
            normal,
            distance: -normal.dot(point),
        }
    }

    /// Builds a normalized plane from raw `(a, b, c, d)` coefficients.
    pub fn from_vec4(coefficients: Vec4) -> Self {
        let normal = coefficients.truncate();
        let length = normal.length();
        if length <= f32::EPSILON {
            return Self::new(Vec3::ZERO, coefficients.w);
        }
        Self::new(normal / length, coefficients.w / length)
    }

    pub fn to_vec4(self) -> Vec4 {
        self.normal.extend(self.distance)
    }

    pub fn signed_distance(&self, point: Vec3) -> f32 {
        self.normal.dot(point) + self.distance
    }

    /// Transforms the plane by an affine matrix (inverse-transpose rule).
    pub fn transformed(&self, matrix: Mat4) -> Self {
        let inverse_transpose = matrix.inverse().transpose();
        Self::from_vec4(inverse_transpose * self.to_vec4())
    }

    pub fn flipped(&self) -> Self {
        Self::new(-self.normal, -self.distance)
    }
}
