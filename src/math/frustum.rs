use glam::{Mat4, Vec3, Vec4};

use super::plane::Plane;

pub const FRUSTUM_PLANE_LEFT: usize = 0;
pub const FRUSTUM_PLANE_RIGHT: usize = 1;
pub const FRUSTUM_PLANE_BOTTOM: usize = 2;
pub const FRUSTUM_PLANE_TOP: usize = 3;
pub const FRUSTUM_PLANE_NEAR: usize = 4;
pub const FRUSTUM_PLANE_FAR: usize = 5;

const NDC_XY: [(f32, f32); 4] = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)];

/// World-space frustum with outward-facing planes.
///
/// Corners `0..4` lie on the near plane, `4..8` on the far plane; corner `i` and `i + 4`
/// share a frustum edge. Clip depth follows wgpu's `[0, 1]` range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frustum {
    planes: [Plane; 6],
    corners: [Vec3; 8],
}

impl Default for Frustum {
    fn default() -> Self {
        Self::from_view_projection(Mat4::IDENTITY)
    }
}

impl Frustum {
    pub fn from_view_projection(view_projection: Mat4) -> Self {
        let row0 = view_projection.row(0);
        let row1 = view_projection.row(1);
        let row2 = view_projection.row(2);
        let row3 = view_projection.row(3);

        let inward: [Vec4; 6] = [
            row3 + row0,
            row3 - row0,
            row3 + row1,
            row3 - row1,
            row2,
            row3 - row2,
        ];
        let planes = inward.map(|coefficients| Plane::from_vec4(-coefficients));

        let inverse = view_projection.inverse();
        let mut corners = [Vec3::ZERO; 8];
        for (i, (x, y)) in NDC_XY.iter().enumerate() {
            corners[i] = inverse.project_point3(Vec3::new(*x, *y, 0.0));
            corners[i + 4] = inverse.project_point3(Vec3::new(*x, *y, 1.0));
        }

        Self { planes, corners }
    }

    pub fn planes(&self) -> &[Plane; 6] {
        &self.planes
    }

    pub fn plane(&self, index: usize) -> &Plane {
        &self.planes[index]
    }

    pub fn side_planes(&self) -> &[Plane] {
        &self.planes[FRUSTUM_PLANE_LEFT..=FRUSTUM_PLANE_TOP]
    }

    pub fn corners(&self) -> &[Vec3; 8] {
        &self.corners
    }

    pub fn contains_point(&self, point: Vec3) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.signed_distance(point) <= 1e-4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn perspective() -> Mat4 {
        let view = Mat4::look_at_rh(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y);
        Mat4::perspective_rh(60f32.to_radians(), 1.0, 1.0, 100.0) * view
    }

    #[test]
    fn corners_lie_on_near_and_far_planes() {
        let frustum = Frustum::from_view_projection(perspective());
        for corner in &frustum.corners()[0..4] {
            assert!((corner.z + 1.0).abs() < 1e-3, "near corner {corner:?}");
        }
        for corner in &frustum.corners()[4..8] {
            assert!((corner.z + 100.0).abs() < 1e-1, "far corner {corner:?}");
        }
    }

    #[test]
    fn planes_face_outward() {
        let frustum = Frustum::from_view_projection(perspective());
        assert!(frustum.contains_point(Vec3::new(0.0, 0.0, -10.0)));
        assert!(!frustum.contains_point(Vec3::new(0.0, 0.0, 10.0)));
        assert!(!frustum.contains_point(Vec3::new(0.0, 0.0, -150.0)));
        let near = frustum.plane(FRUSTUM_PLANE_NEAR);
        assert!(near.normal.abs_diff_eq(Vec3::Z, 1e-4));
        let far = frustum.plane(FRUSTUM_PLANE_FAR);
        assert!(far.normal.abs_diff_eq(Vec3::NEG_Z, 1e-4));
    }
}
