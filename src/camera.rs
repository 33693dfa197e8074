use glam::{Mat4, UVec2, Vec3};

use crate::math::Frustum;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Projection {
    Perspective {
        fov_y_radians: f32,
    },
    OrthographicOffCenter {
        left: f32,
        right: f32,
        top: f32,
        bottom: f32,
    },
}

/// A camera looking down its local -Z axis. Derived matrices and the frustum are kept in sync
/// with every setter, so readers never see stale state.
#[derive(Clone, Debug)]
pub struct Camera {
    world_matrix: Mat4,
    projection: Projection,
    near: f32,
    far: f32,
    resolution: UVec2,
    view: Mat4,
    proj: Mat4,
    view_proj: Mat4,
    frustum: Frustum,
}

impl Default for Camera {
    fn default() -> Self {
        Self::perspective(60f32.to_radians(), 0.1, 100.0)
    }
}

impl Camera {
    pub fn perspective(fov_y_radians: f32, near: f32, far: f32) -> Self {
        Self::with_projection(Projection::Perspective { fov_y_radians }, near, far)
    }

    pub fn orthographic_off_center(left: f32, right: f32, top: f32, bottom: f32) -> Self {
        Self::with_projection(
            Projection::OrthographicOffCenter {
                left,
                right,
                top,
                bottom,
            },
            0.0,
            1.0,
        )
    }

    fn with_projection(projection: Projection, near: f32, far: f32) -> Self {
        let mut camera = Self {
            world_matrix: Mat4::IDENTITY,
            projection,
            near,
            far,
            resolution: UVec2::ONE,
            view: Mat4::IDENTITY,
            proj: Mat4::IDENTITY,
            view_proj: Mat4::IDENTITY,
            frustum: Frustum::default(),
        };
        camera.refresh();
        camera
    }

    pub fn look_at(&mut self, eye: Vec3, target: Vec3, up: Vec3) {
        self.set_world_matrix(Mat4::look_at_rh(eye, target, up).inverse());
    }

    pub fn set_world_matrix(&mut self, world_matrix: Mat4) {
        self.world_matrix = world_matrix;
        self.refresh();
    }

    pub fn set_near_distance(&mut self, near: f32) {
        self.near = near;
        self.refresh();
    }

    pub fn set_far_distance(&mut self, far: f32) {
        self.far = far;
        self.refresh();
    }

    pub fn set_clip_distances(&mut self, near: f32, far: f32) {
        self.near = near;
        self.far = far;
        self.refresh();
    }

    /// Updates the off-center bounds; has no effect on perspective cameras.
    pub fn set_bounds(&mut self, left: f32, right: f32, top: f32, bottom: f32) {
        if let Projection::OrthographicOffCenter { .. } = self.projection {
            self.projection = Projection::OrthographicOffCenter {
                left,
                right,
                top,
                bottom,
            };
            self.refresh();
        }
    }

    pub fn set_render_target_resolution(&mut self, width: u32, height: u32) {
        let resolution = UVec2::new(width.max(1), height.max(1));
        if resolution != self.resolution {
            self.resolution = resolution;
            self.refresh();
        }
    }

    pub fn render_target_resolution(&self) -> UVec2 {
        self.resolution
    }

    pub fn projection(&self) -> Projection {
        self.projection
    }

    pub fn world_matrix(&self) -> Mat4 {
        self.world_matrix
    }

    pub fn view_matrix(&self) -> Mat4 {
        self.view
    }

    pub fn projection_matrix(&self) -> Mat4 {
        self.proj
    }

    pub fn view_projection(&self) -> Mat4 {
        self.view_proj
    }

    pub fn frustum(&self) -> &Frustum {
        &self.frustum
    }

    pub fn near_distance(&self) -> f32 {
        self.near
    }

    pub fn far_distance(&self) -> f32 {
        self.far
    }

    pub fn position(&self) -> Vec3 {
        self.world_matrix.w_axis.truncate()
    }

    pub fn forward(&self) -> Vec3 {
        (-self.world_matrix.z_axis.truncate()).normalize_or_zero()
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.resolution.x as f32 / self.resolution.y as f32
    }

    /// Distance along the view axis, used as a sort key.
    pub fn view_depth(&self, point: Vec3) -> f32 {
        -self.view.transform_point3(point).z
    }

    fn refresh(&mut self) {
        self.view = self.world_matrix.inverse();
        self.proj = match self.projection {
            Projection::Perspective { fov_y_radians } => {
                Mat4::perspective_rh(fov_y_radians, self.aspect_ratio(), self.near, self.far)
            }
            Projection::OrthographicOffCenter {
                left,
                right,
                top,
                bottom,
            } => Mat4::orthographic_rh(left, right, bottom, top, self.near, self.far),
        };
        self.view_proj = self.proj * self.view;
        self.frustum = Frustum::from_view_projection(self.view_proj);
    }
}
