//! Camera state and projection.
//!
//! Interactive manipulation (orbit/pan widgets) is a host concern; the core
//! only keeps the state the scene uniform needs: an eye/target pair and a
//! perspective projection, combined into one view-projection matrix per
//! frame.

use cgmath::{Deg, Matrix4, Point3, Vector3, perspective};

/// cgmath produces OpenGL clip space (z in -1..1); wgpu expects z in 0..1.
#[rustfmt::skip]
pub const OPENGL_TO_WGPU_MATRIX: Matrix4<f32> = Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
);

#[derive(Debug, Clone, Copy)]
pub struct Camera {
    pub eye: Point3<f32>,
    pub target: Point3<f32>,
    pub up: Vector3<f32>,
}

impl Camera {
    pub fn new<E: Into<Point3<f32>>, T: Into<Point3<f32>>>(eye: E, target: T) -> Self {
        Self {
            eye: eye.into(),
            target: target.into(),
            up: Vector3::unit_y(),
        }
    }

    pub fn view_matrix(&self) -> Matrix4<f32> {
        Matrix4::look_at_rh(self.eye, self.target, self.up)
    }
}

impl Default for Camera {
    fn default() -> Self {
        // Matches the viewer's startup framing: slightly above the origin,
        // looking back at it.
        Camera::new((0.0, 0.5, 5.0), (0.0, 0.0, 0.0))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Projection {
    pub aspect: f32,
    pub fovy: Deg<f32>,
    pub znear: f32,
    pub zfar: f32,
}

impl Projection {
    pub fn new(width: u32, height: u32, fovy: Deg<f32>, znear: f32, zfar: f32) -> Self {
        Self {
            aspect: width as f32 / height.max(1) as f32,
            fovy,
            znear,
            zfar,
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.aspect = width as f32 / height.max(1) as f32;
    }

    pub fn matrix(&self) -> Matrix4<f32> {
        OPENGL_TO_WGPU_MATRIX * perspective(self.fovy, self.aspect, self.znear, self.zfar)
    }
}

impl Default for Projection {
    fn default() -> Self {
        Projection::new(1280, 720, Deg(45.0), 0.01, 100.0)
    }
}

/// Combined view-projection matrix for the scene uniform.
pub fn view_proj(camera: &Camera, projection: &Projection) -> Matrix4<f32> {
    projection.matrix() * camera.view_matrix()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::{EuclideanSpace, Transform};

    #[test]
    fn look_at_origin_maps_target_in_front() {
        let camera = Camera::default();
        let projection = Projection::default();
        let m = view_proj(&camera, &projection);
        let clip = m.transform_point(Point3::origin());
        // The origin sits on the view axis: centered in x/y, inside the
        // depth range.
        assert!(clip.x.abs() < 1e-4);
        assert!(clip.y.abs() < 1e-4);
        assert!(clip.z > 0.0 && clip.z < 1.0);
    }

    #[test]
    fn resize_updates_aspect_only() {
        let mut projection = Projection::default();
        projection.resize(100, 50);
        assert_eq!(projection.aspect, 2.0);
        assert_eq!(projection.fovy, Deg(45.0));
    }
}
