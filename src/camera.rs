use glam::{Mat4, Vec3};

/// Perspective look-at rig used to derive a [`CameraState`].
#[derive(Clone, Copy, Debug)]
pub struct Camera {
    pub eye: Vec3,
    pub target: Vec3,
    pub fov_y_radians: f32,
    pub near: f32,
    pub far: f32,
}

impl Camera {
    pub fn looking_at(eye: Vec3, target: Vec3) -> Self {
        Self {
            eye,
            target,
            ..Self::default()
        }
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            eye: Vec3::new(0.0, 0.0, 3.0),
            target: Vec3::ZERO,
            fov_y_radians: 60f32.to_radians(),
            near: 0.1,
            far: 100.0,
        }
    }
}

/// View and projection handed to the per-frame callbacks.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraState {
    pub view: Mat4,
    pub projection: Mat4,
}

impl CameraState {
    pub fn new(view: Mat4, projection: Mat4) -> Self {
        Self { view, projection }
    }

    /// Right-handed, Y up, wgpu depth range.
    pub fn from_camera(camera: &Camera, aspect: f32) -> Self {
        Self {
            view: Mat4::look_at_rh(camera.eye, camera.target, Vec3::Y),
            projection: Mat4::perspective_rh(camera.fov_y_radians, aspect, camera.near, camera.far),
        }
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }
}

impl Default for CameraState {
    fn default() -> Self {
        Self::new(Mat4::IDENTITY, Mat4::IDENTITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_state_is_invertible() {
        let state = CameraState::from_camera(&Camera::default(), 16.0 / 9.0);
        let vp = state.view_projection();
        assert!((vp * vp.inverse()).abs_diff_eq(Mat4::IDENTITY, 1e-4));
    }

    #[test]
    fn target_lands_on_the_view_axis() {
        let camera = Camera::looking_at(Vec3::new(0.0, 40.0, 60.0), Vec3::ZERO);
        let state = CameraState::from_camera(&camera, 1.5);
        let target = state.view.transform_point3(camera.target);
        assert!(target.x.abs() < 1e-4 && target.y.abs() < 1e-4);
        assert!(target.z < 0.0);
    }
}
