//! Small value types describing where a marker is.

use nalgebra::{Matrix3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

/// Pixel-space point.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub x: f64,
    pub y: f64,
}

impl Coordinates {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl From<[f64; 2]> for Coordinates {
    fn from([x, y]: [f64; 2]) -> Self {
        Self { x, y }
    }
}

impl From<Coordinates> for [f64; 2] {
    fn from(c: Coordinates) -> Self {
        [c.x, c.y]
    }
}

/// Camera-frame point, in the same units as the marker size.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ThreeDCoordinates {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl From<[f64; 3]> for ThreeDCoordinates {
    fn from([x, y, z]: [f64; 3]) -> Self {
        Self { x, y, z }
    }
}

/// Marker position as two bearing angles plus a distance.
///
/// `rot_x` is the angle in the camera's y/z plane, `rot_y` the angle in the x/z
/// plane. Both are radians; zero means straight ahead.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Spherical {
    pub rot_x: f64,
    pub rot_y: f64,
    pub dist: u32,
}

impl Spherical {
    /// Bearing angles of a translation vector, with an already-computed distance.
    pub fn from_tvec(tvec: [f64; 3], dist: u32) -> Self {
        let [x, y, z] = tvec;
        Self {
            rot_x: y.atan2(z),
            rot_y: x.atan2(z),
            dist,
        }
    }
}

/// Marker orientation relative to the camera.
///
/// Built from a Rodrigues rotation vector. The Euler decomposition follows
/// `R = Rz(rot_z) * Ry(rot_y) * Rx(rot_x)`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Orientation {
    pub rot_x: f64,
    pub rot_y: f64,
    pub rot_z: f64,
    quaternion: [f64; 4],
}

impl Orientation {
    pub fn from_rvec(rvec: [f64; 3]) -> Self {
        let rot = UnitQuaternion::from_scaled_axis(Vector3::from(rvec));
        let (roll, pitch, yaw) = rot.euler_angles();
        let q = rot.quaternion();
        Self {
            rot_x: roll,
            rot_y: pitch,
            rot_z: yaw,
            quaternion: [q.w, q.i, q.j, q.k],
        }
    }

    #[inline]
    pub fn roll(&self) -> f64 {
        self.rot_x
    }

    #[inline]
    pub fn pitch(&self) -> f64 {
        self.rot_y
    }

    #[inline]
    pub fn yaw(&self) -> f64 {
        self.rot_z
    }

    /// Unit quaternion as `[w, i, j, k]`.
    pub fn quaternion_wijk(&self) -> [f64; 4] {
        self.quaternion
    }

    pub fn quaternion(&self) -> UnitQuaternion<f64> {
        let [w, i, j, k] = self.quaternion;
        UnitQuaternion::new_normalize(nalgebra::Quaternion::new(w, i, j, k))
    }

    pub fn rotation_matrix(&self) -> Matrix3<f64> {
        self.quaternion().to_rotation_matrix().into_inner()
    }

    /// Back to a Rodrigues vector.
    pub fn rvec(&self) -> [f64; 3] {
        self.quaternion().scaled_axis().into()
    }
}
