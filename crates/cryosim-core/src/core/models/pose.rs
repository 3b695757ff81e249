use crate::engine::error::{ImagingError, Result};
use nalgebra::{Matrix3, Point3, Quaternion, Rotation3, UnitQuaternion, Vector3};
use ndarray::{Array2, Array3};
use num_complex::Complex64;
use std::f64::consts::PI;

const ROTATION_TOLERANCE: f64 = 1e-6;

/// The parameterization used to describe the orientation of a [`Pose`].
///
/// Every variant converts to a proper rotation through [`Orientation::rotation`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Orientation {
    /// Extrinsic z-y-z Euler angles in degrees, `R = Rz(psi) * Ry(theta) * Rz(phi)`.
    EulerAngles { phi: f64, theta: f64, psi: f64 },
    /// A unit quaternion, normalized at construction.
    Quaternion(UnitQuaternion<f64>),
    /// An Euler vector in degrees; its norm is the rotation angle.
    AxisAngle(Vector3<f64>),
    /// An explicit rotation operator.
    Rotation(Rotation3<f64>),
}

impl Orientation {
    pub fn rotation(&self) -> Rotation3<f64> {
        match *self {
            Orientation::EulerAngles { phi, theta, psi } => {
                let r1 = Rotation3::from_axis_angle(&Vector3::z_axis(), phi.to_radians());
                let r2 = Rotation3::from_axis_angle(&Vector3::y_axis(), theta.to_radians());
                let r3 = Rotation3::from_axis_angle(&Vector3::z_axis(), psi.to_radians());
                r3 * r2 * r1
            }
            Orientation::Quaternion(q) => q.to_rotation_matrix(),
            Orientation::AxisAngle(euler_vector) => {
                Rotation3::new(euler_vector.map(f64::to_radians))
            }
            Orientation::Rotation(rotation) => rotation,
        }
    }
}

impl Default for Orientation {
    fn default() -> Self {
        Orientation::Rotation(Rotation3::identity())
    }
}

/// A rigid-body viewing transform: a rotation of the specimen, an in-plane translation,
/// and an out-of-plane offset measured relative to the configured defocus.
///
/// Poses are immutable values; every operation returns a new pose.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Pose {
    orientation: Orientation,
    offset_x_in_angstroms: f64,
    offset_y_in_angstroms: f64,
    offset_z_in_angstroms: f64,
}

impl Pose {
    pub fn identity() -> Self {
        Self::default()
    }

    pub fn from_euler_angles(phi: f64, theta: f64, psi: f64) -> Self {
        Self::from_orientation(Orientation::EulerAngles { phi, theta, psi })
    }

    /// Builds a pose from a `(w, x, y, z)` quaternion, normalizing it.
    pub fn from_quaternion(wxyz: [f64; 4]) -> Result<Self> {
        let [w, x, y, z] = wxyz;
        let quaternion = Quaternion::new(w, x, y, z);
        let norm = quaternion.norm();
        if !(norm.is_finite() && norm > 0.0) {
            return Err(ImagingError::invalid_parameter(
                "quaternion",
                format!("cannot normalize a quaternion with norm {norm}"),
            ));
        }
        Ok(Self::from_orientation(Orientation::Quaternion(
            UnitQuaternion::from_quaternion(quaternion),
        )))
    }

    pub fn from_axis_angle(euler_vector_in_degrees: Vector3<f64>) -> Self {
        Self::from_orientation(Orientation::AxisAngle(euler_vector_in_degrees))
    }

    /// Builds a pose from a matrix, which must be orthonormal with determinant `+1`.
    pub fn from_rotation_matrix(matrix: Matrix3<f64>) -> Result<Self> {
        let orthogonality = (matrix.transpose() * matrix - Matrix3::identity()).abs().max();
        let determinant = matrix.determinant();
        if !(orthogonality < ROTATION_TOLERANCE && (determinant - 1.0).abs() < ROTATION_TOLERANCE)
        {
            return Err(ImagingError::invalid_parameter(
                "rotation",
                format!(
                    "matrix is not a proper rotation (orthogonality error {orthogonality:.3e}, determinant {determinant:.6})"
                ),
            ));
        }
        Ok(Self::from_orientation(Orientation::Rotation(
            Rotation3::from_matrix_unchecked(matrix),
        )))
    }

    pub fn from_orientation(orientation: Orientation) -> Self {
        Self {
            orientation,
            ..Self::default()
        }
    }

    pub fn with_offsets(self, x: f64, y: f64, z: f64) -> Self {
        Self {
            offset_x_in_angstroms: x,
            offset_y_in_angstroms: y,
            offset_z_in_angstroms: z,
            ..self
        }
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    pub fn rotation(&self) -> Rotation3<f64> {
        self.orientation.rotation()
    }

    pub fn offset_x_in_angstroms(&self) -> f64 {
        self.offset_x_in_angstroms
    }

    pub fn offset_y_in_angstroms(&self) -> f64 {
        self.offset_y_in_angstroms
    }

    /// Out-of-plane offset, applied downstream as an additional defocus.
    pub fn offset_z_in_angstroms(&self) -> f64 {
        self.offset_z_in_angstroms
    }

    pub fn offset_in_angstroms(&self) -> Vector3<f64> {
        Vector3::new(
            self.offset_x_in_angstroms,
            self.offset_y_in_angstroms,
            self.offset_z_in_angstroms,
        )
    }

    /// Rotates a set of coordinates, returning a new set.
    pub fn rotate_coordinates(&self, coordinates: &[Point3<f64>]) -> Vec<Point3<f64>> {
        let rotation = self.rotation();
        coordinates.iter().map(|p| rotation * p).collect()
    }

    /// Rotates an `(.., 3)` coordinate grid by the inverse rotation.
    pub fn inverse_rotate_coordinate_grid(&self, grid: &Array3<f64>) -> Array3<f64> {
        let inverse = self.rotation().inverse();
        let mut rotated = grid.clone();
        for mut lane in rotated.lanes_mut(ndarray::Axis(2)) {
            let v = inverse * Vector3::new(lane[0], lane[1], lane[2]);
            lane[0] = v.x;
            lane[1] = v.y;
            lane[2] = v.z;
        }
        rotated
    }

    /// Applies `self` after `inner`: the resulting pose first places a subunit with
    /// `inner`, then moves the whole assembly with `self`.
    pub fn compose(&self, inner: &Pose) -> Pose {
        let outer_rotation = self.rotation();
        let rotation = outer_rotation * inner.rotation();
        let offset = outer_rotation * inner.offset_in_angstroms() + self.offset_in_angstroms();
        Pose::from_orientation(Orientation::Rotation(rotation)).with_offsets(
            offset.x,
            offset.y,
            offset.z,
        )
    }

    /// Fourier phase factors `exp(-2πi (fx x + fy y))` that translate an image by the
    /// in-plane offset, given a `(ny, nx, 2)` frequency grid in inverse angstroms.
    pub fn compute_shifts(&self, frequency_grid: &Array3<f64>) -> Array2<Complex64> {
        let (ny, nx, _) = frequency_grid.dim();
        Array2::from_shape_fn((ny, nx), |(iy, ix)| {
            let phase = -2.0
                * PI
                * (frequency_grid[[iy, ix, 0]] * self.offset_x_in_angstroms
                    + frequency_grid[[iy, ix, 1]] * self.offset_y_in_angstroms);
            Complex64::from_polar(1.0, phase)
        })
    }
}
