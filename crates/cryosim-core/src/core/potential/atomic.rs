use super::elements::{N_GAUSSIANS, scattering_factor_parameters};
use super::integration::{GaussianMixtureView, integrate_over_voxels, project_over_pixels};
use super::voxel::RealVoxelGridPotential;
use crate::core::models::pose::Pose;
use crate::engine::error::{ImagingError, Result, ensure_non_negative, ensure_positive};
use nalgebra::Point3;
use ndarray::{Array1, Array2};
use tracing::debug;

/// Where the Gaussian parameters of an [`AtomicPotential`] came from.
#[derive(Debug, Clone, PartialEq)]
pub enum AtomicParameterization {
    /// Amplitudes and widths supplied directly for every atom.
    GaussianMixture,
    /// Parameters looked up per atomic number, each atom's widths broadened by its B-factor.
    Tabulated {
        atomic_numbers: Vec<u8>,
        b_factors: Option<Array1<f64>>,
    },
}

/// A specimen described as a set of atoms, each a sum of isotropic 3D Gaussians.
///
/// Parameters are validated on construction. Positions are in angstroms and widths in
/// square angstroms; `amplitudes()` and `widths()` have shape `(n_atoms, n_gaussians)`,
/// and for tabulated atoms the widths already include the B-factor.
#[derive(Debug, Clone, PartialEq)]
pub struct AtomicPotential {
    positions: Vec<Point3<f64>>,
    amplitudes: Array2<f64>,
    widths: Array2<f64>,
    parameterization: AtomicParameterization,
}

impl AtomicPotential {
    pub fn from_gaussian_mixture(
        positions: Vec<Point3<f64>>,
        amplitudes: Array2<f64>,
        widths: Array2<f64>,
    ) -> Result<Self> {
        if amplitudes.dim() != widths.dim() || widths.nrows() != positions.len() {
            return Err(ImagingError::invalid_parameter(
                "gaussian_parameters",
                format!(
                    "amplitudes {:?} and widths {:?} must both have one row per atom ({} atoms)",
                    amplitudes.dim(),
                    widths.dim(),
                    positions.len()
                ),
            ));
        }
        ensure_positive("widths", widths.iter())?;
        if amplitudes.iter().any(|a| !a.is_finite()) {
            return Err(ImagingError::invalid_parameter(
                "amplitudes",
                "all amplitudes must be finite",
            ));
        }
        Ok(Self {
            positions,
            amplitudes,
            widths,
            parameterization: AtomicParameterization::GaussianMixture,
        })
    }

    /// Builds a potential from atomic numbers using the tabulated five-Gaussian
    /// scattering factors, optionally broadened by per-atom B-factors.
    pub fn from_atomic_numbers(
        positions: Vec<Point3<f64>>,
        atomic_numbers: Vec<u8>,
        b_factors: Option<Array1<f64>>,
    ) -> Result<Self> {
        let n_atoms = positions.len();
        if atomic_numbers.len() != n_atoms {
            return Err(ImagingError::invalid_parameter(
                "atom_identities",
                format!("expected {n_atoms} identities, got {}", atomic_numbers.len()),
            ));
        }
        if let Some(b_factors) = &b_factors {
            if b_factors.len() != n_atoms {
                return Err(ImagingError::invalid_parameter(
                    "b_factors",
                    format!("expected {n_atoms} values, got {}", b_factors.len()),
                ));
            }
            ensure_non_negative("b_factors", b_factors.iter())?;
        }

        let mut amplitudes = Array2::<f64>::zeros((n_atoms, N_GAUSSIANS));
        let mut widths = Array2::<f64>::zeros((n_atoms, N_GAUSSIANS));
        for (n, &z) in atomic_numbers.iter().enumerate() {
            let params = scattering_factor_parameters(z)?;
            let broadening = b_factors.as_ref().map_or(0.0, |b| b[n]);
            for g in 0..N_GAUSSIANS {
                amplitudes[[n, g]] = params.amplitudes[g];
                widths[[n, g]] = params.widths[g] + broadening;
            }
        }
        debug!(n_atoms, broadened = b_factors.is_some(), "Resolved tabulated scattering factors.");

        Ok(Self {
            positions,
            amplitudes,
            widths,
            parameterization: AtomicParameterization::Tabulated {
                atomic_numbers,
                b_factors,
            },
        })
    }

    pub fn positions(&self) -> &[Point3<f64>] {
        &self.positions
    }

    pub fn amplitudes(&self) -> &Array2<f64> {
        &self.amplitudes
    }

    pub fn widths(&self) -> &Array2<f64> {
        &self.widths
    }

    pub fn parameterization(&self) -> &AtomicParameterization {
        &self.parameterization
    }

    pub fn n_atoms(&self) -> usize {
        self.positions.len()
    }

    fn view(&self) -> GaussianMixtureView<'_> {
        GaussianMixtureView {
            positions: &self.positions,
            amplitudes: self.amplitudes.view(),
            widths: self.widths.view(),
        }
    }

    /// Returns a copy with every position rotated about the origin by the pose.
    pub fn rotate_to_pose(&self, pose: &Pose) -> Self {
        Self {
            positions: pose.rotate_coordinates(&self.positions),
            ..self.clone()
        }
    }

    /// Evaluates the voxel-averaged potential on a centered `(z, y, x)` grid.
    pub fn as_real_voxel_grid(
        &self,
        shape: (usize, usize, usize),
        voxel_size: f64,
        batch_size: usize,
    ) -> Result<RealVoxelGridPotential> {
        let grid = integrate_over_voxels(&self.view(), shape, voxel_size, batch_size)?;
        RealVoxelGridPotential::new(grid, voxel_size)
    }

    /// Integrates the potential along z, averaged over the pixels of a centered `(y, x)` grid.
    pub fn project_onto_pixels(
        &self,
        shape: (usize, usize),
        pixel_size: f64,
    ) -> Result<Array2<f64>> {
        project_over_pixels(&self.view(), shape, pixel_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn carbon_and_oxygen() -> AtomicPotential {
        AtomicPotential::from_atomic_numbers(
            vec![Point3::new(0.5, 0.0, 0.0), Point3::new(-0.5, 0.5, 0.0)],
            vec![6, 8],
            Some(array![1.0, 0.0]),
        )
        .unwrap()
    }

    #[test]
    fn gaussian_mixture_rejects_non_positive_widths() {
        let result = AtomicPotential::from_gaussian_mixture(
            vec![Point3::origin()],
            array![[1.0, 1.0]],
            array![[1.0, 0.0]],
        );
        assert!(matches!(
            result,
            Err(ImagingError::InvalidParameter { name: "widths", .. })
        ));
    }

    #[test]
    fn gaussian_mixture_rejects_mismatched_shapes() {
        let result = AtomicPotential::from_gaussian_mixture(
            vec![Point3::origin(), Point3::origin()],
            array![[1.0, 1.0]],
            array![[1.0, 2.0]],
        );
        assert!(result.is_err());
    }

    #[test]
    fn b_factors_broaden_only_their_own_atom() {
        let potential = carbon_and_oxygen();
        let carbon = scattering_factor_parameters(6).unwrap();
        let oxygen = scattering_factor_parameters(8).unwrap();
        for g in 0..N_GAUSSIANS {
            assert_abs_diff_eq!(
                potential.widths()[[0, g]],
                carbon.widths[g] + 1.0,
                epsilon = 1e-12
            );
            assert_abs_diff_eq!(potential.widths()[[1, g]], oxygen.widths[g], epsilon = 1e-12);
            assert_abs_diff_eq!(
                potential.amplitudes()[[0, g]],
                carbon.amplitudes[g],
                epsilon = 1e-12
            );
        }
    }

    #[test]
    fn negative_b_factors_are_rejected_at_construction() {
        let result = AtomicPotential::from_atomic_numbers(
            vec![Point3::origin()],
            vec![6],
            Some(array![-2.0]),
        );
        assert!(matches!(
            result,
            Err(ImagingError::InvalidParameter { name: "b_factors", .. })
        ));
    }

    #[test]
    fn unknown_atomic_numbers_are_rejected() {
        let result = AtomicPotential::from_atomic_numbers(vec![Point3::origin()], vec![79], None);
        assert!(matches!(
            result,
            Err(ImagingError::InvalidParameter { name: "atom_identities", .. })
        ));
    }

    #[test]
    fn rotate_to_pose_returns_new_potential_and_keeps_parameters() {
        let potential = carbon_and_oxygen();
        let rotated = potential.rotate_to_pose(&Pose::from_euler_angles(90.0, 0.0, 0.0));
        assert_abs_diff_eq!(rotated.positions()[0].y, 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(potential.positions()[0].x, 0.5, epsilon = 1e-12);
        assert_eq!(rotated.widths(), potential.widths());
        assert_eq!(rotated.parameterization(), potential.parameterization());
    }

    #[test]
    fn voxel_grid_is_deterministic() {
        let potential = carbon_and_oxygen();
        let a = potential.as_real_voxel_grid((4, 6, 6), 0.75, 2).unwrap();
        let b = potential.as_real_voxel_grid((4, 6, 6), 0.75, 2).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.shape(), (4, 6, 6));
    }

    #[test]
    fn rotating_atoms_matches_rotating_the_voxel_grid() {
        let potential = AtomicPotential::from_gaussian_mixture(
            vec![Point3::new(1.0, 0.5, 0.0), Point3::new(-0.5, 0.0, 0.5)],
            array![[1.0], [0.5]],
            array![[3.0], [2.0]],
        )
        .unwrap();
        let pose = Pose::from_euler_angles(90.0, 0.0, 0.0);
        let shape = (12, 12, 12);
        let voxel_size = 0.5;

        let from_rotated_atoms = potential
            .rotate_to_pose(&pose)
            .as_real_voxel_grid(shape, voxel_size, 4)
            .unwrap();
        let rotated_grid = potential
            .as_real_voxel_grid(shape, voxel_size, 4)
            .unwrap()
            .rotate_to_pose(&pose);

        for (a, b) in from_rotated_atoms.grid().iter().zip(rotated_grid.grid().iter()) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-6);
        }
    }
}
