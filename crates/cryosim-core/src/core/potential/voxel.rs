use crate::core::fft::fft3_centered;
use crate::core::models::pose::Pose;
use crate::core::models::sampling::{
    make_frequency_slice_in_pixels, trilinear_sample, trilinear_sample_periodic,
};
use crate::engine::error::{ImagingError, Result, ensure_positive};
use nalgebra::Vector3;
use ndarray::{Array2, Array3, Zip};
use num_complex::Complex64;

/// A scattering potential sampled on a centered real-space `(z, y, x)` voxel grid.
#[derive(Debug, Clone, PartialEq)]
pub struct RealVoxelGridPotential {
    grid: Array3<f64>,
    voxel_size: f64,
}

impl RealVoxelGridPotential {
    pub fn new(grid: Array3<f64>, voxel_size: f64) -> Result<Self> {
        ensure_positive("voxel_size", &[voxel_size])?;
        if grid.is_empty() {
            return Err(ImagingError::InvalidConfiguration(
                "voxel grid must contain at least one voxel".to_string(),
            ));
        }
        Ok(Self { grid, voxel_size })
    }

    pub fn grid(&self) -> &Array3<f64> {
        &self.grid
    }

    pub fn voxel_size(&self) -> f64 {
        self.voxel_size
    }

    pub fn shape(&self) -> (usize, usize, usize) {
        self.grid.dim()
    }

    /// Returns the grid rotated about its center by the pose, resampled with trilinear
    /// interpolation. Voxels whose preimage falls outside the box are zero.
    pub fn rotate_to_pose(&self, pose: &Pose) -> Self {
        let inverse = pose.rotation().inverse();
        let (nz, ny, nx) = self.grid.dim();
        let center = Vector3::new((nx / 2) as f64, (ny / 2) as f64, (nz / 2) as f64);
        let mut rotated = Array3::<f64>::zeros(self.grid.dim());
        let resample = |(iz, iy, ix): (usize, usize, usize), value: &mut f64| {
            let r = Vector3::new(ix as f64, iy as f64, iz as f64) - center;
            let source = inverse * r + center;
            *value = trilinear_sample(&self.grid, source.z, source.y, source.x);
        };

        #[cfg(not(feature = "parallel"))]
        Zip::indexed(&mut rotated).for_each(resample);

        #[cfg(feature = "parallel")]
        Zip::indexed(&mut rotated).par_for_each(resample);

        Self {
            grid: rotated,
            voxel_size: self.voxel_size,
        }
    }
}

/// A scattering potential stored as the spectrum of a cubic voxel grid, together with
/// the central frequency slice (in units of DFT bins) viewed in the current pose.
///
/// Rotation only turns the slice; the spectrum itself is never resampled.
#[derive(Debug, Clone, PartialEq)]
pub struct FourierVoxelGridPotential {
    spectrum: Array3<Complex64>,
    voxel_size: f64,
    frequency_slice: Array3<f64>,
}

impl FourierVoxelGridPotential {
    pub fn from_real_voxel_grid(potential: &RealVoxelGridPotential) -> Result<Self> {
        let (nz, ny, nx) = potential.shape();
        if nz != ny || ny != nx {
            return Err(ImagingError::InvalidConfiguration(format!(
                "fourier voxel grids must be cubic, got shape {:?}",
                potential.shape()
            )));
        }
        Ok(Self {
            spectrum: fft3_centered(potential.grid()),
            voxel_size: potential.voxel_size(),
            frequency_slice: make_frequency_slice_in_pixels(ny, nx),
        })
    }

    pub fn spectrum(&self) -> &Array3<Complex64> {
        &self.spectrum
    }

    pub fn voxel_size(&self) -> f64 {
        self.voxel_size
    }

    /// Side length of the cubic grid.
    pub fn side_length(&self) -> usize {
        self.spectrum.dim().0
    }

    pub fn frequency_slice(&self) -> &Array3<f64> {
        &self.frequency_slice
    }

    pub fn rotate_to_pose(&self, pose: &Pose) -> Self {
        Self {
            frequency_slice: pose.inverse_rotate_coordinate_grid(&self.frequency_slice),
            ..self.clone()
        }
    }

    /// Interpolates the spectrum on the current frequency slice. By the central slice
    /// theorem this is the 2D spectrum of the grid summed along the viewing axis.
    pub fn extract_slice(&self) -> Array2<Complex64> {
        let (ny, nx, _) = self.frequency_slice.dim();
        let mut slice = Array2::<Complex64>::zeros((ny, nx));
        let sample = |(iy, ix): (usize, usize), value: &mut Complex64| {
            let kx = self.frequency_slice[[iy, ix, 0]];
            let ky = self.frequency_slice[[iy, ix, 1]];
            let kz = self.frequency_slice[[iy, ix, 2]];
            *value = trilinear_sample_periodic(&self.spectrum, kz, ky, kx);
        };

        #[cfg(not(feature = "parallel"))]
        Zip::indexed(&mut slice).for_each(sample);

        #[cfg(feature = "parallel")]
        Zip::indexed(&mut slice).par_for_each(sample);

        slice
    }
}
