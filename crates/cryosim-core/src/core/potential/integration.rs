//! Closed-form integration of Gaussian mixtures over voxels and pixels.
//!
//! A Gaussian component with amplitude `a` and width `b` contributes
//! `4πa (4π/b)^{3/2} exp(-4π² r² / b)` to the scattering potential. Its average over an
//! axis-aligned box factors into three 1D integrals, each a difference of error
//! functions evaluated at the box edges, so every voxel value is exact rather than a
//! point sample.

use crate::core::models::sampling::make_1d_coordinate_grid;
use crate::engine::error::{ImagingError, Result, ensure_positive};
use nalgebra::Point3;
use ndarray::{Array1, Array2, Array3, ArrayView2, Axis, Zip, s};
use statrs::function::erf::erf;
use std::f64::consts::PI;
use tracing::{debug, instrument, trace};

/// A borrowed set of atoms, each carrying a Gaussian mixture with the same number of
/// components. `amplitudes` and `widths` have shape `(n_atoms, n_gaussians)`.
#[derive(Debug, Clone, Copy)]
pub struct GaussianMixtureView<'a> {
    pub positions: &'a [Point3<f64>],
    pub amplitudes: ArrayView2<'a, f64>,
    pub widths: ArrayView2<'a, f64>,
}

impl GaussianMixtureView<'_> {
    fn n_atoms(&self) -> usize {
        self.positions.len()
    }

    fn n_gaussians(&self) -> usize {
        self.widths.ncols()
    }

    fn axis_coordinates(&self, axis: usize) -> Vec<f64> {
        self.positions.iter().map(|p| p[axis]).collect()
    }
}

/// Evaluates `erf(s (u - x)) - erf(s (l - x))` for every `(component, grid point, atom)`,
/// where `[l, u]` is the voxel around the grid point and `s = 2π / sqrt(b)`.
fn axis_kernels(
    grid: &Array1<f64>,
    atom_coordinates: &[f64],
    widths: ArrayView2<f64>,
    voxel_size: f64,
) -> Array3<f64> {
    let n_gaussians = widths.ncols();
    let mut kernels = Array3::<f64>::zeros((n_gaussians, grid.len(), atom_coordinates.len()));
    let evaluate = |(g, i, n): (usize, usize, usize), value: &mut f64| {
        let scale = 2.0 * PI / widths[[n, g]].sqrt();
        let lower = grid[i] - 0.5 * voxel_size - atom_coordinates[n];
        *value = erf(scale * (lower + voxel_size)) - erf(scale * lower);
    };

    #[cfg(not(feature = "parallel"))]
    Zip::indexed(&mut kernels).for_each(evaluate);

    #[cfg(feature = "parallel")]
    Zip::indexed(&mut kernels).par_for_each(evaluate);

    kernels
}

/// Folds `4πa / (2Δ)^dim` into the x-axis kernels.
fn fold_prefactor(
    kernels: &mut Array3<f64>,
    amplitudes: ArrayView2<f64>,
    voxel_size: f64,
    dim: i32,
) {
    let normalization = 4.0 * PI / (2.0 * voxel_size).powi(dim);
    for (g, mut component) in kernels.axis_iter_mut(Axis(0)).enumerate() {
        let prefactor = amplitudes.column(g).mapv(|a| a * normalization);
        component *= &prefactor;
    }
}

fn validate_mixture(mixture: &GaussianMixtureView, voxel_size: f64) -> Result<()> {
    ensure_positive("voxel_size", &[voxel_size])?;
    let n_atoms = mixture.n_atoms();
    if mixture.amplitudes.dim() != mixture.widths.dim() || mixture.widths.nrows() != n_atoms {
        return Err(ImagingError::InvalidConfiguration(format!(
            "gaussian parameters of shape {:?} and {:?} do not match {} atoms",
            mixture.amplitudes.dim(),
            mixture.widths.dim(),
            n_atoms
        )));
    }
    Ok(())
}

/// Voxel-averaged potential of a set of Gaussian mixtures on a centered `(z, y, x)` grid.
///
/// The per-axis kernels are recombined `batch_size` z-planes at a time: the `(z, y)`
/// products of a batch are stacked into one matrix and multiplied against the x-axis
/// kernels, one matrix product per Gaussian component. A batch of one keeps peak memory
/// at a single plane; a batch spanning the whole grid does the work in one product per
/// component. A final partial batch is processed as is.
#[instrument(skip_all, name = "voxel_integration", fields(shape = ?shape, batch_size = batch_size))]
pub fn integrate_over_voxels(
    mixture: &GaussianMixtureView,
    shape: (usize, usize, usize),
    voxel_size: f64,
    batch_size: usize,
) -> Result<Array3<f64>> {
    let (nz, ny, nx) = shape;
    if batch_size < 1 || batch_size > nz {
        return Err(ImagingError::InvalidConfiguration(format!(
            "batch size {batch_size} must lie between 1 and the z-dimension {nz}"
        )));
    }
    validate_mixture(mixture, voxel_size)?;

    let widths = mixture.widths;
    let mut kernels_x = axis_kernels(
        &make_1d_coordinate_grid(nx, voxel_size),
        &mixture.axis_coordinates(0),
        widths,
        voxel_size,
    );
    fold_prefactor(&mut kernels_x, mixture.amplitudes, voxel_size, 3);
    let kernels_y = axis_kernels(
        &make_1d_coordinate_grid(ny, voxel_size),
        &mixture.axis_coordinates(1),
        widths,
        voxel_size,
    );
    let kernels_z = axis_kernels(
        &make_1d_coordinate_grid(nz, voxel_size),
        &mixture.axis_coordinates(2),
        widths,
        voxel_size,
    );
    debug!(
        n_atoms = mixture.n_atoms(),
        n_gaussians = mixture.n_gaussians(),
        "Evaluated per-axis error-function kernels."
    );

    let mut grid = Array3::<f64>::zeros(shape);
    for z_start in (0..nz).step_by(batch_size) {
        let z_end = (z_start + batch_size).min(nz);
        let n_planes = z_end - z_start;
        let mut block = Array2::<f64>::zeros((n_planes * ny, nx));

        for g in 0..mixture.n_gaussians() {
            let kz = kernels_z.index_axis(Axis(0), g);
            let ky = kernels_y.index_axis(Axis(0), g);
            let kx = kernels_x.index_axis(Axis(0), g);

            let mut stacked = Array2::<f64>::zeros((n_planes * ny, mixture.n_atoms()));
            for (plane, z) in (z_start..z_end).enumerate() {
                stacked
                    .slice_mut(s![plane * ny..(plane + 1) * ny, ..])
                    .assign(&(&ky * &kz.row(z)));
            }
            block += &stacked.dot(&kx.t());
        }

        for (plane, z) in (z_start..z_end).enumerate() {
            grid.index_axis_mut(Axis(0), z)
                .assign(&block.slice(s![plane * ny..(plane + 1) * ny, ..]));
        }
        trace!(z_start, z_end, "Recombined z-plane batch.");
    }

    Ok(grid)
}

/// Pixel-averaged projection along z of a set of Gaussian mixtures on a centered
/// `(y, x)` grid. The z-integral of each component is taken analytically.
#[instrument(skip_all, name = "pixel_projection", fields(shape = ?shape))]
pub fn project_over_pixels(
    mixture: &GaussianMixtureView,
    shape: (usize, usize),
    pixel_size: f64,
) -> Result<Array2<f64>> {
    validate_mixture(mixture, pixel_size)?;
    let (ny, nx) = shape;
    let mut kernels_x = axis_kernels(
        &make_1d_coordinate_grid(nx, pixel_size),
        &mixture.axis_coordinates(0),
        mixture.widths,
        pixel_size,
    );
    fold_prefactor(&mut kernels_x, mixture.amplitudes, pixel_size, 2);
    let kernels_y = axis_kernels(
        &make_1d_coordinate_grid(ny, pixel_size),
        &mixture.axis_coordinates(1),
        mixture.widths,
        pixel_size,
    );

    let mut projection = Array2::<f64>::zeros(shape);
    for g in 0..mixture.n_gaussians() {
        projection += &kernels_y
            .index_axis(Axis(0), g)
            .dot(&kernels_x.index_axis(Axis(0), g).t());
    }
    Ok(projection)
}
