use crate::core::fft::{fft2, fft2_centered, fft2_centered_complex, fftfreq, ifft2, ifft2_centered};
use crate::core::instrument::InstrumentConfig;
use crate::core::models::pose::Pose;
use crate::core::models::sampling::{Interpolate, rescale_image};
use crate::core::potential::ScatteringPotential;
use crate::core::potential::atomic::AtomicPotential;
use crate::core::potential::voxel::{FourierVoxelGridPotential, RealVoxelGridPotential};
use crate::engine::error::{ImagingError, Result};
use ndarray::{Array2, Axis, s};
use num_complex::Complex64;
use std::f64::consts::PI;
use tracing::{debug, instrument};

/// The spectrum of the field leaving the specimen, tagged by what it describes.
#[derive(Debug, Clone, PartialEq)]
pub enum IntegratedPotential {
    /// Spectrum of the real-valued projected potential `∫U dz`.
    Projected(Array2<Complex64>),
    /// Spectrum of a complex exit wave.
    ExitWave(Array2<Complex64>),
}

impl IntegratedPotential {
    pub fn spectrum(&self) -> &Array2<Complex64> {
        match self {
            Self::Projected(spectrum) | Self::ExitWave(spectrum) => spectrum,
        }
    }

    pub fn into_spectrum(self) -> Array2<Complex64> {
        match self {
            Self::Projected(spectrum) | Self::ExitWave(spectrum) => spectrum,
        }
    }

    pub fn is_complex(&self) -> bool {
        matches!(self, Self::ExitWave(_))
    }
}

/// Strategies for integrating a 3D potential along the beam onto the exit plane.
///
/// Every strategy returns a spectrum on the padded grid of the instrument, sampled at its
/// pixel size and translated by the in-plane offset of the pose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PotentialIntegrator {
    /// Analytic projection of an atomic potential, averaged over the output pixels.
    GaussianMixtureProjection,
    /// Sum of a real voxel grid along z.
    RealVoxelProjection,
    /// Central-slice extraction from the spectrum of a Fourier voxel grid.
    FourierSliceExtraction,
    /// Multislice propagation through a real voxel grid, slabs of the given thickness
    /// alternating a phase grating with Fresnel propagation.
    Multislice { slice_thickness_in_voxels: usize },
}

impl PotentialIntegrator {
    /// Whether the strategy produces a complex-valued field in real space.
    pub fn is_integration_complex(&self) -> bool {
        matches!(self, Self::Multislice { .. })
    }

    fn name(&self) -> &'static str {
        match self {
            Self::GaussianMixtureProjection => "gaussian mixture projection",
            Self::RealVoxelProjection => "real voxel projection",
            Self::FourierSliceExtraction => "fourier slice extraction",
            Self::Multislice { .. } => "multislice",
        }
    }

    fn incompatibility(&self, potential: &ScatteringPotential) -> ImagingError {
        ImagingError::IncompatibleStrategy(format!(
            "{} cannot integrate a {} potential",
            self.name(),
            potential.kind()
        ))
    }

    /// Fails with `IncompatibleStrategy` unless the strategy can integrate this kind of potential.
    pub fn check_compatibility(&self, potential: &ScatteringPotential) -> Result<()> {
        let compatible = matches!(
            (self, potential),
            (Self::GaussianMixtureProjection, ScatteringPotential::Atomic(_))
                | (Self::RealVoxelProjection, ScatteringPotential::RealVoxel(_))
                | (Self::FourierSliceExtraction, ScatteringPotential::FourierVoxel(_))
                | (Self::Multislice { .. }, ScatteringPotential::RealVoxel(_))
        );
        if !compatible {
            return Err(self.incompatibility(potential));
        }
        if let Self::Multislice {
            slice_thickness_in_voxels: 0,
        } = self
        {
            return Err(ImagingError::invalid_parameter(
                "slice_thickness_in_voxels",
                "must be at least one voxel",
            ));
        }
        Ok(())
    }

    /// Integrates a potential given in the lab frame and applies the in-plane translation
    /// of `pose`.
    #[instrument(skip_all, name = "potential_integration", fields(integrator = self.name()))]
    pub fn integrate(
        &self,
        potential: &ScatteringPotential,
        pose: &Pose,
        config: &InstrumentConfig,
    ) -> Result<IntegratedPotential> {
        self.check_compatibility(potential)?;
        let integrated = match (self, potential) {
            (Self::GaussianMixtureProjection, ScatteringPotential::Atomic(atomic)) => {
                IntegratedPotential::Projected(project_atoms(atomic, config)?)
            }
            (Self::RealVoxelProjection, ScatteringPotential::RealVoxel(voxels)) => {
                IntegratedPotential::Projected(project_voxels(voxels, config)?)
            }
            (Self::FourierSliceExtraction, ScatteringPotential::FourierVoxel(voxels)) => {
                IntegratedPotential::Projected(extract_fourier_slice(voxels, config)?)
            }
            (
                Self::Multislice {
                    slice_thickness_in_voxels,
                },
                ScatteringPotential::RealVoxel(voxels),
            ) => IntegratedPotential::ExitWave(propagate_multislice(
                voxels,
                *slice_thickness_in_voxels,
                config,
            )?),
            _ => return Err(self.incompatibility(potential)),
        };

        let shifts = pose.compute_shifts(config.padded_frequency_grid());
        Ok(match integrated {
            IntegratedPotential::Projected(spectrum) => {
                IntegratedPotential::Projected(spectrum * &shifts)
            }
            IntegratedPotential::ExitWave(spectrum) => {
                IntegratedPotential::ExitWave(spectrum * &shifts)
            }
        })
    }
}

fn spacings_match(voxel_size: f64, pixel_size: f64) -> bool {
    (voxel_size - pixel_size).abs() <= 1e-8 + 1e-5 * pixel_size.abs()
}

/// Brings a centered real-space field sampled at `voxel_size` onto the padded grid at
/// the pixel size. Fields at the pixel size are cropped or zero-padded about their
/// center; other spacings are resampled.
fn reconcile_real_space<A>(
    field: Array2<A>,
    voxel_size: f64,
    config: &InstrumentConfig,
) -> Array2<A>
where
    A: Interpolate,
{
    if spacings_match(voxel_size, config.pixel_size()) {
        if field.dim() == config.padded_shape() {
            return field;
        }
        debug!(
            shape = ?field.dim(),
            padded_shape = ?config.padded_shape(),
            "Fitting integrated potential to the padded shape."
        );
        return config.fit_to_padded_shape(&field, A::default());
    }
    debug!(
        voxel_size,
        pixel_size = config.pixel_size(),
        "Rescaling integrated potential to the pixel size."
    );
    rescale_image(
        &field,
        voxel_size,
        config.padded_shape(),
        config.pixel_size(),
    )
}

fn project_atoms(
    potential: &AtomicPotential,
    config: &InstrumentConfig,
) -> Result<Array2<Complex64>> {
    let projection = potential.project_onto_pixels(config.padded_shape(), config.pixel_size())?;
    Ok(fft2_centered(&projection))
}

fn project_voxels(
    potential: &RealVoxelGridPotential,
    config: &InstrumentConfig,
) -> Result<Array2<Complex64>> {
    let projection = potential.grid().sum_axis(Axis(0)) * potential.voxel_size();
    let projection = reconcile_real_space(projection, potential.voxel_size(), config);
    Ok(fft2_centered(&projection))
}

fn extract_fourier_slice(
    potential: &FourierVoxelGridPotential,
    config: &InstrumentConfig,
) -> Result<Array2<Complex64>> {
    let spectrum = potential.extract_slice() * Complex64::new(potential.voxel_size(), 0.0);
    let n = potential.side_length();
    if spacings_match(potential.voxel_size(), config.pixel_size())
        && (n, n) == config.padded_shape()
    {
        return Ok(spectrum);
    }
    let projection = ifft2_centered(&spectrum).mapv(|v| v.re);
    let projection = reconcile_real_space(projection, potential.voxel_size(), config);
    Ok(fft2_centered(&projection))
}

/// Exit wave of a plane wave passing through the grid, slab by slab along +z.
fn propagate_multislice(
    potential: &RealVoxelGridPotential,
    slice_thickness_in_voxels: usize,
    config: &InstrumentConfig,
) -> Result<Array2<Complex64>> {
    let (nz, ny, nx) = potential.shape();
    let voxel_size = potential.voxel_size();
    let wavelength = config.wavelength_in_angstroms();
    let interaction = wavelength / (4.0 * PI);
    let slab_thickness = slice_thickness_in_voxels as f64 * voxel_size;

    let fx = fftfreq(nx, voxel_size);
    let fy = fftfreq(ny, voxel_size);
    let propagator = Array2::from_shape_fn((ny, nx), |(iy, ix)| {
        let k_sqr = fx[ix] * fx[ix] + fy[iy] * fy[iy];
        Complex64::from_polar(1.0, -PI * wavelength * slab_thickness * k_sqr)
    });

    let mut wave = Array2::from_elem((ny, nx), Complex64::new(1.0, 0.0));
    let mut z_start = 0;
    while z_start < nz {
        let z_end = (z_start + slice_thickness_in_voxels).min(nz);
        let slab = potential
            .grid()
            .slice(s![z_start..z_end, .., ..])
            .sum_axis(Axis(0));
        wave.zip_mut_with(&slab, |psi, &u| {
            *psi *= Complex64::from_polar(1.0, interaction * u * voxel_size);
        });
        if z_end < nz {
            // Centering is irrelevant to a pointwise multiplication in frequency space.
            wave = ifft2(&(fft2(&wave) * &propagator));
        }
        z_start = z_end;
    }
    debug!(n_slabs = nz.div_ceil(slice_thickness_in_voxels), "Propagated multislice exit wave.");

    let one = Complex64::new(1.0, 0.0);
    let scattered = reconcile_real_space(wave.mapv(|psi| psi - one), voxel_size, config);
    Ok(fft2_centered_complex(&scattered.mapv(|psi| psi + one)))
}
