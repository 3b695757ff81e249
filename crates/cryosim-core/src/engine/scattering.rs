use crate::core::fft::{fft2, ifft2};
use crate::core::instrument::InstrumentConfig;
use crate::core::models::pose::Pose;
use crate::core::potential::ScatteringPotential;
use crate::engine::error::{ImagingError, Result};
use crate::engine::integrator::PotentialIntegrator;
use crate::engine::solvent::Ice;
use crate::engine::specimen::{Assembly, Specimen};
use crate::engine::transfer::TransferTheory;
use ndarray::Array2;
use num_complex::Complex64;
use serde::Deserialize;
use std::f64::consts::PI;
use tracing::{info, instrument};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// How the per-subunit fields of an assembly are accumulated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuperpositionMode {
    /// One subunit at a time into a running sum; only one per-subunit field is alive.
    #[default]
    Sequential,
    /// A data-parallel map followed by a sum reduction.
    Parallel,
}

/// Turns a specimen into fields at the exit and detector planes.
///
/// The optional `seed` drives stochastic backgrounds. Without a seed, or without a
/// solvent model, the computation is deterministic.
pub trait ScatteringTheory {
    fn exit_plane_spectrum(
        &self,
        config: &InstrumentConfig,
        seed: Option<u64>,
    ) -> Result<Array2<Complex64>>;

    fn detector_plane_spectrum(
        &self,
        config: &InstrumentConfig,
        seed: Option<u64>,
    ) -> Result<Array2<Complex64>>;

    /// Spectrum of the intensity `|ψ|²` recorded at the detector.
    fn intensity_spectrum(
        &self,
        config: &InstrumentConfig,
        seed: Option<u64>,
    ) -> Result<Array2<Complex64>>;
}

/// `|ψ|² ≈ 1 + 2C`: doubles the contrast spectrum and adds the pixel count at DC.
pub fn intensity_from_contrast(contrast: &Array2<Complex64>) -> Array2<Complex64> {
    let mut intensity = contrast * Complex64::new(2.0, 0.0);
    let n_pixels = intensity.len() as f64;
    if let Some(dc) = intensity.get_mut([0, 0]) {
        *dc += n_pixels;
    }
    intensity
}

/// Converts an integrated potential `∫U dz` into the phase shift it imprints, `λ/(4π) ∫U dz`.
pub fn phase_shifts_from_integrated_potential(
    integrated: &Array2<Complex64>,
    wavelength_in_angstroms: f64,
) -> Array2<Complex64> {
    integrated * Complex64::new(wavelength_in_angstroms / (4.0 * PI), 0.0)
}

fn ensure_weak_phase_integrator(integrator: &PotentialIntegrator) -> Result<()> {
    if integrator.is_integration_complex() {
        return Err(ImagingError::IncompatibleStrategy(format!(
            "{integrator:?} produces a complex field in real space, which the weak-phase approximation cannot represent"
        )));
    }
    Ok(())
}

fn phase_shift_spectrum(
    potential: &ScatteringPotential,
    pose: &Pose,
    integrator: &PotentialIntegrator,
    config: &InstrumentConfig,
) -> Result<Array2<Complex64>> {
    let in_lab_frame = potential.rotate_to_pose(pose);
    let integrated = integrator.integrate(&in_lab_frame, pose, config)?;
    Ok(phase_shifts_from_integrated_potential(
        integrated.spectrum(),
        config.wavelength_in_angstroms(),
    ))
}

/// Linear image formation for a single specimen.
#[derive(Debug)]
pub struct WeakPhaseScatteringTheory {
    specimen: Specimen,
    integrator: PotentialIntegrator,
    transfer_theory: TransferTheory,
    ice: Option<Box<dyn Ice>>,
}

impl WeakPhaseScatteringTheory {
    pub fn new(
        specimen: Specimen,
        integrator: PotentialIntegrator,
        transfer_theory: TransferTheory,
    ) -> Result<Self> {
        ensure_weak_phase_integrator(&integrator)?;
        integrator.check_compatibility(specimen.potential())?;
        Ok(Self {
            specimen,
            integrator,
            transfer_theory,
            ice: None,
        })
    }

    pub fn with_ice(mut self, ice: impl Ice + 'static) -> Self {
        self.ice = Some(Box::new(ice));
        self
    }

    pub fn specimen(&self) -> &Specimen {
        &self.specimen
    }
}

impl ScatteringTheory for WeakPhaseScatteringTheory {
    fn exit_plane_spectrum(
        &self,
        config: &InstrumentConfig,
        seed: Option<u64>,
    ) -> Result<Array2<Complex64>> {
        let phase_shifts = phase_shift_spectrum(
            self.specimen.potential(),
            self.specimen.pose(),
            &self.integrator,
            config,
        )?;
        match (seed, &self.ice) {
            (Some(seed), Some(ice)) => ice.combine(seed, &phase_shifts, config),
            _ => Ok(phase_shifts),
        }
    }

    fn detector_plane_spectrum(
        &self,
        config: &InstrumentConfig,
        seed: Option<u64>,
    ) -> Result<Array2<Complex64>> {
        let exit = self.exit_plane_spectrum(config, seed)?;
        self.transfer_theory
            .apply(&exit, config, self.specimen.pose().offset_z_in_angstroms())
    }

    fn intensity_spectrum(
        &self,
        config: &InstrumentConfig,
        seed: Option<u64>,
    ) -> Result<Array2<Complex64>> {
        Ok(intensity_from_contrast(
            &self.detector_plane_spectrum(config, seed)?,
        ))
    }
}

/// Coherent superposition of the fields of every subunit in an assembly, in the
/// weak-phase approximation.
#[derive(Debug)]
pub struct LinearSuperpositionScatteringTheory {
    assembly: Assembly,
    integrator: PotentialIntegrator,
    transfer_theory: TransferTheory,
    ice: Option<Box<dyn Ice>>,
    mode: SuperpositionMode,
}

impl LinearSuperpositionScatteringTheory {
    pub fn new(
        assembly: Assembly,
        integrator: PotentialIntegrator,
        transfer_theory: TransferTheory,
    ) -> Result<Self> {
        ensure_weak_phase_integrator(&integrator)?;
        for conformation in assembly.conformations() {
            integrator.check_compatibility(conformation)?;
        }
        Ok(Self {
            assembly,
            integrator,
            transfer_theory,
            ice: None,
            mode: SuperpositionMode::default(),
        })
    }

    pub fn with_ice(mut self, ice: impl Ice + 'static) -> Self {
        self.ice = Some(Box::new(ice));
        self
    }

    pub fn with_mode(mut self, mode: SuperpositionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn assembly(&self) -> &Assembly {
        &self.assembly
    }

    /// Sums `field(i)` over every subunit index.
    fn superpose<F>(&self, config: &InstrumentConfig, field: F) -> Result<Array2<Complex64>>
    where
        F: Fn(usize) -> Result<Array2<Complex64>> + Sync + Send,
    {
        let zeros = || Array2::<Complex64>::zeros(config.padded_shape());
        match self.mode {
            SuperpositionMode::Sequential => {
                (0..self.assembly.len()).try_fold(zeros(), |acc, i| Ok(acc + &field(i)?))
            }
            SuperpositionMode::Parallel => {
                #[cfg(feature = "parallel")]
                {
                    (0..self.assembly.len())
                        .into_par_iter()
                        .map(&field)
                        .try_reduce(zeros, |a, b| Ok(a + &b))
                }
                #[cfg(not(feature = "parallel"))]
                {
                    tracing::warn!(
                        "Parallel superposition requested without the `parallel` feature; \
                         summing sequentially."
                    );
                    (0..self.assembly.len()).try_fold(zeros(), |acc, i| Ok(acc + &field(i)?))
                }
            }
        }
    }

    fn subunit_phase_shifts(
        &self,
        index: usize,
        config: &InstrumentConfig,
    ) -> Result<Array2<Complex64>> {
        let subunit = &self.assembly.subunits()[index];
        phase_shift_spectrum(
            self.assembly.potential_of(subunit)?,
            &subunit.pose,
            &self.integrator,
            config,
        )
    }
}

impl ScatteringTheory for LinearSuperpositionScatteringTheory {
    #[instrument(skip_all, name = "assembly_exit_plane")]
    fn exit_plane_spectrum(
        &self,
        config: &InstrumentConfig,
        seed: Option<u64>,
    ) -> Result<Array2<Complex64>> {
        info!(
            n_subunits = self.assembly.len(),
            mode = ?self.mode,
            "Superposing subunit phase shifts."
        );
        let superposed = self.superpose(config, |i| self.subunit_phase_shifts(i, config))?;
        match (seed, &self.ice) {
            (Some(seed), Some(ice)) => ice.combine(seed, &superposed, config),
            _ => Ok(superposed),
        }
    }

    #[instrument(skip_all, name = "assembly_detector_plane")]
    fn detector_plane_spectrum(
        &self,
        config: &InstrumentConfig,
        seed: Option<u64>,
    ) -> Result<Array2<Complex64>> {
        info!(n_subunits = self.assembly.len(), mode = ?self.mode, "Superposing subunit contrast.");
        let superposed = self.superpose(config, |i| {
            let phase_shifts = self.subunit_phase_shifts(i, config)?;
            let offset = self.assembly.subunits()[i].pose.offset_z_in_angstroms();
            self.transfer_theory.apply(&phase_shifts, config, offset)
        })?;
        match (seed, &self.ice) {
            (Some(seed), Some(ice)) => {
                let background = ice.sample_background(seed, config);
                Ok(superposed + &self.transfer_theory.apply(&background, config, 0.0)?)
            }
            _ => Ok(superposed),
        }
    }

    fn intensity_spectrum(
        &self,
        config: &InstrumentConfig,
        seed: Option<u64>,
    ) -> Result<Array2<Complex64>> {
        Ok(intensity_from_contrast(
            &self.detector_plane_spectrum(config, seed)?,
        ))
    }
}

/// Image formation beyond the weak-phase approximation: the exit wave comes from
/// multislice propagation and the intensity is `|ψ|²` taken in real space.
#[derive(Debug)]
pub struct MultisliceScatteringTheory {
    specimen: Specimen,
    integrator: PotentialIntegrator,
    transfer_theory: TransferTheory,
    ice: Option<Box<dyn Ice>>,
}

impl MultisliceScatteringTheory {
    pub fn new(
        specimen: Specimen,
        integrator: PotentialIntegrator,
        transfer_theory: TransferTheory,
    ) -> Result<Self> {
        if !integrator.is_integration_complex() {
            return Err(ImagingError::IncompatibleStrategy(format!(
                "{integrator:?} produces a projected potential, not an exit wave"
            )));
        }
        integrator.check_compatibility(specimen.potential())?;
        Ok(Self {
            specimen,
            integrator,
            transfer_theory,
            ice: None,
        })
    }

    pub fn with_ice(mut self, ice: impl Ice + 'static) -> Self {
        self.ice = Some(Box::new(ice));
        self
    }
}

impl ScatteringTheory for MultisliceScatteringTheory {
    fn exit_plane_spectrum(
        &self,
        config: &InstrumentConfig,
        seed: Option<u64>,
    ) -> Result<Array2<Complex64>> {
        let wave = self
            .integrator
            .integrate(
                &self.specimen.potential_in_lab_frame(),
                self.specimen.pose(),
                config,
            )?
            .into_spectrum();
        match (seed, &self.ice) {
            (Some(seed), Some(ice)) => {
                let background = ice.sample_background(seed, config);
                config.ensure_padded_shape(&background, "ice background")?;
                let ice_phase = ifft2(&background).mapv(|v| Complex64::from_polar(1.0, v.re));
                Ok(fft2(&(ifft2(&wave) * &ice_phase)))
            }
            _ => Ok(wave),
        }
    }

    fn detector_plane_spectrum(
        &self,
        config: &InstrumentConfig,
        seed: Option<u64>,
    ) -> Result<Array2<Complex64>> {
        let exit = self.exit_plane_spectrum(config, seed)?;
        self.transfer_theory
            .apply(&exit, config, self.specimen.pose().offset_z_in_angstroms())
    }

    fn intensity_spectrum(
        &self,
        config: &InstrumentConfig,
        seed: Option<u64>,
    ) -> Result<Array2<Complex64>> {
        let detector = self.detector_plane_spectrum(config, seed)?;
        let intensity = ifft2(&detector).mapv(|psi| Complex64::new(psi.norm_sqr(), 0.0));
        Ok(fft2(&intensity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::potential::atomic::AtomicPotential;
    use crate::engine::solvent::{GaussianIce, IceVariance};
    use crate::engine::transfer::TransferFunctionParameters;
    use approx::assert_abs_diff_eq;
    use nalgebra::Point3;
    use ndarray::array;

    fn config() -> InstrumentConfig {
        InstrumentConfig::new((16, 16), (32, 32), 0.5, 300.0).unwrap()
    }

    fn atoms() -> AtomicPotential {
        AtomicPotential::from_gaussian_mixture(
            vec![Point3::new(0.5, -0.5, 0.0), Point3::new(-1.0, 1.0, 0.5)],
            array![[1.0, 0.3], [0.7, 0.2]],
            array![[2.0, 8.0], [3.0, 10.0]],
        )
        .unwrap()
    }

    fn transfer() -> TransferTheory {
        TransferTheory::wave(
            TransferFunctionParameters::new(10000.0, 200.0, 20.0, 300.0, 2.7).unwrap(),
        )
    }

    fn weak_phase(pose: Pose) -> WeakPhaseScatteringTheory {
        WeakPhaseScatteringTheory::new(
            Specimen::new(atoms(), pose),
            PotentialIntegrator::GaussianMixtureProjection,
            transfer(),
        )
        .unwrap()
    }

    fn assert_spectra_close(a: &Array2<Complex64>, b: &Array2<Complex64>, epsilon: f64) {
        assert_eq!(a.dim(), b.dim());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_abs_diff_eq!((x - y).norm(), 0.0, epsilon = epsilon);
        }
    }

    #[test]
    fn weak_phase_rejects_complex_integrators_at_construction() {
        let voxels = atoms().as_real_voxel_grid((8, 8, 8), 0.5, 8).unwrap();
        let result = WeakPhaseScatteringTheory::new(
            Specimen::new(voxels, Pose::identity()),
            PotentialIntegrator::Multislice {
                slice_thickness_in_voxels: 2,
            },
            transfer(),
        );
        assert!(matches!(result, Err(ImagingError::IncompatibleStrategy(_))));
    }

    #[test]
    fn weak_phase_rejects_mismatched_potential_at_construction() {
        let result = WeakPhaseScatteringTheory::new(
            Specimen::new(atoms(), Pose::identity()),
            PotentialIntegrator::FourierSliceExtraction,
            transfer(),
        );
        assert!(matches!(result, Err(ImagingError::IncompatibleStrategy(_))));
    }

    #[test]
    fn exit_plane_spectrum_scales_integrated_potential_by_interaction_constant() {
        let config = config();
        let theory = weak_phase(Pose::identity());
        let integrated = PotentialIntegrator::GaussianMixtureProjection
            .integrate(&atoms().into(), &Pose::identity(), &config)
            .unwrap();
        let expected = integrated
            .spectrum()
            .mapv(|v| v * config.wavelength_in_angstroms() / (4.0 * PI));
        assert_spectra_close(&theory.exit_plane_spectrum(&config, None).unwrap(), &expected, 1e-12);
    }

    #[test]
    fn seed_without_ice_is_deterministic_and_ice_changes_the_field() {
        let config = config();
        let plain = weak_phase(Pose::identity());
        assert_eq!(
            plain.exit_plane_spectrum(&config, Some(5)).unwrap(),
            plain.exit_plane_spectrum(&config, None).unwrap()
        );

        let icy = weak_phase(Pose::identity())
            .with_ice(GaussianIce::new(IceVariance::Constant(0.01)).unwrap());
        let without = icy.exit_plane_spectrum(&config, None).unwrap();
        let with = icy.exit_plane_spectrum(&config, Some(5)).unwrap();
        assert_eq!(without, plain.exit_plane_spectrum(&config, None).unwrap());
        assert_ne!(with, without);
        assert_eq!(with, icy.exit_plane_spectrum(&config, Some(5)).unwrap());
    }

    #[test]
    fn detector_plane_uses_pose_defocus_offset() {
        let config = config();
        let pose = Pose::identity().with_offsets(0.0, 0.0, 300.0);
        let theory = weak_phase(pose);
        let exit = theory.exit_plane_spectrum(&config, None).unwrap();
        let expected = transfer().apply(&exit, &config, 300.0).unwrap();
        assert_spectra_close(
            &theory.detector_plane_spectrum(&config, None).unwrap(),
            &expected,
            1e-12,
        );
    }

    #[test]
    fn intensity_doubles_contrast_and_adds_pixel_count_at_dc() {
        let contrast = Array2::from_elem((4, 4), Complex64::new(0.5, -0.25));
        let intensity = intensity_from_contrast(&contrast);
        assert_eq!(intensity[[0, 0]], Complex64::new(1.0 + 16.0, -0.5));
        assert_eq!(intensity[[1, 2]], Complex64::new(1.0, -0.5));
    }

    #[test]
    fn superposition_of_identical_copies_is_linear() {
        let config = config();
        let single = weak_phase(Pose::identity());
        let k = 3;
        for mode in [SuperpositionMode::Sequential, SuperpositionMode::Parallel] {
            let assembly = Assembly::from_poses(atoms(), &vec![Pose::identity(); k]).unwrap();
            let theory = LinearSuperpositionScatteringTheory::new(
                assembly,
                PotentialIntegrator::GaussianMixtureProjection,
                transfer(),
            )
            .unwrap()
            .with_mode(mode);
            let expected = single
                .exit_plane_spectrum(&config, None)
                .unwrap()
                .mapv(|v| v * k as f64);
            assert_spectra_close(
                &theory.exit_plane_spectrum(&config, None).unwrap(),
                &expected,
                1e-10,
            );

            let expected_detector = single
                .detector_plane_spectrum(&config, None)
                .unwrap()
                .mapv(|v| v * k as f64);
            assert_spectra_close(
                &theory.detector_plane_spectrum(&config, None).unwrap(),
                &expected_detector,
                1e-10,
            );
        }
    }

    #[test]
    fn superposition_sums_distinct_subunits() {
        let config = config();
        let poses = [
            Pose::from_euler_angles(30.0, 40.0, 50.0).with_offsets(1.0, 0.5, 100.0),
            Pose::identity().with_offsets(-2.0, 0.0, -50.0),
        ];
        let assembly = Assembly::from_poses(atoms(), &poses).unwrap();
        let theory = LinearSuperpositionScatteringTheory::new(
            assembly,
            PotentialIntegrator::GaussianMixtureProjection,
            transfer(),
        )
        .unwrap();
        let expected = weak_phase(poses[0]).detector_plane_spectrum(&config, None).unwrap()
            + &weak_phase(poses[1]).detector_plane_spectrum(&config, None).unwrap();
        assert_spectra_close(
            &theory.detector_plane_spectrum(&config, None).unwrap(),
            &expected,
            1e-10,
        );
    }

    #[test]
    fn superposition_passes_ice_through_transfer_once() {
        let config = config();
        let ice = GaussianIce::new(IceVariance::Constant(0.02)).unwrap();
        let assembly =
            Assembly::from_poses(atoms(), &[Pose::identity(), Pose::identity()]).unwrap();
        let theory = LinearSuperpositionScatteringTheory::new(
            assembly,
            PotentialIntegrator::GaussianMixtureProjection,
            transfer(),
        )
        .unwrap()
        .with_ice(ice);

        let clean = theory.detector_plane_spectrum(&config, None).unwrap();
        let noisy = theory.detector_plane_spectrum(&config, Some(9)).unwrap();
        let background = transfer()
            .apply(&ice.sample_background(9, &config), &config, 0.0)
            .unwrap();
        assert_spectra_close(&(noisy - &clean), &background, 1e-10);
    }

    #[test]
    fn multislice_theory_requires_a_complex_integrator() {
        let voxels = atoms().as_real_voxel_grid((8, 8, 8), 0.5, 8).unwrap();
        let result = MultisliceScatteringTheory::new(
            Specimen::new(voxels, Pose::identity()),
            PotentialIntegrator::RealVoxelProjection,
            transfer(),
        );
        assert!(matches!(result, Err(ImagingError::IncompatibleStrategy(_))));
    }

    #[test]
    fn multislice_intensity_of_empty_specimen_is_flat() {
        let config = InstrumentConfig::new((8, 8), (8, 8), 1.0, 300.0).unwrap();
        let voxels = crate::core::potential::voxel::RealVoxelGridPotential::new(
            ndarray::Array3::zeros((8, 8, 8)),
            1.0,
        )
        .unwrap();
        let theory = MultisliceScatteringTheory::new(
            Specimen::new(voxels, Pose::identity()),
            PotentialIntegrator::Multislice {
                slice_thickness_in_voxels: 2,
            },
            transfer(),
        )
        .unwrap();
        let intensity = theory.intensity_spectrum(&config, None).unwrap();
        assert_abs_diff_eq!(intensity[[0, 0]].re, 64.0, epsilon = 1e-9);
        for ((i, j), value) in intensity.indexed_iter() {
            if (i, j) != (0, 0) {
                assert_abs_diff_eq!(value.norm(), 0.0, epsilon = 1e-9);
            }
        }
    }
}
