use crate::core::fft::ifft2_centered;
use crate::core::instrument::InstrumentConfig;
use crate::engine::config::SimulationConfig;
use crate::engine::detector::{Detector, NullDetector};
use crate::engine::error::{ImagingError, Result};
use crate::engine::integrator::PotentialIntegrator;
use crate::engine::scattering::{
    LinearSuperpositionScatteringTheory, ScatteringTheory, WeakPhaseScatteringTheory,
};
use crate::engine::specimen::{Assembly, Specimen};
use ndarray::{Array2, Zip};
use num_complex::Complex64;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use tracing::{debug, info, instrument};

/// Post-processing applied when a spectrum is carried back to a real-space image.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RenderOptions {
    /// Rescale the cropped image to zero mean and unit standard deviation.
    pub normalize: bool,
    /// Multiplies the spectrum before the inverse transform. Must have the padded shape,
    /// zero frequency at index `[0, 0]`.
    pub filter: Option<Array2<f64>>,
    /// Multiplies the cropped image. Must have the output shape.
    pub mask: Option<Array2<f64>>,
}

impl RenderOptions {
    pub fn normalized() -> Self {
        Self {
            normalize: true,
            ..Self::default()
        }
    }
}

/// A scattering theory bound to the instrument it is imaged with, and the detector
/// that records it.
#[derive(Debug)]
pub struct ImagePipeline<T: ScatteringTheory> {
    config: InstrumentConfig,
    theory: T,
    detector: Box<dyn Detector>,
}

impl<T: ScatteringTheory> ImagePipeline<T> {
    pub fn new(config: InstrumentConfig, theory: T) -> Self {
        Self {
            config,
            theory,
            detector: Box::new(NullDetector),
        }
    }

    pub fn with_detector(mut self, detector: impl Detector + 'static) -> Self {
        self.detector = Box::new(detector);
        self
    }

    pub fn config(&self) -> &InstrumentConfig {
        &self.config
    }

    pub fn theory(&self) -> &T {
        &self.theory
    }

    pub fn detector(&self) -> &dyn Detector {
        self.detector.as_ref()
    }

    /// Intensity spectrum on the padded grid, zero frequency at index `[0, 0]`.
    pub fn render_fourier(&self, seed: Option<u64>) -> Result<Array2<Complex64>> {
        self.theory.intensity_spectrum(&self.config, seed)
    }

    /// Expected intensity image. The detector is not sampled.
    #[instrument(skip_all, name = "image_rendering", fields(seed = ?seed))]
    pub fn render(&self, seed: Option<u64>, options: &RenderOptions) -> Result<Array2<f64>> {
        info!(
            shape = ?self.config.shape(),
            padded_shape = ?self.config.padded_shape(),
            "Rendering image."
        );
        let spectrum = self.render_fourier(seed)?;
        self.to_image(spectrum, options)
    }

    /// One recorded image. `seed` is split into independent ice and detector seeds, so a
    /// fixed seed reproduces the image exactly.
    #[instrument(skip_all, name = "image_readout", fields(seed = seed))]
    pub fn render_with_detector(
        &self,
        seed: u64,
        options: &RenderOptions,
    ) -> Result<Array2<f64>> {
        let (ice_seed, detector_seed) = split_seed(seed);
        info!(
            shape = ?self.config.shape(),
            detector = ?self.detector,
            "Rendering detector readout."
        );
        let intensity = self.render_fourier(Some(ice_seed))?;
        let readout = self
            .detector
            .measure_readout(detector_seed, &intensity, &self.config)?;
        self.to_image(readout, options)
    }

    /// Real part of the detector-plane field, cropped to the image shape.
    ///
    /// For weak-phase theories this is the contrast; for multislice it is the real part of
    /// the wave at the detector.
    pub fn render_contrast(&self, seed: Option<u64>) -> Result<Array2<f64>> {
        let spectrum = self.theory.detector_plane_spectrum(&self.config, seed)?;
        self.to_image(spectrum, &RenderOptions::default())
    }

    fn to_image(
        &self,
        mut spectrum: Array2<Complex64>,
        options: &RenderOptions,
    ) -> Result<Array2<f64>> {
        self.config.ensure_padded_shape(&spectrum, "rendered spectrum")?;
        if let Some(filter) = &options.filter {
            self.config.ensure_padded_shape(filter, "filter")?;
            Zip::from(&mut spectrum).and(filter).for_each(|s, &f| *s *= f);
        }
        let image = ifft2_centered(&spectrum).mapv(|v| v.re);
        let mut image = self.config.crop_to_shape(&image)?;
        if let Some(mask) = &options.mask {
            if mask.dim() != self.config.shape() {
                return Err(ImagingError::InvalidConfiguration(format!(
                    "mask has shape {:?}, expected the image shape {:?}",
                    mask.dim(),
                    self.config.shape()
                )));
            }
            image *= mask;
        }
        Ok(if options.normalize {
            normalize(image)
        } else {
            image
        })
    }
}

fn split_seed(seed: u64) -> (u64, u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    (rng.next_u64(), rng.next_u64())
}

/// Zero mean and unit standard deviation. A constant image is only mean-subtracted.
fn normalize(mut image: Array2<f64>) -> Array2<f64> {
    let Some(mean) = image.mean() else {
        return image;
    };
    let std = image.std(0.0);
    debug!(mean, std, "Normalizing rendered image.");
    if std > 0.0 {
        Zip::from(&mut image).for_each(|v| *v = (*v - mean) / std);
    } else {
        image.mapv_inplace(|v| v - mean);
    }
    image
}

fn with_configured_detector<T: ScatteringTheory>(
    simulation: &SimulationConfig,
    pipeline: ImagePipeline<T>,
) -> Result<ImagePipeline<T>> {
    Ok(match simulation.detector()? {
        Some(detector) => pipeline.with_detector(detector),
        None => pipeline,
    })
}

/// Builds the instrument, transfer theory, optional ice and optional detector described by
/// `simulation` around a single specimen.
pub fn weak_phase_pipeline(
    simulation: &SimulationConfig,
    specimen: Specimen,
    integrator: PotentialIntegrator,
) -> Result<ImagePipeline<WeakPhaseScatteringTheory>> {
    let config = simulation.instrument_config()?;
    let mut theory =
        WeakPhaseScatteringTheory::new(specimen, integrator, simulation.transfer_theory()?)?;
    if let Some(ice) = simulation.ice()? {
        theory = theory.with_ice(ice);
    }
    with_configured_detector(simulation, ImagePipeline::new(config, theory))
}

/// As [`weak_phase_pipeline`], for an assembly summed with the configured superposition mode.
pub fn assembly_pipeline(
    simulation: &SimulationConfig,
    assembly: Assembly,
    integrator: PotentialIntegrator,
) -> Result<ImagePipeline<LinearSuperpositionScatteringTheory>> {
    let config = simulation.instrument_config()?;
    let mut theory = LinearSuperpositionScatteringTheory::new(
        assembly,
        integrator,
        simulation.transfer_theory()?,
    )?
    .with_mode(simulation.superposition());
    if let Some(ice) = simulation.ice()? {
        theory = theory.with_ice(ice);
    }
    with_configured_detector(simulation, ImagePipeline::new(config, theory))
}
