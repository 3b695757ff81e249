use crate::core::fft::fft2;
use crate::core::instrument::InstrumentConfig;
use crate::engine::error::{Result, ensure_non_negative};
use ndarray::Array2;
use num_complex::Complex64;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use tracing::debug;

/// Turns the expected intensity at the detector into a recorded readout.
///
/// Both the input and the readout are spectra on the padded grid of an
/// [`InstrumentConfig`], zero frequency at index `[0, 0]`.
pub trait Detector: std::fmt::Debug + Send + Sync {
    /// Draws one readout. The same seed gives the same readout.
    fn measure_readout(
        &self,
        seed: u64,
        intensity: &Array2<Complex64>,
        config: &InstrumentConfig,
    ) -> Result<Array2<Complex64>>;
}

/// A noiseless detector: the readout is the expected intensity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NullDetector;

impl Detector for NullDetector {
    fn measure_readout(
        &self,
        _seed: u64,
        intensity: &Array2<Complex64>,
        config: &InstrumentConfig,
    ) -> Result<Array2<Complex64>> {
        config.ensure_padded_shape(intensity, "detector intensity")?;
        Ok(intensity.clone())
    }
}

/// Additive white Gaussian readout noise with a fixed per-pixel variance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussianDetector {
    variance: f64,
}

impl GaussianDetector {
    pub fn new(variance: f64) -> Result<Self> {
        ensure_non_negative("detector_variance", &[variance])?;
        Ok(Self { variance })
    }

    pub fn variance(&self) -> f64 {
        self.variance
    }
}

impl Detector for GaussianDetector {
    fn measure_readout(
        &self,
        seed: u64,
        intensity: &Array2<Complex64>,
        config: &InstrumentConfig,
    ) -> Result<Array2<Complex64>> {
        config.ensure_padded_shape(intensity, "detector intensity")?;
        let mut rng = StdRng::seed_from_u64(seed);
        let std = self.variance.sqrt();
        let noise = Array2::from_shape_simple_fn(intensity.dim(), || {
            Complex64::new(std * rng.sample::<f64, _>(StandardNormal), 0.0)
        });
        debug!(seed, variance = self.variance, "Sampled detector readout noise.");
        Ok(fft2(&noise) + intensity)
    }
}
