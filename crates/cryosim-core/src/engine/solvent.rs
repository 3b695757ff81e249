use crate::core::fft::fft2;
use crate::core::instrument::InstrumentConfig;
use crate::engine::error::{Result, ensure_non_negative, ensure_positive};
use ndarray::Array2;
use num_complex::Complex64;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use tracing::debug;

/// A stochastic solvent background, expressed as a phase-shift spectrum on the padded
/// grid of an [`InstrumentConfig`].
pub trait Ice: std::fmt::Debug + Send + Sync {
    /// Draws one realization of the background. The same seed gives the same sample.
    fn sample_background(&self, seed: u64, config: &InstrumentConfig) -> Array2<Complex64>;

    /// Adds a realization of the background onto an existing padded spectrum.
    fn combine(
        &self,
        seed: u64,
        spectrum: &Array2<Complex64>,
        config: &InstrumentConfig,
    ) -> Result<Array2<Complex64>> {
        config.ensure_padded_shape(spectrum, "spectrum combined with ice")?;
        let background = self.sample_background(seed, config);
        config.ensure_padded_shape(&background, "ice background")?;
        Ok(background + spectrum)
    }
}

/// Power spectrum of the ice as a function of spatial frequency `|k|` in inverse angstroms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IceVariance {
    Constant(f64),
    /// `amplitude / (1 + (length_scale |k|)²)`.
    Lorentzian { amplitude: f64, length_scale: f64 },
}

impl IceVariance {
    pub fn evaluate(&self, frequency: f64) -> f64 {
        match *self {
            Self::Constant(variance) => variance,
            Self::Lorentzian {
                amplitude,
                length_scale,
            } => amplitude / (1.0 + (length_scale * frequency).powi(2)),
        }
    }

    fn validate(&self) -> Result<()> {
        match self {
            Self::Constant(variance) => ensure_non_negative("ice_variance", &[*variance]),
            Self::Lorentzian {
                amplitude,
                length_scale,
            } => {
                ensure_non_negative("ice_amplitude", &[*amplitude])?;
                ensure_positive("ice_length_scale", &[*length_scale])
            }
        }
    }
}

/// Gaussian ice: white noise colored by a radially symmetric variance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussianIce {
    variance: IceVariance,
}

impl GaussianIce {
    pub fn new(variance: IceVariance) -> Result<Self> {
        variance.validate()?;
        Ok(Self { variance })
    }

    pub fn variance(&self) -> &IceVariance {
        &self.variance
    }
}

impl Ice for GaussianIce {
    fn sample_background(&self, seed: u64, config: &InstrumentConfig) -> Array2<Complex64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let shape = config.padded_shape();
        let noise = Array2::from_shape_simple_fn(shape, || {
            Complex64::new(rng.sample::<f64, _>(StandardNormal), 0.0)
        });
        let frequencies = config.padded_frequency_grid();
        let mut spectrum = fft2(&noise);
        for ((iy, ix), value) in spectrum.indexed_iter_mut() {
            let k = frequencies[[iy, ix, 0]].hypot(frequencies[[iy, ix, 1]]);
            *value *= self.variance.evaluate(k).sqrt();
        }
        debug!(seed, shape = ?shape, "Sampled gaussian ice background.");
        spectrum
    }
}
