use crate::core::instrument::{InstrumentConfig, wavelength_from_kilovolts};
use crate::engine::error::{ImagingError, Result, ensure_non_negative, ensure_positive};
use ndarray::{Array2, Array3};
use num_complex::Complex64;
use std::f64::consts::PI;

/// Lens aberrations shared by every transfer function.
///
/// Defocus is along the first astigmatic axis; the second axis is defocused by an extra
/// `astigmatism_in_angstroms`. Angles are in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransferFunctionParameters {
    defocus_in_angstroms: f64,
    astigmatism_in_angstroms: f64,
    astigmatism_angle: f64,
    voltage_in_kilovolts: f64,
    spherical_aberration_in_mm: f64,
}

impl TransferFunctionParameters {
    pub fn new(
        defocus_in_angstroms: f64,
        astigmatism_in_angstroms: f64,
        astigmatism_angle: f64,
        voltage_in_kilovolts: f64,
        spherical_aberration_in_mm: f64,
    ) -> Result<Self> {
        ensure_positive("defocus_in_angstroms", &[defocus_in_angstroms])?;
        ensure_non_negative("spherical_aberration_in_mm", &[spherical_aberration_in_mm])?;
        ensure_positive("voltage_in_kilovolts", &[voltage_in_kilovolts])?;
        Ok(Self {
            defocus_in_angstroms,
            astigmatism_in_angstroms,
            astigmatism_angle,
            voltage_in_kilovolts,
            spherical_aberration_in_mm,
        })
    }

    pub fn defocus_in_angstroms(&self) -> f64 {
        self.defocus_in_angstroms
    }

    pub fn astigmatism_in_angstroms(&self) -> f64 {
        self.astigmatism_in_angstroms
    }

    pub fn astigmatism_angle(&self) -> f64 {
        self.astigmatism_angle
    }

    pub fn voltage_in_kilovolts(&self) -> f64 {
        self.voltage_in_kilovolts
    }

    pub fn spherical_aberration_in_mm(&self) -> f64 {
        self.spherical_aberration_in_mm
    }

    /// Aberration phase `χ(k)` on a `(ny, nx, 2)` frequency grid, minus a constant
    /// `extra_phase` in radians.
    fn aberration_phase(
        &self,
        frequency_grid: &Array3<f64>,
        wavelength: Option<f64>,
        defocus_offset: f64,
        extra_phase: f64,
    ) -> Array2<f64> {
        let wavelength =
            wavelength.unwrap_or_else(|| wavelength_from_kilovolts(self.voltage_in_kilovolts));
        let spherical_aberration_in_angstroms = self.spherical_aberration_in_mm * 1e7;
        let astigmatism_angle = self.astigmatism_angle.to_radians();
        let defocus_u = self.defocus_in_angstroms + defocus_offset;
        let defocus_v = self.defocus_in_angstroms + self.astigmatism_in_angstroms + defocus_offset;

        let (ny, nx, _) = frequency_grid.dim();
        Array2::from_shape_fn((ny, nx), |(iy, ix)| {
            let kx = frequency_grid[[iy, ix, 0]];
            let ky = frequency_grid[[iy, ix, 1]];
            let k_sqr = kx * kx + ky * ky;
            let azimuth = ky.atan2(kx);
            let defocus = 0.5
                * (defocus_u
                    + defocus_v
                    + (defocus_u - defocus_v) * (2.0 * (azimuth - astigmatism_angle)).cos());
            let defocus_phase = -0.5 * defocus * wavelength * k_sqr;
            let spherical_phase =
                0.25 * spherical_aberration_in_angstroms * wavelength.powi(3) * k_sqr * k_sqr;
            2.0 * PI * (defocus_phase + spherical_phase) - extra_phase
        })
    }
}

impl Default for TransferFunctionParameters {
    fn default() -> Self {
        Self {
            defocus_in_angstroms: 10000.0,
            astigmatism_in_angstroms: 0.0,
            astigmatism_angle: 0.0,
            voltage_in_kilovolts: 300.0,
            spherical_aberration_in_mm: 2.7,
        }
    }
}

/// The pure-phase lens transfer function `exp(iχ)`, applied to a wave spectrum.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WaveTransferFunction {
    parameters: TransferFunctionParameters,
}

impl WaveTransferFunction {
    pub fn new(parameters: TransferFunctionParameters) -> Self {
        Self { parameters }
    }

    pub fn parameters(&self) -> &TransferFunctionParameters {
        &self.parameters
    }

    /// Evaluates the transfer function. If no wavelength is given, it is derived from
    /// the voltage held in the parameters.
    pub fn evaluate(
        &self,
        frequency_grid: &Array3<f64>,
        wavelength: Option<f64>,
        defocus_offset: f64,
    ) -> Array2<Complex64> {
        self.parameters
            .aberration_phase(frequency_grid, wavelength, defocus_offset, 0.0)
            .mapv(|chi| Complex64::from_polar(1.0, chi))
    }
}

/// The real contrast transfer function `sin(χ - φ)`, where `φ` accounts for amplitude
/// contrast. The zero-frequency bin is set to zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContrastTransferFunction {
    parameters: TransferFunctionParameters,
    amplitude_contrast_ratio: f64,
    phase_shift: f64,
}

impl ContrastTransferFunction {
    pub fn new(
        parameters: TransferFunctionParameters,
        amplitude_contrast_ratio: f64,
        phase_shift: f64,
    ) -> Result<Self> {
        if !(0.0..1.0).contains(&amplitude_contrast_ratio) {
            return Err(ImagingError::invalid_parameter(
                "amplitude_contrast_ratio",
                format!("must lie in [0, 1), got {amplitude_contrast_ratio}"),
            ));
        }
        Ok(Self {
            parameters,
            amplitude_contrast_ratio,
            phase_shift,
        })
    }

    pub fn parameters(&self) -> &TransferFunctionParameters {
        &self.parameters
    }

    pub fn amplitude_contrast_ratio(&self) -> f64 {
        self.amplitude_contrast_ratio
    }

    pub fn evaluate(
        &self,
        frequency_grid: &Array3<f64>,
        wavelength: Option<f64>,
        defocus_offset: f64,
    ) -> Array2<Complex64> {
        let ac = self.amplitude_contrast_ratio;
        let extra_phase = self.phase_shift.to_radians() + (ac / (1.0 - ac * ac).sqrt()).atan();
        let mut ctf = self
            .parameters
            .aberration_phase(frequency_grid, wavelength, defocus_offset, extra_phase)
            .mapv(|chi| Complex64::new(chi.sin(), 0.0));
        if let Some(dc) = ctf.get_mut([0, 0]) {
            *dc = Complex64::default();
        }
        ctf
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransferFunction {
    Wave(WaveTransferFunction),
    Contrast(ContrastTransferFunction),
}

impl TransferFunction {
    pub fn evaluate(
        &self,
        frequency_grid: &Array3<f64>,
        wavelength: Option<f64>,
        defocus_offset: f64,
    ) -> Array2<Complex64> {
        match self {
            Self::Wave(wtf) => wtf.evaluate(frequency_grid, wavelength, defocus_offset),
            Self::Contrast(ctf) => ctf.evaluate(frequency_grid, wavelength, defocus_offset),
        }
    }

    pub fn parameters(&self) -> &TransferFunctionParameters {
        match self {
            Self::Wave(wtf) => wtf.parameters(),
            Self::Contrast(ctf) => ctf.parameters(),
        }
    }
}

/// Propagates an exit-plane spectrum to the detector plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransferTheory {
    transfer_function: TransferFunction,
}

impl TransferTheory {
    pub fn new(transfer_function: TransferFunction) -> Self {
        Self { transfer_function }
    }

    pub fn wave(parameters: TransferFunctionParameters) -> Self {
        Self::new(TransferFunction::Wave(WaveTransferFunction::new(parameters)))
    }

    pub fn transfer_function(&self) -> &TransferFunction {
        &self.transfer_function
    }

    /// Multiplies the transfer function, evaluated on the padded frequency grid at the
    /// configured wavelength, onto a padded spectrum.
    pub fn apply(
        &self,
        spectrum: &Array2<Complex64>,
        config: &InstrumentConfig,
        defocus_offset: f64,
    ) -> Result<Array2<Complex64>> {
        config.ensure_padded_shape(spectrum, "exit-plane spectrum")?;
        let transfer = self.transfer_function.evaluate(
            config.padded_frequency_grid(),
            Some(config.wavelength_in_angstroms()),
            defocus_offset,
        );
        Ok(transfer * spectrum)
    }
}
