use crate::core::instrument::InstrumentConfig;
use crate::engine::detector::GaussianDetector;
use crate::engine::error::Result;
use crate::engine::scattering::SuperpositionMode;
use crate::engine::solvent::{GaussianIce, IceVariance};
use crate::engine::transfer::{
    ContrastTransferFunction, TransferFunction, TransferFunctionParameters, TransferTheory,
    WaveTransferFunction,
};
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),
}

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("TOML parsing error for '{path}': {source}")]
    Toml {
        path: String,
        source: toml::de::Error,
    },
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct InstrumentSection {
    pub shape: [usize; 2],
    pub pixel_size: f64,
    pub voltage_in_kilovolts: f64,
    #[serde(default)]
    pub pad_scale: Option<f64>,
    #[serde(default)]
    pub padded_shape: Option<[usize; 2]>,
}

fn default_spherical_aberration() -> f64 {
    2.7
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TransferSection {
    pub defocus_in_angstroms: f64,
    #[serde(default)]
    pub astigmatism_in_angstroms: f64,
    #[serde(default)]
    pub astigmatism_angle: f64,
    #[serde(default = "default_spherical_aberration")]
    pub spherical_aberration_in_mm: f64,
    /// When present, a contrast transfer function is used instead of the wave transfer function.
    #[serde(default)]
    pub amplitude_contrast_ratio: Option<f64>,
    #[serde(default)]
    pub phase_shift: f64,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub enum IceVarianceSection {
    Constant(f64),
    Lorentzian { amplitude: f64, length_scale: f64 },
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct IceSection {
    pub variance: IceVarianceSection,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct DetectorSection {
    /// Per-pixel variance of the additive readout noise.
    pub variance: f64,
}

fn default_batch_size() -> usize {
    1
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct IntegrationSection {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub superposition: SuperpositionMode,
}

impl Default for IntegrationSection {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            superposition: SuperpositionMode::default(),
        }
    }
}

/// A simulation description read from a TOML file.
///
/// Sections are kept as plain data; the conversion methods build the validated domain
/// objects and report bad values the same way direct construction does.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SimulationConfig {
    pub instrument: InstrumentSection,
    pub transfer: TransferSection,
    #[serde(default)]
    pub ice: Option<IceSection>,
    #[serde(default)]
    pub detector: Option<DetectorSection>,
    #[serde(default)]
    pub integration: IntegrationSection,
}

impl SimulationConfig {
    pub fn load(path: &Path) -> std::result::Result<Self, ConfigLoadError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigLoadError::Io {
            path: path.to_string_lossy().to_string(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigLoadError::Toml {
            path: path.to_string_lossy().to_string(),
            source: e,
        })
    }

    pub fn instrument_config(&self) -> Result<InstrumentConfig> {
        let section = &self.instrument;
        let mut builder = InstrumentConfig::builder()
            .shape((section.shape[0], section.shape[1]))
            .pixel_size(section.pixel_size)
            .voltage_in_kilovolts(section.voltage_in_kilovolts);
        if let Some([ny, nx]) = section.padded_shape {
            builder = builder.padded_shape((ny, nx));
        }
        if let Some(scale) = section.pad_scale {
            builder = builder.pad_scale(scale);
        }
        builder.build()
    }

    pub fn transfer_theory(&self) -> Result<TransferTheory> {
        let section = &self.transfer;
        let parameters = TransferFunctionParameters::new(
            section.defocus_in_angstroms,
            section.astigmatism_in_angstroms,
            section.astigmatism_angle,
            self.instrument.voltage_in_kilovolts,
            section.spherical_aberration_in_mm,
        )?;
        let transfer_function = match section.amplitude_contrast_ratio {
            Some(ratio) => TransferFunction::Contrast(ContrastTransferFunction::new(
                parameters,
                ratio,
                section.phase_shift,
            )?),
            None => TransferFunction::Wave(WaveTransferFunction::new(parameters)),
        };
        Ok(TransferTheory::new(transfer_function))
    }

    pub fn ice(&self) -> Result<Option<GaussianIce>> {
        self.ice
            .as_ref()
            .map(|section| {
                let variance = match section.variance {
                    IceVarianceSection::Constant(value) => IceVariance::Constant(value),
                    IceVarianceSection::Lorentzian {
                        amplitude,
                        length_scale,
                    } => IceVariance::Lorentzian {
                        amplitude,
                        length_scale,
                    },
                };
                GaussianIce::new(variance)
            })
            .transpose()
    }

    pub fn detector(&self) -> Result<Option<GaussianDetector>> {
        self.detector
            .as_ref()
            .map(|section| GaussianDetector::new(section.variance))
            .transpose()
    }

    pub fn batch_size(&self) -> usize {
        self.integration.batch_size
    }

    pub fn superposition(&self) -> SuperpositionMode {
        self.integration.superposition
    }
}
