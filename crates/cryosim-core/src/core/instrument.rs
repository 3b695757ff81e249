use super::fft::fftfreq;
use crate::engine::config::ConfigError;
use crate::engine::error::{ImagingError, Result};
use ndarray::{Array2, Array3, s};
use std::ops::Range;

/// Relativistic electron wavelength in angstroms for an accelerating voltage in kV.
pub fn wavelength_from_kilovolts(voltage_in_kilovolts: f64) -> f64 {
    let voltage_in_volts = voltage_in_kilovolts * 1000.0;
    12.2643 / (voltage_in_volts * (1.0 + 0.97845e-6 * voltage_in_volts)).sqrt()
}

fn make_frequency_grid(shape: (usize, usize), pixel_size: f64) -> Array3<f64> {
    let (ny, nx) = shape;
    let fx = fftfreq(nx, pixel_size);
    let fy = fftfreq(ny, pixel_size);
    Array3::from_shape_fn((ny, nx, 2), |(iy, ix, c)| if c == 0 { fx[ix] } else { fy[iy] })
}

/// Imaging geometry and beam settings shared by every stage of the pipeline.
///
/// The frequency grids are derived from the shapes and the pixel size at construction
/// and never change afterwards; a different geometry means a new configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct InstrumentConfig {
    shape: (usize, usize),
    padded_shape: (usize, usize),
    pixel_size: f64,
    voltage_in_kilovolts: f64,
    wavelength_in_angstroms: f64,
    frequency_grid: Array3<f64>,
    padded_frequency_grid: Array3<f64>,
}

impl InstrumentConfig {
    pub fn builder() -> InstrumentConfigBuilder {
        InstrumentConfigBuilder::new()
    }

    pub fn new(
        shape: (usize, usize),
        padded_shape: (usize, usize),
        pixel_size: f64,
        voltage_in_kilovolts: f64,
    ) -> Result<Self> {
        if shape.0 == 0 || shape.1 == 0 {
            return Err(ImagingError::InvalidConfiguration(format!(
                "image shape {shape:?} must be non-empty"
            )));
        }
        if padded_shape.0 < shape.0 || padded_shape.1 < shape.1 {
            return Err(ImagingError::InvalidConfiguration(format!(
                "padded shape {padded_shape:?} is smaller than image shape {shape:?}"
            )));
        }
        if !(pixel_size.is_finite() && pixel_size > 0.0) {
            return Err(ImagingError::invalid_parameter(
                "pixel_size",
                format!("must be positive, got {pixel_size}"),
            ));
        }
        if !(voltage_in_kilovolts.is_finite() && voltage_in_kilovolts > 0.0) {
            return Err(ImagingError::invalid_parameter(
                "voltage_in_kilovolts",
                format!("must be positive, got {voltage_in_kilovolts}"),
            ));
        }

        Ok(Self {
            shape,
            padded_shape,
            pixel_size,
            voltage_in_kilovolts,
            wavelength_in_angstroms: wavelength_from_kilovolts(voltage_in_kilovolts),
            frequency_grid: make_frequency_grid(shape, pixel_size),
            padded_frequency_grid: make_frequency_grid(padded_shape, pixel_size),
        })
    }

    pub fn shape(&self) -> (usize, usize) {
        self.shape
    }

    pub fn padded_shape(&self) -> (usize, usize) {
        self.padded_shape
    }

    pub fn pixel_size(&self) -> f64 {
        self.pixel_size
    }

    pub fn voltage_in_kilovolts(&self) -> f64 {
        self.voltage_in_kilovolts
    }

    pub fn wavelength_in_angstroms(&self) -> f64 {
        self.wavelength_in_angstroms
    }

    /// `(ny, nx, 2)` grid of `(fx, fy)` in inverse angstroms on the unpadded shape.
    pub fn frequency_grid(&self) -> &Array3<f64> {
        &self.frequency_grid
    }

    /// `(ny, nx, 2)` grid of `(fx, fy)` in inverse angstroms on the padded shape.
    pub fn padded_frequency_grid(&self) -> &Array3<f64> {
        &self.padded_frequency_grid
    }

    /// Crops a centered, padded image to the unpadded shape.
    pub fn crop_to_shape<A: Clone>(&self, image: &Array2<A>) -> Result<Array2<A>> {
        let (ny, nx) = image.dim();
        let (cy, cx) = self.shape;
        if ny < cy || nx < cx {
            return Err(ImagingError::InvalidConfiguration(format!(
                "cannot crop an image of shape {:?} to {:?}",
                (ny, nx),
                self.shape
            )));
        }
        let y0 = ny / 2 - cy / 2;
        let x0 = nx / 2 - cx / 2;
        Ok(image.slice(s![y0..y0 + cy, x0..x0 + cx]).to_owned())
    }

    /// Places a centered image on the padded grid, keeping its center pixel at the
    /// center. Axes longer than the padded shape are cropped, shorter ones are filled.
    pub fn fit_to_padded_shape<A: Clone>(&self, image: &Array2<A>, fill: A) -> Array2<A> {
        let (ny, nx) = image.dim();
        let (py, px) = self.padded_shape;
        let (src_y, dst_y) = centered_overlap(ny, py);
        let (src_x, dst_x) = centered_overlap(nx, px);
        let mut fitted = Array2::from_elem(self.padded_shape, fill);
        fitted
            .slice_mut(s![dst_y, dst_x])
            .assign(&image.slice(s![src_y, src_x]));
        fitted
    }

    pub(crate) fn ensure_padded_shape<A>(&self, field: &Array2<A>, what: &str) -> Result<()> {
        if field.dim() != self.padded_shape {
            return Err(ImagingError::InvalidConfiguration(format!(
                "{what} has shape {:?}, expected the padded shape {:?}",
                field.dim(),
                self.padded_shape
            )));
        }
        Ok(())
    }
}

/// Source and destination ranges that align the center index `n / 2` of an axis of
/// length `n` with the center index of an axis of length `target`.
fn centered_overlap(n: usize, target: usize) -> (Range<usize>, Range<usize>) {
    let length = n.min(target);
    let src = n / 2 - length / 2;
    let dst = target / 2 - length / 2;
    (src..src + length, dst..dst + length)
}

#[derive(Default)]
pub struct InstrumentConfigBuilder {
    shape: Option<(usize, usize)>,
    padded_shape: Option<(usize, usize)>,
    pad_scale: Option<f64>,
    pixel_size: Option<f64>,
    voltage_in_kilovolts: Option<f64>,
}

impl InstrumentConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shape(mut self, shape: (usize, usize)) -> Self {
        self.shape = Some(shape);
        self
    }
    pub fn padded_shape(mut self, shape: (usize, usize)) -> Self {
        self.padded_shape = Some(shape);
        self
    }
    pub fn pad_scale(mut self, scale: f64) -> Self {
        self.pad_scale = Some(scale);
        self
    }
    pub fn pixel_size(mut self, size: f64) -> Self {
        self.pixel_size = Some(size);
        self
    }
    pub fn voltage_in_kilovolts(mut self, voltage: f64) -> Self {
        self.voltage_in_kilovolts = Some(voltage);
        self
    }

    pub fn build(self) -> Result<InstrumentConfig> {
        let shape = self.shape.ok_or(ConfigError::MissingParameter("shape"))?;
        let padded_shape = match (self.padded_shape, self.pad_scale) {
            (Some(_), Some(_)) => {
                return Err(ImagingError::InvalidConfiguration(
                    "set either padded_shape or pad_scale, not both".to_string(),
                ));
            }
            (Some(padded), None) => padded,
            (None, Some(scale)) => {
                if !(scale.is_finite() && scale >= 1.0) {
                    return Err(ImagingError::invalid_parameter(
                        "pad_scale",
                        format!("must be at least 1, got {scale}"),
                    ));
                }
                (
                    (shape.0 as f64 * scale).round() as usize,
                    (shape.1 as f64 * scale).round() as usize,
                )
            }
            (None, None) => shape,
        };
        InstrumentConfig::new(
            shape,
            padded_shape,
            self.pixel_size
                .ok_or(ConfigError::MissingParameter("pixel_size"))?,
            self.voltage_in_kilovolts
                .ok_or(ConfigError::MissingParameter("voltage_in_kilovolts"))?,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn config() -> InstrumentConfig {
        InstrumentConfig::builder()
            .shape((4, 6))
            .pad_scale(2.0)
            .pixel_size(0.5)
            .voltage_in_kilovolts(300.0)
            .build()
            .unwrap()
    }

    #[test]
    fn wavelength_at_300_kv_matches_reference_value() {
        assert_abs_diff_eq!(wavelength_from_kilovolts(300.0), 0.019687, epsilon = 1e-5);
    }

    #[test]
    fn builder_derives_padded_shape_from_scale() {
        let config = config();
        assert_eq!(config.shape(), (4, 6));
        assert_eq!(config.padded_shape(), (8, 12));
    }

    #[test]
    fn builder_defaults_padded_shape_to_shape() {
        let config = InstrumentConfig::builder()
            .shape((5, 5))
            .pixel_size(1.0)
            .voltage_in_kilovolts(200.0)
            .build()
            .unwrap();
        assert_eq!(config.padded_shape(), (5, 5));
    }

    #[test]
    fn builder_rejects_both_padded_shape_and_pad_scale() {
        let result = InstrumentConfig::builder()
            .shape((4, 4))
            .padded_shape((8, 8))
            .pad_scale(2.0)
            .pixel_size(1.0)
            .voltage_in_kilovolts(300.0)
            .build();
        assert!(matches!(result, Err(ImagingError::InvalidConfiguration(_))));
    }

    #[test]
    fn builder_reports_missing_parameters() {
        let result = InstrumentConfig::builder().shape((4, 4)).build();
        assert_eq!(
            result,
            Err(ImagingError::Config(ConfigError::MissingParameter("pixel_size")))
        );
    }

    #[test]
    fn new_rejects_padded_shape_smaller_than_shape() {
        let result = InstrumentConfig::new((8, 8), (4, 8), 1.0, 300.0);
        assert!(matches!(result, Err(ImagingError::InvalidConfiguration(_))));
    }

    #[test]
    fn new_rejects_non_positive_pixel_size_and_voltage() {
        assert!(matches!(
            InstrumentConfig::new((4, 4), (4, 4), 0.0, 300.0),
            Err(ImagingError::InvalidParameter { name: "pixel_size", .. })
        ));
        assert!(matches!(
            InstrumentConfig::new((4, 4), (4, 4), 1.0, -1.0),
            Err(ImagingError::InvalidParameter { name: "voltage_in_kilovolts", .. })
        ));
    }

    #[test]
    fn frequency_grids_follow_shape_and_pixel_size() {
        let config = config();
        let grid = config.padded_frequency_grid();
        assert_eq!(grid.dim(), (8, 12, 2));
        assert_abs_diff_eq!(grid[[0, 1, 0]], 1.0 / (12.0 * 0.5), epsilon = 1e-12);
        assert_abs_diff_eq!(grid[[1, 0, 1]], 1.0 / (8.0 * 0.5), epsilon = 1e-12);
        assert_abs_diff_eq!(grid[[4, 0, 1]], -1.0, epsilon = 1e-12);
        assert_eq!(config.frequency_grid().dim(), (4, 6, 2));
    }

    #[test]
    fn crop_inverts_fit_for_centered_images() {
        let config = config();
        let image = Array2::from_shape_fn((4, 6), |(y, x)| (y * 6 + x) as f64);
        let padded = config.fit_to_padded_shape(&image, 0.0);
        assert_eq!(padded.dim(), (8, 12));
        assert_eq!(padded[[4, 6]], image[[2, 3]]);
        assert_eq!(padded.sum(), image.sum());
        assert_eq!(config.crop_to_shape(&padded).unwrap(), image);
    }

    #[test]
    fn fit_crops_long_axes_and_pads_short_ones_around_the_center() {
        let config = config();
        let image = Array2::from_shape_fn((10, 4), |(y, x)| (y * 4 + x) as f64);
        let fitted = config.fit_to_padded_shape(&image, -1.0);
        assert_eq!(fitted.dim(), (8, 12));
        assert_eq!(fitted[[4, 6]], image[[5, 2]]);
        assert_eq!(fitted[[0, 4]], image[[1, 0]]);
        assert_eq!(fitted[[7, 7]], image[[8, 3]]);
        assert_eq!(fitted[[4, 3]], -1.0);
        assert_eq!(fitted[[4, 8]], -1.0);
    }
}
