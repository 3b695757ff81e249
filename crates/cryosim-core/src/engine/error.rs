use super::config::ConfigError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ImagingError>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ImagingError {
    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Incompatible strategy: {0}")]
    IncompatibleStrategy(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ImagingError {
    pub(crate) fn invalid_parameter(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}

/// Fails unless every value is finite and strictly positive.
pub(crate) fn ensure_positive<'a, I>(name: &'static str, values: I) -> Result<()>
where
    I: IntoIterator<Item = &'a f64>,
{
    for (idx, &value) in values.into_iter().enumerate() {
        if !(value.is_finite() && value > 0.0) {
            return Err(ImagingError::invalid_parameter(
                name,
                format!("expected a positive value, got {value} at index {idx}"),
            ));
        }
    }
    Ok(())
}

/// Fails unless every value is finite and non-negative.
pub(crate) fn ensure_non_negative<'a, I>(name: &'static str, values: I) -> Result<()>
where
    I: IntoIterator<Item = &'a f64>,
{
    for (idx, &value) in values.into_iter().enumerate() {
        if !(value.is_finite() && value >= 0.0) {
            return Err(ImagingError::invalid_parameter(
                name,
                format!("expected a non-negative value, got {value} at index {idx}"),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_positive_accepts_strictly_positive_values() {
        assert!(ensure_positive("widths", &[0.1, 2.0, 1e-9]).is_ok());
    }

    #[test]
    fn ensure_positive_rejects_zero_negative_and_nan() {
        for bad in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let result = ensure_positive("widths", &[1.0, bad]);
            assert!(matches!(
                result,
                Err(ImagingError::InvalidParameter { name: "widths", .. })
            ));
        }
    }

    #[test]
    fn ensure_non_negative_accepts_zero() {
        assert!(ensure_non_negative("b_factors", &[0.0, 3.5]).is_ok());
    }

    #[test]
    fn ensure_non_negative_rejects_negative_values() {
        let result = ensure_non_negative("b_factors", &[1.0, -0.5]);
        assert!(matches!(
            result,
            Err(ImagingError::InvalidParameter { name: "b_factors", .. })
        ));
    }

    #[test]
    fn invalid_parameter_message_names_the_field() {
        let err = ImagingError::invalid_parameter("defocus", "must be positive");
        assert_eq!(
            err.to_string(),
            "Invalid parameter 'defocus': must be positive"
        );
    }
}
