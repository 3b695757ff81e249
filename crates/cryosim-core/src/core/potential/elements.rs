use crate::engine::error::{ImagingError, Result};
use phf::{Map, phf_map};

/// Number of Gaussians in each tabulated elastic scattering factor.
pub const N_GAUSSIANS: usize = 5;

/// Five-Gaussian fit of an element's elastic electron scattering factor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScatteringFactorParameters {
    pub amplitudes: [f64; N_GAUSSIANS],
    pub widths: [f64; N_GAUSSIANS],
}

// Peng et al. (1996), Acta Cryst. A52, 257-276, neutral atoms, 0 < s < 2 Å⁻¹.
#[rustfmt::skip]
static PENG_PARAMETERS: Map<u8, ScatteringFactorParameters> = phf_map! {
    1u8 => ScatteringFactorParameters {
        amplitudes: [0.0349, 0.1201, 0.1970, 0.0573, 0.1195],
        widths:     [0.5347, 3.5867, 12.3471, 18.9525, 38.6269],
    },
    6u8 => ScatteringFactorParameters {
        amplitudes: [0.0893, 0.2563, 0.7570, 1.0487, 0.3575],
        widths:     [0.2465, 1.7100, 6.4094, 18.6113, 50.2523],
    },
    7u8 => ScatteringFactorParameters {
        amplitudes: [0.1022, 0.3219, 0.7982, 0.8197, 0.1715],
        widths:     [0.2451, 1.7481, 6.1925, 17.3894, 48.1431],
    },
    8u8 => ScatteringFactorParameters {
        amplitudes: [0.0974, 0.2921, 0.6910, 0.6990, 0.2039],
        widths:     [0.2067, 1.3815, 4.6943, 12.7105, 32.4726],
    },
    15u8 => ScatteringFactorParameters {
        amplitudes: [0.2548, 0.6106, 1.4541, 2.3204, 0.8477],
        widths:     [0.2908, 1.8740, 8.5176, 24.3434, 63.2996],
    },
    16u8 => ScatteringFactorParameters {
        amplitudes: [0.2497, 0.5628, 1.3899, 2.1865, 0.7715],
        widths:     [0.2681, 1.6711, 7.0267, 19.5377, 50.3888],
    },
};

static ATOMIC_NUMBERS: Map<&'static str, u8> = phf_map! {
    "H" => 1, "C" => 6, "N" => 7, "O" => 8, "P" => 15, "S" => 16,
};

/// Looks up the tabulated parameters for an atomic number.
pub fn scattering_factor_parameters(
    atomic_number: u8,
) -> Result<&'static ScatteringFactorParameters> {
    PENG_PARAMETERS.get(&atomic_number).ok_or_else(|| {
        ImagingError::invalid_parameter(
            "atom_identities",
            format!("no scattering factor parameters for atomic number {atomic_number}"),
        )
    })
}

/// Resolves an element symbol, as found in structure files, to its atomic number.
pub fn atomic_number_from_symbol(symbol: &str) -> Result<u8> {
    let normalized = symbol.trim().to_ascii_uppercase();
    ATOMIC_NUMBERS.get(normalized.as_str()).copied().ok_or_else(|| {
        ImagingError::invalid_parameter("atom_identities", format!("unknown element '{symbol}'"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_symbol_resolves_to_a_tabulated_element() {
        for symbol in ["H", "C", "N", "O", "P", "S"] {
            let z = atomic_number_from_symbol(symbol).unwrap();
            assert!(scattering_factor_parameters(z).is_ok(), "missing table entry for {symbol}");
        }
    }

    #[test]
    fn symbol_lookup_ignores_case_and_whitespace() {
        assert_eq!(atomic_number_from_symbol(" c ").unwrap(), 6);
        assert_eq!(atomic_number_from_symbol("s").unwrap(), 16);
    }

    #[test]
    fn unknown_elements_are_rejected() {
        assert!(matches!(
            atomic_number_from_symbol("Xx"),
            Err(ImagingError::InvalidParameter { name: "atom_identities", .. })
        ));
        assert!(scattering_factor_parameters(92).is_err());
    }

    #[test]
    fn tabulated_widths_are_positive() {
        for z in [1u8, 6, 7, 8, 15, 16] {
            let params = scattering_factor_parameters(z).unwrap();
            assert!(params.widths.iter().all(|&b| b > 0.0));
            assert!(params.amplitudes.iter().all(|&a| a > 0.0));
        }
    }

    #[test]
    fn carbon_parameters_match_reference_table() {
        let carbon = scattering_factor_parameters(6).unwrap();
        assert_eq!(carbon.amplitudes[0], 0.0893);
        assert_eq!(carbon.widths[4], 50.2523);
    }
}
