//! # Engine Module
//!
//! The strategy layer of the simulator: everything that turns a posed specimen into a
//! field at the detector.
//!
//! ## Overview
//!
//! Image formation is assembled from independent strategies chosen at construction time:
//! a scattering potential, a [`integrator::PotentialIntegrator`] that reduces it to a 2D
//! field, a [`scattering::ScatteringTheory`] that turns that field into an exit wave, and a
//! [`transfer::TransferTheory`] that carries the wave to the detector. Invalid pairings are
//! rejected when a theory is built, never halfway through a simulation.
//!
//! ## Architecture
//!
//! - **Specimens** ([`specimen`]) - A potential in a pose, and assemblies of posed subunits
//! - **Integration** ([`integrator`]) - Projection, Fourier-slice and multislice integrators
//! - **Scattering** ([`scattering`]) - Weak-phase, linear-superposition and multislice theories
//! - **Transfer** ([`transfer`]) - Wave and contrast transfer functions of the objective lens
//! - **Solvent** ([`solvent`]) - Stochastic ice backgrounds
//! - **Detection** ([`detector`]) - Noiseless and Gaussian detector readouts
//! - **Configuration** ([`config`]) - TOML simulation files and builder errors
//! - **Error Handling** ([`error`]) - The imaging error taxonomy

pub mod config;
pub mod detector;
pub mod error;
pub mod integrator;
pub mod scattering;
pub mod solvent;
pub mod specimen;
pub mod transfer;
