//! # Core Module
//!
//! Stateless data models and pure numerics for image simulation.
//!
//! ## Overview
//!
//! Everything in this layer is a value type or a pure function: poses, instrument
//! geometry, scattering potentials, and the transforms used to sample and move them.
//! Nothing here holds mutable state, so the same inputs always give the same outputs
//! and independent pieces of work can run in parallel without synchronization.
//!
//! ## Architecture
//!
//! - **Geometry** ([`models`]) - Poses, coordinate grids and interpolation
//! - **Instrument** ([`instrument`]) - Image shapes, pixel size, wavelength and frequency grids
//! - **Potentials** ([`potential`]) - Atomic and voxel potentials and the voxel integration engine
//! - **Transforms** ([`fft`]) - Centered discrete Fourier transforms over `ndarray` arrays

pub mod fft;
pub mod instrument;
pub mod models;
pub mod potential;
