//! # cryosim
//!
//! A library for simulating cryo-electron-microscopy images from atomic models and voxel
//! maps, following the physics of elastic scattering in the weak-phase and multislice
//! regimes.
//!
//! ## Architectural Philosophy
//!
//! The library keeps a strict three-layer architecture:
//!
//! - **[`core`]: The Foundation.** Immutable data models (`Pose`, `InstrumentConfig`,
//!   atomic and voxel potentials) and the pure numerics behind them, including the
//!   closed-form error-function integration of Gaussian atoms onto voxel grids.
//!
//! - **[`engine`]: The Strategy Layer.** Potential integrators, scattering theories,
//!   transfer functions and solvent models, each a closed set of variants composed at
//!   construction time and checked for compatibility before any work is done.
//!
//! - **[`workflows`]: The Public API.** The image pipeline that ties a scattering theory
//!   to an instrument and produces real-space images.

pub mod core;
pub mod engine;
pub mod workflows;
