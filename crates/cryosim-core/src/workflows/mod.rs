//! # Workflows Module
//!
//! High-level entry points that produce images from a configured simulation.
//!
//! ## Overview
//!
//! A workflow binds a scattering theory to an
//! [`InstrumentConfig`](crate::core::instrument::InstrumentConfig), optionally records the
//! result with a detector, and carries the spectra back to real space: filtering, inverse
//! transform, cropping to the detector shape, masking and optional normalization.
//! Pipelines can be built directly from domain objects or from a TOML
//! [`SimulationConfig`](crate::engine::config::SimulationConfig).
//!
//! ## Architecture
//!
//! - **Image Rendering** ([`image`]) - The image pipeline and its render options

pub mod image;
