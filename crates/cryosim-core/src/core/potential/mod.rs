//! # Potential Module
//!
//! Representations of a specimen's scattering potential and the numerics that sample
//! them onto grids.
//!
//! ## Overview
//!
//! A potential is either a set of atoms, each a mixture of isotropic Gaussians
//! ([`atomic`]), or a voxel grid stored in real or Fourier space ([`voxel`]). Atomic
//! potentials are turned into voxel grids by the closed-form error-function integrals in
//! [`integration`], using the tabulated scattering factors from [`elements`] when atoms
//! are given by species.
//!
//! All representations are immutable values; viewing a potential in a pose returns a
//! new potential.

pub mod atomic;
pub mod elements;
pub mod integration;
pub mod voxel;

use crate::core::models::pose::Pose;
use atomic::AtomicPotential;
use voxel::{FourierVoxelGridPotential, RealVoxelGridPotential};

/// The closed set of potential representations understood by the integrators.
#[derive(Debug, Clone, PartialEq)]
pub enum ScatteringPotential {
    Atomic(AtomicPotential),
    RealVoxel(RealVoxelGridPotential),
    FourierVoxel(FourierVoxelGridPotential),
}

impl ScatteringPotential {
    pub fn rotate_to_pose(&self, pose: &Pose) -> Self {
        match self {
            Self::Atomic(potential) => Self::Atomic(potential.rotate_to_pose(pose)),
            Self::RealVoxel(potential) => Self::RealVoxel(potential.rotate_to_pose(pose)),
            Self::FourierVoxel(potential) => Self::FourierVoxel(potential.rotate_to_pose(pose)),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Atomic(_) => "atomic",
            Self::RealVoxel(_) => "real voxel grid",
            Self::FourierVoxel(_) => "fourier voxel grid",
        }
    }
}

impl From<AtomicPotential> for ScatteringPotential {
    fn from(potential: AtomicPotential) -> Self {
        Self::Atomic(potential)
    }
}

impl From<RealVoxelGridPotential> for ScatteringPotential {
    fn from(potential: RealVoxelGridPotential) -> Self {
        Self::RealVoxel(potential)
    }
}

impl From<FourierVoxelGridPotential> for ScatteringPotential {
    fn from(potential: FourierVoxelGridPotential) -> Self {
        Self::FourierVoxel(potential)
    }
}
