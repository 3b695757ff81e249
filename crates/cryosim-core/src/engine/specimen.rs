use crate::core::models::pose::Pose;
use crate::core::potential::ScatteringPotential;
use crate::engine::error::{ImagingError, Result};

/// A single scattering potential viewed in a pose.
#[derive(Debug, Clone, PartialEq)]
pub struct Specimen {
    potential: ScatteringPotential,
    pose: Pose,
}

impl Specimen {
    pub fn new(potential: impl Into<ScatteringPotential>, pose: Pose) -> Self {
        Self {
            potential: potential.into(),
            pose,
        }
    }

    pub fn potential(&self) -> &ScatteringPotential {
        &self.potential
    }

    pub fn pose(&self) -> &Pose {
        &self.pose
    }

    /// The potential rotated into the frame of the microscope.
    pub fn potential_in_lab_frame(&self) -> ScatteringPotential {
        self.potential.rotate_to_pose(&self.pose)
    }
}

/// One copy of a conformation within an [`Assembly`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Subunit {
    pub pose: Pose,
    pub conformation: usize,
}

/// Copies of one or more conformations of a base potential, each placed with its own pose.
///
/// Every subunit refers to a conformation by index; indices are checked at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Assembly {
    conformations: Vec<ScatteringPotential>,
    subunits: Vec<Subunit>,
}

impl Assembly {
    pub fn new(conformations: Vec<ScatteringPotential>, subunits: Vec<Subunit>) -> Result<Self> {
        if conformations.is_empty() {
            return Err(ImagingError::InvalidConfiguration(
                "an assembly needs at least one conformation".to_string(),
            ));
        }
        if subunits.is_empty() {
            return Err(ImagingError::InvalidConfiguration(
                "an assembly needs at least one subunit".to_string(),
            ));
        }
        if let Some(subunit) = subunits
            .iter()
            .find(|s| s.conformation >= conformations.len())
        {
            return Err(ImagingError::InvalidConfiguration(format!(
                "subunit refers to conformation {} but only {} are defined",
                subunit.conformation,
                conformations.len()
            )));
        }
        Ok(Self {
            conformations,
            subunits,
        })
    }

    /// Identical copies of a single potential, one per pose.
    pub fn from_poses(potential: impl Into<ScatteringPotential>, poses: &[Pose]) -> Result<Self> {
        let subunits = poses
            .iter()
            .map(|&pose| Subunit {
                pose,
                conformation: 0,
            })
            .collect();
        Self::new(vec![potential.into()], subunits)
    }

    pub fn conformations(&self) -> &[ScatteringPotential] {
        &self.conformations
    }

    pub fn subunits(&self) -> &[Subunit] {
        &self.subunits
    }

    pub fn len(&self) -> usize {
        self.subunits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subunits.is_empty()
    }

    /// The conformation a subunit refers to. Subunits built outside this assembly may
    /// point past its conformations.
    pub fn potential_of(&self, subunit: &Subunit) -> Result<&ScatteringPotential> {
        self.conformations.get(subunit.conformation).ok_or_else(|| {
            ImagingError::invalid_parameter(
                "conformation",
                format!(
                    "index {} is out of range for {} conformations",
                    subunit.conformation,
                    self.conformations.len()
                ),
            )
        })
    }

    /// Moves the whole assembly: every subunit pose is composed after `pose`.
    pub fn with_pose(&self, pose: &Pose) -> Self {
        Self {
            conformations: self.conformations.clone(),
            subunits: self
                .subunits
                .iter()
                .map(|subunit| Subunit {
                    pose: pose.compose(&subunit.pose),
                    conformation: subunit.conformation,
                })
                .collect(),
        }
    }
}
