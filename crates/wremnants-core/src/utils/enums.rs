use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::WremError;

/// Whether a sample holds recorded collisions or simulated events.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SampleKind {
    /// Recorded collision data, normalised by its integrated luminosity.
    Data,
    /// Monte Carlo simulation, normalised by cross section and the sum of generator weights.
    Simulation,
}
impl SampleKind {
    pub fn is_data(&self) -> bool {
        matches!(self, SampleKind::Data)
    }
}
impl Display for SampleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SampleKind::Data => write!(f, "data"),
            SampleKind::Simulation => write!(f, "simulation"),
        }
    }
}
impl FromStr for SampleKind {
    type Err = WremError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "data" => Ok(Self::Data),
            "simulation" | "sim" | "mc" => Ok(Self::Simulation),
            _ => Err(WremError::ParseError {
                name: s.to_string(),
                object: "SampleKind".to_string(),
            }),
        }
    }
}

/// The element type of a [`Column`](crate::column::Column).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnKind {
    /// One `f64` per row
    Float,
    /// One `i64` per row
    Int,
    /// One `bool` per row
    Bool,
    /// A variable-length `f64` collection per row
    FloatVec,
    /// A variable-length `i64` collection per row
    IntVec,
    /// A variable-length `bool` collection per row
    BoolVec,
    /// One [`FourVector`](crate::utils::vectors::FourVector) per row
    FourVector,
}
impl ColumnKind {
    /// Whether values of this kind can be used directly as a histogram coordinate or weight.
    pub fn is_scalar(&self) -> bool {
        matches!(self, ColumnKind::Float | ColumnKind::Int | ColumnKind::Bool)
    }
}
impl Display for ColumnKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ColumnKind::Float => write!(f, "Float"),
            ColumnKind::Int => write!(f, "Int"),
            ColumnKind::Bool => write!(f, "Bool"),
            ColumnKind::FloatVec => write!(f, "FloatVec"),
            ColumnKind::IntVec => write!(f, "IntVec"),
            ColumnKind::BoolVec => write!(f, "BoolVec"),
            ColumnKind::FourVector => write!(f, "FourVector"),
        }
    }
}
impl FromStr for ColumnKind {
    type Err = WremError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "float" | "f64" | "double" => Ok(Self::Float),
            "int" | "i64" => Ok(Self::Int),
            "bool" => Ok(Self::Bool),
            "floatvec" | "rvec<double>" | "rvec<float>" => Ok(Self::FloatVec),
            "intvec" | "rvec<int>" => Ok(Self::IntVec),
            "boolvec" | "rvec<bool>" => Ok(Self::BoolVec),
            "fourvector" | "p4" => Ok(Self::FourVector),
            _ => Err(WremError::ParseError {
                name: s.to_string(),
                object: "ColumnKind".to_string(),
            }),
        }
    }
}
