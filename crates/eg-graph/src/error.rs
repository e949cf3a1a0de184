//! Grid construction and validation errors.

use std::fmt;

/// Category of grid element, used to scope identifier uniqueness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementCategory {
    Node,
    Branch,
    LineType,
    Der,
}

impl fmt::Display for ElementCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ElementCategory::Node => "node",
            ElementCategory::Branch => "branch",
            ElementCategory::LineType => "line type",
            ElementCategory::Der => "der",
        };
        f.write_str(s)
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("Duplicate {category} identifier '{name}'")]
    DuplicateElement {
        category: ElementCategory,
        name: String,
    },

    #[error("{category} '{name}' references unknown {target_category} '{target}'")]
    DanglingReference {
        category: ElementCategory,
        name: String,
        target_category: ElementCategory,
        target: String,
    },

    #[error("Invalid topology: {reason}")]
    InvalidTopology { reason: String },

    #[error("Unknown {category} '{name}'")]
    UnknownElement {
        category: ElementCategory,
        name: String,
    },

    #[error("Core error: {0}")]
    Core(#[from] eg_core::EgError),
}

pub type GraphResult<T> = Result<T, GraphError>;

impl GraphError {
    pub(crate) fn topology(reason: impl Into<String>) -> Self {
        GraphError::InvalidTopology {
            reason: reason.into(),
        }
    }
}
