use crate::{
    sla::ContractStatus,
    types::{ActivationId, ContractId, SpecialistId},
};
use std::fmt;
use thiserror::Error;

/// One problem found while validating a definition batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// Contract id or specialist name; `#<index>` when the entry has none.
    pub subject: String,
    pub problem: String,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.subject, self.problem)
    }
}

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Catalog rejected, invalid contracts: [{}]", .offending.join(", "))]
    Invalid {
        offending: Vec<ContractId>,
        issues:    Vec<ValidationIssue>,
    },

    #[error("Contract '{id}' not found in catalog")]
    NotFound { id: ContractId },

    #[error("Catalog parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum RosterError {
    #[error("Roster rejected, invalid specialists: [{}]", .offending.join(", "))]
    Invalid {
        offending: Vec<String>,
        issues:    Vec<ValidationIssue>,
    },

    #[error("Specialist {id} not on roster")]
    UnknownSpecialist { id: SpecialistId },

    #[error("Roster parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// A lifecycle call aimed at an activation that can no longer change.
/// Returned instead of mutating, so delayed or duplicated events are harmless.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StaleReference {
    #[error("Activation {activation_id} is unknown")]
    Unknown { activation_id: ActivationId },

    #[error("Activation {activation_id} already settled as {status:?}")]
    Settled {
        activation_id: ActivationId,
        status:        ContractStatus,
    },
}

#[derive(Error, Debug)]
pub enum SimError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Roster(#[from] RosterError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid config: {reason}")]
    InvalidConfig { reason: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type SimResult<T> = Result<T, SimError>;
