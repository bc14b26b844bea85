//! Allocation error taxonomy
//!
//! The taxonomy is narrow because the core operates on already-verified,
//! well-typed SSA input. Register exhaustion with evictable registers and
//! inconsistent wide pairing are recovered internally; only contract
//! violations and an unusable target description surface.

use crate::ir::types::RegClass;
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AllocError {
    /// Contract violation in the upstream IR (unreachable back edge without
    /// a loop header, a use without a reaching definition, ...). The driver
    /// should skip this method; other methods are unaffected.
    #[error("malformed CFG: {reason}")]
    MalformedCfg { reason: String },

    /// Every temp of a class is locked while another allocation is
    /// requested. Unreachable with a sane target configuration; kept as an
    /// error rather than a panic so a bad target description cannot take
    /// down the whole compilation run.
    #[error("no allocatable register left in class {class:?}")]
    ExhaustedRegisterClass { class: RegClass },
}

impl AllocError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        AllocError::MalformedCfg {
            reason: reason.into(),
        }
    }
}
