//! Per-user code assignment record.

use serde::{Deserialize, Serialize};

use crate::id::AccessCode;

/// Binds one user to at most one access code plus its delivery state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub code: Option<AccessCode>,
    pub sent: bool,
}

impl Assignment {
    pub fn delivered(code: AccessCode) -> Self {
        Self {
            code: Some(code),
            sent: true,
        }
    }

    pub fn reserved(code: AccessCode) -> Self {
        Self {
            code: Some(code),
            sent: false,
        }
    }

    /// Canonical "already has a code" check: a non-empty code field.
    pub fn has_code(&self) -> bool {
        self.code.as_ref().is_some_and(|c| !c.is_empty())
    }

    /// The assigned code, if [`Assignment::has_code`] holds.
    pub fn code(&self) -> Option<&AccessCode> {
        self.code.as_ref().filter(|c| !c.is_empty())
    }
}
