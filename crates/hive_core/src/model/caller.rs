//! Opaque caller identity supplied by the authentication collaborator.

use super::validation::ValidationError;
use serde::{Deserialize, Serialize};

/// Identity of the principal issuing an operation.
///
/// The core only compares identities for equality. It never interprets,
/// displays or logs them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallerId(String);

impl CallerId {
    /// Wraps an already-resolved identity. Blank identities are rejected.
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(ValidationError::BlankField("caller"));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
