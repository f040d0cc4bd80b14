//! Error types for the reconciliation core

use std::fmt;
use thiserror::Error;

/// Result type for core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Slot number outside the group's range (slots are 1-based)
    #[error("Invalid slot: {group} slot {index} (1..={len})")]
    InvalidSlot {
        /// Slot group name
        group: &'static str,
        /// Requested slot number
        index: u8,
        /// Number of slots in the group
        len: usize,
    },

    /// Operator code is empty or contains characters other than A-Z, 0-9 and '-'
    #[error("Invalid operator code: {0:?}")]
    InvalidOperatorCode(String),

    /// Input rejected before computation
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),
}

impl From<ValidationErrors> for Error {
    fn from(errors: ValidationErrors) -> Self {
        Error::Validation(errors)
    }
}

/// A single rejected field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    /// Field label (e.g. `vault_withdrawal_3`, `products[1].unit_price`)
    pub field: String,
    /// Human-readable reason
    pub message: String,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Collected field errors for one form submission
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    errors: Vec<FieldError>,
}

impl ValidationErrors {
    /// Empty collection
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a rejected field
    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(FieldError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// True when nothing was rejected
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Number of rejected fields
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Rejected fields in submission order
    pub fn errors(&self) -> &[FieldError] {
        &self.errors
    }

    /// Whether a given field label was rejected
    pub fn contains(&self, field: &str) -> bool {
        self.errors.iter().any(|e| e.field == field)
    }

    /// `Ok(())` when empty, otherwise the collection as an error
    pub fn into_result(self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(self))
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.errors.iter().map(ToString::to_string).collect();
        write!(f, "{}", parts.join("; "))
    }
}
