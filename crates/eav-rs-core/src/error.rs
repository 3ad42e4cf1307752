//! Core error types for eav-rs.
//!
//! [`EavError`] covers storage errors raised by the ORM layer, validation
//! failures raised before anything is persisted, attribute lookup failures,
//! and configuration mistakes. [`EavError::category`] groups the variants into
//! the coarse classes callers usually branch on.

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

/// Represents a validation error with optional field-level errors.
///
/// Validation errors can be either simple (a single message) or compound
/// (containing per-field error lists). EAV attribute failures are keyed by
/// the attribute slug.
///
/// # Examples
///
/// ```
/// use eav_rs_core::error::ValidationError;
///
/// // Simple validation error
/// let err = ValidationError::new("Must be an integer", "invalid_int");
///
/// // Attribute-level error
/// let err = ValidationError::field("age", err);
/// assert!(err.to_string().contains("age: Must be an integer"));
/// ```
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The primary error message.
    pub message: String,
    /// A short code identifying the type of validation failure (e.g. "required", "invalid").
    pub code: String,
    /// Additional parameters providing context for the error message.
    pub params: HashMap<String, String>,
    /// Per-field validation errors, keyed by field name or attribute slug.
    pub field_errors: HashMap<String, Vec<Self>>,
}

impl ValidationError {
    /// Creates a new `ValidationError` with a message and code.
    pub fn new(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: code.into(),
            params: HashMap::new(),
            field_errors: HashMap::new(),
        }
    }

    /// Creates a `ValidationError` containing per-field errors.
    pub fn with_field_errors(field_errors: HashMap<String, Vec<Self>>) -> Self {
        Self {
            message: String::new(),
            code: String::new(),
            params: HashMap::new(),
            field_errors,
        }
    }

    /// Wraps a single error under one field name.
    pub fn field(name: impl Into<String>, error: Self) -> Self {
        let mut field_errors = HashMap::new();
        field_errors.insert(name.into(), vec![error]);
        Self::with_field_errors(field_errors)
    }

    /// Adds a parameter to this validation error.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Returns the codes of this error and all nested field errors.
    pub fn codes(&self) -> Vec<&str> {
        let mut codes = Vec::new();
        if !self.code.is_empty() {
            codes.push(self.code.as_str());
        }
        for errors in self.field_errors.values() {
            for error in errors {
                codes.extend(error.codes());
            }
        }
        codes
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.message.is_empty() {
            write!(f, "{}", self.message)?;
        } else if !self.field_errors.is_empty() {
            let mut fields: Vec<_> = self.field_errors.iter().collect();
            fields.sort_by(|a, b| a.0.cmp(b.0));
            let mut first = true;
            for (field, errors) in fields {
                for error in errors {
                    if !first {
                        write!(f, "; ")?;
                    }
                    write!(f, "{field}: {error}")?;
                    first = false;
                }
            }
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

/// Coarse classification of [`EavError`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Invalid data rejected before persistence.
    Validation,
    /// A named object (row, attribute, field) could not be found.
    Lookup,
    /// A storage-level UNIQUE or CHECK constraint fired.
    Constraint,
    /// The caller asked for something the setup does not allow.
    Configuration,
    /// The database or filesystem failed.
    Storage,
}

/// The primary error type for eav-rs.
#[derive(Error, Debug)]
pub enum EavError {
    // ── ORM errors ───────────────────────────────────────────────────

    /// Raised when a query expected exactly one result but found none.
    #[error("Object does not exist: {0}")]
    DoesNotExist(String),

    /// Raised when a query expected exactly one result but found multiple.
    #[error("Multiple objects returned when one expected: {0}")]
    MultipleObjectsReturned(String),

    /// A query referenced a field the model does not have.
    #[error("Field does not exist: {0}")]
    FieldDoesNotExist(String),

    /// A generic database error.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// A database integrity constraint was violated.
    #[error("Integrity error: {0}")]
    IntegrityError(String),

    /// An operational database error (open failure, lock, etc.).
    #[error("Operational error: {0}")]
    OperationalError(String),

    // ── Validation ───────────────────────────────────────────────────

    /// One or more fields or attributes failed validation.
    #[error("Validation error: {0}")]
    ValidationError(ValidationError),

    /// Values were assigned to slugs the entity's configuration does not expose.
    #[error("Instance of the model {model} tried to assign values to nonexistent EAV attributes: {}", .slugs.join(", "))]
    IllegalAssignment {
        /// The host model label.
        model: String,
        /// The offending slugs, sorted.
        slugs: Vec<String>,
    },

    // ── Attribute lookup ─────────────────────────────────────────────

    /// The slug does not name an attribute available to the entity.
    #[error("{model} has no EAV attribute named '{slug}'")]
    AttributeNotFound {
        /// The host model label.
        model: String,
        /// The slug that was requested.
        slug: String,
    },

    // ── Configuration ────────────────────────────────────────────────

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// The library is improperly configured (e.g. registering an unknown model).
    #[error("Improperly configured: {0}")]
    ImproperlyConfigured(String),

    /// The requested operation is recognised but not supported.
    #[error("Not supported: {0}")]
    NotSupported(String),

    // ── Serialization ────────────────────────────────────────────────

    /// An error occurred during serialization or deserialization.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    // ── IO ───────────────────────────────────────────────────────────

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl EavError {
    /// Returns the coarse category of this error.
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::ValidationError(_) | Self::IllegalAssignment { .. } => ErrorCategory::Validation,
            Self::DoesNotExist(_)
            | Self::MultipleObjectsReturned(_)
            | Self::FieldDoesNotExist(_)
            | Self::AttributeNotFound { .. } => ErrorCategory::Lookup,
            Self::IntegrityError(_) => ErrorCategory::Constraint,
            Self::ConfigurationError(_) | Self::ImproperlyConfigured(_) | Self::NotSupported(_) => {
                ErrorCategory::Configuration
            }
            Self::DatabaseError(_)
            | Self::OperationalError(_)
            | Self::SerializationError(_)
            | Self::IoError(_) => ErrorCategory::Storage,
        }
    }

    /// Returns `true` for errors raised by validation.
    pub const fn is_validation(&self) -> bool {
        matches!(self.category(), ErrorCategory::Validation)
    }

    /// Returns the wrapped [`ValidationError`], if any.
    pub const fn as_validation(&self) -> Option<&ValidationError> {
        match self {
            Self::ValidationError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ValidationError> for EavError {
    fn from(err: ValidationError) -> Self {
        Self::ValidationError(err)
    }
}

impl From<serde_json::Error> for EavError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

/// A convenience type alias for `Result<T, EavError>`.
pub type EavResult<T> = Result<T, EavError>;
