use crate::Error;
use thiserror::Error as ThisError;

/// Structured failures raised by the core. Everything propagates as
/// [`crate::Error`] so callers can `downcast_ref::<MarrowError>()` when they
/// need the entity / attribute / rule identity.
#[derive(Debug, ThisError)]
pub enum MarrowError {
    /// Declaration-time mistakes: unresolved targets, duplicate primary
    /// keys, unknown data kinds, undeclared relation paths. Never retried.
    #[error("invalid configuration of {entity}: {reason}")]
    Configuration { entity: String, reason: String },

    /// Raised from `save`; recoverable by fixing the value and retrying.
    #[error("{message}")]
    Validation {
        entity: String,
        attribute: String,
        rule: String,
        message: String,
    },

    /// A value could not be converted to its declared kind.
    #[error("cannot coerce {given} into {kind} for attribute {attribute}")]
    Coercion {
        attribute: String,
        kind: String,
        given: String,
    },
}

impl MarrowError {
    pub fn config(entity: impl Into<String>, reason: impl Into<String>) -> Error {
        MarrowError::Configuration {
            entity: entity.into(),
            reason: reason.into(),
        }
        .into()
    }

    /// Builds a validation failure, generating the conventional
    /// `Validation <rule> on <attribute> failed` text when the rule did not
    /// carry its own message.
    pub fn validation(
        entity: impl Into<String>,
        attribute: impl Into<String>,
        rule: impl Into<String>,
        message: Option<String>,
    ) -> Error {
        let attribute = attribute.into();
        let rule = rule.into();
        let message =
            message.unwrap_or_else(|| format!("Validation {} on {} failed", rule, attribute));
        MarrowError::Validation {
            entity: entity.into(),
            attribute,
            rule,
            message,
        }
        .into()
    }

    pub fn coercion(
        attribute: impl Into<String>,
        kind: impl Into<String>,
        given: impl Into<String>,
    ) -> Error {
        MarrowError::Coercion {
            attribute: attribute.into(),
            kind: kind.into(),
            given: given.into(),
        }
        .into()
    }
}
