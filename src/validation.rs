use crate::{AttributeMeta, MarrowError, Result, Value};
use std::{fmt, sync::Arc};

/// One named rule in an attribute's validation pipeline.
#[derive(Clone)]
pub struct Validator {
    pub name: String,
    pub rule: Rule,
    /// Overrides the generated `Validation <rule> on <attribute> failed`
    /// message.
    pub message: Option<String>,
}

#[derive(Clone)]
pub enum Rule {
    /// Value must not loosely equal any listed value.
    NotIn(Vec<Value>),
    /// Value must loosely equal one of the listed values.
    IsIn(Vec<Value>),
    /// Value must be an integer or an integer-shaped string.
    IsNumeric,
    /// Boolean predicate over the value.
    Predicate(Arc<dyn Fn(&Value) -> bool + Send + Sync>),
    /// Throwing check: the returned message wins over everything else.
    Check(Arc<dyn Fn(&Value) -> std::result::Result<(), String> + Send + Sync>),
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Validator")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl Validator {
    pub fn not_in(values: impl IntoIterator<Item = impl Into<Value>>) -> Self {
        Self {
            name: "notIn".into(),
            rule: Rule::NotIn(values.into_iter().map(Into::into).collect()),
            message: None,
        }
    }

    pub fn is_in(values: impl IntoIterator<Item = impl Into<Value>>) -> Self {
        Self {
            name: "isIn".into(),
            rule: Rule::IsIn(values.into_iter().map(Into::into).collect()),
            message: None,
        }
    }

    pub fn is_numeric() -> Self {
        Self {
            name: "isNumeric".into(),
            rule: Rule::IsNumeric,
            message: None,
        }
    }

    pub fn predicate(
        name: impl Into<String>,
        predicate: impl Fn(&Value) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            rule: Rule::Predicate(Arc::new(predicate)),
            message: None,
        }
    }

    pub fn check(
        name: impl Into<String>,
        check: impl Fn(&Value) -> std::result::Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            rule: Rule::Check(Arc::new(check)),
            message: None,
        }
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Runs an attribute's validators in declaration order, stopping at the
/// first failure. `allow_null: false` is itself a rule evaluated before any
/// user-declared validator; an empty value on a nullable attribute passes
/// without consulting the declared rules.
pub fn validate(entity: &str, attribute: &AttributeMeta, value: &Value) -> Result<()> {
    if is_empty(value) {
        if attribute.allow_null {
            return Ok(());
        }
        return Err(MarrowError::validation(
            entity,
            &attribute.name,
            "notNull",
            Some(format!("{} cannot be null", attribute.name)),
        ));
    }
    for validator in &attribute.validators {
        let ok = match &validator.rule {
            Rule::NotIn(values) => !values.iter().any(|v| v.loose_eq(value)),
            Rule::IsIn(values) => values.iter().any(|v| v.loose_eq(value)),
            Rule::IsNumeric => is_numeric(value),
            Rule::Predicate(predicate) => predicate(value),
            Rule::Check(check) => match check(value) {
                Ok(()) => true,
                Err(message) => {
                    return Err(MarrowError::validation(
                        entity,
                        &attribute.name,
                        &validator.name,
                        Some(message),
                    ));
                }
            },
        };
        if !ok {
            return Err(MarrowError::validation(
                entity,
                &attribute.name,
                &validator.name,
                validator.message.clone(),
            ));
        }
    }
    Ok(())
}

fn is_empty(value: &Value) -> bool {
    value.is_none() || matches!(value, Value::Text(Some(v)) if v.is_empty())
}

fn is_numeric(value: &Value) -> bool {
    match value {
        Value::Int32(Some(..)) | Value::UInt32(Some(..)) | Value::Int64(Some(..)) => true,
        Value::Text(Some(v)) => match atoi::atoi::<i64>(v.trim().as_bytes()) {
            Some(parsed) => parsed.to_string() == v.trim(),
            None => false,
        },
        _ => false,
    }
}
