#[cfg(test)]
mod tests {
    use marrow::{
        AttributeOptions, DataKind, EntityDecl, MarrowError, ModelRegistry, Result, Validator,
        Value, validate,
    };
    use std::sync::Arc;

    fn gods() -> Result<Arc<marrow::EntityDef>> {
        let mut registry = ModelRegistry::new();
        registry.declare(
            EntityDecl::new("God")
                .attribute("id", AttributeOptions::new(DataKind::BigInt))
                .attribute(
                    "name",
                    AttributeOptions::new(DataKind::varchar())
                        .allow_null(false)
                        .validate(Validator::not_in(["Yhorm", "Gwyn"])),
                )
                .attribute(
                    "status",
                    AttributeOptions::new(DataKind::integer())
                        .validate(Validator::is_in([1, 2]).message("Error status")),
                )
                .attribute(
                    "realm",
                    AttributeOptions::new(DataKind::varchar())
                        .validate(Validator::predicate("isKnown", |value| {
                            matches!(value, Value::Text(Some(v)) if v != "void")
                        }))
                        .validate(Validator::check("fitsBanner", |value| {
                            match value {
                                Value::Text(Some(v)) if v.len() > 16 => {
                                    Err(format!("{v} does not fit the banner"))
                                }
                                _ => Ok(()),
                            }
                        })),
                )
                .attribute(
                    "rank",
                    AttributeOptions::new(DataKind::varchar()).validate(Validator::is_numeric()),
                ),
        );
        registry.finalize()?;
        registry.entity("God")
    }

    fn rule_of(error: &marrow::Error) -> &str {
        match error.downcast_ref::<MarrowError>() {
            Some(MarrowError::Validation { rule, .. }) => rule,
            _ => panic!("expected a validation error, got {error}"),
        }
    }

    #[test]
    fn not_null_runs_before_declared_validators() -> Result<()> {
        let def = gods()?;
        let name = def.schema.attribute("name").unwrap();
        let error = validate("God", name, &Value::Null).unwrap_err();
        assert_eq!(error.to_string(), "name cannot be null");
        assert_eq!(rule_of(&error), "notNull");
        // An empty string counts as missing too.
        let error = validate("God", name, &Value::from("")).unwrap_err();
        assert_eq!(rule_of(&error), "notNull");
        Ok(())
    }

    #[test]
    fn generated_message_names_rule_and_attribute() -> Result<()> {
        let def = gods()?;
        let name = def.schema.attribute("name").unwrap();
        let error = validate("God", name, &Value::from("Yhorm")).unwrap_err();
        assert_eq!(error.to_string(), "Validation notIn on name failed");
        validate("God", name, &Value::from("Leah"))?;
        Ok(())
    }

    #[test]
    fn declared_message_overrides_generated_one() -> Result<()> {
        let def = gods()?;
        let status = def.schema.attribute("status").unwrap();
        let error = validate("God", status, &Value::from(3)).unwrap_err();
        assert_eq!(error.to_string(), "Error status");
        validate("God", status, &Value::from(2))?;
        Ok(())
    }

    #[test]
    fn membership_rules_compare_loosely() -> Result<()> {
        let def = gods()?;
        let status = def.schema.attribute("status").unwrap();
        // Textual "1" relates to the declared integer 1.
        validate("God", status, &Value::from("1"))?;
        assert!(validate("God", status, &Value::from("3")).is_err());
        Ok(())
    }

    #[test]
    fn validators_run_in_declaration_order() -> Result<()> {
        let def = gods()?;
        let realm = def.schema.attribute("realm").unwrap();
        // "void" violates both rules; the first declared one reports.
        let error = validate("God", realm, &Value::from("void")).unwrap_err();
        assert_eq!(rule_of(&error), "isKnown");
        assert_eq!(error.to_string(), "Validation isKnown on realm failed");
        Ok(())
    }

    #[test]
    fn check_rule_message_wins() -> Result<()> {
        let def = gods()?;
        let realm = def.schema.attribute("realm").unwrap();
        let error =
            validate("God", realm, &Value::from("an unreasonably long name")).unwrap_err();
        assert_eq!(
            error.to_string(),
            "an unreasonably long name does not fit the banner"
        );
        assert_eq!(rule_of(&error), "fitsBanner");
        validate("God", realm, &Value::from("Asgard"))?;
        Ok(())
    }

    #[test]
    fn is_numeric_accepts_integer_shaped_text() -> Result<()> {
        let def = gods()?;
        let rank = def.schema.attribute("rank").unwrap();
        validate("God", rank, &Value::from("42"))?;
        validate("God", rank, &Value::from(7))?;
        let error = validate("God", rank, &Value::from("4x2")).unwrap_err();
        assert_eq!(error.to_string(), "Validation isNumeric on rank failed");
        // Leading digits followed by garbage are not numeric either.
        assert!(validate("God", rank, &Value::from("42nd")).is_err());
        Ok(())
    }

    #[test]
    fn nullable_attributes_skip_declared_validators_when_set() -> Result<()> {
        let def = gods()?;
        let status = def.schema.attribute("status").unwrap();
        // A nullable attribute left empty is not a membership violation.
        validate("God", status, &Value::Null)?;
        validate("God", status, &Value::Int32(None))?;
        Ok(())
    }
}
