mod resource {
    pub mod mock;
}

#[cfg(test)]
mod tests {
    use crate::resource::mock::MockExecutor;
    use indoc::indoc;
    use marrow::{
        AttributeOptions, Context, DataKind, EntityDecl, ModelRegistry, Result, Value,
    };

    /// Entity with both transform overrides: the setter rewrites "zeus" to
    /// "thor" before storage, the getter upper-cases on the way out.
    fn notes() -> Result<ModelRegistry> {
        let mut registry = ModelRegistry::new();
        registry.declare(
            EntityDecl::new("Note")
                .attribute("id", AttributeOptions::new(DataKind::BigInt))
                .attribute(
                    "name",
                    AttributeOptions::new(DataKind::varchar())
                        .allow_null(false)
                        .getter(|record| match record.attribute("name") {
                            Ok(Value::Text(Some(v))) => Value::from(v.to_uppercase()),
                            _ => Value::Null,
                        })
                        .setter(|record, value| {
                            let value = match value {
                                Value::Text(Some(v)) if v == "zeus" => Value::from("thor"),
                                v => v,
                            };
                            record.set_attribute("name", value)
                        }),
                )
                .attribute(
                    "isPrivate",
                    AttributeOptions::new(DataKind::Boolean).default_value(true),
                )
                .attribute(
                    "lowerCaseName",
                    AttributeOptions::new(DataKind::Virtual).getter(|record| {
                        match record.attribute("name") {
                            Ok(Value::Text(Some(v))) => Value::from(v.to_lowercase()),
                            _ => Value::Null,
                        }
                    }),
                ),
        );
        registry.finalize()?;
        Ok(registry)
    }

    #[tokio::test]
    async fn create_persists_setter_output() -> Result<()> {
        let registry = notes()?;
        let model = registry.model("Note")?;
        let mut executor = MockExecutor::new();
        executor.reply_affected(1, Some(1));
        let record = model
            .create(&mut executor, [("name", Value::from("zeus"))])
            .await?;
        assert_eq!(
            executor.statements,
            ["INSERT INTO `notes` (`name`, `is_private`) VALUES ('thor', true);"]
        );
        assert_eq!(record.attribute("name")?, &Value::from("thor"));
        assert_eq!(record.get("name")?, Value::from("THOR"));
        assert_eq!(record.primary_key_value(), Value::Int64(Some(1)));
        assert!(record.is_persisted());
        assert!(!record.is_dirty("name"));
        Ok(())
    }

    #[tokio::test]
    async fn validation_failure_issues_no_statement() -> Result<()> {
        let registry = notes()?;
        let model = registry.model("Note")?;
        let mut executor = MockExecutor::new();
        let mut record = model.new_record();
        let error = record.save(&mut executor).await.unwrap_err();
        assert_eq!(error.to_string(), "name cannot be null");
        assert!(executor.statements.is_empty());
        assert!(!record.is_persisted());
        Ok(())
    }

    #[tokio::test]
    async fn update_writes_only_dirty_attributes() -> Result<()> {
        let registry = notes()?;
        let model = registry.model("Note")?;
        let mut executor = MockExecutor::new();
        executor.reply_rows(
            &["id", "name", "is_private"],
            &[&[
                Value::Int64(Some(1)),
                Value::from("thor"),
                Value::from(true),
            ]],
        );
        let mut record = model
            .find()
            .where_eq("id", 1i64)
            .one(&mut executor)
            .await?
            .context("note is missing")?;
        assert_eq!(
            executor.statements,
            ["SELECT `id`, `name`, `is_private` FROM `notes` WHERE `id` = 1 LIMIT 1;"]
        );
        assert!(record.is_persisted());

        record.set("name", "freyja")?;
        assert!(record.is_dirty("name"));
        executor.reply_affected(1, None);
        record.save(&mut executor).await?;
        assert_eq!(
            executor.statements[1],
            "UPDATE `notes` SET `name` = 'freyja' WHERE `id` = 1;"
        );
        assert!(!record.is_dirty("name"));

        // A clean record saves without touching storage.
        record.save(&mut executor).await?;
        assert_eq!(executor.statements.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn reload_replaces_in_memory_state() -> Result<()> {
        let registry = notes()?;
        let model = registry.model("Note")?;
        let mut executor = MockExecutor::new();
        executor.reply_affected(1, Some(7));
        let mut record = model
            .create(&mut executor, [("name", Value::from("loki"))])
            .await?;
        record.set_attribute("name", "baldr")?;
        executor.reply_rows(
            &["id", "name", "is_private"],
            &[&[
                Value::Int64(Some(7)),
                Value::from("loki"),
                Value::from(true),
            ]],
        );
        record.reload(&mut executor).await?;
        assert_eq!(
            executor.statements[1],
            "SELECT `id`, `name`, `is_private` FROM `notes` WHERE `id` = 7 LIMIT 1;"
        );
        assert_eq!(record.attribute("name")?, &Value::from("loki"));
        assert_eq!(record.get("name")?, Value::from("LOKI"));
        assert!(!record.is_dirty("name"));
        Ok(())
    }

    #[tokio::test]
    async fn update_requires_a_set_primary_key() -> Result<()> {
        let registry = notes()?;
        let model = registry.model("Note")?;
        let mut executor = MockExecutor::new();
        executor.reply_rows(&["name"], &[&[Value::from("thor")]]);
        let mut record = model
            .find_one(&mut executor)
            .await?
            .context("note is missing")?;
        record.set_attribute("name", "odin")?;
        let error = record.save(&mut executor).await.unwrap_err();
        assert!(error.to_string().contains("unset primary key"));
        Ok(())
    }

    #[tokio::test]
    async fn virtual_attributes_compute_and_reject_writes() -> Result<()> {
        let registry = notes()?;
        let model = registry.model("Note")?;
        let mut record = model.new_record();
        record.set("name", "Mjolnir")?;
        assert_eq!(record.get("lowerCaseName")?, Value::from("mjolnir"));
        assert!(record.set_attribute("lowerCaseName", "x").is_err());
        let object = record.to_object()?;
        assert_eq!(object.get("lowerCaseName"), Some(&Value::from("mjolnir")));
        assert_eq!(object.get("name"), Some(&Value::from("MJOLNIR")));
        Ok(())
    }

    #[tokio::test]
    async fn sync_force_drops_then_creates() -> Result<()> {
        let registry = notes()?;
        let model = registry.model("Note")?;
        let mut executor = MockExecutor::new();
        executor.reply_affected(0, None);
        executor.reply_affected(0, None);
        model.sync(&mut executor, true).await?;
        assert_eq!(
            executor.statements,
            [
                "DROP TABLE IF EXISTS `notes`;",
                indoc! {"
                    CREATE TABLE `notes` (
                    `id` BIGINT PRIMARY KEY AUTO_INCREMENT,
                    `name` VARCHAR(255) NOT NULL,
                    `is_private` TINYINT(1) DEFAULT true
                    );"},
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn storage_failure_keeps_the_record_dirty() -> Result<()> {
        let registry = notes()?;
        let model = registry.model("Note")?;
        // No scripted reply, so the insert round trip fails.
        let mut executor = MockExecutor::new();
        let mut record = model.new_record();
        record.set("name", "tyr")?;
        assert!(record.save(&mut executor).await.is_err());
        assert!(record.is_dirty("name"));
        assert!(!record.is_persisted());
        Ok(())
    }

    #[tokio::test]
    async fn unknown_attribute_access_is_an_error() -> Result<()> {
        let registry = notes()?;
        let model = registry.model("Note")?;
        let mut record = model.new_record();
        assert!(record.attribute("nope").is_err());
        assert!(record.set("nope", 1).is_err());
        Ok(())
    }
}
