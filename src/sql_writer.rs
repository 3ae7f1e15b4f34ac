use crate::{AttributeMeta, EntitySchema, Result, Value, separated_by};
use std::fmt::Write;

/// Equality-style predicate the query surface is allowed to render. The
/// `In` form is the batching mechanism of the eager-load planner.
#[derive(Debug, Clone)]
pub enum Predicate {
    Eq(String, Value),
    In(String, Vec<Value>),
}

/// Produces every piece of SQL text the core hands to the executor.
/// Identifier quoting and literal rendering live here and nowhere else.
pub trait SqlWriter {
    fn write_identifier(&self, out: &mut String, value: &str) {
        out.push('`');
        let mut position = 0;
        for (i, c) in value.char_indices() {
            if c == '`' {
                out.push_str(&value[position..i]);
                out.push_str("``");
                position = i + 1;
            }
        }
        out.push_str(&value[position..]);
        out.push('`');
    }

    fn write_value(&self, out: &mut String, value: &Value) {
        match value {
            Value::Null
            | Value::Boolean(None)
            | Value::Int32(None)
            | Value::UInt32(None)
            | Value::Int64(None)
            | Value::Text(None)
            | Value::Blob(None)
            | Value::DateTime(None)
            | Value::Json(None) => out.push_str("NULL"),
            Value::Boolean(Some(v)) => out.push_str(if *v { "true" } else { "false" }),
            Value::Int32(Some(v)) => out.push_str(itoa::Buffer::new().format(*v)),
            Value::UInt32(Some(v)) => out.push_str(itoa::Buffer::new().format(*v)),
            Value::Int64(Some(v)) => out.push_str(itoa::Buffer::new().format(*v)),
            Value::Text(Some(v)) => self.write_string(out, v),
            Value::Blob(Some(v)) => {
                out.push_str("X'");
                out.push_str(&hex::encode_upper(v));
                out.push('\'');
            }
            Value::DateTime(Some(v)) => {
                let _ = write!(
                    out,
                    "'{:04}-{:02}-{:02} {:02}:{:02}:{:02}'",
                    v.year(),
                    v.month() as u8,
                    v.day(),
                    v.hour(),
                    v.minute(),
                    v.second()
                );
            }
            Value::Json(Some(v)) => self.write_string(out, &v.to_string()),
        }
    }

    fn write_string(&self, out: &mut String, value: &str) {
        out.push('\'');
        let mut position = 0;
        for (i, c) in value.char_indices() {
            if c == '\'' {
                out.push_str(&value[position..i]);
                out.push_str("''");
                position = i + 1;
            }
        }
        out.push_str(&value[position..]);
        out.push('\'');
    }

    /// Canonical DDL fragment for one attribute, flags in deterministic
    /// order so output is stable byte-for-byte.
    fn write_column_fragment(&self, out: &mut String, attribute: &AttributeMeta) -> Result<()> {
        self.write_identifier(out, &attribute.column_name);
        out.push(' ');
        out.push_str(&attribute.kind.render()?);
        if !attribute.allow_null {
            out.push_str(" NOT NULL");
        }
        if let Some(default) = &attribute.default_value {
            out.push_str(" DEFAULT ");
            self.write_value(out, default);
        }
        if attribute.unique {
            out.push_str(" UNIQUE");
        }
        if let Some(comment) = &attribute.comment {
            out.push_str(" COMMENT ");
            self.write_string(out, comment);
        }
        if attribute.primary_key {
            out.push_str(" PRIMARY KEY");
            if attribute.auto_increment {
                out.push_str(" AUTO_INCREMENT");
            }
        }
        Ok(())
    }

    /// Virtual attributes are excluded from generated DDL.
    fn write_create_table(&self, out: &mut String, schema: &EntitySchema) -> Result<()> {
        out.push_str("CREATE TABLE ");
        self.write_identifier(out, &schema.table);
        out.push_str(" (\n");
        let mut result = Ok(());
        separated_by(
            out,
            schema.attributes().iter().filter(|v| !v.is_virtual()),
            |out, v| {
                if result.is_ok() {
                    result = self.write_column_fragment(out, v);
                }
            },
            ",\n",
        );
        result?;
        out.push_str("\n);");
        Ok(())
    }

    fn write_drop_table(&self, out: &mut String, table: &str, if_exists: bool) {
        out.push_str("DROP TABLE ");
        if if_exists {
            out.push_str("IF EXISTS ");
        }
        self.write_identifier(out, table);
        out.push(';');
    }

    fn write_predicates(&self, out: &mut String, predicates: &[Predicate]) {
        if predicates.is_empty() {
            return;
        }
        out.push_str(" WHERE ");
        separated_by(
            out,
            predicates,
            |out, predicate| match predicate {
                Predicate::Eq(column, value) => {
                    self.write_identifier(out, column);
                    if value.is_none() {
                        out.push_str(" IS NULL");
                    } else {
                        out.push_str(" = ");
                        self.write_value(out, value);
                    }
                }
                Predicate::In(column, values) => {
                    self.write_identifier(out, column);
                    out.push_str(" IN (");
                    separated_by(out, values, |out, v| self.write_value(out, v), ", ");
                    out.push(')');
                }
            },
            " AND ",
        );
    }

    fn write_select<'a>(
        &self,
        out: &mut String,
        table: &str,
        columns: impl IntoIterator<Item = &'a str>,
        predicates: &[Predicate],
        limit: Option<u32>,
    ) {
        out.push_str("SELECT ");
        separated_by(out, columns, |out, v| self.write_identifier(out, v), ", ");
        out.push_str(" FROM ");
        self.write_identifier(out, table);
        self.write_predicates(out, predicates);
        if let Some(limit) = limit {
            let _ = write!(out, " LIMIT {limit}");
        }
        out.push(';');
    }

    fn write_insert<'a>(
        &self,
        out: &mut String,
        table: &str,
        row: impl IntoIterator<Item = (&'a str, &'a Value)> + Clone,
    ) {
        out.push_str("INSERT INTO ");
        self.write_identifier(out, table);
        out.push_str(" (");
        separated_by(
            out,
            row.clone(),
            |out, (column, _)| self.write_identifier(out, column),
            ", ",
        );
        out.push_str(") VALUES (");
        separated_by(out, row, |out, (_, value)| self.write_value(out, value), ", ");
        out.push_str(");");
    }

    fn write_update<'a>(
        &self,
        out: &mut String,
        table: &str,
        assignments: impl IntoIterator<Item = (&'a str, &'a Value)>,
        key: &Predicate,
    ) {
        out.push_str("UPDATE ");
        self.write_identifier(out, table);
        out.push_str(" SET ");
        separated_by(
            out,
            assignments,
            |out, (column, value)| {
                self.write_identifier(out, column);
                out.push_str(" = ");
                self.write_value(out, value);
            },
            ", ",
        );
        self.write_predicates(out, std::slice::from_ref(key));
        out.push(';');
    }

    fn write_delete(&self, out: &mut String, table: &str, predicates: &[Predicate]) {
        out.push_str("DELETE FROM ");
        self.write_identifier(out, table);
        self.write_predicates(out, predicates);
        out.push(';');
    }
}

pub struct GenericSqlWriter;

impl SqlWriter for GenericSqlWriter {}
