use crate::{
    EntityDef, EntitySchema, Executor, GenericSqlWriter, LoadPlan, MarrowError, ModelRegistry,
    Predicate, Result, RowLabeled, SqlWriter, Value, validate,
};
use anyhow::Context;
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

static NULL: Value = Value::Null;

/// An eager-loaded association, materialized onto the owning record.
#[derive(Debug, Clone)]
pub enum Loaded {
    One(Option<Record>),
    Many(Vec<Record>),
}

/// Runtime instance bound to one row: attribute values, the dirty-set of
/// names changed since load or last save, and any loaded associations.
/// All access goes through the schema, never raw field access.
#[derive(Debug, Clone)]
pub struct Record {
    def: Arc<EntityDef>,
    values: HashMap<String, Value>,
    dirty: HashSet<String>,
    associated: HashMap<String, Loaded>,
    persisted: bool,
}

impl Record {
    pub(crate) fn new(def: Arc<EntityDef>) -> Self {
        Self {
            def,
            values: HashMap::new(),
            dirty: HashSet::new(),
            associated: HashMap::new(),
            persisted: false,
        }
    }

    pub(crate) fn from_row(def: Arc<EntityDef>, row: &RowLabeled) -> Self {
        let mut values = HashMap::with_capacity(row.labels.len());
        for (label, value) in row.labels.iter().zip(row.values.iter()) {
            if let Some(attribute) = def.schema.attribute_by_column(label) {
                values.insert(attribute.name.clone(), value.clone());
            }
        }
        Self {
            def,
            values,
            dirty: HashSet::new(),
            associated: HashMap::new(),
            persisted: true,
        }
    }

    pub fn schema(&self) -> &EntitySchema {
        &self.def.schema
    }

    pub fn entity(&self) -> &str {
        &self.def.schema.entity
    }

    pub fn is_persisted(&self) -> bool {
        self.persisted
    }

    pub fn is_dirty(&self, name: &str) -> bool {
        self.dirty.contains(name)
    }

    /// True when the attribute holds no value, either never assigned or
    /// excluded from the projection that loaded this record.
    pub fn is_unset(&self, name: &str) -> bool {
        !self.values.contains_key(name)
    }

    /// Raw attribute read, bypassing any getter override.
    pub fn attribute(&self, name: &str) -> Result<&Value> {
        self.def
            .schema
            .attribute(name)
            .ok_or_else(|| {
                MarrowError::config(self.entity(), format!("unknown attribute {name}"))
            })?;
        Ok(self.values.get(name).unwrap_or(&NULL))
    }

    /// Raw attribute write, bypassing any setter override. The value is
    /// coerced to the attribute's declared kind; a virtual attribute with
    /// no setter is writable-never and is rejected here.
    pub fn set_attribute(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let attribute = self.def.schema.attribute(name).ok_or_else(|| {
            MarrowError::config(self.entity(), format!("unknown attribute {name}"))
        })?;
        if attribute.is_virtual() && attribute.setter.is_none() {
            return Err(MarrowError::coercion(
                name,
                "Virtual",
                "attribute is computed and not writable",
            ));
        }
        let coerced = attribute.kind.coerce(name, value.into())?;
        let is_virtual = attribute.is_virtual();
        self.values.insert(name.to_string(), coerced);
        if !is_virtual {
            self.dirty.insert(name.to_string());
        }
        Ok(())
    }

    /// Attribute read through the declared getter override, when present.
    pub fn get(&self, name: &str) -> Result<Value> {
        let attribute = self.def.schema.attribute(name).ok_or_else(|| {
            MarrowError::config(self.entity(), format!("unknown attribute {name}"))
        })?;
        match attribute.getter.clone() {
            Some(getter) => Ok(getter(self)),
            None => Ok(self.values.get(name).cloned().unwrap_or(Value::Null)),
        }
    }

    /// Attribute write through the declared setter override, when present.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let attribute = self.def.schema.attribute(name).ok_or_else(|| {
            MarrowError::config(self.entity(), format!("unknown attribute {name}"))
        })?;
        match attribute.setter.clone() {
            Some(setter) => setter(self, value.into()),
            None => self.set_attribute(name, value),
        }
    }

    /// Current value of the primary key attribute, `Null` when unset.
    pub fn primary_key_value(&self) -> Value {
        self.def
            .schema
            .primary_key()
            .and_then(|pk| self.values.get(&pk.name))
            .cloned()
            .unwrap_or(Value::Null)
    }

    /// Exports all attributes, computing virtual ones through their getter.
    pub fn to_object(&self) -> Result<HashMap<String, Value>> {
        let mut out = HashMap::with_capacity(self.def.schema.attributes().len());
        for attribute in self.def.schema.attributes() {
            out.insert(attribute.name.clone(), self.get(&attribute.name)?);
        }
        Ok(out)
    }

    pub fn association(&self, name: &str) -> Option<&Loaded> {
        self.associated.get(name)
    }

    /// Loaded `has_many` collection; `None` when never eager-loaded.
    pub fn many(&self, name: &str) -> Option<&[Record]> {
        match self.associated.get(name) {
            Some(Loaded::Many(records)) => Some(records),
            _ => None,
        }
    }

    /// Loaded single association; `None` when never eager-loaded or no
    /// match was found.
    pub fn one(&self, name: &str) -> Option<&Record> {
        match self.associated.get(name) {
            Some(Loaded::One(record)) => record.as_ref(),
            _ => None,
        }
    }

    pub(crate) fn many_mut(&mut self, name: &str) -> Option<&mut Vec<Record>> {
        match self.associated.get_mut(name) {
            Some(Loaded::Many(records)) => Some(records),
            _ => None,
        }
    }

    pub(crate) fn attach(&mut self, name: &str, loaded: Loaded) {
        self.associated.insert(name.to_string(), loaded);
    }

    /// Persists dirty attributes: validation first, then one INSERT or
    /// UPDATE. The dirty-set is cleared only after a confirmed write, so a
    /// failed statement leaves the in-memory state untouched.
    pub async fn save<E: Executor>(&mut self, executor: &mut E) -> Result<()> {
        if !self.persisted {
            self.materialize_defaults()?;
        }
        self.validate_pending()?;
        let writer = GenericSqlWriter;
        let schema = self.def.schema.clone();
        let mut sql = String::with_capacity(256);
        if self.persisted {
            let assignments: Vec<(&str, &Value)> = schema
                .attributes()
                .iter()
                .filter(|v| !v.is_virtual() && self.dirty.contains(&v.name))
                .filter_map(|v| Some((v.column_name.as_str(), self.values.get(&v.name)?)))
                .collect();
            if assignments.is_empty() {
                return Ok(());
            }
            let pk = schema.primary_key().ok_or_else(|| {
                MarrowError::config(self.entity(), "cannot update an entity without a primary key")
            })?;
            let key = self.primary_key_value();
            if key.is_none() {
                return Err(MarrowError::config(
                    self.entity(),
                    "cannot update a record with an unset primary key",
                ));
            }
            writer.write_update(
                &mut sql,
                &schema.table,
                assignments.iter().copied(),
                &Predicate::Eq(pk.column_name.clone(), key),
            );
            log::debug!("{sql}");
            executor.execute(sql).await?;
        } else {
            let row: Vec<(&str, &Value)> = schema
                .attributes()
                .iter()
                .filter(|v| !v.is_virtual() && self.dirty.contains(&v.name))
                .filter_map(|v| Some((v.column_name.as_str(), self.values.get(&v.name)?)))
                .collect();
            writer.write_insert(&mut sql, &schema.table, row.iter().copied());
            log::debug!("{sql}");
            let affected = executor.execute(sql).await?;
            if let Some(pk) = schema.primary_key()
                && pk.auto_increment
                && self.values.get(&pk.name).is_none_or(Value::is_none)
                && let Some(id) = affected.last_insert_id
            {
                let coerced = pk.kind.coerce(&pk.name, Value::Int64(Some(id)))?;
                self.values.insert(pk.name.clone(), coerced);
            }
            self.persisted = true;
        }
        self.dirty.clear();
        Ok(())
    }

    /// Replaces all non-virtual values from storage and clears the
    /// dirty-set, recovering any column a `select` filter left unset.
    pub async fn reload<E: Executor>(&mut self, executor: &mut E) -> Result<()> {
        let schema = &self.def.schema;
        let pk = schema.primary_key().ok_or_else(|| {
            MarrowError::config(self.entity(), "cannot reload an entity without a primary key")
        })?;
        let key = self.primary_key_value();
        if key.is_none() {
            return Err(MarrowError::config(
                self.entity(),
                "cannot reload a record with an unset primary key",
            ));
        }
        let mut sql = String::with_capacity(256);
        GenericSqlWriter.write_select(
            &mut sql,
            &schema.table,
            schema
                .attributes()
                .iter()
                .filter(|v| !v.is_virtual())
                .map(|v| v.column_name.as_str()),
            std::slice::from_ref(&Predicate::Eq(pk.column_name.clone(), key)),
            Some(1),
        );
        log::debug!("{sql}");
        let rows = executor.fetch(sql).await?;
        let row = rows
            .first()
            .with_context(|| format!("{} row is gone from storage", self.entity()))?;
        let reloaded = Record::from_row(self.def.clone(), row);
        self.values = reloaded.values;
        self.dirty.clear();
        Ok(())
    }

    /// New records pick up declared defaults before validation, so a
    /// non-null attribute with a default passes the implicit not-null rule.
    fn materialize_defaults(&mut self) -> Result<()> {
        let schema = self.def.schema.clone();
        for attribute in schema.attributes() {
            if attribute.is_virtual() || self.values.contains_key(&attribute.name) {
                continue;
            }
            if let Some(default) = &attribute.default_value {
                let coerced = attribute.kind.coerce(&attribute.name, default.clone())?;
                self.values.insert(attribute.name.clone(), coerced);
                self.dirty.insert(attribute.name.clone());
            }
        }
        Ok(())
    }

    /// New records validate every non-virtual attribute; persisted records
    /// validate only the dirty ones. No attribute is persisted if any of
    /// them fails.
    fn validate_pending(&self) -> Result<()> {
        for attribute in self.def.schema.attributes() {
            if attribute.is_virtual() {
                continue;
            }
            if self.persisted && !self.dirty.contains(&attribute.name) {
                continue;
            }
            let value = self.values.get(&attribute.name).unwrap_or(&NULL);
            validate(self.entity(), attribute, value)?;
        }
        Ok(())
    }
}

/// Query and persistence surface of one finalized entity.
pub struct Model<'r> {
    registry: &'r ModelRegistry,
    def: Arc<EntityDef>,
}

impl<'r> Model<'r> {
    pub(crate) fn new(registry: &'r ModelRegistry, def: Arc<EntityDef>) -> Self {
        Self { registry, def }
    }

    pub fn def(&self) -> &EntityDef {
        &self.def
    }

    pub fn new_record(&self) -> Record {
        Record::new(self.def.clone())
    }

    /// Builds a record from the given attribute values (through setter
    /// overrides) and saves it.
    pub async fn create<'a, E: Executor>(
        &self,
        executor: &mut E,
        values: impl IntoIterator<Item = (&'a str, Value)>,
    ) -> Result<Record> {
        let mut record = self.new_record();
        for (name, value) in values {
            record.set(name, value)?;
        }
        record.save(executor).await?;
        Ok(record)
    }

    /// Finalize-and-sync entry point: creates the entity's table from the
    /// merged schema, dropping any previous one when `force` is set.
    pub async fn sync<E: Executor>(&self, executor: &mut E, force: bool) -> Result<()> {
        let writer = GenericSqlWriter;
        if force {
            let mut sql = String::with_capacity(64);
            writer.write_drop_table(&mut sql, &self.def.schema.table, true);
            log::debug!("{sql}");
            executor.execute(sql).await?;
        }
        let mut sql = String::with_capacity(512);
        writer.write_create_table(&mut sql, &self.def.schema)?;
        log::debug!("{sql}");
        executor.execute(sql).await?;
        Ok(())
    }

    pub fn find(&self) -> Finder<'r> {
        Finder {
            registry: self.registry,
            def: self.def.clone(),
            predicates: Vec::new(),
            relations: Vec::new(),
            limit: None,
        }
    }

    pub async fn find_all<E: Executor>(&self, executor: &mut E) -> Result<Vec<Record>> {
        self.find().all(executor).await
    }

    pub async fn find_one<E: Executor>(&self, executor: &mut E) -> Result<Option<Record>> {
        self.find().one(executor).await
    }
}

/// Accumulates conditions and requested relations, then runs the fetch and
/// hands relation loading to the eager-load planner.
pub struct Finder<'r> {
    registry: &'r ModelRegistry,
    def: Arc<EntityDef>,
    predicates: Vec<(String, Value)>,
    relations: Vec<String>,
    limit: Option<u32>,
}

impl<'r> Finder<'r> {
    pub fn where_eq(mut self, property: impl Into<String>, value: impl Into<Value>) -> Self {
        self.predicates.push((property.into(), value.into()));
        self
    }

    /// Requests an association to be eager-loaded alongside the roots.
    pub fn with(mut self, relation: impl Into<String>) -> Self {
        self.relations.push(relation.into());
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub async fn all<E: Executor>(self, executor: &mut E) -> Result<Vec<Record>> {
        let schema = &self.def.schema;
        let mut predicates = Vec::with_capacity(self.predicates.len());
        for (property, value) in &self.predicates {
            let attribute = schema.attribute(property).ok_or_else(|| {
                MarrowError::config(&schema.entity, format!("unknown attribute {property}"))
            })?;
            predicates.push(Predicate::Eq(
                attribute.column_name.clone(),
                attribute.kind.coerce(property, value.clone())?,
            ));
        }
        let mut sql = String::with_capacity(256);
        GenericSqlWriter.write_select(
            &mut sql,
            &schema.table,
            schema
                .attributes()
                .iter()
                .filter(|v| !v.is_virtual())
                .map(|v| v.column_name.as_str()),
            &predicates,
            self.limit,
        );
        log::debug!("{sql}");
        let rows = executor.fetch(sql).await?;
        let mut records: Vec<Record> = rows
            .iter()
            .map(|row| Record::from_row(self.def.clone(), row))
            .collect();
        if !self.relations.is_empty() {
            let plan = LoadPlan::build(self.registry, &schema.entity, &self.relations)?;
            plan.execute(self.registry, &mut records, executor).await?;
        }
        Ok(records)
    }

    pub async fn one<E: Executor>(mut self, executor: &mut E) -> Result<Option<Record>> {
        self.limit = Some(1);
        Ok(self.all(executor).await?.into_iter().next())
    }
}
