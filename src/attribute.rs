use crate::{DataKind, GenericSqlWriter, Record, Result, SqlWriter, Validator, Value, snake_case};
use std::{fmt, sync::Arc};

/// Transform-on-read override: computes the visible value from the record,
/// typically from the raw stored cell or from sibling attributes.
pub type Getter = Arc<dyn Fn(&Record) -> Value + Send + Sync>;

/// Transform-on-write override: receives the record and the incoming value
/// and is responsible for storing it through `Record::set_attribute`.
pub type Setter = Arc<dyn Fn(&mut Record, Value) -> Result<()> + Send + Sync>;

/// Metadata of one declared entity property.
#[derive(Clone)]
pub struct AttributeMeta {
    /// Property identifier, unique within the merged schema.
    pub name: String,
    /// Storage column, derived by convention unless overridden.
    pub column_name: String,
    pub kind: DataKind,
    pub allow_null: bool,
    pub default_value: Option<Value>,
    pub primary_key: bool,
    pub auto_increment: bool,
    pub unique: bool,
    pub comment: Option<String>,
    pub getter: Option<Getter>,
    pub setter: Option<Setter>,
    pub validators: Vec<Validator>,
}

impl fmt::Debug for AttributeMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeMeta")
            .field("name", &self.name)
            .field("column_name", &self.column_name)
            .field("kind", &self.kind)
            .field("allow_null", &self.allow_null)
            .field("primary_key", &self.primary_key)
            .finish_non_exhaustive()
    }
}

impl AttributeMeta {
    pub fn is_virtual(&self) -> bool {
        self.kind == DataKind::Virtual
    }

    /// Canonical DDL fragment, stable byte-for-byte for identical metadata.
    /// Flag order: type, nullability, default, uniqueness, comment,
    /// primary key.
    pub fn to_sql_string(&self) -> Result<String> {
        let writer = GenericSqlWriter;
        let mut out = String::with_capacity(64);
        writer.write_column_fragment(&mut out, self)?;
        Ok(out)
    }
}

/// Options collected by the declaration front-end for one attribute, turned
/// into [`AttributeMeta`] when the registry finalizes the entity.
#[derive(Default, Clone)]
pub struct AttributeOptions {
    pub(crate) kind: Option<DataKind>,
    pub(crate) column_name: Option<String>,
    pub(crate) allow_null: Option<bool>,
    pub(crate) default_value: Option<Value>,
    pub(crate) primary_key: bool,
    pub(crate) auto_increment: Option<bool>,
    pub(crate) unique: bool,
    pub(crate) comment: Option<String>,
    pub(crate) getter: Option<Getter>,
    pub(crate) setter: Option<Setter>,
    pub(crate) validators: Vec<Validator>,
}

impl fmt::Debug for AttributeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeOptions")
            .field("kind", &self.kind)
            .field("column_name", &self.column_name)
            .field("allow_null", &self.allow_null)
            .field("primary_key", &self.primary_key)
            .finish_non_exhaustive()
    }
}

impl AttributeOptions {
    pub fn new(kind: DataKind) -> Self {
        Self {
            kind: Some(kind),
            ..Default::default()
        }
    }

    /// Kind given as a type name; unknown names fail at registration.
    pub fn parse(name: &str) -> Result<Self> {
        Ok(Self::new(DataKind::parse(name)?))
    }

    pub fn column_name(mut self, name: impl Into<String>) -> Self {
        self.column_name = Some(name.into());
        self
    }

    pub fn allow_null(mut self, allow: bool) -> Self {
        self.allow_null = Some(allow);
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn auto_increment(mut self, auto: bool) -> Self {
        self.auto_increment = Some(auto);
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn getter(mut self, getter: impl Fn(&Record) -> Value + Send + Sync + 'static) -> Self {
        self.getter = Some(Arc::new(getter));
        self
    }

    pub fn setter(
        mut self,
        setter: impl Fn(&mut Record, Value) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.setter = Some(Arc::new(setter));
        self
    }

    pub fn validate(mut self, validator: Validator) -> Self {
        self.validators.push(validator);
        self
    }

    /// Resolves conventions into concrete metadata. A primary key is
    /// auto-increment unless explicitly stated otherwise.
    pub(crate) fn into_meta(self, name: &str) -> AttributeMeta {
        let primary_key = self.primary_key;
        AttributeMeta {
            name: name.to_string(),
            column_name: self.column_name.unwrap_or_else(|| snake_case(name)),
            kind: self.kind.unwrap_or_else(DataKind::varchar),
            allow_null: self.allow_null.unwrap_or(true),
            default_value: self.default_value,
            primary_key,
            auto_increment: self.auto_increment.unwrap_or(primary_key),
            unique: self.unique,
            comment: self.comment,
            getter: self.getter,
            setter: self.setter,
            validators: self.validators,
        }
    }
}
