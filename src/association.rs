use crate::{Value, pascal_case, singularize, snake_case};
use std::{fmt, sync::Arc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociationKind {
    /// Target holds the foreign key referencing the owner's primary key.
    HasMany,
    /// Like `HasMany`, asserting at most one match.
    HasOne,
    /// Owner holds the foreign key referencing the target's primary key.
    BelongsTo,
}

/// Per-column predicate deciding whether a target column is projected when
/// eager-loading through an association. Receives the property name.
pub type SelectFilter = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Raw declaration options, resolved by the registry's finalize pass.
#[derive(Default, Clone)]
pub struct AssociationOptions {
    pub(crate) target: Option<String>,
    pub(crate) foreign_key: Option<String>,
    pub(crate) through: Option<String>,
    pub(crate) scope: Vec<(String, Value)>,
    pub(crate) select: Option<SelectFilter>,
}

impl AssociationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Target entity by name; resolved lazily so entities may reference
    /// each other before all are declared.
    pub fn target(mut self, entity: impl Into<String>) -> Self {
        self.target = Some(entity.into());
        self
    }

    pub fn foreign_key(mut self, property: impl Into<String>) -> Self {
        self.foreign_key = Some(property.into());
        self
    }

    /// Traverse another association on the same entity to reach the target
    /// (many-to-many via a join entity).
    pub fn through(mut self, relation: impl Into<String>) -> Self {
        self.through = Some(relation.into());
        self
    }

    /// Static equality condition always applied when loading.
    pub fn scope(mut self, property: impl Into<String>, value: impl Into<Value>) -> Self {
        self.scope.push((property.into(), value.into()));
        self
    }

    pub fn select(mut self, filter: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        self.select = Some(Arc::new(filter));
        self
    }
}

/// A resolved association. Only produced by `ModelRegistry::finalize`, so
/// every target and through reference is known to exist.
#[derive(Clone)]
pub struct AssociationMeta {
    pub name: String,
    pub kind: AssociationKind,
    /// Resolved target entity name.
    pub target: String,
    /// Property holding the key: on the target for `HasMany`/`HasOne`, on
    /// the owner for `BelongsTo`. Unused for through associations.
    pub foreign_key: String,
    pub through: Option<ThroughMeta>,
    pub scope: Vec<(String, Value)>,
    pub select: Option<SelectFilter>,
}

/// Resolved two-hop traversal of a through association.
#[derive(Debug, Clone)]
pub struct ThroughMeta {
    /// Association on the owner supplying the intermediate row set.
    pub via: String,
    /// Association on the intermediate entity reaching the final target.
    pub final_via: String,
}

impl fmt::Debug for AssociationMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssociationMeta")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("target", &self.target)
            .field("foreign_key", &self.foreign_key)
            .field("through", &self.through)
            .finish_non_exhaustive()
    }
}

/// Conventional target entity name for a relation: `notes` becomes `Note`,
/// `tag_maps` becomes `TagMap`.
pub(crate) fn conventional_target(relation: &str) -> String {
    pascal_case(&singularize(relation))
}

/// Conventional foreign key property: for `has_many`/`has_one` it derives
/// from the owner entity, for `belongs_to` from the relation name.
pub(crate) fn conventional_foreign_key(kind: AssociationKind, owner: &str, relation: &str) -> String {
    match kind {
        AssociationKind::HasMany | AssociationKind::HasOne => format!("{}_id", snake_case(owner)),
        AssociationKind::BelongsTo => format!("{}_id", snake_case(relation)),
    }
}
