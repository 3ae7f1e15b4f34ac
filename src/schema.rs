use crate::{
    AssociationKind, AssociationMeta, AssociationOptions, AttributeMeta, AttributeOptions,
    MarrowError, Model, Result, ThroughMeta, conventional_foreign_key, conventional_target,
    pluralize, snake_case,
};
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

/// One entity declaration as collected from the front-end, before any
/// inheritance merge or association resolution.
#[derive(Clone)]
pub struct EntityDecl {
    pub(crate) name: String,
    pub(crate) table: Option<String>,
    pub(crate) parent: Option<String>,
    pub(crate) synced: bool,
    pub(crate) attributes: Vec<(String, AttributeOptions)>,
    pub(crate) associations: Vec<(String, AssociationKind, AssociationOptions)>,
}

impl EntityDecl {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: None,
            parent: None,
            synced: true,
            attributes: Vec::new(),
            associations: Vec::new(),
        }
    }

    pub fn table(mut self, name: impl Into<String>) -> Self {
        self.table = Some(name.into());
        self
    }

    pub fn extends(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// A non-syncing descendant declares no persisted identity of its own
    /// and inherits its nearest syncing ancestor's table.
    pub fn not_synced(mut self) -> Self {
        self.synced = false;
        self
    }

    /// Adds or overrides one attribute. Redeclaring an inherited name
    /// shadows its metadata in place without reordering.
    pub fn attribute(mut self, name: impl Into<String>, options: AttributeOptions) -> Self {
        self.attributes.push((name.into(), options));
        self
    }

    pub fn has_many(mut self, name: impl Into<String>, options: AssociationOptions) -> Self {
        self.associations
            .push((name.into(), AssociationKind::HasMany, options));
        self
    }

    pub fn has_one(mut self, name: impl Into<String>, options: AssociationOptions) -> Self {
        self.associations
            .push((name.into(), AssociationKind::HasOne, options));
        self
    }

    pub fn belongs_to(mut self, name: impl Into<String>, options: AssociationOptions) -> Self {
        self.associations
            .push((name.into(), AssociationKind::BelongsTo, options));
        self
    }
}

/// Finalized, inheritance-merged schema of one concrete entity.
#[derive(Debug, Clone)]
pub struct EntitySchema {
    pub entity: String,
    pub table: String,
    attributes: Vec<AttributeMeta>,
    index: HashMap<String, usize>,
    primary_key: Option<usize>,
}

impl EntitySchema {
    pub fn attributes(&self) -> &[AttributeMeta] {
        &self.attributes
    }

    pub fn attribute_names(&self) -> impl Iterator<Item = &str> {
        self.attributes.iter().map(|v| v.name.as_str())
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeMeta> {
        self.index.get(name).map(|i| &self.attributes[*i])
    }

    pub fn primary_key(&self) -> Option<&AttributeMeta> {
        self.primary_key.map(|i| &self.attributes[i])
    }

    /// Maps a storage column back to its attribute, for row decoding.
    pub fn attribute_by_column(&self, column: &str) -> Option<&AttributeMeta> {
        self.attributes
            .iter()
            .find(|v| !v.is_virtual() && v.column_name == column)
    }
}

/// Finalized entity: merged schema plus resolved associations.
#[derive(Debug)]
pub struct EntityDef {
    pub schema: EntitySchema,
    associations: Vec<AssociationMeta>,
}

impl EntityDef {
    pub fn associations(&self) -> &[AssociationMeta] {
        &self.associations
    }

    pub fn association(&self, name: &str) -> Option<&AssociationMeta> {
        self.associations.iter().find(|v| v.name == name)
    }
}

/// Registry of entity declarations. Populated once at declaration time,
/// finalized explicitly, then treated as read-only by queries and loads.
#[derive(Default)]
pub struct ModelRegistry {
    decls: Vec<EntityDecl>,
    finalized: HashMap<String, Arc<EntityDef>>,
    strict_has_one: bool,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Treats more than one `has_one` match as an error instead of silently
    /// taking the first.
    pub fn strict_has_one(&mut self, strict: bool) -> &mut Self {
        self.strict_has_one = strict;
        self
    }

    pub fn is_strict_has_one(&self) -> bool {
        self.strict_has_one
    }

    /// Registers (or re-registers) an entity declaration. Late declarations
    /// are reflected by the next `finalize`.
    pub fn declare(&mut self, decl: EntityDecl) -> &mut Self {
        if let Some(existing) = self.decls.iter_mut().find(|v| v.name == decl.name) {
            *existing = decl;
        } else {
            self.decls.push(decl);
        }
        self
    }

    fn decl(&self, name: &str) -> Result<&EntityDecl> {
        self.decls
            .iter()
            .find(|v| v.name == name)
            .ok_or_else(|| MarrowError::config(name, "entity is not declared"))
    }

    /// Declaration chain from the root ancestor down to `name`, failing on
    /// unknown parents and inheritance cycles.
    fn chain(&self, name: &str) -> Result<Vec<&EntityDecl>> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut current = Some(name.to_string());
        while let Some(entity) = current {
            if !seen.insert(entity.clone()) {
                return Err(MarrowError::config(
                    name,
                    format!("inheritance cycle through {entity}"),
                ));
            }
            let decl = self.decl(&entity).map_err(|_| {
                if entity == name {
                    MarrowError::config(name, "entity is not declared")
                } else {
                    MarrowError::config(name, format!("unknown parent entity {entity}"))
                }
            })?;
            chain.push(decl);
            current = decl.parent.clone();
        }
        chain.reverse();
        Ok(chain)
    }

    /// Merges the inheritance chain into one schema: ancestor attributes
    /// first, own declarations appended, a redeclared name shadowing in
    /// place.
    fn merge_schema(&self, name: &str) -> Result<EntitySchema> {
        let chain = self.chain(name)?;
        let mut attributes: Vec<AttributeMeta> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        for decl in &chain {
            for (attr_name, options) in &decl.attributes {
                let meta = options.clone().into_meta(attr_name);
                match index.get(attr_name) {
                    Some(i) => attributes[*i] = meta,
                    None => {
                        index.insert(attr_name.clone(), attributes.len());
                        attributes.push(meta);
                    }
                }
            }
        }
        let mut primary_key = None;
        for (i, attribute) in attributes.iter().enumerate() {
            if attribute.primary_key {
                if primary_key.is_some() {
                    return Err(MarrowError::config(
                        name,
                        format!("duplicate primary key attribute {}", attribute.name),
                    ));
                }
                primary_key = Some(i);
            }
        }
        // Convention carried from the original model layer: an `id`
        // attribute is the primary key when none is declared explicitly.
        if primary_key.is_none()
            && let Some(i) = index.get("id").copied()
        {
            attributes[i].primary_key = true;
            attributes[i].auto_increment = true;
            primary_key = Some(i);
        }
        for attribute in &attributes {
            if attributes
                .iter()
                .filter(|v| !v.is_virtual() && v.column_name == attribute.column_name)
                .count()
                > 1
            {
                return Err(MarrowError::config(
                    name,
                    format!("duplicate column name {}", attribute.column_name),
                ));
            }
        }
        Ok(EntitySchema {
            entity: name.to_string(),
            table: self.table_of(&chain)?,
            attributes,
            index,
            primary_key,
        })
    }

    /// Table name of the lowest entity in the chain that declares its own
    /// persisted identity.
    fn table_of(&self, chain: &[&EntityDecl]) -> Result<String> {
        for decl in chain.iter().rev() {
            if let Some(table) = &decl.table {
                return Ok(table.clone());
            }
            if decl.synced {
                return Ok(pluralize(&snake_case(&decl.name)));
            }
        }
        let lowest = chain.last().expect("chain is never empty");
        Err(MarrowError::config(
            &lowest.name,
            "no entity in the inheritance chain declares a table",
        ))
    }

    fn resolve_associations(&self, decl: &EntityDecl) -> Result<Vec<AssociationMeta>> {
        let mut resolved = Vec::with_capacity(decl.associations.len());
        for (name, kind, options) in &decl.associations {
            let target = options
                .target
                .clone()
                .unwrap_or_else(|| conventional_target(name));
            self.decl(&target).map_err(|_| {
                MarrowError::config(
                    &decl.name,
                    format!("association {name} references unresolved entity {target}"),
                )
            })?;
            let foreign_key = options
                .foreign_key
                .clone()
                .unwrap_or_else(|| conventional_foreign_key(*kind, &decl.name, name));
            let through = match &options.through {
                Some(via) => Some(self.resolve_through(decl, name, via, &target)?),
                None => None,
            };
            resolved.push(AssociationMeta {
                name: name.clone(),
                kind: *kind,
                target,
                foreign_key,
                through,
                scope: options.scope.clone(),
                select: options.select.clone(),
            });
        }
        Ok(resolved)
    }

    /// A through association traverses another association on the same
    /// entity, then an association on the intermediate entity that reaches
    /// the final target. Both hops must resolve now, not at load time.
    fn resolve_through(
        &self,
        decl: &EntityDecl,
        name: &str,
        via: &str,
        target: &str,
    ) -> Result<ThroughMeta> {
        let (_, via_kind, via_options) = decl
            .associations
            .iter()
            .find(|(n, ..)| n == via)
            .ok_or_else(|| {
                MarrowError::config(
                    &decl.name,
                    format!("association {name} goes through undeclared relation {via}"),
                )
            })?;
        // The intermediate hop supplies a row set to traverse, so only a
        // has_many qualifies.
        if *via_kind != AssociationKind::HasMany {
            return Err(MarrowError::config(
                &decl.name,
                format!("association {name} goes through {via}, which is not has_many"),
            ));
        }
        let intermediate = via_options
            .target
            .clone()
            .unwrap_or_else(|| conventional_target(via));
        let intermediate_decl = self.decl(&intermediate).map_err(|_| {
            MarrowError::config(
                &decl.name,
                format!("association {name} goes through unresolved entity {intermediate}"),
            )
        })?;
        let final_via = intermediate_decl
            .associations
            .iter()
            .find(|(n, _, opts)| match &opts.target {
                Some(t) => t == target,
                None => conventional_target(n) == target,
            })
            .map(|(n, ..)| n.clone())
            .ok_or_else(|| {
                MarrowError::config(
                    &decl.name,
                    format!("{intermediate} declares no association targeting {target}"),
                )
            })?;
        Ok(ThroughMeta {
            via: via.to_string(),
            final_via,
        })
    }

    /// Merges every declared entity's schema and resolves every
    /// association. Idempotent; re-finalizing after new registrations
    /// reflects the latest state.
    pub fn finalize(&mut self) -> Result<()> {
        let mut finalized = HashMap::with_capacity(self.decls.len());
        for decl in &self.decls {
            let schema = self.merge_schema(&decl.name)?;
            let associations = self.resolve_associations(decl)?;
            finalized.insert(
                decl.name.clone(),
                Arc::new(EntityDef {
                    schema,
                    associations,
                }),
            );
        }
        self.finalized = finalized;
        Ok(())
    }

    /// Finalized definition of one entity; an error before `finalize` ran
    /// or for names that were never declared.
    pub fn entity(&self, name: &str) -> Result<Arc<EntityDef>> {
        self.finalized.get(name).cloned().ok_or_else(|| {
            MarrowError::config(
                name,
                if self.finalized.is_empty() {
                    "registry is not finalized"
                } else {
                    "entity is not declared"
                },
            )
        })
    }

    pub fn model(&self, name: &str) -> Result<Model<'_>> {
        Ok(Model::new(self, self.entity(name)?))
    }
}
