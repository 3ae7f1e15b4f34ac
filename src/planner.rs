use crate::{
    AssociationKind, AssociationMeta, EntityDef, Executor, GenericSqlWriter, Loaded, MarrowError,
    ModelRegistry, Predicate, Record, Result, SelectFilter, SqlWriter, Value,
};
use std::{collections::HashMap, sync::Arc};

/// Batch-fetch plan for a set of relations requested on one root query.
/// Built before any fetch runs, so every configuration mistake (undeclared
/// relation, unresolved through hop) surfaces here and not mid-load.
#[derive(Debug)]
pub struct LoadPlan {
    def: Arc<EntityDef>,
    steps: Vec<LoadStep>,
}

#[derive(Debug)]
struct LoadStep {
    association: AssociationMeta,
    target: Arc<EntityDef>,
    through: Option<ThroughStep>,
}

#[derive(Debug)]
struct ThroughStep {
    /// Association on the root supplying the intermediate row set.
    via: AssociationMeta,
    via_target: Arc<EntityDef>,
    /// Association on the intermediate entity reaching the final target.
    final_via: AssociationMeta,
}

impl LoadPlan {
    /// Validates and resolves the requested relation names against the
    /// entity's association graph.
    pub fn build(registry: &ModelRegistry, entity: &str, relations: &[String]) -> Result<Self> {
        let def = registry.entity(entity)?;
        let mut steps = Vec::with_capacity(relations.len());
        for relation in relations {
            let association = def
                .association(relation)
                .ok_or_else(|| {
                    MarrowError::config(entity, format!("undeclared relation {relation}"))
                })?
                .clone();
            let target = registry.entity(&association.target)?;
            let through = match &association.through {
                Some(through) => {
                    let via = def
                        .association(&through.via)
                        .ok_or_else(|| {
                            MarrowError::config(
                                entity,
                                format!("{relation} goes through undeclared relation {}", through.via),
                            )
                        })?
                        .clone();
                    let via_target = registry.entity(&via.target)?;
                    let final_via = via_target
                        .association(&through.final_via)
                        .ok_or_else(|| {
                            MarrowError::config(
                                &via.target,
                                format!("unresolved association {}", through.final_via),
                            )
                        })?
                        .clone();
                    Some(ThroughStep {
                        via,
                        via_target,
                        final_via,
                    })
                }
                None => None,
            };
            steps.push(LoadStep {
                association,
                target,
                through,
            });
        }
        Ok(Self { def, steps })
    }

    /// Resolves every planned association onto the fetched root records.
    /// Each association costs one batched fetch (two for a through chain),
    /// independent of the root row count.
    pub async fn execute<E: Executor>(
        &self,
        registry: &ModelRegistry,
        roots: &mut [Record],
        executor: &mut E,
    ) -> Result<()> {
        for step in &self.steps {
            match &step.through {
                None => self.load_direct(registry, step, roots, executor).await?,
                Some(through) => {
                    self.load_through(registry, step, through, roots, executor)
                        .await?
                }
            }
        }
        Ok(())
    }

    async fn load_direct<E: Executor>(
        &self,
        registry: &ModelRegistry,
        step: &LoadStep,
        roots: &mut [Record],
        executor: &mut E,
    ) -> Result<()> {
        let association = &step.association;
        let key_property = owner_key_property(&self.def, association)?;
        let keys = collect_keys(roots.iter(), &key_property)?;
        let groups = batched_fetch(
            &keys,
            association,
            &step.target,
            association.select.clone(),
            executor,
        )
        .await?;
        attach_groups(registry, association, &key_property, roots, &groups)
    }

    /// Two-hop load: materialize the intermediate association first, then
    /// batch-fetch the final target and attach it both onto the
    /// intermediate records and, flattened, onto the roots.
    async fn load_through<E: Executor>(
        &self,
        registry: &ModelRegistry,
        step: &LoadStep,
        through: &ThroughStep,
        roots: &mut [Record],
        executor: &mut E,
    ) -> Result<()> {
        let via = &through.via;
        let key_property = owner_key_property(&self.def, via)?;
        let keys = collect_keys(roots.iter(), &key_property)?;
        let via_groups =
            batched_fetch(&keys, via, &through.via_target, via.select.clone(), executor).await?;
        attach_groups(registry, via, &key_property, roots, &via_groups)?;

        let final_via = &through.final_via;
        let intermediates = || {
            roots
                .iter()
                .filter_map(|root| root.many(&via.name))
                .flatten()
        };
        let via_entity = &through.via_target.schema.entity;
        let final_key_property = match final_via.kind {
            AssociationKind::BelongsTo => final_via.foreign_key.clone(),
            AssociationKind::HasMany | AssociationKind::HasOne => {
                primary_key_property(via_entity, &through.via_target)?
            }
        };
        let final_keys = collect_keys(intermediates(), &final_key_property)?;
        // A select filter on the through relation governs the final hop's
        // projection; the intermediate hop already applied its own.
        let select = step
            .association
            .select
            .clone()
            .or_else(|| final_via.select.clone());
        let final_groups =
            batched_fetch(&final_keys, final_via, &step.target, select, executor).await?;

        let strict = registry.is_strict_has_one();
        for root in roots.iter_mut() {
            let mut flattened = Vec::new();
            if let Some(intermediates) = root.many_mut(&via.name) {
                for intermediate in intermediates.iter_mut() {
                    let loaded = group_for_owner(
                        final_via,
                        &final_key_property,
                        intermediate,
                        &final_groups,
                        strict,
                    )?;
                    match &loaded {
                        Loaded::One(Some(record)) => flattened.push(record.clone()),
                        Loaded::One(None) => {}
                        Loaded::Many(records) => flattened.extend(records.iter().cloned()),
                    }
                    intermediate.attach(&final_via.name, loaded);
                }
            }
            root.attach(&step.association.name, Loaded::Many(flattened));
        }
        Ok(())
    }
}

/// Property on the owner whose values feed the batched `IN` predicate:
/// the owner's own foreign key for `belongs_to`, the owner's primary key
/// for children fetches.
fn owner_key_property(def: &EntityDef, association: &AssociationMeta) -> Result<String> {
    match association.kind {
        AssociationKind::BelongsTo => Ok(association.foreign_key.clone()),
        AssociationKind::HasMany | AssociationKind::HasOne => {
            primary_key_property(&def.schema.entity, def)
        }
    }
}

fn primary_key_property(entity: &str, def: &EntityDef) -> Result<String> {
    def.schema
        .primary_key()
        .map(|pk| pk.name.clone())
        .ok_or_else(|| MarrowError::config(entity, "entity has no primary key"))
}

/// Distinct key values in first-seen order, skipping unset cells, so the
/// rendered `IN (…)` list is deterministic.
fn collect_keys<'a>(
    owners: impl Iterator<Item = &'a Record>,
    property: &str,
) -> Result<Vec<Value>> {
    let mut keys = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for owner in owners {
        let value = owner.attribute(property)?;
        if value.is_none() {
            continue;
        }
        if seen.insert(value.literal()) {
            keys.push(value.clone());
        }
    }
    Ok(keys)
}

/// The single batched fetch backing one association at one level: a
/// `WHERE key IN (…)` select with the association's scope applied, grouped
/// by the matching key's canonical literal.
async fn batched_fetch<E: Executor>(
    keys: &[Value],
    association: &AssociationMeta,
    target: &Arc<EntityDef>,
    select: Option<SelectFilter>,
    executor: &mut E,
) -> Result<HashMap<String, Vec<Record>>> {
    if keys.is_empty() {
        return Ok(HashMap::new());
    }
    let schema = &target.schema;
    let match_property = match association.kind {
        AssociationKind::HasMany | AssociationKind::HasOne => association.foreign_key.clone(),
        AssociationKind::BelongsTo => primary_key_property(&schema.entity, target)?,
    };
    let match_attribute = schema.attribute(&match_property).ok_or_else(|| {
        MarrowError::config(
            &schema.entity,
            format!("association {} expects attribute {match_property}", association.name),
        )
    })?;
    let structural = |name: &str| {
        name == match_property
            || schema.primary_key().is_some_and(|pk| pk.name == name)
    };
    // Columns excluded by the select filter are simply not requested;
    // key columns stay, reassembly is impossible without them.
    let columns: Vec<&str> = schema
        .attributes()
        .iter()
        .filter(|v| !v.is_virtual())
        .filter(|v| {
            structural(&v.name)
                || select.as_ref().is_none_or(|filter| filter(&v.name))
        })
        .map(|v| v.column_name.as_str())
        .collect();
    let mut predicates = vec![Predicate::In(
        match_attribute.column_name.clone(),
        keys.to_vec(),
    )];
    for (property, value) in &association.scope {
        let attribute = schema.attribute(property).ok_or_else(|| {
            MarrowError::config(
                &schema.entity,
                format!("scope references unknown attribute {property}"),
            )
        })?;
        predicates.push(Predicate::Eq(
            attribute.column_name.clone(),
            attribute.kind.coerce(property, value.clone())?,
        ));
    }
    let mut sql = String::with_capacity(256);
    GenericSqlWriter.write_select(&mut sql, &schema.table, columns, &predicates, None);
    log::debug!("{sql}");
    let rows = executor.fetch(sql).await?;
    let mut groups: HashMap<String, Vec<Record>> = HashMap::new();
    for row in &rows {
        let record = Record::from_row(target.clone(), row);
        let key = record.attribute(&match_property)?.literal();
        groups.entry(key).or_default().push(record);
    }
    Ok(groups)
}

/// Reassembles fetched groups onto the owners in their iteration order.
fn attach_groups(
    registry: &ModelRegistry,
    association: &AssociationMeta,
    key_property: &str,
    owners: &mut [Record],
    groups: &HashMap<String, Vec<Record>>,
) -> Result<()> {
    let strict = registry.is_strict_has_one();
    for owner in owners.iter_mut() {
        let loaded = group_for_owner(association, key_property, owner, groups, strict)?;
        owner.attach(&association.name, loaded);
    }
    Ok(())
}

fn group_for_owner(
    association: &AssociationMeta,
    key_property: &str,
    owner: &Record,
    groups: &HashMap<String, Vec<Record>>,
    strict_has_one: bool,
) -> Result<Loaded> {
    let key = owner.attribute(key_property)?;
    let matches = if key.is_none() {
        None
    } else {
        groups.get(&key.literal())
    };
    Ok(match association.kind {
        AssociationKind::HasMany => Loaded::Many(matches.cloned().unwrap_or_default()),
        AssociationKind::HasOne => {
            let matches = matches.map(Vec::as_slice).unwrap_or_default();
            if strict_has_one && matches.len() > 1 {
                return Err(MarrowError::config(
                    owner.entity(),
                    format!(
                        "has_one association {} matched {} rows",
                        association.name,
                        matches.len()
                    ),
                ));
            }
            Loaded::One(matches.first().cloned())
        }
        AssociationKind::BelongsTo => Loaded::One(matches.and_then(|v| v.first()).cloned()),
    })
}
