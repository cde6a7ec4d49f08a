//! Navigation expansion.
//!
//! Simple to-one navigations are LEFT JOINed into the query that loads their
//! parents. Everything else is batched: one extra query per navigation over
//! the deduplicated parent keys, then the rows are filtered in memory with
//! the nested `$filter`, expanded recursively and grouped back onto their
//! parents.

use std::collections::{HashMap, HashSet};

use odataql_core::{
    EntityMetadata, Evaluator, ExpandItem, Levels, MetadataProvider, NavigationProperty, Record,
};
use serde_json::Value;

use crate::config::ExpandStrategy;
use crate::connection::SqlConnection;
use crate::context::RequestContext;
use crate::error::{DbError, DbResult};
use crate::executor::rows::{self, Projection};
use crate::sql::{JoinedNavigation, ParentLink, SelectSpec, SqlValue, PARENT_KEY_COLUMN};

/// Expansions of one level, split by how they are resolved
#[derive(Debug, Default)]
pub(crate) struct ExpandPlan<'m> {
    pub joins: Vec<(ExpandItem, JoinedNavigation<'m>)>,
    pub batched: Vec<(ExpandItem, &'m NavigationProperty, &'m EntityMetadata)>,
}

impl<'m> ExpandPlan<'m> {
    /// Local properties the parent query must read for every expansion
    pub fn required(&self) -> Vec<&'m str> {
        self.joins
            .iter()
            .map(|(_, join)| join.navigation.local_property.as_str())
            .chain(
                self.batched
                    .iter()
                    .map(|(_, nav, _)| nav.local_property.as_str()),
            )
            .collect()
    }

    /// Navigation names that end up in the records
    pub fn names(&self) -> Vec<String> {
        self.joins
            .iter()
            .map(|(_, join)| join.navigation.name.clone())
            .chain(self.batched.iter().map(|(_, nav, _)| nav.name.clone()))
            .collect()
    }

    pub fn join_specs(&self) -> Vec<JoinedNavigation<'m>> {
        self.joins.iter().map(|(_, join)| join.clone()).collect()
    }
}

/// Decides join vs batching for each item; needs no connection
#[derive(Clone, Copy)]
pub(crate) struct ExpandPlanner<'a> {
    metadata: &'a dyn MetadataProvider,
    strategy: ExpandStrategy,
    max_depth: usize,
}

impl<'a> ExpandPlanner<'a> {
    pub fn new(metadata: &'a dyn MetadataProvider, strategy: ExpandStrategy, max_depth: usize) -> Self {
        Self {
            metadata,
            strategy,
            max_depth,
        }
    }

    /// Resolve `items` against `entity`; `depth` is the level they sit at
    pub(crate) fn plan<'m>(
        &self,
        entity: &'m EntityMetadata,
        items: &[ExpandItem],
        depth: usize,
    ) -> DbResult<ExpandPlan<'m>>
    where
        'a: 'm,
    {
        let mut plan = ExpandPlan::default();
        if items.is_empty() {
            return Ok(plan);
        }
        if depth > self.max_depth {
            return Err(DbError::validation(format!(
                "$expand nesting exceeds the maximum depth of {}",
                self.max_depth
            )));
        }

        for item in normalize(items) {
            let item = self.unroll(item, depth)?;
            let nav = entity.require_navigation(head(&item)?)?;
            let target = self.metadata.require_entity(&nav.target)?;

            let joinable = self.strategy != ExpandStrategy::Batch
                && item.is_simple()
                && !nav.is_collection()
                && nav.join_table.is_none();
            if joinable {
                let properties = Projection::new(&item.select).columns(target, &[]);
                plan.joins.push((
                    item,
                    JoinedNavigation {
                        navigation: nav,
                        target,
                        properties,
                    },
                ));
            } else {
                plan.batched.push((item, nav, target));
            }
        }
        Ok(plan)
    }

    /// Rewrite `$levels` as explicit nesting of the same item
    fn unroll(&self, item: ExpandItem, depth: usize) -> DbResult<ExpandItem> {
        let Some(levels) = item.levels else {
            return Ok(item);
        };
        let remaining = (self.max_depth + 1).saturating_sub(depth);
        let count = match levels {
            Levels::Max => remaining,
            Levels::Count(n) if n <= remaining => n,
            Levels::Count(n) => {
                return Err(DbError::validation(format!(
                    "$levels={} exceeds the maximum expand depth of {}",
                    n, self.max_depth
                )))
            }
        };

        let mut base = item;
        base.levels = None;
        let mut current = base.clone();
        for _ in 1..count {
            let mut level = base.clone();
            level.expand.push(current);
            current = level;
        }
        Ok(current)
    }
}

pub struct ExpansionEngine<'a> {
    conn: &'a dyn SqlConnection,
    planner: ExpandPlanner<'a>,
}

impl<'a> ExpansionEngine<'a> {
    pub fn new(
        conn: &'a dyn SqlConnection,
        metadata: &'a dyn MetadataProvider,
        strategy: ExpandStrategy,
        max_depth: usize,
    ) -> Self {
        Self {
            conn,
            planner: ExpandPlanner::new(metadata, strategy, max_depth),
        }
    }

    pub(crate) fn plan<'m>(
        &self,
        entity: &'m EntityMetadata,
        items: &[ExpandItem],
        depth: usize,
    ) -> DbResult<ExpandPlan<'m>>
    where
        'a: 'm,
    {
        self.planner.plan(entity, items, depth)
    }

    /// Project joined navigations and attach every batched one
    pub(crate) fn complete(
        &self,
        entity: &EntityMetadata,
        records: &mut [Record],
        plan: &ExpandPlan<'_>,
        depth: usize,
        ctx: &RequestContext,
    ) -> DbResult<()> {
        for (item, join) in &plan.joins {
            let projection = Projection::new(&item.select);
            for record in records.iter_mut() {
                if let Some(Value::Object(nested)) = record.get_mut(&join.navigation.name) {
                    projection.apply(nested, &[]);
                }
            }
        }

        for (item, nav, target) in &plan.batched {
            self.batch(entity, nav, target, item, records, depth, ctx)?;
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn batch(
        &self,
        entity: &EntityMetadata,
        nav: &NavigationProperty,
        target: &EntityMetadata,
        item: &ExpandItem,
        parents: &mut [Record],
        depth: usize,
        ctx: &RequestContext,
    ) -> DbResult<()> {
        let local = entity.require_property(&nav.local_property)?;
        let empty = || {
            if nav.is_collection() {
                Value::Array(Vec::new())
            } else {
                Value::Null
            }
        };

        let mut seen = HashSet::new();
        let mut keys = Vec::new();
        for parent in parents.iter() {
            if let Some(value) = parent.get(&local.name) {
                if let Some(key) = group_key(value) {
                    if seen.insert(key) {
                        keys.push(SqlValue::from_record(value));
                    }
                }
            }
        }
        if keys.is_empty() {
            for parent in parents.iter_mut() {
                parent.insert(nav.name.clone(), empty());
            }
            return Ok(());
        }

        let nested = self.plan(target, &item.expand, depth + 1)?;
        let projection = Projection::new(&item.select);
        let mut required = nested.required();
        required.push(&nav.referenced_property);
        if let Some(filter) = &item.filter {
            filter.for_each_property(&mut |path| required.push(path.first()));
        }

        let mut spec = SelectSpec::new(target);
        spec.properties = projection.columns(target, &required);
        spec.compute = &item.compute;
        spec.search = item.search.as_ref();
        spec.orderby = &item.orderby;
        spec.parent = Some(ParentLink {
            navigation: nav,
            keys,
        });
        spec.joins = nested.join_specs();

        let evaluator = Evaluator::with_compute(&item.compute);
        let mut related = Vec::new();
        for record in rows::fetch(self.conn, &spec, ctx)? {
            let keep = match &item.filter {
                Some(filter) => evaluator.matches(filter, &record)?,
                None => true,
            };
            if keep {
                related.push(record);
            }
        }
        tracing::debug!(
            "Expanded {} -> {}: {} related rows for {} parents",
            entity.name,
            nav.name,
            related.len(),
            seen.len()
        );

        self.complete(target, &mut related, &nested, depth + 1, ctx)?;

        let group_field = match &nav.join_table {
            Some(_) => PARENT_KEY_COLUMN,
            None => target
                .property(&nav.referenced_property)
                .map(|p| p.name.as_str())
                .unwrap_or(nav.referenced_property.as_str()),
        };
        let names = nested.names();
        let mut groups: HashMap<String, Vec<Record>> = HashMap::new();
        for mut record in related {
            let key = record.get(group_field).and_then(group_key);
            projection.apply(&mut record, &names);
            if let Some(key) = key {
                groups.entry(key).or_default().push(record);
            }
        }

        let skip = item.skip.unwrap_or(0) as usize;
        let top = item.top.map_or(usize::MAX, |t| t as usize);
        for parent in parents.iter_mut() {
            let children: Vec<Record> = parent
                .get(&local.name)
                .and_then(group_key)
                .and_then(|key| groups.get(&key))
                .map(|group| group.iter().skip(skip).take(top).cloned().collect())
                .unwrap_or_default();
            let value = if nav.is_collection() {
                Value::Array(children.into_iter().map(Value::Object).collect())
            } else {
                children.into_iter().next().map(Value::Object).unwrap_or(Value::Null)
            };
            parent.insert(nav.name.clone(), value);
        }
        Ok(())
    }
}

fn head(item: &ExpandItem) -> DbResult<&str> {
    item.path
        .first()
        .map(String::as_str)
        .ok_or_else(|| DbError::validation("empty $expand path"))
}

/// One item per navigation; `A/B` becomes `A` expanding `B`
pub(crate) fn normalize(items: &[ExpandItem]) -> Vec<ExpandItem> {
    let mut out: Vec<ExpandItem> = Vec::new();
    for item in items {
        let item = nest_path(item.clone());
        let Some(name) = item.path.first() else {
            out.push(item);
            continue;
        };
        match out
            .iter_mut()
            .find(|o| o.path.first().is_some_and(|n| n.eq_ignore_ascii_case(name)))
        {
            Some(existing) => merge(existing, item),
            None => out.push(item),
        }
    }
    out
}

fn nest_path(mut item: ExpandItem) -> ExpandItem {
    if item.path.len() <= 1 {
        return item;
    }
    let first = item.path.remove(0);
    let mut wrapper = ExpandItem::new(vec![first]);
    wrapper.expand.push(item);
    wrapper
}

/// Options come from the item that has any; nested expansions are combined
fn merge(existing: &mut ExpandItem, mut item: ExpandItem) {
    if is_bare(existing) && !is_bare(&item) {
        std::mem::swap(existing, &mut item);
    }
    existing.expand.append(&mut item.expand);
}

fn is_bare(item: &ExpandItem) -> bool {
    item.filter.is_none()
        && item.orderby.is_empty()
        && item.select.is_empty()
        && item.skip.is_none()
        && item.top.is_none()
        && item.search.is_none()
        && item.compute.is_empty()
        && item.levels.is_none()
}

/// Comparable form of a key value; `None` for null
fn group_key(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => i.to_string(),
            (None, Some(f)) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                (f as i64).to_string()
            }
            _ => n.to_string(),
        }),
        other => Some(other.to_string()),
    }
}
