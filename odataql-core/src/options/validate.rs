//! Metadata validation of parsed options.
//!
//! Runs after parsing: every property reference must name a structural
//! property (or a `$compute` alias) of the addressed entity, and every expand
//! segment must be a navigation property. Nested expand options are checked
//! against the related entity they apply to.

use crate::ast::{ComputeItem, ExpandItem, Expression, OrderByItem, PropertyPath, SelectItem};
use crate::config::ParserConfig;
use crate::error::{QueryError, QueryResult};
use crate::metadata::{EntityMetadata, MetadataProvider};

use super::QueryOptions;

pub fn validate(
    options: &QueryOptions,
    entity: &EntityMetadata,
    metadata: &dyn MetadataProvider,
    config: &ParserConfig,
) -> QueryResult<()> {
    let scope = Scope {
        entity,
        compute: &options.compute,
    };
    scope.check_compute()?;
    if let Some(filter) = &options.filter {
        scope.check_expression(filter)?;
    }
    scope.check_orderby(&options.orderby)?;
    scope.check_select(&options.select)?;
    for item in &options.expand {
        check_expand(item, entity, metadata, config, 1)?;
    }
    Ok(())
}

/// Names visible to expressions of one entity
struct Scope<'a> {
    entity: &'a EntityMetadata,
    compute: &'a [ComputeItem],
}

impl Scope<'_> {
    fn is_alias(&self, name: &str) -> bool {
        self.compute.iter().any(|c| c.alias.eq_ignore_ascii_case(name))
    }

    fn check_path(&self, path: &PropertyPath, allow_alias: bool) -> QueryResult<()> {
        if !path.is_single() {
            return Err(QueryError::validation(format!(
                "property path '{}' is not supported on '{}'",
                path, self.entity.name
            )));
        }
        if allow_alias && self.is_alias(path.first()) {
            return Ok(());
        }
        self.entity.require_property(path.first()).map(|_| ())
    }

    fn check_expression(&self, expr: &Expression) -> QueryResult<()> {
        let mut result = Ok(());
        expr.for_each_property(&mut |path| {
            if result.is_ok() {
                result = self.check_path(path, true);
            }
        });
        result
    }

    fn check_compute(&self) -> QueryResult<()> {
        for item in self.compute {
            if self.entity.property(&item.alias).is_some()
                || self.entity.navigation(&item.alias).is_some()
            {
                return Err(QueryError::validation(format!(
                    "compute alias '{}' collides with a property of '{}'",
                    item.alias, self.entity.name
                )));
            }
            // aliases cannot reference each other
            let mut result = Ok(());
            item.expression.for_each_property(&mut |path| {
                if result.is_ok() {
                    result = self.check_path(path, false);
                }
            });
            result?;
        }
        Ok(())
    }

    fn check_orderby(&self, orderby: &[OrderByItem]) -> QueryResult<()> {
        orderby
            .iter()
            .try_for_each(|item| self.check_expression(&item.expression))
    }

    fn check_select(&self, select: &[SelectItem]) -> QueryResult<()> {
        for item in select {
            if let SelectItem::Property(path) = item {
                self.check_path(path, true)?;
            }
        }
        Ok(())
    }
}

fn check_expand(
    item: &ExpandItem,
    entity: &EntityMetadata,
    metadata: &dyn MetadataProvider,
    config: &ParserConfig,
    depth: usize,
) -> QueryResult<()> {
    let reached = depth + item.path.len() - 1;
    if reached > config.max_expand_depth {
        return Err(QueryError::validation(format!(
            "$expand depth {} exceeds the maximum of {}",
            reached, config.max_expand_depth
        )));
    }

    let mut current = entity;
    for segment in &item.path {
        let navigation = current.require_navigation(segment)?;
        current = metadata.require_entity(&navigation.target)?;
    }

    let scope = Scope {
        entity: current,
        compute: &item.compute,
    };
    scope.check_compute()?;
    if let Some(filter) = &item.filter {
        scope.check_expression(filter)?;
    }
    scope.check_orderby(&item.orderby)?;
    scope.check_select(&item.select)?;

    // $levels repeats this item on the related entity, so its last segment
    // must lead back to a type that declares the same navigation
    if item.levels.is_some() {
        if let Some(last) = item.path.last() {
            current.require_navigation(last)?;
        }
    }

    for nested in &item.expand {
        check_expand(nested, current, metadata, config, reached + 1)?;
    }
    Ok(())
}
