//! SELECT compilation.
//!
//! A [`SelectSpec`] describes one statement: the entity, its projection, the
//! query option pieces that apply, key restrictions and joins. The compiler
//! renders it through a [`Dialect`], binding every literal as a parameter.
//! The base table is always aliased `t0`, joined navigations `t1..tn`, a
//! many-to-many link table `j`.

use odataql_core::{
    BinaryOperator, ComputeItem, EdmType, EntityMetadata, Expression, Function, LiteralValue,
    NavigationProperty, OrderByItem, PropertyMetadata, SearchExpr, SortDirection, UnaryOperator,
};

use super::dialect::{DatePart, Dialect};
use super::value::SqlValue;
use crate::error::{DbError, DbResult};

pub const BASE_ALIAS: &str = "t0";
const LINK_ALIAS: &str = "j";

/// Result column carrying the parent key of a many-to-many row
pub const PARENT_KEY_COLUMN: &str = "@parent";

/// SQL text plus positional parameters
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

/// Where a result column ends up in the record
#[derive(Debug, Clone, PartialEq)]
pub struct OutputColumn {
    pub name: String,
    /// Navigation a joined column belongs to
    pub join: Option<String>,
    pub edm_type: Option<EdmType>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub sql: String,
    pub params: Vec<SqlValue>,
    pub columns: Vec<OutputColumn>,
}

/// A to-one navigation resolved with a LEFT JOIN
#[derive(Debug, Clone)]
pub struct JoinedNavigation<'a> {
    pub navigation: &'a NavigationProperty,
    pub target: &'a EntityMetadata,
    pub properties: Vec<&'a PropertyMetadata>,
}

/// Restricts the related side of `navigation` to the given parent key values
#[derive(Debug, Clone)]
pub struct ParentLink<'a> {
    pub navigation: &'a NavigationProperty,
    pub keys: Vec<SqlValue>,
}

#[derive(Debug, Clone)]
pub struct SelectSpec<'a> {
    pub entity: &'a EntityMetadata,
    pub properties: Vec<&'a PropertyMetadata>,
    pub compute: &'a [ComputeItem],
    pub filter: Option<&'a Expression>,
    pub search: Option<&'a SearchExpr>,
    pub orderby: &'a [OrderByItem],
    pub skip: Option<u64>,
    pub top: Option<u64>,
    pub key: Vec<(&'a PropertyMetadata, SqlValue)>,
    pub parent: Option<ParentLink<'a>>,
    pub joins: Vec<JoinedNavigation<'a>>,
}

impl<'a> SelectSpec<'a> {
    /// Every structural property, nothing else
    pub fn new(entity: &'a EntityMetadata) -> Self {
        Self {
            entity,
            properties: entity.properties.iter().collect(),
            compute: &[],
            filter: None,
            search: None,
            orderby: &[],
            skip: None,
            top: None,
            key: Vec::new(),
            parent: None,
            joins: Vec::new(),
        }
    }
}

/// Names an expression may reference
#[derive(Clone, Copy)]
struct Scope<'a> {
    entity: &'a EntityMetadata,
    compute: &'a [ComputeItem],
}

/// Renders statements for one dialect; one instance per statement
pub struct SqlCompiler {
    dialect: &'static dyn Dialect,
    params: Vec<SqlValue>,
}

impl SqlCompiler {
    pub fn new(dialect: &'static dyn Dialect) -> Self {
        Self {
            dialect,
            params: Vec::new(),
        }
    }

    pub fn bind(&mut self, value: SqlValue) -> String {
        self.params.push(value);
        self.dialect.placeholder(self.params.len())
    }

    pub fn quote(&self, name: &str) -> String {
        self.dialect.quote_identifier(name)
    }

    pub(crate) fn finish(self, sql: String) -> Statement {
        Statement {
            sql,
            params: self.params,
        }
    }

    fn column(&self, alias: &str, column: &str) -> String {
        format!("{}.{}", alias, self.quote(column))
    }

    pub fn select(mut self, spec: &SelectSpec<'_>) -> DbResult<CompiledQuery> {
        let scope = Scope {
            entity: spec.entity,
            compute: spec.compute,
        };
        let mut select_list = Vec::new();
        let mut columns = Vec::new();

        for property in &spec.properties {
            select_list.push(format!(
                "{} AS {}",
                self.column(BASE_ALIAS, &property.column),
                self.quote(&property.name)
            ));
            columns.push(OutputColumn {
                name: property.name.clone(),
                join: None,
                edm_type: Some(property.edm_type),
            });
        }

        for item in spec.compute {
            // aliases never reference other aliases
            let sql = self.expression(&item.expression, Scope { compute: &[], ..scope })?;
            select_list.push(format!("{} AS {}", sql, self.quote(&item.alias)));
            columns.push(OutputColumn {
                name: item.alias.clone(),
                join: None,
                edm_type: None,
            });
        }

        if let Some(link) = &spec.parent {
            if let Some(join_table) = &link.navigation.join_table {
                select_list.push(format!(
                    "{} AS {}",
                    self.column(LINK_ALIAS, &join_table.local_column),
                    self.quote(PARENT_KEY_COLUMN)
                ));
                columns.push(OutputColumn {
                    name: PARENT_KEY_COLUMN.to_string(),
                    join: None,
                    edm_type: None,
                });
            }
        }

        for (i, join) in spec.joins.iter().enumerate() {
            let alias = format!("t{}", i + 1);
            for property in &join.properties {
                select_list.push(format!(
                    "{} AS {}",
                    self.column(&alias, &property.column),
                    self.quote(&format!("{}.{}", join.navigation.name, property.name))
                ));
                columns.push(OutputColumn {
                    name: property.name.clone(),
                    join: Some(join.navigation.name.clone()),
                    edm_type: Some(property.edm_type),
                });
            }
        }

        if select_list.is_empty() {
            return Err(DbError::validation(format!(
                "nothing to select from '{}'",
                spec.entity.name
            )));
        }

        let mut sql = format!("SELECT {}", select_list.join(", "));
        self.from_clause(spec, &mut sql, true)?;
        self.where_clause(spec, scope, &mut sql)?;

        let mut order = Vec::new();
        for item in spec.orderby {
            let expr = self.expression(&item.expression, scope)?;
            order.push(match item.direction {
                SortDirection::Asc => format!("{} ASC", expr),
                SortDirection::Desc => format!("{} DESC", expr),
            });
        }
        if order.is_empty() && (spec.skip.is_some() || spec.top.is_some()) {
            // stable pages need a total order
            for key in spec.entity.key_properties() {
                order.push(format!("{} ASC", self.column(BASE_ALIAS, &key.column)));
            }
        }
        if !order.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&order.join(", "));
        }
        self.dialect
            .paginate(&mut sql, spec.skip, spec.top, !order.is_empty());

        Ok(CompiledQuery {
            sql,
            params: self.params,
            columns,
        })
    }

    /// `SELECT COUNT(*)` over the same restrictions, without paging
    pub fn count(mut self, spec: &SelectSpec<'_>) -> DbResult<Statement> {
        let scope = Scope {
            entity: spec.entity,
            compute: spec.compute,
        };
        let mut sql = String::from("SELECT COUNT(*)");
        self.from_clause(spec, &mut sql, false)?;
        self.where_clause(spec, scope, &mut sql)?;
        Ok(Statement {
            sql,
            params: self.params,
        })
    }

    fn from_clause(&self, spec: &SelectSpec<'_>, sql: &mut String, with_joins: bool) -> DbResult<()> {
        sql.push_str(&format!(
            " FROM {} {}",
            self.quote(&spec.entity.table),
            BASE_ALIAS
        ));

        if let Some(link) = &spec.parent {
            if let Some(join_table) = &link.navigation.join_table {
                let referenced = spec
                    .entity
                    .require_property(&link.navigation.referenced_property)?;
                sql.push_str(&format!(
                    " INNER JOIN {} {} ON {} = {}",
                    self.quote(&join_table.table),
                    LINK_ALIAS,
                    self.column(LINK_ALIAS, &join_table.target_column),
                    self.column(BASE_ALIAS, &referenced.column)
                ));
            }
        }

        if with_joins {
            for (i, join) in spec.joins.iter().enumerate() {
                let alias = format!("t{}", i + 1);
                let local = spec.entity.require_property(&join.navigation.local_property)?;
                let referenced = join
                    .target
                    .require_property(&join.navigation.referenced_property)?;
                sql.push_str(&format!(
                    " LEFT JOIN {} {} ON {} = {}",
                    self.quote(&join.target.table),
                    alias,
                    self.column(&alias, &referenced.column),
                    self.column(BASE_ALIAS, &local.column)
                ));
            }
        }
        Ok(())
    }

    fn where_clause(&mut self, spec: &SelectSpec<'_>, scope: Scope<'_>, sql: &mut String) -> DbResult<()> {
        let mut conditions = Vec::new();

        for (property, value) in &spec.key {
            let column = self.column(BASE_ALIAS, &property.column);
            let param = self.bind(value.clone());
            conditions.push(format!("{} = {}", column, param));
        }

        if let Some(link) = &spec.parent {
            let column = match &link.navigation.join_table {
                Some(join_table) => self.column(LINK_ALIAS, &join_table.local_column),
                None => {
                    let referenced = spec
                        .entity
                        .require_property(&link.navigation.referenced_property)?;
                    self.column(BASE_ALIAS, &referenced.column)
                }
            };
            if link.keys.is_empty() {
                conditions.push("1 = 0".to_string());
            } else {
                let params: Vec<String> = link
                    .keys
                    .iter()
                    .map(|key| self.bind(key.clone()))
                    .collect();
                conditions.push(format!("{} IN ({})", column, params.join(", ")));
            }
        }

        if let Some(filter) = spec.filter {
            conditions.push(self.expression(filter, scope)?);
        }

        if let Some(search) = spec.search {
            let columns: Vec<String> = spec
                .entity
                .textual_properties()
                .map(|p| self.column(BASE_ALIAS, &p.column))
                .collect();
            if columns.is_empty() {
                return Err(DbError::validation(format!(
                    "'{}' has no searchable properties",
                    spec.entity.name
                )));
            }
            conditions.push(self.search(search, &columns));
        }

        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        Ok(())
    }

    fn expression(&mut self, expr: &Expression, scope: Scope<'_>) -> DbResult<String> {
        match expr {
            Expression::Literal(literal) => match literal.value()? {
                LiteralValue::Null => Ok("NULL".to_string()),
                value => Ok(self.bind(SqlValue::from(value))),
            },

            Expression::Property(path) => {
                let name = path.first();
                if scope.entity.property(name).is_none() {
                    if let Some(item) = scope
                        .compute
                        .iter()
                        .find(|c| c.alias.eq_ignore_ascii_case(name))
                    {
                        let inner = Scope { compute: &[], ..scope };
                        return self.expression(&item.expression, inner);
                    }
                }
                let property = scope.entity.require_property(name)?;
                Ok(self.column(BASE_ALIAS, &property.column))
            }

            Expression::UnaryOp {
                op: UnaryOperator::Not,
                operand,
            } => Ok(format!("(NOT {})", self.expression(operand, scope)?)),

            Expression::BinaryOp { left, op, right }
                if matches!(op, BinaryOperator::Eq | BinaryOperator::Ne)
                    && (is_null(left) || is_null(right)) =>
            {
                let negate = *op == BinaryOperator::Ne;
                let other = if is_null(right) { left } else { right };
                if is_null(other) {
                    return Ok(if negate { "(1 = 0)" } else { "(1 = 1)" }.to_string());
                }
                let sql = self.expression(other, scope)?;
                Ok(format!(
                    "({} IS {}NULL)",
                    sql,
                    if negate { "NOT " } else { "" }
                ))
            }

            Expression::BinaryOp { left, op, right } => {
                let l = self.expression(left, scope)?;
                let r = self.expression(right, scope)?;
                Ok(self.dialect.binary(*op, &l, &r))
            }

            Expression::FunctionCall { function, args } => self.function(*function, args, scope),
        }
    }

    fn function(&mut self, function: Function, args: &[Expression], scope: Scope<'_>) -> DbResult<String> {
        function.check_arity(args.len())?;

        if let (Function::Contains | Function::StartsWith | Function::EndsWith, [text, Expression::Literal(literal)]) =
            (function, args)
        {
            if let LiteralValue::String(needle) = literal.value()? {
                let pattern = self.dialect.pattern(function, &needle);
                let text = self.expression(text, scope)?;
                let param = self.bind(SqlValue::Text(pattern));
                return Ok(self.dialect.like(&text, &param));
            }
        }

        let args = args
            .iter()
            .map(|arg| self.expression(arg, scope))
            .collect::<DbResult<Vec<_>>>()?;
        let d = self.dialect;
        let arg = |i: usize| args.get(i).map(String::as_str).unwrap_or("NULL");

        Ok(match function {
            Function::Contains => format!("({} >= 0)", d.index_of(arg(0), arg(1))),
            Function::StartsWith => format!("({} = 0)", d.index_of(arg(0), arg(1))),
            Function::EndsWith => {
                let start = format!("({} - {} + 1)", d.length(arg(0)), d.length(arg(1)));
                format!("({} = {})", d.substring(arg(0), &start, None), arg(1))
            }
            Function::Length => d.length(arg(0)),
            Function::ToLower => format!("LOWER({})", arg(0)),
            Function::ToUpper => format!("UPPER({})", arg(0)),
            Function::Trim => format!("TRIM({})", arg(0)),
            Function::Concat => d.concat(arg(0), arg(1)),
            Function::IndexOf => d.index_of(arg(0), arg(1)),
            Function::Substring => {
                let start = format!("({} + 1)", arg(1));
                d.substring(arg(0), &start, args.get(2).map(String::as_str))
            }
            Function::Year => d.date_part(DatePart::Year, arg(0)),
            Function::Month => d.date_part(DatePart::Month, arg(0)),
            Function::Day => d.date_part(DatePart::Day, arg(0)),
            Function::Hour => d.date_part(DatePart::Hour, arg(0)),
            Function::Minute => d.date_part(DatePart::Minute, arg(0)),
            Function::Second => d.date_part(DatePart::Second, arg(0)),
            Function::Now => d.current_timestamp().to_string(),
            Function::Round => d.round(arg(0)),
            Function::Floor => d.floor(arg(0)),
            Function::Ceiling => d.ceiling(arg(0)),
        })
    }

    fn search(&mut self, search: &SearchExpr, columns: &[String]) -> String {
        match search {
            SearchExpr::Term(term) | SearchExpr::Phrase(term) => {
                let phrase = matches!(search, SearchExpr::Phrase(_));
                let value = self.dialect.search_value(term, phrase);
                let param = self.bind(SqlValue::Text(value));
                self.dialect.search_term(columns, &param, phrase)
            }
            SearchExpr::And(l, r) => {
                format!("({} AND {})", self.search(l, columns), self.search(r, columns))
            }
            SearchExpr::Or(l, r) => {
                format!("({} OR {})", self.search(l, columns), self.search(r, columns))
            }
            SearchExpr::Not(inner) => format!("(NOT {})", self.search(inner, columns)),
        }
    }
}

fn is_null(expr: &Expression) -> bool {
    matches!(expr, Expression::Literal(literal) if literal.is_null())
}
