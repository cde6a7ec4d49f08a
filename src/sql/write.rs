//! INSERT, UPDATE and DELETE statements for single entities.

use odataql_core::{EntityMetadata, JoinTable, PropertyMetadata};

use super::compiler::{SqlCompiler, Statement};
use super::value::SqlValue;
use crate::error::{DbError, DbResult};

/// Property/value pairs bound in declaration order
pub type Assignments<'a> = [(&'a PropertyMetadata, SqlValue)];

impl SqlCompiler {
    pub fn insert(mut self, entity: &EntityMetadata, values: &Assignments<'_>) -> Statement {
        let table = self.quote(&entity.table);
        if values.is_empty() {
            return self.finish(format!("INSERT INTO {} DEFAULT VALUES", table));
        }
        let columns: Vec<String> = values.iter().map(|(p, _)| self.quote(&p.column)).collect();
        let params: Vec<String> = values.iter().map(|(_, v)| self.bind(v.clone())).collect();
        self.finish(format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table,
            columns.join(", "),
            params.join(", ")
        ))
    }

    pub fn update(
        mut self,
        entity: &EntityMetadata,
        values: &Assignments<'_>,
        key: &Assignments<'_>,
    ) -> DbResult<Statement> {
        if values.is_empty() {
            return Err(DbError::validation(format!(
                "update of '{}' sets no properties",
                entity.name
            )));
        }
        let table = self.quote(&entity.table);
        let sets: Vec<String> = values
            .iter()
            .map(|(p, v)| {
                let column = self.quote(&p.column);
                format!("{} = {}", column, self.bind(v.clone()))
            })
            .collect();
        let condition = self.key_condition(key);
        Ok(self.finish(format!(
            "UPDATE {} SET {} WHERE {}",
            table,
            sets.join(", "),
            condition
        )))
    }

    pub fn delete(mut self, entity: &EntityMetadata, key: &Assignments<'_>) -> Statement {
        let table = self.quote(&entity.table);
        let condition = self.key_condition(key);
        self.finish(format!("DELETE FROM {} WHERE {}", table, condition))
    }

    /// Row in a many-to-many link table
    pub fn link(mut self, join_table: &JoinTable, local: SqlValue, target: SqlValue) -> Statement {
        let local = self.bind(local);
        let target = self.bind(target);
        let sql = format!(
            "INSERT INTO {} ({}, {}) VALUES ({}, {})",
            self.quote(&join_table.table),
            self.quote(&join_table.local_column),
            self.quote(&join_table.target_column),
            local,
            target
        );
        self.finish(sql)
    }

    fn key_condition(&mut self, key: &Assignments<'_>) -> String {
        if key.is_empty() {
            return "1 = 0".to_string();
        }
        key.iter()
            .map(|(p, v)| {
                let column = self.quote(&p.column);
                format!("{} = {}", column, self.bind(v.clone()))
            })
            .collect::<Vec<_>>()
            .join(" AND ")
    }
}
