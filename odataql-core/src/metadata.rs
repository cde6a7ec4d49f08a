//! Entity metadata supplied by the host's mapping layer.
//!
//! These are plain read-only values; the query layer never inspects host
//! types. Lookups by name are ASCII case-insensitive, the declared casing is
//! what ends up in results.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{QueryError, QueryResult};

/// Primitive property types understood by the compiler and row mapper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdmType {
    String,
    Int32,
    Int64,
    Decimal,
    Double,
    Boolean,
    DateTime,
    Date,
    TimeOfDay,
    Guid,
    Geography,
    Binary,
}

impl EdmType {
    pub fn is_textual(&self) -> bool {
        matches!(self, EdmType::String)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyMetadata {
    pub name: String,
    pub column: String,
    #[serde(rename = "type")]
    pub edm_type: EdmType,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
}

fn default_nullable() -> bool {
    true
}

impl PropertyMetadata {
    pub fn new(name: impl Into<String>, column: impl Into<String>, edm_type: EdmType) -> Self {
        Self {
            name: name.into(),
            column: column.into(),
            edm_type,
            nullable: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    One,
    Many,
}

/// Link table for many-to-many navigations.
///
/// `local_column` holds the parent's `local_property` value, `target_column`
/// holds the related entity's `referenced_property` value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinTable {
    pub table: String,
    pub local_column: String,
    pub target_column: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigationProperty {
    pub name: String,
    /// Entity set name of the related entity
    pub target: String,
    /// Property on this entity holding the join value
    pub local_property: String,
    /// Property on the related entity matched against `local_property`
    pub referenced_property: String,
    pub cardinality: Cardinality,
    #[serde(default)]
    pub join_table: Option<JoinTable>,
}

impl NavigationProperty {
    pub fn is_collection(&self) -> bool {
        self.cardinality == Cardinality::Many
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMetadata {
    /// Entity set name used in URLs
    pub name: String,
    pub table: String,
    pub keys: Vec<String>,
    pub properties: Vec<PropertyMetadata>,
    #[serde(default)]
    pub navigations: Vec<NavigationProperty>,
}

impl EntityMetadata {
    pub fn property(&self, name: &str) -> Option<&PropertyMetadata> {
        self.properties
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }

    pub fn navigation(&self, name: &str) -> Option<&NavigationProperty> {
        self.navigations
            .iter()
            .find(|n| n.name.eq_ignore_ascii_case(name))
    }

    /// Property lookup that reports the name as the client wrote it
    pub fn require_property(&self, name: &str) -> QueryResult<&PropertyMetadata> {
        self.property(name).ok_or_else(|| {
            if self.navigation(name).is_some() {
                QueryError::validation(format!(
                    "'{}' is a navigation property of '{}', not a structural property",
                    name, self.name
                ))
            } else {
                QueryError::validation(format!(
                    "unknown property '{}' on '{}'",
                    name, self.name
                ))
            }
        })
    }

    /// Navigation lookup; structural properties are rejected
    pub fn require_navigation(&self, name: &str) -> QueryResult<&NavigationProperty> {
        self.navigation(name).ok_or_else(|| {
            if self.property(name).is_some() {
                QueryError::validation(format!(
                    "'{}' on '{}' is not a navigation property",
                    name, self.name
                ))
            } else {
                QueryError::validation(format!(
                    "unknown navigation property '{}' on '{}'",
                    name, self.name
                ))
            }
        })
    }

    pub fn key_properties(&self) -> Vec<&PropertyMetadata> {
        self.keys.iter().filter_map(|k| self.property(k)).collect()
    }

    pub fn textual_properties(&self) -> impl Iterator<Item = &PropertyMetadata> {
        self.properties.iter().filter(|p| p.edm_type.is_textual())
    }
}

/// Source of entity metadata, keyed by entity set name
pub trait MetadataProvider {
    fn entity(&self, name: &str) -> Option<&EntityMetadata>;

    fn require_entity(&self, name: &str) -> QueryResult<&EntityMetadata> {
        self.entity(name)
            .ok_or_else(|| QueryError::validation(format!("unknown entity set '{}'", name)))
    }
}

/// In-memory metadata provider
#[derive(Debug, Clone, Default)]
pub struct MetadataRegistry {
    entities: HashMap<String, EntityMetadata>,
}

impl MetadataRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, entity: EntityMetadata) {
        self.entities
            .insert(entity.name.to_ascii_lowercase(), entity);
    }

    pub fn with(mut self, entity: EntityMetadata) -> Self {
        self.register(entity);
        self
    }

    /// Load a JSON array of entity descriptions
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let entities: Vec<EntityMetadata> = serde_json::from_str(json)?;
        let mut registry = Self::new();
        for entity in entities {
            registry.register(entity);
        }
        Ok(registry)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

impl MetadataProvider for MetadataRegistry {
    fn entity(&self, name: &str) -> Option<&EntityMetadata> {
        self.entities.get(&name.to_ascii_lowercase())
    }
}
