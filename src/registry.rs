//! Resource-type registry.
//!
//! Maps a registry key (the resource type without `Custom::`) to the
//! property [`Schema`] and [`HandlerFactory`] for that type. The registry is
//! built once and then only read.

use std::collections::HashMap;
use std::fmt;

use crate::error::ResourceError;
use crate::resources::{app, collector, connection, source, trail, HandlerFactory};
use crate::schema::Schema;

/// Abstract base names that never resolve to a concrete handler.
pub const RESERVED_NAMES: &[&str] = &["SumoResource", "AWSResource"];

/// A registered resource type.
#[derive(Clone)]
pub struct ResourceEntry {
    pub name: String,
    pub schema: Schema,
    pub factory: HandlerFactory,
}

impl fmt::Debug for ResourceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceEntry")
            .field("name", &self.name)
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

/// Ordered table of resource types.
#[derive(Debug, Clone, Default)]
pub struct ResourceRegistry {
    entries: Vec<ResourceEntry>,
    index: HashMap<String, usize>,
}

impl ResourceRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry of every handler this crate ships.
    pub fn builtin() -> Self {
        let table: [(&str, fn() -> Schema, HandlerFactory); 6] = [
            (trail::NAME, trail::schema, trail::factory),
            (collector::NAME, collector::schema, collector::factory),
            (connection::NAME, connection::schema, connection::factory),
            (source::HTTP_SOURCE, source::http_schema, source::http_factory),
            (source::AWS_SOURCE, source::aws_schema, source::aws_factory),
            (app::NAME, app::schema, app::factory),
        ];

        let mut registry = Self::new();
        for (name, schema, factory) in table {
            registry.entries.push(ResourceEntry {
                name: name.to_string(),
                schema: schema(),
                factory,
            });
            registry.index.insert(name.to_string(), registry.entries.len() - 1);
        }
        registry
    }

    /// Register a resource type.
    ///
    /// Reserved base names and names already present are refused.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        schema: Schema,
        factory: HandlerFactory,
    ) -> Result<(), ResourceError> {
        let name = name.into();
        if RESERVED_NAMES.contains(&name.as_str()) {
            return Err(ResourceError::ReservedName(name));
        }
        if self.index.contains_key(&name) {
            return Err(ResourceError::DuplicateResource(name));
        }

        tracing::debug!(resource = %name, "Registered resource type");
        self.index.insert(name.clone(), self.entries.len());
        self.entries.push(ResourceEntry {
            name,
            schema,
            factory,
        });
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&ResourceEntry, ResourceError> {
        self.index
            .get(name)
            .map(|&idx| &self.entries[idx])
            .ok_or_else(|| ResourceError::UnknownResource(name.to_string()))
    }

    /// Registered names in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
