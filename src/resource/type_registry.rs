use std::collections::HashMap;

use serde::Deserialize;
use serde::Serialize;

use crate::CacheError;
use crate::ResourceType;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceScope {
    Namespaced,
    Cluster,
}

/// Resource types known to the embedding system and how they are scoped.
///
/// Handed to every connector factory call so connectors can decide how to
/// address a type.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: HashMap<ResourceType, ResourceScope>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        resource_type: ResourceType,
        scope: ResourceScope,
    ) -> &mut Self {
        self.types.insert(resource_type, scope);
        self
    }

    pub fn with(
        mut self,
        resource_type: ResourceType,
        scope: ResourceScope,
    ) -> Self {
        self.register(resource_type, scope);
        self
    }

    pub fn scope_of(
        &self,
        resource_type: &ResourceType,
    ) -> Result<ResourceScope> {
        self.types
            .get(resource_type)
            .copied()
            .ok_or_else(|| CacheError::UnknownResourceType(resource_type.clone()).into())
    }

    pub fn contains(
        &self,
        resource_type: &ResourceType,
    ) -> bool {
        self.types.contains_key(resource_type)
    }

    pub fn is_namespaced(
        &self,
        resource_type: &ResourceType,
    ) -> bool {
        matches!(self.types.get(resource_type), Some(ResourceScope::Namespaced))
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
