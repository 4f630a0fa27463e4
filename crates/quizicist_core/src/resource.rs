//! crates/quizicist_core/src/resource.rs
//!
//! Cache locators and the values stored under them.

use std::fmt;

use crate::domain::{Generation, GenerationId};

/// Canonical locator of a remote resource. Exactly one cache entry exists per key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
    AllGenerations,
    Generation(GenerationId),
    AdminGenerations,
}

impl CacheKey {
    /// The backend path the resource is fetched from.
    pub fn path(&self) -> String {
        match self {
            CacheKey::AllGenerations => "/api/generated/all".to_string(),
            CacheKey::Generation(id) => format!("/api/generated/{}", id),
            CacheKey::AdminGenerations => "/admin/generated".to_string(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::AllGenerations => write!(f, "all-generations"),
            CacheKey::Generation(id) => write!(f, "generation:{}", id),
            CacheKey::AdminGenerations => write!(f, "admin-generations"),
        }
    }
}

/// A cached value. The variant always matches the key it is stored under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource {
    GenerationList(Vec<GenerationId>),
    Generation(Generation),
    AdminGenerations(Vec<Generation>),
}

impl Resource {
    pub fn as_generation(&self) -> Option<&Generation> {
        match self {
            Resource::Generation(generation) => Some(generation),
            _ => None,
        }
    }

    pub fn as_generation_list(&self) -> Option<&[GenerationId]> {
        match self {
            Resource::GenerationList(ids) => Some(ids),
            _ => None,
        }
    }

    pub fn into_generation(self) -> Option<Generation> {
        match self {
            Resource::Generation(generation) => Some(generation),
            _ => None,
        }
    }

    /// True if this value is the right shape for `key`.
    pub fn fits(&self, key: &CacheKey) -> bool {
        match (key, self) {
            (CacheKey::AllGenerations, Resource::GenerationList(_)) => true,
            (CacheKey::Generation(id), Resource::Generation(g)) => g.id == *id,
            (CacheKey::AdminGenerations, Resource::AdminGenerations(_)) => true,
            _ => false,
        }
    }
}
